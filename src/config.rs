//! Tally CLI configuration

use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand, ValueEnum};
use jiff::Timestamp;

use tally::customers::CustomerClass;

/// Log output format.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub(crate) enum LogFormat {
    /// Compact, human-readable logs.
    Compact,

    /// Structured JSON logs.
    Json,
}

/// Logging settings.
#[derive(Debug, Args)]
pub(crate) struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, env = "RUST_LOG", default_value = "info")]
    pub(crate) log_level: String,

    /// Log format (compact, json)
    #[arg(long, global = true, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub(crate) log_format: LogFormat,
}

/// Tally promotion engine CLI
#[derive(Debug, Parser)]
#[command(name = "tally", about = "Promotion eligibility and redemption engine", long_about = None)]
pub(crate) struct Cli {
    /// Logging output settings.
    #[command(flatten)]
    pub(crate) logging: LoggingConfig,

    /// Fixture directory
    #[arg(long, global = true, env = "TALLY_FIXTURES", default_value = "./fixtures")]
    pub(crate) fixtures: PathBuf,

    /// Time a commit waits for a promotion's ledger lock, in milliseconds
    #[arg(long, global = true, env = "TALLY_LOCK_TIMEOUT_MS", default_value_t = 250_u64)]
    pub(crate) lock_timeout_ms: u64,

    #[command(subcommand)]
    pub(crate) command: Command,
}

impl Cli {
    /// Load configuration from `.env`, the environment and CLI arguments
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be parsed
    pub(crate) fn load() -> Result<Self, clap::Error> {
        // Load .env file if present (ignore if missing)
        _ = dotenvy::dotenv();

        Self::try_parse()
    }

    /// Ledger lock timeout
    pub(crate) fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Check a code against an order without recording a redemption
    Validate(ValidateArgs),

    /// Commit a code against several orders concurrently
    Redeem(RedeemArgs),
}

/// Customer classification supplied on the command line.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub(crate) enum ClassArg {
    /// First-time customer
    New,

    /// Customer with previous orders
    Returning,

    /// Returning VIP customer
    Vip,
}

impl From<ClassArg> for CustomerClass {
    fn from(value: ClassArg) -> Self {
        match value {
            ClassArg::New => CustomerClass::new_customer(),
            ClassArg::Returning => CustomerClass::returning(),
            ClassArg::Vip => CustomerClass::vip(),
        }
    }
}

/// Promotion set, order and code shared by both commands.
#[derive(Debug, Args)]
pub(crate) struct ScenarioArgs {
    /// Promotion set, read from `promotions/<set>.yml`
    #[arg(long)]
    pub(crate) promotions: String,

    /// Order, read from `orders/<name>.yml`
    #[arg(long)]
    pub(crate) order: String,

    /// Redemption code
    #[arg(long)]
    pub(crate) code: String,

    /// Classification of the customer
    #[arg(long, value_enum)]
    pub(crate) class: Option<ClassArg>,

    /// Evaluate as of this instant (RFC 3339); defaults to now
    #[arg(long)]
    pub(crate) at: Option<Timestamp>,
}

#[derive(Debug, Args)]
pub(crate) struct ValidateArgs {
    #[command(flatten)]
    pub(crate) scenario: ScenarioArgs,

    /// Customer placing the order; anonymous when omitted
    #[arg(long)]
    pub(crate) customer: Option<String>,
}

#[derive(Debug, Args)]
pub(crate) struct RedeemArgs {
    #[command(flatten)]
    pub(crate) scenario: ScenarioArgs,

    /// Customer placing the orders
    #[arg(long)]
    pub(crate) customer: String,

    /// Number of distinct orders to commit concurrently
    #[arg(long, default_value_t = 1_u32)]
    pub(crate) orders: u32,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use testresult::TestResult;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_redeem_with_global_flags() -> TestResult {
        let cli = Cli::try_parse_from([
            "tally",
            "redeem",
            "--promotions",
            "summer",
            "--order",
            "laptop",
            "--code",
            "SUMMER10",
            "--customer",
            "alice",
            "--orders",
            "4",
            "--lock-timeout-ms",
            "50",
            "--log-format",
            "json",
        ])?;

        assert_eq!(cli.lock_timeout(), Duration::from_millis(50));
        assert!(matches!(cli.logging.log_format, LogFormat::Json));

        let Command::Redeem(args) = cli.command else {
            return Err("expected redeem".into());
        };

        assert_eq!(args.orders, 4);
        assert_eq!(args.customer, "alice");
        assert_eq!(args.scenario.code, "SUMMER10");

        Ok(())
    }

    #[test]
    fn parses_validate_timestamp() -> TestResult {
        let cli = Cli::try_parse_from([
            "tally",
            "validate",
            "--promotions",
            "summer",
            "--order",
            "laptop",
            "--code",
            "summer10",
            "--at",
            "2026-07-01T12:00:00Z",
        ])?;

        let Command::Validate(args) = cli.command else {
            return Err("expected validate".into());
        };

        assert_eq!(args.scenario.at, Some("2026-07-01T12:00:00Z".parse()?));
        assert_eq!(args.customer, None);

        Ok(())
    }
}
