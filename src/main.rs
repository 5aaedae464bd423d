//! Tally CLI

use std::{process::ExitCode, sync::Arc, time::Duration};

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{error, info};

use tally::{
    catalog::PromotionCatalog,
    clock::{Clock, FixedClock, SystemClock},
    customers::StaticClassifier,
    eligibility::UsageSnapshot,
    fixtures::{Fixture, LoadedOrder},
    ids::{CustomerId, OrderId},
    ledger::{InMemoryUsageStore, UsageStore},
    promotions::PromotionCode,
    redemption::{CommitRedemption, RedemptionCoordinator, RedemptionError, ValidateRequest},
};

use crate::config::{Cli, Command, RedeemArgs, ScenarioArgs, ValidateArgs};

mod config;
mod observability;

/// A refused request, as an API layer would report it.
#[derive(Debug, Serialize)]
struct Refusal {
    reason: &'static str,
    status: u16,
    message: String,
}

impl From<&RedemptionError> for Refusal {
    fn from(error: &RedemptionError) -> Self {
        Self {
            reason: error.reason_code(),
            status: error.http_status(),
            message: error.to_string(),
        }
    }
}

/// Result of committing one order.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum OrderOutcome {
    Committed {
        order_id: OrderId,
        discount: i64,
        replayed: bool,
    },
    Rejected {
        order_id: OrderId,
        #[serde(flatten)]
        refusal: Refusal,
    },
}

#[derive(Debug, Serialize)]
struct RedeemReport {
    outcomes: Vec<OrderOutcome>,
    usage: UsageSnapshot,
}

/// Coordinator and the collaborators a command needs directly.
struct Scenario {
    coordinator: RedemptionCoordinator,
    catalog: Arc<dyn PromotionCatalog>,
    ledger: Arc<dyn UsageStore>,
    order: LoadedOrder,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::load() {
        Ok(cli) => cli,
        Err(error) => return usage(&error),
    };

    if let Err(source) = observability::init(&cli.logging) {
        #[expect(
            clippy::print_stderr,
            reason = "logging not initialized, must use eprintln for setup errors"
        )]
        {
            eprintln!("{source}");
        }

        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(code) => code,
        Err(message) => {
            error!("{message}");

            ExitCode::FAILURE
        }
    }
}

/// Print a parse failure, or the help text clap reports through the error path.
fn usage(error: &clap::Error) -> ExitCode {
    if let Err(source) = error.print() {
        #[expect(
            clippy::print_stderr,
            reason = "logging not initialized, must use eprintln for setup errors"
        )]
        {
            eprintln!("failed to print usage: {source}");
        }

        return ExitCode::FAILURE;
    }

    if error.use_stderr() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn run(cli: Cli) -> Result<ExitCode, String> {
    let fixture = Fixture::with_base_path(&cli.fixtures);
    let lock_timeout = cli.lock_timeout();

    match cli.command {
        Command::Validate(args) => {
            let customer = args.customer.clone().map(CustomerId::from);
            let scenario = scenario(&fixture, &args.scenario, customer.as_ref(), lock_timeout)?;

            validate(scenario, args).await
        }
        Command::Redeem(args) => {
            let customer = CustomerId::from(args.customer.clone());
            let scenario = scenario(&fixture, &args.scenario, Some(&customer), lock_timeout)?;

            redeem(&scenario, &args, customer).await
        }
    }
}

fn scenario(
    fixture: &Fixture,
    args: &ScenarioArgs,
    customer: Option<&CustomerId>,
    lock_timeout: Duration,
) -> Result<Scenario, String> {
    let catalog: Arc<dyn PromotionCatalog> = Arc::new(
        fixture
            .load_catalog(&args.promotions)
            .map_err(|error| format!("failed to load promotions {}: {error}", args.promotions))?,
    );

    let order = fixture
        .load_order(&args.order)
        .map_err(|error| format!("failed to load order {}: {error}", args.order))?;

    let classifier = match (customer, args.class) {
        (Some(customer), Some(class)) => StaticClassifier::new().with(customer.clone(), class.into()),
        _ => StaticClassifier::new(),
    };

    let clock: Arc<dyn Clock> = match args.at {
        Some(at) => Arc::new(FixedClock(at)),
        None => Arc::new(SystemClock),
    };

    let ledger: Arc<dyn UsageStore> = Arc::new(InMemoryUsageStore::new(lock_timeout));

    Ok(Scenario {
        coordinator: RedemptionCoordinator::new(
            Arc::clone(&catalog),
            Arc::clone(&ledger),
            Arc::new(classifier),
            clock,
        ),
        catalog,
        ledger,
        order,
    })
}

#[expect(clippy::print_stdout, reason = "command output is JSON on stdout")]
async fn validate(scenario: Scenario, args: ValidateArgs) -> Result<ExitCode, String> {
    let result = scenario
        .coordinator
        .validate(ValidateRequest {
            code: args.scenario.code,
            customer: args.customer.map(CustomerId::from),
            subtotal: scenario.order.subtotal,
            items: scenario.order.items,
            shipping: scenario.order.shipping,
        })
        .await;

    let (json, code) = match &result {
        Ok(validation) => (serde_json::to_string_pretty(validation), ExitCode::SUCCESS),
        Err(error) => (
            serde_json::to_string_pretty(&Refusal::from(error)),
            ExitCode::FAILURE,
        ),
    };

    println!(
        "{}",
        json.map_err(|error| format!("failed to render validation: {error}"))?
    );

    Ok(code)
}

#[expect(clippy::print_stdout, reason = "command output is JSON on stdout")]
async fn redeem(
    scenario: &Scenario,
    args: &RedeemArgs,
    customer: CustomerId,
) -> Result<ExitCode, String> {
    let code = PromotionCode::new(&args.scenario.code)
        .map_err(|error| format!("invalid code {}: {error}", args.scenario.code))?;

    let promotion = scenario
        .catalog
        .find_by_code(code)
        .await
        .map_err(|error| format!("failed to look up promotion: {error}"))?
        .ok_or_else(|| format!("no promotion with code {}", args.scenario.code))?;

    let order = scenario
        .order
        .context(None)
        .map_err(|error| format!("invalid order: {error}"))?;

    info!(
        promotion_uuid = %promotion.uuid(),
        orders = args.orders,
        "committing orders concurrently"
    );

    let mut commits = JoinSet::new();

    for index in 0..args.orders {
        let coordinator = scenario.coordinator.clone();
        let order_id = OrderId::from(format!("{}-{index:04}", args.scenario.order));
        let request = CommitRedemption {
            promotion: promotion.uuid(),
            customer: customer.clone(),
            order_id: order_id.clone(),
            order: order.clone(),
            shipping: scenario.order.shipping,
        };

        commits.spawn(async move { (order_id, coordinator.commit(request).await) });
    }

    let mut outcomes = Vec::new();

    while let Some(joined) = commits.join_next().await {
        let (order_id, result) = joined.map_err(|error| format!("commit task failed: {error}"))?;

        outcomes.push(match result {
            Ok(redemption) => OrderOutcome::Committed {
                order_id,
                discount: redemption.record.discount.to_minor_units(),
                replayed: redemption.replayed,
            },
            Err(error) => OrderOutcome::Rejected {
                order_id,
                refusal: Refusal::from(&error),
            },
        });
    }

    outcomes.sort_by(|a, b| a.order_id().cmp(b.order_id()));

    let usage = scenario
        .ledger
        .usage(promotion.uuid(), Some(customer))
        .await
        .map_err(|error| format!("failed to read usage: {error}"))?;

    let report = RedeemReport { outcomes, usage };

    println!(
        "{}",
        serde_json::to_string_pretty(&report)
            .map_err(|error| format!("failed to render report: {error}"))?
    );

    Ok(ExitCode::SUCCESS)
}

impl OrderOutcome {
    fn order_id(&self) -> &OrderId {
        match self {
            Self::Committed { order_id, .. } | Self::Rejected { order_id, .. } => order_id,
        }
    }
}
