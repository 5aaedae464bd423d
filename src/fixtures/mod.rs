//! Fixtures
//!
//! YAML descriptions of promotion sets and orders, used by the `tally` binary
//! and the integration tests.

use std::{fs, path::PathBuf};

use rust_decimal::{Decimal, prelude::ToPrimitive};
use rusty_money::{Money, iso};
use thiserror::Error;

use crate::{
    catalog::{CatalogError, InMemoryPromotionCatalog},
    orders::OrderError,
    pricing::{Amount, PricingError},
    promotions::{Promotion, PromotionError, kinds::Percent},
};

pub mod orders;
pub mod promotions;

pub use orders::{LoadedOrder, OrderFixture};
pub use promotions::{PromotionFixture, PromotionsFixture};

/// Fixture Parsing Errors
#[derive(Debug, Error)]
pub enum FixtureError {
    /// IO error reading fixture files
    #[error("Failed to read fixture file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_norway::Error),

    /// Invalid price format
    #[error("Invalid price format: {0}")]
    InvalidPrice(String),

    /// Invalid percentage format
    #[error("Invalid percentage format: {0}")]
    InvalidPercentage(String),

    /// Unknown currency code
    #[error("Unknown currency code: {0}")]
    UnknownCurrency(String),

    /// Unknown weekday name
    #[error("Unknown weekday: {0}")]
    InvalidWeekday(String),

    /// An order with neither a subtotal nor any items
    #[error("Order fixture has no items and no subtotal")]
    EmptyOrder,

    /// Invalid promotion data
    #[error("Invalid promotion {key}: {source}")]
    Promotion {
        /// Fixture key of the promotion
        key: String,

        /// Validation failure
        #[source]
        source: PromotionError,
    },

    /// Invalid order data
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Money arithmetic failure
    #[error(transparent)]
    Pricing(#[from] PricingError),

    /// Promotions that conflict in a catalog
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Fixture
#[derive(Debug, Clone)]
pub struct Fixture {
    /// Base path for fixture files
    base_path: PathBuf,
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Fixture {
    /// Create a fixture loader with the default base path
    pub fn new() -> Self {
        Self::with_base_path("./fixtures")
    }

    /// Create a fixture loader with a custom base path
    pub fn with_base_path(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Load a promotion set from `promotions/<name>.yml`
    ///
    /// Promotions are returned in fixture key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or a promotion is invalid.
    pub fn load_promotions(&self, name: &str) -> Result<Vec<Promotion>, FixtureError> {
        let file_path = self.base_path.join("promotions").join(format!("{name}.yml"));
        let contents = fs::read_to_string(&file_path)?;
        let fixture: PromotionsFixture = serde_norway::from_str(&contents)?;

        fixture.into_promotions()
    }

    /// Load a promotion set into an in-memory catalog
    ///
    /// # Errors
    ///
    /// Returns an error if the set cannot be loaded or two promotions share a live code.
    pub fn load_catalog(&self, name: &str) -> Result<InMemoryPromotionCatalog, FixtureError> {
        Ok(InMemoryPromotionCatalog::with_promotions(
            self.load_promotions(name)?,
        )?)
    }

    /// Load an order from `orders/<name>.yml`
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or the order is invalid.
    pub fn load_order(&self, name: &str) -> Result<LoadedOrder, FixtureError> {
        let file_path = self.base_path.join("orders").join(format!("{name}.yml"));
        let contents = fs::read_to_string(&file_path)?;
        let fixture: OrderFixture = serde_norway::from_str(&contents)?;

        fixture.try_into()
    }
}

/// Parse price string (e.g., "6000.00 GBP") into an amount
///
/// # Errors
///
/// Returns an error if the format is wrong, the currency is unknown, or the
/// amount has more decimal places than the currency allows.
pub fn parse_price(s: &str) -> Result<Amount, FixtureError> {
    let mut parts = s.split_whitespace();

    let (Some(amount), Some(currency_code), None) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(FixtureError::InvalidPrice(format!(
            "Expected format 'AMOUNT CURRENCY', got: {s}"
        )));
    };

    let amount = amount
        .parse::<Decimal>()
        .map_err(|_err| FixtureError::InvalidPrice(s.to_string()))?;

    let currency = iso::find(currency_code)
        .ok_or_else(|| FixtureError::UnknownCurrency(currency_code.to_string()))?;

    let minor_units = amount
        .checked_mul(Decimal::from(10_i64.pow(currency.exponent)))
        .filter(|value| value.fract().is_zero())
        .and_then(|value| value.to_i64())
        .ok_or_else(|| FixtureError::InvalidPrice(s.to_string()))?;

    Ok(Money::from_minor(minor_units, currency))
}

/// Parse percentage string (e.g., "10" or "12.5%") into a [`Percent`]
///
/// Both forms are read as a percentage, so "10" and "10%" are the same.
///
/// # Errors
///
/// Returns an error if the string cannot be parsed or is outside `(0, 100]`.
pub fn parse_percentage(s: &str) -> Result<Percent, FixtureError> {
    let trimmed = s.trim();
    let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();

    let value = number
        .parse::<Decimal>()
        .map_err(|_err| FixtureError::InvalidPercentage(s.to_string()))?;

    Percent::new(value).map_err(|_err| FixtureError::InvalidPercentage(s.to_string()))
}

#[cfg(test)]
mod tests {
    use std::{fs, io::Write};

    use rusty_money::iso::{GBP, JPY, USD};
    use testresult::TestResult;

    use super::*;

    #[test]
    fn parse_price_reads_minor_units() -> TestResult {
        assert_eq!(parse_price("6000.00 GBP")?, Money::from_minor(600_000, GBP));
        assert_eq!(parse_price("1 USD")?, Money::from_minor(100, USD));
        assert_eq!(parse_price("500 JPY")?, Money::from_minor(500, JPY));

        Ok(())
    }

    #[test]
    fn parse_price_rejects_invalid_format() {
        assert!(matches!(
            parse_price("2.99GBP"),
            Err(FixtureError::InvalidPrice(_))
        ));
        assert!(matches!(
            parse_price("2.99 GBP extra"),
            Err(FixtureError::InvalidPrice(_))
        ));
        assert!(matches!(
            parse_price("2.999 GBP"),
            Err(FixtureError::InvalidPrice(_))
        ));
    }

    #[test]
    fn parse_price_rejects_unknown_currency() {
        let result = parse_price("2.99 ABC");

        assert!(matches!(result, Err(FixtureError::UnknownCurrency(code)) if code == "ABC"));
    }

    #[test]
    fn parse_percentage_accepts_both_forms() -> TestResult {
        assert_eq!(parse_percentage("10")?.value(), Decimal::TEN);
        assert_eq!(parse_percentage("12.5%")?.value(), Decimal::new(125, 1));
        assert_eq!(parse_percentage(" 100 % ")?.value(), Decimal::ONE_HUNDRED);

        Ok(())
    }

    #[test]
    fn parse_percentage_rejects_out_of_range() {
        assert!(matches!(
            parse_percentage("0"),
            Err(FixtureError::InvalidPercentage(_))
        ));
        assert!(matches!(
            parse_percentage("150%"),
            Err(FixtureError::InvalidPercentage(_))
        ));
        assert!(matches!(
            parse_percentage("ten"),
            Err(FixtureError::InvalidPercentage(_))
        ));
    }

    #[test]
    fn loads_fixture_files_from_base_path() -> TestResult {
        let dir = tempfile::tempdir()?;
        fs::create_dir_all(dir.path().join("promotions"))?;
        fs::create_dir_all(dir.path().join("orders"))?;

        let mut promotions = fs::File::create(dir.path().join("promotions/spring.yml"))?;
        promotions.write_all(
            br#"
promotions:
  spring:
    name: Spring
    code: spring5
    currency: GBP
    status: active
    starts_at: "2026-03-01T00:00:00Z"
    ends_at: "2026-05-31T23:59:59Z"
    discount:
      type: fixed_amount
      amount: "5.00 GBP"
"#,
        )?;

        let mut order = fs::File::create(dir.path().join("orders/socks.yml"))?;
        order.write_all(
            br#"
items:
  - product: socks
    quantity: 3
    price: "4.00 GBP"
"#,
        )?;

        let fixture = Fixture::with_base_path(dir.path());
        let loaded = fixture.load_promotions("spring")?;
        let order = fixture.load_order("socks")?;

        assert_eq!(loaded.len(), 1);
        assert_eq!(
            loaded.first().and_then(Promotion::code).map(|code| code.as_str()),
            Some("SPRING5")
        );
        assert_eq!(order.subtotal, Money::from_minor(1_200, GBP));

        Ok(())
    }

    #[test]
    fn missing_fixture_is_io_error() {
        let fixture = Fixture::with_base_path("/nonexistent");

        assert!(matches!(
            fixture.load_promotions("nothing"),
            Err(FixtureError::Io(_))
        ));
    }
}
