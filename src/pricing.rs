//! Prices

use rust_decimal::{
    Decimal, RoundingStrategy,
    prelude::{FromPrimitive, ToPrimitive},
};
use rusty_money::{Money, MoneyError, iso::Currency};
use thiserror::Error;

/// Monetary amount in a static ISO currency.
pub type Amount = Money<'static, Currency>;

/// Errors that can occur during money arithmetic.
#[derive(Debug, Error, PartialEq)]
pub enum PricingError {
    /// An intermediate value could not be represented in minor units.
    #[error("amount overflowed while calculating {0}")]
    Overflow(&'static str),

    /// Wrapped money arithmetic or currency mismatch error.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// Zero in the given currency.
pub fn zero(currency: &'static Currency) -> Amount {
    Money::from_minor(0, currency)
}

/// Serialize an amount as its integer minor units.
///
/// # Errors
///
/// Returns the serializer's error.
pub fn serialize_minor<S: serde::Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(amount.to_minor_units())
}

/// The smaller of two amounts, compared in minor units.
pub fn min_amount(a: Amount, b: Amount) -> Amount {
    if b.to_minor_units() < a.to_minor_units() {
        b
    } else {
        a
    }
}

/// The larger of two amounts, compared in minor units.
pub fn max_amount(a: Amount, b: Amount) -> Amount {
    if b.to_minor_units() > a.to_minor_units() {
        b
    } else {
        a
    }
}

/// Price of `quantity` units at `unit_price`.
///
/// # Errors
///
/// Returns [`PricingError::Overflow`] if the total does not fit in minor units.
pub fn line_total(unit_price: &Amount, quantity: u32) -> Result<Amount, PricingError> {
    unit_price
        .to_minor_units()
        .checked_mul(i64::from(quantity))
        .map(|minor| Money::from_minor(minor, unit_price.currency()))
        .ok_or(PricingError::Overflow("line total"))
}

/// Sum of the given amounts in `currency`.
///
/// # Errors
///
/// Returns [`PricingError::Money`] if any amount is in a different currency.
pub fn sum<I>(currency: &'static Currency, amounts: I) -> Result<Amount, PricingError>
where
    I: IntoIterator<Item = Amount>,
{
    Ok(amounts
        .into_iter()
        .try_fold(zero(currency), |acc, amount| acc.add(amount))?)
}

/// `percent`% of `amount`, rounded half-up to the minor unit.
///
/// # Errors
///
/// Returns [`PricingError::Overflow`] if the product cannot be represented.
pub fn percent_of(amount: &Amount, percent: Decimal) -> Result<Amount, PricingError> {
    let minor = percent_of_minor(percent, amount.to_minor_units())?;

    Ok(Money::from_minor(minor, amount.currency()))
}

fn percent_of_minor(percent: Decimal, minor: i64) -> Result<i64, PricingError> {
    let Some(minor) = Decimal::from_i64(minor) else {
        return Err(PricingError::Overflow("percentage"));
    };

    let applied = minor
        .checked_mul(percent)
        .and_then(|value| value.checked_div(Decimal::ONE_HUNDRED))
        .ok_or(PricingError::Overflow("percentage"))?;

    applied
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or(PricingError::Overflow("percentage"))
}

#[cfg(test)]
mod tests {
    use rusty_money::iso::{GBP, USD};
    use testresult::TestResult;

    use super::*;

    #[test]
    fn percent_of_rounds_half_up() -> TestResult {
        // 12.5% of 1.00 is 12.5 minor units
        let amount = Money::from_minor(100, GBP);

        assert_eq!(
            percent_of(&amount, Decimal::new(125, 1))?,
            Money::from_minor(13, GBP)
        );

        // 10% of 0.05 is 0.5 minor units
        let amount = Money::from_minor(5, GBP);

        assert_eq!(
            percent_of(&amount, Decimal::TEN)?,
            Money::from_minor(1, GBP)
        );

        Ok(())
    }

    #[test]
    fn percent_of_rounds_down_below_half() -> TestResult {
        let amount = Money::from_minor(4, GBP);

        assert_eq!(
            percent_of(&amount, Decimal::TEN)?,
            Money::from_minor(0, GBP)
        );

        Ok(())
    }

    #[test]
    fn percent_of_large_amount_is_exact() -> TestResult {
        let amount = Money::from_minor(600_000, GBP);

        assert_eq!(
            percent_of(&amount, Decimal::TEN)?,
            Money::from_minor(60_000, GBP)
        );

        Ok(())
    }

    #[test]
    fn line_total_multiplies_quantity() -> TestResult {
        let unit = Money::from_minor(30_000, GBP);

        assert_eq!(line_total(&unit, 5)?, Money::from_minor(150_000, GBP));

        Ok(())
    }

    #[test]
    fn line_total_overflow_is_reported() {
        let unit = Money::from_minor(i64::MAX, GBP);

        assert_eq!(
            line_total(&unit, 2),
            Err(PricingError::Overflow("line total"))
        );
    }

    #[test]
    fn sum_rejects_mixed_currencies() {
        let result = sum(
            GBP,
            [Money::from_minor(100, GBP), Money::from_minor(100, USD)],
        );

        assert!(matches!(result, Err(PricingError::Money(_))));
    }

    #[test]
    fn min_amount_picks_smaller() {
        let small = Money::from_minor(10, GBP);
        let large = Money::from_minor(20, GBP);

        assert_eq!(min_amount(large, small), small);
        assert_eq!(min_amount(small, large), small);
    }

    #[test]
    fn max_amount_picks_larger() {
        let negative = Money::from_minor(-500, GBP);
        let nothing = zero(GBP);

        assert_eq!(max_amount(negative, nothing), nothing);
        assert_eq!(max_amount(nothing, negative), nothing);
    }
}
