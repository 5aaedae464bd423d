//! Discounts
//!
//! Computes the monetary effect of a promotion that has already been found
//! eligible. Every amount is in the order's minor units and never exceeds the
//! order subtotal.

use rusty_money::MoneyError;
use serde::Serialize;
use smallvec::SmallVec;
use thiserror::Error;

use crate::{
    eligibility::Eligible,
    ids::ProductId,
    orders::{LineItem, OrderContext},
    pricing::{Amount, PricingError, line_total, max_amount, min_amount, percent_of, sum, zero},
    promotions::kinds::{Bundle, BuyXGetY, PromotionKind},
    promotions::scope::ProductScope,
};

/// Errors specific to discount calculations.
#[derive(Debug, Error)]
pub enum DiscountError {
    /// A bundle product is missing from the order, which eligibility rules out.
    #[error("bundle product {0} is missing from the order")]
    IncompleteBundle(ProductId),

    /// Money arithmetic overflowed.
    #[error(transparent)]
    Pricing(#[from] PricingError),

    /// Wrapped money arithmetic or currency mismatch error.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// Result of applying a promotion to an order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DiscountOutcome {
    /// Amount taken off the order
    #[serde(serialize_with = "crate::pricing::serialize_minor")]
    pub amount: Amount,

    /// Whether shipping is waived
    pub free_shipping: bool,

    /// Units given away by a buy-x-get-y promotion
    pub free_units: u64,
}

impl DiscountOutcome {
    fn off(amount: Amount) -> Self {
        Self {
            amount,
            free_shipping: false,
            free_units: 0,
        }
    }
}

/// Calculate the discount for an eligible promotion.
///
/// `shipping` is the order's shipping cost, consulted by free-shipping
/// promotions only.
///
/// # Errors
///
/// Returns a [`DiscountError`] if money arithmetic fails or a bundle product
/// is missing.
pub fn calculate(
    eligible: &Eligible<'_>,
    shipping: Option<Amount>,
) -> Result<DiscountOutcome, DiscountError> {
    let promotion = eligible.promotion();
    let order = eligible.order();
    let subtotal = *order.subtotal();

    let outcome = match promotion.kind() {
        PromotionKind::Percentage {
            percent,
            max_discount,
        } => {
            let discount = percent_of(&subtotal, percent.value())?;
            let discount = max_discount.map_or(discount, |cap| min_amount(discount, cap));

            DiscountOutcome::off(discount)
        }
        PromotionKind::FixedAmount { amount } => DiscountOutcome::off(*amount),
        PromotionKind::FreeShipping => DiscountOutcome {
            amount: shipping.unwrap_or_else(|| zero(order.currency())),
            free_shipping: true,
            free_units: 0,
        },
        PromotionKind::BuyXGetY(offer) => buy_x_get_y(offer, promotion.scope(), order)?,
        PromotionKind::Bundle(bundle) => DiscountOutcome::off(bundle_discount(bundle, order)?),
    };

    // Shipping is not part of the subtotal, so it is not clamped to it.
    if outcome.free_shipping {
        return Ok(outcome);
    }

    Ok(DiscountOutcome {
        amount: clamp_to_subtotal(outcome.amount, subtotal),
        ..outcome
    })
}

/// Bound a discount to `0..=subtotal`.
fn clamp_to_subtotal(amount: Amount, subtotal: Amount) -> Amount {
    min_amount(max_amount(amount, zero(subtotal.currency())), subtotal)
}

fn buy_x_get_y(
    offer: &BuyXGetY,
    scope: &ProductScope,
    order: &OrderContext,
) -> Result<DiscountOutcome, DiscountError> {
    let matching: SmallVec<[&LineItem; 8]> = order
        .items()
        .iter()
        .filter(|line| scope.matches(line))
        .collect();

    let units: u64 = matching.iter().map(|line| u64::from(line.quantity())).sum();
    let groups = units / u64::from(offer.buy.get());
    let granted = groups.saturating_mul(u64::from(offer.get.get()));

    let candidates: SmallVec<[&LineItem; 8]> = match &offer.free_product {
        Some(product) => order
            .items()
            .iter()
            .filter(|line| line.product() == product)
            .collect(),
        None => matching,
    };

    let (amount, free_units) = cheapest_units(order, candidates, granted)?;

    Ok(DiscountOutcome {
        amount,
        free_shipping: false,
        free_units,
    })
}

fn bundle_discount(bundle: &Bundle, order: &OrderContext) -> Result<Amount, DiscountError> {
    let currency = order.currency();
    let mut regular = zero(currency);

    for item in bundle.items() {
        let lines: SmallVec<[&LineItem; 8]> = order
            .items()
            .iter()
            .filter(|line| line.product() == &item.product)
            .collect();

        let wanted = u64::from(item.quantity.get());
        let (price, taken) = cheapest_units(order, lines, wanted)?;

        if taken < wanted {
            return Err(DiscountError::IncompleteBundle(item.product.clone()));
        }

        regular = regular.add(price)?;
    }

    let discounted = sum(
        currency,
        bundle.items().iter().map(|item| item.discounted_price),
    )?;

    Ok(max_amount(regular.sub(discounted)?, zero(currency)))
}

/// Price of the `wanted` cheapest units across `lines`, and how many units
/// were actually available.
fn cheapest_units(
    order: &OrderContext,
    mut lines: SmallVec<[&LineItem; 8]>,
    wanted: u64,
) -> Result<(Amount, u64), DiscountError> {
    lines.sort_by_key(|line| line.unit_price().to_minor_units());

    let mut total = zero(order.currency());
    let mut remaining = wanted;

    for line in lines {
        if remaining == 0 {
            break;
        }

        let take = remaining.min(u64::from(line.quantity()));
        let take_u32 = u32::try_from(take).map_err(|_err| PricingError::Overflow("free units"))?;

        total = total.add(line_total(line.unit_price(), take_u32)?)?;
        remaining -= take;
    }

    Ok((total, wanted - remaining))
}
