//! Eligibility
//!
//! Decides whether a promotion applies to an order at a point in time. The
//! checks run in a fixed order and the first failing one is reported, so the
//! reason a customer sees is stable.

use std::fmt;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    orders::OrderContext,
    promotions::{Promotion, kinds::PromotionKind, status::PromotionStatus},
};

/// Why a promotion does not apply. Variants are listed in evaluation order.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Ineligibility {
    /// Unknown promotion, or its effective status is not active.
    #[error("promotion not found or inactive")]
    NotFoundOrInactive,

    /// Outside the validity window.
    #[error("promotion is not valid at this time")]
    OutOfValidityWindow,

    /// The local weekday is not allowed.
    #[error("promotion is not available on this day")]
    DayNotAllowed,

    /// The local time of day is not allowed.
    #[error("promotion is not available at this time of day")]
    TimeNotAllowed,

    /// The local date is excluded.
    #[error("promotion is not available on this date")]
    DateExcluded,

    /// The customer is not targeted.
    #[error("customer is not eligible for this promotion")]
    CustomerNotEligible,

    /// The subtotal is below the minimum order amount.
    #[error("order is below the minimum amount for this promotion")]
    BelowMinOrder,

    /// No order line is covered by the promotion.
    #[error("order contains no applicable items")]
    NoApplicableItems,

    /// The global usage limit has been reached.
    #[error("promotion usage limit reached")]
    GlobalLimitReached,

    /// The customer's usage limit has been reached.
    #[error("customer usage limit reached for this promotion")]
    CustomerLimitReached,
}

impl Ineligibility {
    /// Reason code exposed to API consumers.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotFoundOrInactive => "NOT_FOUND_OR_INACTIVE",
            Self::OutOfValidityWindow => "OUT_OF_VALIDITY_WINDOW",
            Self::DayNotAllowed => "DAY_NOT_ALLOWED",
            Self::TimeNotAllowed => "TIME_NOT_ALLOWED",
            Self::DateExcluded => "DATE_EXCLUDED",
            Self::CustomerNotEligible => "CUSTOMER_NOT_ELIGIBLE",
            Self::BelowMinOrder => "BELOW_MIN_ORDER",
            Self::NoApplicableItems => "NO_APPLICABLE_ITEMS",
            Self::GlobalLimitReached => "GLOBAL_LIMIT_REACHED",
            Self::CustomerLimitReached => "CUSTOMER_LIMIT_REACHED",
        }
    }

    /// HTTP status an API layer should answer with.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::NotFoundOrInactive => 404,
            Self::BelowMinOrder => 400,
            _ => 422,
        }
    }
}

/// Counters read from the usage ledger for one evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Redemptions across all customers
    pub total_used: u64,

    /// Redemptions by the order's customer
    pub customer_used: u32,
}

/// Proof that a promotion applies to an order. Only [`evaluate`] creates it,
/// and the discount calculator accepts nothing else.
#[derive(Clone, Copy)]
pub struct Eligible<'a> {
    promotion: &'a Promotion,
    order: &'a OrderContext,
}

impl<'a> Eligible<'a> {
    /// The eligible promotion.
    pub fn promotion(&self) -> &'a Promotion {
        self.promotion
    }

    /// The order it applies to.
    pub fn order(&self) -> &'a OrderContext {
        self.order
    }
}

impl fmt::Debug for Eligible<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Eligible")
            .field("promotion", &self.promotion.uuid())
            .field("subtotal", self.order.subtotal())
            .finish()
    }
}

/// Evaluate a promotion against an order at `as_of`.
///
/// The order must be in the promotion's currency.
///
/// # Errors
///
/// Returns the first [`Ineligibility`] found, in declaration order.
pub fn evaluate<'a>(
    promotion: &'a Promotion,
    order: &'a OrderContext,
    usage: &UsageSnapshot,
    as_of: Timestamp,
) -> Result<Eligible<'a>, Ineligibility> {
    if promotion.effective_status(as_of) != PromotionStatus::Active {
        return Err(Ineligibility::NotFoundOrInactive);
    }

    if !promotion.window().contains(as_of) {
        return Err(Ineligibility::OutOfValidityWindow);
    }

    let conditions = promotion.conditions();
    let local = conditions.local(as_of);

    if !conditions.allows_day(&local) {
        return Err(Ineligibility::DayNotAllowed);
    }

    if !conditions.allows_time(&local) {
        return Err(Ineligibility::TimeNotAllowed);
    }

    if conditions.excludes_date(&local) {
        return Err(Ineligibility::DateExcluded);
    }

    if !promotion.targeting().admits(order.customer()) {
        return Err(Ineligibility::CustomerNotEligible);
    }

    if order.subtotal().to_minor_units() < promotion.min_order().to_minor_units() {
        return Err(Ineligibility::BelowMinOrder);
    }

    if !has_applicable_items(promotion, order) {
        return Err(Ineligibility::NoApplicableItems);
    }

    if !promotion.limits().allows_total(usage.total_used) {
        return Err(Ineligibility::GlobalLimitReached);
    }

    if order.customer().is_some() && !promotion.limits().allows_customer(usage.customer_used) {
        return Err(Ineligibility::CustomerLimitReached);
    }

    Ok(Eligible { promotion, order })
}

fn has_applicable_items(promotion: &Promotion, order: &OrderContext) -> bool {
    match promotion.kind() {
        PromotionKind::FreeShipping => true,
        PromotionKind::Bundle(bundle) => bundle
            .items()
            .iter()
            .all(|item| order.quantity_of(&item.product) >= u64::from(item.quantity.get())),
        _ => {
            let scope = promotion.scope();
            scope.is_all() || order.items().iter().any(|line| scope.matches(line))
        }
    }
}
