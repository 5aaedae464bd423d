//! Promotions
//!
//! A [`Promotion`] is the validated, immutable rule set of one promotion
//! version. It is built from a [`NewPromotion`] so that every constraint
//! between fields is checked once, at construction.

use std::fmt;

use jiff::Timestamp;
use rust_decimal::Decimal;
use rusty_money::iso::Currency;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    ids::{ProductId, TypedUuid},
    pricing::{Amount, zero},
};

pub mod kinds;
pub mod limits;
pub mod schedule;
pub mod scope;
pub mod status;
pub mod targeting;

use kinds::PromotionKind;
use limits::UsageLimits;
use schedule::{Conditions, ValidityWindow};
use scope::ProductScope;
use status::PromotionStatus;
use targeting::Targeting;

/// Promotion UUID
pub type PromotionUuid = TypedUuid<Promotion>;

/// Errors raised while constructing a promotion.
#[derive(Debug, Error)]
pub enum PromotionError {
    /// The validity window does not start before it ends.
    #[error("promotion must start before it ends")]
    InvalidWindow,

    /// A redemption code is blank.
    #[error("promotion code must not be blank")]
    BlankCode,

    /// A percentage is outside `(0, 100]`.
    #[error("percentage must be greater than 0 and at most 100, got {0}")]
    PercentOutOfRange(Decimal),

    /// An amount that must be strictly positive is not.
    #[error("{0} must be greater than zero")]
    NonPositiveAmount(&'static str),

    /// An amount that must not be negative is.
    #[error("{0} must not be negative")]
    NegativeAmount(&'static str),

    /// A money field uses a different currency from the promotion.
    #[error("{field} is in {found}, but the promotion is in {expected}")]
    CurrencyMismatch {
        /// Field in the wrong currency
        field: &'static str,

        /// Promotion currency
        expected: &'static str,

        /// Currency of the field
        found: &'static str,
    },

    /// A bundle without any products.
    #[error("bundle must contain at least one product")]
    EmptyBundle,

    /// A bundle that lists a product twice.
    #[error("bundle lists product {0} more than once")]
    DuplicateBundleProduct(ProductId),

    /// Specific-customer targeting without any customers.
    #[error("specific customer targeting requires at least one customer")]
    NoTargetCustomers,

    /// The timezone name is not in the timezone database.
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    /// A time of day is not `HH:mm`.
    #[error("invalid time of day: {0}")]
    InvalidTimeOfDay(String),

    /// A time-of-day window that starts when it ends.
    #[error("time-of-day window must not start and end at the same time")]
    InvalidTimeWindow,
}

/// Redemption code, compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PromotionCode(String);

impl PromotionCode {
    /// Normalise a human-entered code.
    ///
    /// # Errors
    ///
    /// Returns [`PromotionError::BlankCode`] if the code is empty after trimming.
    pub fn new(code: &str) -> Result<Self, PromotionError> {
        let code = code.trim();

        if code.is_empty() {
            return Err(PromotionError::BlankCode);
        }

        Ok(Self(code.to_uppercase()))
    }

    /// The normalised code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PromotionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PromotionCode {
    type Error = PromotionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<PromotionCode> for String {
    fn from(value: PromotionCode) -> Self {
        value.0
    }
}

/// Unvalidated promotion data.
#[derive(Debug, Clone)]
pub struct NewPromotion {
    /// Promotion UUID
    pub uuid: PromotionUuid,

    /// Optional redemption code
    pub code: Option<PromotionCode>,

    /// Display name
    pub name: String,

    /// Currency of every monetary field
    pub currency: &'static Currency,

    /// Discount kind and its parameters
    pub kind: PromotionKind,

    /// Minimum order subtotal; zero when unset
    pub min_order: Option<Amount>,

    /// Eligible products
    pub scope: ProductScope,

    /// Eligible customers
    pub targeting: Targeting,

    /// Usage limits
    pub limits: UsageLimits,

    /// First instant of validity
    pub starts_at: Timestamp,

    /// Last instant of validity
    pub ends_at: Timestamp,

    /// Calendar conditions
    pub conditions: Conditions,

    /// Reserved for multi-promotion resolution
    pub combinable: bool,

    /// Initial status
    pub status: PromotionStatus,
}

impl NewPromotion {
    /// Draft promotion data with default scope, targeting, limits and conditions.
    pub fn new(
        name: impl Into<String>,
        currency: &'static Currency,
        kind: PromotionKind,
        starts_at: Timestamp,
        ends_at: Timestamp,
    ) -> Self {
        Self {
            uuid: PromotionUuid::new(),
            code: None,
            name: name.into(),
            currency,
            kind,
            min_order: None,
            scope: ProductScope::all(),
            targeting: Targeting::All,
            limits: UsageLimits::default(),
            starts_at,
            ends_at,
            conditions: Conditions::default(),
            combinable: false,
            status: PromotionStatus::Draft,
        }
    }
}

/// Validated promotion
#[derive(Debug, Clone)]
pub struct Promotion {
    uuid: PromotionUuid,
    code: Option<PromotionCode>,
    name: String,
    currency: &'static Currency,
    kind: PromotionKind,
    min_order: Amount,
    scope: ProductScope,
    targeting: Targeting,
    limits: UsageLimits,
    window: ValidityWindow,
    conditions: Conditions,
    combinable: bool,
    status: PromotionStatus,
}

impl TryFrom<NewPromotion> for Promotion {
    type Error = PromotionError;

    fn try_from(new: NewPromotion) -> Result<Self, Self::Error> {
        let window = ValidityWindow::new(new.starts_at, new.ends_at)?;

        new.kind.validate()?;

        let min_order = new.min_order.unwrap_or_else(|| zero(new.currency));

        if min_order.to_minor_units() < 0 {
            return Err(PromotionError::NegativeAmount("minimum order amount"));
        }

        std::iter::once(("minimum order amount", &min_order))
            .chain(new.kind.amounts())
            .try_for_each(|(field, amount)| {
                if amount.currency() == new.currency {
                    Ok(())
                } else {
                    Err(PromotionError::CurrencyMismatch {
                        field,
                        expected: new.currency.iso_alpha_code,
                        found: amount.currency().iso_alpha_code,
                    })
                }
            })?;

        if matches!(&new.targeting, Targeting::SpecificCustomers(ids) if ids.is_empty()) {
            return Err(PromotionError::NoTargetCustomers);
        }

        Ok(Self {
            uuid: new.uuid,
            code: new.code,
            name: new.name,
            currency: new.currency,
            kind: new.kind,
            min_order,
            scope: new.scope,
            targeting: new.targeting,
            limits: new.limits,
            window,
            conditions: new.conditions,
            combinable: new.combinable,
            status: new.status,
        })
    }
}

impl Promotion {
    /// Promotion UUID.
    pub fn uuid(&self) -> PromotionUuid {
        self.uuid
    }

    /// Redemption code, if the promotion has one.
    pub fn code(&self) -> Option<&PromotionCode> {
        self.code.as_ref()
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Currency of every monetary field.
    pub fn currency(&self) -> &'static Currency {
        self.currency
    }

    /// Discount kind.
    pub fn kind(&self) -> &PromotionKind {
        &self.kind
    }

    /// Minimum order subtotal.
    pub fn min_order(&self) -> &Amount {
        &self.min_order
    }

    /// Eligible products.
    pub fn scope(&self) -> &ProductScope {
        &self.scope
    }

    /// Eligible customers.
    pub fn targeting(&self) -> &Targeting {
        &self.targeting
    }

    /// Usage limits.
    pub fn limits(&self) -> &UsageLimits {
        &self.limits
    }

    /// Validity window.
    pub fn window(&self) -> &ValidityWindow {
        &self.window
    }

    /// Calendar conditions.
    pub fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    /// Whether the promotion may be combined with others. Not consumed yet.
    pub fn combinable(&self) -> bool {
        self.combinable
    }

    /// Stored status; may lag behind date-based expiry.
    pub fn status(&self) -> PromotionStatus {
        self.status
    }

    /// Status with date-based expiry applied at `now`.
    pub fn effective_status(&self, now: Timestamp) -> PromotionStatus {
        self.status.effective(&self.window, now)
    }

    /// The same promotion with a new stored status.
    #[must_use]
    pub fn with_status(mut self, status: PromotionStatus) -> Self {
        self.status = status;
        self
    }
}
