//! Redemption errors.

use thiserror::Error;

use crate::{
    catalog::CatalogError, customers::ClassifierError, discounts::DiscountError,
    eligibility::Ineligibility, ledger::LedgerError, orders::OrderError,
    promotions::status::TransitionError,
};

/// Errors returned by the redemption coordinator.
#[derive(Debug, Error)]
pub enum RedemptionError {
    /// The promotion does not apply to the order.
    #[error(transparent)]
    Ineligible(#[from] Ineligibility),

    /// The ledger could not lock the promotion in time; the request may be retried.
    #[error("usage ledger is busy, try again")]
    LedgerTimeout,

    /// The order is priced in a different currency from the promotion.
    #[error("order is in {order}, but the promotion is in {promotion}")]
    CurrencyMismatch {
        /// Promotion currency
        promotion: &'static str,

        /// Order currency
        order: &'static str,
    },

    /// The order context is malformed.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Discount calculation failed.
    #[error(transparent)]
    Discount(#[from] DiscountError),

    /// A lifecycle action was refused.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Customer classification failed.
    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    /// Catalog failure.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Usage ledger failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl RedemptionError {
    /// Machine-readable reason code.
    #[must_use]
    pub const fn reason_code(&self) -> &'static str {
        match self {
            Self::Ineligible(reason) => reason.code(),
            Self::Catalog(CatalogError::NotFound(_)) => Ineligibility::NotFoundOrInactive.code(),
            Self::LedgerTimeout => "LEDGER_TIMEOUT",
            Self::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            Self::Order(_) => "INVALID_ORDER",
            Self::Transition(_) => "INVALID_TRANSITION",
            Self::Classifier(_) => "CLASSIFICATION_UNAVAILABLE",
            Self::Catalog(_) => "CONFLICT",
            Self::Discount(_) | Self::Ledger(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status an API layer should answer with.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Ineligible(reason) => reason.http_status(),
            Self::Catalog(CatalogError::NotFound(_)) => 404,
            Self::Order(_) => 400,
            Self::CurrencyMismatch { .. } => 422,
            Self::Transition(_) | Self::Catalog(_) => 409,
            Self::LedgerTimeout | Self::Classifier(_) => 503,
            Self::Discount(_) | Self::Ledger(_) => 500,
        }
    }
}
