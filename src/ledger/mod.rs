//! Usage Ledger
//!
//! Global and per-customer redemption counters. Committing a redemption is a
//! single atomic check-and-increment: a rejected commit leaves no trace, and
//! a repeated commit for the same order returns the stored redemption.
//! Closing a promotion takes the same lock, so a cancellation and a commit
//! can never both succeed.

use async_trait::async_trait;
use jiff::Timestamp;
use mockall::automock;
use rustc_hash::FxHashMap;
use serde::Serialize;
use thiserror::Error;

use crate::{
    eligibility::{Ineligibility, UsageSnapshot},
    ids::{CustomerId, OrderId, TypedUuid},
    pricing::Amount,
    promotions::{PromotionUuid, limits::UsageLimits},
};

mod memory;
mod postgres;

pub use memory::InMemoryUsageStore;
pub use postgres::PgUsageStore;

/// Redemption UUID
pub type RedemptionUuid = TypedUuid<RedemptionRecord>;

/// Errors raised by a usage store.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Storage failure.
    #[error("storage error")]
    Sql(#[from] sqlx::Error),

    /// Schema migration failure.
    #[error("migration error")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// A stored amount uses a currency this build does not know.
    #[error("stored redemption has unknown currency {0}")]
    UnknownCurrency(String),

    /// A stored counter does not fit its type.
    #[error("stored counter {0} is out of range")]
    CounterOutOfRange(&'static str),
}

/// One committed redemption.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedemptionRecord {
    /// Redemption UUID
    pub uuid: RedemptionUuid,

    /// Redeemed promotion
    pub promotion: PromotionUuid,

    /// Redeeming customer
    pub customer: CustomerId,

    /// Order the promotion was applied to
    pub order: OrderId,

    /// When the redemption was committed
    pub redeemed_at: Timestamp,

    /// Discount granted, in minor units
    #[serde(serialize_with = "crate::pricing::serialize_minor")]
    pub discount: Amount,
}

/// A redemption to commit.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitRequest {
    /// Promotion being redeemed
    pub promotion: PromotionUuid,

    /// Redeeming customer
    pub customer: CustomerId,

    /// Order the promotion is applied to
    pub order: OrderId,

    /// Discount granted
    pub discount: Amount,

    /// Limits to enforce, taken from the promotion at evaluation time
    pub limits: UsageLimits,

    /// Commit time
    pub at: Timestamp,
}

impl CommitRequest {
    fn into_record(self) -> RedemptionRecord {
        RedemptionRecord {
            uuid: RedemptionUuid::new(),
            promotion: self.promotion,
            customer: self.customer,
            order: self.order,
            redeemed_at: self.at,
            discount: self.discount,
        }
    }
}

/// Reasons a store refuses a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerRejection {
    /// The global usage limit is exhausted.
    GlobalLimitReached,

    /// The customer's usage limit is exhausted.
    CustomerLimitReached,

    /// The promotion was closed to further redemptions.
    Closed,

    /// The promotion's lock could not be acquired in time.
    Timeout,
}

impl LedgerRejection {
    /// Reason code exposed to API consumers.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::GlobalLimitReached => Ineligibility::GlobalLimitReached.code(),
            Self::CustomerLimitReached => Ineligibility::CustomerLimitReached.code(),
            Self::Closed => Ineligibility::NotFoundOrInactive.code(),
            Self::Timeout => "LEDGER_TIMEOUT",
        }
    }
}

/// Result of a commit attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// The redemption is recorded.
    Committed {
        /// Stored redemption
        record: RedemptionRecord,

        /// Whether the order had already been committed
        replayed: bool,
    },

    /// Nothing was recorded.
    Rejected(LedgerRejection),
}

/// Result of closing a promotion to further commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The promotion had no redemptions and now refuses commits.
    Closed,

    /// The promotion has been redeemed; nothing changed.
    InUse {
        /// Redemptions committed so far
        used: u64,
    },

    /// The promotion's lock could not be acquired in time.
    Timeout,
}

/// Usage counters of one promotion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromotionUsage {
    /// Redemptions across all customers
    pub total_used: u64,

    /// Redemptions per customer
    pub per_customer: FxHashMap<CustomerId, u32>,
}

impl PromotionUsage {
    /// Rebuild counters from redemption records.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a RedemptionRecord>) -> Self {
        records
            .into_iter()
            .fold(Self::default(), |mut usage, record| {
                usage.record(&record.customer);
                usage
            })
    }

    /// Redemptions by `customer`.
    pub fn customer_used(&self, customer: &CustomerId) -> u32 {
        self.per_customer.get(customer).copied().unwrap_or_default()
    }

    /// Counters as seen by the given customer, or an anonymous order.
    pub fn snapshot(&self, customer: Option<&CustomerId>) -> UsageSnapshot {
        UsageSnapshot {
            total_used: self.total_used,
            customer_used: customer.map_or(0, |customer| self.customer_used(customer)),
        }
    }

    pub(crate) fn record(&mut self, customer: &CustomerId) {
        self.total_used = self.total_used.saturating_add(1);

        let used = self.per_customer.entry(customer.clone()).or_default();
        *used = used.saturating_add(1);
    }
}

/// Storage of usage counters and redemption records.
#[automock]
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Current counters of a promotion, as seen by `customer`.
    async fn usage(
        &self,
        promotion: PromotionUuid,
        customer: Option<CustomerId>,
    ) -> Result<UsageSnapshot, LedgerError>;

    /// Redemption previously committed for an order.
    async fn find_redemption(
        &self,
        promotion: PromotionUuid,
        order: OrderId,
    ) -> Result<Option<RedemptionRecord>, LedgerError>;

    /// Every redemption of a promotion, oldest first.
    async fn redemptions(&self, promotion: PromotionUuid)
    -> Result<Vec<RedemptionRecord>, LedgerError>;

    /// Atomically check the limits and record a redemption.
    async fn try_commit(&self, request: CommitRequest) -> Result<CommitOutcome, LedgerError>;

    /// Refuse all further commits, provided nothing was ever committed.
    ///
    /// The usage check and the close happen under the lock commits take, so
    /// a commit either lands first and the close reports it, or is rejected
    /// with [`LedgerRejection::Closed`].
    async fn close_if_unused(&self, promotion: PromotionUuid) -> Result<CloseOutcome, LedgerError>;

    /// Accept commits again after [`UsageStore::close_if_unused`].
    async fn reopen(&self, promotion: PromotionUuid) -> Result<(), LedgerError>;
}
