//! In-memory usage store
//!
//! Each promotion has its own mutex, so commits against one promotion are
//! serialised while commits against different promotions proceed in parallel.
//! Closing a promotion takes the same mutex.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tokio::{
    sync::{Mutex, OwnedMutexGuard, RwLock},
    time::timeout,
};
use tracing::{Span, debug, info, warn};

use crate::{
    eligibility::UsageSnapshot,
    ids::{CustomerId, OrderId},
    ledger::{
        CloseOutcome, CommitOutcome, CommitRequest, LedgerError, LedgerRejection, PromotionUsage,
        RedemptionRecord, UsageStore,
    },
    promotions::PromotionUuid,
};

/// Default time a commit waits for a promotion's lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, Default)]
struct PromotionLedger {
    usage: PromotionUsage,
    records: Vec<RedemptionRecord>,
    by_order: FxHashMap<OrderId, usize>,
    closed: bool,
}

impl PromotionLedger {
    fn find(&self, order: &OrderId) -> Option<&RedemptionRecord> {
        self.by_order
            .get(order)
            .and_then(|index| self.records.get(*index))
    }

    fn push(&mut self, record: RedemptionRecord) {
        self.usage.record(&record.customer);
        self.by_order.insert(record.order.clone(), self.records.len());
        self.records.push(record);
    }
}

/// Usage store held in process memory.
#[derive(Debug)]
pub struct InMemoryUsageStore {
    promotions: RwLock<FxHashMap<PromotionUuid, Arc<Mutex<PromotionLedger>>>>,
    lock_timeout: Duration,
}

impl Default for InMemoryUsageStore {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

impl InMemoryUsageStore {
    /// Create an empty store whose commits wait at most `lock_timeout` for a
    /// promotion's lock.
    #[must_use]
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            promotions: RwLock::new(FxHashMap::default()),
            lock_timeout,
        }
    }

    async fn existing(&self, promotion: PromotionUuid) -> Option<Arc<Mutex<PromotionLedger>>> {
        self.promotions.read().await.get(&promotion).cloned()
    }

    async fn entry(&self, promotion: PromotionUuid) -> Arc<Mutex<PromotionLedger>> {
        if let Some(ledger) = self.existing(promotion).await {
            return ledger;
        }

        Arc::clone(self.promotions.write().await.entry(promotion).or_default())
    }

    async fn lock(&self, promotion: PromotionUuid) -> Option<OwnedMutexGuard<PromotionLedger>> {
        let ledger = self.entry(promotion).await;

        if let Ok(guard) = timeout(self.lock_timeout, ledger.lock_owned()).await {
            return Some(guard);
        }

        warn!(
            timeout_ms = self.lock_timeout.as_millis(),
            "timed out waiting for promotion lock"
        );

        None
    }
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn usage(
        &self,
        promotion: PromotionUuid,
        customer: Option<CustomerId>,
    ) -> Result<UsageSnapshot, LedgerError> {
        let Some(ledger) = self.existing(promotion).await else {
            return Ok(UsageSnapshot::default());
        };

        Ok(ledger.lock().await.usage.snapshot(customer.as_ref()))
    }

    async fn find_redemption(
        &self,
        promotion: PromotionUuid,
        order: OrderId,
    ) -> Result<Option<RedemptionRecord>, LedgerError> {
        let Some(ledger) = self.existing(promotion).await else {
            return Ok(None);
        };

        Ok(ledger.lock().await.find(&order).cloned())
    }

    async fn redemptions(
        &self,
        promotion: PromotionUuid,
    ) -> Result<Vec<RedemptionRecord>, LedgerError> {
        let Some(ledger) = self.existing(promotion).await else {
            return Ok(Vec::new());
        };

        Ok(ledger.lock().await.records.clone())
    }

    #[tracing::instrument(
        name = "ledger.memory.try_commit",
        skip(self, request),
        fields(
            promotion_uuid = %request.promotion,
            order_id = %request.order,
            outcome = tracing::field::Empty
        ),
        err
    )]
    async fn try_commit(&self, request: CommitRequest) -> Result<CommitOutcome, LedgerError> {
        let span = Span::current();

        let Some(mut ledger) = self.lock(request.promotion).await else {
            span.record("outcome", LedgerRejection::Timeout.code());

            return Ok(CommitOutcome::Rejected(LedgerRejection::Timeout));
        };

        if ledger.closed {
            span.record("outcome", LedgerRejection::Closed.code());

            return Ok(CommitOutcome::Rejected(LedgerRejection::Closed));
        }

        if let Some(record) = ledger.find(&request.order) {
            debug!(redemption_uuid = %record.uuid, "order already committed");
            span.record("outcome", "replayed");

            return Ok(CommitOutcome::Committed {
                record: record.clone(),
                replayed: true,
            });
        }

        let rejection = if !request.limits.allows_total(ledger.usage.total_used) {
            Some(LedgerRejection::GlobalLimitReached)
        } else if !request
            .limits
            .allows_customer(ledger.usage.customer_used(&request.customer))
        {
            Some(LedgerRejection::CustomerLimitReached)
        } else {
            None
        };

        if let Some(rejection) = rejection {
            span.record("outcome", rejection.code());

            return Ok(CommitOutcome::Rejected(rejection));
        }

        let record = request.into_record();
        ledger.push(record.clone());

        span.record("outcome", "committed");
        info!(
            redemption_uuid = %record.uuid,
            total_used = ledger.usage.total_used,
            "committed redemption"
        );

        Ok(CommitOutcome::Committed {
            record,
            replayed: false,
        })
    }

    #[tracing::instrument(
        name = "ledger.memory.close_if_unused",
        skip(self, promotion),
        fields(promotion_uuid = %promotion),
        err
    )]
    async fn close_if_unused(&self, promotion: PromotionUuid) -> Result<CloseOutcome, LedgerError> {
        let Some(mut ledger) = self.lock(promotion).await else {
            return Ok(CloseOutcome::Timeout);
        };

        let used = ledger.usage.total_used;

        if used > 0 {
            return Ok(CloseOutcome::InUse { used });
        }

        ledger.closed = true;
        debug!("closed promotion ledger");

        Ok(CloseOutcome::Closed)
    }

    async fn reopen(&self, promotion: PromotionUuid) -> Result<(), LedgerError> {
        if let Some(ledger) = self.existing(promotion).await {
            ledger.lock().await.closed = false;
        }

        Ok(())
    }
}
