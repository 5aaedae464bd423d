//! Postgres usage store
//!
//! The promotion's usage row is locked for the whole commit transaction, so
//! commits against one promotion are serialised by the database. Limits are
//! enforced by conditional updates that return no row once exhausted.
//! Closing a promotion locks the same row.

use std::time::Duration;

use async_trait::async_trait;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use rusty_money::{Money, iso};
use sqlx::{
    PgPool, Row,
    migrate::Migrator,
    postgres::{PgRow, PgTransaction},
    query,
};
use tracing::{Span, info, warn};
use uuid::Uuid;

use crate::{
    eligibility::UsageSnapshot,
    ids::{CustomerId, OrderId},
    ledger::{
        CloseOutcome, CommitOutcome, CommitRequest, LedgerError, LedgerRejection, RedemptionRecord,
        RedemptionUuid, UsageStore,
    },
    promotions::PromotionUuid,
};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Postgres error code raised when `lock_timeout` expires.
const LOCK_NOT_AVAILABLE: &str = "55P03";

const SET_LOCK_TIMEOUT_SQL: &str = include_str!("sql/set_lock_timeout.sql");
const ENSURE_PROMOTION_USAGE_SQL: &str = include_str!("sql/ensure_promotion_usage.sql");
const LOCK_PROMOTION_USAGE_SQL: &str = include_str!("sql/lock_promotion_usage.sql");
const INCREMENT_TOTAL_SQL: &str = include_str!("sql/increment_total.sql");
const INCREMENT_CUSTOMER_SQL: &str = include_str!("sql/increment_customer.sql");
const INSERT_REDEMPTION_SQL: &str = include_str!("sql/insert_redemption.sql");
const FIND_REDEMPTION_SQL: &str = include_str!("sql/find_redemption.sql");
const LIST_REDEMPTIONS_SQL: &str = include_str!("sql/list_redemptions.sql");
const USAGE_SQL: &str = include_str!("sql/usage.sql");
const CLOSE_PROMOTION_USAGE_SQL: &str = include_str!("sql/close_promotion_usage.sql");
const REOPEN_PROMOTION_USAGE_SQL: &str = include_str!("sql/reopen_promotion_usage.sql");

/// PostgreSQL-backed usage store.
#[derive(Debug, Clone)]
pub struct PgUsageStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgUsageStore {
    /// Create a store on an existing pool.
    #[must_use]
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Connect to `PostgreSQL`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(database_url: &str, lock_timeout: Duration) -> Result<Self, LedgerError> {
        Ok(Self::new(PgPool::connect(database_url).await?, lock_timeout))
    }

    /// Apply the ledger schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<(), LedgerError> {
        MIGRATOR.run(&self.pool).await?;

        Ok(())
    }

    fn lock_timeout_setting(&self) -> String {
        format!("{}ms", self.lock_timeout.as_millis())
    }

    /// Begin a transaction holding the promotion's usage row lock.
    async fn lock(
        &self,
        promotion: Uuid,
    ) -> Result<(PgTransaction<'static>, PgRow), LedgerError> {
        let mut tx = self.pool.begin().await?;

        query(SET_LOCK_TIMEOUT_SQL)
            .bind(self.lock_timeout_setting())
            .execute(&mut *tx)
            .await?;

        query(ENSURE_PROMOTION_USAGE_SQL)
            .bind(promotion)
            .execute(&mut *tx)
            .await?;

        let row = query(LOCK_PROMOTION_USAGE_SQL)
            .bind(promotion)
            .fetch_one(&mut *tx)
            .await?;

        Ok((tx, row))
    }

    async fn close(&self, promotion: Uuid) -> Result<CloseOutcome, LedgerError> {
        let (mut tx, row) = self.lock(promotion).await?;
        let total_used: i64 = row.try_get("total_used")?;

        if total_used > 0 {
            tx.rollback().await?;

            return Ok(CloseOutcome::InUse {
                used: u64::try_from(total_used)
                    .map_err(|_err| LedgerError::CounterOutOfRange("total_used"))?,
            });
        }

        query(CLOSE_PROMOTION_USAGE_SQL)
            .bind(promotion)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(CloseOutcome::Closed)
    }

    async fn commit(&self, request: CommitRequest) -> Result<CommitOutcome, LedgerError> {
        let promotion = request.promotion.into_uuid();
        let (mut tx, row) = self.lock(promotion).await?;

        if row.try_get::<bool, _>("closed")? {
            tx.rollback().await?;

            return Ok(CommitOutcome::Rejected(LedgerRejection::Closed));
        }

        let existing = query(FIND_REDEMPTION_SQL)
            .bind(promotion)
            .bind(request.order.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(row) = existing {
            tx.rollback().await?;

            return Ok(CommitOutcome::Committed {
                record: redemption_from_row(&row)?,
                replayed: true,
            });
        }

        let total_limit = request
            .limits
            .total
            .map(|limit| i64::try_from(limit.get()).unwrap_or(i64::MAX));

        let total = query(INCREMENT_TOTAL_SQL)
            .bind(promotion)
            .bind(total_limit)
            .fetch_optional(&mut *tx)
            .await?;

        if total.is_none() {
            tx.rollback().await?;

            return Ok(CommitOutcome::Rejected(LedgerRejection::GlobalLimitReached));
        }

        let per_customer = i32::try_from(request.limits.per_customer.get()).unwrap_or(i32::MAX);

        let customer = query(INCREMENT_CUSTOMER_SQL)
            .bind(promotion)
            .bind(request.customer.as_str())
            .bind(per_customer)
            .fetch_optional(&mut *tx)
            .await?;

        if customer.is_none() {
            tx.rollback().await?;

            return Ok(CommitOutcome::Rejected(
                LedgerRejection::CustomerLimitReached,
            ));
        }

        let record = request.into_record();

        query(INSERT_REDEMPTION_SQL)
            .bind(record.uuid.into_uuid())
            .bind(promotion)
            .bind(record.customer.as_str())
            .bind(record.order.as_str())
            .bind(SqlxTimestamp::from(record.redeemed_at))
            .bind(record.discount.to_minor_units())
            .bind(record.discount.currency().iso_alpha_code)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(CommitOutcome::Committed {
            record,
            replayed: false,
        })
    }
}

#[async_trait]
impl UsageStore for PgUsageStore {
    async fn usage(
        &self,
        promotion: PromotionUuid,
        customer: Option<CustomerId>,
    ) -> Result<UsageSnapshot, LedgerError> {
        let row = query(USAGE_SQL)
            .bind(promotion.into_uuid())
            .bind(customer.as_ref().map(CustomerId::as_str))
            .fetch_one(&self.pool)
            .await?;

        let total_used: i64 = row.try_get("total_used")?;
        let customer_used: i32 = row.try_get("customer_used")?;

        Ok(UsageSnapshot {
            total_used: u64::try_from(total_used)
                .map_err(|_err| LedgerError::CounterOutOfRange("total_used"))?,
            customer_used: u32::try_from(customer_used)
                .map_err(|_err| LedgerError::CounterOutOfRange("customer_used"))?,
        })
    }

    async fn find_redemption(
        &self,
        promotion: PromotionUuid,
        order: OrderId,
    ) -> Result<Option<RedemptionRecord>, LedgerError> {
        query(FIND_REDEMPTION_SQL)
            .bind(promotion.into_uuid())
            .bind(order.as_str())
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(redemption_from_row)
            .transpose()
    }

    async fn redemptions(
        &self,
        promotion: PromotionUuid,
    ) -> Result<Vec<RedemptionRecord>, LedgerError> {
        query(LIST_REDEMPTIONS_SQL)
            .bind(promotion.into_uuid())
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(redemption_from_row)
            .collect()
    }

    #[tracing::instrument(
        name = "ledger.postgres.try_commit",
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

        let outcome = match self.commit(request).await {
            Err(LedgerError::Sql(error)) if is_lock_timeout(&error) => {
                warn!(
                    timeout_ms = self.lock_timeout.as_millis(),
                    "timed out waiting for promotion lock"
                );

                CommitOutcome::Rejected(LedgerRejection::Timeout)
            }
            result => result?,
        };

        match &outcome {
            CommitOutcome::Committed {
                record,
                replayed: false,
            } => {
                span.record("outcome", "committed");
                info!(redemption_uuid = %record.uuid, "committed redemption");
            }
            CommitOutcome::Committed { .. } => {
                span.record("outcome", "replayed");
            }
            CommitOutcome::Rejected(rejection) => {
                span.record("outcome", rejection.code());
            }
        }

        Ok(outcome)
    }

    #[tracing::instrument(
        name = "ledger.postgres.close_if_unused",
        skip(self, promotion),
        fields(promotion_uuid = %promotion),
        err
    )]
    async fn close_if_unused(&self, promotion: PromotionUuid) -> Result<CloseOutcome, LedgerError> {
        match self.close(promotion.into_uuid()).await {
            Err(LedgerError::Sql(error)) if is_lock_timeout(&error) => {
                warn!(
                    timeout_ms = self.lock_timeout.as_millis(),
                    "timed out waiting for promotion lock"
                );

                Ok(CloseOutcome::Timeout)
            }
            result => result,
        }
    }

    async fn reopen(&self, promotion: PromotionUuid) -> Result<(), LedgerError> {
        query(REOPEN_PROMOTION_USAGE_SQL)
            .bind(promotion.into_uuid())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn is_lock_timeout(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|error| error.code())
        .is_some_and(|code| code == LOCK_NOT_AVAILABLE)
}

fn redemption_from_row(row: &PgRow) -> Result<RedemptionRecord, LedgerError> {
    let currency: String = row.try_get("currency")?;
    let currency =
        iso::find(currency.trim()).ok_or_else(|| LedgerError::UnknownCurrency(currency.clone()))?;

    Ok(RedemptionRecord {
        uuid: RedemptionUuid::from_uuid(row.try_get::<Uuid, _>("uuid")?),
        promotion: PromotionUuid::from_uuid(row.try_get::<Uuid, _>("promotion_uuid")?),
        customer: CustomerId::new(row.try_get::<String, _>("customer_id")?),
        order: OrderId::new(row.try_get::<String, _>("order_id")?),
        redeemed_at: row.try_get::<SqlxTimestamp, _>("redeemed_at")?.to_jiff(),
        discount: Money::from_minor(row.try_get::<i64, _>("discount_minor")?, currency),
    })
}
