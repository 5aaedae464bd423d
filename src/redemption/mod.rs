//! Redemption Coordinator
//!
//! Orchestrates validation and commit of promotions against orders, the
//! manual lifecycle actions, and the expiry sweep. This is the only component
//! besides the ledger with side effects.

use std::{fmt, sync::Arc};

use serde::Serialize;
use tracing::{Span, debug, info, warn};

use crate::{
    catalog::{CatalogError, PromotionCatalog},
    clock::Clock,
    customers::CustomerClassifier,
    discounts::{DiscountOutcome, calculate},
    eligibility::{Ineligibility, evaluate},
    ids::{CustomerId, OrderId},
    ledger::{
        CloseOutcome, CommitOutcome, CommitRequest, LedgerRejection, RedemptionRecord, UsageStore,
    },
    orders::{CustomerProfile, LineItem, OrderContext},
    pricing::Amount,
    promotions::{
        Promotion, PromotionCode, PromotionUuid,
        status::{PromotionStatus, StatusAction, TransitionError},
    },
};

mod errors;

pub use errors::RedemptionError;

/// A validate-only request, as received at `POST /promotions/validate/{code}`.
#[derive(Debug, Clone)]
pub struct ValidateRequest {
    /// Redemption code as entered
    pub code: String,

    /// Customer placing the order, if signed in
    pub customer: Option<CustomerId>,

    /// Order subtotal
    pub subtotal: Amount,

    /// Order lines
    pub items: Vec<LineItem>,

    /// Shipping cost, for free-shipping promotions
    pub shipping: Option<Amount>,
}

/// Outcome of a successful validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Validation {
    /// Promotion UUID
    pub promotion: PromotionUuid,

    /// Normalised redemption code
    pub code: PromotionCode,

    /// Promotion name
    pub name: String,

    /// Discount the order would receive
    pub discount: DiscountOutcome,

    /// Redemptions left under the global limit, if there is one
    pub remaining_usage: Option<u64>,

    /// Redemptions left for the customer; unset for anonymous requests
    pub remaining_for_customer: Option<u32>,
}

/// A redemption to commit once the order is placed.
#[derive(Debug, Clone)]
pub struct CommitRedemption {
    /// Promotion to redeem
    pub promotion: PromotionUuid,

    /// Customer placing the order
    pub customer: CustomerId,

    /// Order identifier, the idempotency key of the commit
    pub order_id: OrderId,

    /// The order
    pub order: OrderContext,

    /// Shipping cost, for free-shipping promotions
    pub shipping: Option<Amount>,
}

/// A committed redemption.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Redemption {
    /// Stored redemption
    pub record: RedemptionRecord,

    /// Whether the order had already been committed
    pub replayed: bool,
}

/// Redemption coordinator
#[derive(Clone)]
pub struct RedemptionCoordinator {
    catalog: Arc<dyn PromotionCatalog>,
    ledger: Arc<dyn UsageStore>,
    customers: Arc<dyn CustomerClassifier>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for RedemptionCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedemptionCoordinator")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl RedemptionCoordinator {
    /// Create a coordinator over its collaborators.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn PromotionCatalog>,
        ledger: Arc<dyn UsageStore>,
        customers: Arc<dyn CustomerClassifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            customers,
            clock,
        }
    }

    /// Check a code against an order without recording anything.
    ///
    /// # Errors
    ///
    /// Returns [`RedemptionError::Ineligible`] with the first failing reason,
    /// or another [`RedemptionError`] if a collaborator fails.
    #[tracing::instrument(
        name = "redemption.validate",
        skip(self, request),
        fields(
            code = %request.code,
            customer_id = tracing::field::Empty,
            promotion_uuid = tracing::field::Empty,
            discount_minor = tracing::field::Empty
        ),
        err
    )]
    pub async fn validate(&self, request: ValidateRequest) -> Result<Validation, RedemptionError> {
        let span = Span::current();

        if let Some(customer) = &request.customer {
            span.record("customer_id", tracing::field::display(customer));
        }

        let code = PromotionCode::new(&request.code).map_err(|_err| Ineligibility::NotFoundOrInactive)?;

        let promotion = self
            .catalog
            .find_by_code(code.clone())
            .await?
            .ok_or(Ineligibility::NotFoundOrInactive)?;

        span.record("promotion_uuid", tracing::field::display(promotion.uuid()));

        let order = OrderContext::new(request.subtotal, request.items, None)?;

        ensure_currency(&promotion, &order)?;

        let profile = match request.customer {
            Some(customer) => Some(self.profile(&promotion, customer).await?),
            None => None,
        };

        let customer = profile.as_ref().map(|profile| profile.id.clone());
        let order = order.with_customer(profile);

        let now = self.clock.now();
        let usage = self.ledger.usage(promotion.uuid(), customer.clone()).await?;

        let eligible = evaluate(&promotion, &order, &usage, now)?;
        let discount = calculate(&eligible, request.shipping)?;

        span.record("discount_minor", discount.amount.to_minor_units());

        let limits = promotion.limits();

        Ok(Validation {
            promotion: promotion.uuid(),
            code,
            name: promotion.name().to_string(),
            discount,
            remaining_usage: limits.remaining_total(usage.total_used),
            remaining_for_customer: customer
                .map(|_| limits.remaining_for_customer(usage.customer_used)),
        })
    }

    /// Record a redemption for a placed order.
    ///
    /// Committing an order twice returns the first redemption with
    /// `replayed` set and does not count it again.
    ///
    /// # Errors
    ///
    /// Returns [`RedemptionError::Ineligible`] if the promotion no longer
    /// applies or a limit was reached concurrently, and
    /// [`RedemptionError::LedgerTimeout`] if the ledger was too busy.
    #[tracing::instrument(
        name = "redemption.commit",
        skip(self, request),
        fields(
            promotion_uuid = %request.promotion,
            customer_id = %request.customer,
            order_id = %request.order_id,
            outcome = tracing::field::Empty
        ),
        err
    )]
    pub async fn commit(&self, request: CommitRedemption) -> Result<Redemption, RedemptionError> {
        let span = Span::current();

        let promotion = self
            .catalog
            .get(request.promotion)
            .await?
            .ok_or(Ineligibility::NotFoundOrInactive)?;

        if let Some(record) = self
            .ledger
            .find_redemption(promotion.uuid(), request.order_id.clone())
            .await?
        {
            debug!(redemption_uuid = %record.uuid, "order already redeemed");
            span.record("outcome", "replayed");

            return Ok(Redemption {
                record,
                replayed: true,
            });
        }

        ensure_currency(&promotion, &request.order)?;

        let profile = self.profile(&promotion, request.customer.clone()).await?;
        let order = request.order.with_customer(Some(profile));

        let now = self.clock.now();
        let usage = self
            .ledger
            .usage(promotion.uuid(), Some(request.customer.clone()))
            .await?;

        let eligible = evaluate(&promotion, &order, &usage, now)?;
        let discount = calculate(&eligible, request.shipping)?;

        let outcome = self
            .ledger
            .try_commit(CommitRequest {
                promotion: promotion.uuid(),
                customer: request.customer,
                order: request.order_id,
                discount: discount.amount,
                limits: *promotion.limits(),
                at: now,
            })
            .await?;

        match outcome {
            CommitOutcome::Committed { record, replayed } => {
                span.record("outcome", if replayed { "replayed" } else { "committed" });
                info!(
                    redemption_uuid = %record.uuid,
                    discount_minor = record.discount.to_minor_units(),
                    "redeemed promotion"
                );

                Ok(Redemption { record, replayed })
            }
            CommitOutcome::Rejected(rejection) => {
                span.record("outcome", rejection.code());

                Err(match rejection {
                    LedgerRejection::GlobalLimitReached => Ineligibility::GlobalLimitReached.into(),
                    LedgerRejection::CustomerLimitReached => {
                        Ineligibility::CustomerLimitReached.into()
                    }
                    LedgerRejection::Closed => Ineligibility::NotFoundOrInactive.into(),
                    LedgerRejection::Timeout => {
                        warn!("ledger timed out, redemption not recorded");

                        RedemptionError::LedgerTimeout
                    }
                })
            }
        }
    }

    /// Approve a draft promotion.
    ///
    /// # Errors
    ///
    /// Returns an error if the promotion is unknown or not a draft.
    pub async fn approve(&self, uuid: PromotionUuid) -> Result<Promotion, RedemptionError> {
        self.transition(uuid, StatusAction::Approve).await
    }

    /// Pause an active promotion.
    ///
    /// # Errors
    ///
    /// Returns an error if the promotion is unknown or not active.
    pub async fn pause(&self, uuid: PromotionUuid) -> Result<Promotion, RedemptionError> {
        self.transition(uuid, StatusAction::Pause).await
    }

    /// Resume a paused promotion.
    ///
    /// # Errors
    ///
    /// Returns an error if the promotion is unknown or not paused.
    pub async fn resume(&self, uuid: PromotionUuid) -> Result<Promotion, RedemptionError> {
        self.transition(uuid, StatusAction::Resume).await
    }

    /// Cancel a promotion that has never been redeemed.
    ///
    /// # Errors
    ///
    /// Returns an error if the promotion is unknown, terminal, or already used.
    pub async fn cancel(&self, uuid: PromotionUuid) -> Result<Promotion, RedemptionError> {
        self.transition(uuid, StatusAction::Cancel).await
    }

    /// Every promotion, with date-based expiry applied to its status.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read.
    pub async fn promotions(&self) -> Result<Vec<Promotion>, RedemptionError> {
        let now = self.clock.now();

        Ok(self
            .catalog
            .list()
            .await?
            .into_iter()
            .map(|promotion| {
                let status = promotion.effective_status(now);
                promotion.with_status(status)
            })
            .collect())
    }

    /// Persist the expired status of every promotion whose window has passed.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read or updated.
    #[tracing::instrument(
        name = "redemption.sweep_expired",
        skip(self),
        fields(expired = tracing::field::Empty),
        err
    )]
    pub async fn sweep_expired(&self) -> Result<Vec<PromotionUuid>, RedemptionError> {
        let now = self.clock.now();
        let mut expired = Vec::new();

        for promotion in self.catalog.list().await? {
            if promotion.status() != PromotionStatus::Expired
                && promotion.effective_status(now) == PromotionStatus::Expired
            {
                self.catalog
                    .update_status(promotion.uuid(), PromotionStatus::Expired)
                    .await?;

                expired.push(promotion.uuid());
            }
        }

        Span::current().record("expired", expired.len());

        if !expired.is_empty() {
            info!(count = expired.len(), "expired promotions");
        }

        Ok(expired)
    }

    #[tracing::instrument(
        name = "redemption.transition",
        skip(self),
        fields(from = tracing::field::Empty, to = tracing::field::Empty),
        err
    )]
    async fn transition(
        &self,
        uuid: PromotionUuid,
        action: StatusAction,
    ) -> Result<Promotion, RedemptionError> {
        let span = Span::current();

        let promotion = self
            .catalog
            .get(uuid)
            .await?
            .ok_or(CatalogError::NotFound(uuid))?;

        let from = promotion.effective_status(self.clock.now());

        span.record("from", from.as_str());

        let to = from.apply(action, 0)?;

        span.record("to", to.as_str());

        // the ledger is closed before the status changes so no commit lands in between
        let closed = to == PromotionStatus::Cancelled;

        if closed {
            match self.ledger.close_if_unused(uuid).await? {
                CloseOutcome::Closed => {}
                CloseOutcome::InUse { used } => {
                    return Err(TransitionError::CancelWithUsage { used }.into());
                }
                CloseOutcome::Timeout => return Err(RedemptionError::LedgerTimeout),
            }
        }

        let promotion = match self.catalog.update_status(uuid, to).await {
            Ok(promotion) => promotion,
            Err(error) => {
                if closed && let Err(reopen) = self.ledger.reopen(uuid).await {
                    warn!(promotion_uuid = %uuid, error = %reopen, "failed to reopen ledger");
                }

                return Err(error.into());
            }
        };

        info!(promotion_uuid = %uuid, %from, %to, "changed promotion status");

        Ok(promotion)
    }

    async fn profile(
        &self,
        promotion: &Promotion,
        customer: CustomerId,
    ) -> Result<CustomerProfile, RedemptionError> {
        let class = if promotion.targeting().needs_classification() {
            self.customers.classify(customer.clone()).await?
        } else {
            None
        };

        Ok(CustomerProfile {
            id: customer,
            class,
        })
    }
}

fn ensure_currency(promotion: &Promotion, order: &OrderContext) -> Result<(), RedemptionError> {
    if promotion.currency() == order.currency() {
        return Ok(());
    }

    Err(RedemptionError::CurrencyMismatch {
        promotion: promotion.currency().iso_alpha_code,
        order: order.currency().iso_alpha_code,
    })
}
