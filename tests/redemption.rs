//! Redemption flows against the fixture promotion set

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{task::JoinSet, time::sleep};

use tally::{
    catalog::{CatalogError, InMemoryPromotionCatalog, PromotionCatalog},
    clock::FixedClock,
    customers::{CustomerClass, StaticClassifier},
    eligibility::Ineligibility,
    fixtures::{Fixture, LoadedOrder},
    ids::{CustomerId, OrderId},
    ledger::{InMemoryUsageStore, UsageStore},
    promotions::{Promotion, PromotionCode, PromotionUuid, status::PromotionStatus},
    redemption::{CommitRedemption, RedemptionCoordinator, RedemptionError, ValidateRequest},
};
use testresult::TestResult;

/// Catalog whose status updates take a while to land.
struct SlowCatalog {
    inner: Arc<InMemoryPromotionCatalog>,
    delay: Duration,
}

#[async_trait]
impl PromotionCatalog for SlowCatalog {
    async fn get(&self, uuid: PromotionUuid) -> Result<Option<Promotion>, CatalogError> {
        self.inner.get(uuid).await
    }

    async fn find_by_code(&self, code: PromotionCode) -> Result<Option<Promotion>, CatalogError> {
        self.inner.find_by_code(code).await
    }

    async fn insert(&self, promotion: Promotion) -> Result<(), CatalogError> {
        self.inner.insert(promotion).await
    }

    async fn update_status(
        &self,
        uuid: PromotionUuid,
        status: PromotionStatus,
    ) -> Result<Promotion, CatalogError> {
        sleep(self.delay).await;

        self.inner.update_status(uuid, status).await
    }

    async fn list(&self) -> Result<Vec<Promotion>, CatalogError> {
        self.inner.list().await
    }
}

struct Harness {
    coordinator: RedemptionCoordinator,
    catalog: Arc<InMemoryPromotionCatalog>,
    ledger: Arc<InMemoryUsageStore>,
    fixture: Fixture,
}

impl Harness {
    fn at(now: &str) -> TestResult<Self> {
        Self::build(now, None)
    }

    /// Harness whose status changes take `delay` to persist.
    fn with_slow_status_updates(now: &str, delay: Duration) -> TestResult<Self> {
        Self::build(now, Some(delay))
    }

    fn build(now: &str, delay: Option<Duration>) -> TestResult<Self> {
        let fixture = Fixture::with_base_path(concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures"));
        let catalog = Arc::new(fixture.load_catalog("summer")?);
        let ledger = Arc::new(InMemoryUsageStore::default());
        let customers = StaticClassifier::new().with("vip-1", CustomerClass::vip());

        let coordinator_catalog: Arc<dyn PromotionCatalog> = match delay {
            Some(delay) => Arc::new(SlowCatalog {
                inner: Arc::clone(&catalog),
                delay,
            }),
            None => Arc::clone(&catalog) as Arc<dyn PromotionCatalog>,
        };

        let coordinator = RedemptionCoordinator::new(
            coordinator_catalog,
            Arc::clone(&ledger) as Arc<dyn UsageStore>,
            Arc::new(customers),
            Arc::new(FixedClock(now.parse()?)),
        );

        Ok(Self {
            coordinator,
            catalog,
            ledger,
            fixture,
        })
    }

    fn order(&self, name: &str) -> TestResult<LoadedOrder> {
        Ok(self.fixture.load_order(name)?)
    }

    async fn promotion(&self, code: &str) -> TestResult<Promotion> {
        self.catalog
            .find_by_code(PromotionCode::new(code)?)
            .await?
            .ok_or_else(|| format!("no promotion {code}").into())
    }

    fn validate_request(code: &str, customer: Option<&str>, order: &LoadedOrder) -> ValidateRequest {
        ValidateRequest {
            code: code.to_string(),
            customer: customer.map(CustomerId::from),
            subtotal: order.subtotal,
            items: order.items.clone(),
            shipping: order.shipping,
        }
    }

    fn commit_request(
        promotion: &Promotion,
        customer: &str,
        order_id: &str,
        order: &LoadedOrder,
    ) -> TestResult<CommitRedemption> {
        Ok(CommitRedemption {
            promotion: promotion.uuid(),
            customer: CustomerId::from(customer),
            order_id: OrderId::from(order_id),
            order: order.context(None)?,
            shipping: order.shipping,
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn summer_sale_is_redeemed_once() -> TestResult {
    let harness = Harness::at("2026-07-01T12:00:00Z")?;
    let laptop = harness.order("laptop")?;

    let validation = harness
        .coordinator
        .validate(Harness::validate_request("summer10", Some("alice"), &laptop))
        .await?;

    assert_eq!(validation.discount.amount.to_minor_units(), 50_000);
    assert_eq!(validation.code.as_str(), "SUMMER10");
    assert_eq!(validation.remaining_usage, Some(1));
    assert_eq!(validation.remaining_for_customer, Some(1));

    let promotion = harness.promotion("SUMMER10").await?;
    let mut commits = JoinSet::new();

    for (customer, order_id) in [("alice", "order-1"), ("bob", "order-2")] {
        let coordinator = harness.coordinator.clone();
        let request = Harness::commit_request(&promotion, customer, order_id, &laptop)?;

        commits.spawn(async move { coordinator.commit(request).await });
    }

    let mut committed = 0;
    let mut rejected = Vec::new();

    while let Some(result) = commits.join_next().await {
        match result? {
            Ok(redemption) => {
                assert!(!redemption.replayed);
                assert_eq!(redemption.record.discount.to_minor_units(), 50_000);
                committed += 1;
            }
            Err(error) => rejected.push(error.reason_code()),
        }
    }

    assert_eq!(committed, 1);
    assert_eq!(rejected, ["GLOBAL_LIMIT_REACHED"]);
    assert_eq!(harness.ledger.usage(promotion.uuid(), None).await?.total_used, 1);

    // later validations see the exhausted limit
    let result = harness
        .coordinator
        .validate(Harness::validate_request("SUMMER10", Some("carol"), &laptop))
        .await;

    assert!(matches!(
        result,
        Err(RedemptionError::Ineligible(Ineligibility::GlobalLimitReached))
    ));

    Ok(())
}

#[tokio::test]
async fn committing_an_order_twice_is_a_replay() -> TestResult {
    let harness = Harness::at("2026-07-01T12:00:00Z")?;
    let lamps = harness.order("lamps")?;
    let promotion = harness.promotion("LAMPS3FOR2").await?;

    let first = harness
        .coordinator
        .commit(Harness::commit_request(&promotion, "alice", "order-7", &lamps)?)
        .await?;
    let second = harness
        .coordinator
        .commit(Harness::commit_request(&promotion, "alice", "order-7", &lamps)?)
        .await?;

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(second.record, first.record);

    let usage = harness
        .ledger
        .usage(promotion.uuid(), Some(CustomerId::from("alice")))
        .await?;

    assert_eq!(usage.total_used, 1);
    assert_eq!(usage.customer_used, 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn per_customer_limit_holds_under_concurrency() -> TestResult {
    let harness = Harness::at("2026-07-01T12:00:00Z")?;
    let lamps = harness.order("lamps")?;
    let promotion = harness.promotion("LAMPS3FOR2").await?;
    let mut commits = JoinSet::new();

    for index in 0..10 {
        let coordinator = harness.coordinator.clone();
        let request =
            Harness::commit_request(&promotion, "alice", &format!("order-{index}"), &lamps)?;

        commits.spawn(async move { coordinator.commit(request).await });
    }

    let mut committed = 0;

    while let Some(result) = commits.join_next().await {
        match result? {
            Ok(_) => committed += 1,
            Err(error) => assert_eq!(error.reason_code(), "CUSTOMER_LIMIT_REACHED"),
        }
    }

    assert_eq!(committed, 3);

    let other = harness
        .coordinator
        .commit(Harness::commit_request(&promotion, "bob", "order-bob", &lamps)?)
        .await?;

    assert!(!other.replayed);
    assert_eq!(harness.ledger.redemptions(promotion.uuid()).await?.len(), 4);

    Ok(())
}

#[tokio::test]
async fn small_order_is_below_minimum() -> TestResult {
    let harness = Harness::at("2026-07-01T12:00:00Z")?;
    let small = harness.order("small")?;

    let result = harness
        .coordinator
        .validate(Harness::validate_request("SUMMER10", Some("alice"), &small))
        .await;

    let Err(error) = result else {
        return Err("expected a below-minimum rejection".into());
    };

    assert_eq!(error.reason_code(), "BELOW_MIN_ORDER");
    assert_eq!(error.http_status(), 400);

    Ok(())
}

#[tokio::test]
async fn buy_two_get_one_frees_two_lamps() -> TestResult {
    let harness = Harness::at("2026-07-01T12:00:00Z")?;
    let lamps = harness.order("lamps")?;

    let validation = harness
        .coordinator
        .validate(Harness::validate_request("LAMPS3FOR2", None, &lamps))
        .await?;

    assert_eq!(validation.discount.amount.to_minor_units(), 60_000);
    assert_eq!(validation.discount.free_units, 2);
    assert_eq!(validation.remaining_for_customer, None);

    Ok(())
}

#[tokio::test]
async fn bundle_discounts_against_regular_prices() -> TestResult {
    let harness = Harness::at("2026-07-01T12:00:00Z")?;
    let study = harness.order("study")?;

    let validation = harness
        .coordinator
        .validate(Harness::validate_request("STUDY", Some("alice"), &study))
        .await?;

    // desk 400.00 + chair 150.00 against 350.00 + 100.00
    assert_eq!(validation.discount.amount.to_minor_units(), 10_000);

    let result = harness
        .coordinator
        .validate(Harness::validate_request("STUDY", Some("alice"), &harness.order("lamps")?))
        .await;

    assert!(matches!(
        result,
        Err(RedemptionError::Ineligible(Ineligibility::NoApplicableItems))
    ));

    Ok(())
}

#[tokio::test]
async fn free_shipping_only_at_weekends() -> TestResult {
    // 2026-07-04 is a Saturday
    let saturday = Harness::at("2026-07-04T10:00:00Z")?;
    let laptop = saturday.order("laptop")?;

    let validation = saturday
        .coordinator
        .validate(Harness::validate_request("SHIPFREE", None, &laptop))
        .await?;

    assert!(validation.discount.free_shipping);
    assert_eq!(validation.discount.amount.to_minor_units(), 999);

    let wednesday = Harness::at("2026-07-01T10:00:00Z")?;
    let result = wednesday
        .coordinator
        .validate(Harness::validate_request("SHIPFREE", None, &laptop))
        .await;

    assert!(matches!(
        result,
        Err(RedemptionError::Ineligible(Ineligibility::DayNotAllowed))
    ));

    Ok(())
}

#[tokio::test]
async fn vip_evening_needs_a_classified_customer() -> TestResult {
    // 19:00 UTC is 20:00 in London during summer time
    let harness = Harness::at("2026-07-01T19:00:00Z")?;
    let small = harness.order("small")?;

    let validation = harness
        .coordinator
        .validate(Harness::validate_request("VIP20", Some("vip-1"), &small))
        .await?;

    assert_eq!(validation.discount.amount.to_minor_units(), 2_000);

    for customer in [None, Some("alice")] {
        let result = harness
            .coordinator
            .validate(Harness::validate_request("VIP20", customer, &small))
            .await;

        assert!(matches!(
            result,
            Err(RedemptionError::Ineligible(Ineligibility::CustomerNotEligible))
        ));
    }

    let morning = Harness::at("2026-07-01T08:00:00Z")?;
    let result = morning
        .coordinator
        .validate(Harness::validate_request("VIP20", Some("vip-1"), &small))
        .await;

    assert!(matches!(
        result,
        Err(RedemptionError::Ineligible(Ineligibility::TimeNotAllowed))
    ));

    Ok(())
}

#[tokio::test]
async fn draft_and_paused_promotions_are_not_redeemable() -> TestResult {
    let harness = Harness::at("2026-09-15T12:00:00Z")?;
    let laptop = harness.order("laptop")?;

    let result = harness
        .coordinator
        .validate(Harness::validate_request("AUTUMN15", None, &laptop))
        .await;

    let Err(error) = result else {
        return Err("draft promotion validated".into());
    };

    assert_eq!(error.http_status(), 404);

    let autumn = harness.promotion("AUTUMN15").await?;
    harness.coordinator.approve(autumn.uuid()).await?;

    let validation = harness
        .coordinator
        .validate(Harness::validate_request("AUTUMN15", None, &laptop))
        .await?;

    assert_eq!(validation.discount.amount.to_minor_units(), 90_000);

    harness.coordinator.pause(autumn.uuid()).await?;

    let result = harness
        .coordinator
        .validate(Harness::validate_request("AUTUMN15", None, &laptop))
        .await;

    assert!(matches!(
        result,
        Err(RedemptionError::Ineligible(Ineligibility::NotFoundOrInactive))
    ));

    Ok(())
}

#[tokio::test]
async fn unknown_code_is_not_found() -> TestResult {
    let harness = Harness::at("2026-07-01T12:00:00Z")?;
    let laptop = harness.order("laptop")?;

    let result = harness
        .coordinator
        .validate(Harness::validate_request("NOPE", None, &laptop))
        .await;

    let Err(error) = result else {
        return Err("unknown code validated".into());
    };

    assert_eq!(error.reason_code(), "NOT_FOUND_OR_INACTIVE");
    assert_eq!(error.http_status(), 404);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn commit_during_slow_cancel_is_refused() -> TestResult {
    let harness =
        Harness::with_slow_status_updates("2026-07-01T12:00:00Z", Duration::from_millis(100))?;
    let lamps = harness.order("lamps")?;
    let promotion = harness.promotion("LAMPS3FOR2").await?;

    let cancelling = {
        let coordinator = harness.coordinator.clone();
        let uuid = promotion.uuid();
        tokio::spawn(async move { coordinator.cancel(uuid).await })
    };

    sleep(Duration::from_millis(20)).await;

    let committed = harness
        .coordinator
        .commit(Harness::commit_request(&promotion, "alice", "order-late", &lamps)?)
        .await;

    let cancelled = cancelling.await??;

    let Err(error) = committed else {
        return Err("commit landed while the promotion was being cancelled".into());
    };

    assert_eq!(error.reason_code(), "NOT_FOUND_OR_INACTIVE");
    assert_eq!(cancelled.status(), PromotionStatus::Cancelled);
    assert_eq!(harness.ledger.usage(promotion.uuid(), None).await?.total_used, 0);
    assert!(harness.ledger.redemptions(promotion.uuid()).await?.is_empty());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_and_commit_never_both_succeed() -> TestResult {
    for round in 0..20 {
        let harness =
            Harness::with_slow_status_updates("2026-07-01T12:00:00Z", Duration::from_millis(5))?;
        let lamps = harness.order("lamps")?;
        let promotion = harness.promotion("LAMPS3FOR2").await?;
        let request =
            Harness::commit_request(&promotion, "alice", &format!("order-{round}"), &lamps)?;

        let cancelling = {
            let coordinator = harness.coordinator.clone();
            let uuid = promotion.uuid();
            tokio::spawn(async move { coordinator.cancel(uuid).await })
        };
        let committing = {
            let coordinator = harness.coordinator.clone();
            tokio::spawn(async move { coordinator.commit(request).await })
        };

        let cancelled = cancelling.await?;
        let committed = committing.await?;
        let total_used = harness.ledger.usage(promotion.uuid(), None).await?.total_used;
        let status = harness.promotion("LAMPS3FOR2").await?.status();

        match (cancelled, committed) {
            (Ok(_), Err(error)) => {
                assert_eq!(error.reason_code(), "NOT_FOUND_OR_INACTIVE");
                assert_eq!(status, PromotionStatus::Cancelled);
                assert_eq!(total_used, 0);
            }
            (Err(error), Ok(_)) => {
                assert_eq!(error.reason_code(), "INVALID_TRANSITION");
                assert_eq!(status, PromotionStatus::Active);
                assert_eq!(total_used, 1);
            }
            (cancelled, committed) => {
                return Err(
                    format!("round {round}: cancel {cancelled:?}, commit {committed:?}").into(),
                );
            }
        }
    }

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pause_and_commit_settle_consistently() -> TestResult {
    let harness =
        Harness::with_slow_status_updates("2026-07-01T12:00:00Z", Duration::from_millis(50))?;
    let lamps = harness.order("lamps")?;
    let promotion = harness.promotion("LAMPS3FOR2").await?;

    let pausing = {
        let coordinator = harness.coordinator.clone();
        let uuid = promotion.uuid();
        tokio::spawn(async move { coordinator.pause(uuid).await })
    };

    let mut commits = JoinSet::new();

    for (customer, order_id) in [("alice", "order-a"), ("bob", "order-b")] {
        let coordinator = harness.coordinator.clone();
        let request = Harness::commit_request(&promotion, customer, order_id, &lamps)?;

        commits.spawn(async move { coordinator.commit(request).await });
    }

    let mut committed = 0;

    while let Some(result) = commits.join_next().await {
        match result? {
            Ok(_) => committed += 1,
            Err(error) => assert_eq!(error.reason_code(), "NOT_FOUND_OR_INACTIVE"),
        }
    }

    let paused = pausing.await??;

    assert_eq!(paused.status(), PromotionStatus::Paused);
    assert_eq!(
        harness.ledger.redemptions(promotion.uuid()).await?.len(),
        committed
    );
    assert_eq!(
        harness.ledger.usage(promotion.uuid(), None).await?.total_used,
        u64::try_from(committed)?
    );

    // once the pause has landed nothing more is redeemed
    let result = harness
        .coordinator
        .commit(Harness::commit_request(&promotion, "carol", "order-c", &lamps)?)
        .await;

    let Err(error) = result else {
        return Err("paused promotion was redeemed".into());
    };

    assert_eq!(error.reason_code(), "NOT_FOUND_OR_INACTIVE");

    Ok(())
}
