//! Tally prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    catalog::{CatalogError, InMemoryPromotionCatalog, PromotionCatalog},
    clock::{Clock, FixedClock, SystemClock},
    customers::{ClassifierError, CustomerClass, CustomerClassifier, StaticClassifier, Tenure},
    discounts::{DiscountError, DiscountOutcome, calculate},
    eligibility::{Eligible, Ineligibility, UsageSnapshot, evaluate},
    ids::{CategoryId, CustomerId, OrderId, ProductId},
    ledger::{
        CloseOutcome, CommitOutcome, CommitRequest, InMemoryUsageStore, LedgerError,
        LedgerRejection, PgUsageStore, RedemptionRecord, UsageStore,
    },
    orders::{CustomerProfile, LineItem, OrderContext, OrderError},
    pricing::{Amount, PricingError},
    promotions::{
        NewPromotion, Promotion, PromotionCode, PromotionError, PromotionUuid,
        kinds::{Bundle, BundleItem, BuyXGetY, Percent, PromotionKind},
        limits::UsageLimits,
        schedule::{Conditions, TimeWindow, ValidityWindow, WeekdaySet},
        scope::ProductScope,
        status::{PromotionStatus, StatusAction, TransitionError},
        targeting::Targeting,
    },
    redemption::{
        CommitRedemption, Redemption, RedemptionCoordinator, RedemptionError, ValidateRequest,
        Validation,
    },
};
