//! Promotion Usage Limits

use std::num::{NonZeroU32, NonZeroU64};

/// Usage limits for a promotion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageLimits {
    /// Maximum number of redemptions across all customers
    pub total: Option<NonZeroU64>,

    /// Maximum number of redemptions by a single customer
    pub per_customer: NonZeroU32,
}

impl Default for UsageLimits {
    fn default() -> Self {
        Self {
            total: None,
            per_customer: NonZeroU32::MIN,
        }
    }
}

impl UsageLimits {
    /// No global limit, one redemption per customer
    #[must_use]
    pub fn once_per_customer() -> Self {
        Self::default()
    }

    /// Create limits with a global limit and the default per-customer limit
    #[must_use]
    pub fn with_total_limit(total: NonZeroU64) -> Self {
        Self {
            total: Some(total),
            ..Self::default()
        }
    }

    /// Replace the per-customer limit
    #[must_use]
    pub const fn per_customer(mut self, limit: NonZeroU32) -> Self {
        self.per_customer = limit;
        self
    }

    /// Whether `total_used` leaves room for another redemption
    pub fn allows_total(&self, total_used: u64) -> bool {
        self.total.is_none_or(|limit| total_used < limit.get())
    }

    /// Whether `customer_used` leaves room for another redemption by that customer
    pub fn allows_customer(&self, customer_used: u32) -> bool {
        customer_used < self.per_customer.get()
    }

    /// Redemptions left under the global limit, if there is one
    pub fn remaining_total(&self, total_used: u64) -> Option<u64> {
        self.total.map(|limit| limit.get().saturating_sub(total_used))
    }

    /// Redemptions left for a customer
    pub fn remaining_for_customer(&self, customer_used: u32) -> u32 {
        self.per_customer.get().saturating_sub(customer_used)
    }
}
