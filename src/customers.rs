//! Customer Classification
//!
//! The engine never derives customer history itself; the customer subsystem
//! classifies customers and the coordinator injects the result into the order
//! context before evaluation.

use async_trait::async_trait;
use mockall::automock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::CustomerId;

/// Purchase history of a customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tenure {
    /// No completed orders yet
    New,

    /// At least one completed order
    Returning,
}

/// Classification of a customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerClass {
    /// Purchase history
    pub tenure: Tenure,

    /// Whether the customer is in the VIP segment
    #[serde(default)]
    pub vip: bool,
}

impl CustomerClass {
    /// A first-time customer.
    pub const fn new_customer() -> Self {
        Self {
            tenure: Tenure::New,
            vip: false,
        }
    }

    /// A customer with previous orders.
    pub const fn returning() -> Self {
        Self {
            tenure: Tenure::Returning,
            vip: false,
        }
    }

    /// A returning VIP customer.
    pub const fn vip() -> Self {
        Self {
            tenure: Tenure::Returning,
            vip: true,
        }
    }
}

/// Errors surfaced by a customer classifier.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The classification source could not be reached.
    #[error("customer classification unavailable: {0}")]
    Unavailable(String),
}

/// Customer classification provider.
#[automock]
#[async_trait]
pub trait CustomerClassifier: Send + Sync {
    /// Classify a customer, returning `None` if the customer is unknown.
    async fn classify(&self, customer: CustomerId) -> Result<Option<CustomerClass>, ClassifierError>;
}

/// Classifier backed by a fixed lookup table.
#[derive(Debug, Clone, Default)]
pub struct StaticClassifier {
    classes: FxHashMap<CustomerId, CustomerClass>,
}

impl StaticClassifier {
    /// Create an empty classifier; every customer is unknown.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a known customer.
    #[must_use]
    pub fn with(mut self, customer: impl Into<CustomerId>, class: CustomerClass) -> Self {
        self.classes.insert(customer.into(), class);
        self
    }
}

impl FromIterator<(CustomerId, CustomerClass)> for StaticClassifier {
    fn from_iter<I: IntoIterator<Item = (CustomerId, CustomerClass)>>(iter: I) -> Self {
        Self {
            classes: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl CustomerClassifier for StaticClassifier {
    async fn classify(&self, customer: CustomerId) -> Result<Option<CustomerClass>, ClassifierError> {
        Ok(self.classes.get(&customer).copied())
    }
}
