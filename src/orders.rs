//! Order Context
//!
//! The read-only view of an order that promotions are evaluated against. It is
//! owned by the order subsystem and never mutated here.

use rusty_money::iso::Currency;
use smallvec::SmallVec;
use thiserror::Error;

use crate::{
    customers::CustomerClass,
    ids::{CategoryId, CustomerId, ProductId},
    pricing::Amount,
};

/// Errors related to order context construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    /// A line's currency differs from the order currency (index, line currency, order currency).
    #[error("line {0} has currency {1}, but order has currency {2}")]
    CurrencyMismatch(usize, &'static str, &'static str),

    /// A line was given a zero quantity.
    #[error("line {0} has a zero quantity")]
    ZeroQuantity(usize),

    /// A line has a negative unit price.
    #[error("line {0} has a negative unit price")]
    NegativeUnitPrice(usize),

    /// The subtotal is negative.
    #[error("order subtotal must not be negative")]
    NegativeSubtotal,
}

/// One line of an order.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    product: ProductId,
    categories: SmallVec<[CategoryId; 2]>,
    quantity: u32,
    unit_price: Amount,
}

impl LineItem {
    /// Create a line with no category membership.
    pub fn new(product: impl Into<ProductId>, quantity: u32, unit_price: Amount) -> Self {
        Self {
            product: product.into(),
            categories: SmallVec::new(),
            quantity,
            unit_price,
        }
    }

    /// Add a category this line's product belongs to.
    #[must_use]
    pub fn in_category(mut self, category: impl Into<CategoryId>) -> Self {
        self.categories.push(category.into());
        self
    }

    /// Product of the line.
    pub fn product(&self) -> &ProductId {
        &self.product
    }

    /// Categories the product belongs to.
    pub fn categories(&self) -> &[CategoryId] {
        &self.categories
    }

    /// Number of units.
    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Price of a single unit.
    pub fn unit_price(&self) -> &Amount {
        &self.unit_price
    }
}

/// The customer placing an order, with the classification supplied by the
/// customer subsystem (if it was consulted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerProfile {
    /// Customer identifier
    pub id: CustomerId,

    /// Classification, when known
    pub class: Option<CustomerClass>,
}

impl CustomerProfile {
    /// A customer with no known classification.
    pub fn unclassified(id: impl Into<CustomerId>) -> Self {
        Self {
            id: id.into(),
            class: None,
        }
    }
}

/// Order context
#[derive(Debug, Clone, PartialEq)]
pub struct OrderContext {
    subtotal: Amount,
    items: Vec<LineItem>,
    customer: Option<CustomerProfile>,
}

impl OrderContext {
    /// Create an order context.
    ///
    /// # Errors
    ///
    /// Returns an [`OrderError`] if a line is priced in a different currency
    /// than the subtotal, has no units or a negative price, or the subtotal is
    /// negative.
    pub fn new(
        subtotal: Amount,
        items: impl Into<Vec<LineItem>>,
        customer: Option<CustomerProfile>,
    ) -> Result<Self, OrderError> {
        let items = items.into();
        let currency = subtotal.currency();

        if subtotal.to_minor_units() < 0 {
            return Err(OrderError::NegativeSubtotal);
        }

        items.iter().enumerate().try_for_each(|(i, item)| {
            let item_currency = item.unit_price.currency();

            if item.quantity == 0 {
                Err(OrderError::ZeroQuantity(i))
            } else if item.unit_price.to_minor_units() < 0 {
                Err(OrderError::NegativeUnitPrice(i))
            } else if item_currency == currency {
                Ok(())
            } else {
                Err(OrderError::CurrencyMismatch(
                    i,
                    item_currency.iso_alpha_code,
                    currency.iso_alpha_code,
                ))
            }
        })?;

        Ok(Self {
            subtotal,
            items,
            customer,
        })
    }

    /// Order subtotal.
    pub fn subtotal(&self) -> &Amount {
        &self.subtotal
    }

    /// Order lines.
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    /// The customer, if the order is not anonymous.
    pub fn customer(&self) -> Option<&CustomerProfile> {
        self.customer.as_ref()
    }

    /// Replace the customer profile.
    #[must_use]
    pub fn with_customer(mut self, customer: Option<CustomerProfile>) -> Self {
        self.customer = customer;
        self
    }

    /// Currency of the order.
    pub fn currency(&self) -> &'static Currency {
        self.subtotal.currency()
    }

    /// Total units of `product` across all lines.
    pub fn quantity_of(&self, product: &ProductId) -> u64 {
        self.items
            .iter()
            .filter(|item| &item.product == product)
            .map(|item| u64::from(item.quantity))
            .sum()
    }
}
