//! Order Fixtures

use serde::Deserialize;

use crate::{
    fixtures::{FixtureError, parse_price},
    ids::CategoryId,
    orders::{CustomerProfile, LineItem, OrderContext},
    pricing::{Amount, line_total, sum, zero},
};

/// Order fixture from YAML
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderFixture {
    /// Subtotal, e.g. "6000.00 GBP"; the sum of the lines when unset
    #[serde(default)]
    pub subtotal: Option<String>,

    /// Shipping cost
    #[serde(default)]
    pub shipping: Option<String>,

    /// Order lines
    #[serde(default)]
    pub items: Vec<LineItemFixture>,
}

/// Order line from YAML
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineItemFixture {
    /// Product key
    pub product: String,

    /// Category keys
    #[serde(default)]
    pub categories: Vec<String>,

    /// Units
    #[serde(default = "one")]
    pub quantity: u32,

    /// Unit price, e.g. "30.00 GBP"
    pub price: String,
}

fn one() -> u32 {
    1
}

/// An order read from a fixture, not yet tied to a customer.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedOrder {
    /// Order subtotal
    pub subtotal: Amount,

    /// Order lines
    pub items: Vec<LineItem>,

    /// Shipping cost
    pub shipping: Option<Amount>,
}

impl LoadedOrder {
    /// Build the order context for `customer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lines and subtotal disagree on currency.
    pub fn context(&self, customer: Option<CustomerProfile>) -> Result<OrderContext, FixtureError> {
        Ok(OrderContext::new(
            self.subtotal,
            self.items.clone(),
            customer,
        )?)
    }
}

impl TryFrom<OrderFixture> for LoadedOrder {
    type Error = FixtureError;

    fn try_from(fixture: OrderFixture) -> Result<Self, Self::Error> {
        let items = fixture
            .items
            .into_iter()
            .map(|item| {
                let line = LineItem::new(item.product, item.quantity, parse_price(&item.price)?);

                Ok(item
                    .categories
                    .into_iter()
                    .map(CategoryId::from)
                    .fold(line, |line, category| line.in_category(category)))
            })
            .collect::<Result<Vec<_>, FixtureError>>()?;

        let subtotal = match fixture.subtotal.as_deref() {
            Some(subtotal) => parse_price(subtotal)?,
            None => {
                let currency = items
                    .first()
                    .map(|line| line.unit_price().currency())
                    .ok_or(FixtureError::EmptyOrder)?;

                OrderContext::new(zero(currency), items.clone(), None)?;

                let totals = items
                    .iter()
                    .map(|line| line_total(line.unit_price(), line.quantity()))
                    .collect::<Result<Vec<_>, _>>()?;

                sum(currency, totals)?
            }
        };

        let shipping = fixture.shipping.as_deref().map(parse_price).transpose()?;

        // validates currencies and quantities
        OrderContext::new(subtotal, items.clone(), None)?;

        Ok(Self {
            subtotal,
            items,
            shipping,
        })
    }
}
