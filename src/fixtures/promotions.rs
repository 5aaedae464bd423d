//! Promotion Fixtures

use std::{
    collections::BTreeMap,
    num::{NonZeroU32, NonZeroU64},
};

use jiff::{
    Timestamp,
    civil::{Date, Weekday},
};
use rusty_money::iso;
use serde::Deserialize;

use crate::{
    fixtures::{FixtureError, parse_percentage, parse_price},
    ids::{CategoryId, CustomerId, ProductId},
    promotions::{
        NewPromotion, Promotion, PromotionCode, PromotionError,
        kinds::{Bundle, BundleItem, BuyXGetY, PromotionKind},
        limits::UsageLimits,
        schedule::{Conditions, TimeWindow},
        scope::ProductScope,
        status::PromotionStatus,
        targeting::Targeting,
    },
};

/// Wrapper for promotions in YAML
#[derive(Debug, Deserialize)]
pub struct PromotionsFixture {
    /// Map of promotion key -> promotion fixture
    pub promotions: BTreeMap<String, PromotionFixture>,
}

impl PromotionsFixture {
    /// Validate every promotion, in key order
    ///
    /// # Errors
    ///
    /// Returns the first invalid promotion.
    pub fn into_promotions(self) -> Result<Vec<Promotion>, FixtureError> {
        self.promotions
            .into_iter()
            .map(|(key, fixture)| fixture.try_into_promotion(&key))
            .collect()
    }
}

/// Promotion fixture from YAML
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PromotionFixture {
    /// Promotion name
    pub name: String,

    /// Redemption code
    #[serde(default)]
    pub code: Option<String>,

    /// ISO currency code of every amount
    pub currency: String,

    /// Initial status
    #[serde(default)]
    pub status: PromotionStatus,

    /// First instant of validity
    pub starts_at: Timestamp,

    /// Last instant of validity
    pub ends_at: Timestamp,

    /// IANA timezone of the calendar conditions
    #[serde(default)]
    pub timezone: Option<String>,

    /// Discount configuration
    pub discount: DiscountFixture,

    /// Minimum order subtotal
    #[serde(default)]
    pub min_order: Option<String>,

    /// Eligible products and categories
    #[serde(default)]
    pub scope: ScopeFixture,

    /// Eligible customers
    #[serde(default)]
    pub targeting: TargetingFixture,

    /// Usage limits
    #[serde(default)]
    pub limits: LimitsFixture,

    /// Calendar conditions
    #[serde(default)]
    pub conditions: ConditionsFixture,

    /// Whether the promotion may be combined with others
    #[serde(default)]
    pub combinable: bool,
}

/// Discount configuration from YAML
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum DiscountFixture {
    /// Percentage off the subtotal
    Percentage {
        /// Percentage, e.g. "10" or "12.5%"
        percent: String,

        /// Cap on the discount, e.g. "500.00 GBP"
        #[serde(default)]
        max_discount: Option<String>,
    },

    /// Fixed amount off
    FixedAmount {
        /// Amount, e.g. "5.00 GBP"
        amount: String,
    },

    /// Free shipping
    FreeShipping,

    /// Free units after a threshold
    BuyXGetY {
        /// Paid units per group
        buy: NonZeroU32,

        /// Free units per group
        get: NonZeroU32,

        /// Product given away, if not the matched product
        #[serde(default)]
        free_product: Option<String>,
    },

    /// Bundle pricing
    Bundle {
        /// Bundle entries
        items: Vec<BundleItemFixture>,
    },
}

/// Bundle entry from YAML
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BundleItemFixture {
    /// Product key
    pub product: String,

    /// Units in the bundle
    #[serde(default = "one")]
    pub quantity: NonZeroU32,

    /// Price of the entry's full quantity inside the bundle
    pub price: String,
}

fn one() -> NonZeroU32 {
    NonZeroU32::MIN
}

/// Scope from YAML
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScopeFixture {
    /// Product keys
    #[serde(default)]
    pub products: Vec<String>,

    /// Category keys
    #[serde(default)]
    pub categories: Vec<String>,
}

/// Targeting from YAML
#[derive(Debug, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum TargetingFixture {
    /// Every customer
    #[default]
    All,

    /// First-time customers
    NewCustomers,

    /// Returning customers
    ReturningCustomers,

    /// VIP customers
    VipCustomers,

    /// Listed customers
    SpecificCustomers {
        /// Customer ids
        customers: Vec<String>,
    },
}

/// Usage limits from YAML
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsFixture {
    /// Global limit
    #[serde(default)]
    pub total: Option<NonZeroU64>,

    /// Per-customer limit, 1 when unset
    #[serde(default)]
    pub per_customer: Option<NonZeroU32>,
}

/// Time-of-day window from YAML
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeWindowFixture {
    /// Start, `HH:mm`
    pub start: String,

    /// End, `HH:mm`
    pub end: String,
}

/// Calendar conditions from YAML
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionsFixture {
    /// Allowed weekdays, e.g. `monday`
    #[serde(default)]
    pub days: Vec<String>,

    /// Allowed local time of day
    #[serde(default)]
    pub time_of_day: Option<TimeWindowFixture>,

    /// Excluded local dates
    #[serde(default)]
    pub excluded_dates: Vec<Date>,
}

impl PromotionFixture {
    /// Convert to a validated [`Promotion`]
    ///
    /// # Errors
    ///
    /// Returns an error if an amount or percentage cannot be parsed or the
    /// promotion fails validation.
    pub fn try_into_promotion(self, key: &str) -> Result<Promotion, FixtureError> {
        self.build().map_err(|error| match error {
            BuildError::Fixture(error) => error,
            BuildError::Promotion(source) => FixtureError::Promotion {
                key: key.to_string(),
                source,
            },
        })
    }

    fn build(self) -> Result<Promotion, BuildError> {
        let currency = iso::find(&self.currency)
            .ok_or_else(|| FixtureError::UnknownCurrency(self.currency.clone()))?;

        let mut new = NewPromotion::new(
            self.name,
            currency,
            kind(self.discount)?,
            self.starts_at,
            self.ends_at,
        );

        new.code = self
            .code
            .as_deref()
            .map(PromotionCode::new)
            .transpose()?;
        new.status = self.status;
        new.min_order = self.min_order.as_deref().map(parse_price).transpose()?;
        new.scope = ProductScope::new(
            self.scope.products.into_iter().map(ProductId::from),
            self.scope.categories.into_iter().map(CategoryId::from),
        );
        new.targeting = self.targeting.into();
        new.limits = self.limits.into();
        new.conditions = conditions(self.timezone.as_deref(), self.conditions)?;
        new.combinable = self.combinable;

        Ok(Promotion::try_from(new)?)
    }
}

enum BuildError {
    Fixture(FixtureError),
    Promotion(PromotionError),
}

impl From<FixtureError> for BuildError {
    fn from(error: FixtureError) -> Self {
        Self::Fixture(error)
    }
}

impl From<PromotionError> for BuildError {
    fn from(error: PromotionError) -> Self {
        Self::Promotion(error)
    }
}

fn conditions(timezone: Option<&str>, fixture: ConditionsFixture) -> Result<Conditions, BuildError> {
    let mut conditions = match timezone {
        Some(name) => Conditions::in_timezone(name)?,
        None => Conditions::default(),
    };

    conditions.days = fixture
        .days
        .iter()
        .map(|day| parse_weekday(day))
        .collect::<Result<_, _>>()?;

    conditions.time_of_day = fixture
        .time_of_day
        .map(|window| TimeWindow::parse(&window.start, &window.end))
        .transpose()?;

    conditions.excluded_dates = fixture.excluded_dates.into_iter().collect();

    Ok(conditions)
}

fn parse_weekday(day: &str) -> Result<Weekday, FixtureError> {
    match day.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Ok(Weekday::Monday),
        "tuesday" | "tue" => Ok(Weekday::Tuesday),
        "wednesday" | "wed" => Ok(Weekday::Wednesday),
        "thursday" | "thu" => Ok(Weekday::Thursday),
        "friday" | "fri" => Ok(Weekday::Friday),
        "saturday" | "sat" => Ok(Weekday::Saturday),
        "sunday" | "sun" => Ok(Weekday::Sunday),
        _ => Err(FixtureError::InvalidWeekday(day.to_string())),
    }
}

fn kind(fixture: DiscountFixture) -> Result<PromotionKind, BuildError> {
    Ok(match fixture {
        DiscountFixture::Percentage {
            percent,
            max_discount,
        } => PromotionKind::Percentage {
            percent: parse_percentage(&percent)?,
            max_discount: max_discount.as_deref().map(parse_price).transpose()?,
        },
        DiscountFixture::FixedAmount { amount } => PromotionKind::FixedAmount {
            amount: parse_price(&amount)?,
        },
        DiscountFixture::FreeShipping => PromotionKind::FreeShipping,
        DiscountFixture::BuyXGetY {
            buy,
            get,
            free_product,
        } => PromotionKind::BuyXGetY(BuyXGetY {
            buy,
            get,
            free_product: free_product.map(ProductId::from),
        }),
        DiscountFixture::Bundle { items } => {
            let items = items
                .into_iter()
                .map(|item| {
                    Ok(BundleItem {
                        product: ProductId::from(item.product),
                        quantity: item.quantity,
                        discounted_price: parse_price(&item.price)?,
                    })
                })
                .collect::<Result<Vec<_>, FixtureError>>()?;

            PromotionKind::Bundle(Bundle::new(items)?)
        }
    })
}

impl From<TargetingFixture> for Targeting {
    fn from(fixture: TargetingFixture) -> Self {
        match fixture {
            TargetingFixture::All => Targeting::All,
            TargetingFixture::NewCustomers => Targeting::NewCustomers,
            TargetingFixture::ReturningCustomers => Targeting::ReturningCustomers,
            TargetingFixture::VipCustomers => Targeting::VipCustomers,
            TargetingFixture::SpecificCustomers { customers } => Targeting::SpecificCustomers(
                customers.into_iter().map(CustomerId::from).collect(),
            ),
        }
    }
}

impl From<LimitsFixture> for UsageLimits {
    fn from(fixture: LimitsFixture) -> Self {
        let limits = UsageLimits {
            total: fixture.total,
            ..UsageLimits::default()
        };

        match fixture.per_customer {
            Some(per_customer) => limits.per_customer(per_customer),
            None => limits,
        }
    }
}

#[cfg(test)]
mod tests {
    use jiff::civil::date;
    use rusty_money::{Money, iso::GBP};
    use testresult::TestResult;

    use super::*;

    fn parse(yaml: &str) -> TestResult<Promotion> {
        let fixture: PromotionFixture = serde_norway::from_str(yaml)?;

        Ok(fixture.try_into_promotion("test")?)
    }

    #[test]
    fn percentage_fixture_with_all_conditions() -> TestResult {
        let promotion = parse(
            r#"
name: Summer sale
code: summer10
currency: GBP
status: active
starts_at: "2026-06-01T00:00:00Z"
ends_at: "2026-08-31T23:59:59Z"
timezone: Europe/London
discount:
  type: percentage
  percent: "10%"
  max_discount: "500.00 GBP"
min_order: "1000.00 GBP"
limits:
  total: 100
  per_customer: 2
targeting:
  type: vip_customers
conditions:
  days: [saturday, sunday]
  time_of_day:
    start: "09:00"
    end: "17:00"
  excluded_dates: [2026-08-31]
"#,
        )?;

        assert_eq!(promotion.code().map(PromotionCode::as_str), Some("SUMMER10"));
        assert_eq!(promotion.status(), PromotionStatus::Active);
        assert_eq!(promotion.min_order(), &Money::from_minor(100_000, GBP));
        assert_eq!(promotion.limits().total, NonZeroU64::new(100));
        assert_eq!(promotion.limits().per_customer.get(), 2);
        assert_eq!(promotion.targeting(), &Targeting::VipCustomers);
        assert!(promotion.conditions().days.contains(Weekday::Sunday));
        assert!(promotion.conditions().excluded_dates.contains(&date(2026, 8, 31)));
        assert!(matches!(
            promotion.kind(),
            PromotionKind::Percentage { max_discount: Some(cap), .. } if cap.to_minor_units() == 50_000
        ));

        Ok(())
    }

    #[test]
    fn defaults_apply_when_fields_are_omitted() -> TestResult {
        let promotion = parse(
            r#"
name: Free delivery
currency: GBP
starts_at: "2026-06-01T00:00:00Z"
ends_at: "2026-06-30T23:59:59Z"
discount:
  type: free_shipping
"#,
        )?;

        assert_eq!(promotion.status(), PromotionStatus::Draft);
        assert!(promotion.code().is_none());
        assert!(promotion.scope().is_all());
        assert_eq!(promotion.limits(), &UsageLimits::default());

        Ok(())
    }

    #[test]
    fn bundle_and_buy_x_get_y_fixtures() -> TestResult {
        let bundle = parse(
            r#"
name: Camera kit
currency: GBP
starts_at: "2026-06-01T00:00:00Z"
ends_at: "2026-06-30T23:59:59Z"
discount:
  type: bundle
  items:
    - product: camera
      price: "400.00 GBP"
    - product: battery
      quantity: 2
      price: "20.00 GBP"
"#,
        )?;

        let PromotionKind::Bundle(bundle) = bundle.kind() else {
            return Err("expected a bundle".into());
        };

        assert_eq!(bundle.items().len(), 2);

        let offer = parse(
            r#"
name: Lamps
currency: GBP
starts_at: "2026-06-01T00:00:00Z"
ends_at: "2026-06-30T23:59:59Z"
scope:
  categories: [lighting]
discount:
  type: buy_x_get_y
  buy: 2
  get: 1
"#,
        )?;

        assert!(matches!(
            offer.kind(),
            PromotionKind::BuyXGetY(BuyXGetY { free_product: None, .. })
        ));

        Ok(())
    }

    #[test]
    fn zero_limits_are_rejected_while_parsing() {
        let result: Result<LimitsFixture, _> = serde_norway::from_str("total: 0");

        assert!(result.is_err());
    }

    #[test]
    fn invalid_window_reports_promotion_key() -> TestResult {
        let fixture: PromotionFixture = serde_norway::from_str(
            r#"
name: Backwards
currency: GBP
starts_at: "2026-06-30T00:00:00Z"
ends_at: "2026-06-01T00:00:00Z"
discount:
  type: free_shipping
"#,
        )?;

        let result = fixture.try_into_promotion("backwards");

        let Err(error) = result else {
            return Err("reversed window was accepted".into());
        };

        assert!(matches!(
            &error,
            FixtureError::Promotion {
                key,
                source: PromotionError::InvalidWindow,
            } if key == "backwards"
        ));
        assert_eq!(
            error.to_string(),
            "Invalid promotion backwards: promotion must start before it ends"
        );

        Ok(())
    }

    #[test]
    fn unknown_weekday_is_rejected() {
        assert!(matches!(
            parse_weekday("someday"),
            Err(FixtureError::InvalidWeekday(_))
        ));
    }

    #[test]
    fn unknown_discount_type_is_rejected() {
        let result: Result<DiscountFixture, _> = serde_norway::from_str("type: mystery");

        assert!(result.is_err());
    }
}
