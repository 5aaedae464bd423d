//! Promotion Kinds
//!
//! Each variant carries exactly the fields its discount needs, so a
//! percentage promotion without a percentage cannot be constructed.

use std::num::NonZeroU32;

use rust_decimal::Decimal;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::{ids::ProductId, pricing::Amount, promotions::PromotionError};

/// A percentage in the range `(0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Percent(Decimal);

impl Percent {
    /// Create a percentage.
    ///
    /// # Errors
    ///
    /// Returns [`PromotionError::PercentOutOfRange`] unless `0 < value <= 100`.
    pub fn new(value: Decimal) -> Result<Self, PromotionError> {
        if value <= Decimal::ZERO || value > Decimal::ONE_HUNDRED {
            return Err(PromotionError::PercentOutOfRange(value));
        }

        Ok(Self(value))
    }

    /// The percentage value, e.g. `10` for 10%.
    pub fn value(&self) -> Decimal {
        self.0
    }
}

/// Buy-X-get-Y parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyXGetY {
    /// Paid units per group
    pub buy: NonZeroU32,

    /// Free units granted per complete group
    pub get: NonZeroU32,

    /// Product granted for free; the matched product itself when unset
    pub free_product: Option<ProductId>,
}

/// One product entry of a bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleItem {
    /// Bundled product
    pub product: ProductId,

    /// Units of the product in the bundle
    pub quantity: NonZeroU32,

    /// Price of the entry's full quantity inside the bundle
    pub discounted_price: Amount,
}

/// A fixed set of products sold together at a special price.
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    items: SmallVec<[BundleItem; 4]>,
}

impl Bundle {
    /// Create a bundle.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundle is empty, lists a product twice or has a
    /// negative discounted price.
    pub fn new(items: impl IntoIterator<Item = BundleItem>) -> Result<Self, PromotionError> {
        let items: SmallVec<[BundleItem; 4]> = items.into_iter().collect();

        if items.is_empty() {
            return Err(PromotionError::EmptyBundle);
        }

        let mut seen = FxHashSet::default();

        for item in &items {
            if !seen.insert(&item.product) {
                return Err(PromotionError::DuplicateBundleProduct(item.product.clone()));
            }

            if item.discounted_price.to_minor_units() < 0 {
                return Err(PromotionError::NegativeAmount("bundle discounted price"));
            }
        }

        Ok(Self { items })
    }

    /// Bundle entries.
    pub fn items(&self) -> &[BundleItem] {
        &self.items
    }
}

/// Promotion kind
#[derive(Debug, Clone, PartialEq)]
pub enum PromotionKind {
    /// Percentage off the subtotal, optionally capped
    Percentage {
        /// Discount percentage
        percent: Percent,

        /// Maximum discount granted
        max_discount: Option<Amount>,
    },

    /// Fixed amount off the subtotal
    FixedAmount {
        /// Amount off
        amount: Amount,
    },

    /// Shipping is free
    FreeShipping,

    /// Free units after a threshold quantity
    BuyXGetY(BuyXGetY),

    /// Bundle pricing
    Bundle(Bundle),
}

impl PromotionKind {
    /// Stable name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Percentage { .. } => "percentage",
            Self::FixedAmount { .. } => "fixed_amount",
            Self::FreeShipping => "free_shipping",
            Self::BuyXGetY(_) => "buy_x_get_y",
            Self::Bundle(_) => "bundle",
        }
    }

    /// Money fields carried by this kind, labelled for error reporting.
    pub(crate) fn amounts(&self) -> SmallVec<[(&'static str, &Amount); 4]> {
        match self {
            Self::Percentage { max_discount, .. } => max_discount
                .iter()
                .map(|amount| ("max discount", amount))
                .collect(),
            Self::FixedAmount { amount } => SmallVec::from_iter([("discount amount", amount)]),
            Self::FreeShipping | Self::BuyXGetY(_) => SmallVec::new(),
            Self::Bundle(bundle) => bundle
                .items()
                .iter()
                .map(|item| ("bundle discounted price", &item.discounted_price))
                .collect(),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), PromotionError> {
        match self {
            Self::Percentage {
                max_discount: Some(cap),
                ..
            } if cap.to_minor_units() < 0 => Err(PromotionError::NegativeAmount("max discount")),
            Self::FixedAmount { amount } if amount.to_minor_units() <= 0 => {
                Err(PromotionError::NonPositiveAmount("discount amount"))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use rusty_money::{Money, iso::GBP};
    use testresult::TestResult;

    use super::*;

    fn bundle_item(product: &str, quantity: u32, price: i64) -> TestResult<BundleItem> {
        Ok(BundleItem {
            product: ProductId::from(product),
            quantity: NonZeroU32::new(quantity).ok_or("zero quantity")?,
            discounted_price: Money::from_minor(price, GBP),
        })
    }

    #[test]
    fn percent_accepts_range_bounds() -> TestResult {
        assert_eq!(Percent::new(Decimal::ONE_HUNDRED)?.value(), Decimal::ONE_HUNDRED);
        assert_eq!(Percent::new(Decimal::new(125, 1))?.value(), Decimal::new(125, 1));

        Ok(())
    }

    #[test]
    fn percent_rejects_zero_and_above_hundred() {
        assert!(matches!(
            Percent::new(Decimal::ZERO),
            Err(PromotionError::PercentOutOfRange(_))
        ));
        assert!(matches!(
            Percent::new(Decimal::new(1001, 1)),
            Err(PromotionError::PercentOutOfRange(_))
        ));
    }

    #[test]
    fn bundle_rejects_empty_and_duplicates() -> TestResult {
        assert!(matches!(
            Bundle::new(Vec::new()),
            Err(PromotionError::EmptyBundle)
        ));

        let result = Bundle::new([bundle_item("tee", 1, 500)?, bundle_item("tee", 2, 500)?]);

        assert!(matches!(
            result,
            Err(PromotionError::DuplicateBundleProduct(product)) if product.as_str() == "tee"
        ));

        Ok(())
    }

    #[test]
    fn fixed_amount_must_be_positive() {
        let kind = PromotionKind::FixedAmount {
            amount: Money::from_minor(0, GBP),
        };

        assert!(matches!(
            kind.validate(),
            Err(PromotionError::NonPositiveAmount(_))
        ));
    }

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(PromotionKind::FreeShipping.as_str(), "free_shipping");
        assert_eq!(
            PromotionKind::FixedAmount {
                amount: Money::from_minor(1, GBP)
            }
            .as_str(),
            "fixed_amount"
        );
    }
}
