//! Customer Targeting

use rustc_hash::FxHashSet;

use crate::{customers::Tenure, ids::CustomerId, orders::CustomerProfile};

/// Which customers a promotion is offered to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Targeting {
    /// Every customer, including anonymous orders
    #[default]
    All,

    /// Customers without previous orders
    NewCustomers,

    /// Customers with previous orders
    ReturningCustomers,

    /// Customers in the VIP segment
    VipCustomers,

    /// An explicit set of customers
    SpecificCustomers(FxHashSet<CustomerId>),
}

impl Targeting {
    /// Stable name of the targeting mode.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::NewCustomers => "new_customers",
            Self::ReturningCustomers => "returning_customers",
            Self::VipCustomers => "vip_customers",
            Self::SpecificCustomers(_) => "specific_customers",
        }
    }

    /// Whether deciding this targeting needs a customer classification.
    pub const fn needs_classification(&self) -> bool {
        matches!(
            self,
            Self::NewCustomers | Self::ReturningCustomers | Self::VipCustomers
        )
    }

    /// Whether the customer is targeted. Segment targeting fails when no
    /// classification was supplied.
    pub fn admits(&self, customer: Option<&CustomerProfile>) -> bool {
        let Some(customer) = customer else {
            return matches!(self, Self::All);
        };

        match self {
            Self::All => true,
            Self::SpecificCustomers(ids) => ids.contains(&customer.id),
            Self::NewCustomers => customer
                .class
                .is_some_and(|class| class.tenure == Tenure::New),
            Self::ReturningCustomers => customer
                .class
                .is_some_and(|class| class.tenure == Tenure::Returning),
            Self::VipCustomers => customer.class.is_some_and(|class| class.vip),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::customers::CustomerClass;

    use super::*;

    fn classified(id: &str, class: CustomerClass) -> CustomerProfile {
        CustomerProfile {
            id: CustomerId::from(id),
            class: Some(class),
        }
    }

    #[test]
    fn anonymous_orders_only_pass_all() {
        assert!(Targeting::All.admits(None));
        assert!(!Targeting::NewCustomers.admits(None));
        assert!(!Targeting::SpecificCustomers(FxHashSet::default()).admits(None));
    }

    #[test]
    fn segments_require_classification() {
        let unknown = CustomerProfile::unclassified("alice");

        assert!(!Targeting::NewCustomers.admits(Some(&unknown)));
        assert!(!Targeting::ReturningCustomers.admits(Some(&unknown)));
        assert!(!Targeting::VipCustomers.admits(Some(&unknown)));
        assert!(Targeting::All.admits(Some(&unknown)));
    }

    #[test]
    fn segments_match_classification() {
        let new = classified("alice", CustomerClass::new_customer());
        let vip = classified("bob", CustomerClass::vip());

        assert!(Targeting::NewCustomers.admits(Some(&new)));
        assert!(!Targeting::ReturningCustomers.admits(Some(&new)));
        assert!(Targeting::ReturningCustomers.admits(Some(&vip)));
        assert!(Targeting::VipCustomers.admits(Some(&vip)));
        assert!(!Targeting::VipCustomers.admits(Some(&new)));
    }

    #[test]
    fn specific_customers_membership() {
        let targeting =
            Targeting::SpecificCustomers(FxHashSet::from_iter([CustomerId::from("alice")]));

        assert!(targeting.admits(Some(&CustomerProfile::unclassified("alice"))));
        assert!(!targeting.admits(Some(&CustomerProfile::unclassified("bob"))));
    }
}
