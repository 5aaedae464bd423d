//! Tally
//!
//! Tally decides whether a promotion applies to an order, calculates the
//! discount it grants, and records redemptions against usage limits so that
//! concurrent checkouts never over-redeem a promotion.

pub mod catalog;
pub mod clock;
pub mod customers;
pub mod discounts;
pub mod eligibility;
pub mod fixtures;
pub mod ids;
pub mod ledger;
pub mod orders;
pub mod prelude;
pub mod pricing;
pub mod promotions;
pub mod redemption;
