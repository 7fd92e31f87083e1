//! Plain domain values the pricing services compute over.
//!
//! None of these types know about storage; the repositories translate them to
//! and from their persisted form.

pub mod cart;
pub mod coupon;
pub mod offer;
pub mod order;
pub mod product;
pub mod wallet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::money::percent_of;

pub use cart::{Cart, CartItem};
pub use coupon::{Coupon, CouponSnapshot};
pub use offer::{Offer, OfferTarget};
pub use order::{Order, OrderItem, OrderItemStatus, OrderStatus, PaymentMethod, PaymentStatus};
pub use product::ProductSummary;
pub use wallet::{TransactionKind, Wallet, WalletTransaction};

/// How an offer or coupon reduces a price.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

impl DiscountType {
    /// Raw discount on `amount` before the caller bounds it by the amount itself.
    ///
    /// `max_discount` only caps percentage discounts.
    pub fn raw_discount(
        self,
        amount: Decimal,
        value: Decimal,
        max_discount: Option<Decimal>,
    ) -> Decimal {
        match self {
            DiscountType::Percentage => {
                let discount = percent_of(amount, value);
                match max_discount {
                    Some(cap) if cap >= Decimal::ZERO => discount.min(cap),
                    _ => discount,
                }
            }
            DiscountType::Fixed => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    #[test]
    fn test_percentage_raw_discount_is_capped() {
        let discount = DiscountType::Percentage.raw_discount(dec!(1000), dec!(10), Some(dec!(50)));
        assert_eq!(discount, dec!(50));
    }

    #[test]
    fn test_fixed_ignores_cap() {
        let discount = DiscountType::Fixed.raw_discount(dec!(1000), dec!(75), Some(dec!(50)));
        assert_eq!(discount, dec!(75));
    }

    #[test]
    fn test_discount_type_round_trips_through_strings() {
        assert_eq!(DiscountType::from_str("percentage").ok(), Some(DiscountType::Percentage));
        assert_eq!(DiscountType::Fixed.to_string(), "fixed");
        let parsed: DiscountType = serde_json::from_str("\"fixed\"").expect("valid json");
        assert_eq!(parsed, DiscountType::Fixed);
    }
}
