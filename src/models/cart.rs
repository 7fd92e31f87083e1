use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::CouponSnapshot;

/// One product line in a cart.
///
/// `price` is the offer-resolved unit price captured when the line was added or
/// last updated; totals never re-derive it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: Decimal,
    pub original_price: Decimal,
    #[serde(default)]
    pub discount_percentage: Decimal,
}

impl CartItem {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }

    /// Offer savings on this line, never negative.
    pub fn line_savings(&self) -> Decimal {
        ((self.original_price - self.price) * Decimal::from(self.quantity)).max(Decimal::ZERO)
    }
}

/// A shopper's cart. At most one coupon is applied at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub items: Vec<CartItem>,
    #[serde(default)]
    pub applied_coupon: Option<CouponSnapshot>,
    #[serde(default)]
    pub coupon_discount: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            items: Vec::new(),
            applied_coupon: None,
            coupon_discount: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }

    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(CartItem::line_total).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, product_id: Uuid) -> Option<&CartItem> {
        self.items.iter().find(|item| item.product_id == product_id)
    }

    pub fn item_mut(&mut self, product_id: Uuid) -> Option<&mut CartItem> {
        self.items
            .iter_mut()
            .find(|item| item.product_id == product_id)
    }

    pub fn has_coupon(&self) -> bool {
        self.applied_coupon.is_some()
    }

    pub(crate) fn clear_coupon(&mut self) {
        self.applied_coupon = None;
        self.coupon_discount = Decimal::ZERO;
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
