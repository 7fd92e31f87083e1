use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use super::CouponSnapshot;
use crate::errors::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum OrderItemStatus {
    Active,
    Cancelled,
    #[strum(serialize = "Return Requested")]
    ReturnRequested,
    #[strum(serialize = "Return Approved")]
    ReturnApproved,
    #[strum(serialize = "Return Rejected")]
    ReturnRejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum OrderStatus {
    Placed,
    Delivered,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentMethod {
    CashOnDelivery,
    Wallet,
    Online,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
}

/// One line of a placed order.
///
/// Price and quantity are optional so that damaged records reach the refund
/// allocator and are rejected there instead of being treated as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: Option<i32>,
    pub price: Option<Decimal>,
    pub status: OrderItemStatus,
    #[serde(default)]
    pub refund_amount: Option<Decimal>,
    #[serde(default)]
    pub item_coupon_discount: Option<Decimal>,
}

impl OrderItem {
    pub fn new(product_id: Uuid, quantity: i32, price: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id,
            quantity: Some(quantity),
            price: Some(price),
            status: OrderItemStatus::Active,
            refund_amount: None,
            item_coupon_discount: None,
        }
    }

    /// `price × quantity`, or `MalformedInput` when either is missing or not positive.
    pub fn item_total(&self) -> Result<Decimal, ServiceError> {
        match (self.price, self.quantity) {
            (Some(price), Some(quantity)) if price > Decimal::ZERO && quantity > 0 => {
                Ok(price * Decimal::from(quantity))
            }
            (None, _) => Err(ServiceError::MalformedInput(format!(
                "order item {} has no price",
                self.id
            ))),
            (_, None) => Err(ServiceError::MalformedInput(format!(
                "order item {} has no quantity",
                self.id
            ))),
            _ => Err(ServiceError::MalformedInput(format!(
                "order item {} has a non-positive price or quantity",
                self.id
            ))),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == OrderItemStatus::Active
    }
}

/// Snapshot of a cart at checkout plus the running coupon ledger.
///
/// `total_coupon` is the coupon discount granted at checkout,
/// `deduct_refund_coupon` how much of it cancellations and returns have
/// consumed so far, and `balance_coupon` what is left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub applied_coupon: Option<CouponSnapshot>,
    #[serde(default)]
    pub coupon_discount: Decimal,
    pub original_subtotal: Decimal,
    pub delivery_charge: Decimal,
    pub total: Decimal,
    #[serde(default)]
    pub total_coupon: Decimal,
    #[serde(default)]
    pub deduct_refund_coupon: Decimal,
    #[serde(default)]
    pub balance_coupon: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn item(&self, item_id: Uuid) -> Result<&OrderItem, ServiceError> {
        self.items
            .iter()
            .find(|item| item.id == item_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Item {} not found in order {}", item_id, self.id))
            })
    }

    pub fn item_mut(&mut self, item_id: Uuid) -> Result<&mut OrderItem, ServiceError> {
        let order_id = self.id;
        self.items
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Item {} not found in order {}", item_id, order_id))
            })
    }

    /// Coupon discount not yet consumed by cancellations or returns.
    pub fn coupon_remaining(&self) -> Decimal {
        (self.total_coupon - self.deduct_refund_coupon).max(Decimal::ZERO)
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }

    /// Marks the order delivered; cash on delivery is collected at this point.
    pub fn mark_delivered(&mut self, now: DateTime<Utc>) -> Result<(), ServiceError> {
        if self.status != OrderStatus::Placed {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} cannot be delivered from status {}",
                self.id, self.status
            )));
        }
        self.status = OrderStatus::Delivered;
        if self.payment_method == PaymentMethod::CashOnDelivery {
            self.payment_status = PaymentStatus::Paid;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Re-derives the order and payment status once no item is active.
    pub(crate) fn settle_status(&mut self) {
        if self.items.iter().any(|item| {
            matches!(
                item.status,
                OrderItemStatus::Active
                    | OrderItemStatus::ReturnRequested
                    | OrderItemStatus::ReturnRejected
            )
        }) {
            return;
        }
        if self
            .items
            .iter()
            .all(|item| item.status == OrderItemStatus::Cancelled)
        {
            self.status = OrderStatus::Cancelled;
        }
        if self.payment_status == PaymentStatus::Paid {
            self.payment_status = PaymentStatus::Refunded;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    fn order(items: Vec<OrderItem>, method: PaymentMethod) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            items,
            status: OrderStatus::Placed,
            payment_method: method,
            payment_status: PaymentStatus::Pending,
            applied_coupon: None,
            coupon_discount: Decimal::ZERO,
            original_subtotal: Decimal::ZERO,
            delivery_charge: Decimal::ZERO,
            total: Decimal::ZERO,
            total_coupon: Decimal::ZERO,
            deduct_refund_coupon: Decimal::ZERO,
            balance_coupon: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_item_total() {
        let item = OrderItem::new(Uuid::new_v4(), 3, dec!(19.99));
        assert_eq!(item.item_total().unwrap(), dec!(59.97));
    }

    #[test]
    fn test_item_total_rejects_missing_fields() {
        let mut item = OrderItem::new(Uuid::new_v4(), 1, dec!(10));
        item.price = None;
        assert_matches!(item.item_total(), Err(ServiceError::MalformedInput(_)));

        let mut item = OrderItem::new(Uuid::new_v4(), 1, dec!(10));
        item.quantity = Some(0);
        assert_matches!(item.item_total(), Err(ServiceError::MalformedInput(_)));

        let item = OrderItem::new(Uuid::new_v4(), 2, Decimal::ZERO);
        assert_matches!(item.item_total(), Err(ServiceError::MalformedInput(_)));
    }

    #[test]
    fn test_mark_delivered_collects_cash() {
        let mut o = order(vec![], PaymentMethod::CashOnDelivery);
        o.mark_delivered(Utc::now()).unwrap();
        assert_eq!(o.status, OrderStatus::Delivered);
        assert!(o.is_paid());
        assert!(o.mark_delivered(Utc::now()).is_err());
    }

    #[test]
    fn test_settle_status_all_cancelled() {
        let mut item = OrderItem::new(Uuid::new_v4(), 1, dec!(10));
        item.status = OrderItemStatus::Cancelled;
        let mut o = order(vec![item], PaymentMethod::Wallet);
        o.payment_status = PaymentStatus::Paid;
        o.settle_status();
        assert_eq!(o.status, OrderStatus::Cancelled);
        assert_eq!(o.payment_status, PaymentStatus::Refunded);
    }

    #[test]
    fn test_settle_status_keeps_open_orders() {
        let active = OrderItem::new(Uuid::new_v4(), 1, dec!(10));
        let mut o = order(vec![active], PaymentMethod::Wallet);
        o.payment_status = PaymentStatus::Paid;
        o.settle_status();
        assert_eq!(o.status, OrderStatus::Placed);
        assert!(o.is_paid());
    }

    #[test]
    fn test_item_status_display() {
        assert_eq!(OrderItemStatus::ReturnApproved.to_string(), "Return Approved");
        assert_eq!(
            OrderItemStatus::from_str("Return Requested").ok(),
            Some(OrderItemStatus::ReturnRequested)
        );
        assert_eq!(PaymentMethod::CashOnDelivery.to_string(), "cash_on_delivery");
    }

    #[test]
    fn test_coupon_remaining_never_negative() {
        let mut o = order(vec![], PaymentMethod::Online);
        o.total_coupon = dec!(100);
        o.deduct_refund_coupon = dec!(120);
        assert_eq!(o.coupon_remaining(), Decimal::ZERO);
    }
}
