//! Storage seams for the pricing counters.
//!
//! Carts and orders are owned by the calling workflows; the stores only hold
//! what must be updated atomically across concurrent requests: coupon usage,
//! the per-order coupon ledger and wallet balances.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{Coupon, Offer, WalletTransaction};

pub mod in_memory;
pub mod sea_orm_store;

pub use in_memory::InMemoryStore;
pub use sea_orm_store::SeaOrmStore;

#[async_trait]
pub trait CouponStore: Send + Sync {
    /// Looks a coupon up by its normalized code.
    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>, ServiceError>;

    async fn find_by_id(&self, coupon_id: Uuid) -> Result<Option<Coupon>, ServiceError>;

    /// Active coupons whose window contains `now`, in code order.
    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<Coupon>, ServiceError>;

    /// Inserts or replaces a coupon.
    async fn save(&self, coupon: &Coupon) -> Result<(), ServiceError>;

    /// Reserves one use if the coupon is active, in its window and below its
    /// limit. Returns `false` when nothing was reserved.
    async fn try_increment_usage(
        &self,
        coupon_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError>;

    /// Releases one use. Returns `false` when the count was already zero.
    async fn decrement_usage(&self, coupon_id: Uuid) -> Result<bool, ServiceError>;
}

#[async_trait]
pub trait OfferStore: Send + Sync {
    /// Offers targeting the product, oldest first.
    async fn offers_for_product(&self, product_id: Uuid) -> Result<Vec<Offer>, ServiceError>;

    /// Offers targeting the category, oldest first.
    async fn offers_for_category(&self, category_id: Uuid) -> Result<Vec<Offer>, ServiceError>;

    async fn save(&self, offer: &Offer) -> Result<(), ServiceError>;
}

/// Running record of how much of an order's coupon discount refunds consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponLedger {
    pub order_id: Uuid,
    pub total_coupon: Decimal,
    pub deduct_refund_coupon: Decimal,
}

impl CouponLedger {
    pub fn new(order_id: Uuid, total_coupon: Decimal) -> Self {
        Self {
            order_id,
            total_coupon,
            deduct_refund_coupon: Decimal::ZERO,
        }
    }

    pub fn remaining(&self) -> Decimal {
        (self.total_coupon - self.deduct_refund_coupon).max(Decimal::ZERO)
    }
}

#[async_trait]
pub trait OrderLedgerStore: Send + Sync {
    /// Records a new order's ledger. Registering the same order twice is rejected.
    async fn register(&self, ledger: CouponLedger) -> Result<(), ServiceError>;

    async fn ledger(&self, order_id: Uuid) -> Result<Option<CouponLedger>, ServiceError>;

    /// Adds `amount` to `deduct_refund_coupon` only while the result stays
    /// within `total_coupon`. Returns the updated ledger, or `None` when the
    /// allocation would overrun it.
    async fn try_consume(
        &self,
        order_id: Uuid,
        amount: Decimal,
    ) -> Result<Option<CouponLedger>, ServiceError>;

    /// Gives back `amount` taken by [`try_consume`](Self::try_consume) when the
    /// refund it belonged to could not be completed. Returns the updated
    /// ledger, or `None` when less than `amount` was consumed.
    async fn release(
        &self,
        order_id: Uuid,
        amount: Decimal,
    ) -> Result<Option<CouponLedger>, ServiceError>;
}

#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn balance(&self, user_id: Uuid) -> Result<Decimal, ServiceError>;

    /// Applies a credit and records it. Returns the new balance.
    async fn credit(&self, transaction: &WalletTransaction) -> Result<Decimal, ServiceError>;

    /// Applies a debit only if the balance covers it. Returns the new balance,
    /// or `None` when funds are insufficient.
    async fn try_debit(
        &self,
        transaction: &WalletTransaction,
    ) -> Result<Option<Decimal>, ServiceError>;

    /// Transactions for the user, oldest first.
    async fn transactions(&self, user_id: Uuid) -> Result<Vec<WalletTransaction>, ServiceError>;
}
