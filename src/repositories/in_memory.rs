use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::{CouponLedger, CouponStore, OfferStore, OrderLedgerStore, WalletStore};
use crate::errors::ServiceError;
use crate::models::{coupon::normalize_code, Coupon, Offer, Wallet, WalletTransaction};

/// Process-local store for every pricing counter.
///
/// Each conditional update runs while holding the shard lock of the entry it
/// touches, so a check and its write can never interleave with another
/// request on the same key.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    coupons: Arc<DashMap<Uuid, Coupon>>,
    coupon_codes: Arc<DashMap<String, Uuid>>,
    offers: Arc<DashMap<Uuid, Offer>>,
    ledgers: Arc<DashMap<Uuid, CouponLedger>>,
    wallets: Arc<DashMap<Uuid, Wallet>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CouponStore for InMemoryStore {
    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>, ServiceError> {
        let id = match self.coupon_codes.get(&normalize_code(code)) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.coupons.get(&id).map(|c| c.clone()))
    }

    async fn find_by_id(&self, coupon_id: Uuid) -> Result<Option<Coupon>, ServiceError> {
        Ok(self.coupons.get(&coupon_id).map(|c| c.clone()))
    }

    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<Coupon>, ServiceError> {
        let mut coupons: Vec<Coupon> = self
            .coupons
            .iter()
            .filter(|c| c.check_window(now).is_ok())
            .map(|c| c.clone())
            .collect();
        coupons.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(coupons)
    }

    async fn save(&self, coupon: &Coupon) -> Result<(), ServiceError> {
        coupon.validate_terms()?;
        let mut coupon = coupon.clone();
        coupon.code = normalize_code(&coupon.code);

        if let Some(owner) = self.coupon_codes.get(&coupon.code) {
            if *owner != coupon.id {
                return Err(ServiceError::ValidationError(format!(
                    "Coupon code {} is already in use",
                    coupon.code
                )));
            }
        }

        if let Some(previous) = self.coupons.insert(coupon.id, coupon.clone()) {
            if previous.code != coupon.code {
                self.coupon_codes.remove(&previous.code);
            }
        }
        self.coupon_codes.insert(coupon.code.clone(), coupon.id);
        Ok(())
    }

    async fn try_increment_usage(
        &self,
        coupon_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let Some(mut coupon) = self.coupons.get_mut(&coupon_id) else {
            return Ok(false);
        };
        if coupon.check_validity(now).is_err() {
            return Ok(false);
        }
        coupon.used_count += 1;
        debug!(%coupon_id, used_count = coupon.used_count, "coupon usage reserved");
        Ok(true)
    }

    async fn decrement_usage(&self, coupon_id: Uuid) -> Result<bool, ServiceError> {
        let Some(mut coupon) = self.coupons.get_mut(&coupon_id) else {
            return Ok(false);
        };
        if coupon.used_count <= 0 {
            return Ok(false);
        }
        coupon.used_count -= 1;
        debug!(%coupon_id, used_count = coupon.used_count, "coupon usage released");
        Ok(true)
    }
}

impl InMemoryStore {
    fn offers_where(&self, predicate: impl Fn(&Offer) -> bool) -> Vec<Offer> {
        let mut offers: Vec<Offer> = self
            .offers
            .iter()
            .filter(|o| predicate(o.value()))
            .map(|o| o.clone())
            .collect();
        offers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        offers
    }
}

#[async_trait]
impl OfferStore for InMemoryStore {
    async fn offers_for_product(&self, product_id: Uuid) -> Result<Vec<Offer>, ServiceError> {
        Ok(self.offers_where(|o| o.targets_product(product_id)))
    }

    async fn offers_for_category(&self, category_id: Uuid) -> Result<Vec<Offer>, ServiceError> {
        Ok(self.offers_where(|o| o.targets_category(category_id)))
    }

    async fn save(&self, offer: &Offer) -> Result<(), ServiceError> {
        offer.validate_terms()?;
        self.offers.insert(offer.id, offer.clone());
        Ok(())
    }
}

#[async_trait]
impl OrderLedgerStore for InMemoryStore {
    async fn register(&self, ledger: CouponLedger) -> Result<(), ServiceError> {
        match self.ledgers.entry(ledger.order_id) {
            Entry::Occupied(_) => Err(ServiceError::InvalidOperation(format!(
                "Coupon ledger for order {} already exists",
                ledger.order_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(ledger);
                Ok(())
            }
        }
    }

    async fn ledger(&self, order_id: Uuid) -> Result<Option<CouponLedger>, ServiceError> {
        Ok(self.ledgers.get(&order_id).map(|l| *l))
    }

    async fn try_consume(
        &self,
        order_id: Uuid,
        amount: Decimal,
    ) -> Result<Option<CouponLedger>, ServiceError> {
        let mut ledger = self.ledgers.get_mut(&order_id).ok_or_else(|| {
            ServiceError::NotFound(format!("Coupon ledger for order {} not found", order_id))
        })?;
        if amount < Decimal::ZERO || ledger.deduct_refund_coupon + amount > ledger.total_coupon {
            return Ok(None);
        }
        ledger.deduct_refund_coupon += amount;
        Ok(Some(*ledger))
    }

    async fn release(
        &self,
        order_id: Uuid,
        amount: Decimal,
    ) -> Result<Option<CouponLedger>, ServiceError> {
        let mut ledger = self.ledgers.get_mut(&order_id).ok_or_else(|| {
            ServiceError::NotFound(format!("Coupon ledger for order {} not found", order_id))
        })?;
        if amount < Decimal::ZERO || ledger.deduct_refund_coupon < amount {
            return Ok(None);
        }
        ledger.deduct_refund_coupon -= amount;
        debug!(%order_id, %amount, "coupon ledger consumption released");
        Ok(Some(*ledger))
    }
}

#[async_trait]
impl WalletStore for InMemoryStore {
    async fn balance(&self, user_id: Uuid) -> Result<Decimal, ServiceError> {
        Ok(self
            .wallets
            .get(&user_id)
            .map(|w| w.balance)
            .unwrap_or(Decimal::ZERO))
    }

    async fn credit(&self, transaction: &WalletTransaction) -> Result<Decimal, ServiceError> {
        let user_id = transaction.user_id;
        let mut wallet = self
            .wallets
            .entry(user_id)
            .or_insert_with(|| Wallet::empty(user_id));
        wallet.balance += transaction.amount;
        wallet.transactions.push(transaction.clone());
        Ok(wallet.balance)
    }

    async fn try_debit(
        &self,
        transaction: &WalletTransaction,
    ) -> Result<Option<Decimal>, ServiceError> {
        let Some(mut wallet) = self.wallets.get_mut(&transaction.user_id) else {
            return Ok(None);
        };
        if wallet.balance < transaction.amount {
            return Ok(None);
        }
        wallet.balance -= transaction.amount;
        wallet.transactions.push(transaction.clone());
        Ok(Some(wallet.balance))
    }

    async fn transactions(&self, user_id: Uuid) -> Result<Vec<WalletTransaction>, ServiceError> {
        Ok(self
            .wallets
            .get(&user_id)
            .map(|w| w.transactions.clone())
            .unwrap_or_default())
    }
}
