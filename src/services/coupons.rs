use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::{coupon::normalize_code, Cart, Coupon},
    repositories::CouponStore,
};

/// Applies and removes coupons on carts.
///
/// Every successful apply reserves exactly one use of the coupon and every
/// successful remove releases exactly one. Reservation is a single conditional
/// update in the store, so two carts racing for the last use cannot both win.
#[derive(Clone)]
pub struct CouponService {
    store: Arc<dyn CouponStore>,
    event_sender: Arc<EventSender>,
}

impl CouponService {
    pub fn new(store: Arc<dyn CouponStore>, event_sender: Arc<EventSender>) -> Self {
        Self {
            store,
            event_sender,
        }
    }

    /// Looks up a coupon by code, case-insensitively.
    pub async fn find_coupon(&self, code: &str) -> Result<Coupon, ServiceError> {
        let code = normalize_code(code);
        self.store
            .find_by_code(&code)
            .await?
            .ok_or(ServiceError::CouponNotFound(code))
    }

    /// Applies `code` to the cart and returns the discount granted.
    ///
    /// Re-applying the coupon already on the cart is a no-op; applying a
    /// different one while a coupon is applied is rejected.
    #[instrument(skip(self, cart), fields(cart_id = %cart.id))]
    pub async fn apply_coupon(
        &self,
        cart: &mut Cart,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Decimal, ServiceError> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(ServiceError::ValidationError(
                "Coupon code is required".to_string(),
            ));
        }

        if let Some(applied) = &cart.applied_coupon {
            if applied.code == code {
                return Ok(cart.coupon_discount);
            }
            return Err(ServiceError::InvalidOperation(format!(
                "Coupon {} is already applied; remove it before applying {}",
                applied.code, code
            )));
        }

        let coupon = self.find_coupon(&code).await?;
        let discount = coupon.calculate_discount(cart.subtotal(), now)?;

        if !self.store.try_increment_usage(coupon.id, now).await? {
            return Err(self.reservation_failure(&coupon, now).await);
        }

        cart.applied_coupon = Some(coupon.snapshot(now));
        cart.coupon_discount = discount;
        cart.touch();

        info!(coupon_id = %coupon.id, %discount, "Coupon applied");
        self.event_sender.send_or_log(Event::CouponApplied {
            cart_id: cart.id,
            coupon_id: coupon.id,
            discount,
        });

        Ok(discount)
    }

    /// Explains why a reservation that passed validation was refused.
    async fn reservation_failure(&self, coupon: &Coupon, now: DateTime<Utc>) -> ServiceError {
        let current = match self.store.find_by_id(coupon.id).await {
            Ok(Some(current)) => current,
            Ok(None) => return ServiceError::CouponNotFound(coupon.code.clone()),
            Err(err) => return err,
        };

        match current.check_validity(now) {
            Err(err) => {
                warn!(coupon_id = %coupon.id, error = %err, "Coupon became unusable while applying");
                err
            }
            Ok(()) => {
                error!(
                    coupon_id = %coupon.id,
                    used_count = current.used_count,
                    usage_limit = current.usage_limit,
                    "Coupon usage reservation lost to a concurrent update"
                );
                ServiceError::ConcurrentModification(coupon.id)
            }
        }
    }

    /// Removes the applied coupon and releases its use.
    ///
    /// Returns `false` without touching any counter when no coupon is applied,
    /// so removing twice releases once.
    #[instrument(skip(self, cart), fields(cart_id = %cart.id))]
    pub async fn remove_coupon(&self, cart: &mut Cart) -> Result<bool, ServiceError> {
        let Some(coupon_id) = cart.applied_coupon.as_ref().map(|c| c.coupon_id) else {
            return Ok(false);
        };

        if !self.store.decrement_usage(coupon_id).await? {
            warn!(%coupon_id, "Coupon usage was already zero on removal");
        }

        cart.clear_coupon();
        cart.touch();

        info!(%coupon_id, "Coupon removed");
        self.event_sender.send_or_log(Event::CouponRemoved {
            cart_id: cart.id,
            coupon_id,
        });

        Ok(true)
    }

    /// Coupons the shopper could apply to a cart with this subtotal right now.
    pub async fn list_available(
        &self,
        subtotal: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Vec<Coupon>, ServiceError> {
        Ok(self
            .store
            .list_active(now)
            .await?
            .into_iter()
            .filter(|c| c.is_valid(now) && c.min_purchase <= subtotal)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events;
    use crate::models::{CartItem, DiscountType};
    use crate::errors::ErrorKind;
    use crate::repositories::InMemoryStore;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn coupon(code: &str, usage_limit: i32) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: Uuid::new_v4(),
            code: code.to_string(),
            discount_type: DiscountType::Percentage,
            discount_value: dec!(10),
            min_purchase: dec!(200),
            max_discount: Some(dec!(50)),
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(1),
            usage_limit,
            used_count: 0,
            is_active: true,
        }
    }

    fn cart_with(subtotal: Decimal) -> Cart {
        let mut cart = Cart::new(Uuid::new_v4());
        cart.items.push(CartItem {
            product_id: Uuid::new_v4(),
            quantity: 1,
            price: subtotal,
            original_price: subtotal,
            discount_percentage: Decimal::ZERO,
        });
        cart
    }

    fn service() -> (CouponService, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let (sender, _rx) = events::channel(16);
        (CouponService::new(store.clone(), Arc::new(sender)), store)
    }

    /// Store that validates like the in-memory one but never grants a reservation.
    struct ContendedStore(InMemoryStore);

    #[async_trait]
    impl CouponStore for ContendedStore {
        async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>, ServiceError> {
            self.0.find_by_code(code).await
        }

        async fn find_by_id(&self, coupon_id: Uuid) -> Result<Option<Coupon>, ServiceError> {
            self.0.find_by_id(coupon_id).await
        }

        async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<Coupon>, ServiceError> {
            self.0.list_active(now).await
        }

        async fn save(&self, coupon: &Coupon) -> Result<(), ServiceError> {
            CouponStore::save(&self.0, coupon).await
        }

        async fn try_increment_usage(
            &self,
            _coupon_id: Uuid,
            _now: DateTime<Utc>,
        ) -> Result<bool, ServiceError> {
            Ok(false)
        }

        async fn decrement_usage(&self, coupon_id: Uuid) -> Result<bool, ServiceError> {
            self.0.decrement_usage(coupon_id).await
        }
    }

    async fn used_count(store: &InMemoryStore, id: Uuid) -> i32 {
        store.find_by_id(id).await.unwrap().unwrap().used_count
    }

    #[tokio::test]
    async fn test_apply_and_remove_restores_usage() {
        let (service, store) = service();
        let c = coupon("SAVE10", 5);
        CouponStore::save(store.as_ref(), &c).await.unwrap();
        let mut cart = cart_with(dec!(1000));

        let discount = service.apply_coupon(&mut cart, "save10", Utc::now()).await.unwrap();
        assert_eq!(discount, dec!(50));
        assert_eq!(cart.coupon_discount, dec!(50));
        assert_eq!(used_count(&store, c.id).await, 1);

        assert!(service.remove_coupon(&mut cart).await.unwrap());
        assert!(!service.remove_coupon(&mut cart).await.unwrap());
        assert_eq!(cart.coupon_discount, Decimal::ZERO);
        assert!(cart.applied_coupon.is_none());
        assert_eq!(used_count(&store, c.id).await, 0);
    }

    #[tokio::test]
    async fn test_unknown_code() {
        let (service, _) = service();
        let mut cart = cart_with(dec!(1000));
        assert_matches!(
            service.apply_coupon(&mut cart, "NOPE", Utc::now()).await,
            Err(ServiceError::CouponNotFound(code)) if code == "NOPE"
        );
    }

    #[tokio::test]
    async fn test_minimum_purchase_does_not_reserve() {
        let (service, store) = service();
        let c = coupon("SAVE10", 5);
        CouponStore::save(store.as_ref(), &c).await.unwrap();
        let mut cart = cart_with(dec!(150));

        assert_matches!(
            service.apply_coupon(&mut cart, "SAVE10", Utc::now()).await,
            Err(ServiceError::MinimumPurchaseNotMet { .. })
        );
        assert_eq!(used_count(&store, c.id).await, 0);
        assert!(cart.applied_coupon.is_none());
    }

    #[tokio::test]
    async fn test_reapply_same_code_is_noop() {
        let (service, store) = service();
        let c = coupon("SAVE10", 5);
        CouponStore::save(store.as_ref(), &c).await.unwrap();
        let mut cart = cart_with(dec!(1000));

        service.apply_coupon(&mut cart, "SAVE10", Utc::now()).await.unwrap();
        service.apply_coupon(&mut cart, "SAVE10", Utc::now()).await.unwrap();
        assert_eq!(used_count(&store, c.id).await, 1);
    }

    #[tokio::test]
    async fn test_second_coupon_rejected() {
        let (service, store) = service();
        CouponStore::save(store.as_ref(), &coupon("SAVE10", 5)).await.unwrap();
        CouponStore::save(store.as_ref(), &coupon("OTHER", 5)).await.unwrap();
        let mut cart = cart_with(dec!(1000));

        service.apply_coupon(&mut cart, "SAVE10", Utc::now()).await.unwrap();
        assert_matches!(
            service.apply_coupon(&mut cart, "OTHER", Utc::now()).await,
            Err(ServiceError::InvalidOperation(_))
        );
    }

    #[tokio::test]
    async fn test_exhausted_coupon_rejected() {
        let (service, store) = service();
        let mut c = coupon("GONE", 2);
        c.used_count = 2;
        CouponStore::save(store.as_ref(), &c).await.unwrap();
        let mut cart = cart_with(dec!(1000));

        assert_matches!(
            service.apply_coupon(&mut cart, "GONE", Utc::now()).await,
            Err(ServiceError::CouponUsageLimitReached(_))
        );
        assert_eq!(cart.coupon_discount, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_list_available_filters_by_subtotal() {
        let (service, store) = service();
        let mut cheap = coupon("CHEAP", 5);
        cheap.min_purchase = dec!(100);
        CouponStore::save(store.as_ref(), &cheap).await.unwrap();
        CouponStore::save(store.as_ref(), &coupon("SAVE10", 5)).await.unwrap();
        let mut inactive = coupon("OFF", 5);
        inactive.is_active = false;
        CouponStore::save(store.as_ref(), &inactive).await.unwrap();

        let codes: Vec<_> = service
            .list_available(dec!(150), Utc::now())
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.code)
            .collect();
        assert_eq!(codes, vec!["CHEAP".to_string()]);
    }

    #[tokio::test]
    async fn test_last_use_goes_to_first_cart() {
        let (service, store) = service();
        let mut c = coupon("LAST", 3);
        c.used_count = 2;
        CouponStore::save(store.as_ref(), &c).await.unwrap();

        let mut first = cart_with(dec!(1000));
        assert_eq!(
            service.apply_coupon(&mut first, "LAST", Utc::now()).await.unwrap(),
            dec!(50)
        );
        assert_eq!(used_count(&store, c.id).await, 3);

        let mut second = cart_with(dec!(1000));
        assert_matches!(
            service.apply_coupon(&mut second, "LAST", Utc::now()).await,
            Err(ServiceError::CouponUsageLimitReached(_))
        );
        assert!(second.applied_coupon.is_none());
        assert_eq!(used_count(&store, c.id).await, 3);
    }

    #[tokio::test]
    async fn test_refused_reservation_on_valid_coupon_is_a_conflict() {
        let store = Arc::new(ContendedStore(InMemoryStore::new()));
        let c = coupon("BUSY", 5);
        store.save(&c).await.unwrap();
        let (sender, _rx) = events::channel(16);
        let service = CouponService::new(store, Arc::new(sender));
        let mut cart = cart_with(dec!(1000));

        let err = service
            .apply_coupon(&mut cart, "BUSY", Utc::now())
            .await
            .unwrap_err();
        assert_matches!(&err, ServiceError::ConcurrentModification(id) if *id == c.id);
        assert_eq!(err.kind(), ErrorKind::Consistency);
        assert!(cart.applied_coupon.is_none());
    }
}
