#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use storefront_pricing::{
    config::PricingConfig,
    events,
    models::{Coupon, DiscountType, Offer, OfferTarget, ProductSummary},
    repositories::{CouponStore, InMemoryStore, OfferStore},
    PricingServices,
};
use uuid::Uuid;

/// Pricing services over a fresh in-memory store, with the event loop running.
pub struct TestApp {
    pub services: PricingServices,
    pub store: Arc<InMemoryStore>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(PricingConfig::default())
    }

    pub fn with_config(config: PricingConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let (sender, rx) = events::channel(config.event_channel_capacity);
        let event_task = tokio::spawn(events::process_events(rx));
        let services =
            PricingServices::with_store(Arc::new(config), Arc::new(sender), store.clone());

        Self {
            services,
            store,
            _event_task: event_task,
        }
    }

    pub async fn add_coupon(&self, coupon: &Coupon) {
        CouponStore::save(self.store.as_ref(), coupon)
            .await
            .expect("coupon saved");
    }

    pub async fn add_offer(&self, offer: &Offer) {
        OfferStore::save(self.store.as_ref(), offer)
            .await
            .expect("offer saved");
    }

    pub async fn used_count(&self, coupon_id: Uuid) -> i32 {
        self.store
            .find_by_id(coupon_id)
            .await
            .expect("store readable")
            .expect("coupon exists")
            .used_count
    }
}

pub fn product(regular: Decimal, sales: Option<Decimal>) -> ProductSummary {
    ProductSummary::new(Uuid::new_v4(), Uuid::new_v4(), regular, sales)
}

pub fn coupon(
    code: &str,
    discount_type: DiscountType,
    value: Decimal,
    min_purchase: Decimal,
    max_discount: Option<Decimal>,
    usage_limit: i32,
) -> Coupon {
    let now = Utc::now();
    Coupon {
        id: Uuid::new_v4(),
        code: code.to_string(),
        discount_type,
        discount_value: value,
        min_purchase,
        max_discount,
        valid_from: now - Duration::days(7),
        valid_until: now + Duration::days(7),
        usage_limit,
        used_count: 0,
        is_active: true,
    }
}

pub fn offer(
    target: OfferTarget,
    discount_type: DiscountType,
    value: Decimal,
    max_discount: Option<Decimal>,
    created_at: DateTime<Utc>,
) -> Offer {
    let now = Utc::now();
    Offer {
        id: Uuid::new_v4(),
        name: format!("{} {}", value, discount_type),
        discount_type,
        discount_value: value,
        max_discount,
        min_purchase: Decimal::ZERO,
        valid_from: now - Duration::days(7),
        valid_until: now + Duration::days(7),
        is_active: true,
        target,
        created_at,
    }
}
