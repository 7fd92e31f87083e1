use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::{
    errors::ServiceError,
    models::{Offer, ProductSummary},
    money::{ratio_percent, round_money, round_percent},
    repositories::OfferStore,
};

/// Price a product sells at once the best eligible offer is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestOffer {
    pub has_offer: bool,
    pub regular_price: Decimal,
    pub final_price: Decimal,
    /// Whole percent off the base price.
    pub discount_percentage: Decimal,
    pub offer: Option<Offer>,
}

impl BestOffer {
    fn without_offer(product: &ProductSummary) -> Self {
        let regular = product.list_price();
        let base = product.base_price();
        Self {
            has_offer: false,
            regular_price: round_money(regular),
            final_price: round_money(base),
            discount_percentage: round_percent(ratio_percent(regular - base, regular)),
            offer: None,
        }
    }
}

/// Picks the offer giving `product` the largest discount at `now`.
///
/// Offers targeting the product are considered before offers targeting its
/// category, each group in the order given; an offer only replaces the current
/// best when its discount is strictly larger, so equal discounts resolve to
/// the first one considered. Offers that are inactive, outside their window,
/// aimed elsewhere or worth nothing are skipped. Malformed products get the
/// no-offer price.
pub fn get_best_offer(product: &ProductSummary, offers: &[Offer], now: DateTime<Utc>) -> BestOffer {
    let (Some(product_id), true) = (product.id, product.is_well_formed()) else {
        return BestOffer::without_offer(product);
    };

    let base = product.base_price();
    let by_product = offers.iter().filter(|o| o.targets_product(product_id));
    let by_category = offers.iter().filter(|o| {
        product
            .category_id
            .map(|category_id| o.targets_category(category_id))
            .unwrap_or(false)
    });

    let mut best: Option<(&Offer, Decimal)> = None;
    for offer in by_product.chain(by_category) {
        if !offer.is_eligible_at(now) {
            continue;
        }
        let discount = offer.discount_for(base);
        if discount <= Decimal::ZERO {
            continue;
        }
        match best {
            Some((_, current)) if discount <= current => {}
            _ => best = Some((offer, discount)),
        }
    }

    let Some((offer, discount)) = best else {
        return BestOffer::without_offer(product);
    };

    BestOffer {
        has_offer: true,
        regular_price: round_money(product.list_price()),
        final_price: round_money((base - discount).max(Decimal::ZERO)),
        discount_percentage: round_percent(ratio_percent(discount, base)),
        offer: Some(offer.clone()),
    }
}

/// Resolves offer prices against the offers in an [`OfferStore`].
#[derive(Clone)]
pub struct OfferService {
    store: Arc<dyn OfferStore>,
}

impl OfferService {
    pub fn new(store: Arc<dyn OfferStore>) -> Self {
        Self { store }
    }

    /// Best offer for the product. Pricing never fails: when the offers cannot
    /// be loaded the product is priced without one.
    #[instrument(skip(self, product), fields(product_id = ?product.id))]
    pub async fn best_offer_for(&self, product: &ProductSummary, now: DateTime<Utc>) -> BestOffer {
        let candidates = match self.candidates(product).await {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(error = %err, "Failed to load offers, pricing without offer");
                Vec::new()
            }
        };

        let best = get_best_offer(product, &candidates, now);
        debug!(
            has_offer = best.has_offer,
            final_price = %best.final_price,
            "offer resolved"
        );
        best
    }

    async fn candidates(&self, product: &ProductSummary) -> Result<Vec<Offer>, ServiceError> {
        let Some(product_id) = product.id else {
            return Ok(Vec::new());
        };

        let mut offers = self.store.offers_for_product(product_id).await?;
        if let Some(category_id) = product.category_id {
            for offer in self.store.offers_for_category(category_id).await? {
                if !offers.iter().any(|o| o.id == offer.id) {
                    offers.push(offer);
                }
            }
        }
        Ok(offers)
    }
}
