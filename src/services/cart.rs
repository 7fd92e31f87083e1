use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::{DeliveryPolicy, PricingConfig},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{Cart, CartItem, ProductSummary},
    money::round_money,
    services::{coupons::CouponService, offers::OfferService},
};

/// Amounts shown to the shopper for a cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartTotals {
    pub subtotal: Decimal,
    pub delivery_charge: Decimal,
    pub coupon_discount: Decimal,
    pub total_savings: Decimal,
    pub total: Decimal,
    /// The stored coupon discount exceeded the subtotal and was clamped.
    #[serde(default)]
    pub coupon_was_clamped: bool,
}

/// Computes the cart's totals from its stored line prices and coupon discount.
///
/// Pure: nothing on the cart or the coupon is changed here.
pub fn calculate_totals(cart: &Cart, policy: &DeliveryPolicy) -> CartTotals {
    let subtotal = cart.subtotal().max(Decimal::ZERO);
    let stored = cart.coupon_discount;
    let coupon_discount = stored.max(Decimal::ZERO).min(subtotal);
    let delivery_charge = policy.charge_for(subtotal);
    let offer_savings: Decimal = cart.items.iter().map(CartItem::line_savings).sum();
    let total = (subtotal - coupon_discount + delivery_charge).max(Decimal::ZERO);

    CartTotals {
        subtotal: round_money(subtotal),
        delivery_charge: round_money(delivery_charge),
        coupon_discount: round_money(coupon_discount),
        total_savings: round_money(offer_savings + coupon_discount),
        total: round_money(total),
        coupon_was_clamped: coupon_discount != stored,
    }
}

/// Cart mutations that keep line prices, the coupon discount and totals in step.
#[derive(Clone)]
pub struct CartService {
    offers: OfferService,
    coupons: CouponService,
    config: Arc<PricingConfig>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(
        offers: OfferService,
        coupons: CouponService,
        config: Arc<PricingConfig>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            offers,
            coupons,
            config,
            event_sender,
        }
    }

    fn check_quantity(&self, quantity: i32) -> Result<(), ServiceError> {
        if self.config.quantity_range().contains(&quantity) {
            Ok(())
        } else {
            Err(ServiceError::QuantityOutOfRange {
                quantity,
                min: self.config.min_item_quantity,
                max: self.config.max_item_quantity,
            })
        }
    }

    /// Adds `quantity` of the product, merging with an existing line.
    #[instrument(skip(self, cart, product), fields(cart_id = %cart.id, product_id = ?product.id))]
    pub async fn add_item(
        &self,
        cart: &mut Cart,
        product: &ProductSummary,
        quantity: i32,
        now: DateTime<Utc>,
    ) -> Result<CartTotals, ServiceError> {
        self.check_quantity(quantity)?;
        let product_id = product
            .id
            .ok_or_else(|| ServiceError::ValidationError("Product id is required".to_string()))?;

        let merged = cart.item(product_id).map(|item| item.quantity + quantity);
        if let Some(merged) = merged {
            self.check_quantity(merged)?;
        }

        let best = self.offers.best_offer_for(product, now).await;
        match cart.item_mut(product_id) {
            Some(item) => {
                item.quantity += quantity;
                item.price = best.final_price;
                item.original_price = best.regular_price;
                item.discount_percentage = best.discount_percentage;
            }
            None => cart.items.push(CartItem {
                product_id,
                quantity,
                price: best.final_price,
                original_price: best.regular_price,
                discount_percentage: best.discount_percentage,
            }),
        }

        info!(quantity, price = %best.final_price, "Item added to cart");
        self.after_mutation(cart).await
    }

    /// Sets a line's quantity and re-prices it with the offers in force now.
    #[instrument(skip(self, cart, product), fields(cart_id = %cart.id, product_id = ?product.id))]
    pub async fn update_quantity(
        &self,
        cart: &mut Cart,
        product: &ProductSummary,
        quantity: i32,
        now: DateTime<Utc>,
    ) -> Result<CartTotals, ServiceError> {
        self.check_quantity(quantity)?;
        let product_id = product
            .id
            .ok_or_else(|| ServiceError::ValidationError("Product id is required".to_string()))?;
        if cart.item(product_id).is_none() {
            return Err(ServiceError::NotFound(format!(
                "Product {} is not in cart {}",
                product_id, cart.id
            )));
        }

        let best = self.offers.best_offer_for(product, now).await;
        if let Some(item) = cart.item_mut(product_id) {
            item.quantity = quantity;
            item.price = best.final_price;
            item.original_price = best.regular_price;
            item.discount_percentage = best.discount_percentage;
        }

        info!(quantity, "Cart item quantity updated");
        self.after_mutation(cart).await
    }

    #[instrument(skip(self, cart), fields(cart_id = %cart.id))]
    pub async fn remove_item(
        &self,
        cart: &mut Cart,
        product_id: Uuid,
    ) -> Result<CartTotals, ServiceError> {
        let before = cart.items.len();
        cart.items.retain(|item| item.product_id != product_id);
        if cart.items.len() == before {
            return Err(ServiceError::NotFound(format!(
                "Product {} is not in cart {}",
                product_id, cart.id
            )));
        }

        info!("Item removed from cart");
        self.after_mutation(cart).await
    }

    /// Empties the cart, releasing any applied coupon.
    #[instrument(skip(self, cart), fields(cart_id = %cart.id))]
    pub async fn clear(&self, cart: &mut Cart) -> Result<CartTotals, ServiceError> {
        self.coupons.remove_coupon(cart).await?;
        cart.items.clear();
        self.after_mutation(cart).await
    }

    /// Totals for the cart as it stands, persisting a clamped coupon discount.
    pub fn refresh_totals(&self, cart: &mut Cart) -> CartTotals {
        let totals = calculate_totals(cart, &self.config.delivery_policy());
        if totals.coupon_was_clamped {
            warn!(
                cart_id = %cart.id,
                stored = %cart.coupon_discount,
                clamped = %totals.coupon_discount,
                "Coupon discount exceeded subtotal, clamping"
            );
            cart.coupon_discount = totals.coupon_discount;
        }
        totals
    }

    /// Recomputes the coupon discount from the applied snapshot, dropping the
    /// coupon once the cart no longer meets its minimum purchase.
    async fn reconcile_coupon(&self, cart: &mut Cart) -> Result<(), ServiceError> {
        let Some(snapshot) = cart.applied_coupon.as_ref() else {
            return Ok(());
        };

        match snapshot.discount_for(cart.subtotal()) {
            Some(discount) => cart.coupon_discount = discount,
            None => {
                info!(
                    code = %snapshot.code,
                    min_purchase = %snapshot.min_purchase,
                    "Cart fell below coupon minimum, removing coupon"
                );
                self.coupons.remove_coupon(cart).await?;
            }
        }
        Ok(())
    }

    async fn after_mutation(&self, cart: &mut Cart) -> Result<CartTotals, ServiceError> {
        self.reconcile_coupon(cart).await?;
        cart.touch();
        self.event_sender.send_or_log(Event::CartUpdated(cart.id));
        Ok(self.refresh_totals(cart))
    }
}
