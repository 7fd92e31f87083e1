use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    config::PricingConfig,
    errors::ServiceError,
    events::{Event, EventSender},
    models::{Cart, Order, OrderItem, OrderStatus, PaymentMethod, PaymentStatus},
    repositories::{CouponLedger, CouponStore, OrderLedgerStore},
    services::{cart::calculate_totals, wallet::WalletService},
};

/// Turns a cart into an order, freezing prices and the coupon discount.
#[derive(Clone)]
pub struct CheckoutService {
    coupons: Arc<dyn CouponStore>,
    ledger: Arc<dyn OrderLedgerStore>,
    wallets: WalletService,
    config: Arc<PricingConfig>,
    event_sender: Arc<EventSender>,
}

impl CheckoutService {
    pub fn new(
        coupons: Arc<dyn CouponStore>,
        ledger: Arc<dyn OrderLedgerStore>,
        wallets: WalletService,
        config: Arc<PricingConfig>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            coupons,
            ledger,
            wallets,
            config,
            event_sender,
        }
    }

    /// Checks the applied coupon still exists and is active and in its window.
    ///
    /// Its use was reserved when it was applied, so the usage limit is not
    /// checked again.
    async fn revalidate_coupon(&self, cart: &Cart, now: DateTime<Utc>) -> Result<(), ServiceError> {
        let Some(snapshot) = &cart.applied_coupon else {
            return Ok(());
        };

        let live = self
            .coupons
            .find_by_id(snapshot.coupon_id)
            .await?
            .ok_or_else(|| ServiceError::CouponNotFound(snapshot.code.clone()))?;
        live.check_window(now)?;

        let subtotal = cart.subtotal();
        if snapshot.discount_for(subtotal).is_none() {
            return Err(ServiceError::MinimumPurchaseNotMet {
                required: snapshot.min_purchase,
                subtotal,
            });
        }
        Ok(())
    }

    /// Places an order for the cart and empties it.
    ///
    /// The applied coupon moves to the order; its use stays reserved.
    #[instrument(skip(self, cart), fields(cart_id = %cart.id, user_id = %cart.user_id))]
    pub async fn place_order(
        &self,
        cart: &mut Cart,
        payment_method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Result<Order, ServiceError> {
        if cart.is_empty() {
            return Err(ServiceError::InvalidOperation(
                "Cannot place an order from an empty cart".to_string(),
            ));
        }
        self.revalidate_coupon(cart, now).await?;

        let totals = calculate_totals(cart, &self.config.delivery_policy());
        let order_id = Uuid::new_v4();

        let payment_status = match payment_method {
            PaymentMethod::Wallet => {
                if totals.total > Decimal::ZERO {
                    self.wallets
                        .debit(
                            cart.user_id,
                            totals.total,
                            &format!("Payment for order {}", order_id),
                            Some(order_id),
                        )
                        .await?;
                }
                PaymentStatus::Paid
            }
            PaymentMethod::Online => PaymentStatus::Paid,
            PaymentMethod::CashOnDelivery => PaymentStatus::Pending,
        };

        let ledger = CouponLedger::new(order_id, totals.coupon_discount);
        if let Err(err) = self.ledger.register(ledger).await {
            error!(%order_id, error = %err, "Failed to register coupon ledger");
            if payment_method == PaymentMethod::Wallet && totals.total > Decimal::ZERO {
                self.wallets
                    .credit(
                        cart.user_id,
                        totals.total,
                        &format!("Reversal for failed order {}", order_id),
                        Some(order_id),
                    )
                    .await?;
            }
            return Err(err);
        }

        let order = Order {
            id: order_id,
            user_id: cart.user_id,
            items: cart
                .items
                .iter()
                .map(|item| OrderItem::new(item.product_id, item.quantity, item.price))
                .collect(),
            status: OrderStatus::Placed,
            payment_method,
            payment_status,
            applied_coupon: cart.applied_coupon.clone(),
            coupon_discount: totals.coupon_discount,
            original_subtotal: totals.subtotal,
            delivery_charge: totals.delivery_charge,
            total: totals.total,
            total_coupon: totals.coupon_discount,
            deduct_refund_coupon: Decimal::ZERO,
            balance_coupon: totals.coupon_discount,
            created_at: now,
            updated_at: now,
        };

        cart.items.clear();
        cart.clear_coupon();
        cart.touch();

        info!(%order_id, total = %order.total, %payment_method, "Order placed");
        self.event_sender.send_or_log(Event::OrderPlaced {
            order_id,
            total: order.total,
        });

        Ok(order)
    }
}
