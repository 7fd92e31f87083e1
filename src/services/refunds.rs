use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::{PricingConfig, RefundBasis},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{Order, OrderItemStatus, OrderStatus},
    money::{round_money, round_ratio},
    repositories::OrderLedgerStore,
    services::wallet::WalletService,
};

/// Share of an order's coupon discount attributed to one cancelled or
/// returned item, and what the shopper gets back for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemCouponRefund {
    pub item_coupon_discount: Decimal,
    pub remaining_coupon_discount: Decimal,
    /// `item_total / basis`, to four places.
    pub item_coupon_ratio: Decimal,
    pub item_total: Decimal,
    pub refund_amount: Decimal,
}

/// Allocates part of the order's coupon discount to `item_id`.
///
/// With [`RefundBasis::LiveActiveItems`] the item's share is measured against
/// the active items plus the item itself; with [`RefundBasis::OrderCreation`]
/// against the subtotal frozen at checkout. The allocation never exceeds the
/// coupon the order has left unconsumed, so repeated cancellations cannot
/// hand back more coupon than was granted.
///
/// A missing or non-positive price or quantity on any item the basis reads is
/// a `MalformedInput` error rather than a zero allocation.
pub fn calculate_item_coupon_refund(
    order: &Order,
    item_id: Uuid,
    basis: RefundBasis,
) -> Result<ItemCouponRefund, ServiceError> {
    let item = order.item(item_id)?;
    let item_total = item.item_total()?;

    if order.coupon_discount <= Decimal::ZERO {
        return Ok(ItemCouponRefund {
            item_coupon_discount: Decimal::ZERO,
            remaining_coupon_discount: Decimal::ZERO,
            item_coupon_ratio: Decimal::ZERO,
            item_total: round_money(item_total),
            refund_amount: round_money(item_total),
        });
    }

    let original_subtotal = match basis {
        RefundBasis::LiveActiveItems => {
            let mut subtotal = item_total;
            for other in order.items.iter().filter(|i| i.is_active() && i.id != item_id) {
                subtotal += other.item_total()?;
            }
            subtotal
        }
        RefundBasis::OrderCreation => order.original_subtotal,
    };

    let ratio = if original_subtotal > Decimal::ZERO {
        item_total / original_subtotal
    } else {
        Decimal::ZERO
    };

    let item_coupon_discount =
        round_money(order.coupon_discount * ratio).min(order.coupon_remaining());
    let remaining_coupon_discount = (order.coupon_discount - item_coupon_discount).max(Decimal::ZERO);
    let refund_amount = (item_total - item_coupon_discount).max(Decimal::ZERO);

    Ok(ItemCouponRefund {
        item_coupon_discount,
        remaining_coupon_discount: round_money(remaining_coupon_discount),
        item_coupon_ratio: round_ratio(ratio),
        item_total: round_money(item_total),
        refund_amount: round_money(refund_amount),
    })
}

/// Result of cancelling or returning one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundOutcome {
    pub order_id: Uuid,
    pub item_id: Uuid,
    pub status: OrderItemStatus,
    pub allocation: ItemCouponRefund,
    /// Wallet balance after the refund, when the refund went to the wallet.
    pub wallet_balance: Option<Decimal>,
}

/// Item cancellation and returns, netting out each item's coupon share.
#[derive(Clone)]
pub struct RefundService {
    ledger: Arc<dyn OrderLedgerStore>,
    wallets: WalletService,
    config: Arc<PricingConfig>,
    event_sender: Arc<EventSender>,
}

impl RefundService {
    pub fn new(
        ledger: Arc<dyn OrderLedgerStore>,
        wallets: WalletService,
        config: Arc<PricingConfig>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            ledger,
            wallets,
            config,
            event_sender,
        }
    }

    fn expect_item_status(
        order: &Order,
        item_id: Uuid,
        expected: OrderItemStatus,
        action: &str,
    ) -> Result<(), ServiceError> {
        let item = order.item(item_id)?;
        if item.status != expected {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot {} item {} in status {}",
                action, item_id, item.status
            )));
        }
        Ok(())
    }

    fn expect_order_status(
        order: &Order,
        expected: OrderStatus,
        action: &str,
    ) -> Result<(), ServiceError> {
        if order.status != expected {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot {} items of order {} in status {}",
                action, order.id, order.status
            )));
        }
        Ok(())
    }

    /// Cancels an active item of an undelivered order.
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn cancel_item(
        &self,
        order: &mut Order,
        item_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RefundOutcome, ServiceError> {
        Self::expect_order_status(order, OrderStatus::Placed, "cancel")?;
        Self::expect_item_status(order, item_id, OrderItemStatus::Active, "cancel")?;

        let outcome = self
            .settle(order, item_id, OrderItemStatus::Cancelled, now)
            .await?;
        self.event_sender.send_or_log(Event::OrderItemCancelled {
            order_id: order.id,
            item_id,
            refund_amount: outcome.allocation.refund_amount,
        });
        Ok(outcome)
    }

    /// Opens a return for an active item of a delivered order.
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    pub fn request_return(
        &self,
        order: &mut Order,
        item_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        Self::expect_order_status(order, OrderStatus::Delivered, "return")?;
        Self::expect_item_status(order, item_id, OrderItemStatus::Active, "return")?;

        order.item_mut(item_id)?.status = OrderItemStatus::ReturnRequested;
        order.updated_at = now;
        info!(%item_id, "Return requested");
        Ok(())
    }

    /// Declines a requested return. No money moves.
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    pub fn reject_return(
        &self,
        order: &mut Order,
        item_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        Self::expect_item_status(order, item_id, OrderItemStatus::ReturnRequested, "reject")?;

        order.item_mut(item_id)?.status = OrderItemStatus::ReturnRejected;
        order.updated_at = now;
        info!(%item_id, "Return rejected");
        Ok(())
    }

    /// Accepts a requested return and refunds the item net of its coupon share.
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn approve_return(
        &self,
        order: &mut Order,
        item_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RefundOutcome, ServiceError> {
        Self::expect_item_status(order, item_id, OrderItemStatus::ReturnRequested, "approve")?;

        let outcome = self
            .settle(order, item_id, OrderItemStatus::ReturnApproved, now)
            .await?;
        self.event_sender.send_or_log(Event::OrderItemReturned {
            order_id: order.id,
            item_id,
            refund_amount: outcome.allocation.refund_amount,
        });
        Ok(outcome)
    }

    /// Settles a cancellation or approved return.
    ///
    /// The coupon share is consumed and the wallet credited before the order
    /// is touched. A failed credit releases the consumed share, so the item
    /// keeps its status and the operation can be retried.
    async fn settle(
        &self,
        order: &mut Order,
        item_id: Uuid,
        status: OrderItemStatus,
        now: DateTime<Utc>,
    ) -> Result<RefundOutcome, ServiceError> {
        let allocation = calculate_item_coupon_refund(order, item_id, self.config.refund_basis)?;
        let consumed = allocation.item_coupon_discount;

        let ledger = if consumed > Decimal::ZERO {
            let Some(ledger) = self.ledger.try_consume(order.id, consumed).await? else {
                let remaining = self
                    .ledger
                    .ledger(order.id)
                    .await?
                    .map(|l| l.remaining())
                    .unwrap_or(Decimal::ZERO);
                error!(
                    %item_id,
                    requested = %consumed,
                    %remaining,
                    "Coupon allocation would exceed the order coupon"
                );
                return Err(ServiceError::AllocationExceeded {
                    order_id: order.id,
                    requested: consumed,
                    remaining,
                });
            };
            Some(ledger)
        } else {
            None
        };

        let wallet_balance = if order.is_paid() && allocation.refund_amount > Decimal::ZERO {
            let description = format!("Refund for item {} of order {}", item_id, order.id);
            match self
                .wallets
                .credit(
                    order.user_id,
                    allocation.refund_amount,
                    &description,
                    Some(order.id),
                )
                .await
            {
                Ok(balance) => Some(balance),
                Err(err) => {
                    error!(%item_id, error = %err, "Refund could not be credited to wallet");
                    if consumed > Decimal::ZERO {
                        self.release_consumed(order.id, item_id, consumed).await;
                    }
                    return Err(err);
                }
            }
        } else {
            None
        };

        if let Some(ledger) = ledger {
            order.deduct_refund_coupon = ledger.deduct_refund_coupon;
            order.balance_coupon = ledger.remaining();
        }

        let item = order.item_mut(item_id)?;
        item.status = status;
        item.refund_amount = Some(allocation.refund_amount);
        item.item_coupon_discount = Some(consumed);

        order.settle_status();
        order.updated_at = now;

        info!(
            %item_id,
            %status,
            item_coupon_discount = %consumed,
            refund_amount = %allocation.refund_amount,
            "Item refund settled"
        );

        Ok(RefundOutcome {
            order_id: order.id,
            item_id,
            status,
            allocation,
            wallet_balance,
        })
    }

    async fn release_consumed(&self, order_id: Uuid, item_id: Uuid, amount: Decimal) {
        match self.ledger.release(order_id, amount).await {
            Ok(Some(_)) => warn!(%item_id, %amount, "Released coupon share of failed refund"),
            Ok(None) => error!(%item_id, %amount, "Coupon share of failed refund was not released"),
            Err(err) => error!(
                %item_id,
                %amount,
                error = %err,
                "Coupon share of failed refund could not be released"
            ),
        }
    }
}
