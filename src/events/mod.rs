use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Things that happened to carts, orders and wallets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    CouponApplied {
        cart_id: Uuid,
        coupon_id: Uuid,
        discount: Decimal,
    },
    CouponRemoved {
        cart_id: Uuid,
        coupon_id: Uuid,
    },
    CartUpdated(Uuid),
    OrderPlaced {
        order_id: Uuid,
        total: Decimal,
    },
    OrderItemCancelled {
        order_id: Uuid,
        item_id: Uuid,
        refund_amount: Decimal,
    },
    OrderItemReturned {
        order_id: Uuid,
        item_id: Uuid,
        refund_amount: Decimal,
    },
    WalletCredited {
        user_id: Uuid,
        amount: Decimal,
        order_id: Option<Uuid>,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Best-effort delivery that never blocks or fails the calling workflow.
    pub fn send_or_log(&self, event: Event) {
        if let Err(err) = self.sender.try_send(event) {
            warn!("Dropping event: {}", err);
        }
    }
}

/// Creates a sender and the receiver to hand to [`process_events`].
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender::new(tx), rx)
}

/// Drains the event channel, logging each event, until every sender is gone.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::CouponApplied {
                cart_id,
                coupon_id,
                discount,
            } => info!(%cart_id, %coupon_id, %discount, "coupon applied"),
            Event::CouponRemoved { cart_id, coupon_id } => {
                info!(%cart_id, %coupon_id, "coupon removed")
            }
            Event::CartUpdated(cart_id) => info!(%cart_id, "cart updated"),
            Event::OrderPlaced { order_id, total } => info!(%order_id, %total, "order placed"),
            Event::OrderItemCancelled {
                order_id,
                item_id,
                refund_amount,
            } => info!(%order_id, %item_id, %refund_amount, "order item cancelled"),
            Event::OrderItemReturned {
                order_id,
                item_id,
                refund_amount,
            } => info!(%order_id, %item_id, %refund_amount, "order item returned"),
            Event::WalletCredited {
                user_id,
                amount,
                order_id,
            } => info!(%user_id, %amount, ?order_id, "wallet credited"),
        }
    }

    info!("Event processing loop stopped");
}
