use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Domain events emitted by the core services. Delivery is fire-and-forget:
/// the services never depend on a consumer succeeding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CartUpdated(i64),
    CouponApplied { cart_id: i64, code: String },
    OrderPlaced { order_id: i64, user_id: i64 },
    OrderStatusChanged {
        order_id: i64,
        old_status: String,
        new_status: String,
    },
    OrderPaymentUpdated { order_id: i64, payment_status: String },
    StockDecremented { product_id: i64, sku: String, quantity: i32 },
    StockRestored { product_id: i64, quantity: i32 },
    WalletDebited { user_id: i64, order_id: i64 },
    WalletCredited { user_id: i64, order_id: i64 },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Send and log on failure instead of propagating; used on paths where
    /// the triggering operation already committed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping event: {}", e);
        }
    }
}

/// Drain the event channel. Consumers (websocket fan-out, audit trail)
/// hang off this loop; the default processor just records the stream.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");
    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderPlaced { order_id, user_id } => {
                info!(order_id, user_id, "order placed");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(order_id, %old_status, %new_status, "order status changed");
            }
            other => {
                info!(event = ?other, "event");
            }
        }
    }
    info!("Event channel closed; processor exiting");
}
