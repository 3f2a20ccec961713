use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the payment pipeline for in-process consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    PaymentSucceeded {
        order_id: Uuid,
        payment_intent_ref: String,
    },
    PaymentFailed {
        order_id: Uuid,
        payment_intent_ref: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously; a full or closed channel is logged,
    /// never propagated into the request path.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!("Failed to send event: {}", e);
        }
    }
}

/// Drains the event channel, logging each event. Runs for the lifetime of
/// the process.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(%order_id, "event: order created");
            }
            Event::PaymentSucceeded {
                order_id,
                payment_intent_ref,
            } => {
                info!(%order_id, %payment_intent_ref, "event: payment succeeded");
            }
            Event::PaymentFailed {
                order_id,
                payment_intent_ref,
            } => {
                info!(%order_id, %payment_intent_ref, "event: payment failed");
            }
        }
    }
}
