//! Outbound buyer notifications.
//!
//! Delivery is fire-and-forget from the reconciler's point of view: a
//! failed send is logged and never affects the webhook acknowledgment.

use crate::services::pricing::format_minor_units;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Email endpoint rejected message: {0}")]
    Rejected(String),
}

/// Everything the confirmation email needs about a finalized order.
#[derive(Debug, Clone)]
pub struct OrderConfirmation {
    pub order_id: Uuid,
    pub buyer_email: String,
    pub amount_minor_units: i64,
    pub currency: String,
    pub summary: Option<String>,
}

impl OrderConfirmation {
    fn subject(&self) -> String {
        format!("Order confirmation {}", self.order_id)
    }

    fn body(&self) -> String {
        let mut body = format!(
            "Thank you for your order!\n\nOrder: {}\nTotal: {}\n",
            self.order_id,
            format_minor_units(self.amount_minor_units, &self.currency)
        );
        if let Some(summary) = &self.summary {
            body.push_str(&format!("Items: {}\n", summary));
        }
        body
    }
}

/// Trait for notification delivery backends
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), NotificationError>;
}

/// Notifier backed by a transactional email HTTP API.
pub struct HttpEmailNotifier {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    from_address: String,
}

impl HttpEmailNotifier {
    pub fn new(
        endpoint: String,
        api_key: Option<String>,
        from_address: String,
    ) -> Result<Self, NotificationError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            endpoint,
            api_key,
            from_address,
        })
    }
}

#[async_trait]
impl Notifier for HttpEmailNotifier {
    #[instrument(skip(self, confirmation), fields(order_id = %confirmation.order_id))]
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), NotificationError> {
        let payload = json!({
            "from": self.from_address,
            "to": confirmation.buyer_email,
            "subject": confirmation.subject(),
            "text": confirmation.body(),
        });

        let mut request = self.http.post(&self.endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(NotificationError::Rejected(format!(
                "http status {}",
                response.status()
            )));
        }

        info!("Order confirmation email sent");
        Ok(())
    }
}

/// Fallback notifier used when no email endpoint is configured; logs the
/// confirmation instead of delivering it.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), NotificationError> {
        info!(
            order_id = %confirmation.order_id,
            buyer_email = %confirmation.buyer_email,
            total = %format_minor_units(confirmation.amount_minor_units, &confirmation.currency),
            "Order confirmation (log-only notifier)"
        );
        Ok(())
    }
}
