pub mod signature;
pub mod stripe;

use crate::errors::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outbound request to open a payment intent with the external processor.
#[derive(Debug, Clone, Serialize)]
pub struct CreateIntentRequest {
    pub amount_minor_units: i64,
    pub currency: String,
    pub receipt_email: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// The processor's handle for an in-progress charge attempt.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

/// Seam to the external payment processor so the pipeline can be exercised
/// against a fake in tests.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_intent(&self, request: CreateIntentRequest)
        -> Result<PaymentIntent, ServiceError>;
}
