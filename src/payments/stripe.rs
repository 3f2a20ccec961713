use super::{CreateIntentRequest, PaymentIntent, PaymentProvider};
use crate::config::AppConfig;
use crate::errors::ServiceError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info, instrument};

/// Stripe-compatible payment intent client.
///
/// Talks to `POST {api_base}/v1/payment_intents` with the account's secret
/// key. The request timeout is bounded so a stalled processor surfaces as a
/// retryable error to the buyer instead of hanging the checkout.
pub struct StripeGateway {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

impl StripeGateway {
    pub fn new(cfg: &AppConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.payment_provider_timeout_secs))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {e}")))?;

        Ok(Self {
            http,
            api_base: cfg.payment_api_base.trim_end_matches('/').to_string(),
            secret_key: cfg.payment_secret_key.clone(),
        })
    }
}

#[async_trait]
impl PaymentProvider for StripeGateway {
    #[instrument(skip(self, request), fields(amount = request.amount_minor_units, currency = %request.currency))]
    async fn create_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<PaymentIntent, ServiceError> {
        let mut form: Vec<(String, String)> = vec![
            ("amount".to_string(), request.amount_minor_units.to_string()),
            ("currency".to_string(), request.currency.to_ascii_lowercase()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        if let Some(email) = &request.receipt_email {
            form.push(("receipt_email".to_string(), email.clone()));
        }
        for (key, value) in &request.metadata {
            form.push((format!("metadata[{key}]"), value.clone()));
        }

        let response = self
            .http
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                error!("payment intent request failed: {e}");
                ServiceError::PaymentProviderError(if e.is_timeout() {
                    "payment processor timed out".to_string()
                } else {
                    "payment processor unreachable".to_string()
                })
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|b| b.error.message.or(b.error.error_type))
                .unwrap_or_else(|| format!("http status {status}"));
            error!(%status, "payment processor rejected intent creation: {detail}");
            return Err(ServiceError::PaymentProviderError(detail));
        }

        let intent: PaymentIntent = response.json().await.map_err(|e| {
            ServiceError::PaymentProviderError(format!("malformed intent response: {e}"))
        })?;

        info!(intent_id = %intent.id, "payment intent created");
        Ok(intent)
    }
}
