use crate::payments::signature;
use crate::{errors::ServiceError, AppState};
use axum::{
    extract::State, http::HeaderMap, http::StatusCode, response::IntoResponse, routing::post,
    Router,
};
use bytes::Bytes;
use metrics::counter;
use serde_json::Value;
use tracing::warn;

/// Inbound payment processor webhook
///
/// The body is taken as raw bytes and the signature is verified over those
/// exact bytes before any JSON parsing; re-serialization anywhere upstream
/// would break verification.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Webhook accepted (including idempotent duplicates)"),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 500, description = "Persistence failure; processor should retry", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let verified = signature::verify_signature(
        &headers,
        &body,
        &state.config.payment_webhook_secret,
        state.config.payment_webhook_tolerance_secs,
    );
    if !verified {
        // Worth logging loudly: either a misconfigured secret or someone
        // probing the endpoint with forged events.
        warn!("payment webhook signature verification failed");
        counter!("repairshop_webhooks.rejected_signature", 1);
        return Err(ServiceError::SignatureVerificationFailed(
            "invalid webhook signature".to_string(),
        ));
    }

    let event: Value = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::BadRequest(format!("invalid json: {}", e)))?;

    state.services.reconciliation.process_event(&event).await?;

    Ok((StatusCode::OK, "ok"))
}

/// Payment webhook routes
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/webhook", post(payment_webhook))
}
