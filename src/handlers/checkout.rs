use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::checkout::{CreatePaymentIntentInput, CreatePaymentIntentOutput};
use crate::ApiResponse;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::post,
    Router,
};

/// Open a payment intent for the buyer's cart
///
/// Computes the charge amount server-side from the submitted line items,
/// opens an intent with the payment processor and records a provisional
/// order awaiting webhook reconciliation.
#[utoipa::path(
    post,
    path = "/api/v1/checkout/payment-intent",
    request_body = CreatePaymentIntentInput,
    responses(
        (status = 201, description = "Payment intent created", body = crate::ApiResponse<CreatePaymentIntentOutput>),
        (status = 400, description = "Empty cart or invalid line items", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment processor unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Json(input): Json<CreatePaymentIntentInput>,
) -> Result<(StatusCode, Json<ApiResponse<CreatePaymentIntentOutput>>), ServiceError> {
    let output = state.services.checkout.create_payment_intent(input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(output))))
}

/// Checkout routes
pub fn checkout_routes() -> Router<AppState> {
    Router::new().route("/payment-intent", post(create_payment_intent))
}
