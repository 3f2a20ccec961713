use crate::entities::order::OrderStatus;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::repositories::OrderRepository;
use crate::ApiResponse;
use axum::{
    extract::{Json, Path, State},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Order status as exposed to the storefront's post-checkout polling.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderStatusResponse {
    pub id: Uuid,
    pub status: Option<OrderStatus>,
    pub amount_minor_units: i64,
    pub currency: String,
    pub buyer_email: Option<String>,
}

/// Get order by ID
#[utoipa::path(
    get,
    path = "/api/v1/orders/{order_id}",
    params(
        ("order_id" = Uuid, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Order details", body = crate::ApiResponse<OrderStatusResponse>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderStatusResponse>>, ServiceError> {
    let repo = OrderRepository::new(state.db.clone());
    let order = repo
        .find_by_id(order_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

    let response = OrderStatusResponse {
        id: order.id,
        status: order.order_status(),
        amount_minor_units: order.amount_minor_units,
        currency: order.currency,
        buyer_email: order.buyer_email,
    };

    Ok(Json(ApiResponse::success(response)))
}

/// Order routes
pub fn order_routes() -> Router<AppState> {
    Router::new().route("/:order_id", get(get_order))
}
