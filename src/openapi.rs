use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "repairshop-api",
        description = "Checkout payment intents, webhook reconciliation and order records for the repair-shop storefront"
    ),
    paths(
        crate::handlers::checkout::create_payment_intent,
        crate::handlers::payment_webhooks::payment_webhook,
        crate::handlers::orders::get_order,
    ),
    components(schemas(
        crate::models::CartLineItem,
        crate::models::AddressInput,
        crate::services::checkout::CreatePaymentIntentInput,
        crate::services::checkout::CreatePaymentIntentOutput,
        crate::handlers::orders::OrderStatusResponse,
        crate::entities::order::OrderStatus,
        crate::errors::ErrorResponse,
    )),
    tags(
        (name = "Checkout", description = "Cart to payment intent"),
        (name = "Payments", description = "Payment processor webhooks"),
        (name = "Orders", description = "Order records")
    )
)]
pub struct ApiDoc;

/// Swagger UI mounted at /docs, serving the generated document from
/// /api-docs/openapi.json
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
