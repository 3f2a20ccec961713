use crate::{
    entities::order::OrderStatus,
    errors::ServiceError,
    events::{Event, EventSender},
    models::{AddressInput, CartLineItem},
    payments::{CreateIntentRequest, PaymentProvider},
    repositories::{NewOrder, OrderRepository},
    services::pricing,
};
use metrics::counter;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn validate_currency(currency: &str) -> Result<(), ValidationError> {
    if currency.len() == 3 && currency.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("currency");
        err.message = Some("Currency must be a 3-letter ISO code".into());
        Err(err)
    }
}

/// Request to open a payment intent for the buyer's cart.
///
/// No client-supplied total is accepted anywhere on this type; the charge
/// amount is always recomputed server-side from the line items.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "cart_line_items": [
        {"id": "case-iphone-15", "name": "Protective Case", "unit_price": "19.99", "quantity": 2}
    ],
    "currency": "EUR",
    "buyer_email": "buyer@example.com"
}))]
pub struct CreatePaymentIntentInput {
    #[validate]
    pub cart_line_items: Vec<CartLineItem>,

    #[validate(length(equal = 3), custom = "validate_currency")]
    #[schema(example = "EUR")]
    pub currency: String,

    #[validate(email)]
    pub buyer_email: Option<String>,

    #[validate]
    pub buyer_address: Option<AddressInput>,

    pub buyer_id: Option<Uuid>,

    #[validate(length(max = 100))]
    pub repair_type: Option<String>,

    #[validate(length(max = 100))]
    pub shipping_option: Option<String>,
}

/// What the browser needs to confirm the payment client-side.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatePaymentIntentOutput {
    pub client_secret: String,
    pub order_id: Uuid,
}

/// Intent Initiator: turns a cart into an external payment intent plus an
/// optimistic order row awaiting webhook reconciliation.
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    provider: Arc<dyn PaymentProvider>,
    event_sender: EventSender,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        provider: Arc<dyn PaymentProvider>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            provider,
            event_sender,
        }
    }

    #[instrument(skip(self, input), fields(item_count = input.cart_line_items.len(), currency = %input.currency))]
    pub async fn create_payment_intent(
        &self,
        input: CreatePaymentIntentInput,
    ) -> Result<CreatePaymentIntentOutput, ServiceError> {
        input.validate()?;

        // Recomputed from line items; also rejects empty carts and
        // non-positive quantities/prices.
        let amount_minor_units =
            pricing::cart_total_minor_units(&input.cart_line_items, &input.currency)?;

        let metadata = pricing::metadata_summary(
            &input.cart_line_items,
            input.buyer_email.as_deref(),
            input.buyer_address.as_ref(),
            input.repair_type.as_deref(),
            input.shipping_option.as_deref(),
        );

        let intent = self
            .provider
            .create_intent(CreateIntentRequest {
                amount_minor_units,
                currency: input.currency.clone(),
                receipt_email: input.buyer_email.clone(),
                metadata,
            })
            .await?;

        // Persist address then order. If this window fails, the processor
        // holds an intent with no matching row; the webhook reconciler
        // rebuilds the order from the intent's metadata, so the error is
        // loud but recoverable.
        let repo = OrderRepository::new(self.db.clone());

        let address_id = match &input.buyer_address {
            Some(address) => {
                let created = repo.create_address(address).await.map_err(|e| {
                    error!(
                        intent_ref = %intent.id,
                        "address persistence failed after intent creation: {e}"
                    );
                    e
                })?;
                Some(created.id)
            }
            None => None,
        };

        let cart_snapshot = serde_json::to_value(&input.cart_line_items)?;
        let order = repo
            .create_order(NewOrder {
                payment_intent_ref: intent.id.clone(),
                amount_minor_units,
                currency: input.currency.clone(),
                status: OrderStatus::Created,
                buyer_email: input.buyer_email.clone(),
                cart_snapshot,
                address_id,
                buyer_id: input.buyer_id,
                repair_type: input.repair_type.clone(),
                shipping_option: input.shipping_option.clone(),
            })
            .await
            .map_err(|e| {
                error!(
                    intent_ref = %intent.id,
                    "order persistence failed after intent creation; webhook reconciliation will rebuild: {e}"
                );
                e
            })?;

        counter!("repairshop_checkout.intents_created", 1);
        info!(order_id = %order.id, intent_ref = %intent.id, amount_minor_units, "checkout order created");

        self.event_sender.send(Event::OrderCreated(order.id)).await;

        Ok(CreatePaymentIntentOutput {
            client_secret: intent.client_secret,
            order_id: order.id,
        })
    }
}
