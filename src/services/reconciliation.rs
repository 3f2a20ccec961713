use crate::{
    entities::order::OrderStatus,
    errors::ServiceError,
    events::{Event, EventSender},
    models::{AddressInput, CartLineItem},
    repositories::{NewOrder, OrderRepository},
    services::notifications::{Notifier, OrderConfirmation},
};
use metrics::counter;
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Webhook Reconciler: the single writer of terminal order states.
///
/// Signature verification happens in the handler, over the raw bytes; by
/// the time an event reaches this service it is authenticated. Everything
/// here must be idempotent: the processor delivers at-least-once, in no
/// particular order relative to the initiator's own write.
pub struct ReconciliationService {
    db: Arc<DatabaseConnection>,
    notifier: Arc<dyn Notifier>,
    event_sender: EventSender,
}

impl ReconciliationService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        notifier: Arc<dyn Notifier>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            notifier,
            event_sender,
        }
    }

    /// Dispatch a verified webhook event. Events unrelated to payment
    /// completion are acknowledged without side effects.
    #[instrument(skip(self, event))]
    pub async fn process_event(&self, event: &Value) -> Result<(), ServiceError> {
        let event_type = event.get("type").and_then(|v| v.as_str()).unwrap_or("");
        match event_type {
            "payment_intent.succeeded" => self.finalize(event, OrderStatus::Succeeded).await,
            "payment_intent.payment_failed" | "payment_intent.canceled" => {
                self.finalize(event, OrderStatus::Failed).await
            }
            other => {
                info!(event_type = other, "ignoring unrelated webhook event");
                Ok(())
            }
        }
    }

    async fn finalize(&self, event: &Value, to: OrderStatus) -> Result<(), ServiceError> {
        let object = event.pointer("/data/object").unwrap_or(&Value::Null);
        let intent_ref = object
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ServiceError::InvalidInput("webhook event missing payment intent id".to_string())
            })?;

        let metadata = metadata_map(object);
        let buyer_email = object
            .get("receipt_email")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| metadata.get("buyer_email").cloned());
        let shipping = if to == OrderStatus::Succeeded {
            shipping_address_from_event(object, &metadata)
        } else {
            None
        };

        let repo = OrderRepository::new(self.db.clone());
        let existing = repo.find_by_intent_ref(intent_ref).await?;

        let (order_id, amount_minor_units, currency, email, summary, won) = match existing {
            Some(order) => {
                if order.order_status().is_some_and(OrderStatus::is_terminal) {
                    info!(intent_ref, status = %order.status, "duplicate webhook delivery for finalized order; no-op");
                    return Ok(());
                }

                // Fill the address in from the event only if the initiator
                // did not record one; address rows are never replaced.
                let address_id = match (&shipping, order.address_id) {
                    (Some(address), None) => Some(repo.create_address(address).await?.id),
                    _ => None,
                };

                let summary = cart_summary_from_snapshot(&order.cart_snapshot)
                    .or_else(|| metadata.get("cart_summary").cloned());
                let email = buyer_email
                    .clone()
                    .or_else(|| order.buyer_email.clone());
                let won = repo
                    .finalize_by_intent_ref(intent_ref, to, buyer_email.clone(), address_id)
                    .await?;

                (
                    order.id,
                    order.amount_minor_units,
                    order.currency.clone(),
                    email,
                    summary,
                    won,
                )
            }
            None => {
                // The initiator's write never landed (partial failure) or
                // has not landed yet (out-of-order delivery). The event
                // itself carries enough to reconstruct a minimal order.
                self.reconstruct_order(&repo, object, intent_ref, to, &metadata, &buyer_email, &shipping)
                    .await?
            }
        };

        if !won {
            info!(intent_ref, "lost finalization race; another delivery owns the transition");
            return Ok(());
        }

        counter!("repairshop_webhooks.orders_finalized", 1);

        match to {
            OrderStatus::Succeeded => {
                self.event_sender
                    .send(Event::PaymentSucceeded {
                        order_id,
                        payment_intent_ref: intent_ref.to_string(),
                    })
                    .await;

                // Exactly once per genuine transition: only the winning
                // delivery reaches this point. A failed send is logged and
                // deliberately not propagated, so the processor's retry
                // cannot duplicate the email.
                match &email {
                    Some(email) => {
                        let confirmation = OrderConfirmation {
                            order_id,
                            buyer_email: email.clone(),
                            amount_minor_units,
                            currency,
                            summary,
                        };
                        if let Err(e) = self.notifier.send_order_confirmation(&confirmation).await
                        {
                            error!(%order_id, "confirmation email failed; order stays finalized: {e}");
                        }
                    }
                    None => {
                        warn!(%order_id, "finalized order has no buyer email; skipping confirmation");
                    }
                }
            }
            OrderStatus::Failed => {
                self.event_sender
                    .send(Event::PaymentFailed {
                        order_id,
                        payment_intent_ref: intent_ref.to_string(),
                    })
                    .await;
            }
            OrderStatus::Created | OrderStatus::Abandoned => {}
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn reconstruct_order(
        &self,
        repo: &OrderRepository,
        object: &Value,
        intent_ref: &str,
        to: OrderStatus,
        metadata: &BTreeMap<String, String>,
        buyer_email: &Option<String>,
        shipping: &Option<AddressInput>,
    ) -> Result<(Uuid, i64, String, Option<String>, Option<String>, bool), ServiceError> {
        let amount_minor_units = object
            .get("amount_received")
            .and_then(|v| v.as_i64())
            .filter(|a| *a > 0)
            .or_else(|| object.get("amount").and_then(|v| v.as_i64()))
            .ok_or_else(|| {
                ServiceError::InvalidInput("webhook event missing amount".to_string())
            })?;
        let currency = object
            .get("currency")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ServiceError::InvalidInput("webhook event missing currency".to_string())
            })?
            .to_ascii_uppercase();

        let address_id = match shipping {
            Some(address) => Some(repo.create_address(address).await?.id),
            None => None,
        };

        let summary = metadata.get("cart_summary").cloned();
        let cart_snapshot = json!({
            "reconstructed_from_intent_metadata": true,
            "cart_summary": summary,
            "item_count": metadata
                .get("item_count")
                .and_then(|c| c.parse::<u64>().ok()),
        });

        let new_order = NewOrder {
            payment_intent_ref: intent_ref.to_string(),
            amount_minor_units,
            currency: currency.clone(),
            status: to,
            buyer_email: buyer_email.clone(),
            cart_snapshot,
            address_id,
            buyer_id: None,
            repair_type: metadata.get("repair_type").cloned(),
            shipping_option: metadata.get("shipping_option").cloned(),
        };

        match repo.create_order(new_order).await {
            Ok(order) => {
                warn!(
                    intent_ref,
                    order_id = %order.id,
                    "order reconstructed from webhook event; initiator write never observed"
                );
                counter!("repairshop_webhooks.orders_reconstructed", 1);
                Ok((
                    order.id,
                    amount_minor_units,
                    currency,
                    buyer_email.clone(),
                    summary,
                    true,
                ))
            }
            Err(ServiceError::DatabaseError(db_err)) => {
                // Insert race: the initiator (or a concurrent delivery)
                // created the row between our lookup and insert. Converge
                // through the conditional update.
                let Some(order) = repo.find_by_intent_ref(intent_ref).await? else {
                    return Err(ServiceError::DatabaseError(db_err));
                };
                let won = repo
                    .finalize_by_intent_ref(intent_ref, to, buyer_email.clone(), None)
                    .await?;
                Ok((
                    order.id,
                    order.amount_minor_units,
                    order.currency.clone(),
                    buyer_email.clone().or_else(|| order.buyer_email.clone()),
                    cart_summary_from_snapshot(&order.cart_snapshot),
                    won,
                ))
            }
            Err(e) => Err(e),
        }
    }
}

fn metadata_map(object: &Value) -> BTreeMap<String, String> {
    object
        .get("metadata")
        .and_then(|v| v.as_object())
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn cart_summary_from_snapshot(snapshot: &Value) -> Option<String> {
    let items: Vec<CartLineItem> = serde_json::from_value(snapshot.clone()).ok()?;
    if items.is_empty() {
        return None;
    }
    Some(
        items
            .iter()
            .map(|i| format!("{}x {}", i.quantity, i.name))
            .collect::<Vec<_>>()
            .join(", "),
    )
}

/// Extracts the shipping address from the event's structured `shipping`
/// block, falling back to the `ship_*` metadata captured at intent-creation
/// time.
fn shipping_address_from_event(
    object: &Value,
    metadata: &BTreeMap<String, String>,
) -> Option<AddressInput> {
    if let Some(shipping) = object.get("shipping") {
        let name = shipping.get("name").and_then(|v| v.as_str());
        if let Some(addr) = shipping.get("address") {
            let get = |key: &str| addr.get(key).and_then(|v| v.as_str());
            if let (Some(line1), Some(city), Some(postal_code), Some(country)) = (
                get("line1"),
                get("city"),
                get("postal_code"),
                get("country"),
            ) {
                return Some(AddressInput {
                    name: name.unwrap_or("Customer").to_string(),
                    line1: line1.to_string(),
                    line2: get("line2").map(str::to_string),
                    city: city.to_string(),
                    state: get("state").map(str::to_string),
                    postal_code: postal_code.to_string(),
                    country: country.to_string(),
                });
            }
        }
    }

    match (
        metadata.get("ship_line1"),
        metadata.get("ship_city"),
        metadata.get("ship_postal"),
        metadata.get("ship_country"),
    ) {
        (Some(line1), Some(city), Some(postal_code), Some(country)) => Some(AddressInput {
            name: metadata
                .get("ship_name")
                .cloned()
                .unwrap_or_else(|| "Customer".to_string()),
            line1: line1.clone(),
            line2: metadata.get("ship_line2").cloned(),
            city: city.clone(),
            state: metadata.get("ship_state").cloned(),
            postal_code: postal_code.clone(),
            country: country.clone(),
        }),
        _ => None,
    }
}
