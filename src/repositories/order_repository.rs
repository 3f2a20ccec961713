use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::address::{ActiveModel as AddressActiveModel, Model as AddressModel};
use crate::entities::order::{
    ActiveModel as OrderActiveModel, Column, Entity as Order, Model as OrderModel, OrderStatus,
};
use crate::errors::ServiceError;
use crate::models::AddressInput;
use crate::repositories::Repository;

use super::BaseRepository;

/// Fields for a new order row. The snapshot is written once here and never
/// updated afterwards.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub payment_intent_ref: String,
    pub amount_minor_units: i64,
    pub currency: String,
    pub status: OrderStatus,
    pub buyer_email: Option<String>,
    pub cart_snapshot: serde_json::Value,
    pub address_id: Option<Uuid>,
    pub buyer_id: Option<Uuid>,
    pub repair_type: Option<String>,
    pub shipping_option: Option<String>,
}

/// Repository for order and address persistence. The unique index on
/// `payment_intent_ref` plus the conditional status update below are the
/// pipeline's only serialization points.
#[derive(Debug)]
pub struct OrderRepository {
    base: BaseRepository,
}

impl OrderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Find an order by internal ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<OrderModel>, ServiceError> {
        Order::find_by_id(id)
            .one(self.base.get_db())
            .await
            .map_err(ServiceError::from)
    }

    /// Find an order by the processor's intent reference
    pub async fn find_by_intent_ref(
        &self,
        intent_ref: &str,
    ) -> Result<Option<OrderModel>, ServiceError> {
        Order::find()
            .filter(Column::PaymentIntentRef.eq(intent_ref))
            .one(self.base.get_db())
            .await
            .map_err(ServiceError::from)
    }

    /// Insert a new address row
    pub async fn create_address(&self, input: &AddressInput) -> Result<AddressModel, ServiceError> {
        let model = AddressActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.clone()),
            line1: Set(input.line1.clone()),
            line2: Set(input.line2.clone()),
            city: Set(input.city.clone()),
            state: Set(input.state.clone()),
            postal_code: Set(input.postal_code.clone()),
            country: Set(input.country.to_ascii_uppercase()),
            created_at: Set(Utc::now()),
        };

        model
            .insert(self.base.get_db())
            .await
            .map_err(ServiceError::from)
    }

    /// Insert a new order row. Fails with a database error if an order for
    /// the same intent reference already exists (unique index).
    pub async fn create_order(&self, new_order: NewOrder) -> Result<OrderModel, ServiceError> {
        let model = OrderActiveModel {
            id: Set(Uuid::new_v4()),
            payment_intent_ref: Set(new_order.payment_intent_ref),
            amount_minor_units: Set(new_order.amount_minor_units),
            currency: Set(new_order.currency.to_ascii_uppercase()),
            status: Set(new_order.status.to_string()),
            buyer_email: Set(new_order.buyer_email),
            cart_snapshot: Set(new_order.cart_snapshot),
            address_id: Set(new_order.address_id),
            buyer_id: Set(new_order.buyer_id),
            repair_type: Set(new_order.repair_type),
            shipping_option: Set(new_order.shipping_option),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        };

        model
            .insert(self.base.get_db())
            .await
            .map_err(ServiceError::from)
    }

    /// Conditionally transition the order for `intent_ref` into a terminal
    /// state, optionally filling in buyer email and address captured from
    /// the webhook payload.
    ///
    /// The UPDATE only matches rows whose status is still non-terminal, so
    /// of N concurrent deliveries exactly one observes `rows_affected == 1`
    /// and owns the side effects (confirmation email, events). Returns
    /// whether this call won the transition.
    pub async fn finalize_by_intent_ref(
        &self,
        intent_ref: &str,
        to: OrderStatus,
        buyer_email: Option<String>,
        address_id: Option<Uuid>,
    ) -> Result<bool, ServiceError> {
        debug_assert!(to.is_terminal());

        let mut update = Order::update_many()
            .col_expr(Column::Status, Expr::value(to.to_string()))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::PaymentIntentRef.eq(intent_ref))
            .filter(Column::Status.is_in([
                OrderStatus::Created.to_string(),
                OrderStatus::Abandoned.to_string(),
            ]));

        if let Some(email) = buyer_email {
            update = update.col_expr(Column::BuyerEmail, Expr::value(email));
        }
        if let Some(address_id) = address_id {
            update = update.col_expr(Column::AddressId, Expr::value(address_id));
        }

        let result = update.exec(self.base.get_db()).await?;
        Ok(result.rows_affected == 1)
    }

    /// Sweep stale optimistic orders: everything still `created` before the
    /// cutoff becomes `abandoned`. Returns the number of rows swept.
    pub async fn mark_abandoned_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, ServiceError> {
        let result = Order::update_many()
            .col_expr(
                Column::Status,
                Expr::value(OrderStatus::Abandoned.to_string()),
            )
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(Column::Status.eq(OrderStatus::Created.to_string()))
            .filter(Column::CreatedAt.lt(cutoff))
            .exec(self.base.get_db())
            .await?;

        Ok(result.rows_affected)
    }
}
