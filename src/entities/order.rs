use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;
use validator::Validate;

/// Order lifecycle states.
///
/// `Created` is written optimistically when the payment intent is opened;
/// the webhook reconciler is the sole writer of the terminal states.
/// `Abandoned` marks stale created orders swept by the background task and
/// is not terminal: a late signed event may still finalize the order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, utoipa::ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Succeeded,
    Failed,
    Abandoned,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Succeeded | OrderStatus::Failed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Opaque intent identifier issued by the payment processor; the
    /// natural idempotency key for reconciliation.
    #[sea_orm(unique)]
    pub payment_intent_ref: String,

    /// Integer count of the currency's smallest unit; never a float.
    pub amount_minor_units: i64,

    #[validate(length(equal = 3, message = "Currency must be a 3-letter ISO code"))]
    pub currency: String,

    pub status: String,

    #[sea_orm(nullable)]
    pub buyer_email: Option<String>,

    /// Immutable record of what was purchased, written once at creation.
    pub cart_snapshot: Json,

    #[sea_orm(nullable)]
    pub address_id: Option<Uuid>,
    #[sea_orm(nullable)]
    pub buyer_id: Option<Uuid>,
    #[sea_orm(nullable)]
    pub repair_type: Option<String>,
    #[sea_orm(nullable)]
    pub shipping_option: Option<String>,

    pub created_at: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    pub fn order_status(&self) -> Option<OrderStatus> {
        self.status.parse().ok()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::address::Entity",
        from = "Column::AddressId",
        to = "super::address::Column::Id"
    )]
    Address,
}

impl Related<super::address::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Address.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            OrderStatus::Created,
            OrderStatus::Succeeded,
            OrderStatus::Failed,
            OrderStatus::Abandoned,
        ] {
            let parsed: OrderStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert_eq!(OrderStatus::Created.to_string(), "created");
    }

    #[test]
    fn terminal_states() {
        assert!(OrderStatus::Succeeded.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
        assert!(!OrderStatus::Created.is_terminal());
        assert!(!OrderStatus::Abandoned.is_terminal());
    }
}
