use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

fn validate_positive_decimal(value: &Decimal) -> Result<(), ValidationError> {
    if *value > Decimal::ZERO {
        Ok(())
    } else {
        let mut err = ValidationError::new("range");
        err.message = Some("Unit price must be greater than 0".into());
        Err(err)
    }
}

/// One line of the buyer's cart. Ephemeral: it exists server-side only as
/// the serialized snapshot attached to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "id": "case-iphone-15",
    "name": "Protective Case",
    "unit_price": "19.99",
    "quantity": 2
}))]
pub struct CartLineItem {
    #[validate(length(min = 1, max = 100))]
    #[schema(example = "case-iphone-15")]
    pub id: String,

    #[validate(length(min = 1, max = 200))]
    #[schema(example = "Protective Case")]
    pub name: String,

    /// Unit price in major currency units (e.g. euros, not cents)
    #[validate(custom = "validate_positive_decimal")]
    #[schema(example = "19.99")]
    pub unit_price: Decimal,

    #[validate(range(min = 1))]
    #[schema(example = 2)]
    pub quantity: u32,
}

impl CartLineItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Shipping address as submitted by the buyer or carried on a webhook
/// event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct AddressInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 200))]
    pub line1: String,
    #[validate(length(max = 200))]
    pub line2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(max = 100))]
    pub state: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[validate(length(min = 2, max = 2, message = "Country must be a 2-letter ISO code"))]
    pub country: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(price: Decimal, quantity: u32) -> CartLineItem {
        CartLineItem {
            id: "a".to_string(),
            name: "Case".to_string(),
            unit_price: price,
            quantity,
        }
    }

    #[test]
    fn line_total_multiplies_price_by_quantity() {
        assert_eq!(item(dec!(19.99), 2).line_total(), dec!(39.98));
    }

    #[test]
    fn zero_price_fails_validation() {
        assert!(item(dec!(0), 1).validate().is_err());
        assert!(item(dec!(-1.50), 1).validate().is_err());
    }

    #[test]
    fn zero_quantity_fails_validation() {
        assert!(item(dec!(19.99), 0).validate().is_err());
    }
}
