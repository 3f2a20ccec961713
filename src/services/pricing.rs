//! Pure cart arithmetic and metadata shaping.
//!
//! Both the checkout path and the webhook fallback path go through these
//! helpers, so a client-supplied total can never influence the charged
//! amount.

use crate::errors::ServiceError;
use crate::models::{AddressInput, CartLineItem};
use once_cell::sync::Lazy;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::{BTreeMap, HashSet};

/// Hard byte limit the payment processor enforces on attached metadata.
pub const MAX_METADATA_BYTES: usize = 500;

/// Currencies whose minor unit equals the major unit (no decimal places).
static ZERO_EXPONENT_CURRENCIES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "BIF", "CLP", "DJF", "GNF", "JPY", "KMF", "KRW", "MGA", "PYG", "RWF", "UGX", "VND", "VUV",
        "XAF", "XOF", "XPF",
    ]
    .into_iter()
    .collect()
});

/// Currencies with three minor-unit digits.
static THREE_EXPONENT_CURRENCIES: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["BHD", "IQD", "JOD", "KWD", "LYD", "OMR", "TND"].into_iter().collect());

/// Number of minor-unit digits for an ISO 4217 currency code.
pub fn currency_exponent(currency: &str) -> u32 {
    let upper = currency.to_ascii_uppercase();
    if ZERO_EXPONENT_CURRENCIES.contains(upper.as_str()) {
        0
    } else if THREE_EXPONENT_CURRENCIES.contains(upper.as_str()) {
        3
    } else {
        2
    }
}

/// Computes the cart total as an integer count of the currency's smallest
/// unit, rounding half-up at the currency's exponent. Rejects empty carts
/// and non-positive line items so a malformed request can never produce a
/// zero or negative charge.
pub fn cart_total_minor_units(
    items: &[CartLineItem],
    currency: &str,
) -> Result<i64, ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::ValidationError(
            "cart must contain at least one line item".to_string(),
        ));
    }

    let mut total = Decimal::ZERO;
    for item in items {
        if item.quantity == 0 {
            return Err(ServiceError::ValidationError(format!(
                "line item '{}' has zero quantity",
                item.id
            )));
        }
        if item.unit_price <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "line item '{}' has a non-positive unit price",
                item.id
            )));
        }
        total += item.line_total();
    }

    let exponent = currency_exponent(currency);
    let scaled = (total * Decimal::from(10_u64.pow(exponent)))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

    scaled.to_i64().ok_or_else(|| {
        ServiceError::ValidationError(format!("cart total {} overflows minor units", total))
    })
}

/// Renders an integer minor-unit amount back into major units for display,
/// e.g. `3998` EUR -> `"39.98 EUR"`.
pub fn format_minor_units(amount_minor_units: i64, currency: &str) -> String {
    let exponent = currency_exponent(currency);
    let major = Decimal::new(amount_minor_units, exponent);
    format!("{} {}", major, currency.to_ascii_uppercase())
}

/// Truncates a string to at most `max_bytes` bytes without splitting a
/// character.
pub fn truncate_to_bytes(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

fn metadata_len(metadata: &BTreeMap<String, String>) -> usize {
    metadata.iter().map(|(k, v)| k.len() + v.len()).sum()
}

/// Builds the bounded metadata summary attached to the payment intent.
///
/// The webhook reconciler reads these keys back to reconstruct a minimal
/// order when the optimistic write never landed, so the essential fields
/// (amounts come from the event itself) are kept even when the cart
/// summary must be truncated. Oversized values are clipped, never a reason
/// to fail the request.
pub fn metadata_summary(
    items: &[CartLineItem],
    buyer_email: Option<&str>,
    address: Option<&AddressInput>,
    repair_type: Option<&str>,
    shipping_option: Option<&str>,
) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();

    // Per-field budgets sum (with keys) to well under the 500-byte limit
    // even when every optional field is present at its cap.
    metadata.insert("item_count".to_string(), items.len().to_string());
    if let Some(email) = buyer_email {
        metadata.insert("buyer_email".to_string(), truncate_to_bytes(email, 60));
    }
    if let Some(repair) = repair_type {
        metadata.insert("repair_type".to_string(), truncate_to_bytes(repair, 30));
    }
    if let Some(shipping) = shipping_option {
        metadata.insert(
            "shipping_option".to_string(),
            truncate_to_bytes(shipping, 30),
        );
    }

    if let Some(addr) = address {
        metadata.insert("ship_name".to_string(), truncate_to_bytes(&addr.name, 40));
        metadata.insert("ship_line1".to_string(), truncate_to_bytes(&addr.line1, 50));
        if let Some(line2) = &addr.line2 {
            metadata.insert("ship_line2".to_string(), truncate_to_bytes(line2, 30));
        }
        metadata.insert("ship_city".to_string(), truncate_to_bytes(&addr.city, 30));
        if let Some(state) = &addr.state {
            metadata.insert("ship_state".to_string(), truncate_to_bytes(state, 15));
        }
        metadata.insert(
            "ship_postal".to_string(),
            truncate_to_bytes(&addr.postal_code, 15),
        );
        metadata.insert(
            "ship_country".to_string(),
            truncate_to_bytes(&addr.country, 2),
        );
    }

    // Whatever budget remains goes to the human-readable cart summary.
    let used = metadata_len(&metadata) + "cart_summary".len();
    if used < MAX_METADATA_BYTES {
        let summary = items
            .iter()
            .map(|i| format!("{}x {}", i.quantity, i.name))
            .collect::<Vec<_>>()
            .join(", ");
        metadata.insert(
            "cart_summary".to_string(),
            truncate_to_bytes(&summary, MAX_METADATA_BYTES - used),
        );
    }

    metadata
}
