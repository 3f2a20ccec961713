//! Webhook signature verification.
//!
//! Verification runs over the exact raw request bytes; any re-serialization
//! of the payload before this point would invalidate the signature.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verifies the HMAC-SHA256 signature on a webhook delivery.
///
/// Two header conventions are accepted: a generic `x-timestamp` +
/// `x-signature` pair, and the Stripe-style `Stripe-Signature: t=..,v1=..`
/// header. In both cases the signed string is `{timestamp}.{raw_body}` and
/// the timestamp must be within `tolerance_secs` of the local clock.
pub fn verify_signature(
    headers: &HeaderMap,
    payload: &[u8],
    secret: &str,
    tolerance_secs: u64,
) -> bool {
    if let (Some(ts), Some(sig)) = (headers.get("x-timestamp"), headers.get("x-signature")) {
        if let (Ok(ts), Ok(sig)) = (ts.to_str(), sig.to_str()) {
            return verify_parts(ts, sig, payload, secret, tolerance_secs);
        }
        return false;
    }

    if let Some(header) = headers
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
    {
        let mut ts = "";
        let mut v1 = "";
        for part in header.split(',') {
            let mut it = part.trim().splitn(2, '=');
            match (it.next(), it.next()) {
                (Some("t"), Some(val)) => ts = val,
                (Some("v1"), Some(val)) => v1 = val,
                _ => {}
            }
        }
        if !ts.is_empty() && !v1.is_empty() {
            return verify_parts(ts, v1, payload, secret, tolerance_secs);
        }
    }

    false
}

fn verify_parts(ts: &str, sig: &str, payload: &[u8], secret: &str, tolerance_secs: u64) -> bool {
    let Ok(ts_i) = ts.parse::<i64>() else {
        return false;
    };
    let now = chrono::Utc::now().timestamp();
    if (now - ts_i).unsigned_abs() > tolerance_secs {
        return false;
    }

    let expected = compute_signature(secret, ts, payload);
    constant_time_eq(&expected, sig)
}

/// Hex HMAC-SHA256 of `{timestamp}.{payload}` under the shared secret.
pub fn compute_signature(secret: &str, timestamp: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
