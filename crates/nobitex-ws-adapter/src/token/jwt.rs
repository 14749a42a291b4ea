/*
[INPUT]:  Raw JWT connection tokens
[OUTPUT]: Best-effort expiry instants and refresh decisions
[POS]:    Token layer - claim inspection
[UPDATE]: When the token format or refresh policy changes
*/

use std::time::Duration;

use base64::{
    Engine as _,
    engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD},
};
use chrono::{DateTime, Utc};

/// Extract the `exp` claim from a JWT, if present.
///
/// Best-effort: any structural or decoding failure yields `None`, which the
/// cache treats as "always near expiry".
pub fn parse_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload_b64 = token.split('.').nth(1)?;
    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .or_else(|_| URL_SAFE.decode(payload_b64))
        .ok()?;
    let payload: serde_json::Value = serde_json::from_slice(&payload_bytes).ok()?;
    let exp = payload.get("exp")?.as_i64()?;
    DateTime::from_timestamp(exp, 0)
}

/// Whether a token with the given expiry must be refreshed.
///
/// An unknown expiry always forces a refresh.
pub fn should_refresh(expiry: Option<DateTime<Utc>>, margin: Duration) -> bool {
    match expiry {
        Some(expiry) => {
            let margin = chrono::Duration::from_std(margin)
                .unwrap_or_else(|_| chrono::Duration::seconds(60));
            expiry <= Utc::now() + margin
        }
        None => true,
    }
}
