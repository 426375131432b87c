//! Just enough JWT handling to read the `exp` claim out of an access token.
//! No signature verification — the backend issued the token, we only need
//! to know when it stops being valid.

use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use kg_core::errors::AuthError;
use serde::Deserialize;

#[derive(Deserialize)]
struct Claims {
    exp: i64,
}

/// Decodes the unverified payload segment of a JWT and returns the `exp`
/// claim as a UTC timestamp.
pub fn decode_expiry(access_token: &str) -> Result<DateTime<Utc>, AuthError> {
    let mut segments = access_token.split('.');
    let _header = segments.next().ok_or_else(|| AuthError::MalformedToken("missing header segment".into()))?;
    let payload = segments.next().ok_or_else(|| AuthError::MalformedToken("missing payload segment".into()))?;

    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| AuthError::MalformedToken(format!("base64: {e}")))?;
    let claims: Claims =
        serde_json::from_slice(&decoded).map_err(|e| AuthError::MalformedToken(format!("payload json: {e}")))?;

    Utc.timestamp_opt(claims.exp, 0)
        .single()
        .ok_or_else(|| AuthError::MalformedToken("exp out of range".into()))
}
