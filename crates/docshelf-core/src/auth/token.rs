//! Access-token expiry inspection.
//!
//! Access tokens are JWT-style dotted strings; the middle segment carries
//! an `exp` claim (seconds since epoch). Nothing else in the token is ever
//! interpreted. A token that cannot be decoded is treated as already
//! expired, which folds the malformed-token case into the normal
//! expiration path.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value as JsonValue;

/// Expiry state derived from the access token. Never stored; recomputed on
/// every inspection.
#[derive(Debug, Clone, Copy)]
pub struct ExpirationInfo {
    pub is_expired: bool,
    pub will_expire_soon: bool,
    /// Remaining lifetime, clamped to zero for expired tokens.
    pub time_until_expiration: Duration,
}

impl ExpirationInfo {
    /// Inspect a token against the given renewal margin. `will_expire_soon`
    /// is true once the remaining lifetime is inside the margin.
    pub fn inspect(token: &str, margin: Duration) -> Self {
        Self::inspect_at(token, margin, Utc::now())
    }

    /// Like `inspect`, but against an explicit current time. The refresh
    /// scheduler passes its own clock through here.
    pub fn inspect_at(token: &str, margin: Duration, now: DateTime<Utc>) -> Self {
        match token_expiry(token) {
            Some(expiry) => {
                let remaining = expiry - now;
                ExpirationInfo {
                    is_expired: remaining <= Duration::zero(),
                    will_expire_soon: remaining <= margin,
                    time_until_expiration: remaining.max(Duration::zero()),
                }
            }
            None => ExpirationInfo {
                is_expired: true,
                will_expire_soon: true,
                time_until_expiration: Duration::zero(),
            },
        }
    }
}

/// Decode the `exp` claim from a token. Returns `None` for anything that
/// is not a three-part dotted string with a base64url JSON payload.
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }
    let payload = URL_SAFE_NO_PAD.decode(parts[1]).ok()?;
    let claims: JsonValue = serde_json::from_slice(&payload).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    Utc.timestamp_opt(exp, 0).single()
}

/// Whether the token is past its `exp` claim. Malformed tokens count as
/// expired.
pub fn is_token_expired(token: &str) -> bool {
    match token_expiry(token) {
        Some(expiry) => Utc::now() >= expiry,
        None => true,
    }
}

/// Build an unsigned token whose `exp` claim lies `offset_secs` from now.
#[cfg(test)]
pub(crate) fn test_token(offset_secs: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let claims = serde_json::json!({
        "sub": "user-1",
        "exp": Utc::now().timestamp() + offset_secs,
    });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_embedded_expiry() {
        let token = test_token(600);
        let expiry = token_expiry(&token).expect("expiry should decode");
        let remaining = expiry - Utc::now();
        assert!(remaining > Duration::seconds(590));
        assert!(remaining <= Duration::seconds(600));
    }

    #[test]
    fn test_expired_token() {
        let info = ExpirationInfo::inspect(&test_token(-60), Duration::minutes(5));
        assert!(info.is_expired);
        assert!(info.will_expire_soon);
        assert_eq!(info.time_until_expiration, Duration::zero());
    }

    #[test]
    fn test_token_inside_margin_expires_soon() {
        let info = ExpirationInfo::inspect(&test_token(120), Duration::minutes(5));
        assert!(!info.is_expired);
        assert!(info.will_expire_soon);
    }

    #[test]
    fn test_token_outside_margin() {
        let info = ExpirationInfo::inspect(&test_token(3600), Duration::minutes(5));
        assert!(!info.is_expired);
        assert!(!info.will_expire_soon);
        assert!(info.time_until_expiration > Duration::minutes(55));
    }

    #[test]
    fn test_malformed_tokens_count_as_expired() {
        assert!(is_token_expired(""));
        assert!(is_token_expired("not-a-token"));
        assert!(is_token_expired("a.b"));
        assert!(is_token_expired("a.%%%.c"));

        // Valid shape, but no exp claim in the payload.
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"user-1"}"#);
        assert!(is_token_expired(&format!("h.{payload}.s")));
    }
}
