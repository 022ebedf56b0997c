//! Anti-forgery state tokens.
//!
//! The state value carries the initiating identity inside a tagged structure
//! rather than by string concatenation, so the callback can recover the
//! identity with an explicit decode and no session lookup. The caller holds
//! the encoded token in a short-lived, tamper-evident client-bound store and
//! must present it exactly once.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// How long a state token stays valid after issuance.
pub const STATE_TTL_SECONDS: i64 = 600;

/// Anti-forgery state bound to the initiating identity.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StateToken {
    /// Random single-use nonce
    pub nonce: String,
    /// Identity that initiated authorization
    pub user_id: String,
    /// Issuance time, for the 10-minute absolute expiry
    pub issued_at: DateTime<Utc>,
}

impl StateToken {
    /// Issues a fresh state token for an identity.
    pub fn issue(user_id: &str) -> Self {
        Self {
            nonce: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            issued_at: Utc::now(),
        }
    }

    /// Encodes the token as URL-safe base64 of its JSON form.
    pub fn encode(&self) -> String {
        // Serialization of a plain struct cannot fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decodes a presented state value.
    ///
    /// Anything that does not decode to a well-formed token is
    /// [`Error::InvalidInput`] — there is no partial recovery.
    pub fn decode(encoded: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| Error::InvalidInput("state token is not valid base64".to_string()))?;

        serde_json::from_slice(&bytes)
            .map_err(|_| Error::InvalidInput("state token is malformed".to_string()))
    }

    /// Whether the token has outlived its 10-minute window.
    pub fn is_expired(&self) -> bool {
        Utc::now() - self.issued_at > Duration::seconds(STATE_TTL_SECONDS)
    }
}

/// Validates a state value presented at callback time.
///
/// The presented value must match the caller-held copy byte for byte, decode
/// to a well-formed token, and be within its expiry window. Returns the
/// decoded token so the callback learns the initiating identity.
pub fn verify_state(presented: &str, stored: &str) -> Result<StateToken> {
    if presented.as_bytes() != stored.as_bytes() {
        return Err(Error::InvalidInput(
            "state mismatch (possible request forgery)".to_string(),
        ));
    }

    let token = StateToken::decode(presented)?;

    if token.is_expired() {
        return Err(Error::InvalidInput("state token expired".to_string()));
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let token = StateToken::issue("user123");
        let encoded = token.encode();

        let decoded = StateToken::decode(&encoded).expect("decode failed");
        assert_eq!(decoded, token);
        assert_eq!(decoded.user_id, "user123");
    }

    #[test]
    fn test_nonces_are_unique() {
        let a = StateToken::issue("user123");
        let b = StateToken::issue("user123");
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.encode(), b.encode());
    }

    #[test]
    fn test_malformed_state_rejected() {
        assert!(matches!(
            StateToken::decode("!!not base64!!"),
            Err(Error::InvalidInput(_))
        ));

        // Valid base64, not a token
        let junk = URL_SAFE_NO_PAD.encode(b"{\"foo\": 1}");
        assert!(matches!(
            StateToken::decode(&junk),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_verify_state_success() {
        let encoded = StateToken::issue("alice").encode();

        let token = verify_state(&encoded, &encoded).expect("verify failed");
        assert_eq!(token.user_id, "alice");
    }

    #[test]
    fn test_verify_state_mismatch() {
        let a = StateToken::issue("alice").encode();
        let b = StateToken::issue("alice").encode();

        assert!(matches!(verify_state(&a, &b), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_expired_state_rejected() {
        let token = StateToken {
            nonce: Uuid::new_v4().to_string(),
            user_id: "bob".to_string(),
            issued_at: Utc::now() - Duration::seconds(STATE_TTL_SECONDS + 1),
        };
        assert!(token.is_expired());

        let encoded = token.encode();
        assert!(matches!(
            verify_state(&encoded, &encoded),
            Err(Error::InvalidInput(_))
        ));
    }
}
