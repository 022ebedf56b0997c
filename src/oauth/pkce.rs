//! PKCE verifier and challenge generation (RFC 7636, S256 only).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Entropy of the code verifier in bytes.
const VERIFIER_BYTES: usize = 32;

/// Generates a cryptographically random code verifier.
///
/// 32 bytes of OS entropy, URL-safe base64 without padding (43 characters).
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; VERIFIER_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Derives the S256 code challenge from a verifier.
pub fn code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verifier_length_and_charset() {
        let verifier = generate_verifier();
        // 32 bytes → 43 base64url chars, no padding
        assert_eq!(verifier.len(), 43);
        assert!(verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_verifiers_are_unique() {
        assert_ne!(generate_verifier(), generate_verifier());
    }

    #[test]
    fn test_challenge_is_deterministic() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(code_challenge(verifier), code_challenge(verifier));
        assert_ne!(code_challenge(verifier), verifier);
    }

    #[test]
    fn test_challenge_rfc7636_appendix_b() {
        // Known vector from RFC 7636 Appendix B
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            code_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }
}
