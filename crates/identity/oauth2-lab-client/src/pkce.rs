//! PKCE (RFC 7636) and state parameter generation.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

const STATE_BYTES: usize = 16;
const CODE_VERIFIER_BYTES: usize = 32;

pub const CODE_CHALLENGE_METHOD: &str = "S256";

/// Random anti-CSRF state value, 128 bits hex-encoded (32 chars).
pub fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Random PKCE code verifier, 256 bits as unpadded base64url (43 chars).
pub fn generate_code_verifier() -> String {
    let mut bytes = [0u8; CODE_VERIFIER_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// S256 challenge: base64url(SHA-256(ascii(verifier))) without padding.
pub fn generate_code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// PKCE code challenge and verifier
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
}

impl Default for PkceChallenge {
    fn default() -> Self {
        Self::new()
    }
}

impl PkceChallenge {
    /// Generate a new PKCE challenge
    pub fn new() -> Self {
        Self::from_verifier(generate_code_verifier())
    }

    pub fn from_verifier(code_verifier: String) -> Self {
        let code_challenge = generate_code_challenge(&code_verifier);

        Self {
            code_verifier,
            code_challenge,
            code_challenge_method: CODE_CHALLENGE_METHOD.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn is_base64url(s: &str) -> bool {
        s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    #[test]
    fn test_code_verifier_format() {
        for _ in 0..100 {
            let verifier = generate_code_verifier();
            assert!((43..=128).contains(&verifier.len()));
            assert_eq!(verifier.len(), 43);
            assert!(is_base64url(&verifier), "bad verifier: {}", verifier);
            assert!(!verifier.contains('+'));
            assert!(!verifier.contains('/'));
            assert!(!verifier.contains('='));
        }
    }

    #[test]
    fn test_state_format() {
        for _ in 0..100 {
            let state = generate_state();
            assert_eq!(state.len(), 32);
            assert!(
                state
                    .chars()
                    .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)),
                "bad state: {}",
                state
            );
        }
    }

    #[test]
    fn test_generated_values_are_unique() {
        let states: HashSet<_> = (0..50).map(|_| generate_state()).collect();
        let verifiers: HashSet<_> = (0..50).map(|_| generate_code_verifier()).collect();
        assert_eq!(states.len(), 50);
        assert_eq!(verifiers.len(), 50);
    }

    #[test]
    fn test_rfc7636_vector() {
        assert_eq!(
            generate_code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_challenge_is_deterministic() {
        let verifier = generate_code_verifier();
        let other = generate_code_verifier();

        assert_eq!(
            generate_code_challenge(&verifier),
            generate_code_challenge(&verifier)
        );
        assert_ne!(
            generate_code_challenge(&verifier),
            generate_code_challenge(&other)
        );

        let challenge = generate_code_challenge(&verifier);
        assert_eq!(challenge.len(), 43);
        assert!(is_base64url(&challenge));
    }

    #[test]
    fn test_pkce_generation() {
        let pkce1 = PkceChallenge::new();
        let pkce2 = PkceChallenge::new();

        assert_ne!(pkce1.code_verifier, pkce2.code_verifier);
        assert_ne!(pkce1.code_challenge, pkce2.code_challenge);
        assert_eq!(pkce1.code_challenge_method, "S256");
        assert_eq!(
            pkce1.code_challenge,
            generate_code_challenge(&pkce1.code_verifier)
        );
    }
}
