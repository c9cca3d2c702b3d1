//! Token issuance.

use std::sync::Arc;

use ed25519_dalek::Signer as Ed25519Signer;
use error_stack::{Report, ResultExt};

use crate::error::TrustError;

use super::keys::KeyStore;
use super::token::{encode_segment, Claims, Header};

/// Signs compact tokens with keys held by a [`KeyStore`].
#[derive(Clone)]
pub struct Issuer {
    key_store: Arc<KeyStore>,
}

impl Issuer {
    #[must_use]
    pub fn new(key_store: Arc<KeyStore>) -> Self {
        Self { key_store }
    }

    /// Issues a token for `claims` signed with the key registered as `kid`.
    ///
    /// # Errors
    ///
    /// - [`TrustError::KeyNotFound`] if `kid` is not registered
    /// - [`TrustError::InvalidClaims`] if `claims` has no expiry or an empty issuer
    /// - [`TrustError::SigningFailure`] if the signature primitive fails
    pub fn issue(&self, kid: &str, claims: &Claims) -> Result<String, Report<TrustError>> {
        let signing_key = self
            .key_store
            .private_key_for(kid)
            .attach("while issuing token")?;

        if claims.exp.is_none() {
            return Err(Report::new(TrustError::InvalidClaims {
                message: "issued tokens must carry an exp claim".into(),
            }));
        }
        if claims.iss.is_empty() {
            return Err(Report::new(TrustError::InvalidClaims {
                message: "issued tokens must carry an iss claim".into(),
            }));
        }

        let header_json =
            serde_json::to_vec(&Header::eddsa(kid)).change_context(TrustError::InvalidClaims {
                message: "Failed to serialize token header".into(),
            })?;
        let claims_json = serde_json::to_vec(claims).change_context(TrustError::InvalidClaims {
            message: "Failed to serialize claims".into(),
        })?;

        let signing_input = format!(
            "{}.{}",
            encode_segment(&header_json),
            encode_segment(&claims_json)
        );
        let signature = signing_key
            .try_sign(signing_input.as_bytes())
            .map_err(|e| {
                Report::new(TrustError::SigningFailure {
                    message: e.to_string(),
                })
            })?;

        log::info!("Issued token kid={} iss={}", kid, claims.iss);
        Ok(format!(
            "{}.{}",
            signing_input,
            encode_segment(&signature.to_bytes())
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::token::UnverifiedToken;
    use ed25519_dalek::{Signature, Verifier};

    fn issuer_with_key(kid: &str) -> (Arc<KeyStore>, Issuer) {
        let store = Arc::new(KeyStore::new());
        store.generate_and_register(kid).expect("should register");
        let issuer = Issuer::new(Arc::clone(&store));
        (store, issuer)
    }

    fn claims() -> Claims {
        Claims {
            iss: "demo".into(),
            sub: Some("jwks_demo_subject".into()),
            exp: Some(4_102_444_800),
        }
    }

    #[test]
    fn test_issue_produces_three_segments() {
        let (_, issuer) = issuer_with_key("key-001");
        let token = issuer.issue("key-001", &claims()).expect("should issue");
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn test_issued_token_header_and_payload() {
        let (_, issuer) = issuer_with_key("key-001");
        let token = issuer.issue("key-001", &claims()).expect("should issue");

        let parsed = UnverifiedToken::parse(&token).expect("should parse");
        assert_eq!(parsed.header["alg"], "EdDSA");
        assert_eq!(parsed.header["kid"], "key-001");
        assert_eq!(parsed.header["typ"], "JWT");
        let payload: serde_json::Value =
            serde_json::from_slice(&parsed.payload).expect("payload should be JSON");
        assert_eq!(payload["iss"], "demo");
        assert_eq!(payload["exp"], 4_102_444_800_i64);
    }

    #[test]
    fn test_issued_signature_verifies_with_registered_key() {
        let (store, issuer) = issuer_with_key("key-001");
        let token = issuer.issue("key-001", &claims()).expect("should issue");
        let parsed = UnverifiedToken::parse(&token).expect("should parse");

        let verifying_key = store
            .private_key_for("key-001")
            .expect("should find key")
            .verifying_key();
        let signature = Signature::from_bytes(&parsed.signature);
        assert!(verifying_key
            .verify(parsed.signing_input.as_bytes(), &signature)
            .is_ok());
    }

    #[test]
    fn test_issue_unknown_kid() {
        let (_, issuer) = issuer_with_key("key-001");
        let err = issuer
            .issue("key-404", &claims())
            .expect_err("unknown kid should fail");
        assert!(matches!(
            err.current_context(),
            TrustError::KeyNotFound { kid } if kid == "key-404"
        ));
    }

    #[test]
    fn test_issue_requires_expiry_and_issuer() {
        let (_, issuer) = issuer_with_key("key-001");

        let mut no_exp = claims();
        no_exp.exp = None;
        let err = issuer
            .issue("key-001", &no_exp)
            .expect_err("missing exp should fail");
        assert!(matches!(
            err.current_context(),
            TrustError::InvalidClaims { .. }
        ));

        let mut no_iss = claims();
        no_iss.iss = String::new();
        let err = issuer
            .issue("key-001", &no_iss)
            .expect_err("empty iss should fail");
        assert!(matches!(
            err.current_context(),
            TrustError::InvalidClaims { .. }
        ));
    }

    #[test]
    fn test_issue_is_deterministic_for_same_inputs() {
        let (_, issuer) = issuer_with_key("key-001");
        let first = issuer.issue("key-001", &claims()).expect("should issue");
        let second = issuer.issue("key-001", &claims()).expect("should issue");
        assert_eq!(first, second);
    }
}
