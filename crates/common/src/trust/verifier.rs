//! Token verification against a [`TrustStore`].
//!
//! Verification runs in a fixed order and stops at the first failure:
//!
//! 1. split and decode the token
//! 2. read `kid` from the header
//! 3. require `alg` to be EdDSA, before any key lookup or signature work
//! 4. resolve `kid` in the trust store, refreshing per its policy
//! 5. check the Ed25519 signature over `header.payload`
//! 6. decode the claims, then check issuer and expiry

use std::sync::Arc;

use chrono::Utc;
use derive_more::{Display, Error};
use ed25519_dalek::{Signature, VerifyingKey};
use error_stack::Report;
use tokio_util::sync::CancellationToken;

use crate::constants::{JWS_ALG_ED25519, JWS_ALG_EDDSA};
use crate::error::TrustError;
use crate::signing::keys::is_usable_kid;
use crate::signing::token::{header_kid, Claims, UnverifiedToken};

use super::store::TrustStore;

/// Structured reason a token was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum Rejection {
    #[display("Malformed token: {reason}")]
    Malformed { reason: String },

    #[display("Token header has no kid")]
    MissingKid,

    #[display("Unsupported algorithm: {alg}")]
    UnsupportedAlgorithm { alg: String },

    #[display("Unknown kid: {kid}")]
    UnknownKid { kid: String },

    #[display("Signature verification failed")]
    BadSignature,

    #[display("Token expired at {exp}")]
    Expired { exp: i64 },

    #[display("Token has no exp claim")]
    MissingExpiry,

    #[display("Invalid issuer: expected {expected}, got {actual}")]
    InvalidIssuer { expected: String, actual: String },

    #[display("Trust store unavailable: {message}")]
    TrustStoreUnavailable { message: String },

    #[display("Verification canceled")]
    Canceled,
}

impl Rejection {
    /// True when the token itself may be fine and the caller can retry later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TrustStoreUnavailable { .. } | Self::Canceled)
    }

    fn from_refresh_failure(report: &Report<TrustError>) -> Self {
        match report.current_context() {
            TrustError::Canceled => Self::Canceled,
            other => Self::TrustStoreUnavailable {
                message: other.to_string(),
            },
        }
    }
}

/// Treatment of tokens that carry no `exp` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryPolicy {
    /// Reject with [`Rejection::MissingExpiry`].
    #[default]
    Require,
    /// Accept tokens without `exp`.
    AllowMissing,
}

#[derive(Debug, Clone, Default)]
pub struct VerifierPolicy {
    /// When set, `iss` must match exactly.
    pub expected_issuer: Option<String>,
    pub expiry: ExpiryPolicy,
    /// Seconds of clock skew tolerated after `exp`.
    pub leeway_secs: u64,
}

#[derive(Clone)]
pub struct Verifier {
    trust_store: Arc<TrustStore>,
    policy: VerifierPolicy,
}

impl Verifier {
    #[must_use]
    pub fn new(trust_store: Arc<TrustStore>, policy: VerifierPolicy) -> Self {
        Self {
            trust_store,
            policy,
        }
    }

    #[must_use]
    pub fn trust_store(&self) -> &Arc<TrustStore> {
        &self.trust_store
    }

    #[must_use]
    pub fn policy(&self) -> &VerifierPolicy {
        &self.policy
    }

    /// Verifies `token` against the current wall-clock time.
    ///
    /// # Errors
    ///
    /// Returns the first [`Rejection`] encountered.
    pub async fn verify(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<Claims, Rejection> {
        self.verify_at(token, Utc::now().timestamp(), cancel).await
    }

    /// Verifies `token` as of `now` (Unix seconds).
    ///
    /// # Errors
    ///
    /// Returns the first [`Rejection`] encountered.
    pub async fn verify_at(
        &self,
        token: &str,
        now: i64,
        cancel: &CancellationToken,
    ) -> Result<Claims, Rejection> {
        let result = self.evaluate(token, now, cancel).await;
        match &result {
            Ok(claims) => log::debug!("Accepted token iss={}", claims.iss),
            Err(rejection) => log::info!(
                "Rejected token kid={}: {}",
                header_kid(token).as_deref().unwrap_or("<none>"),
                rejection
            ),
        }
        result
    }

    async fn evaluate(
        &self,
        token: &str,
        now: i64,
        cancel: &CancellationToken,
    ) -> Result<Claims, Rejection> {
        let unverified = UnverifiedToken::parse(token).map_err(|e| Rejection::Malformed {
            reason: e.to_string(),
        })?;

        let kid = match unverified.header.get("kid") {
            Some(serde_json::Value::String(kid)) if is_usable_kid(kid) => kid.as_str(),
            _ => return Err(Rejection::MissingKid),
        };

        match unverified.header.get("alg") {
            Some(serde_json::Value::String(alg))
                if alg == JWS_ALG_EDDSA || alg == JWS_ALG_ED25519 => {}
            Some(serde_json::Value::String(alg)) => {
                return Err(Rejection::UnsupportedAlgorithm { alg: alg.clone() })
            }
            Some(other) => {
                return Err(Rejection::UnsupportedAlgorithm {
                    alg: other.to_string(),
                })
            }
            None => {
                return Err(Rejection::UnsupportedAlgorithm {
                    alg: "<missing>".into(),
                })
            }
        }

        let verifying_key = self.resolve_key(kid, cancel).await?;

        let signature = Signature::from_bytes(&unverified.signature);
        verifying_key
            .verify_strict(unverified.signing_input.as_bytes(), &signature)
            .map_err(|_| Rejection::BadSignature)?;

        let claims = decode_claims(&unverified.payload)?;

        self.check_claims(&claims, now)?;
        Ok(claims)
    }

    async fn resolve_key(
        &self,
        kid: &str,
        cancel: &CancellationToken,
    ) -> Result<VerifyingKey, Rejection> {
        let refresh_failure = match self.trust_store.ensure_fresh_for(kid, cancel).await {
            Ok(()) => None,
            Err(report) => {
                let rejection = Rejection::from_refresh_failure(&report);
                if rejection == Rejection::Canceled {
                    return Err(rejection);
                }
                log::warn!("Verifying kid={} against stale trust store", kid);
                Some(rejection)
            }
        };

        if let Some(key) = self.trust_store.lookup(kid) {
            return Ok(key);
        }

        if let Some(rejection) = refresh_failure {
            return Err(rejection);
        }

        match self.trust_store.refresh_on_miss(cancel).await {
            Ok(_) => {}
            Err(report) => return Err(Rejection::from_refresh_failure(&report)),
        }

        self.trust_store
            .lookup(kid)
            .ok_or_else(|| Rejection::UnknownKid {
                kid: kid.to_string(),
            })
    }

    fn check_claims(&self, claims: &Claims, now: i64) -> Result<(), Rejection> {
        if let Some(expected) = &self.policy.expected_issuer {
            if &claims.iss != expected {
                return Err(Rejection::InvalidIssuer {
                    expected: expected.clone(),
                    actual: claims.iss.clone(),
                });
            }
        }

        match (claims.exp, self.policy.expiry) {
            (Some(exp), _) => {
                let leeway = i64::try_from(self.policy.leeway_secs).unwrap_or(i64::MAX);
                if now >= exp.saturating_add(leeway) {
                    return Err(Rejection::Expired { exp });
                }
            }
            (None, ExpiryPolicy::Require) => return Err(Rejection::MissingExpiry),
            (None, ExpiryPolicy::AllowMissing) => {}
        }

        Ok(())
    }
}

fn decode_claims(payload: &[u8]) -> Result<Claims, Rejection> {
    let malformed = |reason: String| Rejection::Malformed { reason };
    match serde_json::from_slice::<serde_json::Value>(payload) {
        Ok(value @ serde_json::Value::Object(_)) => serde_json::from_value(value)
            .map_err(|e| malformed(format!("invalid claims: {e}"))),
        Ok(_) => Err(malformed("payload is not a JSON object".into())),
        Err(e) => Err(malformed(format!("payload is not JSON: {e}"))),
    }
}
