//! Ed25519 keypair generation and the issuer-side key store.
//!
//! The [`KeyStore`] is the single owner of private signing keys. Keys are
//! addressed by an opaque key identifier ("kid") chosen by the caller and are
//! never overwritten: rotation means registering a new kid.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use ed25519_dalek::{SigningKey, VerifyingKey};
use error_stack::Report;
use jose_jwk::{
    jose_jwa::{Algorithm, Signing},
    Class, Jwk, JwkSet, Key, Okp, OkpCurves, Parameters,
};
use rand::rngs::OsRng;

use crate::error::TrustError;

use super::jwks::PublicKeyRecord;

pub struct Keypair {
    pub(crate) signing_key: SigningKey,
    pub verifying_key: VerifyingKey,
}

impl Keypair {
    #[must_use]
    pub fn generate() -> Self {
        let mut csprng = OsRng;

        let signing_key = SigningKey::generate(&mut csprng);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Builds a keypair from a fixed 32-byte seed. Intended for fixtures.
    #[must_use]
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    #[must_use]
    pub fn public_record(&self, kid: &str) -> PublicKeyRecord {
        PublicKeyRecord::ed25519(kid, &self.verifying_key)
    }

    /// The public half as a signing JWK.
    #[must_use]
    pub fn jwk(&self, kid: &str) -> Jwk {
        let okp = Okp {
            crv: OkpCurves::Ed25519,
            x: self.verifying_key.as_bytes().to_vec().into(),
            d: None,
        };

        Jwk {
            key: Key::Okp(okp),
            prm: Parameters {
                kid: Some(kid.to_string()),
                alg: Some(Algorithm::Signing(Signing::EdDsa)),
                cls: Some(Class::Signing),
                ..Default::default()
            },
        }
    }
}

/// A kid must contain at least one non-whitespace character. Applied to
/// registration, discovery entries and token headers alike.
pub(crate) fn is_usable_kid(kid: &str) -> bool {
    !kid.trim().is_empty()
}

// The signing key stays out of Debug output.
impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("verifying_key", &self.verifying_key)
            .finish_non_exhaustive()
    }
}

struct RegisteredKey {
    keypair: Keypair,
    record: PublicKeyRecord,
}

#[derive(Default)]
struct Registry {
    keys: HashMap<String, Arc<RegisteredKey>>,
    order: Vec<String>,
}

/// Issuer-side mapping from kid to private signing key and public record.
///
/// Instance scoped; share it between collaborators with an [`Arc`].
#[derive(Default)]
pub struct KeyStore {
    registry: RwLock<Registry>,
}

impl KeyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a fresh keypair and registers it under `kid`.
    ///
    /// # Errors
    ///
    /// - [`TrustError::InvalidKeyIdentifier`] if `kid` is empty
    /// - [`TrustError::DuplicateKeyIdentifier`] if `kid` is already registered
    pub fn generate_and_register(
        &self,
        kid: &str,
    ) -> Result<PublicKeyRecord, Report<TrustError>> {
        self.register(kid, Keypair::generate())
    }

    /// Registers an existing keypair under `kid`.
    ///
    /// # Errors
    ///
    /// Same as [`KeyStore::generate_and_register`].
    pub fn register(
        &self,
        kid: &str,
        keypair: Keypair,
    ) -> Result<PublicKeyRecord, Report<TrustError>> {
        if !is_usable_kid(kid) {
            return Err(Report::new(TrustError::InvalidKeyIdentifier {
                message: "kid must not be blank".into(),
            }));
        }

        let record = keypair.public_record(kid);

        let mut registry = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if registry.keys.contains_key(kid) {
            return Err(Report::new(TrustError::DuplicateKeyIdentifier {
                kid: kid.to_string(),
            }));
        }
        registry.keys.insert(
            kid.to_string(),
            Arc::new(RegisteredKey {
                keypair,
                record: record.clone(),
            }),
        );
        registry.order.push(kid.to_string());
        drop(registry);

        log::info!("Registered signing key kid={}", kid);
        Ok(record)
    }

    /// Returns the private signing key registered under `kid`.
    ///
    /// Only the issuer reads private material; it is never exported.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::KeyNotFound`] if `kid` is not registered.
    pub(crate) fn private_key_for(&self, kid: &str) -> Result<SigningKey, Report<TrustError>> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys
            .get(kid)
            .map(|entry| entry.keypair.signing_key.clone())
            .ok_or_else(|| {
                Report::new(TrustError::KeyNotFound {
                    kid: kid.to_string(),
                })
            })
    }

    #[must_use]
    pub fn public_record(&self, kid: &str) -> Option<PublicKeyRecord> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys
            .get(kid)
            .map(|entry| entry.record.clone())
    }

    /// Snapshot of every registered public record, in registration order.
    #[must_use]
    pub fn public_records(&self) -> Vec<PublicKeyRecord> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry
            .order
            .iter()
            .filter_map(|kid| registry.keys.get(kid))
            .map(|entry| entry.record.clone())
            .collect()
    }

    /// Every registered key as a JWK set, in registration order.
    #[must_use]
    pub fn jwk_set(&self) -> JwkSet {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        JwkSet {
            keys: registry
                .order
                .iter()
                .filter_map(|kid| {
                    registry
                        .keys
                        .get(kid)
                        .map(|entry| entry.keypair.jwk(kid))
                })
                .collect(),
        }
    }

    /// The most recently registered kid, used when a caller does not
    /// designate one for issuance.
    #[must_use]
    pub fn latest_kid(&self) -> Option<String> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .last()
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
