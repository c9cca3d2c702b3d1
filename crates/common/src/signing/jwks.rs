//! JSON Web Key Set (JWKS) documents.
//!
//! This module renders registered Ed25519 public keys as a discovery document
//! and parses remote documents back into verification keys. Parsing is
//! tolerant per entry: one malformed key never invalidates the others.

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use derive_more::Display;
use ed25519_dalek::VerifyingKey;
use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};

use crate::constants::{
    ED25519_PUBLIC_KEY_LEN, JWK_CURVE_ED25519, JWK_KEY_TYPE_OKP, JWK_USE_SIG, JWS_ALG_ED25519,
    JWS_ALG_EDDSA,
};
use crate::error::TrustError;

use super::keys::{is_usable_kid, KeyStore};

/// Externally visible projection of a registered keypair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyRecord {
    pub kty: String,
    pub crv: String,
    pub kid: String,
    #[serde(rename = "use")]
    pub key_use: String,
    pub alg: String,
    /// Base64url (no padding) of the 32 raw public key bytes.
    pub x: String,
}

impl PublicKeyRecord {
    #[must_use]
    pub fn ed25519(kid: &str, verifying_key: &VerifyingKey) -> Self {
        Self {
            kty: JWK_KEY_TYPE_OKP.to_string(),
            crv: JWK_CURVE_ED25519.to_string(),
            kid: kid.to_string(),
            key_use: JWK_USE_SIG.to_string(),
            alg: JWS_ALG_EDDSA.to_string(),
            x: URL_SAFE_NO_PAD.encode(verifying_key.as_bytes()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub keys: Vec<PublicKeyRecord>,
}

impl DiscoveryDocument {
    /// Serializes the document in its wire shape.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::Configuration`] if serialization fails.
    pub fn to_json(&self) -> Result<String, Report<TrustError>> {
        serde_json::to_string(self).change_context(TrustError::Configuration {
            message: "Failed to serialize discovery document".into(),
        })
    }
}

/// Read-only projection of a [`KeyStore`] as a discovery document.
#[derive(Clone)]
pub struct JwksPublisher {
    key_store: Arc<KeyStore>,
}

impl JwksPublisher {
    #[must_use]
    pub fn new(key_store: Arc<KeyStore>) -> Self {
        Self { key_store }
    }

    /// Snapshot of all keys registered before this call.
    #[must_use]
    pub fn render(&self) -> DiscoveryDocument {
        DiscoveryDocument {
            keys: self.key_store.public_records(),
        }
    }

    /// The discovery document body, built from the registered keys as JWKs.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::Configuration`] if serialization fails.
    pub fn render_json(&self) -> Result<String, Report<TrustError>> {
        serde_json::to_string(&self.key_store.jwk_set()).change_context(
            TrustError::Configuration {
                message: "Failed to serialize discovery document".into(),
            },
        )
    }
}

/// Why a discovery entry was left out of the trust map.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum SkipReason {
    #[display("entry is not a JWK object: {_0}")]
    Unparsable(String),
    #[display("unsupported key type")]
    UnsupportedKeyType,
    #[display("unsupported curve")]
    UnsupportedCurve,
    #[display("key is not for signatures")]
    NotForSigning,
    #[display("unsupported algorithm {_0}")]
    UnsupportedAlgorithm(String),
    #[display("empty or blank kid")]
    EmptyKid,
    #[display("empty x")]
    EmptyX,
    #[display("x is not base64url")]
    InvalidEncoding,
    #[display("x decodes to {_0} bytes")]
    InvalidLength(usize),
    #[display("x is not a valid Ed25519 point")]
    InvalidPoint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// Present when the entry carried a readable kid.
    pub kid: Option<String>,
    pub reason: SkipReason,
}

/// Verification keys extracted from a discovery document.
#[derive(Debug, Default)]
pub struct ParsedDocument {
    pub keys: Vec<(String, VerifyingKey)>,
    pub skipped: Vec<SkippedEntry>,
}

#[derive(Deserialize)]
struct RawDocument {
    keys: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(tag = "kty")]
enum JwkEntry {
    #[serde(rename = "OKP")]
    Okp(OkpEntry),
    #[serde(other)]
    Unsupported,
}

#[derive(Deserialize)]
enum OkpCurve {
    Ed25519,
    #[serde(other)]
    Unsupported,
}

#[derive(Deserialize)]
struct OkpEntry {
    crv: OkpCurve,
    #[serde(default)]
    kid: String,
    #[serde(default, rename = "use")]
    key_use: Option<String>,
    #[serde(default)]
    alg: Option<String>,
    #[serde(default)]
    x: String,
}

fn entry_kid(value: &serde_json::Value) -> Option<String> {
    value
        .get("kid")
        .and_then(serde_json::Value::as_str)
        .filter(|kid| is_usable_kid(kid))
        .map(str::to_string)
}

fn verifying_key_from_entry(entry: JwkEntry) -> Result<(String, VerifyingKey), SkipReason> {
    let okp = match entry {
        JwkEntry::Okp(okp) => okp,
        JwkEntry::Unsupported => return Err(SkipReason::UnsupportedKeyType),
    };

    if matches!(okp.crv, OkpCurve::Unsupported) {
        return Err(SkipReason::UnsupportedCurve);
    }
    if okp.key_use.as_deref() != Some(JWK_USE_SIG) {
        return Err(SkipReason::NotForSigning);
    }
    if let Some(alg) = okp
        .alg
        .filter(|alg| alg != JWS_ALG_EDDSA && alg != JWS_ALG_ED25519)
    {
        return Err(SkipReason::UnsupportedAlgorithm(alg));
    }
    if !is_usable_kid(&okp.kid) {
        return Err(SkipReason::EmptyKid);
    }
    if okp.x.is_empty() {
        return Err(SkipReason::EmptyX);
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(okp.x.as_bytes())
        .map_err(|_| SkipReason::InvalidEncoding)?;
    let key_bytes: [u8; ED25519_PUBLIC_KEY_LEN] = bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| SkipReason::InvalidLength(bytes.len()))?;
    let verifying_key =
        VerifyingKey::from_bytes(&key_bytes).map_err(|_| SkipReason::InvalidPoint)?;

    Ok((okp.kid, verifying_key))
}

/// Parses a discovery document into Ed25519 verification keys.
///
/// Entries that are not Ed25519 signing keys, or whose `x` does not decode to
/// a 32-byte point, are reported in [`ParsedDocument::skipped`] instead of
/// failing the whole document.
///
/// # Errors
///
/// Returns [`TrustError::MalformedDocument`] if the body is not JSON or has
/// no `keys` array.
pub fn parse_discovery_document(body: &[u8]) -> Result<ParsedDocument, Report<TrustError>> {
    let raw: RawDocument =
        serde_json::from_slice(body).change_context(TrustError::MalformedDocument {
            message: "expected an object with a \"keys\" array".into(),
        })?;

    let mut parsed = ParsedDocument::default();
    for value in raw.keys {
        let kid = entry_kid(&value);
        let outcome = serde_json::from_value::<JwkEntry>(value)
            .map_err(|e| SkipReason::Unparsable(e.to_string()))
            .and_then(verifying_key_from_entry);

        match outcome {
            Ok(key) => parsed.keys.push(key),
            Err(reason) => parsed.skipped.push(SkippedEntry { kid, reason }),
        }
    }

    Ok(parsed)
}
