//! Endpoint handlers for key registration, token issuance, discovery and
//! token verification.
//!
//! Handlers are transport-agnostic: they take the core types and return
//! serializable responses, leaving routing and HTTP framing to the caller.
//! The discovery document is expected at [`JWKS_WELL_KNOWN_PATH`].
//!
//! [`JWKS_WELL_KNOWN_PATH`]: crate::constants::JWKS_WELL_KNOWN_PATH

use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::constants::{BEARER_PREFIX, HEADER_AUTHORIZATION, TOKEN_TYPE_BEARER};
use crate::error::TrustError;
use crate::settings::IssuerSettings;
use crate::signing::issuer::Issuer;
use crate::signing::jwks::JwksPublisher;
use crate::signing::keys::KeyStore;
use crate::signing::token::{header_kid, Claims};
use crate::trust::verifier::Verifier;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RegisterKeyResponse {
    pub kid: String,
}

/// Generates a key pair and registers it under `kid`.
///
/// # Errors
///
/// Returns [`TrustError::InvalidKeyIdentifier`] or
/// [`TrustError::DuplicateKeyIdentifier`] when `kid` cannot be registered.
pub fn handle_register_key(
    key_store: &KeyStore,
    kid: &str,
) -> Result<RegisterKeyResponse, Report<TrustError>> {
    let record = key_store.generate_and_register(kid)?;
    Ok(RegisterKeyResponse { kid: record.kid })
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub token_type: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

/// Issues a token for the configured issuer.
///
/// `kid` defaults to the most recently registered key.
///
/// # Errors
///
/// Returns [`TrustError::KeyNotFound`] if no key is available under `kid`,
/// or any issuance failure from [`Issuer::issue`].
pub fn handle_issue_token(
    issuer: &Issuer,
    key_store: &KeyStore,
    kid: Option<&str>,
    settings: &IssuerSettings,
) -> Result<TokenResponse, Report<TrustError>> {
    let kid = match kid {
        Some(kid) => kid.to_string(),
        None => key_store.latest_kid().ok_or_else(|| {
            Report::new(TrustError::KeyNotFound {
                kid: "<latest>".into(),
            })
            .attach("no keys registered")
        })?,
    };

    let mut claims = Claims::new(settings.name.clone(), settings.token_ttl());
    if let Some(subject) = &settings.subject {
        claims = claims.with_subject(subject.clone());
    }

    let token = issuer.issue(&kid, &claims)?;

    Ok(TokenResponse {
        token,
        token_type: TOKEN_TYPE_BEARER.to_string(),
        expires_in: settings.token_ttl_secs,
    })
}

/// Renders the discovery document for every registered key.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn handle_jwks(publisher: &JwksPublisher) -> Result<String, Report<TrustError>> {
    publisher
        .render_json()
        .attach("while rendering discovery document")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum BearerError {
    #[display("Missing Authorization header")]
    Missing,
    #[display("Authorization header is not a Bearer credential")]
    NotBearer,
    #[display("Bearer token is empty")]
    Empty,
}

/// Extracts the token from an `Authorization: Bearer <token>` header.
///
/// # Errors
///
/// Returns a [`BearerError`] describing why no token could be extracted.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, BearerError> {
    let value = headers
        .get(HEADER_AUTHORIZATION)
        .ok_or(BearerError::Missing)?
        .to_str()
        .map_err(|_| BearerError::NotBearer)?;

    let token = value
        .strip_prefix(BEARER_PREFIX)
        .ok_or(BearerError::NotBearer)?
        .trim();

    if token.is_empty() {
        return Err(BearerError::Empty);
    }
    Ok(token)
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct VerifyTokenResponse {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<Claims>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retryable: bool,
}

/// Verifies `token` and reports the verdict.
///
/// Rejections are part of the response, never an `Err`.
pub async fn handle_verify_token(
    verifier: &Verifier,
    token: &str,
    cancel: &CancellationToken,
) -> VerifyTokenResponse {
    let kid = header_kid(token);

    match verifier.verify(token, cancel).await {
        Ok(claims) => VerifyTokenResponse {
            verified: true,
            kid,
            claims: Some(claims),
            error: None,
            retryable: false,
        },
        Err(rejection) => VerifyTokenResponse {
            verified: false,
            kid,
            claims: None,
            error: Some(rejection.to_string()),
            retryable: rejection.is_retryable(),
        },
    }
}
