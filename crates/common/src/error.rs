//! Error types for key management, issuance and trust-store loading.
//!
//! Failures on the issuing side and the trust-store side are reported as
//! [`TrustError`] wrapped in an [`error_stack::Report`]. Token verification
//! never returns a report; it yields a structured [`crate::trust::verifier::Rejection`]
//! instead so callers can branch on the reason.

use derive_more::{Display, Error};

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum TrustError {
    /// Key identifier is empty or otherwise unusable.
    #[display("Invalid key identifier: {message}")]
    InvalidKeyIdentifier { message: String },

    /// A key is already registered under this identifier.
    #[display("Duplicate key identifier: {kid}")]
    DuplicateKeyIdentifier { kid: String },

    /// No private key is registered under this identifier.
    #[display("Key not found: {kid}")]
    KeyNotFound { kid: String },

    /// Claims cannot be issued as given.
    #[display("Invalid claims: {message}")]
    InvalidClaims { message: String },

    /// The underlying signature primitive failed.
    #[display("Signing failure: {message}")]
    SigningFailure { message: String },

    /// Transport error or timeout while fetching a discovery document.
    #[display("Fetch failure: {message}")]
    FetchFailure { message: String },

    /// The discovery endpoint answered with a non-2xx status.
    #[display("Bad status {status} from {url}")]
    BadStatus { status: u16, url: String },

    /// The discovery document is not valid JSON or lacks a `keys` array.
    #[display("Malformed discovery document: {message}")]
    MalformedDocument { message: String },

    /// The caller canceled the operation.
    #[display("Operation canceled")]
    Canceled,

    #[display("Configuration error: {message}")]
    Configuration { message: String },
}

impl TrustError {
    /// Whether the failure happened while loading the trust store, as opposed
    /// to the issuing side.
    #[must_use]
    pub fn is_trust_store_failure(&self) -> bool {
        matches!(
            self,
            Self::FetchFailure { .. }
                | Self::BadStatus { .. }
                | Self::MalformedDocument { .. }
                | Self::Canceled
        )
    }
}
