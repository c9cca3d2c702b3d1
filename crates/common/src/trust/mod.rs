//! Verifier-side trust.
//!
//! - [`fetch`]: transport for discovery documents
//! - [`store`]: the kid to verification key map and its refresh policy
//! - [`verifier`]: token verification against a trust store

pub mod fetch;
pub mod store;
pub mod verifier;

pub use fetch::{FetchedDocument, HttpJwksFetcher, JwksFetcher};
pub use store::{RefreshPolicy, RefreshReport, TrustStore, TrustStoreConfig};
pub use verifier::{ExpiryPolicy, Rejection, Verifier, VerifierPolicy};
