//! Ed25519 token issuance and JWKS-backed verification.
//!
//! An issuer owns a set of Ed25519 keys addressed by key identifier, signs
//! compact tokens with them, and publishes the public halves as a discovery
//! document. A verifier loads that document into a trust store and checks
//! tokens against it.
//!
//! # Modules
//!
//! - [`constants`]: Wire constants and defaults
//! - [`endpoints`]: Transport-agnostic handlers for the service surface
//! - [`error`]: Error types for issuance and trust-store loading
//! - [`settings`]: Configuration loading and validation
//! - [`signing`]: Key store, discovery document publishing and token issuance
//! - [`test_support`]: Testing utilities and stubs
//! - [`trust`]: Trust store, discovery fetching and token verification

pub mod constants;
pub mod endpoints;
pub mod error;
pub mod settings;
pub mod signing;
pub mod trust;
