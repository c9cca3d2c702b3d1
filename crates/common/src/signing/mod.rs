//! Issuer-side token signing.
//!
//! This module provides Ed25519 key generation, the key store that owns
//! private keys, the JWKS publisher that projects public keys into a
//! discovery document, and the issuer that signs compact tokens.

pub mod issuer;
pub mod jwks;
pub mod keys;
pub mod token;

pub use issuer::*;
pub use jwks::*;
pub use keys::*;
pub use token::{Claims, StructureError};
