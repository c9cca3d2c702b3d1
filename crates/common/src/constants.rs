use std::time::Duration;

use http::header::HeaderName;

/// Path at which the discovery document is served.
pub const JWKS_WELL_KNOWN_PATH: &str = "/.well-known/jwks.json";

pub const HEADER_AUTHORIZATION: HeaderName = HeaderName::from_static("authorization");
pub const BEARER_PREFIX: &str = "Bearer ";
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

pub const JWK_KEY_TYPE_OKP: &str = "OKP";
pub const JWK_CURVE_ED25519: &str = "Ed25519";
pub const JWK_USE_SIG: &str = "sig";
pub const JWS_ALG_EDDSA: &str = "EdDSA";
/// Fully-specified name for EdDSA over Ed25519 (RFC 9864).
pub const JWS_ALG_ED25519: &str = "Ed25519";
pub const JWT_TYPE: &str = "JWT";

pub const ED25519_PUBLIC_KEY_LEN: usize = 32;
pub const ED25519_SIGNATURE_LEN: usize = 64;

pub const DEFAULT_TOKEN_TTL_SECS: u64 = 60;
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_millis(5_000);
pub const DEFAULT_TRUST_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(10);
