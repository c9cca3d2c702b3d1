use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::constants::{
    DEFAULT_FETCH_TIMEOUT, DEFAULT_MIN_REFRESH_INTERVAL, DEFAULT_TOKEN_TTL_SECS, DEFAULT_TRUST_TTL,
};
use crate::error::TrustError;
use crate::trust::store::{RefreshPolicy, TrustStoreConfig};
use crate::trust::verifier::{ExpiryPolicy, VerifierPolicy};

/// Prefix for environment overrides, e.g. `JWKS_TRUST__ISSUER__NAME`.
pub const ENVIRONMENT_PREFIX: &str = "JWKS_TRUST";

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct IssuerSettings {
    /// Value of the `iss` claim.
    #[validate(length(min = 1))]
    pub name: String,

    /// Value of the `sub` claim, omitted when unset.
    #[serde(default)]
    pub subject: Option<String>,

    #[serde(default = "default_token_ttl_secs")]
    #[validate(range(min = 1, max = 86400))]
    pub token_ttl_secs: u64,
}

impl IssuerSettings {
    #[must_use]
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    PerCall,
    #[default]
    Ttl,
    Manual,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct TrustStoreSettings {
    /// Discovery endpoint of the issuer.
    #[validate(url)]
    pub jwks_url: String,

    #[serde(default = "default_fetch_timeout_ms")]
    #[validate(range(min = 1, max = 60000))]
    pub fetch_timeout_ms: u64,

    #[serde(default)]
    pub refresh: RefreshMode,

    /// Only used with `refresh = "ttl"`.
    #[serde(default = "default_ttl_secs")]
    #[validate(range(min = 1))]
    pub ttl_secs: u64,

    #[serde(default = "default_min_refresh_interval_secs")]
    pub min_refresh_interval_secs: u64,
}

impl TrustStoreSettings {
    #[must_use]
    pub fn to_config(&self) -> TrustStoreConfig {
        let refresh_policy = match self.refresh {
            RefreshMode::PerCall => RefreshPolicy::PerCall,
            RefreshMode::Ttl => RefreshPolicy::Ttl(Duration::from_secs(self.ttl_secs)),
            RefreshMode::Manual => RefreshPolicy::Manual,
        };

        TrustStoreConfig {
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
            refresh_policy,
            min_refresh_interval: Duration::from_secs(self.min_refresh_interval_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingExpiry {
    #[default]
    Reject,
    Allow,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct VerifierSettings {
    #[serde(default)]
    #[validate(length(min = 1))]
    pub expected_issuer: Option<String>,

    #[serde(default)]
    pub missing_expiry: MissingExpiry,

    #[serde(default)]
    #[validate(range(max = 3600))]
    pub leeway_secs: u64,
}

impl VerifierSettings {
    #[must_use]
    pub fn to_policy(&self) -> VerifierPolicy {
        VerifierPolicy {
            expected_issuer: self.expected_issuer.clone(),
            expiry: match self.missing_expiry {
                MissingExpiry::Reject => ExpiryPolicy::Require,
                MissingExpiry::Allow => ExpiryPolicy::AllowMissing,
            },
            leeway_secs: self.leeway_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct Settings {
    #[validate(nested)]
    pub issuer: IssuerSettings,
    #[validate(nested)]
    pub trust_store: TrustStoreSettings,
    #[serde(default)]
    #[validate(nested)]
    pub verifier: VerifierSettings,
}

impl Settings {
    /// Loads the settings bundled with the crate, with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::Configuration`] if the result fails validation.
    pub fn new() -> Result<Self, Report<TrustError>> {
        Self::from_toml(include_str!("../../../jwks-trust.toml"))
    }

    /// Parses and validates settings from TOML, applying `JWKS_TRUST__*`
    /// environment overrides on top.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::Configuration`] on parse or validation failure.
    pub fn from_toml(toml_str: &str) -> Result<Self, Report<TrustError>> {
        let environment = Environment::default()
            .prefix(ENVIRONMENT_PREFIX)
            .separator("__");

        let toml = File::from_str(toml_str, FileFormat::Toml);
        let settings: Self = Config::builder()
            .add_source(toml)
            .add_source(environment)
            .build()
            .and_then(|config| config.try_deserialize::<Self>())
            .change_context(TrustError::Configuration {
                message: "Failed to parse settings".into(),
            })?;

        settings
            .validate()
            .change_context(TrustError::Configuration {
                message: "Settings validation failed".into(),
            })?;

        Ok(settings)
    }

    /// # Errors
    ///
    /// Returns [`TrustError::Configuration`] if the file cannot be read or
    /// its contents are invalid.
    pub fn from_file(path: &Path) -> Result<Self, Report<TrustError>> {
        let toml_str = std::fs::read_to_string(path).change_context(TrustError::Configuration {
            message: format!("Failed to read {}", path.display()),
        })?;
        Self::from_toml(&toml_str).attach(format!("in {}", path.display()))
    }
}

fn default_token_ttl_secs() -> u64 {
    DEFAULT_TOKEN_TTL_SECS
}

fn default_fetch_timeout_ms() -> u64 {
    u64::try_from(DEFAULT_FETCH_TIMEOUT.as_millis()).unwrap_or(u64::MAX)
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TRUST_TTL.as_secs()
}

fn default_min_refresh_interval_secs() -> u64 {
    DEFAULT_MIN_REFRESH_INTERVAL.as_secs()
}
