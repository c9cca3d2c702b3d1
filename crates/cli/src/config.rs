//! Configuration commands.
//!
//! Settings are loaded from a TOML file and merged with environment variables
//! prefixed with `JWKS_TRUST__`. For example, `JWKS_TRUST__TRUST_STORE__JWKS_URL`
//! overrides `trust_store.jwks_url` in the file.

use std::path::{Path, PathBuf};

use jwks_trust_common::settings::{RefreshMode, Settings};

use crate::error::CliError;

/// Loads settings from `file`, or the bundled defaults when no file is given,
/// then applies a `--jwks-url` override.
pub(crate) fn load_settings(
    file: Option<&Path>,
    jwks_url: Option<&str>,
) -> Result<Settings, CliError> {
    let mut settings = match file {
        Some(path) => {
            log::debug!("Loading settings from {}", path.display());
            Settings::from_file(path)?
        }
        None => Settings::new()?,
    };

    if let Some(url) = jwks_url {
        settings.trust_store.jwks_url = url.to_string();
    }
    Ok(settings)
}

/// Validate a configuration file.
pub fn validate(file: PathBuf, verbose: bool) -> Result<(), CliError> {
    let settings = load_settings(Some(&file), None)?;

    println!("Configuration is valid");
    println!("  File: {}", file.display());
    println!("  Issuer: {}", settings.issuer.name);
    println!("  JWKS URL: {}", settings.trust_store.jwks_url);

    if verbose {
        let refresh = match settings.trust_store.refresh {
            RefreshMode::PerCall => "per call".to_string(),
            RefreshMode::Ttl => format!("every {}s", settings.trust_store.ttl_secs),
            RefreshMode::Manual => "manual".to_string(),
        };
        println!("  Token TTL: {}s", settings.issuer.token_ttl_secs);
        println!("  Refresh: {}", refresh);
        println!("  Fetch timeout: {}ms", settings.trust_store.fetch_timeout_ms);
        println!(
            "  Expected issuer: {}",
            settings
                .verifier
                .expected_issuer
                .as_deref()
                .unwrap_or("<any>")
        );
    }

    Ok(())
}
