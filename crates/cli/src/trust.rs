//! Commands that talk to a remote discovery endpoint.

use std::path::PathBuf;
use std::sync::Arc;

use jwks_trust_common::endpoints::handle_verify_token;
use jwks_trust_common::settings::Settings;
use jwks_trust_common::trust::{TrustStore, Verifier};
use tokio_util::sync::CancellationToken;

use crate::config::load_settings;
use crate::error::CliError;

async fn refreshed_store(
    settings: &Settings,
    cancel: &CancellationToken,
) -> Result<TrustStore, CliError> {
    let store = TrustStore::with_http(
        &settings.trust_store.jwks_url,
        settings.trust_store.to_config(),
    )?;
    let report = store.refresh(cancel).await?;
    log::info!(
        "Fetched {} kept={} skipped={}",
        settings.trust_store.jwks_url,
        report.kept,
        report.skipped
    );
    Ok(store)
}

/// Fetch a discovery document and print the kids that passed filtering.
pub async fn fetch(jwks_url: Option<String>, config: Option<PathBuf>) -> Result<(), CliError> {
    let settings = load_settings(config.as_deref(), jwks_url.as_deref())?;
    let store = refreshed_store(&settings, &CancellationToken::new()).await?;

    if store.is_empty() {
        println!("No usable keys at {}", settings.trust_store.jwks_url);
    }
    for kid in store.kids() {
        println!("{}", kid);
    }
    Ok(())
}

/// Verify a token against a remote discovery document.
pub async fn verify(
    token: String,
    jwks_url: Option<String>,
    config: Option<PathBuf>,
) -> Result<(), CliError> {
    let settings = load_settings(config.as_deref(), jwks_url.as_deref())?;
    let cancel = CancellationToken::new();
    let store = refreshed_store(&settings, &cancel).await?;

    let verifier = Verifier::new(Arc::new(store), settings.verifier.to_policy());
    let verdict = handle_verify_token(&verifier, token.trim(), &cancel).await;

    println!("{}", serde_json::to_string_pretty(&verdict)?);

    if verdict.verified {
        Ok(())
    } else {
        Err(CliError::Rejected(
            verdict.error.unwrap_or_else(|| "unknown".into()),
        ))
    }
}
