//! In-process issue, publish and verify scenario.

use std::sync::Arc;

use jwks_trust_common::endpoints::{
    handle_issue_token, handle_jwks, handle_register_key, handle_verify_token, VerifyTokenResponse,
};
use jwks_trust_common::settings::IssuerSettings;
use jwks_trust_common::signing::{Issuer, JwksPublisher, KeyStore};
use jwks_trust_common::trust::{TrustStore, Verifier, VerifierPolicy};
use tokio_util::sync::CancellationToken;

use crate::error::CliError;

pub(crate) struct DemoOutcome {
    pub document: String,
    pub token: String,
    pub verdict: VerifyTokenResponse,
}

/// Registers `kid`, issues a token with it, and verifies that token against a
/// fresh trust store loaded from the published document.
pub(crate) async fn run_scenario(
    kid: &str,
    issuer_name: &str,
    ttl_secs: u64,
) -> Result<DemoOutcome, CliError> {
    let key_store = Arc::new(KeyStore::new());
    let issuer = Issuer::new(Arc::clone(&key_store));
    let publisher = JwksPublisher::new(Arc::clone(&key_store));

    let registered = handle_register_key(&key_store, kid)?;
    let document = handle_jwks(&publisher)?;

    let settings = IssuerSettings {
        name: issuer_name.to_string(),
        subject: None,
        token_ttl_secs: ttl_secs,
    };
    let issued = handle_issue_token(&issuer, &key_store, Some(&registered.kid), &settings)?;

    let trust_store = TrustStore::offline();
    let report = trust_store.load_document(document.as_bytes())?;
    log::debug!("Loaded {} trusted key(s)", report.kept);

    let verifier = Verifier::new(
        Arc::new(trust_store),
        VerifierPolicy {
            expected_issuer: Some(issuer_name.to_string()),
            ..VerifierPolicy::default()
        },
    );
    let verdict = handle_verify_token(&verifier, &issued.token, &CancellationToken::new()).await;

    Ok(DemoOutcome {
        document,
        token: issued.token,
        verdict,
    })
}

pub async fn run(kid: String, issuer: String, ttl: u64) -> Result<(), CliError> {
    let outcome = run_scenario(&kid, &issuer, ttl).await?;

    println!("Discovery document:");
    println!("{}", outcome.document);
    println!("\nToken:");
    println!("{}", outcome.token);
    println!("\nVerdict:");
    println!("{}", serde_json::to_string_pretty(&outcome.verdict)?);

    if outcome.verdict.verified {
        Ok(())
    } else {
        Err(CliError::Rejected(
            outcome.verdict.error.unwrap_or_else(|| "unknown".into()),
        ))
    }
}
