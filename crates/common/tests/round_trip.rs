use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use error_stack::Report;
use http::StatusCode;
use jwks_trust_common::error::TrustError;
use jwks_trust_common::signing::{Claims, Issuer, JwksPublisher, KeyStore};
use jwks_trust_common::trust::{
    FetchedDocument, JwksFetcher, RefreshPolicy, Rejection, TrustStore, TrustStoreConfig,
    Verifier, VerifierPolicy,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use url::Url;

const JWKS_URL: &str = "https://issuer.test/.well-known/jwks.json";

/// Serves a fixed discovery document body.
struct StaticDocument {
    body: String,
    calls: AtomicUsize,
}

impl StaticDocument {
    fn new(body: String) -> Self {
        Self {
            body,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl JwksFetcher for StaticDocument {
    async fn fetch(&self, url: &Url) -> Result<FetchedDocument, Report<TrustError>> {
        assert_eq!(url.as_str(), JWKS_URL);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(FetchedDocument {
            status: StatusCode::OK,
            body: self.body.clone().into_bytes(),
        })
    }
}

struct Deployment {
    key_store: Arc<KeyStore>,
    issuer: Issuer,
    publisher: JwksPublisher,
}

fn deployment(kids: &[&str]) -> Deployment {
    let key_store = Arc::new(KeyStore::new());
    for kid in kids {
        key_store
            .generate_and_register(kid)
            .expect("should register key");
    }
    Deployment {
        issuer: Issuer::new(Arc::clone(&key_store)),
        publisher: JwksPublisher::new(Arc::clone(&key_store)),
        key_store,
    }
}

async fn remote_verifier(document: String) -> (Verifier, Arc<StaticDocument>) {
    let fetcher = Arc::new(StaticDocument::new(document));
    let trust_store = TrustStore::new(
        Arc::clone(&fetcher) as Arc<dyn JwksFetcher>,
        TrustStoreConfig {
            refresh_policy: RefreshPolicy::Manual,
            ..TrustStoreConfig::default()
        },
    )
    .with_source(JWKS_URL)
    .expect("valid source");

    trust_store
        .refresh(&CancellationToken::new())
        .await
        .expect("should refresh");

    (
        Verifier::new(Arc::new(trust_store), VerifierPolicy::default()),
        fetcher,
    )
}

fn segments(token: &str) -> Vec<String> {
    token.split('.').map(str::to_string).collect()
}

#[tokio::test]
async fn concrete_scenario_issue_publish_verify() {
    let issuer_side = deployment(&["key-001"]);

    let document = issuer_side.publisher.render_json().expect("should render");
    let json: serde_json::Value = serde_json::from_str(&document).expect("valid json");
    let keys = json["keys"].as_array().expect("keys array");
    assert_eq!(keys.len(), 1);

    let entry = keys[0].as_object().expect("entry object");
    let mut fields: Vec<&str> = entry.keys().map(String::as_str).collect();
    fields.sort_unstable();
    assert_eq!(fields, vec!["alg", "crv", "kid", "kty", "use", "x"]);
    assert_eq!(entry["kty"], "OKP");
    assert_eq!(entry["crv"], "Ed25519");
    assert_eq!(entry["kid"], "key-001");
    assert_eq!(entry["use"], "sig");
    assert_eq!(entry["alg"], "EdDSA");
    let x = entry["x"].as_str().expect("x string");
    assert_eq!(x.len(), 43);
    assert_eq!(URL_SAFE_NO_PAD.decode(x).expect("base64url").len(), 32);

    let claims = Claims {
        iss: "demo".into(),
        sub: None,
        exp: Some(Utc::now().timestamp() + 3600),
    };
    let token = issuer_side
        .issuer
        .issue("key-001", &claims)
        .expect("should issue");
    assert_eq!(token.split('.').count(), 3);

    let (verifier, fetcher) = remote_verifier(document).await;
    let accepted = verifier
        .verify(&token, &CancellationToken::new())
        .await
        .expect("should accept");

    assert_eq!(accepted, claims);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn round_trip_for_every_registered_key() {
    let issuer_side = deployment(&["alpha", "beta", "gamma"]);
    let (verifier, _) =
        remote_verifier(issuer_side.publisher.render_json().expect("should render")).await;

    for kid in ["alpha", "beta", "gamma"] {
        let claims = Claims::new("demo", Duration::from_secs(600)).with_subject(kid);
        let token = issuer_side.issuer.issue(kid, &claims).expect("should issue");

        let accepted = verifier
            .verify(&token, &CancellationToken::new())
            .await
            .expect("should accept");
        assert_eq!(accepted, claims);
    }
    assert_eq!(issuer_side.key_store.latest_kid().as_deref(), Some("gamma"));
}

#[tokio::test]
async fn flipping_any_payload_byte_breaks_the_signature() {
    let issuer_side = deployment(&["key-001"]);
    let (verifier, _) =
        remote_verifier(issuer_side.publisher.render_json().expect("should render")).await;
    let now = Utc::now().timestamp();
    let token = issuer_side
        .issuer
        .issue(
            "key-001",
            &Claims {
                iss: "demo".into(),
                sub: Some("alice".into()),
                exp: Some(now + 3600),
            },
        )
        .expect("should issue");
    let parts = segments(&token);
    let payload = URL_SAFE_NO_PAD.decode(&parts[1]).expect("payload base64");

    for index in 0..payload.len() {
        let mut tampered = payload.clone();
        tampered[index] ^= 0x01;
        let forged = format!(
            "{}.{}.{}",
            parts[0],
            URL_SAFE_NO_PAD.encode(&tampered),
            parts[2]
        );

        let rejection = verifier
            .verify_at(&forged, now, &CancellationToken::new())
            .await
            .expect_err("tampered token should be rejected");
        assert_eq!(rejection, Rejection::BadSignature, "byte {index}");
    }
}

#[tokio::test]
async fn non_eddsa_algorithms_are_rejected() {
    let issuer_side = deployment(&["key-001"]);
    let (verifier, _) =
        remote_verifier(issuer_side.publisher.render_json().expect("should render")).await;
    let token = issuer_side
        .issuer
        .issue("key-001", &Claims::new("demo", Duration::from_secs(600)))
        .expect("should issue");
    let parts = segments(&token);

    for alg in ["none", "HS256", "RS256", "ES256", "eddsa"] {
        let header = json!({"alg": alg, "kid": "key-001", "typ": "JWT"});
        let forged_header = URL_SAFE_NO_PAD.encode(header.to_string());

        // Valid signature bytes and an empty signature must both be refused.
        for signature in [parts[2].as_str(), ""] {
            let forged = format!("{forged_header}.{}.{signature}", parts[1]);
            let rejection = verifier
                .verify(&forged, &CancellationToken::new())
                .await
                .expect_err("should reject");
            assert!(
                matches!(
                    rejection,
                    Rejection::UnsupportedAlgorithm { .. } | Rejection::Malformed { .. }
                ),
                "alg {alg} gave {rejection:?}"
            );
            if !signature.is_empty() {
                assert_eq!(
                    rejection,
                    Rejection::UnsupportedAlgorithm { alg: alg.into() }
                );
            }
        }
    }
}

#[tokio::test]
async fn unknown_kid_never_falls_back() {
    let trusted = deployment(&["key-001"]);
    let untrusted = deployment(&["key-002"]);
    let (verifier, _) =
        remote_verifier(trusted.publisher.render_json().expect("should render")).await;

    let token = untrusted
        .issuer
        .issue("key-002", &Claims::new("demo", Duration::from_secs(600)))
        .expect("should issue");

    assert_eq!(
        verifier.verify(&token, &CancellationToken::new()).await,
        Err(Rejection::UnknownKid {
            kid: "key-002".into()
        })
    );
}

#[tokio::test]
async fn expiry_boundary() {
    let issuer_side = deployment(&["key-001"]);
    let (verifier, _) =
        remote_verifier(issuer_side.publisher.render_json().expect("should render")).await;
    let exp = 2_000_000_000;
    let token = issuer_side
        .issuer
        .issue(
            "key-001",
            &Claims {
                iss: "demo".into(),
                sub: None,
                exp: Some(exp),
            },
        )
        .expect("should issue");
    let cancel = CancellationToken::new();

    assert!(verifier.verify_at(&token, exp - 1, &cancel).await.is_ok());
    assert_eq!(
        verifier.verify_at(&token, exp, &cancel).await,
        Err(Rejection::Expired { exp })
    );
    assert_eq!(
        verifier.verify_at(&token, exp + 60, &cancel).await,
        Err(Rejection::Expired { exp })
    );
}

#[tokio::test]
async fn partial_document_keeps_only_the_valid_key() {
    let issuer_side = deployment(&["good"]);
    let good = issuer_side
        .key_store
        .public_record("good")
        .expect("registered record");
    let short_x = URL_SAFE_NO_PAD.encode([7u8; 16]);
    let document = json!({
        "keys": [
            good,
            { "kty": "RSA", "kid": "rsa", "use": "sig", "n": "sXch", "e": "AQAB" },
            { "kty": "OKP", "crv": "Ed25519", "kid": "bad-b64", "use": "sig", "x": "not base64!" },
            { "kty": "OKP", "crv": "Ed25519", "kid": "short", "use": "sig", "x": short_x }
        ]
    });

    let fetcher = Arc::new(StaticDocument::new(document.to_string()));
    let trust_store = TrustStore::new(fetcher, TrustStoreConfig::default())
        .with_source(JWKS_URL)
        .expect("valid source");
    let report = trust_store
        .refresh(&CancellationToken::new())
        .await
        .expect("partial document should load");

    assert_eq!(report.kept, 1);
    assert_eq!(report.skipped, 3);
    assert_eq!(trust_store.kids(), vec!["good".to_string()]);
}
