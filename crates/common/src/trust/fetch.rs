//! Transport for discovery documents.

use std::time::Duration;

use async_trait::async_trait;
use error_stack::{Report, ResultExt};
use http::StatusCode;
use url::Url;

use crate::error::TrustError;

/// Raw response of a discovery document fetch.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

/// Fetches discovery documents from a remote endpoint.
#[async_trait]
pub trait JwksFetcher: Send + Sync {
    /// Performs one GET of `url`.
    ///
    /// Non-2xx statuses are returned as data, not as errors; status
    /// classification happens in the trust store.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::FetchFailure`] on transport errors.
    async fn fetch(&self, url: &Url) -> Result<FetchedDocument, Report<TrustError>>;
}

/// [`JwksFetcher`] backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpJwksFetcher {
    client: reqwest::Client,
}

impl HttpJwksFetcher {
    /// # Errors
    ///
    /// Returns [`TrustError::Configuration`] if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, Report<TrustError>> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .change_context(TrustError::Configuration {
                message: "Failed to build HTTP client".into(),
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl JwksFetcher for HttpJwksFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedDocument, Report<TrustError>> {
        let response = self
            .client
            .get(url.clone())
            .header(http::header::ACCEPT, "application/json")
            .send()
            .await
            .change_context(TrustError::FetchFailure {
                message: format!("GET {url} failed"),
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .change_context(TrustError::FetchFailure {
                message: format!("Failed to read body from {url}"),
            })?;

        Ok(FetchedDocument {
            status,
            body: body.to_vec(),
        })
    }
}
