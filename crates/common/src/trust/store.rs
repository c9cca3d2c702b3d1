//! Verifier-side trust store.
//!
//! The [`TrustStore`] maps key identifiers to Ed25519 verification keys
//! loaded from a remote discovery document.
//!
//! # Refresh semantics
//!
//! - Refresh is additive: each kept entry overwrites the entry with the same
//!   kid, and kids missing from a later document stay trusted.
//! - The map lock is only taken for the final update, never across the
//!   network fetch.
//! - Fetches are bounded by [`TrustStoreConfig::fetch_timeout`] and abort when
//!   the caller's [`CancellationToken`] fires.
//! - Concurrent refreshes triggered by [`TrustStore::ensure_fresh`] collapse
//!   into one fetch. Callers queued behind a failed fetch get its failure
//!   instead of fetching again, and a failed fetch is not retried before
//!   [`TrustStoreConfig::min_refresh_interval`] has passed.
//! - [`TrustStore::ensure_fresh_for`] never waits on an in-flight refresh when
//!   the kid is already trusted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ed25519_dalek::VerifyingKey;
use error_stack::{Report, ResultExt};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::constants::{DEFAULT_FETCH_TIMEOUT, DEFAULT_MIN_REFRESH_INTERVAL, DEFAULT_TRUST_TTL};
use crate::error::TrustError;
use crate::signing::jwks::parse_discovery_document;

use super::fetch::{FetchedDocument, HttpJwksFetcher, JwksFetcher};

/// When verification triggers a refresh of the trust store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Fetch before every verification.
    PerCall,
    /// Fetch when the last successful refresh is older than the TTL.
    Ttl(Duration),
    /// Only explicit [`TrustStore::refresh`] calls fetch.
    Manual,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self::Ttl(DEFAULT_TRUST_TTL)
    }
}

#[derive(Debug, Clone)]
pub struct TrustStoreConfig {
    pub fetch_timeout: Duration,
    pub refresh_policy: RefreshPolicy,
    /// Minimum spacing between refreshes triggered by an unknown kid.
    pub min_refresh_interval: Duration,
}

impl Default for TrustStoreConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            refresh_policy: RefreshPolicy::default(),
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
        }
    }
}

/// Outcome of applying one discovery document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    pub kept: usize,
    pub skipped: usize,
}

#[derive(Debug, Default)]
struct RefreshState {
    last_success: Option<Instant>,
    /// Completion time of the last fetch that was not canceled.
    last_attempt: Option<Instant>,
    /// Bumped whenever `last_attempt` is.
    attempts: u64,
    last_failure: Option<TrustError>,
}

impl RefreshState {
    fn outcome(&self) -> Result<(), Report<TrustError>> {
        match &self.last_failure {
            Some(failure) => Err(Report::new(failure.clone())
                .attach("reusing the outcome of a concurrent refresh")),
            None => Ok(()),
        }
    }
}

/// Fetcher for stores that are only ever loaded in-process.
struct OfflineFetcher;

#[async_trait]
impl JwksFetcher for OfflineFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedDocument, Report<TrustError>> {
        Err(Report::new(TrustError::FetchFailure {
            message: format!("no transport configured for {url}"),
        }))
    }
}

pub struct TrustStore {
    source: Option<Url>,
    fetcher: Arc<dyn JwksFetcher>,
    config: TrustStoreConfig,
    keys: RwLock<HashMap<String, VerifyingKey>>,
    state: Mutex<RefreshState>,
    refresh_gate: tokio::sync::Mutex<()>,
}

impl TrustStore {
    #[must_use]
    pub fn new(fetcher: Arc<dyn JwksFetcher>, config: TrustStoreConfig) -> Self {
        Self {
            source: None,
            fetcher,
            config,
            keys: RwLock::new(HashMap::new()),
            state: Mutex::new(RefreshState::default()),
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// A store with no transport, populated through [`TrustStore::load_document`].
    #[must_use]
    pub fn offline() -> Self {
        Self::new(
            Arc::new(OfflineFetcher),
            TrustStoreConfig {
                refresh_policy: RefreshPolicy::Manual,
                ..TrustStoreConfig::default()
            },
        )
    }

    /// A store that fetches `source` over HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::Configuration`] if `source` is not a valid URL or
    /// the HTTP client cannot be built.
    pub fn with_http(source: &str, config: TrustStoreConfig) -> Result<Self, Report<TrustError>> {
        let fetcher = HttpJwksFetcher::new(config.fetch_timeout)?;
        Self::new(Arc::new(fetcher), config).with_source(source)
    }

    /// Sets the discovery endpoint used by [`TrustStore::refresh`] and by
    /// policy-driven refreshes.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::Configuration`] if `source` is not a valid URL.
    pub fn with_source(mut self, source: &str) -> Result<Self, Report<TrustError>> {
        self.source = Some(parse_source(source)?);
        Ok(self)
    }

    #[must_use]
    pub fn source(&self) -> Option<&Url> {
        self.source.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &TrustStoreConfig {
        &self.config
    }

    #[must_use]
    pub fn lookup(&self, kid: &str) -> Option<VerifyingKey> {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kid)
            .copied()
    }

    /// Trusted kids, sorted.
    #[must_use]
    pub fn kids(&self) -> Vec<String> {
        let mut kids: Vec<String> = self
            .keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        kids.sort();
        kids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetches the configured source and merges it into the trust map.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::Configuration`] if no source is configured,
    /// otherwise see [`TrustStore::refresh_from`].
    pub async fn refresh(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RefreshReport, Report<TrustError>> {
        let source = self.source.clone().ok_or_else(|| {
            Report::new(TrustError::Configuration {
                message: "no discovery source configured".into(),
            })
        })?;
        self.refresh_url(&source, cancel).await
    }

    /// Fetches the discovery document at `source` and merges it into the
    /// trust map. A failed refresh leaves the map untouched.
    ///
    /// # Errors
    ///
    /// - [`TrustError::FetchFailure`] on transport error or timeout
    /// - [`TrustError::BadStatus`] on a non-2xx response
    /// - [`TrustError::MalformedDocument`] if the body is not a key set
    /// - [`TrustError::Canceled`] if `cancel` fires first
    pub async fn refresh_from(
        &self,
        source: &str,
        cancel: &CancellationToken,
    ) -> Result<RefreshReport, Report<TrustError>> {
        let url = parse_source(source)?;
        self.refresh_url(&url, cancel).await
    }

    async fn refresh_url(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<RefreshReport, Report<TrustError>> {
        let result = self.fetch_and_apply(url, cancel).await;

        let failure = result.as_ref().err().map(|e| e.current_context().clone());
        if failure != Some(TrustError::Canceled) {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.last_attempt = Some(Instant::now());
            state.attempts += 1;
            state.last_failure = failure;
        }

        match &result {
            Ok(report) => log::info!(
                "Refreshed trust store from {} kept={} skipped={}",
                url,
                report.kept,
                report.skipped
            ),
            Err(e) => log::warn!("Trust store refresh from {} failed: {:?}", url, e),
        }
        result
    }

    async fn fetch_and_apply(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<RefreshReport, Report<TrustError>> {
        let timeout = self.config.fetch_timeout;
        let fetched = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(
                    Report::new(TrustError::Canceled).attach(format!("while fetching {url}"))
                );
            }
            result = tokio::time::timeout(timeout, self.fetcher.fetch(url)) => match result {
                Ok(fetched) => fetched?,
                Err(_) => {
                    return Err(Report::new(TrustError::FetchFailure {
                        message: format!("GET {url} timed out after {}ms", timeout.as_millis()),
                    }));
                }
            },
        };

        if !fetched.status.is_success() {
            return Err(Report::new(TrustError::BadStatus {
                status: fetched.status.as_u16(),
                url: url.to_string(),
            }));
        }

        self.load_document(&fetched.body)
    }

    /// Merges a discovery document into the trust map without network I/O.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::MalformedDocument`] if `body` is not a key set.
    pub fn load_document(&self, body: &[u8]) -> Result<RefreshReport, Report<TrustError>> {
        let parsed = parse_discovery_document(body)?;

        for skipped in &parsed.skipped {
            log::warn!(
                "Skipping discovery entry kid={}: {}",
                skipped.kid.as_deref().unwrap_or("<none>"),
                skipped.reason
            );
        }

        let report = RefreshReport {
            kept: parsed.keys.len(),
            skipped: parsed.skipped.len(),
        };

        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        for (kid, key) in parsed.keys {
            if keys.insert(kid.clone(), key).is_some_and(|old| old != key) {
                log::info!("Replaced trusted key kid={}", kid);
            }
        }
        drop(keys);

        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_success = Some(Instant::now());

        Ok(report)
    }

    fn is_stale(&self, ttl: Duration) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_success
            .map_or(true, |at| at.elapsed() >= ttl)
    }

    fn attempted_within(&self, interval: Duration) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_attempt
            .is_some_and(|at| at.elapsed() < interval)
    }

    fn attempts(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .attempts
    }

    /// The failure of the last fetch, if it failed within `interval`.
    fn recent_failure(&self, interval: Duration) -> Option<Report<TrustError>> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let recent = state.last_attempt.is_some_and(|at| at.elapsed() < interval);
        if recent {
            state.outcome().err()
        } else {
            None
        }
    }

    fn last_outcome(&self) -> Result<(), Report<TrustError>> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .outcome()
    }

    async fn acquire_gate(
        &self,
        cancel: &CancellationToken,
    ) -> Result<tokio::sync::MutexGuard<'_, ()>, Report<TrustError>> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Report::new(TrustError::Canceled)),
            guard = self.refresh_gate.lock() => Ok(guard),
        }
    }

    /// Applies the refresh policy ahead of a lookup.
    ///
    /// Does nothing when no source is configured.
    ///
    /// # Errors
    ///
    /// Propagates the refresh failure; the existing trust map stays usable.
    pub async fn ensure_fresh(&self, cancel: &CancellationToken) -> Result<(), Report<TrustError>> {
        self.apply_policy(cancel, true).await
    }

    /// Like [`TrustStore::ensure_fresh`], but when `kid` is already trusted
    /// under the TTL policy it returns at once if another caller is
    /// refreshing, leaving the cached key in use.
    ///
    /// # Errors
    ///
    /// Propagates the refresh failure; the existing trust map stays usable.
    pub async fn ensure_fresh_for(
        &self,
        kid: &str,
        cancel: &CancellationToken,
    ) -> Result<(), Report<TrustError>> {
        let wait_for_gate = self.lookup(kid).is_none();
        self.apply_policy(cancel, wait_for_gate).await
    }

    async fn apply_policy(
        &self,
        cancel: &CancellationToken,
        wait_for_gate: bool,
    ) -> Result<(), Report<TrustError>> {
        let Some(source) = self.source.as_ref() else {
            return Ok(());
        };

        match self.config.refresh_policy {
            RefreshPolicy::Manual => Ok(()),
            RefreshPolicy::PerCall => self.refresh_url(source, cancel).await.map(|_| ()),
            RefreshPolicy::Ttl(ttl) => {
                if !self.is_stale(ttl) {
                    return Ok(());
                }
                if let Some(failure) = self.recent_failure(self.config.min_refresh_interval) {
                    return Err(failure);
                }

                let seen = self.attempts();
                let _guard = if wait_for_gate {
                    self.acquire_gate(cancel).await?
                } else {
                    match self.refresh_gate.try_lock() {
                        Ok(guard) => guard,
                        Err(_) => return Ok(()),
                    }
                };

                // A refresh finished while we waited; share its outcome.
                if self.attempts() != seen {
                    return self.last_outcome();
                }
                if !self.is_stale(ttl) {
                    return Ok(());
                }
                self.refresh_url(source, cancel).await.map(|_| ())
            }
        }
    }

    /// Refreshes after a kid miss, at most once per
    /// [`TrustStoreConfig::min_refresh_interval`]. Only the TTL policy
    /// refreshes on a miss.
    ///
    /// Returns whether a refresh ran.
    ///
    /// # Errors
    ///
    /// Propagates the refresh failure.
    pub async fn refresh_on_miss(
        &self,
        cancel: &CancellationToken,
    ) -> Result<bool, Report<TrustError>> {
        let Some(source) = self.source.as_ref() else {
            return Ok(false);
        };
        if !matches!(self.config.refresh_policy, RefreshPolicy::Ttl(_)) {
            return Ok(false);
        }

        let interval = self.config.min_refresh_interval;
        if self.attempted_within(interval) {
            return Ok(false);
        }
        let seen = self.attempts();
        let _guard = self.acquire_gate(cancel).await?;
        if self.attempts() != seen {
            return self.last_outcome().map(|()| true);
        }
        if self.attempted_within(interval) {
            return Ok(false);
        }
        self.refresh_url(source, cancel).await.map(|_| true)
    }
}

fn parse_source(source: &str) -> Result<Url, Report<TrustError>> {
    Url::parse(source).change_context(TrustError::Configuration {
        message: format!("Invalid discovery source: {source}"),
    })
}
