//! Ranked web search driven by an ordered ladder of interchangeable backends.
//!
//! The [`SearchClient`] walks the ladder front to back. An attempt that errors,
//! times out, or comes back empty is followed by a fixed backoff and the next
//! backend; the first non-empty result set wins.

pub mod duckduckgo;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::CheckError;

pub use duckduckgo::DuckDuckGoBackend;

/// One ranked hit returned by a search provider.
///
/// Fields the provider left out are empty strings, never a parse failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    /// Result title.
    pub title: String,
    /// Provider snippet.
    pub body: String,
    /// Destination URL.
    pub url: String,
}

impl SearchResult {
    /// Builds a result from its three text fields.
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            url: url.into(),
        }
    }
}

/// Failures raised by a single backend attempt.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Transport-level failure talking to the provider.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider answered with a non-success status.
    #[error("provider returned status {0}")]
    Status(u16),
    /// The attempt exceeded its time bound.
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),
}

/// A concrete way of querying the search provider.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Short label used in logs and failure reports.
    fn name(&self) -> &str;

    /// Runs `query`, returning at most `max_results` hits in provider order.
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, BackendError>;
}

/// Backend variants selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// DuckDuckGo HTML endpoint with browser-like request headers.
    Html,
    /// DuckDuckGo Lite endpoint with minimal headers.
    Lite,
}

impl BackendKind {
    /// Label used in configuration and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Lite => "lite",
        }
    }

    /// Instantiates the backend with the given per-request timeout.
    pub fn build(
        &self,
        request_timeout: Duration,
    ) -> Result<Arc<dyn SearchBackend>, reqwest::Error> {
        let backend = DuckDuckGoBackend::new(*self, request_timeout)?;
        Ok(Arc::new(backend))
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(Self::Html),
            "lite" => Ok(Self::Lite),
            other => Err(format!("unknown search backend `{other}` (expected html or lite)")),
        }
    }
}

/// Drives a backend ladder with per-attempt time bounds and fixed backoff.
#[derive(Debug, Clone)]
pub struct SearchClient {
    attempt_timeout: Duration,
    backoff: Duration,
}

impl SearchClient {
    /// Builds a client that bounds each attempt by `attempt_timeout` and waits
    /// `backoff` before moving to the next backend.
    pub fn new(attempt_timeout: Duration, backoff: Duration) -> Self {
        Self {
            attempt_timeout,
            backoff,
        }
    }

    /// Returns the first non-empty result set produced by `ladder`.
    ///
    /// Results keep provider order and are truncated to `max_results`. When
    /// every backend fails or returns nothing the error lists the backends
    /// that were tried.
    pub async fn search(
        &self,
        query: &str,
        ladder: &[Arc<dyn SearchBackend>],
        max_results: usize,
    ) -> Result<Vec<SearchResult>, CheckError> {
        let max_results = max_results.max(1);
        let mut attempted = Vec::with_capacity(ladder.len());

        for (attempt, backend) in ladder.iter().enumerate() {
            if attempt > 0 {
                debug!(
                    backoff_ms = self.backoff.as_millis() as u64,
                    "backing off before next backend"
                );
                sleep(self.backoff).await;
            }
            let name = backend.name().to_string();
            attempted.push(name.clone());

            let start = Instant::now();
            let attempt_future = backend.search(query, max_results);
            let outcome = match timeout(self.attempt_timeout, attempt_future).await {
                Ok(result) => result,
                Err(_) => Err(BackendError::Timeout(self.attempt_timeout)),
            };
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match outcome {
                Ok(mut results) if !results.is_empty() => {
                    results.truncate(max_results);
                    info!(
                        backend = %name,
                        attempt,
                        count = results.len(),
                        elapsed_ms,
                        "search succeeded"
                    );
                    return Ok(results);
                }
                Ok(_) => {
                    warn!(backend = %name, attempt, elapsed_ms, "search returned no results");
                }
                Err(err) => {
                    warn!(
                        backend = %name,
                        attempt,
                        elapsed_ms,
                        error = %err,
                        "search attempt failed"
                    );
                }
            }
        }

        Err(CheckError::SearchUnavailable { attempted })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted outcome for a fake backend.
    pub(crate) enum Script {
        Results(Vec<SearchResult>),
        Empty,
        Fail,
        Hang,
    }

    pub(crate) struct FakeBackend {
        name: &'static str,
        script: Script,
        calls: AtomicUsize,
    }

    impl FakeBackend {
        pub(crate) fn new(name: &'static str, script: Script) -> Arc<Self> {
            Arc::new(Self {
                name,
                script,
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SearchBackend for FakeBackend {
        fn name(&self) -> &str {
            self.name
        }

        async fn search(
            &self,
            _query: &str,
            _max_results: usize,
        ) -> Result<Vec<SearchResult>, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                Script::Results(results) => Ok(results.clone()),
                Script::Empty => Ok(Vec::new()),
                Script::Fail => Err(BackendError::Status(503)),
                Script::Hang => {
                    sleep(Duration::from_secs(3600)).await;
                    Ok(Vec::new())
                }
            }
        }
    }
}
