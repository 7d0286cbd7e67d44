//! Request orchestration.
//!
//! `check` runs one independent sequence: build the query, walk the search
//! ladder, optionally fetch a bounded number of candidate pages, and classify.
//! The whole sequence is bounded by an overall deadline; nothing is shared
//! between checks except read-only configuration.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::classifier::{EvidenceClassifier, PageSource, Verdict, DEADLINE_REASON};
use crate::controls::CheckControls;
use crate::error::CheckError;
use crate::extract::{ContentExtractor, PageFetcher};
use crate::query::build_query;
use crate::search::{SearchBackend, SearchClient};

/// Static service status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    /// Always `"online"`.
    pub status: &'static str,
    /// Service name.
    pub service: &'static str,
    /// Crate version.
    pub version: &'static str,
}

/// Search → fetch → classify orchestrator.
pub struct Pipeline {
    ladder: Vec<Arc<dyn SearchBackend>>,
    search: SearchClient,
    fetcher: Option<Arc<dyn PageFetcher>>,
    classifier: EvidenceClassifier,
    controls: CheckControls,
}

impl Pipeline {
    /// Builds the production pipeline from `controls`.
    pub fn new(controls: CheckControls) -> Result<Self, reqwest::Error> {
        let ladder = controls
            .backends
            .iter()
            .map(|kind| kind.build(controls.search_timeout))
            .collect::<Result<Vec<_>, _>>()?;
        let fetcher: Option<Arc<dyn PageFetcher>> = if controls.fetch_pages {
            Some(Arc::new(ContentExtractor::new(controls.extraction)?))
        } else {
            None
        };
        Ok(Self::from_parts(controls, ladder, fetcher))
    }

    /// Assembles a pipeline from explicit collaborators.
    pub fn from_parts(
        controls: CheckControls,
        ladder: Vec<Arc<dyn SearchBackend>>,
        fetcher: Option<Arc<dyn PageFetcher>>,
    ) -> Self {
        let classifier = EvidenceClassifier::new(
            controls.trusted_domains.clone(),
            controls.keywords.clone(),
        );
        Self {
            ladder,
            search: SearchClient::new(controls.search_timeout, controls.backoff),
            fetcher,
            classifier,
            controls,
        }
    }

    /// Returns the controls in effect.
    pub fn controls(&self) -> &CheckControls {
        &self.controls
    }

    /// Static liveness report.
    pub fn health(&self) -> Health {
        Health {
            status: "online",
            service: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    /// Answers whether `model` supports an embedded SIM.
    ///
    /// Only a blank model name is an error; search failures, fetch failures,
    /// and deadline expiry all come back as negative verdicts with a reason.
    pub async fn check(&self, model: &str) -> Result<Verdict, CheckError> {
        let query = build_query(model)?;
        let start = Instant::now();
        let deadline = start + self.controls.deadline;
        info!(model, query = %query, "checking model");

        let verdict = match timeout_at(deadline, self.run(model, &query, deadline)).await {
            Ok(verdict) => verdict,
            Err(_) => {
                warn!(
                    model,
                    deadline_ms = self.controls.deadline.as_millis() as u64,
                    "check deadline exceeded"
                );
                Verdict::no_evidence(model, DEADLINE_REASON)
            }
        };

        info!(
            model,
            compatible = verdict.compatible,
            confidence = ?verdict.confidence,
            source = verdict.source_url.as_deref().unwrap_or(""),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "check finished"
        );
        Ok(verdict)
    }

    async fn run(&self, model: &str, query: &str, deadline: Instant) -> Verdict {
        let results = match self
            .search
            .search(query, &self.ladder, self.controls.max_results)
            .await
        {
            Ok(results) => results,
            Err(CheckError::SearchUnavailable { attempted }) => {
                warn!(model, attempted = ?attempted, "search unavailable");
                return Verdict::search_unavailable(model, attempted);
            }
            Err(err) => return Verdict::no_evidence(model, err.to_string()),
        };

        match &self.fetcher {
            Some(fetcher) => {
                let pages = BudgetedPages {
                    fetcher: fetcher.as_ref(),
                    remaining: AtomicUsize::new(self.controls.max_page_fetches),
                    fetch_timeout: self.controls.fetch_timeout,
                    min_chars: self.controls.min_page_chars,
                    deadline,
                };
                self.classifier.classify(model, &results, Some(&pages)).await
            }
            None => self.classifier.classify(model, &results, None).await,
        }
    }
}

/// Per-check page source: caps the number of fetches, clips each fetch to the
/// remaining deadline, and discards pages below the usefulness threshold.
struct BudgetedPages<'a> {
    fetcher: &'a dyn PageFetcher,
    remaining: AtomicUsize,
    fetch_timeout: Duration,
    min_chars: usize,
    deadline: Instant,
}

#[async_trait]
impl<'a> PageSource for BudgetedPages<'a> {
    async fn page_text(&self, url: &str) -> Option<String> {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .ok()?;
        let left = self.deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return None;
        }
        let page = self.fetcher.fetch(url, self.fetch_timeout.min(left)).await?;
        let chars = page.char_count();
        if chars < self.min_chars {
            let err = CheckError::InsufficientContent {
                url: url.to_string(),
                chars,
                min: self.min_chars,
            };
            debug!(error = %err, "falling back to snippet");
            return None;
        }
        Some(page.text)
    }
}
