#![warn(missing_docs)]
//! Web-evidence eSIM compatibility checks.
//!
//! A model name is turned into a search query, run against a ladder of search
//! backends, optionally enriched with fetched page text, and classified by a
//! keyword and trusted-domain heuristic into a [`Verdict`].

pub mod api;
pub mod classifier;
pub mod controls;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod query;
pub mod search;
pub mod telemetry;

pub use classifier::{
    Confidence, Evidence, EvidenceClassifier, KeywordPolicy, PageSource, Signal,
    TrustedDomainSet, Verdict,
};
pub use controls::{CheckArgs, CheckControls};
pub use error::CheckError;
pub use extract::{ContentExtractor, ExtractedPage, ExtractionConfig, PageFetcher};
pub use pipeline::{Health, Pipeline};
pub use query::build_query;
pub use search::{BackendError, BackendKind, SearchBackend, SearchClient, SearchResult};
