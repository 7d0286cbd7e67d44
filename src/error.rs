//! Error taxonomy shared by the search, extraction, and orchestration layers.

use thiserror::Error;

/// Conditions raised while answering a compatibility check.
///
/// Only [`CheckError::InvalidInput`] ever reaches a caller of
/// [`crate::Pipeline::check`]; every other variant is folded into a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    /// The model name was empty or otherwise unusable as a search term.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Every backend in the ladder failed or came back empty.
    #[error("search unavailable (attempted: {})", attempted.join(", "))]
    SearchUnavailable {
        /// Backend names in the order they were tried.
        attempted: Vec<String>,
    },
    /// A candidate page could not be fetched or parsed.
    #[error("fetch failed for {url}: {reason}")]
    FetchFailed {
        /// Page that was requested.
        url: String,
        /// Human-readable cause.
        reason: String,
    },
    /// A candidate page carried too little text to be trusted.
    #[error("insufficient content at {url}: {chars} chars (minimum {min})")]
    InsufficientContent {
        /// Page that was extracted.
        url: String,
        /// Characters of cleaned text found.
        chars: usize,
        /// Minimum required.
        min: usize,
    },
}
