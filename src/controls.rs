//! Check tuning knobs and the command-line/env surface that produces them.

use clap::Args;
use std::time::Duration;

use crate::classifier::{KeywordPolicy, TrustedDomainSet};
use crate::extract::{ExtractionConfig, DEFAULT_MAX_DOWNLOAD_BYTES, DEFAULT_MAX_PAGE_CHARS};
use crate::search::BackendKind;

/// Immutable configuration shared read-only by every check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckControls {
    /// Results requested from the provider and scanned.
    pub max_results: usize,
    /// Backend ladder in priority order.
    pub backends: Vec<BackendKind>,
    /// Time bound for one backend attempt.
    pub search_timeout: Duration,
    /// Fixed pause between failed backend attempts.
    pub backoff: Duration,
    /// Whether candidate pages are fetched at all.
    pub fetch_pages: bool,
    /// Page fetches allowed per check; later results use their snippet.
    pub max_page_fetches: usize,
    /// Time bound for one page fetch.
    pub fetch_timeout: Duration,
    /// Overall time bound for one check.
    pub deadline: Duration,
    /// Extraction budget.
    pub extraction: ExtractionConfig,
    /// Pages with fewer characters count as failed extractions.
    pub min_page_chars: usize,
    /// Trusted domain allowlist.
    pub trusted_domains: TrustedDomainSet,
    /// Capability term lists.
    pub keywords: KeywordPolicy,
}

impl Default for CheckControls {
    fn default() -> Self {
        Self {
            max_results: 10,
            backends: vec![BackendKind::Html, BackendKind::Lite],
            search_timeout: Duration::from_secs(10),
            backoff: Duration::from_millis(1500),
            fetch_pages: true,
            max_page_fetches: 3,
            fetch_timeout: Duration::from_secs(8),
            deadline: Duration::from_secs(25),
            extraction: ExtractionConfig::default(),
            min_page_chars: 500,
            trusted_domains: TrustedDomainSet::default(),
            keywords: KeywordPolicy::default(),
        }
    }
}

/// Flags shared by every binary that runs checks.
#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Maximum search results scanned per check
    #[arg(long, env = "ESIMCHECK_MAX_RESULTS", default_value_t = 10)]
    pub max_results: usize,

    /// Search backends in priority order, comma separated (html, lite)
    #[arg(
        long,
        env = "ESIMCHECK_BACKENDS",
        value_delimiter = ',',
        default_value = "html,lite"
    )]
    pub backends: Vec<BackendKind>,

    /// Seconds before a single backend attempt is abandoned
    #[arg(long, env = "ESIMCHECK_SEARCH_TIMEOUT_SECS", default_value_t = 10)]
    pub search_timeout_secs: u64,

    /// Milliseconds to wait before trying the next backend
    #[arg(long, env = "ESIMCHECK_BACKOFF_MS", default_value_t = 1500)]
    pub backoff_ms: u64,

    /// Fetch candidate pages instead of relying on snippets alone
    #[arg(
        long,
        env = "ESIMCHECK_FETCH_PAGES",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub fetch_pages: bool,

    /// Page fetches allowed per check
    #[arg(long, env = "ESIMCHECK_MAX_PAGE_FETCHES", default_value_t = 3)]
    pub max_page_fetches: usize,

    /// Seconds before a single page fetch is abandoned
    #[arg(long, env = "ESIMCHECK_FETCH_TIMEOUT_SECS", default_value_t = 8)]
    pub fetch_timeout_secs: u64,

    /// Overall seconds allowed per check
    #[arg(long, env = "ESIMCHECK_DEADLINE_SECS", default_value_t = 25)]
    pub deadline_secs: u64,

    /// Characters kept from an extracted page
    #[arg(long, env = "ESIMCHECK_MAX_PAGE_CHARS", default_value_t = DEFAULT_MAX_PAGE_CHARS)]
    pub max_page_chars: usize,

    /// Extracted pages shorter than this fall back to the snippet
    #[arg(long, env = "ESIMCHECK_MIN_PAGE_CHARS", default_value_t = 500)]
    pub min_page_chars: usize,

    /// Body bytes read per page before parsing
    #[arg(long, env = "ESIMCHECK_MAX_DOWNLOAD_BYTES", default_value_t = DEFAULT_MAX_DOWNLOAD_BYTES)]
    pub max_download_bytes: usize,

    /// Trusted domain allowlist, comma separated (empty = built-in list)
    #[arg(long, env = "ESIMCHECK_TRUSTED_DOMAINS", value_delimiter = ',')]
    pub trusted_domains: Vec<String>,

    /// Treat "nano-sim only" as an explicit denial
    #[arg(long, env = "ESIMCHECK_NANO_SIM_ONLY_NEGATIVE", default_value_t = false)]
    pub nano_sim_only_negative: bool,
}

impl CheckArgs {
    /// Converts the parsed flags into `CheckControls`.
    pub fn build_controls(&self) -> CheckControls {
        let trusted_domains = if self.trusted_domains.iter().all(|d| d.trim().is_empty()) {
            TrustedDomainSet::default()
        } else {
            TrustedDomainSet::new(&self.trusted_domains)
        };
        let keywords = if self.nano_sim_only_negative {
            KeywordPolicy::default().with_nano_sim_only_negative()
        } else {
            KeywordPolicy::default()
        };

        CheckControls {
            max_results: self.max_results.max(1),
            backends: self.backends.clone(),
            search_timeout: Duration::from_secs(self.search_timeout_secs.max(1)),
            backoff: Duration::from_millis(self.backoff_ms),
            fetch_pages: self.fetch_pages,
            max_page_fetches: self.max_page_fetches,
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs.max(1)),
            deadline: Duration::from_secs(self.deadline_secs.max(1)),
            extraction: ExtractionConfig {
                max_chars: self.max_page_chars.max(1),
                max_download_bytes: self.max_download_bytes.max(1),
            },
            min_page_chars: self.min_page_chars,
            trusted_domains,
            keywords,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        check: CheckArgs,
    }

    fn parse(args: &[&str]) -> CheckControls {
        let mut argv = vec!["esimcheck"];
        argv.extend_from_slice(args);
        Harness::try_parse_from(argv)
            .expect("parse")
            .check
            .build_controls()
    }

    #[test]
    fn defaults_match_builtin_controls() {
        assert_eq!(parse(&[]), CheckControls::default());
    }

    #[test]
    fn parses_ladder_and_overrides() {
        let controls = parse(&[
            "--backends",
            "lite,html",
            "--fetch-pages",
            "false",
            "--trusted-domains",
            "example.com, phones.example",
            "--nano-sim-only-negative",
        ]);
        assert_eq!(controls.backends, vec![BackendKind::Lite, BackendKind::Html]);
        assert!(!controls.fetch_pages);
        assert_eq!(
            controls.trusted_domains.domains(),
            &["example.com".to_string(), "phones.example".to_string()]
        );
        assert!(controls
            .keywords
            .negative_terms()
            .iter()
            .any(|term| term == "nano-sim only"));
    }

    #[test]
    fn rejects_unknown_backend() {
        assert!(Harness::try_parse_from(["esimcheck", "--backends", "api"]).is_err());
    }
}
