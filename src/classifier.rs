//! Evidence-based compatibility classification.
//!
//! Results are scanned strictly in provider rank order. An affirming result
//! from a trusted domain ends the scan immediately with high confidence; the
//! first affirming result from any other domain is held as a candidate and
//! only reported (at medium confidence) once the whole ranked set has been
//! seen without a trusted confirmation.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::search::SearchResult;

/// Reason attached when no result affirmed support.
pub const NO_MENTION_REASON: &str = "no explicit mention found";
/// Reason attached when every search backend failed.
pub const SEARCH_UNAVAILABLE_REASON: &str = "search unavailable";
/// Reason attached when the overall request deadline elapsed.
pub const DEADLINE_REASON: &str = "deadline exceeded";
/// Characters kept per debug snippet.
pub const DEFAULT_SNIPPET_CHARS: usize = 200;

/// Domains known to publish reliable device specifications.
pub const DEFAULT_TRUSTED_DOMAINS: &[&str] = &[
    "gsmarena.com",
    "airalo.com",
    "holafly.com",
    "apple.com",
    "samsung.com",
    "motorola.com",
    "mi.com",
    "devicespecifications.com",
    "tudocelular.com",
    "tecmundo.com.br",
    "kimovil.com",
];

/// Terms that affirm embedded SIM support.
pub const DEFAULT_POSITIVE_TERMS: &[&str] = &["esim", "e-sim", "embedded sim"];

/// Terms that explicitly deny embedded SIM support.
pub const DEFAULT_NEGATIVE_TERMS: &[&str] = &[
    "no esim",
    "no e-sim",
    "not support esim",
    "esim not supported",
];

/// Optional negative term for devices advertised as physical-SIM only.
pub const NANO_SIM_ONLY_TERM: &str = "nano-sim only";

/// Read-only set of trusted domain substrings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedDomainSet {
    domains: Vec<String>,
}

impl TrustedDomainSet {
    /// Builds a set from arbitrary domain substrings (lower-cased, blanks dropped).
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains = domains
            .into_iter()
            .map(|domain| domain.as_ref().trim().to_lowercase())
            .filter(|domain| !domain.is_empty())
            .collect();
        Self { domains }
    }

    /// Domains in configuration order.
    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// True when the lower-cased `url` contains any trusted domain.
    pub fn matches(&self, url: &str) -> bool {
        let url = url.to_lowercase();
        self.domains.iter().any(|domain| url.contains(domain.as_str()))
    }
}

impl Default for TrustedDomainSet {
    fn default() -> Self {
        Self::new(DEFAULT_TRUSTED_DOMAINS)
    }
}

/// Outcome of scanning one evidence text for capability terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// A positive term and no negative term.
    Affirming,
    /// A negative term; overrides any positive term.
    Negated,
    /// Neither.
    Silent,
}

/// Positive and negative capability term lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordPolicy {
    positive: Vec<String>,
    negative: Vec<String>,
}

impl KeywordPolicy {
    /// Builds a policy from explicit term lists.
    pub fn new<P, N, S>(positive: P, negative: N) -> Self
    where
        P: IntoIterator<Item = S>,
        N: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalize = |term: S| term.as_ref().trim().to_lowercase();
        Self {
            positive: positive.into_iter().map(normalize).filter(|t| !t.is_empty()).collect(),
            negative: negative.into_iter().map(normalize).filter(|t| !t.is_empty()).collect(),
        }
    }

    /// Also treats "nano-sim only" as a denial.
    pub fn with_nano_sim_only_negative(mut self) -> Self {
        if !self.negative.iter().any(|term| term == NANO_SIM_ONLY_TERM) {
            self.negative.push(NANO_SIM_ONLY_TERM.to_string());
        }
        self
    }

    /// Negative terms in effect.
    pub fn negative_terms(&self) -> &[String] {
        &self.negative
    }

    /// Classifies already lower-cased `text`.
    pub fn assess(&self, text: &str) -> Signal {
        if self.negative.iter().any(|term| text.contains(term.as_str())) {
            Signal::Negated
        } else if self.positive.iter().any(|term| text.contains(term.as_str())) {
            Signal::Affirming
        } else {
            Signal::Silent
        }
    }
}

impl Default for KeywordPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_POSITIVE_TERMS, DEFAULT_NEGATIVE_TERMS)
    }
}

/// Confidence tier attached to a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// No supporting evidence.
    None,
    /// Affirmed by an untrusted source.
    Medium,
    /// Affirmed by a trusted domain.
    High,
}

/// Text fragment examined for one ranked result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evidence {
    /// URL of the result the text came from.
    pub source_url: String,
    /// Lower-cased page text or snippet.
    pub text: String,
    /// Whether `source_url` matched the trusted set.
    pub is_trusted_domain: bool,
}

/// Final answer for one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    /// Whether explicit support was found.
    pub compatible: bool,
    /// Confidence tier.
    pub confidence: Confidence,
    /// Model name as checked.
    pub model: String,
    /// URL of the supporting evidence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Supporting evidence text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_text: Option<String>,
    /// Why the verdict is negative.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Truncated evidence seen while scanning, in rank order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_snippets: Option<Vec<String>>,
    /// Search backends tried when search was unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backends_attempted: Option<Vec<String>>,
}

impl Verdict {
    fn affirmed(model: &str, evidence: Evidence, confidence: Confidence) -> Self {
        Self {
            compatible: true,
            confidence,
            model: model.to_string(),
            source_url: Some(evidence.source_url),
            evidence_text: Some(evidence.text),
            reason: None,
            debug_snippets: None,
            backends_attempted: None,
        }
    }

    /// Negative verdict carrying `reason`.
    pub fn no_evidence(model: &str, reason: impl Into<String>) -> Self {
        Self {
            compatible: false,
            confidence: Confidence::None,
            model: model.to_string(),
            source_url: None,
            evidence_text: None,
            reason: Some(reason.into()),
            debug_snippets: None,
            backends_attempted: None,
        }
    }

    /// Negative verdict for an exhausted search ladder.
    pub fn search_unavailable(model: &str, attempted: Vec<String>) -> Self {
        Self {
            backends_attempted: Some(attempted),
            ..Self::no_evidence(model, SEARCH_UNAVAILABLE_REASON)
        }
    }
}

/// Supplies cleaned page text for a result URL, or `None` to fall back to the snippet.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Returns usable page text for `url`.
    async fn page_text(&self, url: &str) -> Option<String>;
}

/// Keyword and domain heuristic over ranked search results.
#[derive(Debug, Clone, Default)]
pub struct EvidenceClassifier {
    trusted: TrustedDomainSet,
    keywords: KeywordPolicy,
    snippet_chars: Option<usize>,
}

impl EvidenceClassifier {
    /// Builds a classifier over the given read-only lists.
    pub fn new(trusted: TrustedDomainSet, keywords: KeywordPolicy) -> Self {
        Self {
            trusted,
            keywords,
            snippet_chars: None,
        }
    }

    /// Overrides the per-snippet character cap used in debug output.
    pub fn with_snippet_chars(mut self, chars: usize) -> Self {
        self.snippet_chars = Some(chars);
        self
    }

    /// Trusted domain set in use.
    pub fn trusted_domains(&self) -> &TrustedDomainSet {
        &self.trusted
    }

    /// Scans `results` in order and returns the verdict for `model`.
    ///
    /// When `pages` is supplied, page text replaces the snippet for every
    /// result it can serve. No page is requested once a trusted result has
    /// confirmed support.
    pub async fn classify(
        &self,
        model: &str,
        results: &[SearchResult],
        pages: Option<&dyn PageSource>,
    ) -> Verdict {
        let mut scan = Scan::new(self.snippet_chars.unwrap_or(DEFAULT_SNIPPET_CHARS));
        for (rank, result) in results.iter().enumerate() {
            let evidence = self.evidence_for(result, pages).await;
            let signal = self.keywords.assess(&evidence.text);
            debug!(
                rank,
                url = %evidence.source_url,
                trusted = evidence.is_trusted_domain,
                ?signal,
                "evidence assessed"
            );
            if let Step::Confirmed(evidence) = scan.observe(evidence, signal) {
                return Verdict::affirmed(model, evidence, Confidence::High);
            }
        }
        scan.finish(model)
    }

    async fn evidence_for(
        &self,
        result: &SearchResult,
        pages: Option<&dyn PageSource>,
    ) -> Evidence {
        let page_text = match pages {
            Some(pages) if !result.url.is_empty() => pages.page_text(&result.url).await,
            _ => None,
        };
        let text = page_text.as_deref().unwrap_or(&result.body).to_lowercase();
        Evidence {
            source_url: result.url.clone(),
            text,
            is_trusted_domain: self.trusted.matches(&result.url),
        }
    }
}

enum Step {
    Continue,
    Confirmed(Evidence),
}

enum ScanState {
    Scanning,
    Candidate(Evidence),
}

/// Accumulator for the ranked scan; `Confirmed` is the only early exit.
struct Scan {
    state: ScanState,
    snippets: Vec<String>,
    snippet_chars: usize,
}

impl Scan {
    fn new(snippet_chars: usize) -> Self {
        Self {
            state: ScanState::Scanning,
            snippets: Vec::new(),
            snippet_chars,
        }
    }

    fn observe(&mut self, evidence: Evidence, signal: Signal) -> Step {
        self.snippets
            .push(evidence.text.chars().take(self.snippet_chars).collect());
        if signal != Signal::Affirming {
            return Step::Continue;
        }
        if evidence.is_trusted_domain {
            return Step::Confirmed(evidence);
        }
        if let ScanState::Scanning = self.state {
            self.state = ScanState::Candidate(evidence);
        }
        Step::Continue
    }

    fn finish(self, model: &str) -> Verdict {
        match self.state {
            ScanState::Candidate(evidence) => {
                Verdict::affirmed(model, evidence, Confidence::Medium)
            }
            ScanState::Scanning => Verdict {
                debug_snippets: Some(self.snippets),
                ..Verdict::no_evidence(model, NO_MENTION_REASON)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn result(body: &str, url: &str) -> SearchResult {
        SearchResult::new("title", body, url)
    }

    struct RecordingPages {
        texts: HashMap<String, String>,
        requested: Mutex<Vec<String>>,
    }

    impl RecordingPages {
        fn new(entries: &[(&str, &str)]) -> Self {
            Self {
                texts: entries
                    .iter()
                    .map(|(url, text)| (url.to_string(), text.to_string()))
                    .collect(),
                requested: Mutex::new(Vec::new()),
            }
        }

        fn requested(&self) -> Vec<String> {
            self.requested.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl PageSource for RecordingPages {
        async fn page_text(&self, url: &str) -> Option<String> {
            self.requested.lock().expect("lock").push(url.to_string());
            self.texts.get(url).cloned()
        }
    }

    #[tokio::test]
    async fn trusted_first_result_short_circuits() {
        let results = vec![
            result("Supports eSIM and Nano-SIM", "https://www.gsmarena.com/a.php"),
            result("embedded sim", "https://blog.example/b"),
        ];
        let pages = RecordingPages::new(&[]);
        let verdict = EvidenceClassifier::default()
            .classify("Galaxy S23", &results, Some(&pages))
            .await;

        assert!(verdict.compatible);
        assert_eq!(verdict.confidence, Confidence::High);
        assert_eq!(verdict.source_url.as_deref(), Some("https://www.gsmarena.com/a.php"));
        assert_eq!(pages.requested(), vec!["https://www.gsmarena.com/a.php".to_string()]);
    }

    #[tokio::test]
    async fn untrusted_match_reported_as_medium_after_full_scan() {
        let results = vec![
            result("5G, dual camera", "https://shop.example/1"),
            result("Has an Embedded SIM", "https://blog.example/2"),
            result("Battery 5000 mAh", "https://other.example/3"),
        ];
        let pages = RecordingPages::new(&[]);
        let verdict = EvidenceClassifier::default()
            .classify("Moto G", &results, Some(&pages))
            .await;

        assert_eq!(verdict.confidence, Confidence::Medium);
        assert!(verdict.compatible);
        assert_eq!(verdict.source_url.as_deref(), Some("https://blog.example/2"));
        assert_eq!(verdict.evidence_text.as_deref(), Some("has an embedded sim"));
        assert_eq!(pages.requested().len(), 3);
    }

    #[tokio::test]
    async fn later_trusted_match_upgrades_to_high() {
        let results = vec![
            result("esim ready", "https://blog.example/1"),
            result("esim ready", "https://www.kimovil.com/2"),
        ];
        let verdict = EvidenceClassifier::default().classify("X", &results, None).await;
        assert_eq!(verdict.confidence, Confidence::High);
        assert_eq!(verdict.source_url.as_deref(), Some("https://www.kimovil.com/2"));
    }

    #[tokio::test]
    async fn first_untrusted_candidate_is_kept() {
        let results = vec![
            result("e-sim capable", "https://first.example"),
            result("esim capable", "https://second.example"),
        ];
        let verdict = EvidenceClassifier::default().classify("X", &results, None).await;
        assert_eq!(verdict.source_url.as_deref(), Some("https://first.example"));
    }

    #[tokio::test]
    async fn negation_overrides_positive() {
        let results = vec![result(
            "This model has no eSIM, unlike the esim-capable Pro",
            "https://www.gsmarena.com/x.php",
        )];
        let verdict = EvidenceClassifier::default().classify("X", &results, None).await;
        assert!(!verdict.compatible);
        assert_eq!(verdict.confidence, Confidence::None);
        assert_eq!(verdict.reason.as_deref(), Some(NO_MENTION_REASON));
    }

    #[tokio::test]
    async fn page_text_preferred_over_snippet() {
        let results = vec![result("no mention here", "https://www.apple.com/iphone")];
        let pages = RecordingPages::new(&[("https://www.apple.com/iphone", "Dual eSIM support")]);
        let verdict = EvidenceClassifier::default()
            .classify("iPhone 15", &results, Some(&pages))
            .await;
        assert_eq!(verdict.confidence, Confidence::High);
        assert_eq!(verdict.evidence_text.as_deref(), Some("dual esim support"));
    }

    #[tokio::test]
    async fn missing_page_falls_back_to_snippet() {
        let results = vec![result("Supports eSIM", "https://blog.example/a")];
        let pages = RecordingPages::new(&[]);
        let verdict = EvidenceClassifier::default()
            .classify("X", &results, Some(&pages))
            .await;
        assert_eq!(verdict.confidence, Confidence::Medium);
    }

    #[tokio::test]
    async fn no_match_carries_truncated_debug_snippets() {
        let long = "a".repeat(500);
        let results = vec![
            result(&long, "https://a.example"),
            result("Nano SIM tray", "https://b.example"),
        ];
        let verdict = EvidenceClassifier::default()
            .with_snippet_chars(50)
            .classify("X", &results, None)
            .await;
        assert_eq!(
            verdict.debug_snippets,
            Some(vec!["a".repeat(50), "nano sim tray".to_string()])
        );
    }

    #[tokio::test]
    async fn empty_results_yield_no_evidence() {
        let verdict = EvidenceClassifier::default().classify("X", &[], None).await;
        assert_eq!(verdict.confidence, Confidence::None);
        assert_eq!(verdict.debug_snippets, Some(Vec::new()));
    }

    #[test]
    fn nano_sim_only_is_opt_in() {
        let text = "nano-sim only, esim not listed";
        assert_eq!(KeywordPolicy::default().assess("nano-sim only, esim"), Signal::Affirming);
        let strict = KeywordPolicy::default().with_nano_sim_only_negative();
        assert_eq!(strict.assess(text), Signal::Negated);
        assert_eq!(
            strict.clone().with_nano_sim_only_negative().negative_terms().len(),
            strict.negative_terms().len()
        );
    }

    #[test]
    fn trusted_matching_is_case_insensitive_substring() {
        let set = TrustedDomainSet::new(["GSMArena.com", " ", "mi.com"]);
        assert_eq!(set.domains().len(), 2);
        assert!(set.matches("HTTPS://WWW.GSMARENA.COM/phone"));
        assert!(set.matches("https://www.mi.com/global/"));
        assert!(!set.matches("https://example.org"));
    }

    #[test]
    fn verdict_serializes_camel_case_without_empty_fields() {
        let verdict = Verdict::search_unavailable("X", vec!["html".into()]);
        let json = serde_json::to_value(&verdict).expect("json");
        assert_eq!(
            json,
            serde_json::json!({
                "compatible": false,
                "confidence": "none",
                "model": "X",
                "reason": "search unavailable",
                "backendsAttempted": ["html"]
            })
        );
    }
}
