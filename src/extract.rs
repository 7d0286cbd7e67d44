//! Candidate page fetching and text extraction.
//!
//! Pages are downloaded with a byte cap, parsed with `scraper`, stripped of
//! non-content regions, flattened with single spaces, and truncated to a fixed
//! character budget. Any failure along the way yields `None` from
//! [`PageFetcher::fetch`]; one bad candidate never fails a check.

use std::borrow::Cow;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Response};
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::debug;

use crate::error::CheckError;
use crate::search::duckduckgo::BROWSER_USER_AGENT;

/// Default character budget for extracted page text.
pub const DEFAULT_MAX_PAGE_CHARS: usize = 3500;
/// Default cap on downloaded body bytes.
pub const DEFAULT_MAX_DOWNLOAD_BYTES: usize = 1024 * 1024;

/// Focused content roots shorter than this fall back to `<body>`.
const MIN_FOCUSED_ROOT_CHARS: usize = 200;

const BOILERPLATE_TAGS: &[&str] = &[
    "head", "script", "style", "noscript", "template", "svg", "iframe", "nav", "header",
    "footer", "aside", "form",
];

/// Cleaned text of one fetched page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedPage {
    /// Page that was fetched.
    pub url: String,
    /// Collapsed text, never longer than the configured character budget.
    pub text: String,
    /// True when text was dropped to honor the budget.
    pub truncated: bool,
}

impl ExtractedPage {
    /// Number of characters (not bytes) of extracted text.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Extraction tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionConfig {
    /// Maximum characters kept from a page.
    pub max_chars: usize,
    /// Maximum body bytes read from the network.
    pub max_download_bytes: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_PAGE_CHARS,
            max_download_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
        }
    }
}

/// Fetches a URL and returns its cleaned text, or `None` on any failure.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches `url`, giving up after `timeout`.
    async fn fetch(&self, url: &str, timeout: Duration) -> Option<ExtractedPage>;
}

/// HTTP-backed [`PageFetcher`].
#[derive(Clone)]
pub struct ContentExtractor {
    client: Client,
    config: ExtractionConfig,
    selectors: RootSelectors,
}

impl ContentExtractor {
    /// Builds an extractor with its own HTTP client.
    pub fn new(config: ExtractionConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self {
            client,
            config,
            selectors: RootSelectors::new(),
        })
    }

    /// Returns the extraction config.
    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Fetches and extracts `url`, surfacing the failure cause.
    pub async fn try_fetch(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<ExtractedPage, CheckError> {
        match tokio::time::timeout(timeout, self.download(url)).await {
            Ok(Ok(body)) => {
                let (decoded, lossy) = decode_body(&body);
                if lossy {
                    debug!(url, "page body required lossy decoding");
                }
                Ok(self.extract(url, &decoded))
            }
            Ok(Err(reason)) => Err(CheckError::FetchFailed {
                url: url.to_string(),
                reason,
            }),
            Err(_) => Err(CheckError::FetchFailed {
                url: url.to_string(),
                reason: format!("timed out after {timeout:?}"),
            }),
        }
    }

    /// Extracts cleaned, bounded text from an already downloaded document.
    pub fn extract(&self, url: &str, html: &str) -> ExtractedPage {
        let (text, truncated) = extract_text(&self.selectors, html, self.config.max_chars);
        ExtractedPage {
            url: url.to_string(),
            text,
            truncated,
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| describe_http_error(&err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("http status {status}"));
        }
        let body = read_capped(response, self.config.max_download_bytes)
            .await
            .map_err(|err| format!("failed to read body: {err}"))?;
        if body.is_empty() {
            return Err("empty body".to_string());
        }
        Ok(body)
    }
}

#[async_trait]
impl PageFetcher for ContentExtractor {
    async fn fetch(&self, url: &str, timeout: Duration) -> Option<ExtractedPage> {
        let start = Instant::now();
        match self.try_fetch(url, timeout).await {
            Ok(page) => {
                debug!(
                    url,
                    chars = page.char_count(),
                    truncated = page.truncated,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "page extracted"
                );
                Some(page)
            }
            Err(err) => {
                debug!(url, error = %err, "page fetch skipped");
                None
            }
        }
    }
}

fn describe_http_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        format!("request error: {err}")
    }
}

async fn read_capped(response: Response, limit: usize) -> Result<Vec<u8>, reqwest::Error> {
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let room = limit.saturating_sub(body.len());
        body.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if body.len() >= limit {
            break;
        }
    }
    Ok(body)
}

fn decode_body(bytes: &[u8]) -> (Cow<'_, str>, bool) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (Cow::Borrowed(text), false),
        Err(_) => (
            Cow::Owned(String::from_utf8_lossy(bytes).into_owned()),
            true,
        ),
    }
}

#[derive(Clone)]
struct RootSelectors {
    article: Selector,
    main: Selector,
    body: Selector,
}

impl RootSelectors {
    fn new() -> Self {
        Self {
            article: Selector::parse("article").expect("article selector"),
            main: Selector::parse("main").expect("main selector"),
            body: Selector::parse("body").expect("body selector"),
        }
    }

    fn focused<'a>(&self, document: &'a Html) -> Option<ElementRef<'a>> {
        document
            .select(&self.article)
            .next()
            .or_else(|| document.select(&self.main).next())
    }

    fn fallback<'a>(&self, document: &'a Html) -> ElementRef<'a> {
        document
            .select(&self.body)
            .next()
            .unwrap_or_else(|| document.root_element())
    }
}

fn extract_text(selectors: &RootSelectors, html: &str, max_chars: usize) -> (String, bool) {
    let document = Html::parse_document(html);
    if let Some(root) = selectors.focused(&document) {
        let mut buffer = TextBuffer::new(max_chars);
        collect_text(root, &mut buffer);
        if buffer.chars >= MIN_FOCUSED_ROOT_CHARS.min(max_chars) {
            return buffer.finish();
        }
    }
    let mut buffer = TextBuffer::new(max_chars);
    collect_text(selectors.fallback(&document), &mut buffer);
    buffer.finish()
}

/// Walks `root` depth-first without recursion, skipping boilerplate subtrees.
fn collect_text(root: ElementRef<'_>, buffer: &mut TextBuffer) {
    let mut stack: Vec<_> = root.children().collect();
    stack.reverse();
    while let Some(node) = stack.pop() {
        match node.value() {
            Node::Text(text) => {
                buffer.separate();
                if !buffer.push_str(text) {
                    return;
                }
            }
            Node::Element(element) if BOILERPLATE_TAGS.contains(&element.name()) => {}
            Node::Element(_) => {
                let mark = stack.len();
                stack.extend(node.children());
                stack[mark..].reverse();
            }
            _ => {}
        }
    }
}

/// Accumulates collapsed text up to a character limit.
struct TextBuffer {
    out: String,
    chars: usize,
    limit: usize,
    pending_space: bool,
    truncated: bool,
}

impl TextBuffer {
    fn new(limit: usize) -> Self {
        Self {
            out: String::with_capacity(limit.min(DEFAULT_MAX_PAGE_CHARS) + 16),
            chars: 0,
            limit,
            pending_space: false,
            truncated: false,
        }
    }

    fn separate(&mut self) {
        if !self.out.is_empty() {
            self.pending_space = true;
        }
    }

    /// Returns false once the limit is hit.
    fn push_str(&mut self, piece: &str) -> bool {
        for ch in piece.chars() {
            if ch.is_whitespace() {
                self.separate();
                continue;
            }
            if self.pending_space {
                if !self.push_char(' ') {
                    return false;
                }
                self.pending_space = false;
            }
            if !self.push_char(ch) {
                return false;
            }
        }
        true
    }

    fn push_char(&mut self, ch: char) -> bool {
        if self.chars >= self.limit {
            self.truncated = true;
            return false;
        }
        self.out.push(ch);
        self.chars += 1;
        true
    }

    fn finish(self) -> (String, bool) {
        (self.out, self.truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn extract(html: &str, max_chars: usize) -> (String, bool) {
        extract_text(&RootSelectors::new(), html, max_chars)
    }

    #[test]
    fn strips_non_content_regions() {
        let html = r#"
            <html>
              <head><title>Ignored</title><style>.x { color: red }</style></head>
              <body>
                <nav>Home | Phones</nav>
                <script>var esim = true;</script>
                <div>Network   <b>Dual SIM</b>
                  (Nano-SIM, eSIM)</div>
                <footer>Copyright</footer>
              </body>
            </html>
        "#;
        let (text, truncated) = extract(html, 3500);
        assert_eq!(text, "Network Dual SIM (Nano-SIM, eSIM)");
        assert!(!truncated);
    }

    #[test]
    fn prefers_substantial_article_root() {
        let paragraph =
            "The handset supports an embedded SIM alongside a physical card. ".repeat(5);
        let html = format!(
            "<body><div>Sidebar promo text</div><article><p>{paragraph}</p></article></body>"
        );
        let (text, _) = extract(&html, 3500);
        assert!(text.starts_with("The handset supports"));
        assert!(!text.contains("Sidebar"));
    }

    #[test]
    fn tiny_article_falls_back_to_body() {
        let html = "<body><article>Short</article><div>Body text with esim</div></body>";
        let (text, _) = extract(html, 3500);
        assert_eq!(text, "Short Body text with esim");
    }

    #[test]
    fn truncates_to_character_budget() {
        let html = format!("<body><p>{}</p></body>", "é".repeat(10_000));
        let (text, truncated) = extract(&html, 3500);
        assert_eq!(text.chars().count(), 3500);
        assert!(truncated);
    }

    #[test]
    fn bounded_on_whitespace_free_megabyte_document() {
        let html = format!("<html><body>{}</body></html>", "x".repeat(2 * 1024 * 1024));
        let (text, truncated) = extract(&html, DEFAULT_MAX_PAGE_CHARS);
        assert!(text.chars().count() <= DEFAULT_MAX_PAGE_CHARS);
        assert!(truncated);
    }

    #[test]
    fn deep_nesting_does_not_recurse() {
        let depth = 5_000;
        let html = format!(
            "<body>{}esim{}</body>",
            "<div>".repeat(depth),
            "</div>".repeat(depth)
        );
        let (text, _) = extract(&html, 3500);
        assert_eq!(text, "esim");
    }

    #[test]
    fn lossy_decoding_is_flagged() {
        let (text, lossy) = decode_body(&[b'o', b'k', 0xff]);
        assert!(lossy);
        assert!(text.starts_with("ok"));
    }
}
