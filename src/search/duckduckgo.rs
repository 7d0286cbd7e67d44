//! DuckDuckGo backends: the HTML endpoint (browser-emulating) and the Lite endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{BackendError, BackendKind, SearchBackend, SearchResult};

/// Identification string presented by every outbound request.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

const HTML_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const LITE_ENDPOINT: &str = "https://lite.duckduckgo.com/lite/";
const REDIRECT_BASE: &str = "https://duckduckgo.com/";

/// Search backend that scrapes one of DuckDuckGo's no-JavaScript endpoints.
pub struct DuckDuckGoBackend {
    kind: BackendKind,
    client: Client,
    endpoint: String,
    selectors: ResultSelectors,
}

impl DuckDuckGoBackend {
    /// Builds a backend for `kind` whose requests time out after `request_timeout`.
    pub fn new(kind: BackendKind, request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let endpoint = match kind {
            BackendKind::Html => HTML_ENDPOINT,
            BackendKind::Lite => LITE_ENDPOINT,
        };
        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(default_headers(kind))
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            kind,
            client,
            endpoint: endpoint.to_string(),
            selectors: ResultSelectors::new(),
        })
    }

    /// Points the backend at a different endpoint (self-hosted mirrors, tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn parse(&self, html: &str, max_results: usize) -> Vec<SearchResult> {
        match self.kind {
            BackendKind::Html => parse_html_results(&self.selectors, html, max_results),
            BackendKind::Lite => parse_lite_results(&self.selectors, html, max_results),
        }
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGoBackend {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, BackendError> {
        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("q", query)])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        // `Html` is !Send, so parsing stays synchronous after the last await.
        Ok(self.parse(&body, max_results))
    }
}

fn default_headers(kind: BackendKind) -> HeaderMap {
    let mut headers = HeaderMap::new();
    match kind {
        BackendKind::Html => {
            headers.insert(
                ACCEPT,
                HeaderValue::from_static(
                    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                ),
            );
            headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
            headers.insert(REFERER, HeaderValue::from_static("https://duckduckgo.com/"));
        }
        BackendKind::Lite => {
            headers.insert(ACCEPT, HeaderValue::from_static("text/html"));
        }
    }
    headers
}

struct ResultSelectors {
    html_result: Selector,
    html_link: Selector,
    html_snippet: Selector,
    lite_row: Selector,
}

impl ResultSelectors {
    fn new() -> Self {
        Self {
            html_result: Selector::parse("div.result:not(.result--ad)").expect("result selector"),
            html_link: Selector::parse("a.result__a").expect("result link selector"),
            html_snippet: Selector::parse(".result__snippet").expect("result snippet selector"),
            lite_row: Selector::parse("a.result-link, td.result-snippet")
                .expect("lite row selector"),
        }
    }
}

fn parse_html_results(
    selectors: &ResultSelectors,
    html: &str,
    max_results: usize,
) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    let mut results = Vec::new();
    for block in document.select(&selectors.html_result) {
        if results.len() >= max_results {
            break;
        }
        let link = block.select(&selectors.html_link).next();
        let title = link.map(element_text).unwrap_or_default();
        let url = link
            .and_then(|el| el.value().attr("href"))
            .map(unwrap_redirect)
            .unwrap_or_default();
        let body = block
            .select(&selectors.html_snippet)
            .next()
            .map(element_text)
            .unwrap_or_default();
        if title.is_empty() && url.is_empty() {
            continue;
        }
        results.push(SearchResult { title, body, url });
    }
    results
}

/// Lite lays each hit out as a link row followed by an optional snippet row, so
/// rows are walked in document order and a snippet binds only to the link it
/// follows.
fn parse_lite_results(
    selectors: &ResultSelectors,
    html: &str,
    max_results: usize,
) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    let mut results: Vec<SearchResult> = Vec::new();
    let mut awaiting_snippet = false;
    for element in document.select(&selectors.lite_row) {
        if element.value().name() == "a" {
            if results.len() >= max_results {
                break;
            }
            results.push(SearchResult {
                title: element_text(element),
                body: String::new(),
                url: element
                    .value()
                    .attr("href")
                    .map(unwrap_redirect)
                    .unwrap_or_default(),
            });
            awaiting_snippet = true;
        } else if awaiting_snippet {
            if let Some(current) = results.last_mut() {
                current.body = element_text(element);
            }
            awaiting_snippet = false;
        }
    }
    results
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolves DuckDuckGo's `/l/?uddg=<target>` redirect wrapper to the target URL.
fn unwrap_redirect(href: &str) -> String {
    let resolved = Url::parse(REDIRECT_BASE).and_then(|base| base.join(href));
    if let Ok(url) = resolved {
        if let Some((_, target)) = url.query_pairs().find(|(key, _)| key == "uddg") {
            return target.into_owned();
        }
    }
    href.trim().to_string()
}
