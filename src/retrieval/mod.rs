//! Web search and page-content retrieval.
//!
//! Every network call goes through a retrieval proxy that answers
//! `GET {proxy}?url=<target>` with `{"contents": "<raw markup>"}`. Failures never
//! cross this module's boundary: search degrades to an empty list and content
//! fetches degrade to `None`.

pub mod extract;
pub mod search;

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::observability::{
    FETCH_FAILURES, FETCH_REQUESTS, FETCH_TIMEOUTS, SEARCH_FAILURES, SEARCH_REQUESTS,
};

pub use extract::extract_readable;
pub use search::{parse_results, search_page_url};

/// Default retrieval proxy.
pub const DEFAULT_PROXY_URL: &str = "https://api.allorigins.win/get";
/// Default number of search results kept.
pub const DEFAULT_MAX_RESULTS: usize = 3;
/// Default timeout for fetching a results page.
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(8);
/// Default timeout for fetching a content page.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Search and content retrieval used by the `/cari` command.
#[async_trait]
pub trait ContentRetriever: Send + Sync {
    /// Returns ranked candidate URLs for `query`, or an empty list on any failure.
    async fn search(&self, query: &str, cancel: &CancellationToken) -> Vec<Url>;

    /// Returns the readable text of `url`, or `None` on any failure.
    async fn fetch_readable_content(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Option<String>;
}

/// A fetched page and its extracted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedPage {
    /// Where the text came from.
    pub url: Url,
    /// The extracted readable text.
    pub content: String,
}

/// What a combined search-then-fetch produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchResults {
    /// The search returned no URLs; nothing was fetched.
    NoResults,
    /// URLs were found but none yielded readable content.
    NoContent,
    /// Pages with content, in ranking order.
    Pages(Vec<RetrievedPage>),
}

/// Search for `query`, then fetch the top `fan_out` results concurrently.
pub async fn search_and_fetch(
    retriever: &dyn ContentRetriever,
    query: &str,
    fan_out: usize,
    cancel: &CancellationToken,
) -> SearchResults {
    let urls = retriever.search(query, cancel).await;
    if urls.is_empty() {
        return SearchResults::NoResults;
    }
    let fetches = urls.into_iter().take(fan_out.max(1)).map(|url| async move {
        let content = retriever.fetch_readable_content(&url, cancel).await?;
        Some(RetrievedPage { url, content })
    });
    let pages: Vec<RetrievedPage> = join_all(fetches).await.into_iter().flatten().collect();
    if pages.is_empty() {
        SearchResults::NoContent
    } else {
        SearchResults::Pages(pages)
    }
}

#[derive(Debug)]
enum FetchOutcome {
    Body(String),
    Cancelled,
    TimedOut,
    Failed(Error),
}

#[derive(Deserialize)]
struct ProxyResponse {
    #[serde(default)]
    contents: Option<String>,
}

/// [`ContentRetriever`] backed by an HTML search engine and a retrieval proxy.
#[derive(Debug, Clone)]
pub struct WebRetriever {
    client: reqwest::Client,
    proxy_url: String,
    max_results: usize,
    search_timeout: Duration,
    fetch_timeout: Duration,
}

impl WebRetriever {
    /// Create a retriever that fetches through `proxy_url`.
    pub fn new(proxy_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            proxy_url: proxy_url.into(),
            max_results: DEFAULT_MAX_RESULTS,
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Set the maximum number of search results kept.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Set the search and content-fetch timeouts.
    pub fn with_timeouts(mut self, search: Duration, fetch: Duration) -> Self {
        self.search_timeout = search;
        self.fetch_timeout = fetch;
        self
    }

    async fn request(&self, target: &str) -> Result<String> {
        let response = self
            .client
            .get(&self.proxy_url)
            .query(&[("url", target)])
            .send()
            .await
            .map_err(|e| {
                Error::transport(format!("proxy request failed: {e}"), Some(Box::new(e)))
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::retrieval(format!("proxy returned {status}")));
        }
        let body: ProxyResponse = response.json().await.map_err(|e| {
            Error::serialization(format!("invalid proxy response: {e}"), Some(Box::new(e)))
        })?;
        body.contents
            .ok_or_else(|| Error::retrieval(format!("proxy returned no contents for {target}")))
    }

    /// Fetch `target` through the proxy, bounded by `timeout` and `cancel`.
    async fn fetch_via_proxy(
        &self,
        target: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> FetchOutcome {
        let deadline = cancel.child_token();
        tokio::select! {
            biased;
            _ = deadline.cancelled() => FetchOutcome::Cancelled,
            _ = tokio::time::sleep(timeout) => {
                deadline.cancel();
                FetchOutcome::TimedOut
            }
            result = self.request(target) => match result {
                Ok(body) => FetchOutcome::Body(body),
                Err(err) => FetchOutcome::Failed(err),
            },
        }
    }
}

#[async_trait]
impl ContentRetriever for WebRetriever {
    async fn search(&self, query: &str, cancel: &CancellationToken) -> Vec<Url> {
        SEARCH_REQUESTS.click();
        let page = match search_page_url(query) {
            Ok(page) => page,
            Err(err) => {
                SEARCH_FAILURES.click();
                warn!("search failed: {err}");
                return Vec::new();
            }
        };
        match self
            .fetch_via_proxy(page.as_str(), self.search_timeout, cancel)
            .await
        {
            FetchOutcome::Body(html) => {
                let urls = parse_results(&html, self.max_results);
                debug!(count = urls.len(), "search results parsed");
                urls
            }
            FetchOutcome::Cancelled => {
                debug!("search cancelled");
                Vec::new()
            }
            FetchOutcome::TimedOut => {
                SEARCH_FAILURES.click();
                warn!("search failed: timed out after {:?}", self.search_timeout);
                Vec::new()
            }
            FetchOutcome::Failed(err) => {
                SEARCH_FAILURES.click();
                warn!("search failed: {err}");
                Vec::new()
            }
        }
    }

    async fn fetch_readable_content(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Option<String> {
        FETCH_REQUESTS.click();
        match self
            .fetch_via_proxy(url.as_str(), self.fetch_timeout, cancel)
            .await
        {
            FetchOutcome::Body(html) => {
                let content = extract_readable(&html);
                if content.is_none() {
                    debug!(url = %url, "no readable content");
                }
                content
            }
            FetchOutcome::Cancelled => {
                debug!(url = %url, "fetch cancelled");
                None
            }
            FetchOutcome::TimedOut => {
                FETCH_TIMEOUTS.click();
                FETCH_FAILURES.click();
                warn!(url = %url, "fetch failed: timed out after {:?}", self.fetch_timeout);
                None
            }
            FetchOutcome::Failed(err) => {
                FETCH_FAILURES.click();
                warn!(url = %url, "fetch failed: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const ARTICLE: &str = "<html><body><article><p>Goroutines are lightweight threads managed by the Go runtime. \
        Channels let goroutines communicate without sharing memory directly. \
        The select statement waits on several channel operations at once.</p></article></body></html>";

    fn results_page(targets: &[&str]) -> String {
        let items: String = targets
            .iter()
            .map(|t| {
                format!(
                    r#"<div class="result"><a href="//duckduckgo.com/l/?uddg={}">x</a></div>"#,
                    t.replace(':', "%3A").replace('/', "%2F")
                )
            })
            .collect();
        format!("<html><body>{items}</body></html>")
    }

    async fn proxy_returning(query: &str, value: &str, html: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param(query, value))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"contents": html})))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn search_goes_through_proxy() {
        let server = proxy_returning(
            "url",
            "https://html.duckduckgo.com/html/?q=golang+concurrency",
            &results_page(&["https://go.dev/", "https://gobyexample.com/"]),
        )
        .await;
        let retriever = WebRetriever::new(server.uri());
        let urls = retriever
            .search("golang concurrency", &CancellationToken::new())
            .await;
        assert_eq!(
            urls.iter().map(Url::as_str).collect::<Vec<_>>(),
            vec!["https://go.dev/", "https://gobyexample.com/"]
        );
    }

    #[tokio::test]
    async fn search_failure_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let retriever = WebRetriever::new(server.uri());
        assert!(
            retriever
                .search("anything", &CancellationToken::new())
                .await
                .is_empty()
        );
    }

    #[tokio::test]
    async fn fetch_extracts_readable_text() {
        let server = proxy_returning("url", "https://go.dev/", ARTICLE).await;
        let retriever = WebRetriever::new(server.uri());
        let url = Url::parse("https://go.dev/").unwrap();
        let content = retriever
            .fetch_readable_content(&url, &CancellationToken::new())
            .await
            .unwrap();
        assert!(content.starts_with("Goroutines are lightweight threads"));
    }

    #[tokio::test]
    async fn fetch_timeout_is_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"contents": ARTICLE}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;
        let retriever = WebRetriever::new(server.uri())
            .with_timeouts(Duration::from_millis(50), Duration::from_millis(50));
        let url = Url::parse("https://go.dev/").unwrap();
        let cancel = CancellationToken::new();
        assert_eq!(retriever.fetch_readable_content(&url, &cancel).await, None);
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_fetch_is_absent() {
        let server = proxy_returning("url", "https://go.dev/", ARTICLE).await;
        let retriever = WebRetriever::new(server.uri());
        let url = Url::parse("https://go.dev/").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(retriever.fetch_readable_content(&url, &cancel).await, None);
    }

    #[tokio::test]
    async fn missing_contents_is_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": {}})))
            .mount(&server)
            .await;
        let retriever = WebRetriever::new(server.uri());
        let url = Url::parse("https://go.dev/").unwrap();
        assert_eq!(
            retriever
                .fetch_readable_content(&url, &CancellationToken::new())
                .await,
            None
        );
    }

    struct ScriptedRetriever {
        urls: Vec<&'static str>,
        pages: HashMap<&'static str, &'static str>,
        fetched: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ContentRetriever for ScriptedRetriever {
        async fn search(&self, _: &str, _: &CancellationToken) -> Vec<Url> {
            self.urls.iter().map(|u| Url::parse(u).unwrap()).collect()
        }

        async fn fetch_readable_content(
            &self,
            url: &Url,
            _: &CancellationToken,
        ) -> Option<String> {
            self.fetched.lock().unwrap().push(url.to_string());
            self.pages.get(url.as_str()).map(|s| s.to_string())
        }
    }

    #[tokio::test]
    async fn search_and_fetch_respects_fan_out() {
        let retriever = ScriptedRetriever {
            urls: vec!["https://a.example/", "https://b.example/", "https://c.example/"],
            pages: HashMap::from([
                ("https://a.example/", "page a"),
                ("https://b.example/", "page b"),
            ]),
            fetched: Default::default(),
        };
        let cancel = CancellationToken::new();

        let results = search_and_fetch(&retriever, "q", 1, &cancel).await;
        assert_eq!(
            results,
            SearchResults::Pages(vec![RetrievedPage {
                url: Url::parse("https://a.example/").unwrap(),
                content: "page a".to_string(),
            }])
        );
        assert_eq!(retriever.fetched.lock().unwrap().len(), 1);

        let SearchResults::Pages(pages) = search_and_fetch(&retriever, "q", 3, &cancel).await
        else {
            panic!("expected pages");
        };
        let contents: Vec<_> = pages.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(contents, vec!["page a", "page b"]);
    }

    #[tokio::test]
    async fn search_and_fetch_distinguishes_empty_outcomes() {
        let cancel = CancellationToken::new();
        let nothing = ScriptedRetriever {
            urls: vec![],
            pages: HashMap::new(),
            fetched: Default::default(),
        };
        assert_eq!(
            search_and_fetch(&nothing, "q", 1, &cancel).await,
            SearchResults::NoResults
        );
        assert!(nothing.fetched.lock().unwrap().is_empty());

        let unreadable = ScriptedRetriever {
            urls: vec!["https://a.example/"],
            pages: HashMap::new(),
            fetched: Default::default(),
        };
        assert_eq!(
            search_and_fetch(&unreadable, "q", 1, &cancel).await,
            SearchResults::NoContent
        );
    }
}
