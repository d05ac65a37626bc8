//! Search-engine hunter: natural-language queries against the open web.
//!
//! The search interface is a trait so tests can stub it; the production
//! implementation drives DuckDuckGo through the shared headless browser
//! (results render client-side). Rate limiting is mandatory: at least three
//! seconds between queries, backing off to ten after a CAPTCHA or 429
//! signal.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chromiumoxide::page::Page;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::BrowserHandle;
use crate::catalog::SiteSource;
use crate::fetcher::{FetchError, Fetcher};

use super::{Candidate, EXCLUDED_DOMAINS, MAX_PRIOR_BONUS, STREAMING_HOST_HINTS};

/// DuckDuckGo entry point. Results are React-rendered, so the hunter waits
/// for them to appear after navigation.
const SEARCH_URL: &str = "https://duckduckgo.com";
const SEARCH_RESULT_SELECTOR: &str = "article[data-testid='result']";
const TITLE_LINK_SELECTOR: &str = "h2 > a";
const SNIPPET_SELECTOR: &str = "div[data-result='snippet']";

const MAX_RESULTS: usize = 10;
const RESULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
const RESULT_WAIT_BUDGET: Duration = Duration::from_secs(5);

/// Minimum spacing between queries.
pub const MIN_QUERY_INTERVAL: Duration = Duration::from_secs(3);
/// Spacing after a rate-limit signal.
pub const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search rate-limited or blocked: {0}")]
    RateLimited(String),
    #[error("browser error during search: {0}")]
    Browser(String),
    #[error("search results did not render: {0}")]
    NoResults(String),
}

/// One search result as the hunter sees it.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
    /// Zero-based rank in the result list.
    pub position: usize,
}

/// Query -> ranked results. Implementations MUST rate-limit themselves.
pub trait SearchEngine: Send + Sync {
    fn search(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<Vec<SearchHit>, SearchError>> + Send;
}

/// Enforces spacing between queries, with a penalty interval after
/// rate-limit signals.
pub struct RateGate {
    state: Mutex<GateState>,
    min_interval: Duration,
    backoff: Duration,
}

struct GateState {
    last_query: Option<Instant>,
    next_interval: Duration,
}

impl RateGate {
    #[must_use]
    pub fn new(min_interval: Duration, backoff: Duration) -> Self {
        Self {
            state: Mutex::new(GateState {
                last_query: None,
                next_interval: min_interval,
            }),
            min_interval,
            backoff,
        }
    }

    /// Block until the next query is allowed, then claim the slot.
    pub async fn wait(&self) {
        let mut state = self.state.lock().await;
        if let Some(last) = state.last_query {
            let elapsed = last.elapsed();
            if elapsed < state.next_interval {
                let remaining = state.next_interval - elapsed;
                debug!("search rate gate sleeping {remaining:?}");
                tokio::time::sleep(remaining).await;
            }
        }
        state.last_query = Some(Instant::now());
        state.next_interval = self.min_interval;
    }

    /// Widen the gap before the next query after a blocked response.
    pub async fn penalize(&self) {
        let mut state = self.state.lock().await;
        state.next_interval = self.backoff;
        warn!("search rate gate penalized, next query delayed {:?}", self.backoff);
    }
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new(MIN_QUERY_INTERVAL, RATE_LIMIT_BACKOFF)
    }
}

/// DuckDuckGo through the shared headless browser.
pub struct BrowserSearch {
    browser: Arc<BrowserHandle>,
    gate: RateGate,
}

impl BrowserSearch {
    #[must_use]
    pub fn new(browser: Arc<BrowserHandle>) -> Self {
        Self {
            browser,
            gate: RateGate::default(),
        }
    }
}

impl SearchEngine for BrowserSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        self.gate.wait().await;

        let page = self
            .browser
            .browser()
            .new_page("about:blank")
            .await
            .map_err(|e| SearchError::Browser(e.to_string()))?;

        let result = run_query(&page, query).await;
        if let Err(e) = page.close().await {
            debug!("failed to close search page: {e}");
        }

        if matches!(result, Err(SearchError::RateLimited(_))) {
            self.gate.penalize().await;
        }
        result
    }
}

async fn run_query(page: &Page, query: &str) -> Result<Vec<SearchHit>, SearchError> {
    use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;

    // Consistent desktop rendering keeps the result selectors stable.
    let metrics = SetDeviceMetricsOverrideParams::builder()
        .width(1920)
        .height(1080)
        .device_scale_factor(1.0)
        .mobile(false)
        .build()
        .map_err(SearchError::Browser)?;
    page.execute(metrics)
        .await
        .map_err(|e| SearchError::Browser(e.to_string()))?;

    let mut search_url =
        Url::parse(SEARCH_URL).map_err(|e| SearchError::Browser(e.to_string()))?;
    search_url
        .query_pairs_mut()
        .append_pair("q", query)
        .append_pair("ia", "web");

    info!("navigating to search results for {query:?}");
    page.goto(search_url.as_str())
        .await
        .map_err(|e| SearchError::Browser(e.to_string()))?;
    page.wait_for_navigation()
        .await
        .map_err(|e| SearchError::Browser(e.to_string()))?;

    // Poll until results render or the budget runs out.
    let started = Instant::now();
    loop {
        if page.find_element(SEARCH_RESULT_SELECTOR).await.is_ok() {
            break;
        }
        if started.elapsed() >= RESULT_WAIT_BUDGET {
            let current = match page.url().await {
                Ok(Some(url)) => url,
                _ => "about:blank".to_string(),
            };
            if current.contains("captcha") || current.contains("/sorry/") {
                return Err(SearchError::RateLimited(format!(
                    "captcha page at {current}"
                )));
            }
            return Err(SearchError::NoResults(format!(
                "results did not appear within {RESULT_WAIT_BUDGET:?} at {current}"
            )));
        }
        tokio::time::sleep(RESULT_POLL_INTERVAL).await;
    }

    extract_hits(page).await
}

async fn extract_hits(page: &Page) -> Result<Vec<SearchHit>, SearchError> {
    let results = page
        .find_elements(SEARCH_RESULT_SELECTOR)
        .await
        .map_err(|e| SearchError::Browser(e.to_string()))?;

    let mut hits = Vec::new();
    for (position, result) in results.into_iter().enumerate().take(MAX_RESULTS) {
        let Ok(title_link) = result.find_element(TITLE_LINK_SELECTOR).await else {
            continue;
        };

        let title = title_link
            .inner_text()
            .await
            .ok()
            .flatten()
            .unwrap_or_default();
        let Ok(Some(url)) = title_link.attribute("href").await else {
            continue;
        };

        let snippet = match result.find_element(SNIPPET_SELECTOR).await {
            Ok(el) => el.inner_text().await.ok().flatten().unwrap_or_default(),
            Err(_) => String::new(),
        };

        hits.push(SearchHit {
            url,
            title,
            snippet,
            position,
        });
    }

    info!("extracted {} search results", hits.len());
    Ok(hits)
}

/// Static-fetch search against DuckDuckGo's server-rendered HTML endpoint.
///
/// Fallback for cycles without a browser: no client-side rendering needed,
/// same rate gate. Result links are redirect URLs carrying the target in a
/// `uddg` query parameter.
pub struct HtmlSearch {
    fetcher: Arc<Fetcher>,
    base_url: String,
    gate: RateGate,
}

static HTML_RESULT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.result").expect("selector"));
static HTML_TITLE_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.result__a").expect("selector"));
static HTML_SNIPPET_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.result__snippet, div.result__snippet").expect("selector"));

impl HtmlSearch {
    #[must_use]
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self {
            fetcher,
            base_url: "https://html.duckduckgo.com/html/".to_string(),
            gate: RateGate::default(),
        }
    }

    /// Point the search at a different endpoint. Used by tests.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl SearchEngine for HtmlSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        self.gate.wait().await;

        let mut search_url = Url::parse(&self.base_url)
            .map_err(|e| SearchError::Browser(format!("bad search base url: {e}")))?;
        search_url.query_pairs_mut().append_pair("q", query);

        let fetched = match self.fetcher.get(search_url.as_str()).await {
            Ok(fetched) => fetched,
            Err(FetchError::Status(status @ (429 | 403))) => {
                let err = SearchError::RateLimited(format!("http status {status}"));
                self.gate.penalize().await;
                return Err(err);
            }
            Err(e) => return Err(SearchError::Browser(e.to_string())),
        };

        let hits = parse_html_results(&fetched.body);
        if hits.is_empty() {
            return Err(SearchError::NoResults(
                "no result blocks in rendered page".to_string(),
            ));
        }
        info!("extracted {} search results", hits.len());
        Ok(hits)
    }
}

fn parse_html_results(html: &str) -> Vec<SearchHit> {
    let document = Html::parse_document(html);
    let mut hits = Vec::new();

    for (position, result) in document
        .select(&HTML_RESULT_SELECTOR)
        .enumerate()
        .take(MAX_RESULTS)
    {
        let Some(title_link) = result.select(&HTML_TITLE_LINK_SELECTOR).next() else {
            continue;
        };
        let Some(href) = title_link.value().attr("href") else {
            continue;
        };
        let Some(url) = resolve_redirect_href(href) else {
            continue;
        };

        let title = title_link.text().collect::<String>().trim().to_string();
        let snippet = result
            .select(&HTML_SNIPPET_SELECTOR)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        hits.push(SearchHit {
            url,
            title,
            snippet,
            position,
        });
    }

    hits
}

/// Unwrap DuckDuckGo's `/l/?uddg=<target>` redirect links; direct links pass
/// through unchanged.
fn resolve_redirect_href(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };

    let parsed = Url::parse(&absolute).ok()?;
    if let Some((_, target)) = parsed.query_pairs().find(|(key, _)| key == "uddg") {
        return Some(target.into_owned());
    }
    parsed.scheme().starts_with("http").then_some(absolute)
}

/// Retry attempts per query for transient search failures.
const QUERY_ATTEMPTS: u32 = 2;

/// Run every seed query, classify the hits, and keep the plausible ones.
///
/// Transient failures (results not rendering) get one retry; rate-limit
/// signals skip straight to the next query — the gate has already widened
/// the gap.
pub async fn hunt<S: SearchEngine>(engine: &S, queries: &[String]) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for (index, query) in queries.iter().enumerate() {
        info!(
            "search-engine hunter querying ({}/{}): {query}",
            index + 1,
            queries.len()
        );

        match search_with_retry(engine, query).await {
            Ok(hits) => {
                for hit in hits {
                    if !looks_like_streaming_site(&hit) {
                        continue;
                    }
                    let bonus = search_relevance(&hit, query);
                    debug!(
                        "search-engine hunter found {} (relevance {bonus})",
                        hit.url
                    );
                    candidates.push(Candidate {
                        url: hit.url,
                        source: SiteSource::SearchEngine,
                        prior_bonus: bonus,
                    });
                }
            }
            Err(e) => {
                warn!("search failed for {query:?}: {e}; continuing with remaining queries");
            }
        }
    }

    candidates
}

async fn search_with_retry<S: SearchEngine>(
    engine: &S,
    query: &str,
) -> Result<Vec<SearchHit>, SearchError> {
    let mut attempt = 1;
    loop {
        match engine.search(query).await {
            Ok(hits) => return Ok(hits),
            Err(e @ SearchError::NoResults(_)) if attempt < QUERY_ATTEMPTS => {
                debug!("transient search failure for {query:?} (attempt {attempt}): {e}");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Host-keyword and snippet-keyword heuristic for a search result.
fn looks_like_streaming_site(hit: &SearchHit) -> bool {
    let Ok(parsed) = Url::parse(&hit.url) else {
        return false;
    };
    let Some(host) = parsed.host_str().map(str::to_lowercase) else {
        return false;
    };

    if EXCLUDED_DOMAINS.iter().any(|domain| host.contains(domain)) {
        return false;
    }

    let domain_matches = STREAMING_HOST_HINTS.iter().any(|hint| host.contains(hint));

    let text = format!("{} {}", hit.title, hit.snippet).to_lowercase();
    let content_matches = [
        "stream", "watch", "live", "free", "online", "sports", "movie", "tv", "hd", "schedule",
        "games",
    ]
    .iter()
    .filter(|kw| text.contains(*kw))
    .count();

    domain_matches || content_matches >= 2
}

/// Prior bonus from result rank and keyword density, capped at 25.
fn search_relevance(hit: &SearchHit, query: &str) -> u8 {
    let mut score: u32 = match hit.position {
        0 => 10,
        1..=2 => 8,
        3..=4 => 5,
        _ => 2,
    };

    let text = format!("{} {}", hit.title, hit.snippet).to_lowercase();
    for word in query.to_lowercase().split_whitespace() {
        if text.contains(word) {
            score += 2;
        }
    }

    for indicator in ["live", "free", "hd", "official", "best"] {
        if text.contains(indicator) {
            score += 3;
        }
    }

    u8::try_from(score.min(u32::from(MAX_PRIOR_BONUS))).unwrap_or(MAX_PRIOR_BONUS)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubSearch {
        hits: Vec<SearchHit>,
    }

    impl SearchEngine for StubSearch {
        async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, SearchError> {
            Ok(self.hits.clone())
        }
    }

    struct FailingSearch;

    impl SearchEngine for FailingSearch {
        async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, SearchError> {
            Err(SearchError::RateLimited("429".to_string()))
        }
    }

    fn hit(url: &str, title: &str, snippet: &str, position: usize) -> SearchHit {
        SearchHit {
            url: url.to_string(),
            title: title.to_string(),
            snippet: snippet.to_string(),
            position,
        }
    }

    #[tokio::test]
    async fn classifies_and_scores_hits() {
        let engine = StubSearch {
            hits: vec![
                hit(
                    "https://streameast.live",
                    "StreamEast - Live Sports",
                    "watch free live sports",
                    0,
                ),
                hit(
                    "https://en.wikipedia.org/wiki/Streaming",
                    "Streaming media",
                    "encyclopedia article",
                    1,
                ),
            ],
        };

        let candidates = hunt(&engine, &["free sports streaming".to_string()]).await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].url, "https://streameast.live");
        assert!(candidates[0].prior_bonus > 0);
        assert!(candidates[0].prior_bonus <= MAX_PRIOR_BONUS);
    }

    #[tokio::test]
    async fn search_failures_do_not_abort_the_hunt() {
        let candidates = hunt(
            &FailingSearch,
            &["q1".to_string(), "q2".to_string()],
        )
        .await;
        assert!(candidates.is_empty());
    }

    #[test]
    fn relevance_is_position_sensitive_and_capped() {
        let top = search_relevance(
            &hit("https://x.live", "live free hd official best", "", 0),
            "live stream",
        );
        let deep = search_relevance(&hit("https://x.live", "", "", 9), "live stream");
        assert!(top > deep);
        assert!(top <= MAX_PRIOR_BONUS);
        assert_eq!(deep, 2);
    }

    #[test]
    fn redirect_hrefs_resolve_to_their_target() {
        let href = "//duckduckgo.com/l/?uddg=https%3A%2F%2Fstreameast.app%2Fnfl&rut=abc";
        assert_eq!(
            resolve_redirect_href(href).as_deref(),
            Some("https://streameast.app/nfl")
        );
        assert_eq!(
            resolve_redirect_href("https://direct.example/page").as_deref(),
            Some("https://direct.example/page")
        );
        assert!(resolve_redirect_href("javascript:void(0)").is_none());
    }

    #[test]
    fn html_results_parse_title_url_and_snippet() {
        let page = r#"<html><body>
            <div class="result">
              <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fstreameast.app">StreamEast - Live Sports</a>
              <a class="result__snippet">watch free live sports in hd</a>
            </div>
            <div class="result">
              <a class="result__a" href="https://sportssurge.net">SportsSurge</a>
            </div>
        </body></html>"#;

        let hits = parse_html_results(page);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://streameast.app");
        assert_eq!(hits[0].title, "StreamEast - Live Sports");
        assert!(hits[0].snippet.contains("live sports"));
        assert_eq!(hits[1].position, 1);
    }

    #[tokio::test]
    async fn html_search_flags_rate_limiting_status() {
        use crate::config::ScoutConfig;

        let mut server = mockito::Server::new_async().await;
        let _blocked = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(429)
            .create_async()
            .await;

        let fetcher = Arc::new(Fetcher::new(&ScoutConfig::default(), None).unwrap());
        let search = HtmlSearch::new(fetcher).with_base_url(format!("{}/html/", server.url()));

        let err = search.search("nfl streams").await.unwrap_err();
        assert!(matches!(err, SearchError::RateLimited(_)));
    }

    #[tokio::test]
    async fn transient_failures_get_one_retry() {
        use std::sync::atomic::{AtomicU32, Ordering};

        struct FlakySearch {
            calls: AtomicU32,
        }

        impl SearchEngine for FlakySearch {
            async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, SearchError> {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(SearchError::NoResults("first call flakes".to_string()))
                } else {
                    Ok(vec![hit(
                        "https://streameast.live",
                        "StreamEast live",
                        "watch sports",
                        0,
                    )])
                }
            }
        }

        let engine = FlakySearch {
            calls: AtomicU32::new(0),
        };
        let candidates = hunt(&engine, &["nfl".to_string()]).await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rate_gate_spaces_queries() {
        let gate = RateGate::new(Duration::from_millis(200), Duration::from_millis(400));

        gate.wait().await;
        let start = Instant::now();
        gate.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(180));
    }

    #[tokio::test]
    async fn penalty_widens_the_gap_once() {
        let gate = RateGate::new(Duration::from_millis(50), Duration::from_millis(300));

        gate.wait().await;
        gate.penalize().await;
        let start = Instant::now();
        gate.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(250));

        // Next interval resets back to the minimum.
        let start = Instant::now();
        gate.wait().await;
        assert!(start.elapsed() < Duration::from_millis(250));
    }
}
