//! Technical site verification: probe, content analysis, DOM fingerprint.
//!
//! The highest-cost, highest-weight gate in the funnel. Three sub-probes
//! produce one composite 0-100 confidence:
//!
//! ```text
//! composite = 10 + 0.25 * content + 0.65 * dom + bonus
//! ```
//!
//! A failed reachability probe short-circuits to composite 0. The bonus
//! (up to +35) only triggers for rich indicator combinations; one lone
//! `<video>` element does not clear the default admission threshold.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::fetcher::{FetchError, Fetcher};

/// Weighted keywords scored against title + meta description.
static CONTENT_KEYWORDS: Lazy<BTreeMap<&'static str, u32>> = Lazy::new(|| {
    BTreeMap::from([
        ("stream", 25),
        ("watch", 25),
        ("live", 20),
        ("movie", 20),
        ("tv", 20),
        ("sport", 20),
        ("schedule", 20),
        ("free", 15),
        ("online", 15),
        ("video", 15),
        ("player", 15),
        ("games", 15),
        ("nfl", 15),
        ("nba", 15),
        ("soccer", 15),
        ("football", 15),
        ("nhl", 15),
        ("mlb", 15),
        ("ufc", 15),
        ("boxing", 15),
        ("tennis", 15),
        ("basketball", 15),
        ("hd", 10),
    ])
});

static CONTENT_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"live\s+stream", "live_stream"),
        (r"watch\s+online", "watch_online"),
        (r"free\s+stream", "free_stream"),
        (r"hd\s+quality", "hd_quality"),
        (r"no\s+ads", "no_ads"),
        (r"fixtures", "fixtures"),
    ]
    .into_iter()
    .map(|(pattern, name)| (Regex::new(pattern).expect("content pattern"), name))
    .collect()
});

/// Id/class values that tag player and schedule containers.
const STREAMING_SELECTORS: &[&str] = &[
    "player",
    "video-player",
    "stream",
    "live-stream",
    "schedule",
    "games",
    "matches",
    "fixtures",
    "video-container",
    "player-container",
];

const SCRIPT_PLAYER_PATTERNS: &[&str] = &[
    "jwplayer", "videojs", "hls", "m3u8", "flowplayer", "plyr", "player", "stream",
];

const PLAYER_PLATFORMS: &[&str] = &[
    "jwplayer", "videojs", "hls.js", "dashjs", "flowplayer", "plyr", "clappr", "video.js",
    "bitmovin",
];

static VIDEO_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("video").expect("selector"));
static IFRAME_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("iframe").expect("selector"));
static SCRIPT_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("script").expect("selector"));
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("selector"));
static META_DESCRIPTION_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="description"]"#).expect("selector"));
static ANY_ELEMENT_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("*").expect("selector"));

/// Outcome of the reachability probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub success: bool,
    pub status: u16,
    pub latency_ms: u64,
    pub final_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Title/meta keyword analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentAnalysis {
    pub score: u32,
    pub indicators: Vec<String>,
    pub title: String,
}

/// Structural streaming indicators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomFingerprint {
    pub score: u32,
    pub indicators: Vec<String>,
    pub video_count: usize,
    pub iframe_count: usize,
    pub has_streaming_iframe: bool,
}

/// Full verification result with the composite confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    pub url: String,
    pub composite: u8,
    pub probe: ProbeResult,
    pub content: ContentAnalysis,
    pub dom: DomFingerprint,
}

impl Verification {
    fn unreachable(url: &str, probe: ProbeResult) -> Self {
        Self {
            url: url.to_string(),
            composite: 0,
            probe,
            content: ContentAnalysis::default(),
            dom: DomFingerprint::default(),
        }
    }
}

pub struct SiteVerifier {
    fetcher: Arc<Fetcher>,
}

impl SiteVerifier {
    #[must_use]
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }

    /// Verify a URL from scratch: probe it, then analyze the fetched body.
    ///
    /// Used by the re-verification sweep, which has no rendered page at hand.
    pub async fn verify_url(&self, url: &str) -> Verification {
        let (probe, body) = self.probe(url).await;
        if !probe.success {
            info!("verification failed for {url}: not reachable");
            return Verification::unreachable(url, probe);
        }
        self.score(url, probe, &body.unwrap_or_default())
    }

    /// Verify a URL whose rendered HTML the crawler already holds. The
    /// reachability probe still runs; the provided HTML feeds the content
    /// and DOM stages.
    pub async fn verify_page(&self, url: &str, html: &str) -> Verification {
        let (probe, _) = self.probe(url).await;
        if !probe.success {
            info!("verification failed for {url}: not reachable");
            return Verification::unreachable(url, probe);
        }
        self.score(url, probe, html)
    }

    async fn probe(&self, url: &str) -> (ProbeResult, Option<String>) {
        match self.fetcher.get(url).await {
            Ok(fetched) => (
                ProbeResult {
                    success: (200..400).contains(&fetched.status),
                    status: fetched.status,
                    latency_ms: fetched.elapsed.as_millis() as u64,
                    final_url: fetched.final_url.clone(),
                    error: None,
                },
                Some(fetched.body),
            ),
            Err(FetchError::Status(status)) => (
                ProbeResult {
                    success: false,
                    status,
                    latency_ms: 0,
                    final_url: url.to_string(),
                    error: Some(format!("http status {status}")),
                },
                None,
            ),
            Err(e) => (
                ProbeResult {
                    success: false,
                    status: 0,
                    latency_ms: 0,
                    final_url: url.to_string(),
                    error: Some(e.to_string()),
                },
                None,
            ),
        }
    }

    fn score(&self, url: &str, probe: ProbeResult, html: &str) -> Verification {
        let content = analyze_content(html);
        let dom = fingerprint_dom(html);
        let composite = composite_score(&content, &dom);

        debug!(
            "verification scores for {url}: content={} dom={} composite={composite}",
            content.score, dom.score
        );
        Verification {
            url: url.to_string(),
            composite,
            probe,
            content,
            dom,
        }
    }
}

/// Score title + meta description against the weighted keyword table.
///
/// A page with no indicators at all scores 0; any hit starts from the base
/// of 10 so sparse-but-real signals are not drowned out.
#[must_use]
pub fn analyze_content(html: &str) -> ContentAnalysis {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default();
    let description = document
        .select(&META_DESCRIPTION_SELECTOR)
        .next()
        .and_then(|el| el.value().attr("content"))
        .unwrap_or_default();

    let text = format!("{title} {description}").to_lowercase();

    let mut indicators = Vec::new();
    let mut score = 0u32;

    for (keyword, weight) in CONTENT_KEYWORDS.iter() {
        if text.contains(keyword) {
            indicators.push(format!("keyword_{keyword}"));
            score += weight;
        }
    }

    if indicators.len() > 3 {
        score += 15;
    }
    if indicators.len() > 6 {
        score += 10;
    }

    for (pattern, name) in CONTENT_PATTERNS.iter() {
        if pattern.is_match(&text) {
            indicators.push(format!("pattern_{name}"));
            score += 10;
        }
    }

    if !indicators.is_empty() {
        score += 10;
    }

    ContentAnalysis {
        score: score.min(100),
        indicators,
        title,
    }
}

/// Score the HTML structure for streaming indicators.
#[must_use]
pub fn fingerprint_dom(html: &str) -> DomFingerprint {
    let document = Html::parse_document(html);
    let html_lower = html.to_lowercase();

    let mut indicators = Vec::new();
    let mut score = 0u32;

    let video_count = document.select(&VIDEO_SELECTOR).count();
    if video_count > 0 {
        indicators.push(format!("video_tags_{video_count}"));
        score += 40;
    }

    let iframes: Vec<_> = document.select(&IFRAME_SELECTOR).collect();
    let iframe_count = iframes.len();
    let mut has_streaming_iframe = false;
    if iframe_count > 0 {
        indicators.push(format!("iframes_{iframe_count}"));
        score += 35;

        for iframe in &iframes {
            let src = iframe.value().attr("src").unwrap_or_default().to_lowercase();
            if ["player", "stream", "video", "embed", "jwplayer"]
                .iter()
                .any(|kw| src.contains(kw))
            {
                indicators.push("streaming_iframe".to_string());
                score += 25;
                has_streaming_iframe = true;
                break;
            }
        }
    }

    for tag in STREAMING_SELECTORS {
        let found = document.select(&ANY_ELEMENT_SELECTOR).any(|el| {
            el.value().attr("id") == Some(tag)
                || el
                    .value()
                    .attr("class")
                    .is_some_and(|classes| classes.split_whitespace().any(|c| c == *tag))
        });
        if found {
            indicators.push(format!("container_{tag}"));
            score += 15;
        }
    }

    let script_has_player = document.select(&SCRIPT_SELECTOR).any(|script| {
        let body = script.text().collect::<String>().to_lowercase();
        SCRIPT_PLAYER_PATTERNS.iter().any(|p| body.contains(p))
    });
    if script_has_player {
        indicators.push("streaming_script".to_string());
        score += 20;
    }

    if indicators.iter().any(|i| i == "container_schedule")
        || indicators.iter().any(|i| i == "container_fixtures")
        || indicators.iter().any(|i| i == "container_games")
        || indicators.iter().any(|i| i == "container_matches")
    {
        indicators.push("scheduled_games".to_string());
        score += 25;
    }

    for pattern in ["og:video", "twitter:player"] {
        if html_lower.contains(pattern) {
            indicators.push(format!("meta_{}", pattern.replace(':', "_")));
            score += 15;
            break;
        }
    }

    for platform in PLAYER_PLATFORMS {
        if html_lower.contains(platform) {
            indicators.push(format!("platform_{platform}"));
            score += 10;
        }
    }

    DomFingerprint {
        score,
        indicators,
        video_count,
        iframe_count,
        has_streaming_iframe,
    }
}

/// Combine the sub-scores into the final 0-100 composite.
#[must_use]
pub fn composite_score(content: &ContentAnalysis, dom: &DomFingerprint) -> u8 {
    let mut bonus = 0.0f64;
    if content.indicators.len() > 5 {
        bonus += 10.0;
    }
    // Rich-indicator gate: a bare video element on an otherwise empty page
    // earns no bonus.
    if dom.video_count > 0 && (dom.iframe_count > 0 || content.indicators.len() >= 3) {
        bonus += 15.0;
    }
    if dom.has_streaming_iframe {
        bonus += 10.0;
    }
    bonus = bonus.min(35.0);

    let composite =
        10.0 + 0.25 * f64::from(content.score) + 0.65 * f64::from(dom.score) + bonus;
    composite.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoutConfig;

    #[test]
    fn empty_body_scores_base_only() {
        let content = analyze_content("");
        let dom = fingerprint_dom("");
        assert_eq!(content.score, 0);
        assert_eq!(dom.score, 0);
        assert!(composite_score(&content, &dom) <= 10);
    }

    #[test]
    fn lone_video_element_stays_below_admission_threshold() {
        let html = "<html><body><video src='a.mp4'></video></body></html>";
        let content = analyze_content(html);
        let dom = fingerprint_dom(html);

        assert_eq!(dom.score, 40);
        assert_eq!(content.score, 0);
        // 10 + 0 + 0.65 * 40 = 36, no bonus for a bare video.
        assert_eq!(composite_score(&content, &dom), 36);
    }

    #[test]
    fn video_plus_streaming_iframe_and_content_clears_threshold() {
        let html = r#"<html>
            <head><title>Watch NFL Live Stream Free</title>
            <meta name="description" content="free live sports streaming schedule"></head>
            <body>
              <video></video>
              <iframe src="https://cdn.example/player/embed"></iframe>
            </body></html>"#;

        let content = analyze_content(html);
        let dom = fingerprint_dom(html);
        let composite = composite_score(&content, &dom);

        assert!(dom.has_streaming_iframe);
        assert!(composite > 50, "composite was {composite}");
    }

    #[test]
    fn content_analysis_counts_patterns_and_bonuses() {
        let html = r#"<html><head>
            <title>Live Stream Sports - Watch Online Free HD</title>
            </head><body></body></html>"#;
        let content = analyze_content(html);

        assert!(content.indicators.iter().any(|i| i == "keyword_stream"));
        assert!(content.indicators.iter().any(|i| i == "pattern_live_stream"));
        assert!(content.score > 50);
        assert!(content.score <= 100);
    }

    #[tokio::test]
    async fn unreachable_site_short_circuits_to_zero() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/gone")
            .with_status(503)
            .create_async()
            .await;

        let fetcher = Arc::new(Fetcher::new(&ScoutConfig::default(), None).unwrap());
        let verifier = SiteVerifier::new(fetcher);

        let verification = verifier
            .verify_url(&format!("{}/gone", server.url()))
            .await;
        assert_eq!(verification.composite, 0);
        assert!(!verification.probe.success);
        assert_eq!(verification.probe.status, 503);
    }

    #[tokio::test]
    async fn reachable_streaming_page_verifies_end_to_end() {
        let mut server = mockito::Server::new_async().await;
        let body = r#"<html><head><title>Watch NFL Live Free</title></head>
            <body><video></video><iframe src="/player/embed"></iframe></body></html>"#;
        let _mock = server
            .mock("GET", "/site")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let fetcher = Arc::new(Fetcher::new(&ScoutConfig::default(), None).unwrap());
        let verifier = SiteVerifier::new(fetcher);

        let verification = verifier
            .verify_url(&format!("{}/site", server.url()))
            .await;
        assert!(verification.probe.success);
        assert!(verification.composite >= 50);
    }
}
