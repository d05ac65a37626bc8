//! Aggregator hunter: harvest outbound links from curated index pages.
//!
//! Community-maintained index pages (wikis, link lists) are fetched
//! statically; outbound anchors with streaming-looking hosts are kept, and
//! the text surrounding each link is inspected for engagement signals
//! (upvote counts, "working"/"verified" endorsements) that become a prior
//! bonus.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{info, warn};
use url::Url;

use crate::catalog::SiteSource;
use crate::fetcher::Fetcher;

use super::{Candidate, host_looks_streaming};

/// Bonus cap for context evidence around one link.
const MAX_CONTEXT_BONUS: u8 = 20;

/// Ancestor levels inspected for engagement signals.
const CONTEXT_LEVELS: usize = 3;

static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("selector"));

static SCORE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(\d+)\s*upvotes?",
        r"(\d+)\s*points?",
        r"score:\s*(\d+)",
        r"rating:\s*(\d+)",
        r"(\d+)\s*votes?",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("score pattern"))
    .collect()
});

const POSITIVE_INDICATORS: &[&str] = &[
    "working",
    "best",
    "recommended",
    "reliable",
    "good quality",
    "updated",
    "active",
    "tested",
    "verified",
];

/// Scrape each curated index page for streaming candidates.
///
/// Individual page failures are logged and skipped; the hunter itself never
/// fails.
pub async fn hunt(fetcher: &Fetcher, index_urls: &[String]) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for index_url in index_urls {
        info!("aggregator hunter scraping {index_url}");
        match fetcher.get(index_url).await {
            Ok(fetched) => {
                let found = extract_candidates(&fetched.body, index_url);
                info!(
                    "aggregator hunter found {} potential streaming links on {index_url}",
                    found.len()
                );
                candidates.extend(found);
            }
            Err(e) => {
                warn!("aggregator hunter failed for {index_url}: {e}");
            }
        }
    }

    candidates
}

/// Pull streaming-looking outbound anchors with their context bonus.
#[must_use]
pub fn extract_candidates(html: &str, page_url: &str) -> Vec<Candidate> {
    let document = Html::parse_document(html);
    let base = Url::parse(page_url).ok();

    let mut candidates = Vec::new();
    for anchor in document.select(&ANCHOR_SELECTOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty() {
            continue;
        }

        let absolute = if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else if href.starts_with('/') {
            match &base {
                Some(base_url) => match base_url.join(href) {
                    Ok(joined) => joined.to_string(),
                    Err(_) => continue,
                },
                None => continue,
            }
        } else {
            continue;
        };

        let Ok(parsed) = Url::parse(&absolute) else {
            continue;
        };
        let Some(host) = parsed.host_str() else {
            continue;
        };

        if !host_looks_streaming(&host.to_lowercase()) {
            continue;
        }

        candidates.push(Candidate {
            url: absolute,
            source: SiteSource::Aggregator,
            prior_bonus: context_bonus(&anchor),
        });
    }

    candidates
}

/// Score the text around a link for engagement signals.
///
/// Walks up to three ancestors looking for numeric score patterns and
/// positive endorsement words; higher community scores earn bigger bonuses.
fn context_bonus(anchor: &ElementRef) -> u8 {
    let mut bonus = 0u8;

    for node in anchor.ancestors().take(CONTEXT_LEVELS) {
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };
        let text = element.text().collect::<String>().to_lowercase();

        for pattern in SCORE_PATTERNS.iter() {
            if let Some(captures) = pattern.captures(&text)
                && let Some(value) = captures.get(1)
                && let Ok(score) = value.as_str().parse::<u64>()
            {
                bonus = bonus.saturating_add(match score {
                    s if s > 100 => 20,
                    s if s > 50 => 15,
                    s if s > 10 => 10,
                    s if s > 0 => 5,
                    _ => 0,
                });
                break;
            }
        }

        if POSITIVE_INDICATORS
            .iter()
            .any(|indicator| text.contains(indicator))
        {
            bonus = bonus.saturating_add(5);
        }
    }

    bonus.min(MAX_CONTEXT_BONUS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_streaming_hosts_and_drops_platforms() {
        let html = r#"
            <html><body>
              <a href="https://streameast.app">StreamEast</a>
              <a href="https://github.com/some/repo">repo</a>
              <a href="https://news.example.org">news</a>
            </body></html>"#;

        let candidates = extract_candidates(html, "https://index.example/wiki");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].url, "https://streameast.app");
    }

    #[test]
    fn relative_links_resolve_against_the_page() {
        let html = r#"<html><body><a href="/mirror/streameast">mirror</a></body></html>"#;
        let candidates = extract_candidates(html, "https://livesports.example/wiki");
        // Host of the joined URL is livesports.example, which carries "live".
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].url.starts_with("https://livesports.example/"));
    }

    #[test]
    fn upvote_context_earns_bonus() {
        let html = r#"
            <html><body>
              <div>250 upvotes - working great
                <p><a href="https://sportssurge.net">SportsSurge</a></p>
              </div>
            </body></html>"#;

        let candidates = extract_candidates(html, "https://index.example/");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].prior_bonus, 20);
    }

    #[test]
    fn bare_link_has_zero_bonus() {
        let html = r#"<html><body><a href="https://streameast.app">x</a></body></html>"#;
        let candidates = extract_candidates(html, "https://index.example/");
        assert_eq!(candidates[0].prior_bonus, 0);
    }
}
