//! Discovery hunters: three independent strategies emitting candidate URLs.
//!
//! Hunters are failure-isolated from each other — one strategy blowing up
//! yields an empty contribution and a logged cause, never a cancelled hunt.
//! Results are union-merged by canonical URL with prior bonuses summed and
//! capped.

pub mod aggregator;
pub mod permutation;
pub mod search_engine;

pub use search_engine::{
    BrowserSearch, HtmlSearch, RateGate, SearchEngine, SearchError, SearchHit,
};

use std::collections::HashMap;

use tracing::{info, warn};

use crate::catalog::SiteSource;
use crate::config::ScoutConfig;
use crate::fetcher::Fetcher;
use crate::urlnorm;

/// Upper bound on the evidence a candidate can accumulate before fetching.
pub const MAX_PRIOR_BONUS: u8 = 25;

/// Host substrings that mark a link as potentially streaming-related.
pub(crate) const STREAMING_HOST_HINTS: &[&str] = &[
    "stream", "watch", "movie", "tv", "sport", "live", "free", "online", "hd", "east", "surge",
    "cast",
];

/// Hosts that never are the streaming site itself.
pub(crate) const EXCLUDED_DOMAINS: &[&str] = &[
    "google.com",
    "facebook.com",
    "twitter.com",
    "youtube.com",
    "reddit.com",
    "github.com",
    "discord.com",
    "telegram.org",
    "wikipedia.org",
    "instagram.com",
    "tiktok.com",
    "linkedin.com",
    "amazon.com",
];

/// One discovered URL with the evidence collected at discovery time.
/// Lives for a single cycle; candidates are never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Canonical URL.
    pub url: String,
    pub source: SiteSource,
    /// Discovery-time confidence contribution, `0..=25`.
    pub prior_bonus: u8,
}

/// Union-merge of candidates keyed by canonical URL.
///
/// Duplicate URLs accumulate `prior_bonus` (capped) and keep the source of
/// their first sighting.
#[derive(Debug, Default)]
pub struct CandidateSet {
    by_url: HashMap<String, Candidate>,
}

impl CandidateSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a candidate; the URL is canonicalized and invalid URLs dropped.
    pub fn add(&mut self, url: &str, source: SiteSource, prior_bonus: u8) {
        let canonical = match urlnorm::canonicalize(url) {
            Ok(canonical) => canonical,
            Err(e) => {
                warn!("dropping uncanonicalizable candidate {url}: {e}");
                return;
            }
        };

        self.by_url
            .entry(canonical.clone())
            .and_modify(|existing| {
                existing.prior_bonus = existing
                    .prior_bonus
                    .saturating_add(prior_bonus)
                    .min(MAX_PRIOR_BONUS);
            })
            .or_insert(Candidate {
                url: canonical,
                source,
                prior_bonus: prior_bonus.min(MAX_PRIOR_BONUS),
            });
    }

    pub fn extend(&mut self, candidates: Vec<Candidate>) {
        for candidate in candidates {
            self.add(&candidate.url, candidate.source, candidate.prior_bonus);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_url.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = self.by_url.into_values().collect();
        candidates.sort_by(|a, b| b.prior_bonus.cmp(&a.prior_bonus).then(a.url.cmp(&b.url)));
        candidates
    }
}

/// Run all three hunters and merge their output.
///
/// `seed_queries` comes from the cycle's mission plan and feeds the
/// search-engine hunter.
pub async fn discover<S: SearchEngine>(
    config: &ScoutConfig,
    fetcher: &Fetcher,
    search: Option<&S>,
    seed_queries: &[String],
) -> Vec<Candidate> {
    let mut merged = CandidateSet::new();
    let params = &config.operational_parameters;

    let (aggregated, permuted) = tokio::join!(
        aggregator::hunt(fetcher, &params.aggregator_urls),
        permutation::hunt(
            fetcher,
            &params.permutation_bases,
            &params.permutation_tlds,
            config.discovery_settings.max_concurrent_verifications,
        ),
    );

    info!("aggregator hunter contributed {} candidates", aggregated.len());
    merged.extend(aggregated);
    info!("permutation hunter contributed {} candidates", permuted.len());
    merged.extend(permuted);

    if let Some(engine) = search {
        let found = search_engine::hunt(engine, seed_queries).await;
        info!("search-engine hunter contributed {} candidates", found.len());
        merged.extend(found);
    } else {
        info!("search-engine hunter skipped: no engine available");
    }

    info!("total discovered candidates after merge: {}", merged.len());
    merged.into_vec()
}

/// Host-level streaming filter shared by the aggregator and search hunters.
pub(crate) fn host_looks_streaming(host: &str) -> bool {
    STREAMING_HOST_HINTS.iter().any(|hint| host.contains(hint))
        && !EXCLUDED_DOMAINS.iter().any(|domain| host.contains(domain))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_urls_accumulate_bonus_up_to_cap() {
        let mut set = CandidateSet::new();
        set.add("https://Example.App/", SiteSource::Aggregator, 12);
        set.add("https://example.app", SiteSource::SearchEngine, 15);

        let candidates = set.into_vec();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].url, "https://example.app/");
        assert_eq!(candidates[0].prior_bonus, MAX_PRIOR_BONUS);
        // Source of first sighting wins.
        assert_eq!(candidates[0].source, SiteSource::Aggregator);
    }

    #[test]
    fn invalid_urls_are_dropped_silently() {
        let mut set = CandidateSet::new();
        set.add("not a url", SiteSource::Permutation, 0);
        set.add("ftp://example.com", SiteSource::Permutation, 0);
        assert!(set.is_empty());
    }

    #[test]
    fn host_filter_accepts_hints_and_rejects_platforms() {
        assert!(host_looks_streaming("streameast.app"));
        assert!(host_looks_streaming("sportssurge.net"));
        assert!(!host_looks_streaming("example.org"));
        // Carries the "tv" hint but sits on an excluded platform.
        assert!(!host_looks_streaming("tv.youtube.com"));
    }

    #[test]
    fn candidates_sort_by_bonus_descending() {
        let mut set = CandidateSet::new();
        set.add("https://low.stream", SiteSource::Aggregator, 2);
        set.add("https://high.stream", SiteSource::Aggregator, 20);

        let candidates = set.into_vec();
        assert_eq!(candidates[0].url, "https://high.stream/");
    }
}
