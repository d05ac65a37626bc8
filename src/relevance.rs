//! Lexical relevance scoring for link following.
//!
//! The cheapest gate in the funnel: a pure function over anchor text and URL
//! deciding whether a link is worth a fetch at all. Deterministic by
//! construction, so frontier ordering is reproducible.

/// Keywords indicating streaming functionality.
const STREAMING_KEYWORDS: &[&str] = &["live", "stream", "watch", "tv", "video", "player", "free"];

/// Keywords indicating sports content.
const SPORTS_KEYWORDS: &[&str] = &[
    "nfl",
    "nba",
    "nhl",
    "mlb",
    "soccer",
    "football",
    "basketball",
    "sports",
];

/// Link purposes that never lead to streams.
const NEGATIVE_INDICATORS: &[&str] = &[
    "privacy", "terms", "contact", "about", "dmca", "legal", "cookie",
];

/// Score a link for crawl-worthiness, clamped to `[0.0, 1.0]`.
///
/// Anchor text carries more weight than the URL; the `live`/`stream`/`watch`
/// triad in the URL earns a small extra bonus; boilerplate-page indicators
/// subtract heavily.
#[must_use]
pub fn score(anchor_text: &str, url: &str) -> f64 {
    let text = anchor_text.to_lowercase();
    let url = url.to_lowercase();
    let mut score = 0.0f64;

    for keyword in STREAMING_KEYWORDS {
        if text.contains(keyword) {
            score += 0.3;
        }
    }
    for keyword in SPORTS_KEYWORDS {
        if text.contains(keyword) {
            score += 0.2;
        }
    }

    for keyword in STREAMING_KEYWORDS {
        if url.contains(keyword) {
            score += 0.2;
        }
    }
    for keyword in SPORTS_KEYWORDS {
        if url.contains(keyword) {
            score += 0.15;
        }
    }

    if ["live", "stream", "watch"].iter().any(|k| url.contains(k)) {
        score += 0.1;
    }

    for indicator in NEGATIVE_INDICATORS {
        if url.contains(indicator) || text.contains(indicator) {
            score -= 0.5;
        }
    }

    score.clamp(0.0, 1.0)
}
