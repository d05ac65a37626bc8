//! Fixed-schema feature extraction from rendered HTML.
//!
//! The classifier artifact is trained against this exact feature ordering;
//! [`feature_names`] is persisted alongside the model and checked at load
//! time. Adding a feature here requires retraining the model.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Sports and streaming vocabulary used for density features.
pub const SPORTS_KEYWORDS: &[&str] = &[
    "live",
    "stream",
    "watch",
    "nfl",
    "nba",
    "nhl",
    "mlb",
    "soccer",
    "football",
    "basketball",
    "hockey",
    "baseball",
    "sports",
    "game",
    "match",
    "playoff",
    "championship",
    "league",
    "team",
    "score",
    "highlights",
    "replay",
    "broadcast",
    "free",
    "online",
    "tv",
    "channel",
    "video",
    "player",
    "espn",
];

/// Script-text markers of known media stacks.
const STREAMING_INDICATORS: &[&str] = &[
    "jwplayer", "videojs", "video.js", "hls", "m3u8", "dashjs", "dash.js", "rtmp", "flowplayer",
    "plyr", "clappr",
];

const BASE_FEATURES: &[&str] = &[
    "has_video_tag",
    "video_count",
    "has_iframe",
    "iframe_count",
    "has_embed",
    "has_object",
    "has_jwplayer",
    "has_videojs",
    "has_hls_reference",
    "has_dash_reference",
    "has_streaming_js",
    "total_sports_keyword_density",
    "link_count",
    "external_link_count",
    "dom_depth",
    "html_size",
    "text_to_html_ratio",
    "script_count",
    "stylesheet_count",
    "title_length",
    "url_has_sports_keyword",
    "url_has_stream_keyword",
    "domain_length",
    "path_depth",
    "title_has_sports",
    "title_has_stream",
    "meta_has_sports",
];

/// The full, ordered feature schema: base features first, then one density
/// feature per keyword.
pub static FEATURE_NAMES: Lazy<Vec<String>> = Lazy::new(|| {
    let mut names: Vec<String> = BASE_FEATURES.iter().map(|s| (*s).to_string()).collect();
    names.extend(
        SPORTS_KEYWORDS
            .iter()
            .map(|kw| format!("keyword_density_{kw}")),
    );
    names
});

static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("selector"));
static VIDEO_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("video").expect("selector"));
static IFRAME_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("iframe").expect("selector"));
static EMBED_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("embed").expect("selector"));
static OBJECT_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("object").expect("selector"));
static SCRIPT_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("script").expect("selector"));
static STYLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("style").expect("selector"));
static STYLESHEET_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"link[rel="stylesheet"]"#).expect("selector"));
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("selector"));
static META_DESCRIPTION_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="description"]"#).expect("selector"));

/// Ordered feature values matching [`FEATURE_NAMES`].
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<f64>,
}

impl FeatureVector {
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value of a named feature, if the name is part of the schema.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| n == name)
            .map(|index| self.values[index])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Extract the fixed feature schema from a page.
#[must_use]
pub fn extract(html: &str, url: &str) -> FeatureVector {
    let document = Html::parse_document(html);
    let html_lower = html.to_lowercase();
    let url_lower = url.to_lowercase();

    let text: String = document.root_element().text().collect::<Vec<_>>().join(" ");
    let text_lower = text.to_lowercase();
    let total_words = text_lower.split_whitespace().count().max(1);

    let video_count = document.select(&VIDEO_SELECTOR).count();
    let iframe_count = document.select(&IFRAME_SELECTOR).count();
    let link_count = document.select(&ANCHOR_SELECTOR).count();
    let script_count = document.select(&SCRIPT_SELECTOR).count();
    let stylesheet_count = document.select(&STYLE_SELECTOR).count()
        + document.select(&STYLESHEET_LINK_SELECTOR).count();

    let title = document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|el| el.text().collect::<String>())
        .unwrap_or_default();
    let title_lower = title.to_lowercase();

    let meta_description = document
        .select(&META_DESCRIPTION_SELECTOR)
        .next()
        .and_then(|el| el.value().attr("content"))
        .unwrap_or_default()
        .to_lowercase();

    let parsed_url = Url::parse(url).ok();
    let page_host = parsed_url
        .as_ref()
        .and_then(|u| u.host_str())
        .unwrap_or_default()
        .to_string();
    let domain_length = page_host.len();
    let path_depth = parsed_url
        .as_ref()
        .map(|u| u.path().split('/').filter(|p| !p.is_empty()).count())
        .unwrap_or(0);

    let external_link_count = document
        .select(&ANCHOR_SELECTOR)
        .filter(|el| is_external_link(el, &page_host))
        .count();

    let dom_depth = document
        .tree
        .nodes()
        .filter(|node| node.value().is_element())
        .map(|node| node.ancestors().count())
        .max()
        .unwrap_or(0);

    let keyword_counts: Vec<usize> = SPORTS_KEYWORDS
        .iter()
        .map(|kw| text_lower.matches(kw).count())
        .collect();
    let total_sports_hits: usize = keyword_counts.iter().sum();

    let as_flag = |present: bool| if present { 1.0 } else { 0.0 };

    let mut values = vec![
        as_flag(video_count > 0),
        video_count as f64,
        as_flag(iframe_count > 0),
        iframe_count as f64,
        as_flag(document.select(&EMBED_SELECTOR).next().is_some()),
        as_flag(document.select(&OBJECT_SELECTOR).next().is_some()),
        as_flag(html_lower.contains("jwplayer")),
        as_flag(html_lower.contains("videojs") || html_lower.contains("video.js")),
        as_flag(html_lower.contains("m3u8") || html_lower.contains("hls")),
        as_flag(html_lower.contains("dashjs") || html_lower.contains("dash.js")),
        as_flag(
            STREAMING_INDICATORS
                .iter()
                .any(|indicator| html_lower.contains(indicator)),
        ),
        total_sports_hits as f64 / total_words as f64,
        link_count as f64,
        external_link_count as f64,
        dom_depth as f64,
        html.len() as f64,
        text.len() as f64 / html.len().max(1) as f64,
        script_count as f64,
        stylesheet_count as f64,
        title.len() as f64,
        as_flag(SPORTS_KEYWORDS.iter().any(|kw| url_lower.contains(kw))),
        as_flag(
            ["stream", "live", "watch", "tv"]
                .iter()
                .any(|kw| url_lower.contains(kw)),
        ),
        domain_length as f64,
        path_depth as f64,
        as_flag(SPORTS_KEYWORDS.iter().any(|kw| title_lower.contains(kw))),
        as_flag(
            ["stream", "live", "watch"]
                .iter()
                .any(|kw| title_lower.contains(kw)),
        ),
        as_flag(SPORTS_KEYWORDS.iter().any(|kw| meta_description.contains(kw))),
    ];

    for count in keyword_counts {
        values.push(count as f64 / total_words as f64);
    }

    debug_assert_eq!(values.len(), FEATURE_NAMES.len());
    FeatureVector { values }
}

fn is_external_link(anchor: &ElementRef, page_host: &str) -> bool {
    let Some(href) = anchor.value().attr("href") else {
        return false;
    };
    if !href.starts_with("http") {
        return false;
    }
    match Url::parse(href) {
        Ok(parsed) => parsed.host_str().is_some_and(|host| host != page_host),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAMING_PAGE: &str = r#"
        <html>
          <head>
            <title>Watch NFL Live Free</title>
            <meta name="description" content="Free live sports streaming">
            <link rel="stylesheet" href="style.css">
          </head>
          <body>
            <video src="game.mp4"></video>
            <iframe src="https://player.example/embed/nfl"></iframe>
            <script>var player = jwplayer("player"); player.load("index.m3u8");</script>
            <a href="/nfl">NFL streams</a>
            <a href="https://other.example/nba">NBA</a>
          </body>
        </html>"#;

    #[test]
    fn schema_is_stable_and_matches_names() {
        let features = extract(STREAMING_PAGE, "https://streameast.app/nfl");
        assert_eq!(features.len(), FEATURE_NAMES.len());
        assert_eq!(features.get("has_video_tag"), Some(1.0));
        assert_eq!(features.get("iframe_count"), Some(1.0));
        assert_eq!(features.get("has_jwplayer"), Some(1.0));
        assert_eq!(features.get("has_hls_reference"), Some(1.0));
        assert_eq!(features.get("url_has_stream_keyword"), Some(1.0));
        assert_eq!(features.get("title_has_sports"), Some(1.0));
        assert_eq!(features.get("meta_has_sports"), Some(1.0));
    }

    #[test]
    fn external_links_are_counted_against_page_host() {
        let features = extract(STREAMING_PAGE, "https://streameast.app/nfl");
        assert_eq!(features.get("external_link_count"), Some(1.0));
        assert_eq!(features.get("link_count"), Some(2.0));
    }

    #[test]
    fn empty_body_yields_zeroed_signal_features() {
        let features = extract("", "https://example.com");
        assert_eq!(features.get("has_video_tag"), Some(0.0));
        assert_eq!(features.get("total_sports_keyword_density"), Some(0.0));
        assert_eq!(features.get("link_count"), Some(0.0));
    }

    #[test]
    fn keyword_density_reflects_text() {
        let html = "<html><body>live live live stream other words here</body></html>";
        let features = extract(html, "https://example.com");
        let density = features.get("keyword_density_live").unwrap();
        assert!(density > 0.0);
        assert!(features.get("keyword_density_nhl").unwrap() == 0.0);
    }
}
