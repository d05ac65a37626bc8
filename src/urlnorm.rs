//! URL canonicalization and host-derived naming.
//!
//! Every URL entering the frontier, the seen-set, or the catalog goes through
//! [`canonicalize`] first, so one page is only ever tracked under one key.

use thiserror::Error;
use url::Url;

/// Query parameters that carry tracking state and never change page identity.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "msclkid",
    "ref",
    "ref_src",
];

#[derive(Debug, Error)]
pub enum UrlNormError {
    #[error("invalid url: {0}")]
    Invalid(#[from] url::ParseError),
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
    #[error("url has no host")]
    MissingHost,
}

/// Canonicalize a URL: lowercase host (done by the parser), no fragment,
/// tracking query parameters stripped, trailing slash collapsed.
///
/// Idempotent: `canonicalize(canonicalize(u)) == canonicalize(u)`.
pub fn canonicalize(raw: &str) -> Result<String, UrlNormError> {
    let mut parsed = Url::parse(raw.trim())?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(UrlNormError::UnsupportedScheme(other.to_string())),
    }
    if parsed.host_str().is_none() {
        return Err(UrlNormError::MissingHost);
    }

    parsed.set_fragment(None);

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    parsed.set_query(None);
    if !kept.is_empty() {
        let mut pairs = parsed.query_pairs_mut();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
    }

    let path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        parsed.set_path(path.trim_end_matches('/'));
    }

    Ok(parsed.to_string())
}

/// Host of a URL, if it parses.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
}

/// Derive a human-readable site name from a URL host.
///
/// `https://www.streameast.app/nfl` becomes `Streameast`. Falls back to the
/// raw input when the URL does not parse.
pub fn site_name(url: &str) -> String {
    let Some(mut domain) = host_of(url) else {
        return url.to_string();
    };

    for prefix in ["www.", "m.", "mobile."] {
        if let Some(stripped) = domain.strip_prefix(prefix) {
            domain = stripped.to_string();
            break;
        }
    }

    let label = domain.split('.').next().unwrap_or(&domain);
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => domain,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_form_is_idempotent() {
        let once = canonicalize("https://Example.App/Path/?utm_source=x&q=nfl#frag").unwrap();
        let twice = canonicalize(&once).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once, "https://example.app/Path?q=nfl");
    }

    #[test]
    fn host_case_and_trailing_slash_collapse() {
        let a = canonicalize("https://Example.App/").unwrap();
        let b = canonicalize("https://example.app").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn tracking_params_are_stripped() {
        let url = canonicalize("https://streameast.io/live?fbclid=abc&game=nfl").unwrap();
        assert_eq!(url, "https://streameast.io/live?game=nfl");
    }

    #[test]
    fn non_http_schemes_are_rejected() {
        assert!(canonicalize("ftp://example.com/file").is_err());
        assert!(canonicalize("javascript:void(0)").is_err());
    }

    #[test]
    fn site_name_strips_prefixes_and_titles() {
        assert_eq!(site_name("https://www.streameast.app/nfl"), "Streameast");
        assert_eq!(site_name("https://m.sportssurge.net"), "Sportssurge");
        assert_eq!(site_name("not a url"), "not a url");
    }
}
