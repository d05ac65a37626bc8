//! Hunter integration tests against mock HTTP servers.

use streamscout::catalog::SiteSource;
use streamscout::config::ScoutConfig;
use streamscout::fetcher::Fetcher;
use streamscout::hunters::{self, SearchEngine, SearchError, SearchHit};

fn fetcher() -> Fetcher {
    Fetcher::new(&ScoutConfig::default(), None).unwrap()
}

#[tokio::test]
async fn aggregator_extracts_streaming_links_with_context_bonus() {
    let mut server = mockito::Server::new_async().await;
    let _index = server
        .mock("GET", "/wiki")
        .with_status(200)
        .with_body(
            r#"<html><body>
              <div>120 upvotes, verified working
                <a href="https://streameast.app">StreamEast</a>
              </div>
              <a href="https://github.com/awesome/list">github list</a>
              <a href="https://watchsports.example">sports</a>
            </body></html>"#,
        )
        .create_async()
        .await;

    let candidates =
        hunters::aggregator::hunt(&fetcher(), &[format!("{}/wiki", server.url())]).await;

    let urls: Vec<&str> = candidates.iter().map(|c| c.url.as_str()).collect();
    assert!(urls.contains(&"https://streameast.app"));
    assert!(urls.contains(&"https://watchsports.example"));
    assert!(!urls.iter().any(|u| u.contains("github")));

    let streameast = candidates
        .iter()
        .find(|c| c.url.contains("streameast"))
        .unwrap();
    assert!(streameast.prior_bonus > 0);
    assert!(streameast.prior_bonus <= 20);
}

#[tokio::test]
async fn aggregator_survives_unreachable_index_pages() {
    let mut server = mockito::Server::new_async().await;
    let _err = server
        .mock("GET", "/wiki")
        .with_status(500)
        .create_async()
        .await;

    let candidates =
        hunters::aggregator::hunt(&fetcher(), &[format!("{}/wiki", server.url())]).await;
    assert!(candidates.is_empty());
}

#[tokio::test]
async fn permutation_drops_unreachable_hosts_without_error() {
    // .invalid never resolves: every probe fails, the hunter yields nothing
    // and does not error.
    let candidates = hunters::permutation::hunt(
        &fetcher(),
        &["definitely-not-a-real-streaming-host-zzz".to_string()],
        &[".invalid".to_string()],
        4,
    )
    .await;
    assert!(candidates.is_empty());
}

struct ScriptedSearch;

impl SearchEngine for ScriptedSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        if query.contains("fail") {
            return Err(SearchError::NoResults("nothing rendered".to_string()));
        }
        Ok(vec![SearchHit {
            url: "https://sportssurge.club".to_string(),
            title: "SportsSurge - live sports".to_string(),
            snippet: "watch free hd streams".to_string(),
            position: 0,
        }])
    }
}

#[tokio::test]
async fn discover_merges_hunters_and_duplicates_accumulate() {
    let mut server = mockito::Server::new_async().await;
    let _index = server
        .mock("GET", "/wiki")
        .with_status(200)
        .with_body(r#"<html><body><a href="https://sportssurge.club">surge</a></body></html>"#)
        .create_async()
        .await;

    let mut config = ScoutConfig::default();
    config.operational_parameters.aggregator_urls = vec![format!("{}/wiki", server.url())];
    config.operational_parameters.permutation_bases = Vec::new();

    let queries = vec!["free sports streams".to_string(), "fail query".to_string()];
    let candidates =
        hunters::discover(&config, &fetcher(), Some(&ScriptedSearch), &queries).await;

    // Aggregator and search both found the same host; one merged candidate.
    assert_eq!(candidates.len(), 1);
    let surge = &candidates[0];
    assert_eq!(surge.url, "https://sportssurge.club/");
    assert_eq!(surge.source, SiteSource::Aggregator);
    assert!(surge.prior_bonus > 0);
    assert!(surge.prior_bonus <= hunters::MAX_PRIOR_BONUS);
}
