//! Reporting agent integration tests: log-contract matching, catalog
//! aggregation, persistence and retrieval.

use std::time::Duration;

use streamscout::catalog::{Catalog, SiteFields, SiteSource};
use streamscout::crawler::CrawlSummary;
use streamscout::reporting::ReportingAgent;
use tempfile::TempDir;

fn crawl_summary(pages: usize, links: usize) -> CrawlSummary {
    CrawlSummary {
        pages_crawled: pages,
        links_evaluated: links,
        duration: Duration::from_secs(42),
        ..CrawlSummary::default()
    }
}

fn admission_fields() -> SiteFields {
    SiteFields {
        name: "StreamEast".to_string(),
        source: SiteSource::Crawl,
        confidence_score: 78,
        category: None,
        llm_verified: None,
        llm_reasoning: None,
    }
}

/// A cycle log carrying the contractual substrings.
const CYCLE_LOG: &str = "\
New page being crawled: https://a.stream/ (depth 0, source crawl)\n\
The classifier's verdict: https://a.stream/ -> probability=0.930 (POSITIVE)\n\
V2 verification for https://a.stream/: composite=78\n\
Site https://a.stream/ successfully written to database (confidence 78)\n\
New page being crawled: https://b.stream/ (depth 1, source crawl)\n\
The classifier's verdict: https://b.stream/ -> probability=0.120 (NEGATIVE)\n";

#[tokio::test]
async fn report_counts_contract_substrings_and_catalog_totals() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::open_in_memory().await.unwrap();
    catalog
        .upsert("https://a.stream/", &admission_fields())
        .await
        .unwrap();

    let agent = ReportingAgent::new(catalog, dir.path().to_path_buf());
    let report = agent
        .generate(CYCLE_LOG, &crawl_summary(2, 14), 5)
        .await
        .unwrap();

    assert_eq!(report.mission_summary.pages_crawled, 2);
    assert_eq!(report.mission_summary.links_evaluated, 14);
    assert_eq!(report.mission_summary.duration_seconds, 42);

    // 1 positive out of 2 verdicts; 1 write out of 1 verification.
    assert!((report.performance_analysis.classifier_success_rate - 0.5).abs() < 1e-9);
    assert!((report.performance_analysis.verifier_success_rate - 1.0).abs() < 1e-9);
    assert_eq!(report.performance_analysis.most_effective_source, "crawl");

    assert_eq!(report.discovery_results.new_sites_found, 1);
    assert_eq!(report.discovery_results.total_active_sites, 1);
    assert_eq!(report.discovery_results.sites_quarantined, 0);

    let reasoning = &report.cognitive_reasoning_process;
    assert!(!reasoning.observations.is_empty());
    assert!(!reasoning.insights.is_empty());
    assert!(!reasoning.primary_recommendation.is_empty());
    assert!(reasoning.reasoning_confidence <= 100);
}

#[tokio::test]
async fn empty_cycle_reports_pivot_recommendation() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::open_in_memory().await.unwrap();
    let agent = ReportingAgent::new(catalog, dir.path().to_path_buf());

    let report = agent.generate("", &crawl_summary(0, 0), 5).await.unwrap();

    assert_eq!(report.discovery_results.new_sites_found, 0);
    assert!(
        report
            .cognitive_reasoning_process
            .primary_recommendation
            .to_lowercase()
            .contains("pivot")
    );
}

#[tokio::test]
async fn persisted_report_is_retrievable_as_latest() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::open_in_memory().await.unwrap();
    let agent = ReportingAgent::new(catalog, dir.path().to_path_buf());

    assert!(agent.latest().unwrap().is_none());

    let report = agent.generate(CYCLE_LOG, &crawl_summary(2, 14), 5).await.unwrap();
    let path = agent.persist(&report).unwrap();
    assert!(path.exists());

    let latest = agent.latest().unwrap().unwrap();
    assert_eq!(latest.mission_summary.pages_crawled, 2);
    assert_eq!(latest.report_type, "after_action");
}

#[tokio::test]
async fn latest_prefers_most_recently_written_report() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::open_in_memory().await.unwrap();
    let agent = ReportingAgent::new(catalog, dir.path().to_path_buf());

    let mut first = agent.generate("", &crawl_summary(1, 0), 5).await.unwrap();
    first.timestamp = first.timestamp - chrono::Duration::hours(1);
    agent.persist(&first).unwrap();

    // Filesystem mtime resolution can be coarse.
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let second = agent.generate("", &crawl_summary(9, 0), 5).await.unwrap();
    agent.persist(&second).unwrap();

    let latest = agent.latest().unwrap().unwrap();
    assert_eq!(latest.mission_summary.pages_crawled, 9);
}

#[tokio::test]
async fn unreadable_latest_report_degrades_to_none() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::open_in_memory().await.unwrap();
    let agent = ReportingAgent::new(catalog, dir.path().to_path_buf());

    std::fs::write(
        dir.path().join("after_action_report_20250101_000000.json"),
        "{ corrupt",
    )
    .unwrap();

    assert!(agent.latest().unwrap().is_none());
}
