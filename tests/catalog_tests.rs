//! Catalog lifecycle and invariant tests.

use chrono::Utc;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use streamscout::catalog::{Catalog, SiteFields, SiteSource, SiteStatus, UpsertOutcome};
use tempfile::TempDir;

fn fields(name: &str, confidence: u8) -> SiteFields {
    SiteFields {
        name: name.to_string(),
        source: SiteSource::Crawl,
        confidence_score: confidence,
        category: Some("Sports Streaming".to_string()),
        llm_verified: Some(true),
        llm_reasoning: Some("embedded players confirm streaming".to_string()),
    }
}

#[tokio::test]
async fn upsert_reports_insert_then_update_with_prior_status() {
    let catalog = Catalog::open_in_memory().await.unwrap();

    let first = catalog
        .upsert("https://streameast.app/", &fields("StreamEast", 78))
        .await
        .unwrap();
    assert_eq!(first, UpsertOutcome::Inserted);

    let second = catalog
        .upsert("https://streameast.app/", &fields("StreamEast", 81))
        .await
        .unwrap();
    assert_eq!(
        second,
        UpsertOutcome::Updated {
            prior_status: SiteStatus::Active
        }
    );
}

#[tokio::test]
async fn upsert_is_idempotent_except_last_verified() {
    let catalog = Catalog::open_in_memory().await.unwrap();
    let url = "https://streameast.app/";

    catalog.upsert(url, &fields("StreamEast", 78)).await.unwrap();
    let before = catalog.get(url).await.unwrap().unwrap();

    catalog.upsert(url, &fields("StreamEast", 78)).await.unwrap();
    let after = catalog.get(url).await.unwrap().unwrap();

    assert_eq!(before.id, after.id);
    assert_eq!(before.name, after.name);
    assert_eq!(before.url, after.url);
    assert_eq!(before.source, after.source);
    assert_eq!(before.confidence_score, after.confidence_score);
    assert_eq!(before.status, after.status);
    assert_eq!(before.category, after.category);
    assert_eq!(before.llm_verified, after.llm_verified);
    assert_eq!(before.llm_reasoning, after.llm_reasoning);
    assert_eq!(before.first_seen, after.first_seen);
    assert!(after.last_verified >= before.last_verified);
}

#[tokio::test]
async fn admission_row_matches_expected_shape() {
    let catalog = Catalog::open_in_memory().await.unwrap();

    catalog
        .upsert(
            "https://streameast.app/",
            &SiteFields {
                name: "StreamEast".to_string(),
                source: SiteSource::Crawl,
                confidence_score: 78,
                category: Some("Sports Streaming".to_string()),
                llm_verified: Some(true),
                llm_reasoning: Some("live NFL games with streaming links".to_string()),
            },
        )
        .await
        .unwrap();

    let site = catalog.get("https://streameast.app/").await.unwrap().unwrap();
    assert_eq!(site.name, "StreamEast");
    assert_eq!(site.source, "crawl");
    assert_eq!(site.confidence_score, 78);
    assert_eq!(site.status, SiteStatus::Active);
    assert!(site.is_active);
    assert_eq!(site.llm_verified, Some(true));
}

#[tokio::test]
async fn quarantine_transition_increments_failure_counter() {
    let catalog = Catalog::open_in_memory().await.unwrap();
    let url = "https://streameast.app/";
    catalog.upsert(url, &fields("StreamEast", 72)).await.unwrap();

    catalog.quarantine(url, "got 503").await.unwrap();

    let site = catalog.get(url).await.unwrap().unwrap();
    assert_eq!(site.status, SiteStatus::Quarantined);
    assert!(!site.is_active);
    assert_eq!(site.failed_attempts, 1);
    assert!(site.last_verified.is_some());
}

#[tokio::test]
async fn reactivation_resets_failures_and_updates_confidence() {
    let catalog = Catalog::open_in_memory().await.unwrap();
    let url = "https://streameast.app/";
    catalog.upsert(url, &fields("StreamEast", 72)).await.unwrap();
    catalog.quarantine(url, "flaky").await.unwrap();

    catalog.reactivate(url, 63).await.unwrap();

    let site = catalog.get(url).await.unwrap().unwrap();
    assert_eq!(site.status, SiteStatus::Active);
    assert!(site.is_active);
    assert_eq!(site.confidence_score, 63);
    assert_eq!(site.failed_attempts, 0);
}

#[tokio::test]
async fn failed_rechecks_accumulate_until_deactivation() {
    let catalog = Catalog::open_in_memory().await.unwrap();
    let url = "https://streameast.app/";
    catalog.upsert(url, &fields("StreamEast", 72)).await.unwrap();
    catalog.quarantine(url, "first failure").await.unwrap();

    assert_eq!(catalog.record_failed_recheck(url).await.unwrap(), 2);
    assert_eq!(catalog.record_failed_recheck(url).await.unwrap(), 3);

    catalog.deactivate(url).await.unwrap();
    let site = catalog.get(url).await.unwrap().unwrap();
    assert_eq!(site.status, SiteStatus::Inactive);
    assert!(!site.is_active);
}

#[tokio::test]
async fn is_active_always_tracks_status() {
    let catalog = Catalog::open_in_memory().await.unwrap();
    let url = "https://streameast.app/";
    catalog.upsert(url, &fields("StreamEast", 60)).await.unwrap();

    for _ in 0..2 {
        catalog.quarantine(url, "down").await.unwrap();
        let site = catalog.get(url).await.unwrap().unwrap();
        assert_eq!(site.is_active, site.status.is_active());

        catalog.reactivate(url, 55).await.unwrap();
        let site = catalog.get(url).await.unwrap().unwrap();
        assert_eq!(site.is_active, site.status.is_active());
    }

    catalog.deactivate(url).await.unwrap();
    let site = catalog.get(url).await.unwrap().unwrap();
    assert_eq!(site.is_active, site.status.is_active());
}

#[tokio::test]
async fn transitions_on_missing_rows_are_errors() {
    let catalog = Catalog::open_in_memory().await.unwrap();
    assert!(catalog.quarantine("https://nowhere.app/", "x").await.is_err());
    assert!(catalog.reactivate("https://nowhere.app/", 50).await.is_err());
    assert!(catalog.deactivate("https://nowhere.app/").await.is_err());
}

#[tokio::test]
async fn count_added_since_sees_only_new_rows() {
    let catalog = Catalog::open_in_memory().await.unwrap();
    let before = Utc::now() - chrono::Duration::minutes(5);

    catalog
        .upsert("https://a.stream/", &fields("A", 60))
        .await
        .unwrap();
    catalog
        .upsert("https://b.stream/", &fields("B", 70))
        .await
        .unwrap();

    assert_eq!(catalog.count_added_since(before).await.unwrap(), 2);
    assert_eq!(
        catalog
            .count_added_since(Utc::now() + chrono::Duration::minutes(5))
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn source_breakdown_orders_by_count() {
    let catalog = Catalog::open_in_memory().await.unwrap();

    for (url, source) in [
        ("https://a.stream/", SiteSource::Crawl),
        ("https://b.stream/", SiteSource::Crawl),
        ("https://c.stream/", SiteSource::SearchEngine),
    ] {
        catalog
            .upsert(
                url,
                &SiteFields {
                    name: "x".to_string(),
                    source,
                    confidence_score: 60,
                    category: None,
                    llm_verified: None,
                    llm_reasoning: None,
                },
            )
            .await
            .unwrap();
    }

    let breakdown = catalog.source_breakdown().await.unwrap();
    assert_eq!(breakdown[0], ("crawl".to_string(), 2));
}

#[tokio::test]
async fn legacy_schema_is_migrated_in_place() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("sites.db");

    // Build a pre-status database the way the first deployments did.
    {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await.unwrap();
        sqlx::query(
            "CREATE TABLE sites (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                source TEXT NOT NULL,
                last_verified TEXT,
                confidence_score INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 0,
                first_seen TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO sites (name, url, source, confidence_score, is_active, first_seen)
             VALUES ('Old Active', 'https://old-active.stream/', 'crawl', 70, 1, ?),
                    ('Old Dead', 'https://old-dead.stream/', 'crawl', 20, 0, ?)",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&pool)
        .await
        .unwrap();
        pool.close().await;
    }

    let catalog = Catalog::open(&db_path).await.unwrap();
    let active = catalog.get("https://old-active.stream/").await.unwrap().unwrap();
    assert_eq!(active.status, SiteStatus::Active);
    assert!(active.is_active);

    let dead = catalog.get("https://old-dead.stream/").await.unwrap().unwrap();
    assert_eq!(dead.status, SiteStatus::Inactive);

    // Migration is idempotent: reopening must not disturb anything.
    drop(catalog);
    let reopened = Catalog::open(&db_path).await.unwrap();
    let active = reopened
        .get("https://old-active.stream/")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(active.status, SiteStatus::Active);
}

#[tokio::test]
async fn status_aggregates_lifecycle_counts_and_confidence() {
    let catalog = Catalog::open_in_memory().await.unwrap();

    let empty = catalog.status().await.unwrap();
    assert_eq!(empty.total_sites, 0);
    assert!(empty.last_activity.is_none());

    catalog
        .upsert("https://a.stream/", &fields("A", 80))
        .await
        .unwrap();
    catalog
        .upsert("https://b.stream/", &fields("B", 60))
        .await
        .unwrap();
    catalog
        .upsert("https://c.stream/", &fields("C", 90))
        .await
        .unwrap();
    catalog.quarantine("https://c.stream/", "down").await.unwrap();

    let status = catalog.status().await.unwrap();
    assert_eq!(status.total_sites, 3);
    assert_eq!(status.active_sites, 2);
    assert_eq!(status.quarantined_sites, 1);
    assert_eq!(status.inactive_sites, 0);
    // Active rows are 80 and 60.
    assert!((status.avg_active_confidence - 70.0).abs() < 1e-9);
    // 80 and 90 clear the high-confidence bar.
    assert_eq!(status.high_confidence_sites, 2);
    assert!(status.last_activity.is_some());
}

#[tokio::test]
async fn confidence_scores_are_clamped_to_100() {
    let catalog = Catalog::open_in_memory().await.unwrap();
    catalog
        .upsert("https://a.stream/", &fields("A", 255))
        .await
        .unwrap();

    let site = catalog.get("https://a.stream/").await.unwrap().unwrap();
    assert!(site.confidence_score <= 100);
}
