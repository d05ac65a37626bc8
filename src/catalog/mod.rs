//! Durable site catalog backed by SQLite.
//!
//! A single `sites` table is the only persisted shape downstream consumers
//! (the status monitor, dashboards) may rely on. Rows are never hard-deleted:
//! the lifecycle is `active -> quarantined -> inactive`, with quarantined
//! rows eligible for reactivation by the re-verification sweep.
//!
//! Uses SQLite with WAL mode for concurrent reads during writes. Writes are
//! additionally serialized behind one async lock so an upsert is never
//! observable half-applied.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Base schema. `CREATE IF NOT EXISTS` keeps it idempotent; older databases
/// without the newer columns are upgraded by [`Catalog::migrate`].
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS sites (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    url TEXT NOT NULL UNIQUE,
    source TEXT NOT NULL,
    last_verified TEXT,
    confidence_score INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'active',
    category TEXT,
    llm_verified INTEGER,
    llm_reasoning TEXT,
    failed_attempts INTEGER NOT NULL DEFAULT 0,
    first_seen TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sites_status ON sites(status);
CREATE INDEX IF NOT EXISTS idx_sites_first_seen ON sites(first_seen);
"#;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("no catalog row for url {0}")]
    NotFound(String),
    #[error("malformed timestamp in catalog: {0}")]
    Timestamp(String),
}

/// Lifecycle state of a catalog row. `is_active` is always derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteStatus {
    Active,
    Quarantined,
    Inactive,
}

impl SiteStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Quarantined => "quarantined",
            Self::Inactive => "inactive",
        }
    }

    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl FromStr for SiteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "quarantined" => Ok(Self::Quarantined),
            "inactive" => Ok(Self::Inactive),
            other => Err(format!("unknown site status {other:?}")),
        }
    }
}

/// Origin tag recorded with every row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteSource {
    Aggregator,
    Permutation,
    SearchEngine,
    Crawl,
    GenesisSeed,
    Fallback,
}

impl SiteSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Aggregator => "aggregator",
            Self::Permutation => "permutation",
            Self::SearchEngine => "search_engine",
            Self::Crawl => "crawl",
            Self::GenesisSeed => "genesis_seed",
            Self::Fallback => "fallback",
        }
    }
}

/// One catalog row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub source: String,
    pub last_verified: Option<DateTime<Utc>>,
    pub confidence_score: u8,
    pub is_active: bool,
    pub status: SiteStatus,
    pub category: Option<String>,
    pub llm_verified: Option<bool>,
    pub llm_reasoning: Option<String>,
    pub failed_attempts: u32,
    pub first_seen: DateTime<Utc>,
}

/// Fields written by an admission upsert. `source` and `first_seen` stick to
/// the values of the original insert.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteFields {
    pub name: String,
    pub source: SiteSource,
    pub confidence_score: u8,
    pub category: Option<String>,
    pub llm_verified: Option<bool>,
    pub llm_reasoning: Option<String>,
}

/// What an upsert did, and what it replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated { prior_status: SiteStatus },
}

/// Aggregate catalog health, computed on demand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogStatus {
    pub total_sites: u64,
    pub active_sites: u64,
    pub quarantined_sites: u64,
    pub inactive_sites: u64,
    pub avg_active_confidence: f64,
    /// Rows at or above confidence 70.
    pub high_confidence_sites: u64,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct Catalog {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl Catalog {
    /// Open (or create) the catalog at the given path and bring its schema
    /// up to date.
    pub async fn open(path: &Path) -> Result<Self, CatalogError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CatalogError::Database(sqlx::Error::Io(e))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        Self::connect(options, 4).await
    }

    /// In-memory catalog for tests. One connection so the database is shared.
    pub async fn open_in_memory() -> Result<Self, CatalogError> {
        let options = SqliteConnectOptions::new().in_memory(true);
        Self::connect(options, 1).await
    }

    async fn connect(
        options: SqliteConnectOptions,
        max_connections: u32,
    ) -> Result<Self, CatalogError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let catalog = Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        };
        catalog.migrate().await?;
        Ok(catalog)
    }

    /// Idempotent schema migration.
    ///
    /// Creates the table when missing, and upgrades pre-`status` databases in
    /// place: adds the column, then backfills `status` from `is_active`.
    async fn migrate(&self) -> Result<(), CatalogError> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;

        let columns: Vec<String> = sqlx::query("PRAGMA table_info(sites)")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| row.get::<String, _>("name"))
            .collect();

        if !columns.iter().any(|c| c == "status") {
            info!("catalog migration: adding status column");
            sqlx::query("ALTER TABLE sites ADD COLUMN status TEXT NOT NULL DEFAULT 'active'")
                .execute(&self.pool)
                .await?;
            sqlx::query("UPDATE sites SET status = 'active' WHERE is_active = 1")
                .execute(&self.pool)
                .await?;
            sqlx::query("UPDATE sites SET status = 'inactive' WHERE is_active = 0")
                .execute(&self.pool)
                .await?;
        }

        for (column, ddl) in [
            ("category", "ALTER TABLE sites ADD COLUMN category TEXT"),
            ("llm_verified", "ALTER TABLE sites ADD COLUMN llm_verified INTEGER"),
            ("llm_reasoning", "ALTER TABLE sites ADD COLUMN llm_reasoning TEXT"),
            (
                "failed_attempts",
                "ALTER TABLE sites ADD COLUMN failed_attempts INTEGER NOT NULL DEFAULT 0",
            ),
        ] {
            if !columns.iter().any(|c| c == column) {
                info!("catalog migration: adding {column} column");
                sqlx::query(ddl).execute(&self.pool).await?;
            }
        }

        debug!("catalog schema verified");
        Ok(())
    }

    /// Insert a new row or update the existing row for this URL.
    ///
    /// Admission always lands the row in `active`. Returns whether the row
    /// was inserted and, on update, the status it had before.
    pub async fn upsert(
        &self,
        url: &str,
        fields: &SiteFields,
    ) -> Result<UpsertOutcome, CatalogError> {
        let _guard = self.write_lock.lock().await;

        let prior: Option<String> = sqlx::query("SELECT status FROM sites WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.get::<String, _>("status"));

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO sites
                (name, url, source, last_verified, confidence_score, is_active, status,
                 category, llm_verified, llm_reasoning, failed_attempts, first_seen)
            VALUES (?, ?, ?, ?, ?, 1, 'active', ?, ?, ?, 0, ?)
            ON CONFLICT(url) DO UPDATE SET
                name = excluded.name,
                last_verified = excluded.last_verified,
                confidence_score = excluded.confidence_score,
                is_active = 1,
                status = 'active',
                category = excluded.category,
                llm_verified = excluded.llm_verified,
                llm_reasoning = excluded.llm_reasoning,
                failed_attempts = 0
            "#,
        )
        .bind(&fields.name)
        .bind(url)
        .bind(fields.source.as_str())
        .bind(&now)
        .bind(i64::from(fields.confidence_score.min(100)))
        .bind(&fields.category)
        .bind(fields.llm_verified.map(i64::from))
        .bind(&fields.llm_reasoning)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        match prior {
            None => Ok(UpsertOutcome::Inserted),
            Some(status) => Ok(UpsertOutcome::Updated {
                prior_status: status.parse().unwrap_or(SiteStatus::Inactive),
            }),
        }
    }

    pub async fn get(&self, url: &str) -> Result<Option<Site>, CatalogError> {
        let row = sqlx::query("SELECT * FROM sites WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(site_from_row).transpose()
    }

    pub async fn list_active(&self) -> Result<Vec<Site>, CatalogError> {
        self.list_by_status(SiteStatus::Active).await
    }

    pub async fn list_by_status(&self, status: SiteStatus) -> Result<Vec<Site>, CatalogError> {
        let rows = sqlx::query("SELECT * FROM sites WHERE status = ? ORDER BY id")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(site_from_row).collect()
    }

    /// Active rows whose last verification is older than the cutoff; these
    /// are due for the re-verification sweep.
    pub async fn list_active_stale(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Site>, CatalogError> {
        let rows = sqlx::query(
            "SELECT * FROM sites
             WHERE status = 'active' AND (last_verified IS NULL OR last_verified < ?)
             ORDER BY id",
        )
        .bind(cutoff.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(site_from_row).collect()
    }

    /// Move an active row into quarantine after a failed re-verification.
    pub async fn quarantine(&self, url: &str, reason: &str) -> Result<(), CatalogError> {
        let _guard = self.write_lock.lock().await;

        let result = sqlx::query(
            "UPDATE sites
             SET status = 'quarantined', is_active = 0, last_verified = ?,
                 failed_attempts = failed_attempts + 1
             WHERE url = ? AND status = 'active'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(url)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(url.to_string()));
        }
        warn!("site quarantined: {url} ({reason})");
        Ok(())
    }

    /// Return a quarantined row to active after a passing re-verification.
    pub async fn reactivate(&self, url: &str, confidence: u8) -> Result<(), CatalogError> {
        let _guard = self.write_lock.lock().await;

        let result = sqlx::query(
            "UPDATE sites
             SET status = 'active', is_active = 1, confidence_score = ?,
                 last_verified = ?, failed_attempts = 0
             WHERE url = ? AND status = 'quarantined'",
        )
        .bind(i64::from(confidence.min(100)))
        .bind(Utc::now().to_rfc3339())
        .bind(url)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(url.to_string()));
        }
        info!("site reactivated from quarantine: {url}");
        Ok(())
    }

    /// Record one more failed re-verification for a quarantined row and
    /// return the new consecutive-failure count.
    pub async fn record_failed_recheck(&self, url: &str) -> Result<u32, CatalogError> {
        let _guard = self.write_lock.lock().await;

        let result = sqlx::query(
            "UPDATE sites
             SET failed_attempts = failed_attempts + 1, last_verified = ?
             WHERE url = ? AND status = 'quarantined'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(url)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(url.to_string()));
        }

        let count: i64 = sqlx::query("SELECT failed_attempts FROM sites WHERE url = ?")
            .bind(url)
            .fetch_one(&self.pool)
            .await?
            .get("failed_attempts");
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    /// Refresh an active row after a passing re-verification. Does not touch
    /// enrichment fields.
    pub async fn refresh_verification(
        &self,
        url: &str,
        confidence: u8,
    ) -> Result<(), CatalogError> {
        let _guard = self.write_lock.lock().await;

        let result = sqlx::query(
            "UPDATE sites
             SET confidence_score = ?, last_verified = ?, failed_attempts = 0
             WHERE url = ? AND status = 'active'",
        )
        .bind(i64::from(confidence.min(100)))
        .bind(Utc::now().to_rfc3339())
        .bind(url)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(url.to_string()));
        }
        Ok(())
    }

    /// Terminal transition after the failure threshold is exhausted.
    pub async fn deactivate(&self, url: &str) -> Result<(), CatalogError> {
        let _guard = self.write_lock.lock().await;

        let result = sqlx::query(
            "UPDATE sites
             SET status = 'inactive', is_active = 0, last_verified = ?
             WHERE url = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(url)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(url.to_string()));
        }
        warn!("site deactivated: {url}");
        Ok(())
    }

    /// Rows first inserted at or after the given instant.
    pub async fn count_added_since(&self, since: DateTime<Utc>) -> Result<u64, CatalogError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM sites WHERE first_seen >= ?")
            .bind(since.to_rfc3339())
            .fetch_one(&self.pool)
            .await?
            .get("n");
        Ok(u64::try_from(count).unwrap_or(0))
    }

    pub async fn count_by_status(&self, status: SiteStatus) -> Result<u64, CatalogError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM sites WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?
            .get("n");
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Aggregate health metrics for operator dashboards and the engine's
    /// progress stream.
    pub async fn status(&self) -> Result<CatalogStatus, CatalogError> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0) AS active,
                COALESCE(SUM(CASE WHEN status = 'quarantined' THEN 1 ELSE 0 END), 0) AS quarantined,
                COALESCE(SUM(CASE WHEN status = 'inactive' THEN 1 ELSE 0 END), 0) AS inactive,
                COALESCE(AVG(CASE WHEN status = 'active' THEN confidence_score END), 0.0) AS avg_confidence,
                COALESCE(SUM(CASE WHEN confidence_score >= 70 THEN 1 ELSE 0 END), 0) AS high_confidence,
                MAX(last_verified) AS last_activity
             FROM sites",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(CatalogStatus {
            total_sites: u64::try_from(row.get::<i64, _>("total")).unwrap_or(0),
            active_sites: u64::try_from(row.get::<i64, _>("active")).unwrap_or(0),
            quarantined_sites: u64::try_from(row.get::<i64, _>("quarantined")).unwrap_or(0),
            inactive_sites: u64::try_from(row.get::<i64, _>("inactive")).unwrap_or(0),
            avg_active_confidence: row.get::<f64, _>("avg_confidence"),
            high_confidence_sites: u64::try_from(row.get::<i64, _>("high_confidence"))
                .unwrap_or(0),
            last_activity: parse_timestamp(row.get::<Option<String>, _>("last_activity"))?,
        })
    }

    /// Row counts per origin tag, most common first.
    pub async fn source_breakdown(&self) -> Result<Vec<(String, u64)>, CatalogError> {
        let rows = sqlx::query(
            "SELECT source, COUNT(*) AS n FROM sites GROUP BY source ORDER BY n DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let source: String = row.get("source");
                let count: i64 = row.get("n");
                (source, u64::try_from(count).unwrap_or(0))
            })
            .collect())
    }
}

fn site_from_row(row: &SqliteRow) -> Result<Site, CatalogError> {
    let status_raw: String = row.get("status");
    let status = status_raw
        .parse::<SiteStatus>()
        .map_err(|_| CatalogError::Timestamp(format!("bad status {status_raw:?}")))?;

    let confidence: i64 = row.get("confidence_score");
    let failed: i64 = row.get("failed_attempts");

    Ok(Site {
        id: row.get("id"),
        name: row.get("name"),
        url: row.get("url"),
        source: row.get("source"),
        last_verified: parse_timestamp(row.get::<Option<String>, _>("last_verified"))?,
        confidence_score: u8::try_from(confidence.clamp(0, 100)).unwrap_or(0),
        is_active: row.get::<i64, _>("is_active") != 0,
        status,
        category: row.get("category"),
        llm_verified: row
            .get::<Option<i64>, _>("llm_verified")
            .map(|value| value != 0),
        llm_reasoning: row.get("llm_reasoning"),
        failed_attempts: u32::try_from(failed.max(0)).unwrap_or(0),
        first_seen: parse_timestamp(Some(row.get::<String, _>("first_seen")))?
            .unwrap_or_else(Utc::now),
    })
}

fn parse_timestamp(raw: Option<String>) -> Result<Option<DateTime<Utc>>, CatalogError> {
    match raw {
        None => Ok(None),
        Some(text) => DateTime::parse_from_rfc3339(&text)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| CatalogError::Timestamp(text)),
    }
}
