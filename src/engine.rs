//! The orchestrator: one Plan -> Execute -> Report cycle end to end.
//!
//! The engine wires the components together, runs the phases in order, and
//! is the only place that decides whether an error ends the cycle.
//! Component degradation (no browser, no model, no analyzer credentials) is
//! logged and absorbed; configuration errors and catalog loss are fatal.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::analyst::CognitiveAnalyst;
use crate::browser;
use crate::catalog::{Catalog, CatalogError};
use crate::classifier::SiteClassifier;
use crate::config::ScoutConfig;
use crate::crawler::{CrawlBudget, CrawlError, CrawlSummary, FocusedCrawler, SweepSummary};
use crate::fetcher::{FetchError, Fetcher};
use crate::hunters::{self, BrowserSearch, HtmlSearch, SearchEngine, SearchError, SearchHit};
use crate::planner::{MissionPlan, PlannerAgent};
use crate::reporting::{AfterActionReport, ReportError, ReportingAgent};
use crate::telemetry::CycleLog;
use crate::verifier::SiteVerifier;

/// Page and time caps for the abbreviated `test` command.
const TEST_PAGE_CAP: usize = 10;
const TEST_TIME_CAP_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Crawl(#[from] CrawlError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error("fetcher setup failed: {0}")]
    Fetcher(#[from] FetchError),
    #[error("external command `{name}` failed with {status}")]
    Command { name: String, status: ExitStatus },
    #[error("external command `{name}` could not be spawned: {source}")]
    Spawn {
        name: String,
        source: std::io::Error,
    },
}

/// Everything one cycle produced, for the operator's progress stream.
#[derive(Debug)]
pub struct CycleOutcome {
    pub plan: MissionPlan,
    pub sweep: SweepSummary,
    pub crawl: CrawlSummary,
    pub report: AfterActionReport,
    pub report_path: PathBuf,
}

pub struct Engine {
    config: Arc<ScoutConfig>,
    catalog: Catalog,
    log: CycleLog,
}

impl Engine {
    /// Open the catalog and build an engine around the validated config.
    pub async fn new(config: ScoutConfig, log: CycleLog) -> Result<Self, EngineError> {
        let catalog = Catalog::open(&config.db_path()).await?;
        Ok(Self {
            config: Arc::new(config),
            catalog,
            log,
        })
    }

    /// One full discovery cycle with the configured budget.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, EngineError> {
        self.run_cycle_with(CrawlBudget::from_config(&self.config))
            .await
    }

    /// Abbreviated cycle with hard page and time caps, for smoke testing.
    pub async fn test_cycle(&self) -> Result<CycleOutcome, EngineError> {
        info!("running abbreviated test cycle ({TEST_PAGE_CAP} pages, {TEST_TIME_CAP_SECS}s)");
        self.run_cycle_with(CrawlBudget {
            max_pages: TEST_PAGE_CAP,
            deadline: std::time::Duration::from_secs(TEST_TIME_CAP_SECS),
        })
        .await
    }

    async fn run_cycle_with(&self, budget: CrawlBudget) -> Result<CycleOutcome, EngineError> {
        self.log.clear();
        info!("discovery cycle starting");

        let reporting = ReportingAgent::new(self.catalog.clone(), self.config.reports_dir());

        // Phase 1: planning, fed by the previous cycle's report if any.
        info!("phase 1/4: cognitive planning");
        let previous = reporting.latest()?;
        let planner = PlannerAgent::new(&self.config.llm_settings);
        let plan = planner.generate(previous.as_ref()).await;

        // Shared browser for the whole cycle; its absence degrades fetches
        // to static mode and skips the search hunter.
        let browser_handle = match browser::launch_browser(&self.config.data_dir).await {
            Ok(handle) => Some(Arc::new(handle)),
            Err(e) => {
                warn!("browser unavailable, running with static fetches only: {e}");
                None
            }
        };

        let fetcher = Arc::new(Fetcher::new(&self.config, browser_handle.clone())?);
        let classifier = Arc::new(SiteClassifier::load(&self.config.model_path()));
        let verifier = Arc::new(SiteVerifier::new(Arc::clone(&fetcher)));
        let analyst = Arc::new(CognitiveAnalyst::new(&self.config.llm_settings));
        let crawler = FocusedCrawler::new(
            Arc::clone(&self.config),
            self.catalog.clone(),
            Arc::clone(&fetcher),
            classifier,
            verifier,
            analyst,
        );

        // Phase 2: re-verification sweep over quarantined and stale rows.
        info!("phase 2/4: quarantine re-verification sweep");
        let sweep = crawler.sweep_quarantined().await;

        // Phase 3: discovery and the focused crawl. Without a browser the
        // search hunter degrades to the server-rendered HTML endpoint.
        info!("phase 3/4: discovery and focused crawl");
        let search = match browser_handle.clone() {
            Some(handle) => SearchProvider::Browser(BrowserSearch::new(handle)),
            None => SearchProvider::Html(HtmlSearch::new(Arc::clone(&fetcher))),
        };
        let candidates =
            hunters::discover(&self.config, &fetcher, Some(&search), &plan.seed_queries).await;
        let crawl = crawler.run(candidates, budget).await?;

        // Phase 4: reporting; the report feeds the next cycle's planner.
        info!("phase 4/4: after-action reporting");
        let report = reporting
            .generate(&self.log.snapshot(), &crawl, plan.seed_queries.len())
            .await?;
        let report_path = reporting.persist(&report)?;

        info!(
            "discovery cycle complete: {} new sites, {} reactivated, {} quarantined",
            report.discovery_results.new_sites_found, sweep.reactivated, sweep.quarantined
        );
        match self.catalog.status().await {
            Ok(status) => info!(
                "catalog status: {} total, {} active (avg confidence {:.1}), {} quarantined, {} inactive",
                status.total_sites,
                status.active_sites,
                status.avg_active_confidence,
                status.quarantined_sites,
                status.inactive_sites
            ),
            Err(e) => warn!("could not read catalog status: {e}"),
        }

        Ok(CycleOutcome {
            plan,
            sweep,
            crawl,
            report,
            report_path,
        })
    }

    /// Run an external collaborator (training pipeline, status service) as a
    /// child process. Returns only when it exits; non-zero status is an
    /// error.
    pub async fn run_external(&self, name: &str, command: &[String]) -> Result<(), EngineError> {
        let Some((program, args)) = command.split_first() else {
            return Err(EngineError::Spawn {
                name: name.to_string(),
                source: std::io::Error::other("empty command line"),
            });
        };

        info!("running external {name} command: {program}");
        let status = tokio::process::Command::new(program)
            .args(args)
            .status()
            .await
            .map_err(|source| EngineError::Spawn {
                name: name.to_string(),
                source,
            })?;

        if !status.success() {
            return Err(EngineError::Command {
                name: name.to_string(),
                status,
            });
        }
        info!("external {name} command finished successfully");
        Ok(())
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}

/// Cycle-scoped search backend: browser-rendered when available, static
/// HTML endpoint otherwise.
enum SearchProvider {
    Browser(BrowserSearch),
    Html(HtmlSearch),
}

impl SearchEngine for SearchProvider {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        match self {
            Self::Browser(engine) => engine.search(query).await,
            Self::Html(engine) => engine.search(query).await,
        }
    }
}
