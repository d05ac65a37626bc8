//! The focused crawler: the central state machine of a discovery cycle.
//!
//! A worker pool drains a priority frontier, running every page through the
//! triage funnel — relevance-gated link following, statistical
//! classification, technical verification, cognitive analysis — and upserts
//! admitted sites into the catalog. Admitted URLs may re-enter the frontier
//! once per cycle (autonomous feedback).
//!
//! Failure semantics: per-URL failures are isolated; degraded components
//! (no model, no analyzer, no browser) reduce capability but never abort;
//! only catalog loss beyond the pending-write buffer is fatal to the cycle.

pub mod frontier;

pub use frontier::{Frontier, FrontierEntry};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::StreamExt;
use futures::stream::{self, FuturesUnordered};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, warn};

use crate::analyst::CognitiveAnalyst;
use crate::catalog::{Catalog, Site, SiteFields, SiteSource, SiteStatus};
use crate::classifier::SiteClassifier;
use crate::config::ScoutConfig;
use crate::fetcher::Fetcher;
use crate::hunters::Candidate;
use crate::relevance;
use crate::urlnorm;
use crate::verifier::SiteVerifier;
use crate::{features, verifier};

static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("selector"));

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("catalog unavailable: pending write buffer exceeded {0} entries")]
    CatalogUnavailable(usize),
}

/// Page and wall-clock caps for one crawl.
#[derive(Debug, Clone, Copy)]
pub struct CrawlBudget {
    pub max_pages: usize,
    pub deadline: Duration,
}

impl CrawlBudget {
    #[must_use]
    pub fn from_config(config: &ScoutConfig) -> Self {
        Self {
            max_pages: config.crawler_settings.page_budget,
            deadline: Duration::from_secs(config.crawler_settings.cycle_timeout_secs),
        }
    }
}

/// Counters shared across workers.
#[derive(Debug, Default)]
struct CrawlStats {
    pages_crawled: AtomicUsize,
    links_evaluated: AtomicUsize,
    classifier_positive: AtomicUsize,
    classifier_negative: AtomicUsize,
    verifications_attempted: AtomicUsize,
    verifications_passed: AtomicUsize,
    sites_admitted: AtomicUsize,
    feedback_seeds: AtomicUsize,
}

/// What one crawl did, for the engine's progress stream and the report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub pages_crawled: usize,
    pub links_evaluated: usize,
    pub classifier_positive: usize,
    pub classifier_negative: usize,
    pub verifications_attempted: usize,
    pub verifications_passed: usize,
    pub sites_admitted: usize,
    pub feedback_seeds: usize,
    pub duration: Duration,
}

/// Outcome of the re-verification sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub examined: usize,
    pub reactivated: usize,
    pub quarantined: usize,
    pub deactivated: usize,
}

struct PendingWrite {
    url: String,
    fields: SiteFields,
}

/// State shared by all workers of one crawl.
struct SharedCrawl {
    frontier: Mutex<Frontier>,
    seen: dashmap::DashSet<String>,
    reseeded: dashmap::DashSet<String>,
    stop: AtomicBool,
    stats: CrawlStats,
    pending: Mutex<Vec<PendingWrite>>,
}

impl SharedCrawl {
    fn new() -> Self {
        Self {
            frontier: Mutex::new(Frontier::new()),
            seen: dashmap::DashSet::new(),
            reseeded: dashmap::DashSet::new(),
            stop: AtomicBool::new(false),
            stats: CrawlStats::default(),
            pending: Mutex::new(Vec::new()),
        }
    }
}

#[derive(Clone)]
pub struct FocusedCrawler {
    config: Arc<ScoutConfig>,
    catalog: Catalog,
    fetcher: Arc<Fetcher>,
    classifier: Arc<SiteClassifier>,
    verifier: Arc<SiteVerifier>,
    analyst: Arc<CognitiveAnalyst>,
}

impl FocusedCrawler {
    #[must_use]
    pub fn new(
        config: Arc<ScoutConfig>,
        catalog: Catalog,
        fetcher: Arc<Fetcher>,
        classifier: Arc<SiteClassifier>,
        verifier: Arc<SiteVerifier>,
        analyst: Arc<CognitiveAnalyst>,
    ) -> Self {
        Self {
            config,
            catalog,
            fetcher,
            classifier,
            verifier,
            analyst,
        }
    }

    /// Run one crawl over the given candidates.
    ///
    /// Terminates when the frontier drains, the page budget is spent, or the
    /// wall-clock deadline passes — whichever comes first. Workers check the
    /// stop signal between stages, so cancellation is cooperative and
    /// in-flight pages drain within their per-stage timeouts.
    pub async fn run(
        &self,
        candidates: Vec<Candidate>,
        budget: CrawlBudget,
    ) -> Result<CrawlSummary, CrawlError> {
        let started = Instant::now();
        let deadline = started + budget.deadline;
        let shared = Arc::new(SharedCrawl::new());

        {
            let mut frontier = shared.frontier.lock().await;
            for candidate in candidates {
                if shared.seen.insert(candidate.url.clone()) {
                    frontier.push(FrontierEntry {
                        score: 0.75 + f64::from(candidate.prior_bonus) / 100.0,
                        url: candidate.url,
                        depth: 0,
                        source: candidate.source,
                        prior_bonus: candidate.prior_bonus,
                    });
                }
            }
            info!("crawl frontier seeded with {} candidates", frontier.len());
        }

        let concurrency = self.config.crawler_settings.max_concurrent_pages.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut active = FuturesUnordered::new();
        let mut fatal: Option<CrawlError> = None;

        loop {
            if Instant::now() >= deadline && !shared.stop.load(Ordering::Relaxed) {
                info!("crawl deadline reached, draining in-flight pages");
                shared.stop.store(true, Ordering::Relaxed);
            }
            if shared.stats.pages_crawled.load(Ordering::Relaxed) >= budget.max_pages
                && !shared.stop.load(Ordering::Relaxed)
            {
                info!("crawl page budget reached, draining in-flight pages");
                shared.stop.store(true, Ordering::Relaxed);
            }

            while active.len() < concurrency && !shared.stop.load(Ordering::Relaxed) {
                let Some(entry) = shared.frontier.lock().await.pop() else {
                    break;
                };
                if entry.depth > self.config.crawler_settings.max_crawl_depth {
                    continue;
                }

                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    error!("crawl semaphore closed unexpectedly");
                    break;
                };

                let crawler = self.clone();
                let shared = Arc::clone(&shared);
                active.push(tokio::spawn(async move {
                    let _permit = permit;
                    crawler.process_page(entry, &shared).await
                }));
            }

            match active.next().await {
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(e))) => {
                    error!("fatal crawl error: {e}");
                    shared.stop.store(true, Ordering::Relaxed);
                    fatal.get_or_insert(e);
                }
                Some(Err(e)) => {
                    error!("crawl worker panicked: {e}");
                }
                None => {
                    let frontier_empty = shared.frontier.lock().await.is_empty();
                    if frontier_empty || shared.stop.load(Ordering::Relaxed) {
                        break;
                    }
                }
            }
        }

        if let Some(e) = fatal {
            return Err(e);
        }

        let stats = &shared.stats;
        let summary = CrawlSummary {
            pages_crawled: stats.pages_crawled.load(Ordering::Relaxed),
            links_evaluated: stats.links_evaluated.load(Ordering::Relaxed),
            classifier_positive: stats.classifier_positive.load(Ordering::Relaxed),
            classifier_negative: stats.classifier_negative.load(Ordering::Relaxed),
            verifications_attempted: stats.verifications_attempted.load(Ordering::Relaxed),
            verifications_passed: stats.verifications_passed.load(Ordering::Relaxed),
            sites_admitted: stats.sites_admitted.load(Ordering::Relaxed),
            feedback_seeds: stats.feedback_seeds.load(Ordering::Relaxed),
            duration: started.elapsed(),
        };
        info!(
            "crawl complete: {} pages, {} links evaluated, {} admitted in {:?}",
            summary.pages_crawled, summary.links_evaluated, summary.sites_admitted,
            summary.duration
        );
        Ok(summary)
    }

    /// One URL through the funnel. Per-URL failures never propagate; only a
    /// catalog buffer overflow returns an error.
    async fn process_page(
        &self,
        entry: FrontierEntry,
        shared: &SharedCrawl,
    ) -> Result<(), CrawlError> {
        if shared.stop.load(Ordering::Relaxed) {
            return Ok(());
        }

        info!(
            "New page being crawled: {} (depth {}, source {})",
            entry.url,
            entry.depth,
            entry.source.as_str()
        );

        let fetched = match self.fetcher.fetch_page(&entry.url).await {
            Ok(fetched) => fetched,
            Err(e) => {
                debug!("fetch failed for {}: {e}", entry.url);
                return Ok(());
            }
        };
        shared.stats.pages_crawled.fetch_add(1, Ordering::Relaxed);

        let settings = &self.config.crawler_settings;
        let feature_vector = features::extract(&fetched.html, &entry.url);
        let classification = self.classifier.classify(&feature_vector);

        if classification.available {
            let verdict_tag = if classification.is_positive {
                "POSITIVE"
            } else {
                "NEGATIVE"
            };
            info!(
                "The classifier's verdict: {} -> probability={:.3} ({verdict_tag})",
                entry.url, classification.probability
            );
            if classification.is_positive {
                shared.stats.classifier_positive.fetch_add(1, Ordering::Relaxed);
            } else {
                shared.stats.classifier_negative.fetch_add(1, Ordering::Relaxed);
            }
        } else {
            warn!(
                "classifier unavailable for {} ({}), treating as gate failure",
                entry.url,
                classification.error.as_deref().unwrap_or("unknown")
            );
        }

        if classification.available
            && classification.probability >= settings.ai_confidence_threshold
            && !shared.stop.load(Ordering::Relaxed)
        {
            self.verify_and_admit(&entry, &fetched.html, shared).await?;
        }

        // Link extraction happens on every page regardless of the funnel
        // outcome.
        if entry.depth < settings.max_crawl_depth && !shared.stop.load(Ordering::Relaxed) {
            self.grow_frontier(&entry, &fetched.html, &fetched.final_url, shared)
                .await;
        }

        Ok(())
    }

    async fn verify_and_admit(
        &self,
        entry: &FrontierEntry,
        html: &str,
        shared: &SharedCrawl,
    ) -> Result<(), CrawlError> {
        let settings = &self.config.crawler_settings;
        let threshold = self
            .config
            .discovery_settings
            .verification_confidence_threshold;

        shared
            .stats
            .verifications_attempted
            .fetch_add(1, Ordering::Relaxed);

        let verification = self.verifier.verify_page(&entry.url, html).await;
        info!(
            "V2 verification for {}: composite={}",
            entry.url, verification.composite
        );

        if verification.composite < threshold {
            info!(
                "{} rejected by verifier (composite {} below threshold {threshold})",
                entry.url, verification.composite
            );
            return Ok(());
        }
        shared
            .stats
            .verifications_passed
            .fetch_add(1, Ordering::Relaxed);

        let page_text = extract_text(html);
        let verdict = self.analyst.analyze(&page_text, &entry.url).await;

        if settings.strict_cognitive_gate
            && verdict.is_authoritative()
            && !verdict.is_sports_streaming_site
        {
            info!(
                "{} rejected by cognitive gate (strict mode): {}",
                entry.url, verdict.full_reasoning_process.conclusion
            );
            return Ok(());
        }

        let name = if verdict.is_authoritative() && verdict.service_name != "Unknown" {
            verdict.service_name.clone()
        } else {
            urlnorm::site_name(&entry.url)
        };

        let fields = SiteFields {
            name,
            source: entry.source,
            confidence_score: verification.composite,
            category: verdict.category(),
            llm_verified: verdict
                .is_authoritative()
                .then_some(verdict.is_sports_streaming_site),
            llm_reasoning: verdict
                .is_authoritative()
                .then(|| verdict.full_reasoning_process.conclusion.clone()),
        };

        self.store_admission(shared, &entry.url, fields).await?;
        shared.stats.sites_admitted.fetch_add(1, Ordering::Relaxed);
        info!(
            "Site {} successfully written to database (confidence {})",
            entry.url, verification.composite
        );

        if settings.enable_autonomous_feedback && shared.reseeded.insert(entry.url.clone()) {
            let mut frontier = shared.frontier.lock().await;
            frontier.push(FrontierEntry {
                url: entry.url.clone(),
                depth: 0,
                score: 1.0,
                source: entry.source,
                prior_bonus: entry.prior_bonus,
            });
            shared.stats.feedback_seeds.fetch_add(1, Ordering::Relaxed);
            info!("autonomous feedback: re-seeded verified site {}", entry.url);
        }

        Ok(())
    }

    /// Buffered catalog write. Earlier failed writes are retried first; a
    /// buffer past the high-water mark is the one fatal condition in the
    /// crawl.
    async fn store_admission(
        &self,
        shared: &SharedCrawl,
        url: &str,
        fields: SiteFields,
    ) -> Result<(), CrawlError> {
        let mut pending = shared.pending.lock().await;

        if !pending.is_empty() {
            info!("retrying {} buffered catalog writes", pending.len());
            let mut still_pending = Vec::new();
            for write in pending.drain(..) {
                if let Err(e) = self.catalog.upsert(&write.url, &write.fields).await {
                    debug!("buffered write for {} still failing: {e}", write.url);
                    still_pending.push(write);
                }
            }
            *pending = still_pending;
        }

        if let Err(e) = self.catalog.upsert(url, &fields).await {
            warn!("catalog write failed for {url}, buffering: {e}");
            pending.push(PendingWrite {
                url: url.to_string(),
                fields,
            });

            let high_water = self.config.crawler_settings.pending_write_high_water;
            if pending.len() > high_water {
                return Err(CrawlError::CatalogUnavailable(pending.len()));
            }
        }
        Ok(())
    }

    async fn grow_frontier(
        &self,
        entry: &FrontierEntry,
        html: &str,
        base_url: &str,
        shared: &SharedCrawl,
    ) {
        let settings = &self.config.crawler_settings;
        let scored = extract_scored_links(html, base_url, settings.relevancy_threshold);
        shared
            .stats
            .links_evaluated
            .fetch_add(scored.evaluated, Ordering::Relaxed);

        let mut frontier = shared.frontier.lock().await;
        for (url, score) in scored.links.into_iter().take(settings.max_links_per_page) {
            if shared.seen.insert(url.clone()) {
                debug!("following link {url} (relevancy {score:.2})");
                frontier.push(FrontierEntry {
                    url,
                    depth: entry.depth + 1,
                    score,
                    source: SiteSource::Crawl,
                    prior_bonus: 0,
                });
            }
        }
    }

    /// Re-verification sweep: quarantined rows plus stale active rows go
    /// back through probe, verification and the status lifecycle.
    pub async fn sweep_quarantined(&self) -> SweepSummary {
        let threshold = self
            .config
            .discovery_settings
            .verification_confidence_threshold;
        let max_failures = self.config.maintenance_settings.max_failed_attempts;
        let cutoff =
            Utc::now() - chrono::Duration::hours(self.config.maintenance_settings.deactivation_hours);

        let quarantined = match self.catalog.list_by_status(SiteStatus::Quarantined).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("sweep could not list quarantined rows: {e}");
                Vec::new()
            }
        };
        let stale_active = match self.catalog.list_active_stale(cutoff).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("sweep could not list stale active rows: {e}");
                Vec::new()
            }
        };

        if quarantined.is_empty() && stale_active.is_empty() {
            info!("re-verification sweep: nothing to examine");
            return SweepSummary::default();
        }
        info!(
            "re-verification sweep: {} quarantined, {} stale active rows",
            quarantined.len(),
            stale_active.len()
        );

        let rows: Vec<Site> = quarantined.into_iter().chain(stale_active).collect();
        let mut summary = SweepSummary {
            examined: rows.len(),
            ..SweepSummary::default()
        };

        let concurrency = self
            .config
            .discovery_settings
            .max_concurrent_verifications
            .max(1);
        let verifications: Vec<(Site, verifier::Verification)> = stream::iter(rows)
            .map(|site| async move {
                let verification = self.verifier.verify_url(&site.url).await;
                info!(
                    "V2 verification for {}: composite={}",
                    site.url, verification.composite
                );
                (site, verification)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for (site, verification) in verifications {
            let passed = verification.composite >= threshold;
            let outcome = match site.status {
                SiteStatus::Quarantined if passed => self
                    .catalog
                    .reactivate(&site.url, verification.composite)
                    .await
                    .map(|()| summary.reactivated += 1),
                SiteStatus::Quarantined => {
                    match self.catalog.record_failed_recheck(&site.url).await {
                        Ok(failures) if failures >= max_failures => {
                            summary.deactivated += 1;
                            self.catalog.deactivate(&site.url).await
                        }
                        Ok(_) => Ok(()),
                        Err(e) => Err(e),
                    }
                }
                SiteStatus::Active if passed => self
                    .catalog
                    .refresh_verification(&site.url, verification.composite)
                    .await,
                SiteStatus::Active => self
                    .catalog
                    .quarantine(&site.url, "failed re-verification")
                    .await
                    .map(|()| summary.quarantined += 1),
                SiteStatus::Inactive => Ok(()),
            };

            if let Err(e) = outcome {
                warn!("sweep transition failed for {}: {e}", site.url);
            }
        }

        info!(
            "sweep complete: {} examined, {} reactivated, {} quarantined, {} deactivated",
            summary.examined, summary.reactivated, summary.quarantined, summary.deactivated
        );
        summary
    }
}

struct ScoredLinks {
    evaluated: usize,
    /// (canonical url, relevance score), best first.
    links: Vec<(String, f64)>,
}

/// Pull anchors out of a page, score them, and keep the ones above the
/// relevance threshold, best first.
fn extract_scored_links(html: &str, base_url: &str, threshold: f64) -> ScoredLinks {
    let document = Html::parse_document(html);
    let base = url::Url::parse(base_url).ok();

    let mut evaluated = 0;
    let mut links = Vec::new();

    for anchor in document.select(&ANCHOR_SELECTOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            continue;
        }

        let absolute = if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else if let Some(base) = &base {
            match base.join(href) {
                Ok(joined) => joined.to_string(),
                Err(_) => continue,
            }
        } else {
            continue;
        };

        let Ok(canonical) = urlnorm::canonicalize(&absolute) else {
            continue;
        };

        let anchor_text = anchor.text().collect::<String>();
        let score = relevance::score(&anchor_text, &canonical);
        evaluated += 1;

        if score >= threshold {
            links.push((canonical, score));
        }
    }

    links.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let mut kept = std::collections::HashSet::new();
    links.retain(|(url, _)| kept.insert(url.clone()));

    ScoredLinks { evaluated, links }
}

/// Visible page text for the cognitive analyzer.
fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    document
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
