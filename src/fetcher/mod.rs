//! Page retrieval: static HTTP and rendered browser fetches.
//!
//! Two modes share one policy layer: a global concurrency bound, per-host
//! limits with jitter, and per-stage timeouts. Rendered fetches fall back to
//! static fetches when the browser is unavailable or fails; callers see
//! which mode produced the content via [`FetchedPage::rendered`].

pub mod domain_limiter;

pub use domain_limiter::HostLimiter;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chromiumoxide::page::Page;
use thiserror::Error;
use tracing::{debug, warn};

use crate::browser::{BrowserHandle, CHROME_USER_AGENT};
use crate::config::ScoutConfig;
use crate::urlnorm;

/// Quiet period after DOM-content-loaded, giving client-side players time to
/// attach before the HTML snapshot is taken.
const RENDER_QUIET_PERIOD: Duration = Duration::from_secs(2);

/// Per-stage budget for browser navigation and capture.
const RENDER_STAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Attempts for a static GET before the error surfaces. Only transient
/// failures (timeouts, connection errors) are retried; HTTP error statuses
/// are not.
const STATIC_FETCH_ATTEMPTS: u32 = 2;
const STATIC_RETRY_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("http status {0}")]
    Status(u16),
    #[error("browser error: {0}")]
    Browser(String),
    #[error("invalid fetch url: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Result of a static HTTP GET.
#[derive(Debug, Clone)]
pub struct StaticFetch {
    pub final_url: String,
    pub status: u16,
    pub body: String,
    pub elapsed: Duration,
}

/// A retrieved page, rendered when the browser was available.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub requested_url: String,
    pub final_url: String,
    pub html: String,
    pub rendered: bool,
    pub elapsed: Duration,
}

pub struct Fetcher {
    http: reqwest::Client,
    browser: Option<Arc<BrowserHandle>>,
    global: Arc<tokio::sync::Semaphore>,
    hosts: HostLimiter,
}

impl Fetcher {
    /// Build a fetcher from configuration. `browser` may be `None`; every
    /// rendered fetch then degrades to a static one.
    pub fn new(
        config: &ScoutConfig,
        browser: Option<Arc<BrowserHandle>>,
    ) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(CHROME_USER_AGENT)
            .timeout(Duration::from_secs(config.discovery_settings.request_timeout))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            http,
            browser,
            global: Arc::new(tokio::sync::Semaphore::new(
                config.crawler_settings.max_concurrent_pages.max(1),
            )),
            hosts: HostLimiter::new(config.crawler_settings.max_concurrent_per_host),
        })
    }

    #[must_use]
    pub fn has_browser(&self) -> bool {
        self.browser.is_some()
    }

    /// Static GET with redirects. 4xx/5xx surfaces as [`FetchError::Status`].
    pub async fn get(&self, url: &str) -> Result<StaticFetch, FetchError> {
        let _permits = self.acquire_permits(url).await?;
        self.get_unlimited(url).await
    }

    /// HEAD probe returning only the final status code.
    pub async fn head(&self, url: &str) -> Result<u16, FetchError> {
        let _permits = self.acquire_permits(url).await?;
        let response = self.http.head(url).send().await?;
        Ok(response.status().as_u16())
    }

    /// Retrieve a page: rendered when a browser is available, static
    /// otherwise. Rendering failures degrade to static with a warning.
    pub async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let _permits = self.acquire_permits(url).await?;

        if let Some(handle) = &self.browser {
            match self.render(handle, url).await {
                Ok(page) => return Ok(page),
                Err(e) => {
                    warn!("rendered fetch failed for {url}, falling back to static: {e}");
                }
            }
        }

        let start = Instant::now();
        let fetched = self.get_unlimited(url).await?;
        Ok(FetchedPage {
            requested_url: url.to_string(),
            final_url: fetched.final_url,
            html: fetched.body,
            rendered: false,
            elapsed: start.elapsed(),
        })
    }

    async fn get_unlimited(&self, url: &str) -> Result<StaticFetch, FetchError> {
        let mut attempt = 1;
        loop {
            match self.get_once(url).await {
                Ok(fetched) => return Ok(fetched),
                Err(e @ (FetchError::Timeout | FetchError::Network(_)))
                    if attempt < STATIC_FETCH_ATTEMPTS =>
                {
                    debug!("transient fetch failure for {url} (attempt {attempt}): {e}");
                    tokio::time::sleep(STATIC_RETRY_DELAY).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once(&self, url: &str) -> Result<StaticFetch, FetchError> {
        let start = Instant::now();
        let response = self.http.get(url).send().await?;
        let status = response.status();
        let final_url = response.url().to_string();

        if status.is_client_error() || status.is_server_error() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        Ok(StaticFetch {
            final_url,
            status: status.as_u16(),
            body,
            elapsed: start.elapsed(),
        })
    }

    /// Render through a fresh page. The page is closed on every exit path.
    async fn render(
        &self,
        handle: &BrowserHandle,
        url: &str,
    ) -> Result<FetchedPage, FetchError> {
        let page = handle
            .browser()
            .new_page("about:blank")
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?;

        let result = self.render_on_page(&page, url).await;

        if let Err(e) = page.close().await {
            debug!("failed to close page for {url}: {e}");
        }
        result
    }

    async fn render_on_page(&self, page: &Page, url: &str) -> Result<FetchedPage, FetchError> {
        let start = Instant::now();

        stage_timeout(page.goto(url), "navigation").await?;
        stage_timeout(page.wait_for_navigation(), "page load").await?;
        tokio::time::sleep(RENDER_QUIET_PERIOD).await;

        let html = stage_timeout(page.content(), "content capture").await?;
        let final_url = match page.url().await {
            Ok(Some(current)) => current,
            _ => url.to_string(),
        };

        Ok(FetchedPage {
            requested_url: url.to_string(),
            final_url,
            html,
            rendered: true,
            elapsed: start.elapsed(),
        })
    }

    async fn acquire_permits(
        &self,
        url: &str,
    ) -> Result<
        (
            tokio::sync::OwnedSemaphorePermit,
            tokio::sync::OwnedSemaphorePermit,
        ),
        FetchError,
    > {
        let host = urlnorm::host_of(url).ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?;

        let global = self
            .global
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| FetchError::Network("fetch semaphore closed".to_string()))?;
        let host_permit = self.hosts.acquire(&host).await;
        Ok((global, host_permit))
    }
}

async fn stage_timeout<T, E: std::fmt::Display>(
    operation: impl std::future::Future<Output = Result<T, E>>,
    stage: &str,
) -> Result<T, FetchError> {
    match tokio::time::timeout(RENDER_STAGE_TIMEOUT, operation).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(FetchError::Browser(format!("{stage} failed: {e}"))),
        Err(_) => Err(FetchError::Timeout),
    }
}
