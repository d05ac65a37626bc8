//! Headless browser lifecycle.
//!
//! One browser serves a whole discovery cycle; pages are created and closed
//! per URL by the fetcher. The CDP event handler runs on its own task and is
//! aborted when the handle shuts down, otherwise it would outlive the
//! browser process.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// User agent presented by both the browser and the static HTTP client.
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";

/// A launched browser plus its event-handler task and profile directory.
pub struct BrowserHandle {
    browser: Browser,
    handler: JoinHandle<()>,
    user_data_dir: Option<PathBuf>,
}

impl BrowserHandle {
    #[must_use]
    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Stop the event handler and remove the temporary profile.
    pub async fn shutdown(mut self) {
        self.handler.abort();
        if let Err(e) = (&mut self.handler).await
            && !e.is_cancelled()
        {
            warn!("browser handler task failed during shutdown: {e}");
        }
        if let Some(dir) = self.user_data_dir.take()
            && let Err(e) = std::fs::remove_dir_all(&dir)
        {
            warn!("failed to remove browser profile {}: {e}", dir.display());
        }
    }
}

impl Drop for BrowserHandle {
    fn drop(&mut self) {
        self.handler.abort();
        if let Some(dir) = self.user_data_dir.take() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}

/// Find a Chrome/Chromium executable: `CHROMIUM_PATH` first, then well-known
/// install locations, then `which`.
pub async fn find_browser_executable() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            info!("using browser from CHROMIUM_PATH: {}", path.display());
            return Ok(path);
        }
        warn!(
            "CHROMIUM_PATH points to non-existent file: {}",
            path.display()
        );
    }

    let paths = if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        vec![
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/usr/local/bin/chromium",
            "/opt/google/chrome/chrome",
        ]
    };

    for path_str in paths {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("found browser at: {}", path.display());
            return Ok(path);
        }
    }

    for cmd in &["chromium", "chromium-browser", "google-chrome", "chrome"] {
        let output = Command::new("which").arg(cmd).output();
        if let Ok(output) = output
            && output.status.success()
        {
            let path_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path_str.is_empty() {
                let path = PathBuf::from(path_str);
                info!("found browser via 'which': {}", path.display());
                return Ok(path);
            }
        }
    }

    Err(anyhow::anyhow!("Chrome/Chromium executable not found"))
}

/// Download a managed Chromium into the data directory when no system
/// browser exists.
pub async fn download_managed_browser(cache_dir: &PathBuf) -> Result<PathBuf> {
    info!("downloading managed Chromium browser");
    std::fs::create_dir_all(cache_dir).context("failed to create browser cache directory")?;

    let fetcher = BrowserFetcher::new(
        BrowserFetcherOptions::builder()
            .with_path(cache_dir)
            .build()
            .map_err(|e| anyhow::anyhow!("browser fetcher options: {e}"))?,
    );
    let installed = fetcher
        .fetch()
        .await
        .context("failed to download Chromium")?;

    Ok(installed.executable_path)
}

/// Launch a headless browser with a unique profile directory.
///
/// Returns a handle owning the browser and its event-handler task.
pub async fn launch_browser(data_dir: &PathBuf) -> Result<BrowserHandle> {
    let chrome_path = match find_browser_executable().await {
        Ok(path) => path,
        Err(_) => download_managed_browser(&data_dir.join("chromium")).await?,
    };

    let user_data_dir = std::env::temp_dir().join(format!("streamscout_chrome_{}", std::process::id()));
    std::fs::create_dir_all(&user_data_dir).context("failed to create user data directory")?;

    let config = BrowserConfigBuilder::default()
        .request_timeout(Duration::from_secs(30))
        .window_size(1920, 1080)
        .user_data_dir(user_data_dir.clone())
        .chrome_executable(chrome_path)
        .headless_mode(HeadlessMode::default())
        .arg(format!("--user-agent={CHROME_USER_AGENT}"))
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-infobars")
        .arg("--disable-notifications")
        .arg("--disable-extensions")
        .arg("--disable-popup-blocking")
        .arg("--disable-background-networking")
        .arg("--disable-dev-shm-usage")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--no-sandbox")
        .arg("--mute-audio")
        .arg("--hide-scrollbars")
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

    let (browser, mut handler) = Browser::launch(config)
        .await
        .context("failed to launch browser")?;

    let handler_task = tokio::task::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                tracing::error!("browser handler error: {e:?}");
            }
        }
        info!("browser event handler task completed");
    });

    info!("headless browser launched");
    Ok(BrowserHandle {
        browser,
        handler: handler_task,
        user_data_dir: Some(user_data_dir),
    })
}
