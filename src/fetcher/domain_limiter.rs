//! Per-host concurrency limiting with request jitter.
//!
//! Each host gets its own semaphore so a burst of candidates from one site
//! cannot look like a flood, plus a small randomized delay between requests
//! to the same host.

use dashmap::DashMap;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::error;

/// Bounds between same-host requests, in milliseconds.
const JITTER_MS: std::ops::Range<u64> = 200..600;

pub struct HostLimiter {
    host_semaphores: DashMap<String, Arc<Semaphore>>,
    max_per_host: usize,
}

impl HostLimiter {
    #[must_use]
    pub fn new(max_per_host: usize) -> Self {
        Self {
            host_semaphores: DashMap::new(),
            max_per_host: max_per_host.max(1),
        }
    }

    /// Acquire a permit for the host, sleeping a randomized delay first.
    ///
    /// The permit is released when dropped. Semaphores are created lazily on
    /// first access per host and never closed.
    pub async fn acquire(&self, host: &str) -> OwnedSemaphorePermit {
        let jitter = rand::rng().random_range(JITTER_MS);
        tokio::time::sleep(Duration::from_millis(jitter)).await;

        loop {
            let semaphore = self
                .host_semaphores
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.max_per_host)))
                .clone();

            if let Ok(permit) = semaphore.acquire_owned().await {
                return permit;
            }

            // A closed semaphore means something replaced it out from under
            // us; install a fresh one and retry.
            error!("semaphore for host '{host}' was closed unexpectedly, replacing");
            self.host_semaphores
                .insert(host.to_string(), Arc::new(Semaphore::new(self.max_per_host)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn limits_concurrency_per_host() {
        let limiter = HostLimiter::new(2);

        let first = limiter.acquire("example.com").await;
        let _second = limiter.acquire("example.com").await;

        // Third permit for the same host is not immediately available.
        let third = tokio::time::timeout(
            Duration::from_millis(900),
            limiter.acquire("example.com"),
        )
        .await;
        assert!(third.is_err());

        // A different host is unaffected.
        let other = tokio::time::timeout(
            Duration::from_millis(1500),
            limiter.acquire("other.net"),
        )
        .await;
        assert!(other.is_ok());

        drop(first);
        let reacquired = tokio::time::timeout(
            Duration::from_millis(1500),
            limiter.acquire("example.com"),
        )
        .await;
        assert!(reacquired.is_ok());
    }
}
