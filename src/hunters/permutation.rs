//! Permutation hunter: probe the cartesian product of known base names and
//! TLDs.
//!
//! Streaming sites rotate domains constantly but keep their brand; probing
//! `streameast` against a dozen TLDs finds the current incarnation. HEAD
//! probes only, bounded concurrency, no context evidence (`prior_bonus` 0).

use futures::StreamExt;
use futures::stream;
use tracing::{debug, info};

use crate::catalog::SiteSource;
use crate::fetcher::Fetcher;

use super::Candidate;

/// Probe every base x TLD combination and keep the reachable hosts.
pub async fn hunt(
    fetcher: &Fetcher,
    bases: &[String],
    tlds: &[String],
    max_concurrent: usize,
) -> Vec<Candidate> {
    let urls: Vec<String> = bases
        .iter()
        .flat_map(|base| tlds.iter().map(move |tld| format!("https://{base}{tld}")))
        .collect();

    info!(
        "permutation hunter probing {} combinations ({} bases x {} tlds)",
        urls.len(),
        bases.len(),
        tlds.len()
    );

    let candidates: Vec<Candidate> = stream::iter(urls)
        .map(|url| async move {
            match fetcher.head(&url).await {
                Ok(status) if status < 400 => {
                    info!("permutation hunter found active domain {url} (status {status})");
                    Some(Candidate {
                        url,
                        source: SiteSource::Permutation,
                        prior_bonus: 0,
                    })
                }
                Ok(status) => {
                    debug!("permutation probe rejected {url}: status {status}");
                    None
                }
                Err(e) => {
                    debug!("permutation probe failed for {url}: {e}");
                    None
                }
            }
        })
        .buffer_unordered(max_concurrent.max(1))
        .filter_map(|candidate| async move { candidate })
        .collect()
        .await;

    info!(
        "permutation hunter found {} active domains",
        candidates.len()
    );
    candidates
}
