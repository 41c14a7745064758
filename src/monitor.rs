//! Scrape cycles and the periodic refresh loop.
//!
//! A cycle is one gateway run merged into the store. Cycles never overlap:
//! the periodic loop and manual triggers both go through the same lock, so a
//! trigger issued mid-cycle waits for the running cycle to finish and then
//! runs its own.

use crate::gateway::Gateway;
use crate::models::ScrapeResponse;
use crate::store::{IncidentStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

/// Gateway + store, shared by the refresh loop and the read API.
#[derive(Debug)]
pub struct Monitor {
    gateway: Gateway,
    store: RwLock<IncidentStore>,
    cycle_lock: Mutex<()>,
}

impl Monitor {
    pub fn new(gateway: Gateway, store: IncidentStore) -> Self {
        Self {
            gateway,
            store: RwLock::new(store),
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn store(&self) -> &RwLock<IncidentStore> {
        &self.store
    }

    /// Run one cycle: scrape all enabled sources, merge, mark refreshed.
    ///
    /// # Returns
    ///
    /// The number of incidents added to the store.
    #[instrument(level = "info", skip(self))]
    pub async fn run_cycle(&self) -> Result<usize, StoreError> {
        let _cycle = self.cycle_lock.lock().await;
        info!("Starting scrape cycle");

        // Scrape without holding the store lock so reads stay available.
        let incidents = self.gateway.scrape_all().await;

        let mut store = self.store.write().await;
        let added = store.merge(incidents).await?;
        store.touch();
        info!(added, total = store.len(), "Scrape cycle complete");
        Ok(added)
    }

    /// Run a cycle on request and describe the outcome.
    pub async fn trigger(&self) -> ScrapeResponse {
        match self.run_cycle().await {
            Ok(added) => ScrapeResponse {
                status: "success".to_string(),
                new_incidents: added,
                message: format!("Scrape completed. {added} new incidents added."),
            },
            Err(e) => {
                error!(error = %e, "Manual scrape failed");
                ScrapeResponse {
                    status: "error".to_string(),
                    new_incidents: 0,
                    message: format!("Scrape failed: {e}"),
                }
            }
        }
    }
}

/// Run a cycle immediately and then every `every`, until `shutdown` fires.
///
/// A failed cycle is logged and the loop carries on. Cancellation drops the
/// in-flight cycle, if any.
pub fn spawn_refresh_loop(
    monitor: Arc<Monitor>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = monitor.run_cycle() => {
                    if let Err(e) = result {
                        error!(error = %e, "Scheduled scrape failed");
                    }
                }
            }
        }
        info!("Refresh loop stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::MockFetcher;
    use crate::scrapers::testing::{context, feed_first, rss};
    use tempfile::tempdir;

    async fn monitor(fetcher: MockFetcher, dir: &std::path::Path) -> (Arc<Monitor>, Arc<MockFetcher>) {
        let (ctx, fetcher) = context(fetcher);
        let gateway = Gateway::new(vec![feed_first("src")], ctx);
        let store = IncidentStore::load(dir.join("incidents.json")).await;
        (Arc::new(Monitor::new(gateway, store)), fetcher)
    }

    fn feed() -> String {
        rss(&[
            ("Missile strike on Tehran", "", "Iran says 5 were killed"),
            ("Drone attack on Shiraz", "", "Iran drone attack"),
        ])
    }

    #[tokio::test]
    async fn test_trigger_merges_and_reports() {
        let dir = tempdir().unwrap();
        let fetcher = MockFetcher::new().on("https://src.test/rss", &feed());
        let (monitor, _) = monitor(fetcher, dir.path()).await;

        let first = monitor.trigger().await;
        assert_eq!(first.status, "success");
        assert_eq!(first.new_incidents, 2);
        assert_eq!(first.message, "Scrape completed. 2 new incidents added.");

        let second = monitor.trigger().await;
        assert_eq!(second.new_incidents, 0);

        let store = monitor.store().read().await;
        assert_eq!(store.len(), 2);
        assert_eq!(store.stats().total_killed, 5);
        assert!(store.stats().last_updated.is_some());
    }

    #[tokio::test]
    async fn test_trigger_reports_store_errors() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let fetcher = MockFetcher::new().on("https://src.test/rss", &feed());
        let (monitor, _) = monitor(fetcher, &blocker).await;

        let response = monitor.trigger().await;
        assert_eq!(response.status, "error");
        assert_eq!(response.new_incidents, 0);
        assert!(response.message.starts_with("Scrape failed:"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_loop_runs_immediately_and_on_interval() {
        let dir = tempdir().unwrap();
        let (monitor, fetcher) = monitor(MockFetcher::new(), dir.path()).await;
        let shutdown = CancellationToken::new();

        let handle = spawn_refresh_loop(monitor, Duration::from_secs(3600), shutdown.clone());

        tokio::time::sleep(Duration::from_secs(1)).await;
        let after_first = fetcher.requests().len();
        assert!(after_first > 0);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(fetcher.requests().len() > after_first);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
