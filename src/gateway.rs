//! Fan-out over the registered sources.
//!
//! The gateway owns the source registry and a per-source enabled flag. A
//! scrape runs every enabled source as its own task, waits for all of them,
//! and merges the results in registration order with title dedup. A source
//! that panics or overruns its deadline contributes nothing; it never fails
//! the run.

use crate::models::{Incident, SourceInfo};
use crate::scrapers::{ScrapeContext, Source};
use itertools::Itertools;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

struct Registered {
    source: Arc<Source>,
    enabled: AtomicBool,
}

/// Registry of sources plus the shared scrape context.
pub struct Gateway {
    sources: Vec<Registered>,
    ctx: ScrapeContext,
    source_timeout: Option<Duration>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("sources", &self.list_sources())
            .field("source_timeout", &self.source_timeout)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Register `sources`, all enabled. A later source with an already
    /// registered id replaces the earlier one in place.
    pub fn new(sources: Vec<Source>, ctx: ScrapeContext) -> Self {
        let mut registered: Vec<Registered> = Vec::with_capacity(sources.len());
        for source in sources {
            let entry = Registered {
                source: Arc::new(source),
                enabled: AtomicBool::new(true),
            };
            match registered.iter_mut().find(|r| r.source.id == entry.source.id) {
                Some(existing) => {
                    warn!(source = %entry.source.id, "Duplicate source id; replacing earlier registration");
                    *existing = entry;
                }
                None => registered.push(entry),
            }
        }
        Self {
            sources: registered,
            ctx,
            source_timeout: None,
        }
    }

    /// Cap each source's run time. Overrunning sources yield nothing.
    pub fn with_source_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.source_timeout = timeout;
        self
    }

    fn find(&self, id: &str) -> Option<&Registered> {
        self.sources.iter().find(|r| r.source.id == id)
    }

    fn info(registered: &Registered) -> SourceInfo {
        SourceInfo {
            id: registered.source.id.clone(),
            name: registered.source.name.clone(),
            description: registered.source.description.clone(),
            enabled: registered.enabled.load(Ordering::Relaxed),
        }
    }

    /// Every registered source in registration order.
    pub fn list_sources(&self) -> Vec<SourceInfo> {
        self.sources.iter().map(Self::info).collect()
    }

    /// One source's metadata, if registered.
    pub fn source_info(&self, id: &str) -> Option<SourceInfo> {
        self.find(id).map(Self::info)
    }

    /// Enable or disable a source. Returns `false` for unknown ids.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        let Some(registered) = self.find(id) else {
            return false;
        };
        registered.enabled.store(enabled, Ordering::Relaxed);
        info!(source = %id, enabled, "Source toggled");
        true
    }

    /// Enabled state, or `None` for unknown ids.
    pub fn is_enabled(&self, id: &str) -> Option<bool> {
        self.find(id).map(|r| r.enabled.load(Ordering::Relaxed))
    }

    /// Run every enabled source concurrently and merge the results.
    ///
    /// Results are concatenated in registration order, then deduplicated by
    /// normalized title, first occurrence wins. Dropping the returned future
    /// aborts all in-flight source tasks.
    #[instrument(level = "info", skip(self))]
    pub async fn scrape_all(&self) -> Vec<Incident> {
        let active: Vec<Arc<Source>> = self
            .sources
            .iter()
            .filter(|r| r.enabled.load(Ordering::Relaxed))
            .map(|r| r.source.clone())
            .collect();
        if active.is_empty() {
            warn!("No sources enabled; nothing to scrape");
            return Vec::new();
        }

        let mut tasks = JoinSet::new();
        for (index, source) in active.iter().enumerate() {
            let source = source.clone();
            let ctx = self.ctx.clone();
            let timeout = self.source_timeout;
            tasks.spawn(async move { (index, run_source(&source, &ctx, timeout).await) });
        }

        let mut per_source: Vec<Vec<Incident>> = vec![Vec::new(); active.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, incidents)) => per_source[index] = incidents,
                Err(e) => warn!(error = %e, "Source task failed"),
            }
        }

        let incidents: Vec<Incident> = per_source
            .into_iter()
            .flatten()
            .unique_by(Incident::dedup_key)
            .collect();
        info!(
            count = incidents.len(),
            sources = active.len(),
            "Gateway scrape complete"
        );
        incidents
    }

    /// Run a single source regardless of its enabled flag. `None` for
    /// unknown ids.
    #[instrument(level = "info", skip(self))]
    pub async fn scrape_one(&self, id: &str) -> Option<Vec<Incident>> {
        let source = self.find(id)?.source.clone();
        if self.is_enabled(id) == Some(false) {
            info!(source = %id, "Running disabled source on request");
        }
        Some(run_source(&source, &self.ctx, self.source_timeout).await)
    }
}

async fn run_source(
    source: &Source,
    ctx: &ScrapeContext,
    timeout: Option<Duration>,
) -> Vec<Incident> {
    let Some(limit) = timeout else {
        return source.scrape(ctx).await;
    };
    match tokio::time::timeout(limit, source.scrape(ctx)).await {
        Ok(incidents) => incidents,
        Err(_) => {
            warn!(
                source = %source.id,
                timeout_secs = limit.as_secs(),
                "Source exceeded its deadline"
            );
            Vec::new()
        }
    }
}
