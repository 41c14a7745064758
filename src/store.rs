//! Durable incident store.
//!
//! The store is a flat JSON array of [`Incident`] values on disk, mirrored
//! in memory. New incidents are merged by normalized title, so an event
//! reported again in a later cycle is not stored twice.
//!
//! # File Layout
//!
//! ```text
//! data/
//! ├── incidents.json      # pretty-printed array of incidents
//! └── incidents.json.tmp  # only while a save is in progress
//! ```
//!
//! Saves write the temporary sibling first and rename it over the real file,
//! so a crash mid-write never leaves a truncated store behind.

use crate::models::{Incident, Stats};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument, warn};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize incidents: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// In-memory incidents backed by a JSON file.
#[derive(Debug)]
pub struct IncidentStore {
    path: PathBuf,
    incidents: Vec<Incident>,
    last_updated: Option<DateTime<Utc>>,
    /// Set while in-memory incidents are not yet on disk.
    unsaved: bool,
}

impl IncidentStore {
    /// Load the store at `path`.
    ///
    /// A missing file gives an empty store. An unreadable or corrupt file is
    /// logged and also gives an empty store; it is overwritten by the next
    /// successful merge.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let incidents = match fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<Vec<Incident>>(&raw) {
                Ok(incidents) => incidents,
                Err(e) => {
                    error!(error = %e, "Incident file is corrupt; starting empty");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No incident file yet; starting empty");
                Vec::new()
            }
            Err(e) => {
                error!(error = %e, "Failed to read incident file; starting empty");
                Vec::new()
            }
        };

        info!(count = incidents.len(), "Loaded incidents");
        Self {
            path,
            incidents,
            last_updated: None,
            unsaved: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn all(&self) -> &[Incident] {
        &self.incidents
    }

    pub fn len(&self) -> usize {
        self.incidents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Incident> {
        self.incidents.iter().find(|i| i.id == id)
    }

    /// Append every incident whose normalized title is not stored yet, and
    /// save if anything was added or an earlier save failed.
    ///
    /// # Returns
    ///
    /// The number of incidents added. On a save error the added incidents
    /// stay in memory and every later merge retries the save until it
    /// succeeds.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn merge(&mut self, new: Vec<Incident>) -> Result<usize, StoreError> {
        let mut seen: HashSet<String> = self.incidents.iter().map(Incident::dedup_key).collect();
        let before = self.incidents.len();
        for incident in new {
            if seen.insert(incident.dedup_key()) {
                self.incidents.push(incident);
            }
        }

        let added = self.incidents.len() - before;
        if added > 0 || self.unsaved {
            self.unsaved = true;
            self.save().await?;
            self.unsaved = false;
            info!(added, total = self.incidents.len(), "Merged new incidents");
        }
        Ok(added)
    }

    /// Write the whole store to disk.
    pub async fn save(&self) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&self.incidents)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, &self.path).await {
            warn!(error = %e, "Rename failed; removing temp file");
            let _ = fs::remove_file(&tmp).await;
            return Err(StoreError::io(&self.path, e));
        }
        Ok(())
    }

    /// Mark the store as refreshed now.
    pub fn touch(&mut self) {
        self.last_updated = Some(Utc::now());
    }

    /// Totals over every stored incident.
    pub fn stats(&self) -> Stats {
        let sources: HashSet<&str> = self.incidents.iter().map(|i| i.source.as_str()).collect();
        Stats {
            total_incidents: self.incidents.len(),
            total_killed: self.incidents.iter().map(|i| u64::from(i.killed)).sum(),
            total_wounded: self.incidents.iter().map(|i| u64::from(i.wounded)).sum(),
            sources_count: sources.len(),
            last_updated: self
                .last_updated
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
        }
    }
}
