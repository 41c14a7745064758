//! Data models for extracted incidents and the records served around them.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Incident`]: One conflict event extracted from a feed entry or article
//! - [`Coordinates`]: A resolved latitude/longitude pair
//! - [`FeedEntry`]: A normalized RSS/Atom entry before extraction
//! - [`Stats`], [`ScrapeResponse`], [`SourceInfo`]: Read API payloads
//!
//! Incidents serialize with snake_case field names; the persisted store is a
//! flat JSON array of [`Incident`] values.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A location mention that has been resolved to coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    /// Display form, e.g. `"Bandar Abbas"`.
    pub name: String,
    pub coordinates: Coordinates,
}

/// A single extracted conflict event.
///
/// An `Incident` is only ever built after its text passed the relevance
/// classifier and its location resolved to coordinates, so `latitude` and
/// `longitude` are always meaningful.
///
/// # Identity
///
/// `id` is a random UUID and is only stable for the lifetime of the process
/// that created it. Deduplication uses [`Incident::dedup_key`] instead.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Incident {
    pub id: String,
    pub title: String,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Publication date, serialized as `YYYY-MM-DD`.
    pub date: NaiveDate,
    #[serde(default)]
    pub killed: u32,
    #[serde(default)]
    pub wounded: u32,
    #[serde(default)]
    pub notable_figures: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub source_url: String,
    /// Reserved for enrichment; never populated by the scrapers.
    #[serde(default)]
    pub attacker: String,
    #[serde(default)]
    pub origin_location: String,
    #[serde(default)]
    pub origin_latitude: Option<f64>,
    #[serde(default)]
    pub origin_longitude: Option<f64>,
}

impl Incident {
    /// Build an incident with a fresh id and the enrichment fields left empty.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        title: String,
        location: ResolvedLocation,
        date: NaiveDate,
        killed: u32,
        wounded: u32,
        description: String,
        source: String,
        source_url: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            location: location.name,
            latitude: location.coordinates.latitude,
            longitude: location.coordinates.longitude,
            date,
            killed,
            wounded,
            notable_figures: Vec::new(),
            description,
            source,
            source_url,
            attacker: String::new(),
            origin_location: String::new(),
            origin_latitude: None,
            origin_longitude: None,
        }
    }

    /// Normalized title used to decide whether two incidents are the same.
    pub fn dedup_key(&self) -> String {
        title_key(&self.title)
    }
}

/// Lowercased, trimmed form of a title.
pub fn title_key(title: &str) -> String {
    title.trim().to_lowercase()
}

/// One entry of an RSS or Atom feed after cleanup.
///
/// `source` and `source_url` come from an RSS `<source url="…">` element,
/// which aggregators use to credit the original publisher. They are empty
/// when the feed does not carry one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub summary: String,
    /// Raw publication date text, parsed later by `extract::extract_date`.
    pub date: String,
    pub source: String,
    pub source_url: String,
}

/// Aggregate numbers over the whole incident store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Stats {
    pub total_incidents: usize,
    pub total_killed: u64,
    pub total_wounded: u64,
    pub sources_count: usize,
    pub last_updated: Option<String>,
}

/// Outcome of a manually triggered scrape cycle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScrapeResponse {
    pub status: String,
    pub new_incidents: usize,
    pub message: String,
}

/// A registered source and whether the gateway will run it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SourceInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub enabled: bool,
}
