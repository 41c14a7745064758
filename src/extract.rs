//! Heuristic field extraction from free text.
//!
//! Casualty counts, location mentions and publication dates are pulled out
//! of headlines, feed summaries and article bodies with ordered regex lists
//! and a couple of fixed date formats. Nothing here fails: every extractor
//! returns a best-effort value (or `None` for the location, which makes the
//! caller drop the candidate).

use crate::gazetteer::Gazetteer;
use crate::models::ResolvedLocation;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Killed counts at or above this are treated as extraction noise.
pub const KILLED_CEILING: u32 = 10_000;
/// Wounded counts at or above this are treated as extraction noise.
pub const WOUNDED_CEILING: u32 = 50_000;
/// Descriptions are cut to this many characters.
pub const DESCRIPTION_LIMIT: usize = 300;

// Plain digits or digits with thousands separators ("1,200").
const NUM: &str = r"(\d{1,3}(?:,\d{3})+|\d+)";

static KILLED_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"{N}\s*(?:people\s+)?(?:were\s+)?(?:killed|dead|died|slain)",
        r"(?:killed|dead|died|slain)\s+{N}",
        r"(?:at\s+least\s+){N}\s*(?:people\s+)?(?:killed|dead|died)",
        r"death\s+toll[^.]*?{N}",
        r"{N}\s*(?:casualties|fatalities)",
        r"killing\s+(?:at\s+least\s+)?{N}",
        r"{N}\s+deaths?\b",
        r"claimed\s+(?:the\s+)?(?:lives?\s+of\s+)?{N}",
        r"left\s+(?:at\s+least\s+)?{N}\s*(?:people\s+)?dead",
        r"{N}\s*(?:people\s+)?(?:lost\s+their\s+lives|perished)",
        r"{N}\s*(?:people\s+)?confirmed\s+dead",
        r"(?:toll|count)\s+(?:has\s+)?(?:risen?\s+to|reached?)\s+{N}",
    ])
});

static WOUNDED_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"{N}\s*(?:people\s+)?(?:were\s+)?(?:wounded|injured|hurt)",
        r"(?:wounded|injured|hurt)\s+{N}",
        r"(?:at\s+least\s+){N}\s*(?:people\s+)?(?:wounded|injured)",
        r"(?:wounding|injuring)\s+(?:at\s+least\s+)?{N}",
        r"{N}\s*(?:people\s+)?(?:hospitalized|taken\s+to\s+hospital)",
        r"{N}\s*(?:people\s+)?(?:treated\s+for)",
    ])
});

// Case-sensitive: only Capitalized Latin-script phrases qualify.
static PLACE_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:in|near|outside|targeting|struck|hit|toward|towards|on)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)",
    )
    .unwrap()
});

static ISO_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}").unwrap());

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){}", p.replace("{N}", NUM))).unwrap())
        .collect()
}

/// Largest killed figure mentioned in `text`, or 0.
pub fn extract_killed(text: &str) -> u32 {
    max_count(text, &KILLED_PATTERNS, KILLED_CEILING)
}

/// Largest wounded figure mentioned in `text`, or 0.
pub fn extract_wounded(text: &str) -> u32 {
    max_count(text, &WOUNDED_PATTERNS, WOUNDED_CEILING)
}

/// Articles restate the same toll several ways, so the figures are
/// re-statements and the maximum wins. Values at or above `ceiling` are
/// dropped rather than clamped.
fn max_count(text: &str, patterns: &[Regex], ceiling: u32) -> u32 {
    patterns
        .iter()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| m.as_str().replace(',', "").parse::<u32>().ok())
        .filter(|n| *n < ceiling)
        .max()
        .unwrap_or(0)
}

/// Find the most specific resolvable place mentioned in `text`.
///
/// Gazetteer names contained in the lowercased text are tried longest
/// first, so "bandar abbas" beats any shorter key. Failing that, the first
/// capitalized phrase after a preposition ("near Minab", "struck Bandar
/// Lengeh") that the gazetteer can resolve is returned. Lowercase or
/// non-Latin text never matches the fallback.
pub async fn extract_location(text: &str, gazetteer: &Gazetteer) -> Option<ResolvedLocation> {
    let lowered = text.to_lowercase();
    if let Some(known) = gazetteer
        .known_longest_first()
        .iter()
        .find(|k| lowered.contains(&k.name))
    {
        return Some(ResolvedLocation {
            name: known.display_name(),
            coordinates: known.coordinates(),
        });
    }

    let phrases: Vec<String> = PLACE_PHRASE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect();

    for phrase in phrases {
        if let Some(coordinates) = gazetteer.resolve(&phrase).await {
            return Some(ResolvedLocation {
                name: phrase,
                coordinates,
            });
        }
    }
    None
}

/// Parse a feed or page date into a calendar day, if any known format fits.
///
/// ISO-prefixed input (`2025-06-13T04:00:00Z`, `2025-06-13`) uses its first
/// ten characters. Otherwise RFC 2822 (`Fri, 13 Jun 2025 04:00:00 GMT`),
/// ISO 8601 with offset or `Z`, and `YYYY-MM-DD HH:MM:SS` are tried in order.
pub fn try_extract_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if ISO_PREFIX.is_match(text) {
        let day = text.get(..10).map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d"));
        if let Some(Ok(date)) = day {
            return Some(date);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%SZ", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt.date());
        }
    }
    None
}

/// Like [`try_extract_date`], but falls back to today's UTC date.
///
/// A defaulted date is low-confidence; it is logged at debug level.
pub fn extract_date(text: &str) -> NaiveDate {
    try_extract_date(text).unwrap_or_else(|| {
        debug!(input = %text, "Unparseable date; defaulting to today (UTC)");
        Utc::now().date_naive()
    })
}

/// First [`DESCRIPTION_LIMIT`] characters of `text`, with `...` appended
/// when something was cut.
pub fn truncate_description(text: &str) -> String {
    if text.chars().count() <= DESCRIPTION_LIMIT {
        return text.trim().to_string();
    }
    let head: String = text.chars().take(DESCRIPTION_LIMIT).collect();
    format!("{}...", head.trim())
}
