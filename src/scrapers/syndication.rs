//! Feed path: RSS/Atom entries, upgraded to full articles where possible.

use super::{ARTICLE_CONCURRENCY, ScrapeContext, Source};
use crate::article::parse_article;
use crate::extract::{
    extract_date, extract_killed, extract_location, extract_wounded, truncate_description,
};
use crate::feed::parse_feed;
use crate::models::{FeedEntry, Incident};
use crate::utils::truncate_for_log;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

/// Scrape one feed URL on behalf of `source`.
///
/// Relevant entries are upgraded to the article-derived incident when the
/// linked page can be fetched and parsed; otherwise the feed-derived
/// incident is kept.
///
/// # Returns
///
/// Incidents in feed order. Empty when the feed cannot be fetched.
#[instrument(level = "info", skip(source, ctx), fields(source = %source.id))]
pub async fn scrape_feed(source: &Source, ctx: &ScrapeContext, feed_url: &str) -> Vec<Incident> {
    let raw = match ctx.fetcher.get_text(feed_url).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(source = %source.id, error = %e, "Failed to fetch feed");
            return Vec::new();
        }
    };

    let entries = parse_feed(&raw);
    let relevant: Vec<FeedEntry> = entries
        .iter()
        .filter(|e| ctx.classifier.is_relevant(&e.summary, &e.title))
        .cloned()
        .collect();
    info!(
        source = %source.id,
        entries = entries.len(),
        relevant = relevant.len(),
        "Parsed feed"
    );

    let name = source.name.as_str();
    let incidents: Vec<Incident> = stream::iter(relevant)
        .map(|entry| async move { entry_incident(entry, name, ctx).await })
        .buffered(ARTICLE_CONCURRENCY)
        .filter_map(std::future::ready)
        .collect()
        .await;

    for incident in &incidents {
        debug!(
            source = %source.id,
            title = %truncate_for_log(&incident.title, 60),
            killed = incident.killed,
            "Feed incident"
        );
    }
    incidents
}

async fn entry_incident(entry: FeedEntry, source_name: &str, ctx: &ScrapeContext) -> Option<Incident> {
    if !entry.link.is_empty() {
        match ctx.fetcher.get_text(&entry.link).await {
            Ok(html) => {
                let parsed = parse_article(
                    &html,
                    &entry.link,
                    source_name,
                    &ctx.classifier,
                    &ctx.gazetteer,
                )
                .await;
                if parsed.is_some() {
                    return parsed;
                }
                debug!(url = %entry.link, "Article yielded no incident; using feed entry");
            }
            Err(e) => {
                debug!(url = %entry.link, error = %e, "Article fetch failed; using feed entry");
            }
        }
    }
    incident_from_feed_entry(&entry, source_name, ctx).await
}

/// Build an incident from a feed entry alone.
///
/// The entry's own `<source>` credit, when present, wins over
/// `source_name`; `source_url` falls back to the entry link.
pub async fn incident_from_feed_entry(
    entry: &FeedEntry,
    source_name: &str,
    ctx: &ScrapeContext,
) -> Option<Incident> {
    if !ctx.classifier.is_relevant(&entry.summary, &entry.title) {
        return None;
    }

    let location = match extract_location(&entry.title, &ctx.gazetteer).await {
        Some(location) => location,
        None => extract_location(&entry.summary, &ctx.gazetteer).await?,
    };

    let combined = format!("{}. {}", entry.title, entry.summary);
    let source = if entry.source.is_empty() {
        source_name.to_string()
    } else {
        entry.source.clone()
    };
    let source_url = if entry.source_url.is_empty() {
        entry.link.clone()
    } else {
        entry.source_url.clone()
    };

    Some(Incident::new(
        entry.title.clone(),
        location,
        extract_date(&entry.date),
        extract_killed(&combined),
        extract_wounded(&combined),
        truncate_description(&entry.summary),
        source,
        source_url,
    ))
}
