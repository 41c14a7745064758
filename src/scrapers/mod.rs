//! News sources and the strategies used to scrape them.
//!
//! Every source follows one of three strategies:
//!
//! | Strategy | Primary path | Fallback |
//! |----------|--------------|----------|
//! | [`SourceStrategy::FeedFirst`] | RSS/Atom feed, then each entry's article page | HTML listing when the feed yields nothing |
//! | [`SourceStrategy::HtmlListing`] | Section/topic listing page, then each linked article | none |
//! | [`SourceStrategy::Aggregator`] | Several search feeds in turn | none |
//!
//! # Common Patterns
//!
//! Both paths are two-phase, like any scraper here:
//!
//! 1. **Indexing**: feed entries or listing links
//! 2. **Fetching**: article pages, at most [`ARTICLE_CONCURRENCY`] at a time,
//!    results kept in index order
//!
//! A failed feed or listing fetch logs a warning and yields nothing. A failed
//! article fetch is logged at debug and skipped. Neither ever fails the
//! source as a whole.

pub mod listing;
pub mod syndication;

use crate::classifier::KeywordClassifier;
use crate::fetch::Fetcher;
use crate::gazetteer::Gazetteer;
use crate::models::Incident;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

pub use listing::scrape_html;
pub use syndication::{incident_from_feed_entry, scrape_feed};

/// Article pages fetched concurrently per source.
pub const ARTICLE_CONCURRENCY: usize = 4;

/// How a source is scraped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceStrategy {
    /// Feed first; the listing page only when the feed produced nothing.
    FeedFirst {
        feed_url: String,
        listing_url: String,
        base_url: String,
    },
    /// Listing page only.
    HtmlListing { listing_url: String, base_url: String },
    /// Several feeds, results concatenated without dedup.
    Aggregator { feeds: Vec<String> },
}

/// A registered news outlet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub description: String,
    pub strategy: SourceStrategy,
}

/// Shared collaborators handed to every source.
#[derive(Clone)]
pub struct ScrapeContext {
    pub fetcher: Arc<dyn Fetcher>,
    pub classifier: Arc<KeywordClassifier>,
    pub gazetteer: Arc<Gazetteer>,
}

impl std::fmt::Debug for ScrapeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeContext")
            .field("classifier", &self.classifier)
            .field("gazetteer", &self.gazetteer)
            .finish_non_exhaustive()
    }
}

impl Source {
    /// Run this source's strategy. Never fails; an unreachable source
    /// simply yields no incidents.
    #[instrument(level = "info", skip_all, fields(source = %self.id))]
    pub async fn scrape(&self, ctx: &ScrapeContext) -> Vec<Incident> {
        let incidents = match &self.strategy {
            SourceStrategy::FeedFirst {
                feed_url,
                listing_url,
                base_url,
            } => {
                let from_feed = scrape_feed(self, ctx, feed_url).await;
                if from_feed.is_empty() {
                    info!(source = %self.id, "Feed produced nothing; falling back to listing page");
                    scrape_html(self, ctx, listing_url, base_url).await
                } else {
                    from_feed
                }
            }
            SourceStrategy::HtmlListing {
                listing_url,
                base_url,
            } => scrape_html(self, ctx, listing_url, base_url).await,
            SourceStrategy::Aggregator { feeds } => {
                let mut incidents = Vec::new();
                for feed_url in feeds {
                    incidents.extend(scrape_feed(self, ctx, feed_url).await);
                }
                incidents
            }
        };

        info!(source = %self.id, count = incidents.len(), "Source scraped");
        incidents
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::fetch::testing::MockFetcher;
    use crate::gazetteer::testing::{FakeResolver, gazetteer_with};

    pub fn classifier() -> KeywordClassifier {
        KeywordClassifier::new(
            ["strike", "missile", "killed", "attack"],
            ["iran", "tehran", "isfahan", "shiraz"],
        )
    }

    pub fn context(fetcher: MockFetcher) -> (ScrapeContext, Arc<MockFetcher>) {
        let fetcher = Arc::new(fetcher);
        let ctx = ScrapeContext {
            fetcher: fetcher.clone(),
            classifier: Arc::new(classifier()),
            gazetteer: Arc::new(gazetteer_with(Arc::new(FakeResolver::new()))),
        };
        (ctx, fetcher)
    }

    pub fn rss(items: &[(&str, &str, &str)]) -> String {
        let body: String = items
            .iter()
            .map(|(title, link, summary)| {
                format!(
                    "<item><title>{title}</title><link>{link}</link>\
                     <description>{summary}</description>\
                     <pubDate>Fri, 13 Jun 2025 04:00:00 GMT</pubDate></item>"
                )
            })
            .collect();
        format!("<rss><channel>{body}</channel></rss>")
    }

    pub fn article(title: &str, body: &str) -> String {
        format!(
            r#"<html><body><h1>{title}</h1>
            <time datetime="2025-06-14">June 14</time>
            <article><p>{body}</p></article></body></html>"#
        )
    }

    pub fn feed_first(id: &str) -> Source {
        Source {
            id: id.to_string(),
            name: format!("{id} news"),
            description: String::new(),
            strategy: SourceStrategy::FeedFirst {
                feed_url: format!("https://{id}.test/rss"),
                listing_url: format!("https://{id}.test/world"),
                base_url: format!("https://{id}.test"),
            },
        }
    }
}
