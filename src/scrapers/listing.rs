//! Listing path: a section or topic page, then every linked article.

use super::{ARTICLE_CONCURRENCY, ScrapeContext, Source};
use crate::article::{extract_article_links, parse_article};
use crate::models::Incident;
use crate::utils::truncate_for_log;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

/// Scrape a listing page and the candidate articles it links to.
///
/// # Arguments
///
/// * `listing_url` - Page to index
/// * `base_url` - Origin used to resolve root-relative links
///
/// # Returns
///
/// Incidents in link order. Empty when the listing page cannot be fetched.
#[instrument(level = "info", skip(source, ctx), fields(source = %source.id))]
pub async fn scrape_html(
    source: &Source,
    ctx: &ScrapeContext,
    listing_url: &str,
    base_url: &str,
) -> Vec<Incident> {
    let html = match ctx.fetcher.get_text(listing_url).await {
        Ok(html) => html,
        Err(e) => {
            warn!(source = %source.id, error = %e, "Failed to fetch listing page");
            return Vec::new();
        }
    };

    let links = extract_article_links(&html, base_url, &ctx.classifier);
    info!(source = %source.id, count = links.len(), "Indexed candidate articles");
    debug!(urls = ?links, "Candidate URLs");

    let name = source.name.as_str();
    let incidents: Vec<Incident> = stream::iter(links)
        .map(|url| async move {
            match ctx.fetcher.get_text(&url).await {
                Ok(page) => {
                    let incident =
                        parse_article(&page, &url, name, &ctx.classifier, &ctx.gazetteer).await;
                    match &incident {
                        Some(incident) => debug!(
                            %url,
                            title = %truncate_for_log(&incident.title, 60),
                            "Extracted incident"
                        ),
                        None => debug!(%url, "Article yielded no incident"),
                    }
                    incident
                }
                Err(e) => {
                    debug!(%url, error = %e, "Article fetch failed");
                    None
                }
            }
        })
        .buffered(ARTICLE_CONCURRENCY)
        .filter_map(std::future::ready)
        .collect()
        .await;

    incidents
}

#[cfg(test)]
mod tests {
    use super::super::testing::{article, context, feed_first};
    use super::*;
    use crate::fetch::testing::MockFetcher;

    #[tokio::test]
    async fn test_listing_failure_yields_nothing() {
        let (ctx, fetcher) = context(MockFetcher::new().status("https://src.test/world", 403));
        let incidents = scrape_html(
            &feed_first("src"),
            &ctx,
            "https://src.test/world",
            "https://src.test",
        )
        .await;
        assert!(incidents.is_empty());
        assert_eq!(fetcher.requests(), vec!["https://src.test/world"]);
    }

    #[tokio::test]
    async fn test_only_keyword_links_are_fetched() {
        let listing = r#"
            <p><a href="/sport">Football results</a></p>
            <p><a href="/iran-strike">Latest</a></p>"#;
        let fetcher = MockFetcher::new()
            .on("https://src.test/world", listing)
            .on(
                "https://src.test/iran-strike",
                &article("Strike near Tehran", "Missile attack near Tehran, Iran."),
            );
        let (ctx, fetcher) = context(fetcher);

        let incidents = scrape_html(
            &feed_first("src"),
            &ctx,
            "https://src.test/world",
            "https://src.test",
        )
        .await;

        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].source, "src news");
        assert!(!fetcher.requests().iter().any(|u| u.ends_with("/sport")));
    }
}
