//! Article pages and listing pages.
//!
//! [`parse_article`] turns a single news article into an [`Incident`] when
//! the page has a headline, a relevant body and a resolvable location.
//! [`extract_article_links`] picks candidate article URLs off a section or
//! topic listing page.
//!
//! `scraper::Html` is not `Send`, so every function here parses into owned
//! strings first and drops the document before anything is awaited.

use crate::classifier::KeywordClassifier;
use crate::extract::{
    extract_date, extract_killed, extract_location, extract_wounded, truncate_description,
};
use crate::gazetteer::Gazetteer;
use crate::models::Incident;
use crate::utils::collapse_whitespace;
use chrono::Utc;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

/// Listing pages yield at most this many candidate links.
pub const MAX_LINKS: usize = 20;

static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static ARTICLE: Lazy<Selector> = Lazy::new(|| Selector::parse("article").unwrap());
static CLASSED_DIV: Lazy<Selector> = Lazy::new(|| Selector::parse("div[class]").unwrap());
static MAIN: Lazy<Selector> = Lazy::new(|| Selector::parse("main").unwrap());
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time[datetime]").unwrap());
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

static BODY_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"article|story|content|body|post").unwrap());

/// What an article page holds before any extraction runs.
#[derive(Debug, Default, PartialEq)]
struct PageText {
    title: String,
    body: String,
    datetime: Option<String>,
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// Headline, body paragraphs and `<time datetime>` of an article page.
/// `None` when there is no non-empty `<h1>`.
fn read_page(html: &str) -> Option<PageText> {
    let document = Html::parse_document(html);

    let title = document
        .select(&H1)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())?;

    let container = document
        .select(&ARTICLE)
        .next()
        .or_else(|| {
            document
                .select(&CLASSED_DIV)
                .find(|div| div.value().classes().any(|c| BODY_CLASS.is_match(c)))
        })
        .or_else(|| document.select(&MAIN).next());

    let paragraphs: Vec<String> = match container {
        Some(container) => container.select(&PARAGRAPH).map(element_text).collect(),
        None => document.select(&PARAGRAPH).map(element_text).collect(),
    };
    let body = paragraphs
        .into_iter()
        .filter(|p| !p.is_empty())
        .join(" ");

    let datetime = document
        .select(&TIME)
        .next()
        .and_then(|t| t.value().attr("datetime"))
        .map(str::to_string);

    Some(PageText {
        title,
        body,
        datetime,
    })
}

/// Extract an incident from a full article page.
///
/// # Arguments
///
/// * `html` - The article page markup
/// * `url` - Where the page was fetched from; becomes `source_url`
/// * `source_name` - Outlet credited on the incident
///
/// # Returns
///
/// `None` when the page has no headline, no body text, is not relevant, or
/// mentions no location the gazetteer can place.
pub async fn parse_article(
    html: &str,
    url: &str,
    source_name: &str,
    classifier: &KeywordClassifier,
    gazetteer: &Gazetteer,
) -> Option<Incident> {
    let page = read_page(html)?;
    if page.body.is_empty() || !classifier.is_relevant(&page.body, &page.title) {
        return None;
    }

    let location = match extract_location(&page.title, gazetteer).await {
        Some(location) => location,
        None => extract_location(&page.body, gazetteer).await?,
    };

    let date = match page.datetime.as_deref() {
        Some(datetime) => extract_date(datetime),
        None => Utc::now().date_naive(),
    };

    debug!(%url, title = %page.title, location = %location.name, "Parsed article");
    Some(Incident::new(
        page.title,
        location,
        date,
        extract_killed(&page.body),
        extract_wounded(&page.body),
        truncate_description(&page.body),
        source_name.to_string(),
        url.to_string(),
    ))
}

/// Candidate article links on a listing page.
///
/// An anchor qualifies when its text, its parent's text, or its `href`
/// mentions any keyword (for the `href`, spaces in keywords become hyphens).
/// Root-relative links are resolved against `base_url`, absolute `http(s)`
/// links are kept and everything else is skipped. The result is
/// de-duplicated in first-seen order and capped at [`MAX_LINKS`].
pub fn extract_article_links(
    html: &str,
    base_url: &str,
    classifier: &KeywordClassifier,
) -> Vec<String> {
    let base = match Url::parse(base_url) {
        Ok(base) => Some(base),
        Err(e) => {
            debug!(%base_url, error = %e, "Unparseable base URL; relative links skipped");
            None
        }
    };
    let hyphenated: Vec<String> = classifier
        .all_keywords()
        .map(|k| k.replace(' ', "-"))
        .collect();

    let document = Html::parse_document(html);
    document
        .select(&ANCHOR)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?.trim();
            let mentions = classifier.mentions_any(&element_text(anchor).to_lowercase())
                || anchor
                    .parent()
                    .and_then(ElementRef::wrap)
                    .is_some_and(|parent| {
                        classifier.mentions_any(&element_text(parent).to_lowercase())
                    })
                || {
                    let href_lower = href.to_lowercase();
                    hyphenated.iter().any(|k| href_lower.contains(k.as_str()))
                };
            if !mentions {
                return None;
            }
            resolve_link(href, base.as_ref())
        })
        .unique()
        .take(MAX_LINKS)
        .collect()
}

fn resolve_link(href: &str, base: Option<&Url>) -> Option<String> {
    if href.starts_with('/') {
        return base?.join(href).ok().map(String::from);
    }
    let lowered = href.to_lowercase();
    if lowered.starts_with("http://") || lowered.starts_with("https://") {
        return Some(href.to_string());
    }
    None
}
