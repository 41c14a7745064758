//! Tolerant RSS/Atom parsing.
//!
//! Real feeds are frequently malformed (unescaped ampersands, truncated
//! documents, stray HTML), so this parser does not validate the document.
//! It scans for `<item>` blocks with permissive patterns and falls back to
//! Atom `<entry>` blocks only when the document has no RSS items at all.
//!
//! Entity decoding uses the HTML5 entity table, so `&amp;`, `&#8217;` and
//! `&nbsp;` all come out as text. Each entity is decoded on its own: a bare
//! `&` or an unknown entity is left in place and the rest still decodes.

use crate::models::FeedEntry;
use crate::utils::collapse_whitespace;
use once_cell::sync::Lazy;
use html_escape::decode_html_entities;
use regex::Regex;
use tracing::debug;

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: Lazy<Regex> = Lazy::new(|| Regex::new($re).unwrap());
    };
}

pattern!(RSS_ITEM, r"(?s)<item(?:\s[^>]*)?>(.*?)</item>");
pattern!(ATOM_ENTRY, r"(?s)<entry(?:\s[^>]*)?>(.*?)</entry>");
pattern!(TITLE, r"(?s)<title(?:\s[^>]*)?>(.*?)</title>");
pattern!(LINK_TEXT, r"(?s)<link(?:\s[^>]*)?>(.*?)</link>");
pattern!(LINK_HREF, r#"<link\b[^>]*?href=["']([^"']+)["']"#);
pattern!(DESCRIPTION, r"(?s)<description(?:\s[^>]*)?>(.*?)</description>");
pattern!(PUB_DATE, r"(?s)<pubDate(?:\s[^>]*)?>(.*?)</pubDate>");
pattern!(SOURCE, r#"(?s)<source\b[^>]*?url=["']([^"']*)["'][^>]*>(.*?)</source>"#);
pattern!(ATOM_SUMMARY, r"(?s)<(summary|content)(?:\s[^>]*)?>(.*?)</(?:summary|content)>");
pattern!(ATOM_DATE, r"(?s)<(published|updated)(?:\s[^>]*)?>(.*?)</(?:published|updated)>");
pattern!(CDATA, r"(?s)<!\[CDATA\[(.*?)\]\]>");
pattern!(TAG, r"<[^>]+>");

/// Parse raw feed markup into entries, in document order.
///
/// Entries without a non-empty title are dropped.
pub fn parse_feed(raw: &str) -> Vec<FeedEntry> {
    let entries: Vec<FeedEntry> = RSS_ITEM
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| rss_entry(m.as_str()))
        .collect();

    if !entries.is_empty() {
        debug!(count = entries.len(), "Parsed RSS items");
        return entries;
    }

    let entries: Vec<FeedEntry> = ATOM_ENTRY
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| atom_entry(m.as_str()))
        .collect();
    debug!(count = entries.len(), "Parsed Atom entries");
    entries
}

fn rss_entry(block: &str) -> Option<FeedEntry> {
    let title = clean_text(first_group(&TITLE, block, 1)?);
    if title.is_empty() {
        return None;
    }

    let link = first_group(&LINK_TEXT, block, 1)
        .map(clean_text)
        .filter(|l| !l.is_empty() && !l.contains('<'))
        .or_else(|| first_group(&LINK_HREF, block, 1).map(clean_text))
        .unwrap_or_default();

    let summary = first_group(&DESCRIPTION, block, 1)
        .map(clean_markup)
        .unwrap_or_default();
    let date = first_group(&PUB_DATE, block, 1)
        .map(clean_text)
        .unwrap_or_default();

    let (source, source_url) = SOURCE
        .captures(block)
        .map(|caps| {
            let url = caps.get(1).map(|m| clean_text(m.as_str())).unwrap_or_default();
            let name = caps.get(2).map(|m| clean_text(m.as_str())).unwrap_or_default();
            (name, url)
        })
        .unwrap_or_default();

    Some(FeedEntry {
        title,
        link,
        summary,
        date,
        source,
        source_url,
    })
}

fn atom_entry(block: &str) -> Option<FeedEntry> {
    let title = clean_text(first_group(&TITLE, block, 1)?);
    if title.is_empty() {
        return None;
    }

    Some(FeedEntry {
        title,
        link: first_group(&LINK_HREF, block, 1)
            .map(clean_text)
            .unwrap_or_default(),
        summary: first_group(&ATOM_SUMMARY, block, 2)
            .map(clean_markup)
            .unwrap_or_default(),
        date: first_group(&ATOM_DATE, block, 2)
            .map(clean_text)
            .unwrap_or_default(),
        source: String::new(),
        source_url: String::new(),
    })
}

fn first_group<'a>(re: &Regex, haystack: &'a str, group: usize) -> Option<&'a str> {
    re.captures(haystack)
        .and_then(|caps| caps.get(group))
        .map(|m| m.as_str())
}

fn unwrap_cdata(s: &str) -> String {
    CDATA.replace_all(s, "$1").into_owned()
}

/// Decode XML and HTML5 entities, leaving anything unrecognised in place.
fn decode_entities(s: &str) -> String {
    decode_html_entities(s).into_owned()
}

/// Strip tags, replacing each with a space.
fn strip_tags(s: &str) -> String {
    TAG.replace_all(s, " ").into_owned()
}

/// Short single-line fields: titles, links, dates, source names.
fn clean_text(raw: &str) -> String {
    collapse_whitespace(&decode_entities(&unwrap_cdata(raw)))
}

/// Descriptions and summaries: markup may arrive raw or entity-escaped, so
/// tags are stripped on both sides of decoding.
fn clean_markup(raw: &str) -> String {
    let stripped = strip_tags(&unwrap_cdata(raw));
    collapse_whitespace(&strip_tags(&decode_entities(&stripped)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::try_extract_date;
    use chrono::NaiveDate;

    #[test]
    fn test_minimal_rss_item_with_cdata_title() {
        let xml = r#"<?xml version="1.0"?>
            <rss><channel><title>Feed</title>
            <item>
              <title><![CDATA[Missile strike hits Isfahan &amp; Natanz]]></title>
              <link>https://news.test/a</link>
              <pubDate>Fri, 13 Jun 2025 04:00:00 GMT</pubDate>
            </item>
            </channel></rss>"#;

        let entries = parse_feed(xml);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Missile strike hits Isfahan & Natanz");
        assert_eq!(entries[0].link, "https://news.test/a");
        assert_eq!(
            try_extract_date(&entries[0].date),
            NaiveDate::from_ymd_opt(2025, 6, 13)
        );
    }

    #[test]
    fn test_bare_ampersand_does_not_block_other_entities() {
        let xml = r#"<rss><channel><item>
            <title><![CDATA[Q&A: Iran&#8217;s missile strike]]></title>
            <link>https://news.test/qa</link>
            <description><![CDATA[AT&T outage after strike &amp; blackout]]></description>
            </item></channel></rss>"#;

        let entries = parse_feed(xml);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Q&A: Iran\u{2019}s missile strike");
        assert_eq!(entries[0].summary, "AT&T outage after strike & blackout");
    }

    #[test]
    fn test_description_markup_is_stripped_and_decoded() {
        let xml = r#"<rss><channel><item>
            <title>Blast in Tehran</title>
            <description>&lt;p&gt;At least 5 killed&lt;/p&gt;&lt;a href="x"&gt;more&lt;/a&gt;  &amp;nbsp;</description>
            </item><item>
            <title>Second</title>
            <description><![CDATA[<p>Drone   attack</p>
                <img src="y.jpg"/>on <b>Shiraz</b>]]></description>
            </item></channel></rss>"#;

        let entries = parse_feed(xml);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].summary, "At least 5 killed more &nbsp;");
        assert_eq!(entries[1].summary, "Drone attack on Shiraz");
    }

    #[test]
    fn test_link_falls_back_to_href_attribute() {
        let xml = r#"<rss><item>
            <title>Strike</title>
            <link href="https://news.test/href"/>
            </item></rss>"#;

        let entries = parse_feed(xml);
        assert_eq!(entries[0].link, "https://news.test/href");
    }

    #[test]
    fn test_source_attribution() {
        let xml = r#"<rss><item>
            <title>Strike near Bushehr - Reuters</title>
            <link>https://news.google.test/articles/abc</link>
            <source url="https://www.reuters.com">Reuters</source>
            </item></rss>"#;

        let entries = parse_feed(xml);
        assert_eq!(entries[0].source, "Reuters");
        assert_eq!(entries[0].source_url, "https://www.reuters.com");
    }

    #[test]
    fn test_entries_without_title_are_dropped_and_order_kept() {
        let xml = r#"<rss>
            <item><title>First</title></item>
            <item><title>   </title></item>
            <item><link>https://news.test/no-title</link></item>
            <item><title>Third</title></item>
            </rss>"#;

        let titles: Vec<String> = parse_feed(xml).into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["First", "Third"]);
    }

    #[test]
    fn test_atom_fallback() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
            <entry>
              <title type="html">Drone attack on Tabriz</title>
              <link rel="alternate" href="https://news.test/atom"/>
              <summary type="html">&lt;p&gt;Two wounded&lt;/p&gt;</summary>
              <updated>2025-06-14T08:00:00Z</updated>
            </entry>
            </feed>"#;

        let entries = parse_feed(xml);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Drone attack on Tabriz");
        assert_eq!(entries[0].link, "https://news.test/atom");
        assert_eq!(entries[0].summary, "Two wounded");
        assert_eq!(entries[0].date, "2025-06-14T08:00:00Z");
    }

    #[test]
    fn test_atom_ignored_when_rss_items_exist() {
        let xml = r#"<rss><item><title>RSS</title></item>
            <entry><title>Atom</title></entry></rss>"#;

        let entries = parse_feed(xml);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "RSS");
    }

    #[test]
    fn test_truncated_document_keeps_complete_items() {
        let xml = r#"<rss><channel>
            <item><title>Complete</title><link>https://news.test/1</link></item>
            <item><title>Cut off"#;

        let entries = parse_feed(xml);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Complete");
    }

    #[test]
    fn test_garbage_yields_nothing() {
        assert!(parse_feed("").is_empty());
        assert!(parse_feed("<html><body>Not a feed</body></html>").is_empty());
    }

    #[test]
    fn test_decode_entities_tolerates_bare_ampersand() {
        assert_eq!(decode_entities("AT&T &amp; co"), "AT&T & co");
        assert_eq!(decode_entities("Q&A &bogus; &lt;b&gt;"), "Q&A &bogus; <b>");
        assert_eq!(decode_entities("it&#8217;s"), "it\u{2019}s");
        assert_eq!(decode_entities("a&nbsp;b"), "a\u{a0}b");
    }
}
