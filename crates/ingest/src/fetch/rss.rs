//! RSS 2.0 / Atom fetcher.
//!
//! Feeds are deserialized with `quick_xml::de` into the handful of
//! elements we keep; everything else in the document is ignored. Items
//! are identified by guid (RSS) or id (Atom), falling back to the link,
//! and the identity is hashed into the unique code together with the
//! feed URL so identical guids on different feeds never collide.

use chrono::{DateTime, Utc};
use depesche_core::{codes, SourceType};
use depesche_store::Source;
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::error::IngestError;
use crate::fetch::{FetchOutcome, FetchedItem};

// ── RSS 2.0 ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Rss {
    channel: RssChannel,
}

#[derive(Debug, Deserialize)]
struct RssChannel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    guid: Option<Guid>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    // quick-xml's serde deserializer matches namespaced elements by
    // local name, so `content:encoded` / `dc:creator` are spelled
    // without their prefixes here.
    #[serde(rename = "encoded")]
    content_encoded: Option<String>,
    author: Option<String>,
    #[serde(rename = "creator")]
    dc_creator: Option<String>,
}

/// `<guid>` carries an `isPermaLink` attribute, so it cannot map to a
/// plain `String`.
#[derive(Debug, Deserialize)]
struct Guid {
    #[serde(rename = "$text", default)]
    value: String,
}

// ── Atom ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    id: Option<String>,
    title: Option<Text>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    summary: Option<Text>,
    published: Option<String>,
    updated: Option<String>,
    author: Option<AtomAuthor>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    name: Option<String>,
}

/// Atom text constructs carry a `type` attribute.
#[derive(Debug, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

// ── Fetch and parse ─────────────────────────────────────────────────

pub async fn fetch_new(
    http: &reqwest::Client,
    source: &Source,
) -> Result<FetchOutcome, IngestError> {
    let body = http
        .get(&source.url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let items = parse_feed(&source.url, &body)?;
    Ok(FetchOutcome {
        items,
        cursor: None,
    })
}

/// Parse an RSS 2.0 or Atom document into fetched items.
///
/// `origin` is the subscribed feed URL; it scopes the unique codes.
pub fn parse_feed(origin: &str, body: &str) -> Result<Vec<FetchedItem>, IngestError> {
    if looks_like_atom(body) {
        parse_atom(origin, body)
    } else {
        parse_rss(origin, body)
    }
}

fn looks_like_atom(body: &str) -> bool {
    match (body.find("<feed"), body.find("<rss")) {
        (Some(feed), Some(rss)) => feed < rss,
        (Some(_), None) => true,
        _ => false,
    }
}

fn parse_rss(origin: &str, body: &str) -> Result<Vec<FetchedItem>, IngestError> {
    let rss: Rss = from_str(body).map_err(|e| IngestError::Parse(e.to_string()))?;

    let mut items = Vec::with_capacity(rss.channel.items.len());
    for item in rss.channel.items {
        let identity = item
            .guid
            .as_ref()
            .map(|g| g.value.trim().to_string())
            .filter(|v| !v.is_empty())
            .or_else(|| item.link.clone());
        let Some(identity) = identity else {
            // No guid and no link: nothing stable to dedup on.
            continue;
        };

        let content = item
            .content_encoded
            .or(item.description)
            .unwrap_or_default();

        items.push(FetchedItem {
            unique_code: codes::hashed_code(SourceType::Rss, origin, &identity),
            title: item.title,
            content,
            url: item.link,
            author: item.dc_creator.or(item.author),
            published_at: item.pub_date.as_deref().and_then(parse_date),
        });
    }
    Ok(items)
}

fn parse_atom(origin: &str, body: &str) -> Result<Vec<FetchedItem>, IngestError> {
    let feed: AtomFeed = from_str(body).map_err(|e| IngestError::Parse(e.to_string()))?;

    let mut items = Vec::with_capacity(feed.entries.len());
    for entry in feed.entries {
        let link = entry
            .links
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .or_else(|| entry.links.first())
            .and_then(|l| l.href.clone());

        let identity = entry
            .id
            .map(|id| id.trim().to_string())
            .filter(|v| !v.is_empty())
            .or_else(|| link.clone());
        let Some(identity) = identity else {
            continue;
        };

        items.push(FetchedItem {
            unique_code: codes::hashed_code(SourceType::Rss, origin, &identity),
            title: entry.title.map(|t| t.value),
            content: entry.summary.map(|t| t.value).unwrap_or_default(),
            url: link,
            author: entry.author.and_then(|a| a.name),
            published_at: entry
                .published
                .or(entry.updated)
                .as_deref()
                .and_then(parse_date),
        });
    }
    Ok(items)
}

/// RSS dates are RFC 2822, Atom dates RFC 3339; feeds mix them up
/// often enough that both are tried for either format.
fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(s)
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ORIGIN: &str = "https://example.org/feed.xml";

    const RSS_FIXTURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Example</title>
    <item>
      <title>First post</title>
      <link>https://example.org/posts/1</link>
      <guid isPermaLink="false">post-0001</guid>
      <pubDate>Tue, 05 Aug 2025 10:30:00 +0000</pubDate>
      <description><![CDATA[Hello <b>world</b>]]></description>
      <dc:creator>Alice</dc:creator>
    </item>
    <item>
      <title>Second post</title>
      <link>https://example.org/posts/2</link>
      <description>No guid on this one</description>
    </item>
    <item>
      <title>Ghost</title>
      <description>Neither guid nor link</description>
    </item>
  </channel>
</rss>"#;

    const ATOM_FIXTURE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Atom</title>
  <entry>
    <id>urn:entry:42</id>
    <title type="text">Atom entry</title>
    <link rel="alternate" href="https://example.org/atom/42"/>
    <summary>Short summary</summary>
    <published>2025-08-05T10:30:00Z</published>
    <author><name>Bob</name></author>
  </entry>
</feed>"#;

    #[test]
    fn parses_rss_items_and_rfc2822_dates() {
        let items = parse_feed(ORIGIN, RSS_FIXTURE).unwrap();
        assert_eq!(items.len(), 2, "the identity-less item is skipped");

        let first = &items[0];
        assert_eq!(first.title.as_deref(), Some("First post"));
        assert_eq!(first.content, "Hello <b>world</b>");
        assert_eq!(first.url.as_deref(), Some("https://example.org/posts/1"));
        assert_eq!(first.author.as_deref(), Some("Alice"));
        assert_eq!(
            first.published_at,
            Some(Utc.with_ymd_and_hms(2025, 8, 5, 10, 30, 0).unwrap())
        );
        assert!(first.unique_code.starts_with("rss_"));
    }

    #[test]
    fn guid_identity_wins_over_link() {
        let items = parse_feed(ORIGIN, RSS_FIXTURE).unwrap();
        let with_guid = &items[0];
        let link_only = &items[1];

        assert_eq!(
            with_guid.unique_code,
            codes::hashed_code(SourceType::Rss, ORIGIN, "post-0001")
        );
        assert_eq!(
            link_only.unique_code,
            codes::hashed_code(SourceType::Rss, ORIGIN, "https://example.org/posts/2")
        );
        assert_ne!(with_guid.unique_code, link_only.unique_code);
    }

    #[test]
    fn parses_atom_entries_and_rfc3339_dates() {
        let items = parse_feed(ORIGIN, ATOM_FIXTURE).unwrap();
        assert_eq!(items.len(), 1);

        let entry = &items[0];
        assert_eq!(entry.title.as_deref(), Some("Atom entry"));
        assert_eq!(entry.content, "Short summary");
        assert_eq!(entry.url.as_deref(), Some("https://example.org/atom/42"));
        assert_eq!(entry.author.as_deref(), Some("Bob"));
        assert_eq!(
            entry.published_at,
            Some(Utc.with_ymd_and_hms(2025, 8, 5, 10, 30, 0).unwrap())
        );
        assert_eq!(
            entry.unique_code,
            codes::hashed_code(SourceType::Rss, ORIGIN, "urn:entry:42")
        );
    }

    #[test]
    fn same_item_on_different_feeds_gets_different_codes() {
        let a = parse_feed("https://a.example/feed", RSS_FIXTURE).unwrap();
        let b = parse_feed("https://b.example/feed", RSS_FIXTURE).unwrap();
        assert_ne!(a[0].unique_code, b[0].unique_code);
    }

    #[test]
    fn html_document_is_a_parse_error() {
        let err = parse_feed(ORIGIN, "<html><body>not a feed</body></html>").unwrap_err();
        assert!(matches!(err, IngestError::Parse(_)));
    }

    #[test]
    fn mixed_up_date_formats_still_parse() {
        assert!(parse_date("Tue, 05 Aug 2025 10:30:00 +0000").is_some());
        assert!(parse_date("2025-08-05T10:30:00+02:00").is_some());
        assert!(parse_date("yesterday-ish").is_none());
    }
}
