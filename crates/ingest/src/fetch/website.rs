//! Website snapshot fetcher.
//!
//! A website source has no item structure, so each poll produces at
//! most one item: a snapshot of the page. The unique code hashes the
//! page content, which makes unchanged pages dedup away on insert and
//! changed pages show up as a fresh raw post.

use depesche_core::{codes, SourceType};
use depesche_store::Source;

use crate::error::IngestError;
use crate::fetch::{FetchOutcome, FetchedItem};

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

    Ok(FetchOutcome {
        items: vec![snapshot_item(&source.url, &body)],
        cursor: None,
    })
}

pub fn snapshot_item(origin: &str, body: &str) -> FetchedItem {
    FetchedItem {
        unique_code: codes::hashed_code(SourceType::Website, origin, body),
        title: extract_title(body),
        content: body.to_string(),
        url: Some(origin.to_string()),
        author: None,
        published_at: None,
    }
}

/// Pull the text of the first `<title>` element, if any.
fn extract_title(body: &str) -> Option<String> {
    let lower = body.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let open_end = open + lower[open..].find('>')? + 1;
    let close = open_end + lower[open_end..].find("</title>")?;
    let title = body[open_end..close].trim();
    (!title.is_empty()).then(|| title.to_string())
}
