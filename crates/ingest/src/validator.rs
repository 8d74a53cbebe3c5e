//! Source URL validation over the request/reply bridge.
//!
//! Validation never errors toward the caller: anything wrong with the
//! URL comes back as a `valid = false` reply with a message. Channel
//! URLs are checked by shape alone; rss and website checks fetch the
//! URL, so their latency is bounded by the HTTP timeout.

use std::sync::Arc;
use std::time::Duration;

use depesche_core::{SourceType, ValidationType};
use depesche_rohrpost::events::{SourceValidateReply, SourceValidateRequest};
use depesche_rohrpost::{
    subjects, BridgeClient, BridgeServer, Envelope, ReplyToken, RequestHandler, RequestSender,
};
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::IngestError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);
const CHANNEL_HOSTS: &[&str] = &["t.me", "telegram.me"];

pub struct SourceValidator {
    http: reqwest::Client,
}

impl SourceValidator {
    pub fn new() -> Result<Self, IngestError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(crate::fetch::USER_AGENT)
            .build()?;
        Ok(Self { http })
    }

    /// Answer a validation request. Infallible by design; the reply
    /// carries the verdict.
    pub async fn validate(&self, request: &SourceValidateRequest) -> SourceValidateReply {
        match request.validation_type {
            ValidationType::Channel => validate_channel(&request.url),
            ValidationType::Rss => self.validate_rss(&request.url).await,
            ValidationType::Website => self.validate_website(&request.url).await,
            ValidationType::Auto => {
                if channel_shape(&request.url).is_some() {
                    return validate_channel(&request.url);
                }
                let as_feed = self.validate_rss(&request.url).await;
                if as_feed.valid {
                    return as_feed;
                }
                self.validate_website(&request.url).await
            }
        }
    }

    async fn validate_rss(&self, raw: &str) -> SourceValidateReply {
        let Some(url) = http_url(raw) else {
            return reject("not a fetchable http(s) URL");
        };
        let body = match self.get_text(url).await {
            Ok(body) => body,
            Err(message) => return reject(message),
        };
        if sniffs_like_feed(&body) {
            accept(SourceType::Rss, raw.to_string())
        } else {
            reject("document is not an RSS or Atom feed")
        }
    }

    async fn validate_website(&self, raw: &str) -> SourceValidateReply {
        let Some(url) = http_url(raw) else {
            return reject("not a fetchable http(s) URL");
        };
        match self.http.get(url).send().await {
            Err(error) => reject(format!("fetch failed: {error}")),
            Ok(response) => match response.error_for_status() {
                Err(error) => reject(format!("origin answered with an error: {error}")),
                // Normalize to the post-redirect URL.
                Ok(response) => accept(SourceType::Website, response.url().to_string()),
            },
        }
    }

    async fn get_text(&self, url: Url) -> Result<String, String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| format!("fetch failed: {e}"))?
            .error_for_status()
            .map_err(|e| format!("origin answered with an error: {e}"))?;
        response
            .text()
            .await
            .map_err(|e| format!("reading response body failed: {e}"))
    }
}

fn validate_channel(raw: &str) -> SourceValidateReply {
    match channel_shape(raw) {
        Some(name) => accept(SourceType::Channel, format!("https://t.me/{name}")),
        None => reject("not a public channel URL"),
    }
}

/// Channel name if the URL has the public channel shape
/// (`t.me/<name>`, with or without the `/s/` web-preview prefix).
fn channel_shape(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    if !CHANNEL_HOSTS.contains(&url.host_str()?) {
        return None;
    }

    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    let first = segments.next()?;
    let name = if first == "s" { segments.next()? } else { first };
    if segments.next().is_some() {
        // Deeper paths address a single post, not the channel.
        return None;
    }
    valid_channel_name(name).then(|| name.to_string())
}

fn valid_channel_name(name: &str) -> bool {
    name.len() >= 5 && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn sniffs_like_feed(body: &str) -> bool {
    body.contains("<rss") || body.contains("<feed")
}

fn http_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn accept(kind: SourceType, normalized: String) -> SourceValidateReply {
    SourceValidateReply {
        valid: true,
        detected_type: Some(kind),
        message: String::new(),
        normalized_url: Some(normalized),
    }
}

fn reject(message: impl Into<String>) -> SourceValidateReply {
    SourceValidateReply {
        valid: false,
        detected_type: None,
        message: message.into(),
        normalized_url: None,
    }
}

// ── Bridge plumbing ─────────────────────────────────────────────────

/// Serve validation requests until `shutdown` is notified.
///
/// Requests are answered in arrival order; a slow origin delays the
/// queue behind it by at most the HTTP timeout, which the requester's
/// own timeout already covers.
pub async fn run_validation_responder(
    server: Arc<BridgeServer>,
    validator: Arc<SourceValidator>,
    shutdown: Arc<Notify>,
) {
    info!("validation responder running");

    loop {
        tokio::select! {
            result = server.recv_request() => {
                match result {
                    Ok((token, envelope)) => answer(&server, &validator, token, envelope).await,
                    Err(error) => {
                        warn!(%error, "bridge recv failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
            _ = shutdown.notified() => {
                info!("validation responder stopping");
                return;
            }
        }
    }
}

async fn answer(
    server: &BridgeServer,
    validator: &SourceValidator,
    token: ReplyToken,
    request: Envelope,
) {
    let reply = match request.decode::<SourceValidateRequest>() {
        Ok(req) => {
            debug!(
                url = %req.url,
                kind = ?req.validation_type,
                correlation_id = %request.correlation_id,
                "validating source"
            );
            validator.validate(&req).await
        }
        Err(error) => reject(format!("malformed validation request: {error}")),
    };

    let envelope = match Envelope::with_correlation(
        subjects::SOURCE_VALIDATE_REPLY,
        &reply,
        request.correlation_id,
    ) {
        Ok(envelope) => envelope,
        Err(error) => {
            warn!(%error, "encoding validation reply failed");
            return;
        }
    };
    if let Err(error) = server.send_reply(token, envelope).await {
        warn!(%error, "sending validation reply failed");
    }
}

/// One-shot validation against a running validate worker.
pub async fn request_validation(
    client: &BridgeClient,
    request: &SourceValidateRequest,
    timeout: Duration,
) -> Result<SourceValidateReply, IngestError> {
    let envelope = Envelope::new(subjects::SOURCE_VALIDATE, request)?;
    let reply = client.request(envelope, timeout).await?;
    Ok(reply.decode()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_shape_accepts_public_channel_urls() {
        assert_eq!(
            channel_shape("https://t.me/some_channel").as_deref(),
            Some("some_channel")
        );
        assert_eq!(
            channel_shape("http://telegram.me/some_channel").as_deref(),
            Some("some_channel")
        );
        assert_eq!(
            channel_shape("https://t.me/some_channel/").as_deref(),
            Some("some_channel"),
            "trailing slash is noise"
        );
    }

    #[test]
    fn channel_shape_strips_the_web_preview_prefix() {
        assert_eq!(
            channel_shape("https://t.me/s/some_channel").as_deref(),
            Some("some_channel")
        );
    }

    #[test]
    fn channel_shape_rejects_everything_else() {
        for bad in [
            "https://example.org/some_channel",
            "https://t.me/",
            "https://t.me/some_channel/123",
            "https://t.me/abc",
            "ftp://t.me/some_channel",
            "not a url at all",
        ] {
            assert_eq!(channel_shape(bad), None, "{bad} should not validate");
        }
    }

    #[test]
    fn channel_validation_normalizes_the_url() {
        let reply = validate_channel("https://t.me/s/some_channel/");
        assert!(reply.valid);
        assert_eq!(reply.detected_type, Some(SourceType::Channel));
        assert_eq!(reply.normalized_url.as_deref(), Some("https://t.me/some_channel"));

        let reply = validate_channel("https://example.org/nope");
        assert!(!reply.valid);
        assert!(!reply.message.is_empty());
    }

    #[test]
    fn feed_sniff_detects_rss_and_atom_only() {
        assert!(sniffs_like_feed(r#"<?xml version="1.0"?><rss version="2.0"></rss>"#));
        assert!(sniffs_like_feed(r#"<feed xmlns="http://www.w3.org/2005/Atom"></feed>"#));
        assert!(!sniffs_like_feed("<html><body>plain page</body></html>"));
    }
}
