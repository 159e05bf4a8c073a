use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use crate::protocol::ErrorKind;
use crate::storage::{Category, Database, ParsedItem};
use crate::util::strip_control_chars;

const MAX_RETRIES: u32 = 3;
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const MAX_THUMBNAIL_SIZE: usize = 2 * 1024 * 1024; // 2MB

/// Errors from fetching and storing a category feed or a thumbnail.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    /// Feed XML could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
    /// Writing to the local store failed
    #[error("Database error: {0}")]
    Database(String),
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    #[error("Response too large")]
    ResponseTooLarge,
    /// Received fewer bytes than Content-Length
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

impl FetchError {
    /// How the controller should present this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) | Self::Timeout | Self::IncompleteResponse { .. } => {
                ErrorKind::NetworkUnavailable
            }
            Self::HttpStatus(_) | Self::Parse(_) | Self::RateLimited(_) | Self::ResponseTooLarge => {
                ErrorKind::General
            }
            Self::Database(_) => ErrorKind::Fatal,
        }
    }
}

/// HTTP side of the loader: bounded, retried downloads.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    timeout: Duration,
    retry_base: Duration,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("bulletin/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, timeout, Duration::from_secs(1)))
    }

    /// `retry_base` is the first backoff delay; each retry doubles it.
    pub fn with_client(client: reqwest::Client, timeout: Duration, retry_base: Duration) -> Self {
        Self {
            client,
            timeout,
            retry_base,
        }
    }

    /// Fetch a category feed, parse it and upsert its items.
    ///
    /// Returns the number of new items.
    pub async fn fetch_category(&self, db: &Database, category: &Category) -> Result<usize, FetchError> {
        let bytes = self.fetch_bytes(&category.url, MAX_FEED_SIZE).await?;
        let items = parse_items(&bytes)?;

        let count = db
            .upsert_items(&category.name, &items)
            .await
            .map_err(|e| FetchError::Database(e.to_string()))?;

        tracing::debug!(
            category = %category.name,
            parsed = items.len(),
            new = count,
            "Category fetched"
        );
        Ok(count)
    }

    pub async fn fetch_thumbnail(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.fetch_bytes(url, MAX_THUMBNAIL_SIZE).await
    }

    /// GET `url` with retries on 429, 5xx and truncated bodies.
    pub async fn fetch_bytes(&self, url: &str, limit: usize) -> Result<Vec<u8>, FetchError> {
        let mut retry_count = 0;

        loop {
            let response = tokio::time::timeout(self.timeout, self.client.get(url).send())
                .await
                .map_err(|_| FetchError::Timeout)?
                .map_err(FetchError::Network)?;

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if retry_count >= MAX_RETRIES {
                    return Err(if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        FetchError::RateLimited(MAX_RETRIES)
                    } else {
                        FetchError::HttpStatus(status.as_u16())
                    });
                }
                let delay = self.backoff(retry_count);
                tracing::warn!(
                    url = %url,
                    status = %status,
                    retry = retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "Server busy, retrying after delay"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            // 4xx fails immediately
            if !status.is_success() {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }

            match read_limited_bytes(response, limit).await {
                Ok(bytes) => return Ok(bytes),
                Err(FetchError::IncompleteResponse { expected, received }) => {
                    if retry_count >= MAX_RETRIES {
                        return Err(FetchError::IncompleteResponse { expected, received });
                    }
                    let delay = self.backoff(retry_count);
                    tracing::debug!(
                        url = %url,
                        expected,
                        received,
                        attempt = retry_count + 1,
                        "Retrying incomplete download"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn backoff(&self, retry_count: u32) -> Duration {
        self.retry_base.saturating_mul(2u32.saturating_pow(retry_count))
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse RSS/Atom bytes into items, picking up `media:thumbnail` (or an image
/// `media:content`) as the thumbnail URL.
pub fn parse_items(bytes: &[u8]) -> Result<Vec<ParsedItem>, FetchError> {
    let feed = feed_rs::parser::parse(bytes).map_err(|e| FetchError::Parse(e.to_string()))?;

    let items = feed
        .entries
        .into_iter()
        .map(|entry| {
            let url = entry.links.first().map(|l| l.href.clone());
            let published = entry.published.or(entry.updated).map(|dt| dt.timestamp());
            let title = entry
                .title
                .map(|t| strip_control_chars(t.content.trim()).into_owned())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Untitled".to_string());

            let thumbnail_url = entry.media.iter().find_map(|media| {
                media
                    .thumbnails
                    .first()
                    .map(|t| t.image.uri.clone())
                    .or_else(|| {
                        media
                            .content
                            .iter()
                            .filter(|c| {
                                c.content_type
                                    .as_ref()
                                    .is_some_and(|m| m.ty().as_str() == "image")
                            })
                            .find_map(|c| c.url.as_ref().map(|u| u.to_string()))
                    })
            });

            let guid = match entry.id.trim() {
                "" => url.clone().unwrap_or_else(|| title.clone()),
                id => id.to_string(),
            };

            ParsedItem {
                guid,
                title,
                url,
                thumbnail_url,
                published,
            }
        })
        .collect();

    Ok(items)
}
