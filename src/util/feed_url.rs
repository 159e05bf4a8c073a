use thiserror::Error;
use url::Url;

/// Errors that can occur while validating a configured feed URL.
#[derive(Error, Debug)]
pub enum FeedUrlError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
}

/// Validates a category feed URL from configuration.
///
/// Only `http` and `https` URLs with a host are accepted; `file://` and
/// similar schemes would let a config file read local paths through the loader.
///
/// ```
/// use bulletin::util::validate_feed_url;
///
/// assert!(validate_feed_url("https://feeds.bbci.co.uk/news/rss.xml").is_ok());
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_feed_url(url_str: &str) -> Result<Url, FeedUrlError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(FeedUrlError::UnsupportedScheme(scheme.to_owned())),
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(FeedUrlError::MissingHost);
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_http_and_https() {
        assert!(validate_feed_url("http://example.com/rss").is_ok());
        let url = validate_feed_url("  https://example.com/rss.xml ").unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_rejects_other_schemes() {
        match validate_feed_url("ftp://example.com/rss") {
            Err(FeedUrlError::UnsupportedScheme(s)) => assert_eq!(s, "ftp"),
            other => panic!("Expected UnsupportedScheme, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            validate_feed_url("not a url"),
            Err(FeedUrlError::InvalidUrl(_))
        ));
    }
}
