//! Source RSS feed parsing and fetching.

mod parser;

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

pub use parser::{parse_feed, FeedItem};

/// User agent sent when fetching the source feed.
pub const USER_AGENT: &str = concat!("blog-post-pipeline/", env!("CARGO_PKG_VERSION"));

/// Timeout for fetching the source feed.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to fetch feed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("feed fetch failed with status {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed feed XML: {0}")]
    Parse(#[from] rss::Error),
}

/// Build the HTTP client used for feed fetches.
pub fn http_client() -> Result<reqwest::Client, FeedError> {
    Ok(reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()?)
}

/// Fetch and parse the feed at `url`.
///
/// # Errors
///
/// Returns an error on network failure, a non-success status or malformed XML.
pub async fn fetch_feed(client: &reqwest::Client, url: &str) -> Result<Vec<FeedItem>, FeedError> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(FeedError::Status(response.status()));
    }

    let body = response.bytes().await?;
    let items = parse_feed(&body)?;
    debug!(url = %url, items = items.len(), "Fetched feed");
    Ok(items)
}
