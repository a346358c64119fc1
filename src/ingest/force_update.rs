use sqlx::SqlitePool;
use tracing::info;

use super::{
    finish_run, Candidate, IngestError, IngestPath, IngestSummary, ReconcileOutcome, Reconciler,
};
use crate::feed::fetch_feed;
use crate::notify::Notifier;

/// Reconcile every item of the source feed, inserting unknown posts with zero likes.
///
/// Existing posts are left untouched.
///
/// # Errors
///
/// Returns an error if the feed cannot be fetched or parsed. Nothing is
/// written in that case.
pub async fn run_force_update(
    client: &reqwest::Client,
    pool: &SqlitePool,
    feed_url: &str,
) -> Result<ReconcileOutcome, IngestError> {
    let items = fetch_feed(client, feed_url).await?;
    info!(url = %feed_url, items = items.len(), "Reconciling feed items");

    let candidates = items.into_iter().map(Candidate::from_feed).collect();
    Ok(Reconciler::new(pool).reconcile(candidates).await)
}

/// Run the RSS path and notify subscribers about new posts.
///
/// # Errors
///
/// Returns an error if the feed cannot be fetched or parsed.
pub async fn force_update(
    client: &reqwest::Client,
    pool: &SqlitePool,
    notifier: &dyn Notifier,
    feed_url: &str,
) -> Result<IngestSummary, IngestError> {
    let outcome = run_force_update(client, pool, feed_url).await?;
    Ok(finish_run(pool, notifier, IngestPath::Feed, outcome).await)
}
