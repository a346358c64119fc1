//! Ingestion runs: browser scrape and RSS force-update.
//!
//! Both paths produce [`Candidate`]s that are reconciled one at a time
//! against the post store. The posts a run inserts, and only those, are
//! handed to the notification dispatcher.

mod force_update;
pub mod pubdate;
mod reconcile;
mod schedule;
mod scrape;

use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{error, info};

pub use force_update::{force_update, run_force_update};
pub use reconcile::{Candidate, Disposition, IngestPath, ReconcileOutcome, Reconciler, SkipReason};
pub use schedule::schedule_loop;
pub use scrape::{run_scrape, scrape_and_notify};

use crate::db::Post;
use crate::feed::FeedError;
use crate::notify::{dispatch_new_posts, DispatchReport, Notifier};

/// Failures that abort a whole run. Records committed before the failure stay.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to start browser: {0:#}")]
    Browser(anyhow::Error),
    #[error("failed to load listing page {page}: {error:#}")]
    Listing { page: u32, error: anyhow::Error },
    #[error("failed to load post page {url}: {error:#}")]
    Detail { url: String, error: anyhow::Error },
    #[error(transparent)]
    Feed(#[from] FeedError),
}

/// Result of one run, as returned to the trigger.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub message: String,
    pub new_posts: Vec<Post>,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Absent when nothing was inserted or dispatch could not start.
    pub notification: Option<DispatchReport>,
}

/// Hand a run's inserted posts to the dispatcher and build its summary.
///
/// The dispatcher is not called when nothing was inserted.
pub async fn finish_run(
    pool: &SqlitePool,
    notifier: &dyn Notifier,
    path: IngestPath,
    outcome: ReconcileOutcome,
) -> IngestSummary {
    let notification = if outcome.inserted.is_empty() {
        None
    } else {
        match dispatch_new_posts(pool, notifier, &outcome.inserted).await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(path = path.as_str(), "Failed to notify subscribers: {e:#}");
                None
            }
        }
    };

    let message = format!(
        "{} run complete: {} new, {} updated",
        path.as_str(),
        outcome.inserted.len(),
        outcome.updated.len()
    );
    info!(
        path = path.as_str(),
        inserted = outcome.inserted.len(),
        updated = outcome.updated.len(),
        unchanged = outcome.unchanged,
        skipped = outcome.skipped,
        failed = outcome.failed,
        "Ingestion run complete"
    );

    IngestSummary {
        message,
        updated: outcome.updated.len(),
        unchanged: outcome.unchanged,
        skipped: outcome.skipped,
        failed: outcome.failed,
        new_posts: outcome.inserted,
        notification,
    }
}
