use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use super::{
    finish_run, Candidate, IngestError, IngestPath, IngestSummary, ReconcileOutcome, Reconciler,
};
use crate::extractor::{BrowserSession, ListingPages, PageSource, ScrapeSettings};
use crate::notify::Notifier;

/// Walk the listing pages of `base_url` and reconcile every post found.
///
/// Stops at the first page without records, or at `settings.max_pages`.
/// `source` is owned by this run and closed exactly once before returning,
/// whether the walk succeeded or not.
///
/// # Errors
///
/// Returns an error if a listing or post page cannot be loaded. Posts
/// reconciled before the failure remain stored.
pub async fn run_scrape<S: PageSource>(
    mut source: S,
    pool: &SqlitePool,
    settings: &ScrapeSettings,
    base_url: &str,
) -> Result<ReconcileOutcome, IngestError> {
    let mut outcome = ReconcileOutcome::default();
    let result = walk(&mut source, pool, settings, base_url, &mut outcome).await;

    if let Err(e) = source.close().await {
        warn!("Failed to close page source: {e:#}");
    }

    result.map(|()| outcome)
}

async fn walk<S: PageSource>(
    source: &mut S,
    pool: &SqlitePool,
    settings: &ScrapeSettings,
    base_url: &str,
    outcome: &mut ReconcileOutcome,
) -> Result<(), IngestError> {
    let reconciler = Reconciler::new(pool);
    let mut pages = ListingPages::new(base_url, settings.max_pages);

    for page in pages.by_ref() {
        let records = source
            .listing(&page.url)
            .await
            .map_err(|error| IngestError::Listing {
                page: page.number,
                error,
            })?;

        if records.is_empty() {
            info!(page = page.number, "Empty listing page; pagination complete");
            return Ok(());
        }
        info!(page = page.number, records = records.len(), "Extracted listing page");

        for raw in records {
            let detail = match raw.link.clone() {
                Some(url) => Some(
                    source
                        .detail(&url)
                        .await
                        .map_err(|error| IngestError::Detail { url, error })?,
                ),
                None => {
                    debug!(title = ?raw.title, "Listing record has no link");
                    None
                }
            };

            let candidate = Candidate::from_scrape(raw, detail, Utc::now());
            reconciler.reconcile_into(candidate, outcome).await;
        }
    }

    if pages.is_exhausted() {
        warn!(
            max_pages = settings.max_pages,
            "Reached listing page cap without an empty page"
        );
    }
    Ok(())
}

/// Run a browser scrape and notify subscribers about new posts.
///
/// # Errors
///
/// Returns an error if the browser cannot start or a page cannot be loaded.
pub async fn scrape_and_notify(
    pool: &SqlitePool,
    notifier: &dyn Notifier,
    settings: &ScrapeSettings,
    base_url: &str,
) -> Result<IngestSummary, IngestError> {
    let session = BrowserSession::launch(settings)
        .await
        .map_err(IngestError::Browser)?;
    let outcome = run_scrape(session, pool, settings, base_url).await?;
    Ok(finish_run(pool, notifier, IngestPath::Scrape, outcome).await)
}
