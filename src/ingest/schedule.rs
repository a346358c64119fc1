use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use super::scrape_and_notify;
use crate::config::Config;
use crate::db::Database;
use crate::notify::Notifier;

/// Run the browser scrape every `interval`, forever.
///
/// Run failures are logged and the loop keeps going.
pub async fn schedule_loop(
    config: Arc<Config>,
    db: Database,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
) {
    info!(interval_secs = interval.as_secs(), "Scheduled scraping enabled");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match scrape_and_notify(
            db.pool(),
            notifier.as_ref(),
            &config.scrape,
            &config.blog_base_url,
        )
        .await
        {
            Ok(summary) => info!(
                new_posts = summary.new_posts.len(),
                updated = summary.updated,
                "Scheduled scrape finished"
            ),
            Err(e) => error!("Scheduled scrape failed: {e}"),
        }
    }
}
