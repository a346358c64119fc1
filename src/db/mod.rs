//! SQLite post store: posts, likes, subscribers and the email audit log.

mod migrations;
mod models;
mod queries;

pub use models::*;
pub use queries::*;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use tracing::info;

/// Connections shared by the web routes and ingestion runs.
const MAX_CONNECTIONS: u32 = 5;
/// How long a writer waits for the SQLite lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle to the post store. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

fn connect_options(path: &Path) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        // Scheduled runs, manual triggers and likes updates write concurrently.
        .busy_timeout(BUSY_TIMEOUT)
}

impl Database {
    /// Open (creating if needed) the store at `path` and bring its schema up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened for writing or a migration fails.
    pub async fn new(path: &Path) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(connect_options(path))
            .await
            .with_context(|| format!("Failed to open post store at {}", path.display()))?;

        // Fail at startup rather than on the first ingested post.
        let tx = pool
            .begin()
            .await
            .with_context(|| format!("Post store is not writable: {}", path.display()))?;
        tx.commit()
            .await
            .context("Failed to commit post store writability check")?;

        migrations::run(&pool).await?;
        info!(path = %path.display(), "Post store ready");

        Ok(Self { pool })
    }

    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
