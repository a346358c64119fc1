//! Reconciliation of freshly extracted posts against the post store.
//!
//! Identity is the normalized title. A candidate whose slug is unknown is
//! inserted together with its likes row; a known slug only ever has its
//! likes touched (scrape path) or is left alone (feed path).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use super::pubdate::{format_timestamp, parse_feed_date, parse_listing_date};
use crate::db::{
    get_post, get_post_by_normalized_title, insert_post_with_likes, record_observed_likes,
    InsertOutcome, NewPost, Post,
};
use crate::extractor::{PostDetail, RawPost};
use crate::feed::FeedItem;
use crate::slug::normalize_title;

/// Which ingestion path produced a candidate. Decides how existing posts are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestPath {
    /// Browser scrape: content required, existing posts get a likes-only update.
    Scrape,
    /// RSS force-update: insert-only, new posts start at zero likes.
    Feed,
}

impl IngestPath {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scrape => "scrape",
            Self::Feed => "feed",
        }
    }
}

/// A post as extracted by one of the ingestion paths, before reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: IngestPath,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub link: Option<String>,
    pub pub_date: Option<DateTime<Utc>>,
    pub content: Option<String>,
    pub category: Option<String>,
    pub enclosure: Option<String>,
    /// Likes observed on the listing page, if any.
    pub likes: Option<i64>,
}

impl Candidate {
    /// Combine a listing record with its detail page.
    ///
    /// `detail` is `None` when the listing record had no link to follow.
    #[must_use]
    pub fn from_scrape(raw: RawPost, detail: Option<PostDetail>, now: DateTime<Utc>) -> Self {
        let pub_date = raw
            .pub_date_text
            .as_deref()
            .and_then(|text| parse_listing_date(text, now));
        let detail = detail.unwrap_or_else(PostDetail::not_found);

        Self {
            path: IngestPath::Scrape,
            title: raw.title.unwrap_or_default(),
            description: raw.description,
            image_url: raw.image_url,
            link: raw.link,
            pub_date,
            content: detail.content.into_option(),
            category: detail.category.into_option(),
            enclosure: detail.enclosure.into_option(),
            likes: raw.likes,
        }
    }

    /// Build a candidate from a parsed feed item.
    #[must_use]
    pub fn from_feed(item: FeedItem) -> Self {
        Self {
            path: IngestPath::Feed,
            pub_date: item.pub_date.as_deref().and_then(parse_feed_date),
            title: item.title.unwrap_or_default(),
            description: item.description,
            image_url: None,
            link: item.link,
            content: item.content,
            category: item.category,
            enclosure: item.enclosure,
            likes: None,
        }
    }

    fn empty(path: IngestPath) -> Self {
        Self {
            path,
            title: String::new(),
            description: None,
            image_url: None,
            link: None,
            pub_date: None,
            content: None,
            category: None,
            enclosure: None,
            likes: None,
        }
    }

    fn into_new_post(self, normalized_title: String, now: DateTime<Utc>) -> NewPost {
        NewPost {
            title: self.title,
            normalized_title,
            description: self.description,
            image_url: self.image_url,
            link: self.link,
            pub_date: format_timestamp(self.pub_date.unwrap_or(now)),
            content: self.content,
            category: self.category,
            enclosure: self.enclosure,
        }
    }
}

/// Why a candidate was dropped without touching storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Scrape path record whose body could not be extracted.
    MissingContent,
    /// Title normalizes to an empty slug.
    EmptySlug,
}

/// What reconciling one candidate did.
#[derive(Debug, Clone)]
pub enum Disposition {
    Inserted(Post),
    /// Existing post; likes were reconciled, descriptive fields untouched.
    LikesUpdated(Post),
    /// Existing post left as is (feed path).
    Unchanged(Post),
    Skipped(SkipReason),
}

/// Accumulated results of reconciling a batch.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub inserted: Vec<Post>,
    pub updated: Vec<Post>,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ReconcileOutcome {
    fn record(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Inserted(post) => self.inserted.push(post),
            Disposition::LikesUpdated(post) => self.updated.push(post),
            Disposition::Unchanged(_) => self.unchanged += 1,
            Disposition::Skipped(_) => self.skipped += 1,
        }
    }
}

/// Reconciles candidates against the post store.
pub struct Reconciler<'a> {
    pool: &'a SqlitePool,
    now: DateTime<Utc>,
}

impl<'a> Reconciler<'a> {
    #[must_use]
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self::at(pool, Utc::now())
    }

    /// Use a fixed "now" for missing publish dates.
    #[must_use]
    pub fn at(pool: &'a SqlitePool, now: DateTime<Utc>) -> Self {
        Self { pool, now }
    }

    /// Reconcile candidates in order. A failing record is logged and counted,
    /// never aborting the batch.
    pub async fn reconcile(&self, candidates: Vec<Candidate>) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        for candidate in candidates {
            self.reconcile_into(candidate, &mut outcome).await;
        }
        outcome
    }

    /// Reconcile one candidate and record the result in `outcome`.
    pub async fn reconcile_into(&self, candidate: Candidate, outcome: &mut ReconcileOutcome) {
        let title = candidate.title.clone();
        match self.apply(candidate).await {
            Ok(disposition) => outcome.record(disposition),
            Err(e) => {
                warn!(title = %title, "Failed to reconcile post: {e:#}");
                outcome.failed += 1;
            }
        }
    }

    /// Reconcile one candidate.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    pub async fn apply(&self, candidate: Candidate) -> Result<Disposition> {
        let slug = normalize_title(&candidate.title);
        if slug.is_empty() {
            warn!(title = %candidate.title, "Skipping post with empty normalized title");
            return Ok(Disposition::Skipped(SkipReason::EmptySlug));
        }

        if candidate.path == IngestPath::Scrape && candidate.content.is_none() {
            info!(title = %candidate.title, "Skipping post due to missing content");
            return Ok(Disposition::Skipped(SkipReason::MissingContent));
        }

        if let Some(existing) = get_post_by_normalized_title(self.pool, &slug).await? {
            return self.reconcile_existing(existing, &candidate).await;
        }

        let path = candidate.path;
        let likes = candidate.likes.unwrap_or(0);
        let observed_likes = candidate.likes;
        let title = candidate.title.clone();
        let new_post = candidate.into_new_post(slug.clone(), self.now);

        match insert_post_with_likes(self.pool, &new_post, likes).await? {
            InsertOutcome::Inserted(id) => {
                info!(post_id = id, slug = %slug, path = path.as_str(), "Inserted new post");
                let post = get_post(self.pool, id)
                    .await?
                    .with_context(|| format!("Inserted post {id} disappeared"))?;
                Ok(Disposition::Inserted(post))
            }
            InsertOutcome::Conflict => {
                // A concurrent run inserted the same slug between lookup and insert.
                warn!(slug = %slug, "Post inserted concurrently, falling back to update path");
                let existing = get_post_by_normalized_title(self.pool, &slug)
                    .await?
                    .with_context(|| format!("Conflicting post '{slug}' not found"))?;
                let candidate = Candidate {
                    path,
                    title,
                    likes: observed_likes,
                    ..Candidate::empty(path)
                };
                self.reconcile_existing(existing, &candidate).await
            }
        }
    }

    async fn reconcile_existing(&self, existing: Post, candidate: &Candidate) -> Result<Disposition> {
        if existing.title != candidate.title {
            debug!(
                slug = %existing.normalized_title,
                stored = %existing.title,
                incoming = %candidate.title,
                "Different titles share a normalized title"
            );
        }

        match candidate.path {
            IngestPath::Feed => Ok(Disposition::Unchanged(existing)),
            IngestPath::Scrape => {
                if let Some(likes) = candidate.likes {
                    let written = record_observed_likes(self.pool, existing.id, likes).await?;
                    debug!(post_id = existing.id, likes, written, "Reconciled likes");
                }
                Ok(Disposition::LikesUpdated(existing))
            }
        }
    }
}
