//! Subscriber notifications for newly ingested posts.

mod mail;
pub mod templates;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

pub use mail::MailNotifier;

use crate::db::{
    get_subscriber_by_email, insert_email_log, list_active_subscribers, EmailStatus, NewEmailLog,
    Post, Subscriber,
};

/// Category value meaning "every post".
pub const ALL_CATEGORIES: &str = "all";

/// Delivers messages to one subscriber at a time.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a digest of new posts. Returns the subject used.
    async fn send_new_posts(&self, subscriber: &Subscriber, posts: &[Post]) -> Result<String>;

    /// Send one stored post. Returns the subject used.
    async fn send_post(&self, subscriber: &Subscriber, post: &Post) -> Result<String>;

    /// Greet a new subscriber.
    async fn send_welcome(&self, subscriber: &Subscriber) -> Result<()>;
}

/// Aggregate counts of one notification batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Active subscribers considered.
    pub total: usize,
    pub sent: usize,
    /// Subscribers with no post matching their categories.
    pub skipped: usize,
    pub failed: usize,
}

/// Whether a post with `post_category` is wanted by a subscriber filtering on `categories`.
///
/// An empty filter or one containing [`ALL_CATEGORIES`] wants everything;
/// otherwise any filter entry must occur in the post's comma-joined category.
#[must_use]
pub fn matches_categories(categories: &[String], post_category: Option<&str>) -> bool {
    if categories.is_empty() || categories.iter().any(|c| c == ALL_CATEGORIES) {
        return true;
    }
    let Some(post_category) = post_category else {
        return false;
    };
    categories
        .iter()
        .filter(|c| !c.is_empty())
        .any(|c| post_category.contains(c.as_str()))
}

async fn log_attempt(pool: &SqlitePool, log: NewEmailLog) {
    if let Err(e) = insert_email_log(pool, &log).await {
        warn!(email = %log.email, "Failed to record email log: {e:#}");
    }
}

/// Notify every active subscriber about the posts inserted by one run.
///
/// Each subscriber receives only the posts matching their category filter
/// and is skipped when none match. A failed send is recorded and does not
/// stop the batch.
///
/// # Errors
///
/// Returns an error only if the subscriber list cannot be loaded.
pub async fn dispatch_new_posts(
    pool: &SqlitePool,
    notifier: &dyn Notifier,
    posts: &[Post],
) -> Result<DispatchReport> {
    let subscribers = list_active_subscribers(pool).await?;
    let mut report = DispatchReport {
        total: subscribers.len(),
        ..DispatchReport::default()
    };

    // Audit rows point at a post only when the mail was about exactly one.
    let single_post_id = |matching: &[Post]| match matching {
        [post] => Some(post.id),
        _ => None,
    };

    for subscriber in &subscribers {
        let categories = subscriber.category_list();
        let matching: Vec<Post> = posts
            .iter()
            .filter(|p| matches_categories(&categories, p.category.as_deref()))
            .cloned()
            .collect();

        if matching.is_empty() {
            debug!(email = %subscriber.email, "No matching posts for subscriber");
            report.skipped += 1;
            continue;
        }

        let (status, subject, error) = match notifier.send_new_posts(subscriber, &matching).await {
            Ok(subject) => {
                report.sent += 1;
                (EmailStatus::Sent, subject, None)
            }
            Err(e) => {
                warn!(email = %subscriber.email, "Failed to send new post notification: {e:#}");
                report.failed += 1;
                (EmailStatus::Failed, "New posts".to_string(), Some(format!("{e:#}")))
            }
        };

        log_attempt(
            pool,
            NewEmailLog {
                subscriber_id: Some(subscriber.id),
                email: subscriber.email.clone(),
                post_id: single_post_id(&matching),
                subject,
                status,
                error,
            },
        )
        .await;
    }

    info!(
        posts = posts.len(),
        total = report.total,
        sent = report.sent,
        skipped = report.skipped,
        failed = report.failed,
        "Notification dispatch complete"
    );
    Ok(report)
}

/// Send one stored post to every active subscriber, ignoring category filters.
///
/// # Errors
///
/// Returns an error only if the subscriber list cannot be loaded.
pub async fn notify_single_post(
    pool: &SqlitePool,
    notifier: &dyn Notifier,
    post: &Post,
) -> Result<DispatchReport> {
    let subscribers = list_active_subscribers(pool).await?;
    let mut report = DispatchReport {
        total: subscribers.len(),
        ..DispatchReport::default()
    };

    for subscriber in &subscribers {
        let (status, error) = match notifier.send_post(subscriber, post).await {
            Ok(_) => {
                report.sent += 1;
                (EmailStatus::Sent, None)
            }
            Err(e) => {
                warn!(email = %subscriber.email, post_id = post.id, "Failed to send post: {e:#}");
                report.failed += 1;
                (EmailStatus::Failed, Some(format!("{e:#}")))
            }
        };

        log_attempt(
            pool,
            NewEmailLog {
                subscriber_id: Some(subscriber.id),
                email: subscriber.email.clone(),
                post_id: Some(post.id),
                subject: post.title.clone(),
                status,
                error,
            },
        )
        .await;
    }

    info!(
        post_id = post.id,
        sent = report.sent,
        failed = report.failed,
        "Single post notification complete"
    );
    Ok(report)
}

/// Send one stored post to a single address, whether or not it is subscribed.
///
/// The attempt is recorded in the email log either way. The returned status
/// says whether the send went through; the send error is logged, not returned.
///
/// # Errors
///
/// Returns an error only if the subscriber lookup fails.
pub async fn send_test_post(
    pool: &SqlitePool,
    notifier: &dyn Notifier,
    email: &str,
    post: &Post,
) -> Result<EmailStatus> {
    let known = get_subscriber_by_email(pool, email).await?;
    let subscriber_id = known.as_ref().map(|s| s.id);
    let recipient = known.unwrap_or_else(|| Subscriber::unsaved(email));

    let (status, error) = match notifier.send_post(&recipient, post).await {
        Ok(_) => (EmailStatus::Sent, None),
        Err(e) => {
            warn!(email, post_id = post.id, "Failed to send test email: {e:#}");
            (EmailStatus::Failed, Some(format!("{e:#}")))
        }
    };

    log_attempt(
        pool,
        NewEmailLog {
            subscriber_id,
            email: email.to_string(),
            post_id: Some(post.id),
            subject: post.title.clone(),
            status,
            error,
        },
    )
    .await;

    debug!(email, post_id = post.id, status = status.as_str(), "Test email attempted");
    Ok(status)
}
