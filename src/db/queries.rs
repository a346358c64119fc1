use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::models::{
    EmailLog, InsertOutcome, NewEmailLog, NewPost, NewSubscriber, Post, PostWithLikes,
    Subscriber, SubscriberStatus,
};

const POST_WITH_LIKES_COLUMNS: &str = r"
    p.id, p.title, p.normalized_title, p.description, p.image_url, p.link,
    p.pub_date, p.content, p.category, p.enclosure,
    COALESCE(l.likes_count, 0) AS likes_count
";

// ========== Posts ==========

/// Get a post by its normalized title (slug).
pub async fn get_post_by_normalized_title(
    pool: &SqlitePool,
    normalized_title: &str,
) -> Result<Option<Post>> {
    sqlx::query_as("SELECT * FROM posts WHERE normalized_title = ?")
        .bind(normalized_title)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch post by normalized title")
}

/// Get a post by ID.
pub async fn get_post(pool: &SqlitePool, id: i64) -> Result<Option<Post>> {
    sqlx::query_as("SELECT * FROM posts WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch post")
}

/// Get a post by its exact display title.
pub async fn get_post_by_title(pool: &SqlitePool, title: &str) -> Result<Option<Post>> {
    sqlx::query_as("SELECT * FROM posts WHERE title = ? ORDER BY id LIMIT 1")
        .bind(title)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch post by title")
}

/// Get a post with its likes count by normalized title.
pub async fn get_post_with_likes(
    pool: &SqlitePool,
    normalized_title: &str,
) -> Result<Option<PostWithLikes>> {
    sqlx::query_as(&format!(
        r"
        SELECT {POST_WITH_LIKES_COLUMNS}
        FROM posts p
        LEFT JOIN likes l ON p.id = l.post_id
        WHERE p.normalized_title = ?
        "
    ))
    .bind(normalized_title)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch post with likes")
}

/// Insert a new post together with its likes row.
///
/// The insert is keyed on `normalized_title`: if another writer got there
/// first, nothing is written and [`InsertOutcome::Conflict`] is returned.
pub async fn insert_post_with_likes(
    pool: &SqlitePool,
    post: &NewPost,
    likes_count: i64,
) -> Result<InsertOutcome> {
    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin post insert transaction")?;

    let result = sqlx::query(
        r"
        INSERT INTO posts (title, normalized_title, description, image_url, link, pub_date,
                           content, category, enclosure)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(normalized_title) DO NOTHING
        ",
    )
    .bind(&post.title)
    .bind(&post.normalized_title)
    .bind(&post.description)
    .bind(&post.image_url)
    .bind(&post.link)
    .bind(&post.pub_date)
    .bind(&post.content)
    .bind(&post.category)
    .bind(&post.enclosure)
    .execute(&mut *tx)
    .await
    .context("Failed to insert post")?;

    if result.rows_affected() == 0 {
        tx.rollback()
            .await
            .context("Failed to roll back conflicting post insert")?;
        return Ok(InsertOutcome::Conflict);
    }

    let post_id = result.last_insert_rowid();

    sqlx::query(
        r"
        INSERT INTO likes (post_id, likes_count)
        VALUES (?, ?)
        ON CONFLICT(post_id) DO UPDATE SET likes_count = excluded.likes_count
        ",
    )
    .bind(post_id)
    .bind(likes_count)
    .execute(&mut *tx)
    .await
    .context("Failed to insert likes for new post")?;

    tx.commit()
        .await
        .context("Failed to commit post insert")?;

    Ok(InsertOutcome::Inserted(post_id))
}

/// Get the stored likes count for a post, if it has a likes row.
pub async fn get_likes(pool: &SqlitePool, post_id: i64) -> Result<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT likes_count FROM likes WHERE post_id = ?")
        .bind(post_id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch likes")?;

    Ok(row.map(|(count,)| count))
}

/// Set a post's likes count unconditionally (insert if absent, overwrite if present).
pub async fn upsert_likes(pool: &SqlitePool, post_id: i64, likes_count: i64) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO likes (post_id, likes_count)
        VALUES (?, ?)
        ON CONFLICT(post_id) DO UPDATE SET
            likes_count = excluded.likes_count,
            updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
        ",
    )
    .bind(post_id)
    .bind(likes_count)
    .execute(pool)
    .await
    .context("Failed to upsert likes")?;

    Ok(())
}

/// Record a likes count observed by a scrape.
///
/// A zero observation never replaces an established non-zero count. Returns
/// whether the stored value was written.
pub async fn record_observed_likes(
    pool: &SqlitePool,
    post_id: i64,
    likes_count: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r"
        INSERT INTO likes (post_id, likes_count)
        VALUES (?, ?)
        ON CONFLICT(post_id) DO UPDATE SET
            likes_count = excluded.likes_count,
            updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
        WHERE excluded.likes_count > 0 OR likes.likes_count = 0
        ",
    )
    .bind(post_id)
    .bind(likes_count)
    .execute(pool)
    .await
    .context("Failed to record observed likes")?;

    Ok(result.rows_affected() > 0)
}

/// Get every post with likes, newest first.
pub async fn list_posts_with_likes(pool: &SqlitePool) -> Result<Vec<PostWithLikes>> {
    sqlx::query_as(&format!(
        r"
        SELECT {POST_WITH_LIKES_COLUMNS}
        FROM posts p
        LEFT JOIN likes l ON p.id = l.post_id
        ORDER BY p.pub_date DESC, p.id DESC
        "
    ))
    .fetch_all(pool)
    .await
    .context("Failed to list posts")
}

/// Get one page of posts with likes, newest first, optionally restricted to a category.
pub async fn list_posts_page(
    pool: &SqlitePool,
    limit: i64,
    offset: i64,
    category: Option<&str>,
) -> Result<Vec<PostWithLikes>> {
    let where_clause = if category.is_some() {
        "WHERE p.category = ?"
    } else {
        ""
    };

    let sql = format!(
        r"
        SELECT {POST_WITH_LIKES_COLUMNS}
        FROM posts p
        LEFT JOIN likes l ON p.id = l.post_id
        {where_clause}
        ORDER BY p.pub_date DESC, p.id DESC
        LIMIT ? OFFSET ?
        "
    );

    let mut query = sqlx::query_as::<_, PostWithLikes>(&sql);
    if let Some(category) = category {
        query = query.bind(category);
    }

    query
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("Failed to list posts page")
}

/// Count posts, optionally restricted to a category.
pub async fn count_posts(pool: &SqlitePool, category: Option<&str>) -> Result<i64> {
    let (count,): (i64,) = match category {
        Some(category) => sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM posts WHERE category = ?")
            .bind(category)
            .fetch_one(pool)
            .await,
        None => sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM posts")
            .fetch_one(pool)
            .await,
    }
    .context("Failed to count posts")?;

    Ok(count)
}

/// Get the distinct non-null categories, sorted.
pub async fn list_categories(pool: &SqlitePool) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT category FROM posts WHERE category IS NOT NULL ORDER BY category",
    )
    .fetch_all(pool)
    .await
    .context("Failed to list categories")?;

    Ok(rows.into_iter().map(|(c,)| c).collect())
}

// ========== Subscribers ==========

/// Get a subscriber by email.
pub async fn get_subscriber_by_email(pool: &SqlitePool, email: &str) -> Result<Option<Subscriber>> {
    sqlx::query_as("SELECT * FROM subscribers WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch subscriber")
}

/// Insert a new active subscriber, returning its ID.
pub async fn insert_subscriber(
    pool: &SqlitePool,
    subscriber: &NewSubscriber,
    unsubscribe_token: &str,
) -> Result<i64> {
    let categories =
        serde_json::to_string(&subscriber.categories).context("Failed to encode categories")?;

    let result = sqlx::query(
        r"
        INSERT INTO subscribers (email, name, categories, frequency, unsubscribe_token)
        VALUES (?, ?, ?, ?, ?)
        ",
    )
    .bind(&subscriber.email)
    .bind(&subscriber.name)
    .bind(categories)
    .bind(&subscriber.frequency)
    .bind(unsubscribe_token)
    .execute(pool)
    .await
    .context("Failed to insert subscriber")?;

    Ok(result.last_insert_rowid())
}

/// Rename an existing subscriber and mark them active again.
pub async fn reactivate_subscriber(
    pool: &SqlitePool,
    email: &str,
    name: &str,
) -> Result<Option<Subscriber>> {
    sqlx::query_as(
        r"
        UPDATE subscribers
        SET name = ?, status = 'active', updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
        WHERE email = ?
        RETURNING *
        ",
    )
    .bind(name)
    .bind(email)
    .fetch_optional(pool)
    .await
    .context("Failed to reactivate subscriber")
}

/// Replace a subscriber's preferences and mark them active.
pub async fn update_subscription(
    pool: &SqlitePool,
    email: &str,
    name: &str,
    categories: &[String],
    frequency: Option<&str>,
) -> Result<Option<Subscriber>> {
    let categories = serde_json::to_string(categories).context("Failed to encode categories")?;

    sqlx::query_as(
        r"
        UPDATE subscribers
        SET name = ?, categories = ?, frequency = ?, status = 'active',
            updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
        WHERE email = ?
        RETURNING *
        ",
    )
    .bind(name)
    .bind(categories)
    .bind(frequency)
    .bind(email)
    .fetch_optional(pool)
    .await
    .context("Failed to update subscription")
}

/// Mark a subscriber inactive. Returns false when no such subscriber exists.
pub async fn deactivate_subscriber(pool: &SqlitePool, email: &str) -> Result<bool> {
    let result = sqlx::query(
        r"
        UPDATE subscribers
        SET status = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
        WHERE email = ?
        ",
    )
    .bind(SubscriberStatus::Inactive.as_str())
    .bind(email)
    .execute(pool)
    .await
    .context("Failed to deactivate subscriber")?;

    Ok(result.rows_affected() > 0)
}

/// Get all active subscribers.
pub async fn list_active_subscribers(pool: &SqlitePool) -> Result<Vec<Subscriber>> {
    sqlx::query_as("SELECT * FROM subscribers WHERE status = ? ORDER BY id")
        .bind(SubscriberStatus::Active.as_str())
        .fetch_all(pool)
        .await
        .context("Failed to list active subscribers")
}

// ========== Email Logs ==========

/// Record a notification attempt.
pub async fn insert_email_log(pool: &SqlitePool, log: &NewEmailLog) -> Result<i64> {
    let result = sqlx::query(
        r"
        INSERT INTO email_logs (subscriber_id, email, post_id, subject, status, error)
        VALUES (?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(log.subscriber_id)
    .bind(&log.email)
    .bind(log.post_id)
    .bind(&log.subject)
    .bind(log.status.as_str())
    .bind(&log.error)
    .execute(pool)
    .await
    .context("Failed to insert email log")?;

    Ok(result.last_insert_rowid())
}

/// Get the most recent email log entries, newest first.
pub async fn get_recent_email_logs(pool: &SqlitePool, limit: i64) -> Result<Vec<EmailLog>> {
    sqlx::query_as("SELECT * FROM email_logs ORDER BY id DESC LIMIT ?")
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to fetch email logs")
}
