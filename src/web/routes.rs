use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use once_cell::sync::Lazy;
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use super::auth::RequireAdmin;
use super::feeds::{generate_rss, FeedChannel};
use super::share::{is_crawler, render_not_found, render_post_preview, ShareSite};
use super::AppState;
use crate::db::{
    count_posts, deactivate_subscriber, get_post, get_post_by_normalized_title, get_post_by_title,
    get_post_with_likes,
    get_recent_email_logs, get_subscriber_by_email, insert_post_with_likes, insert_subscriber,
    list_categories, list_posts_page, list_posts_with_likes, reactivate_subscriber,
    update_subscription, upsert_likes, EmailStatus, InsertOutcome, NewPost, NewSubscriber,
    Subscriber,
};
use crate::ingest::{force_update, pubdate::format_timestamp, scrape_and_notify};
use crate::notify::{notify_single_post, send_test_post};
use crate::slug::normalize_title;

/// Page size when none is requested.
const DEFAULT_PAGE_SIZE: i64 = 10;
/// Largest page size a client may request.
const MAX_PAGE_SIZE: i64 = 50;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

/// Create the router with all routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(health))
        // Ingestion triggers
        .route("/api/scrape", get(scrape))
        .route("/api/force-update-posts", get(force_update_posts))
        // Posts
        .route("/api/rss-feed", get(all_posts))
        .route("/api/post/:slug", get(post_by_slug))
        .route("/api/update-likes", post(update_likes))
        .route("/api/posts", get(posts_page))
        .route("/api/categories", get(categories))
        .route("/blog-feed.xml", get(blog_feed))
        .route("/post/:title", get(share_post))
        // Subscribers
        .route("/api/subscribe", post(subscribe))
        .route("/api/subscriber/:email", get(subscriber))
        .route("/api/update-subscription", post(change_subscription))
        .route("/api/unsubscribe/:email", get(unsubscribe))
        // Admin
        .route("/api/admin/post", post(create_post))
        .route("/api/admin/email-logs", get(email_logs))
        .route(
            "/api/send-email-to-subscribers/:id",
            post(send_post_to_subscribers),
        )
        .route("/api/send-test-post-email/:id", post(send_test_post_email))
}

fn internal_error(what: &str, e: &anyhow::Error) -> Response {
    error!("{what}: {e:#}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": what })),
    )
        .into_response()
}

fn message(status: StatusCode, text: &str) -> Response {
    (status, Json(json!({ "success": status.is_success(), "message": text }))).into_response()
}

async fn health() -> &'static str {
    "ok"
}

// ========== Ingestion ==========

async fn scrape(State(state): State<AppState>) -> Response {
    info!("Scrape run requested");
    match scrape_and_notify(
        state.db.pool(),
        state.notifier.as_ref(),
        &state.config.scrape,
        &state.config.blog_base_url,
    )
    .await
    {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => {
            error!("Scrape run failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Scrape run failed", "message": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn force_update_posts(State(state): State<AppState>) -> Response {
    info!("Force update requested");
    match force_update(
        &state.http,
        state.db.pool(),
        state.notifier.as_ref(),
        &state.config.rss_feed_url,
    )
    .await
    {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => {
            error!("Force update failed: {e}");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "Force update failed", "message": e.to_string() })),
            )
                .into_response()
        }
    }
}

// ========== Posts ==========

async fn all_posts(State(state): State<AppState>) -> Response {
    match list_posts_with_likes(state.db.pool()).await {
        Ok(posts) => Json(posts).into_response(),
        Err(e) => internal_error("Failed to fetch posts", &e),
    }
}

async fn post_by_slug(State(state): State<AppState>, Path(slug): Path<String>) -> Response {
    match get_post_with_likes(state.db.pool(), &slug).await {
        Ok(Some(post)) => Json(post).into_response(),
        Ok(None) => message(StatusCode::NOT_FOUND, "Post not found"),
        Err(e) => internal_error("Failed to fetch post", &e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateLikesRequest {
    title: String,
    likes_count: i64,
}

async fn update_likes(
    State(state): State<AppState>,
    Json(request): Json<UpdateLikesRequest>,
) -> Response {
    if request.likes_count < 0 {
        return message(StatusCode::BAD_REQUEST, "likesCount must not be negative");
    }

    let post = match get_post_by_title(state.db.pool(), &request.title).await {
        Ok(Some(post)) => post,
        Ok(None) => return message(StatusCode::NOT_FOUND, "Post not found"),
        Err(e) => return internal_error("Failed to fetch post", &e),
    };

    match upsert_likes(state.db.pool(), post.id, request.likes_count).await {
        Ok(()) => {
            info!(post_id = post.id, likes = request.likes_count, "Likes updated");
            message(StatusCode::OK, "Likes count updated successfully")
        }
        Err(e) => internal_error("Failed to update likes", &e),
    }
}

/// Query parameters are parsed leniently: junk or non-positive values fall back to defaults.
#[derive(Debug, Default, Deserialize)]
struct PageParams {
    page: Option<String>,
    limit: Option<String>,
    category: Option<String>,
}

impl PageParams {
    fn page(&self) -> i64 {
        positive(self.page.as_deref()).unwrap_or(1)
    }

    fn limit(&self) -> i64 {
        positive(self.limit.as_deref())
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE)
    }

    fn category(&self) -> Option<&str> {
        self.category.as_deref().filter(|c| !c.is_empty())
    }
}

fn positive(value: Option<&str>) -> Option<i64> {
    value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v > 0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    page: i64,
    limit: i64,
    total_posts: i64,
    total_pages: i64,
    has_next: bool,
    has_prev: bool,
}

impl Pagination {
    fn new(page: i64, limit: i64, total_posts: i64) -> Self {
        let total_pages = (total_posts + limit - 1) / limit;
        Self {
            page,
            limit,
            total_posts,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }

    fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

async fn posts_page(State(state): State<AppState>, Query(params): Query<PageParams>) -> Response {
    let category = params.category();

    let total = match count_posts(state.db.pool(), category).await {
        Ok(total) => total,
        Err(e) => return internal_error("Failed to fetch posts", &e),
    };
    let pagination = Pagination::new(params.page(), params.limit(), total);

    match list_posts_page(
        state.db.pool(),
        pagination.limit,
        pagination.offset(),
        category,
    )
    .await
    {
        Ok(posts) => Json(json!({ "posts": posts, "pagination": pagination })).into_response(),
        Err(e) => internal_error("Failed to fetch posts", &e),
    }
}

async fn categories(State(state): State<AppState>) -> Response {
    match list_categories(state.db.pool()).await {
        Ok(categories) => Json(categories).into_response(),
        Err(e) => internal_error("Failed to fetch categories", &e),
    }
}

async fn blog_feed(State(state): State<AppState>, Query(params): Query<PageParams>) -> Response {
    let pagination = Pagination::new(params.page(), params.limit(), 0);

    let posts = match list_posts_page(
        state.db.pool(),
        pagination.limit,
        pagination.offset(),
        None,
    )
    .await
    {
        Ok(posts) => posts,
        Err(e) => {
            error!("Failed to generate RSS feed: {e:#}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to generate RSS feed").into_response();
        }
    };

    let config = &state.config;
    let xml = generate_rss(
        &posts,
        &FeedChannel {
            title: &config.blog_title,
            description: &config.blog_description,
            base_url: &config.public_base_url,
        },
    );

    (
        [(header::CONTENT_TYPE, "application/rss+xml; charset=utf-8")],
        xml,
    )
        .into_response()
}

/// Link previews for crawlers; everyone else goes to the post on the public site.
async fn share_post(
    State(state): State<AppState>,
    Path(title): Path<String>,
    headers: HeaderMap,
) -> Response {
    let config = &state.config;
    let site = ShareSite {
        title: &config.blog_title,
        description: &config.blog_description,
        base_url: &config.public_base_url,
    };
    let slug = normalize_title(&title);

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !is_crawler(user_agent) {
        return Redirect::temporary(&site.post_url(&slug)).into_response();
    }

    let (status, page) = match get_post_by_normalized_title(state.db.pool(), &slug).await {
        Ok(Some(post)) => (StatusCode::OK, render_post_preview(&post, &site)),
        Ok(None) => (StatusCode::NOT_FOUND, render_not_found(&site)),
        Err(e) => {
            error!("Failed to fetch post for preview: {e:#}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Error loading post").into_response();
        }
    };

    (
        status,
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        page.into_string(),
    )
        .into_response()
}

// ========== Subscribers ==========

/// Public view of a subscriber. The unsubscribe token stays private.
#[derive(Debug, Serialize)]
struct SubscriberView {
    email: String,
    name: String,
    categories: Vec<String>,
    frequency: Option<String>,
    status: String,
    created_at: String,
}

impl From<&Subscriber> for SubscriberView {
    fn from(s: &Subscriber) -> Self {
        Self {
            email: s.email.clone(),
            name: s.name.clone(),
            categories: s.category_list(),
            frequency: s.frequency.clone(),
            status: s.status.clone(),
            created_at: s.created_at.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubscriptionRequest {
    email: String,
    name: String,
    #[serde(default)]
    categories: Vec<String>,
    frequency: Option<String>,
}

impl SubscriptionRequest {
    /// Trimmed and checked copy of the request.
    fn validated(self) -> Result<NewSubscriber, &'static str> {
        let email = self.email.trim().to_lowercase();
        let name = self.name.trim().to_string();

        if !EMAIL_RE.is_match(&email) {
            return Err("A valid email address is required");
        }
        if name.is_empty() {
            return Err("Name is required");
        }

        Ok(NewSubscriber {
            email,
            name,
            categories: self
                .categories
                .into_iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            frequency: self.frequency.filter(|f| !f.trim().is_empty()),
        })
    }
}

fn unsubscribe_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

async fn subscribe(
    State(state): State<AppState>,
    Json(request): Json<SubscriptionRequest>,
) -> Response {
    let new = match request.validated() {
        Ok(new) => new,
        Err(reason) => return message(StatusCode::BAD_REQUEST, reason),
    };
    let pool = state.db.pool();

    match get_subscriber_by_email(pool, &new.email).await {
        Ok(Some(_)) => {
            return match reactivate_subscriber(pool, &new.email, &new.name).await {
                Ok(Some(subscriber)) => {
                    info!(email = %subscriber.email, "Subscriber reactivated");
                    (
                        StatusCode::OK,
                        Json(json!({
                            "success": true,
                            "message": "Subscription updated",
                            "subscriber": SubscriberView::from(&subscriber),
                        })),
                    )
                        .into_response()
                }
                Ok(None) => message(StatusCode::NOT_FOUND, "Subscriber not found"),
                Err(e) => internal_error("Failed to update subscriber", &e),
            };
        }
        Ok(None) => {}
        Err(e) => return internal_error("Failed to look up subscriber", &e),
    }

    if let Err(e) = insert_subscriber(pool, &new, &unsubscribe_token()).await {
        return internal_error("Failed to add subscriber", &e);
    }

    let subscriber = match get_subscriber_by_email(pool, &new.email).await {
        Ok(Some(subscriber)) => subscriber,
        Ok(None) => return message(StatusCode::INTERNAL_SERVER_ERROR, "Subscriber vanished"),
        Err(e) => return internal_error("Failed to load subscriber", &e),
    };
    info!(email = %subscriber.email, "New subscriber");

    if let Err(e) = state.notifier.send_welcome(&subscriber).await {
        warn!(email = %subscriber.email, "Failed to send welcome email: {e:#}");
    }

    (
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Subscribed successfully",
            "subscriber": SubscriberView::from(&subscriber),
        })),
    )
        .into_response()
}

async fn subscriber(State(state): State<AppState>, Path(email): Path<String>) -> Response {
    match get_subscriber_by_email(state.db.pool(), &email.trim().to_lowercase()).await {
        Ok(Some(subscriber)) => Json(json!({
            "success": true,
            "subscriber": SubscriberView::from(&subscriber),
        }))
        .into_response(),
        Ok(None) => message(StatusCode::NOT_FOUND, "Subscriber not found"),
        Err(e) => internal_error("Failed to fetch subscriber", &e),
    }
}

async fn change_subscription(
    State(state): State<AppState>,
    Json(request): Json<SubscriptionRequest>,
) -> Response {
    let update = match request.validated() {
        Ok(update) => update,
        Err(reason) => return message(StatusCode::BAD_REQUEST, reason),
    };

    match update_subscription(
        state.db.pool(),
        &update.email,
        &update.name,
        &update.categories,
        update.frequency.as_deref(),
    )
    .await
    {
        Ok(Some(subscriber)) => Json(json!({
            "success": true,
            "message": "Subscription preferences updated",
            "subscriber": SubscriberView::from(&subscriber),
        }))
        .into_response(),
        Ok(None) => message(StatusCode::NOT_FOUND, "Subscriber not found"),
        Err(e) => internal_error("Failed to update subscription", &e),
    }
}

async fn unsubscribe(State(state): State<AppState>, Path(email): Path<String>) -> Response {
    match deactivate_subscriber(state.db.pool(), &email.trim().to_lowercase()).await {
        Ok(true) => {
            info!(email = %email, "Subscriber unsubscribed");
            message(StatusCode::OK, "Unsubscribed successfully")
        }
        Ok(false) => message(StatusCode::NOT_FOUND, "Subscriber not found"),
        Err(e) => internal_error("Failed to unsubscribe", &e),
    }
}

// ========== Admin ==========

#[derive(Debug, Deserialize)]
struct CreatePostRequest {
    title: Option<String>,
    description: Option<String>,
    image_url: Option<String>,
    link: Option<String>,
    content: Option<String>,
    category: Option<String>,
    enclosure: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

async fn create_post(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Json(request): Json<CreatePostRequest>,
) -> Response {
    let (Some(title), Some(content)) = (non_blank(request.title), non_blank(request.content))
    else {
        return message(StatusCode::BAD_REQUEST, "Title and content are required");
    };

    let slug = normalize_title(&title);
    if slug.is_empty() {
        return message(StatusCode::BAD_REQUEST, "Title must contain letters or digits");
    }

    let new_post = NewPost {
        title: title.trim().to_string(),
        normalized_title: slug,
        description: non_blank(request.description),
        image_url: non_blank(request.image_url),
        link: non_blank(request.link),
        pub_date: format_timestamp(Utc::now()),
        content: Some(content),
        category: non_blank(request.category),
        enclosure: non_blank(request.enclosure),
    };

    let id = match insert_post_with_likes(state.db.pool(), &new_post, 0).await {
        Ok(InsertOutcome::Inserted(id)) => id,
        Ok(InsertOutcome::Conflict) => {
            return message(StatusCode::CONFLICT, "A post with this title already exists")
        }
        Err(e) => return internal_error("Failed to create post", &e),
    };

    match get_post(state.db.pool(), id).await {
        Ok(Some(post)) => {
            info!(post_id = id, slug = %post.normalized_title, "Post created by admin");
            (
                StatusCode::CREATED,
                Json(json!({ "success": true, "post": post })),
            )
                .into_response()
        }
        Ok(None) => message(StatusCode::INTERNAL_SERVER_ERROR, "Created post not found"),
        Err(e) => internal_error("Failed to load created post", &e),
    }
}

async fn send_post_to_subscribers(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Response {
    let post = match get_post(state.db.pool(), id).await {
        Ok(Some(post)) => post,
        Ok(None) => return message(StatusCode::NOT_FOUND, "Post not found"),
        Err(e) => return internal_error("Failed to fetch post", &e),
    };

    match notify_single_post(state.db.pool(), state.notifier.as_ref(), &post).await {
        Ok(report) => Json(json!({ "success": true, "report": report })).into_response(),
        Err(e) => internal_error("Failed to send post", &e),
    }
}

#[derive(Debug, Deserialize)]
struct TestEmailRequest {
    #[serde(default)]
    email: String,
}

async fn send_test_post_email(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<TestEmailRequest>,
) -> Response {
    let email = request.email.trim().to_lowercase();
    if !EMAIL_RE.is_match(&email) {
        return message(StatusCode::BAD_REQUEST, "A valid email address is required");
    }

    let post = match get_post(state.db.pool(), id).await {
        Ok(Some(post)) => post,
        Ok(None) => return message(StatusCode::NOT_FOUND, "Post not found"),
        Err(e) => return internal_error("Failed to fetch post", &e),
    };

    match send_test_post(state.db.pool(), state.notifier.as_ref(), &email, &post).await {
        Ok(EmailStatus::Sent) => {
            info!(email = %email, post_id = id, "Test email sent");
            message(StatusCode::OK, &format!("Test email sent to {email}"))
        }
        Ok(EmailStatus::Failed) => message(StatusCode::BAD_GATEWAY, "Failed to send test email"),
        Err(e) => internal_error("Failed to send test email", &e),
    }
}

#[derive(Debug, Deserialize)]
struct LogParams {
    limit: Option<String>,
}

async fn email_logs(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Query(params): Query<LogParams>,
) -> Response {
    let limit = positive(params.limit.as_deref()).unwrap_or(100).min(1000);
    match get_recent_email_logs(state.db.pool(), limit).await {
        Ok(logs) => Json(logs).into_response(),
        Err(e) => internal_error("Failed to fetch email logs", &e),
    }
}
