//! Integration tests for reconciliation and scrape runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use blog_post_pipeline::db::{
    count_posts, get_likes, get_post_by_normalized_title, insert_subscriber, Database,
    NewSubscriber, Post, Subscriber,
};
use blog_post_pipeline::extractor::{
    listing_page_url, Extracted, PageSource, PostDetail, RawPost, ScrapeSettings,
};
use blog_post_pipeline::feed::parse_feed;
use blog_post_pipeline::ingest::{
    finish_run, run_scrape, Candidate, Disposition, IngestError, IngestPath, ReconcileOutcome,
    Reconciler, SkipReason,
};
use blog_post_pipeline::notify::Notifier;
use chrono::{TimeZone, Utc};
use tempfile::TempDir;

const BASE: &str = "https://blog.example.com/blog";

async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let db = Database::new(&db_path)
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

fn raw(title: &str, likes: Option<i64>) -> RawPost {
    RawPost {
        title: Some(title.to_string()),
        likes,
        description: Some(format!("{title} summary")),
        image_url: Some("https://static.example.com/thumb.jpg".to_string()),
        link: Some(format!("{BASE}/post/{}", title.to_lowercase().replace(' ', "-"))),
        pub_date_text: Some("Mar 29".to_string()),
    }
}

fn detail(content: &str) -> PostDetail {
    PostDetail {
        content: Extracted::Present(content.to_string()),
        category: Extracted::Present("Travel, Food".to_string()),
        enclosure: Extracted::Present("https://static.example.com/full.jpg".to_string()),
    }
}

fn scraped(title: &str, likes: Option<i64>, content: Option<&str>) -> Candidate {
    Candidate::from_scrape(raw(title, likes), content.map(detail), Utc::now())
}

/// In-memory page source. Unknown listing URLs are empty pages.
#[derive(Default)]
struct FakeSource {
    pages: HashMap<String, Vec<RawPost>>,
    details: HashMap<String, PostDetail>,
    failing_listing: Option<String>,
    failing_detail: Option<String>,
    /// When set, every listing page returns these records.
    endless: Option<Vec<RawPost>>,
    visited: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
}

impl FakeSource {
    fn with_page(mut self, page: u32, posts: Vec<(RawPost, Option<PostDetail>)>) -> Self {
        let mut records = Vec::new();
        for (post, detail) in posts {
            if let (Some(link), Some(detail)) = (post.link.clone(), detail) {
                self.details.insert(link, detail);
            }
            records.push(post);
        }
        self.pages.insert(listing_page_url(BASE, page), records);
        self
    }
}

#[async_trait]
impl PageSource for FakeSource {
    async fn listing(&mut self, page_url: &str) -> Result<Vec<RawPost>> {
        self.visited.lock().unwrap().push(page_url.to_string());
        if self.failing_listing.as_deref() == Some(page_url) {
            anyhow::bail!("navigation timeout");
        }
        if let Some(records) = &self.endless {
            return Ok(records.clone());
        }
        Ok(self.pages.get(page_url).cloned().unwrap_or_default())
    }

    async fn detail(&mut self, post_url: &str) -> Result<PostDetail> {
        if self.failing_detail.as_deref() == Some(post_url) {
            anyhow::bail!("detail page timed out");
        }
        Ok(self
            .details
            .get(post_url)
            .cloned()
            .unwrap_or_else(PostDetail::not_found))
    }

    async fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records every digest it is asked to send.
#[derive(Default)]
struct RecordingNotifier {
    batches: Mutex<Vec<(String, Vec<String>)>>,
}

impl RecordingNotifier {
    fn batches(&self) -> Vec<(String, Vec<String>)> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_new_posts(&self, subscriber: &Subscriber, posts: &[Post]) -> Result<String> {
        self.batches.lock().unwrap().push((
            subscriber.email.clone(),
            posts.iter().map(|p| p.normalized_title.clone()).collect(),
        ));
        Ok("New posts".to_string())
    }

    async fn send_post(&self, _subscriber: &Subscriber, post: &Post) -> Result<String> {
        Ok(post.title.clone())
    }

    async fn send_welcome(&self, _subscriber: &Subscriber) -> Result<()> {
        Ok(())
    }
}

async fn add_subscriber(db: &Database, email: &str) {
    insert_subscriber(
        db.pool(),
        &NewSubscriber {
            email: email.to_string(),
            name: "Reader".to_string(),
            categories: vec![],
            frequency: None,
        },
        "token",
    )
    .await
    .unwrap();
}

// ========== Reconciler ==========

#[tokio::test]
async fn test_new_post_inserts_post_and_likes() {
    let (db, _temp_dir) = setup_db().await;
    let reconciler = Reconciler::new(db.pool());

    let disposition = reconciler
        .apply(scraped("Hello World", Some(12), Some("<p>Hi</p>")))
        .await
        .unwrap();
    let Disposition::Inserted(post) = disposition else {
        panic!("expected insert, got {disposition:?}");
    };

    assert_eq!(post.normalized_title, "hello-world");
    assert_eq!(post.content.as_deref(), Some("<p>Hi</p>"));
    assert_eq!(post.category.as_deref(), Some("Travel, Food"));
    assert_eq!(
        post.enclosure.as_deref(),
        Some("https://static.example.com/full.jpg")
    );
    assert!(post.pub_date.contains("-03-29T00:00:00Z"));
    assert_eq!(count_posts(db.pool(), None).await.unwrap(), 1);
    assert_eq!(get_likes(db.pool(), post.id).await.unwrap(), Some(12));
}

#[tokio::test]
async fn test_existing_post_gets_likes_only_update() {
    let (db, _temp_dir) = setup_db().await;
    let reconciler = Reconciler::new(db.pool());

    reconciler
        .apply(scraped("Hello World", Some(3), Some("<p>Original</p>")))
        .await
        .unwrap();
    let before = get_post_by_normalized_title(db.pool(), "hello-world")
        .await
        .unwrap()
        .unwrap();

    let mut changed = scraped("Hello World", Some(8), Some("<p>Rewritten</p>"));
    changed.description = Some("Different".to_string());
    changed.category = Some("Other".to_string());
    changed.enclosure = None;
    changed.pub_date = Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());

    let disposition = reconciler.apply(changed).await.unwrap();
    assert!(matches!(disposition, Disposition::LikesUpdated(_)));

    let after = get_post_by_normalized_title(db.pool(), "hello-world")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.title, before.title);
    assert_eq!(after.description, before.description);
    assert_eq!(after.content, before.content);
    assert_eq!(after.category, before.category);
    assert_eq!(after.enclosure, before.enclosure);
    assert_eq!(after.pub_date, before.pub_date);
    assert_eq!(get_likes(db.pool(), after.id).await.unwrap(), Some(8));
}

#[tokio::test]
async fn test_zero_or_missing_likes_keep_established_count() {
    let (db, _temp_dir) = setup_db().await;
    let reconciler = Reconciler::new(db.pool());

    reconciler
        .apply(scraped("Counted", Some(5), Some("<p>x</p>")))
        .await
        .unwrap();
    reconciler
        .apply(scraped("Counted", Some(0), Some("<p>x</p>")))
        .await
        .unwrap();
    reconciler
        .apply(scraped("Counted", None, Some("<p>x</p>")))
        .await
        .unwrap();

    let post = get_post_by_normalized_title(db.pool(), "counted")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(get_likes(db.pool(), post.id).await.unwrap(), Some(5));
}

#[tokio::test]
async fn test_missing_content_leaves_storage_unchanged() {
    let (db, _temp_dir) = setup_db().await;
    let reconciler = Reconciler::new(db.pool());

    let disposition = reconciler
        .apply(scraped("No Body", Some(4), None))
        .await
        .unwrap();
    assert!(matches!(
        disposition,
        Disposition::Skipped(SkipReason::MissingContent)
    ));
    assert_eq!(count_posts(db.pool(), None).await.unwrap(), 0);

    // A timed out body counts as missing too, even for a known post.
    reconciler
        .apply(scraped("No Body", Some(4), Some("<p>now</p>")))
        .await
        .unwrap();
    let mut timed_out = detail("ignored");
    timed_out.content = Extracted::TimedOut;
    let candidate = Candidate::from_scrape(raw("No Body", Some(40)), Some(timed_out), Utc::now());
    let disposition = reconciler.apply(candidate).await.unwrap();
    assert!(matches!(disposition, Disposition::Skipped(_)));

    let post = get_post_by_normalized_title(db.pool(), "no-body")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(get_likes(db.pool(), post.id).await.unwrap(), Some(4));
}

#[tokio::test]
async fn test_empty_slug_is_skipped() {
    let (db, _temp_dir) = setup_db().await;
    let reconciler = Reconciler::new(db.pool());

    let disposition = reconciler
        .apply(scraped("!!!", Some(1), Some("<p>x</p>")))
        .await
        .unwrap();
    assert!(matches!(
        disposition,
        Disposition::Skipped(SkipReason::EmptySlug)
    ));
    assert_eq!(count_posts(db.pool(), None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_missing_pub_date_uses_now_at_insert() {
    let (db, _temp_dir) = setup_db().await;
    let now = Utc.with_ymd_and_hms(2024, 6, 15, 10, 30, 0).unwrap();
    let reconciler = Reconciler::at(db.pool(), now);

    let mut candidate = scraped("Undated", None, Some("<p>x</p>"));
    candidate.pub_date = None;
    let Disposition::Inserted(post) = reconciler.apply(candidate).await.unwrap() else {
        panic!("expected insert");
    };
    assert_eq!(post.pub_date, "2024-06-15T10:30:00Z");
    assert_eq!(get_likes(db.pool(), post.id).await.unwrap(), Some(0));
}

#[tokio::test]
async fn test_same_batch_twice_has_no_duplicates() {
    let (db, _temp_dir) = setup_db().await;
    let reconciler = Reconciler::new(db.pool());

    let first = reconciler
        .reconcile(vec![
            scraped("One", Some(1), Some("<p>1</p>")),
            scraped("Two", Some(2), Some("<p>2</p>")),
        ])
        .await;
    assert_eq!(first.inserted.len(), 2);
    assert!(first.updated.is_empty());

    let second = reconciler
        .reconcile(vec![
            scraped("One", Some(10), Some("<p>1</p>")),
            scraped("Two", Some(20), Some("<p>2</p>")),
        ])
        .await;
    assert!(second.inserted.is_empty());
    assert_eq!(second.updated.len(), 2);

    assert_eq!(count_posts(db.pool(), None).await.unwrap(), 2);
    for (slug, likes) in [("one", 10), ("two", 20)] {
        let post = get_post_by_normalized_title(db.pool(), slug)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(get_likes(db.pool(), post.id).await.unwrap(), Some(likes));
    }
}

#[tokio::test]
async fn test_identical_feed_titles_store_one_post() {
    let (db, _temp_dir) = setup_db().await;

    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>t</title><link>https://blog.example.com</link><description>d</description>
  <item><title>My First Post</title><link>https://blog.example.com/post/a</link><pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate></item>
  <item><title>My First Post</title><link>https://blog.example.com/post/b</link><pubDate>Tue, 02 Jan 2024 12:00:00 +0000</pubDate></item>
</channel></rss>"#;
    let items = parse_feed(xml.as_bytes()).unwrap();
    assert_eq!(items.len(), 2);

    let outcome = Reconciler::new(db.pool())
        .reconcile(items.into_iter().map(Candidate::from_feed).collect())
        .await;

    assert_eq!(outcome.inserted.len(), 1);
    assert_eq!(outcome.unchanged, 1);
    assert_eq!(count_posts(db.pool(), None).await.unwrap(), 1);

    let post = &outcome.inserted[0];
    assert_eq!(post.link.as_deref(), Some("https://blog.example.com/post/a"));
    assert_eq!(post.pub_date, "2024-01-01T12:00:00Z");
    assert_eq!(get_likes(db.pool(), post.id).await.unwrap(), Some(0));
}

#[tokio::test]
async fn test_feed_path_never_touches_existing_likes() {
    let (db, _temp_dir) = setup_db().await;
    let reconciler = Reconciler::new(db.pool());

    reconciler
        .apply(scraped("Shared", Some(9), Some("<p>x</p>")))
        .await
        .unwrap();

    let candidate = Candidate {
        path: IngestPath::Feed,
        likes: Some(0),
        content: None,
        ..scraped("Shared", None, None)
    };
    let disposition = reconciler.apply(candidate).await.unwrap();
    assert!(matches!(disposition, Disposition::Unchanged(_)));

    let post = get_post_by_normalized_title(db.pool(), "shared")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(get_likes(db.pool(), post.id).await.unwrap(), Some(9));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_runs_insert_once() {
    let (db, _temp_dir) = setup_db().await;

    for i in 0..20 {
        let title = format!("Raced Post {i}");
        let runs: Vec<_> = (0..2)
            .map(|_| {
                let db = db.clone();
                let title = title.clone();
                tokio::spawn(async move {
                    Reconciler::new(db.pool())
                        .reconcile(vec![scraped(&title, Some(3), Some("<p>r</p>"))])
                        .await
                })
            })
            .collect();

        let mut inserted = 0;
        let mut updated = 0;
        for run in runs {
            let outcome = run.await.unwrap();
            assert_eq!(outcome.failed, 0, "{title}");
            inserted += outcome.inserted.len();
            updated += outcome.updated.len();
        }
        assert_eq!(inserted, 1, "{title}");
        assert_eq!(updated, 1, "{title}");
    }

    assert_eq!(count_posts(db.pool(), None).await.unwrap(), 20);
}

// ========== Scrape runs ==========

#[tokio::test]
async fn test_empty_page_ends_pagination_and_closes_once() {
    let (db, _temp_dir) = setup_db().await;
    let source = FakeSource::default()
        .with_page(1, vec![(raw("First", Some(1)), Some(detail("<p>1</p>")))])
        .with_page(2, vec![(raw("Second", Some(2)), Some(detail("<p>2</p>")))]);
    let visited = Arc::clone(&source.visited);
    let closes = Arc::clone(&source.closes);

    let outcome = run_scrape(source, db.pool(), &ScrapeSettings::default(), BASE)
        .await
        .unwrap();

    assert_eq!(outcome.inserted.len(), 2);
    assert_eq!(
        *visited.lock().unwrap(),
        vec![
            BASE.to_string(),
            format!("{BASE}/page/2"),
            format!("{BASE}/page/3"),
        ]
    );
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_first_page_empty() {
    let (db, _temp_dir) = setup_db().await;
    let source = FakeSource::default();
    let visited = Arc::clone(&source.visited);
    let closes = Arc::clone(&source.closes);

    let outcome = run_scrape(source, db.pool(), &ScrapeSettings::default(), BASE)
        .await
        .unwrap();

    assert!(outcome.inserted.is_empty());
    assert_eq!(visited.lock().unwrap().len(), 1);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_page_cap_bounds_endless_listing() {
    let (db, _temp_dir) = setup_db().await;
    let source = FakeSource {
        endless: Some(vec![raw("Again", Some(1))]),
        ..FakeSource::default()
    };
    let visited = Arc::clone(&source.visited);
    let closes = Arc::clone(&source.closes);
    let settings = ScrapeSettings {
        max_pages: 3,
        ..ScrapeSettings::default()
    };

    run_scrape(source, db.pool(), &settings, BASE).await.unwrap();

    assert_eq!(visited.lock().unwrap().len(), 3);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_listing_failure_is_fatal_but_keeps_progress() {
    let (db, _temp_dir) = setup_db().await;
    let source = FakeSource {
        failing_listing: Some(format!("{BASE}/page/2")),
        ..FakeSource::default()
    }
    .with_page(1, vec![(raw("Kept", Some(1)), Some(detail("<p>k</p>")))]);
    let closes = Arc::clone(&source.closes);

    let err = run_scrape(source, db.pool(), &ScrapeSettings::default(), BASE)
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Listing { page: 2, .. }));
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert!(get_post_by_normalized_title(db.pool(), "kept")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_detail_failure_is_fatal_but_keeps_progress() {
    let (db, _temp_dir) = setup_db().await;
    let broken = raw("Broken", Some(1));
    let broken_url = broken.link.clone().unwrap();
    let source = FakeSource {
        failing_detail: Some(broken_url.clone()),
        ..FakeSource::default()
    }
    .with_page(
        1,
        vec![
            (raw("Kept", Some(1)), Some(detail("<p>k</p>"))),
            (broken, Some(detail("<p>b</p>"))),
        ],
    )
    .with_page(2, vec![(raw("Unreached", Some(1)), Some(detail("<p>u</p>")))]);
    let visited = Arc::clone(&source.visited);
    let closes = Arc::clone(&source.closes);

    let err = run_scrape(source, db.pool(), &ScrapeSettings::default(), BASE)
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Detail { ref url, .. } if *url == broken_url));
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(visited.lock().unwrap().len(), 1);
    assert!(get_post_by_normalized_title(db.pool(), "kept")
        .await
        .unwrap()
        .is_some());
    assert_eq!(count_posts(db.pool(), None).await.unwrap(), 1);
}

#[tokio::test]
async fn test_records_without_content_are_dropped() {
    let (db, _temp_dir) = setup_db().await;
    let mut no_link = raw("Linkless", Some(1));
    no_link.link = None;
    let source = FakeSource::default().with_page(
        1,
        vec![
            (raw("Good", Some(1)), Some(detail("<p>g</p>"))),
            (raw("Bodyless", Some(1)), None),
            (no_link, None),
        ],
    );

    let outcome = run_scrape(source, db.pool(), &ScrapeSettings::default(), BASE)
        .await
        .unwrap();

    assert_eq!(outcome.inserted.len(), 1);
    assert_eq!(outcome.skipped, 2);
    assert_eq!(count_posts(db.pool(), None).await.unwrap(), 1);
}

// ========== Run completion ==========

#[tokio::test]
async fn test_dispatcher_gets_exactly_inserted_posts() {
    let (db, _temp_dir) = setup_db().await;
    add_subscriber(&db, "reader@example.com").await;
    let reconciler = Reconciler::new(db.pool());

    reconciler
        .apply(scraped("Old News", Some(1), Some("<p>o</p>")))
        .await
        .unwrap();

    let outcome = reconciler
        .reconcile(vec![
            scraped("Old News", Some(2), Some("<p>o</p>")),
            scraped("Fresh", Some(1), Some("<p>f</p>")),
            scraped("Skipped", Some(1), None),
        ])
        .await;

    let notifier = RecordingNotifier::default();
    let summary = finish_run(db.pool(), &notifier, IngestPath::Scrape, outcome).await;

    assert_eq!(summary.new_posts.len(), 1);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(
        notifier.batches(),
        vec![("reader@example.com".to_string(), vec!["fresh".to_string()])]
    );
    let report = summary.notification.unwrap();
    assert_eq!(report.sent, 1);
}

#[tokio::test]
async fn test_dispatcher_not_invoked_without_inserts() {
    let (db, _temp_dir) = setup_db().await;
    add_subscriber(&db, "reader@example.com").await;

    let notifier = RecordingNotifier::default();
    let summary = finish_run(
        db.pool(),
        &notifier,
        IngestPath::Feed,
        ReconcileOutcome::default(),
    )
    .await;

    assert!(summary.new_posts.is_empty());
    assert!(summary.notification.is_none());
    assert!(notifier.batches().is_empty());
}
