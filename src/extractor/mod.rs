//! Headless-browser extraction of blog listing and detail pages.
//!
//! A [`PageSource`] loads pages and turns them into raw records. The
//! production source is [`BrowserSession`], which drives one headless
//! Chromium for the lifetime of a single ingestion run.

mod browser;
mod pagination;
mod selectors;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

pub use browser::{BrowserSession, ScrollTracker};
pub use pagination::{listing_page_url, ListingPage, ListingPages};
pub use selectors::{
    parse_detail, parse_likes, parse_listing, validate as validate_selectors, DetailSelectors,
    ListingSelectors, SelectorWaits,
};

/// Settings for a scrape run.
#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    /// Path to Chrome/Chromium executable (None for auto-detection).
    pub chrome_path: Option<String>,
    /// Hard cap on listing pages visited in one run.
    pub max_pages: u32,
    /// Page load timeout.
    pub navigation_timeout: Duration,
    /// Per-field timeout for detail page selectors.
    pub selector_timeout: Duration,
    pub scroll_step_px: u32,
    pub scroll_interval: Duration,
    pub scroll_max_steps: u32,
    /// Extra wait after scrolling a detail page, for late-rendering widgets.
    pub detail_settle: Duration,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub listing: ListingSelectors,
    pub detail: DetailSelectors,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            chrome_path: None,
            max_pages: 50,
            navigation_timeout: Duration::from_secs(30),
            selector_timeout: Duration::from_secs(5),
            scroll_step_px: 100,
            scroll_interval: Duration::from_millis(100),
            scroll_max_steps: 500,
            detail_settle: Duration::from_millis(3000),
            viewport_width: 1280,
            viewport_height: 800,
            listing: ListingSelectors::default(),
            detail: DetailSelectors::default(),
        }
    }
}

/// Outcome of extracting one optional field.
///
/// Keeps "the selector never showed up in time" apart from "the page has no
/// such element".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted<T> {
    Present(T),
    TimedOut,
    NotFound,
}

impl<T> Extracted<T> {
    #[must_use]
    pub fn from_option(value: Option<T>) -> Self {
        value.map_or(Self::NotFound, Self::Present)
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    #[must_use]
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Present(v) => Some(v),
            Self::TimedOut | Self::NotFound => None,
        }
    }
}

/// One post summary scraped from a listing page. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPost {
    pub title: Option<String>,
    pub likes: Option<i64>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub link: Option<String>,
    pub pub_date_text: Option<String>,
}

/// Fields only available on a post's own page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDetail {
    /// Inner HTML of the post body.
    pub content: Extracted<String>,
    /// Category names joined with `", "`.
    pub category: Extracted<String>,
    pub enclosure: Extracted<String>,
}

impl PostDetail {
    /// A detail that could not be loaded at all.
    #[must_use]
    pub fn not_found() -> Self {
        Self {
            content: Extracted::NotFound,
            category: Extracted::NotFound,
            enclosure: Extracted::NotFound,
        }
    }
}

/// Something that can load listing and detail pages.
///
/// A source is owned by exactly one run, which must call [`PageSource::close`]
/// once on every exit path.
#[async_trait]
pub trait PageSource: Send {
    /// Extract every post summary on one listing page.
    async fn listing(&mut self, page_url: &str) -> Result<Vec<RawPost>>;

    /// Extract body, categories and enclosure from a post page.
    async fn detail(&mut self, post_url: &str) -> Result<PostDetail>;

    /// Release the underlying resources.
    async fn close(&mut self) -> Result<()>;
}
