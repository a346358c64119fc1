//! Headless Chromium session used by one scrape run.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::selectors::{parse_detail, parse_listing, validate, SelectorWaits};
use super::{PageSource, PostDetail, RawPost, ScrapeSettings};

/// Poll interval while waiting for a selector to appear.
const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Decides when the auto-scroll routine has reached the end of a page.
///
/// The page is done once the scrolled distance reaches the measured scroll
/// height and that height did not grow since the previous step.
#[derive(Debug, Clone)]
pub struct ScrollTracker {
    step: f64,
    scrolled: f64,
    last_height: Option<f64>,
}

impl ScrollTracker {
    #[must_use]
    pub fn new(step_px: u32) -> Self {
        Self {
            step: f64::from(step_px),
            scrolled: 0.0,
            last_height: None,
        }
    }

    /// Record one scroll step and the height measured after it. Returns true when done.
    pub fn advance(&mut self, height: f64) -> bool {
        self.scrolled += self.step;
        let grew = self.last_height.is_some_and(|last| height > last);
        self.last_height = Some(height);
        self.scrolled >= height && !grew
    }
}

/// A headless browser owned by a single ingestion run.
///
/// Opens one tab per listing page and per post page and closes each after
/// use. Call [`PageSource::close`] when the run ends.
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    settings: ScrapeSettings,
    closed: bool,
}

impl BrowserSession {
    /// Launch a headless browser.
    ///
    /// # Errors
    ///
    /// Returns an error if a selector is invalid or the browser cannot start.
    pub async fn launch(settings: &ScrapeSettings) -> Result<Self> {
        validate(&settings.listing, &settings.detail)?;

        info!("Launching headless browser for scrape run");

        let mut config_builder = BrowserConfig::builder()
            .window_size(settings.viewport_width, settings.viewport_height)
            .request_timeout(settings.navigation_timeout)
            .no_sandbox()
            .disable_default_args()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-setuid-sandbox")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("--disable-sync")
            .arg("--mute-audio");

        if let Some(ref chrome_path) = settings.chrome_path {
            config_builder = config_builder.chrome_executable(chrome_path);
        }

        let browser_config = config_builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("Failed to launch browser")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {e}");
                }
            }
        });

        Ok(Self {
            browser,
            handler,
            settings: settings.clone(),
            closed: false,
        })
    }

    /// Open a new tab on `url` and wait for it to finish loading.
    async fn open(&self, url: &str) -> Result<Page> {
        let load = async {
            let page = self
                .browser
                .new_page(url)
                .await
                .with_context(|| format!("Failed to open page {url}"))?;
            page.wait_for_navigation()
                .await
                .with_context(|| format!("Navigation failed for {url}"))?;
            Ok::<_, anyhow::Error>(page)
        };

        tokio::time::timeout(self.settings.navigation_timeout, load)
            .await
            .map_err(|_| anyhow::anyhow!("Timed out loading {url}"))?
    }

    /// Scroll to the bottom repeatedly so lazy-loaded items render.
    async fn auto_scroll(&self, page: &Page) -> Result<()> {
        let mut tracker = ScrollTracker::new(self.settings.scroll_step_px);
        let script = format!(
            "window.scrollBy(0, {}); document.body.scrollHeight",
            self.settings.scroll_step_px
        );

        for _ in 0..self.settings.scroll_max_steps {
            let height: f64 = page
                .evaluate(script.as_str())
                .await
                .context("Failed to scroll page")?
                .into_value()
                .context("Scroll height was not a number")?;

            if tracker.advance(height) {
                return Ok(());
            }
            tokio::time::sleep(self.settings.scroll_interval).await;
        }

        debug!(
            max_steps = self.settings.scroll_max_steps,
            "Auto-scroll stopped at step limit"
        );
        Ok(())
    }

    /// Wait up to `timeout` for `selector` to match. Returns false on timeout.
    async fn wait_for_selector(page: &Page, selector: &str, timeout: Duration) -> bool {
        let poll = async {
            while page.find_element(selector).await.is_err() {
                tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, poll).await.is_ok()
    }

    async fn listing_snapshot(&self, page: &Page) -> Result<String> {
        self.auto_scroll(page).await?;
        page.content().await.context("Failed to read listing page HTML")
    }

    async fn detail_snapshot(&self, page: &Page, post_url: &str) -> Result<(String, SelectorWaits)> {
        self.auto_scroll(page).await?;
        tokio::time::sleep(self.settings.detail_settle).await;

        let timeout = self.settings.selector_timeout;
        let selectors = &self.settings.detail;
        let waits = SelectorWaits {
            content: Self::wait_for_selector(page, &selectors.content, timeout).await,
            category: Self::wait_for_selector(page, &selectors.category, timeout).await,
            enclosure: Self::wait_for_selector(page, &selectors.enclosure, timeout).await,
        };

        for (field, appeared) in [
            ("content", waits.content),
            ("category", waits.category),
            ("enclosure", waits.enclosure),
        ] {
            if !appeared {
                info!(url = %post_url, field, "Selector timed out");
            }
        }

        let html = page
            .content()
            .await
            .context("Failed to read post page HTML")?;
        Ok((html, waits))
    }
}

async fn close_page(page: Page) {
    if let Err(e) = page.close().await {
        warn!("Failed to close page: {e}");
    }
}

#[async_trait]
impl PageSource for BrowserSession {
    async fn listing(&mut self, page_url: &str) -> Result<Vec<RawPost>> {
        let base = Url::parse(page_url).with_context(|| format!("Invalid listing URL {page_url}"))?;

        debug!(url = %page_url, "Loading listing page");
        let page = self.open(page_url).await?;
        let snapshot = self.listing_snapshot(&page).await;
        close_page(page).await;

        parse_listing(&snapshot?, &base, &self.settings.listing)
    }

    async fn detail(&mut self, post_url: &str) -> Result<PostDetail> {
        let base = Url::parse(post_url).with_context(|| format!("Invalid post URL {post_url}"))?;

        debug!(url = %post_url, "Loading post page");
        let page = self.open(post_url).await?;
        let snapshot = self.detail_snapshot(&page, post_url).await;
        close_page(page).await;

        let (html, waits) = snapshot?;
        parse_detail(&html, &base, &self.settings.detail, waits)
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let result = self.browser.close().await;
        // Reap the child process so it does not linger as a zombie.
        if let Err(e) = self.browser.wait().await {
            debug!("Failed to reap browser process: {e}");
        }
        self.handler.abort();

        result.context("Failed to close browser")?;
        info!("Browser closed");
        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if !self.closed {
            warn!("Browser session dropped without close");
            self.handler.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scroll_stops_at_static_bottom() {
        let mut tracker = ScrollTracker::new(100);
        assert!(!tracker.advance(300.0));
        assert!(!tracker.advance(300.0));
        assert!(tracker.advance(300.0));
    }

    #[test]
    fn test_scroll_continues_while_height_grows() {
        let mut tracker = ScrollTracker::new(100);
        assert!(!tracker.advance(150.0));
        // Scrolled far enough, but the page just grew.
        assert!(!tracker.advance(200.0));
        assert!(!tracker.advance(400.0));
        assert!(tracker.advance(400.0));
    }

    #[test]
    fn test_short_page_done_after_first_step() {
        let mut tracker = ScrollTracker::new(100);
        assert!(tracker.advance(80.0));
    }
}
