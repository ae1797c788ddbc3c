//! Headless browser rendering for infinite-scroll listing pages.
//!
//! The scroll loop is written against [`PageDriver`] so it can run against
//! Chromium in production and a scripted driver in tests. Whatever happens
//! while rendering, [`render_page`] quits the driver before returning.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{BrowserSettings, USER_AGENT};
use crate::error::HarvestError;

const SCROLL_HEIGHT_SCRIPT: &str = "document.documentElement.scrollHeight";
const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// The browser operations the fetcher relies on
#[async_trait]
pub trait PageDriver: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), HarvestError>;

    /// Wait until `selector` matches an element, or fail after `timeout`.
    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration)
    -> Result<(), HarvestError>;

    async fn scroll_to(&mut self, y: u64) -> Result<(), HarvestError>;

    async fn evaluate(&mut self, script: &str) -> Result<Value, HarvestError>;

    async fn page_source(&mut self) -> Result<String, HarvestError>;

    /// Release the session. Never fails; problems are logged.
    async fn quit(&mut self);
}

/// Creates a fresh driver for each fetch
#[async_trait]
pub trait DriverLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn PageDriver>, HarvestError>;
}

/// Result of the scroll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollSummary {
    pub steps: u32,
    pub final_height: u64,
    /// False when the step cap stopped the loop first
    pub reached_bottom: bool,
}

/// Scroll down in fixed increments until the page stops growing ahead of the
/// cursor or the step cap is hit.
pub async fn scroll_until_stable(
    driver: &mut dyn PageDriver,
    settings: &BrowserSettings,
) -> Result<ScrollSummary, HarvestError> {
    let step = u64::from(settings.scroll_step_px);
    let mut position = 0u64;
    let mut height = 0u64;
    let mut steps = 0u32;

    while steps < settings.max_scroll_steps {
        position += step;
        driver.scroll_to(position).await?;
        tokio::time::sleep(settings.scroll_pause).await;
        steps += 1;

        height = scroll_height(driver).await?;
        debug!("Scroll step {}: position {} of {}", steps, position, height);

        if position >= height {
            return Ok(ScrollSummary {
                steps,
                final_height: height,
                reached_bottom: true,
            });
        }
    }

    info!(
        "Reached maximum scroll steps ({}) before the page stabilized",
        settings.max_scroll_steps
    );
    Ok(ScrollSummary {
        steps,
        final_height: height,
        reached_bottom: false,
    })
}

async fn scroll_height(driver: &mut dyn PageDriver) -> Result<u64, HarvestError> {
    let value = driver.evaluate(SCROLL_HEIGHT_SCRIPT).await?;
    value
        .as_f64()
        .map(|h| h.max(0.0) as u64)
        .ok_or_else(|| HarvestError::Browser(format!("unexpected scroll height value: {value}")))
}

/// Load `url`, wait for `root_selector`, scroll to the end and return the page source.
///
/// The driver is quit on every path.
pub async fn render_page(
    driver: &mut dyn PageDriver,
    url: &str,
    root_selector: &str,
    settings: &BrowserSettings,
) -> Result<String, HarvestError> {
    let result = render_inner(driver, url, root_selector, settings).await;
    driver.quit().await;
    result
}

async fn render_inner(
    driver: &mut dyn PageDriver,
    url: &str,
    root_selector: &str,
    settings: &BrowserSettings,
) -> Result<String, HarvestError> {
    let fetch_failed = |e: HarvestError| match e {
        HarvestError::FetchFailed { .. } => e,
        other => HarvestError::FetchFailed {
            url: url.to_string(),
            reason: other.to_string(),
        },
    };

    info!("Rendering {}", url);
    driver.navigate(url).await.map_err(fetch_failed)?;
    driver
        .wait_for_selector(root_selector, settings.root_timeout)
        .await
        .map_err(fetch_failed)?;

    let summary = scroll_until_stable(driver, settings)
        .await
        .map_err(fetch_failed)?;
    info!(
        "Scrolled {} steps, final page height {}px",
        summary.steps, summary.final_height
    );

    driver.page_source().await.map_err(fetch_failed)
}

/// Headless Chromium over the DevTools protocol
pub struct ChromeDriver {
    browser: Browser,
    page: Option<Page>,
    handler: JoinHandle<()>,
}

impl ChromeDriver {
    pub async fn launch() -> Result<Self, HarvestError> {
        let config = BrowserConfig::builder()
            .window_size(1366, 900)
            .arg(format!("--user-agent={USER_AGENT}"))
            .build()
            .map_err(HarvestError::Browser)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| HarvestError::Browser(format!("failed to launch Chromium: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser,
            page: None,
            handler,
        })
    }

    fn page(&self) -> Result<&Page, HarvestError> {
        self.page
            .as_ref()
            .ok_or_else(|| HarvestError::Browser("no page loaded".to_string()))
    }
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), HarvestError> {
        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|e| HarvestError::FetchFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        self.page = Some(page);
        Ok(())
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), HarvestError> {
        let page = self.page()?;
        let deadline = Instant::now() + timeout;

        loop {
            if page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(HarvestError::Browser(format!(
                    "timed out after {}s waiting for '{}'",
                    timeout.as_secs(),
                    selector
                )));
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn scroll_to(&mut self, y: u64) -> Result<(), HarvestError> {
        self.evaluate(&format!("window.scrollTo(0, {y})")).await.map(|_| ())
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value, HarvestError> {
        let result = self
            .page()?
            .evaluate(script)
            .await
            .map_err(|e| HarvestError::Browser(format!("script failed: {e}")))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn page_source(&mut self) -> Result<String, HarvestError> {
        self.page()?
            .content()
            .await
            .map_err(|e| HarvestError::Browser(format!("failed to read page source: {e}")))
    }

    async fn quit(&mut self) {
        if let Some(page) = self.page.take()
            && let Err(e) = page.close().await
        {
            debug!("Failed to close page: {}", e);
        }
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            warn!("Failed to wait for browser exit: {}", e);
        }
        self.handler.abort();
    }
}

/// Launches [`ChromeDriver`] sessions
pub struct ChromeLauncher;

#[async_trait]
impl DriverLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn PageDriver>, HarvestError> {
        Ok(Box::new(ChromeDriver::launch().await?))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Scripted driver: each measured height is popped from `heights`,
    /// repeating the last one when exhausted.
    pub(crate) struct ScriptedDriver {
        pub heights: Vec<u64>,
        pub source: String,
        pub root_present: bool,
        /// Make `page_source` fail like a dropped CDP session
        pub source_lost: bool,
        pub log: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedDriver {
        pub(crate) fn new(heights: Vec<u64>, source: &str) -> Self {
            Self {
                heights,
                source: source.to_string(),
                root_present: true,
                source_lost: false,
                log: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn push(&self, entry: String) {
            self.log.lock().unwrap().push(entry);
        }
    }

    #[async_trait]
    impl PageDriver for ScriptedDriver {
        async fn navigate(&mut self, url: &str) -> Result<(), HarvestError> {
            self.push(format!("navigate {url}"));
            Ok(())
        }

        async fn wait_for_selector(
            &mut self,
            selector: &str,
            _timeout: Duration,
        ) -> Result<(), HarvestError> {
            self.push(format!("wait {selector}"));
            if self.root_present {
                Ok(())
            } else {
                Err(HarvestError::Browser(format!("timed out waiting for '{selector}'")))
            }
        }

        async fn scroll_to(&mut self, y: u64) -> Result<(), HarvestError> {
            self.push(format!("scroll {y}"));
            Ok(())
        }

        async fn evaluate(&mut self, _script: &str) -> Result<Value, HarvestError> {
            let height = if self.heights.len() > 1 {
                self.heights.remove(0)
            } else {
                self.heights.first().copied().unwrap_or(0)
            };
            Ok(Value::from(height))
        }

        async fn page_source(&mut self) -> Result<String, HarvestError> {
            if self.source_lost {
                return Err(HarvestError::Browser("failed to read page source: connection closed".to_string()));
            }
            Ok(self.source.clone())
        }

        async fn quit(&mut self) {
            self.push("quit".to_string());
        }
    }

    fn settings(max_steps: u32) -> BrowserSettings {
        BrowserSettings {
            root_timeout: Duration::from_millis(10),
            scroll_step_px: 800,
            scroll_pause: Duration::ZERO,
            max_scroll_steps: max_steps,
        }
    }

    #[tokio::test]
    async fn stops_when_page_stops_growing() {
        let mut driver = ScriptedDriver::new(vec![2000, 2400, 2400], "<html></html>");

        let summary = scroll_until_stable(&mut driver, &settings(30)).await.unwrap();

        // 800 < 2000, 1600 < 2400, 2400 >= 2400
        assert_eq!(
            summary,
            ScrollSummary {
                steps: 3,
                final_height: 2400,
                reached_bottom: true,
            }
        );
    }

    #[tokio::test]
    async fn step_cap_bounds_endless_pages() {
        let mut driver = ScriptedDriver::new(vec![u64::MAX], "");

        let summary = scroll_until_stable(&mut driver, &settings(5)).await.unwrap();

        assert_eq!(summary.steps, 5);
        assert!(!summary.reached_bottom);
        let scrolls = driver
            .log
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with("scroll"))
            .count();
        assert_eq!(scrolls, 5);
    }

    #[tokio::test]
    async fn render_returns_source_and_quits() {
        let mut driver = ScriptedDriver::new(vec![100], "<web-root></web-root>");
        let log = Arc::clone(&driver.log);

        let html = render_page(&mut driver, "https://shop.test/browse", "web-root", &settings(30))
            .await
            .unwrap();

        assert_eq!(html, "<web-root></web-root>");
        let log = log.lock().unwrap();
        assert_eq!(log.first().map(String::as_str), Some("navigate https://shop.test/browse"));
        assert_eq!(log.last().map(String::as_str), Some("quit"));
    }

    #[tokio::test]
    async fn missing_root_fails_fetch_and_still_quits() {
        let mut driver = ScriptedDriver::new(vec![100], "");
        driver.root_present = false;
        let log = Arc::clone(&driver.log);

        let err = render_page(&mut driver, "https://shop.test/browse", "web-root", &settings(30))
            .await
            .unwrap_err();

        assert!(matches!(err, HarvestError::FetchFailed { .. }));
        assert_eq!(log.lock().unwrap().last().map(String::as_str), Some("quit"));
    }

    #[tokio::test]
    async fn browser_errors_after_root_surface_as_fetch_failure() {
        let mut driver = ScriptedDriver::new(vec![100], "<web-root></web-root>");
        driver.source_lost = true;
        let log = Arc::clone(&driver.log);

        let err = render_page(&mut driver, "https://shop.test/browse", "web-root", &settings(30))
            .await
            .unwrap_err();

        match err {
            HarvestError::FetchFailed { url, reason } => {
                assert_eq!(url, "https://shop.test/browse");
                assert!(reason.contains("connection closed"), "got: {reason}");
            }
            other => panic!("expected FetchFailed, got {other:?}"),
        }
        assert_eq!(log.lock().unwrap().last().map(String::as_str), Some("quit"));
    }
}
