//! Browser session ownership.
//!
//! The rest of the crate talks to the browser only through [`PageDriver`], so
//! the pipeline and the readiness detector can run against a fake page.

mod browser;

pub use browser::{EokaLauncher, EokaPage};

use crate::config::{Settings, TimeRange};
use crate::readiness::Sample;
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// The page capabilities a capture needs.
#[async_trait]
pub trait PageDriver: Send {
    /// Load `url` and wait until the chart canvas is visible and located.
    /// Fails with `Navigation` if the page never gets there within `timeout`.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()>;

    /// Drive the page's time range control to `range`.
    async fn select_time_range(&mut self, range: TimeRange) -> Result<()>;

    /// Take a compact pixel digest of the chart canvas.
    async fn sample_canvas(&mut self) -> Result<Sample>;

    /// PNG of the chart element alone, at full resolution.
    async fn screenshot_element(&mut self) -> Result<Vec<u8>>;

    /// Release the browser. Must be safe to call more than once.
    async fn close(&mut self) -> Result<()>;
}

/// Opens browser sessions.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, settings: &Settings, headless: bool) -> Result<Box<dyn PageDriver>>;
}

/// Owns an open session and guarantees it is closed.
///
/// Call [`SessionGuard::close`] on every normal exit path. If the guard is
/// dropped while still open (the run future was cancelled), the session is
/// closed on a background task instead.
pub struct SessionGuard {
    driver: Option<Box<dyn PageDriver>>,
}

impl SessionGuard {
    /// Launch a session through `launcher`.
    pub async fn open(launcher: &dyn Launcher, settings: &Settings, headless: bool) -> Result<Self> {
        debug!(
            "Opening session (headless: {}, viewport: {}x{} @{}x)",
            headless,
            settings.browser.viewport.width,
            settings.browser.viewport.height,
            settings.browser.device_scale
        );
        let driver = launcher.launch(settings, headless).await?;
        Ok(Self {
            driver: Some(driver),
        })
    }

    /// The open page, or `None` once closed.
    pub fn page(&mut self) -> Option<&mut (dyn PageDriver + 'static)> {
        self.driver.as_deref_mut()
    }

    /// Close the session now.
    pub async fn close(mut self) -> Result<()> {
        match self.driver.take() {
            Some(mut driver) => {
                debug!("Closing session");
                driver.close().await
            }
            None => Ok(()),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(mut driver) = self.driver.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Session dropped while open, closing in background");
                handle.spawn(async move {
                    if let Err(e) = driver.close().await {
                        warn!("Background session close failed: {}", e);
                    }
                });
            }
            Err(_) => warn!("Session dropped outside a runtime, browser not closed"),
        }
    }
}
