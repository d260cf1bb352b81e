mod result;

pub use result::{CaptureResult, Stage};

use crate::capture::{self, PNG_CONTENT_TYPE};
use crate::config::{CaptureRequest, RawRequest, Settings};
use crate::session::{Launcher, SessionGuard};
use crate::store::ArtifactStore;
use crate::{navigate, readiness, Error, Result};
use chrono::Utc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What a successful run published.
struct Published {
    filename: String,
    url: String,
    timestamp: String,
}

/// Runs captures: one browser session per request, closed on every exit.
pub struct Runner {
    settings: Settings,
    launcher: Box<dyn Launcher>,
    store: Box<dyn ArtifactStore>,
}

impl Runner {
    pub fn new(
        settings: Settings,
        launcher: impl Launcher + 'static,
        store: Box<dyn ArtifactStore>,
    ) -> Self {
        Self {
            settings,
            launcher: Box::new(launcher),
            store,
        }
    }

    /// Validate `raw` and capture it.
    ///
    /// Invalid input is returned as `Err(InvalidInput)` before any browser is
    /// launched. Every later failure is reported inside the `CaptureResult`.
    pub async fn capture(&self, raw: &RawRequest) -> Result<CaptureResult> {
        debug!("Stage: {}", Stage::Validating);
        let request = raw.resolve()?;
        Ok(self.run(&request).await)
    }

    /// Capture an already validated request.
    pub async fn run(&self, request: &CaptureRequest) -> CaptureResult {
        let start = Instant::now();
        info!(
            "Capturing {} {} {} heatmap",
            request.exchange,
            request.symbol(),
            request.time_range
        );

        let mut stage = Stage::SessionOpen;
        let mut session = None;
        let run_timeout = self.settings.run_timeout();
        let outcome = tokio::time::timeout(
            run_timeout,
            self.drive(request, &mut stage, &mut session),
        )
        .await;
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Timeout(format!(
                "run exceeded {}ms during {}",
                run_timeout.as_millis(),
                stage
            ))),
        };

        if let Some(guard) = session.take() {
            if let Err(e) = guard.close().await {
                warn!("Failed to close browser session: {}", e);
            }
        }

        let result = match outcome {
            Ok(published) => {
                info!(
                    "Stage: {} ({}ms) {}",
                    Stage::Done,
                    start.elapsed().as_millis(),
                    published.url
                );
                CaptureResult::success(
                    request,
                    published.filename,
                    published.url,
                    published.timestamp,
                )
            }
            Err(e) => {
                warn!("Capture failed during {}: {}", stage, e);
                CaptureResult::failure(request, &e, stage)
            }
        };

        if let Err(e) = self.store.record_result(&result).await {
            warn!("Failed to record result: {}", e);
        }
        result
    }

    async fn drive(
        &self,
        request: &CaptureRequest,
        stage: &mut Stage,
        session: &mut Option<SessionGuard>,
    ) -> Result<Published> {
        enter(stage, Stage::SessionOpen);
        let guard = session.insert(
            SessionGuard::open(self.launcher.as_ref(), &self.settings, request.headless).await?,
        );
        let page = guard
            .page()
            .ok_or_else(|| Error::Capture("session already closed".into()))?;

        enter(stage, Stage::Navigating);
        let url = navigate::target_url(&self.settings.target, request)?;
        let timeout = request
            .wait_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.settings.navigation.timeout());
        page.navigate(&url, timeout).await?;

        enter(stage, Stage::SelectingRange);
        page.select_time_range(request.time_range).await?;

        enter(stage, Stage::AwaitingRender);
        readiness::wait_until_rendered(&mut *page, &self.settings.readiness).await?;

        enter(stage, Stage::Capturing);
        let png = page.screenshot_element().await?;
        capture::check_png(&png)?;
        let at = Utc::now();
        let filename = capture::filename(request, &at);
        debug!("Captured {} bytes as {}", png.len(), filename);

        enter(stage, Stage::Publishing);
        let url = self.store.put(&filename, png, PNG_CONTENT_TYPE).await?;
        info!("Published {}", url);

        Ok(Published {
            filename,
            url,
            timestamp: capture::timestamp(&at),
        })
    }
}

fn enter(stage: &mut Stage, next: Stage) {
    *stage = next;
    info!("Stage: {}", next);
}
