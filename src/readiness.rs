//! Render-readiness detection.
//!
//! The heatmap is drawn asynchronously into a canvas and the page exposes no
//! "done" signal, so readiness is inferred: sample the canvas at a fixed
//! interval and wait until several consecutive samples are identical.
//!
//! [`RenderState`] holds the decision logic and never sleeps or touches the
//! page; [`wait_until_rendered`] feeds it real samples on a real clock.

use crate::config::ReadinessConfig;
use crate::session::PageDriver;
use crate::{Error, Result};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// A downscaled RGBA snapshot of the chart canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pixels: Vec<u8>,
}

impl Sample {
    pub fn new(pixels: Vec<u8>) -> Self {
        Self { pixels }
    }

    /// True when the canvas shows nothing: no pixels, every pixel fully
    /// transparent, or every pixel the same color.
    pub fn is_blank(&self) -> bool {
        let mut pixels = self.pixels.chunks_exact(4);
        let Some(first) = pixels.next() else {
            return true;
        };
        let transparent = first[3] == 0;
        pixels.all(|px| px == first || (transparent && px[3] == 0))
    }
}

/// Outcome of feeding one sample to [`RenderState::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Keep sampling.
    Pending,
    /// The canvas has held still long enough.
    Ready,
    /// The canvas never drew anything within the grace period.
    Empty,
    /// The canvas drew something but never settled.
    TimedOut,
}

/// Sampling state for one readiness wait.
#[derive(Debug, Clone)]
pub struct RenderState {
    stable_samples: u32,
    timeout: Duration,
    empty_grace: Duration,
    previous: Option<Sample>,
    stable: u32,
    seen_content: bool,
}

impl RenderState {
    pub fn new(config: &ReadinessConfig) -> Self {
        Self {
            stable_samples: config.stable_samples,
            timeout: config.timeout(),
            empty_grace: config.empty_grace(),
            previous: None,
            stable: 0,
            seen_content: false,
        }
    }

    /// Consecutive identical samples seen so far.
    pub fn stable_count(&self) -> u32 {
        self.stable
    }

    pub fn seen_content(&self) -> bool {
        self.seen_content
    }

    /// Advance with a sample taken `elapsed` after the wait began.
    pub fn step(&mut self, sample: Sample, elapsed: Duration) -> Progress {
        if sample.is_blank() {
            // A cleared canvas is mid-redraw, never a finished frame.
            self.stable = 0;
            self.previous = None;
            if !self.seen_content && elapsed >= self.empty_grace {
                return Progress::Empty;
            }
            return self.pending_or_timeout(elapsed);
        }

        self.seen_content = true;
        if self.previous.as_ref() == Some(&sample) {
            self.stable += 1;
        } else {
            self.stable = 0;
            self.previous = Some(sample);
        }

        if self.stable >= self.stable_samples {
            return Progress::Ready;
        }
        self.pending_or_timeout(elapsed)
    }

    fn pending_or_timeout(&self, elapsed: Duration) -> Progress {
        if elapsed >= self.timeout {
            Progress::TimedOut
        } else {
            Progress::Pending
        }
    }
}

/// Poll the page's canvas until it settles.
///
/// Returns how long the wait took. Fails with `RenderEmpty` if nothing was
/// drawn within the grace period and `RenderTimeout` if drawing never stopped.
pub async fn wait_until_rendered(
    page: &mut dyn PageDriver,
    config: &ReadinessConfig,
) -> Result<Duration> {
    let start = Instant::now();
    let interval = config.poll_interval();
    let mut state = RenderState::new(config);
    let mut samples = 0u32;

    loop {
        // Bound a single sample so a wedged page cannot outlive the timeout.
        let budget = config.timeout().saturating_sub(start.elapsed()) + interval;
        let sample = match tokio::time::timeout(budget, page.sample_canvas()).await {
            Ok(sample) => sample?,
            Err(_) => {
                return Err(Error::RenderTimeout {
                    waited_ms: start.elapsed().as_millis() as u64,
                })
            }
        };
        samples += 1;
        let elapsed = start.elapsed();

        match state.step(sample, elapsed) {
            Progress::Ready => {
                info!(
                    "Canvas settled after {}ms ({} samples)",
                    elapsed.as_millis(),
                    samples
                );
                return Ok(elapsed);
            }
            Progress::Empty => {
                return Err(Error::RenderEmpty {
                    waited_ms: elapsed.as_millis() as u64,
                })
            }
            Progress::TimedOut => {
                return Err(Error::RenderTimeout {
                    waited_ms: elapsed.as_millis() as u64,
                })
            }
            Progress::Pending => {
                debug!(
                    "sample {}: stable={} content={} at {}ms",
                    samples,
                    state.stable_count(),
                    state.seen_content(),
                    elapsed.as_millis()
                );
            }
        }

        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeRange;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    fn config() -> ReadinessConfig {
        ReadinessConfig {
            poll_interval_ms: 250,
            stable_samples: 3,
            timeout_ms: 5_000,
            empty_grace_ms: 1_000,
            ..Default::default()
        }
    }

    /// Opaque 2x1 image whose pixels differ, tagged by `seed`.
    fn frame(seed: u8) -> Sample {
        Sample::new(vec![seed, 0, 0, 255, 0, seed, 1, 255])
    }

    fn blank() -> Sample {
        Sample::new(vec![0; 8])
    }

    fn at(tick: u64) -> Duration {
        Duration::from_millis(tick * 250)
    }

    #[test]
    fn test_blank_detection() {
        assert!(Sample::new(vec![]).is_blank());
        assert!(blank().is_blank());
        assert!(Sample::new(vec![255, 255, 255, 255, 255, 255, 255, 255]).is_blank());
        // Transparent pixels with garbage color channels still count as empty.
        assert!(Sample::new(vec![9, 9, 9, 0, 1, 2, 3, 0]).is_blank());
        assert!(!frame(1).is_blank());
        assert!(!Sample::new(vec![0, 0, 0, 0, 10, 10, 10, 255]).is_blank());
    }

    #[test]
    fn test_ready_after_threshold_identical_samples() {
        let mut state = RenderState::new(&config());
        assert_eq!(state.step(frame(1), at(0)), Progress::Pending);
        assert_eq!(state.step(frame(2), at(1)), Progress::Pending);
        // Last change at tick 2.
        assert_eq!(state.step(frame(3), at(2)), Progress::Pending);
        assert_eq!(state.step(frame(3), at(3)), Progress::Pending);
        assert_eq!(state.step(frame(3), at(4)), Progress::Pending);
        assert_eq!(state.stable_count(), 2);
        assert_eq!(state.step(frame(3), at(5)), Progress::Ready);
    }

    #[test]
    fn test_change_resets_counter() {
        let mut state = RenderState::new(&config());
        state.step(frame(1), at(0));
        state.step(frame(1), at(1));
        state.step(frame(1), at(2));
        assert_eq!(state.stable_count(), 2);
        assert_eq!(state.step(frame(2), at(3)), Progress::Pending);
        assert_eq!(state.stable_count(), 0);
        state.step(frame(2), at(4));
        state.step(frame(2), at(5));
        assert_eq!(state.step(frame(2), at(6)), Progress::Ready);
    }

    #[test]
    fn test_single_stable_sample_threshold() {
        let mut state = RenderState::new(&ReadinessConfig {
            stable_samples: 1,
            ..config()
        });
        assert_eq!(state.step(frame(1), at(0)), Progress::Pending);
        assert_eq!(state.step(frame(1), at(1)), Progress::Ready);
    }

    #[test]
    fn test_blank_never_counts_as_stable() {
        let mut state = RenderState::new(&config());
        for tick in 0..4 {
            assert_eq!(state.step(blank(), at(tick)), Progress::Pending);
        }
        assert_eq!(state.stable_count(), 0);
        assert!(!state.seen_content());
    }

    #[test]
    fn test_blank_through_grace_is_empty() {
        let mut state = RenderState::new(&config());
        for tick in 0..4 {
            assert_eq!(state.step(blank(), at(tick)), Progress::Pending);
        }
        // Grace is 1000ms = tick 4.
        assert_eq!(state.step(blank(), at(4)), Progress::Empty);
    }

    #[test]
    fn test_blank_after_content_times_out_instead_of_empty() {
        let mut state = RenderState::new(&config());
        state.step(frame(1), at(0));
        let mut tick = 1;
        loop {
            let progress = state.step(blank(), at(tick));
            if progress != Progress::Pending {
                assert_eq!(progress, Progress::TimedOut);
                break;
            }
            tick += 1;
        }
        assert_eq!(at(tick), Duration::from_millis(5_000));
    }

    #[test]
    fn test_redraw_clears_progress() {
        let mut state = RenderState::new(&config());
        state.step(frame(1), at(0));
        state.step(frame(1), at(1));
        state.step(frame(1), at(2));
        // Canvas cleared for a redraw, then the same picture comes back.
        state.step(blank(), at(3));
        assert_eq!(state.step(frame(1), at(4)), Progress::Pending);
        assert_eq!(state.stable_count(), 0);
    }

    #[test]
    fn test_never_stable_times_out_at_boundary() {
        let mut state = RenderState::new(&config());
        for tick in 0..20u8 {
            assert_eq!(state.step(frame(tick), at(tick as u64)), Progress::Pending);
        }
        // 20 * 250 = 5000ms.
        assert_eq!(state.step(frame(99), at(20)), Progress::TimedOut);
    }

    #[test]
    fn test_ready_wins_over_timeout_on_same_tick() {
        let mut state = RenderState::new(&ReadinessConfig {
            stable_samples: 1,
            ..config()
        });
        state.step(frame(1), at(19));
        assert_eq!(state.step(frame(1), at(20)), Progress::Ready);
    }

    /// Page that replays a fixed script of samples, repeating the last one.
    struct ScriptedPage {
        samples: VecDeque<Sample>,
        last: Sample,
        calls: u32,
    }

    impl ScriptedPage {
        fn new(samples: Vec<Sample>) -> Self {
            let last = samples.last().cloned().unwrap_or_else(blank);
            Self {
                samples: samples.into(),
                last,
                calls: 0,
            }
        }
    }

    #[async_trait]
    impl PageDriver for ScriptedPage {
        async fn navigate(&mut self, _url: &str, _timeout: Duration) -> Result<()> {
            Ok(())
        }
        async fn select_time_range(&mut self, _range: TimeRange) -> Result<()> {
            Ok(())
        }
        async fn sample_canvas(&mut self) -> Result<Sample> {
            self.calls += 1;
            Ok(self.samples.pop_front().unwrap_or_else(|| self.last.clone()))
        }
        async fn screenshot_element(&mut self) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_reports_ready_after_last_change() {
        // Changes through tick 4, then holds still.
        let mut page = ScriptedPage::new((0..5).map(frame).collect());
        let waited = wait_until_rendered(&mut page, &config()).await.unwrap();
        assert_eq!(waited, at(4) + at(3));
        assert_eq!(page.calls, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_on_animated_canvas() {
        let mut page = ScriptedPage::new((0..=255).map(frame).collect());
        let err = wait_until_rendered(&mut page, &config()).await.unwrap_err();
        match err {
            Error::RenderTimeout { waited_ms } => {
                assert!(waited_ms >= 5_000, "timed out early: {}", waited_ms);
                assert!(waited_ms < 5_250, "timed out late: {}", waited_ms);
            }
            other => panic!("Expected RenderTimeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_fails_empty_on_blank_canvas() {
        let mut page = ScriptedPage::new(vec![blank()]);
        let err = wait_until_rendered(&mut page, &config()).await.unwrap_err();
        assert!(
            matches!(err, Error::RenderEmpty { waited_ms: 1_000 }),
            "got {:?}",
            err
        );
    }
}
