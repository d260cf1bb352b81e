use super::{Launcher, PageDriver};
use crate::config::{NavigationSettings, ReadinessConfig, Settings, TargetSettings, TimeRange};
use crate::navigate::{self, json_str, run_script, TARGET_ATTR};
use crate::readiness::Sample;
use crate::{Error, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use eoka::{Browser, Page};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Launches a real Chrome session through eoka.
#[derive(Debug, Clone, Copy, Default)]
pub struct EokaLauncher;

#[async_trait]
impl Launcher for EokaLauncher {
    async fn launch(&self, settings: &Settings, headless: bool) -> Result<Box<dyn PageDriver>> {
        Ok(Box::new(EokaPage::launch(settings, headless).await?))
    }
}

/// A browser plus the one page a capture runs in.
pub struct EokaPage {
    browser: Option<Browser>,
    page: Page,
    target: TargetSettings,
    navigation: NavigationSettings,
    readiness: ReadinessConfig,
    device_scale: f64,
    /// The chart area has been scrolled into view since the last navigation.
    chart_area_shown: bool,
}

impl EokaPage {
    /// Launch a browser sized per `settings`.
    pub async fn launch(settings: &Settings, headless: bool) -> Result<Self> {
        let browser_settings = &settings.browser;
        let stealth = eoka::StealthConfig {
            headless,
            proxy: browser_settings.proxy.clone(),
            user_agent: browser_settings.user_agent.clone(),
            viewport_width: browser_settings.viewport.width,
            viewport_height: browser_settings.viewport.height,
            ..Default::default()
        };

        debug!(
            "Launching browser (headless: {}, proxy: {:?})",
            headless, browser_settings.proxy
        );
        let browser = Browser::launch_with_config(stealth).await?;
        let page = browser.new_page("about:blank").await?;

        Ok(Self {
            browser: Some(browser),
            page,
            target: settings.target.clone(),
            navigation: settings.navigation.clone(),
            readiness: settings.readiness.clone(),
            device_scale: browser_settings.device_scale,
            chart_area_shown: false,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.browser.is_none() {
            return Err(Error::Capture("session already closed".into()));
        }
        Ok(())
    }

    /// Scroll the element holding the chart into view, once per page.
    async fn show_chart_area(&mut self) -> Result<()> {
        if self.chart_area_shown {
            return Ok(());
        }
        let status: String = self
            .page
            .evaluate(&chart_area_js())
            .await
            .map_err(|e| Error::Interaction(format!("chart area lookup failed: {}", e)))?;
        if status != "ok" {
            return Err(Error::Interaction("chart area not found".into()));
        }
        self.page.wait(self.navigation.menu_settle_ms).await;
        self.chart_area_shown = true;
        Ok(())
    }

    /// Viewport screenshot with the chart area in view.
    async fn capture_chart_area(&mut self) -> Result<Vec<u8>> {
        self.show_chart_area()
            .await
            .map_err(|e| Error::Capture(e.to_string()))?;
        self.page
            .screenshot()
            .await
            .map_err(|e| Error::Capture(format!("chart area screenshot failed: {}", e)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum CanvasData {
    Ok { data: String },
    Missing,
    Error { message: String },
}

/// What to do with the result of exporting the canvas.
#[derive(Debug)]
enum Export {
    Png(Vec<u8>),
    /// The canvas refused to export (e.g. tainted by cross-origin images).
    ChartArea(String),
}

fn export_plan(data: CanvasData) -> Result<Export> {
    match data {
        CanvasData::Ok { data } => BASE64
            .decode(data)
            .map(Export::Png)
            .map_err(|e| Error::Capture(format!("bad image data: {}", e))),
        CanvasData::Missing => Err(Error::Capture("chart canvas disappeared".into())),
        CanvasData::Error { message } => Ok(Export::ChartArea(message)),
    }
}

#[async_trait]
impl PageDriver for EokaPage {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        self.ensure_open()?;
        self.chart_area_shown = false;
        navigate::load(
            &self.page,
            url,
            timeout,
            &self.target,
            &self.navigation,
            self.device_scale,
        )
        .await
    }

    async fn select_time_range(&mut self, range: TimeRange) -> Result<()> {
        self.ensure_open()?;
        navigate::select_time_range(&self.page, range, &self.navigation).await
    }

    async fn sample_canvas(&mut self) -> Result<Sample> {
        self.ensure_open()?;
        let js = sample_js(self.readiness.grid_width, self.readiness.grid_height);
        let mut data = read_canvas(&self.page, &js).await?;
        if matches!(data, CanvasData::Missing) {
            // Charts may swap their canvas out on redraw.
            debug!("chart canvas detached, locating again");
            navigate::locate_canvas(&self.page, &self.target).await?;
            data = read_canvas(&self.page, &js).await?;
        }
        match data {
            CanvasData::Ok { data } => {
                let pixels = BASE64
                    .decode(data)
                    .map_err(|e| Error::Interaction(format!("bad canvas sample: {}", e)))?;
                Ok(Sample::new(pixels))
            }
            CanvasData::Missing => Err(Error::Interaction("chart canvas disappeared".into())),
            CanvasData::Error { message } => {
                // Tainted canvases refuse pixel reads; compare screenshots instead.
                if !self.chart_area_shown {
                    warn!("canvas cannot be sampled ({}), sampling the chart area", message);
                }
                self.show_chart_area().await?;
                let png = self
                    .page
                    .screenshot()
                    .await
                    .map_err(|e| Error::Interaction(format!("chart area sample failed: {}", e)))?;
                Ok(Sample::new(png))
            }
        }
    }

    async fn screenshot_element(&mut self) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let data = read_canvas(&self.page, &capture_js())
            .await
            .map_err(|e| Error::Capture(e.to_string()))?;
        match export_plan(data)? {
            Export::Png(png) => Ok(png),
            Export::ChartArea(reason) => {
                warn!("canvas export failed ({}), capturing the chart area", reason);
                self.capture_chart_area().await
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(browser) = self.browser.take() {
            browser.close().await?;
        }
        Ok(())
    }
}

async fn read_canvas(page: &Page, js: &str) -> Result<CanvasData> {
    run_script(page, js, "canvas read").await
}

/// Downscale the tagged canvas to a `w`x`h` grid and return its RGBA bytes.
fn sample_js(w: u32, h: u32) -> String {
    format!(
        r#"(() => {{
            const c = document.querySelector({selector});
            if (!c || !c.isConnected) return JSON.stringify({{ status: 'missing' }});
            try {{
                const off = document.createElement('canvas');
                off.width = {w};
                off.height = {h};
                const ctx = off.getContext('2d');
                ctx.drawImage(c, 0, 0, {w}, {h});
                const px = ctx.getImageData(0, 0, {w}, {h}).data;
                let bin = '';
                for (let i = 0; i < px.length; i++) bin += String.fromCharCode(px[i]);
                return JSON.stringify({{ status: 'ok', data: btoa(bin) }});
            }} catch (e) {{
                return JSON.stringify({{ status: 'error', message: String(e) }});
            }}
        }})()"#,
        selector = json_str(&navigate::attr_selector(TARGET_ATTR)),
    )
}

/// Full-resolution PNG of the tagged canvas.
fn capture_js() -> String {
    format!(
        r#"(() => {{
            const c = document.querySelector({selector});
            if (!c || !c.isConnected) return JSON.stringify({{ status: 'missing' }});
            try {{
                const url = c.toDataURL('image/png');
                return JSON.stringify({{ status: 'ok', data: url.slice(url.indexOf(',') + 1) }});
            }} catch (e) {{
                return JSON.stringify({{ status: 'error', message: String(e) }});
            }}
        }})()"#,
        selector = json_str(&navigate::attr_selector(TARGET_ATTR)),
    )
}

/// Scroll the element holding the chart to the top of the viewport.
fn chart_area_js() -> String {
    format!(
        r#"(() => {{
            const c = document.querySelector({selector});
            if (!c) return 'missing';
            const area = c.closest('[class*="heatmap" i], [class*="chart" i]') || c.parentElement || c;
            area.scrollIntoView({{ block: 'start', inline: 'nearest' }});
            return 'ok';
        }})()"#,
        selector = json_str(&navigate::attr_selector(TARGET_ATTR)),
    )
}
