//! Page navigation and in-page controls for the heatmap.

use crate::config::{CaptureRequest, NavigationSettings, TargetSettings, TimeRange};
use crate::{Error, Result};
use eoka::Page;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Attribute marking the chart canvas once located.
pub(crate) const TARGET_ATTR: &str = "data-heatshot-target";
const RANGE_ATTR: &str = "data-heatshot-range";
const OPTION_ATTR: &str = "data-heatshot-option";

/// Build the heatmap URL for a request.
///
/// The time range has no URL form; it is set through the page afterwards.
pub fn target_url(target: &TargetSettings, request: &CaptureRequest) -> Result<String> {
    let url = url::Url::parse_with_params(
        &target.url,
        &[
            ("coin", request.coin.as_str()),
            ("exchange", request.exchange.as_str()),
            ("symbol", request.symbol().as_str()),
        ],
    )
    .map_err(|e| Error::Config(format!("invalid target url '{}': {}", target.url, e)))?;
    Ok(url.into())
}

/// Load `url`, wait for the chart canvas, apply the device scale, and tag the
/// chart canvas.
pub async fn load(
    page: &Page,
    url: &str,
    timeout: Duration,
    target: &TargetSettings,
    navigation: &NavigationSettings,
    device_scale: f64,
) -> Result<()> {
    info!("Navigating to: {}", url);
    page.goto(url)
        .await
        .map_err(|e| Error::Navigation(format!("failed to load {}: {}", url, e)))?;

    let timeout_ms = timeout.as_millis() as u64;
    page.wait_for_visible(&target.canvas_selector, timeout_ms)
        .await
        .map_err(|e| {
            Error::Navigation(format!(
                "chart canvas '{}' not visible within {}ms: {}",
                target.canvas_selector, timeout_ms, e
            ))
        })?;

    // Best-effort: the site keeps some connections polling forever.
    if let Err(e) = page
        .wait_for_network_idle(navigation.idle_ms, timeout_ms)
        .await
    {
        debug!("network did not go idle: {}", e);
    }

    emulate_device_scale(page, device_scale).await?;
    locate_canvas(page, target).await
}

/// Override `devicePixelRatio` and fire `resize` so the chart redraws its
/// backing store at `scale`.
async fn emulate_device_scale(page: &Page, scale: f64) -> Result<()> {
    let js = format!(
        r#"(() => {{
            const scale = {scale};
            if (window.devicePixelRatio === scale) return;
            Object.defineProperty(window, 'devicePixelRatio', {{ get: () => scale, configurable: true }});
            window.dispatchEvent(new Event('resize'));
        }})()"#
    );
    page.execute(&js)
        .await
        .map_err(|e| Error::Navigation(format!("failed to apply device scale: {}", e)))?;
    debug!("device scale set to {}", scale);
    Ok(())
}

#[derive(Debug, Deserialize)]
struct LocateResult {
    found: bool,
    candidates: u32,
    width: Option<f64>,
    height: Option<f64>,
    pixel_width: Option<u32>,
    pixel_height: Option<u32>,
}

/// Tag the largest visible canvas at least the configured minimum size.
pub async fn locate_canvas(page: &Page, target: &TargetSettings) -> Result<()> {
    let js = format!(
        r#"(() => {{
            const attr = {attr};
            const minW = {min_w}, minH = {min_h};
            document.querySelectorAll('[' + attr + ']').forEach(el => el.removeAttribute(attr));
            let best = null, bestRect = null, count = 0;
            for (const el of document.querySelectorAll({selector})) {{
                if (!(el instanceof HTMLCanvasElement)) continue;
                count++;
                const style = getComputedStyle(el);
                if (style.display === 'none' || style.visibility === 'hidden') continue;
                const rect = el.getBoundingClientRect();
                if (rect.width < minW || rect.height < minH) continue;
                if (!bestRect || rect.width * rect.height > bestRect.width * bestRect.height) {{
                    best = el;
                    bestRect = rect;
                }}
            }}
            if (!best) return JSON.stringify({{ found: false, candidates: count }});
            best.setAttribute(attr, '1');
            return JSON.stringify({{
                found: true,
                candidates: count,
                width: bestRect.width,
                height: bestRect.height,
                pixel_width: best.width,
                pixel_height: best.height,
            }});
        }})()"#,
        attr = json_str(TARGET_ATTR),
        min_w = target.min_canvas_width,
        min_h = target.min_canvas_height,
        selector = json_str(&target.canvas_selector),
    );
    let located: LocateResult = run_script(page, &js, "canvas lookup").await?;

    if !located.found {
        return Err(Error::Interaction(format!(
            "no canvas matching '{}' is at least {}x{} ({} candidates)",
            target.canvas_selector,
            target.min_canvas_width,
            target.min_canvas_height,
            located.candidates
        )));
    }
    debug!(
        "chart canvas: {:.0}x{:.0} css, {}x{} px",
        located.width.unwrap_or_default(),
        located.height.unwrap_or_default(),
        located.pixel_width.unwrap_or_default(),
        located.pixel_height.unwrap_or_default()
    );
    Ok(())
}

#[derive(Debug, Deserialize)]
struct RangeControl {
    found: bool,
    current: Option<String>,
}

/// Switch the heatmap's time range control to `range`.
pub async fn select_time_range(
    page: &Page,
    range: TimeRange,
    navigation: &NavigationSettings,
) -> Result<()> {
    let label = range.label();
    let control = find_range_control(page).await?;
    if !control.found {
        return Err(Error::Interaction(format!(
            "time range control not found (looked for one of: {})",
            range_labels().join(", ")
        )));
    }
    if control.current.as_deref() == Some(label) {
        debug!("time range already '{}'", label);
        return Ok(());
    }

    info!("select time range: {}", label);
    page.click(&attr_selector(RANGE_ATTR))
        .await
        .map_err(|e| Error::Interaction(format!("failed to open time range control: {}", e)))?;
    page.wait(navigation.menu_settle_ms).await;

    let js = format!(
        r#"(() => {{
            const target = {label};
            const rangeAttr = {range_attr}, optionAttr = {option_attr};
            const norm = s => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
            document.querySelectorAll('[' + optionAttr + ']').forEach(el => el.removeAttribute(optionAttr));
            const pools = ['[role="option"], [role="menuitem"], li', 'button, div, span'];
            for (const pool of pools) {{
                for (const el of document.querySelectorAll(pool)) {{
                    if (el.closest('[' + rangeAttr + ']')) continue;
                    if (norm(el.textContent) !== target) continue;
                    const rect = el.getBoundingClientRect();
                    if (rect.width < 2 || rect.height < 2) continue;
                    el.setAttribute(optionAttr, '1');
                    return 'ok';
                }}
            }}
            return 'option_not_found';
        }})()"#,
        label = json_str(label),
        range_attr = json_str(RANGE_ATTR),
        option_attr = json_str(OPTION_ATTR),
    );
    let result: String = page
        .evaluate(&js)
        .await
        .map_err(|e| Error::Interaction(format!("time range option lookup failed: {}", e)))?;
    if result != "ok" {
        return Err(Error::Interaction(format!(
            "time range option '{}' not found",
            label
        )));
    }
    page.click(&attr_selector(OPTION_ATTR))
        .await
        .map_err(|e| Error::Interaction(format!("failed to pick '{}': {}", label, e)))?;

    let after = find_range_control(page).await?;
    if after.current.as_deref() != Some(label) {
        warn!(
            "time range control shows {:?} after selecting '{}'",
            after.current, label
        );
    }
    Ok(())
}

/// Tag the visible element showing one of the range labels.
async fn find_range_control(page: &Page) -> Result<RangeControl> {
    let labels = serde_json::to_string(&range_labels())?;
    let js = format!(
        r#"(() => {{
            const attr = {attr};
            const labels = new Set({labels});
            const norm = s => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
            document.querySelectorAll('[' + attr + ']').forEach(el => el.removeAttribute(attr));
            const pools = [
                '[role="combobox"], [aria-haspopup="listbox"], [aria-haspopup="true"], .MuiSelect-select',
                'button, div, span',
            ];
            for (const pool of pools) {{
                for (const el of document.querySelectorAll(pool)) {{
                    if (el.children.length > 2) continue;
                    const text = norm(el.textContent);
                    if (!labels.has(text)) continue;
                    const rect = el.getBoundingClientRect();
                    if (rect.width < 2 || rect.height < 2) continue;
                    el.setAttribute(attr, '1');
                    return JSON.stringify({{ found: true, current: text }});
                }}
            }}
            return JSON.stringify({{ found: false, current: null }});
        }})()"#,
        attr = json_str(RANGE_ATTR),
    );
    run_script(page, &js, "time range control lookup").await
}

/// Evaluate a page script that reports back a JSON document.
///
/// Failures mean the page is not shaped as expected, so they surface as
/// `Interaction` errors.
pub(crate) async fn run_script<T: DeserializeOwned>(page: &Page, js: &str, what: &str) -> Result<T> {
    let json: String = page
        .evaluate(js)
        .await
        .map_err(|e| Error::Interaction(format!("{} failed: {}", what, e)))?;
    parse_report(&json, what)
}

fn parse_report<T: DeserializeOwned>(json: &str, what: &str) -> Result<T> {
    serde_json::from_str(json)
        .map_err(|e| Error::Interaction(format!("{} returned unexpected data: {}", what, e)))
}

fn range_labels() -> Vec<&'static str> {
    TimeRange::ALL.iter().map(|r| r.label()).collect()
}

pub(crate) fn attr_selector(attr: &str) -> String {
    format!("[{}]", attr)
}

/// Quote a string as a JS literal.
pub(crate) fn json_str(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Exchange, QuoteCurrency};

    #[test]
    fn test_target_url_encodes_pair() {
        let request = CaptureRequest {
            coin: "ETH".into(),
            exchange: Exchange::Okx,
            quote_currency: QuoteCurrency::Usdt,
            time_range: TimeRange::W1,
            headless: true,
            wait_timeout_ms: None,
        };
        let url = target_url(&TargetSettings::default(), &request).unwrap();
        assert_eq!(
            url,
            "https://www.coinglass.com/pro/futures/LiquidationHeatMap?coin=ETH&exchange=OKX&symbol=ETHUSDT"
        );
    }

    #[test]
    fn test_target_url_escapes_names() {
        let request = CaptureRequest {
            exchange: Exchange::CryptoCom,
            coin: "1000PEPE".into(),
            ..Default::default()
        };
        let url = target_url(&TargetSettings::default(), &request).unwrap();
        assert!(url.contains("exchange=Crypto.com"), "{}", url);
        assert!(url.contains("symbol=1000PEPEUSDT"), "{}", url);

        let request = CaptureRequest {
            coin: "A&B".into(),
            ..Default::default()
        };
        let url = target_url(&TargetSettings::default(), &request).unwrap();
        assert!(url.contains("coin=A%26B"), "{}", url);
    }

    #[test]
    fn test_range_labels_cover_all_ranges() {
        let labels = range_labels();
        assert_eq!(labels.len(), 10);
        assert!(labels.contains(&"24 hour"));
        assert!(labels.contains(&"1 year"));
    }

    #[test]
    fn test_malformed_script_report_is_interaction_error() {
        let err = parse_report::<RangeControl>("undefined", "time range control lookup")
            .unwrap_err();
        assert_eq!(err.kind(), "InteractionError");
        assert!(err.to_string().contains("time range control lookup"), "{}", err);

        let control: RangeControl =
            parse_report(r#"{"found":true,"current":"24 hour"}"#, "lookup").unwrap();
        assert!(control.found);
        assert_eq!(control.current.as_deref(), Some("24 hour"));
    }

    #[test]
    fn test_json_str_quotes() {
        assert_eq!(json_str("canvas"), "\"canvas\"");
        assert_eq!(json_str("a\"b"), "\"a\\\"b\"");
    }
}
