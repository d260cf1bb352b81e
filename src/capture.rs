//! Naming and checking captured images.

use crate::config::CaptureRequest;
use crate::{Error, Result};
use chrono::{DateTime, Utc};

pub const PNG_CONTENT_TYPE: &str = "image/png";

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// `YYYYMMDD_HHMMSS`, used in filenames and the result's `timestamp`.
pub fn timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// `Exchange_COINQUOTE_range_YYYYMMDD_HHMMSS.png`
pub fn filename(request: &CaptureRequest, at: &DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}_{}.png",
        request.exchange,
        request.symbol(),
        request.time_range,
        timestamp(at)
    )
}

/// Reject anything that is not a non-empty PNG.
pub fn check_png(bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() {
        return Err(Error::Capture("screenshot is empty".into()));
    }
    if !bytes.starts_with(PNG_SIGNATURE) {
        return Err(Error::Capture(format!(
            "screenshot is not a PNG ({} bytes)",
            bytes.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Exchange, QuoteCurrency, TimeRange};
    use chrono::TimeZone;

    #[test]
    fn test_filename_is_deterministic() {
        let at = Utc.with_ymd_and_hms(2024, 12, 15, 12, 0, 0).unwrap();
        let request = CaptureRequest::default();
        assert_eq!(
            filename(&request, &at),
            "Binance_BTCUSDT_24h_20241215_120000.png"
        );
        assert_eq!(filename(&request, &at), filename(&request, &at));
        assert_eq!(timestamp(&at), "20241215_120000");
    }

    #[test]
    fn test_filename_uses_canonical_names() {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let request = CaptureRequest {
            coin: "SOL".into(),
            exchange: Exchange::Okx,
            quote_currency: QuoteCurrency::Usdc,
            time_range: TimeRange::M3,
            ..Default::default()
        };
        assert_eq!(filename(&request, &at), "OKX_SOLUSDC_3M_20250102_030405.png");
    }

    #[test]
    fn test_check_png() {
        assert!(check_png(b"").is_err());
        assert!(check_png(b"GIF89a").is_err());
        let mut png = PNG_SIGNATURE.to_vec();
        png.extend_from_slice(&[0, 0, 0, 13]);
        assert!(check_png(&png).is_ok());
    }
}
