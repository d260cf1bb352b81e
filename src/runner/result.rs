use crate::config::CaptureRequest;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a run is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Validating,
    SessionOpen,
    Navigating,
    SelectingRange,
    AwaitingRender,
    Capturing,
    Publishing,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validating => "Validating",
            Self::SessionOpen => "SessionOpen",
            Self::Navigating => "Navigating",
            Self::SelectingRange => "SelectingRange",
            Self::AwaitingRender => "AwaitingRender",
            Self::Capturing => "Capturing",
            Self::Publishing => "Publishing",
            Self::Done => "Done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one capture, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResult {
    pub success: bool,
    pub coin: String,
    pub exchange: String,
    pub quote_currency: String,
    pub time_range: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
}

impl CaptureResult {
    pub fn success(
        request: &CaptureRequest,
        filename: String,
        url: String,
        timestamp: String,
    ) -> Self {
        Self {
            success: true,
            filename: Some(filename),
            url: Some(url),
            timestamp: Some(timestamp),
            ..Self::describe(request)
        }
    }

    /// A failed run, stopped at `stage`.
    pub fn failure(request: &CaptureRequest, error: &Error, stage: Stage) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            error_kind: Some(error.kind().to_string()),
            stage: Some(stage),
            ..Self::describe(request)
        }
    }

    fn describe(request: &CaptureRequest) -> Self {
        Self {
            success: false,
            coin: request.coin.clone(),
            exchange: request.exchange.to_string(),
            quote_currency: request.quote_currency.to_string(),
            time_range: request.time_range.to_string(),
            filename: None,
            url: None,
            timestamp: None,
            error: None,
            error_kind: None,
            stage: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Exchange, QuoteCurrency, TimeRange};

    #[test]
    fn test_success_shape() {
        let result = CaptureResult::success(
            &CaptureRequest::default(),
            "Binance_BTCUSDT_24h_20241215_120000.png".into(),
            "file:///tmp/Binance_BTCUSDT_24h_20241215_120000.png".into(),
            "20241215_120000".into(),
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "success": true,
                "coin": "BTC",
                "exchange": "Binance",
                "quoteCurrency": "USDT",
                "timeRange": "24h",
                "filename": "Binance_BTCUSDT_24h_20241215_120000.png",
                "url": "file:///tmp/Binance_BTCUSDT_24h_20241215_120000.png",
                "timestamp": "20241215_120000",
            })
        );
    }

    #[test]
    fn test_failure_shape() {
        let request = CaptureRequest {
            coin: "ETH".into(),
            exchange: Exchange::CryptoCom,
            quote_currency: QuoteCurrency::Usd,
            time_range: TimeRange::M1,
            ..Default::default()
        };
        let result = CaptureResult::failure(
            &request,
            &Error::RenderTimeout { waited_ms: 30_000 },
            Stage::AwaitingRender,
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["exchange"], "Crypto.com");
        assert_eq!(json["timeRange"], "1M");
        assert_eq!(json["errorKind"], "RenderTimeout");
        assert_eq!(json["stage"], "AwaitingRender");
        assert!(json["error"].as_str().unwrap().contains("30000ms"));
        assert!(json.get("url").is_none());
        assert!(json.get("filename").is_none());
    }
}
