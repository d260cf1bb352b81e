use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchanges the heatmap page can be switched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exchange {
    Binance,
    Okx,
    Bybit,
    Bitget,
    Bitmex,
    Bitfinex,
    Coinbase,
    Deribit,
    Gate,
    Htx,
    Kraken,
    Kucoin,
    Mexc,
    Coinex,
    CryptoCom,
    Dydx,
    Hyperliquid,
    Bingx,
    Bitstamp,
    Whitebit,
    Bitmart,
}

impl Exchange {
    pub const ALL: [Exchange; 21] = [
        Self::Binance,
        Self::Okx,
        Self::Bybit,
        Self::Bitget,
        Self::Bitmex,
        Self::Bitfinex,
        Self::Coinbase,
        Self::Deribit,
        Self::Gate,
        Self::Htx,
        Self::Kraken,
        Self::Kucoin,
        Self::Mexc,
        Self::Coinex,
        Self::CryptoCom,
        Self::Dydx,
        Self::Hyperliquid,
        Self::Bingx,
        Self::Bitstamp,
        Self::Whitebit,
        Self::Bitmart,
    ];

    /// Canonical spelling, as shown by the target site and used in filenames.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binance => "Binance",
            Self::Okx => "OKX",
            Self::Bybit => "Bybit",
            Self::Bitget => "Bitget",
            Self::Bitmex => "BitMEX",
            Self::Bitfinex => "Bitfinex",
            Self::Coinbase => "Coinbase",
            Self::Deribit => "Deribit",
            Self::Gate => "Gate",
            Self::Htx => "HTX",
            Self::Kraken => "Kraken",
            Self::Kucoin => "KuCoin",
            Self::Mexc => "MEXC",
            Self::Coinex => "CoinEx",
            Self::CryptoCom => "Crypto.com",
            Self::Dydx => "dYdX",
            Self::Hyperliquid => "Hyperliquid",
            Self::Bingx => "BingX",
            Self::Bitstamp => "Bitstamp",
            Self::Whitebit => "WhiteBIT",
            Self::Bitmart => "BitMart",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn parse(value: &str) -> Result<Self> {
        let needle = value.trim();
        Self::ALL
            .into_iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| invalid("exchange", value, Self::ALL.iter().map(|e| e.as_str())))
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quote currency of the trading pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuoteCurrency {
    Usdt,
    Usd,
    Usdc,
}

impl QuoteCurrency {
    pub const ALL: [QuoteCurrency; 3] = [Self::Usdt, Self::Usd, Self::Usdc];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usdt => "USDT",
            Self::Usd => "USD",
            Self::Usdc => "USDC",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        let needle = value.trim();
        Self::ALL
            .into_iter()
            .find(|q| q.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| {
                invalid(
                    "quoteCurrency",
                    value,
                    Self::ALL.iter().map(|q| q.as_str()),
                )
            })
    }
}

impl fmt::Display for QuoteCurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time window shown by the heatmap.
///
/// Codes are matched exactly: `1M` is one month, `1m` is not a valid code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeRange {
    H12,
    H24,
    H48,
    D3,
    W1,
    W2,
    M1,
    M3,
    M6,
    Y1,
}

impl TimeRange {
    pub const ALL: [TimeRange; 10] = [
        Self::H12,
        Self::H24,
        Self::H48,
        Self::D3,
        Self::W1,
        Self::W2,
        Self::M1,
        Self::M3,
        Self::M6,
        Self::Y1,
    ];

    /// Short code used in requests and filenames.
    pub fn code(&self) -> &'static str {
        match self {
            Self::H12 => "12h",
            Self::H24 => "24h",
            Self::H48 => "48h",
            Self::D3 => "3d",
            Self::W1 => "1w",
            Self::W2 => "2w",
            Self::M1 => "1M",
            Self::M3 => "3M",
            Self::M6 => "6M",
            Self::Y1 => "1y",
        }
    }

    /// Text of the matching entry in the page's time range control.
    pub fn label(&self) -> &'static str {
        match self {
            Self::H12 => "12 hour",
            Self::H24 => "24 hour",
            Self::H48 => "48 hour",
            Self::D3 => "3 day",
            Self::W1 => "1 week",
            Self::W2 => "2 week",
            Self::M1 => "1 month",
            Self::M3 => "3 month",
            Self::M6 => "6 month",
            Self::Y1 => "1 year",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        let needle = value.trim();
        Self::ALL
            .into_iter()
            .find(|r| r.code() == needle)
            .ok_or_else(|| invalid("timeRange", value, Self::ALL.iter().map(|r| r.code())))
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

fn invalid<'a>(field: &'static str, value: &str, allowed: impl Iterator<Item = &'a str>) -> Error {
    Error::InvalidInput {
        field,
        value: value.to_string(),
        allowed: allowed.collect::<Vec<_>>().join(", "),
    }
}

/// Input record as supplied by the caller. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRequest {
    pub coin: Option<String>,
    pub exchange: Option<String>,
    pub quote_currency: Option<String>,
    pub time_range: Option<String>,
    pub headless: Option<bool>,
    /// Bound in milliseconds on waiting for the chart to appear after navigation.
    pub wait_timeout: Option<u64>,
}

impl RawRequest {
    /// Load from a JSON file.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Validate and fill in defaults.
    pub fn resolve(&self) -> Result<CaptureRequest> {
        let coin = match self.coin.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => parse_coin(c)?,
            _ => DEFAULT_COIN.to_string(),
        };
        let exchange = match self.exchange.as_deref() {
            Some(e) => Exchange::parse(e)?,
            None => Exchange::Binance,
        };
        let quote_currency = match self.quote_currency.as_deref() {
            Some(q) => QuoteCurrency::parse(q)?,
            None => QuoteCurrency::Usdt,
        };
        let time_range = match self.time_range.as_deref() {
            Some(t) => TimeRange::parse(t)?,
            None => TimeRange::H24,
        };
        if self.wait_timeout == Some(0) {
            return Err(Error::InvalidInput {
                field: "waitTimeout",
                value: "0".into(),
                allowed: "a positive number of milliseconds".into(),
            });
        }

        Ok(CaptureRequest {
            coin,
            exchange,
            quote_currency,
            time_range,
            headless: self.headless.unwrap_or(true),
            wait_timeout_ms: self.wait_timeout,
        })
    }
}

const DEFAULT_COIN: &str = "BTC";
const MAX_COIN_LEN: usize = 32;

/// Coins end up in artifact keys, so only ASCII letters and digits pass.
fn parse_coin(value: &str) -> Result<String> {
    if value.len() > MAX_COIN_LEN || !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::InvalidInput {
            field: "coin",
            value: value.to_string(),
            allowed: format!("up to {} ASCII letters and digits", MAX_COIN_LEN),
        });
    }
    Ok(value.to_ascii_uppercase())
}

/// A fully resolved capture request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub coin: String,
    pub exchange: Exchange,
    pub quote_currency: QuoteCurrency,
    pub time_range: TimeRange,
    pub headless: bool,
    pub wait_timeout_ms: Option<u64>,
}

impl CaptureRequest {
    /// Trading pair symbol, e.g. `BTCUSDT`.
    pub fn symbol(&self) -> String {
        format!("{}{}", self.coin, self.quote_currency)
    }
}

impl Default for CaptureRequest {
    fn default() -> Self {
        Self {
            coin: DEFAULT_COIN.to_string(),
            exchange: Exchange::Binance,
            quote_currency: QuoteCurrency::Usdt,
            time_range: TimeRange::H24,
            headless: true,
            wait_timeout_ms: None,
        }
    }
}
