//! # heatshot
//!
//! Capture a liquidation heatmap chart once its canvas has finished drawing,
//! publish the PNG to an artifact store, and report where it went.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use heatshot::{EokaLauncher, RawRequest, Runner, Settings, store};
//!
//! # #[tokio::main]
//! # async fn main() -> heatshot::Result<()> {
//! let settings = Settings::load("configs/default.yaml")?;
//! let store = store::from_config(&settings.storage)?;
//! let runner = Runner::new(settings, EokaLauncher, store);
//!
//! let raw = RawRequest {
//!     coin: Some("ETH".into()),
//!     exchange: Some("OKX".into()),
//!     ..Default::default()
//! };
//! let result = runner.capture(&raw).await?;
//! println!("{}", serde_json::to_string_pretty(&result)?);
//! # Ok(())
//! # }
//! ```

pub mod capture;
mod config;
pub mod navigate;
pub mod readiness;
mod runner;
pub mod session;
pub mod store;

pub use config::{
    ApifyStoreConfig, BrowserSettings, CaptureRequest, Exchange, LocalStoreConfig,
    NavigationSettings, QuoteCurrency, RawRequest, ReadinessConfig, Settings, StorageConfig,
    TargetSettings, TimeRange, Viewport,
};
pub use readiness::{Progress, RenderState, Sample};
pub use runner::{CaptureResult, Runner, Stage};
pub use session::{EokaLauncher, Launcher, PageDriver, SessionGuard};
pub use store::ArtifactStore;

/// Result type for heatshot operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving, capturing, or publishing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid {field} '{value}': expected one of {allowed}")]
    InvalidInput {
        field: &'static str,
        value: String,
        allowed: String,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("page interaction failed: {0}")]
    Interaction(String),

    #[error("canvas stayed blank for {waited_ms}ms")]
    RenderEmpty { waited_ms: u64 },

    #[error("canvas did not settle within {waited_ms}ms")]
    RenderTimeout { waited_ms: u64 },

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("timeout: {0}")]
    Timeout(String),
}

impl Error {
    /// Stable taxonomy name, reported as `errorKind` in failed results.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "InvalidInput",
            Self::Config(_) | Self::Yaml(_) => "ConfigError",
            Self::Json(_) | Self::Io(_) => "IoError",
            Self::Browser(_) => "BrowserError",
            Self::Navigation(_) => "NavigationError",
            Self::Interaction(_) => "InteractionError",
            Self::RenderEmpty { .. } => "RenderEmpty",
            Self::RenderTimeout { .. } => "RenderTimeout",
            Self::Capture(_) => "CaptureError",
            Self::Storage(_) => "StorageError",
            Self::Timeout(_) => "Timeout",
        }
    }
}
