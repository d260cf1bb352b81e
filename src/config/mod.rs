pub mod request;
pub mod schema;

pub use request::{CaptureRequest, Exchange, QuoteCurrency, RawRequest, TimeRange};
pub use schema::{
    ApifyStoreConfig, BrowserSettings, LocalStoreConfig, NavigationSettings, ReadinessConfig,
    Settings, StorageConfig, TargetSettings, Viewport,
};
