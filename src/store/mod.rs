//! Artifact stores that hold published captures.

mod apify;
mod local;

pub use apify::ApifyStore;
pub use local::LocalStore;

use crate::config::StorageConfig;
use crate::runner::CaptureResult;
use crate::{Error, Result};
use async_trait::async_trait;

/// Key-value store for captured images.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under `key` and return a URL the object can be fetched from.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;

    /// Keep a copy of the run's result record alongside the artifacts.
    async fn record_result(&self, _result: &CaptureResult) -> Result<()> {
        Ok(())
    }
}

/// Build the store named by the settings.
pub fn from_config(config: &StorageConfig) -> Result<Box<dyn ArtifactStore>> {
    match config {
        StorageConfig::Local(local) => Ok(Box::new(LocalStore::new(&local.dir))),
        StorageConfig::Apify(apify) => Ok(Box::new(ApifyStore::from_config(apify)?)),
    }
}

/// Key under which the result record is stored.
pub const OUTPUT_KEY: &str = "OUTPUT";

const MAX_KEY_LEN: usize = 256;

/// Keys are plain names: ASCII letters, digits and `!-_.'()`, no paths.
pub fn check_key(key: &str) -> Result<()> {
    let valid_chars = key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "!-_.'()".contains(c));
    if key.is_empty() || key.len() > MAX_KEY_LEN || !valid_chars || key == "." || key == ".." {
        return Err(Error::Storage(format!("invalid artifact key '{}'", key)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_key() {
        assert!(check_key("Binance_BTCUSDT_24h_20241215_120000.png").is_ok());
        assert!(check_key("Crypto.com_BTCUSDT_1M_20241215_120000.png").is_ok());
        assert!(check_key("").is_err());
        assert!(check_key("..").is_err());
        assert!(check_key("a/b.png").is_err());
        assert!(check_key("a b.png").is_err());
        assert!(check_key(&"x".repeat(257)).is_err());
    }

    #[test]
    fn test_from_config_local() {
        let store = from_config(&StorageConfig::default());
        assert!(store.is_ok());
    }
}
