use super::{check_key, ArtifactStore, OUTPUT_KEY};
use crate::config::ApifyStoreConfig;
use crate::runner::CaptureResult;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info};

const DEFAULT_API_BASE: &str = "https://api.apify.com";

/// Apify key-value store, with the result also pushed to the run's dataset.
#[derive(Debug, Clone)]
pub struct ApifyStore {
    client: reqwest::Client,
    token: String,
    store_id: String,
    dataset_id: Option<String>,
    api_base: String,
    public_base: String,
}

impl ApifyStore {
    /// Build from settings, falling back to the Apify platform environment.
    pub fn from_config(config: &ApifyStoreConfig) -> Result<Self> {
        let token = config
            .token
            .clone()
            .or_else(|| env("APIFY_TOKEN"))
            .ok_or_else(|| Error::Config("apify storage needs a token (APIFY_TOKEN)".into()))?;
        let store_id = config
            .store_id
            .clone()
            .or_else(|| env("APIFY_DEFAULT_KEY_VALUE_STORE_ID"))
            .ok_or_else(|| {
                Error::Config(
                    "apify storage needs a store id (APIFY_DEFAULT_KEY_VALUE_STORE_ID)".into(),
                )
            })?;
        let dataset_id = config
            .dataset_id
            .clone()
            .or_else(|| env("APIFY_DEFAULT_DATASET_ID"));
        let api_base = config
            .api_base_url
            .clone()
            .or_else(|| env("APIFY_API_BASE_URL"))
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let public_base = config
            .public_base_url
            .clone()
            .or_else(|| env("APIFY_API_PUBLIC_BASE_URL"))
            .unwrap_or_else(|| api_base.clone());

        Ok(Self {
            client: reqwest::Client::new(),
            token,
            store_id,
            dataset_id,
            api_base: api_base.trim_end_matches('/').to_string(),
            public_base: public_base.trim_end_matches('/').to_string(),
        })
    }

    fn record_url(&self, base: &str, key: &str) -> String {
        format!(
            "{}/v2/key-value-stores/{}/records/{}",
            base, self.store_id, key
        )
    }

    /// Public URL of a stored record.
    pub fn public_url(&self, key: &str) -> String {
        self.record_url(&self.public_base, key)
    }

    async fn put_record(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        check_key(key)?;
        let url = self.record_url(&self.api_base, key);
        debug!("PUT {} ({} bytes)", url, body.len());
        self.client
            .put(&url)
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Storage(format!("upload of '{}' failed: {}", key, e)))?;
        Ok(())
    }
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[async_trait]
impl ArtifactStore for ApifyStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        self.put_record(key, bytes, content_type).await?;
        let url = self.public_url(key);
        info!("Stored {} in key-value store {}", key, self.store_id);
        Ok(url)
    }

    async fn record_result(&self, result: &CaptureResult) -> Result<()> {
        let json = serde_json::to_vec(result)?;
        self.put_record(OUTPUT_KEY, json, "application/json").await?;

        if let Some(ref dataset_id) = self.dataset_id {
            let url = format!("{}/v2/datasets/{}/items", self.api_base, dataset_id);
            debug!("POST {}", url);
            self.client
                .post(&url)
                .bearer_auth(&self.token)
                .json(&[result])
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| Error::Storage(format!("dataset push failed: {}", e)))?;
        }
        Ok(())
    }
}
