use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

use super::ObjectStore;

/// Objects served over plain HTTP(S), e.g. a public bucket website endpoint.
/// Keys are appended to `base_url`.
pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key.trim_start_matches('/'))
    }
}

#[async_trait]
impl ObjectStore for HttpStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let url = self.url_for(key);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;

        if resp.status() == StatusCode::NOT_FOUND {
            debug!(url, "Object not found");
            return Ok(None);
        }

        let resp = resp.error_for_status()?;
        Ok(Some(resp.bytes().await?))
    }
}
