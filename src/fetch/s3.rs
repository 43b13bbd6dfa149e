use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use super::ObjectStore;

/// Objects in an S3 bucket, credentials and region taken from the ambient
/// AWS configuration.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Store {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(aws_sdk_s3::Client::new(&config), bucket)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let resp = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(err) => {
                let no_such_key = err
                    .as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false);
                let not_found = err
                    .raw_response()
                    .map(|r| r.status().as_u16() == 404)
                    .unwrap_or(false);
                if no_such_key || not_found {
                    debug!(bucket = %self.bucket, key, "Object not found");
                    return Ok(None);
                }
                return Err(err)
                    .with_context(|| format!("S3 GetObject failed for s3://{}/{key}", self.bucket));
            }
        };

        let data = resp
            .body
            .collect()
            .await
            .with_context(|| format!("reading body of s3://{}/{key}", self.bucket))?;
        Ok(Some(data.into_bytes()))
    }
}
