use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

use super::{FetchedFragment, FragmentSource, maybe_gunzip};
use crate::config::TileJob;

/// An explicit list of local fragment files, used as-is for any job.
/// `.gz` files are decompressed.
pub struct FragmentList {
    paths: Vec<PathBuf>,
}

impl FragmentList {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

#[async_trait]
impl FragmentSource for FragmentList {
    async fn fragments(&self, _job: &TileJob) -> Result<Vec<FetchedFragment>> {
        let mut fragments = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            let key = path.display().to_string();
            let raw = tokio::fs::read(path)
                .await
                .with_context(|| format!("reading fragment {key}"))?;
            let bytes = maybe_gunzip(&key, &raw)?;
            debug!(key, bytes = bytes.len(), "Loaded local fragment");
            fragments.push(FetchedFragment { key, bytes });
        }
        Ok(fragments)
    }
}
