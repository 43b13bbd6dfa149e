//! Fragment retrieval.
//!
//! The core only ever sees a complete list of fragment bytes for a tile.
//! [`FragmentSource`] is the seam: [`WeeklyArchive`] walks a year of weekly
//! objects in an [`ObjectStore`], [`FragmentList`] reads explicit local files.

mod directory;
mod http;
mod list;
mod s3;
mod weekly;

pub use directory::DirectoryStore;
pub use http::HttpStore;
pub use list::FragmentList;
pub use s3::S3Store;
pub use weekly::WeeklyArchive;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use flate2::read::GzDecoder;
use std::io::Read;

use crate::config::TileJob;

/// Key/value object storage. A missing object is `Ok(None)`, not an error.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;
}

/// Supplies every fragment for a tile job before aggregation starts.
#[async_trait]
pub trait FragmentSource: Send + Sync {
    async fn fragments(&self, job: &TileJob) -> Result<Vec<FetchedFragment>>;
}

/// Decompressed fragment bytes plus where they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFragment {
    pub key: String,
    pub bytes: Vec<u8>,
}

impl AsRef<[u8]> for FetchedFragment {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Decompresses a gzip payload.
pub fn gunzip(compressed: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(compressed);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .context("gzip decompression failed")?;
    Ok(out)
}

/// Gunzips `bytes` when `key` names a `.gz` object, otherwise passes them
/// through.
pub fn maybe_gunzip(key: &str, bytes: &[u8]) -> Result<Vec<u8>> {
    if key.ends_with(".gz") {
        gunzip(bytes).with_context(|| format!("decompressing {key}"))
    } else {
        Ok(bytes.to_vec())
    }
}
