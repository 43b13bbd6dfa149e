use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use super::{FetchedFragment, FragmentSource, ObjectStore, gunzip};
use crate::config::{DEFAULT_WEEKS_PER_YEAR, TileJob};
use crate::parser::subtile_count;
use crate::tiles::TileHierarchy;

/// No cap by default: the sibling pool is sized to the subtile count.
pub const DEFAULT_MAX_CONCURRENCY: usize = usize::MAX;

/// A year of weekly speed tiles stored as
/// `{year}/{week}/{tile path}.{subtile}.gz`.
///
/// For every week the `.0.gz` object decides whether the week has data and,
/// via [`subtile_count`], how many sibling objects make up the tile.
pub struct WeeklyArchive<S> {
    store: Arc<S>,
    hierarchy: TileHierarchy,
    weeks: u32,
    separate_subtiles: bool,
    max_concurrency: usize,
}

impl<S: ObjectStore + 'static> WeeklyArchive<S> {
    pub fn new(store: S, hierarchy: TileHierarchy) -> Self {
        Self {
            store: Arc::new(store),
            hierarchy,
            weeks: DEFAULT_WEEKS_PER_YEAR,
            separate_subtiles: true,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    pub fn with_weeks(mut self, weeks: u32) -> Self {
        self.weeks = weeks;
        self
    }

    /// When disabled, only the `.0` object of each week is fetched.
    pub fn with_separate_subtiles(mut self, separate: bool) -> Self {
        self.separate_subtiles = separate;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Workers used to fetch the siblings of a tile split into `count`
    /// subtiles.
    pub fn pool_size(&self, count: u32) -> usize {
        (count as usize).min(self.max_concurrency).max(1)
    }

    pub fn key_for(&self, job: &TileJob, week: u32, subtile: u32) -> String {
        format!(
            "{}/{}/{}.{}.gz",
            job.year,
            week,
            self.hierarchy.path_for(job.level, job.tile_id),
            subtile
        )
    }

    /// Fetches all fragments of one week. Empty when the week has no data.
    #[tracing::instrument(skip(self, job), fields(level = %job.level, tile_id = job.tile_id))]
    async fn fetch_week(&self, job: &TileJob, week: u32) -> Result<Vec<FetchedFragment>> {
        let first_key = self.key_for(job, week, 0);
        let Some(compressed) = self.store.get(&first_key).await? else {
            debug!(key = %first_key, "No data for week");
            return Ok(Vec::new());
        };
        let first = FetchedFragment {
            bytes: gunzip(&compressed).with_context(|| format!("decompressing {first_key}"))?,
            key: first_key,
        };
        info!(key = %first.key, "Downloaded and decompressed fragment");

        let count = if self.separate_subtiles {
            subtile_count(&first.bytes).with_context(|| format!("reading {}", first.key))?
        } else {
            0
        };

        let mut fragments = vec![first];
        if count > 1 {
            fragments.extend(self.fetch_siblings(job, week, count).await?);
        }
        Ok(fragments)
    }

    /// Fetches subtiles `1..count` concurrently. Any missing sibling fails the
    /// week, since the tile would otherwise be aggregated from partial data.
    async fn fetch_siblings(
        &self,
        job: &TileJob,
        week: u32,
        count: u32,
    ) -> Result<Vec<FetchedFragment>> {
        let pool = self.pool_size(count);
        let semaphore = Arc::new(Semaphore::new(pool));
        let mut tasks = JoinSet::new();

        debug!(week, count, pool, "Fetching sibling subtiles");

        for subtile in 1..count {
            let store = Arc::clone(&self.store);
            let sem = Arc::clone(&semaphore);
            let key = self.key_for(job, week, subtile);

            tasks.spawn(async move {
                let _permit = sem.acquire_owned().await?;
                let compressed = store
                    .get(&key)
                    .await?
                    .ok_or_else(|| anyhow!("subtile fragment not found: {key}"))?;
                let bytes = gunzip(&compressed).with_context(|| format!("decompressing {key}"))?;
                info!(key = %key, "Downloaded and decompressed fragment");
                Ok::<_, anyhow::Error>((subtile, FetchedFragment { key, bytes }))
            });
        }

        let mut siblings = Vec::with_capacity(count as usize - 1);
        while let Some(joined) = tasks.join_next().await {
            siblings.push(joined??);
        }
        siblings.sort_by_key(|(subtile, _)| *subtile);

        Ok(siblings.into_iter().map(|(_, fragment)| fragment).collect())
    }
}

#[async_trait]
impl<S: ObjectStore + 'static> FragmentSource for WeeklyArchive<S> {
    #[tracing::instrument(skip(self, job), fields(year = job.year, level = %job.level, tile_id = job.tile_id))]
    async fn fragments(&self, job: &TileJob) -> Result<Vec<FetchedFragment>> {
        let mut fragments = Vec::new();
        for week in 0..self.weeks {
            fragments.extend(self.fetch_week(job, week).await?);
        }
        info!(fragments = fragments.len(), weeks = self.weeks, "Fetched fragments for tile");
        Ok(fragments)
    }
}
