//! One reference speed job: fetch, decode, aggregate, encode, append.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::aggregate::{AggregatedTile, TimeRange, accumulate_sources};
use crate::config::TileJob;
use crate::encode::encode_reference_tile;
use crate::fetch::FragmentSource;
use crate::output::{append_record, append_warnings};
use crate::speedtile::SpeedTile;
use crate::tiles::TileHierarchy;

/// Where a job writes its results.
#[derive(Debug, Clone)]
pub struct OutputOptions {
    /// Root directory; the record goes to `{ref_tile_path}/{reference path}`.
    pub ref_tile_path: PathBuf,
    pub warnings_csv: Option<PathBuf>,
}

/// What a finished job produced.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub level: u32,
    pub tile_id: u32,
    pub fragments: usize,
    pub subtiles: usize,
    pub segments: usize,
    pub segments_with_data: usize,
    pub samples: usize,
    pub warnings: usize,
    pub time_range: TimeRange,
    pub output: String,
}

/// An encoded reference tile together with the aggregation behind it.
#[derive(Debug, Clone)]
pub struct ReferenceBuild {
    pub tile: SpeedTile,
    pub aggregated: AggregatedTile,
    pub range: TimeRange,
}

/// Aggregates complete fragment bytes and encodes the reference tile. Pure;
/// nothing is written.
pub fn build_reference_tile<B: AsRef<[u8]>>(fragments: &[B], job: &TileJob) -> Result<ReferenceBuild> {
    let aggregated = accumulate_sources(fragments).context("decoding fragments")?;
    let Some(range) = aggregated.range else {
        bail!("fragments for tile {} contain no subtiles", job.tile_id);
    };
    let tile = encode_reference_tile(&aggregated.segments, range, job.level.index(), job.tile_id);
    Ok(ReferenceBuild {
        tile,
        aggregated,
        range,
    })
}

/// Runs one job end to end. Nothing is appended unless every fragment
/// decoded.
#[tracing::instrument(skip(source, hierarchy, options), fields(year = job.year, level = %job.level, tile_id = job.tile_id))]
pub async fn run_job<S: FragmentSource + ?Sized>(
    source: &S,
    hierarchy: &TileHierarchy,
    job: &TileJob,
    options: &OutputOptions,
) -> Result<JobSummary> {
    let fragments = source.fragments(job).await?;
    if fragments.is_empty() {
        bail!(
            "no fragments found for {} tile {} in {}",
            job.level,
            job.tile_id,
            job.year
        );
    }
    info!(fragments = fragments.len(), "Aggregating speeds from fragments");

    let ReferenceBuild {
        tile,
        aggregated,
        range,
    } = build_reference_tile(&fragments, job)?;

    let output = options
        .ref_tile_path
        .join(hierarchy.reference_path_for(job.level, job.tile_id));
    append_record(&output, &tile)?;

    if !aggregated.warnings.is_empty() {
        warn!(warnings = aggregated.warnings.len(), "Data-quality warnings while aggregating");
        if let Some(path) = &options.warnings_csv {
            append_warnings(path, &aggregated.warnings)?;
        }
    }

    let summary = JobSummary {
        level: job.level.index(),
        tile_id: job.tile_id,
        fragments: fragments.len(),
        subtiles: aggregated.fragments,
        segments: aggregated.segments.len(),
        segments_with_data: aggregated.segments_with_data(),
        samples: aggregated.sample_count(),
        warnings: aggregated.warnings.len(),
        time_range: range,
        output: output.display().to_string(),
    };
    info!(
        output = %summary.output,
        segments = summary.segments,
        segments_with_data = summary.segments_with_data,
        "Reference tile written"
    );

    Ok(summary)
}
