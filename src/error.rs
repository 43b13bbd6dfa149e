//! Error and diagnostic types shared by the decode and aggregation stages.

use serde::Serialize;
use thiserror::Error;

/// A fragment's bytes could not be turned into usable subtile descriptors.
///
/// Fatal for the whole tile job: aggregating without the fragment would be
/// indistinguishable from segments that genuinely had no observations.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid speed tile protobuf: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("speed tile contains no subtiles")]
    NoSubtiles,

    #[error("subtile {subtile} is missing required field `{field}`")]
    MissingField { subtile: usize, field: &'static str },

    #[error("subtile {subtile} has unusable sizing: unit_size={unit_size}, entry_size={entry_size}")]
    InvalidSizing {
        subtile: usize,
        unit_size: u32,
        entry_size: u32,
    },

    #[error("subtile {subtile} addresses segment {segment_index} but the tile has {total_segments} segments")]
    SegmentOutOfRange {
        subtile: usize,
        segment_index: u32,
        total_segments: u32,
    },
}

/// Kind of non-fatal data-quality finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WarningKind {
    /// A sample above the valid speed ceiling; excluded from its segment.
    SpeedOutOfRange,
    /// `unit_size` is not a multiple of `entry_size`.
    UnevenEntries,
}

/// A non-fatal finding recorded while aggregating. Processing continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationWarning {
    pub kind: WarningKind,
    pub level: u32,
    pub tile_index: u32,
    pub segment_index: Option<u32>,
    pub segment_id: Option<u64>,
    /// Raw speed for `SpeedOutOfRange`, `unit_size % entry_size` for
    /// `UnevenEntries`.
    pub value: u64,
}
