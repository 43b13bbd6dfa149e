//! Protobuf reader for weekly speed tile fragments.
//!
//! Decoding only exposes structure. Speed values are passed through untouched;
//! deciding which samples count is the aggregator's job.

use prost::Message;

use crate::error::DecodeError;
use crate::speedtile::{SpeedTile, SubTile};

/// One decoded subtile: a contiguous run of segments of a tile over one time
/// window, with `entries_per_segment()` samples per segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentDescriptor {
    pub level: u32,
    pub index: u32,
    pub start_segment_index: u32,
    pub total_segments: u32,
    pub subtile_segments: u32,
    pub range_start: u32,
    pub range_end: u32,
    pub unit_size: u32,
    pub entry_size: u32,
    pub speeds: Vec<u32>,
}

impl FragmentDescriptor {
    /// Samples per segment, `unit_size / entry_size`.
    pub fn entries_per_segment(&self) -> u32 {
        self.unit_size / self.entry_size
    }

    /// Leftover of `unit_size / entry_size`. Non-zero means the producer's
    /// sizing does not line up with its sample layout.
    pub fn entries_remainder(&self) -> u32 {
        self.unit_size % self.entry_size
    }

    fn from_subtile(subtile: usize, st: SubTile) -> Result<Self, DecodeError> {
        // absent fields are the wire form of 0; the sizing and range checks
        // below reject the combinations that cannot be aggregated
        let descriptor = FragmentDescriptor {
            level: st.level(),
            index: st.index(),
            start_segment_index: st.start_segment_index(),
            total_segments: st.total_segments(),
            subtile_segments: st.subtile_segments(),
            range_start: st.range_start(),
            range_end: st.range_end(),
            unit_size: st.unit_size(),
            entry_size: st.entry_size(),
            speeds: st.speeds,
        };

        if descriptor.entry_size == 0 || descriptor.unit_size < descriptor.entry_size {
            return Err(DecodeError::InvalidSizing {
                subtile,
                unit_size: descriptor.unit_size,
                entry_size: descriptor.entry_size,
            });
        }

        if let Some(last) = descriptor.last_segment_index() {
            if last >= descriptor.total_segments {
                return Err(DecodeError::SegmentOutOfRange {
                    subtile,
                    segment_index: last,
                    total_segments: descriptor.total_segments,
                });
            }
        }

        Ok(descriptor)
    }

    /// Segment index of the final sample, if there are any samples.
    fn last_segment_index(&self) -> Option<u32> {
        let last_sample = self.speeds.len().checked_sub(1)?;
        let offset = last_sample as u64 / self.entries_per_segment() as u64;
        Some(u32::try_from(self.start_segment_index as u64 + offset).unwrap_or(u32::MAX))
    }
}

/// Decodes a protobuf-encoded [`SpeedTile`] from raw bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid protobuf for a `SpeedTile`.
pub fn parse_tile(bytes: &[u8]) -> Result<SpeedTile, DecodeError> {
    Ok(SpeedTile::decode(bytes)?)
}

/// Decodes a fragment into one descriptor per subtile entry.
///
/// # Errors
///
/// Fails on invalid protobuf, an empty subtile list, unusable unit/entry
/// sizing, or samples addressing segments past `total_segments`. Absent
/// scalar fields read as 0.
pub fn decode_fragment(bytes: &[u8]) -> Result<Vec<FragmentDescriptor>, DecodeError> {
    let tile = parse_tile(bytes)?;
    if tile.subtiles.is_empty() {
        return Err(DecodeError::NoSubtiles);
    }

    tile.subtiles
        .into_iter()
        .enumerate()
        .map(|(i, st)| FragmentDescriptor::from_subtile(i, st))
        .collect()
}

/// Number of sibling fragments that together cover the tile for one time
/// window, judged from the first subtile. 0 when the whole tile fits in a
/// single fragment.
pub fn subtile_count(bytes: &[u8]) -> Result<u32, DecodeError> {
    let tile = parse_tile(bytes)?;
    let first = tile.subtiles.first().ok_or(DecodeError::NoSubtiles)?;

    let total = first.total_segments();
    let per_subtile = first.subtile_segments();
    if total <= per_subtile {
        return Ok(0);
    }
    if per_subtile == 0 {
        return Err(DecodeError::MissingField {
            subtile: 0,
            field: "subtile_segments",
        });
    }

    Ok(total.div_ceil(per_subtile))
}
