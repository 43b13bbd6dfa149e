//! Per-segment accumulation of observed speeds across fragments.
//!
//! Fragments for one tile are folded into a [`SegmentSeries`] in any order.
//! Growth is monotonic and samples are only ever appended to the segment they
//! address, so after the final sort the result does not depend on fragment
//! arrival order.

use tracing::{debug, error, warn};

use crate::error::{DecodeError, ValidationWarning, WarningKind};
use crate::parser::{FragmentDescriptor, decode_fragment};

/// Highest valid speed. Anything above is a data error upstream.
pub const MAX_VALID_SPEED: i64 = 160;

/// How a raw sample is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleClass {
    /// `0 < speed <= MAX_VALID_SPEED`
    Valid(u32),
    /// `speed <= 0`, the common case for hours without traffic.
    NoObservation,
    /// `speed > MAX_VALID_SPEED`
    OutOfRange,
}

pub fn classify_speed(raw: i64) -> SampleClass {
    if raw <= 0 {
        SampleClass::NoObservation
    } else if raw <= MAX_VALID_SPEED {
        SampleClass::Valid(raw as u32)
    } else {
        SampleClass::OutOfRange
    }
}

/// Segment addressed by the `sample`-th entry of a subtile.
pub fn segment_index_for(start_segment_index: u32, sample: usize, entries_per_segment: u32) -> u32 {
    start_segment_index + (sample / entries_per_segment as usize) as u32
}

/// Global segment id used in diagnostics.
pub fn segment_id(segment_index: u32, tile_index: u32, level: u32) -> u64 {
    ((segment_index as u64) << 25) | ((tile_index as u64) << 3) | level as u64
}

/// Half-open time range `[start, end)` in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct TimeRange {
    pub start: u32,
    pub end: u32,
}

impl TimeRange {
    pub fn merge(self, other: TimeRange) -> TimeRange {
        TimeRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn duration(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }
}

/// Accumulation state for one tile.
#[derive(Debug, Default)]
pub struct SegmentSeries {
    segments: Vec<Vec<u32>>,
    range: Option<TimeRange>,
    warnings: Vec<ValidationWarning>,
    fragments: usize,
}

impl SegmentSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Grows the series to at least `total` segments. Never shrinks.
    pub fn ensure_segments(&mut self, total: usize) {
        if self.segments.len() < total {
            self.segments.resize_with(total, Vec::new);
        }
    }

    /// Folds one fragment into the state.
    pub fn accumulate(&mut self, fragment: &FragmentDescriptor) {
        self.fragments += 1;
        self.ensure_segments(fragment.total_segments as usize);

        let window = TimeRange {
            start: fragment.range_start,
            end: fragment.range_end,
        };
        self.range = Some(match self.range {
            Some(range) => range.merge(window),
            None => window,
        });

        let remainder = fragment.entries_remainder();
        if remainder != 0 {
            warn!(
                level = fragment.level,
                tile_index = fragment.index,
                unit_size = fragment.unit_size,
                entry_size = fragment.entry_size,
                "unit size is not a multiple of entry size"
            );
            self.warnings.push(ValidationWarning {
                kind: WarningKind::UnevenEntries,
                level: fragment.level,
                tile_index: fragment.index,
                segment_index: None,
                segment_id: None,
                value: remainder as u64,
            });
        }

        let entries = fragment.entries_per_segment();
        debug!(
            level = fragment.level,
            tile_index = fragment.index,
            start_segment_index = fragment.start_segment_index,
            total_segments = fragment.total_segments,
            entries,
            samples = fragment.speeds.len(),
            "accumulating subtile"
        );

        for (i, &speed) in fragment.speeds.iter().enumerate() {
            let segment_index = segment_index_for(fragment.start_segment_index, i, entries);
            match classify_speed(speed as i64) {
                SampleClass::Valid(speed) => self.segments[segment_index as usize].push(speed),
                SampleClass::NoObservation => {}
                SampleClass::OutOfRange => {
                    let id = segment_id(segment_index, fragment.index, fragment.level);
                    error!(
                        sample = i,
                        segment_index,
                        segment_id = id,
                        speed,
                        "invalid speed"
                    );
                    self.warnings.push(ValidationWarning {
                        kind: WarningKind::SpeedOutOfRange,
                        level: fragment.level,
                        tile_index: fragment.index,
                        segment_index: Some(segment_index),
                        segment_id: Some(id),
                        value: speed as u64,
                    });
                }
            }
        }
    }

    /// Sorts every segment once and hands the result over.
    pub fn finish(mut self) -> AggregatedTile {
        for (i, segment) in self.segments.iter_mut().enumerate() {
            segment.sort_unstable();
            if !segment.is_empty() {
                debug!(segment_index = i, samples = segment.len(), "sorted segment speeds");
            }
        }

        AggregatedTile {
            segments: self.segments,
            range: self.range,
            warnings: self.warnings,
            fragments: self.fragments,
        }
    }
}

/// Sorted per-segment speeds for a tile, ready for percentile selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedTile {
    pub segments: Vec<Vec<u32>>,
    /// `None` when no fragment was folded in.
    pub range: Option<TimeRange>,
    pub warnings: Vec<ValidationWarning>,
    /// Number of subtile descriptors folded in.
    pub fragments: usize,
}

impl AggregatedTile {
    pub fn sample_count(&self) -> usize {
        self.segments.iter().map(Vec::len).sum()
    }

    pub fn segments_with_data(&self) -> usize {
        self.segments.iter().filter(|s| !s.is_empty()).count()
    }
}

/// Folds all descriptors and sorts the result.
pub fn accumulate<'a, I>(fragments: I) -> AggregatedTile
where
    I: IntoIterator<Item = &'a FragmentDescriptor>,
{
    let mut series = SegmentSeries::new();
    for fragment in fragments {
        series.accumulate(fragment);
    }
    series.finish()
}

/// Decodes every source first and only then aggregates, so a single bad
/// fragment fails the tile without any partial state escaping.
pub fn accumulate_sources<B: AsRef<[u8]>>(sources: &[B]) -> Result<AggregatedTile, DecodeError> {
    let mut descriptors = Vec::new();
    for source in sources {
        descriptors.extend(decode_fragment(source.as_ref())?);
    }
    Ok(accumulate(&descriptors))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(start: u32, total: u32, range: (u32, u32), speeds: Vec<u32>) -> FragmentDescriptor {
        FragmentDescriptor {
            level: 1,
            index: 2415,
            start_segment_index: start,
            total_segments: total,
            subtile_segments: total,
            range_start: range.0,
            range_end: range.1,
            unit_size: 2,
            entry_size: 1,
            speeds,
        }
    }

    #[test]
    fn test_segment_index_for() {
        assert_eq!(segment_index_for(0, 0, 1), 0);
        assert_eq!(segment_index_for(0, 5, 1), 5);
        assert_eq!(segment_index_for(10, 0, 168), 10);
        assert_eq!(segment_index_for(10, 167, 168), 10);
        assert_eq!(segment_index_for(10, 168, 168), 11);
        assert_eq!(segment_index_for(3, 7, 2), 6);
    }

    #[test]
    fn test_classify_speed_bounds() {
        assert_eq!(classify_speed(-5), SampleClass::NoObservation);
        assert_eq!(classify_speed(0), SampleClass::NoObservation);
        assert_eq!(classify_speed(1), SampleClass::Valid(1));
        assert_eq!(classify_speed(160), SampleClass::Valid(160));
        assert_eq!(classify_speed(161), SampleClass::OutOfRange);
    }

    #[test]
    fn test_segment_id() {
        assert_eq!(segment_id(0, 0, 0), 0);
        assert_eq!(segment_id(1, 2415, 1), (1 << 25) | (2415 << 3) | 1);
    }

    #[test]
    fn test_samples_map_to_segments() {
        let f = fragment(2, 5, (0, 10), vec![10, 20, 30, 40, 50, 60]);
        let tile = accumulate([&f]);

        assert_eq!(tile.segments.len(), 5);
        assert!(tile.segments[0].is_empty());
        assert!(tile.segments[1].is_empty());
        assert_eq!(tile.segments[2], vec![10, 20]);
        assert_eq!(tile.segments[3], vec![30, 40]);
        assert_eq!(tile.segments[4], vec![50, 60]);
    }

    #[test]
    fn test_out_of_range_and_zero_excluded() {
        let f = fragment(0, 1, (0, 10), vec![0, 161]);
        let tile = accumulate([&f]);

        assert!(tile.segments[0].is_empty());
        assert_eq!(tile.warnings.len(), 1);
        let w = &tile.warnings[0];
        assert_eq!(w.kind, WarningKind::SpeedOutOfRange);
        assert_eq!(w.segment_index, Some(0));
        assert_eq!(w.value, 161);
    }

    #[test]
    fn test_growth_never_shrinks() {
        let big = fragment(8, 10, (0, 10), vec![10, 20]);
        let small = fragment(0, 5, (0, 10), vec![30, 40]);

        let mut series = SegmentSeries::new();
        series.accumulate(&big);
        assert_eq!(series.len(), 10);
        series.accumulate(&small);
        assert_eq!(series.len(), 10);

        series.ensure_segments(3);
        assert_eq!(series.len(), 10);
    }

    #[test]
    fn test_time_range_merge() {
        let a = fragment(0, 1, (100, 200), vec![]);
        let b = fragment(0, 1, (50, 150), vec![]);

        let tile = accumulate([&a, &b]);
        assert_eq!(tile.range, Some(TimeRange { start: 50, end: 200 }));
    }

    #[test]
    fn test_no_fragments_has_no_range() {
        let tile = accumulate(std::iter::empty::<&FragmentDescriptor>());
        assert_eq!(tile.range, None);
        assert!(tile.segments.is_empty());
    }

    #[test]
    fn test_series_sorted_ascending() {
        let a = fragment(0, 1, (0, 10), vec![50, 10]);
        let b = fragment(0, 1, (10, 20), vec![30, 20]);

        let tile = accumulate([&a, &b]);
        assert_eq!(tile.segments[0], vec![10, 20, 30, 50]);
        assert_eq!(tile.sample_count(), 4);
        assert_eq!(tile.segments_with_data(), 1);
    }

    #[test]
    fn test_order_independent() {
        let a = fragment(0, 4, (0, 10), vec![5, 90, 0, 12]);
        let b = fragment(2, 4, (10, 20), vec![33, 170, 7, 7]);
        let c = fragment(0, 4, (20, 30), vec![60, 61, 62, 63, 64, 65, 66, 67]);

        let forward = accumulate([&a, &b, &c]);
        let reverse = accumulate([&c, &b, &a]);
        let shuffled = accumulate([&b, &c, &a]);

        assert_eq!(forward.segments, reverse.segments);
        assert_eq!(forward.segments, shuffled.segments);
        assert_eq!(forward.range, reverse.range);
        assert_eq!(forward.range, shuffled.range);
    }

    #[test]
    fn test_uneven_entries_warns_and_continues() {
        let mut f = fragment(0, 2, (0, 10), vec![10, 20, 30]);
        f.unit_size = 7;
        f.entry_size = 2;

        let tile = accumulate([&f]);
        assert_eq!(tile.warnings.len(), 1);
        assert_eq!(tile.warnings[0].kind, WarningKind::UnevenEntries);
        assert_eq!(tile.warnings[0].value, 1);
        // 3 entries per segment
        assert_eq!(tile.segments[0], vec![10, 20, 30]);
    }
}
