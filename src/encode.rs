//! Percentile bucketing of sorted segment speeds into a reference speed tile.

use chrono::{DateTime, Utc};

use crate::aggregate::TimeRange;
use crate::speedtile::{SpeedTile, SubTile};

/// Percentiles emitted per segment, in whole percent.
pub const PERCENTILES: [u32; 4] = [20, 40, 60, 80];

/// Nearest-rank pick `sorted[floor(n * pct / 100)]` without interpolation.
/// 0 means no data.
///
/// Integer arithmetic keeps the index exact; for `pct < 100` it is always
/// below `n`.
pub fn percentile(sorted: &[u32], pct: u32) -> u32 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = sorted.len() * pct as usize / 100;
    sorted[rank]
}

/// The four reference speed columns, one entry per segment.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReferenceSpeeds {
    pub p20: Vec<u32>,
    pub p40: Vec<u32>,
    pub p60: Vec<u32>,
    pub p80: Vec<u32>,
}

impl ReferenceSpeeds {
    pub fn from_segments(segments: &[Vec<u32>]) -> Self {
        let mut speeds = ReferenceSpeeds {
            p20: Vec::with_capacity(segments.len()),
            p40: Vec::with_capacity(segments.len()),
            p60: Vec::with_capacity(segments.len()),
            p80: Vec::with_capacity(segments.len()),
        };
        for segment in segments {
            let [p20, p40, p60, p80] = PERCENTILES.map(|pct| percentile(segment, pct));
            speeds.p20.push(p20);
            speeds.p40.push(p40);
            speeds.p60.push(p60);
            speeds.p80.push(p80);
        }
        speeds
    }

    pub fn len(&self) -> usize {
        self.p20.len()
    }

    pub fn is_empty(&self) -> bool {
        self.p20.is_empty()
    }

    /// `(p20, p40, p60, p80)` of one segment.
    pub fn segment(&self, index: usize) -> Option<(u32, u32, u32, u32)> {
        Some((
            *self.p20.get(index)?,
            *self.p40.get(index)?,
            *self.p60.get(index)?,
            *self.p80.get(index)?,
        ))
    }
}

/// Human readable summary of the covered period.
pub fn describe_range(range: TimeRange) -> String {
    let days = range.duration() / 86_400;
    let start = DateTime::<Utc>::from_timestamp(range.start as i64, 0);
    // range end is exclusive
    let end = DateTime::<Utc>::from_timestamp(range.end.saturating_sub(1).max(range.start) as i64, 0);
    match (start, end) {
        (Some(start), Some(end)) => format!(
            "Reference speeds over {} days from {} through {}",
            days,
            start.format("%m.%Y"),
            end.format("%m.%Y")
        ),
        _ => format!("Reference speeds over {} days", days),
    }
}

/// Builds the single-subtile output record covering the whole tile and the
/// whole time range.
pub fn encode_reference_tile(
    segments: &[Vec<u32>],
    range: TimeRange,
    level: u32,
    index: u32,
) -> SpeedTile {
    let speeds = ReferenceSpeeds::from_segments(segments);
    let total = segments.len() as u32;
    let unit_size = range.duration();

    SpeedTile {
        subtiles: vec![SubTile {
            level: Some(level),
            index: Some(index),
            start_segment_index: Some(0),
            total_segments: Some(total),
            subtile_segments: Some(total),
            range_start: Some(range.start),
            range_end: Some(range.end),
            unit_size: Some(unit_size),
            entry_size: Some(unit_size),
            description: Some(describe_range(range)),
            reference_speeds_20: speeds.p20,
            reference_speeds_40: speeds.p40,
            reference_speeds_60: speeds.p60,
            reference_speeds_80: speeds.p80,
            ..Default::default()
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_rank_five() {
        let series = [10, 20, 30, 40, 50];
        assert_eq!(percentile(&series, 20), 20);
        assert_eq!(percentile(&series, 40), 30);
        assert_eq!(percentile(&series, 60), 40);
        assert_eq!(percentile(&series, 80), 50);
    }

    #[test]
    fn test_empty_series_is_no_data() {
        let speeds = ReferenceSpeeds::from_segments(&[vec![]]);
        assert_eq!(speeds.segment(0), Some((0, 0, 0, 0)));
    }

    #[test]
    fn test_small_series_stay_in_bounds() {
        for n in 1..=20u32 {
            let series: Vec<u32> = (1..=n).collect();
            for pct in PERCENTILES {
                let expected = (n as usize * pct as usize) / 100;
                assert!(expected < series.len());
                assert_eq!(percentile(&series, pct), series[expected]);
            }
        }
    }

    #[test]
    fn test_single_sample() {
        assert_eq!(ReferenceSpeeds::from_segments(&[vec![42]]).segment(0), Some((42, 42, 42, 42)));
    }

    #[test]
    fn test_four_samples() {
        // floor(4 * .2) = 0, floor(4 * .4) = 1, floor(4 * .6) = 2, floor(4 * .8) = 3
        let speeds = ReferenceSpeeds::from_segments(&[vec![11, 22, 33, 44]]);
        assert_eq!(speeds.segment(0), Some((11, 22, 33, 44)));
    }

    #[test]
    fn test_encode_flattens_to_one_subtile() {
        let segments = vec![vec![10, 20, 30, 40, 50], vec![], vec![7]];
        let range = TimeRange { start: 100, end: 700 };
        let tile = encode_reference_tile(&segments, range, 1, 2415);

        assert_eq!(tile.subtiles.len(), 1);
        let st = &tile.subtiles[0];
        assert_eq!(st.level(), 1);
        assert_eq!(st.index(), 2415);
        assert_eq!(st.start_segment_index(), 0);
        assert_eq!(st.total_segments(), 3);
        assert_eq!(st.subtile_segments(), 3);
        assert_eq!(st.range_start(), 100);
        assert_eq!(st.range_end(), 700);
        assert_eq!(st.unit_size(), 600);
        assert_eq!(st.entry_size(), 600);
        assert!(st.speeds.is_empty());
        assert_eq!(st.reference_speeds_20, vec![20, 0, 7]);
        assert_eq!(st.reference_speeds_40, vec![30, 0, 7]);
        assert_eq!(st.reference_speeds_60, vec![40, 0, 7]);
        assert_eq!(st.reference_speeds_80, vec![50, 0, 7]);
    }

    #[test]
    fn test_describe_range() {
        // 2016-08-01T00:00:00Z .. 2017-08-01T00:00:00Z
        let range = TimeRange {
            start: 1_470_009_600,
            end: 1_501_545_600,
        };
        assert_eq!(
            describe_range(range),
            "Reference speeds over 365 days from 08.2016 through 07.2017"
        );
    }
}
