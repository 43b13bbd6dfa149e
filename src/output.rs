//! Persistence for reference tiles and run diagnostics.
//!
//! Reference tiles are only ever appended, so repeated runs against the same
//! file accumulate records. Warnings go to an append-only CSV.

use anyhow::{Context, Result};
use prost::Message;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ValidationWarning;
use crate::speedtile::SpeedTile;
use csv::WriterBuilder;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Logs any serializable value as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Appends one encoded [`SpeedTile`] to `path`, creating the file and its
/// parent directories if needed.
pub fn append_record(path: &Path, tile: &SpeedTile) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {}", parent.display()))?;
    }

    let bytes = tile.encode_to_vec();
    debug!(path = %path.display(), bytes = bytes.len(), "Appending reference tile");

    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    file.write_all(&bytes)?;
    file.flush()?;

    Ok(())
}

/// Reads every record appended to `path`. Concatenated messages merge, so
/// the subtiles of all records come back in append order.
pub fn read_records(path: &Path) -> Result<SpeedTile> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(SpeedTile::decode(bytes.as_slice())?)
}

/// Appends warnings as rows to a CSV file. Creates the file with headers if it
/// does not already exist.
pub fn append_warnings(path: &Path, warnings: &[ValidationWarning]) -> Result<()> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, rows = warnings.len(), "Appending warnings");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    for warning in warnings {
        writer.serialize(warning)?;
    }
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WarningKind;
    use crate::speedtile::SubTile;
    use std::env;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(name)
    }

    fn tile(index: u32) -> SpeedTile {
        SpeedTile {
            subtiles: vec![SubTile {
                level: Some(0),
                index: Some(index),
                reference_speeds_20: vec![1, 2, 3],
                ..Default::default()
            }],
        }
    }

    fn warning(speed: u64) -> ValidationWarning {
        ValidationWarning {
            kind: WarningKind::SpeedOutOfRange,
            level: 0,
            tile_index: 7,
            segment_index: Some(3),
            segment_id: Some(3 << 25 | 7 << 3),
            value: speed,
        }
    }

    #[test]
    fn test_print_json_does_not_panic() {
        print_json(&warning(200)).unwrap();
    }

    #[test]
    fn test_append_record_creates_parents() {
        let dir = temp_path("ref_speed_tiles_test_parents");
        let _ = fs::remove_dir_all(&dir);
        let path = dir.join("0/000/007.ref");

        append_record(&path, &tile(7)).unwrap();

        assert!(path.exists());
        let read = read_records(&path).unwrap();
        assert_eq!(read, tile(7));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_append_record_accumulates() {
        let path = temp_path("ref_speed_tiles_test_accumulate.ref");
        let _ = fs::remove_file(&path);

        append_record(&path, &tile(1)).unwrap();
        append_record(&path, &tile(2)).unwrap();

        let read = read_records(&path).unwrap();
        assert_eq!(read.subtiles.len(), 2);
        assert_eq!(read.subtiles[0].index(), 1);
        assert_eq!(read.subtiles[1].index(), 2);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_append_warnings_writes_header_once() {
        let path = temp_path("ref_speed_tiles_test_warnings.csv");
        let _ = fs::remove_file(&path);

        append_warnings(&path, &[warning(161)]).unwrap();
        append_warnings(&path, &[warning(170), warning(250)]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines.iter().filter(|l| l.starts_with("kind")).count(), 1);
        assert!(lines[1].starts_with("SpeedOutOfRange"));
        assert!(lines[3].ends_with("250"));

        fs::remove_file(&path).unwrap();
    }
}
