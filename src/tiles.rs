//! Tile hierarchy geometry and the level/tile-id to file path convention.
//!
//! Three fixed levels tile the world bounding box with square tiles. A tile
//! is addressed on disk and in the remote archive by a nested path built from
//! 3-digit chunks of `level` followed by the zero-padded tile id, e.g. tile
//! 415 on the highway level becomes `0/000/415.spd`.

use std::fmt;

/// Extension of weekly speed tile fragments.
pub const SPEED_TILE_EXT: &str = "spd";

/// Extension of the reference speed output files.
pub const REFERENCE_TILE_EXT: &str = "ref";

/// Axis-aligned bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub const WORLD: BoundingBox = BoundingBox {
        min_x: -180.0,
        min_y: -90.0,
        max_x: 180.0,
        max_y: 90.0,
    };
}

/// Hierarchy level. The numeric value is the one stored in tiles and used in
/// paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Highway = 0,
    Arterial = 1,
    Local = 2,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Highway, Level::Arterial, Level::Local];

    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(Level::Highway),
            1 => Some(Level::Arterial),
            2 => Some(Level::Local),
            _ => None,
        }
    }

    pub fn index(self) -> u32 {
        self as u32
    }

    /// Square tile size in degrees.
    pub fn tile_size(self) -> f64 {
        match self {
            Level::Highway => 4.0,
            Level::Arterial => 1.0,
            Level::Local => 0.25,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Highway => write!(f, "highway"),
            Level::Arterial => write!(f, "arterial"),
            Level::Local => write!(f, "local"),
        }
    }
}

/// Row-major grid of square tiles over a bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileGrid {
    pub bbox: BoundingBox,
    pub tile_size: f64,
    pub columns: u32,
    pub rows: u32,
}

impl TileGrid {
    pub fn new(bbox: BoundingBox, tile_size: f64) -> Self {
        let columns = ((bbox.max_x - bbox.min_x) / tile_size).ceil() as u32;
        let rows = ((bbox.max_y - bbox.min_y) / tile_size).ceil() as u32;
        Self {
            bbox,
            tile_size,
            columns,
            rows,
        }
    }

    pub fn tile_count(&self) -> u32 {
        self.columns * self.rows
    }

    pub fn max_tile_id(&self) -> u32 {
        self.tile_count().saturating_sub(1)
    }

    /// Number of digits the path numeral reserves for a tile id: the digit
    /// count of the max tile id, rounded up to a multiple of 3.
    pub fn padded_digits(&self) -> usize {
        let digits = digit_count(self.max_tile_id());
        digits.div_ceil(3) * 3
    }

    /// Relative path of `tile_id` on `level` with the given extension.
    ///
    /// The tile id is not bounds checked.
    pub fn file_path(&self, level: Level, tile_id: u32, ext: &str) -> String {
        // Formatting the level and the padded id separately keeps the leading
        // "0" of the highway level, which `level * 10^n + id` would drop.
        let numeral = format!(
            "{}{:0width$}",
            level.index(),
            tile_id,
            width = self.padded_digits()
        );
        format!("{}.{}", chunk_digits(&numeral), ext)
    }
}

/// The fixed three-level hierarchy. Passed explicitly to whoever needs to
/// address tiles.
#[derive(Debug, Clone, PartialEq)]
pub struct TileHierarchy {
    levels: [TileGrid; 3],
}

impl TileHierarchy {
    pub fn new(bbox: BoundingBox) -> Self {
        Self {
            levels: Level::ALL.map(|level| TileGrid::new(bbox, level.tile_size())),
        }
    }

    pub fn world() -> Self {
        Self::new(BoundingBox::WORLD)
    }

    pub fn grid(&self, level: Level) -> &TileGrid {
        &self.levels[level.index() as usize]
    }

    /// Path of a weekly speed tile, e.g. `1/064/799.spd`.
    pub fn path_for(&self, level: Level, tile_id: u32) -> String {
        self.grid(level).file_path(level, tile_id, SPEED_TILE_EXT)
    }

    /// Path of the reference speed output for the same tile.
    pub fn reference_path_for(&self, level: Level, tile_id: u32) -> String {
        self.grid(level).file_path(level, tile_id, REFERENCE_TILE_EXT)
    }
}

impl Default for TileHierarchy {
    fn default() -> Self {
        Self::world()
    }
}

fn digit_count(mut number: u32) -> usize {
    let mut digits = 1;
    while number >= 10 {
        number /= 10;
        digits += 1;
    }
    digits
}

/// Groups a digit string into 3-digit chunks counted from the right, joined
/// by `/`.
fn chunk_digits(numeral: &str) -> String {
    let bytes = numeral.as_bytes();
    let head = bytes.len() % 3;
    let mut parts: Vec<&str> = Vec::with_capacity(bytes.len() / 3 + 1);
    if head > 0 {
        parts.push(&numeral[..head]);
    }
    let mut i = head;
    while i < bytes.len() {
        parts.push(&numeral[i..i + 3]);
        i += 3;
    }
    parts.join("/")
}
