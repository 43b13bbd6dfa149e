//! Job description and environment-driven settings.

use anyhow::{Context, Result, bail};

use crate::tiles::{Level, TileHierarchy};

/// Weeks scanned per year when no override is configured.
pub const DEFAULT_WEEKS_PER_YEAR: u32 = 52;

pub const DEFAULT_LOG_FILE_PATH: &str = "logs/ref_speed_tiles.log";

/// One (level, tile-id) reference speed job over one year of weekly data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileJob {
    pub year: i32,
    pub level: Level,
    pub tile_id: u32,
}

impl TileJob {
    pub fn new(year: i32, level: Level, tile_id: u32) -> Self {
        Self {
            year,
            level,
            tile_id,
        }
    }

    /// Checks the tile id against the level's grid. Addressing itself does
    /// not bounds check, so callers building jobs from user input should.
    pub fn validate(&self, hierarchy: &TileHierarchy) -> Result<()> {
        let max = hierarchy.grid(self.level).max_tile_id();
        if self.tile_id > max {
            bail!(
                "tile id {} is out of range for the {} level (max {})",
                self.tile_id,
                self.level,
                max
            );
        }
        Ok(())
    }
}

/// Process-wide settings read from the environment (after `.env` is loaded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub log_file_path: String,
    pub weeks_per_year: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_file_path: DEFAULT_LOG_FILE_PATH.to_string(),
            weeks_per_year: DEFAULT_WEEKS_PER_YEAR,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Settings::default();

        if let Some(path) = lookup("LOG_FILE_PATH") {
            settings.log_file_path = path;
        }

        if let Some(weeks) = lookup("REF_SPEEDS_WEEKS") {
            settings.weeks_per_year = weeks
                .parse()
                .with_context(|| format!("REF_SPEEDS_WEEKS is not a number: '{weeks}'"))?;
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_validate_tile_range() {
        let h = TileHierarchy::world();
        assert!(TileJob::new(2017, Level::Highway, 4049).validate(&h).is_ok());
        assert!(TileJob::new(2017, Level::Highway, 4050).validate(&h).is_err());
        assert!(TileJob::new(2017, Level::Local, 1_036_799).validate(&h).is_ok());
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::from_lookup(|_| None).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.weeks_per_year, 52);
    }

    #[test]
    fn test_settings_overrides() {
        let vars: HashMap<&str, &str> =
            [("LOG_FILE_PATH", "/tmp/x.log"), ("REF_SPEEDS_WEEKS", "53")].into();
        let settings = Settings::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(settings.log_file_path, "/tmp/x.log");
        assert_eq!(settings.weeks_per_year, 53);
    }

    #[test]
    fn test_settings_bad_weeks() {
        let result = Settings::from_lookup(|k| (k == "REF_SPEEDS_WEEKS").then(|| "many".to_string()));
        assert!(result.is_err());
    }
}
