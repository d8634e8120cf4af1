// src/config/mod.rs

use anyhow::{bail, Result};
use std::env;
use std::path::PathBuf;

/// How log-derived record sets (time, users, songplays) reach the store.
/// Songs and artists are always row-inserted regardless of strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStrategy {
    /// Parameterized insert per row with `ON CONFLICT DO NOTHING`.
    RowInsert,
    /// Delimited in-memory buffer streamed through an appender; duplicates
    /// are repaired post-load.
    BulkCopy,
}

impl LoadStrategy {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "insert" => Ok(LoadStrategy::RowInsert),
            "copy" => Ok(LoadStrategy::BulkCopy),
            other => bail!("unknown load strategy `{other}` (expected `insert` or `copy`)"),
        }
    }
}

/// Runtime configuration, read once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the DuckDB database file.
    pub database: PathBuf,
    /// Root of the song-metadata tree.
    pub song_dir: PathBuf,
    /// Root of the activity-log tree.
    pub log_dir: PathBuf,
    pub strategy: LoadStrategy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database = env::var("PLAYLOADER_DB").unwrap_or_else(|_| "playloader.duckdb".into());
        let song_dir = env::var("SONG_DATA_DIR").unwrap_or_else(|_| "data/song_data".into());
        let log_dir = env::var("LOG_DATA_DIR").unwrap_or_else(|_| "data/log_data".into());
        let strategy = match env::var("LOAD_STRATEGY") {
            Ok(raw) => LoadStrategy::parse(&raw)?,
            Err(_) => LoadStrategy::RowInsert,
        };
        Ok(Config {
            database: PathBuf::from(database),
            song_dir: PathBuf::from(song_dir),
            log_dir: PathBuf::from(log_dir),
            strategy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_strategies() {
        assert_eq!(LoadStrategy::parse("insert").unwrap(), LoadStrategy::RowInsert);
        assert_eq!(LoadStrategy::parse("copy").unwrap(), LoadStrategy::BulkCopy);
        assert_eq!(LoadStrategy::parse(" COPY ").unwrap(), LoadStrategy::BulkCopy);
    }

    #[test]
    fn rejects_unknown_strategy() {
        assert!(LoadStrategy::parse("upsert").is_err());
    }
}
