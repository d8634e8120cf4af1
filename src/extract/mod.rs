// src/extract/mod.rs

use anyhow::{Context, Result};
use duckdb::types::Value;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Raw song-metadata document. Location and coordinates are genuinely
/// nullable in the corpus; everything else must be present or the file is
/// skipped outright.
#[derive(Debug, Deserialize)]
struct SongDocument {
    song_id: String,
    title: String,
    artist_id: String,
    year: i64,
    duration: f64,
    artist_name: String,
    artist_location: Option<String>,
    artist_latitude: Option<f64>,
    artist_longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SongRow {
    pub song_id: String,
    pub title: String,
    pub artist_id: String,
    pub year: i64,
    pub duration: f64,
}

impl SongRow {
    pub fn to_row(&self) -> Vec<Value> {
        vec![
            Value::Text(self.song_id.clone()),
            Value::Text(self.title.clone()),
            Value::Text(self.artist_id.clone()),
            Value::BigInt(self.year),
            Value::Double(self.duration),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtistRow {
    pub artist_id: String,
    pub name: String,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl ArtistRow {
    pub fn to_row(&self) -> Vec<Value> {
        vec![
            Value::Text(self.artist_id.clone()),
            Value::Text(self.name.clone()),
            opt_text(&self.location),
            opt_double(self.latitude),
            opt_double(self.longitude),
        ]
    }
}

pub(crate) fn opt_text(v: &Option<String>) -> Value {
    match v {
        Some(s) => Value::Text(s.clone()),
        None => Value::Null,
    }
}

pub(crate) fn opt_double(v: Option<f64>) -> Value {
    match v {
        Some(f) => Value::Double(f),
        None => Value::Null,
    }
}

/// Parse one song file into a (song, artist) row pair.
///
/// A file with any required field missing or malformed is skipped with a
/// warning and emits rows for neither relation; partial success is not
/// attempted. `Err` is reserved for I/O failures.
pub fn extract_song_file(path: &Path) -> Result<Option<(SongRow, ArtistRow)>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading song file {}", path.display()))?;

    // One JSON object per file, line-delimited in the upstream corpus.
    let line = match raw.lines().find(|l| !l.trim().is_empty()) {
        Some(l) => l,
        None => {
            warn!(file = %path.display(), "song file is empty; skipping");
            return Ok(None);
        }
    };

    let doc: SongDocument = match serde_json::from_str(line) {
        Ok(d) => d,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "song file missing or malformed fields; skipping");
            return Ok(None);
        }
    };

    let song = SongRow {
        song_id: doc.song_id,
        title: doc.title,
        artist_id: doc.artist_id.clone(),
        year: doc.year,
        duration: doc.duration,
    };
    let artist = ArtistRow {
        artist_id: doc.artist_id,
        name: doc.artist_name,
        location: doc.artist_location,
        latitude: doc.artist_latitude,
        longitude: doc.artist_longitude,
    };
    Ok(Some((song, artist)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn song_file(json: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "{json}").unwrap();
        f
    }

    #[test]
    fn extracts_song_and_artist_rows() -> Result<()> {
        let f = song_file(
            r#"{"num_songs": 1, "artist_id": "ARJIE2Y1187B994AB7", "artist_latitude": null,
                "artist_longitude": null, "artist_location": "", "artist_name": "Line Renaud",
                "song_id": "SOUPIRU12A6D4FA1E1", "title": "Der Kleine Dompfaff",
                "duration": 152.92036, "year": 0}"#
                .replace('\n', " ")
                .as_str(),
        );
        let (song, artist) = extract_song_file(f.path())?.expect("should parse");
        assert_eq!(song.song_id, "SOUPIRU12A6D4FA1E1");
        assert_eq!(song.artist_id, "ARJIE2Y1187B994AB7");
        assert_eq!(song.year, 0);
        assert_eq!(song.duration, 152.92036);
        assert_eq!(artist.name, "Line Renaud");
        assert_eq!(artist.latitude, None);
        assert_eq!(artist.location.as_deref(), Some(""));
        Ok(())
    }

    #[test]
    fn missing_required_field_skips_whole_file() -> Result<()> {
        // No title: neither a song nor an artist row may come out.
        let f = song_file(
            r#"{"artist_id": "AR1", "artist_name": "X", "artist_location": null,
                "artist_latitude": null, "artist_longitude": null,
                "song_id": "SO1", "duration": 1.0, "year": 1999}"#
                .replace('\n', " ")
                .as_str(),
        );
        assert!(extract_song_file(f.path())?.is_none());
        Ok(())
    }

    #[test]
    fn empty_file_is_skipped() -> Result<()> {
        let f = NamedTempFile::new().unwrap();
        assert!(extract_song_file(f.path())?.is_none());
        Ok(())
    }

    #[test]
    fn rows_carry_nulls_for_missing_coordinates() -> Result<()> {
        let f = song_file(
            r#"{"artist_id": "AR1", "artist_name": "X", "artist_location": null,
                "artist_latitude": null, "artist_longitude": null, "title": "T",
                "song_id": "SO1", "duration": 1.5, "year": 2001}"#
                .replace('\n', " ")
                .as_str(),
        );
        let (_, artist) = extract_song_file(f.path())?.unwrap();
        let row = artist.to_row();
        assert_eq!(row[2], Value::Null);
        assert_eq!(row[3], Value::Null);
        assert_eq!(row[4], Value::Null);
        Ok(())
    }
}
