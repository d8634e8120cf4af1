// src/transform/mod.rs

pub mod time;

use crate::extract::opt_text;
use anyhow::{Context, Result};
use duckdb::types::Value;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use self::time::TimeParts;
use tracing::warn;

/// Events whose page field carries this sentinel are actual plays; every
/// other page (navigation, auth, ...) is discarded silently.
const PLAY_SENTINEL: &str = "NextSong";

/// One newline-delimited activity-log event. Everything is optional at the
/// parse stage: non-play events legitimately carry nulls, and required
/// fields are only enforced after the play filter.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogEvent {
    page: Option<String>,
    ts: Option<i64>,
    user_id: Option<serde_json::Value>,
    first_name: Option<String>,
    last_name: Option<String>,
    gender: Option<String>,
    level: Option<String>,
    song: Option<String>,
    artist: Option<String>,
    length: Option<f64>,
    session_id: Option<i64>,
    location: Option<String>,
    user_agent: Option<String>,
}

impl LogEvent {
    /// The corpus serializes userId as a quoted numeric string; tolerate a
    /// bare number too.
    fn numeric_user_id(&self) -> Option<i64> {
        match self.user_id.as_ref()? {
            serde_json::Value::String(s) => s.parse().ok(),
            serde_json::Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeRow {
    pub parts: TimeParts,
}

impl TimeRow {
    pub fn to_row(&self) -> Vec<Value> {
        let p = &self.parts;
        vec![
            Value::BigInt(p.start_time),
            Value::BigInt(p.hour as i64),
            Value::BigInt(p.day as i64),
            Value::BigInt(p.week as i64),
            Value::BigInt(p.month as i64),
            Value::BigInt(p.weekday as i64),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub level: String,
}

impl UserRow {
    pub fn to_row(&self) -> Vec<Value> {
        vec![
            Value::BigInt(self.user_id),
            Value::Text(self.first_name.clone()),
            Value::Text(self.last_name.clone()),
            Value::Text(self.gender.clone()),
            Value::Text(self.level.clone()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SongplayRow {
    pub start_time: i64,
    pub user_id: i64,
    pub level: String,
    pub song_id: Option<String>,
    pub artist_id: Option<String>,
    pub session_id: i64,
    pub location: Option<String>,
    pub user_agent: Option<String>,
}

impl SongplayRow {
    pub fn to_row(&self) -> Vec<Value> {
        vec![
            Value::BigInt(self.start_time),
            Value::BigInt(self.user_id),
            Value::Text(self.level.clone()),
            opt_text(&self.song_id),
            opt_text(&self.artist_id),
            Value::BigInt(self.session_id),
            opt_text(&self.location),
            opt_text(&self.user_agent),
        ]
    }
}

/// The three record sets one log file transforms into.
#[derive(Debug, Default)]
pub struct LogRecordSets {
    pub time: Vec<TimeRow>,
    pub users: Vec<UserRow>,
    pub songplays: Vec<SongplayRow>,
}

impl LogRecordSets {
    pub fn row_count(&self) -> usize {
        self.time.len() + self.users.len() + self.songplays.len()
    }
}

/// Resolves a play event against the already-loaded song/artist dimensions.
/// Exact match on (title, artist name, duration); no match is not an error.
pub trait SongResolver {
    fn resolve(&self, title: &str, artist: &str, duration: f64) -> Result<Option<(String, String)>>;
}

/// Parse one NDJSON log file into time/user/songplay record sets.
///
/// Unparsable lines and play events with a broken timestamp or user id are
/// logged and dropped; resolver failures degrade to unresolved references so
/// one bad lookup cannot sink the file.
pub fn transform_log_file(path: &Path, resolver: &dyn SongResolver) -> Result<LogRecordSets> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading log file {}", path.display()))?;

    let mut sets = LogRecordSets::default();
    for (lineno, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let event: LogEvent = match serde_json::from_str(line) {
            Ok(e) => e,
            Err(e) => {
                warn!(file = %path.display(), line = lineno + 1, error = %e, "unparsable log line; skipping");
                continue;
            }
        };
        if event.page.as_deref() != Some(PLAY_SENTINEL) {
            continue;
        }

        let parts = match event.ts.and_then(TimeParts::from_epoch_ms) {
            Some(p) => p,
            None => {
                warn!(file = %path.display(), line = lineno + 1, "play event without usable timestamp; skipping");
                continue;
            }
        };
        let user_id = match event.numeric_user_id() {
            Some(id) => id,
            None => {
                warn!(file = %path.display(), line = lineno + 1, "play event without usable user id; skipping");
                continue;
            }
        };

        sets.time.push(TimeRow { parts });
        sets.users.push(UserRow {
            user_id,
            first_name: event.first_name.clone().unwrap_or_default(),
            last_name: event.last_name.clone().unwrap_or_default(),
            gender: event.gender.clone().unwrap_or_default(),
            level: event.level.clone().unwrap_or_default(),
        });

        let resolved = match (&event.song, &event.artist, event.length) {
            (Some(song), Some(artist), Some(length)) => {
                match resolver.resolve(song, artist, length) {
                    Ok(hit) => hit,
                    Err(e) => {
                        warn!(file = %path.display(), line = lineno + 1, error = %e, "song lookup failed; leaving references null");
                        None
                    }
                }
            }
            _ => None,
        };
        let (song_id, artist_id) = match resolved {
            Some((s, a)) => (Some(s), Some(a)),
            None => (None, None),
        };

        sets.songplays.push(SongplayRow {
            start_time: parts.start_time,
            user_id,
            level: event.level.unwrap_or_default(),
            song_id,
            artist_id,
            session_id: event.session_id.unwrap_or_default(),
            location: event.location,
            user_agent: event.user_agent,
        });
    }
    Ok(sets)
}
