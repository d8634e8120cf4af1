// src/pipeline/mod.rs
//
// The driver. Phase 1 loads song/artist dimensions, then years are
// reconciled, then phase 2 loads the log-derived relations (which resolve
// song/artist references against phase-1 data). Bulk-copy runs finish with
// the key repair pass. One transaction per file.

use crate::config::LoadStrategy;
use crate::discover;
use crate::extract;
use crate::load::Loader;
use crate::reconcile::{self, RepairReport};
use crate::schema::Catalog;
use crate::transform::{self, SongResolver};
use anyhow::{Context, Result};
use duckdb::{params, Connection};
use std::path::Path;
use tracing::{error, info, warn};

/// What became of one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// All record sets loaded and committed; `rows` counts rows handed to
    /// the loader, not rows surviving conflict policy.
    Loaded { rows: usize },
    /// Extraction could not produce records (missing fields, empty file).
    Skipped,
    /// Something downstream of extraction failed.
    Failed(String),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PhaseSummary {
    pub files: usize,
    pub loaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl PhaseSummary {
    fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Loaded { .. } => self.loaded += 1,
            FileOutcome::Skipped => self.skipped += 1,
            FileOutcome::Failed(_) => self.failed += 1,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub songs: PhaseSummary,
    pub logs: PhaseSummary,
    pub years_nullified: usize,
    pub repairs: Vec<RepairReport>,
}

impl RunSummary {
    pub fn log_report(&self) {
        info!(
            files = self.songs.files,
            loaded = self.songs.loaded,
            skipped = self.songs.skipped,
            failed = self.songs.failed,
            "song phase"
        );
        info!(
            files = self.logs.files,
            loaded = self.logs.loaded,
            skipped = self.logs.skipped,
            failed = self.logs.failed,
            "log phase"
        );
        info!(years_nullified = self.years_nullified, "year reconciliation");
        for repair in &self.repairs {
            info!(
                table = repair.table,
                duplicates_removed = repair.duplicates_removed,
                "key repair"
            );
        }
    }

    /// True when every discovered file either loaded or was deliberately
    /// skipped.
    pub fn clean(&self) -> bool {
        self.songs.failed == 0 && self.logs.failed == 0
    }
}

/// Looks up (song_id, artist_id) pairs in the store, lowest song_id first.
struct SqlSongResolver<'a> {
    conn: &'a Connection,
    sql: &'static str,
}

impl SongResolver for SqlSongResolver<'_> {
    fn resolve(&self, title: &str, artist: &str, duration: f64) -> Result<Option<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare_cached(self.sql)
            .context("preparing song lookup")?;
        let mut rows = stmt
            .query(params![title, artist, duration])
            .context("running song lookup")?;
        match rows.next().context("reading song lookup result")? {
            Some(row) => {
                let song_id: String = row.get(0).context("song lookup column 0")?;
                let artist_id: String = row.get(1).context("song lookup column 1")?;
                Ok(Some((song_id, artist_id)))
            }
            None => Ok(None),
        }
    }
}

/// Run the whole pipeline against an open connection. Tables must already
/// exist (see the create_tables binary).
pub fn run(
    conn: &mut Connection,
    song_dir: &Path,
    log_dir: &Path,
    catalog: &Catalog,
) -> Result<RunSummary> {
    let loader = Loader::new(catalog);
    let mut summary = RunSummary::default();

    summary.songs = process_files(conn, song_dir, "song", |conn, path| {
        load_song_file(conn, path, catalog, &loader)
    })?;

    summary.years_nullified = match reconcile::nullify_song_years(conn, catalog) {
        Ok(n) => n,
        Err(e) => {
            error!(error = %e, "year reconciliation failed; continuing");
            0
        }
    };

    summary.logs = process_files(conn, log_dir, "log", |conn, path| {
        load_log_file(conn, path, catalog, &loader)
    })?;

    if catalog.strategy() == LoadStrategy::BulkCopy {
        summary.repairs = reconcile::repair_keys(conn, catalog);
    }

    Ok(summary)
}

/// Discover files under `root` and feed each to `load_file` inside its own
/// transaction, committed per file.
fn process_files<F>(
    conn: &mut Connection,
    root: &Path,
    kind: &str,
    load_file: F,
) -> Result<PhaseSummary>
where
    F: Fn(&Connection, &Path) -> FileOutcome,
{
    let files = discover::json_files(root)
        .with_context(|| format!("discovering {kind} files under {}", root.display()))?;
    info!(count = files.len(), root = %root.display(), "{kind} files found");

    let mut summary = PhaseSummary {
        files: files.len(),
        ..Default::default()
    };

    for (i, path) in files.iter().enumerate() {
        let tx = match conn.transaction() {
            Ok(tx) => tx,
            Err(e) => {
                error!(file = %path.display(), error = %e, "cannot open transaction");
                summary.record(&FileOutcome::Failed(e.to_string()));
                continue;
            }
        };

        let mut outcome = load_file(&tx, path);
        if matches!(outcome, FileOutcome::Loaded { .. }) {
            if let Err(e) = tx.commit() {
                error!(file = %path.display(), error = %e, "commit failed");
                outcome = FileOutcome::Failed(e.to_string());
            }
        }

        match &outcome {
            FileOutcome::Loaded { rows } => {
                info!(file = %path.display(), rows = *rows, "{}/{} files processed", i + 1, files.len())
            }
            FileOutcome::Skipped => warn!(file = %path.display(), "file skipped"),
            FileOutcome::Failed(reason) => {
                error!(file = %path.display(), reason = %reason, "file failed")
            }
        }
        summary.record(&outcome);
    }
    Ok(summary)
}

fn load_song_file(
    conn: &Connection,
    path: &Path,
    catalog: &Catalog,
    loader: &Loader,
) -> FileOutcome {
    let (song, artist) = match extract::extract_song_file(path) {
        Ok(Some(pair)) => pair,
        Ok(None) => return FileOutcome::Skipped,
        Err(e) => return FileOutcome::Failed(format!("{e:#}")),
    };

    // Dimension files are row-inserted under either strategy; their keys
    // carry the dedup burden.
    let mut rows = 0;
    for (spec, row) in [
        (&catalog.songs, song.to_row()),
        (&catalog.artists, artist.to_row()),
    ] {
        match loader.insert_rows(conn, spec, &[row]) {
            Ok(n) => rows += n,
            Err(e) => return FileOutcome::Failed(format!("{e:#}")),
        }
    }
    FileOutcome::Loaded { rows }
}

fn load_log_file(
    conn: &Connection,
    path: &Path,
    catalog: &Catalog,
    loader: &Loader,
) -> FileOutcome {
    let resolver = SqlSongResolver {
        conn,
        sql: catalog.song_lookup_sql(),
    };
    let sets = match transform::transform_log_file(path, &resolver) {
        Ok(sets) => sets,
        Err(e) => return FileOutcome::Failed(format!("{e:#}")),
    };

    let time_rows: Vec<_> = sets.time.iter().map(|r| r.to_row()).collect();
    let user_rows: Vec<_> = sets.users.iter().map(|r| r.to_row()).collect();
    let play_rows: Vec<_> = sets.songplays.iter().map(|r| r.to_row()).collect();

    let mut rows = 0;
    for (spec, batch) in [
        (&catalog.time, time_rows),
        (&catalog.users, user_rows),
        (&catalog.songplays, play_rows),
    ] {
        match loader.load(conn, spec, &batch) {
            Ok(n) => rows += n,
            Err(e) => return FileOutcome::Failed(format!("{e:#}")),
        }
    }
    FileOutcome::Loaded { rows }
}
