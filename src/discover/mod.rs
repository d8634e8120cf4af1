// src/discover/mod.rs

use anyhow::{Context, Result};
use glob::glob;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Recursively collect every `*.json` file under `root` as absolute paths.
///
/// Results are sorted lexicographically so that re-running against an
/// unchanged tree processes the same files in the same order. A missing or
/// empty directory yields an empty vec, not an error.
pub fn json_files(root: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/**/*.json", root.display());
    let mut files = Vec::new();

    for entry in glob(&pattern).context("invalid glob pattern for json discovery")? {
        let path = match entry {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "cannot read glob entry; skipping");
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        match path.canonicalize() {
            Ok(abs) => files.push(abs),
            Err(e) => {
                // File vanished between the walk and the stat.
                warn!(path = %path.display(), error = %e, "cannot resolve path; skipping");
            }
        }
    }

    files.sort();
    Ok(files)
}
