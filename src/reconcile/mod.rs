// src/reconcile/mod.rs
//
// Post-load cleanup: null out bad song years, and for bulk-copy runs repair
// the keyless relations (deduplicate, retrofit primary keys). Relations are
// repaired independently: a statement failure aborts that relation's chain
// before anything destructive runs, is logged, and the pass moves on to the
// next relation.

use crate::schema::{Catalog, RepairPlan};
use anyhow::{Context, Result};
use duckdb::Connection;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairReport {
    pub table: &'static str,
    pub duplicates_removed: usize,
}

/// Set `year = NULL` for songs with a pre-1000 year and return how many
/// rows were touched.
pub fn nullify_song_years(conn: &Connection, catalog: &Catalog) -> Result<usize> {
    let affected = conn
        .execute(catalog.nullify_song_year_sql(), [])
        .context("nullifying song years")?;
    info!(affected, "song years below 1000 set to NULL");
    Ok(affected)
}

/// Run every repair plan the catalog defines, in order.
pub fn repair_keys(conn: &Connection, catalog: &Catalog) -> Vec<RepairReport> {
    catalog
        .repair_plans()
        .iter()
        .map(|plan| run_plan(conn, plan))
        .collect()
}

// The chain stops at the first failed statement. `finish` only reaches its
// DROP/RENAME swap after the keyed copy has been created and populated, so
// an aborted repair leaves the loaded relation (and possibly some
// `_numbered`/`_keyed` scratch tables) behind, never an emptied one.
fn run_plan(conn: &Connection, plan: &RepairPlan) -> RepairReport {
    let mut report = RepairReport {
        table: plan.table,
        duplicates_removed: 0,
    };

    for sql in &plan.setup {
        if let Err(e) = conn.execute_batch(sql) {
            error!(table = plan.table, error = %e, "repair setup failed; leaving relation untouched");
            return report;
        }
    }

    match conn.execute(&plan.delete_duplicates, []) {
        Ok(n) => {
            info!(table = plan.table, removed = n, "duplicates removed");
            report.duplicates_removed = n;
        }
        Err(e) => {
            error!(table = plan.table, error = %e, "duplicate removal failed; aborting repair for this relation");
            return report;
        }
    }

    for sql in &plan.finish {
        if let Err(e) = conn.execute_batch(sql) {
            error!(table = plan.table, error = %e, "repair statement failed; aborting repair for this relation");
            return report;
        }
    }
    info!(table = plan.table, "primary key in place");
    report
}
