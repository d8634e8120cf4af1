// src/load/mod.rs

pub mod buffer;

use crate::config::LoadStrategy;
use crate::schema::{Catalog, TableSpec};
use anyhow::{Context, Result};
use duckdb::{appender_params_from_iter, params_from_iter, types::Value, Connection};
use tracing::error;

/// Writes record sets into the store. Neither path commits; the driver owns
/// commit boundaries.
pub struct Loader<'a> {
    catalog: &'a Catalog,
}

impl<'a> Loader<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Loader { catalog }
    }

    /// Strategy dispatch for the log-derived relations.
    pub fn load(&self, conn: &Connection, spec: &TableSpec, rows: &[Vec<Value>]) -> Result<usize> {
        match self.catalog.strategy() {
            LoadStrategy::RowInsert => self.insert_rows(conn, spec, rows),
            LoadStrategy::BulkCopy => self.copy_rows(conn, spec, rows),
        }
    }

    /// Row-by-row parameterized insert with `ON CONFLICT DO NOTHING`. A
    /// failed statement is logged and the remaining rows still load.
    pub fn insert_rows(
        &self,
        conn: &Connection,
        spec: &TableSpec,
        rows: &[Vec<Value>],
    ) -> Result<usize> {
        let sql = self.catalog.insert_sql(spec);
        let mut stmt = conn
            .prepare(&sql)
            .with_context(|| format!("preparing insert for {}", spec.name))?;
        let mut executed = 0;
        for row in rows {
            match stmt.execute(params_from_iter(row.iter())) {
                Ok(_) => executed += 1,
                Err(e) => error!(table = spec.name, error = %e, "insert failed; continuing"),
            }
        }
        Ok(executed)
    }

    /// Bulk path: serialize the whole record set to a delimited in-memory
    /// buffer, then stream the buffer into the relation via an appender.
    /// No conflict handling here; duplicates land in the table and are
    /// repaired by reconciliation.
    pub fn copy_rows(
        &self,
        conn: &Connection,
        spec: &TableSpec,
        rows: &[Vec<Value>],
    ) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let buf = buffer::write_delimited(rows)
            .with_context(|| format!("encoding bulk buffer for {}", spec.name))?;
        let parsed = buffer::read_delimited(&buf, &spec.column_types())
            .with_context(|| format!("decoding bulk buffer for {}", spec.name))?;

        let mut appender = conn
            .appender(spec.name)
            .with_context(|| format!("opening appender for {}", spec.name))?;
        for row in &parsed {
            appender
                .append_row(appender_params_from_iter(row.iter()))
                .with_context(|| format!("appending into {}", spec.name))?;
        }
        appender
            .flush()
            .with_context(|| format!("flushing appender for {}", spec.name))?;
        Ok(parsed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoadStrategy;

    fn open(strategy: LoadStrategy) -> (Connection, Catalog) {
        let conn = Connection::open_in_memory().unwrap();
        let catalog = Catalog::new(strategy);
        for sql in catalog.create_statements() {
            conn.execute_batch(&sql).unwrap();
        }
        (conn, catalog)
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT count(*) FROM {table}"), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn insert_rows_is_idempotent_on_conflicts() {
        let (conn, catalog) = open(LoadStrategy::RowInsert);
        let loader = Loader::new(&catalog);
        let rows = vec![vec![
            Value::BigInt(26),
            Value::Text("Ryan".into()),
            Value::Text("Smith".into()),
            Value::Text("M".into()),
            Value::Text("free".into()),
        ]];
        loader.insert_rows(&conn, &catalog.users, &rows).unwrap();
        loader.insert_rows(&conn, &catalog.users, &rows).unwrap();
        assert_eq!(count(&conn, "users"), 1);
    }

    #[test]
    fn first_seen_user_level_wins_under_row_insert() {
        let (conn, catalog) = open(LoadStrategy::RowInsert);
        let loader = Loader::new(&catalog);
        let first = vec![vec![
            Value::BigInt(26),
            Value::Text("Ryan".into()),
            Value::Text("Smith".into()),
            Value::Text("M".into()),
            Value::Text("free".into()),
        ]];
        let second = vec![vec![
            Value::BigInt(26),
            Value::Text("Ryan".into()),
            Value::Text("Smith".into()),
            Value::Text("M".into()),
            Value::Text("paid".into()),
        ]];
        loader.insert_rows(&conn, &catalog.users, &first).unwrap();
        loader.insert_rows(&conn, &catalog.users, &second).unwrap();
        let level: String = conn
            .query_row("SELECT level FROM users WHERE user_id = 26", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(level, "free");
    }

    #[test]
    fn copy_rows_streams_the_buffer_without_dedup() {
        let (conn, catalog) = open(LoadStrategy::BulkCopy);
        let loader = Loader::new(&catalog);
        let row = vec![
            Value::BigInt(1_541_121_934_796),
            Value::BigInt(1),
            Value::BigInt(2),
            Value::BigInt(44),
            Value::BigInt(11),
            Value::BigInt(4),
        ];
        let rows = vec![row.clone(), row];
        loader.copy_rows(&conn, &catalog.time, &rows).unwrap();
        assert_eq!(count(&conn, "time"), 2);
    }

    #[test]
    fn copy_rows_roundtrips_awkward_free_text() {
        let (conn, catalog) = open(LoadStrategy::BulkCopy);
        let loader = Loader::new(&catalog);
        let location = "San Francisco-Oakland-Hayward, CA | it's home";
        let rows = vec![vec![
            Value::BigInt(1_541_121_934_796),
            Value::BigInt(26),
            Value::Text("free".into()),
            Value::Null,
            Value::Null,
            Value::BigInt(583),
            Value::Text(location.into()),
            Value::Null,
        ]];
        loader.copy_rows(&conn, &catalog.songplays, &rows).unwrap();
        let got: String = conn
            .query_row("SELECT location FROM songplays", [], |r| r.get(0))
            .unwrap();
        assert_eq!(got, location);
        let song_id: Option<String> = conn
            .query_row("SELECT song_id FROM songplays", [], |r| r.get(0))
            .unwrap();
        assert_eq!(song_id, None);
    }
}
