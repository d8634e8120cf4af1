// src/schema/mod.rs
//
// All SQL the pipeline runs lives here, built once at startup from the load
// strategy and handed to the loader, reconciler and driver. Nothing else in
// the crate formats SQL.

use crate::config::LoadStrategy;

/// Storage types used by the five relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    BigInt,
    Double,
    Text,
}

impl ColumnType {
    pub fn sql(self) -> &'static str {
        match self {
            ColumnType::BigInt => "BIGINT",
            ColumnType::Double => "DOUBLE",
            ColumnType::Text => "VARCHAR",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: &'static str,
    pub ctype: ColumnType,
}

/// One target relation: name plus its business columns, in insert order.
/// The songplays surrogate key is not listed here; it only exists in DDL
/// (row-insert strategy) or is retrofitted by reconciliation (bulk-copy).
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub name: &'static str,
    pub columns: Vec<Column>,
}

impl TableSpec {
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    pub fn column_types(&self) -> Vec<ColumnType> {
        self.columns.iter().map(|c| c.ctype).collect()
    }
}

/// Best-effort repair chain for one relation left keyless by bulk-copy:
/// snapshot with a temporary row number, delete duplicate natural keys,
/// rebuild with the primary key in place, swap.
#[derive(Debug, Clone)]
pub struct RepairPlan {
    pub table: &'static str,
    pub setup: Vec<String>,
    pub delete_duplicates: String,
    pub finish: Vec<String>,
}

#[derive(Debug)]
pub struct Catalog {
    strategy: LoadStrategy,
    pub songs: TableSpec,
    pub artists: TableSpec,
    pub time: TableSpec,
    pub users: TableSpec,
    pub songplays: TableSpec,
}

fn col(name: &'static str, ctype: ColumnType) -> Column {
    Column { name, ctype }
}

impl Catalog {
    pub fn new(strategy: LoadStrategy) -> Self {
        use ColumnType::*;
        Catalog {
            strategy,
            songs: TableSpec {
                name: "songs",
                columns: vec![
                    col("song_id", Text),
                    col("title", Text),
                    col("artist_id", Text),
                    col("year", BigInt),
                    col("duration", Double),
                ],
            },
            artists: TableSpec {
                name: "artists",
                columns: vec![
                    col("artist_id", Text),
                    col("name", Text),
                    col("location", Text),
                    col("latitude", Double),
                    col("longitude", Double),
                ],
            },
            time: TableSpec {
                name: "time",
                columns: vec![
                    col("start_time", BigInt),
                    col("hour", BigInt),
                    col("day", BigInt),
                    col("week", BigInt),
                    col("month", BigInt),
                    col("weekday", BigInt),
                ],
            },
            users: TableSpec {
                name: "users",
                columns: vec![
                    col("user_id", BigInt),
                    col("first_name", Text),
                    col("last_name", Text),
                    col("gender", Text),
                    col("level", Text),
                ],
            },
            songplays: TableSpec {
                name: "songplays",
                columns: vec![
                    col("start_time", BigInt),
                    col("user_id", BigInt),
                    col("level", Text),
                    col("song_id", Text),
                    col("artist_id", Text),
                    col("session_id", BigInt),
                    col("location", Text),
                    col("user_agent", Text),
                ],
            },
        }
    }

    pub fn strategy(&self) -> LoadStrategy {
        self.strategy
    }

    fn create_table_sql(spec: &TableSpec, pk: Option<&str>) -> String {
        let cols: Vec<String> = spec
            .columns
            .iter()
            .map(|c| {
                if pk == Some(c.name) {
                    format!("{} {} PRIMARY KEY", c.name, c.ctype.sql())
                } else {
                    format!("{} {}", c.name, c.ctype.sql())
                }
            })
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            spec.name,
            cols.join(", ")
        )
    }

    /// DDL in application order. Songs and artists always carry their keys;
    /// the log-derived relations are keyed up front only under row-insert,
    /// where conflict handling depends on them. Under bulk-copy they start
    /// keyless and are repaired after the load.
    pub fn create_statements(&self) -> Vec<String> {
        let mut stmts = vec![
            Self::create_table_sql(&self.songs, Some("song_id")),
            Self::create_table_sql(&self.artists, Some("artist_id")),
        ];
        match self.strategy {
            LoadStrategy::RowInsert => {
                stmts.push(Self::create_table_sql(&self.time, Some("start_time")));
                stmts.push(Self::create_table_sql(&self.users, Some("user_id")));
                stmts.push("CREATE SEQUENCE IF NOT EXISTS songplay_id_seq".to_string());
                let body: Vec<String> = self
                    .songplays
                    .columns
                    .iter()
                    .map(|c| format!("{} {}", c.name, c.ctype.sql()))
                    .collect();
                // The surrogate key alone would never conflict, so re-runs
                // would multiply the fact rows; the event identity keeps
                // DO NOTHING meaningful.
                stmts.push(format!(
                    "CREATE TABLE IF NOT EXISTS songplays (songplay_id BIGINT PRIMARY KEY DEFAULT nextval('songplay_id_seq'), {}, UNIQUE (start_time, user_id, session_id))",
                    body.join(", ")
                ));
            }
            LoadStrategy::BulkCopy => {
                stmts.push(Self::create_table_sql(&self.time, None));
                stmts.push(Self::create_table_sql(&self.users, None));
                stmts.push(Self::create_table_sql(&self.songplays, None));
            }
        }
        stmts
    }

    pub fn drop_statements(&self) -> Vec<String> {
        let mut stmts: Vec<String> = ["songplays", "users", "songs", "artists", "time"]
            .iter()
            .map(|t| format!("DROP TABLE IF EXISTS {t}"))
            .collect();
        stmts.push("DROP SEQUENCE IF EXISTS songplay_id_seq".to_string());
        stmts
    }

    /// Parameterized insert with idempotent conflict handling.
    pub fn insert_sql(&self, spec: &TableSpec) -> String {
        let names = spec.column_names().join(", ");
        let marks = vec!["?"; spec.columns.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT DO NOTHING",
            spec.name, names, marks
        )
    }

    /// Exact-match lookup of a loaded (song, artist) pair. Multiple exact
    /// matches are broken deterministically by lowest song_id.
    pub fn song_lookup_sql(&self) -> &'static str {
        "SELECT s.song_id, a.artist_id \
         FROM songs s \
         LEFT JOIN artists a ON s.artist_id = a.artist_id \
         WHERE s.title = ? AND a.name = ? AND s.duration = ? \
         ORDER BY s.song_id \
         LIMIT 1"
    }

    /// Years below 1000 are data-entry errors; they are nulled after the
    /// load rather than filtered before it.
    pub fn nullify_song_year_sql(&self) -> &'static str {
        "UPDATE songs SET year = NULL WHERE year < 1000"
    }

    /// Repair chains for the relations bulk-copy leaves keyless. DuckDB has
    /// no ALTER TABLE ADD PRIMARY KEY, so the constraint is retrofitted by
    /// rebuilding each relation around its natural key. The `min(row_id)`
    /// survivor rule keeps the first-loaded row per key.
    pub fn repair_plans(&self) -> Vec<RepairPlan> {
        vec![
            self.dimension_repair(&self.time, "start_time"),
            self.dimension_repair(&self.users, "user_id"),
            self.songplay_repair(),
        ]
    }

    fn dimension_repair(&self, spec: &TableSpec, key: &'static str) -> RepairPlan {
        let table = spec.name;
        let cols = spec.column_names().join(", ");
        let keyed_cols: Vec<String> = spec
            .columns
            .iter()
            .map(|c| {
                if c.name == key {
                    format!("{} {} PRIMARY KEY", c.name, c.ctype.sql())
                } else {
                    format!("{} {}", c.name, c.ctype.sql())
                }
            })
            .collect();
        RepairPlan {
            table,
            setup: vec![format!(
                "CREATE TABLE {table}_numbered AS \
                 SELECT t.*, row_number() OVER () AS row_id FROM {table} t"
            )],
            delete_duplicates: format!(
                "DELETE FROM {table}_numbered WHERE row_id NOT IN \
                 (SELECT min(row_id) FROM {table}_numbered GROUP BY {key})"
            ),
            finish: vec![
                format!("CREATE TABLE {table}_keyed ({})", keyed_cols.join(", ")),
                format!(
                    "INSERT INTO {table}_keyed SELECT {cols} FROM {table}_numbered ORDER BY row_id"
                ),
                format!("DROP TABLE {table}"),
                format!("ALTER TABLE {table}_keyed RENAME TO {table}"),
                format!("DROP TABLE {table}_numbered"),
            ],
        }
    }

    /// The fact relation keeps a surrogate key instead: survivors are
    /// renumbered from 1 in load order, which also serves as the sequence
    /// reset. Duplicates are full business-tuple repeats.
    fn songplay_repair(&self) -> RepairPlan {
        let spec = &self.songplays;
        let cols = spec.column_names().join(", ");
        let body: Vec<String> = spec
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.ctype.sql()))
            .collect();
        RepairPlan {
            table: spec.name,
            setup: vec![
                "CREATE TABLE songplays_numbered AS \
                 SELECT p.*, row_number() OVER () AS row_id FROM songplays p"
                    .to_string(),
            ],
            delete_duplicates: format!(
                "DELETE FROM songplays_numbered WHERE row_id NOT IN \
                 (SELECT min(row_id) FROM songplays_numbered GROUP BY {cols})"
            ),
            finish: vec![
                format!(
                    "CREATE TABLE songplays_keyed (songplay_id BIGINT PRIMARY KEY, {})",
                    body.join(", ")
                ),
                format!(
                    "INSERT INTO songplays_keyed \
                     SELECT row_number() OVER (ORDER BY row_id), {cols} FROM songplays_numbered"
                ),
                "DROP TABLE songplays".to_string(),
                "ALTER TABLE songplays_keyed RENAME TO songplays".to_string(),
                "DROP TABLE songplays_numbered".to_string(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_insert_ddl_keys_every_relation() {
        let catalog = Catalog::new(LoadStrategy::RowInsert);
        let ddl = catalog.create_statements().join(";\n");
        assert!(ddl.contains("song_id VARCHAR PRIMARY KEY"));
        assert!(ddl.contains("artist_id VARCHAR PRIMARY KEY"));
        assert!(ddl.contains("start_time BIGINT PRIMARY KEY"));
        assert!(ddl.contains("user_id BIGINT PRIMARY KEY"));
        assert!(ddl.contains("songplay_id BIGINT PRIMARY KEY DEFAULT nextval('songplay_id_seq')"));
        assert!(ddl.contains("UNIQUE (start_time, user_id, session_id)"));
    }

    #[test]
    fn bulk_copy_ddl_leaves_log_relations_keyless() {
        let catalog = Catalog::new(LoadStrategy::BulkCopy);
        let ddl = catalog.create_statements();
        // Dimension files are always row-inserted, so songs/artists keep keys.
        assert!(ddl[0].contains("song_id VARCHAR PRIMARY KEY"));
        assert!(ddl[1].contains("artist_id VARCHAR PRIMARY KEY"));
        for stmt in &ddl[2..] {
            assert!(!stmt.contains("PRIMARY KEY"), "unexpected key in: {stmt}");
            assert!(!stmt.contains("songplay_id"), "surrogate in: {stmt}");
        }
    }

    #[test]
    fn insert_sql_is_idempotent_shape() {
        let catalog = Catalog::new(LoadStrategy::RowInsert);
        let sql = catalog.insert_sql(&catalog.users);
        assert_eq!(
            sql,
            "INSERT INTO users (user_id, first_name, last_name, gender, level) \
             VALUES (?, ?, ?, ?, ?) ON CONFLICT DO NOTHING"
        );
    }

    #[test]
    fn repair_plans_cover_the_three_bulk_relations() {
        let catalog = Catalog::new(LoadStrategy::BulkCopy);
        let plans = catalog.repair_plans();
        let tables: Vec<_> = plans.iter().map(|p| p.table).collect();
        assert_eq!(tables, vec!["time", "users", "songplays"]);
        for plan in &plans {
            assert!(plan.delete_duplicates.contains("min(row_id)"));
            assert!(plan.finish.iter().any(|s| s.contains("PRIMARY KEY")));
            assert!(plan
                .finish
                .iter()
                .any(|s| s.contains(&format!("RENAME TO {}", plan.table))));
        }
    }
}
