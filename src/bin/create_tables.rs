//! Schema bootstrap: drop and recreate the five target relations for the
//! configured load strategy. Run this before each pipeline run.

use anyhow::{Context, Result};
use duckdb::Connection;
use playloader::{config::Config, schema::Catalog};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let config = Config::from_env()?;
    let catalog = Catalog::new(config.strategy);
    let conn = Connection::open(&config.database)
        .with_context(|| format!("opening database {}", config.database.display()))?;

    for sql in catalog.drop_statements() {
        conn.execute_batch(&sql)
            .with_context(|| format!("running `{sql}`"))?;
    }
    for sql in catalog.create_statements() {
        conn.execute_batch(&sql)
            .with_context(|| format!("running `{sql}`"))?;
    }

    info!(db = %config.database.display(), strategy = ?config.strategy, "schema created");
    Ok(())
}
