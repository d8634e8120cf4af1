use anyhow::{Context, Result};
use duckdb::Connection;
use playloader::{config::Config, pipeline, schema::Catalog};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // ─── init logging ────────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();
    info!("startup");

    // ─── configure run ───────────────────────────────────────────────
    let config = Config::from_env()?;
    let catalog = Catalog::new(config.strategy);
    info!(
        db = %config.database.display(),
        songs = %config.song_dir.display(),
        logs = %config.log_dir.display(),
        strategy = ?config.strategy,
        "configured"
    );

    let mut conn = Connection::open(&config.database)
        .with_context(|| format!("opening database {}", config.database.display()))?;

    // ─── load and reconcile ──────────────────────────────────────────
    let summary = pipeline::run(&mut conn, &config.song_dir, &config.log_dir, &catalog)?;
    summary.log_report();
    if !summary.clean() {
        warn!("run finished with file failures; see log above");
    }
    info!("all done");
    Ok(())
}
