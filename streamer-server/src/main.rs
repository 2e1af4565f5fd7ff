//! streamer-server: keeps per-user libraries in sync with thin agents.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use clap::Parser;
use core_library::db::{create_pool, DatabaseConfig};
use core_library::{LibraryRepository, SqliteLibraryRepository};
use core_runtime::config::{ServerConfig, DEFAULT_SERVER_BIND};
use core_runtime::events::{spawn_event_logger, EventBus};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use streamer_server::{app, AppState};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "streamer-server", version, about = "Per-user music library server")]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "STREAMER_BIND", default_value = DEFAULT_SERVER_BIND)]
    bind: String,

    /// SQLite database file, created if missing
    #[arg(long, env = "STREAMER_DB_PATH", default_value = "radiotiker.db")]
    database: PathBuf,

    /// Maximum pooled database connections
    #[arg(long, default_value_t = 5)]
    max_db_connections: u32,

    /// Largest accepted request body in bytes
    #[arg(long, env = "STREAMER_MAX_BODY_BYTES")]
    max_body_bytes: Option<usize>,

    /// Log output format: pretty, json or compact
    #[arg(long, env = "LOG_FORMAT")]
    log_format: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::default().with_verbosity(cli.verbose);
    if let Some(format) = &cli.log_format {
        logging = logging.with_format(LogFormat::from_str(format)?);
    }
    init_logging(logging.with_env_override())?;

    let mut builder = ServerConfig::builder()
        .bind(cli.bind)
        .database_path(cli.database)
        .max_db_connections(cli.max_db_connections);
    if let Some(bytes) = cli.max_body_bytes {
        builder = builder.max_body_bytes(bytes);
    }
    let config = builder.build()?;

    let pool = create_pool(
        DatabaseConfig::new(&config.database_path).max_connections(config.max_db_connections),
    )
    .await
    .with_context(|| format!("opening database {}", config.database_path.display()))?;

    let libraries = SqliteLibraryRepository::new(pool.clone())
        .count_libraries()
        .await
        .context("reading library count")?;

    let events = EventBus::default();
    spawn_event_logger(&events);

    let router = app(
        AppState::from_pool(pool.clone(), Some(events)),
        config.max_body_bytes,
    );
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;

    info!(
        addr = %config.bind_addr,
        database = %config.database_path.display(),
        libraries,
        "Streamer server listening"
    );
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    pool.close().await;
    info!("Streamer server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl+C, running until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining requests");
}
