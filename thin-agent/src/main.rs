//! thin-agent: sync a music folder with the streamer server and serve it.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use core_runtime::events::spawn_event_logger;
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_sync::SyncMode;
use thin_agent::cli::{Cli, Command};
use thin_agent::Agent;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::default().with_verbosity(cli.verbose);
    if let Some(format) = &cli.log_format {
        logging = logging.with_format(LogFormat::from_str(format)?);
    }
    init_logging(logging.with_env_override())?;

    let config = cli.agent.to_config().context("invalid agent configuration")?;
    info!(
        user_id = %config.user_id,
        server = %config.server_url,
        state = %config.state_path.display(),
        "Agent configured"
    );

    let agent = Agent::new(config)?;
    spawn_event_logger(agent.events());

    match cli.command {
        Command::Sync { reset } => {
            let mode = if reset { SyncMode::Reset } else { SyncMode::Auto };
            let report = agent.sync(mode).await?;
            println!("{}", report.summary());
        }
        Command::Serve { interval_secs } => {
            let interval = Duration::from_secs(interval_secs.max(1));
            agent.serve(interval, shutdown_signal()).await?;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl+C, running until killed");
        std::future::pending::<()>().await;
    }
}
