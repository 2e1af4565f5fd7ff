//! Command line interface
//!
//! Every setting can come from a flag or from the environment variable named
//! next to it, so the agent runs the same under a shell and under a service
//! manager.

use clap::{Args, Parser, Subcommand};
use core_runtime::config::{AgentConfig, DEFAULT_AGENT_PORT, DEFAULT_EXTENSIONS};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "thin-agent", version, about = "Sync a local music folder with a streamer server")]
pub struct Cli {
    #[command(flatten)]
    pub agent: AgentArgs,

    /// Log output format: pretty, json or compact
    #[arg(long, env = "LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run one sync pass and exit
    Sync {
        /// Discard local state and replace the server library with a full scan
        #[arg(long)]
        reset: bool,
    },
    /// Serve files, announce, and re-sync periodically until Ctrl+C
    Serve {
        /// Seconds between sync passes
        #[arg(long, default_value_t = 300)]
        interval_secs: u64,
    },
}

#[derive(Args, Debug, Clone)]
pub struct AgentArgs {
    /// Streamer server base URL
    #[arg(long, env = "SERVER_URL", global = true)]
    pub server_url: Option<String>,

    /// User the library belongs to
    #[arg(long, env = "USER_ID", global = true)]
    pub user_id: Option<String>,

    /// Music folder to scan and serve
    #[arg(long, env = "LIBRARY_PATH", global = true)]
    pub library_path: Option<PathBuf>,

    /// Port of the local file server
    #[arg(long, env = "AGENT_PORT", default_value_t = DEFAULT_AGENT_PORT, global = true)]
    pub agent_port: u16,

    /// Comma separated audio extensions
    #[arg(long, env = "VALID_AUDIO_EXTENSIONS", default_value = DEFAULT_EXTENSIONS, global = true)]
    pub extensions: String,

    /// Base URL announced instead of the detected LAN address
    #[arg(long, env = "PUBLIC_BASE_URL", global = true)]
    pub public_base_url: Option<String>,

    /// Where the agent keeps its fingerprint store
    #[arg(long, env = "AGENT_STATE_PATH", global = true)]
    pub state_path: Option<PathBuf>,

    /// Timeout for one submission request, in seconds
    #[arg(long, default_value_t = 10, global = true)]
    pub submit_timeout_secs: u64,
}

impl AgentArgs {
    /// Validated agent configuration from flags and environment.
    pub fn to_config(&self) -> core_runtime::Result<AgentConfig> {
        let mut builder = AgentConfig::builder()
            .agent_port(self.agent_port)
            .extensions_csv(&self.extensions)
            .public_base_url(self.public_base_url.clone())
            .submit_timeout(Duration::from_secs(self.submit_timeout_secs));

        if let Some(url) = &self.server_url {
            builder = builder.server_url(url.clone());
        }
        if let Some(user_id) = &self.user_id {
            builder = builder.user_id(user_id.clone());
        }
        if let Some(path) = &self.library_path {
            builder = builder.library_root(path.clone());
        }
        if let Some(path) = &self.state_path {
            builder = builder.state_path(path.clone());
        }
        builder.build()
    }
}
