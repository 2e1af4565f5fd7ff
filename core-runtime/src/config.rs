//! # Configuration
//!
//! Validated settings for the two processes in the system: the thin agent
//! that scans a music folder, and the streamer server that keeps per-user
//! libraries.
//!
//! ## Overview
//!
//! Both configurations are assembled through builders that fail fast: every
//! required value is checked in `build()`, and the error message names the
//! setting (and the environment variable the binaries read it from) so an
//! operator can fix it without reading code.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::AgentConfig;
//!
//! let config = AgentConfig::builder()
//!     .server_url("http://streamer.local:8080")
//!     .user_id("alice")
//!     .library_root("/home/alice/Music")
//!     .extensions_csv(".mp3,.flac")
//!     .build()?;
//!
//! assert_eq!(config.submit_url(), "http://streamer.local:8080/api/submit-scan");
//! # Ok::<(), core_runtime::Error>(())
//! ```

use crate::error::{Error, Result};
use bridge_traits::http::RetryPolicy;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Extensions scanned when none are configured.
pub const DEFAULT_EXTENSIONS: &str = ".mp3,.flac,.wav,.m4a";

/// Port the agent's local file server binds to.
pub const DEFAULT_AGENT_PORT: u16 = 8765;

/// Upper bound for one submission round trip.
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default server bind address.
pub const DEFAULT_SERVER_BIND: &str = "0.0.0.0:8080";

const STATE_DIR_NAME: &str = "radiotiker";
const STATE_FILE_NAME: &str = "agent-state.json";

/// Whether `user_id` is a usable library key: non-empty ASCII letters,
/// digits, `.`, `_` or `-`.
pub fn is_valid_user_id(user_id: &str) -> bool {
    !user_id.is_empty()
        && user_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Parse a comma separated extension list (`".mp3, FLAC"`) into normalized
/// lowercase extensions without the leading dot.
pub fn parse_extensions(csv: &str) -> Vec<String> {
    let mut extensions: Vec<String> = csv
        .split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect();
    extensions.sort();
    extensions.dedup();
    extensions
}

/// Default location of the agent's persisted fingerprint store.
pub fn default_state_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join(STATE_DIR_NAME).join(STATE_FILE_NAME))
}

// ============================================================================
// Agent
// ============================================================================

/// Settings for one agent syncing one library root for one user.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Base URL of the streamer server, without trailing slash
    pub server_url: String,
    pub user_id: String,
    /// Directory scanned for audio files
    pub library_root: PathBuf,
    /// Port of the local file server
    pub agent_port: u16,
    /// Base URL announced to the server instead of the detected LAN address
    pub public_base_url: Option<String>,
    /// Lowercase extensions without the dot
    pub extensions: Vec<String>,
    /// Where the fingerprint store is persisted
    pub state_path: PathBuf,
    pub submit_timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl AgentConfig {
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    pub fn submit_url(&self) -> String {
        format!("{}/api/submit-scan", self.server_url)
    }

    pub fn announce_url(&self) -> String {
        format!("{}/api/agent/announce", self.server_url)
    }

    /// Whether a file is a candidate for the library, judged by extension.
    pub fn accepts_path(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            })
            .unwrap_or(false)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "Server URL '{}' must start with http:// or https:// (SERVER_URL)",
                self.server_url
            )));
        }

        if !is_valid_user_id(&self.user_id) {
            return Err(Error::Config(format!(
                "User id '{}' must be non-empty and use only letters, digits, '.', '_' or '-' (USER_ID)",
                self.user_id
            )));
        }

        if self.library_root.as_os_str().is_empty() {
            return Err(Error::Config(
                "Library root cannot be empty (LIBRARY_PATH)".to_string(),
            ));
        }

        if self.extensions.is_empty() {
            return Err(Error::Config(
                "At least one audio extension is required (VALID_AUDIO_EXTENSIONS)".to_string(),
            ));
        }

        if self.agent_port == 0 {
            return Err(Error::Config(
                "Agent port must be between 1 and 65535 (AGENT_PORT)".to_string(),
            ));
        }

        if let Some(base) = &self.public_base_url {
            if !(base.starts_with("http://") || base.starts_with("https://")) {
                return Err(Error::Config(format!(
                    "Public base URL '{}' must start with http:// or https:// (PUBLIC_BASE_URL)",
                    base
                )));
            }
        }

        if self.submit_timeout.is_zero() {
            return Err(Error::Config(
                "Submit timeout must be greater than zero".to_string(),
            ));
        }

        if self.retry_policy.max_attempts == 0 {
            return Err(Error::Config(
                "Retry policy needs at least one attempt".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Default)]
pub struct AgentConfigBuilder {
    server_url: Option<String>,
    user_id: Option<String>,
    library_root: Option<PathBuf>,
    agent_port: Option<u16>,
    public_base_url: Option<String>,
    extensions: Option<Vec<String>>,
    state_path: Option<PathBuf>,
    submit_timeout: Option<Duration>,
    retry_policy: Option<RetryPolicy>,
}

impl AgentConfigBuilder {
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn library_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.library_root = Some(path.into());
        self
    }

    pub fn agent_port(mut self, port: u16) -> Self {
        self.agent_port = Some(port);
        self
    }

    /// Empty strings are ignored so an unset env var behaves like no value.
    pub fn public_base_url(mut self, url: Option<String>) -> Self {
        self.public_base_url = url
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty());
        self
    }

    pub fn extensions_csv(mut self, csv: &str) -> Self {
        self.extensions = Some(parse_extensions(csv));
        self
    }

    pub fn state_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.state_path = Some(path.into());
        self
    }

    pub fn submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = Some(timeout);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn build(self) -> Result<AgentConfig> {
        let server_url = self
            .server_url
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .ok_or_else(|| {
                Error::Config("Server URL is required. Set SERVER_URL or --server-url.".to_string())
            })?;

        let user_id = self.user_id.ok_or_else(|| {
            Error::Config("User id is required. Set USER_ID or --user-id.".to_string())
        })?;

        let library_root = self.library_root.ok_or_else(|| {
            Error::Config("Library root is required. Set LIBRARY_PATH or --library-path.".to_string())
        })?;

        let state_path = match self.state_path {
            Some(path) => path,
            None => default_state_path().ok_or_else(|| {
                Error::Config(
                    "No per-user data directory on this platform. Set AGENT_STATE_PATH."
                        .to_string(),
                )
            })?,
        };

        let config = AgentConfig {
            server_url,
            user_id,
            library_root,
            agent_port: self.agent_port.unwrap_or(DEFAULT_AGENT_PORT),
            public_base_url: self.public_base_url,
            extensions: self
                .extensions
                .unwrap_or_else(|| parse_extensions(DEFAULT_EXTENSIONS)),
            state_path,
            submit_timeout: self.submit_timeout.unwrap_or(DEFAULT_SUBMIT_TIMEOUT),
            retry_policy: self.retry_policy.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// Server
// ============================================================================

/// Settings for the streamer server process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// SQLite database file holding libraries and agents
    pub database_path: PathBuf,
    pub max_db_connections: u32,
    /// Largest accepted request body; full replace payloads can be big
    pub max_body_bytes: usize,
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config(
                "Database path cannot be empty (STREAMER_DB_PATH)".to_string(),
            ));
        }
        if self.max_db_connections == 0 {
            return Err(Error::Config(
                "Database pool needs at least one connection".to_string(),
            ));
        }
        if self.max_body_bytes < 1024 {
            return Err(Error::Config(
                "Request body limit must be at least 1 KiB".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    bind: Option<String>,
    database_path: Option<PathBuf>,
    max_db_connections: Option<u32>,
    max_body_bytes: Option<usize>,
}

impl ServerConfigBuilder {
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.bind = Some(addr.into());
        self
    }

    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn max_db_connections(mut self, connections: u32) -> Self {
        self.max_db_connections = Some(connections);
        self
    }

    pub fn max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = Some(bytes);
        self
    }

    pub fn build(self) -> Result<ServerConfig> {
        let bind = self.bind.unwrap_or_else(|| DEFAULT_SERVER_BIND.to_string());
        let bind_addr = bind.parse::<SocketAddr>().map_err(|e| {
            Error::Config(format!(
                "Bind address '{}' is not host:port ({}) (STREAMER_BIND)",
                bind, e
            ))
        })?;

        let config = ServerConfig {
            bind_addr,
            database_path: self
                .database_path
                .unwrap_or_else(|| PathBuf::from("radiotiker.db")),
            max_db_connections: self.max_db_connections.unwrap_or(5),
            max_body_bytes: self.max_body_bytes.unwrap_or(32 * 1024 * 1024),
        };

        config.validate()?;
        Ok(config)
    }
}
