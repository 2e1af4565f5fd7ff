//! # Thin Agent
//!
//! Runs next to a music folder. It keeps the server's copy of the library in
//! step with the disk and serves the audio files to players.
//!
//! ## Workflow
//!
//! 1. `sync` runs one pass of the scan → diff → submit pipeline
//!    ([`core_sync::SyncCoordinator`]) and returns its report.
//! 2. `serve` starts the [`file_server`], announces its base URL, syncs, and
//!    repeats announce + sync on an interval until the shutdown future
//!    resolves.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let agent = Agent::new(config)?;
//! let report = agent.sync(SyncMode::Auto).await?;
//! println!("{}", report.summary());
//! ```

pub mod cli;
pub mod error;
pub mod file_server;

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bridge_desktop::ReqwestHttpClient;
use bridge_traits::{Clock, HttpClient, SystemClock};
use core_runtime::config::AgentConfig;
use core_runtime::events::EventBus;
use core_sync::{SyncCoordinator, SyncMode, SyncReport};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

pub use error::{AgentError, Result};

pub struct Agent {
    coordinator: SyncCoordinator,
    events: EventBus,
}

impl Agent {
    /// Agent talking to the configured server over reqwest.
    pub fn new(config: AgentConfig) -> Result<Self> {
        let http = ReqwestHttpClient::with_timeout(config.submit_timeout)?;
        Ok(Self::with_http(config, Arc::new(http), Arc::new(SystemClock)))
    }

    pub fn with_http(config: AgentConfig, http: Arc<dyn HttpClient>, clock: Arc<dyn Clock>) -> Self {
        let events = EventBus::default();
        let coordinator = SyncCoordinator::new(config, http, clock).with_event_bus(events.clone());
        Self { coordinator, events }
    }

    pub fn config(&self) -> &AgentConfig {
        self.coordinator.config()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub async fn sync(&self, mode: SyncMode) -> Result<SyncReport> {
        Ok(self.coordinator.run_once(mode).await?)
    }

    /// Serve files and re-sync every `interval` until `shutdown` resolves.
    ///
    /// Failed passes are logged and retried on the next tick; only file
    /// server failures end the loop early.
    pub async fn serve<F>(&self, interval: Duration, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let config = self.config();
        let listener =
            TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.agent_port))).await?;
        let local_addr = listener.local_addr()?;
        let router = file_server::router(&config.library_root, &config.extensions);

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = stop_rx.await;
                })
                .await
        });

        let host_ip = if config.public_base_url.is_some() {
            None
        } else {
            file_server::detect_host_ip().await
        };
        let base_url = file_server::resolve_base_url(
            config.public_base_url.as_deref(),
            local_addr.port(),
            host_ip,
        );
        info!(
            addr = %local_addr,
            base_url = %base_url,
            interval_secs = interval.as_secs(),
            "Local file server listening"
        );

        tokio::pin!(shutdown);

        loop {
            self.coordinator.announce(&base_url).await;
            match self.coordinator.run_once(SyncMode::Auto).await {
                Ok(report) => info!("{}", report.summary()),
                Err(e) if e.is_recoverable() => warn!(error = %e, "Sync pass failed, retrying next tick"),
                Err(e) => error!(error = %e, "Sync pass failed"),
            }

            if server.is_finished() {
                break;
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }

        let _ = stop_tx.send(());
        server
            .await
            .map_err(|e| AgentError::Task(e.to_string()))??;
        info!("Local file server stopped");
        Ok(())
    }
}
