//! # Streamer Server
//!
//! HTTP surface over the per-user library store.
//!
//! ## Routes
//!
//! | Method | Path | Purpose |
//! |---|---|---|
//! | `POST` | `/api/submit-scan` | Apply an agent submission |
//! | `GET` | `/api/health` | Liveness |
//! | `GET` | `/api/library/:user_id` | Current library with stream URLs |
//! | `POST` | `/api/agent/announce` | Record where a user's agent serves files |
//!
//! ## Usage
//!
//! ```rust,ignore
//! let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
//! let state = AppState::from_pool(pool, Some(event_bus.clone()));
//! let router = streamer_server::app(state, config.max_body_bytes);
//! axum::serve(listener, router).await?;
//! ```

pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use bridge_traits::{Clock, SystemClock};
use core_library::{
    AgentRepository, LibraryReconciler, SqliteAgentRepository, SqliteLibraryRepository,
};
use core_runtime::events::EventBus;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ApiResult};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<LibraryReconciler>,
    pub agents: Arc<dyn AgentRepository>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(
        reconciler: Arc<LibraryReconciler>,
        agents: Arc<dyn AgentRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            reconciler,
            agents,
            clock,
        }
    }

    /// SQLite-backed state; reconciler events go to `event_bus` when given.
    pub fn from_pool(pool: SqlitePool, event_bus: Option<EventBus>) -> Self {
        let agents: Arc<dyn AgentRepository> = Arc::new(SqliteAgentRepository::new(pool.clone()));
        let mut reconciler =
            LibraryReconciler::new(Arc::new(SqliteLibraryRepository::new(pool)), agents.clone());
        if let Some(bus) = event_bus {
            reconciler = reconciler.with_event_bus(bus);
        }
        Self::new(Arc::new(reconciler), agents, Arc::new(SystemClock))
    }
}

/// Build the router.
pub fn app(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/submit-scan", post(routes::submit_scan))
        .route("/api/library/:user_id", get(routes::get_library))
        .route("/api/agent/announce", post(routes::announce))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
