//! # Library Management Module
//!
//! Server-side owner of every user's library: the wire model shared with
//! agents, SQLite persistence, and the reconciler that applies submissions.
//!
//! ## Overview
//!
//! - [`models`]: `TrackRecord`, `LibraryEntry`, `SubmissionPayload`,
//!   `SubmitReceipt` and the identity helpers (`track_id_for`,
//!   `encode_rel_path`)
//! - [`db`]: pool creation and embedded migrations
//! - [`repository`]: `LibraryRepository`, one transaction per commit
//! - [`agents`]: last announced file server address per user
//! - [`reconciler`]: version checks and per-user serialization
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use core_library::{db, LibraryReconciler, SqliteAgentRepository, SqliteLibraryRepository};
//!
//! let pool = db::create_pool(db::DatabaseConfig::new("radiotiker.db")).await?;
//! let reconciler = LibraryReconciler::new(
//!     Arc::new(SqliteLibraryRepository::new(pool.clone())),
//!     Arc::new(SqliteAgentRepository::new(pool)),
//! );
//! let receipt = reconciler.submit(payload).await?;
//! ```

pub mod agents;
pub mod db;
pub mod error;
pub mod models;
pub mod reconciler;
pub mod repository;

pub use agents::{AgentRepository, SqliteAgentRepository};
pub use error::{LibraryError, Result};
pub use models::{
    encode_rel_path, track_id_for, AgentRecord, AnnounceRequest, LibraryEntry, LibraryState,
    ServerLibrary, StaleVersionReply, SubmissionPayload, SubmitReceipt, TrackPreview, TrackRecord,
};
pub use reconciler::LibraryReconciler;
pub use repository::{LibraryChange, LibraryRepository, SqliteLibraryRepository};
