//! # Event Bus System
//!
//! Typed events broadcast between the sync pipeline, the library reconciler
//! and whoever wants to observe them (CLI progress output, tests), built on
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! ```text
//! ┌────────────────┐  emit  ┌───────────┐  subscribe  ┌────────────┐
//! │ SyncCoordinator├───────>│           ├────────────>│ Subscriber │
//! └────────────────┘        │ EventBus  │             └────────────┘
//! ┌────────────────┐  emit  │           │  subscribe  ┌────────────┐
//! │ LibraryRecon.  ├───────>│           ├────────────>│ Subscriber │
//! └────────────────┘        └───────────┘             └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Sync(SyncEvent::Skipped { unchanged: 12 })).ok();
//!
//! let event = rx.recv().await.unwrap();
//! assert_eq!(event.description(), "Sync skipped, nothing changed");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber fell behind and missed `n`
//!   events. Non-fatal; keep receiving.
//! - **`RecvError::Closed`**: every sender is gone. Treat it as shutdown.
//!
//! Emitting with no subscribers returns `Err`; producers ignore it with
//! `.ok()` because nobody listening is a normal state.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Agent-side sync pipeline events
    Sync(SyncEvent),
    /// Server-side library reconciliation events
    Library(LibraryEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Library(LibraryEvent::Rejected { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::Completed { .. })
            | CoreEvent::Library(LibraryEvent::Reconciled { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Progress of one agent sync pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A pass started scanning the library root.
    Started {
        library_root: String,
        /// Full replace forced by the operator
        reset: bool,
    },
    /// The server acknowledged a submission and local state was committed.
    Completed {
        library_version: u64,
        replace: bool,
        added: u64,
        modified: u64,
        removed: u64,
        duration_ms: u64,
    },
    /// Nothing changed since the last acknowledged sync; no request was sent.
    Skipped { unchanged: u64 },
    /// The pass stopped without committing.
    Failed {
        message: String,
        /// Whether running again later may succeed without operator action
        recoverable: bool,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::Completed { .. } => "Sync completed successfully",
            SyncEvent::Skipped { .. } => "Sync skipped, nothing changed",
            SyncEvent::Failed { .. } => "Sync failed",
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

/// Outcome of a submission handled by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// A submission was applied and persisted.
    Reconciled {
        user_id: String,
        version: u64,
        replace: bool,
        applied: u64,
        track_count: u64,
    },
    /// A submission was refused (stale version or invalid payload).
    Rejected { user_id: String, reason: String },
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::Reconciled { .. } => "Library submission reconciled",
            LibraryEvent::Rejected { .. } => "Library submission rejected",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast channel shared by producers and subscribers.
///
/// Cloning is cheap; all clones publish into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers, returning how many received it.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Subscribe to future events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Mirror every event into the log until all senders are dropped.
pub fn spawn_event_logger(bus: &EventBus) -> JoinHandle<()> {
    let mut receiver = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => debug!(
                    severity = ?event.severity(),
                    event = ?event,
                    "{}",
                    event.description()
                ),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event logger fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}
