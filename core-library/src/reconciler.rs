//! # Library Reconciler
//!
//! Applies scan submissions to per-user libraries.
//!
//! ## Overview
//!
//! Each user's library moves `EMPTY -> POPULATED` on its first accepted
//! submission and stays `POPULATED` afterwards (an empty replace leaves an
//! empty but versioned library). Submissions for one user are serialized on
//! a per-user async mutex held across load, version check, persist and cache
//! update; different users never wait on each other.
//!
//! ## Version rules
//!
//! - `replace = true`: the payload becomes the whole library and its version
//!   is stored even when lower than the current one, so a reset always wins.
//!   A replace naming a version that was already accepted for the user is a
//!   replay and is stale.
//! - `replace = false`: accepted only if `library_version` is strictly
//!   greater than the stored version. Equal versions are stale.
//!
//! Reads of users that have no cached slot go straight to the repository, so
//! lookups of unknown users leave nothing behind.
//!
//! ## Usage
//!
//! ```ignore
//! let reconciler = LibraryReconciler::new(library_repo, agent_repo)
//!     .with_event_bus(event_bus.clone());
//!
//! match reconciler.submit(payload).await {
//!     Ok(receipt) => { /* 200 */ }
//!     Err(LibraryError::StaleVersion { current, .. }) => { /* 409 */ }
//!     Err(LibraryError::InvalidInput { field, .. }) => { /* 422 */ }
//!     Err(e) => { /* 500 */ }
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::agents::AgentRepository;
use crate::error::{LibraryError, Result};
use crate::models::{library_state, LibraryEntry, ServerLibrary, SubmissionPayload, SubmitReceipt};
use crate::repository::{LibraryChange, LibraryRepository};

/// Cached view of one user's library, guarded by that user's lock.
#[derive(Default)]
struct UserSlot {
    loaded: bool,
    library: Option<ServerLibrary>,
}

type SlotHandle = Arc<Mutex<UserSlot>>;

pub struct LibraryReconciler {
    repository: Arc<dyn LibraryRepository>,
    agents: Arc<dyn AgentRepository>,
    event_bus: Option<EventBus>,
    slots: Mutex<HashMap<String, SlotHandle>>,
}

impl LibraryReconciler {
    pub fn new(repository: Arc<dyn LibraryRepository>, agents: Arc<dyn AgentRepository>) -> Self {
        Self {
            repository,
            agents,
            event_bus: None,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    async fn slot(&self, user_id: &str) -> SlotHandle {
        let mut slots = self.slots.lock().await;
        slots
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(UserSlot::default())))
            .clone()
    }

    async fn ensure_loaded(&self, user_id: &str, slot: &mut UserSlot) -> Result<()> {
        if !slot.loaded {
            slot.library = self.repository.load(user_id).await?;
            slot.loaded = true;
            debug!(
                user_id,
                version = slot.library.as_ref().map(|l| l.version),
                "Loaded library into cache"
            );
        }
        Ok(())
    }

    fn emit(&self, event: LibraryEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Library(event)).ok();
        }
    }

    fn reject(&self, user_id: &str, err: LibraryError) -> LibraryError {
        self.emit(LibraryEvent::Rejected {
            user_id: user_id.to_string(),
            reason: err.to_string(),
        });
        err
    }

    /// Validate and apply one submission.
    ///
    /// # Errors
    /// - [`LibraryError::InvalidInput`] for malformed payloads
    /// - [`LibraryError::StaleVersion`] for patches that do not advance the
    ///   version, and for replays of an already accepted version
    /// - [`LibraryError::Database`] when persisting fails; nothing changes
    #[instrument(
        skip(self, payload),
        fields(
            user_id = %payload.user_id,
            version = payload.library_version,
            replace = payload.replace,
            entries = payload.library.len()
        )
    )]
    pub async fn submit(&self, payload: SubmissionPayload) -> Result<SubmitReceipt> {
        if let Err(err) = payload.validate() {
            warn!(error = %err, "Rejected invalid submission");
            return Err(self.reject(&payload.user_id, err));
        }

        let user_id = payload.user_id.clone();
        let slot = self.slot(&user_id).await;
        let mut slot = slot.lock().await;
        self.ensure_loaded(&user_id, &mut slot).await?;

        let current = slot.library.as_ref().map(|l| l.version);
        let from_state = library_state(slot.library.as_ref());
        if let Some(current) = current {
            let stale = if payload.replace {
                self.repository
                    .was_accepted(&user_id, payload.library_version)
                    .await?
            } else {
                payload.library_version <= current
            };
            if stale {
                warn!(current, "Rejected stale submission");
                return Err(self.reject(
                    &user_id,
                    LibraryError::StaleVersion {
                        submitted: payload.library_version,
                        current,
                    },
                ));
            }
        }

        let (next, change, applied) = plan(slot.library.as_ref(), payload);

        self.repository.commit(&user_id, next.version, &change).await?;

        let receipt = SubmitReceipt {
            ok: true,
            user_id: user_id.clone(),
            accepted_version: next.version,
            replace: matches!(change, LibraryChange::Replace(_)),
            applied,
            track_count: next.tracks.len() as u64,
            agent_base_url: self.agent_base_url(&user_id).await,
            preview: next.preview(),
        };
        slot.library = Some(next);

        info!(
            applied = receipt.applied,
            track_count = receipt.track_count,
            previous_version = current,
            from_state = ?from_state,
            "Submission reconciled"
        );
        self.emit(LibraryEvent::Reconciled {
            user_id,
            version: receipt.accepted_version,
            replace: receipt.replace,
            applied: receipt.applied,
            track_count: receipt.track_count,
        });

        Ok(receipt)
    }

    /// Current library for `user_id`, if any.
    pub async fn library(&self, user_id: &str) -> Result<Option<ServerLibrary>> {
        let cached = self.slots.lock().await.get(user_id).cloned();
        match cached {
            Some(slot) => {
                let mut slot = slot.lock().await;
                self.ensure_loaded(user_id, &mut slot).await?;
                Ok(slot.library.clone())
            }
            None => self.repository.load(user_id).await,
        }
    }

    // The receipt is still valid without an address, so lookup failures only log.
    async fn agent_base_url(&self, user_id: &str) -> Option<String> {
        match self.agents.find(user_id).await {
            Ok(agent) => agent.map(|a| a.base_url),
            Err(err) => {
                warn!(user_id, error = %err, "Agent lookup failed");
                None
            }
        }
    }
}

/// Compute the next library, the persisted change and the number of entries
/// that changed state.
fn plan(
    current: Option<&ServerLibrary>,
    payload: SubmissionPayload,
) -> (ServerLibrary, LibraryChange, u64) {
    let version = payload.library_version;

    if payload.replace {
        let mut next = ServerLibrary::new(payload.user_id, version);
        let mut records = Vec::with_capacity(payload.library.len());
        for entry in payload.library {
            if let LibraryEntry::Upsert(record) = entry {
                next.tracks.insert(record.track_id.clone(), record.clone());
                records.push(record);
            }
        }
        let applied = records.len() as u64;
        return (next, LibraryChange::Replace(records), applied);
    }

    let mut next = current
        .cloned()
        .unwrap_or_else(|| ServerLibrary::new(payload.user_id.clone(), version));
    next.version = version;

    let mut upserts = Vec::new();
    let mut deletes = Vec::new();
    for entry in payload.library {
        match entry {
            LibraryEntry::Upsert(record) => {
                if next.tracks.get(&record.track_id) != Some(&record) {
                    next.tracks.insert(record.track_id.clone(), record.clone());
                    upserts.push(record);
                }
            }
            LibraryEntry::Delete { track_id } => {
                if next.tracks.remove(&track_id).is_some() {
                    deletes.push(track_id);
                }
            }
        }
    }

    let applied = (upserts.len() + deletes.len()) as u64;
    (next, LibraryChange::Patch { upserts, deletes }, applied)
}
