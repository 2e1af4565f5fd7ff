//! # Sync Coordinator
//!
//! Drives one sync pass of the agent: scan, diff, submit, persist.
//!
//! ## Overview
//!
//! The `SyncCoordinator` owns the pipeline between the local library root and
//! the streamer server. It coordinates:
//! - The scanner (`scanner::scan`) to list audio files
//! - The fingerprint store and differ to find what changed since the last
//!   acknowledged sync
//! - Tag extraction (`core_metadata`) for every upserted track
//! - The [`SyncClient`] to submit and interpret the reply
//! - Progress events on the `EventBus`
//!
//! ## Workflow
//!
//! 1. Load the fingerprint store (absent, corrupt or foreign root: first run)
//! 2. Scan the library root
//! 3. Diff against the stored fingerprints, hashing only what moved
//! 4. No changes and not a first run: stop here without a request
//! 5. Build the submission: a full `replace` on first run or reset, otherwise
//!    a patch of upserts and deletion markers
//! 6. Stamp it with `max(now_ms, last_version + 1)` and submit
//! 7. On a stale reply, re-stamp once with `max(current + 1, now_ms)`
//! 8. Only after the server acknowledges, persist the new fingerprint store
//!
//! Interrupting a pass at any step leaves the previous store in place, so the
//! next pass recomputes the same changes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncCoordinator, SyncMode};
//! use std::sync::Arc;
//!
//! let coordinator = SyncCoordinator::new(config, http_client, Arc::new(SystemClock))
//!     .with_event_bus(event_bus.clone());
//! let report = coordinator.run_once(SyncMode::Auto).await?;
//! println!("library version {}", report.library_version);
//! ```

use bridge_traits::{Clock, HttpClient};
use core_library::{encode_rel_path, track_id_for, LibraryEntry, SubmissionPayload, SubmitReceipt, TrackRecord};
use core_metadata::MetadataExtractor;
use core_runtime::config::AgentConfig;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::client::{SubmitOutcome, SyncClient};
use crate::differ;
use crate::error::{Result, SyncError};
use crate::fingerprint::{FingerprintStore, TrackFingerprint};
use crate::scanner;

/// How a pass treats the stored fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Patch when a usable store exists, full replace otherwise
    #[default]
    Auto,
    /// Ignore the store and send the whole library with `replace = true`
    Reset,
}

/// What a finished pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Submitted(SubmitReceipt),
    /// Nothing changed since the last acknowledged sync
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    /// Version the server holds after this pass
    pub library_version: u64,
    pub replace: bool,
    pub added: u64,
    pub modified: u64,
    pub removed: u64,
    pub unchanged: u64,
    /// Entries the scanner or differ had to leave out
    pub skipped_entries: u64,
    pub duration_ms: u64,
}

impl SyncReport {
    /// One-line summary for CLI output.
    pub fn summary(&self) -> String {
        match &self.outcome {
            SyncOutcome::Skipped => format!(
                "library unchanged ({} files), server at version {}",
                self.unchanged, self.library_version
            ),
            SyncOutcome::Submitted(receipt) => format!(
                "{} version {}: {} added, {} modified, {} removed, {} unchanged; server holds {} tracks",
                if self.replace { "replaced library at" } else { "patched library to" },
                self.library_version,
                self.added,
                self.modified,
                self.removed,
                self.unchanged,
                receipt.track_count
            ),
        }
    }
}

/// Version for the next submission: wall-clock milliseconds, but always past
/// the last version the server acknowledged.
pub fn next_library_version(now_ms: i64, last_version: u64) -> u64 {
    (now_ms.max(0) as u64).max(last_version.saturating_add(1))
}

pub struct SyncCoordinator {
    config: AgentConfig,
    client: SyncClient,
    clock: Arc<dyn Clock>,
    extractor: Arc<MetadataExtractor>,
    event_bus: Option<EventBus>,
    in_progress: Mutex<()>,
}

impl SyncCoordinator {
    pub fn new(config: AgentConfig, http: Arc<dyn HttpClient>, clock: Arc<dyn Clock>) -> Self {
        let client = SyncClient::new(http, &config);
        Self {
            config,
            client,
            clock,
            extractor: Arc::new(MetadataExtractor::new()),
            event_bus: None,
            in_progress: Mutex::new(()),
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Sync(event)).ok();
        }
    }

    /// Announce the file server address. Failures are logged, never fatal.
    pub async fn announce(&self, base_url: &str) -> bool {
        match self.client.announce(&self.config.user_id, base_url).await {
            Ok(()) => {
                info!(base_url, "File server announced");
                true
            }
            Err(e) => {
                warn!(base_url, error = %e, "Announce failed, continuing without it");
                false
            }
        }
    }

    /// Run one sync pass.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InProgress`] if another pass is running
    /// - [`SyncError::Scan`] when the library root is missing
    /// - [`SyncError::Transport`], [`SyncError::Rejected`], [`SyncError::Protocol`]
    ///   or [`SyncError::StaleVersion`] when the server did not acknowledge;
    ///   local state is left untouched in every case
    /// - [`SyncError::State`] when the server accepted but the state file
    ///   could not be written
    #[instrument(skip(self), fields(user_id = %self.config.user_id, root = %self.config.library_root.display()))]
    pub async fn run_once(&self, mode: SyncMode) -> Result<SyncReport> {
        let _guard = self.in_progress.try_lock().map_err(|_| SyncError::InProgress)?;

        self.emit(SyncEvent::Started {
            library_root: self.config.library_root.display().to_string(),
            reset: mode == SyncMode::Reset,
        });

        match self.run_pass(mode).await {
            Ok(report) => Ok(report),
            Err(e) => {
                error!(error = %e, recoverable = e.is_recoverable(), "Sync failed");
                self.emit(SyncEvent::Failed {
                    message: e.to_string(),
                    recoverable: e.is_recoverable(),
                });
                Err(e)
            }
        }
    }

    async fn run_pass(&self, mode: SyncMode) -> Result<SyncReport> {
        let started = Instant::now();
        let root = self.config.library_root.clone();

        // Phase 1: Load agent state
        info!("Phase 1: Loading agent state");
        let stored = {
            let state_path = self.config.state_path.clone();
            let root = root.clone();
            blocking(move || Ok(FingerprintStore::load(&state_path, &root))).await?
        };
        let last_version = stored.as_ref().map_or(0, |s| s.last_library_version);
        let prior = match (mode, stored) {
            (SyncMode::Auto, Some(store)) => Some(store.entries),
            (SyncMode::Reset, Some(_)) => {
                info!("Reset requested, ignoring stored fingerprints");
                None
            }
            (_, None) => None,
        };
        let replace = prior.is_none();

        // Phase 2: Scan
        info!("Phase 2: Scanning library root");
        let report = {
            let root = root.clone();
            let extensions = self.config.extensions.clone();
            blocking(move || Ok(scanner::scan(&root, &extensions)?)).await?
        };
        info!(files = report.files.len(), warnings = report.warnings.len(), "Scan complete");

        // Phase 3: Diff
        info!("Phase 3: Diffing against stored fingerprints");
        let prior_entries = prior.unwrap_or_default();
        let outcome = {
            let root = root.clone();
            let files = report.files;
            blocking(move || Ok(differ::diff(&root, &files, &prior_entries))).await?
        };
        let changes = outcome.changes;
        let skipped_entries = (report.warnings.len() + outcome.unreadable.len()) as u64;

        if !replace && changes.is_empty() {
            info!(unchanged = changes.unchanged_count, "Library unchanged, nothing to submit");
            self.emit(SyncEvent::Skipped {
                unchanged: changes.unchanged_count,
            });
            return Ok(SyncReport {
                outcome: SyncOutcome::Skipped,
                library_version: last_version,
                replace: false,
                added: 0,
                modified: 0,
                removed: 0,
                unchanged: changes.unchanged_count,
                skipped_entries,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }

        // Phase 4: Build submission
        info!(
            replace,
            added = changes.added.len(),
            modified = changes.modified.len(),
            removed = changes.removed.len(),
            "Phase 4: Building submission"
        );
        let library = {
            let root = root.clone();
            let extractor = Arc::clone(&self.extractor);
            let upserts: Vec<TrackFingerprint> = if replace {
                outcome.next_entries.values().cloned().collect()
            } else {
                changes.added.iter().chain(&changes.modified).cloned().collect()
            };
            let removed = if replace { Vec::new() } else { changes.removed.clone() };
            blocking(move || Ok(build_entries(&root, &extractor, upserts, removed))).await?
        };

        let mut payload = SubmissionPayload {
            user_id: self.config.user_id.clone(),
            library,
            library_version: next_library_version(self.clock.unix_timestamp_millis(), last_version),
            replace,
        };

        // Phase 5: Submit
        info!(version = payload.library_version, "Phase 5: Submitting");
        let receipt = self.submit_with_restamp(&mut payload).await?;

        // Phase 6: Commit local state
        let store = FingerprintStore {
            library_root: root,
            last_library_version: receipt.accepted_version,
            entries: outcome.next_entries,
        };
        let state_path = self.config.state_path.clone();
        blocking(move || {
            store.save(&state_path).map_err(|e| {
                SyncError::State(format!("could not save {}: {}", state_path.display(), e))
            })
        })
        .await?;

        let report = SyncReport {
            library_version: receipt.accepted_version,
            replace,
            added: changes.added.len() as u64,
            modified: changes.modified.len() as u64,
            removed: changes.removed.len() as u64,
            unchanged: changes.unchanged_count,
            skipped_entries,
            duration_ms: started.elapsed().as_millis() as u64,
            outcome: SyncOutcome::Submitted(receipt),
        };

        info!(
            version = report.library_version,
            duration_ms = report.duration_ms,
            "Sync completed"
        );
        self.emit(SyncEvent::Completed {
            library_version: report.library_version,
            replace,
            added: report.added,
            modified: report.modified,
            removed: report.removed,
            duration_ms: report.duration_ms,
        });
        Ok(report)
    }

    async fn submit_with_restamp(&self, payload: &mut SubmissionPayload) -> Result<SubmitReceipt> {
        match self.client.submit(payload).await? {
            SubmitOutcome::Accepted(receipt) => Ok(receipt),
            SubmitOutcome::Stale { current_version } => {
                let restamped =
                    next_library_version(self.clock.unix_timestamp_millis(), current_version);
                warn!(
                    rejected = payload.library_version,
                    current_version,
                    restamped,
                    "Submission stale, retrying once with a newer version"
                );
                payload.library_version = restamped;
                match self.client.submit(payload).await? {
                    SubmitOutcome::Accepted(receipt) => Ok(receipt),
                    SubmitOutcome::Stale { current_version } => Err(SyncError::StaleVersion {
                        submitted: payload.library_version,
                        current: current_version,
                    }),
                }
            }
        }
    }
}

/// Run blocking filesystem work off the async runtime.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| SyncError::Task(e.to_string()))?
}

/// Library record for one fingerprinted file, with tags read from disk.
pub fn track_record(root: &Path, extractor: &MetadataExtractor, fingerprint: &TrackFingerprint) -> TrackRecord {
    let path: PathBuf = root.join(&fingerprint.relative_path);
    let tags = extractor.extract_or_fallback(&path);
    TrackRecord {
        track_id: track_id_for(&fingerprint.relative_path),
        rel_path: fingerprint.relative_path.clone(),
        stream_path: encode_rel_path(&fingerprint.relative_path),
        title: tags.title,
        artist: tags.artist,
        album: tags.album,
        duration_ms: tags.duration_ms,
        file_size: fingerprint.size_bytes,
        mtime_ms: fingerprint.modified_ms,
        content_hash: fingerprint.content_hash.clone(),
    }
}

fn build_entries(
    root: &Path,
    extractor: &MetadataExtractor,
    upserts: Vec<TrackFingerprint>,
    removed: Vec<String>,
) -> Vec<LibraryEntry> {
    let mut by_path: BTreeMap<String, LibraryEntry> = BTreeMap::new();
    for fingerprint in &upserts {
        by_path.insert(
            fingerprint.relative_path.clone(),
            LibraryEntry::Upsert(track_record(root, extractor, fingerprint)),
        );
    }
    for relative_path in removed {
        let track_id = track_id_for(&relative_path);
        by_path.insert(relative_path, LibraryEntry::Delete { track_id });
    }
    debug!(entries = by_path.len(), "Submission entries built");
    by_path.into_values().collect()
}
