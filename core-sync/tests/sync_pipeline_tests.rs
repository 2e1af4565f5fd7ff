//! Integration tests for the agent sync pipeline
//!
//! These tests run real scans over temporary library folders and submit to a
//! real `LibraryReconciler` on in-memory SQLite, through an `HttpClient` that
//! forwards requests in-process:
//! - First run forces a full replace
//! - Unchanged libraries skip the request
//! - Modifications and deletions travel as a patch
//! - Transport failures leave the agent state untouched
//! - Stale replies are re-stamped once
//! - Reset and corrupt state fall back to a full replace

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{HttpClient, HttpRequest, HttpResponse, ManualClock, RetryPolicy};
use core_library::db::create_test_pool;
use core_library::{
    encode_rel_path, track_id_for, AgentRepository, AnnounceRequest, LibraryEntry, LibraryError,
    LibraryReconciler, SqliteAgentRepository, SqliteLibraryRepository, StaleVersionReply,
    SubmissionPayload, TrackRecord,
};
use core_runtime::config::AgentConfig;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_sync::{hash_file, FingerprintStore, SyncCoordinator, SyncError, SyncMode, SyncOutcome};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ============================================================================
// In-process server
// ============================================================================

/// Forwards agent requests straight into a reconciler.
struct InProcessServer {
    reconciler: Arc<LibraryReconciler>,
    agents: Arc<SqliteAgentRepository>,
    failures_left: AtomicUsize,
    submissions: Mutex<Vec<SubmissionPayload>>,
}

impl InProcessServer {
    async fn new() -> Arc<Self> {
        let pool = create_test_pool().await.unwrap();
        let agents = Arc::new(SqliteAgentRepository::new(pool.clone()));
        let reconciler = LibraryReconciler::new(
            Arc::new(SqliteLibraryRepository::new(pool)),
            agents.clone(),
        );
        Arc::new(Self {
            reconciler: Arc::new(reconciler),
            agents,
            failures_left: AtomicUsize::new(0),
            submissions: Mutex::new(Vec::new()),
        })
    }

    fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }

    fn last_submission(&self) -> SubmissionPayload {
        self.submissions.lock().unwrap().last().cloned().unwrap()
    }
}

fn json<T: serde::Serialize>(status: u16, body: &T) -> HttpResponse {
    HttpResponse::new(status, serde_json::to_vec(body).unwrap())
}

#[async_trait]
impl HttpClient for InProcessServer {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(BridgeError::Timeout("simulated timeout".to_string()));
        }

        let body = request.body.unwrap_or_default();
        if request.url.ends_with("/api/agent/announce") {
            let announce: AnnounceRequest = serde_json::from_slice(&body).unwrap();
            self.agents
                .announce(&announce.user_id, &announce.base_url, 1)
                .await
                .unwrap();
            return Ok(HttpResponse::new(200, r#"{"ok":true}"#));
        }

        let payload: SubmissionPayload = serde_json::from_slice(&body).unwrap();
        self.submissions.lock().unwrap().push(payload.clone());
        match self.reconciler.submit(payload).await {
            Ok(receipt) => Ok(json(200, &receipt)),
            Err(LibraryError::StaleVersion { submitted, current }) => {
                Ok(json(409, &StaleVersionReply::new(submitted, current)))
            }
            Err(e) => Ok(HttpResponse::new(422, e.to_string())),
        }
    }
}

// ============================================================================
// Fixtures
// ============================================================================

struct Fixture {
    library: TempDir,
    state_dir: TempDir,
    server: Arc<InProcessServer>,
    clock: Arc<ManualClock>,
    events: EventBus,
}

impl Fixture {
    async fn new() -> Self {
        Self {
            library: TempDir::new().unwrap(),
            state_dir: TempDir::new().unwrap(),
            server: InProcessServer::new().await,
            clock: Arc::new(ManualClock::new(1000)),
            events: EventBus::new(64),
        }
    }

    fn state_path(&self) -> std::path::PathBuf {
        self.state_dir.path().join("agent-state.json")
    }

    fn config(&self) -> AgentConfig {
        AgentConfig::builder()
            .server_url("http://streamer.test")
            .user_id("alice")
            .library_root(self.library.path())
            .state_path(self.state_path())
            .retry_policy(RetryPolicy::none())
            .build()
            .unwrap()
    }

    fn coordinator(&self) -> SyncCoordinator {
        SyncCoordinator::new(self.config(), self.server.clone(), self.clock.clone())
            .with_event_bus(self.events.clone())
    }

    fn write(&self, rel: &str, contents: &[u8]) {
        let path = self.library.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn remove(&self, rel: &str) {
        std::fs::remove_file(self.library.path().join(rel)).unwrap();
    }

    fn stored(&self) -> Option<FingerprintStore> {
        FingerprintStore::load(&self.state_path(), self.library.path())
    }

    async fn server_tracks(&self) -> Vec<(String, String)> {
        let library = self.server.reconciler.library("alice").await.unwrap().unwrap();
        library
            .tracks_by_path()
            .into_iter()
            .map(|t| (t.rel_path.clone(), t.content_hash.clone()))
            .collect()
    }
}

fn hash_of(path: &Path) -> String {
    hash_file(path).unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_first_run_sends_full_replace() {
    let fx = Fixture::new().await;
    fx.write("a.mp3", b"one");
    fx.write("Artist/Album/02 Song.flac", b"flac bytes");
    fx.write("cover.jpg", b"not music");

    let report = fx.coordinator().run_once(SyncMode::Auto).await.unwrap();

    assert!(report.replace);
    assert_eq!(report.added, 2);
    assert_eq!(report.library_version, 1000);
    let payload = fx.server.last_submission();
    assert!(payload.replace);
    assert_eq!(payload.library.len(), 2);
    assert!(payload.library.iter().all(|e| !e.is_delete()));

    assert_eq!(
        fx.server_tracks().await,
        vec![
            (
                "Artist/Album/02 Song.flac".to_string(),
                hash_of(&fx.library.path().join("Artist/Album/02 Song.flac"))
            ),
            ("a.mp3".to_string(), hash_of(&fx.library.path().join("a.mp3"))),
        ]
    );

    let stored = fx.stored().unwrap();
    assert_eq!(stored.last_library_version, 1000);
    assert_eq!(stored.entries.len(), 2);
}

#[tokio::test]
async fn test_unchanged_library_skips_request() {
    let fx = Fixture::new().await;
    fx.write("a.mp3", b"one");
    let coordinator = fx.coordinator();
    coordinator.run_once(SyncMode::Auto).await.unwrap();

    fx.clock.advance(60_000);
    let mut rx = fx.events.subscribe();
    let report = coordinator.run_once(SyncMode::Auto).await.unwrap();

    assert_eq!(report.outcome, SyncOutcome::Skipped);
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.library_version, 1000);
    assert_eq!(fx.server.submission_count(), 1);

    assert!(matches!(
        rx.recv().await.unwrap(),
        CoreEvent::Sync(SyncEvent::Started { reset: false, .. })
    ));
    assert_eq!(
        rx.recv().await.unwrap(),
        CoreEvent::Sync(SyncEvent::Skipped { unchanged: 1 })
    );
}

#[tokio::test]
async fn test_modify_and_delete_travel_as_patch() {
    let fx = Fixture::new().await;
    fx.write("a.mp3", b"one");
    fx.write("b.mp3", b"bee");
    let coordinator = fx.coordinator();
    coordinator.run_once(SyncMode::Auto).await.unwrap();

    fx.write("a.mp3", b"two, and longer");
    fx.remove("b.mp3");
    // A clock behind the last version must not produce a stale version.
    fx.clock.set(500);

    let report = coordinator.run_once(SyncMode::Auto).await.unwrap();

    assert!(!report.replace);
    assert_eq!((report.added, report.modified, report.removed), (0, 1, 1));
    assert_eq!(report.library_version, 1001);

    let payload = fx.server.last_submission();
    assert!(!payload.replace);
    assert_eq!(payload.library_version, 1001);
    assert_eq!(payload.upsert_count(), 1);
    assert!(payload.library.contains(&LibraryEntry::Delete {
        track_id: track_id_for("b.mp3")
    }));

    assert_eq!(
        fx.server_tracks().await,
        vec![("a.mp3".to_string(), hash_of(&fx.library.path().join("a.mp3")))]
    );
    assert_eq!(fx.stored().unwrap().last_library_version, 1001);
}

#[tokio::test]
async fn test_transport_failure_keeps_previous_state() {
    let fx = Fixture::new().await;
    fx.write("a.mp3", b"one");
    let coordinator = fx.coordinator();
    coordinator.run_once(SyncMode::Auto).await.unwrap();
    let before = std::fs::read(fx.state_path()).unwrap();

    fx.write("c.mp3", b"sea");
    fx.clock.set(2000);
    fx.server.fail_next(1);
    let mut rx = fx.events.subscribe();

    let err = coordinator.run_once(SyncMode::Auto).await.unwrap_err();
    assert!(matches!(err, SyncError::Transport(_)));
    assert_eq!(std::fs::read(fx.state_path()).unwrap(), before);

    rx.recv().await.unwrap();
    assert!(matches!(
        rx.recv().await.unwrap(),
        CoreEvent::Sync(SyncEvent::Failed {
            recoverable: true,
            ..
        })
    ));

    // The next pass recomputes the same change and succeeds.
    let report = coordinator.run_once(SyncMode::Auto).await.unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.library_version, 2000);
    assert_eq!(fx.server_tracks().await.len(), 2);
}

#[tokio::test]
async fn test_stale_reply_is_restamped_once() {
    let fx = Fixture::new().await;
    fx.write("a.mp3", b"one");
    let coordinator = fx.coordinator();
    coordinator.run_once(SyncMode::Auto).await.unwrap();

    // Another agent for the same user moved the server ahead.
    let other = TrackRecord {
        track_id: track_id_for("other.mp3"),
        rel_path: "other.mp3".to_string(),
        stream_path: encode_rel_path("other.mp3"),
        title: "other".to_string(),
        artist: "Unknown".to_string(),
        album: "Unknown".to_string(),
        duration_ms: None,
        file_size: 1,
        mtime_ms: 1,
        content_hash: "ff".repeat(32),
    };
    fx.server
        .reconciler
        .submit(SubmissionPayload {
            user_id: "alice".to_string(),
            library: vec![LibraryEntry::Upsert(other)],
            library_version: 5000,
            replace: false,
        })
        .await
        .unwrap();

    fx.write("c.mp3", b"sea");
    fx.clock.set(2000);
    let report = coordinator.run_once(SyncMode::Auto).await.unwrap();

    assert_eq!(report.library_version, 5001);
    assert_eq!(fx.stored().unwrap().last_library_version, 5001);
    assert_eq!(fx.server.submission_count(), 3);
    assert_eq!(fx.server_tracks().await.len(), 3);
}

#[tokio::test]
async fn test_reset_replaces_server_library() {
    let fx = Fixture::new().await;
    fx.write("a.mp3", b"one");
    fx.write("b.mp3", b"bee");
    let coordinator = fx.coordinator();
    coordinator.run_once(SyncMode::Auto).await.unwrap();

    fx.clock.set(3000);
    let mut rx = fx.events.subscribe();
    let report = coordinator.run_once(SyncMode::Reset).await.unwrap();

    assert!(report.replace);
    assert_eq!(report.added, 2);
    assert_eq!(report.library_version, 3000);
    assert!(fx.server.last_submission().replace);
    assert!(matches!(
        rx.recv().await.unwrap(),
        CoreEvent::Sync(SyncEvent::Started { reset: true, .. })
    ));
    assert!(matches!(
        rx.recv().await.unwrap(),
        CoreEvent::Sync(SyncEvent::Completed {
            library_version: 3000,
            replace: true,
            ..
        })
    ));
}

#[tokio::test]
async fn test_empty_library_reset_wipes_server() {
    let fx = Fixture::new().await;
    fx.write("a.mp3", b"one");
    let coordinator = fx.coordinator();
    coordinator.run_once(SyncMode::Auto).await.unwrap();

    fx.remove("a.mp3");
    fx.clock.set(4000);
    let report = coordinator.run_once(SyncMode::Reset).await.unwrap();

    assert!(report.replace);
    assert!(fx.server.last_submission().library.is_empty());
    assert!(fx.server_tracks().await.is_empty());
    assert_eq!(report.library_version, 4000);
}

#[tokio::test]
async fn test_corrupt_state_forces_replace() {
    let fx = Fixture::new().await;
    fx.write("a.mp3", b"one");
    let coordinator = fx.coordinator();
    coordinator.run_once(SyncMode::Auto).await.unwrap();

    std::fs::write(fx.state_path(), b"{ not json").unwrap();
    fx.clock.set(2000);
    let report = coordinator.run_once(SyncMode::Auto).await.unwrap();

    assert!(report.replace);
    assert_eq!(report.added, 1);
    assert!(fx.server.last_submission().replace);
    assert_eq!(fx.stored().unwrap().last_library_version, 2000);
}

#[tokio::test]
async fn test_missing_root_fails_without_request() {
    let fx = Fixture::new().await;
    let mut config = fx.config();
    config.library_root = fx.library.path().join("unplugged-drive");
    let coordinator = SyncCoordinator::new(config, fx.server.clone(), fx.clock.clone());

    let err = coordinator.run_once(SyncMode::Auto).await.unwrap_err();
    assert!(matches!(err, SyncError::Scan(_)));
    assert!(!err.is_recoverable());
    assert_eq!(fx.server.submission_count(), 0);
    assert!(fx.stored().is_none());
}

#[tokio::test]
async fn test_unsaved_state_is_reported_after_acceptance() {
    let fx = Fixture::new().await;
    fx.write("a.mp3", b"one");
    let blocker = fx.state_dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();
    let mut config = fx.config();
    config.state_path = blocker.join("agent-state.json");
    let coordinator = SyncCoordinator::new(config, fx.server.clone(), fx.clock.clone());

    let err = coordinator.run_once(SyncMode::Auto).await.unwrap_err();
    assert!(matches!(err, SyncError::State(_)));
    assert!(err.is_recoverable());
    assert_eq!(fx.server.submission_count(), 1);
    assert_eq!(fx.server_tracks().await.len(), 1);
}

#[tokio::test]
async fn test_announce_records_agent_for_receipts() {
    let fx = Fixture::new().await;
    fx.write("a.mp3", b"one");
    let coordinator = fx.coordinator();

    assert!(coordinator.announce("http://192.168.1.20:8765").await);
    let report = coordinator.run_once(SyncMode::Auto).await.unwrap();

    match report.outcome {
        SyncOutcome::Submitted(receipt) => assert_eq!(
            receipt.agent_base_url.as_deref(),
            Some("http://192.168.1.20:8765")
        ),
        other => panic!("expected a submission, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_announce_is_not_fatal() {
    let fx = Fixture::new().await;
    fx.write("a.mp3", b"one");
    let coordinator = fx.coordinator();

    fx.server.fail_next(1);
    assert!(!coordinator.announce("http://192.168.1.20:8765").await);
    assert!(coordinator.run_once(SyncMode::Auto).await.is_ok());
}
