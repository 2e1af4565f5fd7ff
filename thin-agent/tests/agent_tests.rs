//! Agent tests against a scripted server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bridge_desktop::ReqwestHttpClient;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{HttpClient, HttpRequest, HttpResponse, ManualClock, RetryPolicy};
use core_runtime::config::AgentConfig;
use core_sync::{SyncMode, SyncOutcome};
use serde_json::{json, Value};
use tempfile::TempDir;
use thin_agent::Agent;

/// Accepts every submission and announce, recording what it saw.
#[derive(Default)]
struct ScriptedServer {
    seen: Mutex<Vec<(String, Value)>>,
}

impl ScriptedServer {
    fn seen(&self) -> Vec<(String, Value)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for ScriptedServer {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        let body: Value = match &request.body {
            Some(bytes) => serde_json::from_slice(bytes)
                .map_err(|e| BridgeError::OperationFailed(e.to_string()))?,
            None => Value::Null,
        };
        self.seen.lock().unwrap().push((request.url.clone(), body.clone()));

        let reply = if request.url.ends_with("/api/submit-scan") {
            let count = body["library"].as_array().map(|l| l.len()).unwrap_or(0);
            json!({
                "ok": true,
                "user_id": body["user_id"],
                "accepted_version": body["library_version"],
                "replace": body["replace"],
                "applied": count,
                "track_count": count
            })
        } else {
            json!({"ok": true, "base_url": body["base_url"]})
        };
        Ok(HttpResponse::new(200, reply.to_string()))
    }
}

struct Fixture {
    _library: TempDir,
    _state: TempDir,
    config: AgentConfig,
}

fn fixture(port: u16) -> Fixture {
    let library = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    std::fs::write(library.path().join("a.mp3"), b"first song").unwrap();
    std::fs::write(library.path().join("cover.jpg"), b"jpeg").unwrap();

    let config = AgentConfig::builder()
        .server_url("http://streamer.test")
        .user_id("alice")
        .library_root(library.path())
        .state_path(state.path().join("agent-state.json"))
        .agent_port(port)
        .public_base_url(Some(format!("http://127.0.0.1:{}", port)))
        .extensions_csv("mp3")
        .retry_policy(RetryPolicy::none())
        .build()
        .unwrap();
    Fixture {
        _library: library,
        _state: state,
        config,
    }
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::test]
async fn test_sync_then_skip() {
    let fixture = fixture(8765);
    let server = Arc::new(ScriptedServer::default());
    let agent = Agent::with_http(fixture.config.clone(), server.clone(), Arc::new(ManualClock::new(1000)));

    let first = agent.sync(SyncMode::Auto).await.unwrap();
    assert!(first.replace);
    assert_eq!(first.added, 1);
    assert_eq!(first.library_version, 1000);

    let second = agent.sync(SyncMode::Auto).await.unwrap();
    assert_eq!(second.outcome, SyncOutcome::Skipped);
    assert_eq!(server.seen().len(), 1);

    let reset = agent.sync(SyncMode::Reset).await.unwrap();
    assert!(reset.replace);
    assert_eq!(reset.library_version, 1001);
    assert_eq!(server.seen().len(), 2);
}

#[tokio::test]
async fn test_serve_announces_syncs_and_serves_files() {
    let port = free_port();
    let fixture = fixture(port);
    let server = Arc::new(ScriptedServer::default());
    let agent = Agent::with_http(fixture.config.clone(), server.clone(), Arc::new(ManualClock::new(5000)));

    // Shutdown only after a player has fetched a track from the running file server.
    let fetched = Arc::new(Mutex::new(None));
    let slot = fetched.clone();
    let shutdown = async move {
        let client = ReqwestHttpClient::new().unwrap();
        let response = client
            .execute(HttpRequest::get(format!("http://127.0.0.1:{}/a.mp3", port)))
            .await
            .unwrap();
        *slot.lock().unwrap() = Some((response.status, response.body.to_vec()));
    };

    tokio::time::timeout(
        Duration::from_secs(10),
        agent.serve(Duration::from_secs(3600), shutdown),
    )
    .await
    .expect("serve loop should stop on shutdown")
    .unwrap();

    let seen = server.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, "http://streamer.test/api/agent/announce");
    assert_eq!(seen[0].1["base_url"], format!("http://127.0.0.1:{}", port));
    assert_eq!(seen[1].0, "http://streamer.test/api/submit-scan");
    assert_eq!(seen[1].1["replace"], true);
    assert_eq!(seen[1].1["library_version"], 5000);
    assert_eq!(seen[1].1["library"].as_array().unwrap().len(), 1);

    let fetched = fetched.lock().unwrap().clone();
    assert_eq!(fetched, Some((200, b"first song".to_vec())));
}
