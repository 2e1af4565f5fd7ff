//! # Local File Server
//!
//! Serves the music folder over HTTP so players can stream tracks straight
//! from the agent's machine.
//!
//! ## Overview
//!
//! Tracks are addressed by their percent-encoded `stream_path`, the same
//! handle the sync pipeline submits. Only allow-listed audio extensions are
//! served; any other path answers `404`. Byte ranges and `HEAD` come from
//! `tower_http::services::ServeDir`, so seeking works in every player.
//!
//! ## Base URL
//!
//! The URL announced to the server is picked by [`resolve_base_url`]: the
//! configured public URL, else the host address from [`detect_host_ip`]
//! (the Tailscale address reported by `tailscale ip -4`, then the LAN
//! address), else loopback.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::debug;

/// Address used for the LAN probe. Connecting a UDP socket sends nothing.
const LAN_PROBE_ADDR: &str = "8.8.8.8:80";

const TAILSCALE_TIMEOUT: Duration = Duration::from_secs(2);

struct AudioFiles {
    dir: ServeDir,
    extensions: Vec<String>,
}

impl AudioFiles {
    /// Whether a request path names an allow-listed file inside the root.
    fn allows(&self, uri_path: &str) -> bool {
        let Ok(decoded) = urlencoding::decode(uri_path) else {
            return false;
        };
        let relative = Path::new(decoded.trim_start_matches('/'));

        let inside_root = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !inside_root || decoded.contains('\\') {
            return false;
        }

        relative
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            })
            .unwrap_or(false)
    }
}

#[derive(Serialize)]
struct Health {
    ok: bool,
}

async fn health() -> Json<Health> {
    Json(Health { ok: true })
}

async fn serve_track(State(files): State<Arc<AudioFiles>>, request: Request) -> Response {
    if !files.allows(request.uri().path()) {
        debug!(path = %request.uri().path(), "Refusing non-audio path");
        return StatusCode::NOT_FOUND.into_response();
    }

    match files.dir.clone().oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

/// Router serving `root`, limited to `extensions` (lowercase, no dot).
pub fn router(root: impl Into<PathBuf>, extensions: &[String]) -> Router {
    let files = Arc::new(AudioFiles {
        dir: ServeDir::new(root.into()).append_index_html_on_directories(false),
        extensions: extensions.to_vec(),
    });

    Router::new()
        .route("/health", get(health))
        .fallback(serve_track)
        .with_state(files)
}

/// LAN address of the interface that routes to the internet, if any.
pub fn detect_lan_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).ok()?;
    socket.connect(LAN_PROBE_ADDR).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_loopback() && !ip.is_unspecified()).then_some(ip)
}

/// First tailnet address (100.64.0.0/10) in `tailscale ip -4` output.
pub fn parse_tailscale_ip(output: &str) -> Option<IpAddr> {
    output
        .lines()
        .filter_map(|line| line.trim().parse::<Ipv4Addr>().ok())
        .find(|ip| ip.octets()[0] == 100 && (ip.octets()[1] & 0xC0) == 64)
        .map(IpAddr::V4)
}

/// Tailnet address of this machine, if the tailscale CLI is installed and up.
pub async fn detect_tailscale_ip() -> Option<IpAddr> {
    let output = tokio::process::Command::new("tailscale")
        .args(["ip", "-4"])
        .kill_on_drop(true)
        .output();
    match tokio::time::timeout(TAILSCALE_TIMEOUT, output).await {
        Ok(Ok(output)) if output.status.success() => {
            parse_tailscale_ip(&String::from_utf8_lossy(&output.stdout))
        }
        Ok(Ok(output)) => {
            debug!(status = %output.status, "tailscale ip failed");
            None
        }
        Ok(Err(e)) => {
            debug!(error = %e, "tailscale CLI not available");
            None
        }
        Err(_) => {
            debug!("tailscale ip timed out");
            None
        }
    }
}

/// Address players should use to reach this machine: tailnet first, then LAN.
pub async fn detect_host_ip() -> Option<IpAddr> {
    match detect_tailscale_ip().await {
        Some(ip) => Some(ip),
        None => detect_lan_ip(),
    }
}

pub fn resolve_base_url(public_base_url: Option<&str>, port: u16, host_ip: Option<IpAddr>) -> String {
    if let Some(url) = public_base_url {
        return url.trim_end_matches('/').to_string();
    }
    let ip = host_ip.unwrap_or(IpAddr::from([127, 0, 0, 1]));
    format!("http://{}", SocketAddr::new(ip, port))
}
