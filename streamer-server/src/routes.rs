//! Request handlers

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use core_library::{AnnounceRequest, SubmissionPayload, SubmitReceipt, TrackRecord};
use core_runtime::config::is_valid_user_id;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthReply {
    pub ok: bool,
}

/// Liveness, independent of any library state.
pub async fn health() -> Json<HealthReply> {
    Json(HealthReply { ok: true })
}

/// `POST /api/submit-scan`
pub async fn submit_scan(
    State(state): State<AppState>,
    payload: Result<Json<SubmissionPayload>, JsonRejection>,
) -> ApiResult<Json<SubmitReceipt>> {
    let Json(payload) = payload?;
    debug!(
        user_id = %payload.user_id,
        version = payload.library_version,
        replace = payload.replace,
        upserts = payload.upsert_count(),
        deletes = payload.delete_count(),
        "Submission received"
    );
    let receipt = state.reconciler.submit(payload).await?;
    Ok(Json(receipt))
}

/// One track as listed to clients, with a playable URL when an agent is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryTrack {
    #[serde(flatten)]
    pub track: TrackRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryReply {
    pub user_id: String,
    pub version: u64,
    pub track_count: u64,
    #[serde(default)]
    pub agent_base_url: Option<String>,
    pub tracks: Vec<LibraryTrack>,
}

/// `GET /api/library/:user_id`
pub async fn get_library(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<LibraryReply>> {
    if !is_valid_user_id(&user_id) {
        return Err(ApiError::InvalidPayload {
            field: "user_id".to_string(),
            message: "must be non-empty and use only letters, digits, '.', '_' or '-'".to_string(),
        });
    }
    let library = state
        .reconciler
        .library(&user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no library for user '{}'", user_id)))?;
    let agent = state.agents.find(&user_id).await?;

    let tracks = library
        .tracks_by_path()
        .into_iter()
        .map(|track| LibraryTrack {
            stream_url: agent.as_ref().map(|a| a.stream_url(track)),
            track: track.clone(),
        })
        .collect::<Vec<_>>();

    Ok(Json(LibraryReply {
        user_id: library.user_id.clone(),
        version: library.version,
        track_count: tracks.len() as u64,
        agent_base_url: agent.map(|a| a.base_url),
        tracks,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnnounceReply {
    pub ok: bool,
    pub base_url: String,
}

/// `POST /api/agent/announce`
pub async fn announce(
    State(state): State<AppState>,
    request: Result<Json<AnnounceRequest>, JsonRejection>,
) -> ApiResult<Json<AnnounceReply>> {
    let Json(mut request) = request?;
    request.base_url = request.base_url.trim().trim_end_matches('/').to_string();
    request.validate()?;

    let now = state.clock.unix_timestamp_millis();
    let agent = state
        .agents
        .announce(&request.user_id, &request.base_url, now)
        .await?;
    info!(user_id = %agent.user_id, base_url = %agent.base_url, "Agent announced");

    Ok(Json(AnnounceReply {
        ok: true,
        base_url: agent.base_url,
    }))
}
