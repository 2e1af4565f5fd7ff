//! Library domain models and wire types
//!
//! These types are shared by the agent (which builds submissions) and the
//! server (which validates and reconciles them), so their JSON shape is the
//! protocol.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};

use crate::error::{LibraryError, Result};

/// Number of tracks echoed back in a receipt preview.
pub const PREVIEW_LEN: usize = 3;

/// Hex characters of the path digest kept as the track id.
const TRACK_ID_LEN: usize = 32;

// =============================================================================
// Identity helpers
// =============================================================================

/// Stable track key derived from the library-relative path.
///
/// The same path always maps to the same library entry; a renamed file is a
/// delete plus an add.
pub fn track_id_for(rel_path: &str) -> String {
    let digest = Sha256::digest(rel_path.as_bytes());
    let mut hex = format!("{:x}", digest);
    hex.truncate(TRACK_ID_LEN);
    hex
}

/// Percent-encode each `/`-separated segment of a relative path.
pub fn encode_rel_path(rel_path: &str) -> String {
    rel_path
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Whether `rel_path` stays inside the library root: relative, `/`-separated,
/// with no empty, `.` or `..` segments.
pub fn is_safe_rel_path(rel_path: &str) -> bool {
    !rel_path.is_empty()
        && !rel_path.contains('\\')
        && rel_path
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

// =============================================================================
// Track records
// =============================================================================

/// One audio file as the server knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub track_id: String,
    /// Path relative to the library root, `/` separated
    pub rel_path: String,
    /// Percent-encoded `rel_path`, appended to the agent base URL to stream
    pub stream_path: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub file_size: u64,
    pub mtime_ms: i64,
    /// Lowercase hex SHA-256 of the file contents
    pub content_hash: String,
}

impl TrackRecord {
    pub fn validate(&self) -> std::result::Result<(), (&'static str, String)> {
        if self.rel_path.is_empty() {
            return Err(("rel_path", "must not be empty".to_string()));
        }
        if !is_safe_rel_path(&self.rel_path) {
            return Err((
                "rel_path",
                format!("'{}' must be a relative path inside the library", self.rel_path),
            ));
        }
        if self.track_id.is_empty() {
            return Err(("track_id", "must not be empty".to_string()));
        }
        let expected = track_id_for(&self.rel_path);
        if self.track_id != expected {
            return Err((
                "track_id",
                format!(
                    "'{}' does not match rel_path '{}' (expected '{}')",
                    self.track_id, self.rel_path, expected
                ),
            ));
        }
        if self.content_hash.is_empty() {
            return Err(("content_hash", "must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Element of a submission's `library` array, tagged by `"op"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LibraryEntry {
    /// Insert or overwrite the track with this id
    Upsert(TrackRecord),
    /// Deletion marker; only valid in incremental submissions
    Delete { track_id: String },
}

impl LibraryEntry {
    pub fn track_id(&self) -> &str {
        match self {
            LibraryEntry::Upsert(record) => &record.track_id,
            LibraryEntry::Delete { track_id } => track_id,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, LibraryEntry::Delete { .. })
    }
}

// =============================================================================
// Submission
// =============================================================================

/// Body of `POST /api/submit-scan`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionPayload {
    pub user_id: String,
    pub library: Vec<LibraryEntry>,
    pub library_version: u64,
    /// `true`: `library` is the complete library. `false`: a patch.
    #[serde(default)]
    pub replace: bool,
}

impl SubmissionPayload {
    /// Check the payload before anything is mutated.
    pub fn validate(&self) -> Result<()> {
        let invalid = |field: String, message: String| LibraryError::InvalidInput { field, message };

        if !core_runtime::config::is_valid_user_id(&self.user_id) {
            return Err(invalid(
                "user_id".to_string(),
                "must be non-empty and use only letters, digits, '.', '_' or '-'".to_string(),
            ));
        }

        if i64::try_from(self.library_version).is_err() {
            return Err(invalid(
                "library_version".to_string(),
                format!("{} is out of range", self.library_version),
            ));
        }

        let mut seen = HashSet::with_capacity(self.library.len());
        for (index, entry) in self.library.iter().enumerate() {
            match entry {
                LibraryEntry::Upsert(record) => {
                    record.validate().map_err(|(field, message)| {
                        invalid(format!("library[{}].{}", index, field), message)
                    })?;
                }
                LibraryEntry::Delete { track_id } => {
                    if self.replace {
                        return Err(invalid(
                            format!("library[{}].op", index),
                            "delete markers are not allowed when replace is true".to_string(),
                        ));
                    }
                    if track_id.is_empty() {
                        return Err(invalid(
                            format!("library[{}].track_id", index),
                            "must not be empty".to_string(),
                        ));
                    }
                }
            }

            if !seen.insert(entry.track_id()) {
                return Err(invalid(
                    format!("library[{}].track_id", index),
                    format!("duplicate key '{}'", entry.track_id()),
                ));
            }
        }

        Ok(())
    }

    pub fn upsert_count(&self) -> usize {
        self.library.iter().filter(|e| !e.is_delete()).count()
    }

    pub fn delete_count(&self) -> usize {
        self.library.iter().filter(|e| e.is_delete()).count()
    }
}

// =============================================================================
// Server state
// =============================================================================

/// Whether a user has a library yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryState {
    Empty,
    Populated,
}

/// A user's library as persisted by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerLibrary {
    pub user_id: String,
    pub version: u64,
    /// Keyed by track id
    pub tracks: BTreeMap<String, TrackRecord>,
}

impl ServerLibrary {
    pub fn new(user_id: impl Into<String>, version: u64) -> Self {
        Self {
            user_id: user_id.into(),
            version,
            tracks: BTreeMap::new(),
        }
    }

    /// Tracks ordered by relative path.
    pub fn tracks_by_path(&self) -> Vec<&TrackRecord> {
        let mut tracks: Vec<&TrackRecord> = self.tracks.values().collect();
        tracks.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        tracks
    }

    pub fn preview(&self) -> Vec<TrackPreview> {
        self.tracks_by_path()
            .into_iter()
            .take(PREVIEW_LEN)
            .map(TrackPreview::from)
            .collect()
    }
}

/// State of an optional library slot.
pub fn library_state(library: Option<&ServerLibrary>) -> LibraryState {
    match library {
        Some(_) => LibraryState::Populated,
        None => LibraryState::Empty,
    }
}

/// Short description of a track shown in receipts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackPreview {
    pub track_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
}

impl From<&TrackRecord> for TrackPreview {
    fn from(record: &TrackRecord) -> Self {
        Self {
            track_id: record.track_id.clone(),
            title: record.title.clone(),
            artist: record.artist.clone(),
            album: record.album.clone(),
        }
    }
}

/// Acknowledgment of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub ok: bool,
    pub user_id: String,
    /// Version the library now has; equals the submitted version
    pub accepted_version: u64,
    pub replace: bool,
    /// Entries that changed server state
    pub applied: u64,
    pub track_count: u64,
    #[serde(default)]
    pub agent_base_url: Option<String>,
    #[serde(default)]
    pub preview: Vec<TrackPreview>,
}

/// Body of a `409 Conflict` reply to a stale submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleVersionReply {
    pub error: String,
    pub current_version: u64,
    pub submitted_version: u64,
}

impl StaleVersionReply {
    pub const ERROR_CODE: &'static str = "stale_version";

    pub fn new(submitted_version: u64, current_version: u64) -> Self {
        Self {
            error: Self::ERROR_CODE.to_string(),
            current_version,
            submitted_version,
        }
    }
}

// =============================================================================
// Agents
// =============================================================================

/// Where a user's agent serves files from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub user_id: String,
    pub base_url: String,
    /// Unix milliseconds of the last announce
    pub last_seen: i64,
}

impl AgentRecord {
    pub fn stream_url(&self, track: &TrackRecord) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), track.stream_path)
    }
}

/// Body of `POST /api/agent/announce`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnounceRequest {
    pub user_id: String,
    pub base_url: String,
}

impl AnnounceRequest {
    pub fn validate(&self) -> Result<()> {
        if !core_runtime::config::is_valid_user_id(&self.user_id) {
            return Err(LibraryError::InvalidInput {
                field: "user_id".to_string(),
                message: "must be non-empty and use only letters, digits, '.', '_' or '-'"
                    .to_string(),
            });
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(LibraryError::InvalidInput {
                field: "base_url".to_string(),
                message: "must be an http:// or https:// URL".to_string(),
            });
        }
        Ok(())
    }
}
