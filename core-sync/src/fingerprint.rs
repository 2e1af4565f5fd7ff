//! # Fingerprint Store
//!
//! What the agent believes the server already has: one fingerprint per file
//! from the last acknowledged sync, plus the version that sync was accepted at.
//!
//! ## Persistence
//!
//! The store is pretty JSON written by atomic replace: a temp file in the
//! same directory is written, fsynced and renamed over the old file. A crash
//! at any point leaves either the old or the new store, never a torn one.
//!
//! A store that is missing, unreadable, corrupt, or recorded for a different
//! library root loads as `None` and the next sync behaves like a first run.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::scanner::ScannedFile;

const HASH_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackFingerprint {
    /// `/`-separated, relative to the library root
    pub relative_path: String,
    pub size_bytes: u64,
    pub modified_ms: i64,
    /// Lowercase hex SHA-256 of the contents
    pub content_hash: String,
}

impl TrackFingerprint {
    /// Whether size and mtime still match, so the stored hash can be reused.
    pub fn matches_stat(&self, file: &ScannedFile) -> bool {
        self.size_bytes == file.size_bytes && self.modified_ms == file.modified_ms
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintStore {
    pub library_root: PathBuf,
    pub last_library_version: u64,
    pub entries: BTreeMap<String, TrackFingerprint>,
}

impl FingerprintStore {
    pub fn new(library_root: impl Into<PathBuf>) -> Self {
        Self {
            library_root: library_root.into(),
            last_library_version: 0,
            entries: BTreeMap::new(),
        }
    }

    /// Load the store at `path` if it belongs to `library_root`.
    pub fn load(path: &Path, library_root: &Path) -> Option<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No agent state yet");
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Agent state unreadable, starting fresh");
                return None;
            }
        };

        let store: FingerprintStore = match serde_json::from_str(&raw) {
            Ok(store) => store,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Agent state corrupt, starting fresh");
                return None;
            }
        };

        if !same_root(&store.library_root, library_root) {
            warn!(
                stored_root = %store.library_root.display(),
                configured_root = %library_root.display(),
                "Agent state belongs to another library root, starting fresh"
            );
            return None;
        }

        debug!(
            entries = store.entries.len(),
            version = store.last_library_version,
            "Loaded agent state"
        );
        Some(store)
    }

    /// Atomically replace the file at `path` with this store.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        let mut tmp = NamedTempFile::new_in(&parent)?;
        serde_json::to_writer_pretty(&mut tmp, self)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;

        info!(
            path = %path.display(),
            entries = self.entries.len(),
            version = self.last_library_version,
            "Agent state saved"
        );
        Ok(())
    }
}

fn same_root(stored: &Path, configured: &Path) -> bool {
    if stored == configured {
        return true;
    }
    match (stored.canonicalize(), configured.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Lowercase hex SHA-256 of a file, streamed in fixed-size chunks.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
