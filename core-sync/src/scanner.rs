//! # Library Scanner
//!
//! Walks a library root and lists every audio file with its size and mtime.
//!
//! ## Overview
//!
//! - Recurses into subdirectories and follows symlinks
//! - Visits each real (canonical) directory once, so symlink cycles and
//!   duplicate links terminate
//! - Filters by extension, case-insensitively, leading `.` optional
//! - Keys files by their `/`-separated path relative to the root
//!
//! Unreadable entries and non-UTF-8 names become [`ScanWarning`]s; only a
//! missing root is fatal. The scan is blocking I/O and stateless.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path, PathBuf};
use core_runtime::logging::strip_path;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::ScanError;

/// Filesystem facts for one candidate file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannedFile {
    pub size_bytes: u64,
    /// Unix milliseconds
    pub modified_ms: i64,
}

/// An entry the scan skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanWarning {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Keyed by relative path
    pub files: BTreeMap<String, ScannedFile>,
    pub warnings: Vec<ScanWarning>,
}

/// Normalize an extension allow-list: lowercase, no leading dot.
fn normalize_extensions(extensions: &[String]) -> HashSet<String> {
    extensions
        .iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

fn has_allowed_extension(path: &Path, allowed: &HashSet<String>) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| allowed.contains(&ext.to_ascii_lowercase()))
        .unwrap_or(false)
}

/// `/`-joined relative path, or `None` when a component is not UTF-8.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_str()?),
            _ => return None,
        }
    }
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

fn modified_ms(metadata: &std::fs::Metadata) -> std::io::Result<i64> {
    let modified: DateTime<Utc> = metadata.modified()?.into();
    Ok(modified.timestamp_millis())
}

/// Scan `root` for files whose extension is in `extensions`.
///
/// # Errors
///
/// [`ScanError::RootNotFound`] if `root` is missing or not a directory.
pub fn scan(root: &Path, extensions: &[String]) -> Result<ScanReport, ScanError> {
    match std::fs::metadata(root) {
        Ok(metadata) if metadata.is_dir() => {}
        _ => return Err(ScanError::RootNotFound(root.to_path_buf())),
    }

    let allowed = normalize_extensions(extensions);
    let mut report = ScanReport::default();
    let mut visited_dirs: HashSet<PathBuf> = HashSet::new();

    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry: &DirEntry| {
            if !entry.file_type().is_dir() {
                return true;
            }
            match entry.path().canonicalize() {
                Ok(real) => {
                    let first_visit = visited_dirs.insert(real);
                    if !first_visit {
                        debug!(path = %entry.path().display(), "Directory already visited, skipping");
                    }
                    first_visit
                }
                // Let the walker report the failure when it reads the directory.
                Err(_) => true,
            }
        });

    for item in walker {
        let entry = match item {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                warn!(file = strip_path(&path.to_string_lossy()), error = %err, "Skipping unreadable entry");
                report.warnings.push(ScanWarning {
                    path,
                    message: err.to_string(),
                });
                continue;
            }
        };

        if !entry.file_type().is_file() || !has_allowed_extension(entry.path(), &allowed) {
            continue;
        }

        let Some(key) = relative_key(root, entry.path()) else {
            warn!(file = strip_path(&entry.path().to_string_lossy()), "Skipping file with non UTF-8 name");
            report.warnings.push(ScanWarning {
                path: entry.path().to_path_buf(),
                message: "file name is not valid UTF-8".to_string(),
            });
            continue;
        };

        let stat = entry
            .metadata()
            .map_err(|e| e.to_string())
            .and_then(|m| modified_ms(&m).map(|ms| (m.len(), ms)).map_err(|e| e.to_string()));

        match stat {
            Ok((size_bytes, modified_ms)) => {
                report.files.insert(
                    key,
                    ScannedFile {
                        size_bytes,
                        modified_ms,
                    },
                );
            }
            Err(message) => {
                warn!(
                    file = strip_path(&entry.path().to_string_lossy()),
                    error = %message,
                    "Skipping file that cannot be stat'ed"
                );
                report.warnings.push(ScanWarning {
                    path: entry.path().to_path_buf(),
                    message,
                });
            }
        }
    }

    debug!(
        root = %root.display(),
        files = report.files.len(),
        warnings = report.warnings.len(),
        "Scan finished"
    );
    Ok(report)
}
