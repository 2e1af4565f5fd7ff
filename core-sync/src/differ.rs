//! # Differ
//!
//! Compares a fresh scan with the stored fingerprints and classifies every
//! path as added, modified, removed or unchanged.
//!
//! Files are hashed only when there is no stored fingerprint for the path or
//! when size or mtime moved. A touched file whose hash did not change counts
//! as unchanged. A file that cannot be hashed is dropped from the current
//! scan, which makes it `removed` if it was stored before.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

use crate::fingerprint::{hash_file, TrackFingerprint};
use crate::scanner::ScannedFile;

/// Difference between the stored fingerprints and the current scan.
///
/// All lists are sorted by relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<TrackFingerprint>,
    pub modified: Vec<TrackFingerprint>,
    pub removed: Vec<String>,
    pub unchanged_count: u64,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiffOutcome {
    pub changes: ChangeSet,
    /// Fingerprints to persist once the server acknowledges the changes
    pub next_entries: BTreeMap<String, TrackFingerprint>,
    /// Files dropped because they could not be hashed
    pub unreadable: Vec<String>,
}

/// Diff `scan` against `prior`, hashing files under `root` with [`hash_file`].
pub fn diff(
    root: &Path,
    scan: &BTreeMap<String, ScannedFile>,
    prior: &BTreeMap<String, TrackFingerprint>,
) -> DiffOutcome {
    diff_with(root, scan, prior, hash_file)
}

/// [`diff`] with a caller-supplied hash function.
pub fn diff_with<H>(
    root: &Path,
    scan: &BTreeMap<String, ScannedFile>,
    prior: &BTreeMap<String, TrackFingerprint>,
    mut hasher: H,
) -> DiffOutcome
where
    H: FnMut(&Path) -> io::Result<String>,
{
    let mut outcome = DiffOutcome::default();
    let mut hashed = 0usize;

    for (relative_path, file) in scan {
        let stored = prior.get(relative_path);

        if let Some(stored) = stored {
            if stored.matches_stat(file) {
                outcome.changes.unchanged_count += 1;
                outcome
                    .next_entries
                    .insert(relative_path.clone(), stored.clone());
                continue;
            }
        }

        let content_hash = match hasher(&root.join(relative_path)) {
            Ok(hash) => hash,
            Err(e) => {
                warn!(path = %relative_path, error = %e, "Could not hash file, leaving it out of this scan");
                outcome.unreadable.push(relative_path.clone());
                continue;
            }
        };
        hashed += 1;

        let fingerprint = TrackFingerprint {
            relative_path: relative_path.clone(),
            size_bytes: file.size_bytes,
            modified_ms: file.modified_ms,
            content_hash,
        };

        match stored {
            None => outcome.changes.added.push(fingerprint.clone()),
            Some(stored) if stored.content_hash != fingerprint.content_hash => {
                outcome.changes.modified.push(fingerprint.clone())
            }
            Some(_) => outcome.changes.unchanged_count += 1,
        }
        outcome
            .next_entries
            .insert(relative_path.clone(), fingerprint);
    }

    // Stored paths missing from the next map were deleted or became unreadable.
    outcome.changes.removed = prior
        .keys()
        .filter(|path| !outcome.next_entries.contains_key(*path))
        .cloned()
        .collect();

    debug!(
        added = outcome.changes.added.len(),
        modified = outcome.changes.modified.len(),
        removed = outcome.changes.removed.len(),
        unchanged = outcome.changes.unchanged_count,
        hashed,
        "Diff computed"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn file(size: u64, mtime: i64) -> ScannedFile {
        ScannedFile {
            size_bytes: size,
            modified_ms: mtime,
        }
    }

    fn stored(path: &str, size: u64, mtime: i64, hash: &str) -> (String, TrackFingerprint) {
        (
            path.to_string(),
            TrackFingerprint {
                relative_path: path.to_string(),
                size_bytes: size,
                modified_ms: mtime,
                content_hash: hash.to_string(),
            },
        )
    }

    /// Hash function backed by a fixed table; missing paths fail like a vanished file.
    fn table_hasher<'a>(
        table: HashMap<&'static str, &'static str>,
        calls: &'a mut Vec<String>,
    ) -> impl FnMut(&Path) -> io::Result<String> + 'a {
        move |path: &Path| {
            let name = path
                .strip_prefix("/lib")
                .unwrap()
                .to_str()
                .unwrap()
                .to_string();
            calls.push(name.clone());
            table
                .get(name.as_str())
                .map(|h| h.to_string())
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "vanished"))
        }
    }

    #[test]
    fn test_first_run_everything_added() {
        let scan = BTreeMap::from([
            ("b.mp3".to_string(), file(2, 2)),
            ("a.mp3".to_string(), file(1, 1)),
        ]);
        let mut calls = Vec::new();
        let outcome = diff_with(
            Path::new("/lib"),
            &scan,
            &BTreeMap::new(),
            table_hasher(HashMap::from([("a.mp3", "HA"), ("b.mp3", "HB")]), &mut calls),
        );

        let added: Vec<&str> = outcome
            .changes
            .added
            .iter()
            .map(|f| f.relative_path.as_str())
            .collect();
        assert_eq!(added, vec!["a.mp3", "b.mp3"]);
        assert!(outcome.changes.modified.is_empty());
        assert!(outcome.changes.removed.is_empty());
        assert_eq!(outcome.next_entries.len(), 2);
    }

    #[test]
    fn test_unchanged_stat_skips_hashing() {
        let prior = BTreeMap::from([stored("a.mp3", 1, 1, "HA")]);
        let scan = BTreeMap::from([("a.mp3".to_string(), file(1, 1))]);
        let mut calls = Vec::new();
        let outcome = diff_with(
            Path::new("/lib"),
            &scan,
            &prior,
            table_hasher(HashMap::new(), &mut calls),
        );

        assert!(outcome.changes.is_empty());
        assert_eq!(outcome.changes.unchanged_count, 1);
        assert_eq!(outcome.next_entries, prior);
        assert!(calls.is_empty());
    }

    #[test]
    fn test_modified_touched_and_removed() {
        let prior = BTreeMap::from([
            stored("a.mp3", 1, 1, "H1"),
            stored("b.mp3", 5, 5, "HB"),
            stored("c.mp3", 3, 3, "HC"),
        ]);
        let scan = BTreeMap::from([
            ("a.mp3".to_string(), file(2, 2)),
            ("c.mp3".to_string(), file(3, 99)),
        ]);
        let mut calls = Vec::new();
        let outcome = diff_with(
            Path::new("/lib"),
            &scan,
            &prior,
            table_hasher(HashMap::from([("a.mp3", "H2"), ("c.mp3", "HC")]), &mut calls),
        );

        assert_eq!(outcome.changes.modified.len(), 1);
        assert_eq!(outcome.changes.modified[0].content_hash, "H2");
        assert_eq!(outcome.changes.removed, vec!["b.mp3".to_string()]);
        assert_eq!(outcome.changes.unchanged_count, 1);
        // The touched file keeps its hash but records the new mtime.
        assert_eq!(outcome.next_entries["c.mp3"].modified_ms, 99);
        assert_eq!(calls, vec!["a.mp3".to_string(), "c.mp3".to_string()]);
    }

    #[test]
    fn test_unhashable_file_is_dropped() {
        let prior = BTreeMap::from([stored("gone.mp3", 1, 1, "HG")]);
        let scan = BTreeMap::from([
            ("gone.mp3".to_string(), file(9, 9)),
            ("new.mp3".to_string(), file(1, 1)),
        ]);
        let mut calls = Vec::new();
        let outcome = diff_with(
            Path::new("/lib"),
            &scan,
            &prior,
            table_hasher(HashMap::new(), &mut calls),
        );

        assert!(outcome.changes.added.is_empty());
        assert_eq!(outcome.changes.removed, vec!["gone.mp3".to_string()]);
        assert_eq!(outcome.unreadable.len(), 2);
        assert!(outcome.next_entries.is_empty());
    }
}
