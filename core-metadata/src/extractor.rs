//! Audio Tag Extraction
//!
//! Reads ID3v2, Vorbis Comments, MP4 and RIFF INFO tags through `lofty`.
//!
//! ## Usage
//!
//! ```ignore
//! use core_metadata::extractor::MetadataExtractor;
//! use std::path::Path;
//!
//! let extractor = MetadataExtractor::new();
//! let tags = extractor.extract_or_fallback(Path::new("Artist/Album/01 Intro.flac"));
//! println!("{} - {}", tags.artist, tags.title);
//! ```
//!
//! Extraction is blocking file I/O; async callers run it inside
//! `tokio::task::spawn_blocking`.

use lofty::config::ParseOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::Accessor;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{MetadataError, Result};

/// Placeholder for artist/album when no tag provides one.
pub const UNKNOWN: &str = "Unknown";

/// Descriptive fields of one track, with fallbacks already applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackTags {
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Absent when the container does not expose a duration
    pub duration_ms: Option<u64>,
}

impl TrackTags {
    /// Tags for a file whose metadata could not be read at all.
    pub fn fallback(path: &Path) -> Self {
        Self {
            title: stem_title(path),
            artist: UNKNOWN.to_string(),
            album: UNKNOWN.to_string(),
            duration_ms: None,
        }
    }
}

/// Audio metadata extractor
pub struct MetadataExtractor {
    parse_options: ParseOptions,
}

impl MetadataExtractor {
    pub fn new() -> Self {
        Self {
            parse_options: ParseOptions::new(),
        }
    }

    /// Read tags and audio properties from `path`.
    ///
    /// Missing individual tags are filled with fallbacks; an error means the
    /// file could not be opened or its format not recognised.
    pub fn extract(&self, path: &Path) -> Result<TrackTags> {
        let failed = |message: String| MetadataError::ExtractionFailed {
            path: path.display().to_string(),
            message,
        };

        let tagged_file = Probe::open(path)
            .map_err(|e| failed(e.to_string()))?
            .options(self.parse_options)
            .guess_file_type()
            .map_err(|e| failed(e.to_string()))?
            .read()
            .map_err(|e| failed(e.to_string()))?;

        let duration = tagged_file.properties().duration();
        let duration_ms = (!duration.is_zero()).then(|| duration.as_millis() as u64);

        let tag = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag());
        if tag.is_none() {
            debug!(file = %path.display(), "No tags found, using file name");
        }

        let title = tag
            .and_then(|t| t.title().map(|s| normalize_text(&s)))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| stem_title(path));
        let artist = tag
            .and_then(|t| t.artist().map(|s| normalize_text(&s)))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string());
        let album = tag
            .and_then(|t| t.album().map(|s| normalize_text(&s)))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string());

        Ok(TrackTags {
            title,
            artist,
            album,
            duration_ms,
        })
    }

    /// Like [`extract`](Self::extract), but never fails: unreadable files get
    /// [`TrackTags::fallback`].
    pub fn extract_or_fallback(&self, path: &Path) -> TrackTags {
        match self.extract(path) {
            Ok(tags) => tags,
            Err(err) => {
                warn!(file = %path.display(), error = %err, "Could not read tags");
                TrackTags::fallback(path)
            }
        }
    }
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn stem_title(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(normalize_text)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Collapse whitespace runs and drop control characters.
fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}
