//! # Track Metadata
//!
//! Reads the descriptive fields a library entry carries (title, artist,
//! album, duration) from audio file tags.
//!
//! ## Overview
//!
//! Tags are optional decoration. A file without tags, or one `lofty` cannot
//! parse, still becomes a library entry: the title falls back to the file
//! stem and artist/album to `"Unknown"`. Only the sync pipeline's identity
//! fields (path, size, mtime, content hash) decide whether a file changed.

pub mod error;
pub mod extractor;

pub use error::{MetadataError, Result};
pub use extractor::{MetadataExtractor, TrackTags, UNKNOWN};
