//! Integration tests for tag extraction against files written on the fly

use core_metadata::{MetadataError, MetadataExtractor, UNKNOWN};
use lofty::config::WriteOptions;
use lofty::tag::{Accessor, Tag, TagExt, TagType};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// One second of 16-bit mono PCM silence at 8 kHz.
fn write_wav(path: &Path) {
    let sample_rate: u32 = 8_000;
    let data_len: u32 = sample_rate * 2;
    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    bytes.extend_from_slice(&2u16.to_le_bytes()); // block align
    bytes.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes.resize(44 + data_len as usize, 0);
    fs::write(path, bytes).unwrap();
}

#[test]
fn test_untagged_wav_uses_file_name() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("Morning  Walk.wav");
    write_wav(&path);

    let tags = MetadataExtractor::new().extract(&path).unwrap();
    assert_eq!(tags.title, "Morning Walk");
    assert_eq!(tags.artist, UNKNOWN);
    assert_eq!(tags.album, UNKNOWN);

    let duration = tags.duration_ms.expect("wav exposes a duration");
    assert!((900..=1100).contains(&duration), "duration was {}", duration);
}

#[test]
fn test_tagged_wav_reports_tags() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("track.wav");
    write_wav(&path);

    let mut tag = Tag::new(TagType::Id3v2);
    tag.set_title("Blue Hour".to_string());
    tag.set_artist("The Lamps".to_string());
    tag.set_album("Night Shift".to_string());
    tag.save_to_path(&path, WriteOptions::default()).unwrap();

    let tags = MetadataExtractor::new().extract(&path).unwrap();
    assert_eq!(tags.title, "Blue Hour");
    assert_eq!(tags.artist, "The Lamps");
    assert_eq!(tags.album, "Night Shift");
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let result = MetadataExtractor::new().extract(&dir.path().join("gone.mp3"));
    assert!(matches!(result, Err(MetadataError::ExtractionFailed { .. })));
}

#[test]
fn test_garbage_file_falls_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("not audio.mp3");
    fs::write(&path, b"This is not a valid audio file").unwrap();

    let extractor = MetadataExtractor::default();
    assert!(extractor.extract(&path).is_err());

    let tags = extractor.extract_or_fallback(&path);
    assert_eq!(tags.title, "not audio");
    assert_eq!(tags.artist, UNKNOWN);
    assert_eq!(tags.duration_ms, None);
}
