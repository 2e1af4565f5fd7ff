//! # Library Sync Module
//!
//! Agent-side synchronization of a local music folder with the streamer
//! server.
//!
//! ## Overview
//!
//! A sync pass detects what changed in the library root since the last
//! acknowledged sync and submits only that delta, under the server's
//! version and replace/patch rules.
//!
//! ## Components
//!
//! - **Scanner** (`scanner`): lists audio files with size and mtime
//! - **Fingerprint Store** (`fingerprint`): last acknowledged state, saved by atomic replace
//! - **Differ** (`differ`): added / modified / removed / unchanged with lazy hashing
//! - **Sync Client** (`client`): submission and announce requests, reply mapping
//! - **Sync Coordinator** (`coordinator`): the pass itself, from scan to persisted state

pub mod client;
pub mod coordinator;
pub mod differ;
pub mod error;
pub mod fingerprint;
pub mod scanner;

pub use client::{SubmitOutcome, SyncClient};
pub use coordinator::{next_library_version, SyncCoordinator, SyncMode, SyncOutcome, SyncReport};
pub use differ::{diff, ChangeSet, DiffOutcome};
pub use error::{Result, ScanError, SyncError};
pub use fingerprint::{hash_file, FingerprintStore, TrackFingerprint};
pub use scanner::{scan, ScanReport, ScanWarning, ScannedFile};
