//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the thin agent and the streamer server:
//! - Logging and tracing setup
//! - Validated configuration for both processes
//! - Event bus for sync and library events
//!
//! ## Overview
//!
//! Nothing in this crate knows about files or libraries. It fixes the
//! conventions (log format and filtering, config validation messages, event
//! shapes) the domain crates build on.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
