//! # Host Bridge Traits
//!
//! Capability traits the agent and server cores depend on, implemented per
//! host by a bridge crate.
//!
//! ## Overview
//!
//! The sync pipeline never talks to `reqwest` or the system clock directly.
//! It receives trait objects instead, which keeps each stage testable with
//! scripted fakes:
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP with bounded timeouts and retry
//! - [`Clock`](time::Clock) - Time source used to stamp library versions
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to a host logger
//!
//! | Host | Implementation Crate |
//! |------|---------------------|
//! | Desktop / server | `bridge-desktop` |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! convert their native errors into it and keep the message actionable
//! (URL, status, timeout).
//!
//! ## Thread Safety
//!
//! Every trait requires `Send + Sync` so implementations can be shared across
//! tokio tasks behind an `Arc`.

pub mod error;
pub mod http;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
