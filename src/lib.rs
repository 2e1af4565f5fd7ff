//! Workspace placeholder crate.
//!
//! This crate exists to expose feature flags that map to the individual
//! workspace crates. `agent` pulls in the scanning/sync pipeline and the
//! `thin-agent` binary crate; `server` pulls in the library reconciler and the
//! `streamer-server` HTTP surface. Host tooling can depend on
//! `radiotiker-workspace` without wiring each crate individually.

#[cfg(feature = "agent")]
pub use core_sync;
#[cfg(feature = "agent")]
pub use thin_agent;

#[cfg(feature = "server")]
pub use core_library;
#[cfg(feature = "server")]
pub use streamer_server;
