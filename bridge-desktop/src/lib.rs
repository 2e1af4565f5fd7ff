//! # Desktop Bridge Implementations
//!
//! Implementations of the bridge traits for hosts with a full tokio runtime
//! (the thin agent on a desktop, and the streamer server).
//!
//! ## Overview
//!
//! - [`ReqwestHttpClient`] implements `HttpClient` on top of `reqwest`, with
//!   connection pooling, per-request timeouts and exponential backoff on
//!   `5xx`/`429` responses.
//!
//! Clocks need no host specifics; use `SystemClock` from `bridge-traits`
//! directly.
//!
//! ## Usage
//!
//! ```ignore
//! use std::time::Duration;
//! use bridge_desktop::ReqwestHttpClient;
//! use bridge_traits::{HttpClient, HttpRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ReqwestHttpClient::with_timeout(Duration::from_secs(10))?;
//!     let response = client
//!         .execute(HttpRequest::get("http://localhost:8080/api/health"))
//!         .await?;
//!     assert!(response.is_success());
//!     Ok(())
//! }
//! ```

mod http;

pub use http::ReqwestHttpClient;
