//! # Sync Client
//!
//! Sends submissions and announces to the streamer server and maps replies
//! onto [`SubmitOutcome`] or a [`SyncError`].
//!
//! | Reply | Result |
//! |---|---|
//! | 2xx naming the submitted version | `Ok(Accepted)` |
//! | 2xx naming another version | `Err(Protocol)` |
//! | 409 `stale_version` | `Ok(Stale)` |
//! | 429, 5xx, timeout, connection failure | `Err(Transport)` |
//! | other 4xx | `Err(Rejected)` |
//!
//! Retries of transient failures happen inside the [`HttpClient`] according
//! to the configured [`RetryPolicy`]; this layer sees only the final answer.

use bridge_traits::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use core_library::{AnnounceRequest, StaleVersionReply, SubmissionPayload, SubmitReceipt};
use core_runtime::config::AgentConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SyncError};

const USER_AGENT: &str = concat!("thin-agent/", env!("CARGO_PKG_VERSION"));

/// Server answer to a submission that was understood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted(SubmitReceipt),
    /// The server already has `current_version` or newer.
    Stale { current_version: u64 },
}

pub struct SyncClient {
    http: Arc<dyn HttpClient>,
    submit_url: String,
    announce_url: String,
    timeout: Duration,
    retry_policy: RetryPolicy,
}

impl SyncClient {
    pub fn new(http: Arc<dyn HttpClient>, config: &AgentConfig) -> Self {
        Self {
            http,
            submit_url: config.submit_url(),
            announce_url: config.announce_url(),
            timeout: config.submit_timeout,
            retry_policy: config.retry_policy.clone(),
        }
    }

    async fn post<T: serde::Serialize>(&self, url: &str, body: &T) -> Result<HttpResponse> {
        let request = HttpRequest::post(url)
            .header("User-Agent", USER_AGENT)
            .json(body)
            .map_err(|e| SyncError::Protocol(e.to_string()))?
            .timeout(self.timeout);

        self.http
            .execute_with_retry(request, self.retry_policy.clone())
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))
    }

    /// POST one submission.
    #[instrument(
        skip(self, payload),
        fields(version = payload.library_version, replace = payload.replace, entries = payload.library.len())
    )]
    pub async fn submit(&self, payload: &SubmissionPayload) -> Result<SubmitOutcome> {
        let response = self.post(&self.submit_url, payload).await?;
        let outcome = interpret_submit_response(payload.library_version, &response)?;
        match &outcome {
            SubmitOutcome::Accepted(receipt) => info!(
                applied = receipt.applied,
                track_count = receipt.track_count,
                "Server accepted submission"
            ),
            SubmitOutcome::Stale { current_version } => {
                warn!(current_version, "Server reports a newer library version")
            }
        }
        Ok(outcome)
    }

    /// Tell the server where this agent serves files from.
    pub async fn announce(&self, user_id: &str, base_url: &str) -> Result<()> {
        let body = AnnounceRequest {
            user_id: user_id.to_string(),
            base_url: base_url.to_string(),
        };
        let response = self.post(&self.announce_url, &body).await?;
        if response.is_success() {
            debug!(base_url, "Announced file server");
            Ok(())
        } else {
            Err(status_error(&response))
        }
    }
}

fn body_text(response: &HttpResponse) -> String {
    response
        .text()
        .unwrap_or_else(|_| format!("<{} bytes>", response.body.len()))
}

fn status_error(response: &HttpResponse) -> SyncError {
    if response.status == 429 || response.is_server_error() {
        SyncError::Transport(format!("server returned {}", response.status))
    } else {
        SyncError::Rejected {
            status: response.status,
            message: body_text(response),
        }
    }
}

/// Map a reply to a submission stamped with `submitted_version`.
pub fn interpret_submit_response(
    submitted_version: u64,
    response: &HttpResponse,
) -> Result<SubmitOutcome> {
    if response.is_success() {
        let receipt: SubmitReceipt = response
            .json()
            .map_err(|e| SyncError::Protocol(format!("unreadable receipt: {}", e)))?;
        if !receipt.ok || receipt.accepted_version != submitted_version {
            return Err(SyncError::Protocol(format!(
                "receipt names version {} but {} was submitted",
                receipt.accepted_version, submitted_version
            )));
        }
        return Ok(SubmitOutcome::Accepted(receipt));
    }

    if response.status == 409 {
        if let Ok(reply) = response.json::<StaleVersionReply>() {
            if reply.error == StaleVersionReply::ERROR_CODE {
                return Ok(SubmitOutcome::Stale {
                    current_version: reply.current_version,
                });
            }
        }
    }

    Err(status_error(response))
}
