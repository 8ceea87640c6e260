//! Status polling state machine for submitted jobs.
//!
//! [`poll_for_status`] drives one job handle from submission to a terminal
//! state: `Completed`, `Failed` (backend-reported), or `TimedOut` (local
//! deadline; the remote job is left running). Between queries the loop
//! suspends on a timer — the only yield point — so many poll loops
//! interleave on one runtime without blocking each other.

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use shotforge_core::{ResultPayload, StructuredPrompt};

use crate::api::BriaApiError;
use crate::assets::save_image_bytes;
use crate::backend::GenerationBackend;

/// Tunable parameters for one poll loop.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Time between status queries.
    pub interval: Duration,
    /// Wall-clock deadline measured from the start of the loop.
    pub deadline: Duration,
    /// Where to save the downloaded asset; `None` skips the download.
    pub download_dir: Option<PathBuf>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            deadline: Duration::from_secs(300),
            download_dir: Some(PathBuf::from("generated_images")),
        }
    }
}

/// Terminal result of one poll loop.
#[derive(Debug)]
pub enum PollOutcome {
    /// The backend finished the job; post-processing is already done.
    Completed(ResultPayload),
    /// The backend explicitly reported failure.
    Failed { detail: String },
    /// The local deadline elapsed; the remote job was not cancelled.
    TimedOut,
    /// The caller's cancellation token fired mid-loop.
    Cancelled,
}

/// Poll a job handle until it reaches a terminal state.
///
/// Transport failures on the status query propagate as `Err` — the caller
/// classifies them. Backend-reported errors and timeouts are ordinary
/// [`PollOutcome`] values.
pub async fn poll_for_status(
    backend: &dyn GenerationBackend,
    request_id: &str,
    config: &PollConfig,
    cancel: &CancellationToken,
) -> Result<PollOutcome, BriaApiError> {
    let started = tokio::time::Instant::now();
    tracing::info!(request_id, "Polling for job status");

    loop {
        let status = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(request_id, "Poll loop cancelled");
                return Ok(PollOutcome::Cancelled);
            }
            result = backend.get_status(request_id) => result?,
        };

        tracing::debug!(request_id, status = %status.status, "Status tick");

        if status.is_error() {
            let detail = status.error_detail();
            tracing::error!(request_id, error = %detail, "Job failed on the backend");
            return Ok(PollOutcome::Failed { detail });
        }

        if status.is_completed() {
            return match status.result {
                Some(result) => Ok(PollOutcome::Completed(
                    finalize_result(backend, request_id, config, result).await,
                )),
                None => {
                    tracing::error!(request_id, "COMPLETED status without a result payload");
                    Ok(PollOutcome::Failed {
                        detail: "completed without a result payload".to_string(),
                    })
                }
            };
        }

        if started.elapsed() > config.deadline {
            tracing::error!(
                request_id,
                deadline_secs = config.deadline.as_secs(),
                "Job timed out; abandoning the poll loop"
            );
            return Ok(PollOutcome::TimedOut);
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(request_id, "Poll loop cancelled");
                return Ok(PollOutcome::Cancelled);
            }
            _ = tokio::time::sleep(config.interval) => {}
        }
    }
}

/// Post-process a completed job: normalize the structured prompt and
/// download the asset.
///
/// Neither step is allowed to fail the job — a malformed embedded
/// structured prompt is kept as its raw string, and a failed download just
/// leaves `saved_path` empty.
async fn finalize_result(
    backend: &dyn GenerationBackend,
    request_id: &str,
    config: &PollConfig,
    result: crate::api::StatusResult,
) -> ResultPayload {
    let structured_prompt = match result.structured_prompt {
        Some(sp) => {
            let normalized = sp.normalized();
            if normalized.is_raw() {
                tracing::warn!(
                    request_id,
                    "structured_prompt is not valid JSON; leaving as string"
                );
            }
            normalized
        }
        None => StructuredPrompt::Json(serde_json::Value::Null),
    };

    let saved_path = match &config.download_dir {
        Some(dir) => match backend.fetch_asset(&result.image_url).await {
            Ok(bytes) => match save_image_bytes(dir, request_id, &bytes).await {
                Ok(path) => Some(path.display().to_string()),
                Err(e) => {
                    tracing::warn!(request_id, error = %e, "Failed to save generated asset");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(request_id, error = %e, "Failed to download generated asset");
                None
            }
        },
        None => None,
    };

    tracing::info!(request_id, "Job completed");

    ResultPayload {
        image_url: result.image_url,
        seed: result.seed,
        structured_prompt,
        saved_path,
        request_id: request_id.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
