//! One job's full lifecycle: gate slot, submission, polling, persistence.
//!
//! [`run_task`] never returns an error and never panics on a job's behalf —
//! every failure mode is folded into the returned
//! [`TaskOutcome`](shotforge_core::TaskOutcome) so sibling jobs are
//! untouched. The gate slot is an owned permit dropped on every path out,
//! including unwinds.

use tokio_util::sync::CancellationToken;

use shotforge_bria::{poll_for_status, GenerationBackend, GenerationRequest, PollOutcome};
use shotforge_bria::api::BriaApiError;
use shotforge_core::{ErrorKind, JobPayload, JobSpec, ResultPayload, TaskOutcome};
use shotforge_db::{GeneratedImageRecord, ImageStore, RefinementData, StoreError, VariantRecord};

use crate::batch::BatchDeps;
use crate::config::BatchConfig;
use crate::gate::ConcurrencyGate;

/// Where a successful job's record goes.
#[derive(Debug, Clone)]
pub enum PersistTarget {
    /// New row per job (initial shots).
    Insert,
    /// Append to an existing base image's row (variant refinements).
    AttachTo { base_request_id: String },
}

/// Run one job spec to its single, final outcome.
///
/// The generation itself is not retried on any failure: a timed-out or
/// backend-failed job is reported as such, and a persistence failure after
/// a successful generation is a `db_error` — the external side effect
/// already happened, only the record of it is missing.
pub async fn run_task(
    spec: JobSpec,
    deps: BatchDeps,
    gate: ConcurrencyGate,
    config: BatchConfig,
    target: PersistTarget,
    cancel: CancellationToken,
) -> TaskOutcome {
    let label = spec.label.clone();

    // Reject invalid specs before taking a slot or touching the network.
    if let Err(e) = spec.validate() {
        tracing::error!(label = %label, error = %e, "Skipping job: invalid spec");
        return TaskOutcome::error(label, ErrorKind::InputError, e.to_string());
    }

    tracing::info!(label = %label, "Waiting for a generation slot");
    let _permit = tokio::select! {
        _ = cancel.cancelled() => {
            tracing::info!(label = %label, "Cancelled while waiting for a slot");
            return TaskOutcome::error(label, ErrorKind::Unhandled, "cancelled before start");
        }
        permit = gate.acquire() => permit,
    };

    tracing::info!(label = %label, "Generating image");

    let poll_outcome = match tokio::time::timeout(
        config.per_job_timeout,
        submit_and_poll(&spec, deps.backend.as_ref(), &config, &cancel),
    )
    .await
    {
        Err(_elapsed) => {
            tracing::error!(
                label = %label,
                timeout_secs = config.per_job_timeout.as_secs(),
                "Job exceeded its per-job timeout"
            );
            return TaskOutcome::error(
                label,
                ErrorKind::Timeout,
                format!(
                    "did not complete within {}s",
                    config.per_job_timeout.as_secs()
                ),
            );
        }
        Ok(Err(e)) => {
            tracing::error!(label = %label, error = %e, "Unhandled failure during generation");
            return TaskOutcome::error(label, ErrorKind::Unhandled, e.to_string());
        }
        Ok(Ok(outcome)) => outcome,
    };

    let data = match poll_outcome {
        PollOutcome::Completed(data) => data,
        PollOutcome::Failed { detail } => {
            tracing::error!(label = %label, error = %detail, "Backend reported failure");
            return TaskOutcome::error(label, ErrorKind::ApiError, detail);
        }
        PollOutcome::TimedOut => {
            tracing::error!(
                label = %label,
                deadline_secs = config.poll.deadline.as_secs(),
                "Polling deadline exceeded"
            );
            return TaskOutcome::error(
                label,
                ErrorKind::Timeout,
                format!("did not complete within {}s", config.poll.deadline.as_secs()),
            );
        }
        PollOutcome::Cancelled => {
            tracing::info!(label = %label, "Job cancelled mid-poll");
            return TaskOutcome::error(label, ErrorKind::Unhandled, "cancelled");
        }
    };

    if let Err(e) = persist(&spec, &data, &target, deps.store.as_ref()).await {
        tracing::error!(label = %label, error = %e, "Failed to persist generation record");
        return TaskOutcome::error(label, ErrorKind::DbError, e.to_string());
    }

    tracing::info!(label = %label, request_id = %data.request_id, "Generation completed");

    // Optional pacing between jobs, on top of the concurrency cap.
    if !config.pacing_delay.is_zero() {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(config.pacing_delay) => {}
        }
    }

    TaskOutcome::Ok { label, data, spec }
}

/// Build the request, submit it, and poll to a terminal state.
///
/// Any transport-level failure (submission 4xx/5xx, status query error,
/// image encoding) bubbles as `Err` for the caller to classify.
async fn submit_and_poll(
    spec: &JobSpec,
    backend: &dyn GenerationBackend,
    config: &BatchConfig,
    cancel: &CancellationToken,
) -> Result<PollOutcome, BriaApiError> {
    let request = GenerationRequest::build(spec).await?;
    let submitted = backend.submit(request.body()).await?;

    tracing::info!(
        label = %spec.label,
        request_id = %submitted.request_id,
        "Job submitted"
    );

    poll_for_status(backend, &submitted.request_id, &config.poll, cancel).await
}

/// Build the persistence envelope and hand it to the store.
async fn persist(
    spec: &JobSpec,
    data: &ResultPayload,
    target: &PersistTarget,
    store: &dyn ImageStore,
) -> Result<(), StoreError> {
    match target {
        PersistTarget::Insert => {
            let record = GeneratedImageRecord {
                shot_type: spec.label.clone(),
                spec: spec.clone(),
                result: data.clone(),
            };
            store.insert_generated(&record).await
        }
        PersistTarget::AttachTo { base_request_id } => {
            let refinement_data = match &spec.payload {
                JobPayload::Refine {
                    seed,
                    structured_prompt,
                    new_prompt,
                } => RefinementData {
                    previous_seed: *seed,
                    previous_structured_prompt: structured_prompt.clone(),
                    new_prompt: new_prompt.clone(),
                },
                _ => {
                    return Err(StoreError::Serialization(
                        "variant persistence requires a refinement payload".to_string(),
                    ))
                }
            };
            let record = VariantRecord {
                variant_label: spec.label.clone(),
                registry_version: shotforge_core::variants::REGISTRY_VERSION.to_string(),
                refinement_data,
                result: data.clone(),
            };
            store.attach_variant(base_request_id, &record).await
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
