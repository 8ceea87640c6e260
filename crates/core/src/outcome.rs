//! Per-job outcomes and the batch error taxonomy.
//!
//! Every job produces exactly one [`TaskOutcome`], success or failure, no
//! matter what went wrong. Errors are data here — nothing propagates across
//! job boundaries as a panic or a bubbled `Err`.

use serde::{Deserialize, Serialize};

use crate::job::{JobSpec, StructuredPrompt};

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Classification of per-job failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The spec was rejected before any network call (e.g. empty prompt).
    InputError,
    /// The backend explicitly reported failure for a submitted job.
    ApiError,
    /// The per-job deadline elapsed while submitting or polling.
    Timeout,
    /// The generation succeeded but persisting the record failed.
    DbError,
    /// Anything else, caught defensively at the runner boundary.
    Unhandled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::InputError => "input_error",
            ErrorKind::ApiError => "api_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::DbError => "db_error",
            ErrorKind::Unhandled => "unhandled",
        };
        f.write_str(s)
    }
}

/// A classified per-job failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskError {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ResultPayload
// ---------------------------------------------------------------------------

/// What a completed generation job produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    /// Backend-hosted asset URL.
    pub image_url: String,
    /// Seed used for the generation; reusable for refinement.
    pub seed: i64,
    /// Structured description of what was generated, normalized to JSON
    /// form when the backend's embedded string decodes cleanly.
    pub structured_prompt: StructuredPrompt,
    /// Local path the asset was downloaded to, when download succeeded.
    pub saved_path: Option<String>,
    /// Backend request id the result belongs to.
    pub request_id: String,
}

// ---------------------------------------------------------------------------
// TaskOutcome
// ---------------------------------------------------------------------------

/// The single, immutable record of one job's fate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TaskOutcome {
    /// The job completed and its record was persisted.
    Ok {
        label: String,
        data: ResultPayload,
        /// The originating spec, kept for traceability.
        spec: JobSpec,
    },
    /// The job failed; `error.kind` says at which stage.
    Error { label: String, error: TaskError },
}

impl TaskOutcome {
    /// Build a failure outcome.
    pub fn error(label: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        TaskOutcome::Error {
            label: label.into(),
            error: TaskError::new(kind, message),
        }
    }

    /// The label of the spec this outcome belongs to.
    pub fn label(&self) -> &str {
        match self {
            TaskOutcome::Ok { label, .. } | TaskOutcome::Error { label, .. } => label,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, TaskOutcome::Ok { .. })
    }

    /// The error kind, if this outcome is a failure.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            TaskOutcome::Ok { .. } => None,
            TaskOutcome::Error { error, .. } => Some(error.kind),
        }
    }
}

// ---------------------------------------------------------------------------
// BatchSummary
// ---------------------------------------------------------------------------

/// Trivial aggregation reported to the batch caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

impl BatchSummary {
    /// Count successes and failures over a batch result.
    pub fn from_outcomes(outcomes: &[TaskOutcome]) -> Self {
        let successful = outcomes.iter().filter(|o| o.is_ok()).count();
        Self {
            total: outcomes.len(),
            successful,
            failed: outcomes.len() - successful,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
