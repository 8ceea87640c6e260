//! Fan-out of job specs across task runners under one shared gate.
//!
//! [`BatchCoordinator`] is constructed once at startup with its
//! collaborators injected — no process-wide singletons — and can run any
//! number of batches. A batch never short-circuits: every spec gets exactly
//! one outcome, in input order, whatever happened to its siblings.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use shotforge_bria::GenerationBackend;
use shotforge_core::variants::VariantDescriptor;
use shotforge_core::{CoreError, ErrorKind, JobPayload, JobSpec, StructuredPrompt, TaskOutcome};
use shotforge_db::ImageStore;

use crate::config::BatchConfig;
use crate::gate::ConcurrencyGate;
use crate::runner::{run_task, PersistTarget};

/// Injected collaborators shared by every runner.
#[derive(Clone)]
pub struct BatchDeps {
    pub backend: Arc<dyn GenerationBackend>,
    pub store: Arc<dyn ImageStore>,
}

/// A completed base image that variant refinements build on.
#[derive(Debug, Clone)]
pub struct RefinementBase {
    /// Backend request id of the base image's record.
    pub request_id: String,
    /// Seed the base image was generated with.
    pub seed: i64,
    /// Structured description of the base image.
    pub structured_prompt: StructuredPrompt,
}

/// One requested refinement in a variant fan-out.
#[derive(Debug, Clone)]
pub struct VariantRequest {
    pub label: String,
    pub description: String,
}

impl From<&VariantDescriptor> for VariantRequest {
    fn from(d: &VariantDescriptor) -> Self {
        Self {
            label: d.label.to_string(),
            description: d.description.to_string(),
        }
    }
}

/// Orchestrates batches of generation jobs.
pub struct BatchCoordinator {
    deps: BatchDeps,
    config: BatchConfig,
    gate: ConcurrencyGate,
}

impl BatchCoordinator {
    /// Build a coordinator. Rejects invalid configuration before any job
    /// can start.
    pub fn new(deps: BatchDeps, config: BatchConfig) -> Result<Self, CoreError> {
        config.validate()?;
        let gate = ConcurrencyGate::new(config.max_concurrency)?;
        Ok(Self { deps, config, gate })
    }

    /// Run one runner per spec concurrently and collect every outcome.
    ///
    /// Returns an error only for batch-level misuse detected before any
    /// job starts (duplicate labels). The result always has exactly one
    /// outcome per spec, in input order.
    pub async fn run_batch(
        &self,
        specs: Vec<JobSpec>,
        cancel: &CancellationToken,
    ) -> Result<Vec<TaskOutcome>, CoreError> {
        Self::check_unique_labels(&specs)?;
        tracing::info!(count = specs.len(), "Starting generation batch");

        let outcomes = self
            .spawn_and_collect(specs, PersistTarget::Insert, cancel)
            .await;

        tracing::info!(
            total = outcomes.len(),
            successful = outcomes.iter().filter(|o| o.is_ok()).count(),
            "Batch finished"
        );
        Ok(outcomes)
    }

    /// Variant fan-out: one refinement runner per variant against the same
    /// base image, results appended to the base record.
    pub async fn run_variant_batch(
        &self,
        base: &RefinementBase,
        variants: &[VariantRequest],
        cancel: &CancellationToken,
    ) -> Result<Vec<TaskOutcome>, CoreError> {
        let specs: Vec<JobSpec> = variants
            .iter()
            .map(|v| {
                JobSpec::new(
                    v.label.clone(),
                    JobPayload::Refine {
                        seed: base.seed,
                        structured_prompt: base.structured_prompt.clone(),
                        new_prompt: v.description.clone(),
                    },
                )
            })
            .collect();
        Self::check_unique_labels(&specs)?;

        tracing::info!(
            base_request_id = %base.request_id,
            count = specs.len(),
            "Starting variant batch"
        );

        let target = PersistTarget::AttachTo {
            base_request_id: base.request_id.clone(),
        };
        Ok(self.spawn_and_collect(specs, target, cancel).await)
    }

    // ---- private helpers ----

    /// Spawn one runner task per spec and await them all.
    ///
    /// A runner that panics is converted into an `unhandled` outcome for
    /// its label; siblings are unaffected.
    async fn spawn_and_collect(
        &self,
        specs: Vec<JobSpec>,
        target: PersistTarget,
        cancel: &CancellationToken,
    ) -> Vec<TaskOutcome> {
        let handles: Vec<(String, tokio::task::JoinHandle<TaskOutcome>)> = specs
            .into_iter()
            .map(|spec| {
                let label = spec.label.clone();
                let handle = tokio::spawn(run_task(
                    spec,
                    self.deps.clone(),
                    self.gate.clone(),
                    self.config.clone(),
                    target.clone(),
                    cancel.clone(),
                ));
                (label, handle)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (label, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => {
                    tracing::error!(label = %label, "Runner task panicked");
                    TaskOutcome::error(label, ErrorKind::Unhandled, "task panicked")
                }
                Err(_) => TaskOutcome::error(label, ErrorKind::Unhandled, "task aborted"),
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Labels must be unique within one batch; a duplicate is batch-level
    /// misuse, rejected before any job starts.
    fn check_unique_labels(specs: &[JobSpec]) -> Result<(), CoreError> {
        let mut seen = std::collections::HashSet::with_capacity(specs.len());
        for spec in specs {
            if !seen.insert(spec.label.as_str()) {
                return Err(CoreError::Validation(format!(
                    "Duplicate job label in batch: \"{}\"",
                    spec.label
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
