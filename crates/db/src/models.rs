//! Record types for the `generated_images` table.

use serde::{Deserialize, Serialize};
use shotforge_core::{JobSpec, ResultPayload, StructuredPrompt};

/// One persisted initial generation: the originating spec (inputs) tied to
/// the result payload (outputs), keyed by the backend request id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImageRecord {
    /// Shot label within the batch (`hero`, `detail`, ...).
    pub shot_type: String,
    /// The spec that produced this image, kept whole for traceability.
    pub spec: JobSpec,
    /// What the backend produced.
    pub result: ResultPayload,
}

/// Provenance of a refinement: which seed and description it started from,
/// and the instruction that overrode them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementData {
    pub previous_seed: i64,
    pub previous_structured_prompt: StructuredPrompt,
    pub new_prompt: String,
}

/// One persisted variant refinement, appended to its base image's row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantRecord {
    pub variant_label: String,
    /// Version of the variant vocabulary in effect when this record was
    /// written.
    pub registry_version: String,
    pub refinement_data: RefinementData,
    pub result: ResultPayload,
}
