//! Wire request assembly for the Bria generation endpoint.
//!
//! Each [`JobPayload`] variant maps to exactly one JSON body shape; the
//! spec's extra parameters are merged in last so callers can pass
//! backend-specific knobs (`model_version`, dimensions, ...) without this
//! crate knowing their names.

use serde_json::json;
use shotforge_core::{JobPayload, JobSpec};

use crate::api::BriaApiError;
use crate::assets::encode_image_to_base64;

/// A fully assembled generation request body, ready to submit.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    body: serde_json::Value,
}

impl GenerationRequest {
    /// Assemble the wire body for a job spec.
    ///
    /// Image-conditioned variants read and encode their source image here,
    /// which is the only I/O this function performs. Encoding failure is
    /// fatal for the job.
    pub async fn build(spec: &JobSpec) -> Result<Self, BriaApiError> {
        let mut body = match &spec.payload {
            JobPayload::Text { prompt } => json!({
                "prompt": prompt,
                "visual_output_content_moderation": false,
            }),
            JobPayload::Structured { structured_prompt } => json!({
                "structured_prompt": structured_prompt.to_wire_string(),
                "visual_output_content_moderation": false,
            }),
            JobPayload::Image { source } => {
                let image_data = encode_image_to_base64(source)
                    .await
                    .map_err(|e| BriaApiError::ImageEncoding(e.to_string()))?;
                json!({ "images": [image_data] })
            }
            JobPayload::ImageAndText { source, prompt } => {
                let image_data = encode_image_to_base64(source)
                    .await
                    .map_err(|e| BriaApiError::ImageEncoding(e.to_string()))?;
                json!({
                    "images": [image_data],
                    "prompt": prompt,
                    "visual_output_content_moderation": false,
                })
            }
            JobPayload::Refine {
                seed,
                structured_prompt,
                new_prompt,
            } => json!({
                "structured_prompt": structured_prompt.to_wire_string(),
                "seed": seed,
                "prompt": new_prompt,
                "visual_output_content_moderation": false,
            }),
        };

        // Extra params win over the variant's defaults.
        if let Some(map) = body.as_object_mut() {
            for (key, value) in &spec.params {
                map.insert(key.clone(), value.clone());
            }
        }

        Ok(Self { body })
    }

    /// The JSON body to POST.
    pub fn body(&self) -> &serde_json::Value {
        &self.body
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
