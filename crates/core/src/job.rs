//! Job specifications and generation request payload variants.
//!
//! A [`JobSpec`] is one requested unit of work: a label unique within its
//! batch, exactly one [`JobPayload`] variant, and free-form extra parameters
//! merged into the backend request body (e.g. `model_version`).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Maximum length of a job label.
const MAX_LABEL_LEN: usize = 128;

// ---------------------------------------------------------------------------
// StructuredPrompt
// ---------------------------------------------------------------------------

/// A structured scene description as the backend understands it.
///
/// The backend transmits structured prompts as JSON-encoded strings, and
/// sometimes returns them that way too. `Raw` preserves a string form that
/// could not be (or has not yet been) decoded; decoding failure is never
/// fatal, the raw string is kept verbatim.
///
/// Untagged variant order matters: a JSON string must deserialize as `Raw`
/// so [`StructuredPrompt::normalized`] gets a chance to decode it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StructuredPrompt {
    /// Undecoded (or undecodable) string form, preserved as received.
    Raw(String),
    /// Decoded structured form.
    Json(serde_json::Value),
}

impl StructuredPrompt {
    /// Serialize to the string form the backend expects on the wire.
    pub fn to_wire_string(&self) -> String {
        match self {
            StructuredPrompt::Json(value) => value.to_string(),
            StructuredPrompt::Raw(raw) => raw.clone(),
        }
    }

    /// Normalize a string form into the decoded variant when possible.
    ///
    /// Returns `Raw` unchanged if the string is not valid JSON; the caller
    /// decides whether to log. `Json` values pass through untouched.
    pub fn normalized(self) -> Self {
        match self {
            StructuredPrompt::Raw(raw) => match serde_json::from_str(&raw) {
                Ok(value) => StructuredPrompt::Json(value),
                Err(_) => StructuredPrompt::Raw(raw),
            },
            json => json,
        }
    }

    /// Whether this prompt is still in undecoded string form.
    pub fn is_raw(&self) -> bool {
        matches!(self, StructuredPrompt::Raw(_))
    }
}

// ---------------------------------------------------------------------------
// ImageSource
// ---------------------------------------------------------------------------

/// Where a conditioning image comes from: a remote URL or a local file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImageSource {
    Url(String),
    File(PathBuf),
}

impl ImageSource {
    /// Classify a source string: anything starting with `http://` or
    /// `https://` is treated as a URL, everything else as a local path.
    pub fn parse(source: &str) -> Self {
        if source.starts_with("http://") || source.starts_with("https://") {
            ImageSource::Url(source.to_string())
        } else {
            ImageSource::File(PathBuf::from(source))
        }
    }
}

// ---------------------------------------------------------------------------
// JobPayload
// ---------------------------------------------------------------------------

/// The request variant sent to the generation backend.
///
/// Exactly one variant per job; the keys present in the wire payload are
/// determined by the variant, never guessed from an untyped map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    /// Plain text-to-image prompt.
    Text { prompt: String },

    /// Structured scene description.
    Structured { structured_prompt: StructuredPrompt },

    /// Image-conditioned generation from a source image.
    Image { source: ImageSource },

    /// Image-conditioned generation guided by a text prompt.
    ImageAndText { source: ImageSource, prompt: String },

    /// Refinement of a previous result: reuse its seed and structured
    /// description, overridden with a new instruction.
    Refine {
        seed: i64,
        structured_prompt: StructuredPrompt,
        new_prompt: String,
    },
}

impl JobPayload {
    /// Validate the payload before any network call is made.
    ///
    /// Empty prompts are rejected here so they surface as `input_error`
    /// outcomes rather than backend round-trips.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            JobPayload::Text { prompt } if prompt.trim().is_empty() => Err(
                CoreError::Validation("empty prompt".to_string()),
            ),
            JobPayload::ImageAndText { prompt, .. } if prompt.trim().is_empty() => Err(
                CoreError::Validation("empty prompt".to_string()),
            ),
            JobPayload::Refine { new_prompt, .. } if new_prompt.trim().is_empty() => Err(
                CoreError::Validation("empty refinement prompt".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// JobSpec
// ---------------------------------------------------------------------------

/// One requested unit of work, consumed by exactly one task runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Opaque identifier for the job within its batch (shot type or
    /// variant label). Unique per batch.
    pub label: String,
    /// The request variant to send.
    pub payload: JobPayload,
    /// Extra backend-specific parameters merged into the request body.
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl JobSpec {
    /// Create a spec with no extra parameters.
    pub fn new(label: impl Into<String>, payload: JobPayload) -> Self {
        Self {
            label: label.into(),
            payload,
            params: serde_json::Map::new(),
        }
    }

    /// Add an extra backend parameter (builder style).
    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Validate the spec before submission.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.label.is_empty() {
            return Err(CoreError::Validation(
                "Job label must not be empty".to_string(),
            ));
        }
        if self.label.len() > MAX_LABEL_LEN {
            return Err(CoreError::Validation(format!(
                "Job label must not exceed {MAX_LABEL_LEN} characters"
            )));
        }
        self.payload.validate()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    // -- StructuredPrompt -----------------------------------------------------

    #[test]
    fn wire_string_from_json_value() {
        let sp = StructuredPrompt::Json(serde_json::json!({"lighting": "softbox"}));
        assert_eq!(sp.to_wire_string(), r#"{"lighting":"softbox"}"#);
    }

    #[test]
    fn wire_string_from_raw_passes_through() {
        let sp = StructuredPrompt::Raw("not json at all".to_string());
        assert_eq!(sp.to_wire_string(), "not json at all");
    }

    #[test]
    fn normalize_decodes_valid_json_string() {
        let sp = StructuredPrompt::Raw(r#"{"mood": "serene"}"#.to_string()).normalized();
        assert_eq!(
            sp,
            StructuredPrompt::Json(serde_json::json!({"mood": "serene"}))
        );
    }

    #[test]
    fn json_string_deserializes_as_raw() {
        let sp: StructuredPrompt =
            serde_json::from_value(serde_json::json!("{\"mood\":\"serene\"}")).unwrap();
        assert_matches!(sp, StructuredPrompt::Raw(_));
        assert!(!sp.normalized().is_raw());
    }

    #[test]
    fn json_object_deserializes_as_json() {
        let sp: StructuredPrompt =
            serde_json::from_value(serde_json::json!({"mood": "serene"})).unwrap();
        assert_matches!(sp, StructuredPrompt::Json(_));
    }

    #[test]
    fn normalize_keeps_malformed_string_verbatim() {
        let sp = StructuredPrompt::Raw("{broken".to_string()).normalized();
        assert_eq!(sp, StructuredPrompt::Raw("{broken".to_string()));
        assert!(sp.is_raw());
    }

    // -- ImageSource ----------------------------------------------------------

    #[test]
    fn parse_classifies_urls() {
        assert_matches!(
            ImageSource::parse("https://example.com/a.png"),
            ImageSource::Url(_)
        );
        assert_matches!(
            ImageSource::parse("http://example.com/a.png"),
            ImageSource::Url(_)
        );
    }

    #[test]
    fn parse_classifies_local_paths() {
        assert_matches!(
            ImageSource::parse("./input_images/drawing.png"),
            ImageSource::File(_)
        );
    }

    // -- validation -----------------------------------------------------------

    #[test]
    fn empty_text_prompt_rejected() {
        let spec = JobSpec::new(
            "hero",
            JobPayload::Text {
                prompt: "  ".to_string(),
            },
        );
        assert!(spec.validate().is_err());
    }

    #[test]
    fn empty_refinement_prompt_rejected() {
        let payload = JobPayload::Refine {
            seed: 42,
            structured_prompt: StructuredPrompt::Raw("{}".to_string()),
            new_prompt: String::new(),
        };
        assert!(payload.validate().is_err());
    }

    #[test]
    fn empty_label_rejected() {
        let spec = JobSpec::new(
            "",
            JobPayload::Text {
                prompt: "a handbag on marble".to_string(),
            },
        );
        assert!(spec.validate().is_err());
    }

    #[test]
    fn valid_spec_accepted() {
        let spec = JobSpec::new(
            "hero",
            JobPayload::Text {
                prompt: "a handbag on marble".to_string(),
            },
        )
        .with_param("model_version", serde_json::json!("FIBO"));
        assert!(spec.validate().is_ok());
        assert_eq!(spec.params["model_version"], "FIBO");
    }

    #[test]
    fn structured_payload_needs_no_prompt() {
        let payload = JobPayload::Structured {
            structured_prompt: StructuredPrompt::Json(serde_json::json!({})),
        };
        assert!(payload.validate().is_ok());
    }
}
