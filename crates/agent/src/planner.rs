//! Gemini-backed shot planner.
//!
//! One blocking `generateContent` call produces a JSON object mapping shot
//! labels to `{prompt, reasoning}` pairs. The response text is parsed
//! strictly — an empty or unparseable response fails the attempt so the
//! retry wrapper can try again.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;

use shotforge_core::{retry_with_backoff, JobPayload, JobSpec, RetryError, RetryPolicy};

/// Default model used for planning.
const DEFAULT_MODEL: &str = "gemini-2.5-pro";

/// Default Gemini API endpoint.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// The four shot styles every plan must cover.
const REQUIRED_SHOTS: [&str; 4] = ["hero", "detail", "environment", "flatlay"];

const SYSTEM_INSTRUCTION: &str = "\
You write prompts for an AI product-photography model. Respond with a JSON \
object whose keys are shot labels and whose values are objects with a \
\"prompt\" and a \"reasoning\" field. Prompts must describe subject, style, \
colors, and composition in vivid, concrete detail.";

/// One planned shot: the generation prompt plus the planner's reasoning.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ShotPrompt {
    pub prompt: String,
    #[serde(default)]
    pub reasoning: String,
}

/// A full plan: shot label -> prompt, one entry per required shot style.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ShotPlan {
    pub shots: BTreeMap<String, ShotPrompt>,
}

impl ShotPlan {
    /// Convert the plan into job specs, one text-prompt job per shot.
    pub fn to_specs(&self) -> Vec<JobSpec> {
        self.shots
            .iter()
            .map(|(label, shot)| {
                JobSpec::new(
                    label.clone(),
                    JobPayload::Text {
                        prompt: shot.prompt.clone(),
                    },
                )
            })
            .collect()
    }
}

/// Errors from the planning call.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Planner API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Planner returned no candidates")]
    EmptyResponse,

    #[error("Failed to parse plan: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Blocking client for the planning model.
pub struct PlannerClient {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl PlannerClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key,
        }
    }

    /// Override the endpoint (tests, proxies).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Produce shot prompts for a vision statement and reference image.
    ///
    /// Blocks on the network; see the crate docs for how to call this from
    /// async code.
    pub fn plan(&self, vision: &str, image_bytes: &[u8]) -> Result<ShotPlan, PlannerError> {
        let body = build_request_body(vision, image_bytes);
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        tracing::info!(model = %self.model, vision_len = vision.len(), "Requesting shot plan");

        let response = self.client.post(&url).json(&body).send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(PlannerError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let response_body: serde_json::Value = response.json()?;
        parse_plan(&response_body)
    }

    /// [`plan`](Self::plan) wrapped in bounded retry with backoff.
    ///
    /// Exhausted retries come back as a structured [`RetryError`] value,
    /// never a panic.
    pub fn plan_with_retry(
        &self,
        policy: &RetryPolicy,
        vision: &str,
        image_bytes: &[u8],
    ) -> Result<ShotPlan, RetryError> {
        retry_with_backoff(policy, "plan", || self.plan(vision, image_bytes))
    }
}

/// Assemble the `generateContent` request body: reference image inline,
/// vision statement as text, JSON response forced.
fn build_request_body(vision: &str, image_bytes: &[u8]) -> serde_json::Value {
    let user_text = format!(
        "Based on the following theme/vision statement generate a set of detailed \
image prompts suitable for an AI image generation model.\n\
The required shot labels are:\n\
1. hero: a striking, dynamic image capturing the essence of the vision.\n\
2. detail: a close-up focusing on details.\n\
3. environment: the subject within a relevant, immersive environment.\n\
4. flatlay: a top-down view in a styled arrangement.\n\
VISION: {vision}\n\
Use the reference image to inform the style and composition of every prompt."
    );

    serde_json::json!({
        "system_instruction": {
            "parts": [{"text": SYSTEM_INSTRUCTION}]
        },
        "contents": [{
            "role": "user",
            "parts": [
                {"inline_data": {"mime_type": "image/jpeg", "data": BASE64.encode(image_bytes)}},
                {"text": user_text},
            ]
        }],
        "generationConfig": {
            "response_mime_type": "application/json"
        }
    })
}

/// Extract and validate the plan from a `generateContent` response.
fn parse_plan(response: &serde_json::Value) -> Result<ShotPlan, PlannerError> {
    let text = response["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .ok_or(PlannerError::EmptyResponse)?;

    let plan: ShotPlan =
        serde_json::from_str(text).map_err(|e| PlannerError::Parse(e.to_string()))?;

    for required in REQUIRED_SHOTS {
        if !plan.shots.contains_key(required) {
            return Err(PlannerError::Parse(format!(
                "plan is missing the \"{required}\" shot"
            )));
        }
    }
    for (label, shot) in &plan.shots {
        if shot.prompt.trim().is_empty() {
            return Err(PlannerError::Parse(format!(
                "empty prompt for shot \"{label}\""
            )));
        }
    }

    Ok(plan)
}

/// Read reference image bytes from a local path or an http(s) URL.
///
/// Blocking, like the planner itself.
pub fn read_image_bytes(source: &str) -> Result<Vec<u8>, PlannerError> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let response = reqwest::blocking::get(source)?.error_for_status()?;
        Ok(response.bytes()?.to_vec())
    } else {
        Ok(std::fs::read(source)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn gemini_response(plan_text: &str) -> serde_json::Value {
        serde_json::json!({
            "candidates": [{
                "content": {
                    "parts": [{"text": plan_text}]
                }
            }]
        })
    }

    fn full_plan_text() -> String {
        serde_json::json!({
            "hero": {"prompt": "hero shot", "reasoning": "captures essence"},
            "detail": {"prompt": "macro detail", "reasoning": "texture"},
            "environment": {"prompt": "in a loft", "reasoning": "context"},
            "flatlay": {"prompt": "top-down spread", "reasoning": "styling"},
        })
        .to_string()
    }

    #[test]
    fn parses_complete_plan() {
        let plan = parse_plan(&gemini_response(&full_plan_text())).unwrap();
        assert_eq!(plan.shots.len(), 4);
        assert_eq!(plan.shots["hero"].prompt, "hero shot");
        assert_eq!(plan.shots["flatlay"].reasoning, "styling");
    }

    #[test]
    fn missing_candidates_is_empty_response() {
        let err = parse_plan(&serde_json::json!({})).unwrap_err();
        assert_matches!(err, PlannerError::EmptyResponse);
    }

    #[test]
    fn non_json_plan_text_is_parse_error() {
        let err = parse_plan(&gemini_response("here are your prompts: ...")).unwrap_err();
        assert_matches!(err, PlannerError::Parse(_));
    }

    #[test]
    fn missing_required_shot_rejected() {
        let text = serde_json::json!({
            "hero": {"prompt": "p", "reasoning": ""},
        })
        .to_string();
        let err = parse_plan(&gemini_response(&text)).unwrap_err();
        assert_matches!(err, PlannerError::Parse(msg) if msg.contains("detail"));
    }

    #[test]
    fn empty_prompt_in_plan_rejected() {
        let text = serde_json::json!({
            "hero": {"prompt": "", "reasoning": ""},
            "detail": {"prompt": "p", "reasoning": ""},
            "environment": {"prompt": "p", "reasoning": ""},
            "flatlay": {"prompt": "p", "reasoning": ""},
        })
        .to_string();
        let err = parse_plan(&gemini_response(&text)).unwrap_err();
        assert_matches!(err, PlannerError::Parse(msg) if msg.contains("hero"));
    }

    #[test]
    fn plan_converts_to_one_text_spec_per_shot() {
        let plan = parse_plan(&gemini_response(&full_plan_text())).unwrap();
        let specs = plan.to_specs();
        assert_eq!(specs.len(), 4);
        for spec in &specs {
            assert!(spec.validate().is_ok());
            assert_matches!(&spec.payload, JobPayload::Text { prompt } if !prompt.is_empty());
        }
    }
}
