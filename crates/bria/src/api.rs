//! REST API client for the Bria HTTP endpoints.
//!
//! Wraps the two calls the orchestrator needs — job submission
//! (`POST /image/generate`) and status retrieval (`GET /status/{id}`) —
//! using [`reqwest`].

use serde::Deserialize;
use shotforge_core::StructuredPrompt;

/// Status string Bria reports for a finished job.
pub const STATUS_COMPLETED: &str = "COMPLETED";

/// Status string Bria reports for a failed job.
pub const STATUS_ERROR: &str = "ERROR";

/// HTTP client for a single Bria engine endpoint.
pub struct BriaApi {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
}

/// Response returned by `POST /image/generate` after the job is accepted.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier used to poll for completion.
    pub request_id: String,
}

/// Response returned by `GET /status/{request_id}`.
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    /// Current state: `COMPLETED`, `ERROR`, or a non-terminal value
    /// (`PENDING`, `IN_PROGRESS`, ...).
    pub status: String,
    /// Present once the job has completed.
    pub result: Option<StatusResult>,
    /// Backend error detail, present when `status` is `ERROR`.
    pub error: Option<serde_json::Value>,
}

/// The result block of a completed status response.
#[derive(Debug, Deserialize)]
pub struct StatusResult {
    pub image_url: String,
    pub seed: i64,
    /// May arrive as a JSON-encoded string; normalized by the poller.
    pub structured_prompt: Option<StructuredPrompt>,
}

impl StatusResponse {
    pub fn is_completed(&self) -> bool {
        self.status == STATUS_COMPLETED
    }

    pub fn is_error(&self) -> bool {
        self.status == STATUS_ERROR
    }

    /// Human-readable error detail for an `ERROR` status.
    pub fn error_detail(&self) -> String {
        self.error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

/// Errors from the Bria REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum BriaApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Bria returned a non-2xx status code.
    #[error("Bria API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A conditioning image could not be read or encoded.
    #[error("Image encoding failed: {0}")]
    ImageEncoding(String),
}

impl BriaApi {
    /// Create a new API client.
    ///
    /// * `base_url`  - Engine base URL, e.g. `https://engine.prod.bria-api.com/v2`.
    /// * `api_token` - Account API token sent as the `api_token` header.
    pub fn new(base_url: String, api_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_token,
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (useful for connection pooling).
    pub fn with_client(client: reqwest::Client, base_url: String, api_token: String) -> Self {
        Self {
            client,
            base_url,
            api_token,
        }
    }

    /// Engine base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit a generation request body.
    ///
    /// Sends `POST /image/generate`. A non-2xx response is a fatal error
    /// for the job — submission is never retried here; retry, if wanted,
    /// is the caller's decision.
    pub async fn submit(&self, body: &serde_json::Value) -> Result<SubmitResponse, BriaApiError> {
        tracing::info!(
            url = %format!("{}/image/generate", self.base_url),
            "Submitting generation request"
        );

        let response = self
            .client
            .post(format!("{}/image/generate", self.base_url))
            .header("api_token", &self.api_token)
            .json(body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Retrieve the current status of a submitted job.
    ///
    /// Sends `GET /status/{request_id}`.
    pub async fn get_status(&self, request_id: &str) -> Result<StatusResponse, BriaApiError> {
        let response = self
            .client
            .get(format!("{}/status/{}", self.base_url, request_id))
            .header("api_token", &self.api_token)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Download a generated asset from its hosted URL.
    pub async fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, BriaApiError> {
        let response = self.client.get(url).send().await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`BriaApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, BriaApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(BriaApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BriaApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
