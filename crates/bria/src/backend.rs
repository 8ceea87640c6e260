//! The backend seam the pipeline drives jobs through.
//!
//! [`GenerationBackend`] covers exactly the three calls the submit-then-poll
//! flow needs. Production code uses [`BriaApi`]; pipeline tests substitute a
//! scripted in-memory implementation.

use async_trait::async_trait;

use crate::api::{BriaApi, BriaApiError, StatusResponse, SubmitResponse};

/// Submit / poll / fetch interface for a generation backend.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Submit a generation request body, returning the job handle.
    async fn submit(&self, body: &serde_json::Value) -> Result<SubmitResponse, BriaApiError>;

    /// Query the current status of a submitted job.
    async fn get_status(&self, request_id: &str) -> Result<StatusResponse, BriaApiError>;

    /// Download a generated asset.
    async fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, BriaApiError>;
}

#[async_trait]
impl GenerationBackend for BriaApi {
    async fn submit(&self, body: &serde_json::Value) -> Result<SubmitResponse, BriaApiError> {
        BriaApi::submit(self, body).await
    }

    async fn get_status(&self, request_id: &str) -> Result<StatusResponse, BriaApiError> {
        BriaApi::get_status(self, request_id).await
    }

    async fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, BriaApiError> {
        BriaApi::fetch_asset(self, url).await
    }
}
