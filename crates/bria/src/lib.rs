//! Bria generation backend client library.
//!
//! Provides the typed request variants, the REST submission client, the
//! status polling state machine, and asset handling (download, base64
//! transport encoding) for the Bria image-generation API.
//!
//! The [`backend::GenerationBackend`] trait is the seam the pipeline crate
//! polls through; [`api::BriaApi`] is its production implementation.

pub mod api;
pub mod assets;
pub mod backend;
pub mod poller;
pub mod request;

pub use api::{BriaApi, BriaApiError, StatusResponse, SubmitResponse};
pub use backend::GenerationBackend;
pub use poller::{poll_for_status, PollConfig, PollOutcome};
pub use request::GenerationRequest;
