//! Shotforge domain types and pure helpers.
//!
//! This crate holds everything the rest of the workspace agrees on:
//!
//! - [`job`] — job specifications and the request payload variants.
//! - [`outcome`] — per-job outcomes, the error taxonomy, batch summaries.
//! - [`retry`] — synchronous bounded-retry-with-backoff combinator.
//! - [`variants`] — the built-in variant descriptor registry.
//!
//! It has no I/O dependencies; network and database concerns live in the
//! `shotforge-bria` and `shotforge-db` crates.

pub mod error;
pub mod job;
pub mod outcome;
pub mod retry;
pub mod variants;

pub use error::CoreError;
pub use job::{ImageSource, JobPayload, JobSpec, StructuredPrompt};
pub use outcome::{BatchSummary, ErrorKind, ResultPayload, TaskError, TaskOutcome};
pub use retry::{retry_with_backoff, RetryError, RetryPolicy};
