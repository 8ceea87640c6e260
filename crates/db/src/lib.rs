//! Persistence layer for generated image records.
//!
//! - [`models`] — record types written per completed job.
//! - [`store`] — the [`ImageStore`] trait the pipeline persists through,
//!   plus the Postgres implementation.
//!
//! The pipeline only ever sees the trait; swapping the backing store (or
//! substituting an in-memory one in tests) requires no pipeline changes.

pub mod models;
pub mod store;

pub use models::{GeneratedImageRecord, RefinementData, VariantRecord};
pub use store::{ImageStore, PgImageStore, StoreError};
