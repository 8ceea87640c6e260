//! Batch orchestration for generation jobs.
//!
//! Composes the Bria client and the image store into bounded-concurrency
//! batches:
//!
//! - [`gate`] — counting admission control shared by a batch's runners.
//! - [`config`] — batch tunables (concurrency cap, timeouts, pacing).
//! - [`runner`] — one job's full lifecycle, every failure isolated into a
//!   [`shotforge_core::TaskOutcome`].
//! - [`batch`] — fan-out across runners, initial shots or variant
//!   refinements, partial-failure tolerant.

pub mod batch;
pub mod config;
pub mod gate;
pub mod runner;

pub use batch::{BatchCoordinator, BatchDeps, RefinementBase, VariantRequest};
pub use config::BatchConfig;
pub use gate::{ConcurrencyGate, GatePermit};
pub use runner::{run_task, PersistTarget};
