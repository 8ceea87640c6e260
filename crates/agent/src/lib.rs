//! Planning step: turn a vision statement and a reference image into the
//! batch of shot prompts the pipeline generates from.
//!
//! This is a single synchronous LLM call, deliberately separate from the
//! async polling machinery — callers run it through
//! [`shotforge_core::retry_with_backoff`] (or [`planner::PlannerClient::plan_with_retry`])
//! and, inside a tokio runtime, behind `spawn_blocking`.

pub mod planner;

pub use planner::{PlannerClient, PlannerError, ShotPlan, ShotPrompt};
