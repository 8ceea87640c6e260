//! Worker binary: plan a campaign, generate every shot, report the batch.
//!
//! Composition root for the whole flow — clients are constructed once here
//! and injected; nothing below this file touches global state.

mod config;

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shotforge_agent::{PlannerClient, ShotPlan};
use shotforge_bria::{BriaApi, GenerationBackend};
use shotforge_core::{BatchSummary, JobSpec, RetryPolicy};
use shotforge_db::{ImageStore, PgImageStore};
use shotforge_pipeline::{BatchCoordinator, BatchDeps};

use crate::config::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shotforge_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env()?;
    let batch_id = uuid::Uuid::new_v4();
    tracing::info!(
        batch_id = %batch_id,
        max_concurrency = config.batch.max_concurrency,
        "Worker starting"
    );

    // Construct collaborators once; everything downstream gets them injected.
    let pool = sqlx::PgPool::connect(&config.database_url)
        .await
        .context("Failed to connect to the database")?;
    let backend = Arc::new(BriaApi::new(
        config.bria_base_url.clone(),
        config.bria_api_token.clone(),
    ));
    let store = Arc::new(PgImageStore::new(pool));

    // Ctrl-C unwinds every in-flight poll loop at its next suspension point.
    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling batch");
            ctrl_c_cancel.cancel();
        }
    });

    // Plan the batch. The planner is synchronous by design; run it off the
    // runtime behind its retry policy.
    let planner = PlannerClient::new(config.gemini_api_key.clone());
    let vision = config.vision.clone();
    let reference_image = config.reference_image.clone();
    let plan = tokio::task::spawn_blocking(move || {
        let image_bytes = shotforge_agent::planner::read_image_bytes(&reference_image)?;
        planner
            .plan_with_retry(&RetryPolicy::default(), &vision, &image_bytes)
            .map_err(anyhow::Error::from)
    })
    .await
    .context("Planner task failed")??;

    for (label, shot) in &plan.shots {
        tracing::info!(label = %label, reasoning = %shot.reasoning, "Planned shot");
    }

    let deps = BatchDeps {
        backend: backend as Arc<dyn GenerationBackend>,
        store: store as Arc<dyn ImageStore>,
    };
    let coordinator = BatchCoordinator::new(deps, config.batch.clone())?;

    let specs = batch_specs(&plan, &config.model_version);
    let outcomes = coordinator.run_batch(specs, &cancel).await?;

    let summary = BatchSummary::from_outcomes(&outcomes);
    for outcome in &outcomes {
        match outcome.error_kind() {
            None => tracing::info!(label = %outcome.label(), "Shot generated"),
            Some(kind) => {
                tracing::error!(label = %outcome.label(), kind = %kind, "Shot failed")
            }
        }
    }
    tracing::info!(
        batch_id = %batch_id,
        total = summary.total,
        successful = summary.successful,
        failed = summary.failed,
        "Batch complete"
    );

    Ok(())
}

/// Turn a plan into submission-ready specs, requesting the configured
/// backend model for every shot.
fn batch_specs(plan: &ShotPlan, model_version: &str) -> Vec<JobSpec> {
    plan.to_specs()
        .into_iter()
        .map(|spec| spec.with_param("model_version", serde_json::json!(model_version)))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
