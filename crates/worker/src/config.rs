//! Environment-driven worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use shotforge_bria::PollConfig;
use shotforge_pipeline::BatchConfig;

/// Default Bria engine endpoint.
const DEFAULT_BRIA_BASE_URL: &str = "https://engine.prod.bria-api.com/v2";

/// Default generation model requested for initial shots.
const DEFAULT_MODEL_VERSION: &str = "FIBO";

/// Everything the worker needs to run one campaign batch.
#[derive(Debug)]
pub struct WorkerConfig {
    pub bria_base_url: String,
    pub bria_api_token: String,
    pub database_url: String,
    pub gemini_api_key: String,
    /// Theme/vision statement handed to the planner.
    pub vision: String,
    /// Local path or URL of the reference image.
    pub reference_image: String,
    /// Backend model version requested for every initial shot.
    pub model_version: String,
    pub batch: BatchConfig,
}

impl WorkerConfig {
    /// Read configuration from the environment (after `dotenvy`).
    pub fn from_env() -> anyhow::Result<Self> {
        let batch = BatchConfig {
            max_concurrency: parse_var("MAX_CONCURRENCY", 4)?,
            per_job_timeout: Duration::from_secs(parse_var("PER_JOB_TIMEOUT_SECS", 120)?),
            poll: PollConfig {
                interval: Duration::from_secs(parse_var("POLL_INTERVAL_SECS", 2)?),
                deadline: Duration::from_secs(parse_var("POLL_DEADLINE_SECS", 300)?),
                download_dir: Some(PathBuf::from(
                    std::env::var("DOWNLOAD_DIR").unwrap_or_else(|_| "generated_images".into()),
                )),
            },
            pacing_delay: Duration::from_secs(parse_var("PACING_DELAY_SECS", 0)?),
        };

        Ok(Self {
            bria_base_url: std::env::var("BRIA_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BRIA_BASE_URL.to_string()),
            bria_api_token: required("BRIA_API_TOKEN")?,
            database_url: required("DATABASE_URL")?,
            gemini_api_key: required("GEMINI_API_KEY")?,
            vision: required("VISION")?,
            reference_image: required("REFERENCE_IMAGE")?,
            model_version: std::env::var("MODEL_VERSION")
                .unwrap_or_else(|_| DEFAULT_MODEL_VERSION.to_string()),
            batch,
        })
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("{name} environment variable is not set"))
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{name} is not a valid value")),
        Err(_) => Ok(default),
    }
}
