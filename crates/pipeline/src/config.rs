//! Batch tunables.

use std::time::Duration;

use shotforge_bria::PollConfig;
use shotforge_core::CoreError;

/// Configuration shared by every runner in a batch.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum number of jobs in flight simultaneously.
    pub max_concurrency: usize,
    /// Wall-clock bound on one job's submission + polling, independent per
    /// job.
    pub per_job_timeout: Duration,
    /// Poll loop parameters (interval, poll deadline, download dir).
    pub poll: PollConfig,
    /// Fixed sleep after a successful job before its slot is released.
    /// Throttles burst rate against the backend independently of the
    /// concurrency cap. Zero disables pacing.
    pub pacing_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            per_job_timeout: Duration::from_secs(120),
            poll: PollConfig::default(),
            pacing_delay: Duration::ZERO,
        }
    }
}

impl BatchConfig {
    /// Reject configurations no batch can run under.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_concurrency == 0 {
            return Err(CoreError::Validation(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.per_job_timeout.is_zero() {
            return Err(CoreError::Validation(
                "per_job_timeout must be positive".to_string(),
            ));
        }
        if self.poll.interval.is_zero() {
            return Err(CoreError::Validation(
                "poll interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
