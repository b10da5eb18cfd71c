use std::time::Duration;

/// Tunables for a [`crate::Runner`].
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Maximum attempts for a retryable stage. Non-retryable stages always
    /// get exactly one attempt regardless of this value.
    pub default_num_tries: u32,
    /// How often to poll peer state while waiting on a stage.
    pub poll_interval: Duration,
}

impl RunnerConfig {
    /// Matches the original runner's default retry budget.
    pub const DEFAULT_NUM_TRIES: u32 = 2;

    /// A sensible default poll cadence for tests and small demos.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            default_num_tries: Self::DEFAULT_NUM_TRIES,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
        }
    }
}
