use std::time::Duration;

use clap::Parser;

fn default_poll_interval_ms() -> u64 {
    50
}

/// Runs a demo two-party job through the bolt runner against an in-process
/// peer client, for manual smoke-testing of the stage-flow state machine.
#[derive(Debug, Clone, Parser)]
#[command(name = "bolt", version, about = "Two-party workflow coordinator demo")]
pub struct Cli {
    /// Name to give the demo job, echoed back in its summary.
    #[arg(long, env = "BOLT_JOB_NAME", default_value = "demo-job")]
    pub job_name: String,

    /// How often to poll peer state while waiting on a stage, in milliseconds.
    #[arg(long, env = "BOLT_POLL_INTERVAL_MS", default_value_t = default_poll_interval_ms())]
    pub poll_interval_ms: u64,

    /// Maximum attempts for a retryable stage.
    #[arg(long, env = "BOLT_NUM_TRIES", default_value_t = bolt_runner::RunnerConfig::DEFAULT_NUM_TRIES)]
    pub num_tries: u32,

    /// Stop once this stage completes, instead of running the whole flow.
    #[arg(long, env = "BOLT_FINAL_STAGE")]
    pub final_stage: Option<String>,
}

impl Cli {
    /// This run's poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
