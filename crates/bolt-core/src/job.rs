use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorSummary;
use crate::hook::HookRegistry;

/// Immutable description of one workflow run.
///
/// `publisher_args`/`partner_args` are opaque, peer-client-specific payloads:
/// the runner forwards them to `get_or_create_instance` and never inspects
/// their contents.
#[derive(Debug, Clone)]
pub struct Job<A> {
    /// Human-readable job identifier, used in logs and the resulting summary.
    pub job_name: String,
    /// Arguments forwarded to the Publisher's `get_or_create_instance`.
    pub publisher_args: A,
    /// Arguments forwarded to the Partner's `get_or_create_instance`.
    pub partner_args: A,
    /// Stage name at which the job is considered done, if short of the flow's end.
    pub final_stage: Option<String>,
    /// Per-attempt timeout ceiling; the effective timeout is
    /// `min(stage_timeout_override, stage.timeout)` when set.
    pub stage_timeout_override: Option<Duration>,
    /// Hooks observing this job's execution.
    pub hooks: HookRegistry,
}

impl<A> Job<A> {
    /// Build a job with no timeout override, final-stage limit or hooks.
    pub fn new(job_name: impl Into<String>, publisher_args: A, partner_args: A) -> Self {
        Self {
            job_name: job_name.into(),
            publisher_args,
            partner_args,
            final_stage: None,
            stage_timeout_override: None,
            hooks: HookRegistry::new(),
        }
    }
}

/// Outcome of one completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    /// The job's name, as given in the originating [`Job`].
    pub job_name: String,
    /// Whether the job reached its final stage without a fatal error.
    pub is_success: bool,
    /// The last stage the job reached, if any ran.
    pub final_stage: Option<String>,
    /// The error that ended the job, if `is_success` is false.
    pub error: Option<ErrorSummary>,
    /// Wall-clock time at which the job reached this outcome.
    pub finished_at: DateTime<Utc>,
}

impl JobSummary {
    /// A summary for a job that ran every stage through to completion.
    pub fn success(job_name: impl Into<String>, final_stage: Option<String>) -> Self {
        Self {
            job_name: job_name.into(),
            is_success: true,
            final_stage,
            error: None,
            finished_at: Utc::now(),
        }
    }

    /// A summary for a job that ended in an error.
    pub fn failure(
        job_name: impl Into<String>,
        final_stage: Option<String>,
        error: ErrorSummary,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            is_success: false,
            final_stage,
            error: Some(error),
            finished_at: Utc::now(),
        }
    }
}
