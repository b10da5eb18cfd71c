use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Why a job did not reach its final stage.
#[derive(Debug, thiserror::Error)]
pub enum BoltError {
    /// The two peers' stage flows, or their opinions of the next stage,
    /// disagree in a way the resolution rules do not cover. Fatal; never retried.
    #[error("incompatible stage: {0}")]
    IncompatibleStage(String),
    /// At least one peer reached `failed_status` for the current stage.
    #[error("stage failed: {0}")]
    StageFailed(String),
    /// The per-attempt wall-clock budget elapsed before a terminal decision.
    #[error("stage timed out after {0:?}")]
    StageTimeout(Duration),
    /// A peer client call surfaced a transport-level error.
    #[error("peer unavailable: {0}")]
    PeerUnavailable(String),
    /// A hook raised an error while its wrapped action otherwise succeeded.
    #[error("hook failed: {0}")]
    HookFailed(String),
}

impl BoltError {
    /// Stable, lowercase kind tag for this error, suitable for logs and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            BoltError::IncompatibleStage(_) => "incompatible_stage",
            BoltError::StageFailed(_) => "stage_failed",
            BoltError::StageTimeout(_) => "stage_timeout",
            BoltError::PeerUnavailable(_) => "peer_unavailable",
            BoltError::HookFailed(_) => "hook_failed",
        }
    }

    /// Whether a stage that failed this way may be retried, subject to the
    /// stage's own `is_retryable` flag and the remaining attempt budget.
    pub fn is_retryable_kind(&self) -> bool {
        !matches!(self, BoltError::IncompatibleStage(_))
    }
}

/// Serializable projection of a [`BoltError`], embedded in a [`crate::JobSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSummary {
    /// Stable kind tag, e.g. `"stage_timeout"`.
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

impl From<&BoltError> for ErrorSummary {
    fn from(err: &BoltError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}
