use std::time::Duration;

use crate::state::InstanceStatus;

/// Which of a stage's four statuses an instance currently occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePhase {
    /// The stage has been created but not yet started.
    Initialized,
    /// The stage is running.
    Started,
    /// The stage finished successfully.
    Completed,
    /// The stage finished unsuccessfully.
    Failed,
}

/// One stage in a [`StageFlow`].
///
/// Stages are cheap, read-mostly values with no I/O. Tests that want to
/// exercise the timeout path without waiting out a realistic deadline build
/// a stage with a short `timeout` (or call [`Stage::set_timeout`]) rather
/// than relying on a shared flow's stage.
#[derive(Debug, Clone)]
pub struct Stage {
    /// Stage identifier, unique within its flow.
    pub name: String,
    /// Status reported while the stage has been created but not started.
    pub initialized_status: InstanceStatus,
    /// Status reported while the stage is running.
    pub started_status: InstanceStatus,
    /// Status reported once the stage has finished successfully.
    pub completed_status: InstanceStatus,
    /// Status reported once the stage has finished unsuccessfully.
    pub failed_status: InstanceStatus,
    /// Whether the two peers communicate directly during this stage.
    pub is_joint_stage: bool,
    /// Whether a failed or timed-out attempt of this stage may be retried.
    pub is_retryable: bool,
    /// Per-attempt wall-clock budget.
    pub timeout: Duration,
}

impl PartialEq for Stage {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for Stage {}

impl Stage {
    /// Construct a stage with an explicit timeout.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        initialized_status: InstanceStatus,
        started_status: InstanceStatus,
        completed_status: InstanceStatus,
        failed_status: InstanceStatus,
        is_joint_stage: bool,
        is_retryable: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            initialized_status,
            started_status,
            completed_status,
            failed_status,
            is_joint_stage,
            is_retryable,
            timeout,
        }
    }

    /// Current per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Replace this stage's per-attempt timeout in place.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Which phase `status` corresponds to for this stage, if any.
    pub fn phase_for_status(&self, status: &InstanceStatus) -> Option<StagePhase> {
        if *status == self.initialized_status {
            Some(StagePhase::Initialized)
        } else if *status == self.started_status {
            Some(StagePhase::Started)
        } else if *status == self.completed_status {
            Some(StagePhase::Completed)
        } else if *status == self.failed_status {
            Some(StagePhase::Failed)
        } else {
            None
        }
    }
}

/// An ordered, named sequence of stages.
///
/// Flow identity (used when reconciling the two peers' opinions of "the
/// flow") is the flow `name`; two flows with the same name are treated as
/// the same flow regardless of object identity.
#[derive(Debug, Clone)]
pub struct StageFlow {
    /// Flow identifier (e.g. the private-computation stage flow name).
    pub name: String,
    stages: Vec<Stage>,
}

impl StageFlow {
    /// Build a flow from an ordered list of stages.
    pub fn new(name: impl Into<String>, stages: Vec<Stage>) -> Self {
        Self {
            name: name.into(),
            stages,
        }
    }

    /// All stages, in flow order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// The first stage of the flow, if any.
    pub fn first(&self) -> Option<&Stage> {
        self.stages.first()
    }

    /// Look up a stage by name.
    pub fn get(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// The stage following `stage` in this flow, if any.
    pub fn next(&self, stage: &Stage) -> Option<&Stage> {
        let idx = self.stages.iter().position(|s| s == stage)?;
        self.stages.get(idx + 1)
    }

    /// The stage preceding `stage` in this flow, if any.
    pub fn previous(&self, stage: &Stage) -> Option<&Stage> {
        let idx = self.stages.iter().position(|s| s == stage)?;
        idx.checked_sub(1).and_then(|i| self.stages.get(i))
    }

    /// Find which stage (and phase) a status belongs to, if any.
    pub fn stage_for_status(&self, status: &InstanceStatus) -> Option<(&Stage, StagePhase)> {
        self.stages
            .iter()
            .find_map(|s| s.phase_for_status(status).map(|p| (s, p)))
    }

    /// Whether `other` describes the same flow as `self`.
    pub fn same_flow(&self, other: &StageFlow) -> bool {
        self.name == other.name
    }
}
