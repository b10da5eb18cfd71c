use std::sync::Arc;

use async_trait::async_trait;

/// One of the points in the runner's lifecycle a hook can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// A peer's `run_stage` is being invoked.
    StageInvoke,
    /// The runner is polling for the stage's terminal decision.
    StageWaitForCompleted,
    /// Both peers' `cancel_current_stage` is being invoked.
    StageCancel,
    /// A job is starting.
    JobStart,
    /// A job has reached a terminal outcome.
    JobFinish,
}

/// Which side of an action a hook fires relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timing {
    /// Runs before the action is awaited.
    Before,
    /// Runs concurrently with the action.
    During,
    /// Runs after the action has settled, including on failure.
    After,
}

/// Which peer an observation pertains to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The Publisher peer.
    Publisher,
    /// The Partner peer.
    Partner,
}

/// A key into the [`HookRegistry`].
///
/// Every field is optional; a `None` field matches any value of the
/// corresponding field on an observation (a wildcard). A key with every
/// field set to `None` matches every observation at every timing, so it
/// fires three times — once per [`Timing`] — for each observed event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct HookKey {
    /// Event to match, or any.
    pub event: Option<Event>,
    /// Timing to match, or any.
    pub timing: Option<Timing>,
    /// Stage name to match, or any.
    pub stage_name: Option<String>,
    /// Role to match, or any.
    pub role: Option<Role>,
}

impl HookKey {
    /// A key that matches every observation (fires on all three timings).
    pub fn wildcard() -> Self {
        Self::default()
    }

    fn matches(&self, observation: &HookContext, timing: Timing) -> bool {
        if let Some(event) = self.event {
            if event != observation.event {
                return false;
            }
        }
        if let Some(want) = self.timing {
            if want != timing {
                return false;
            }
        }
        if let Some(stage_name) = &self.stage_name {
            if observation.stage_name.as_deref() != Some(stage_name.as_str()) {
                return false;
            }
        }
        if let Some(role) = self.role {
            if observation.role != Some(role) {
                return false;
            }
        }
        true
    }
}

/// The observation passed to a hook when it fires.
#[derive(Debug, Clone)]
pub struct HookContext {
    /// Name of the job being driven.
    pub job_name: String,
    /// Event being observed.
    pub event: Event,
    /// Stage this observation pertains to, if any (job-level events have none).
    pub stage_name: Option<String>,
    /// Peer this observation pertains to, if any.
    pub role: Option<Role>,
}

/// A side-effecting handler fired by the runner around a matching observation.
///
/// A hook never alters the action it wraps — it only observes. An `Err`
/// returned here is always logged, and becomes the job's own failure reason
/// if (and only if) the wrapped action otherwise succeeded; a more specific
/// error from the action itself always takes precedence.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Run this hook's side effect for the given observation.
    async fn inject(&self, context: &HookContext) -> anyhow::Result<()>;
}

/// A wildcard-matching multimap from [`HookKey`] to ordered hook lists.
#[derive(Default, Clone)]
pub struct HookRegistry {
    entries: Vec<(HookKey, Arc<dyn Hook>)>,
}

impl HookRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook under the given key.
    pub fn register(&mut self, key: HookKey, hook: Arc<dyn Hook>) {
        self.entries.push((key, hook));
    }

    /// All hooks whose key matches `observation` at `timing`, in registration order.
    pub fn matching(&self, observation: &HookContext, timing: Timing) -> Vec<Arc<dyn Hook>> {
        self.entries
            .iter()
            .filter(|(key, _)| key.matches(observation, timing))
            .map(|(_, hook)| hook.clone())
            .collect()
    }

    /// Whether any hook is registered at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("len", &self.entries.len())
            .finish()
    }
}
