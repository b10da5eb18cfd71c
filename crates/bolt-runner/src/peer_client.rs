use async_trait::async_trait;
use bolt_core::{BoltState, Stage, StageFlow};

/// The narrow surface the runner needs from one side (Publisher or Partner)
/// of a job. Concrete implementations — talking to a real compute backend —
/// are external collaborators; this crate only consumes the interface.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Opaque, peer-specific arguments used to create or look up an instance.
    type Args: Send + Sync;

    /// Create a new remote instance for `args`, or return the id of an
    /// existing one that already matches it. Idempotent.
    async fn get_or_create_instance(&self, args: &Self::Args) -> anyhow::Result<String>;

    /// Read the current state of an instance. Side-effect free.
    async fn update_instance(&self, instance_id: &str) -> anyhow::Result<BoltState>;

    /// Kick off a stage. Returns once the remote side has accepted the
    /// request, not once the stage has finished.
    async fn run_stage(
        &self,
        instance_id: &str,
        stage: &Stage,
        server_ips: Option<&[String]>,
        ca_certificate: Option<&str>,
        server_hostnames: Option<&[String]>,
    ) -> anyhow::Result<()>;

    /// Cancel whatever stage is currently running. A no-op if the instance
    /// is not in a cancellable state.
    async fn cancel_current_stage(&self, instance_id: &str) -> anyhow::Result<()>;

    /// This peer's own opinion of the next stage to run, given `flow`.
    /// `None` means the peer considers the job done.
    async fn get_valid_stage(
        &self,
        instance_id: &str,
        flow: &StageFlow,
    ) -> anyhow::Result<Option<Stage>>;

    /// This peer's own opinion of the stage flow in effect for this instance.
    async fn get_stage_flow(&self, instance_id: &str) -> anyhow::Result<Option<StageFlow>>;

    /// Whether this peer still needs to run `stage` (false once it has
    /// already reached that stage's completed status).
    async fn should_invoke_stage(&self, instance_id: &str, stage: &Stage) -> anyhow::Result<bool>;

    /// Capability probe: whether this peer's instance supports `feature`.
    async fn has_feature(&self, instance_id: &str, feature: &str) -> anyhow::Result<bool>;
}
