use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bolt_core::{BoltState, InstanceStatus, Stage, StageFlow, StagePhase};
use bolt_runner::PeerClient;
use tokio::sync::Mutex;

/// Opaque lookup key forwarded to [`DemoPeerClient::get_or_create_instance`].
#[derive(Debug, Clone)]
pub struct DemoArgs {
    /// Label used to derive this run's instance id.
    pub label: String,
}

struct InstanceRecord {
    status: InstanceStatus,
    polls_since_start: u32,
    server_ips: Option<Vec<String>>,
    ca_certificate: Option<String>,
    server_hostnames: Option<Vec<String>>,
}

/// An in-process stand-in for a real backend, used by the `bolt` binary to
/// exercise the runner without standing up two actual services.
///
/// Each instance advances from its stage's started status to its completed
/// status after `completes_after_polls` calls to `update_instance`, so a
/// short poll interval makes a full demo run finish in well under a second.
pub struct DemoPeerClient {
    flow: StageFlow,
    completes_after_polls: u32,
    instances: Mutex<HashMap<String, InstanceRecord>>,
}

impl DemoPeerClient {
    /// Build a client serving a fixed two-stage demo flow: a non-joint
    /// handshake followed by a joint exchange.
    pub fn new(completes_after_polls: u32) -> Self {
        let handshake = Stage::new(
            "HANDSHAKE",
            "HANDSHAKE_CREATED".into(),
            "HANDSHAKE_STARTED".into(),
            "HANDSHAKE_COMPLETED".into(),
            "HANDSHAKE_FAILED".into(),
            false,
            true,
            Duration::from_secs(30),
        );
        let exchange = Stage::new(
            "EXCHANGE",
            "EXCHANGE_CREATED".into(),
            "EXCHANGE_STARTED".into(),
            "EXCHANGE_COMPLETED".into(),
            "EXCHANGE_FAILED".into(),
            true,
            true,
            Duration::from_secs(30),
        );
        Self {
            flow: StageFlow::new("DemoStageFlow", vec![handshake, exchange]),
            completes_after_polls,
            instances: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl PeerClient for DemoPeerClient {
    type Args = DemoArgs;

    async fn get_or_create_instance(&self, args: &DemoArgs) -> anyhow::Result<String> {
        let instance_id = format!("instance-{}", args.label);
        let mut instances = self.instances.lock().await;
        instances.entry(instance_id.clone()).or_insert_with(|| {
            let first = self.flow.first().expect("demo flow is non-empty");
            InstanceRecord {
                status: first.initialized_status.clone(),
                polls_since_start: 0,
                server_ips: None,
                ca_certificate: None,
                server_hostnames: None,
            }
        });
        Ok(instance_id)
    }

    async fn update_instance(&self, instance_id: &str) -> anyhow::Result<BoltState> {
        let mut instances = self.instances.lock().await;
        let record = instances
            .get_mut(instance_id)
            .ok_or_else(|| anyhow::anyhow!("unknown instance {instance_id}"))?;

        if let Some((stage, StagePhase::Started)) = self.flow.stage_for_status(&record.status) {
            record.polls_since_start += 1;
            if record.polls_since_start >= self.completes_after_polls {
                record.status = stage.completed_status.clone();
            }
        }

        Ok(BoltState {
            status: record.status.clone(),
            server_ips: record.server_ips.clone(),
            ca_certificate: record.ca_certificate.clone(),
            server_hostnames: record.server_hostnames.clone(),
        })
    }

    async fn run_stage(
        &self,
        instance_id: &str,
        stage: &Stage,
        server_ips: Option<&[String]>,
        ca_certificate: Option<&str>,
        server_hostnames: Option<&[String]>,
    ) -> anyhow::Result<()> {
        let mut instances = self.instances.lock().await;
        let record = instances
            .get_mut(instance_id)
            .ok_or_else(|| anyhow::anyhow!("unknown instance {instance_id}"))?;

        record.status = stage.started_status.clone();
        record.polls_since_start = 0;

        if stage.is_joint_stage {
            record.server_ips = Some(
                server_ips
                    .map(<[String]>::to_vec)
                    .unwrap_or_else(|| vec!["127.0.0.1".to_string()]),
            );
            record.ca_certificate = Some(
                ca_certificate
                    .map(str::to_string)
                    .unwrap_or_else(|| "demo-ca".to_string()),
            );
            record.server_hostnames = Some(
                server_hostnames
                    .map(<[String]>::to_vec)
                    .unwrap_or_else(|| vec!["demo-host".to_string()]),
            );
        }
        Ok(())
    }

    async fn cancel_current_stage(&self, instance_id: &str) -> anyhow::Result<()> {
        let mut instances = self.instances.lock().await;
        let record = instances
            .get_mut(instance_id)
            .ok_or_else(|| anyhow::anyhow!("unknown instance {instance_id}"))?;

        if let Some((stage, _)) = self.flow.stage_for_status(&record.status) {
            record.status = stage.initialized_status.clone();
        }
        record.polls_since_start = 0;
        record.server_ips = None;
        record.ca_certificate = None;
        record.server_hostnames = None;
        Ok(())
    }

    async fn get_valid_stage(
        &self,
        instance_id: &str,
        flow: &StageFlow,
    ) -> anyhow::Result<Option<Stage>> {
        let instances = self.instances.lock().await;
        let record = instances
            .get(instance_id)
            .ok_or_else(|| anyhow::anyhow!("unknown instance {instance_id}"))?;

        Ok(match flow.stage_for_status(&record.status) {
            Some((stage, StagePhase::Completed)) => flow.next(stage).cloned(),
            Some((stage, _)) => Some(stage.clone()),
            None => flow.first().cloned(),
        })
    }

    async fn get_stage_flow(&self, _instance_id: &str) -> anyhow::Result<Option<StageFlow>> {
        Ok(Some(self.flow.clone()))
    }

    async fn should_invoke_stage(&self, instance_id: &str, stage: &Stage) -> anyhow::Result<bool> {
        let instances = self.instances.lock().await;
        let record = instances
            .get(instance_id)
            .ok_or_else(|| anyhow::anyhow!("unknown instance {instance_id}"))?;
        Ok(record.status != stage.completed_status)
    }

    async fn has_feature(&self, _instance_id: &str, _feature: &str) -> anyhow::Result<bool> {
        Ok(false)
    }
}
