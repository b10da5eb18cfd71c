use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bolt_core::{
    BoltError, BoltState, Event, ErrorSummary, Hook as _, HookContext, HookRegistry, Job,
    JobSummary, Role, Stage, StageFlow, StagePhase, Timing,
};
use tokio::time::Instant;

use crate::config::RunnerConfig;
use crate::peer_client::PeerClient;

/// Outcome of one `wait_stage_complete` poll.
enum Decision {
    Success,
    Failure,
    Timeout,
}

/// Drives any number of jobs through a declared stage flow, coordinating two
/// peer clients per job.
///
/// Cloning a `Runner` is cheap: the peer clients are held behind `Arc`, so
/// every job spawned by [`Runner::run_async`] shares the same two clients.
pub struct Runner<P: PeerClient> {
    publisher: Arc<P>,
    partner: Arc<P>,
    config: RunnerConfig,
}

impl<P: PeerClient> Clone for Runner<P> {
    fn clone(&self) -> Self {
        Self {
            publisher: self.publisher.clone(),
            partner: self.partner.clone(),
            config: self.config.clone(),
        }
    }
}

impl<P: PeerClient + 'static> Runner<P> {
    /// Build a runner over a Publisher and Partner client pair.
    pub fn new(publisher: P, partner: P, config: RunnerConfig) -> Self {
        Self {
            publisher: Arc::new(publisher),
            partner: Arc::new(partner),
            config,
        }
    }

    /// The Publisher peer client this runner was built with.
    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// The Partner peer client this runner was built with.
    pub fn partner(&self) -> &P {
        &self.partner
    }

    /// Run every job concurrently, returning one summary per job in input order.
    ///
    /// A single job's failure never aborts the batch: it is reflected in
    /// that job's `JobSummary.is_success`.
    pub async fn run_async(&self, jobs: Vec<Job<P::Args>>) -> Vec<JobSummary>
    where
        P::Args: 'static,
    {
        let total = jobs.len();
        let mut set = tokio::task::JoinSet::new();
        for (idx, job) in jobs.into_iter().enumerate() {
            let runner = self.clone();
            set.spawn(async move {
                let summary = runner.run_job(job).await;
                (idx, summary)
            });
        }

        let mut slots: Vec<Option<JobSummary>> = (0..total).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, summary)) => slots[idx] = Some(summary),
                Err(err) => tracing::error!(%err, "job task panicked"),
            }
        }
        slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| JobSummary::failure(
                "unknown",
                None,
                ErrorSummary { kind: "peer_unavailable".into(), message: "job task panicked before completion".into() },
            )))
            .collect()
    }

    /// Run one job to completion (success or a terminal error).
    pub async fn run_job(&self, job: Job<P::Args>) -> JobSummary {
        let job_name = job.job_name.clone();
        tracing::info!(job = %job_name, "job starting");

        match self.run_job_inner(&job).await {
            Ok(final_stage) => {
                tracing::info!(job = %job_name, final_stage = ?final_stage, "job succeeded");
                JobSummary::success(job_name, final_stage)
            }
            Err((final_stage, err)) => {
                tracing::error!(
                    job = %job_name,
                    final_stage = ?final_stage,
                    kind = err.kind(),
                    %err,
                    "job failed"
                );
                JobSummary::failure(job_name, final_stage, ErrorSummary::from(&err))
            }
        }
    }

    async fn run_job_inner(
        &self,
        job: &Job<P::Args>,
    ) -> Result<Option<String>, (Option<String>, BoltError)> {
        let publisher_id = self
            .publisher
            .get_or_create_instance(&job.publisher_args)
            .await
            .map_err(|e| (None, BoltError::PeerUnavailable(e.to_string())))?;
        let partner_id = self
            .partner
            .get_or_create_instance(&job.partner_args)
            .await
            .map_err(|e| (None, BoltError::PeerUnavailable(e.to_string())))?;

        let flow = self
            .get_stage_flow(job, &publisher_id, &partner_id)
            .await
            .map_err(|e| (None, e))?;

        let mut last_stage: Option<String> = None;

        loop {
            let next = self
                .get_next_valid_stage(&flow, &publisher_id, &partner_id)
                .await
                .map_err(|e| (last_stage.clone(), e))?;

            let stage = match next {
                None => return Ok(last_stage),
                Some(stage) => stage,
            };
            last_stage = Some(stage.name.clone());

            self.drive_stage(job, &publisher_id, &partner_id, &stage)
                .await
                .map_err(|e| (last_stage.clone(), e))?;

            if job.final_stage.as_deref() == Some(stage.name.as_str()) {
                return Ok(last_stage);
            }
        }
    }

    /// Run one stage's attempt loop: invoke, wait, retry/cancel per policy.
    async fn drive_stage(
        &self,
        job: &Job<P::Args>,
        publisher_id: &str,
        partner_id: &str,
        stage: &Stage,
    ) -> Result<(), BoltError> {
        let effective_timeout = match job.stage_timeout_override {
            Some(ceiling) => ceiling.min(stage.timeout()),
            None => stage.timeout(),
        };
        let max_attempts = if stage.is_retryable {
            self.config.default_num_tries.max(1)
        } else {
            1
        };

        let mut previous_attempt_timeout = false;
        let mut previous_attempt_cancelled = false;

        for attempt in 1..=max_attempts {
            let outcome = match self
                .run_next_stage(&job.job_name, &job.hooks, publisher_id, partner_id, stage)
                .await
            {
                Ok(()) => {
                    self.wait_stage_complete(
                        &job.job_name,
                        &job.hooks,
                        publisher_id,
                        partner_id,
                        stage,
                        effective_timeout,
                        previous_attempt_timeout,
                        previous_attempt_cancelled,
                    )
                    .await
                }
                Err(err) => Err(err),
            };

            match outcome {
                Ok(()) => return Ok(()),
                Err(err) => {
                    previous_attempt_timeout = matches!(err, BoltError::StageTimeout(_));
                    previous_attempt_cancelled = previous_attempt_timeout && !stage.is_joint_stage;

                    if previous_attempt_timeout && stage.is_joint_stage {
                        self.cancel_current_stage(&job.job_name, &job.hooks, publisher_id, partner_id, stage)
                            .await;
                        previous_attempt_cancelled = true;
                    }

                    let can_retry =
                        err.is_retryable_kind() && stage.is_retryable && attempt < max_attempts;
                    if !can_retry {
                        return Err(err);
                    }
                    tracing::warn!(
                        job = %job.job_name,
                        stage = %stage.name,
                        attempt,
                        kind = err.kind(),
                        "retrying stage"
                    );
                }
            }
        }

        unreachable!("loop always returns on its last iteration")
    }

    /// Reconcile the two peers' opinions of the stage flow in effect.
    pub async fn get_stage_flow(
        &self,
        job: &Job<P::Args>,
        publisher_id: &str,
        partner_id: &str,
    ) -> Result<StageFlow, BoltError> {
        let publisher_flow = self
            .publisher
            .get_stage_flow(publisher_id)
            .await
            .map_err(|e| BoltError::PeerUnavailable(e.to_string()))?;
        let partner_flow = self
            .partner
            .get_stage_flow(partner_id)
            .await
            .map_err(|e| BoltError::PeerUnavailable(e.to_string()))?;

        let flow = match (publisher_flow, partner_flow) {
            (Some(p), Some(q)) if p.same_flow(&q) => p,
            (Some(p), None) => p,
            (None, Some(q)) => q,
            (Some(p), Some(q)) => {
                return Err(BoltError::IncompatibleStage(format!(
                    "publisher flow {} does not match partner flow {}",
                    p.name, q.name
                )));
            }
            (None, None) => {
                return Err(BoltError::IncompatibleStage(
                    "neither peer reported a stage flow".to_string(),
                ));
            }
        };

        if let Some(final_stage) = &job.final_stage {
            if flow.get(final_stage).is_none() {
                return Err(BoltError::IncompatibleStage(format!(
                    "final stage {final_stage} is not part of flow {}",
                    flow.name
                )));
            }
        }

        Ok(flow)
    }

    /// Reconcile the two peers' opinions of the next stage to run.
    pub async fn get_next_valid_stage(
        &self,
        flow: &StageFlow,
        publisher_id: &str,
        partner_id: &str,
    ) -> Result<Option<Stage>, BoltError> {
        let publisher_state = self.peer_state(&self.publisher, publisher_id).await?;
        let partner_state = self.peer_state(&self.partner, partner_id).await?;

        let publisher_next = self
            .publisher
            .get_valid_stage(publisher_id, flow)
            .await
            .map_err(|e| BoltError::PeerUnavailable(e.to_string()))?;
        let partner_next = self
            .partner
            .get_valid_stage(partner_id, flow)
            .await
            .map_err(|e| BoltError::PeerUnavailable(e.to_string()))?;

        if publisher_next == partner_next {
            return Ok(publisher_next);
        }

        let publisher_rank = stage_rank(flow, &publisher_next);
        let partner_rank = stage_rank(flow, &partner_next);

        if publisher_rank.abs_diff(partner_rank) == 1 {
            let (behind, behind_state) = if publisher_rank < partner_rank {
                (publisher_next, &publisher_state)
            } else {
                (partner_next, &partner_state)
            };

            // A peer may be "behind" either because it is legitimately still
            // working the stage (started/completed) or because it failed it
            // outright. Only the former is a recoverable lag; the latter is
            // a genuine incompatibility even though the stage-rank distance
            // looks identical in both cases.
            let behind_phase = behind
                .as_ref()
                .and_then(|stage| flow.stage_for_status(&behind_state.status))
                .map(|(_, phase)| phase);

            return match behind_phase {
                Some(StagePhase::Failed) => Err(BoltError::IncompatibleStage(format!(
                    "peer failed stage {} while the other peer had already advanced",
                    behind.as_ref().map(|s| s.name.as_str()).unwrap_or("?")
                ))),
                _ => Ok(behind),
            };
        }

        Err(BoltError::IncompatibleStage(format!(
            "publisher next stage {:?} incompatible with partner next stage {:?}",
            publisher_next.as_ref().map(|s| s.name.as_str()),
            partner_next.as_ref().map(|s| s.name.as_str()),
        )))
    }

    /// Run a single attempt of `stage`: invoke whichever peer(s) still need
    /// to run it, propagating Publisher's post-start state to Partner when
    /// the stage is joint.
    pub async fn run_next_stage(
        &self,
        job_name: &str,
        hooks: &HookRegistry,
        publisher_id: &str,
        partner_id: &str,
        stage: &Stage,
    ) -> Result<(), BoltError> {
        let publisher_should_run = self
            .publisher
            .should_invoke_stage(publisher_id, stage)
            .await
            .map_err(|e| BoltError::PeerUnavailable(e.to_string()))?;
        let partner_should_run = self
            .partner
            .should_invoke_stage(partner_id, stage)
            .await
            .map_err(|e| BoltError::PeerUnavailable(e.to_string()))?;

        if publisher_should_run {
            self.invoke(job_name, hooks, &self.publisher, publisher_id, stage, Role::Publisher, None, None, None)
                .await?;
        }

        if !partner_should_run {
            return Ok(());
        }

        if !stage.is_joint_stage {
            self.invoke(job_name, hooks, &self.partner, partner_id, stage, Role::Partner, None, None, None)
                .await?;
            return Ok(());
        }

        let (server_ips, ca_certificate, server_hostnames) = self
            .get_server_ips_after_start(publisher_id, stage)
            .await?
            .ok_or_else(|| {
                BoltError::StageFailed(format!(
                    "joint stage {} produced no publisher server state",
                    stage.name
                ))
            })?;
        self.invoke(
            job_name,
            hooks,
            &self.partner,
            partner_id,
            stage,
            Role::Partner,
            Some(&server_ips),
            Some(&ca_certificate),
            Some(&server_hostnames),
        )
        .await
    }

    /// For a non-joint stage, returns `None` immediately. For a joint stage,
    /// blocks until the Publisher reports `started_status` and returns its
    /// networking/TLS state.
    pub async fn get_server_ips_after_start(
        &self,
        publisher_id: &str,
        stage: &Stage,
    ) -> Result<Option<(Vec<String>, String, Vec<String>)>, BoltError> {
        if !stage.is_joint_stage {
            return Ok(None);
        }

        let deadline = Instant::now() + stage.timeout();
        loop {
            let state = self.peer_state(&self.publisher, publisher_id).await?;

            if state.status == stage.started_status {
                let ips = state.server_ips.ok_or_else(|| {
                    BoltError::StageFailed(format!(
                        "publisher reported {} for stage {} without server_ips",
                        stage.started_status, stage.name
                    ))
                })?;
                let ca = state.ca_certificate.ok_or_else(|| {
                    BoltError::StageFailed(format!(
                        "publisher reported {} for stage {} without ca_certificate",
                        stage.started_status, stage.name
                    ))
                })?;
                let hostnames = state.server_hostnames.unwrap_or_default();
                return Ok(Some((ips, ca, hostnames)));
            }
            if state.status == stage.completed_status || state.status == stage.failed_status {
                return Err(BoltError::StageFailed(format!(
                    "publisher reached {} before exposing server state for stage {}",
                    state.status, stage.name
                )));
            }
            if Instant::now() >= deadline {
                return Err(BoltError::StageTimeout(stage.timeout()));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Poll both peers until they reach a terminal decision for `stage`, or
    /// the per-attempt deadline elapses.
    #[allow(clippy::too_many_arguments)]
    pub async fn wait_stage_complete(
        &self,
        job_name: &str,
        hooks: &HookRegistry,
        publisher_id: &str,
        partner_id: &str,
        stage: &Stage,
        timeout: Duration,
        previous_attempt_timeout: bool,
        previous_attempt_cancelled: bool,
    ) -> Result<(), BoltError> {
        tracing::debug!(
            job = job_name,
            stage = %stage.name,
            previous_attempt_timeout,
            previous_attempt_cancelled,
            "waiting for stage completion"
        );

        let ctx = HookContext {
            job_name: job_name.to_string(),
            event: Event::StageWaitForCompleted,
            stage_name: Some(stage.name.clone()),
            role: None,
        };

        let poll = async {
            let deadline = Instant::now() + timeout;
            loop {
                let publisher_state = self.peer_state(&self.publisher, publisher_id).await?;
                let partner_state = self.peer_state(&self.partner, partner_id).await?;

                if publisher_state.status == stage.completed_status
                    && partner_state.status == stage.completed_status
                {
                    return Ok(Decision::Success);
                }
                if publisher_state.status == stage.failed_status
                    || partner_state.status == stage.failed_status
                {
                    return Ok(Decision::Failure);
                }
                if Instant::now() >= deadline {
                    return Ok(Decision::Timeout);
                }
                tokio::time::sleep(self.config.poll_interval).await;
            }
        };

        let decision: Result<Decision, BoltError> = self.execute_event(hooks, &ctx, poll).await;

        match decision? {
            Decision::Success => Ok(()),
            Decision::Failure => {
                if stage.is_joint_stage {
                    self.cancel_current_stage(job_name, hooks, publisher_id, partner_id, stage)
                        .await;
                }
                Err(BoltError::StageFailed(format!("stage {} failed", stage.name)))
            }
            Decision::Timeout => {
                if !stage.is_joint_stage {
                    self.cancel_current_stage(job_name, hooks, publisher_id, partner_id, stage)
                        .await;
                }
                Err(BoltError::StageTimeout(timeout))
            }
        }
    }

    /// Cancel whatever stage is running on both peers. Best-effort: a peer's
    /// cancel failing does not fail the caller, since the outer retry/failure
    /// path is already the one surfacing the job's error.
    pub async fn cancel_current_stage(
        &self,
        job_name: &str,
        hooks: &HookRegistry,
        publisher_id: &str,
        partner_id: &str,
        stage: &Stage,
    ) {
        let ctx = HookContext {
            job_name: job_name.to_string(),
            event: Event::StageCancel,
            stage_name: Some(stage.name.clone()),
            role: None,
        };
        let action = async {
            if let Err(err) = self.publisher.cancel_current_stage(publisher_id).await {
                tracing::warn!(job = job_name, stage = %stage.name, %err, "publisher cancel failed");
            }
            if let Err(err) = self.partner.cancel_current_stage(partner_id).await {
                tracing::warn!(job = job_name, stage = %stage.name, %err, "partner cancel failed");
            }
            Ok::<(), BoltError>(())
        };
        // Best-effort: cancellation never feeds into the job's own error, so a
        // hook failure here is only ever logged, never propagated.
        if let Err(err) = self.execute_event(hooks, &ctx, action).await {
            tracing::warn!(job = job_name, stage = %stage.name, %err, "hook failed during cancel");
        }
        tracing::info!(job = job_name, stage = %stage.name, "cancelled both peers");
    }

    async fn invoke(
        &self,
        job_name: &str,
        hooks: &HookRegistry,
        peer: &Arc<P>,
        instance_id: &str,
        stage: &Stage,
        role: Role,
        server_ips: Option<&[String]>,
        ca_certificate: Option<&str>,
        server_hostnames: Option<&[String]>,
    ) -> Result<(), BoltError> {
        let ctx = HookContext {
            job_name: job_name.to_string(),
            event: Event::StageInvoke,
            stage_name: Some(stage.name.clone()),
            role: Some(role),
        };
        let action = async {
            peer.run_stage(instance_id, stage, server_ips, ca_certificate, server_hostnames)
                .await
                .map_err(|e| BoltError::PeerUnavailable(e.to_string()))
        };
        self.execute_event(hooks, &ctx, action).await?;
        tracing::info!(job = job_name, stage = %stage.name, role = ?role, "stage invoked");
        Ok(())
    }

    async fn peer_state(&self, peer: &Arc<P>, instance_id: &str) -> Result<BoltState, BoltError> {
        peer.update_instance(instance_id)
            .await
            .map_err(|e| BoltError::PeerUnavailable(e.to_string()))
    }

    /// Run `action`, firing every hook whose key matches `ctx` at the
    /// matching timing: BEFORE runs ahead of the action, DURING runs
    /// concurrently with it, AFTER runs once it has settled (success or not).
    ///
    /// A hook's own error is always logged at `tracing::warn!`. It becomes
    /// the returned error only if `action` itself succeeded — a more
    /// specific error already in flight from the action always wins.
    async fn execute_event<O>(
        &self,
        hooks: &HookRegistry,
        ctx: &HookContext,
        action: impl Future<Output = Result<O, BoltError>>,
    ) -> Result<O, BoltError> {
        if hooks.is_empty() {
            return action.await;
        }

        let mut hook_error: Option<anyhow::Error> = None;

        for hook in hooks.matching(ctx, Timing::Before) {
            if let Err(err) = hook.inject(ctx).await {
                tracing::warn!(job = %ctx.job_name, event = ?ctx.event, stage = ?ctx.stage_name, %err, "hook failed");
                hook_error.get_or_insert(err);
            }
        }

        let during_hooks = hooks.matching(ctx, Timing::During);
        let during = async {
            let mut during_error = None;
            for hook in &during_hooks {
                if let Err(err) = hook.inject(ctx).await {
                    tracing::warn!(job = %ctx.job_name, event = ?ctx.event, stage = ?ctx.stage_name, %err, "hook failed");
                    during_error.get_or_insert(err);
                }
            }
            during_error
        };

        let (result, during_error) = tokio::join!(action, during);
        if let Some(err) = during_error {
            hook_error.get_or_insert(err);
        }

        for hook in hooks.matching(ctx, Timing::After) {
            if let Err(err) = hook.inject(ctx).await {
                run_hook(err, &mut hook_error);
            }
        }

        match result {
            Err(action_err) => Err(action_err),
            Ok(value) => match hook_error {
                Some(err) => Err(BoltError::HookFailed(err.to_string())),
                None => Ok(value),
            },
        }
    }
}

fn stage_rank(flow: &StageFlow, stage: &Option<Stage>) -> usize {
    match stage {
        None => flow.stages().len(),
        Some(stage) => flow
            .stages()
            .iter()
            .position(|s| s == stage)
            .unwrap_or(flow.stages().len()),
    }
}
