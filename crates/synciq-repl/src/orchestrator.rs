//! Reconciliation of SyncIQ policies against a desired state.
//!
//! Every operation reads the current remote state first and returns early when
//! the desired state already holds. Otherwise it dispatches the action and
//! polls until the array reports the terminal state. Nothing is cached between
//! calls, so re-invoking an operation after a failure is always safe.
//!
//! Concurrent operations against the same policy are not serialized here; the
//! array is the only arbiter of conflicting requests.

use std::sync::Arc;

use serde::Serialize;
use synciq_transport::{
    unix_now, FailoverFailbackState, Job, JobAction, JobRequest, JobState, Policy, PolicySpec,
    PolicyUpdate, ReplicationApi, Report, TargetPolicy,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::accessor::PolicyAccessor;
use crate::config::ReplConfig;
use crate::dispatch::JobDispatcher;
use crate::error::Result;
use crate::filter::{SyncFreshness, DEFAULT_FRESHNESS_DIVISOR};
use crate::poll::{PollConfig, Poller};

/// Default number of recent reports inspected by [`ReplicationClient::sync_policy`].
pub const DEFAULT_REPORTS_PER_POLICY: usize = 5;

/// Tunables for [`ReplicationClient`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorConfig {
    /// Interval and deadline for every wait.
    pub poll: PollConfig,
    /// Number of recent reports inspected for a fresh sync.
    pub reports_per_policy: usize,
    /// A sync younger than `rpo / freshness_divisor` counts as fresh.
    pub freshness_divisor: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll: PollConfig::default(),
            reports_per_policy: DEFAULT_REPORTS_PER_POLICY,
            freshness_divisor: DEFAULT_FRESHNESS_DIVISOR,
        }
    }
}

impl From<&ReplConfig> for OrchestratorConfig {
    fn from(config: &ReplConfig) -> Self {
        Self {
            poll: config.poll_config(),
            reports_per_policy: config.reports_per_policy,
            freshness_divisor: config.freshness_divisor,
        }
    }
}

/// Failover/failback transitions driven through a job action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTransition {
    /// Fail over: make the target writable.
    AllowWrites,
    /// Undo a failover.
    DisallowWrites,
    /// Create the mirror policy used for failback.
    ResyncPrep,
}

impl WriteTransition {
    /// Job action that drives the transition.
    pub fn action(&self) -> JobAction {
        match self {
            WriteTransition::AllowWrites => JobAction::AllowWrite,
            WriteTransition::DisallowWrites => JobAction::AllowWriteRevert,
            WriteTransition::ResyncPrep => JobAction::ResyncPrep,
        }
    }

    /// State the target policy settles in once the action completes.
    pub fn target_state(&self) -> FailoverFailbackState {
        match self {
            WriteTransition::AllowWrites => FailoverFailbackState::WritesEnabled,
            WriteTransition::DisallowWrites => FailoverFailbackState::WritesDisabled,
            WriteTransition::ResyncPrep => FailoverFailbackState::ResyncPolicyCreated,
        }
    }
}

/// Read-only snapshot of a policy's replication state.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyStatus {
    /// Policy name the snapshot was taken for.
    pub name: String,
    /// Source policy, if present on this array.
    pub policy: Option<Policy>,
    /// Target policy, if present on this array.
    pub target: Option<TargetPolicy>,
    /// Newest reports first.
    pub recent_reports: Vec<Report>,
}

/// High-level SyncIQ operations over a [`ReplicationApi`].
#[derive(Clone)]
pub struct ReplicationClient {
    accessor: PolicyAccessor,
    dispatcher: JobDispatcher,
    poller: Poller,
    reports_per_policy: usize,
    freshness_divisor: u32,
    clock: fn() -> i64,
}

impl ReplicationClient {
    /// Build a client over `api`.
    pub fn new(api: Arc<dyn ReplicationApi>, config: OrchestratorConfig) -> Self {
        Self {
            accessor: PolicyAccessor::new(Arc::clone(&api)),
            dispatcher: JobDispatcher::new(api),
            poller: Poller::new(config.poll),
            reports_per_policy: config.reports_per_policy,
            freshness_divisor: config.freshness_divisor,
            clock: unix_now,
        }
    }

    /// Replace the unix-seconds clock used to judge report freshness.
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    fn freshness(&self, rpo_secs: u64) -> SyncFreshness {
        SyncFreshness::new(rpo_secs, self.freshness_divisor, (self.clock)())
    }

    // Policy accessors

    /// Source policy by name, `None` when absent.
    pub async fn get_policy_by_name(
        &self,
        ctx: &CancellationToken,
        name: &str,
    ) -> Result<Option<Policy>> {
        self.accessor.policy(ctx, name).await
    }

    /// Target policy by name, `None` when absent.
    pub async fn get_target_policy_by_name(
        &self,
        ctx: &CancellationToken,
        name: &str,
    ) -> Result<Option<TargetPolicy>> {
        self.accessor.target_policy(ctx, name).await
    }

    /// Create a policy and return its id.
    pub async fn create_policy(&self, ctx: &CancellationToken, spec: &PolicySpec) -> Result<String> {
        self.accessor.create_policy(ctx, spec).await
    }

    /// Delete a source policy by name.
    pub async fn delete_policy(&self, ctx: &CancellationToken, name: &str) -> Result<()> {
        self.accessor.delete_policy(ctx, name).await
    }

    /// Delete a target policy by id.
    pub async fn delete_target_policy(&self, ctx: &CancellationToken, id: &str) -> Result<()> {
        self.accessor.delete_target_policy(ctx, id).await
    }

    /// Remove the target-side record of a relationship, breaking it.
    pub async fn break_association(
        &self,
        ctx: &CancellationToken,
        target_policy_name: &str,
    ) -> Result<()> {
        let target = self
            .accessor
            .require_target_policy(ctx, target_policy_name)
            .await?;
        info!(policy = target_policy_name, id = %target.id, "breaking association");
        self.accessor.delete_target_policy(ctx, &target.id).await
    }

    /// Clear a policy's error state so it can run again.
    pub async fn reset_policy(&self, ctx: &CancellationToken, name: &str) -> Result<()> {
        self.accessor.reset_policy(ctx, name).await
    }

    /// Single report by id.
    pub async fn get_report(&self, ctx: &CancellationToken, id: &str) -> Result<Report> {
        self.accessor.report(ctx, id).await
    }

    /// Most recent `limit` reports for a policy, newest first.
    pub async fn get_reports_by_policy_name(
        &self,
        ctx: &CancellationToken,
        name: &str,
        limit: usize,
    ) -> Result<Vec<Report>> {
        self.accessor.reports_for_policy(ctx, name, limit).await
    }

    /// Read-only snapshot of a policy, its target and recent reports.
    pub async fn status(&self, ctx: &CancellationToken, name: &str) -> Result<PolicyStatus> {
        let policy = self.accessor.policy(ctx, name).await?;
        let target = self.accessor.target_policy(ctx, name).await?;
        let recent_reports = match policy {
            Some(_) => {
                self.accessor
                    .reports_for_policy(ctx, name, self.reports_per_policy)
                    .await?
            }
            None => Vec::new(),
        };
        Ok(PolicyStatus {
            name: name.to_string(),
            policy,
            target,
            recent_reports,
        })
    }

    // Enablement

    /// Set the policy's enabled flag. An absent policy counts as satisfied.
    pub async fn set_policy_enabled(
        &self,
        ctx: &CancellationToken,
        name: &str,
        enabled: bool,
    ) -> Result<()> {
        let Some(policy) = self.accessor.policy(ctx, name).await? else {
            debug!(policy = name, "policy absent, nothing to update");
            return Ok(());
        };
        if policy.enabled == enabled {
            debug!(policy = name, enabled, "policy already in desired state");
            return Ok(());
        }

        info!(policy = name, enabled, "updating policy enabled flag");
        let update = PolicyUpdate::new(policy.id).enabled(enabled);
        self.accessor.update_policy(ctx, &update).await
    }

    /// Shorthand for `set_policy_enabled(name, true)`.
    pub async fn enable_policy(&self, ctx: &CancellationToken, name: &str) -> Result<()> {
        self.set_policy_enabled(ctx, name, true).await
    }

    /// Shorthand for `set_policy_enabled(name, false)`.
    pub async fn disable_policy(&self, ctx: &CancellationToken, name: &str) -> Result<()> {
        self.set_policy_enabled(ctx, name, false).await
    }

    // Failover / failback

    /// Fail over: make the target writable and wait for `writes_enabled`.
    pub async fn allow_writes(&self, ctx: &CancellationToken, name: &str) -> Result<()> {
        self.transition(ctx, name, WriteTransition::AllowWrites).await
    }

    /// Revert a failover and wait for `writes_disabled`.
    pub async fn disallow_writes(&self, ctx: &CancellationToken, name: &str) -> Result<()> {
        self.transition(ctx, name, WriteTransition::DisallowWrites).await
    }

    /// Create the mirror policy and wait for `resync_policy_created`.
    pub async fn resync_prep(&self, ctx: &CancellationToken, name: &str) -> Result<()> {
        self.transition(ctx, name, WriteTransition::ResyncPrep).await
    }

    async fn transition(
        &self,
        ctx: &CancellationToken,
        name: &str,
        transition: WriteTransition,
    ) -> Result<()> {
        let desired = transition.target_state();
        let target = self.accessor.require_target_policy(ctx, name).await?;
        if target.failover_failback_state == desired {
            debug!(policy = name, state = %desired, "target policy already in desired state");
            return Ok(());
        }

        info!(
            policy = name,
            from = %target.failover_failback_state,
            to = %desired,
            action = %transition.action(),
            "starting failover/failback transition"
        );
        self.run_action_for_policy(ctx, name, transition.action())
            .await?;
        self.wait_for_target_policy_state(ctx, name, desired).await
    }

    // Jobs

    /// Submit `action` against the policy without waiting for it.
    pub async fn run_action_for_policy(
        &self,
        ctx: &CancellationToken,
        name: &str,
        action: JobAction,
    ) -> Result<Job> {
        self.dispatcher.run_action(ctx, name, action).await
    }

    /// Submit a raw job request.
    pub async fn start_sync_job(&self, ctx: &CancellationToken, request: &JobRequest) -> Result<Job> {
        self.dispatcher.submit(ctx, request).await
    }

    /// Make sure a sync finished within the last `rpo / freshness_divisor`
    /// seconds, starting one and waiting for its report if not.
    pub async fn sync_policy(&self, ctx: &CancellationToken, name: &str) -> Result<()> {
        let policy = self.accessor.require_policy(ctx, name).await?;
        let rpo = policy.job_delay;
        let limit = self.reports_per_policy;

        let reports = self.accessor.reports_for_policy(ctx, name, limit).await?;
        let fresh = self.freshness(rpo).select(&reports);
        debug!(policy = name, rpo, matched = fresh.len(), "filtered reports");

        if !fresh.is_empty() {
            info!(policy = name, "matching reports were already found");
            return Ok(());
        }

        info!(policy = name, "no matching reports were found, starting sync job");
        self.dispatcher.sync(ctx, name).await?;

        info!(policy = name, "waiting for SyncIQ job to complete");
        let what = format!("fresh sync report for policy {}", name);
        let this = self;
        self.poller
            .poll_until(ctx, &what, move || async move {
                let reports = this.accessor.reports_for_policy(ctx, name, limit).await?;
                Ok(!this.freshness(rpo).select(&reports).is_empty())
            })
            .await
    }

    // Waiters

    /// Poll until the policy's enabled flag equals `enabled`.
    pub async fn wait_for_policy_enabled(
        &self,
        ctx: &CancellationToken,
        name: &str,
        enabled: bool,
    ) -> Result<()> {
        let what = format!("policy {} enabled={}", name, enabled);
        let accessor = &self.accessor;
        self.poller
            .poll_until(ctx, &what, move || async move {
                let policy = accessor.require_policy(ctx, name).await?;
                Ok(policy.enabled == enabled)
            })
            .await
    }

    /// Poll until the policy's last job reached `state`.
    pub async fn wait_for_policy_last_job_state(
        &self,
        ctx: &CancellationToken,
        name: &str,
        state: JobState,
    ) -> Result<()> {
        let what = format!("policy {} last job {}", name, state);
        let accessor = &self.accessor;
        self.poller
            .poll_until(ctx, &what, move || async move {
                let policy = accessor.require_policy(ctx, name).await?;
                Ok(policy.last_job_state == Some(state))
            })
            .await
    }

    /// Poll until the target policy reaches `state`.
    pub async fn wait_for_target_policy_state(
        &self,
        ctx: &CancellationToken,
        name: &str,
        state: FailoverFailbackState,
    ) -> Result<()> {
        let what = format!("target policy {} {}", name, state);
        let accessor = &self.accessor;
        self.poller
            .poll_until(ctx, &what, move || async move {
                let target = accessor.require_target_policy(ctx, name).await?;
                debug!(policy = name, state = %target.failover_failback_state, "observed target policy");
                Ok(target.failover_failback_state == state)
            })
            .await
    }
}
