//! In-memory [`ReplicationApi`] used by tests.
//!
//! Jobs submitted against the mock settle after a configurable number of
//! reads, mimicking the array finishing the work asynchronously.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::api::ReplicationApi;
use crate::error::{ApiError, Result};
use crate::models::{
    FailoverFailbackState, Job, JobAction, JobRequest, JobState, Policy, PolicySpec, PolicyUpdate,
    Report, ReportPolicy, TargetPolicy, unix_now,
};

/// Accessor operation, used for call accounting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    GetPolicy,
    GetTargetPolicy,
    CreatePolicy,
    DeletePolicy,
    DeleteTargetPolicy,
    UpdatePolicy,
    ResetPolicy,
    SubmitJob,
    GetReport,
    GetReportsByPolicy,
}

struct PendingTarget {
    state: FailoverFailbackState,
    reads_left: u32,
}

struct PendingReport {
    report: Report,
    reads_left: u32,
}

#[derive(Default)]
struct MockState {
    policies: HashMap<String, Policy>,
    targets: HashMap<String, TargetPolicy>,
    /// Newest first.
    reports: HashMap<String, Vec<Report>>,
    pending_targets: HashMap<String, PendingTarget>,
    pending_reports: HashMap<String, PendingReport>,
    calls: HashMap<Op, u32>,
    /// Calls to an op fail once its count exceeds the threshold.
    failures: HashMap<Op, u32>,
    submitted: Vec<JobRequest>,
    updates: Vec<PolicyUpdate>,
    settle_reads: u32,
    latency: Option<Duration>,
    next_id: u64,
}

/// Shared, cloneable in-memory array.
#[derive(Clone, Default)]
pub struct MockArray {
    state: Arc<Mutex<MockState>>,
}

impl MockArray {
    pub fn new() -> Self {
        let array = Self::default();
        array.lock().settle_reads = 1;
        array
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of reads that still observe the pre-job state after a submission.
    pub fn with_settle_reads(self, reads: u32) -> Self {
        self.lock().settle_reads = reads;
        self
    }

    /// Delay every call, to exercise cancellation of in-flight requests.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = Some(latency);
        self
    }

    pub fn insert_policy(&self, name: &str, enabled: bool, job_delay: u64) -> Policy {
        let mut state = self.lock();
        state.next_id += 1;
        let policy = Policy {
            id: format!("{:032x}", state.next_id),
            name: name.to_string(),
            enabled,
            job_delay,
            last_job_state: None,
            action: Some(JobAction::Sync),
            source_root_path: format!("/ifs/data/{}", name),
            target_path: format!("/ifs/replica/{}", name),
            target_host: "target.cluster".to_string(),
            schedule: "when-source-modified".to_string(),
        };
        state.policies.insert(name.to_string(), policy.clone());
        policy
    }

    pub fn insert_target_policy(&self, name: &str, ff_state: FailoverFailbackState) -> TargetPolicy {
        let mut state = self.lock();
        state.next_id += 1;
        let target = TargetPolicy {
            id: format!("{:032x}", state.next_id),
            name: name.to_string(),
            failover_failback_state: ff_state,
            last_job_state: None,
            source_cluster_guid: "000556bc1f3a4ce1d8594a1c5b2d1a49e1fc".to_string(),
            target_path: format!("/ifs/replica/{}", name),
        };
        state.targets.insert(name.to_string(), target.clone());
        target
    }

    /// Adds a report as the newest one for its policy.
    pub fn push_report(&self, report: Report) {
        let mut state = self.lock();
        state
            .reports
            .entry(report.policy_name.clone())
            .or_default()
            .insert(0, report);
    }

    pub fn set_last_job_state(&self, name: &str, job_state: JobState) {
        if let Some(policy) = self.lock().policies.get_mut(name) {
            policy.last_job_state = Some(job_state);
        }
    }

    /// Make every call to `op` after the first `after` calls fail.
    pub fn fail_after(&self, op: Op, after: u32) {
        self.lock().failures.insert(op, after);
    }

    pub fn calls(&self, op: Op) -> u32 {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn submitted_jobs(&self) -> Vec<JobRequest> {
        self.lock().submitted.clone()
    }

    pub fn updates(&self) -> Vec<PolicyUpdate> {
        self.lock().updates.clone()
    }

    pub fn policy(&self, name: &str) -> Option<Policy> {
        self.lock().policies.get(name).cloned()
    }

    pub fn target_policy(&self, name: &str) -> Option<TargetPolicy> {
        self.lock().targets.get(name).cloned()
    }

    /// Records the call, applies latency and injected failures.
    async fn enter(&self, op: Op) -> Result<()> {
        let latency = {
            let mut state = self.lock();
            let count = state.calls.entry(op).or_insert(0);
            *count += 1;
            let count = *count;
            if let Some(after) = state.failures.get(&op) {
                if count > *after {
                    return Err(ApiError::Status {
                        path: format!("mock/{:?}", op),
                        status: 503,
                        message: "injected failure".to_string(),
                    });
                }
            }
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }
}

/// Report the mock produces for a finished job.
pub fn finished_report(policy: &str, action: JobAction, end_time: i64) -> Report {
    Report {
        id: format!("{}-{}", policy, end_time),
        job_id: None,
        policy_name: policy.to_string(),
        policy: ReportPolicy {
            name: policy.to_string(),
            action,
        },
        start_time: Some(end_time - 1),
        end_time: Some(end_time),
        state: JobState::Finished,
    }
}

fn transition_for(action: JobAction) -> Option<(FailoverFailbackState, FailoverFailbackState)> {
    match action {
        JobAction::AllowWrite => Some((
            FailoverFailbackState::EnablingWrites,
            FailoverFailbackState::WritesEnabled,
        )),
        JobAction::AllowWriteRevert => Some((
            FailoverFailbackState::DisablingWrites,
            FailoverFailbackState::WritesDisabled,
        )),
        JobAction::ResyncPrep => Some((
            FailoverFailbackState::CreatingResyncPolicy,
            FailoverFailbackState::ResyncPolicyCreated,
        )),
        JobAction::Sync | JobAction::Copy | JobAction::Test | JobAction::Unknown => None,
    }
}

#[async_trait]
impl ReplicationApi for MockArray {
    async fn get_policy(&self, name: &str) -> Result<Option<Policy>> {
        self.enter(Op::GetPolicy).await?;
        Ok(self.lock().policies.get(name).cloned())
    }

    async fn get_target_policy(&self, name: &str) -> Result<Option<TargetPolicy>> {
        self.enter(Op::GetTargetPolicy).await?;
        let mut state = self.lock();
        let settled = match state.pending_targets.get_mut(name) {
            Some(pending) if pending.reads_left == 0 => Some(pending.state),
            Some(pending) => {
                pending.reads_left -= 1;
                None
            }
            None => None,
        };
        if let Some(ff_state) = settled {
            state.pending_targets.remove(name);
            if let Some(target) = state.targets.get_mut(name) {
                target.failover_failback_state = ff_state;
            }
        }
        Ok(state.targets.get(name).cloned())
    }

    async fn create_policy(&self, spec: &PolicySpec) -> Result<String> {
        self.enter(Op::CreatePolicy).await?;
        let policy = self.insert_policy(&spec.name, spec.enabled, spec.job_delay);
        let mut state = self.lock();
        if let Some(stored) = state.policies.get_mut(&spec.name) {
            stored.source_root_path = spec.source_root_path.clone();
            stored.target_path = spec.target_path.clone();
            stored.target_host = spec.target_host.clone();
        }
        Ok(policy.id)
    }

    async fn delete_policy(&self, name: &str) -> Result<()> {
        self.enter(Op::DeletePolicy).await?;
        match self.lock().policies.remove(name) {
            Some(_) => Ok(()),
            None => Err(ApiError::NotFound {
                kind: "policy",
                name: name.to_string(),
            }),
        }
    }

    async fn delete_target_policy(&self, id: &str) -> Result<()> {
        self.enter(Op::DeleteTargetPolicy).await?;
        let mut state = self.lock();
        let before = state.targets.len();
        state.targets.retain(|_, t| t.id != id);
        if state.targets.len() == before {
            return Err(ApiError::NotFound {
                kind: "target policy",
                name: id.to_string(),
            });
        }
        Ok(())
    }

    async fn update_policy(&self, update: &PolicyUpdate) -> Result<()> {
        self.enter(Op::UpdatePolicy).await?;
        let mut state = self.lock();
        state.updates.push(update.clone());
        let policy = state
            .policies
            .values_mut()
            .find(|p| p.id == update.id)
            .ok_or_else(|| ApiError::NotFound {
                kind: "policy",
                name: update.id.clone(),
            })?;
        if let Some(enabled) = update.enabled {
            policy.enabled = enabled;
        }
        if let Some(job_delay) = update.job_delay {
            policy.job_delay = job_delay;
        }
        if let Some(target_path) = &update.target_path {
            policy.target_path = target_path.clone();
        }
        if let Some(target_host) = &update.target_host {
            policy.target_host = target_host.clone();
        }
        Ok(())
    }

    async fn reset_policy(&self, name: &str) -> Result<()> {
        self.enter(Op::ResetPolicy).await?;
        let mut state = self.lock();
        let policy = state
            .policies
            .get_mut(name)
            .ok_or_else(|| ApiError::NotFound {
                kind: "policy",
                name: name.to_string(),
            })?;
        policy.last_job_state = None;
        Ok(())
    }

    async fn submit_job(&self, request: &JobRequest) -> Result<Job> {
        self.enter(Op::SubmitJob).await?;
        let mut state = self.lock();
        state.submitted.push(request.clone());
        state.next_id += 1;
        let job = Job {
            id: state.next_id.to_string(),
            policy_name: request.id.clone(),
            action: request.action,
            state: Some(JobState::Running),
        };
        let settle_reads = state.settle_reads;

        let action = request.action.unwrap_or(JobAction::Sync);
        match transition_for(action) {
            Some((intermediate, terminal)) => {
                let target = state
                    .targets
                    .get_mut(&request.id)
                    .ok_or_else(|| ApiError::NotFound {
                        kind: "target policy",
                        name: request.id.clone(),
                    })?;
                target.failover_failback_state = intermediate;
                state.pending_targets.insert(
                    request.id.clone(),
                    PendingTarget {
                        state: terminal,
                        reads_left: settle_reads,
                    },
                );
            }
            None => {
                state.pending_reports.insert(
                    request.id.clone(),
                    PendingReport {
                        report: finished_report(&request.id, action, 0),
                        reads_left: settle_reads,
                    },
                );
            }
        }
        Ok(job)
    }

    async fn get_report(&self, id: &str) -> Result<Report> {
        self.enter(Op::GetReport).await?;
        self.lock()
            .reports
            .values()
            .flatten()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound {
                kind: "report",
                name: id.to_string(),
            })
    }

    async fn get_reports_by_policy(&self, name: &str, limit: usize) -> Result<Vec<Report>> {
        self.enter(Op::GetReportsByPolicy).await?;
        let mut state = self.lock();
        let settled = match state.pending_reports.get_mut(name) {
            Some(pending) if pending.reads_left == 0 => true,
            Some(pending) => {
                pending.reads_left -= 1;
                false
            }
            None => false,
        };
        if settled {
            if let Some(pending) = state.pending_reports.remove(name) {
                let now = unix_now();
                let mut report = pending.report;
                report.id = format!("{}-{}", name, now);
                report.start_time = Some(now - 1);
                report.end_time = Some(now);
                state
                    .reports
                    .entry(name.to_string())
                    .or_default()
                    .insert(0, report);
            }
        }
        Ok(state
            .reports
            .get(name)
            .map(|reports| reports.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allow_write_settles_after_reads() {
        let array = MockArray::new().with_settle_reads(2);
        array.insert_policy("pol1", true, 600);
        array.insert_target_policy("pol1", FailoverFailbackState::WritesDisabled);

        array
            .submit_job(&JobRequest::with_action("pol1", JobAction::AllowWrite))
            .await
            .unwrap();

        let mut seen = Vec::new();
        for _ in 0..3 {
            let target = array.get_target_policy("pol1").await.unwrap().unwrap();
            seen.push(target.failover_failback_state);
        }
        assert_eq!(
            seen,
            vec![
                FailoverFailbackState::EnablingWrites,
                FailoverFailbackState::EnablingWrites,
                FailoverFailbackState::WritesEnabled,
            ]
        );
    }

    #[tokio::test]
    async fn test_sync_job_produces_report() {
        let array = MockArray::new().with_settle_reads(0);
        array.insert_policy("pol1", true, 600);
        array.submit_job(&JobRequest::sync("pol1")).await.unwrap();

        let reports = array.get_reports_by_policy("pol1", 5).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].policy.action, JobAction::Sync);
        assert_eq!(reports[0].state, JobState::Finished);
    }

    #[tokio::test]
    async fn test_reports_newest_first_and_limited() {
        let array = MockArray::new();
        for t in 1..=7 {
            array.push_report(finished_report("pol1", JobAction::Sync, t));
        }
        let reports = array.get_reports_by_policy("pol1", 5).await.unwrap();
        let ends: Vec<_> = reports.iter().filter_map(|r| r.end_time).collect();
        assert_eq!(ends, vec![7, 6, 5, 4, 3]);
    }

    #[tokio::test]
    async fn test_fail_after_injects_errors() {
        let array = MockArray::new();
        array.fail_after(Op::GetPolicy, 1);
        assert!(array.get_policy("missing").await.unwrap().is_none());
        let err = array.get_policy("missing").await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 503, .. }));
        assert_eq!(array.calls(Op::GetPolicy), 2);
    }

    #[tokio::test]
    async fn test_update_applies_only_set_fields() {
        let array = MockArray::new();
        let policy = array.insert_policy("pol1", true, 600);
        array
            .update_policy(&PolicyUpdate::new(policy.id.clone()).enabled(false))
            .await
            .unwrap();
        let stored = array.policy("pol1").unwrap();
        assert!(!stored.enabled);
        assert_eq!(stored.job_delay, 600);
    }
}
