//! Accessor contract for the replication objects of a storage array.
//!
//! The orchestration layer only talks to the array through this trait. The
//! HTTP client and the in-memory array both implement it.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Job, JobRequest, Policy, PolicySpec, PolicyUpdate, Report, TargetPolicy};

/// Typed operations against SyncIQ policies, jobs and reports.
///
/// Implementations must not cache: every call reflects the array's current state.
#[async_trait]
pub trait ReplicationApi: Send + Sync + 'static {
    /// Fetch a policy by name. `Ok(None)` when the array has no such policy.
    async fn get_policy(&self, name: &str) -> Result<Option<Policy>>;

    /// Fetch a target policy by name. `Ok(None)` when absent.
    async fn get_target_policy(&self, name: &str) -> Result<Option<TargetPolicy>>;

    /// Create a policy and return its new id.
    async fn create_policy(&self, spec: &PolicySpec) -> Result<String>;

    /// Delete a policy by name.
    async fn delete_policy(&self, name: &str) -> Result<()>;

    /// Delete a target policy by id.
    async fn delete_target_policy(&self, id: &str) -> Result<()>;

    /// Apply a partial update; only the fields set in `update` change.
    async fn update_policy(&self, update: &PolicyUpdate) -> Result<()>;

    /// Reset a policy so the next job runs a full baseline.
    async fn reset_policy(&self, name: &str) -> Result<()>;

    /// Submit a job request.
    async fn submit_job(&self, request: &JobRequest) -> Result<Job>;

    /// Fetch a single report by id.
    async fn get_report(&self, id: &str) -> Result<Report>;

    /// Fetch the most recent reports for a policy, newest first.
    async fn get_reports_by_policy(&self, name: &str, limit: usize) -> Result<Vec<Report>>;
}
