//! Submission of SyncIQ jobs.

use std::sync::Arc;

use synciq_transport::{Job, JobAction, JobRequest, ReplicationApi};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::accessor::cancellable;
use crate::error::Result;

/// Builds job requests and submits them to the array.
#[derive(Clone)]
pub struct JobDispatcher {
    api: Arc<dyn ReplicationApi>,
}

impl JobDispatcher {
    /// Dispatcher submitting through `api`.
    pub fn new(api: Arc<dyn ReplicationApi>) -> Self {
        Self { api }
    }

    /// Submit an arbitrary job request.
    pub async fn submit(&self, ctx: &CancellationToken, request: &JobRequest) -> Result<Job> {
        let job = cancellable(ctx, self.api.submit_job(request)).await?;
        info!(
            policy = %request.id,
            action = request.action.map(|a| a.as_str()).unwrap_or("sync"),
            job = %job.id,
            "submitted SyncIQ job"
        );
        Ok(job)
    }

    /// Run `action` against the named policy.
    pub async fn run_action(
        &self,
        ctx: &CancellationToken,
        policy_name: &str,
        action: JobAction,
    ) -> Result<Job> {
        self.submit(ctx, &JobRequest::with_action(policy_name, action))
            .await
    }

    /// Start a sync run. The request carries no action; the array defaults to sync.
    pub async fn sync(&self, ctx: &CancellationToken, policy_name: &str) -> Result<Job> {
        self.submit(ctx, &JobRequest::sync(policy_name)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synciq_transport::{FailoverFailbackState, MockArray};

    #[tokio::test]
    async fn test_run_action_carries_action() {
        let array = MockArray::new();
        array.insert_target_policy("pol1", FailoverFailbackState::WritesDisabled);
        let dispatcher = JobDispatcher::new(Arc::new(array.clone()));
        let ctx = CancellationToken::new();

        let job = dispatcher
            .run_action(&ctx, "pol1", JobAction::AllowWrite)
            .await
            .unwrap();
        assert_eq!(job.policy_name, "pol1");
        assert_eq!(
            array.submitted_jobs(),
            vec![JobRequest::with_action("pol1", JobAction::AllowWrite)]
        );
    }

    #[tokio::test]
    async fn test_sync_sends_bare_request() {
        let array = MockArray::new();
        let dispatcher = JobDispatcher::new(Arc::new(array.clone()));
        let ctx = CancellationToken::new();

        dispatcher.sync(&ctx, "pol1").await.unwrap();
        let submitted = array.submitted_jobs();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].action, None);
    }
}
