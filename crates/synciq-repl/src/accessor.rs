//! Cancellation-aware reads and updates of policies, target policies and reports.

use std::future::Future;
use std::sync::Arc;

use synciq_transport::{Policy, PolicySpec, PolicyUpdate, ReplicationApi, Report, TargetPolicy};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ReplError, Result};

/// Races an accessor call against the caller's token.
///
/// The call is dropped as soon as the token fires, so a cancelled caller never
/// waits on the transport's own timeout.
pub(crate) async fn cancellable<T, F>(ctx: &CancellationToken, call: F) -> Result<T>
where
    F: Future<Output = synciq_transport::Result<T>>,
{
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(ReplError::Cancelled),
        result = call => result.map_err(ReplError::from),
    }
}

/// Thin delegation layer over a [`ReplicationApi`]. Holds no state of its own.
#[derive(Clone)]
pub struct PolicyAccessor {
    api: Arc<dyn ReplicationApi>,
}

impl PolicyAccessor {
    /// Wrap `api`.
    pub fn new(api: Arc<dyn ReplicationApi>) -> Self {
        Self { api }
    }

    /// Source policy by name, `None` when absent.
    pub async fn policy(&self, ctx: &CancellationToken, name: &str) -> Result<Option<Policy>> {
        cancellable(ctx, self.api.get_policy(name)).await
    }

    /// Like [`policy`](Self::policy) but absence is an error.
    pub async fn require_policy(&self, ctx: &CancellationToken, name: &str) -> Result<Policy> {
        self.policy(ctx, name)
            .await?
            .ok_or_else(|| ReplError::NotFound {
                kind: "policy",
                name: name.to_string(),
            })
    }

    /// Target policy by name, `None` when absent.
    pub async fn target_policy(
        &self,
        ctx: &CancellationToken,
        name: &str,
    ) -> Result<Option<TargetPolicy>> {
        cancellable(ctx, self.api.get_target_policy(name)).await
    }

    /// Like [`target_policy`](Self::target_policy) but absence is an error.
    pub async fn require_target_policy(
        &self,
        ctx: &CancellationToken,
        name: &str,
    ) -> Result<TargetPolicy> {
        self.target_policy(ctx, name)
            .await?
            .ok_or_else(|| ReplError::NotFound {
                kind: "target policy",
                name: name.to_string(),
            })
    }

    /// Create a policy and return its id.
    pub async fn create_policy(&self, ctx: &CancellationToken, spec: &PolicySpec) -> Result<String> {
        let id = cancellable(ctx, self.api.create_policy(spec)).await?;
        debug!(policy = %spec.name, %id, "created policy");
        Ok(id)
    }

    /// Delete a source policy by name.
    pub async fn delete_policy(&self, ctx: &CancellationToken, name: &str) -> Result<()> {
        cancellable(ctx, self.api.delete_policy(name)).await
    }

    /// Delete a target policy by id.
    pub async fn delete_target_policy(&self, ctx: &CancellationToken, id: &str) -> Result<()> {
        cancellable(ctx, self.api.delete_target_policy(id)).await
    }

    /// Apply a partial policy update.
    pub async fn update_policy(&self, ctx: &CancellationToken, update: &PolicyUpdate) -> Result<()> {
        debug!(id = %update.id, ?update, "updating policy");
        cancellable(ctx, self.api.update_policy(update)).await
    }

    /// Reset a policy's error state.
    pub async fn reset_policy(&self, ctx: &CancellationToken, name: &str) -> Result<()> {
        cancellable(ctx, self.api.reset_policy(name)).await
    }

    /// Single report by id.
    pub async fn report(&self, ctx: &CancellationToken, id: &str) -> Result<Report> {
        cancellable(ctx, self.api.get_report(id)).await
    }

    /// Most recent `limit` reports for the policy, newest first.
    pub async fn reports_for_policy(
        &self,
        ctx: &CancellationToken,
        name: &str,
        limit: usize,
    ) -> Result<Vec<Report>> {
        cancellable(ctx, self.api.get_reports_by_policy(name, limit)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use synciq_transport::mock::Op;
    use synciq_transport::{ApiError, MockArray};

    #[tokio::test]
    async fn test_require_policy_missing() {
        let accessor = PolicyAccessor::new(Arc::new(MockArray::new()));
        let ctx = CancellationToken::new();
        let err = accessor.require_policy(&ctx, "nope").await.unwrap_err();
        assert!(matches!(err, ReplError::NotFound { kind: "policy", .. }));
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let array = MockArray::new();
        array.fail_after(Op::GetTargetPolicy, 0);
        let accessor = PolicyAccessor::new(Arc::new(array));
        let ctx = CancellationToken::new();
        let err = accessor.target_policy(&ctx, "pol1").await.unwrap_err();
        assert!(matches!(err, ReplError::Api(ApiError::Status { status: 503, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_slow_call() {
        let array = MockArray::new().with_latency(Duration::from_secs(300));
        array.insert_policy("pol1", true, 600);
        let accessor = PolicyAccessor::new(Arc::new(array));
        let ctx = CancellationToken::new();

        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let start = tokio::time::Instant::now();
        let err = accessor.policy(&ctx, "pol1").await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(start.elapsed() < Duration::from_secs(300));
    }
}
