//! Common fixtures for orchestration integration tests.

use std::sync::Arc;
use std::time::Duration;

use synciq_repl::{OrchestratorConfig, PollConfig, ReplicationClient};
use synciq_transport::{FailoverFailbackState, MockArray};

/// Fast polling so paused-clock tests stay short.
pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        poll: PollConfig {
            interval: Duration::from_millis(500),
            timeout: Duration::from_secs(60),
        },
        ..Default::default()
    }
}

/// An array holding a source policy and its target policy.
pub struct Fixture {
    pub array: MockArray,
    pub client: ReplicationClient,
}

impl Fixture {
    pub fn new(settle_reads: u32) -> Self {
        let array = MockArray::new().with_settle_reads(settle_reads);
        let client = ReplicationClient::new(Arc::new(array.clone()), test_config());
        Self { array, client }
    }

    pub fn with_policy(self, name: &str, rpo_secs: u64, ff_state: FailoverFailbackState) -> Self {
        self.array.insert_policy(name, true, rpo_secs);
        self.array.insert_target_policy(name, ff_state);
        self
    }
}
