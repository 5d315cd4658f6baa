#![warn(missing_docs)]

//! SyncIQ replication subsystem: failover/failback orchestration and sync reconciliation

pub mod accessor;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod orchestrator;
pub mod poll;

pub use config::ReplConfig;
pub use error::{ReplError, Result};
pub use orchestrator::{OrchestratorConfig, PolicyStatus, ReplicationClient, WriteTransition};
pub use poll::{PollConfig, Poller};
