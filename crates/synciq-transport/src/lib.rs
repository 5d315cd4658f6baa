//! SyncIQ transport subsystem: accessor contract, OneFS platform API client, in-memory array

pub mod api;
pub mod error;
pub mod http;
pub mod mock;
pub mod models;

pub use api::ReplicationApi;
pub use error::{ApiError, Result};
pub use http::{HttpArray, HttpArrayConfig};
pub use mock::MockArray;
pub use models::{
    FailoverFailbackState, Job, JobAction, JobRequest, JobState, Policy, PolicySpec, PolicyUpdate,
    Report, ReportPolicy, TargetPolicy, UnknownTag, unix_now,
};
