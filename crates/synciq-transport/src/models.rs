//! SyncIQ object model as exposed by the OneFS platform API.
//!
//! All objects are transient read copies of state owned by the array.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Generates the string conversions shared by every wire enum.
///
/// The tags must match the `snake_case` serde names.
macro_rules! wire_enum {
    ($name:ident { $($variant:ident => $tag:literal),+ $(,)? }) => {
        impl $name {
            /// Wire tag for this value.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $tag,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownTag;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($tag => Ok($name::$variant),)+
                    other => Err(UnknownTag {
                        kind: stringify!($name),
                        tag: other.to_string(),
                    }),
                }
            }
        }
    };
}

/// Current wall clock in unix seconds, the unit of report timestamps.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Returned when parsing a tag that is not part of an enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {tag}")]
pub struct UnknownTag {
    /// Enum being parsed.
    pub kind: &'static str,
    /// Offending tag.
    pub tag: String,
}

/// Action carried by a SyncIQ job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    /// Regular replication run.
    Sync,
    /// Copy policy run (no deletes on target).
    Copy,
    /// Prepare the reverse (mirror) policy for failback.
    ResyncPrep,
    /// Enable writes on the target (failover).
    AllowWrite,
    /// Revert a previous allow_write.
    AllowWriteRevert,
    /// Assessment run that transfers no data.
    Test,
    /// Any other tag, such as the per-phase resync_prep actions in report history.
    #[serde(other)]
    Unknown,
}

wire_enum!(JobAction {
    Sync => "sync",
    Copy => "copy",
    ResyncPrep => "resync_prep",
    AllowWrite => "allow_write",
    AllowWriteRevert => "allow_write_revert",
    Test => "test",
    Unknown => "unknown",
});

/// State of a SyncIQ job, as reported by policies and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Scheduled,
    Running,
    Paused,
    Finished,
    Failed,
    Canceled,
    NeedsAttention,
    Skipped,
    Pending,
    #[serde(other)]
    Unknown,
}

wire_enum!(JobState {
    Scheduled => "scheduled",
    Running => "running",
    Paused => "paused",
    Finished => "finished",
    Failed => "failed",
    Canceled => "canceled",
    NeedsAttention => "needs_attention",
    Skipped => "skipped",
    Pending => "pending",
    Unknown => "unknown",
});

impl JobState {
    /// Returns true once the job can no longer change state.
    pub fn is_terminal(&self) -> bool {
        match self {
            JobState::Finished | JobState::Failed | JobState::Canceled | JobState::Skipped => true,
            JobState::Scheduled
            | JobState::Running
            | JobState::Paused
            | JobState::NeedsAttention
            | JobState::Pending
            | JobState::Unknown => false,
        }
    }
}

/// Failover/failback lifecycle of a target policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverFailbackState {
    WritesDisabled,
    EnablingWrites,
    WritesEnabled,
    DisablingWrites,
    CreatingResyncPolicy,
    ResyncPolicyCreated,
}

wire_enum!(FailoverFailbackState {
    WritesDisabled => "writes_disabled",
    EnablingWrites => "enabling_writes",
    WritesEnabled => "writes_enabled",
    DisablingWrites => "disabling_writes",
    CreatingResyncPolicy => "creating_resync_policy",
    ResyncPolicyCreated => "resync_policy_created",
});

impl FailoverFailbackState {
    /// Intermediate states are only observed while the array executes an action.
    pub fn is_transitional(&self) -> bool {
        match self {
            FailoverFailbackState::EnablingWrites
            | FailoverFailbackState::DisablingWrites
            | FailoverFailbackState::CreatingResyncPolicy => true,
            FailoverFailbackState::WritesDisabled
            | FailoverFailbackState::WritesEnabled
            | FailoverFailbackState::ResyncPolicyCreated => false,
        }
    }
}

/// Source-side replication policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    /// Configured RPO in seconds.
    #[serde(default)]
    pub job_delay: u64,
    #[serde(default)]
    pub last_job_state: Option<JobState>,
    #[serde(default)]
    pub action: Option<JobAction>,
    #[serde(default)]
    pub source_root_path: String,
    #[serde(default)]
    pub target_path: String,
    #[serde(default)]
    pub target_host: String,
    #[serde(default)]
    pub schedule: String,
}

/// Parameters for creating a new policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySpec {
    pub name: String,
    pub source_root_path: String,
    pub target_path: String,
    pub target_host: String,
    /// RPO in seconds.
    pub job_delay: u64,
    pub enabled: bool,
}

/// Partial update of a policy. Unset fields are left untouched on the array.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PolicyUpdate {
    /// Identity of the policy; addressed in the URL, never in the body.
    #[serde(skip)]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_delay: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_host: Option<String>,
}

impl PolicyUpdate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }
}

/// Target-side record of a replication relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetPolicy {
    pub id: String,
    pub name: String,
    pub failover_failback_state: FailoverFailbackState,
    #[serde(default)]
    pub last_job_state: Option<JobState>,
    #[serde(default)]
    pub source_cluster_guid: String,
    #[serde(default)]
    pub target_path: String,
}

/// Request to start a job on a policy. Without an action the array runs a sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Policy name.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<JobAction>,
}

impl JobRequest {
    /// Bare request; the array defaults the action to sync.
    pub fn sync(policy_name: impl Into<String>) -> Self {
        Self {
            id: policy_name.into(),
            action: None,
        }
    }

    pub fn with_action(policy_name: impl Into<String>, action: JobAction) -> Self {
        Self {
            id: policy_name.into(),
            action: Some(action),
        }
    }
}

/// Job descriptor returned by job submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(default)]
    pub policy_name: String,
    #[serde(default)]
    pub action: Option<JobAction>,
    #[serde(default)]
    pub state: Option<JobState>,
}

/// Policy summary embedded in a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPolicy {
    pub name: String,
    pub action: JobAction,
}

/// Historical record of a job run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    #[serde(default)]
    pub job_id: Option<u64>,
    #[serde(default)]
    pub policy_name: String,
    pub policy: ReportPolicy,
    #[serde(default)]
    pub start_time: Option<i64>,
    /// Unix seconds; absent while the job is running.
    #[serde(default)]
    pub end_time: Option<i64>,
    pub state: JobState,
}
