//! `siq-repl` command definitions and output formatting.

use crate::orchestrator::{PolicyStatus, ReplicationClient};
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use synciq_transport::{JobAction, PolicySpec};
use tokio_util::sync::CancellationToken;

/// Command-line interface of `siq-repl`.
#[derive(Parser)]
#[command(name = "siq-repl")]
#[command(about = "SyncIQ failover/failback and sync orchestration", long_about = None)]
pub struct Cli {
    /// Config file, `.toml` or `.json`.
    #[arg(short, long, default_value = "/etc/synciq/repl.toml")]
    pub config: PathBuf,

    /// Overrides the endpoint from the config file.
    #[arg(short, long, env = "SIQ_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Overrides poll_timeout_secs from the config file.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Emit JSON log lines instead of human-readable output.
    #[arg(long)]
    pub json_logs: bool,

    /// Operation to run.
    #[command(subcommand)]
    pub command: Command,
}

/// One subcommand per replication operation.
#[derive(Subcommand)]
pub enum Command {
    /// Show policy, target policy and recent reports.
    Status {
        /// Policy name.
        policy: String,
    },
    /// Enable the policy.
    Enable {
        /// Policy name.
        policy: String,
    },
    /// Disable the policy.
    Disable {
        /// Policy name.
        policy: String,
    },
    /// Fail over: make the target writable.
    AllowWrites {
        /// Policy name.
        policy: String,
    },
    /// Revert a failover on the target.
    DisallowWrites {
        /// Policy name.
        policy: String,
    },
    /// Create the mirror policy for failback.
    ResyncPrep {
        /// Policy name.
        policy: String,
    },
    /// Make sure a recent sync finished, running one if needed.
    Sync {
        /// Policy name.
        policy: String,
    },
    /// Submit a job action without waiting.
    RunAction {
        /// Policy name.
        policy: String,
        /// Action to run.
        #[arg(value_enum)]
        action: ActionArg,
    },
    /// Clear the policy's error state.
    Reset {
        /// Policy name.
        policy: String,
    },
    /// Delete the source policy.
    Delete {
        /// Policy name.
        policy: String,
    },
    /// Delete the target policy, breaking the relationship.
    BreakAssociation {
        /// Target policy name.
        target_policy: String,
    },
    /// Create a new sync policy.
    Create {
        /// Policy name.
        policy: String,
        /// Source directory on this cluster.
        #[arg(long)]
        source_path: String,
        /// Directory on the target cluster.
        #[arg(long)]
        target_path: String,
        /// Target cluster address.
        #[arg(long)]
        target_host: String,
        /// Recovery point objective, stored as the policy job delay.
        #[arg(long, default_value = "3600")]
        rpo_secs: u64,
        /// Create the policy disabled.
        #[arg(long)]
        disabled: bool,
    },
}

/// Job actions accepted by `run-action`.
#[derive(Clone, Copy, ValueEnum)]
pub enum ActionArg {
    /// Replication run.
    Sync,
    /// Prepare the mirror policy.
    ResyncPrep,
    /// Enable writes on the target.
    AllowWrite,
    /// Disable writes on the target again.
    AllowWriteRevert,
    /// Assessment run.
    Test,
}

impl From<ActionArg> for JobAction {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::Sync => JobAction::Sync,
            ActionArg::ResyncPrep => JobAction::ResyncPrep,
            ActionArg::AllowWrite => JobAction::AllowWrite,
            ActionArg::AllowWriteRevert => JobAction::AllowWriteRevert,
            ActionArg::Test => JobAction::Test,
        }
    }
}

impl Command {
    /// Execute the command and print its outcome.
    pub async fn run(self, client: &ReplicationClient, ctx: &CancellationToken) -> Result<()> {
        match self {
            Command::Status { ref policy } => {
                let status = client.status(ctx, policy).await?;
                print_status(&status);
            }
            Command::Enable { ref policy } => {
                client.enable_policy(ctx, policy).await?;
                println!("Policy {}: enabled", policy);
            }
            Command::Disable { ref policy } => {
                client.disable_policy(ctx, policy).await?;
                println!("Policy {}: disabled", policy);
            }
            Command::AllowWrites { ref policy } => {
                client.allow_writes(ctx, policy).await?;
                println!("Policy {}: writes enabled on target", policy);
            }
            Command::DisallowWrites { ref policy } => {
                client.disallow_writes(ctx, policy).await?;
                println!("Policy {}: writes disabled on target", policy);
            }
            Command::ResyncPrep { ref policy } => {
                client.resync_prep(ctx, policy).await?;
                println!("Policy {}: resync policy created", policy);
            }
            Command::Sync { ref policy } => {
                client.sync_policy(ctx, policy).await?;
                println!("Policy {}: in sync", policy);
            }
            Command::RunAction { ref policy, action } => {
                let job = client
                    .run_action_for_policy(ctx, policy, action.into())
                    .await?;
                println!("Job {} submitted for policy {}", job.id, job.policy_name);
            }
            Command::Reset { ref policy } => {
                client.reset_policy(ctx, policy).await?;
                println!("Policy {}: reset", policy);
            }
            Command::Delete { ref policy } => {
                client.delete_policy(ctx, policy).await?;
                println!("Policy {}: deleted", policy);
            }
            Command::BreakAssociation { ref target_policy } => {
                client.break_association(ctx, target_policy).await?;
                println!("Target policy {}: association broken", target_policy);
            }
            Command::Create {
                policy,
                source_path,
                target_path,
                target_host,
                rpo_secs,
                disabled,
            } => {
                let spec = PolicySpec {
                    name: policy,
                    source_root_path: source_path,
                    target_path,
                    target_host,
                    job_delay: rpo_secs,
                    enabled: !disabled,
                };
                let id = client.create_policy(ctx, &spec).await?;
                println!("Policy {}: created with id {}", spec.name, id);
            }
        }
        Ok(())
    }
}

fn format_state<T: std::fmt::Display>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn print_status(status: &PolicyStatus) {
    println!("Policy: {}", status.name);
    match &status.policy {
        Some(policy) => {
            println!("  Enabled:        {}", policy.enabled);
            println!("  RPO:            {}s", policy.job_delay);
            println!("  Last job state: {}", format_state(policy.last_job_state));
            println!("  Source:         {}", policy.source_root_path);
            println!(
                "  Target:         {}:{}",
                policy.target_host, policy.target_path
            );
        }
        None => println!("  (no source policy)"),
    }
    match &status.target {
        Some(target) => println!("  Failover state: {}", target.failover_failback_state),
        None => println!("  (no target policy)"),
    }

    if status.recent_reports.is_empty() {
        return;
    }
    println!();
    println!("{:<30} {:<20} {:<15} {:>12}", "REPORT", "ACTION", "STATE", "END");
    println!("{}", "-".repeat(80));
    for report in &status.recent_reports {
        println!(
            "{:<30} {:<20} {:<15} {:>12}",
            report.id,
            report.policy.action,
            report.state,
            format_state(report.end_time)
        );
    }
}
