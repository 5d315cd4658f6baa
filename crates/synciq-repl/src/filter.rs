//! Report selection for sync de-duplication.

use std::time::Duration;

use synciq_transport::{JobAction, JobState, Report};

/// Default fraction of the RPO within which a finished sync counts as fresh.
pub const DEFAULT_FRESHNESS_DIVISOR: u32 = 2;

/// Returns the reports matching `predicate`, preserving order.
pub fn filter_reports<P>(reports: &[Report], predicate: P) -> Vec<Report>
where
    P: Fn(&Report) -> bool,
{
    reports.iter().filter(|r| predicate(r)).cloned().collect()
}

/// Matches finished sync reports that ended less than `rpo / divisor` ago.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncFreshness {
    window_secs: f64,
    now: i64,
}

impl SyncFreshness {
    /// `now` is unix seconds. A divisor of zero is treated as one.
    pub fn new(rpo_secs: u64, divisor: u32, now: i64) -> Self {
        Self {
            window_secs: rpo_secs as f64 / divisor.max(1) as f64,
            now,
        }
    }

    /// Maximum age of a fresh report.
    pub fn window(&self) -> Duration {
        Duration::from_secs_f64(self.window_secs)
    }

    /// True for a finished sync report that ended inside the window.
    pub fn matches(&self, report: &Report) -> bool {
        let is_sync = report.policy.action == JobAction::Sync;
        let is_recent = report
            .end_time
            .map(|end| ((self.now - end) as f64) < self.window_secs)
            .unwrap_or(false);
        let is_finished = report.state == JobState::Finished;

        is_sync && is_recent && is_finished
    }

    /// Order-preserving subset of `reports` that are fresh.
    pub fn select(&self, reports: &[Report]) -> Vec<Report> {
        filter_reports(reports, |r| self.matches(r))
    }
}
