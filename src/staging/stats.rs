//! Read-only progress projections over the proposal store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::proposal::{ProposalKind, ProposalStatus};

/// Decision counters for one annotator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AnnotatorStat {
    pub annotator: String,
    pub reviewed_count: i64,
    pub ignored_count: i64,
    pub total_count: i64,
}

/// The caller's current batch and lifetime decisions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MyTaskStats {
    pub task_type: ProposalKind,
    pub claimed_count: i64,
    pub reviewed_count: i64,
    pub ignored_count: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub remaining_seconds: Option<i64>,
}

impl MyTaskStats {
    /// Build from counters and the lease expiries of the caller's open claims.
    /// The batch expires with its latest lease.
    pub fn from_leases(
        task_type: ProposalKind,
        reviewed_count: i64,
        ignored_count: i64,
        leases: &[DateTime<Utc>],
        now: DateTime<Utc>,
    ) -> Self {
        let expires_at = leases.iter().copied().max();
        Self {
            task_type,
            claimed_count: leases.len() as i64,
            reviewed_count,
            ignored_count,
            expires_at,
            remaining_seconds: expires_at.map(|at| (at - now).num_seconds().max(0)),
        }
    }
}

/// Global status breakdown for one kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOverview {
    pub pending_count: i64,
    pub claimed_count: i64,
    pub reviewed_count: i64,
    pub synced_count: i64,
    pub ignored_count: i64,
    pub total_count: i64,
}

impl TaskOverview {
    pub fn from_counts(counts: &[(ProposalStatus, i64)]) -> Self {
        let mut overview = TaskOverview::default();
        for &(status, count) in counts {
            match status {
                ProposalStatus::Pending => overview.pending_count += count,
                ProposalStatus::Claimed => overview.claimed_count += count,
                ProposalStatus::Reviewed => overview.reviewed_count += count,
                ProposalStatus::Synced => overview.synced_count += count,
                ProposalStatus::Ignored => overview.ignored_count += count,
            }
            overview.total_count += count;
        }
        overview
    }
}
