//! Read-only statistics report.

use serde::Serialize;

/// Review counts for one reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewerStats {
    pub user_id: String,
    pub username: String,
    /// Pull requests the user is assigned to, any status.
    pub assigned_count: i64,
    /// Assigned pull requests that are merged.
    pub completed_count: i64,
    /// Assigned pull requests that are still open.
    pub active_count: i64,
}

/// Pull request count for one status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

/// Aggregate report over the whole store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total_prs: i64,
    pub total_users: i64,
    pub active_users: i64,
    pub prs_by_status: Vec<StatusCount>,
    pub top_reviewers: Vec<ReviewerStats>,
}
