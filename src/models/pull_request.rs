//! Pull request model.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Lifecycle state of a pull request.
///
/// `Open` is initial, `Merged` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrStatus {
    Open,
    Merged,
}

impl PrStatus {
    pub const ALL: [PrStatus; 2] = [PrStatus::Open, PrStatus::Merged];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Merged => "MERGED",
        }
    }
}

impl FromStr for PrStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(Self::Open),
            "MERGED" => Ok(Self::Merged),
            other => Err(format!("unknown pull request status: {}", other)),
        }
    }
}

impl std::fmt::Display for PrStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pull request with its assigned reviewers.
///
/// `merged_at` is `Some` exactly when `status` is `Merged`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequest {
    pub pull_request_id: String,
    pub pull_request_name: String,
    pub author_id: String,
    pub status: PrStatus,

    /// Reviewer user ids, in assignment order. Never contains the author.
    pub assigned_reviewers: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
}

impl PullRequest {
    pub fn is_merged(&self) -> bool {
        self.status == PrStatus::Merged
    }

    pub fn has_reviewer(&self, user_id: &str) -> bool {
        self.assigned_reviewers.iter().any(|r| r == user_id)
    }

    /// Move the pull request to `Merged`.
    ///
    /// Returns `false` without touching `merged_at` if it was already merged.
    pub fn mark_merged(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_merged() {
            return false;
        }
        self.status = PrStatus::Merged;
        self.merged_at = Some(at);
        true
    }

    /// Swap `old` out of the reviewer list and append `new`.
    pub fn replace_reviewer(&mut self, old: &str, new: &str) {
        self.assigned_reviewers.retain(|r| r != old);
        self.assigned_reviewers.push(new.to_string());
    }
}

/// Input for creating a pull request.
#[derive(Debug, Clone)]
pub struct NewPullRequest {
    pub pull_request_id: String,
    pub pull_request_name: String,
    pub author_id: String,
    pub assigned_reviewers: Vec<String>,
}

/// Row shape of the `pull_requests` table joined with the author.
///
/// Reviewers live in `pr_reviewers` and are joined in by the store.
#[derive(Debug, Clone, FromRow)]
pub struct PullRequestRow {
    pub id: i64,
    pub pull_request_id: String,
    pub pull_request_name: String,
    pub author_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
}

impl PullRequestRow {
    /// Combine the row with its reviewer list.
    pub fn into_pull_request(self, assigned_reviewers: Vec<String>) -> Result<PullRequest, String> {
        Ok(PullRequest {
            status: self.status.parse()?,
            pull_request_id: self.pull_request_id,
            pull_request_name: self.pull_request_name,
            author_id: self.author_id,
            assigned_reviewers,
            created_at: self.created_at,
            merged_at: self.merged_at,
        })
    }
}
