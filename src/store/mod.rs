//! Entity store abstraction.
//!
//! The review services only talk to storage through `EntityStore`, keyed by
//! external identifiers. `SqliteStore` is the durable backend; `InMemoryStore`
//! backs unit tests and ephemeral runs.
//!
//! Implementations must make every multi-row mutation atomic:
//! - `create_team` writes the team and all member rows together
//! - `create_pr` writes the pull request and its reviewer set together
//! - `merge_pr` / `replace_reviewer` check the stored state and write in one step,
//!   so a pull request merged by a concurrent call is never reopened
//! - `deactivate_all_by_team` flips only currently-active rows in one update

mod memory;
mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{NewPullRequest, NewUser, PullRequest, Stats, Team, User};

/// Outcome of `EntityStore::replace_reviewer`.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewerSwap {
    Swapped(PullRequest),
    AlreadyAssigned,
}

/// Storage operations consumed by the review services.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Get a user by external id, `None` if absent.
    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>, AppError>;

    /// Current roster of a team, in enrollment order.
    async fn get_users_by_team(&self, team_name: &str) -> Result<Vec<User>, AppError>;

    /// Create a standalone user, optionally inside an existing team.
    async fn create_user(&self, user: &NewUser, team_name: Option<&str>)
        -> Result<User, AppError>;

    /// Set the active flag, returning the updated user or `None` if absent.
    async fn set_user_active(
        &self,
        user_id: &str,
        is_active: bool,
    ) -> Result<Option<User>, AppError>;

    /// Deactivate every currently-active member of a team.
    ///
    /// Returns only the users this call flipped, so concurrent calls never
    /// report the same user twice.
    async fn deactivate_all_by_team(&self, team_name: &str) -> Result<Vec<User>, AppError>;

    async fn get_team_by_name(&self, team_name: &str) -> Result<Option<Team>, AppError>;

    async fn team_exists_by_name(&self, team_name: &str) -> Result<bool, AppError>;

    /// Create a team and enroll its members.
    ///
    /// Unknown users are created; existing users move into the team and take
    /// the supplied username and active flag. Fails with `TeamExists` if the
    /// name is taken.
    async fn create_team(&self, team_name: &str, members: &[NewUser]) -> Result<Team, AppError>;

    async fn get_pr_by_id(&self, pr_id: &str) -> Result<Option<PullRequest>, AppError>;

    /// Insert an OPEN pull request with its reviewers. Fails with `PrExists`
    /// if the id is taken.
    async fn create_pr(&self, pr: &NewPullRequest) -> Result<PullRequest, AppError>;

    /// Move an OPEN pull request to MERGED with `merged_at`.
    ///
    /// A pull request that is already MERGED is returned unchanged, keeping its
    /// first timestamp. Fails with `PrNotFound` if the id is unknown.
    async fn merge_pr(&self, pr_id: &str, merged_at: DateTime<Utc>)
        -> Result<PullRequest, AppError>;

    /// Swap `old_reviewer_id` for `new_reviewer_id` on an OPEN pull request.
    ///
    /// The checks run against the stored state at write time: `PrNotFound`,
    /// `PrMerged`, or `NotAssigned` when the old reviewer is no longer on the
    /// pull request. If `new_reviewer_id` was assigned in the meantime nothing
    /// is written and `ReviewerSwap::AlreadyAssigned` is returned.
    async fn replace_reviewer(
        &self,
        pr_id: &str,
        old_reviewer_id: &str,
        new_reviewer_id: &str,
    ) -> Result<ReviewerSwap, AppError>;

    /// Pull requests (any status) on which the user is a reviewer, newest first.
    async fn get_prs_by_reviewer(&self, user_id: &str) -> Result<Vec<PullRequest>, AppError>;

    /// OPEN pull requests with at least one reviewer among `user_ids`, each listed once.
    async fn get_open_prs_by_reviewer_ids(
        &self,
        user_ids: &[String],
    ) -> Result<Vec<PullRequest>, AppError>;

    /// Aggregate counts for the statistics report.
    async fn stats_snapshot(&self, top_reviewers: usize) -> Result<Stats, AppError>;
}
