//! Pull request lifecycle: creation, merge and reviewer reassignment.
//!
//! A pull request starts `OPEN` and ends `MERGED`. Merging twice is a no-op;
//! any reviewer change on a merged pull request is rejected.
//!
//! The checks here give early, descriptive errors. The store repeats the
//! state checks at write time, so a merge racing a reassignment cannot be
//! undone by it.

use chrono::Utc;

use super::{require_non_empty, reviewer_selector, ReviewService};
use crate::error::AppError;
use crate::models::{NewPullRequest, PullRequest};
use crate::store::ReviewerSwap;

impl ReviewService {
    /// Open a pull request and assign every active teammate of the author.
    ///
    /// # Arguments
    /// * `author_id` - External id of the author; must be active and in a team
    /// * `pr_id` - External pull request id, unique across the store
    /// * `pr_name` - Display name
    ///
    /// # Returns
    /// The stored pull request with its reviewers in roster order
    pub async fn create_pr(
        &self,
        author_id: &str,
        pr_id: &str,
        pr_name: &str,
    ) -> Result<PullRequest, AppError> {
        let pr_id = require_non_empty(pr_id, "pull_request_id")?;
        let pr_name = require_non_empty(pr_name, "pull_request_name")?;
        let author_id = require_non_empty(author_id, "author_id")?;

        let author = self
            .store
            .get_user_by_id(author_id)
            .await?
            .ok_or_else(|| AppError::user_not_found(author_id))?;

        if !author.is_active {
            log::warn!("[pr] Rejected {}: author {} is not active", pr_id, author_id);
            return Err(AppError::invalid_input("author is not active"));
        }

        let team_name = reviewer_selector::require_team(&author)?;
        let roster = self.store.get_users_by_team(team_name).await?;
        let reviewers = reviewer_selector::select_all(&roster, &author.user_id).map_err(|e| {
            log::warn!("[pr] Rejected {}: {}", pr_id, e);
            e
        })?;

        let pr = self
            .store
            .create_pr(&NewPullRequest {
                pull_request_id: pr_id.to_string(),
                pull_request_name: pr_name.to_string(),
                author_id: author.user_id.clone(),
                assigned_reviewers: reviewers,
            })
            .await?;

        log::info!(
            "[pr] Created {} by {} with reviewers {:?}",
            pr.pull_request_id,
            pr.author_id,
            pr.assigned_reviewers
        );
        Ok(pr)
    }

    /// Merge a pull request. Merging an already merged pull request returns
    /// it unchanged.
    pub async fn merge_pr(&self, pr_id: &str) -> Result<PullRequest, AppError> {
        let pr_id = require_non_empty(pr_id, "pull_request_id")?;

        let pr = self
            .store
            .get_pr_by_id(pr_id)
            .await?
            .ok_or_else(|| AppError::pr_not_found(pr_id))?;

        if pr.is_merged() {
            log::debug!("[pr] {} already merged", pr_id);
            return Ok(pr);
        }

        let merged_at = Utc::now();
        let merged = self.store.merge_pr(pr_id, merged_at).await?;
        if merged.merged_at == Some(merged_at) {
            log::info!("[pr] Merged {}", pr_id);
        } else {
            log::debug!("[pr] {} was merged concurrently", pr_id);
        }
        Ok(merged)
    }

    /// Replace `old_reviewer_id` on an open pull request with the first
    /// eligible member of that reviewer's current team.
    ///
    /// Candidates already reviewing the pull request, and its author, are
    /// skipped.
    ///
    /// # Returns
    /// The updated pull request and the id of the new reviewer
    pub async fn reassign_reviewer(
        &self,
        pr_id: &str,
        old_reviewer_id: &str,
    ) -> Result<(PullRequest, String), AppError> {
        let pr_id = require_non_empty(pr_id, "pull_request_id")?;
        let old_reviewer_id = require_non_empty(old_reviewer_id, "old_user_id")?;

        let pr = self
            .store
            .get_pr_by_id(pr_id)
            .await?
            .ok_or_else(|| AppError::pr_not_found(pr_id))?;

        if pr.is_merged() {
            log::warn!("[pr] Rejected reassignment on merged {}", pr_id);
            return Err(AppError::pr_merged(pr_id));
        }

        if !pr.has_reviewer(old_reviewer_id) {
            return Err(AppError::not_assigned(pr_id, old_reviewer_id));
        }

        let old_reviewer = self
            .store
            .get_user_by_id(old_reviewer_id)
            .await?
            .ok_or_else(|| AppError::user_not_found(old_reviewer_id))?;

        let team_name = reviewer_selector::require_team(&old_reviewer)?;
        let roster = self.store.get_users_by_team(team_name).await?;

        let mut ineligible: Vec<&str> = pr.assigned_reviewers.iter().map(String::as_str).collect();
        ineligible.push(&pr.author_id);
        let new_reviewer_id =
            reviewer_selector::select_one(team_name, &roster, old_reviewer_id, &ineligible)
                .map_err(|e| {
                    log::warn!("[pr] No replacement for {} on {}: {}", old_reviewer_id, pr_id, e);
                    e
                })?;

        let updated = match self
            .store
            .replace_reviewer(pr_id, old_reviewer_id, &new_reviewer_id)
            .await
        {
            Ok(ReviewerSwap::Swapped(updated)) => updated,
            Ok(ReviewerSwap::AlreadyAssigned) => {
                log::warn!(
                    "[pr] {} was assigned to {} concurrently, no replacement for {}",
                    new_reviewer_id,
                    pr_id,
                    old_reviewer_id
                );
                return Err(AppError::no_candidate(team_name));
            }
            Err(e) => {
                log::warn!("[pr] Reassignment on {} lost a race: {}", pr_id, e);
                return Err(e);
            }
        };

        log::info!(
            "[pr] Reassigned reviewer on {}: {} -> {} (team {})",
            pr_id,
            old_reviewer_id,
            new_reviewer_id,
            team_name
        );
        Ok((updated, new_reviewer_id))
    }
}
