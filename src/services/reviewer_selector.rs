//! Reviewer selection.
//!
//! Pure functions over a team roster: no store access, no clock. Callers
//! fetch the roster right before selecting so eligibility always reflects the
//! current team.

use crate::error::AppError;
use crate::models::User;

/// Name of the team `user` currently belongs to.
pub fn require_team(user: &User) -> Result<&str, AppError> {
    user.team_name
        .as_deref()
        .ok_or_else(|| AppError::invalid_input("user has no team"))
}

/// Active roster members other than `excluded_id`, in roster order.
pub fn candidate_pool<'a>(roster: &'a [User], excluded_id: &str) -> Vec<&'a User> {
    roster
        .iter()
        .filter(|member| member.is_active && member.user_id != excluded_id)
        .collect()
}

/// Broadcast mode: every eligible teammate becomes a reviewer.
pub fn select_all(roster: &[User], excluded_id: &str) -> Result<Vec<String>, AppError> {
    let pool = candidate_pool(roster, excluded_id);
    if pool.is_empty() {
        return Err(AppError::invalid_input("no active reviewers in team"));
    }
    Ok(pool.into_iter().map(|m| m.user_id.clone()).collect())
}

/// Single-pick mode: the first eligible teammate not listed in `ineligible`.
pub fn select_one(
    team_name: &str,
    roster: &[User],
    excluded_id: &str,
    ineligible: &[&str],
) -> Result<String, AppError> {
    candidate_pool(roster, excluded_id)
        .into_iter()
        .find(|m| !ineligible.contains(&m.user_id.as_str()))
        .map(|m| m.user_id.clone())
        .ok_or_else(|| AppError::no_candidate(team_name))
}
