//! Team management and the team deactivation cascade.

use std::collections::HashSet;

use serde::Serialize;

use super::{require_non_empty, ReviewService};
use crate::error::AppError;
use crate::models::{NewUser, PullRequest, Team, User};

/// Result of deactivating a team.
///
/// No reviewer is replaced here; callers reassign each affected pull request
/// through `reassign_reviewer`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Deactivation {
    /// Users this call switched from active to inactive.
    pub users: Vec<User>,
    /// OPEN pull requests reviewed by at least one of `users`, each listed once.
    pub pull_requests: Vec<PullRequest>,
}

impl Deactivation {
    /// Number of affected pull requests on which `user_id` is a reviewer.
    pub fn open_prs_count(&self, user_id: &str) -> usize {
        self.pull_requests
            .iter()
            .filter(|pr| pr.has_reviewer(user_id))
            .count()
    }
}

impl ReviewService {
    /// Create a team and enroll its members.
    ///
    /// Members that already exist move into the new team and take the
    /// supplied username and active flag.
    pub async fn add_team(&self, team_name: &str, members: &[NewUser]) -> Result<Team, AppError> {
        let team_name = require_non_empty(team_name, "team_name")?;
        if members.is_empty() {
            return Err(AppError::invalid_input("team must have at least one member"));
        }

        let mut seen = HashSet::new();
        let mut cleaned = Vec::with_capacity(members.len());
        for member in members {
            let user_id = require_non_empty(&member.user_id, "user_id")?;
            let username = require_non_empty(&member.username, "username")?;
            if !seen.insert(user_id) {
                return Err(AppError::invalid_input(format!(
                    "duplicate member '{}'",
                    user_id
                )));
            }
            cleaned.push(NewUser::new(user_id, username, member.is_active));
        }

        let team = self.store.create_team(team_name, &cleaned).await.map_err(|e| {
            if !e.is_internal() {
                log::warn!("[team] Rejected {}: {}", team_name, e);
            }
            e
        })?;

        log::info!(
            "[team] Created {} with {} members",
            team.team_name,
            team.members.len()
        );
        Ok(team)
    }

    /// Get a team with its roster.
    pub async fn get_team(&self, team_name: &str) -> Result<Team, AppError> {
        let team_name = require_non_empty(team_name, "team_name")?;
        log::debug!("[team] Loading {}", team_name);

        self.store
            .get_team_by_name(team_name)
            .await?
            .ok_or_else(|| AppError::team_not_found(team_name))
    }

    /// Deactivate every active member of a team and report the open pull
    /// requests left with an inactive reviewer.
    pub async fn deactivate_team(&self, team_name: &str) -> Result<Deactivation, AppError> {
        let team_name = require_non_empty(team_name, "team_name")?;

        let team = self
            .store
            .get_team_by_name(team_name)
            .await?
            .ok_or_else(|| AppError::team_not_found(team_name))?;

        let users = self.store.deactivate_all_by_team(&team.team_name).await?;
        if users.is_empty() {
            log::info!("[team] {} has no active members to deactivate", team.team_name);
            return Ok(Deactivation::default());
        }

        let user_ids: Vec<String> = users.iter().map(|u| u.user_id.clone()).collect();
        let pull_requests = self.store.get_open_prs_by_reviewer_ids(&user_ids).await?;

        log::info!(
            "[team] Deactivated {} members of {}; {} open pull requests need new reviewers",
            users.len(),
            team.team_name,
            pull_requests.len()
        );
        Ok(Deactivation {
            users,
            pull_requests,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewPullRequest, Stats};
    use crate::store::{EntityStore, InMemoryStore, ReviewerSwap};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Delegates to `InMemoryStore` and counts pull request lookups by reviewer.
    #[derive(Default)]
    struct CountingStore {
        inner: InMemoryStore,
        pr_lookups: AtomicUsize,
    }

    #[async_trait]
    impl EntityStore for CountingStore {
        async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>, AppError> {
            self.inner.get_user_by_id(user_id).await
        }

        async fn get_users_by_team(&self, team_name: &str) -> Result<Vec<User>, AppError> {
            self.inner.get_users_by_team(team_name).await
        }

        async fn create_user(
            &self,
            user: &NewUser,
            team_name: Option<&str>,
        ) -> Result<User, AppError> {
            self.inner.create_user(user, team_name).await
        }

        async fn set_user_active(
            &self,
            user_id: &str,
            is_active: bool,
        ) -> Result<Option<User>, AppError> {
            self.inner.set_user_active(user_id, is_active).await
        }

        async fn deactivate_all_by_team(&self, team_name: &str) -> Result<Vec<User>, AppError> {
            self.inner.deactivate_all_by_team(team_name).await
        }

        async fn get_team_by_name(&self, team_name: &str) -> Result<Option<Team>, AppError> {
            self.inner.get_team_by_name(team_name).await
        }

        async fn team_exists_by_name(&self, team_name: &str) -> Result<bool, AppError> {
            self.inner.team_exists_by_name(team_name).await
        }

        async fn create_team(
            &self,
            team_name: &str,
            members: &[NewUser],
        ) -> Result<Team, AppError> {
            self.inner.create_team(team_name, members).await
        }

        async fn get_pr_by_id(&self, pr_id: &str) -> Result<Option<PullRequest>, AppError> {
            self.inner.get_pr_by_id(pr_id).await
        }

        async fn create_pr(&self, pr: &NewPullRequest) -> Result<PullRequest, AppError> {
            self.inner.create_pr(pr).await
        }

        async fn merge_pr(
            &self,
            pr_id: &str,
            merged_at: DateTime<Utc>,
        ) -> Result<PullRequest, AppError> {
            self.inner.merge_pr(pr_id, merged_at).await
        }

        async fn replace_reviewer(
            &self,
            pr_id: &str,
            old_reviewer_id: &str,
            new_reviewer_id: &str,
        ) -> Result<ReviewerSwap, AppError> {
            self.inner
                .replace_reviewer(pr_id, old_reviewer_id, new_reviewer_id)
                .await
        }

        async fn get_prs_by_reviewer(&self, user_id: &str) -> Result<Vec<PullRequest>, AppError> {
            self.inner.get_prs_by_reviewer(user_id).await
        }

        async fn get_open_prs_by_reviewer_ids(
            &self,
            user_ids: &[String],
        ) -> Result<Vec<PullRequest>, AppError> {
            self.pr_lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.get_open_prs_by_reviewer_ids(user_ids).await
        }

        async fn stats_snapshot(&self, top_reviewers: usize) -> Result<Stats, AppError> {
            self.inner.stats_snapshot(top_reviewers).await
        }
    }

    fn members(ids: &[(&str, bool)]) -> Vec<NewUser> {
        ids.iter()
            .map(|(id, active)| NewUser::new(*id, id.to_uppercase(), *active))
            .collect()
    }

    #[tokio::test]
    async fn test_add_team_and_get_team() {
        let service = ReviewService::new(Arc::new(InMemoryStore::new()));

        let team = service
            .add_team(" backend ", &members(&[("u1", true), ("u2", false)]))
            .await
            .unwrap();
        assert_eq!(team.team_name, "backend");
        assert_eq!(team.members.len(), 2);

        let fetched = service.get_team("backend").await.unwrap();
        assert_eq!(fetched, team);
        assert_eq!(fetched.members.iter().filter(|m| m.is_active).count(), 1);
    }

    #[tokio::test]
    async fn test_add_team_validation() {
        let service = ReviewService::new(Arc::new(InMemoryStore::new()));

        let err = service.add_team("", &members(&[("u1", true)])).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
        let err = service.add_team("backend", &[]).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
        let err = service
            .add_team("backend", &[NewUser::new("u1", " ", true)])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "username is required");
        let err = service
            .add_team("backend", &members(&[("u1", true), ("u1", false)]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "duplicate member 'u1'");

        assert!(!service.store().team_exists_by_name("backend").await.unwrap());
    }

    #[tokio::test]
    async fn test_add_team_twice() {
        let service = ReviewService::new(Arc::new(InMemoryStore::new()));
        service.add_team("backend", &members(&[("u1", true)])).await.unwrap();

        let err = service
            .add_team("backend", &members(&[("u2", true)]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "TEAM_EXISTS");
    }

    #[tokio::test]
    async fn test_add_team_moves_existing_user() {
        let service = ReviewService::new(Arc::new(InMemoryStore::new()));
        service.add_team("backend", &members(&[("u1", true), ("u2", true)])).await.unwrap();

        service
            .add_team("frontend", &[NewUser::new("u2", "Bobby", false)])
            .await
            .unwrap();

        let backend = service.get_team("backend").await.unwrap();
        assert_eq!(backend.members.len(), 1);
        let moved = service.store().get_user_by_id("u2").await.unwrap().unwrap();
        assert_eq!(moved.team_name.as_deref(), Some("frontend"));
        assert_eq!(moved.username, "Bobby");
        assert!(!moved.is_active);
    }

    #[tokio::test]
    async fn test_get_unknown_team() {
        let service = ReviewService::new(Arc::new(InMemoryStore::new()));

        let err = service.get_team("nobody").await.unwrap_err();
        assert_eq!(err.code(), "TEAM_NOT_FOUND");
        let err = service.deactivate_team("nobody").await.unwrap_err();
        assert_eq!(err.code(), "TEAM_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_deactivate_surfaces_only_open_prs() {
        let service = ReviewService::new(Arc::new(InMemoryStore::new()));
        service.add_team("backend", &members(&[("u1", true), ("u2", true)])).await.unwrap();
        service.add_team("frontend", &members(&[("f1", true)])).await.unwrap();

        for (id, reviewer) in [("pr-1", "u1"), ("pr-2", "u2")] {
            service
                .store()
                .create_pr(&NewPullRequest {
                    pull_request_id: id.to_string(),
                    pull_request_name: id.to_string(),
                    author_id: "f1".to_string(),
                    assigned_reviewers: vec![reviewer.to_string()],
                })
                .await
                .unwrap();
        }
        service.merge_pr("pr-2").await.unwrap();

        let result = service.deactivate_team("backend").await.unwrap();
        let user_ids: Vec<&str> = result.users.iter().map(|u| u.user_id.as_str()).collect();
        assert_eq!(user_ids, vec!["u1", "u2"]);
        assert!(result.users.iter().all(|u| !u.is_active));

        let pr_ids: Vec<&str> = result
            .pull_requests
            .iter()
            .map(|pr| pr.pull_request_id.as_str())
            .collect();
        assert_eq!(pr_ids, vec!["pr-1"]);
        assert_eq!(result.open_prs_count("u1"), 1);
        assert_eq!(result.open_prs_count("u2"), 0);
    }

    #[tokio::test]
    async fn test_deactivate_lists_shared_pr_once() {
        let service = ReviewService::new(Arc::new(InMemoryStore::new()));
        service
            .add_team("backend", &members(&[("u1", true), ("u2", true), ("u3", true)]))
            .await
            .unwrap();
        service.create_pr("u1", "pr-1", "x").await.unwrap();

        let result = service.deactivate_team("backend").await.unwrap();
        assert_eq!(result.users.len(), 3);
        assert_eq!(result.pull_requests.len(), 1);
        assert_eq!(result.open_prs_count("u2"), 1);
    }

    #[tokio::test]
    async fn test_deactivate_inactive_team_skips_pr_lookup() {
        let store = Arc::new(CountingStore::default());
        let service = ReviewService::new(store.clone());
        service.add_team("backend", &members(&[("u1", false), ("u2", false)])).await.unwrap();

        let result = service.deactivate_team("backend").await.unwrap();
        assert_eq!(result, Deactivation::default());
        assert_eq!(store.pr_lookups.load(Ordering::SeqCst), 0);

        service.store().set_user_active("u1", true).await.unwrap();
        let result = service.deactivate_team("backend").await.unwrap();
        assert_eq!(result.users.len(), 1);
        assert_eq!(store.pr_lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deactivate_twice_reports_nothing_new() {
        let service = ReviewService::new(Arc::new(InMemoryStore::new()));
        service.add_team("backend", &members(&[("u1", true)])).await.unwrap();

        assert_eq!(service.deactivate_team("backend").await.unwrap().users.len(), 1);
        assert!(service.deactivate_team("backend").await.unwrap().users.is_empty());
    }
}
