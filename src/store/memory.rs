//! In-memory implementation of `EntityStore`.
//!
//! All entities live behind a single `RwLock`, so every operation is atomic
//! with respect to every other. State is lost on drop.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{EntityStore, ReviewerSwap};
use crate::error::AppError;
use crate::models::{
    NewPullRequest, NewUser, PrStatus, PullRequest, ReviewerStats, Stats, StatusCount, Team, User,
};

#[derive(Debug, Clone)]
struct TeamRecord {
    name: String,
    created_at: DateTime<Utc>,
}

/// Users and pull requests are kept in insertion order, which doubles as
/// roster order and tie-breaker for "newest first" listings.
#[derive(Debug, Default)]
struct Entities {
    teams: Vec<TeamRecord>,
    users: Vec<User>,
    prs: Vec<PullRequest>,
}

impl Entities {
    fn roster(&self, team_name: &str) -> Vec<User> {
        self.users
            .iter()
            .filter(|u| u.is_member_of(team_name))
            .cloned()
            .collect()
    }

    fn team(&self, team_name: &str) -> Option<Team> {
        self.teams
            .iter()
            .find(|t| t.name == team_name)
            .map(|t| Team {
                team_name: t.name.clone(),
                members: self.roster(&t.name),
                created_at: t.created_at,
            })
    }

    fn user_mut(&mut self, user_id: &str) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.user_id == user_id)
    }
}

/// In-memory entity store.
pub struct InMemoryStore {
    entities: RwLock<Entities>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(Entities::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>, AppError> {
        let entities = self.entities.read().await;
        Ok(entities.users.iter().find(|u| u.user_id == user_id).cloned())
    }

    async fn get_users_by_team(&self, team_name: &str) -> Result<Vec<User>, AppError> {
        let entities = self.entities.read().await;
        Ok(entities.roster(team_name))
    }

    async fn create_user(
        &self,
        user: &NewUser,
        team_name: Option<&str>,
    ) -> Result<User, AppError> {
        let mut entities = self.entities.write().await;

        if entities.users.iter().any(|u| u.user_id == user.user_id) {
            return Err(AppError::invalid_input(format!(
                "user '{}' already exists",
                user.user_id
            )));
        }
        if let Some(name) = team_name {
            if !entities.teams.iter().any(|t| t.name == name) {
                return Err(AppError::team_not_found(name));
            }
        }

        let created = User {
            user_id: user.user_id.clone(),
            username: user.username.clone(),
            team_name: team_name.map(str::to_string),
            is_active: user.is_active,
            created_at: Utc::now(),
        };
        entities.users.push(created.clone());
        Ok(created)
    }

    async fn set_user_active(
        &self,
        user_id: &str,
        is_active: bool,
    ) -> Result<Option<User>, AppError> {
        let mut entities = self.entities.write().await;
        Ok(entities.user_mut(user_id).map(|user| {
            user.is_active = is_active;
            user.clone()
        }))
    }

    async fn deactivate_all_by_team(&self, team_name: &str) -> Result<Vec<User>, AppError> {
        let mut entities = self.entities.write().await;
        let mut flipped = Vec::new();

        for user in entities
            .users
            .iter_mut()
            .filter(|u| u.is_active && u.is_member_of(team_name))
        {
            user.is_active = false;
            flipped.push(user.clone());
        }

        Ok(flipped)
    }

    async fn get_team_by_name(&self, team_name: &str) -> Result<Option<Team>, AppError> {
        let entities = self.entities.read().await;
        Ok(entities.team(team_name))
    }

    async fn team_exists_by_name(&self, team_name: &str) -> Result<bool, AppError> {
        let entities = self.entities.read().await;
        Ok(entities.teams.iter().any(|t| t.name == team_name))
    }

    async fn create_team(&self, team_name: &str, members: &[NewUser]) -> Result<Team, AppError> {
        let mut entities = self.entities.write().await;

        if entities.teams.iter().any(|t| t.name == team_name) {
            return Err(AppError::team_exists(team_name));
        }

        let now = Utc::now();
        entities.teams.push(TeamRecord {
            name: team_name.to_string(),
            created_at: now,
        });

        for member in members {
            match entities.user_mut(&member.user_id) {
                Some(existing) => {
                    existing.username = member.username.clone();
                    existing.is_active = member.is_active;
                    existing.team_name = Some(team_name.to_string());
                }
                None => entities.users.push(User {
                    user_id: member.user_id.clone(),
                    username: member.username.clone(),
                    team_name: Some(team_name.to_string()),
                    is_active: member.is_active,
                    created_at: now,
                }),
            }
        }

        entities
            .team(team_name)
            .ok_or_else(|| AppError::internal_with_op("team vanished after insert", "create_team"))
    }

    async fn get_pr_by_id(&self, pr_id: &str) -> Result<Option<PullRequest>, AppError> {
        let entities = self.entities.read().await;
        Ok(entities
            .prs
            .iter()
            .find(|pr| pr.pull_request_id == pr_id)
            .cloned())
    }

    async fn create_pr(&self, pr: &NewPullRequest) -> Result<PullRequest, AppError> {
        let mut entities = self.entities.write().await;

        if entities
            .prs
            .iter()
            .any(|p| p.pull_request_id == pr.pull_request_id)
        {
            return Err(AppError::pr_exists(&pr.pull_request_id));
        }
        if !entities.users.iter().any(|u| u.user_id == pr.author_id) {
            return Err(AppError::user_not_found(&pr.author_id));
        }
        if let Some(unknown) = pr
            .assigned_reviewers
            .iter()
            .find(|r| !entities.users.iter().any(|u| &u.user_id == *r))
        {
            return Err(AppError::user_not_found(unknown));
        }

        let created = PullRequest {
            pull_request_id: pr.pull_request_id.clone(),
            pull_request_name: pr.pull_request_name.clone(),
            author_id: pr.author_id.clone(),
            status: PrStatus::Open,
            assigned_reviewers: pr.assigned_reviewers.clone(),
            created_at: Utc::now(),
            merged_at: None,
        };
        entities.prs.push(created.clone());
        Ok(created)
    }

    async fn merge_pr(
        &self,
        pr_id: &str,
        merged_at: DateTime<Utc>,
    ) -> Result<PullRequest, AppError> {
        let mut entities = self.entities.write().await;

        let stored = entities
            .prs
            .iter_mut()
            .find(|p| p.pull_request_id == pr_id)
            .ok_or_else(|| AppError::pr_not_found(pr_id))?;
        stored.mark_merged(merged_at);
        Ok(stored.clone())
    }

    async fn replace_reviewer(
        &self,
        pr_id: &str,
        old_reviewer_id: &str,
        new_reviewer_id: &str,
    ) -> Result<ReviewerSwap, AppError> {
        let mut entities = self.entities.write().await;

        let new_reviewer_known = entities.users.iter().any(|u| u.user_id == new_reviewer_id);
        let stored = entities
            .prs
            .iter_mut()
            .find(|p| p.pull_request_id == pr_id)
            .ok_or_else(|| AppError::pr_not_found(pr_id))?;

        if stored.is_merged() {
            return Err(AppError::pr_merged(pr_id));
        }
        if !stored.has_reviewer(old_reviewer_id) {
            return Err(AppError::not_assigned(pr_id, old_reviewer_id));
        }
        if stored.has_reviewer(new_reviewer_id) {
            return Ok(ReviewerSwap::AlreadyAssigned);
        }
        if !new_reviewer_known {
            return Err(AppError::user_not_found(new_reviewer_id));
        }

        stored.replace_reviewer(old_reviewer_id, new_reviewer_id);
        Ok(ReviewerSwap::Swapped(stored.clone()))
    }

    async fn get_prs_by_reviewer(&self, user_id: &str) -> Result<Vec<PullRequest>, AppError> {
        let entities = self.entities.read().await;

        let mut prs: Vec<PullRequest> = entities
            .prs
            .iter()
            .rev()
            .filter(|pr| pr.has_reviewer(user_id))
            .cloned()
            .collect();
        // Stable sort keeps later inserts first among equal timestamps
        prs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(prs)
    }

    async fn get_open_prs_by_reviewer_ids(
        &self,
        user_ids: &[String],
    ) -> Result<Vec<PullRequest>, AppError> {
        let wanted: HashSet<&str> = user_ids.iter().map(String::as_str).collect();
        let entities = self.entities.read().await;

        Ok(entities
            .prs
            .iter()
            .filter(|pr| !pr.is_merged())
            .filter(|pr| {
                pr.assigned_reviewers
                    .iter()
                    .any(|r| wanted.contains(r.as_str()))
            })
            .cloned()
            .collect())
    }

    async fn stats_snapshot(&self, top_reviewers: usize) -> Result<Stats, AppError> {
        let entities = self.entities.read().await;

        let prs_by_status = PrStatus::ALL
            .iter()
            .map(|status| StatusCount {
                status: status.to_string(),
                count: entities.prs.iter().filter(|pr| pr.status == *status).count() as i64,
            })
            .collect();

        let mut reviewers: Vec<ReviewerStats> = entities
            .users
            .iter()
            .filter(|u| u.is_active)
            .map(|u| {
                let assigned: Vec<&PullRequest> = entities
                    .prs
                    .iter()
                    .filter(|pr| pr.has_reviewer(&u.user_id))
                    .collect();
                ReviewerStats {
                    user_id: u.user_id.clone(),
                    username: u.username.clone(),
                    assigned_count: assigned.len() as i64,
                    completed_count: assigned.iter().filter(|pr| pr.is_merged()).count() as i64,
                    active_count: assigned.iter().filter(|pr| !pr.is_merged()).count() as i64,
                }
            })
            .filter(|s| s.assigned_count > 0)
            .collect();
        reviewers.sort_by(|a, b| {
            b.assigned_count
                .cmp(&a.assigned_count)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        reviewers.truncate(top_reviewers);

        Ok(Stats {
            total_prs: entities.prs.len() as i64,
            total_users: entities.users.len() as i64,
            active_users: entities.users.iter().filter(|u| u.is_active).count() as i64,
            prs_by_status,
            top_reviewers: reviewers,
        })
    }
}
