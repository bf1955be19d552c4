//! End-to-end review workflow against a SQLite database file.
//!
//! These tests drive `ReviewService` over `SqliteStore` the same way the HTTP
//! layer does, and then re-open the database to check what was persisted.
//!
//! Workflow scenarios:
//! 1. Create -> reassign -> merge, with state surviving a reopen
//! 2. Reassignment on a merged pull request changes nothing
//! 3. Team deactivation surfaces only OPEN pull requests, then reassignment
//!    moves reviews to another team's member
//! 4. Concurrent deactivation reports each user once
//! 5. A merge or another reassignment that commits while a reassignment is
//!    choosing its candidate wins; the PR is never reopened or double-swapped

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use review_rota::db;
use review_rota::models::{NewPullRequest, NewUser, PrStatus, PullRequest, Stats, Team, User};
use review_rota::store::{EntityStore, InMemoryStore, ReviewerSwap, SqliteStore};
use review_rota::{AppError, ReviewService};
use tempfile::tempdir;

async fn open(path: &Path) -> ReviewService {
    let pool = db::initialize(path, 4).await.unwrap();
    ReviewService::new(Arc::new(SqliteStore::new(pool)))
}

/// Team "backend": u1, u2, u3 active, u4 inactive.
async fn seed_backend(service: &ReviewService) {
    service
        .add_team(
            "backend",
            &[
                NewUser::new("u1", "Alice", true),
                NewUser::new("u2", "Bob", true),
                NewUser::new("u3", "Carol", true),
                NewUser::new("u4", "Dave", false),
            ],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_create_reassign_merge_persists() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("rota.db");

    {
        let service = open(&db_path).await;
        seed_backend(&service).await;

        let pr = service.create_pr("u1", "pr-1", "Add search").await.unwrap();
        assert_eq!(pr.assigned_reviewers, vec!["u2", "u3"]);

        // u4 becomes the only free teammate
        service.set_user_active("u4", true).await.unwrap();
        let (pr, new_reviewer) = service.reassign_reviewer("pr-1", "u2").await.unwrap();
        assert_eq!(new_reviewer, "u4");
        assert_eq!(pr.assigned_reviewers, vec!["u3", "u4"]);

        let merged = service.merge_pr("pr-1").await.unwrap();
        assert_eq!(merged.status, PrStatus::Merged);
    }

    // Reopen the same file with a fresh pool
    let service = open(&db_path).await;
    let pr = service.store().get_pr_by_id("pr-1").await.unwrap().unwrap();
    assert_eq!(pr.status, PrStatus::Merged);
    assert_eq!(pr.assigned_reviewers, vec!["u3", "u4"]);
    assert!(pr.merged_at.is_some());

    let again = service.merge_pr("pr-1").await.unwrap();
    assert_eq!(again.merged_at, pr.merged_at);

    let reviews = service.get_user_reviews("u4").await.unwrap();
    assert_eq!(reviews.len(), 1);
    assert!(service.get_user_reviews("u2").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reassign_on_merged_pr_is_rejected() {
    let dir = tempdir().unwrap();
    let service = open(&dir.path().join("rota.db")).await;
    seed_backend(&service).await;

    service.create_pr("u1", "pr-1", "Add search").await.unwrap();
    let merged = service.merge_pr("pr-1").await.unwrap();

    let err = service.reassign_reviewer("pr-1", "u2").await.unwrap_err();
    assert_eq!(err.code(), "PR_MERGED");

    let stored = service.store().get_pr_by_id("pr-1").await.unwrap().unwrap();
    assert_eq!(stored, merged);
}

#[tokio::test]
async fn test_deactivation_then_reassignment() {
    let dir = tempdir().unwrap();
    let service = open(&dir.path().join("rota.db")).await;
    service
        .add_team(
            "backend",
            &[NewUser::new("u1", "Alice", true), NewUser::new("u2", "Bob", true)],
        )
        .await
        .unwrap();
    service
        .add_team(
            "frontend",
            &[NewUser::new("f1", "Fay", true), NewUser::new("f2", "Gus", true)],
        )
        .await
        .unwrap();

    // Each pull request is reviewed by one backend member
    for (pr_id, name, reviewer) in [("pr-1", "Open work", "u1"), ("pr-2", "Done work", "u2")] {
        service
            .store()
            .create_pr(&NewPullRequest {
                pull_request_id: pr_id.to_string(),
                pull_request_name: name.to_string(),
                author_id: "f1".to_string(),
                assigned_reviewers: vec![reviewer.to_string()],
            })
            .await
            .unwrap();
    }
    service.merge_pr("pr-2").await.unwrap();

    let result = service.deactivate_team("backend").await.unwrap();
    let mut user_ids: Vec<&str> = result.users.iter().map(|u| u.user_id.as_str()).collect();
    user_ids.sort();
    assert_eq!(user_ids, vec!["u1", "u2"]);
    let pr_ids: Vec<&str> = result
        .pull_requests
        .iter()
        .map(|pr| pr.pull_request_id.as_str())
        .collect();
    assert_eq!(pr_ids, vec!["pr-1"]);

    // Backend has no active member left to take over
    let err = service.reassign_reviewer("pr-1", "u1").await.unwrap_err();
    assert_eq!(err.code(), "NO_CANDIDATE");

    // After u1 moves to another team, the replacement comes from there
    service
        .add_team(
            "mobile",
            &[NewUser::new("u1", "Alice", false), NewUser::new("m1", "Mo", true)],
        )
        .await
        .unwrap();
    let (pr, new_reviewer) = service.reassign_reviewer("pr-1", "u1").await.unwrap();
    assert_eq!(new_reviewer, "m1");
    assert_eq!(pr.assigned_reviewers, vec!["m1"]);
}

#[tokio::test]
async fn test_concurrent_deactivation_reports_each_user_once() {
    let dir = tempdir().unwrap();
    let service = open(&dir.path().join("rota.db")).await;
    seed_backend(&service).await;

    let (a, b) = tokio::join!(
        service.deactivate_team("backend"),
        service.deactivate_team("backend")
    );
    let total = a.unwrap().users.len() + b.unwrap().users.len();
    assert_eq!(total, 3);

    let team = service.get_team("backend").await.unwrap();
    assert!(team.members.iter().all(|m| !m.is_active));
}

#[tokio::test]
async fn test_stats_over_sqlite() {
    let dir = tempdir().unwrap();
    let service = open(&dir.path().join("rota.db")).await;
    seed_backend(&service).await;

    service.create_pr("u1", "pr-1", "a").await.unwrap();
    service.create_pr("u2", "pr-2", "b").await.unwrap();
    service.merge_pr("pr-1").await.unwrap();

    let stats = service.get_stats().await.unwrap();
    assert_eq!(stats.total_prs, 2);
    assert_eq!(stats.total_users, 4);
    assert_eq!(stats.active_users, 3);

    // u3 reviews both; u1 and u2 one each
    let top: Vec<(&str, i64)> = stats
        .top_reviewers
        .iter()
        .map(|r| (r.user_id.as_str(), r.assigned_count))
        .collect();
    assert_eq!(top, vec![("u3", 2), ("u1", 1), ("u2", 1)]);
}

/// A write another client commits while a reassignment is between its
/// checks and its store write.
#[derive(Debug, Clone, Copy)]
enum Interleave {
    Merge(&'static str),
    Swap(&'static str, &'static str, &'static str),
}

/// Delegates to `inner`, running one pending `Interleave` against it on the
/// next roster lookup. Reassignment reads the roster after it has checked
/// the pull request, so the interleaved write lands in that window.
struct InterleavingStore {
    inner: Arc<dyn EntityStore>,
    pending: Mutex<Option<Interleave>>,
}

impl InterleavingStore {
    fn new(inner: Arc<dyn EntityStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            pending: Mutex::new(None),
        })
    }

    fn arm(&self, write: Interleave) {
        *self.pending.lock().unwrap() = Some(write);
    }
}

#[async_trait]
impl EntityStore for InterleavingStore {
    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>, AppError> {
        self.inner.get_user_by_id(user_id).await
    }

    async fn get_users_by_team(&self, team_name: &str) -> Result<Vec<User>, AppError> {
        let pending = self.pending.lock().unwrap().take();
        match pending {
            Some(Interleave::Merge(pr_id)) => {
                self.inner.merge_pr(pr_id, Utc::now()).await.unwrap();
            }
            Some(Interleave::Swap(pr_id, old, new)) => {
                let outcome = self.inner.replace_reviewer(pr_id, old, new).await.unwrap();
                assert!(matches!(outcome, ReviewerSwap::Swapped(_)));
            }
            None => {}
        }
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

    async fn create_team(&self, team_name: &str, members: &[NewUser]) -> Result<Team, AppError> {
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
        self.inner.get_open_prs_by_reviewer_ids(user_ids).await
    }

    async fn stats_snapshot(&self, top_reviewers: usize) -> Result<Stats, AppError> {
        self.inner.stats_snapshot(top_reviewers).await
    }
}

/// Team "backend" with u1..u5 all active and pr-1 by u1 reviewed by [u2, u3].
async fn interleaved(inner: Arc<dyn EntityStore>) -> (Arc<InterleavingStore>, ReviewService) {
    let store = InterleavingStore::new(inner);
    let service = ReviewService::new(store.clone());
    let members: Vec<NewUser> = ["u1", "u2", "u3", "u4", "u5"]
        .iter()
        .map(|id| NewUser::new(*id, id.to_uppercase(), true))
        .collect();
    service.add_team("backend", &members).await.unwrap();
    service
        .store()
        .create_pr(&NewPullRequest {
            pull_request_id: "pr-1".to_string(),
            pull_request_name: "Add search".to_string(),
            author_id: "u1".to_string(),
            assigned_reviewers: vec!["u2".to_string(), "u3".to_string()],
        })
        .await
        .unwrap();
    (store, service)
}

async fn sqlite_backend(path: &Path) -> Arc<dyn EntityStore> {
    Arc::new(SqliteStore::new(db::initialize(path, 4).await.unwrap()))
}

async fn assert_merge_survives_reassignment(inner: Arc<dyn EntityStore>) {
    let (store, service) = interleaved(inner).await;
    store.arm(Interleave::Merge("pr-1"));

    let err = service.reassign_reviewer("pr-1", "u2").await.unwrap_err();
    assert_eq!(err.code(), "PR_MERGED");

    let stored = service.store().get_pr_by_id("pr-1").await.unwrap().unwrap();
    assert_eq!(stored.status, PrStatus::Merged);
    assert!(stored.merged_at.is_some());
    assert_eq!(stored.assigned_reviewers, vec!["u2", "u3"]);
}

#[tokio::test]
async fn test_merge_during_reassignment_wins_over_sqlite() {
    let dir = tempdir().unwrap();
    assert_merge_survives_reassignment(sqlite_backend(&dir.path().join("rota.db")).await).await;
}

#[tokio::test]
async fn test_merge_during_reassignment_wins_in_memory() {
    assert_merge_survives_reassignment(Arc::new(InMemoryStore::new())).await;
}

#[tokio::test]
async fn test_competing_reassignments_swap_once() {
    let dir = tempdir().unwrap();
    let (store, service) = interleaved(sqlite_backend(&dir.path().join("rota.db")).await).await;

    // Another client replaces u2 first; this call then has nothing to replace
    store.arm(Interleave::Swap("pr-1", "u2", "u5"));
    let err = service.reassign_reviewer("pr-1", "u2").await.unwrap_err();
    assert_eq!(err.code(), "NOT_ASSIGNED");

    let stored = service.store().get_pr_by_id("pr-1").await.unwrap().unwrap();
    assert_eq!(stored.assigned_reviewers, vec!["u3", "u5"]);
}

#[tokio::test]
async fn test_candidate_taken_by_concurrent_reassignment() {
    let dir = tempdir().unwrap();
    let (store, service) = interleaved(sqlite_backend(&dir.path().join("rota.db")).await).await;

    // This call picks u4 for u2 from a stale view, but u4 already replaced u3
    store.arm(Interleave::Swap("pr-1", "u3", "u4"));
    let err = service.reassign_reviewer("pr-1", "u2").await.unwrap_err();
    assert_eq!(err.code(), "NO_CANDIDATE");

    let stored = service.store().get_pr_by_id("pr-1").await.unwrap().unwrap();
    assert_eq!(stored.assigned_reviewers, vec!["u2", "u4"]);
}

#[tokio::test]
async fn test_parallel_merge_and_reassign_never_reopen() {
    let dir = tempdir().unwrap();
    let service = open(&dir.path().join("rota.db")).await;
    seed_backend(&service).await;
    service.set_user_active("u4", true).await.unwrap();

    for i in 0..20 {
        let pr_id = format!("pr-{}", i);
        service
            .store()
            .create_pr(&NewPullRequest {
                pull_request_id: pr_id.clone(),
                pull_request_name: "Race".to_string(),
                author_id: "u1".to_string(),
                assigned_reviewers: vec!["u2".to_string(), "u3".to_string()],
            })
            .await
            .unwrap();

        let (merged, reassigned) = tokio::join!(
            service.merge_pr(&pr_id),
            service.reassign_reviewer(&pr_id, "u2")
        );
        let merged = merged.unwrap();
        let stored = service.store().get_pr_by_id(&pr_id).await.unwrap().unwrap();
        assert_eq!(stored.status, PrStatus::Merged);
        assert_eq!(stored.merged_at, merged.merged_at);

        match reassigned {
            Ok((pr, new_reviewer)) => {
                assert_eq!(new_reviewer, "u4");
                assert_eq!(pr.assigned_reviewers, stored.assigned_reviewers);
            }
            Err(err) => {
                assert_eq!(err.code(), "PR_MERGED");
                assert_eq!(stored.assigned_reviewers, vec!["u2", "u3"]);
            }
        }
    }
}
