//! SQLite implementation of `EntityStore`.
//!
//! Internal row ids never leave this module; callers only see external ids.
//! Multi-row writes run in a single transaction, so a dropped future or a
//! failed statement leaves nothing half-written.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};

use super::{EntityStore, ReviewerSwap};
use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::{
    NewPullRequest, NewUser, PrStatus, PullRequest, PullRequestRow, ReviewerStats, Stats,
    StatusCount, Team, User,
};

const USER_COLUMNS: &str = r#"
    SELECT u.user_id, u.username, t.name AS team_name, u.is_active, u.created_at
    FROM users u
    LEFT JOIN teams t ON t.id = u.team_id
"#;

/// One row per (pull request, reviewer) pair. A pull request without
/// reviewers yields a single row with a NULL `reviewer_id`.
const PR_COLUMNS: &str = r#"
    SELECT pr.id, pr.pull_request_id, pr.pull_request_name, a.user_id AS author_id,
           pr.status, pr.created_at, pr.merged_at, rv.user_id AS reviewer_id
    FROM pull_requests pr
    INNER JOIN users a ON a.id = pr.author_id
    LEFT JOIN pr_reviewers r ON r.pr_id = pr.id
    LEFT JOIN users rv ON rv.id = r.reviewer_id
"#;

/// Upper bound on bound ids per statement, well under SQLite's variable limit.
const MAX_BOUND_IDS: usize = 500;

#[derive(FromRow)]
struct PrReviewerRow {
    #[sqlx(flatten)]
    pr: PullRequestRow,
    reviewer_id: Option<String>,
}

/// Durable entity store backed by a SQLite pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Map a driver error to `Internal`, logging which store operation failed.
fn internal(operation: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |err| {
        log::error!("[db] {} failed: {}", operation, err);
        AppError::internal_with_op(format!("database error: {}", err), operation)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

/// `?, ?, ?` for an `IN (...)` list of `n` items.
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

async fn fetch_user(conn: &mut SqliteConnection, user_id: &str) -> Result<Option<User>, AppError> {
    sqlx::query_as::<_, User>(&format!("{} WHERE u.user_id = ?", USER_COLUMNS))
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(internal("get_user_by_id"))
}

async fn fetch_roster(conn: &mut SqliteConnection, team_name: &str) -> Result<Vec<User>, AppError> {
    sqlx::query_as::<_, User>(&format!("{} WHERE t.name = ? ORDER BY u.id", USER_COLUMNS))
        .bind(team_name)
        .fetch_all(&mut *conn)
        .await
        .map_err(internal("get_users_by_team"))
}

async fn fetch_team(conn: &mut SqliteConnection, team_name: &str) -> Result<Option<Team>, AppError> {
    let row: Option<(String, DateTime<Utc>)> =
        sqlx::query_as("SELECT name, created_at FROM teams WHERE name = ?")
            .bind(team_name)
            .fetch_optional(&mut *conn)
            .await
            .map_err(internal("get_team_by_name"))?;

    let Some((name, created_at)) = row else {
        return Ok(None);
    };

    let members = fetch_roster(conn, &name).await?;
    Ok(Some(Team {
        team_name: name,
        members,
        created_at,
    }))
}

/// Fold joined rows into one entry per pull request.
///
/// Rows of the same pull request must be adjacent and in reviewer order.
fn group_reviewers(rows: Vec<PrReviewerRow>) -> Vec<(PullRequestRow, Vec<String>)> {
    let mut grouped: Vec<(PullRequestRow, Vec<String>)> = Vec::new();
    for PrReviewerRow { pr, reviewer_id } in rows {
        if let Some((last, reviewers)) = grouped.last_mut() {
            if last.id == pr.id {
                reviewers.extend(reviewer_id);
                continue;
            }
        }
        grouped.push((pr, reviewer_id.into_iter().collect()));
    }
    grouped
}

fn into_pull_requests(
    grouped: impl IntoIterator<Item = (PullRequestRow, Vec<String>)>,
) -> Result<Vec<PullRequest>, AppError> {
    grouped
        .into_iter()
        .map(|(row, reviewers)| {
            row.into_pull_request(reviewers)
                .map_err(|e| AppError::internal_with_op(e, "decode_pull_request"))
        })
        .collect()
}

async fn fetch_pr(conn: &mut SqliteConnection, pr_id: &str) -> Result<Option<PullRequest>, AppError> {
    let rows = sqlx::query_as::<_, PrReviewerRow>(&format!(
        "{} WHERE pr.pull_request_id = ? ORDER BY r.position",
        PR_COLUMNS
    ))
    .bind(pr_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(internal("get_pr_by_id"))?;

    Ok(into_pull_requests(group_reviewers(rows))?.pop())
}

/// Insert reviewer rows for `pr_row_id`, preserving list order.
async fn insert_reviewers(
    conn: &mut SqliteConnection,
    pr_row_id: i64,
    reviewers: &[String],
) -> Result<(), AppError> {
    for (position, reviewer_id) in reviewers.iter().enumerate() {
        let inserted = sqlx::query(
            r#"
            INSERT INTO pr_reviewers (pr_id, reviewer_id, position)
            SELECT ?, id, ? FROM users WHERE user_id = ?
            "#,
        )
        .bind(pr_row_id)
        .bind(position as i64)
        .bind(reviewer_id)
        .execute(&mut *conn)
        .await
        .map_err(internal("insert_reviewers"))?;

        if inserted.rows_affected() == 0 {
            return Err(AppError::user_not_found(reviewer_id));
        }
    }
    Ok(())
}

#[async_trait]
impl EntityStore for SqliteStore {
    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_user(&mut conn, user_id).await
    }

    async fn get_users_by_team(&self, team_name: &str) -> Result<Vec<User>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_roster(&mut conn, team_name).await
    }

    async fn create_user(
        &self,
        user: &NewUser,
        team_name: Option<&str>,
    ) -> Result<User, AppError> {
        let mut tx = self.pool.begin().await?;

        let team_id: Option<i64> = match team_name {
            Some(name) => {
                let id: Option<i64> = sqlx::query_scalar("SELECT id FROM teams WHERE name = ?")
                    .bind(name)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(internal("create_user"))?;
                Some(id.ok_or_else(|| AppError::team_not_found(name))?)
            }
            None => None,
        };

        sqlx::query(
            "INSERT INTO users (user_id, username, team_id, is_active, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&user.user_id)
        .bind(&user.username)
        .bind(team_id)
        .bind(user.is_active)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::invalid_input(format!("user '{}' already exists", user.user_id))
            } else {
                internal("create_user")(e)
            }
        })?;

        let created = fetch_user(&mut tx, &user.user_id)
            .await?
            .ok_or_else(|| AppError::internal_with_op("user vanished after insert", "create_user"))?;
        tx.commit().await?;
        Ok(created)
    }

    async fn set_user_active(
        &self,
        user_id: &str,
        is_active: bool,
    ) -> Result<Option<User>, AppError> {
        let mut conn = self.pool.acquire().await?;

        let updated = sqlx::query("UPDATE users SET is_active = ? WHERE user_id = ?")
            .bind(is_active)
            .bind(user_id)
            .execute(&mut *conn)
            .await
            .map_err(internal("set_user_active"))?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        fetch_user(&mut conn, user_id).await
    }

    async fn deactivate_all_by_team(&self, team_name: &str) -> Result<Vec<User>, AppError> {
        let rows: Vec<(String, String, bool, DateTime<Utc>)> = sqlx::query_as(
            r#"
            UPDATE users
            SET is_active = 0
            WHERE is_active = 1
              AND team_id = (SELECT id FROM teams WHERE name = ?)
            RETURNING user_id, username, is_active, created_at
            "#,
        )
        .bind(team_name)
        .fetch_all(&self.pool)
        .await
        .map_err(internal("deactivate_all_by_team"))?;

        Ok(rows
            .into_iter()
            .map(|(user_id, username, is_active, created_at)| User {
                user_id,
                username,
                team_name: Some(team_name.to_string()),
                is_active,
                created_at,
            })
            .collect())
    }

    async fn get_team_by_name(&self, team_name: &str) -> Result<Option<Team>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_team(&mut conn, team_name).await
    }

    async fn team_exists_by_name(&self, team_name: &str) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM teams WHERE name = ?)")
            .bind(team_name)
            .fetch_one(&self.pool)
            .await
            .map_err(internal("team_exists_by_name"))?;
        Ok(exists)
    }

    async fn create_team(&self, team_name: &str, members: &[NewUser]) -> Result<Team, AppError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let team_id: i64 =
            sqlx::query_scalar("INSERT INTO teams (name, created_at) VALUES (?, ?) RETURNING id")
                .bind(team_name)
                .bind(now)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        AppError::team_exists(team_name)
                    } else {
                        internal("create_team")(e)
                    }
                })?;

        for member in members {
            sqlx::query(
                r#"
                INSERT INTO users (user_id, username, team_id, is_active, created_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(user_id) DO UPDATE SET
                    username = excluded.username,
                    team_id = excluded.team_id,
                    is_active = excluded.is_active
                "#,
            )
            .bind(&member.user_id)
            .bind(&member.username)
            .bind(team_id)
            .bind(member.is_active)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(internal("enroll_member"))?;
        }

        let team = fetch_team(&mut tx, team_name)
            .await?
            .ok_or_else(|| AppError::internal_with_op("team vanished after insert", "create_team"))?;
        tx.commit().await?;
        Ok(team)
    }

    async fn get_pr_by_id(&self, pr_id: &str) -> Result<Option<PullRequest>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_pr(&mut conn, pr_id).await
    }

    async fn create_pr(&self, pr: &NewPullRequest) -> Result<PullRequest, AppError> {
        let mut tx = self.pool.begin().await?;

        let author_row_id: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE user_id = ?")
            .bind(&pr.author_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(internal("create_pr"))?;
        let author_row_id = author_row_id.ok_or_else(|| AppError::user_not_found(&pr.author_id))?;

        let pr_row_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO pull_requests (pull_request_id, pull_request_name, author_id, status, created_at)
            VALUES (?, ?, ?, 'OPEN', ?)
            RETURNING id
            "#,
        )
        .bind(&pr.pull_request_id)
        .bind(&pr.pull_request_name)
        .bind(author_row_id)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::pr_exists(&pr.pull_request_id)
            } else {
                internal("create_pr")(e)
            }
        })?;

        insert_reviewers(&mut tx, pr_row_id, &pr.assigned_reviewers).await?;

        let created = fetch_pr(&mut tx, &pr.pull_request_id)
            .await?
            .ok_or_else(|| AppError::internal_with_op("pull request vanished after insert", "create_pr"))?;
        tx.commit().await?;
        Ok(created)
    }

    async fn merge_pr(
        &self,
        pr_id: &str,
        merged_at: DateTime<Utc>,
    ) -> Result<PullRequest, AppError> {
        let mut conn = self.pool.acquire().await?;

        let merged = sqlx::query(
            r#"
            UPDATE pull_requests
            SET status = 'MERGED', merged_at = ?
            WHERE pull_request_id = ? AND status = 'OPEN'
            "#,
        )
        .bind(merged_at)
        .bind(pr_id)
        .execute(&mut *conn)
        .await
        .map_err(internal("merge_pr"))?;

        if merged.rows_affected() == 0 {
            log::debug!("[db] merge of {} matched no OPEN row", pr_id);
        }
        fetch_pr(&mut conn, pr_id)
            .await?
            .ok_or_else(|| AppError::pr_not_found(pr_id))
    }

    async fn replace_reviewer(
        &self,
        pr_id: &str,
        old_reviewer_id: &str,
        new_reviewer_id: &str,
    ) -> Result<ReviewerSwap, AppError> {
        let mut tx = self.pool.begin().await?;

        // Writing first takes the database write lock, so the checks below see
        // the latest committed state and nothing can commit in between.
        let claimed: Option<(i64, String)> = sqlx::query_as(
            r#"
            UPDATE pull_requests
            SET status = status
            WHERE pull_request_id = ?
            RETURNING id, status
            "#,
        )
        .bind(pr_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(internal("replace_reviewer"))?;

        let (pr_row_id, status) = claimed.ok_or_else(|| AppError::pr_not_found(pr_id))?;
        if status != PrStatus::Open.as_str() {
            return Err(AppError::pr_merged(pr_id));
        }

        let removed = sqlx::query(
            r#"
            DELETE FROM pr_reviewers
            WHERE pr_id = ? AND reviewer_id = (SELECT id FROM users WHERE user_id = ?)
            "#,
        )
        .bind(pr_row_id)
        .bind(old_reviewer_id)
        .execute(&mut *tx)
        .await
        .map_err(internal("replace_reviewer"))?;
        if removed.rows_affected() == 0 {
            return Err(AppError::not_assigned(pr_id, old_reviewer_id));
        }

        let already_assigned: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1
                FROM pr_reviewers r
                INNER JOIN users u ON u.id = r.reviewer_id
                WHERE r.pr_id = ? AND u.user_id = ?
            )
            "#,
        )
        .bind(pr_row_id)
        .bind(new_reviewer_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(internal("replace_reviewer"))?;
        if already_assigned {
            // Dropping the transaction rolls back the delete
            return Ok(ReviewerSwap::AlreadyAssigned);
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO pr_reviewers (pr_id, reviewer_id, position)
            SELECT ?, id, (SELECT COALESCE(MAX(position), -1) + 1 FROM pr_reviewers WHERE pr_id = ?)
            FROM users
            WHERE user_id = ?
            "#,
        )
        .bind(pr_row_id)
        .bind(pr_row_id)
        .bind(new_reviewer_id)
        .execute(&mut *tx)
        .await
        .map_err(internal("replace_reviewer"))?;
        if inserted.rows_affected() == 0 {
            return Err(AppError::user_not_found(new_reviewer_id));
        }

        let updated = fetch_pr(&mut tx, pr_id)
            .await?
            .ok_or_else(|| AppError::pr_not_found(pr_id))?;
        tx.commit().await?;
        Ok(ReviewerSwap::Swapped(updated))
    }

    async fn get_prs_by_reviewer(&self, user_id: &str) -> Result<Vec<PullRequest>, AppError> {
        let rows = sqlx::query_as::<_, PrReviewerRow>(&format!(
            r#"
            {}
            WHERE EXISTS (
                SELECT 1
                FROM pr_reviewers mine
                INNER JOIN users me ON me.id = mine.reviewer_id
                WHERE mine.pr_id = pr.id AND me.user_id = ?
            )
            ORDER BY pr.created_at DESC, pr.id DESC, r.position
            "#,
            PR_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(internal("get_prs_by_reviewer"))?;

        into_pull_requests(group_reviewers(rows))
    }

    async fn get_open_prs_by_reviewer_ids(
        &self,
        user_ids: &[String],
    ) -> Result<Vec<PullRequest>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let mut by_row_id: BTreeMap<i64, (PullRequestRow, Vec<String>)> = BTreeMap::new();

        for chunk in user_ids.chunks(MAX_BOUND_IDS) {
            let sql = format!(
                r#"
                {}
                WHERE pr.status = 'OPEN'
                  AND EXISTS (
                      SELECT 1
                      FROM pr_reviewers theirs
                      INNER JOIN users u ON u.id = theirs.reviewer_id
                      WHERE theirs.pr_id = pr.id AND u.user_id IN ({})
                  )
                ORDER BY pr.id, r.position
                "#,
                PR_COLUMNS,
                placeholders(chunk.len())
            );

            let mut query = sqlx::query_as::<_, PrReviewerRow>(&sql);
            for user_id in chunk {
                query = query.bind(user_id);
            }
            let rows = query
                .fetch_all(&mut *conn)
                .await
                .map_err(internal("get_open_prs_by_reviewer_ids"))?;

            for (row, reviewers) in group_reviewers(rows) {
                by_row_id.entry(row.id).or_insert((row, reviewers));
            }
        }

        into_pull_requests(by_row_id.into_values())
    }

    async fn stats_snapshot(&self, top_reviewers: usize) -> Result<Stats, AppError> {
        let mut conn = self.pool.acquire().await?;

        let total_prs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pull_requests")
            .fetch_one(&mut *conn)
            .await
            .map_err(internal("stats_snapshot"))?;
        let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *conn)
            .await
            .map_err(internal("stats_snapshot"))?;
        let active_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE is_active = 1")
            .fetch_one(&mut *conn)
            .await
            .map_err(internal("stats_snapshot"))?;

        let counts: HashMap<String, i64> =
            sqlx::query_as::<_, (String, i64)>("SELECT status, COUNT(*) FROM pull_requests GROUP BY status")
                .fetch_all(&mut *conn)
                .await
                .map_err(internal("stats_snapshot"))?
                .into_iter()
                .collect();
        let prs_by_status = PrStatus::ALL
            .iter()
            .map(|status| StatusCount {
                status: status.to_string(),
                count: counts.get(status.as_str()).copied().unwrap_or(0),
            })
            .collect();

        let reviewers: Vec<(String, String, i64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT u.user_id,
                   u.username,
                   COUNT(pr.id) AS assigned_count,
                   SUM(CASE WHEN pr.status = 'MERGED' THEN 1 ELSE 0 END) AS completed_count,
                   SUM(CASE WHEN pr.status = 'OPEN' THEN 1 ELSE 0 END) AS active_count
            FROM users u
            INNER JOIN pr_reviewers r ON r.reviewer_id = u.id
            INNER JOIN pull_requests pr ON pr.id = r.pr_id
            WHERE u.is_active = 1
            GROUP BY u.id
            ORDER BY assigned_count DESC, u.user_id ASC
            LIMIT ?
            "#,
        )
        .bind(top_reviewers as i64)
        .fetch_all(&mut *conn)
        .await
        .map_err(internal("stats_snapshot"))?;

        Ok(Stats {
            total_prs,
            total_users,
            active_users,
            prs_by_status,
            top_reviewers: reviewers
                .into_iter()
                .map(
                    |(user_id, username, assigned_count, completed_count, active_count)| {
                        ReviewerStats {
                            user_id,
                            username,
                            assigned_count,
                            completed_count,
                            active_count,
                        }
                    },
                )
                .collect(),
        })
    }
}
