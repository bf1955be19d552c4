//! REST API routes.
//!
//! Thin JSON adapters over `ReviewService`. This module owns the only mapping
//! from error kinds to HTTP status codes.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{NewUser, PullRequest, Stats, Team, User};
use crate::services::{Deactivation, ReviewService};

// ── Error handling ───────────────────────────────────────────────────────────

/// Error kind → HTTP status.
const STATUS_BY_CODE: &[(&str, StatusCode)] = &[
    ("INVALID_INPUT", StatusCode::BAD_REQUEST),
    ("TEAM_EXISTS", StatusCode::BAD_REQUEST),
    ("USER_NOT_FOUND", StatusCode::NOT_FOUND),
    ("TEAM_NOT_FOUND", StatusCode::NOT_FOUND),
    ("PR_NOT_FOUND", StatusCode::NOT_FOUND),
    ("PR_EXISTS", StatusCode::CONFLICT),
    ("PR_MERGED", StatusCode::CONFLICT),
    ("NOT_ASSIGNED", StatusCode::CONFLICT),
    ("NO_CANDIDATE", StatusCode::CONFLICT),
    ("INTERNAL_ERROR", StatusCode::INTERNAL_SERVER_ERROR),
];

pub fn status_for(code: &str) -> StatusCode {
    STATUS_BY_CODE
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, status)| *status)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

/// Wrapper to make AppError usable as an axum error response.
pub struct ApiErr(AppError);

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let message = if self.0.is_internal() {
            log::error!("[api] {}", self.0);
            "internal server error".to_string()
        } else {
            self.0.to_string()
        };

        (
            status_for(code),
            Json(ErrorBody {
                error: ErrorDetail { code, message },
            }),
        )
            .into_response()
    }
}

impl From<AppError> for ApiErr {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiErr {
    fn from(rejection: JsonRejection) -> Self {
        Self(AppError::invalid_input(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiErr {
    fn from(rejection: QueryRejection) -> Self {
        Self(AppError::invalid_input(rejection.body_text()))
    }
}

// ── Request types ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TeamMemberDto {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct AddTeamRequest {
    pub team_name: String,
    pub members: Vec<TeamMemberDto>,
}

#[derive(Debug, Deserialize)]
pub struct DeactivateTeamRequest {
    pub team_name: String,
}

#[derive(Debug, Deserialize)]
pub struct SetIsActiveRequest {
    pub user_id: String,
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreatePrRequest {
    pub pull_request_id: String,
    pub pull_request_name: String,
    pub author_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MergePrRequest {
    pub pull_request_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ReassignRequest {
    pub pull_request_id: String,
    pub old_user_id: String,
}

#[derive(Debug, Deserialize)]
struct TeamQuery {
    #[serde(default)]
    team_name: String,
}

#[derive(Debug, Deserialize)]
struct UserQuery {
    #[serde(default)]
    user_id: String,
}

// ── Response types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct TeamMemberResponse {
    pub user_id: String,
    pub username: String,
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct TeamResponse {
    pub team_name: String,
    pub members: Vec<TeamMemberResponse>,
}

impl From<Team> for TeamResponse {
    fn from(team: Team) -> Self {
        Self {
            team_name: team.team_name,
            members: team
                .members
                .into_iter()
                .map(|m| TeamMemberResponse {
                    user_id: m.user_id,
                    username: m.username,
                    is_active: m.is_active,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user_id: String,
    pub username: String,
    pub team_name: String,
    pub is_active: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username,
            team_name: user.team_name.unwrap_or_default(),
            is_active: user.is_active,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PullRequestResponse {
    pub pull_request_id: String,
    pub pull_request_name: String,
    pub author_id: String,
    pub status: String,
    pub assigned_reviewers: Vec<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "mergedAt", skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<DateTime<Utc>>,
}

impl From<PullRequest> for PullRequestResponse {
    fn from(pr: PullRequest) -> Self {
        Self {
            pull_request_id: pr.pull_request_id,
            pull_request_name: pr.pull_request_name,
            author_id: pr.author_id,
            status: pr.status.to_string(),
            assigned_reviewers: pr.assigned_reviewers,
            created_at: pr.created_at,
            merged_at: pr.merged_at,
        }
    }
}

/// Listing shape without reviewers or timestamps.
#[derive(Debug, Serialize)]
pub struct PullRequestShort {
    pub pull_request_id: String,
    pub pull_request_name: String,
    pub author_id: String,
    pub status: String,
}

impl From<PullRequest> for PullRequestShort {
    fn from(pr: PullRequest) -> Self {
        Self {
            pull_request_id: pr.pull_request_id,
            pull_request_name: pr.pull_request_name,
            author_id: pr.author_id,
            status: pr.status.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct TeamEnvelope {
    team: TeamResponse,
}

#[derive(Debug, Serialize)]
struct UserEnvelope {
    user: UserResponse,
}

#[derive(Debug, Serialize)]
struct PrEnvelope {
    pr: PullRequestResponse,
}

#[derive(Debug, Serialize)]
struct ReassignResponse {
    pr: PullRequestResponse,
    replaced_by: String,
}

#[derive(Debug, Serialize)]
struct UserReviewsResponse {
    user_id: String,
    pull_requests: Vec<PullRequestShort>,
}

#[derive(Debug, Serialize)]
pub struct DeactivatedUserInfo {
    pub user_id: String,
    pub username: String,
    pub open_prs_count: usize,
}

#[derive(Debug, Serialize)]
pub struct DeactivateTeamResponse {
    pub deactivated_users: usize,
    pub reassigned_prs: usize,
    pub users: Vec<DeactivatedUserInfo>,
    pub pull_requests: Vec<PullRequestShort>,
}

impl From<Deactivation> for DeactivateTeamResponse {
    fn from(result: Deactivation) -> Self {
        let users = result
            .users
            .iter()
            .map(|u| DeactivatedUserInfo {
                user_id: u.user_id.clone(),
                username: u.username.clone(),
                open_prs_count: result.open_prs_count(&u.user_id),
            })
            .collect();

        Self {
            deactivated_users: result.users.len(),
            reassigned_prs: result.pull_requests.len(),
            users,
            pull_requests: result
                .pull_requests
                .into_iter()
                .map(PullRequestShort::from)
                .collect(),
        }
    }
}

// ── Route builder ────────────────────────────────────────────────────────────

/// Build the review API routes.
pub fn review_routes() -> Router<ReviewService> {
    Router::new()
        .route("/team/add", post(add_team))
        .route("/team/get", get(get_team))
        .route("/team/deactivate", post(deactivate_team))
        .route("/users/setIsActive", post(set_is_active))
        .route("/users/getReview", get(get_review))
        .route("/pullRequest/create", post(create_pr))
        .route("/pullRequest/merge", post(merge_pr))
        .route("/pullRequest/reassign", post(reassign_pr))
        .route("/stats", get(get_stats))
        .route("/health", get(health))
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST /team/add: create a team with its members.
async fn add_team(
    State(service): State<ReviewService>,
    payload: Result<Json<AddTeamRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TeamEnvelope>), ApiErr> {
    let Json(req) = payload?;
    let members: Vec<NewUser> = req
        .members
        .into_iter()
        .map(|m| NewUser::new(m.user_id, m.username, m.is_active))
        .collect();

    let team = service.add_team(&req.team_name, &members).await?;
    Ok((
        StatusCode::CREATED,
        Json(TeamEnvelope { team: team.into() }),
    ))
}

/// GET /team/get?team_name=X: team with roster.
async fn get_team(
    State(service): State<ReviewService>,
    params: Result<Query<TeamQuery>, QueryRejection>,
) -> Result<Json<TeamResponse>, ApiErr> {
    let Query(params) = params?;
    let team = service.get_team(&params.team_name).await?;
    Ok(Json(team.into()))
}

/// POST /team/deactivate: deactivate members and list stranded pull requests.
async fn deactivate_team(
    State(service): State<ReviewService>,
    payload: Result<Json<DeactivateTeamRequest>, JsonRejection>,
) -> Result<Json<DeactivateTeamResponse>, ApiErr> {
    let Json(req) = payload?;
    let result = service.deactivate_team(&req.team_name).await?;
    Ok(Json(result.into()))
}

/// POST /users/setIsActive
async fn set_is_active(
    State(service): State<ReviewService>,
    payload: Result<Json<SetIsActiveRequest>, JsonRejection>,
) -> Result<Json<UserEnvelope>, ApiErr> {
    let Json(req) = payload?;
    let user = service.set_user_active(&req.user_id, req.is_active).await?;
    Ok(Json(UserEnvelope { user: user.into() }))
}

/// GET /users/getReview?user_id=X: pull requests the user reviews.
async fn get_review(
    State(service): State<ReviewService>,
    params: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<UserReviewsResponse>, ApiErr> {
    let Query(params) = params?;
    let prs = service.get_user_reviews(&params.user_id).await?;
    Ok(Json(UserReviewsResponse {
        user_id: params.user_id.trim().to_string(),
        pull_requests: prs.into_iter().map(PullRequestShort::from).collect(),
    }))
}

/// POST /pullRequest/create
async fn create_pr(
    State(service): State<ReviewService>,
    payload: Result<Json<CreatePrRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PrEnvelope>), ApiErr> {
    let Json(req) = payload?;
    let pr = service
        .create_pr(&req.author_id, &req.pull_request_id, &req.pull_request_name)
        .await?;
    Ok((StatusCode::CREATED, Json(PrEnvelope { pr: pr.into() })))
}

/// POST /pullRequest/merge
async fn merge_pr(
    State(service): State<ReviewService>,
    payload: Result<Json<MergePrRequest>, JsonRejection>,
) -> Result<Json<PrEnvelope>, ApiErr> {
    let Json(req) = payload?;
    let pr = service.merge_pr(&req.pull_request_id).await?;
    Ok(Json(PrEnvelope { pr: pr.into() }))
}

/// POST /pullRequest/reassign
async fn reassign_pr(
    State(service): State<ReviewService>,
    payload: Result<Json<ReassignRequest>, JsonRejection>,
) -> Result<Json<ReassignResponse>, ApiErr> {
    let Json(req) = payload?;
    let (pr, replaced_by) = service
        .reassign_reviewer(&req.pull_request_id, &req.old_user_id)
        .await?;
    Ok(Json(ReassignResponse {
        pr: pr.into(),
        replaced_by,
    }))
}

/// GET /stats
async fn get_stats(State(service): State<ReviewService>) -> Result<Json<Stats>, ApiErr> {
    Ok(Json(service.get_stats().await?))
}

/// GET /health
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
