//! Application error types.
//!
//! Every failure the engine reports is one of these kinds. The kinds are
//! transport-agnostic: the HTTP layer maps them to status codes, the engine
//! never does.

use serde::Serialize;
use thiserror::Error;

/// Application-level errors returned by the store and the review services.
///
/// All variants serialize to a structured JSON object tagged with the kind.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum AppError {
    /// Malformed or missing caller data, or a business-rule violation.
    #[error("{message}")]
    InvalidInput {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },

    #[error("user '{user_id}' not found")]
    UserNotFound { user_id: String },

    #[error("team '{team_name}' not found")]
    TeamNotFound { team_name: String },

    #[error("team '{team_name}' already exists")]
    TeamExists { team_name: String },

    #[error("pull request '{pr_id}' not found")]
    PrNotFound { pr_id: String },

    #[error("pull request '{pr_id}' already exists")]
    PrExists { pr_id: String },

    /// Illegal operation on a terminal pull request.
    #[error("cannot modify merged pull request '{pr_id}'")]
    PrMerged { pr_id: String },

    #[error("user '{user_id}' is not assigned to pull request '{pr_id}'")]
    NotAssigned { pr_id: String, user_id: String },

    /// No eligible replacement reviewer.
    #[error("no active candidate available in team '{team_name}'")]
    NoCandidate { team_name: String },

    /// Store or infrastructure failure.
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        operation: Option<String>,
    },
}

impl AppError {
    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: None,
        }
    }

    /// Create an invalid input error for a required field that was left empty.
    pub fn required(field: &str) -> Self {
        Self::InvalidInput {
            message: format!("{} is required", field),
            field: Some(field.to_string()),
        }
    }

    pub fn user_not_found(user_id: impl Into<String>) -> Self {
        Self::UserNotFound {
            user_id: user_id.into(),
        }
    }

    pub fn team_not_found(team_name: impl Into<String>) -> Self {
        Self::TeamNotFound {
            team_name: team_name.into(),
        }
    }

    pub fn team_exists(team_name: impl Into<String>) -> Self {
        Self::TeamExists {
            team_name: team_name.into(),
        }
    }

    pub fn pr_not_found(pr_id: impl Into<String>) -> Self {
        Self::PrNotFound {
            pr_id: pr_id.into(),
        }
    }

    pub fn pr_exists(pr_id: impl Into<String>) -> Self {
        Self::PrExists {
            pr_id: pr_id.into(),
        }
    }

    pub fn pr_merged(pr_id: impl Into<String>) -> Self {
        Self::PrMerged {
            pr_id: pr_id.into(),
        }
    }

    pub fn not_assigned(pr_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::NotAssigned {
            pr_id: pr_id.into(),
            user_id: user_id.into(),
        }
    }

    pub fn no_candidate(team_name: impl Into<String>) -> Self {
        Self::NoCandidate {
            team_name: team_name.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            operation: None,
        }
    }

    /// Create an internal error with the store operation that failed.
    pub fn internal_with_op(message: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            operation: Some(operation.into()),
        }
    }

    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::UserNotFound { .. } => "USER_NOT_FOUND",
            Self::TeamNotFound { .. } => "TEAM_NOT_FOUND",
            Self::TeamExists { .. } => "TEAM_EXISTS",
            Self::PrNotFound { .. } => "PR_NOT_FOUND",
            Self::PrExists { .. } => "PR_EXISTS",
            Self::PrMerged { .. } => "PR_MERGED",
            Self::NotAssigned { .. } => "NOT_ASSIGNED",
            Self::NoCandidate { .. } => "NO_CANDIDATE",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Check if this error came from the store or infrastructure rather than
    /// from a business rule.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

// Conversions from common error types

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::internal(format!("database error: {}", err))
    }
}

impl From<crate::db::DbError> for AppError {
    fn from(err: crate::db::DbError) -> Self {
        Self::internal(err.to_string())
    }
}
