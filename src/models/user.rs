//! User model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A user who can author pull requests and review them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct User {
    /// External user identifier.
    pub user_id: String,

    pub username: String,

    /// Name of the team the user belongs to, if any.
    pub team_name: Option<String>,

    pub is_active: bool,

    pub created_at: DateTime<Utc>,
}

impl User {
    /// Check whether the user currently belongs to `team_name`.
    pub fn is_member_of(&self, team_name: &str) -> bool {
        self.team_name.as_deref() == Some(team_name)
    }
}

/// Input for enrolling or creating a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub user_id: String,
    pub username: String,
    pub is_active: bool,
}

impl NewUser {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>, is_active: bool) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            is_active,
        }
    }
}
