//! Team model.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::User;

/// A team and its roster.
///
/// `members` is in enrollment order; the reviewer selector relies on that
/// order being stable between reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Team {
    pub team_name: String,
    pub members: Vec<User>,
    pub created_at: DateTime<Utc>,
}
