//! User activation and review listings.

use super::{require_non_empty, ReviewService};
use crate::error::AppError;
use crate::models::{PullRequest, User};

impl ReviewService {
    /// Set a user's active flag.
    ///
    /// Existing reviewer assignments are left untouched.
    pub async fn set_user_active(&self, user_id: &str, is_active: bool) -> Result<User, AppError> {
        let user_id = require_non_empty(user_id, "user_id")?;

        let user = self
            .store
            .set_user_active(user_id, is_active)
            .await?
            .ok_or_else(|| AppError::user_not_found(user_id))?;

        log::info!("[user] Set {} active={}", user_id, is_active);
        Ok(user)
    }

    /// Pull requests of any status on which the user is a reviewer, newest first.
    pub async fn get_user_reviews(&self, user_id: &str) -> Result<Vec<PullRequest>, AppError> {
        let user_id = require_non_empty(user_id, "user_id")?;

        if self.store.get_user_by_id(user_id).await?.is_none() {
            return Err(AppError::user_not_found(user_id));
        }

        let prs = self.store.get_prs_by_reviewer(user_id).await?;
        log::debug!("[user] {} reviews {} pull requests", user_id, prs.len());
        Ok(prs)
    }
}
