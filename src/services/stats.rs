//! Statistics report.

use super::ReviewService;
use crate::error::AppError;
use crate::models::Stats;

/// Number of reviewers listed in the report.
pub const TOP_REVIEWERS: usize = 10;

impl ReviewService {
    pub async fn get_stats(&self) -> Result<Stats, AppError> {
        self.store.stats_snapshot(TOP_REVIEWERS).await
    }
}
