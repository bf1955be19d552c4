//! Data models for the application.
//!
//! These models represent the core entities stored by the entity store and
//! returned from the review services.

pub mod pull_request;
pub mod stats;
pub mod team;
pub mod user;

// Re-exports for convenient access
pub use pull_request::{NewPullRequest, PrStatus, PullRequest, PullRequestRow};
pub use stats::{ReviewerStats, StatusCount, Stats};
pub use team::Team;
pub use user::{NewUser, User};
