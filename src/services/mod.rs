//! Business logic services.
//!
//! `ReviewService` is the engine: pull request lifecycle, team deactivation
//! cascade, team and user management, and the statistics report. It talks to
//! storage only through an injected `EntityStore`. The HTTP transport lives in
//! `api_routes` / `api_server` and is the only place that knows about status
//! codes.

pub mod api_routes;
pub mod api_server;
pub mod pull_requests;
pub mod reviewer_selector;
pub mod stats;
pub mod teams;
pub mod users;

use std::sync::Arc;

use crate::error::AppError;
use crate::store::EntityStore;

pub use api_server::{build_router, serve};
pub use teams::Deactivation;

/// Reviewer-assignment engine over an entity store.
#[derive(Clone)]
pub struct ReviewService {
    store: Arc<dyn EntityStore>,
}

impl ReviewService {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }
}

/// Trim `value` and reject it if nothing is left.
pub(crate) fn require_non_empty<'a>(value: &'a str, field: &str) -> Result<&'a str, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::required(field));
    }
    Ok(trimmed)
}
