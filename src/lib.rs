//! review-rota: reviewer assignment for pull requests.
//!
//! Pull requests get every active teammate of their author as reviewers.
//! Reviewers can be swapped for the next eligible teammate, and deactivating a
//! team reports the open pull requests left with an inactive reviewer.
//!
//! The engine (`services::ReviewService`) depends only on the
//! `store::EntityStore` trait; `store::SqliteStore` persists to SQLite and
//! `store::InMemoryStore` keeps everything in process.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod store;

pub use error::AppError;
pub use services::ReviewService;
