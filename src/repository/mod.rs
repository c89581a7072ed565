//! Repository layer for database persistence.
//!
//! All database access uses Diesel ORM with compile-time query checking
//! over an embedded SQLite database.

pub mod context;
pub mod insight;
pub mod migrations;
pub mod models;
pub mod pool;
pub mod task_store;
pub mod util;

pub use context::DbContext;
pub use insight::InsightRepository;
pub use pool::{DieselError, SqlitePool};
pub use task_store::TaskStore;
pub use util::{is_busy_error, parse_datetime, parse_datetime_opt};
