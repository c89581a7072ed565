//! Database context for managing the connection pool and repository access.
//!
//! Constructed once at startup and handed by reference to workers and
//! route handlers - no module-level globals, so tests can run against a
//! temp-file database in isolation.

use std::path::Path;

use super::insight::InsightRepository;
use super::pool::SqlitePool;
use super::task_store::TaskStore;

/// Database context providing access to all repositories.
///
/// # Example
/// ```ignore
/// let ctx = DbContext::from_path(&db_path);
/// let insights = ctx.insights().list(None, 50).await?;
/// ```
#[derive(Clone)]
pub struct DbContext {
    pool: SqlitePool,
}

impl DbContext {
    /// Create a context from a SQLite file path.
    pub fn from_path(db_path: &Path) -> Self {
        Self {
            pool: SqlitePool::from_path(db_path),
        }
    }

    /// Create a context from a database URL (`sqlite:...` or a file path).
    pub fn from_url(database_url: &str) -> Self {
        Self {
            pool: SqlitePool::new(database_url),
        }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insight repository.
    pub fn insights(&self) -> InsightRepository {
        InsightRepository::new(self.pool.clone())
    }

    /// Task store.
    pub fn tasks(&self) -> TaskStore {
        TaskStore::new(self.pool.clone())
    }
}
