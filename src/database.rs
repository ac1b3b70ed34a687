use std::sync::Arc;

use crate::async_executor::AsyncExecutor;
use crate::config::DatabaseConfig;
use crate::error::DbError;
use crate::executor::StatementExecutor;
use crate::pool::ConnectionProvider;

/// One configured database instance: provider, synchronous executor and
/// async workers, wired together.
///
/// Construct one per configured instance and pass it to the feature modules
/// that need it. Cloning shares everything.
///
/// ```rust,no_run
/// use sql_bridge::prelude::*;
///
/// let db = Database::open(DatabaseConfig::embedded_file("data/points.db"))?;
/// db.executor()
///     .execute_update(&Statement::new("CREATE TABLE IF NOT EXISTS points (player TEXT, amount INTEGER)"))?;
/// let pending = db
///     .async_executor()
///     .execute_update_async(Statement::new("INSERT INTO points VALUES (?1, ?2)").bind("steve").bind(5));
/// assert_eq!(pending.wait()?, 1);
/// db.close();
/// # Ok::<(), DbError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

#[derive(Debug)]
struct DatabaseInner {
    provider: ConnectionProvider,
    executor: StatementExecutor,
    async_executor: AsyncExecutor,
}

impl Database {
    /// Validate `config`, connect the pool and start the async workers.
    ///
    /// # Errors
    /// [`DbError::Config`] for invalid settings, [`DbError::Connection`] if
    /// the backend cannot be reached.
    pub fn open(config: DatabaseConfig) -> Result<Self, DbError> {
        let workers = config.async_workers;
        let provider = ConnectionProvider::new(config)?;
        provider.connect()?;
        let executor = StatementExecutor::new(provider.clone());
        let async_executor = AsyncExecutor::new(executor.clone(), workers)?;
        tracing::info!(
            backend = %provider.descriptor().kind,
            workers,
            "database opened"
        );
        Ok(Self {
            inner: Arc::new(DatabaseInner {
                provider,
                executor,
                async_executor,
            }),
        })
    }

    #[must_use]
    pub fn provider(&self) -> &ConnectionProvider {
        &self.inner.provider
    }

    #[must_use]
    pub fn executor(&self) -> &StatementExecutor {
        &self.inner.executor
    }

    #[must_use]
    pub fn async_executor(&self) -> &AsyncExecutor {
        &self.inner.async_executor
    }

    /// Finish queued async work, then close the pool.
    pub fn close(&self) {
        self.inner.async_executor.shutdown();
        self.inner.provider.disconnect();
    }
}
