//! Non-blocking front end over [`StatementExecutor`].
//!
//! Each call is queued on a bounded pool of OS worker threads and returns a
//! [`PendingOperation`] right away. The calling thread never touches a
//! connection. Operations carry no ordering guarantee relative to each other.

use std::fmt::Display;
use std::sync::Arc;

use crate::error::DbError;
use crate::executor::StatementExecutor;
use crate::results::{ResultCursor, Row};
use crate::retry::ReconnectPolicy;
use crate::statement::Statement;

mod pending;
mod worker;

pub use pending::{OperationState, PendingOperation};

use pending::{CancelToken, pending};
use worker::WorkerPool;

/// Worker count used when none is configured.
pub const DEFAULT_WORKERS: usize = 3;

/// Queues statements on background workers.
///
/// Clones share the same workers.
#[derive(Clone)]
pub struct AsyncExecutor {
    executor: StatementExecutor,
    workers: Arc<WorkerPool>,
}

impl AsyncExecutor {
    /// Start `workers` background threads for `executor`.
    ///
    /// # Errors
    /// Returns [`DbError::Config`] for zero workers, or
    /// [`DbError::Internal`] if a thread cannot be spawned.
    pub fn new(executor: StatementExecutor, workers: usize) -> Result<Self, DbError> {
        if workers == 0 {
            return Err(DbError::Config("async executor needs at least one worker".into()));
        }
        Ok(Self {
            executor,
            workers: Arc::new(WorkerPool::spawn(workers)?),
        })
    }

    #[must_use]
    pub fn executor(&self) -> &StatementExecutor {
        &self.executor
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.size()
    }

    /// Queue a query. The cursor is delivered open; close or drop it promptly
    /// to release its lease.
    pub fn execute_query_async(&self, statement: Statement) -> PendingOperation<ResultCursor> {
        self.dispatch(move |executor, _| executor.execute_query(&statement))
    }

    pub fn execute_update_async(&self, statement: Statement) -> PendingOperation<u64> {
        self.dispatch(move |executor, _| executor.execute_update(&statement))
    }

    pub fn execute_batch_async(&self, statements: Vec<Statement>) -> PendingOperation<Vec<u64>> {
        self.dispatch(move |executor, _| executor.execute_batch(&statements))
    }

    /// Queue a query and map its cursor on the worker thread.
    pub fn query_async<T, E, F>(&self, statement: Statement, mapper: F) -> PendingOperation<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut ResultCursor) -> Result<T, E> + Send + 'static,
        E: Display,
    {
        self.dispatch(move |executor, _| executor.query(&statement, mapper))
    }

    /// Queue a query whose rows are streamed to `consumer` on the worker
    /// thread. Cancelling a running stream stops it before the next row.
    pub fn execute_query_async_with_consumer<E, F>(
        &self,
        statement: Statement,
        mut consumer: F,
    ) -> PendingOperation<usize>
    where
        F: FnMut(Row) -> Result<(), E> + Send + 'static,
        E: Display,
    {
        self.dispatch(move |executor, token| {
            let sql = statement.sql().to_owned();
            let param_count = statement.params().len();
            executor.stream_rows(&statement, &mut |row| {
                token.check()?;
                consumer(row).map_err(|e| DbError::query(&sql, param_count, e))
            })
        })
    }

    /// Queue [`ConnectionProvider::connect_with_retry`](crate::pool::ConnectionProvider::connect_with_retry)
    /// so a host can reconnect without blocking.
    pub fn reconnect_async(&self, policy: ReconnectPolicy) -> PendingOperation<()> {
        self.dispatch(move |executor, _| executor.provider().connect_with_retry(&policy))
    }

    /// Stop accepting work, let queued operations finish, and join the workers.
    ///
    /// Operations submitted afterwards fail with [`DbError::Internal`].
    pub fn shutdown(&self) {
        self.workers.shutdown();
    }

    fn dispatch<T, F>(&self, job: F) -> PendingOperation<T>
    where
        T: Send + 'static,
        F: FnOnce(&StatementExecutor, &CancelToken) -> Result<T, DbError> + Send + 'static,
    {
        let (operation, completer) = pending();
        let executor = self.executor.clone();
        let submitted = self.workers.submit(Box::new(move || {
            completer.run(|token| job(&executor, token));
        }));
        if let Err(rejected) = submitted {
            // dropping the job drops its completer, which fails the operation
            drop(rejected);
            tracing::warn!("async executor is shut down; operation rejected");
        }
        operation
    }
}

impl std::fmt::Debug for AsyncExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncExecutor")
            .field("executor", &self.executor)
            .field("workers", &self.workers.size())
            .finish()
    }
}
