//! Synchronous statement execution against a [`ConnectionProvider`].
//!
//! Every call blocks the calling thread for lease acquisition and the
//! backend round trip. Use [`AsyncExecutor`](crate::async_executor::AsyncExecutor)
//! from threads that must not block.

use std::fmt::Display;
use std::sync::Arc;

use crate::error::DbError;
use crate::pool::ConnectionProvider;
use crate::results::{Columns, ResultCursor, Row};
use crate::statement::{PreparedSql, Statement};
use crate::translation::PlaceholderStyle;

mod batch;
mod transaction;

pub use transaction::Transaction;

/// How statements are rendered for the provider's backend.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Dialect {
    style: PlaceholderStyle,
    translate_default: bool,
}

impl Dialect {
    pub fn prepare<'a>(&self, statement: &'a Statement) -> Result<PreparedSql<'a>, DbError> {
        statement.prepare(self.style, self.translate_default)
    }
}

/// Runs statements on leased connections and scopes their results.
///
/// # Examples
/// ```rust,no_run
/// use sql_bridge::prelude::*;
///
/// # fn run(executor: &StatementExecutor) -> Result<(), DbError> {
/// let total: i64 = executor.query(
///     &Statement::new("SELECT amount FROM points WHERE player = ?1").bind("steve"),
///     |cursor| -> Result<i64, DbError> {
///         let mut sum = 0;
///         while let Some(row) = cursor.next_row()? {
///             sum += row.get("amount").and_then(Value::as_int).unwrap_or(0);
///         }
///         Ok(sum)
///     },
/// )?;
/// # let _ = total;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct StatementExecutor {
    provider: ConnectionProvider,
    dialect: Dialect,
}

impl StatementExecutor {
    #[must_use]
    pub fn new(provider: ConnectionProvider) -> Self {
        let dialect = Dialect {
            style: provider.descriptor().placeholder_style,
            translate_default: provider.config().translate_placeholders,
        };
        Self { provider, dialect }
    }

    #[must_use]
    pub fn provider(&self) -> &ConnectionProvider {
        &self.provider
    }

    /// Run a query and return a cursor over its rows.
    ///
    /// The cursor holds the connection lease until it is closed or dropped.
    ///
    /// # Errors
    /// Returns [`DbError::Binding`] on a parameter count mismatch, lease
    /// errors from the provider, or [`DbError::Execution`] if the backend
    /// rejects the statement.
    pub fn execute_query(&self, statement: &Statement) -> Result<ResultCursor, DbError> {
        let prepared = self.dialect.prepare(statement)?;
        let mut lease = self.provider.get_connection()?;
        self.log_statement("query", &prepared);

        let mut rows = Vec::new();
        let names = lease.for_each_row(&prepared, &mut |row| {
            rows.push(row);
            Ok(())
        })?;
        Ok(ResultCursor::new(
            statement.sql(),
            statement.params().len(),
            Arc::new(Columns::new(names)),
            rows,
            lease,
        ))
    }

    /// Run a statement that returns no rows.
    ///
    /// # Errors
    /// Same as [`execute_query`](Self::execute_query).
    pub fn execute_update(&self, statement: &Statement) -> Result<u64, DbError> {
        let prepared = self.dialect.prepare(statement)?;
        let mut lease = self.provider.get_connection()?;
        self.log_statement("update", &prepared);
        lease.execute(&prepared)
    }

    /// Run a query and hand its cursor to `mapper` exactly once.
    ///
    /// The cursor is closed afterwards whether or not `mapper` succeeds.
    ///
    /// # Errors
    /// Errors from running the query are returned unchanged; a failing
    /// `mapper` is reported as [`DbError::Query`].
    pub fn query<T, E, F>(&self, statement: &Statement, mapper: F) -> Result<T, DbError>
    where
        F: FnOnce(&mut ResultCursor) -> Result<T, E>,
        E: Display,
    {
        let mut cursor = self.execute_query(statement)?;
        let mapped = mapper(&mut cursor);
        cursor.close();
        mapped.map_err(|e| DbError::query(statement.sql(), statement.params().len(), e))
    }

    /// Stream each row to `consumer` as the driver produces it.
    ///
    /// Returns the number of rows delivered.
    ///
    /// # Errors
    /// Errors from running the query are returned unchanged; a failing
    /// `consumer` stops the stream and is reported as [`DbError::Query`].
    pub fn execute_query_with_consumer<E, F>(
        &self,
        statement: &Statement,
        mut consumer: F,
    ) -> Result<usize, DbError>
    where
        F: FnMut(Row) -> Result<(), E>,
        E: Display,
    {
        let sql = statement.sql();
        let param_count = statement.params().len();
        self.stream_rows(statement, &mut |row| {
            consumer(row).map_err(|e| DbError::query(sql, param_count, e))
        })
    }

    /// Row streaming shared by the consumer entry points. Errors returned by
    /// `on_row` pass through untouched.
    pub(crate) fn stream_rows(
        &self,
        statement: &Statement,
        on_row: &mut dyn FnMut(Row) -> Result<(), DbError>,
    ) -> Result<usize, DbError> {
        let prepared = self.dialect.prepare(statement)?;
        let mut lease = self.provider.get_connection()?;
        self.log_statement("stream", &prepared);

        let mut delivered = 0usize;
        lease.for_each_row(&prepared, &mut |row| {
            on_row(row)?;
            delivered += 1;
            Ok(())
        })?;
        Ok(delivered)
    }

    /// Run `body` inside a local transaction on one leased connection.
    ///
    /// Commits when `body` returns `Ok`; rolls back when it returns `Err` or
    /// unwinds.
    ///
    /// # Errors
    /// Lease errors, the error returned by `body`, or a failed BEGIN/COMMIT.
    pub fn with_transaction<T, F>(&self, body: F) -> Result<T, DbError>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T, DbError>,
    {
        let mut lease = self.provider.get_connection()?;
        let mut tx = Transaction::begin(&mut lease, self.dialect)?;
        match body(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                tx.rollback();
                Err(e)
            }
        }
    }

    fn log_statement(&self, operation: &'static str, prepared: &PreparedSql<'_>) {
        tracing::debug!(
            backend = %self.provider.descriptor().kind,
            operation,
            sql = %prepared.statement.sql(),
            param_count = prepared.params().len(),
            "running statement"
        );
    }
}
