use crate::connection::TxControl;
use crate::error::DbError;
use crate::pool::Lease;
use crate::results::Row;
use crate::statement::Statement;

use super::Dialect;

/// An open local transaction on one leased connection.
///
/// Obtained from [`StatementExecutor::with_transaction`](super::StatementExecutor::with_transaction).
/// Dropping it before commit rolls back.
pub struct Transaction<'lease> {
    lease: &'lease mut Lease,
    dialect: Dialect,
    finished: bool,
}

impl<'lease> Transaction<'lease> {
    pub(super) fn begin(lease: &'lease mut Lease, dialect: Dialect) -> Result<Self, DbError> {
        lease.transaction_control(TxControl::Begin)?;
        Ok(Self {
            lease,
            dialect,
            finished: false,
        })
    }

    /// Run a statement that returns no rows.
    ///
    /// # Errors
    /// Returns [`DbError::Binding`] or [`DbError::Execution`].
    pub fn execute_update(&mut self, statement: &Statement) -> Result<u64, DbError> {
        let prepared = self.dialect.prepare(statement)?;
        self.lease.execute(&prepared)
    }

    /// Run a query and collect its rows.
    ///
    /// # Errors
    /// Returns [`DbError::Binding`] or [`DbError::Execution`].
    pub fn query_rows(&mut self, statement: &Statement) -> Result<Vec<Row>, DbError> {
        let mut rows = Vec::new();
        self.for_each_row(statement, |row| {
            rows.push(row);
            Ok(())
        })?;
        Ok(rows)
    }

    /// Stream the rows of a query to `consumer`.
    ///
    /// # Errors
    /// Returns [`DbError::Binding`], [`DbError::Execution`] or the first
    /// error `consumer` returns.
    pub fn for_each_row<F>(&mut self, statement: &Statement, mut consumer: F) -> Result<usize, DbError>
    where
        F: FnMut(Row) -> Result<(), DbError>,
    {
        let prepared = self.dialect.prepare(statement)?;
        let mut delivered = 0usize;
        self.lease.for_each_row(&prepared, &mut |row| {
            consumer(row)?;
            delivered += 1;
            Ok(())
        })?;
        Ok(delivered)
    }

    pub(super) fn commit(&mut self) -> Result<(), DbError> {
        self.finished = true;
        if let Err(e) = self.lease.transaction_control(TxControl::Commit) {
            self.rollback_quietly();
            return Err(e);
        }
        Ok(())
    }

    pub(super) fn rollback(&mut self) {
        self.finished = true;
        self.rollback_quietly();
    }

    fn rollback_quietly(&mut self) {
        if let Err(e) = self.lease.transaction_control(TxControl::Rollback) {
            tracing::warn!(connection = self.lease.id(), error = %e, "rollback failed");
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(connection = self.lease.id(), "transaction dropped, rolling back");
            self.rollback_quietly();
        }
    }
}
