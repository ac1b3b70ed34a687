use std::fmt;
use std::sync::Arc;

use crate::error::DbError;
use crate::pool::Lease;

use super::row::{Columns, Row};

/// Forward-only view over the rows of one query.
///
/// The cursor owns the connection lease the query ran on. Closing the cursor,
/// or dropping it on any path, hands the lease back to the pool; reads after
/// that fail with [`DbError::Query`].
pub struct ResultCursor {
    sql: Arc<str>,
    param_count: usize,
    columns: Arc<Columns>,
    rows: std::vec::IntoIter<Row>,
    lease: Option<Lease>,
    closed: bool,
}

impl ResultCursor {
    pub(crate) fn new(
        sql: &str,
        param_count: usize,
        columns: Arc<Columns>,
        rows: Vec<Row>,
        lease: Lease,
    ) -> Self {
        Self {
            sql: Arc::from(sql),
            param_count,
            columns,
            rows: rows.into_iter(),
            lease: Some(lease),
            closed: false,
        }
    }

    /// Column names in result order.
    #[must_use]
    pub fn column_names(&self) -> &[String] {
        self.columns.names()
    }

    /// Advance the cursor.
    ///
    /// # Errors
    /// Returns [`DbError::Query`] if the cursor has been closed.
    pub fn next_row(&mut self) -> Result<Option<Row>, DbError> {
        if self.closed {
            return Err(DbError::query(
                &self.sql,
                self.param_count,
                "read from a closed cursor",
            ));
        }
        Ok(self.rows.next())
    }

    /// Drain every remaining row.
    ///
    /// # Errors
    /// Returns [`DbError::Query`] if the cursor has been closed.
    pub fn collect_rows(&mut self) -> Result<Vec<Row>, DbError> {
        let mut rows = Vec::with_capacity(self.rows.len());
        while let Some(row) = self.next_row()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Read the first remaining row, if any.
    ///
    /// # Errors
    /// Returns [`DbError::Query`] if the cursor has been closed.
    pub fn first(&mut self) -> Result<Option<Row>, DbError> {
        self.next_row()
    }

    /// Close the cursor and release its lease. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.rows = Vec::new().into_iter();
        drop(self.lease.take());
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn param_count(&self) -> usize {
        self.param_count
    }
}

impl Drop for ResultCursor {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ResultCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCursor")
            .field("sql", &self.sql)
            .field("columns", &self.columns.names())
            .field("remaining", &self.rows.len())
            .field("closed", &self.closed)
            .finish()
    }
}
