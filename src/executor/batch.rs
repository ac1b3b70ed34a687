use crate::backend::BatchMode;
use crate::connection::TxControl;
use crate::error::DbError;
use crate::pool::Lease;
use crate::statement::{PreparedSql, Statement};

use super::StatementExecutor;

impl StatementExecutor {
    /// Run `statements` in order on one connection and return each affected
    /// row count.
    ///
    /// Every statement's binding is checked before anything runs. With
    /// [`BatchMode::Atomic`] the batch runs in one transaction and a failure
    /// rolls all of it back; with [`BatchMode::Partial`] statements before
    /// the failure stay applied and later ones are not attempted. Either way
    /// the failure is reported as [`DbError::Batch`] with its index.
    ///
    /// # Errors
    /// [`DbError::Batch`] for a failing statement, or lease errors from the
    /// provider.
    pub fn execute_batch(&self, statements: &[Statement]) -> Result<Vec<u64>, DbError> {
        let prepared = statements
            .iter()
            .enumerate()
            .map(|(index, statement)| {
                self.dialect.prepare(statement).map_err(|source| DbError::Batch {
                    index,
                    rolled_back: false,
                    source: Box::new(source),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if prepared.is_empty() {
            return Ok(Vec::new());
        }

        let mode = self.provider.config().effective_batch_mode();
        let mut lease = self.provider.get_connection()?;
        tracing::debug!(
            backend = %self.provider.descriptor().kind,
            statements = prepared.len(),
            ?mode,
            "running batch"
        );
        match mode {
            BatchMode::Atomic => run_atomic(&mut lease, &prepared),
            BatchMode::Partial => run_partial(&mut lease, &prepared),
        }
    }
}

fn run_atomic(lease: &mut Lease, prepared: &[PreparedSql<'_>]) -> Result<Vec<u64>, DbError> {
    lease.transaction_control(TxControl::Begin)?;
    let mut counts = Vec::with_capacity(prepared.len());
    for (index, statement) in prepared.iter().enumerate() {
        match lease.execute(statement) {
            Ok(affected) => counts.push(affected),
            Err(source) => {
                if let Err(e) = lease.transaction_control(TxControl::Rollback) {
                    tracing::warn!(index, error = %e, "batch rollback failed");
                }
                tracing::warn!(
                    index,
                    sql = %statement.statement.sql(),
                    param_count = statement.params().len(),
                    "batch rolled back"
                );
                return Err(DbError::Batch {
                    index,
                    rolled_back: true,
                    source: Box::new(source),
                });
            }
        }
    }
    if let Err(e) = lease.transaction_control(TxControl::Commit) {
        if let Err(rollback) = lease.transaction_control(TxControl::Rollback) {
            tracing::warn!(error = %rollback, "batch rollback failed");
        }
        return Err(e);
    }
    Ok(counts)
}

fn run_partial(lease: &mut Lease, prepared: &[PreparedSql<'_>]) -> Result<Vec<u64>, DbError> {
    let mut counts = Vec::with_capacity(prepared.len());
    for (index, statement) in prepared.iter().enumerate() {
        let affected = lease.execute(statement).map_err(|source| {
            tracing::warn!(
                index,
                applied = index,
                sql = %statement.statement.sql(),
                "batch stopped"
            );
            DbError::Batch {
                index,
                rolled_back: false,
                source: Box::new(source),
            }
        })?;
        counts.push(affected);
    }
    Ok(counts)
}
