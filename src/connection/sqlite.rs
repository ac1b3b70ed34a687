use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::types::Value as SqliteValue;
use rusqlite::{Connection, params_from_iter};

use crate::error::DbError;
use crate::results::{Columns, Row};
use crate::statement::PreparedSql;
use crate::types::Value;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub(super) fn open_file(path: &Path) -> Result<Connection, DbError> {
    let conn = Connection::open(path).map_err(|e| {
        DbError::Connection(format!("failed to open {}: {e}", path.display()))
    })?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(|e| DbError::Connection(format!("failed to set busy timeout: {e}")))?;
    // WAL lets readers on other pooled connections proceed during a write.
    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .map_err(|e| DbError::Connection(format!("failed to enable WAL: {e}")))?;
    tracing::trace!(path = %path.display(), journal_mode = %mode, "sqlite file opened");
    Ok(conn)
}

pub(super) fn open_memory() -> Result<Connection, DbError> {
    Connection::open_in_memory()
        .map_err(|e| DbError::Connection(format!("failed to open in-memory database: {e}")))
}

pub(super) fn ping(conn: &Connection) -> Result<(), DbError> {
    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
        .map(|_| ())
        .map_err(|e| DbError::Connection(format!("ping failed: {e}")))
}

/// Convert a bound value to its `SQLite` storage form.
fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Int(i) => SqliteValue::Integer(*i),
        Value::Float(f) => SqliteValue::Real(*f),
        Value::Text(s) => SqliteValue::Text(s.clone()),
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Timestamp(dt) => SqliteValue::Text(dt.format("%F %T%.f").to_string()),
        Value::Blob(bytes) => SqliteValue::Blob(bytes.clone()),
        Value::Json(json) => SqliteValue::Text(json.to_string()),
    }
}

fn from_sqlite(value: SqliteValue) -> Value {
    match value {
        SqliteValue::Null => Value::Null,
        SqliteValue::Integer(i) => Value::Int(i),
        SqliteValue::Real(f) => Value::Float(f),
        SqliteValue::Text(s) => Value::Text(s),
        SqliteValue::Blob(b) => Value::Blob(b),
    }
}

fn params(prepared: &PreparedSql<'_>) -> Vec<SqliteValue> {
    prepared.params().iter().map(to_sqlite).collect()
}

pub(super) fn execute(conn: &Connection, prepared: &PreparedSql<'_>) -> Result<u64, DbError> {
    let values = params(prepared);
    let mut stmt = conn
        .prepare_cached(&prepared.text)
        .map_err(|e| prepared.execution_error(e))?;
    let affected = stmt
        .execute(params_from_iter(values.iter()))
        .map_err(|e| prepared.execution_error(e))?;
    Ok(affected as u64)
}

pub(super) fn for_each_row(
    conn: &Connection,
    prepared: &PreparedSql<'_>,
    on_row: &mut dyn FnMut(Row) -> Result<(), DbError>,
) -> Result<Vec<String>, DbError> {
    let values = params(prepared);
    let mut stmt = conn
        .prepare_cached(&prepared.text)
        .map_err(|e| prepared.execution_error(e))?;
    let names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let columns = Arc::new(Columns::new(names.clone()));

    let mut rows = stmt
        .query(params_from_iter(values.iter()))
        .map_err(|e| prepared.execution_error(e))?;
    while let Some(row) = rows.next().map_err(|e| prepared.execution_error(e))? {
        let mut row_values = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            let value: SqliteValue = row.get(idx).map_err(|e| prepared.execution_error(e))?;
            row_values.push(from_sqlite(value));
        }
        on_row(Row::new(Arc::clone(&columns), row_values))?;
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::Statement;
    use crate::translation::PlaceholderStyle;
    use chrono::NaiveDate;

    #[test]
    fn booleans_and_timestamps_use_portable_storage() {
        assert_eq!(to_sqlite(&Value::Bool(true)), SqliteValue::Integer(1));
        let ts = NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_milli_opt(12, 34, 56, 789)
            .unwrap();
        assert_eq!(
            to_sqlite(&Value::Timestamp(ts)),
            SqliteValue::Text("2024-05-17 12:34:56.789".into())
        );
    }

    #[test]
    fn cached_statements_rebind_each_execution() {
        let conn = open_memory().unwrap();
        let create = Statement::new("CREATE TABLE scores (player TEXT, points INTEGER)");
        execute(&conn, &create.prepare(PlaceholderStyle::Sqlite, true).unwrap()).unwrap();

        for (player, points) in [("steve", 3), ("alex", 5), ("steve", 4)] {
            let insert = Statement::new("INSERT INTO scores VALUES (?1, ?2)")
                .bind(player)
                .bind(points);
            let prepared = insert.prepare(PlaceholderStyle::Sqlite, true).unwrap();
            assert_eq!(execute(&conn, &prepared).unwrap(), 1);
        }

        let mut totals = Vec::new();
        for player in ["steve", "alex"] {
            let select = Statement::new("SELECT SUM(points) AS total FROM scores WHERE player = ?1")
                .bind(player);
            let prepared = select.prepare(PlaceholderStyle::Sqlite, true).unwrap();
            for_each_row(&conn, &prepared, &mut |row| {
                totals.push(row.get("total").and_then(Value::as_int));
                Ok(())
            })
            .unwrap();
        }
        assert_eq!(totals, [Some(7), Some(5)]);
    }
}
