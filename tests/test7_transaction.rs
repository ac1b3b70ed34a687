#![cfg(feature = "sqlite")]

use sql_bridge::prelude::*;

fn ledger_db() -> Result<Database, DbError> {
    let db = Database::open(DatabaseConfig::embedded_memory())?;
    db.executor().execute_update(&Statement::new(
        "CREATE TABLE ledger (player TEXT PRIMARY KEY, balance INTEGER NOT NULL CHECK (balance >= 0))",
    ))?;
    db.executor().execute_batch(&[
        Statement::new("INSERT INTO ledger VALUES ('steve', 100)"),
        Statement::new("INSERT INTO ledger VALUES ('alex', 10)"),
    ])?;
    Ok(db)
}

fn balance(executor: &StatementExecutor, player: &str) -> Result<i64, DbError> {
    executor.query(
        &Statement::new("SELECT balance FROM ledger WHERE player = ?1").bind(player),
        |cursor| -> Result<i64, DbError> {
            Ok(cursor
                .next_row()?
                .and_then(|row| row.get("balance").and_then(Value::as_int))
                .unwrap_or(-1))
        },
    )
}

fn transfer(tx: &mut Transaction<'_>, from: &str, to: &str, amount: i64) -> Result<(), DbError> {
    tx.execute_update(
        &Statement::new("UPDATE ledger SET balance = balance + ?1 WHERE player = ?2")
            .bind(amount)
            .bind(to),
    )?;
    tx.execute_update(
        &Statement::new("UPDATE ledger SET balance = balance - ?1 WHERE player = ?2")
            .bind(amount)
            .bind(from),
    )?;
    Ok(())
}

#[test]
fn committed_transaction_is_visible() -> Result<(), DbError> {
    let db = ledger_db()?;
    let executor = db.executor();
    let rows = executor.with_transaction(|tx| {
        transfer(tx, "steve", "alex", 40)?;
        tx.query_rows(&Statement::new("SELECT player FROM ledger"))
    })?;
    assert_eq!(rows.len(), 2);
    assert_eq!(balance(executor, "steve")?, 60);
    assert_eq!(balance(executor, "alex")?, 50);
    Ok(())
}

#[test]
fn failing_body_rolls_back_earlier_statements() -> Result<(), DbError> {
    let db = ledger_db()?;
    let executor = db.executor();
    let err = executor
        .with_transaction(|tx| transfer(tx, "alex", "steve", 40))
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Execution);

    assert_eq!(balance(executor, "steve")?, 100);
    assert_eq!(balance(executor, "alex")?, 10);
    assert_eq!(db.provider().stats().in_use, 0);
    Ok(())
}

#[test]
fn panicking_body_rolls_back() -> Result<(), DbError> {
    let db = ledger_db()?;
    let executor = db.executor().clone();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        executor.with_transaction(|tx| -> Result<(), DbError> {
            tx.execute_update(&Statement::new("DELETE FROM ledger"))?;
            panic!("feature module bug");
        })
    }));
    assert!(result.is_err());
    assert_eq!(balance(&executor, "steve")?, 100);
    Ok(())
}

#[test]
fn transaction_streams_rows_to_consumer() -> Result<(), DbError> {
    let db = ledger_db()?;
    let mut total = 0;
    let delivered = db.executor().with_transaction(|tx| {
        tx.for_each_row(&Statement::new("SELECT balance FROM ledger"), |row| {
            total += row.get("balance").and_then(Value::as_int).unwrap_or(0);
            Ok(())
        })
    })?;
    assert_eq!(delivered, 2);
    assert_eq!(total, 110);
    Ok(())
}
