#![cfg(feature = "sqlite")]

use std::sync::mpsc;
use std::time::{Duration, Instant};

use sql_bridge::prelude::*;

fn seeded_memory_db(workers: usize) -> Result<Database, DbError> {
    let cfg = DatabaseConfig::builder(BackendKind::EmbeddedMemory)
        .async_workers(workers)
        .build()?;
    let db = Database::open(cfg)?;
    let executor = db.executor();
    executor.execute_update(&Statement::new("CREATE TABLE t (id INTEGER, name TEXT)"))?;
    executor.execute_batch(&[
        Statement::new("INSERT INTO t VALUES (1, 'one')"),
        Statement::new("INSERT INTO t VALUES (2, 'two')"),
        Statement::new("INSERT INTO t VALUES (3, 'three')"),
    ])?;
    Ok(db)
}

#[test]
fn operations_complete_on_worker_threads() -> Result<(), DbError> {
    let db = seeded_memory_db(2)?;
    let async_exec = db.async_executor();

    let update = async_exec.execute_update_async(
        Statement::new("UPDATE t SET name = ?1 WHERE id = ?2").bind("uno").bind(1),
    );
    assert_eq!(update.wait()?, 1);

    let names = async_exec.query_async(
        Statement::new("SELECT name FROM t ORDER BY id"),
        |cursor| -> Result<Vec<String>, DbError> {
            let thread_name = std::thread::current().name().unwrap_or_default().to_owned();
            assert!(thread_name.starts_with("sql-bridge-worker-"));
            Ok(cursor
                .collect_rows()?
                .iter()
                .filter_map(|row| row.get("name").and_then(Value::as_text).map(str::to_owned))
                .collect())
        },
    );
    assert_eq!(names.wait()?, ["uno", "two", "three"]);

    let counts = async_exec
        .execute_batch_async(vec![
            Statement::new("DELETE FROM t WHERE id = ?1").bind(2),
            Statement::new("DELETE FROM t WHERE id = ?1").bind(3),
        ])
        .wait()?;
    assert_eq!(counts, vec![1, 1]);
    Ok(())
}

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
fn async_query_delivers_a_cursor_holding_its_lease() -> Result<(), DbError> {
    let db = seeded_memory_db(2)?;
    let mut cursor = db
        .async_executor()
        .execute_query_async(Statement::new("SELECT id, name FROM t ORDER BY id"))
        .wait()?;
    assert_eq!(db.provider().stats().in_use, 1);
    assert_eq!(cursor.column_names(), ["id", "name"]);

    let ids: Vec<i64> = cursor
        .collect_rows()?
        .iter()
        .filter_map(|row| row.get("id").and_then(Value::as_int))
        .collect();
    assert_eq!(ids, [1, 2, 3]);

    drop(cursor);
    assert_eq!(db.provider().stats().in_use, 0);
    Ok(())
}

#[test]
fn unread_async_cursor_still_releases_its_lease() -> Result<(), DbError> {
    let db = seeded_memory_db(1)?;
    let before = db.provider().stats().leases;
    let op = db
        .async_executor()
        .execute_query_async(Statement::new("SELECT id FROM t"));
    drop(op);

    let provider = db.provider();
    assert!(wait_until(|| {
        let stats = provider.stats();
        stats.leases > before && stats.in_use == 0
    }));
    assert_eq!(
        db.executor()
            .execute_update(&Statement::new("DELETE FROM t WHERE id = 1"))?,
        1
    );
    Ok(())
}

#[test]
fn cancelled_async_query_releases_its_lease() -> Result<(), DbError> {
    let db = seeded_memory_db(1)?;
    // the worker starts, then blocks waiting for the only handle
    let held = db.provider().get_connection()?;
    let op = db
        .async_executor()
        .execute_query_async(Statement::new("SELECT id FROM t"));
    assert!(wait_until(|| op.state() == OperationState::Running));

    assert!(!op.cancel());
    drop(held);

    assert!(matches!(op.wait(), Err(DbError::Cancelled)));
    let stats = db.provider().stats();
    assert_eq!(stats.in_use, 0);
    assert_eq!(stats.exhausted, 0);
    Ok(())
}

#[test]
fn failure_reaches_failed_state() -> Result<(), DbError> {
    let db = seeded_memory_db(1)?;
    let op = db
        .async_executor()
        .execute_update_async(Statement::new("INSERT INTO missing VALUES (1)"));
    let err = op.wait().unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Execution);

    let mut op = db
        .async_executor()
        .execute_update_async(Statement::new("DELETE FROM t WHERE id = ?1"));
    while !op.is_finished() {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(op.state(), OperationState::Failed);
    assert!(matches!(op.try_result(), Some(Err(DbError::Binding { .. }))));
    Ok(())
}

#[test]
fn cancel_before_start_never_runs() -> Result<(), DbError> {
    let db = seeded_memory_db(1)?;
    let async_exec = db.async_executor();

    // occupy the only worker until the gate opens
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let (started_tx, started_rx) = mpsc::channel::<()>();
    let blocker = async_exec.execute_query_async_with_consumer(
        Statement::new("SELECT id FROM t WHERE id = 1"),
        move |_row| -> Result<(), DbError> {
            let _ = started_tx.send(());
            let _ = gate_rx.recv();
            Ok(())
        },
    );
    started_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("blocker started");

    let queued = async_exec.execute_update_async(Statement::new("DELETE FROM t"));
    assert_eq!(queued.state(), OperationState::Pending);
    assert!(queued.cancel());
    assert_eq!(queued.state(), OperationState::Cancelled);
    assert!(queued.is_finished());

    gate_tx.send(()).expect("gate open");
    assert_eq!(blocker.wait()?, 1);
    assert!(matches!(queued.wait(), Err(DbError::Cancelled)));

    // the delete never ran
    let remaining = db.executor().query(
        &Statement::new("SELECT COUNT(*) AS n FROM t"),
        |cursor| -> Result<i64, DbError> {
            Ok(cursor
                .next_row()?
                .and_then(|row| row.get("n").and_then(Value::as_int))
                .unwrap_or(0))
        },
    )?;
    assert_eq!(remaining, 3);
    Ok(())
}

#[test]
fn cancel_after_completion_is_a_no_op() -> Result<(), DbError> {
    let db = seeded_memory_db(1)?;
    let op = db
        .async_executor()
        .execute_update_async(Statement::new("UPDATE t SET name = 'x' WHERE id = 3"));
    while !op.is_finished() {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(!op.cancel());
    assert_eq!(op.state(), OperationState::Completed);
    assert_eq!(op.wait()?, 1);
    Ok(())
}

#[test]
fn cancelling_a_running_stream_stops_between_rows() -> Result<(), DbError> {
    let db = seeded_memory_db(1)?;
    let (seen_tx, seen_rx) = mpsc::channel::<()>();
    let (resume_tx, resume_rx) = mpsc::channel::<()>();
    let op = db.async_executor().execute_query_async_with_consumer(
        Statement::new("SELECT id FROM t ORDER BY id"),
        move |_row| -> Result<(), DbError> {
            let _ = seen_tx.send(());
            let _ = resume_rx.recv();
            Ok(())
        },
    );

    seen_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("first row delivered");
    assert_eq!(op.state(), OperationState::Running);
    assert!(!op.cancel());
    resume_tx.send(()).expect("resume consumer");

    assert!(matches!(op.wait(), Err(DbError::Cancelled)));
    // only the first row reached the consumer
    assert!(seen_rx.try_recv().is_err());
    assert_eq!(db.provider().stats().in_use, 0);
    Ok(())
}

#[test]
fn concurrent_queries_respect_pool_bound() -> Result<(), DbError> {
    let dir = tempfile::tempdir().map_err(|e| DbError::Internal(e.to_string()))?;
    let cfg = DatabaseConfig::builder(BackendKind::EmbeddedFile)
        .file_path(dir.path().join("concurrent.db"))
        .pool_size(1, 2)
        .async_workers(4)
        .lease_timeout(Duration::from_secs(10))
        .build()?;
    let db = Database::open(cfg)?;
    db.executor()
        .execute_update(&Statement::new("CREATE TABLE t (id INTEGER)"))?;
    db.executor()
        .execute_update(&Statement::new("INSERT INTO t VALUES (1)"))?;

    let ops: Vec<_> = (0..10)
        .map(|_| {
            db.async_executor().execute_query_async_with_consumer(
                Statement::new("SELECT id FROM t"),
                |_row| -> Result<(), DbError> {
                    std::thread::sleep(Duration::from_millis(20));
                    Ok(())
                },
            )
        })
        .collect();
    for op in ops {
        assert_eq!(op.wait()?, 1);
    }

    let stats = db.provider().stats();
    assert!(stats.high_water_mark <= 2, "{stats:?}");
    assert_eq!(stats.exhausted, 0);
    assert_eq!(stats.in_use, 0);
    db.close();
    Ok(())
}

#[tokio::test]
async fn pending_operations_can_be_awaited() -> Result<(), DbError> {
    let db = seeded_memory_db(2)?;
    let async_exec = db.async_executor();

    let first = async_exec.query_async(
        Statement::new("SELECT name FROM t WHERE id = ?1").bind(2),
        |cursor| -> Result<Option<String>, DbError> {
            Ok(cursor
                .next_row()?
                .and_then(|row| row.get("name").and_then(Value::as_text).map(str::to_owned)))
        },
    );
    let second = async_exec.execute_update_async(Statement::new("DELETE FROM t WHERE id = 3"));

    assert_eq!(first.await?, Some("two".to_owned()));
    assert_eq!(second.await?, 1);
    Ok(())
}

#[test]
fn operations_after_shutdown_are_rejected() -> Result<(), DbError> {
    let db = seeded_memory_db(1)?;
    db.async_executor().shutdown();
    let op = db
        .async_executor()
        .execute_update_async(Statement::new("DELETE FROM t"));
    assert_eq!(op.state(), OperationState::Failed);
    assert!(matches!(op.wait(), Err(DbError::Internal(_))));
    Ok(())
}
