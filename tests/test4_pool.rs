#![cfg(feature = "sqlite")]

use std::time::{Duration, Instant};

use sql_bridge::prelude::*;
use sql_bridge::{Credentials, connect, resolve};

/// Config JSON for a networked backend; the networked case is skipped when unset.
const PG_CONFIG_ENV: &str = "SQL_BRIDGE_PG_CONFIG";

#[test]
fn embedded_callers_wait_for_a_busy_pool() -> Result<(), DbError> {
    let dir = tempfile::tempdir().map_err(|e| DbError::Internal(e.to_string()))?;
    let cfg = DatabaseConfig::builder(BackendKind::EmbeddedFile)
        .file_path(dir.path().join("pool.db"))
        .pool_size(1, 2)
        .lease_timeout(Duration::from_millis(100))
        .build()?;
    let provider = ConnectionProvider::new(cfg)?;
    provider.connect()?;

    let first = provider.get_connection()?;
    let second = provider.get_connection()?;
    assert_ne!(first.id(), second.id());

    let waiter = {
        let provider = provider.clone();
        std::thread::spawn(move || -> Result<Duration, DbError> {
            let started = Instant::now();
            let third = provider.get_connection()?;
            drop(third);
            Ok(started.elapsed())
        })
    };
    std::thread::sleep(Duration::from_millis(350));
    drop(first);

    let waited = waiter.join().expect("waiter thread")?;
    assert!(waited >= Duration::from_millis(300), "{waited:?}");
    drop(second);

    let stats = provider.stats();
    assert_eq!(stats.max_size, 2);
    assert_eq!(stats.in_use, 0);
    assert_eq!(stats.high_water_mark, 2);
    assert_eq!(stats.exhausted, 0);
    assert_eq!(stats.leases, 3);
    Ok(())
}

#[test]
fn memory_handle_held_by_async_job_serializes_other_callers() -> Result<(), DbError> {
    let cfg = DatabaseConfig::builder(BackendKind::EmbeddedMemory)
        .lease_timeout(Duration::from_millis(100))
        .build()?;
    let db = Database::open(cfg)?;
    db.executor()
        .execute_update(&Statement::new("CREATE TABLE t (id INTEGER)"))?;
    db.executor()
        .execute_update(&Statement::new("INSERT INTO t VALUES (1)"))?;

    let (started_tx, started_rx) = std::sync::mpsc::channel::<()>();
    let slow = db.async_executor().execute_query_async_with_consumer(
        Statement::new("SELECT id FROM t"),
        move |_row| -> Result<(), DbError> {
            let _ = started_tx.send(());
            std::thread::sleep(Duration::from_millis(400));
            Ok(())
        },
    );
    started_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("consumer started");

    // blocks for several lease timeouts, then runs
    let inserted = db
        .executor()
        .execute_update(&Statement::new("INSERT INTO t VALUES (2)"))?;
    assert_eq!(inserted, 1);
    assert_eq!(slow.wait()?, 1);
    assert_eq!(db.provider().stats().exhausted, 0);
    Ok(())
}

#[test]
fn networked_pool_gives_up_after_lease_timeout() -> Result<(), DbError> {
    if !cfg!(feature = "postgres") {
        return Ok(());
    }
    let Ok(json) = std::env::var(PG_CONFIG_ENV) else {
        return Ok(());
    };
    let base = DatabaseConfig::from_json_str(&json)?;
    let cfg = DatabaseConfig {
        pool_min_size: 1,
        pool_max_size: 1,
        pool_lease_timeout_ms: 150,
        ..base
    };
    let provider = ConnectionProvider::new(cfg)?;
    provider.connect()?;

    let held = provider.get_connection()?;
    let started = Instant::now();
    let err = provider.get_connection().unwrap_err();
    assert!(matches!(err, DbError::PoolExhausted { timeout_ms: 150 }));
    assert!(err.is_retriable());
    assert!(started.elapsed() >= Duration::from_millis(150));
    drop(held);

    assert!(provider.get_connection().is_ok());
    assert_eq!(provider.stats().exhausted, 1);
    Ok(())
}

#[test]
fn unreachable_file_leaves_provider_disconnected_and_retryable() -> Result<(), DbError> {
    let dir = tempfile::tempdir().map_err(|e| DbError::Internal(e.to_string()))?;
    let target = dir.path().join("missing").join("nested.db");
    let cfg = DatabaseConfig::embedded_file(&target);
    let provider = ConnectionProvider::new(cfg)?;

    let err = provider.connect().unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Connection);
    assert!(!provider.is_connected());
    assert!(matches!(
        provider.get_connection(),
        Err(DbError::Connection(_))
    ));

    std::fs::create_dir_all(dir.path().join("missing"))
        .map_err(|e| DbError::Internal(e.to_string()))?;
    provider.connect()?;
    assert!(provider.is_connected());
    assert!(provider.get_connection()?.is_connected());
    Ok(())
}

#[test]
fn connect_with_retry_gives_up_after_policy_attempts() -> Result<(), DbError> {
    let dir = tempfile::tempdir().map_err(|e| DbError::Internal(e.to_string()))?;
    let provider =
        ConnectionProvider::new(DatabaseConfig::embedded_file(dir.path().join("no/such/x.db")))?;
    let policy = ReconnectPolicy::default()
        .with_max_attempts(3)
        .with_initial_delay(Duration::from_millis(10));

    let started = Instant::now();
    let err = provider.connect_with_retry(&policy).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Connection);
    // two waits: 10ms then 20ms
    assert!(started.elapsed() >= Duration::from_millis(30));
    assert!(!provider.is_connected());
    Ok(())
}

#[test]
fn disconnect_is_idempotent_on_handles_and_providers() -> Result<(), DbError> {
    let mut handle = connect(&resolve(BackendKind::EmbeddedMemory), &Credentials::Memory)?;
    handle.disconnect();
    handle.disconnect();
    assert!(!handle.is_connected());

    let provider = ConnectionProvider::new(DatabaseConfig::embedded_memory())?;
    provider.connect()?;
    provider.connect()?;
    provider.disconnect();
    provider.disconnect();
    assert!(!provider.is_connected());
    Ok(())
}

#[test]
fn embedded_file_handles_outlive_idle_periods() -> Result<(), DbError> {
    let dir = tempfile::tempdir().map_err(|e| DbError::Internal(e.to_string()))?;
    let cfg = DatabaseConfig::builder(BackendKind::EmbeddedFile)
        .file_path(dir.path().join("stable.db"))
        .pool_size(1, 1)
        .build()?;
    let provider = ConnectionProvider::new(cfg)?;
    provider.connect()?;

    let id = provider.get_connection()?.id();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(provider.get_connection()?.id(), id);
    Ok(())
}
