//! Shared database access for plugin-style feature modules.
//!
//! One configured [`Database`] leases connections to one of four
//! interchangeable backends ([`BackendKind`]), runs [`Statement`]s
//! synchronously through a [`StatementExecutor`] or on background workers
//! through an [`AsyncExecutor`], and scopes every result cursor to its
//! connection lease so the pool cannot leak.
//!
//! ```rust
//! use sql_bridge::prelude::*;
//!
//! let db = Database::open(DatabaseConfig::embedded_memory())?;
//! let executor = db.executor();
//! executor.execute_update(&Statement::new("CREATE TABLE points (player TEXT, amount INTEGER)"))?;
//! executor.execute_batch(&[
//!     Statement::new("INSERT INTO points VALUES (?1, ?2)").bind("steve").bind(10),
//!     Statement::new("INSERT INTO points VALUES (?1, ?2)").bind("alex").bind(4),
//! ])?;
//!
//! let mut names = Vec::new();
//! executor.execute_query_with_consumer(
//!     &Statement::new("SELECT player FROM points ORDER BY amount DESC"),
//!     |row| -> Result<(), DbError> {
//!         names.extend(row.get("player").and_then(Value::as_text).map(str::to_owned));
//!         Ok(())
//!     },
//! )?;
//! assert_eq!(names, ["steve", "alex"]);
//! db.close();
//! # Ok::<(), DbError>(())
//! ```

#[cfg(not(any(feature = "sqlite", feature = "postgres")))]
compile_error!("enable at least one backend feature: `sqlite` or `postgres`");

pub mod async_executor;
pub mod backend;
pub mod config;
pub mod connection;
pub mod database;
pub mod error;
pub mod executor;
pub mod pool;
pub mod prelude;
pub mod results;
pub mod retry;
pub mod statement;
pub mod translation;
pub mod types;

pub use async_executor::{AsyncExecutor, OperationState, PendingOperation};
pub use backend::{BackendDescriptor, BackendKind, BatchMode, resolve};
pub use config::{Credentials, DatabaseConfig, DatabaseConfigBuilder};
pub use connection::{ConnectionHandle, connect};
pub use database::Database;
pub use error::{DbError, ErrorCategory};
pub use executor::{StatementExecutor, Transaction};
pub use pool::{ConnectionProvider, Lease, PoolStats};
pub use results::{ResultCursor, Row};
pub use retry::ReconnectPolicy;
pub use statement::Statement;
pub use translation::{PlaceholderStyle, TranslationMode, translate_placeholders};
pub use types::Value;
