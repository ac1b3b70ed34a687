//! Convenient imports for common functionality.
//!
//! This module re-exports the types most feature modules need to configure
//! a database and run statements against it.

pub use crate::async_executor::{AsyncExecutor, OperationState, PendingOperation};
pub use crate::backend::{BackendKind, BatchMode};
pub use crate::config::DatabaseConfig;
pub use crate::database::Database;
pub use crate::error::{DbError, ErrorCategory};
pub use crate::executor::{StatementExecutor, Transaction};
pub use crate::pool::{ConnectionProvider, PoolStats};
pub use crate::results::{ResultCursor, Row};
pub use crate::retry::ReconnectPolicy;
pub use crate::statement::Statement;
pub use crate::translation::TranslationMode;
pub use crate::types::Value;
