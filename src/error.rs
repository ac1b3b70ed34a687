use thiserror::Error;

/// Coarse classification used by callers that implement their own retry policy.
///
/// Nothing in this crate retries on its own; the category only tells a caller
/// whether trying again could plausibly succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The backend could not be reached or the connection was lost.
    Connection,
    /// Every pooled connection stayed leased past the lease timeout.
    PoolExhausted,
    /// Parameters did not line up with the statement's placeholders.
    Binding,
    /// The backend rejected the statement.
    Execution,
    /// A mapper or consumer failed, or a closed cursor was read.
    Query,
    /// The operation was cancelled before producing a result.
    Cancelled,
    /// Invalid configuration.
    Configuration,
    /// Worker or bookkeeping failure inside this crate.
    Internal,
}

impl ErrorCategory {
    /// Whether errors in this category are generally worth retrying.
    #[must_use]
    pub const fn is_retriable(self) -> bool {
        matches!(self, Self::Connection | Self::PoolExhausted)
    }
}

/// Errors produced by the database layer.
///
/// `Execution` and `Query` carry the statement text and the number of bound
/// parameters, never the parameter values themselves.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("connection pool exhausted: no lease available after {timeout_ms}ms")]
    PoolExhausted { timeout_ms: u64 },

    #[error("binding error: statement expects {expected} parameter(s), got {actual}: {sql}")]
    Binding {
        sql: String,
        expected: usize,
        actual: usize,
    },

    #[error("execution error ({param_count} param(s)) in `{sql}`: {message}")]
    Execution {
        sql: String,
        param_count: usize,
        message: String,
    },

    #[error("query error ({param_count} param(s)) in `{sql}`: {message}")]
    Query {
        sql: String,
        param_count: usize,
        message: String,
    },

    #[error("batch failed at statement {index}{}: {source}", if *rolled_back { " (rolled back)" } else { "" })]
    Batch {
        index: usize,
        rolled_back: bool,
        #[source]
        source: Box<DbError>,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DbError {
    /// Classify this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Connection(_) => ErrorCategory::Connection,
            Self::PoolExhausted { .. } => ErrorCategory::PoolExhausted,
            Self::Binding { .. } => ErrorCategory::Binding,
            Self::Execution { .. } => ErrorCategory::Execution,
            Self::Query { .. } => ErrorCategory::Query,
            Self::Batch { source, .. } => source.category(),
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Config(_) => ErrorCategory::Configuration,
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Whether this error is generally worth retrying.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        self.category().is_retriable()
    }

    pub(crate) fn execution(sql: &str, param_count: usize, message: impl ToString) -> Self {
        Self::Execution {
            sql: sql.to_owned(),
            param_count,
            message: message.to_string(),
        }
    }

    pub(crate) fn query(sql: &str, param_count: usize, message: impl ToString) -> Self {
        Self::Query {
            sql: sql.to_owned(),
            param_count,
            message: message.to_string(),
        }
    }
}
