use std::sync::Mutex;
use std::time::Instant;

use crate::backend::BackendDescriptor;
use crate::config::Credentials;
use crate::connection::{ConnectionHandle, connect};
use crate::error::DbError;

/// Opens and validates [`ConnectionHandle`]s on behalf of the r2d2 pool.
#[derive(Debug)]
pub(crate) struct BackendManager {
    descriptor: BackendDescriptor,
    credentials: Credentials,
}

impl BackendManager {
    pub fn new(descriptor: BackendDescriptor, credentials: Credentials) -> Self {
        Self {
            descriptor,
            credentials,
        }
    }

    pub fn open(&self) -> Result<ConnectionHandle, DbError> {
        connect(&self.descriptor, &self.credentials)
    }
}

impl r2d2::ManageConnection for BackendManager {
    type Connection = ConnectionHandle;
    type Error = DbError;

    fn connect(&self) -> Result<ConnectionHandle, DbError> {
        self.open()
    }

    fn is_valid(&self, conn: &mut ConnectionHandle) -> Result<(), DbError> {
        conn.ping()
    }

    fn has_broken(&self, conn: &mut ConnectionHandle) -> bool {
        let broken = !conn.is_connected();
        if broken {
            tracing::warn!(
                connection = conn.id(),
                backend = %self.descriptor.kind,
                "evicting broken connection"
            );
        }
        broken
    }
}

/// Keeps the most recent error r2d2 hit while opening connections in the
/// background, so a lease timeout can tell "no server" from "all busy".
#[derive(Debug, Default)]
pub(crate) struct ErrorRecorder {
    last: Mutex<Option<(Instant, String)>>,
}

impl ErrorRecorder {
    /// The recorded error, if it happened at or after `since`.
    pub fn error_since(&self, since: Instant) -> Option<String> {
        let guard = self
            .last
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard
            .as_ref()
            .filter(|(at, _)| *at >= since)
            .map(|(_, message)| message.clone())
    }

    pub fn clear(&self) {
        let mut guard = self
            .last
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = None;
    }
}

impl r2d2::HandleError<DbError> for std::sync::Arc<ErrorRecorder> {
    fn handle_error(&self, error: DbError) {
        tracing::warn!(error = %error, "pool failed to open a connection");
        let mut guard = self
            .last
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Some((Instant::now(), error.to_string()));
    }
}
