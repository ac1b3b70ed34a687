//! One physical connection to a backend, independent of the native driver.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::backend::{BackendDescriptor, BackendKind};
use crate::config::Credentials;
use crate::error::DbError;
use crate::results::Row;
use crate::statement::PreparedSql;

#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "sqlite")]
mod sqlite;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Native driver connection behind a [`ConnectionHandle`].
pub(crate) enum RawConnection {
    #[cfg(feature = "sqlite")]
    Sqlite(rusqlite::Connection),
    #[cfg(feature = "postgres")]
    Postgres(::postgres::Client),
}

/// Transaction control statements issued around batches and transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TxControl {
    Begin,
    Commit,
    Rollback,
}

impl TxControl {
    fn sql(self) -> &'static str {
        match self {
            TxControl::Begin => "BEGIN",
            TxControl::Commit => "COMMIT",
            TxControl::Rollback => "ROLLBACK",
        }
    }
}

/// A live session with one backend.
///
/// Handles are created by the pool and leased out through
/// [`Lease`](crate::pool::Lease); they are never shared between two callers
/// at the same time.
pub struct ConnectionHandle {
    id: u64,
    kind: BackendKind,
    raw: Option<RawConnection>,
    broken: bool,
    last_used: Instant,
}

impl ConnectionHandle {
    fn new(kind: BackendKind, raw: RawConnection) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            raw: Some(raw),
            broken: false,
            last_used: Instant::now(),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Whether the session is open and has not been marked broken.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.raw.is_some() && !self.broken
    }

    /// Time since the handle last ran a statement.
    #[must_use]
    pub fn idle_for(&self) -> std::time::Duration {
        self.last_used.elapsed()
    }

    /// Close the session. Calling this on a closed handle does nothing.
    pub fn disconnect(&mut self) {
        let Some(raw) = self.raw.take() else {
            return;
        };
        match raw {
            #[cfg(feature = "sqlite")]
            RawConnection::Sqlite(conn) => {
                if let Err((_, e)) = conn.close() {
                    tracing::warn!(connection = self.id, error = %e, "sqlite close failed");
                }
            }
            #[cfg(feature = "postgres")]
            RawConnection::Postgres(client) => {
                if let Err(e) = client.close() {
                    tracing::debug!(connection = self.id, error = %e, "postgres close failed");
                }
            }
        }
        tracing::debug!(connection = self.id, kind = %self.kind, "connection closed");
    }

    /// Round-trip a trivial statement to confirm the session still works.
    ///
    /// # Errors
    /// Returns [`DbError::Connection`] if the session is closed or unusable.
    pub fn ping(&mut self) -> Result<(), DbError> {
        let result = match self.raw_mut()? {
            #[cfg(feature = "sqlite")]
            RawConnection::Sqlite(conn) => sqlite::ping(conn),
            #[cfg(feature = "postgres")]
            RawConnection::Postgres(client) => postgres::ping(client),
        };
        if result.is_err() {
            self.broken = true;
        }
        result
    }

    /// Run a statement that produces no rows and return the affected count.
    pub(crate) fn execute(&mut self, prepared: &PreparedSql<'_>) -> Result<u64, DbError> {
        self.last_used = Instant::now();
        let result = match self.raw_mut()? {
            #[cfg(feature = "sqlite")]
            RawConnection::Sqlite(conn) => sqlite::execute(conn, prepared),
            #[cfg(feature = "postgres")]
            RawConnection::Postgres(client) => postgres::execute(client, prepared),
        };
        self.check_health();
        result
    }

    /// Stream rows of a query into `on_row`, one at a time.
    ///
    /// Returns the column names. Errors from `on_row` stop the read and are
    /// returned unchanged; driver errors become [`DbError::Execution`].
    pub(crate) fn for_each_row(
        &mut self,
        prepared: &PreparedSql<'_>,
        on_row: &mut dyn FnMut(Row) -> Result<(), DbError>,
    ) -> Result<Vec<String>, DbError> {
        self.last_used = Instant::now();
        let result = match self.raw_mut()? {
            #[cfg(feature = "sqlite")]
            RawConnection::Sqlite(conn) => sqlite::for_each_row(conn, prepared, on_row),
            #[cfg(feature = "postgres")]
            RawConnection::Postgres(client) => postgres::for_each_row(client, prepared, on_row),
        };
        self.check_health();
        result
    }

    pub(crate) fn transaction_control(&mut self, control: TxControl) -> Result<(), DbError> {
        let sql = control.sql();
        let result = match self.raw_mut()? {
            #[cfg(feature = "sqlite")]
            RawConnection::Sqlite(conn) => conn
                .execute_batch(sql)
                .map_err(|e| DbError::execution(sql, 0, e)),
            #[cfg(feature = "postgres")]
            RawConnection::Postgres(client) => client
                .batch_execute(sql)
                .map_err(|e| DbError::execution(sql, 0, e)),
        };
        self.check_health();
        result
    }

    fn raw_mut(&mut self) -> Result<&mut RawConnection, DbError> {
        if self.broken {
            return Err(DbError::Connection(format!(
                "connection {} is broken",
                self.id
            )));
        }
        self.raw
            .as_mut()
            .ok_or_else(|| DbError::Connection(format!("connection {} is closed", self.id)))
    }

    fn check_health(&mut self) {
        #[cfg(feature = "postgres")]
        if let Some(RawConnection::Postgres(client)) = &self.raw {
            if client.is_closed() {
                tracing::warn!(connection = self.id, "server closed the connection");
                self.broken = true;
            }
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

/// Open a new session for `descriptor`.
///
/// # Errors
/// Returns [`DbError::Connection`] when the driver is not compiled in, the
/// credentials do not match the backend, or the driver fails to open.
pub fn connect(
    descriptor: &BackendDescriptor,
    credentials: &Credentials,
) -> Result<ConnectionHandle, DbError> {
    if !descriptor.driver_available() {
        return Err(DbError::Connection(format!(
            "driver unavailable: {} was built without {} support",
            env!("CARGO_PKG_NAME"),
            descriptor.driver_id
        )));
    }

    let url = descriptor.display_url(&credentials.location());
    let raw = open_raw(descriptor, credentials).map_err(|e| {
        tracing::warn!(backend = %descriptor.kind, %url, error = %e, "connect failed");
        e
    })?;
    let handle = ConnectionHandle::new(descriptor.kind, raw);
    tracing::debug!(connection = handle.id, backend = %descriptor.kind, %url, "connected");
    Ok(handle)
}

#[allow(unreachable_patterns, unused_variables)]
fn open_raw(
    descriptor: &BackendDescriptor,
    credentials: &Credentials,
) -> Result<RawConnection, DbError> {
    match credentials {
        #[cfg(feature = "sqlite")]
        Credentials::File { path } if descriptor.is_embedded => {
            sqlite::open_file(path).map(RawConnection::Sqlite)
        }
        #[cfg(feature = "sqlite")]
        Credentials::Memory if descriptor.is_embedded => {
            sqlite::open_memory().map(RawConnection::Sqlite)
        }
        #[cfg(feature = "postgres")]
        Credentials::Server(server) if !descriptor.is_embedded => {
            postgres::open(server).map(RawConnection::Postgres)
        }
        _ => Err(DbError::Connection(format!(
            "credentials do not match backend {}",
            descriptor.kind
        ))),
    }
}
