//! Leasing of backend connections.
//!
//! A [`ConnectionProvider`] owns one r2d2 pool per configured instance.
//! Embedded backends keep their handles for the life of the provider and
//! callers wait for a free one as long as it takes; the in-memory backend
//! runs on a single handle that callers take turns on. Networked backends
//! lease from a bounded pool and give up after the configured lease timeout
//! with [`DbError::PoolExhausted`].

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use crate::backend::BackendDescriptor;
use crate::config::DatabaseConfig;
use crate::error::DbError;
use crate::retry::ReconnectPolicy;

mod lease;
mod manager;
mod stats;

pub use lease::Lease;
pub use stats::PoolStats;

use manager::{BackendManager, ErrorRecorder};
use stats::LeaseCounters;

type Pool = r2d2::Pool<BackendManager>;

/// Hands out leases on connections to one configured database.
///
/// Cloning is cheap and every clone shares the same pool.
#[derive(Clone)]
pub struct ConnectionProvider {
    inner: Arc<ProviderInner>,
}

struct ProviderInner {
    config: DatabaseConfig,
    descriptor: BackendDescriptor,
    pool: RwLock<Option<Pool>>,
    counters: Arc<LeaseCounters>,
    errors: Arc<ErrorRecorder>,
}

impl ConnectionProvider {
    /// Create a disconnected provider. Call [`connect`](Self::connect) before leasing.
    ///
    /// # Errors
    /// Returns [`DbError::Config`] if the configuration is invalid.
    pub fn new(config: DatabaseConfig) -> Result<Self, DbError> {
        config.validate()?;
        let descriptor = config.descriptor();
        Ok(Self {
            inner: Arc::new(ProviderInner {
                config,
                descriptor,
                pool: RwLock::new(None),
                counters: Arc::new(LeaseCounters::default()),
                errors: Arc::new(ErrorRecorder::default()),
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &DatabaseConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn descriptor(&self) -> &BackendDescriptor {
        &self.inner.descriptor
    }

    /// Build the pool. Connecting an already connected provider does nothing.
    ///
    /// One connection is opened up front so an unreachable backend fails
    /// here with [`DbError::Connection`]; the provider then stays
    /// disconnected and `connect` may be called again.
    ///
    /// # Errors
    /// Returns [`DbError::Connection`] if the first connection cannot be opened.
    pub fn connect(&self) -> Result<(), DbError> {
        let mut slot = self
            .inner
            .pool
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Ok(());
        }

        let config = &self.inner.config;
        let descriptor = self.inner.descriptor;
        let manager = BackendManager::new(descriptor, config.credentials()?);

        let mut probe = manager.open()?;
        probe.disconnect();

        let (min_size, max_size) = config.effective_pool_bounds();
        let mut builder = r2d2::Pool::builder()
            .max_size(max_size)
            .min_idle(Some(min_size))
            .connection_timeout(config.lease_timeout())
            .test_on_check_out(!descriptor.is_embedded)
            .error_handler(Box::new(Arc::clone(&self.inner.errors)));
        if descriptor.is_embedded {
            builder = builder.idle_timeout(None).max_lifetime(None);
        }
        self.inner.errors.clear();
        *slot = Some(builder.build_unchecked(manager));

        tracing::info!(
            backend = %descriptor.kind,
            min_size,
            max_size,
            lease_timeout_ms = config.pool_lease_timeout_ms,
            "connection pool ready"
        );
        Ok(())
    }

    /// [`connect`](Self::connect), retrying retriable failures per `policy`.
    ///
    /// # Errors
    /// Returns the last error once the policy's attempts are used up, or the
    /// first non-retriable error.
    pub fn connect_with_retry(&self, policy: &ReconnectPolicy) -> Result<(), DbError> {
        let mut attempt = 1;
        loop {
            match self.connect() {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retriable() && attempt < policy.max_attempts => {
                    let delay = policy.delay_for(attempt);
                    tracing::info!(
                        backend = %self.inner.descriptor.kind,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "connect failed, retrying"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Tear the pool down. Idle connections close now; leased ones close
    /// when their lease is dropped.
    pub fn disconnect(&self) {
        let pool = self
            .inner
            .pool
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if pool.is_some() {
            tracing::info!(backend = %self.inner.descriptor.kind, "connection pool closed");
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner
            .pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Lease a connection.
    ///
    /// Networked backends block up to the configured lease timeout. Embedded
    /// backends block until a handle is returned, since their handles are
    /// never replaced.
    ///
    /// # Errors
    /// - [`DbError::Connection`] if the provider is disconnected or the
    ///   backend cannot be reached.
    /// - [`DbError::PoolExhausted`] if every networked connection stayed
    ///   leased for the whole lease timeout.
    pub fn get_connection(&self) -> Result<Lease, DbError> {
        let pool = self.current_pool()?;
        let timeout = self.inner.config.lease_timeout();
        loop {
            let started = Instant::now();
            match pool.get_timeout(timeout) {
                Ok(conn) => return Ok(Lease::new(conn, Arc::clone(&self.inner.counters))),
                Err(_) if self.inner.descriptor.is_embedded => {
                    if let Some(err) = self.open_failure(&pool, started) {
                        return Err(err);
                    }
                    // the pool may have been torn down while we waited
                    self.current_pool()?;
                    tracing::debug!(
                        backend = %self.inner.descriptor.kind,
                        waited_ms = started.elapsed().as_millis(),
                        in_use = self.inner.counters.in_use(),
                        "still waiting for embedded connection"
                    );
                }
                Err(_) => return Err(self.lease_failure(&pool, started)),
            }
        }
    }

    /// Current pool counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let pool = self
            .inner
            .pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match pool {
            Some(pool) => {
                let state = pool.state();
                self.inner
                    .counters
                    .snapshot(pool.max_size(), state.connections, state.idle_connections)
            }
            None => self.inner.counters.snapshot(0, 0, 0),
        }
    }

    fn current_pool(&self) -> Result<Pool, DbError> {
        self.inner
            .pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| {
                DbError::Connection(format!(
                    "{} provider is not connected",
                    self.inner.descriptor.kind
                ))
            })
    }

    /// A connection error if the pool had room but failed to open a handle
    /// since `started`.
    fn open_failure(&self, pool: &Pool, started: Instant) -> Option<DbError> {
        // spare capacity plus a fresh open failure means the backend is down, not busy
        if pool.state().connections < pool.max_size() {
            return self
                .inner
                .errors
                .error_since(started)
                .map(DbError::Connection);
        }
        None
    }

    fn lease_failure(&self, pool: &Pool, started: Instant) -> DbError {
        if let Some(err) = self.open_failure(pool, started) {
            return err;
        }

        let timeout_ms = self.inner.config.pool_lease_timeout_ms;
        self.inner.counters.record_exhausted();
        tracing::warn!(
            backend = %self.inner.descriptor.kind,
            timeout_ms,
            in_use = self.inner.counters.in_use(),
            max_size = pool.max_size(),
            "lease timed out"
        );
        DbError::PoolExhausted { timeout_ms }
    }
}

impl std::fmt::Debug for ConnectionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProvider")
            .field("backend", &self.inner.descriptor.kind)
            .field("connected", &self.is_connected())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::backend::BackendKind;

    fn memory_provider() -> ConnectionProvider {
        let config = DatabaseConfig::builder(BackendKind::EmbeddedMemory)
            .lease_timeout(Duration::from_millis(100))
            .finish();
        let provider = ConnectionProvider::new(config).unwrap();
        provider.connect().unwrap();
        provider
    }

    #[test]
    fn memory_backend_shares_one_handle() {
        let provider = memory_provider();
        let first_id = provider.get_connection().unwrap().id();
        let second_id = provider.get_connection().unwrap().id();
        assert_eq!(first_id, second_id);
        assert_eq!(provider.stats().max_size, 1);
    }

    #[test]
    fn memory_callers_wait_past_the_lease_timeout() {
        let provider = memory_provider();
        let held = provider.get_connection().unwrap();
        let held_id = held.id();

        let waiter = {
            let provider = provider.clone();
            std::thread::spawn(move || provider.get_connection().map(|lease| lease.id()))
        };
        // hold the only handle for several lease timeouts
        std::thread::sleep(Duration::from_millis(350));
        assert!(!waiter.is_finished());
        drop(held);

        assert_eq!(waiter.join().unwrap().unwrap(), held_id);
        let stats = provider.stats();
        assert_eq!(stats.exhausted, 0);
        assert_eq!(stats.in_use, 0);
    }

    #[test]
    fn waiting_caller_fails_once_provider_disconnects() {
        let provider = memory_provider();
        let held = provider.get_connection().unwrap();
        let waiter = {
            let provider = provider.clone();
            std::thread::spawn(move || provider.get_connection().map(|lease| lease.id()))
        };
        std::thread::sleep(Duration::from_millis(50));
        provider.disconnect();

        assert!(matches!(waiter.join().unwrap(), Err(DbError::Connection(_))));
        drop(held);
    }

    #[test]
    fn disconnected_provider_refuses_leases() {
        let provider = memory_provider();
        provider.disconnect();
        assert!(!provider.is_connected());
        assert!(matches!(
            provider.get_connection(),
            Err(DbError::Connection(_))
        ));
        provider.connect().unwrap();
        assert!(provider.get_connection().is_ok());
    }
}
