use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::connection::ConnectionHandle;

use super::manager::BackendManager;
use super::stats::LeaseCounters;

/// Exclusive use of one pooled connection.
///
/// Dropping the lease returns the connection to the pool, or evicts it if it
/// was marked broken while leased.
pub struct Lease {
    conn: r2d2::PooledConnection<BackendManager>,
    counters: Arc<LeaseCounters>,
}

impl Lease {
    pub(crate) fn new(
        conn: r2d2::PooledConnection<BackendManager>,
        counters: Arc<LeaseCounters>,
    ) -> Self {
        counters.acquired();
        Self { conn, counters }
    }
}

impl Deref for Lease {
    type Target = ConnectionHandle;

    fn deref(&self) -> &ConnectionHandle {
        &self.conn
    }
}

impl DerefMut for Lease {
    fn deref_mut(&mut self) -> &mut ConnectionHandle {
        &mut self.conn
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.counters.released();
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Lease").field(&*self.conn).finish()
    }
}
