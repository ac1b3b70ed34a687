use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Point-in-time view of a provider's pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Upper bound on physical connections.
    pub max_size: u32,
    /// Physical connections currently open.
    pub connections: u32,
    /// Open connections waiting in the pool.
    pub idle: u32,
    /// Leases currently held by callers.
    pub in_use: usize,
    /// Most leases ever held at the same time.
    pub high_water_mark: usize,
    /// Total leases handed out.
    pub leases: u64,
    /// Acquisitions that gave up after the lease timeout.
    pub exhausted: u64,
}

/// Lease bookkeeping shared between a provider and its outstanding leases.
#[derive(Debug, Default)]
pub(crate) struct LeaseCounters {
    in_use: AtomicUsize,
    high_water_mark: AtomicUsize,
    leases: AtomicU64,
    exhausted: AtomicU64,
}

impl LeaseCounters {
    pub fn acquired(&self) {
        let now = self.in_use.fetch_add(1, Ordering::AcqRel) + 1;
        self.high_water_mark.fetch_max(now, Ordering::AcqRel);
        self.leases.fetch_add(1, Ordering::Relaxed);
    }

    pub fn released(&self) {
        self.in_use.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn record_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    pub fn snapshot(&self, max_size: u32, connections: u32, idle: u32) -> PoolStats {
        PoolStats {
            max_size,
            connections,
            idle,
            in_use: self.in_use(),
            high_water_mark: self.high_water_mark.load(Ordering::Acquire),
            leases: self.leases.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }
}
