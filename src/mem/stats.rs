use std::sync::atomic::{AtomicU64, Ordering};

/// Accounting bucket. Device and pinned host memory are counted separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatKind {
    MallocFree,
    MallocFreeHost,
}

#[derive(Debug, Default)]
struct Counters {
    apply_total: AtomicU64,
    apply_success: AtomicU64,
    release_total: AtomicU64,
    release_success: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> StatsSnapshot {
        // Acquire on success makes every total bumped before it visible below.
        let apply_success = self.apply_success.load(Ordering::Acquire);
        let release_success = self.release_success.load(Ordering::Acquire);
        StatsSnapshot {
            apply_total: self.apply_total.load(Ordering::Relaxed),
            apply_success,
            release_total: self.release_total.load(Ordering::Relaxed),
            release_success,
        }
    }
}

/// A point-in-time copy of one bucket's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub apply_total: u64,     // allocate calls entered
    pub apply_success: u64,   // allocate calls that returned memory
    pub release_total: u64,   // free calls entered
    pub release_success: u64, // free calls the runtime accepted
}

/// Per-category allocation counters shared by every manager built with it.
///
/// Counters only grow. A success increment is a release paired with the
/// acquire load in [`ResourceStatistics::snapshot`], so a snapshot may pair a
/// newer `*_total` with an older `*_success` but never the reverse. Tests that
/// need isolated counts inject a fresh instance.
#[derive(Debug, Default)]
pub struct ResourceStatistics {
    device: Counters,
    host: Counters,
}

impl ResourceStatistics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    const fn bucket(&self, kind: StatKind) -> &Counters {
        match kind {
            StatKind::MallocFree => &self.device,
            StatKind::MallocFreeHost => &self.host,
        }
    }

    pub fn apply_total(&self, kind: StatKind) {
        self.bucket(kind).apply_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn apply_success(&self, kind: StatKind) {
        self.bucket(kind)
            .apply_success
            .fetch_add(1, Ordering::Release);
    }

    pub fn release_total(&self, kind: StatKind) {
        self.bucket(kind)
            .release_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn release_success(&self, kind: StatKind) {
        self.bucket(kind)
            .release_success
            .fetch_add(1, Ordering::Release);
    }

    #[must_use]
    pub fn snapshot(&self, kind: StatKind) -> StatsSnapshot {
        self.bucket(kind).snapshot()
    }
}
