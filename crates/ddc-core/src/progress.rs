use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared run counters, read by the progress ticker.
#[derive(Debug, Default, Clone)]
pub struct Progress {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    hosts_total: AtomicUsize,
    hosts_succeeded: AtomicUsize,
    hosts_failed: AtomicUsize,
    tables_exported: AtomicUsize,
    tables_failed: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    pub hosts_total: usize,
    pub hosts_succeeded: usize,
    pub hosts_failed: usize,
    pub tables_exported: usize,
    pub tables_failed: usize,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_hosts_total(&self, n: usize) {
        self.inner.hosts_total.store(n, Ordering::Relaxed);
    }

    pub fn host_finished(&self, ok: bool) {
        let counter = if ok {
            &self.inner.hosts_succeeded
        } else {
            &self.inner.hosts_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn table_finished(&self, ok: bool) {
        let counter = if ok {
            &self.inner.tables_exported
        } else {
            &self.inner.tables_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            hosts_total: self.inner.hosts_total.load(Ordering::Relaxed),
            hosts_succeeded: self.inner.hosts_succeeded.load(Ordering::Relaxed),
            hosts_failed: self.inner.hosts_failed.load(Ordering::Relaxed),
            tables_exported: self.inner.tables_exported.load(Ordering::Relaxed),
            tables_failed: self.inner.tables_failed.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hosts {}/{} done ({} failed), system tables {} exported ({} failed)",
            self.hosts_succeeded + self.hosts_failed,
            self.hosts_total,
            self.hosts_failed,
            self.tables_exported,
            self.tables_failed
        )
    }
}
