use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Point-in-time copy of the allocation counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    pub environments: u64,
    pub connections: u64,
    pub statements: u64,
}

/// Allocation counters for environment, connection and statement handles.
///
/// Only this crate moves the counters; observers get read access.
#[derive(Debug, Default)]
pub struct Stats {
    environments: AtomicU64,
    connections: AtomicU64,
    statements: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn environments(&self) -> u64 {
        self.environments.load(Ordering::Relaxed)
    }

    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn statements(&self) -> u64 {
        self.statements.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            environments: self.environments(),
            connections: self.connections(),
            statements: self.statements(),
        }
    }

    pub(crate) fn environment_allocated(&self) {
        self.environments.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn environment_released(&self) {
        decrement(&self.environments, "environment");
    }

    pub(crate) fn connection_allocated(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_released(&self) {
        decrement(&self.connections, "connection");
    }

    pub(crate) fn statement_allocated(&self) {
        self.statements.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn statement_released(&self) {
        decrement(&self.statements, "statement");
    }
}

fn decrement(counter: &AtomicU64, name: &str) {
    if counter
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1))
        .is_err()
    {
        log::error!("{} counter released more often than allocated", name);
    }
}

/// Counts one live statement handle for as long as it is held.
///
/// Statement components create one per allocated statement handle and drop
/// it after `SQLFreeHandle`.
#[derive(Debug)]
#[must_use = "dropping the tracker immediately releases the statement count"]
pub struct StatementTracker {
    stats: Arc<Stats>,
}

impl StatementTracker {
    pub(crate) fn new(stats: Arc<Stats>) -> Self {
        stats.statement_allocated();
        Self { stats }
    }
}

impl Drop for StatementTracker {
    fn drop(&mut self) {
        self.stats.statement_released();
    }
}
