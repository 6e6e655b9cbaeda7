use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// 调度器运行计数，全部为无锁原子计数
#[derive(Debug, Default)]
pub struct SchedulerStats {
    pub scans: AtomicU64,
    pub discovered: AtomicU64,
    pub dequeued: AtomicU64,
    pub executed: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub retried: AtomicU64,
    pub skipped: AtomicU64,
    pub released: AtomicU64,
    pub dropped_on_full: AtomicU64,
    pub quick_queued: AtomicU64,
    pub stale_recovered: AtomicU64,
}

impl SchedulerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, value: u64) {
        counter.fetch_add(value, Ordering::Relaxed);
    }

    /// 结合Worker池和队列的瞬时状态生成快照
    pub fn snapshot(
        &self,
        theme: &str,
        workers_total: usize,
        workers_idle: usize,
        queue_len: usize,
        in_flight: usize,
    ) -> StatusSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatusSnapshot {
            theme: theme.to_string(),
            scans: load(&self.scans),
            discovered: load(&self.discovered),
            dequeued: load(&self.dequeued),
            executed: load(&self.executed),
            succeeded: load(&self.succeeded),
            failed: load(&self.failed),
            retried: load(&self.retried),
            skipped: load(&self.skipped),
            released: load(&self.released),
            dropped_on_full: load(&self.dropped_on_full),
            quick_queued: load(&self.quick_queued),
            stale_recovered: load(&self.stale_recovered),
            workers_total,
            workers_idle,
            queue_len,
            in_flight,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub theme: String,
    pub scans: u64,
    pub discovered: u64,
    pub dequeued: u64,
    pub executed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retried: u64,
    pub skipped: u64,
    pub released: u64,
    pub dropped_on_full: u64,
    pub quick_queued: u64,
    pub stale_recovered: u64,
    pub workers_total: usize,
    pub workers_idle: usize,
    pub queue_len: usize,
    pub in_flight: usize,
}
