use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use scheduler_domain::entities::TaskStatus;
use scheduler_observability::{MetricsCollector, StructuredLogger};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use crate::executor::{panic_message, ExecutionReport, Executor};
use crate::ledger::InFlightLedger;
use crate::queue::TaskQueue;
use crate::stats::SchedulerStats;

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    /// 单次等待任务的时长
    pub idle_wait: Duration,
    /// 空闲超过该时长才允许退出
    pub idle_grace: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            min_workers: 2,
            max_workers: 16,
            idle_wait: Duration::from_secs(5),
            idle_grace: Duration::from_secs(30),
        }
    }
}

struct PoolShared {
    theme: String,
    config: WorkerPoolConfig,
    queue: Arc<TaskQueue>,
    executor: Arc<Executor>,
    ledger: Arc<InFlightLedger>,
    stats: Arc<SchedulerStats>,
    metrics: MetricsCollector,
    total: AtomicUsize,
    idle: AtomicUsize,
    next_worker_id: AtomicU64,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

/// 弹性Worker池
///
/// Worker数量在 `[min_workers, max_workers]` 之间变化：扩容由调度器按积压量请求，
/// 缩容由空闲的Worker自行决定。总数的检查与增减都在同一个原子计数上完成，
/// 并发扩容请求不会越过上限。
#[derive(Clone)]
pub struct WorkerPool {
    shared: Arc<PoolShared>,
}

impl WorkerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        theme: impl Into<String>,
        config: WorkerPoolConfig,
        queue: Arc<TaskQueue>,
        executor: Arc<Executor>,
        ledger: Arc<InFlightLedger>,
        stats: Arc<SchedulerStats>,
        metrics: MetricsCollector,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                theme: theme.into(),
                config,
                queue,
                executor,
                ledger,
                stats,
                metrics,
                total: AtomicUsize::new(0),
                idle: AtomicUsize::new(0),
                next_worker_id: AtomicU64::new(1),
                cancel,
                tracker: TaskTracker::new(),
            }),
        }
    }

    pub fn total_workers(&self) -> usize {
        self.shared.total.load(Ordering::SeqCst)
    }

    pub fn idle_workers(&self) -> usize {
        self.shared.idle.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.shared.config
    }

    /// 补齐到最小Worker数
    pub fn ensure_min_workers(&self) -> usize {
        let missing = self
            .shared
            .config
            .min_workers
            .saturating_sub(self.total_workers());
        self.spawn_workers(missing)
    }

    /// 最多启动 `count` 个Worker，返回实际启动的数量（受 `max_workers` 限制）
    pub fn spawn_workers(&self, count: usize) -> usize {
        let mut spawned = 0;
        for _ in 0..count {
            if self.shared.cancel.is_cancelled() {
                break;
            }
            let max = self.shared.config.max_workers;
            let reserved = self
                .shared
                .total
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| {
                    (t < max).then_some(t + 1)
                });
            let Ok(previous) = reserved else {
                break;
            };

            let worker_id = self.shared.next_worker_id.fetch_add(1, Ordering::SeqCst);
            // 启动前先计为空闲，避免调度器在Worker真正运行前重复扩容
            self.shared.idle.fetch_add(1, Ordering::SeqCst);
            let shared = Arc::clone(&self.shared);
            self.shared
                .tracker
                .spawn(async move { worker_loop(shared, worker_id).await });

            StructuredLogger::log_worker_spawned(&self.shared.theme, worker_id, previous + 1);
            spawned += 1;
        }
        spawned
    }

    /// 按积压量扩容：`needed = backlog - idle`
    pub fn wake(&self, backlog: usize) -> usize {
        let needed = backlog.saturating_sub(self.idle_workers());
        if needed == 0 {
            return 0;
        }
        let spawned = self.spawn_workers(needed);
        if spawned > 0 {
            debug!(
                theme = %self.shared.theme,
                backlog,
                spawned,
                total = self.total_workers(),
                "按积压扩容Worker"
            );
        }
        spawned
    }

    /// 等待所有Worker退出（需要先触发取消信号），超时返回 `false`
    pub async fn wait_stopped(&self, timeout: Duration) -> bool {
        self.shared.tracker.close();
        tokio::time::timeout(timeout, self.shared.tracker.wait())
            .await
            .is_ok()
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("theme", &self.shared.theme)
            .field("total", &self.total_workers())
            .field("idle", &self.idle_workers())
            .finish()
    }
}

async fn worker_loop(shared: Arc<PoolShared>, worker_id: u64) {
    let mut last_active = Instant::now();

    loop {
        let next = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            next = shared.queue.pop_timeout(shared.config.idle_wait) => next,
        };

        match next {
            Some(task_id) => {
                shared.idle.fetch_sub(1, Ordering::SeqCst);
                SchedulerStats::incr(&shared.stats.dequeued);

                let started = Instant::now();
                let report = AssertUnwindSafe(shared.executor.run(task_id, worker_id))
                    .catch_unwind()
                    .await;
                shared.ledger.release(task_id);

                match report {
                    Ok(report) => record_report(&shared, report, started.elapsed()),
                    Err(payload) => {
                        error!(
                            task_id,
                            worker_id,
                            "执行器发生panic: {}",
                            panic_message(payload.as_ref())
                        );
                    }
                }

                last_active = Instant::now();
                shared.idle.fetch_add(1, Ordering::SeqCst);
            }
            None => {
                if try_retire(&shared, last_active) {
                    shared.idle.fetch_sub(1, Ordering::SeqCst);
                    StructuredLogger::log_worker_retired(
                        &shared.theme,
                        worker_id,
                        shared.total.load(Ordering::SeqCst),
                    );
                    return;
                }
            }
        }
    }

    shared.idle.fetch_sub(1, Ordering::SeqCst);
    shared.total.fetch_sub(1, Ordering::SeqCst);
    info!(theme = %shared.theme, worker_id, "Worker收到停止信号，已退出");
}

/// 同时满足以下条件时退出：总数大于下限、积压少于空闲Worker数、空闲超过宽限期
fn try_retire(shared: &PoolShared, last_active: Instant) -> bool {
    if last_active.elapsed() < shared.config.idle_grace {
        return false;
    }
    if shared.queue.len() >= shared.idle.load(Ordering::SeqCst) {
        return false;
    }
    let min = shared.config.min_workers;
    shared
        .total
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| {
            (t > min).then(|| t - 1)
        })
        .is_ok()
}

fn record_report(shared: &PoolShared, report: ExecutionReport, elapsed: Duration) {
    let stats = &shared.stats;
    match report {
        ExecutionReport::Completed(status) => {
            SchedulerStats::incr(&stats.executed);
            match status {
                TaskStatus::Success => SchedulerStats::incr(&stats.succeeded),
                TaskStatus::Retry => SchedulerStats::incr(&stats.retried),
                _ => SchedulerStats::incr(&stats.failed),
            }
            shared
                .metrics
                .record_task_outcome(status.as_str(), elapsed.as_secs_f64());
        }
        ExecutionReport::Skipped => SchedulerStats::incr(&stats.skipped),
        ExecutionReport::Released => SchedulerStats::incr(&stats.released),
    }
}
