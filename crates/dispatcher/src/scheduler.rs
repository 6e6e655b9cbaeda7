use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use scheduler_domain::entities::NewTask;
use scheduler_domain::repositories::TaskStore;
use scheduler_errors::{SchedulerError, SchedulerResult};
use scheduler_observability::{MetricsCollector, StructuredLogger};
use scheduler_worker::{
    Executor, ExecutorConfig, HandlerRegistry, InFlightLedger, LoggingHooks, SchedulerStats,
    StatusSnapshot, TaskHooks, TaskQueue, WorkerPool, WorkerPoolConfig,
};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::heartbeat_monitor::{HeartbeatMonitor, HeartbeatMonitorConfig};

/// 调度器运行参数
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 扫描间隔
    pub scan_interval: Duration,
    /// 单次扫描最多读取的任务数
    pub scan_batch_size: i64,
    /// 本地任务队列容量
    pub queue_capacity: usize,
    /// 快速入队的最长等待时间
    pub quick_queue_timeout: Duration,
    /// 状态快照日志与指标的发布间隔
    pub monitor_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(1),
            scan_batch_size: 100,
            queue_capacity: 200,
            quick_queue_timeout: Duration::from_millis(50),
            monitor_interval: Duration::from_secs(30),
        }
    }
}

/// 单个任务ID尝试进入本地队列的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// 本进程已在排队或执行该任务
    AlreadyQueued,
    /// 队列已满（或等待超时），认领已释放，等待下次扫描
    QueueFull,
}

pub struct SchedulerBuilder {
    theme: String,
    store: TaskStore,
    handlers: Arc<HandlerRegistry>,
    hooks: Arc<dyn TaskHooks>,
    config: SchedulerConfig,
    pool_config: WorkerPoolConfig,
    executor_config: ExecutorConfig,
    monitor_config: HeartbeatMonitorConfig,
    cancel: CancellationToken,
}

impl SchedulerBuilder {
    pub fn new(theme: impl Into<String>, store: TaskStore) -> Self {
        Self {
            theme: theme.into(),
            store,
            handlers: Arc::new(HandlerRegistry::new()),
            hooks: Arc::new(LoggingHooks),
            config: SchedulerConfig::default(),
            pool_config: WorkerPoolConfig::default(),
            executor_config: ExecutorConfig::default(),
            monitor_config: HeartbeatMonitorConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn handlers(mut self, handlers: Arc<HandlerRegistry>) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn TaskHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn worker_pool(mut self, pool_config: WorkerPoolConfig) -> Self {
        self.pool_config = pool_config;
        self
    }

    pub fn executor(mut self, executor_config: ExecutorConfig) -> Self {
        self.executor_config = executor_config;
        self
    }

    pub fn heartbeat_monitor(mut self, monitor_config: HeartbeatMonitorConfig) -> Self {
        self.monitor_config = monitor_config;
        self
    }

    /// 挂到上级取消信号下：上级取消时本调度器一起停止，反之不影响上级
    pub fn parent_token(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    pub fn build(self) -> SchedulerResult<Arc<Scheduler>> {
        if self.theme.trim().is_empty() {
            return Err(SchedulerError::config_error("调度分区(theme)不能为空"));
        }
        if self.config.scan_batch_size <= 0 {
            return Err(SchedulerError::config_error("scan_batch_size 必须大于0"));
        }
        if self.config.queue_capacity == 0 {
            return Err(SchedulerError::config_error("queue_capacity 必须大于0"));
        }
        if self.pool_config.max_workers == 0
            || self.pool_config.min_workers > self.pool_config.max_workers
        {
            return Err(SchedulerError::config_error(format!(
                "Worker数量范围无效: min={}, max={}",
                self.pool_config.min_workers, self.pool_config.max_workers
            )));
        }

        let metrics = MetricsCollector::new(&self.theme);
        let stats = Arc::new(SchedulerStats::new());
        let queue = Arc::new(TaskQueue::new(self.config.queue_capacity));
        let ledger = Arc::new(InFlightLedger::new());

        let executor = Arc::new(Executor::new(
            self.store.clone(),
            self.handlers,
            self.hooks.clone(),
            self.executor_config,
        ));
        let pool = WorkerPool::new(
            self.theme.clone(),
            self.pool_config,
            queue.clone(),
            executor,
            ledger.clone(),
            stats.clone(),
            metrics.clone(),
            self.cancel.clone(),
        );
        let monitor = HeartbeatMonitor::new(
            self.theme.clone(),
            self.store.tasks.clone(),
            self.hooks,
            stats.clone(),
            metrics.clone(),
            self.monitor_config,
        );

        Ok(Arc::new(Scheduler {
            theme: self.theme,
            config: self.config,
            store: self.store,
            queue,
            ledger,
            stats,
            pool,
            monitor,
            metrics,
            cancel: self.cancel,
            loops: TaskTracker::new(),
            started: AtomicBool::new(false),
        }))
    }
}

/// 单个分区的调度器
///
/// 扫描流程：`find_runnable` → 本地去重认领 → 非阻塞写入队列（满则释放认领）→ 按积压唤醒Worker。
/// 跨进程的互斥完全依赖存储的条件更新，同一分区可以有多个进程同时运行调度器。
pub struct Scheduler {
    theme: String,
    config: SchedulerConfig,
    store: TaskStore,
    queue: Arc<TaskQueue>,
    ledger: Arc<InFlightLedger>,
    stats: Arc<SchedulerStats>,
    pool: WorkerPool,
    monitor: HeartbeatMonitor,
    metrics: MetricsCollector,
    cancel: CancellationToken,
    loops: TaskTracker,
    started: AtomicBool,
}

impl Scheduler {
    pub fn builder(theme: impl Into<String>, store: TaskStore) -> SchedulerBuilder {
        SchedulerBuilder::new(theme, store)
    }

    pub fn theme(&self) -> &str {
        &self.theme
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn ledger(&self) -> &InFlightLedger {
        &self.ledger
    }

    pub fn heartbeat_monitor(&self) -> &HeartbeatMonitor {
        &self.monitor
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.cancel.is_cancelled()
    }

    /// 启动Worker下限、扫描循环、状态监控循环和死任务检测循环，重复调用无效果
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let spawned = self.pool.ensure_min_workers();
        info!(
            theme = %self.theme,
            workers = spawned,
            scan_interval_ms = self.config.scan_interval.as_millis() as u64,
            "调度器已启动"
        );

        let scheduler = Arc::clone(self);
        self.loops.spawn(async move { scheduler.scan_loop().await });

        let scheduler = Arc::clone(self);
        self.loops.spawn(async move { scheduler.monitor_loop().await });

        let scheduler = Arc::clone(self);
        self.loops.spawn(async move {
            scheduler
                .monitor
                .run(scheduler.cancel.clone())
                .await
        });
    }

    /// 执行一次扫描，返回本次成功入队的任务数
    pub async fn scan_once(&self) -> SchedulerResult<usize> {
        let started = Instant::now();
        let ids = self
            .store
            .tasks
            .find_runnable(&self.theme, self.config.scan_batch_size)
            .await?;

        SchedulerStats::incr(&self.stats.scans);
        SchedulerStats::add(&self.stats.discovered, ids.len() as u64);

        let mut queued = 0;
        for id in &ids {
            match self.enqueue(*id) {
                EnqueueOutcome::Queued => queued += 1,
                EnqueueOutcome::AlreadyQueued => {}
                EnqueueOutcome::QueueFull => {
                    debug!(theme = %self.theme, task_id = id, "本地队列已满，等待下次扫描");
                }
            }
        }

        self.wake_workers();
        self.metrics
            .record_scan(ids.len(), started.elapsed().as_secs_f64());
        if !ids.is_empty() {
            debug!(
                theme = %self.theme,
                discovered = ids.len(),
                queued,
                backlog = self.queue.len(),
                "扫描完成"
            );
        }
        Ok(queued)
    }

    /// 非阻塞入队；队列已满时立即释放本地认领，任务仍在存储中等待下次扫描
    pub fn enqueue(&self, task_id: i64) -> EnqueueOutcome {
        if !self.ledger.try_claim(task_id) {
            return EnqueueOutcome::AlreadyQueued;
        }
        if self.queue.try_push(task_id) {
            return EnqueueOutcome::Queued;
        }

        self.ledger.release(task_id);
        SchedulerStats::incr(&self.stats.dropped_on_full);
        self.metrics.record_dropped();
        EnqueueOutcome::QueueFull
    }

    /// 按当前积压唤醒Worker，返回新启动的数量
    pub fn wake_workers(&self) -> usize {
        self.pool.wake(self.queue.len())
    }

    /// 绕过周期扫描直接入队，最多等待 `quick_queue_timeout`
    pub async fn quick_queue(&self, task_id: i64) -> EnqueueOutcome {
        if self.cancel.is_cancelled() {
            return EnqueueOutcome::QueueFull;
        }
        if !self.ledger.try_claim(task_id) {
            return EnqueueOutcome::AlreadyQueued;
        }
        if !self
            .queue
            .push_timeout(task_id, self.config.quick_queue_timeout)
            .await
        {
            self.ledger.release(task_id);
            SchedulerStats::incr(&self.stats.dropped_on_full);
            self.metrics.record_dropped();
            debug!(theme = %self.theme, task_id, "快速入队超时，等待下次扫描");
            return EnqueueOutcome::QueueFull;
        }

        SchedulerStats::incr(&self.stats.quick_queued);
        self.metrics.record_quick_queued();
        self.wake_workers();
        EnqueueOutcome::Queued
    }

    /// 以 `Wait` 状态持久化任务（分区强制为本调度器的分区），然后尽力快速入队
    pub async fn submit(&self, mut task: NewTask) -> SchedulerResult<i64> {
        if task.theme != self.theme {
            if !task.theme.is_empty() {
                warn!(
                    requested = %task.theme,
                    theme = %self.theme,
                    "提交的任务分区与调度器不一致，已改为调度器分区"
                );
            }
            task.theme = self.theme.clone();
        }

        let created = self.store.tasks.create(&task).await?;
        StructuredLogger::log_task_submitted(
            &self.theme,
            created.id,
            &created.service_name,
            &created.method_name,
        );

        if self.started.load(Ordering::SeqCst) {
            self.quick_queue(created.id).await;
        }
        Ok(created.id)
    }

    pub fn status_snapshot(&self) -> StatusSnapshot {
        self.stats.snapshot(
            &self.theme,
            self.pool.total_workers(),
            self.pool.idle_workers(),
            self.queue.len(),
            self.ledger.len(),
        )
    }

    /// 触发取消并等待所有循环和Worker退出。执行中的任务会先跑完。
    /// 超时返回 `false`，未完成的任务之后由死任务检测回收。
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        info!(theme = %self.theme, "正在关闭调度器");
        self.cancel.cancel();
        let deadline = Instant::now() + timeout;

        self.loops.close();
        let loops_stopped = tokio::time::timeout(timeout, self.loops.wait())
            .await
            .is_ok();
        let workers_stopped = self
            .pool
            .wait_stopped(deadline.saturating_duration_since(Instant::now()))
            .await;

        let stopped = loops_stopped && workers_stopped;
        if stopped {
            info!(theme = %self.theme, "调度器已关闭");
        } else {
            warn!(
                theme = %self.theme,
                remaining_workers = self.pool.total_workers(),
                "调度器关闭超时"
            );
        }
        stopped
    }

    async fn scan_loop(&self) {
        let mut ticker = interval(self.config.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.scan_once().await {
                        warn!(theme = %self.theme, "扫描任务失败: {}", e);
                    }
                }
            }
        }
        debug!(theme = %self.theme, "扫描循环已退出");
    }

    async fn monitor_loop(&self) {
        let mut ticker = interval(self.config.monitor_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => self.publish_status(),
            }
        }
        debug!(theme = %self.theme, "状态监控循环已退出");
    }

    fn publish_status(&self) {
        // Worker只会因空闲退出到下限，这里兜底补齐
        self.pool.ensure_min_workers();

        let snapshot = self.status_snapshot();
        self.metrics.update_gauges(
            snapshot.workers_total,
            snapshot.workers_idle,
            snapshot.queue_len,
            snapshot.in_flight,
        );
        info!(
            theme = %snapshot.theme,
            scans = snapshot.scans,
            discovered = snapshot.discovered,
            dequeued = snapshot.dequeued,
            executed = snapshot.executed,
            succeeded = snapshot.succeeded,
            failed = snapshot.failed,
            retried = snapshot.retried,
            dropped_on_full = snapshot.dropped_on_full,
            quick_queued = snapshot.quick_queued,
            stale_recovered = snapshot.stale_recovered,
            workers_total = snapshot.workers_total,
            workers_idle = snapshot.workers_idle,
            queue_len = snapshot.queue_len,
            in_flight = snapshot.in_flight,
            "调度器状态"
        );
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("theme", &self.theme)
            .field("config", &self.config)
            .field("pool", &self.pool)
            .finish()
    }
}
