use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};

/// 单个调度分区的指标句柄，所有指标都带 `theme` 标签
#[derive(Clone)]
pub struct MetricsCollector {
    scans_total: Counter,
    scan_duration: Histogram,
    tasks_discovered_total: Counter,
    tasks_dropped_total: Counter,
    tasks_quick_queued_total: Counter,
    task_executions_total: Counter,
    task_success_total: Counter,
    task_failures_total: Counter,
    task_retries_total: Counter,
    task_execution_duration: Histogram,
    stale_tasks_recovered_total: Counter,
    workers_total: Gauge,
    workers_idle: Gauge,
    queue_depth: Gauge,
    in_flight_tasks: Gauge,
}

impl MetricsCollector {
    pub fn new(theme: &str) -> Self {
        let theme = theme.to_string();
        Self {
            scans_total: counter!("scheduler_scans_total", "theme" => theme.clone()),
            scan_duration: histogram!("scheduler_scan_duration_seconds", "theme" => theme.clone()),
            tasks_discovered_total: counter!("scheduler_tasks_discovered_total", "theme" => theme.clone()),
            tasks_dropped_total: counter!("scheduler_tasks_dropped_total", "theme" => theme.clone()),
            tasks_quick_queued_total: counter!("scheduler_tasks_quick_queued_total", "theme" => theme.clone()),
            task_executions_total: counter!("scheduler_task_executions_total", "theme" => theme.clone()),
            task_success_total: counter!("scheduler_task_success_total", "theme" => theme.clone()),
            task_failures_total: counter!("scheduler_task_failures_total", "theme" => theme.clone()),
            task_retries_total: counter!("scheduler_task_retries_total", "theme" => theme.clone()),
            task_execution_duration: histogram!("scheduler_task_execution_duration_seconds", "theme" => theme.clone()),
            stale_tasks_recovered_total: counter!("scheduler_stale_tasks_recovered_total", "theme" => theme.clone()),
            workers_total: gauge!("scheduler_workers_total", "theme" => theme.clone()),
            workers_idle: gauge!("scheduler_workers_idle", "theme" => theme.clone()),
            queue_depth: gauge!("scheduler_queue_depth", "theme" => theme.clone()),
            in_flight_tasks: gauge!("scheduler_in_flight_tasks", "theme" => theme),
        }
    }

    pub fn record_scan(&self, discovered: usize, duration_seconds: f64) {
        self.scans_total.increment(1);
        self.tasks_discovered_total.increment(discovered as u64);
        self.scan_duration.record(duration_seconds);
    }

    pub fn record_dropped(&self) {
        self.tasks_dropped_total.increment(1);
    }

    pub fn record_quick_queued(&self) {
        self.tasks_quick_queued_total.increment(1);
    }

    /// `status` 为任务结束后的状态字符串（SUCCESS / FAILED / RETRY）
    pub fn record_task_outcome(&self, status: &str, duration_seconds: f64) {
        self.task_executions_total.increment(1);
        self.task_execution_duration.record(duration_seconds);
        match status {
            "SUCCESS" => self.task_success_total.increment(1),
            "RETRY" => self.task_retries_total.increment(1),
            _ => self.task_failures_total.increment(1),
        }
    }

    pub fn record_stale_recovered(&self, count: u64) {
        self.stale_tasks_recovered_total.increment(count);
    }

    pub fn update_gauges(&self, workers: usize, idle: usize, queue_len: usize, in_flight: usize) {
        self.workers_total.set(workers as f64);
        self.workers_idle.set(idle as f64);
        self.queue_depth.set(queue_len as f64);
        self.in_flight_tasks.set(in_flight as f64);
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector").finish_non_exhaustive()
    }
}
