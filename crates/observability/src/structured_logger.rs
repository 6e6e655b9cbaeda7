use chrono::{DateTime, Utc};
use scheduler_config::{LogFormat, ObservabilityConfig};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_location: bool,
    pub include_thread_id: bool,
    pub include_thread_name: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_location: false,
            include_thread_id: false,
            include_thread_name: false,
        }
    }
}

impl From<&ObservabilityConfig> for LoggingConfig {
    fn from(config: &ObservabilityConfig) -> Self {
        Self {
            level: config.log_level.clone(),
            format: config.log_format,
            include_location: config.include_location,
            ..Default::default()
        }
    }
}

/// 任务生命周期事件日志，字段命名统一为 `task.*` / `worker.*` / `scheduler.*`
pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_task_submitted(theme: &str, task_id: i64, service: &str, method: &str) {
        info!(
            event = "task_submitted",
            scheduler.theme = theme,
            task.id = task_id,
            task.service = service,
            task.method = method,
            "任务已提交"
        );
    }

    pub fn log_task_claimed(task_id: i64, log_id: &str, worker_id: u64, started_at: DateTime<Utc>) {
        debug!(
            event = "task_claimed",
            task.id = task_id,
            task.log_id = log_id,
            worker.id = worker_id,
            task.started_at = %started_at,
            "任务已认领"
        );
    }

    pub fn log_task_execution_complete(
        task_id: i64,
        log_id: &str,
        worker_id: u64,
        status: &str,
        duration_ms: i64,
        error_message: Option<&str>,
    ) {
        match error_message {
            None => info!(
                event = "task_execution_complete",
                task.id = task_id,
                task.log_id = log_id,
                worker.id = worker_id,
                task.status = status,
                task.duration_ms = duration_ms,
                "任务执行完成"
            ),
            Some(message) => error!(
                event = "task_execution_failed",
                task.id = task_id,
                task.log_id = log_id,
                worker.id = worker_id,
                task.status = status,
                task.duration_ms = duration_ms,
                task.error = message,
                "任务执行失败"
            ),
        }
    }

    pub fn log_task_retry(task_id: i64, retry_time: i32, max_retry_time: i32) {
        info!(
            event = "task_retry",
            task.id = task_id,
            task.retry_time = retry_time,
            task.max_retry_time = max_retry_time,
            "任务进入重试"
        );
    }

    pub fn log_task_released(task_id: i64, reason: &str) {
        warn!(
            event = "task_released",
            task.id = task_id,
            task.release_reason = reason,
            "任务已放回等待状态"
        );
    }

    pub fn log_stale_tasks_recovered(theme: &str, task_ids: &[i64]) {
        warn!(
            event = "stale_tasks_recovered",
            scheduler.theme = theme,
            task.ids = ?task_ids,
            task.count = task_ids.len(),
            "检测到心跳超时的任务，已重置为等待"
        );
    }

    pub fn log_worker_spawned(theme: &str, worker_id: u64, total_workers: usize) {
        debug!(
            event = "worker_spawned",
            scheduler.theme = theme,
            worker.id = worker_id,
            worker.total = total_workers,
            "Worker已启动"
        );
    }

    pub fn log_worker_retired(theme: &str, worker_id: u64, total_workers: usize) {
        debug!(
            event = "worker_retired",
            scheduler.theme = theme,
            worker.id = worker_id,
            worker.total = total_workers,
            "空闲Worker已退出"
        );
    }

    pub fn log_alarm(task_id: i64, message: &str) {
        error!(event = "task_alarm", task.id = task_id, alarm.message = message, "任务告警");
    }
}
