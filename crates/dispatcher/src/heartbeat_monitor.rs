use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use scheduler_domain::repositories::TaskRepository;
use scheduler_errors::SchedulerResult;
use scheduler_observability::{MetricsCollector, StructuredLogger};
use scheduler_worker::{SchedulerStats, TaskHooks};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// 死任务检测配置
#[derive(Debug, Clone)]
pub struct HeartbeatMonitorConfig {
    /// 检测间隔
    pub check_interval: Duration,
    /// 心跳（或无心跳时的 `update_time`）超过该时长视为执行者已崩溃
    pub stale_threshold: Duration,
}

impl Default for HeartbeatMonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(10),
            stale_threshold: Duration::from_secs(30),
        }
    }
}

/// 死任务检测器
///
/// 周期性地查找心跳过期的 `Running` 任务，以 `status = Running` 为条件批量重置为 `Wait`，
/// 之后由任意调度器的扫描重新发现并执行。
pub struct HeartbeatMonitor {
    theme: String,
    tasks: Arc<dyn TaskRepository>,
    hooks: Arc<dyn TaskHooks>,
    stats: Arc<SchedulerStats>,
    metrics: MetricsCollector,
    config: HeartbeatMonitorConfig,
}

impl HeartbeatMonitor {
    pub fn new(
        theme: impl Into<String>,
        tasks: Arc<dyn TaskRepository>,
        hooks: Arc<dyn TaskHooks>,
        stats: Arc<SchedulerStats>,
        metrics: MetricsCollector,
        config: HeartbeatMonitorConfig,
    ) -> Self {
        Self {
            theme: theme.into(),
            tasks,
            hooks,
            stats,
            metrics,
            config,
        }
    }

    pub fn config(&self) -> &HeartbeatMonitorConfig {
        &self.config
    }

    /// 执行一次检测，返回真正被重置为 `Wait` 的任务ID
    ///
    /// 查询和重置之间正常结束的候选任务不会被重置，也不会告警。
    pub async fn check_once(&self) -> SchedulerResult<Vec<i64>> {
        let threshold = Utc::now()
            - chrono::Duration::milliseconds(self.config.stale_threshold.as_millis() as i64);
        let stale = self.tasks.find_stale_running(&self.theme, threshold).await?;
        if stale.is_empty() {
            debug!(theme = %self.theme, "未发现心跳过期的任务");
            return Ok(stale);
        }

        let reset = self.tasks.reset_running_to_wait(&stale).await?;
        if reset.len() < stale.len() {
            debug!(
                theme = %self.theme,
                candidates = stale.len(),
                reset = reset.len(),
                "部分候选任务在检测期间已结束"
            );
        }
        if reset.is_empty() {
            return Ok(reset);
        }

        StructuredLogger::log_stale_tasks_recovered(&self.theme, &reset);
        SchedulerStats::add(&self.stats.stale_recovered, reset.len() as u64);
        self.metrics.record_stale_recovered(reset.len() as u64);

        for task_id in &reset {
            self.hooks
                .alarm(*task_id, "任务心跳超时，执行者可能已崩溃，已重置为等待状态")
                .await;
        }
        Ok(reset)
    }

    /// 检测循环，收到取消信号后退出
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            theme = %self.theme,
            check_interval_ms = self.config.check_interval.as_millis() as u64,
            stale_threshold_ms = self.config.stale_threshold.as_millis() as u64,
            "启动死任务检测循环"
        );

        let mut ticker = interval(self.config.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.check_once().await {
                        error!(theme = %self.theme, "死任务检测出错: {}", e);
                    }
                }
            }
        }

        info!(theme = %self.theme, "死任务检测循环已退出");
    }
}

impl std::fmt::Debug for HeartbeatMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatMonitor")
            .field("theme", &self.theme)
            .field("config", &self.config)
            .finish()
    }
}
