use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use scheduler_config::AppConfig;
use scheduler_dispatcher::{HeartbeatMonitorConfig, Scheduler, SchedulerConfig, SchedulerRegistry};
use scheduler_domain::repositories::TaskStore;
use scheduler_errors::SchedulerError;
use scheduler_infrastructure::DatabaseManager;
use scheduler_worker::{
    ExecutorConfig, HandlerRegistry, LoggingHooks, TaskHooks, WorkerPoolConfig,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::shutdown::ShutdownManager;

/// 主应用程序：一个存储连接，每个配置的分区一个调度器
pub struct Application {
    config: AppConfig,
    database: DatabaseManager,
    registry: SchedulerRegistry,
}

impl Application {
    /// 连接存储并为每个分区构建调度器（尚未启动）
    pub async fn new(
        config: AppConfig,
        handlers: HandlerRegistry,
        hooks: Arc<dyn TaskHooks>,
        shutdown: &ShutdownManager,
    ) -> Result<Self> {
        let database = DatabaseManager::connect(&config.database)
            .await
            .context("连接任务存储失败")?;
        let store = database.task_store();

        info!(routes = ?handlers.routes(), "任务处理器已注册");
        let handlers = Arc::new(handlers);

        let mut registry = SchedulerRegistry::new();
        for theme in &config.scheduler.themes {
            let scheduler = Scheduler::builder(theme.clone(), store.clone())
                .handlers(handlers.clone())
                .hooks(hooks.clone())
                .config(scheduler_config(&config))
                .worker_pool(worker_pool_config(&config))
                .executor(executor_config(&config))
                .heartbeat_monitor(heartbeat_monitor_config(&config))
                .parent_token(shutdown.token())
                .build()
                .with_context(|| format!("创建分区 {theme} 的调度器失败"))?;
            registry.register(scheduler)?;
        }

        Ok(Self {
            config,
            database,
            registry,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &SchedulerRegistry {
        &self.registry
    }

    pub fn store(&self) -> TaskStore {
        self.database.task_store()
    }

    pub fn start(&self) {
        self.registry.start_all();
    }

    /// 停止所有调度器并关闭存储连接，全部在超时内停止时返回 `true`
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let stopped = self.registry.shutdown_all(timeout).await;
        self.database.close().await;
        stopped
    }
}

/// 只连接存储，不启动调度器（`submit` / `stats` 子命令使用）
pub async fn connect_store(config: &AppConfig) -> Result<(DatabaseManager, TaskStore)> {
    let database = DatabaseManager::connect(&config.database)
        .await
        .context("连接任务存储失败")?;
    let store = database.task_store();
    Ok((database, store))
}

#[derive(Debug, Default, Deserialize)]
struct SleepArgs {
    #[serde(default)]
    millis: u64,
}

/// 内置处理器：
/// - `system.echo`：原样返回JSON参数
/// - `system.sleep`：按 `{"millis": n}` 睡眠后返回实际睡眠时长
pub fn builtin_handlers() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register_json("system", "echo", |arg: Value| async move {
        Ok::<_, SchedulerError>(arg)
    });
    registry.register_json("system", "sleep", |arg: Option<SleepArgs>| async move {
        let millis = arg.unwrap_or_default().millis;
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok::<_, SchedulerError>(serde_json::json!({ "slept_ms": millis }))
    });
    registry
}

pub fn default_hooks() -> Arc<dyn TaskHooks> {
    Arc::new(LoggingHooks)
}

pub fn scheduler_config(config: &AppConfig) -> SchedulerConfig {
    let section = &config.scheduler;
    SchedulerConfig {
        scan_interval: Duration::from_millis(section.scan_interval_ms),
        scan_batch_size: section.scan_batch_size,
        queue_capacity: section.queue_capacity,
        quick_queue_timeout: Duration::from_millis(section.quick_queue_timeout_ms),
        monitor_interval: Duration::from_secs(section.monitor_interval_seconds),
    }
}

pub fn worker_pool_config(config: &AppConfig) -> WorkerPoolConfig {
    let section = &config.worker_pool;
    WorkerPoolConfig {
        min_workers: section.min_workers,
        max_workers: section.max_workers,
        idle_wait: Duration::from_secs(section.idle_wait_seconds),
        idle_grace: Duration::from_secs(section.idle_grace_seconds),
    }
}

pub fn executor_config(config: &AppConfig) -> ExecutorConfig {
    let section = &config.worker_pool;
    ExecutorConfig {
        heartbeat_interval: Duration::from_secs(section.task_heartbeat_interval_seconds),
        default_timeout: (section.default_timeout_seconds > 0)
            .then(|| Duration::from_secs(section.default_timeout_seconds)),
    }
}

pub fn heartbeat_monitor_config(config: &AppConfig) -> HeartbeatMonitorConfig {
    HeartbeatMonitorConfig {
        check_interval: Duration::from_secs(config.heartbeat.check_interval_seconds),
        stale_threshold: Duration::from_secs(config.heartbeat.stale_threshold_seconds),
    }
}
