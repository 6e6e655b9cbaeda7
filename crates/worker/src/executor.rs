use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use scheduler_domain::entities::{Task, TaskExecutionRecord, TaskOutcome, TaskStatus};
use scheduler_domain::repositories::TaskStore;
use scheduler_errors::{SchedulerError, SchedulerResult};
use scheduler_observability::StructuredLogger;
use serde_json::Value;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::handler_registry::{HandlerRegistry, TaskContext};
use crate::heartbeat::TaskBeat;
use crate::hooks::TaskHooks;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// 分发期间写心跳的间隔
    pub heartbeat_interval: Duration,
    /// 任务未设置 `timeout_seconds` 时使用的超时，`None` 表示不限制
    pub default_timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            default_timeout: None,
        }
    }
}

/// 一次执行的结局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionReport {
    /// 读取任务或认领时存储出错，任务已放回等待，不算任务失败
    Released,
    /// 任务已被其他Worker认领或不再处于可运行状态
    Skipped,
    /// 产生了执行结果（Success / Failed / Retry）
    Completed(TaskStatus),
}

/// 单任务执行器
///
/// 执行顺序：读取 → 前置钩子 → 认领 → 分发（带心跳与超时） → 后置钩子 → 结果落库 → 追加执行记录。
/// 钩子和处理器都运行在 panic 捕获边界内。
pub struct Executor {
    store: TaskStore,
    handlers: Arc<HandlerRegistry>,
    hooks: Arc<dyn TaskHooks>,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(
        store: TaskStore,
        handlers: Arc<HandlerRegistry>,
        hooks: Arc<dyn TaskHooks>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            store,
            handlers,
            hooks,
            config,
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn hooks(&self) -> &Arc<dyn TaskHooks> {
        &self.hooks
    }

    pub async fn run(&self, task_id: i64, worker_id: u64) -> ExecutionReport {
        let task = match self.store.tasks.get_by_id(task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                warn!(task_id, "任务不存在，跳过执行");
                return ExecutionReport::Released;
            }
            Err(e) => {
                warn!(task_id, "读取任务失败: {}", e);
                self.release(task_id, "读取任务失败").await;
                return ExecutionReport::Released;
            }
        };

        if !task.is_runnable() {
            debug!(task_id, status = %task.status, "任务已不可运行，跳过");
            return ExecutionReport::Skipped;
        }

        let log_id = Uuid::new_v4().to_string();
        let start_time = Utc::now();

        if let Err(e) = contain(self.hooks.pre_run(&task)).await {
            let message = hook_failure("前置钩子", &e);
            let outcome = TaskOutcome::failed(task.retry_time, message, start_time, &log_id);
            return self
                .persist(&task, &TaskStatus::RUNNABLE, outcome, worker_id)
                .await;
        }

        // 前置钩子运行期间任务可能已被其他调度器执行过，后续一律以认领返回的行为准
        let task = match self.store.tasks.try_claim(task.id, &log_id, start_time).await {
            Ok(Some(claimed)) => {
                StructuredLogger::log_task_claimed(claimed.id, &log_id, worker_id, start_time);
                claimed
            }
            Ok(None) => {
                debug!(task_id, "任务已被其他Worker认领");
                return ExecutionReport::Skipped;
            }
            Err(e) => {
                warn!(task_id, "认领任务失败: {}", e);
                self.release(task_id, "认领任务失败").await;
                return ExecutionReport::Released;
            }
        };

        let ctx = TaskContext {
            task_id: task.id,
            theme: task.theme.clone(),
            log_id: log_id.clone(),
            worker_id,
            retry_time: task.retry_time,
        };

        let beat = TaskBeat::start(
            self.store.heartbeats.clone(),
            task.id,
            self.config.heartbeat_interval,
        );
        let dispatched = self.dispatch(&task, &ctx).await;
        beat.stop().await;

        let mut outcome = build_outcome(&task, dispatched, start_time, &log_id);

        if let Err(e) = contain(self.hooks.post_run(&task, &outcome)).await {
            outcome.override_failed(hook_failure("后置钩子", &e));
        }

        let report = self
            .persist(&task, &[TaskStatus::Running], outcome, worker_id)
            .await;

        // 结果落库之后再删心跳行，落库前任务仍受心跳保护
        if let Err(e) = self.store.heartbeats.remove(task.id).await {
            warn!(task_id = task.id, "删除任务心跳失败: {}", e);
        }
        report
    }

    async fn dispatch(&self, task: &Task, ctx: &TaskContext) -> SchedulerResult<Value> {
        let (service, method) = task.route();
        let handler = self.handlers.resolve(service, method)?;

        let invocation = contain(async { handler.handle(ctx, &task.arg).await });
        match task.dispatch_timeout().or(self.config.default_timeout) {
            Some(limit) => tokio::time::timeout(limit, invocation)
                .await
                .map_err(|_| SchedulerError::ExecutionTimeout {
                    seconds: limit.as_secs(),
                })?,
            None => invocation.await,
        }
    }

    /// 条件更新任务行并追加执行记录
    async fn persist(
        &self,
        task: &Task,
        expected: &[TaskStatus],
        outcome: TaskOutcome,
        worker_id: u64,
    ) -> ExecutionReport {
        match self
            .store
            .tasks
            .update_outcome(task.id, expected, &outcome)
            .await
        {
            Ok(true) => {}
            Ok(false) if expected.contains(&TaskStatus::Running) => {
                // 分发期间任务被死任务检测重置，结果仍然记入执行记录
                warn!(task_id = task.id, log_id = %outcome.log_id, "任务状态已被修改，结果未写回任务行");
            }
            Ok(false) => {
                debug!(task_id = task.id, "任务已被其他Worker处理");
                return ExecutionReport::Skipped;
            }
            Err(e) => {
                error!(task_id = task.id, log_id = %outcome.log_id, "写入执行结果失败: {}", e);
            }
        }

        let record = TaskExecutionRecord::from_outcome(task.id, &outcome);
        if let Err(e) = self.store.executions.append(&record).await {
            error!(task_id = task.id, log_id = %outcome.log_id, "追加执行记录失败: {}", e);
        }

        StructuredLogger::log_task_execution_complete(
            task.id,
            &outcome.log_id,
            worker_id,
            outcome.status.as_str(),
            outcome.duration_ms,
            outcome.err_msg.as_deref(),
        );

        match outcome.status {
            TaskStatus::Retry => {
                StructuredLogger::log_task_retry(task.id, outcome.retry_time, task.max_retry_time)
            }
            TaskStatus::Failed => {
                let message = outcome.err_msg.as_deref().unwrap_or("任务执行失败");
                self.hooks.alarm(task.id, message).await;
            }
            _ => {}
        }

        ExecutionReport::Completed(outcome.status)
    }

    async fn release(&self, task_id: i64, reason: &str) {
        match self.store.tasks.reset_to_wait(task_id).await {
            Ok(_) => StructuredLogger::log_task_released(task_id, reason),
            Err(e) => warn!(task_id, "放回等待状态失败: {}", e),
        }
    }
}

/// 根据分发结果和重试预算计算本次执行的结局
///
/// 成功时若 `retry_time + 1 <= max_retry_time` 则进入 `Retry` 并消耗一次预算，否则为 `Success`。
fn build_outcome(
    task: &Task,
    dispatched: SchedulerResult<Value>,
    start_time: DateTime<Utc>,
    log_id: &str,
) -> TaskOutcome {
    let serialized = dispatched.and_then(|value| Ok(serde_json::to_string(&value)?));

    match serialized {
        Ok(result) => {
            let end_time = Utc::now();
            let (status, retry_time) = if task.has_retry_budget() {
                (TaskStatus::Retry, task.retry_time + 1)
            } else {
                (TaskStatus::Success, task.retry_time)
            };
            TaskOutcome {
                status,
                retry_time,
                result: Some(result),
                err_msg: None,
                start_time,
                end_time,
                duration_ms: (end_time - start_time).num_milliseconds().max(0),
                log_id: log_id.to_string(),
            }
        }
        Err(e) => TaskOutcome::failed(task.retry_time, e.to_string(), start_time, log_id),
    }
}

fn hook_failure(stage: &str, err: &SchedulerError) -> String {
    SchedulerError::Hook(format!("{stage}: {err}")).to_string()
}

/// 在 panic 捕获边界内执行，panic 转为 [`SchedulerError::Panic`]
async fn contain<T, F>(fut: F) -> SchedulerResult<T>
where
    F: Future<Output = SchedulerResult<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(SchedulerError::Panic(panic_message(payload.as_ref()))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
