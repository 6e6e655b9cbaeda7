//! 领域仓储抽象
//!
//! 调度核心依赖的持久化接口。任何支持行级条件更新的关系型或键值存储都可以实现。
//! 跨进程的唯一同步手段就是这里的条件更新：`try_claim`、`update_outcome`
//! 和 `reset_running_to_wait` 都必须以当前状态为条件，并只报告真正受影响的行。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::{
    ExecutionStats, NewTask, Task, TaskExecutionRecord, TaskHeartbeat, TaskOutcome, TaskStatus,
};
use scheduler_errors::SchedulerResult;

/// 任务仓储抽象
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// 以 `Wait` 状态创建任务，返回带存储分配 ID 的任务
    async fn create(&self, task: &NewTask) -> SchedulerResult<Task>;

    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<Task>>;

    /// 查询分区内状态为 `Wait`/`Retry` 的任务ID，按ID升序，最多 `limit` 条
    async fn find_runnable(&self, theme: &str, limit: i64) -> SchedulerResult<Vec<i64>>;

    async fn count_by_status(&self, theme: &str, status: TaskStatus) -> SchedulerResult<i64>;

    /// 原子认领：`Wait|Retry -> Running`，同时记录本次运行的开始时间和 log_id。
    ///
    /// 返回认领后的任务行；并发调用中只有一个会返回 `Some`。
    /// 重试计数等字段必须以这里返回的行为准，认领前读到的行可能已被其他Worker推进。
    async fn try_claim(
        &self,
        id: i64,
        log_id: &str,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Option<Task>>;

    /// 以 `expected` 中的状态为条件写入执行结果，返回是否有行被更新
    async fn update_outcome(
        &self,
        id: i64,
        expected: &[TaskStatus],
        outcome: &TaskOutcome,
    ) -> SchedulerResult<bool>;

    /// 基础设施故障时把未运行的任务放回 `Wait`（不会触碰 `Running` 的行）
    async fn reset_to_wait(&self, id: i64) -> SchedulerResult<bool>;

    /// 查询心跳已过期的 `Running` 任务。
    ///
    /// 心跳时间和 `update_time` 中较新的一个早于 `threshold` 时视为过期；
    /// 没有心跳行时只看 `update_time`（覆盖第一次心跳前就崩溃的情况）。
    async fn find_stale_running(
        &self,
        theme: &str,
        threshold: DateTime<Utc>,
    ) -> SchedulerResult<Vec<i64>>;

    /// 批量把仍处于 `Running` 的任务重置为 `Wait`，返回真正被重置的任务ID（升序）
    async fn reset_running_to_wait(&self, ids: &[i64]) -> SchedulerResult<Vec<i64>>;
}

/// 任务执行记录仓储抽象（只追加）
#[async_trait]
pub trait TaskExecutionRepository: Send + Sync {
    async fn append(&self, record: &TaskExecutionRecord) -> SchedulerResult<TaskExecutionRecord>;

    /// 按时间倒序列出任务最近的执行记录
    async fn list_by_task(
        &self,
        task_id: i64,
        limit: i64,
    ) -> SchedulerResult<Vec<TaskExecutionRecord>>;

    async fn get_execution_stats(&self, task_id: i64) -> SchedulerResult<ExecutionStats>;
}

/// 任务心跳仓储抽象
#[async_trait]
pub trait HeartbeatRepository: Send + Sync {
    async fn upsert(&self, task_id: i64, now: DateTime<Utc>) -> SchedulerResult<()>;

    async fn get(&self, task_id: i64) -> SchedulerResult<Option<TaskHeartbeat>>;

    /// 任务分发结束后删除心跳行
    async fn remove(&self, task_id: i64) -> SchedulerResult<()>;
}

/// 调度核心使用的存储集合
#[derive(Clone)]
pub struct TaskStore {
    pub tasks: Arc<dyn TaskRepository>,
    pub executions: Arc<dyn TaskExecutionRepository>,
    pub heartbeats: Arc<dyn HeartbeatRepository>,
}

impl TaskStore {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        executions: Arc<dyn TaskExecutionRepository>,
        heartbeats: Arc<dyn HeartbeatRepository>,
    ) -> Self {
        Self {
            tasks,
            executions,
            heartbeats,
        }
    }
}
