use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_domain::entities::{NewTask, Task, TaskOutcome, TaskStatus};
use scheduler_domain::repositories::TaskRepository;
use scheduler_errors::{SchedulerError, SchedulerResult};
use scheduler_worker::{TaskContext, TaskHandler, TaskHooks};
use serde_json::Value;

/// 记录所有钩子调用的钩子实现
#[derive(Default)]
pub struct RecordingHooks {
    pre_runs: Mutex<Vec<i64>>,
    post_runs: Mutex<Vec<(i64, TaskStatus)>>,
    alarms: Mutex<Vec<(i64, String)>>,
}

impl RecordingHooks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pre_runs(&self) -> Vec<i64> {
        self.pre_runs.lock().unwrap().clone()
    }

    pub fn post_runs(&self) -> Vec<(i64, TaskStatus)> {
        self.post_runs.lock().unwrap().clone()
    }

    pub fn alarms(&self) -> Vec<(i64, String)> {
        self.alarms.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskHooks for RecordingHooks {
    async fn pre_run(&self, task: &Task) -> SchedulerResult<()> {
        self.pre_runs.lock().unwrap().push(task.id);
        Ok(())
    }

    async fn post_run(&self, task: &Task, outcome: &TaskOutcome) -> SchedulerResult<()> {
        self.post_runs.lock().unwrap().push((task.id, outcome.status));
        Ok(())
    }

    async fn alarm(&self, task_id: i64, message: &str) {
        self.alarms
            .lock()
            .unwrap()
            .push((task_id, message.to_string()));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookFailure {
    Error,
    Panic,
}

/// 在前置或后置阶段注入错误或panic的钩子
#[derive(Default)]
pub struct FailingHooks {
    pub pre: Option<HookFailure>,
    pub post: Option<HookFailure>,
    alarms: Mutex<Vec<(i64, String)>>,
}

impl FailingHooks {
    pub fn pre(failure: HookFailure) -> Arc<Self> {
        Arc::new(Self {
            pre: Some(failure),
            ..Default::default()
        })
    }

    pub fn post(failure: HookFailure) -> Arc<Self> {
        Arc::new(Self {
            post: Some(failure),
            ..Default::default()
        })
    }

    pub fn alarms(&self) -> Vec<(i64, String)> {
        self.alarms.lock().unwrap().clone()
    }

    fn trigger(failure: Option<HookFailure>, stage: &str) -> SchedulerResult<()> {
        match failure {
            None => Ok(()),
            Some(HookFailure::Error) => Err(SchedulerError::Internal(format!("{stage} rejected"))),
            Some(HookFailure::Panic) => panic!("{stage} exploded"),
        }
    }
}

#[async_trait]
impl TaskHooks for FailingHooks {
    async fn pre_run(&self, _task: &Task) -> SchedulerResult<()> {
        Self::trigger(self.pre, "pre_run")
    }

    async fn post_run(&self, _task: &Task, _outcome: &TaskOutcome) -> SchedulerResult<()> {
        Self::trigger(self.post, "post_run")
    }

    async fn alarm(&self, task_id: i64, message: &str) {
        self.alarms
            .lock()
            .unwrap()
            .push((task_id, message.to_string()));
    }
}

/// 统计调用次数并返回固定结果的处理器
pub struct CountingHandler {
    calls: AtomicUsize,
    seen: Mutex<Vec<i64>>,
    result: Value,
}

impl CountingHandler {
    pub fn new(result: Value) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            result,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 按调用顺序记录的任务ID
    pub fn seen(&self) -> Vec<i64> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskHandler for CountingHandler {
    async fn handle(&self, ctx: &TaskContext, _arg: &[u8]) -> SchedulerResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(ctx.task_id);
        Ok(self.result.clone())
    }
}

/// 总是返回错误的处理器
pub struct FailingHandler {
    pub message: String,
}

impl FailingHandler {
    pub fn new(message: &str) -> Arc<Self> {
        Arc::new(Self {
            message: message.to_string(),
        })
    }
}

#[async_trait]
impl TaskHandler for FailingHandler {
    async fn handle(&self, _ctx: &TaskContext, _arg: &[u8]) -> SchedulerResult<Value> {
        Err(SchedulerError::task_execution(self.message.clone()))
    }
}

/// 总是panic的处理器
pub struct PanickingHandler;

#[async_trait]
impl TaskHandler for PanickingHandler {
    async fn handle(&self, _ctx: &TaskContext, _arg: &[u8]) -> SchedulerResult<Value> {
        panic!("handler exploded")
    }
}

/// 睡眠指定时长后成功的处理器
pub struct SleepingHandler {
    pub duration: Duration,
}

impl SleepingHandler {
    pub fn new(duration: Duration) -> Arc<Self> {
        Arc::new(Self { duration })
    }
}

#[async_trait]
impl TaskHandler for SleepingHandler {
    async fn handle(&self, _ctx: &TaskContext, _arg: &[u8]) -> SchedulerResult<Value> {
        tokio::time::sleep(self.duration).await;
        Ok(Value::from("slept"))
    }
}

/// 可以按开关注入存储故障的任务仓储包装
pub struct UnreliableTaskRepository {
    inner: Arc<dyn TaskRepository>,
    pub fail_reads: AtomicBool,
    pub fail_claims: AtomicBool,
    reset_calls: AtomicUsize,
    finishing: Mutex<Vec<i64>>,
}

impl UnreliableTaskRepository {
    pub fn new(inner: Arc<dyn TaskRepository>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_claims: AtomicBool::new(false),
            reset_calls: AtomicUsize::new(0),
            finishing: Mutex::new(Vec::new()),
        })
    }

    pub fn reset_calls(&self) -> usize {
        self.reset_calls.load(Ordering::SeqCst)
    }

    /// 下一次过期查询返回之后把该任务写为 `Success`，模拟任务恰好在查询和重置之间正常结束
    pub fn finish_after_stale_query(&self, task_id: i64) {
        self.finishing.lock().unwrap().push(task_id);
    }

    fn injected(flag: &AtomicBool, op: &str) -> SchedulerResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(SchedulerError::database_error(format!("injected {op} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskRepository for UnreliableTaskRepository {
    async fn create(&self, task: &NewTask) -> SchedulerResult<Task> {
        self.inner.create(task).await
    }

    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<Task>> {
        Self::injected(&self.fail_reads, "read")?;
        self.inner.get_by_id(id).await
    }

    async fn find_runnable(&self, theme: &str, limit: i64) -> SchedulerResult<Vec<i64>> {
        self.inner.find_runnable(theme, limit).await
    }

    async fn count_by_status(&self, theme: &str, status: TaskStatus) -> SchedulerResult<i64> {
        self.inner.count_by_status(theme, status).await
    }

    async fn try_claim(
        &self,
        id: i64,
        log_id: &str,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Option<Task>> {
        Self::injected(&self.fail_claims, "claim")?;
        self.inner.try_claim(id, log_id, now).await
    }

    async fn update_outcome(
        &self,
        id: i64,
        expected: &[TaskStatus],
        outcome: &TaskOutcome,
    ) -> SchedulerResult<bool> {
        self.inner.update_outcome(id, expected, outcome).await
    }

    async fn reset_to_wait(&self, id: i64) -> SchedulerResult<bool> {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.reset_to_wait(id).await
    }

    async fn find_stale_running(
        &self,
        theme: &str,
        threshold: DateTime<Utc>,
    ) -> SchedulerResult<Vec<i64>> {
        let stale = self.inner.find_stale_running(theme, threshold).await?;

        let finishing = std::mem::take(&mut *self.finishing.lock().unwrap());
        for task_id in finishing {
            let now = Utc::now();
            let outcome = TaskOutcome {
                status: TaskStatus::Success,
                retry_time: 0,
                result: Some("null".to_string()),
                err_msg: None,
                start_time: now,
                end_time: now,
                duration_ms: 0,
                log_id: format!("finished-{task_id}"),
            };
            self.inner
                .update_outcome(task_id, &[TaskStatus::Running], &outcome)
                .await?;
        }
        Ok(stale)
    }

    async fn reset_running_to_wait(&self, ids: &[i64]) -> SchedulerResult<Vec<i64>> {
        self.inner.reset_running_to_wait(ids).await
    }
}
