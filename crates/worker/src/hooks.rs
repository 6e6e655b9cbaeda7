use async_trait::async_trait;
use scheduler_domain::entities::{Task, TaskOutcome};
use scheduler_errors::SchedulerResult;
use scheduler_observability::StructuredLogger;

/// 任务执行钩子
///
/// `pre_run` 在认领之前调用，返回错误会让任务直接失败且不会被分发；
/// `post_run` 在分发之后、结果落库之前调用，返回错误会把结果改写为失败。
/// 两个钩子中的 panic 都会被捕获并按错误处理。
#[async_trait]
pub trait TaskHooks: Send + Sync {
    async fn pre_run(&self, _task: &Task) -> SchedulerResult<()> {
        Ok(())
    }

    async fn post_run(&self, _task: &Task, _outcome: &TaskOutcome) -> SchedulerResult<()> {
        Ok(())
    }

    /// 告警出口：任务失败、钩子panic以及死任务回收都会调用
    async fn alarm(&self, task_id: i64, message: &str) {
        StructuredLogger::log_alarm(task_id, message);
    }
}

/// 默认钩子：不做前后置处理，告警写 error 日志
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHooks;

impl TaskHooks for LoggingHooks {}
