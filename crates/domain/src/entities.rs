use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use scheduler_errors::{SchedulerError, SchedulerResult};
use serde::{Deserialize, Serialize};

/// 任务状态
///
/// 状态之间的流转只能通过以当前状态为条件的更新完成（乐观并发）：
///
/// ```text
/// Wait ──claim──> Running ──> Success
///   ^                │  └───> Failed
///   │                └──────> Retry ──claim──> Running ...
///   └──── 心跳超时重置 ───┘
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    #[serde(rename = "WAIT")]
    Wait,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "RETRY")]
    Retry,
}

impl TaskStatus {
    /// 可被扫描和认领的状态
    pub const RUNNABLE: [TaskStatus; 2] = [TaskStatus::Wait, TaskStatus::Retry];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Wait => "WAIT",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Retry => "RETRY",
        }
    }

    pub fn is_runnable(&self) -> bool {
        Self::RUNNABLE.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAIT" => Ok(TaskStatus::Wait),
            "RUNNING" => Ok(TaskStatus::Running),
            "SUCCESS" => Ok(TaskStatus::Success),
            "FAILED" => Ok(TaskStatus::Failed),
            "RETRY" => Ok(TaskStatus::Retry),
            _ => Err(SchedulerError::Serialization(format!(
                "无效的任务状态: {s}"
            ))),
        }
    }
}

/// 任务定义
///
/// 表示一次延迟执行的工作单元。
///
/// # 字段说明
///
/// - `id`: 由存储分配的单调递增主键，扫描按其升序进行（FIFO）
/// - `theme`: 任务所属的逻辑分区，每个调度器只处理自己分区的任务
/// - `system_name` / `service_name` / `method_name`: 分发目标
/// - `arg`: 序列化后的调用参数，调度核心不解析其内容
/// - `max_retry_time` / `retry_time`: 重试预算与已消耗次数，`retry_time` 只由调度器修改
/// - `timeout_seconds`: 单次分发的超时时间，为空时使用执行器默认值
/// - `last_result` / `last_err_msg`: 最近一次执行的结果或错误，二者互斥
/// - `log_id`: 最近一次触及该行的执行的追踪标识
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub theme: String,
    pub system_name: String,
    pub service_name: String,
    pub method_name: String,
    pub arg: Vec<u8>,
    pub max_retry_time: i32,
    pub retry_time: i32,
    pub timeout_seconds: Option<i32>,
    pub status: TaskStatus,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
    pub last_run_time: Option<DateTime<Utc>>,
    pub last_run_end_time: Option<DateTime<Utc>>,
    pub last_run_duration: Option<i64>,
    pub last_result: Option<String>,
    pub last_err_msg: Option<String>,
    pub log_id: Option<String>,
}

impl Task {
    pub fn is_runnable(&self) -> bool {
        self.status.is_runnable()
    }

    /// 成功分发后是否仍有重试预算（有预算时进入 Retry 而不是 Success）
    pub fn has_retry_budget(&self) -> bool {
        self.retry_time + 1 <= self.max_retry_time
    }

    /// 任务自身配置的分发超时
    pub fn dispatch_timeout(&self) -> Option<Duration> {
        self.timeout_seconds
            .filter(|seconds| *seconds > 0)
            .map(|seconds| Duration::from_secs(seconds as u64))
    }

    /// 处理器注册表中使用的路由键
    pub fn route(&self) -> (&str, &str) {
        (&self.service_name, &self.method_name)
    }
}

/// 新任务（由生产者提交）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTask {
    pub theme: String,
    pub system_name: String,
    pub service_name: String,
    pub method_name: String,
    pub arg: Vec<u8>,
    pub max_retry_time: i32,
    pub timeout_seconds: Option<i32>,
}

impl NewTask {
    pub fn new(
        theme: impl Into<String>,
        service_name: impl Into<String>,
        method_name: impl Into<String>,
        arg: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            theme: theme.into(),
            system_name: String::new(),
            service_name: service_name.into(),
            method_name: method_name.into(),
            arg: arg.into(),
            max_retry_time: 0,
            timeout_seconds: None,
        }
    }

    /// 以 JSON 序列化参数创建任务
    pub fn with_json_arg<T: Serialize>(
        theme: impl Into<String>,
        service_name: impl Into<String>,
        method_name: impl Into<String>,
        arg: &T,
    ) -> SchedulerResult<Self> {
        let bytes = serde_json::to_vec(arg)?;
        Ok(Self::new(theme, service_name, method_name, bytes))
    }

    pub fn with_system_name(mut self, system_name: impl Into<String>) -> Self {
        self.system_name = system_name.into();
        self
    }

    pub fn with_max_retry_time(mut self, max_retry_time: i32) -> Self {
        self.max_retry_time = max_retry_time;
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: i32) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    pub fn validate(&self) -> SchedulerResult<()> {
        if self.theme.trim().is_empty() {
            return Err(SchedulerError::validation_error("任务分区(theme)不能为空"));
        }
        if self.service_name.trim().is_empty() || self.method_name.trim().is_empty() {
            return Err(SchedulerError::validation_error("服务名和方法名不能为空"));
        }
        if self.max_retry_time < 0 {
            return Err(SchedulerError::validation_error("最大重试次数不能为负数"));
        }
        if matches!(self.timeout_seconds, Some(t) if t <= 0) {
            return Err(SchedulerError::validation_error("超时时间必须大于0"));
        }
        Ok(())
    }
}

/// 一次执行的结果，用于条件更新任务行并生成执行记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskOutcome {
    pub status: TaskStatus,
    pub retry_time: i32,
    pub result: Option<String>,
    pub err_msg: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: i64,
    pub log_id: String,
}

impl TaskOutcome {
    pub fn failed(
        retry_time: i32,
        err_msg: impl Into<String>,
        start_time: DateTime<Utc>,
        log_id: impl Into<String>,
    ) -> Self {
        let end_time = Utc::now();
        Self {
            status: TaskStatus::Failed,
            retry_time,
            result: None,
            err_msg: Some(err_msg.into()),
            start_time,
            end_time,
            duration_ms: (end_time - start_time).num_milliseconds().max(0),
            log_id: log_id.into(),
        }
    }

    /// 覆盖为失败结果（后置钩子失败时使用），保留计时信息
    pub fn override_failed(&mut self, err_msg: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.result = None;
        self.err_msg = Some(err_msg.into());
    }
}

/// 任务执行记录，每次执行追加一条，只读不改
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskExecutionRecord {
    pub id: i64,
    pub task_id: i64,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub err_msg: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: i64,
    pub log_id: String,
}

impl TaskExecutionRecord {
    pub fn from_outcome(task_id: i64, outcome: &TaskOutcome) -> Self {
        Self {
            id: 0, // 将由存储生成
            task_id,
            status: outcome.status,
            result: outcome.result.clone(),
            err_msg: outcome.err_msg.clone(),
            start_time: outcome.start_time,
            end_time: outcome.end_time,
            duration_ms: outcome.duration_ms,
            log_id: outcome.log_id.clone(),
        }
    }
}

/// 任务心跳行
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskHeartbeat {
    pub task_id: i64,
    pub last_beat_time: DateTime<Utc>,
}

/// 单个任务的执行统计
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionStats {
    pub task_id: i64,
    pub total_runs: i64,
    pub success_runs: i64,
    pub failed_runs: i64,
    pub retry_runs: i64,
    pub avg_duration_ms: f64,
    pub p99_duration_ms: i64,
}

impl ExecutionStats {
    /// 由 (状态, 耗时) 样本计算统计，P99 采用最近秩法
    pub fn from_samples(task_id: i64, samples: &[(TaskStatus, i64)]) -> Self {
        let mut stats = ExecutionStats {
            task_id,
            total_runs: samples.len() as i64,
            ..Default::default()
        };
        if samples.is_empty() {
            return stats;
        }

        for (status, _) in samples {
            match status {
                TaskStatus::Success => stats.success_runs += 1,
                TaskStatus::Failed => stats.failed_runs += 1,
                TaskStatus::Retry => stats.retry_runs += 1,
                TaskStatus::Wait | TaskStatus::Running => {}
            }
        }

        let mut durations: Vec<i64> = samples.iter().map(|(_, d)| *d).collect();
        durations.sort_unstable();
        let sum: i64 = durations.iter().sum();
        stats.avg_duration_ms = sum as f64 / durations.len() as f64;

        let rank = ((durations.len() as f64) * 0.99).ceil() as usize;
        stats.p99_duration_ms = durations[rank.saturating_sub(1).min(durations.len() - 1)];
        stats
    }
}
