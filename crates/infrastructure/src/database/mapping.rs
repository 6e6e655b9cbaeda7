//! SQLite 和 PostgreSQL 适配器共用的映射工具

use scheduler_domain::entities::TaskStatus;
use scheduler_errors::{SchedulerError, SchedulerResult};

pub struct MappingHelpers;

impl MappingHelpers {
    pub fn parse_status(value: &str) -> SchedulerResult<TaskStatus> {
        value
            .parse()
            .map_err(|e: SchedulerError| SchedulerError::DatabaseOperation(e.to_string()))
    }

    /// 生成 `IN (...)` 中的状态字面量列表，例如 `'WAIT','RETRY'`
    ///
    /// 状态字符串全部来自 [`TaskStatus::as_str`] 的固定常量，可以直接拼进SQL。
    pub fn status_list(statuses: &[TaskStatus]) -> String {
        statuses
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// SQLite 的 `IN` 占位符列表：`?,?,?`
    pub fn sqlite_placeholders(count: usize) -> String {
        vec!["?"; count].join(",")
    }
}
