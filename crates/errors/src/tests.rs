use crate::*;

#[test]
fn test_scheduler_error_display() {
    let db_op_error = SchedulerError::DatabaseOperation("Connection failed".to_string());
    assert_eq!(db_op_error.to_string(), "数据库操作错误: Connection failed");

    let task_error = SchedulerError::TaskNotFound { id: 123 };
    assert_eq!(task_error.to_string(), "任务未找到: 123");

    let handler_error = SchedulerError::handler_not_found("order", "create");
    assert_eq!(handler_error.to_string(), "未注册的任务处理器: order.create");

    let timeout_error = SchedulerError::ExecutionTimeout { seconds: 5 };
    assert_eq!(timeout_error.to_string(), "任务执行超时: 5秒");

    let panic_error = SchedulerError::Panic("boom".to_string());
    assert_eq!(panic_error.to_string(), "任务执行发生panic: boom");

    let theme_error = SchedulerError::SchedulerNotFound {
        theme: "billing".to_string(),
    };
    assert_eq!(theme_error.to_string(), "调度器未找到: billing");
}

#[test]
fn test_from_serde_json_error() {
    let err = serde_json::from_str::<serde_json::Value>("{invalid").unwrap_err();
    let scheduler_err: SchedulerError = err.into();
    assert!(matches!(scheduler_err, SchedulerError::Serialization(_)));
}

#[test]
fn test_from_anyhow_error() {
    let scheduler_err: SchedulerError = anyhow::anyhow!("wrapped").into();
    assert_eq!(scheduler_err.to_string(), "内部错误: wrapped");
}
