use chrono::{DateTime, Utc};
use scheduler_domain::entities::{NewTask, Task, TaskStatus};

/// 构建待提交的新任务
pub struct NewTaskBuilder {
    task: NewTask,
}

impl NewTaskBuilder {
    pub fn new() -> Self {
        Self {
            task: NewTask::new("default", "test", "run", Vec::new()),
        }
    }

    pub fn theme(mut self, theme: &str) -> Self {
        self.task.theme = theme.to_string();
        self
    }

    pub fn route(mut self, service: &str, method: &str) -> Self {
        self.task.service_name = service.to_string();
        self.task.method_name = method.to_string();
        self
    }

    pub fn arg(mut self, arg: serde_json::Value) -> Self {
        self.task.arg = arg.to_string().into_bytes();
        self
    }

    pub fn max_retry_time(mut self, max_retry_time: i32) -> Self {
        self.task.max_retry_time = max_retry_time;
        self
    }

    pub fn timeout_seconds(mut self, timeout_seconds: i32) -> Self {
        self.task.timeout_seconds = Some(timeout_seconds);
        self
    }

    pub fn build(self) -> NewTask {
        self.task
    }
}

impl Default for NewTaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 构建完整的任务行，用于直接写入内存存储模拟各种状态
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            task: Task {
                id: 1,
                theme: "default".to_string(),
                system_name: String::new(),
                service_name: "test".to_string(),
                method_name: "run".to_string(),
                arg: Vec::new(),
                max_retry_time: 0,
                retry_time: 0,
                timeout_seconds: None,
                status: TaskStatus::Wait,
                create_time: now,
                update_time: now,
                last_run_time: None,
                last_run_end_time: None,
                last_run_duration: None,
                last_result: None,
                last_err_msg: None,
                log_id: None,
            },
        }
    }

    pub fn id(mut self, id: i64) -> Self {
        self.task.id = id;
        self
    }

    pub fn theme(mut self, theme: &str) -> Self {
        self.task.theme = theme.to_string();
        self
    }

    pub fn route(mut self, service: &str, method: &str) -> Self {
        self.task.service_name = service.to_string();
        self.task.method_name = method.to_string();
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn retries(mut self, retry_time: i32, max_retry_time: i32) -> Self {
        self.task.retry_time = retry_time;
        self.task.max_retry_time = max_retry_time;
        self
    }

    pub fn updated_at(mut self, update_time: DateTime<Utc>) -> Self {
        self.task.update_time = update_time;
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}
