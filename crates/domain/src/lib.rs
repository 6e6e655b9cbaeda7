//! 调度系统领域模型
//!
//! 定义任务、执行记录、心跳等核心实体，以及持久化层需要实现的仓储抽象。
//! 调度核心只依赖这里的接口，具体存储（内存、SQLite、PostgreSQL）由
//! infrastructure 层提供。

pub mod entities;
pub mod repositories;

pub use entities::*;
pub use repositories::*;
pub use scheduler_errors::{SchedulerError, SchedulerResult};
