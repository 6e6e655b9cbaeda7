//! 任务执行层
//!
//! - [`InFlightLedger`]：本进程内已入队或执行中的任务ID集合，用于去重
//! - [`TaskQueue`]：扫描循环与Worker之间的有界通道
//! - [`Executor`]：单个任务的完整执行流程（钩子、认领、分发、心跳、结果持久化）
//! - [`WorkerPool`]：按积压情况弹性伸缩的Worker集合

pub mod executor;
pub mod handler_registry;
pub mod heartbeat;
pub mod hooks;
pub mod ledger;
pub mod queue;
pub mod stats;
pub mod worker_pool;

pub use executor::{ExecutionReport, Executor, ExecutorConfig};
pub use handler_registry::{HandlerRegistry, TaskContext, TaskHandler};
pub use heartbeat::TaskBeat;
pub use hooks::{LoggingHooks, TaskHooks};
pub use ledger::InFlightLedger;
pub use queue::TaskQueue;
pub use stats::{SchedulerStats, StatusSnapshot};
pub use worker_pool::{WorkerPool, WorkerPoolConfig};
