//! 调度层
//!
//! 每个分区（theme）一个 [`Scheduler`]：周期扫描可运行任务写入本地队列，
//! 按积压唤醒Worker，并托管该分区的 [`HeartbeatMonitor`]。
//! 进程内的所有调度器由 [`SchedulerRegistry`] 统一持有。

pub mod heartbeat_monitor;
pub mod registry;
pub mod scheduler;

pub use heartbeat_monitor::{HeartbeatMonitor, HeartbeatMonitorConfig};
pub use registry::SchedulerRegistry;
pub use scheduler::{EnqueueOutcome, Scheduler, SchedulerBuilder, SchedulerConfig};
