//! 测试工具
//!
//! - builders：任务与新任务的构建器
//! - mocks：可记录调用或注入故障的钩子、处理器和仓储
//! - helpers：异步条件等待

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::{NewTaskBuilder, TaskBuilder};
pub use helpers::{memory_store, wait_until, TestEnv};
pub use mocks::{
    CountingHandler, FailingHandler, FailingHooks, HookFailure, PanickingHandler,
    RecordingHooks, SleepingHandler, UnreliableTaskRepository,
};
