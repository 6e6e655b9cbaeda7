//! 存储适配器
//!
//! 为调度核心的三个仓储接口提供内存、SQLite 和 PostgreSQL 三套实现，
//! 由 [`DatabaseManager`] 按连接URL选择。

pub mod database;
pub mod in_memory_store;

pub use database::*;
pub use in_memory_store::InMemoryTaskStore;
