//! 持久化异步任务调度服务
//!
//! [`app`] 负责按配置组装存储、处理器和各分区调度器，[`shutdown`] 负责信号处理与优雅关闭。

pub mod app;
pub mod shutdown;
