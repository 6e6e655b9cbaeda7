//! 日志与指标
//!
//! 日志统一走 `tracing`，指标统一走 `metrics` 门面；
//! 只有启用 Prometheus 导出时才会安装全局记录器，否则指标调用为空操作。

pub mod metrics_collector;
pub mod structured_logger;
pub mod telemetry_setup;

pub use metrics_collector::MetricsCollector;
pub use structured_logger::{LoggingConfig, StructuredLogger};
pub use telemetry_setup::{init_logging, init_metrics, init_observability};
