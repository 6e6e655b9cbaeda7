//! 调度系统配置
//!
//! 配置按以下顺序加载，后者覆盖前者：
//! 1. 结构体默认值
//! 2. TOML 配置文件
//! 3. 环境变量（前缀 `SCHEDULER__`，层级分隔符 `__`）

pub mod models;
pub mod validation;

pub use models::{
    AppConfig, DatabaseConfig, HeartbeatSection, LogFormat, ObservabilityConfig,
    SchedulerSection, WorkerPoolSection,
};
pub use validation::{ConfigValidator, ValidationUtils};

/// Configuration error type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration error enumeration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("File error: {0}")]
    File(String),
}

impl From<anyhow::Error> for ConfigError {
    fn from(err: anyhow::Error) -> Self {
        ConfigError::Configuration(err.to_string())
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Configuration(err.to_string())
    }
}
