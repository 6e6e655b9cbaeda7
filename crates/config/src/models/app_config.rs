use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    database::DatabaseConfig,
    observability::ObservabilityConfig,
    scheduler::{HeartbeatSection, SchedulerSection, WorkerPoolSection},
};
use crate::validation::ConfigValidator;
use crate::{ConfigError, ConfigResult};

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/scheduler.toml",
    "scheduler.toml",
    "/etc/scheduler/config.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerSection,
    pub worker_pool: WorkerPoolSection,
    pub heartbeat: HeartbeatSection,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 加载配置：默认值 < TOML 文件 < `SCHEDULER__` 环境变量
    ///
    /// 未指定路径时依次尝试几个常用位置，都不存在则只使用默认值。
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("SCHEDULER")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("scheduler.themes")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate().context("配置校验失败")?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate().context("配置校验失败")?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.database.validate()?;
        self.scheduler.validate()?;
        self.worker_pool.validate()?;
        self.heartbeat.validate()?;
        self.observability.validate()?;

        // 过期阈值必须覆盖至少两次任务心跳，否则正常运行的任务会被误判为死任务
        if self.heartbeat.stale_threshold_seconds
            <= self.worker_pool.task_heartbeat_interval_seconds * 2
        {
            return Err(ConfigError::Validation(format!(
                "heartbeat.stale_threshold_seconds ({}) must be greater than twice worker_pool.task_heartbeat_interval_seconds ({})",
                self.heartbeat.stale_threshold_seconds,
                self.worker_pool.task_heartbeat_interval_seconds
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler.themes, vec!["default".to_string()]);
    }

    #[test]
    fn test_from_toml_partial_sections() {
        let toml_str = r#"
            [scheduler]
            themes = ["orders", "mail"]
            scan_batch_size = 50

            [worker_pool]
            max_workers = 4
            min_workers = 1
        "#;

        let config = AppConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.scheduler.themes.len(), 2);
        assert_eq!(config.scheduler.scan_batch_size, 50);
        assert_eq!(config.scheduler.scan_interval_ms, 1000);
        assert_eq!(config.worker_pool.max_workers, 4);
        assert_eq!(config.database.url, "sqlite:scheduler.db");
    }

    #[test]
    fn test_stale_threshold_must_cover_heartbeats() {
        let mut config = AppConfig::default();
        config.worker_pool.task_heartbeat_interval_seconds = 10;
        config.heartbeat.stale_threshold_seconds = 20;
        assert!(config.validate().is_err());

        config.heartbeat.stale_threshold_seconds = 21;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_roundtrip_keeps_values() {
        let mut config = AppConfig::default();
        config.scheduler.themes = vec!["a".to_string()];
        let text = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
