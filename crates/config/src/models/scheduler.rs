use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};
use crate::{ConfigError, ConfigResult};

/// 扫描/分发配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerSection {
    /// 每个分区启动一个调度器
    pub themes: Vec<String>,
    pub scan_interval_ms: u64,
    pub scan_batch_size: i64,
    pub queue_capacity: usize,
    pub quick_queue_timeout_ms: u64,
    pub monitor_interval_seconds: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            themes: vec!["default".to_string()],
            scan_interval_ms: 1000,
            scan_batch_size: 100,
            queue_capacity: 200,
            quick_queue_timeout_ms: 50,
            monitor_interval_seconds: 30,
        }
    }
}

impl ConfigValidator for SchedulerSection {
    fn validate(&self) -> ConfigResult<()> {
        if self.themes.is_empty() {
            return Err(ConfigError::Validation(
                "scheduler.themes 至少需要一个分区".to_string(),
            ));
        }
        for theme in &self.themes {
            ValidationUtils::validate_not_empty(theme, "scheduler.themes[]")?;
        }
        let mut unique = self.themes.clone();
        unique.sort();
        unique.dedup();
        if unique.len() != self.themes.len() {
            return Err(ConfigError::Validation(
                "scheduler.themes 中存在重复分区".to_string(),
            ));
        }

        ValidationUtils::validate_interval_ms(self.scan_interval_ms, "scheduler.scan_interval_ms")?;
        if self.scan_batch_size <= 0 {
            return Err(ConfigError::Validation(
                "scheduler.scan_batch_size must be greater than 0".to_string(),
            ));
        }
        ValidationUtils::validate_count(self.queue_capacity, "scheduler.queue_capacity")?;
        ValidationUtils::validate_interval_ms(
            self.quick_queue_timeout_ms,
            "scheduler.quick_queue_timeout_ms",
        )?;
        ValidationUtils::validate_interval_ms(
            self.monitor_interval_seconds * 1000,
            "scheduler.monitor_interval_seconds",
        )?;
        Ok(())
    }
}

/// 弹性Worker池配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerPoolSection {
    pub min_workers: usize,
    pub max_workers: usize,
    /// 空闲Worker单次等待任务的时长
    pub idle_wait_seconds: u64,
    /// 空闲超过该时长的Worker才允许退出
    pub idle_grace_seconds: u64,
    /// 任务执行期间写心跳的间隔
    pub task_heartbeat_interval_seconds: u64,
    /// 任务未配置超时时的默认分发超时，0 表示不限制
    pub default_timeout_seconds: u64,
}

impl Default for WorkerPoolSection {
    fn default() -> Self {
        Self {
            min_workers: 2,
            max_workers: 16,
            idle_wait_seconds: 5,
            idle_grace_seconds: 30,
            task_heartbeat_interval_seconds: 5,
            default_timeout_seconds: 0,
        }
    }
}

impl ConfigValidator for WorkerPoolSection {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_count(self.max_workers, "worker_pool.max_workers")?;
        if self.min_workers > self.max_workers {
            return Err(ConfigError::Validation(
                "worker_pool.min_workers must be less than or equal to max_workers".to_string(),
            ));
        }
        ValidationUtils::validate_interval_ms(
            self.idle_wait_seconds * 1000,
            "worker_pool.idle_wait_seconds",
        )?;
        ValidationUtils::validate_interval_ms(
            self.task_heartbeat_interval_seconds * 1000,
            "worker_pool.task_heartbeat_interval_seconds",
        )?;
        Ok(())
    }
}

/// 死任务检测配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeartbeatSection {
    pub check_interval_seconds: u64,
    pub stale_threshold_seconds: u64,
}

impl Default for HeartbeatSection {
    fn default() -> Self {
        Self {
            check_interval_seconds: 10,
            stale_threshold_seconds: 30,
        }
    }
}

impl ConfigValidator for HeartbeatSection {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_interval_ms(
            self.check_interval_seconds * 1000,
            "heartbeat.check_interval_seconds",
        )?;
        ValidationUtils::validate_interval_ms(
            self.stale_threshold_seconds * 1000,
            "heartbeat.stale_threshold_seconds",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_section_validation() {
        let config = SchedulerSection::default();
        assert!(config.validate().is_ok());

        let mut invalid = config.clone();
        invalid.themes.clear();
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.themes = vec!["a".to_string(), "a".to_string()];
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.scan_batch_size = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config;
        invalid.queue_capacity = 0;
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_worker_pool_section_validation() {
        let config = WorkerPoolSection::default();
        assert!(config.validate().is_ok());

        let mut invalid = config.clone();
        invalid.min_workers = 20;
        assert!(invalid.validate().is_err());

        let mut zero_floor = config;
        zero_floor.min_workers = 0;
        assert!(zero_floor.validate().is_ok());
    }

    #[test]
    fn test_heartbeat_section_validation() {
        assert!(HeartbeatSection::default().validate().is_ok());
        let invalid = HeartbeatSection {
            check_interval_seconds: 0,
            stale_threshold_seconds: 30,
        };
        assert!(invalid.validate().is_err());
    }
}
