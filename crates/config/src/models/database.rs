use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};
use crate::{ConfigError, ConfigResult};

/// 支持的存储URL前缀，`memory://` 仅用于本地调试和测试
pub const SUPPORTED_DATABASE_SCHEMES: [&str; 4] =
    ["sqlite:", "postgres://", "postgresql://", "memory://"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:scheduler.db".to_string(),
            max_connections: 5,
            min_connections: 1,
            connection_timeout_seconds: 30,
        }
    }
}

impl ConfigValidator for DatabaseConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_url_scheme(
            &self.url,
            &SUPPORTED_DATABASE_SCHEMES,
            "database.url",
        )?;
        ValidationUtils::validate_count(self.max_connections as usize, "database.max_connections")?;

        if self.min_connections > self.max_connections {
            return Err(ConfigError::Validation(
                "database.min_connections must be less than or equal to max_connections"
                    .to_string(),
            ));
        }
        ValidationUtils::validate_interval_ms(
            self.connection_timeout_seconds * 1000,
            "database.connection_timeout_seconds",
        )?;
        Ok(())
    }
}
