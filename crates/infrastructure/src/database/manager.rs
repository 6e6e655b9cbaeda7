use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use scheduler_config::DatabaseConfig;
use scheduler_domain::repositories::TaskStore;
use scheduler_errors::SchedulerResult;
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::info;

use super::postgres::{
    self, PostgresHeartbeatRepository, PostgresTaskExecutionRepository, PostgresTaskRepository,
};
use super::sqlite::{
    self, SqliteHeartbeatRepository, SqliteTaskExecutionRepository, SqliteTaskRepository,
};
use crate::in_memory_store::InMemoryTaskStore;

#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseType {
    PostgreSQL,
    SQLite,
    Memory,
}

impl DatabaseType {
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            DatabaseType::PostgreSQL
        } else if url.starts_with("memory://") {
            DatabaseType::Memory
        } else {
            DatabaseType::SQLite
        }
    }
}

pub enum DatabasePool {
    PostgreSQL(sqlx::PgPool),
    SQLite(sqlx::SqlitePool),
    Memory(InMemoryTaskStore),
}

impl DatabasePool {
    /// 按URL类型创建连接池
    pub async fn new(config: &DatabaseConfig) -> SchedulerResult<Self> {
        let acquire_timeout = Duration::from_secs(config.connection_timeout_seconds);

        match DatabaseType::from_url(&config.url) {
            DatabaseType::PostgreSQL => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .min_connections(config.min_connections)
                    .acquire_timeout(acquire_timeout)
                    .connect(&config.url)
                    .await?;
                Ok(DatabasePool::PostgreSQL(pool))
            }
            DatabaseType::SQLite => {
                let in_memory = config.url.contains(":memory:");
                let mut options = SqliteConnectOptions::from_str(&config.url)?
                    .create_if_missing(true)
                    .busy_timeout(Duration::from_secs(5));
                if !in_memory {
                    options = options.journal_mode(SqliteJournalMode::Wal);
                }

                let mut pool_options = SqlitePoolOptions::new()
                    .max_connections(config.max_connections)
                    .min_connections(config.min_connections)
                    .acquire_timeout(acquire_timeout);
                if in_memory {
                    // 每个连接各自持有一份内存库，只能用一个常驻连接
                    pool_options = pool_options
                        .max_connections(1)
                        .min_connections(1)
                        .idle_timeout(None)
                        .max_lifetime(None);
                }

                let pool = pool_options.connect_with(options).await?;
                Ok(DatabasePool::SQLite(pool))
            }
            DatabaseType::Memory => Ok(DatabasePool::Memory(InMemoryTaskStore::new())),
        }
    }

    pub fn database_type(&self) -> DatabaseType {
        match self {
            DatabasePool::PostgreSQL(_) => DatabaseType::PostgreSQL,
            DatabasePool::SQLite(_) => DatabaseType::SQLite,
            DatabasePool::Memory(_) => DatabaseType::Memory,
        }
    }
}

/// 存储管理器：负责连接、迁移，并产出调度核心使用的 [`TaskStore`]
pub struct DatabaseManager {
    pool: DatabasePool,
}

impl DatabaseManager {
    /// 连接存储并执行迁移
    pub async fn connect(config: &DatabaseConfig) -> SchedulerResult<Self> {
        let manager = Self {
            pool: DatabasePool::new(config).await?,
        };
        manager.migrate().await?;
        info!(
            database.kind = ?manager.database_type(),
            "存储连接已建立"
        );
        Ok(manager)
    }

    pub fn database_type(&self) -> DatabaseType {
        self.pool.database_type()
    }

    pub async fn migrate(&self) -> SchedulerResult<()> {
        match &self.pool {
            DatabasePool::PostgreSQL(pool) => postgres::run_migrations(pool).await,
            DatabasePool::SQLite(pool) => sqlite::run_migrations(pool).await,
            DatabasePool::Memory(_) => Ok(()),
        }
    }

    pub async fn health_check(&self) -> SchedulerResult<()> {
        match &self.pool {
            DatabasePool::PostgreSQL(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            DatabasePool::SQLite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            DatabasePool::Memory(_) => {}
        }
        Ok(())
    }

    pub async fn close(&self) {
        match &self.pool {
            DatabasePool::PostgreSQL(pool) => pool.close().await,
            DatabasePool::SQLite(pool) => pool.close().await,
            DatabasePool::Memory(_) => {}
        }
    }

    pub fn task_store(&self) -> TaskStore {
        match &self.pool {
            DatabasePool::PostgreSQL(pool) => TaskStore::new(
                Arc::new(PostgresTaskRepository::new(pool.clone())),
                Arc::new(PostgresTaskExecutionRepository::new(pool.clone())),
                Arc::new(PostgresHeartbeatRepository::new(pool.clone())),
            ),
            DatabasePool::SQLite(pool) => TaskStore::new(
                Arc::new(SqliteTaskRepository::new(pool.clone())),
                Arc::new(SqliteTaskExecutionRepository::new(pool.clone())),
                Arc::new(SqliteHeartbeatRepository::new(pool.clone())),
            ),
            DatabasePool::Memory(store) => store.clone().into_store(),
        }
    }
}

impl std::fmt::Debug for DatabaseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseManager")
            .field("database_type", &self.database_type())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_type_from_url() {
        assert_eq!(
            DatabaseType::from_url("postgres://localhost/db"),
            DatabaseType::PostgreSQL
        );
        assert_eq!(
            DatabaseType::from_url("postgresql://localhost/db"),
            DatabaseType::PostgreSQL
        );
        assert_eq!(DatabaseType::from_url("sqlite::memory:"), DatabaseType::SQLite);
        assert_eq!(DatabaseType::from_url("memory://"), DatabaseType::Memory);
    }

    #[tokio::test]
    async fn test_connect_in_memory_sqlite_runs_migrations() {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..Default::default()
        };
        let manager = DatabaseManager::connect(&config).await.unwrap();
        assert_eq!(manager.database_type(), DatabaseType::SQLite);
        assert!(manager.health_check().await.is_ok());
        // 迁移可以重复执行
        assert!(manager.migrate().await.is_ok());
    }
}
