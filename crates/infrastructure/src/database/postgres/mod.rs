pub mod postgres_execution_repository;
pub mod postgres_heartbeat_repository;
pub mod postgres_task_repository;

pub use postgres_execution_repository::PostgresTaskExecutionRepository;
pub use postgres_heartbeat_repository::PostgresHeartbeatRepository;
pub use postgres_task_repository::PostgresTaskRepository;

use scheduler_errors::SchedulerResult;
use sqlx::PgPool;
use tracing::debug;

/// 运行数据库迁移（幂等）
pub async fn run_migrations(pool: &PgPool) -> SchedulerResult<()> {
    debug!("Running PostgreSQL database migrations");

    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id BIGSERIAL PRIMARY KEY,
            theme VARCHAR(128) NOT NULL,
            system_name VARCHAR(128) NOT NULL DEFAULT '',
            service_name VARCHAR(255) NOT NULL,
            method_name VARCHAR(255) NOT NULL,
            arg BYTEA NOT NULL,
            max_retry_time INTEGER NOT NULL DEFAULT 0,
            retry_time INTEGER NOT NULL DEFAULT 0,
            timeout_seconds INTEGER,
            status VARCHAR(16) NOT NULL DEFAULT 'WAIT',
            create_time TIMESTAMPTZ NOT NULL,
            update_time TIMESTAMPTZ NOT NULL,
            last_run_time TIMESTAMPTZ,
            last_run_end_time TIMESTAMPTZ,
            last_run_duration BIGINT,
            last_result TEXT,
            last_err_msg TEXT,
            log_id VARCHAR(64)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS task_execution_records (
            id BIGSERIAL PRIMARY KEY,
            task_id BIGINT NOT NULL,
            status VARCHAR(16) NOT NULL,
            result TEXT,
            err_msg TEXT,
            start_time TIMESTAMPTZ NOT NULL,
            end_time TIMESTAMPTZ NOT NULL,
            duration_ms BIGINT NOT NULL,
            log_id VARCHAR(64) NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS task_heartbeats (
            task_id BIGINT PRIMARY KEY,
            last_beat_time TIMESTAMPTZ NOT NULL
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_tasks_theme_status_id ON tasks(theme, status, id)",
        "CREATE INDEX IF NOT EXISTS idx_task_execution_records_task_id ON task_execution_records(task_id)",
    ];

    for sql in statements {
        sqlx::query(sql).execute(pool).await?;
    }

    debug!("Successfully completed PostgreSQL database migrations");
    Ok(())
}
