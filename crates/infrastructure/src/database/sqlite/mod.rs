pub mod sqlite_execution_repository;
pub mod sqlite_heartbeat_repository;
pub mod sqlite_task_repository;

pub use sqlite_execution_repository::SqliteTaskExecutionRepository;
pub use sqlite_heartbeat_repository::SqliteHeartbeatRepository;
pub use sqlite_task_repository::SqliteTaskRepository;

use scheduler_errors::SchedulerResult;
use sqlx::SqlitePool;
use tracing::debug;

/// 运行数据库迁移（幂等）
///
/// 时间列以 sqlx 的 RFC3339 文本格式存储，所有时间都由应用绑定，不使用 `CURRENT_TIMESTAMP`，
/// 保证同一列内可以按字符串比较。
pub async fn run_migrations(pool: &SqlitePool) -> SchedulerResult<()> {
    debug!("Running SQLite database migrations");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            theme TEXT NOT NULL,
            system_name TEXT NOT NULL DEFAULT '',
            service_name TEXT NOT NULL,
            method_name TEXT NOT NULL,
            arg BLOB NOT NULL,
            max_retry_time INTEGER NOT NULL DEFAULT 0,
            retry_time INTEGER NOT NULL DEFAULT 0,
            timeout_seconds INTEGER,
            status TEXT NOT NULL DEFAULT 'WAIT',
            create_time TEXT NOT NULL,
            update_time TEXT NOT NULL,
            last_run_time TEXT,
            last_run_end_time TEXT,
            last_run_duration INTEGER,
            last_result TEXT,
            last_err_msg TEXT,
            log_id TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_execution_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id INTEGER NOT NULL,
            status TEXT NOT NULL,
            result TEXT,
            err_msg TEXT,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            duration_ms INTEGER NOT NULL,
            log_id TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_heartbeats (
            task_id INTEGER PRIMARY KEY,
            last_beat_time TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_tasks_theme_status_id ON tasks(theme, status, id)",
        "CREATE INDEX IF NOT EXISTS idx_task_execution_records_task_id ON task_execution_records(task_id)",
    ];

    for index_sql in indexes {
        sqlx::query(index_sql).execute(pool).await?;
    }

    debug!("Successfully completed SQLite database migrations");
    Ok(())
}
