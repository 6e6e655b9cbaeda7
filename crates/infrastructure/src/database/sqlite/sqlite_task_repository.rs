use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_domain::{
    entities::{NewTask, Task, TaskOutcome, TaskStatus},
    repositories::TaskRepository,
};
use scheduler_errors::SchedulerResult;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use crate::database::mapping::MappingHelpers;

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> SchedulerResult<Task> {
        let status: String = row.try_get("status")?;

        Ok(Task {
            id: row.try_get("id")?,
            theme: row.try_get("theme")?,
            system_name: row.try_get("system_name")?,
            service_name: row.try_get("service_name")?,
            method_name: row.try_get("method_name")?,
            arg: row.try_get("arg")?,
            max_retry_time: row.try_get("max_retry_time")?,
            retry_time: row.try_get("retry_time")?,
            timeout_seconds: row.try_get("timeout_seconds")?,
            status: MappingHelpers::parse_status(&status)?,
            create_time: row.try_get("create_time")?,
            update_time: row.try_get("update_time")?,
            last_run_time: row.try_get("last_run_time")?,
            last_run_end_time: row.try_get("last_run_end_time")?,
            last_run_duration: row.try_get("last_run_duration")?,
            last_result: row.try_get("last_result")?,
            last_err_msg: row.try_get("last_err_msg")?,
            log_id: row.try_get("log_id")?,
        })
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    #[instrument(skip(self, task), fields(theme = %task.theme))]
    async fn create(&self, task: &NewTask) -> SchedulerResult<Task> {
        task.validate()?;
        let now = Utc::now();

        let row = sqlx::query(
            r#"
            INSERT INTO tasks (theme, system_name, service_name, method_name, arg, max_retry_time, retry_time, timeout_seconds, status, create_time, update_time)
            VALUES (?, ?, ?, ?, ?, ?, 0, ?, 'WAIT', ?, ?)
            RETURNING *
            "#,
        )
        .bind(&task.theme)
        .bind(&task.system_name)
        .bind(&task.service_name)
        .bind(&task.method_name)
        .bind(&task.arg)
        .bind(task.max_retry_time)
        .bind(task.timeout_seconds)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let created = Self::row_to_task(&row)?;
        debug!("创建任务成功: {} ({}.{})", created.id, created.service_name, created.method_name);
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn find_runnable(&self, theme: &str, limit: i64) -> SchedulerResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM tasks WHERE theme = ? AND status IN ('WAIT', 'RETRY') ORDER BY id ASC LIMIT ?",
        )
        .bind(theme)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn count_by_status(&self, theme: &str, status: TaskStatus) -> SchedulerResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM tasks WHERE theme = ? AND status = ?",
        )
        .bind(theme)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    #[instrument(skip(self, now))]
    async fn try_claim(
        &self,
        id: i64,
        log_id: &str,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Option<Task>> {
        let row = sqlx::query(
            r#"
            UPDATE tasks SET status = 'RUNNING', log_id = ?, last_run_time = ?, update_time = ?
            WHERE id = ? AND status IN ('WAIT', 'RETRY')
            RETURNING *
            "#,
        )
        .bind(log_id)
        .bind(now)
        .bind(now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    #[instrument(skip(self, outcome), fields(status = %outcome.status))]
    async fn update_outcome(
        &self,
        id: i64,
        expected: &[TaskStatus],
        outcome: &TaskOutcome,
    ) -> SchedulerResult<bool> {
        if expected.is_empty() {
            return Ok(false);
        }

        let sql = format!(
            r#"
            UPDATE tasks SET status = ?, retry_time = ?, last_result = ?, last_err_msg = ?,
                last_run_time = ?, last_run_end_time = ?, last_run_duration = ?, log_id = ?, update_time = ?
            WHERE id = ? AND status IN ({})
            "#,
            MappingHelpers::status_list(expected)
        );

        let result = sqlx::query(&sql)
            .bind(outcome.status.as_str())
            .bind(outcome.retry_time)
            .bind(&outcome.result)
            .bind(&outcome.err_msg)
            .bind(outcome.start_time)
            .bind(outcome.end_time)
            .bind(outcome.duration_ms)
            .bind(&outcome.log_id)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn reset_to_wait(&self, id: i64) -> SchedulerResult<bool> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'WAIT', update_time = ? WHERE id = ? AND status IN ('WAIT', 'RETRY')",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_stale_running(
        &self,
        theme: &str,
        threshold: DateTime<Utc>,
    ) -> SchedulerResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT t.id FROM tasks t
            LEFT JOIN task_heartbeats h ON h.task_id = t.id
            WHERE t.theme = ? AND t.status = 'RUNNING' AND t.update_time < ?
              AND (h.last_beat_time IS NULL OR h.last_beat_time < ?)
            ORDER BY t.id ASC
            "#,
        )
        .bind(theme)
        .bind(threshold)
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn reset_running_to_wait(&self, ids: &[i64]) -> SchedulerResult<Vec<i64>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "UPDATE tasks SET status = 'WAIT', update_time = ? WHERE status = 'RUNNING' AND id IN ({}) RETURNING id",
            MappingHelpers::sqlite_placeholders(ids.len())
        );
        let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(Utc::now());
        for id in ids {
            query = query.bind(*id);
        }

        let mut reset = query.fetch_all(&self.pool).await?;
        reset.sort_unstable();
        Ok(reset)
    }
}
