use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_domain::{
    entities::{NewTask, Task, TaskOutcome, TaskStatus},
    repositories::TaskRepository,
};
use scheduler_errors::SchedulerResult;
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use crate::database::mapping::MappingHelpers;

pub struct PostgresTaskRepository {
    pool: PgPool,
}

impl PostgresTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &sqlx::postgres::PgRow) -> SchedulerResult<Task> {
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
impl TaskRepository for PostgresTaskRepository {
    #[instrument(skip(self, task), fields(theme = %task.theme))]
    async fn create(&self, task: &NewTask) -> SchedulerResult<Task> {
        task.validate()?;
        let now = Utc::now();

        let row = sqlx::query(
            r#"
            INSERT INTO tasks (theme, system_name, service_name, method_name, arg, max_retry_time, retry_time, timeout_seconds, status, create_time, update_time)
            VALUES ($1, $2, $3, $4, $5, $6, 0, $7, 'WAIT', $8, $8)
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
        .fetch_one(&self.pool)
        .await?;

        let created = Self::row_to_task(&row)?;
        debug!("创建任务成功: {} ({}.{})", created.id, created.service_name, created.method_name);
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn find_runnable(&self, theme: &str, limit: i64) -> SchedulerResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM tasks WHERE theme = $1 AND status IN ('WAIT', 'RETRY') ORDER BY id ASC LIMIT $2",
        )
        .bind(theme)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn count_by_status(&self, theme: &str, status: TaskStatus) -> SchedulerResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM tasks WHERE theme = $1 AND status = $2",
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
            UPDATE tasks SET status = 'RUNNING', log_id = $1, last_run_time = $2, update_time = $2
            WHERE id = $3 AND status IN ('WAIT', 'RETRY')
            RETURNING *
            "#,
        )
        .bind(log_id)
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
            UPDATE tasks SET status = $1, retry_time = $2, last_result = $3, last_err_msg = $4,
                last_run_time = $5, last_run_end_time = $6, last_run_duration = $7, log_id = $8, update_time = $9
            WHERE id = $10 AND status IN ({})
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
            "UPDATE tasks SET status = 'WAIT', update_time = $1 WHERE id = $2 AND status IN ('WAIT', 'RETRY')",
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
            WHERE t.theme = $1 AND t.status = 'RUNNING' AND t.update_time < $2
              AND (h.last_beat_time IS NULL OR h.last_beat_time < $2)
            ORDER BY t.id ASC
            "#,
        )
        .bind(theme)
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn reset_running_to_wait(&self, ids: &[i64]) -> SchedulerResult<Vec<i64>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut reset = sqlx::query_scalar::<_, i64>(
            "UPDATE tasks SET status = 'WAIT', update_time = $1 WHERE status = 'RUNNING' AND id = ANY($2) RETURNING id",
        )
        .bind(Utc::now())
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        reset.sort_unstable();
        Ok(reset)
    }
}
