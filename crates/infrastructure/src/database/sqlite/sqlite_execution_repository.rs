use async_trait::async_trait;
use scheduler_domain::{
    entities::{ExecutionStats, TaskExecutionRecord, TaskStatus},
    repositories::TaskExecutionRepository,
};
use scheduler_errors::SchedulerResult;
use sqlx::{Row, SqlitePool};

use crate::database::mapping::MappingHelpers;

pub struct SqliteTaskExecutionRepository {
    pool: SqlitePool,
}

impl SqliteTaskExecutionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> SchedulerResult<TaskExecutionRecord> {
        let status: String = row.try_get("status")?;
        Ok(TaskExecutionRecord {
            id: row.try_get("id")?,
            task_id: row.try_get("task_id")?,
            status: MappingHelpers::parse_status(&status)?,
            result: row.try_get("result")?,
            err_msg: row.try_get("err_msg")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            duration_ms: row.try_get("duration_ms")?,
            log_id: row.try_get("log_id")?,
        })
    }
}

#[async_trait]
impl TaskExecutionRepository for SqliteTaskExecutionRepository {
    async fn append(&self, record: &TaskExecutionRecord) -> SchedulerResult<TaskExecutionRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO task_execution_records (task_id, status, result, err_msg, start_time, end_time, duration_ms, log_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(record.task_id)
        .bind(record.status.as_str())
        .bind(&record.result)
        .bind(&record.err_msg)
        .bind(record.start_time)
        .bind(record.end_time)
        .bind(record.duration_ms)
        .bind(&record.log_id)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_record(&row)
    }

    async fn list_by_task(
        &self,
        task_id: i64,
        limit: i64,
    ) -> SchedulerResult<Vec<TaskExecutionRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM task_execution_records WHERE task_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(task_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn get_execution_stats(&self, task_id: i64) -> SchedulerResult<ExecutionStats> {
        let rows = sqlx::query(
            "SELECT status, duration_ms FROM task_execution_records WHERE task_id = ?",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        let samples = rows
            .iter()
            .map(|row| -> SchedulerResult<(TaskStatus, i64)> {
                let status: String = row.try_get("status")?;
                let duration: i64 = row.try_get("duration_ms")?;
                Ok((MappingHelpers::parse_status(&status)?, duration))
            })
            .collect::<SchedulerResult<Vec<_>>>()?;

        Ok(ExecutionStats::from_samples(task_id, &samples))
    }
}
