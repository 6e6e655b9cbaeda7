use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_domain::{entities::TaskHeartbeat, repositories::HeartbeatRepository};
use scheduler_errors::SchedulerResult;
use sqlx::{Row, SqlitePool};

pub struct SqliteHeartbeatRepository {
    pool: SqlitePool,
}

impl SqliteHeartbeatRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HeartbeatRepository for SqliteHeartbeatRepository {
    async fn upsert(&self, task_id: i64, now: DateTime<Utc>) -> SchedulerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO task_heartbeats (task_id, last_beat_time) VALUES (?, ?)
            ON CONFLICT(task_id) DO UPDATE SET last_beat_time = excluded.last_beat_time
            "#,
        )
        .bind(task_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, task_id: i64) -> SchedulerResult<Option<TaskHeartbeat>> {
        let row = sqlx::query("SELECT task_id, last_beat_time FROM task_heartbeats WHERE task_id = ?")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(TaskHeartbeat {
                task_id: row.try_get("task_id")?,
                last_beat_time: row.try_get("last_beat_time")?,
            })),
            None => Ok(None),
        }
    }

    async fn remove(&self, task_id: i64) -> SchedulerResult<()> {
        sqlx::query("DELETE FROM task_heartbeats WHERE task_id = ?")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
