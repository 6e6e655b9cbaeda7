use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_domain::{entities::TaskHeartbeat, repositories::HeartbeatRepository};
use scheduler_errors::SchedulerResult;
use sqlx::{PgPool, Row};

pub struct PostgresHeartbeatRepository {
    pool: PgPool,
}

impl PostgresHeartbeatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HeartbeatRepository for PostgresHeartbeatRepository {
    async fn upsert(&self, task_id: i64, now: DateTime<Utc>) -> SchedulerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO task_heartbeats (task_id, last_beat_time) VALUES ($1, $2)
            ON CONFLICT (task_id) DO UPDATE SET last_beat_time = EXCLUDED.last_beat_time
            "#,
        )
        .bind(task_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, task_id: i64) -> SchedulerResult<Option<TaskHeartbeat>> {
        let row = sqlx::query("SELECT task_id, last_beat_time FROM task_heartbeats WHERE task_id = $1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .map(|row| -> SchedulerResult<TaskHeartbeat> {
                Ok(TaskHeartbeat {
                    task_id: row.try_get("task_id")?,
                    last_beat_time: row.try_get("last_beat_time")?,
                })
            })
            .transpose()?)
    }

    async fn remove(&self, task_id: i64) -> SchedulerResult<()> {
        sqlx::query("DELETE FROM task_heartbeats WHERE task_id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
