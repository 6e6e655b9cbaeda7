use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_domain::entities::{
    ExecutionStats, NewTask, Task, TaskExecutionRecord, TaskHeartbeat, TaskOutcome, TaskStatus,
};
use scheduler_domain::repositories::{
    HeartbeatRepository, TaskExecutionRepository, TaskRepository, TaskStore,
};
use scheduler_errors::SchedulerResult;
use tokio::sync::Mutex;

#[derive(Default)]
struct MemoryState {
    next_task_id: i64,
    next_record_id: i64,
    tasks: BTreeMap<i64, Task>,
    records: Vec<TaskExecutionRecord>,
    heartbeats: HashMap<i64, DateTime<Utc>>,
}

/// 进程内存储，三个仓储接口共用一把锁，条件更新在锁内完成所以同样是原子的
#[derive(Clone, Default)]
pub struct InMemoryTaskStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 包装成调度核心使用的 [`TaskStore`]
    pub fn into_store(self) -> TaskStore {
        let shared = Arc::new(self);
        TaskStore::new(shared.clone(), shared.clone(), shared)
    }

    /// 直接覆盖任务行，测试中用来模拟崩溃或旧数据
    pub async fn put_task(&self, task: Task) {
        let mut state = self.state.lock().await;
        state.next_task_id = state.next_task_id.max(task.id);
        state.tasks.insert(task.id, task);
    }

    pub async fn task_count(&self) -> usize {
        self.state.lock().await.tasks.len()
    }

    pub async fn record_count(&self, task_id: i64) -> usize {
        self.state
            .lock()
            .await
            .records
            .iter()
            .filter(|r| r.task_id == task_id)
            .count()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskStore {
    async fn create(&self, new_task: &NewTask) -> SchedulerResult<Task> {
        new_task.validate()?;
        let mut state = self.state.lock().await;
        state.next_task_id += 1;
        let now = Utc::now();
        let task = Task {
            id: state.next_task_id,
            theme: new_task.theme.clone(),
            system_name: new_task.system_name.clone(),
            service_name: new_task.service_name.clone(),
            method_name: new_task.method_name.clone(),
            arg: new_task.arg.clone(),
            max_retry_time: new_task.max_retry_time,
            retry_time: 0,
            timeout_seconds: new_task.timeout_seconds,
            status: TaskStatus::Wait,
            create_time: now,
            update_time: now,
            last_run_time: None,
            last_run_end_time: None,
            last_run_duration: None,
            last_result: None,
            last_err_msg: None,
            log_id: None,
        };
        state.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<Task>> {
        Ok(self.state.lock().await.tasks.get(&id).cloned())
    }

    async fn find_runnable(&self, theme: &str, limit: i64) -> SchedulerResult<Vec<i64>> {
        let state = self.state.lock().await;
        Ok(state
            .tasks
            .values()
            .filter(|t| t.theme == theme && t.status.is_runnable())
            .take(limit.max(0) as usize)
            .map(|t| t.id)
            .collect())
    }

    async fn count_by_status(&self, theme: &str, status: TaskStatus) -> SchedulerResult<i64> {
        let state = self.state.lock().await;
        Ok(state
            .tasks
            .values()
            .filter(|t| t.theme == theme && t.status == status)
            .count() as i64)
    }

    async fn try_claim(
        &self,
        id: i64,
        log_id: &str,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Option<Task>> {
        let mut state = self.state.lock().await;
        match state.tasks.get_mut(&id) {
            Some(task) if task.status.is_runnable() => {
                task.status = TaskStatus::Running;
                task.log_id = Some(log_id.to_string());
                task.last_run_time = Some(now);
                task.update_time = now;
                Ok(Some(task.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn update_outcome(
        &self,
        id: i64,
        expected: &[TaskStatus],
        outcome: &TaskOutcome,
    ) -> SchedulerResult<bool> {
        let mut state = self.state.lock().await;
        match state.tasks.get_mut(&id) {
            Some(task) if expected.contains(&task.status) => {
                task.status = outcome.status;
                task.retry_time = outcome.retry_time;
                task.last_result = outcome.result.clone();
                task.last_err_msg = outcome.err_msg.clone();
                task.last_run_time = Some(outcome.start_time);
                task.last_run_end_time = Some(outcome.end_time);
                task.last_run_duration = Some(outcome.duration_ms);
                task.log_id = Some(outcome.log_id.clone());
                task.update_time = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reset_to_wait(&self, id: i64) -> SchedulerResult<bool> {
        let mut state = self.state.lock().await;
        match state.tasks.get_mut(&id) {
            Some(task) if task.status.is_runnable() => {
                task.status = TaskStatus::Wait;
                task.update_time = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_stale_running(
        &self,
        theme: &str,
        threshold: DateTime<Utc>,
    ) -> SchedulerResult<Vec<i64>> {
        let state = self.state.lock().await;
        Ok(state
            .tasks
            .values()
            .filter(|t| t.theme == theme && t.status == TaskStatus::Running)
            .filter(|t| t.update_time < threshold)
            .filter(|t| match state.heartbeats.get(&t.id) {
                Some(beat) => *beat < threshold,
                None => true,
            })
            .map(|t| t.id)
            .collect())
    }

    async fn reset_running_to_wait(&self, ids: &[i64]) -> SchedulerResult<Vec<i64>> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut reset = Vec::new();
        for id in ids {
            if let Some(task) = state.tasks.get_mut(id) {
                if task.status == TaskStatus::Running {
                    task.status = TaskStatus::Wait;
                    task.update_time = now;
                    reset.push(*id);
                }
            }
        }
        reset.sort_unstable();
        Ok(reset)
    }
}

#[async_trait]
impl TaskExecutionRepository for InMemoryTaskStore {
    async fn append(&self, record: &TaskExecutionRecord) -> SchedulerResult<TaskExecutionRecord> {
        let mut state = self.state.lock().await;
        state.next_record_id += 1;
        let mut stored = record.clone();
        stored.id = state.next_record_id;
        state.records.push(stored.clone());
        Ok(stored)
    }

    async fn list_by_task(
        &self,
        task_id: i64,
        limit: i64,
    ) -> SchedulerResult<Vec<TaskExecutionRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .iter()
            .rev()
            .filter(|r| r.task_id == task_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn get_execution_stats(&self, task_id: i64) -> SchedulerResult<ExecutionStats> {
        let state = self.state.lock().await;
        let samples: Vec<(TaskStatus, i64)> = state
            .records
            .iter()
            .filter(|r| r.task_id == task_id)
            .map(|r| (r.status, r.duration_ms))
            .collect();
        Ok(ExecutionStats::from_samples(task_id, &samples))
    }
}

#[async_trait]
impl HeartbeatRepository for InMemoryTaskStore {
    async fn upsert(&self, task_id: i64, now: DateTime<Utc>) -> SchedulerResult<()> {
        self.state.lock().await.heartbeats.insert(task_id, now);
        Ok(())
    }

    async fn get(&self, task_id: i64) -> SchedulerResult<Option<TaskHeartbeat>> {
        let state = self.state.lock().await;
        Ok(state
            .heartbeats
            .get(&task_id)
            .map(|beat| TaskHeartbeat {
                task_id,
                last_beat_time: *beat,
            }))
    }

    async fn remove(&self, task_id: i64) -> SchedulerResult<()> {
        self.state.lock().await.heartbeats.remove(&task_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_task(theme: &str) -> NewTask {
        NewTask::new(theme, "demo", "run", b"{}".to_vec())
    }

    #[tokio::test]
    async fn test_find_runnable_is_fifo_and_theme_scoped() {
        let store = InMemoryTaskStore::new();
        let a = store.create(&new_task("a")).await.unwrap();
        let _b = store.create(&new_task("b")).await.unwrap();
        let c = store.create(&new_task("a")).await.unwrap();

        let ids = store.find_runnable("a", 10).await.unwrap();
        assert_eq!(ids, vec![a.id, c.id]);
        assert_eq!(store.find_runnable("a", 1).await.unwrap(), vec![a.id]);
    }

    #[tokio::test]
    async fn test_claim_only_once() {
        let store = InMemoryTaskStore::new();
        let task = store.create(&new_task("a")).await.unwrap();
        let now = Utc::now();

        let claimed = store.try_claim(task.id, "log-1", now).await.unwrap().unwrap();
        assert_eq!(claimed.status, TaskStatus::Running);
        assert!(store.try_claim(task.id, "log-2", now).await.unwrap().is_none());

        let stored = store.get_by_id(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Running);
        assert_eq!(stored.log_id.as_deref(), Some("log-1"));
    }

    #[tokio::test]
    async fn test_reset_to_wait_never_touches_running() {
        let store = InMemoryTaskStore::new();
        let task = store.create(&new_task("a")).await.unwrap();
        store.try_claim(task.id, "log", Utc::now()).await.unwrap();

        assert!(!store.reset_to_wait(task.id).await.unwrap());
        assert_eq!(
            store.reset_running_to_wait(&[task.id, 99]).await.unwrap(),
            vec![task.id]
        );
        assert!(store.reset_to_wait(task.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_detection_uses_newest_signal() {
        let store = InMemoryTaskStore::new();
        let task = store.create(&new_task("a")).await.unwrap();
        let long_ago = Utc::now() - Duration::seconds(120);
        store.try_claim(task.id, "log", long_ago).await.unwrap();

        let threshold = Utc::now() - Duration::seconds(30);
        assert_eq!(
            store.find_stale_running("a", threshold).await.unwrap(),
            vec![task.id]
        );

        store.upsert(task.id, Utc::now()).await.unwrap();
        assert!(store
            .find_stale_running("a", threshold)
            .await
            .unwrap()
            .is_empty());

        store.remove(task.id).await.unwrap();
        assert!(store.get(task.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_execution_records_newest_first() {
        let store = InMemoryTaskStore::new();
        let start = Utc::now();
        for (i, status) in [TaskStatus::Retry, TaskStatus::Success].into_iter().enumerate() {
            let outcome = TaskOutcome {
                status,
                retry_time: i as i32,
                result: Some("ok".to_string()),
                err_msg: None,
                start_time: start,
                end_time: start,
                duration_ms: 10 * (i as i64 + 1),
                log_id: format!("log-{i}"),
            };
            store
                .append(&TaskExecutionRecord::from_outcome(7, &outcome))
                .await
                .unwrap();
        }

        let records = store.list_by_task(7, 10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, TaskStatus::Success);

        let stats = store.get_execution_stats(7).await.unwrap();
        assert_eq!(stats.total_runs, 2);
        assert_eq!(stats.retry_runs, 1);
        assert_eq!(stats.p99_duration_ms, 20);
    }
}
