//! SQLite 与 PostgreSQL 适配器共用的仓储行为检查

use chrono::{Duration, Utc};
use scheduler_domain::entities::{NewTask, TaskExecutionRecord, TaskOutcome, TaskStatus};
use scheduler_domain::repositories::TaskStore;

pub fn new_task(theme: &str) -> NewTask {
    NewTask::new(theme, "orders", "settle", br#"{"order_id":1}"#.to_vec())
        .with_system_name("billing")
        .with_max_retry_time(2)
}

fn outcome(status: TaskStatus, retry_time: i32, duration_ms: i64) -> TaskOutcome {
    let start_time = Utc::now();
    TaskOutcome {
        status,
        retry_time,
        result: Some("\"ok\"".to_string()),
        err_msg: None,
        start_time,
        end_time: start_time + Duration::milliseconds(duration_ms),
        duration_ms,
        log_id: format!("log-{retry_time}"),
    }
}

pub async fn create_and_load_round_trip(store: &TaskStore) {
    let created = store.tasks.create(&new_task("rt")).await.unwrap();
    assert!(created.id > 0);
    assert_eq!(created.status, TaskStatus::Wait);
    assert_eq!(created.retry_time, 0);

    let loaded = store.tasks.get_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(loaded.theme, "rt");
    assert_eq!(loaded.system_name, "billing");
    assert_eq!(loaded.arg, br#"{"order_id":1}"#.to_vec());
    assert_eq!(loaded.max_retry_time, 2);
    assert!(loaded.last_run_time.is_none());

    assert!(store.tasks.get_by_id(i64::MAX).await.unwrap().is_none());
}

pub async fn find_runnable_is_ordered_and_scoped(store: &TaskStore) {
    let a = store.tasks.create(&new_task("scan-a")).await.unwrap();
    let _b = store.tasks.create(&new_task("scan-b")).await.unwrap();
    let c = store.tasks.create(&new_task("scan-a")).await.unwrap();
    let d = store.tasks.create(&new_task("scan-a")).await.unwrap();

    store.tasks.try_claim(c.id, "log", Utc::now()).await.unwrap();

    let ids = store.tasks.find_runnable("scan-a", 10).await.unwrap();
    assert_eq!(ids, vec![a.id, d.id]);
    assert_eq!(
        store.tasks.find_runnable("scan-a", 1).await.unwrap(),
        vec![a.id]
    );
    assert_eq!(
        store
            .tasks
            .count_by_status("scan-a", TaskStatus::Running)
            .await
            .unwrap(),
        1
    );
}

pub async fn claim_and_outcome_are_conditional(store: &TaskStore) {
    let task = store.tasks.create(&new_task("claim")).await.unwrap();
    let now = Utc::now();

    let claimed = store.tasks.try_claim(task.id, "log-a", now).await.unwrap().unwrap();
    assert_eq!(claimed.status, TaskStatus::Running);
    assert_eq!(claimed.log_id.as_deref(), Some("log-a"));
    assert!(store.tasks.try_claim(task.id, "log-b", now).await.unwrap().is_none());

    // 已在运行中的任务不能被当作未认领任务写入结果
    let retry = outcome(TaskStatus::Retry, 1, 15);
    assert!(!store
        .tasks
        .update_outcome(task.id, &TaskStatus::RUNNABLE, &retry)
        .await
        .unwrap());
    assert!(store
        .tasks
        .update_outcome(task.id, &[TaskStatus::Running], &retry)
        .await
        .unwrap());

    let loaded = store.tasks.get_by_id(task.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, TaskStatus::Retry);
    assert_eq!(loaded.retry_time, 1);
    assert_eq!(loaded.last_run_duration, Some(15));
    assert_eq!(loaded.last_result.as_deref(), Some("\"ok\""));
    assert_eq!(loaded.log_id.as_deref(), Some("log-1"));

    // Retry 可以再次被认领，返回的行带着最新的重试计数
    let reclaimed = store.tasks.try_claim(task.id, "log-c", now).await.unwrap().unwrap();
    assert_eq!(reclaimed.retry_time, 1);
    assert!(!store.tasks.reset_to_wait(task.id).await.unwrap());
}

pub async fn stale_running_tasks_are_recovered(store: &TaskStore) {
    let orphan = store.tasks.create(&new_task("stale")).await.unwrap();
    let alive = store.tasks.create(&new_task("stale")).await.unwrap();
    let long_ago = Utc::now() - Duration::seconds(300);

    store.tasks.try_claim(orphan.id, "log-o", long_ago).await.unwrap();
    store.tasks.try_claim(alive.id, "log-a", long_ago).await.unwrap();
    store.heartbeats.upsert(alive.id, Utc::now()).await.unwrap();

    let threshold = Utc::now() - Duration::seconds(30);
    let stale = store
        .tasks
        .find_stale_running("stale", threshold)
        .await
        .unwrap();
    assert_eq!(stale, vec![orphan.id]);

    assert_eq!(
        store.tasks.reset_running_to_wait(&stale).await.unwrap(),
        vec![orphan.id]
    );
    // 第二次重置不会再命中
    assert!(store.tasks.reset_running_to_wait(&stale).await.unwrap().is_empty());
    assert!(store.tasks.reset_running_to_wait(&[]).await.unwrap().is_empty());

    let reloaded = store.tasks.get_by_id(orphan.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, TaskStatus::Wait);
    assert!(store
        .tasks
        .find_runnable("stale", 10)
        .await
        .unwrap()
        .contains(&orphan.id));

    let beat = store.heartbeats.get(alive.id).await.unwrap().unwrap();
    assert_eq!(beat.task_id, alive.id);
    assert!(store.heartbeats.get(orphan.id).await.unwrap().is_none());

    store.heartbeats.remove(alive.id).await.unwrap();
    assert!(store.heartbeats.get(alive.id).await.unwrap().is_none());
    // 删除不存在的心跳行不是错误
    store.heartbeats.remove(alive.id).await.unwrap();
}

pub async fn execution_records_and_stats(store: &TaskStore) {
    let task = store.tasks.create(&new_task("records")).await.unwrap();
    let samples = [
        (TaskStatus::Retry, 10),
        (TaskStatus::Retry, 20),
        (TaskStatus::Success, 30),
        (TaskStatus::Failed, 40),
    ];
    for (i, (status, duration)) in samples.iter().enumerate() {
        let record = TaskExecutionRecord::from_outcome(task.id, &outcome(*status, i as i32, *duration));
        let stored = store.executions.append(&record).await.unwrap();
        assert!(stored.id > 0);
    }

    let records = store.executions.list_by_task(task.id, 2).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].status, TaskStatus::Failed);
    assert_eq!(records[1].status, TaskStatus::Success);

    let stats = store.executions.get_execution_stats(task.id).await.unwrap();
    assert_eq!(stats.total_runs, 4);
    assert_eq!(stats.success_runs, 1);
    assert_eq!(stats.failed_runs, 1);
    assert_eq!(stats.retry_runs, 2);
    assert!((stats.avg_duration_ms - 25.0).abs() < f64::EPSILON);
    assert_eq!(stats.p99_duration_ms, 40);
}

pub async fn concurrent_claims_have_one_winner(store: &TaskStore) {
    let task_id = store.tasks.create(&new_task("race")).await.unwrap().id;

    let claims = (0..16).map(|i| {
        let tasks = store.tasks.clone();
        async move { tasks.try_claim(task_id, &format!("log-{i}"), Utc::now()).await }
    });
    let results = futures::future::join_all(claims).await;

    let winners = results
        .into_iter()
        .filter(|r| matches!(r, Ok(Some(_))))
        .count();
    assert_eq!(winners, 1);
}
