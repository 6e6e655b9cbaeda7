use std::time::Duration;

use async_scheduler::app::{self, Application};
use async_scheduler::shutdown::ShutdownManager;
use scheduler_config::AppConfig;
use scheduler_domain::entities::{NewTask, TaskStatus};
use scheduler_testing_utils::wait_until;

fn config_toml(database_url: &str) -> String {
    format!(
        r#"
[database]
url = "{database_url}"
max_connections = 2

[scheduler]
themes = ["alpha", "beta"]
scan_interval_ms = 20
quick_queue_timeout_ms = 20
monitor_interval_seconds = 1

[worker_pool]
min_workers = 1
max_workers = 4
idle_wait_seconds = 1
task_heartbeat_interval_seconds = 1

[heartbeat]
check_interval_seconds = 1
stale_threshold_seconds = 5
"#
    )
}

#[tokio::test]
async fn test_tasks_survive_restart_on_sqlite_file() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("scheduler.db");
    let url = format!("sqlite://{}", db_path.display());

    let config_path = dir.path().join("scheduler.toml");
    std::fs::write(&config_path, config_toml(&url)).unwrap();
    let config = AppConfig::load(config_path.to_str()).unwrap();
    assert_eq!(config.scheduler.themes, vec!["alpha", "beta"]);

    // 第一个进程只提交不执行，模拟提交后退出
    let (database, store) = app::connect_store(&config).await.unwrap();
    let pending = store
        .tasks
        .create(&NewTask::new("beta", "system", "echo", br#"{"n":1}"#.to_vec()))
        .await
        .unwrap();
    database.close().await;

    // 重启后由调度器发现并执行
    let shutdown = ShutdownManager::new();
    let application = Application::new(
        config.clone(),
        app::builtin_handlers(),
        app::default_hooks(),
        &shutdown,
    )
    .await
    .unwrap();
    assert_eq!(application.registry().themes(), vec!["alpha", "beta"]);
    application.start();

    let submitted = application
        .registry()
        .submit(
            NewTask::new("alpha", "system", "sleep", br#"{"millis":10}"#.to_vec())
                .with_max_retry_time(1),
        )
        .await
        .unwrap();

    let store = application.store();
    assert!(wait_until(Duration::from_secs(10), || {
        let store = store.clone();
        async move {
            let mut done = true;
            for id in [pending.id, submitted] {
                let task = store.tasks.get_by_id(id).await.unwrap().unwrap();
                done &= task.status == TaskStatus::Success;
            }
            done
        }
    })
    .await);

    let echoed = store.tasks.get_by_id(pending.id).await.unwrap().unwrap();
    assert_eq!(echoed.last_result.as_deref(), Some(r#"{"n":1}"#));
    let stats = store.executions.get_execution_stats(submitted).await.unwrap();
    assert_eq!(stats.total_runs, 2);
    assert_eq!(stats.retry_runs, 1);
    assert_eq!(stats.success_runs, 1);

    shutdown.shutdown();
    assert!(application.shutdown(Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_unknown_handler_fails_task_in_memory_store() {
    let mut config = AppConfig::default();
    config.database.url = "memory://".to_string();
    config.scheduler.scan_interval_ms = 20;

    let shutdown = ShutdownManager::new();
    let application = Application::new(
        config,
        app::builtin_handlers(),
        app::default_hooks(),
        &shutdown,
    )
    .await
    .unwrap();
    application.start();

    let id = application
        .registry()
        .submit(NewTask::new("default", "billing", "charge", Vec::new()))
        .await
        .unwrap();

    let store = application.store();
    assert!(wait_until(Duration::from_secs(5), || {
        let store = store.clone();
        async move {
            store.tasks.get_by_id(id).await.unwrap().unwrap().status == TaskStatus::Failed
        }
    })
    .await);
    let task = store.tasks.get_by_id(id).await.unwrap().unwrap();
    assert!(task.last_err_msg.unwrap().contains("billing.charge"));

    shutdown.shutdown();
    assert!(application.shutdown(Duration::from_secs(5)).await);
}
