mod common;

use scheduler_config::DatabaseConfig;
use scheduler_domain::repositories::TaskStore;
use scheduler_infrastructure::DatabaseManager;

async fn sqlite_store() -> TaskStore {
    let config = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        ..Default::default()
    };
    DatabaseManager::connect(&config).await.unwrap().task_store()
}

#[tokio::test]
async fn test_sqlite_create_and_load() {
    common::create_and_load_round_trip(&sqlite_store().await).await;
}

#[tokio::test]
async fn test_sqlite_find_runnable() {
    common::find_runnable_is_ordered_and_scoped(&sqlite_store().await).await;
}

#[tokio::test]
async fn test_sqlite_conditional_updates() {
    common::claim_and_outcome_are_conditional(&sqlite_store().await).await;
}

#[tokio::test]
async fn test_sqlite_stale_recovery() {
    common::stale_running_tasks_are_recovered(&sqlite_store().await).await;
}

#[tokio::test]
async fn test_sqlite_execution_records() {
    common::execution_records_and_stats(&sqlite_store().await).await;
}

#[tokio::test]
async fn test_sqlite_concurrent_claims() {
    common::concurrent_claims_have_one_winner(&sqlite_store().await).await;
}

#[tokio::test]
async fn test_sqlite_file_database_persists_between_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("persist.db");
    let config = DatabaseConfig {
        url: format!("sqlite:{}", path.display()),
        ..Default::default()
    };

    let id = {
        let manager = DatabaseManager::connect(&config).await.unwrap();
        let task = manager
            .task_store()
            .tasks
            .create(&common::new_task("persist"))
            .await
            .unwrap();
        manager.close().await;
        task.id
    };

    let manager = DatabaseManager::connect(&config).await.unwrap();
    let reloaded = manager.task_store().tasks.get_by_id(id).await.unwrap();
    assert!(reloaded.is_some());
    manager.close().await;
}

#[tokio::test]
async fn test_memory_url_uses_in_process_store() {
    let config = DatabaseConfig {
        url: "memory://".to_string(),
        ..Default::default()
    };
    let store = DatabaseManager::connect(&config).await.unwrap().task_store();
    common::claim_and_outcome_are_conditional(&store).await;
    common::stale_running_tasks_are_recovered(&store).await;
}
