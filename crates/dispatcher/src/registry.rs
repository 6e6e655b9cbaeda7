use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use scheduler_domain::entities::NewTask;
use scheduler_errors::{SchedulerError, SchedulerResult};
use scheduler_worker::StatusSnapshot;
use tracing::info;

use crate::scheduler::Scheduler;

/// 进程内 theme → 调度器 的映射，由启动流程构建并持有
#[derive(Debug, Default)]
pub struct SchedulerRegistry {
    schedulers: BTreeMap<String, Arc<Scheduler>>,
}

impl SchedulerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册调度器，同一分区只能注册一次
    pub fn register(&mut self, scheduler: Arc<Scheduler>) -> SchedulerResult<()> {
        let theme = scheduler.theme().to_string();
        if self.schedulers.contains_key(&theme) {
            return Err(SchedulerError::config_error(format!(
                "分区 {theme} 的调度器已注册"
            )));
        }
        self.schedulers.insert(theme, scheduler);
        Ok(())
    }

    pub fn get(&self, theme: &str) -> SchedulerResult<Arc<Scheduler>> {
        self.schedulers
            .get(theme)
            .cloned()
            .ok_or_else(|| SchedulerError::SchedulerNotFound {
                theme: theme.to_string(),
            })
    }

    pub fn themes(&self) -> Vec<String> {
        self.schedulers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.schedulers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedulers.is_empty()
    }

    pub fn start_all(&self) {
        for scheduler in self.schedulers.values() {
            scheduler.start();
        }
        info!(themes = ?self.themes(), "所有调度器已启动");
    }

    /// 按任务的分区路由到对应调度器提交
    pub async fn submit(&self, task: NewTask) -> SchedulerResult<i64> {
        self.get(&task.theme)?.submit(task).await
    }

    pub fn snapshots(&self) -> Vec<StatusSnapshot> {
        self.schedulers
            .values()
            .map(|scheduler| scheduler.status_snapshot())
            .collect()
    }

    /// 并行关闭所有调度器，全部在超时内停止时返回 `true`
    pub async fn shutdown_all(&self, timeout: Duration) -> bool {
        let results = join_all(
            self.schedulers
                .values()
                .map(|scheduler| scheduler.shutdown(timeout)),
        )
        .await;
        results.into_iter().all(|stopped| stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_infrastructure::InMemoryTaskStore;

    fn scheduler(theme: &str) -> Arc<Scheduler> {
        Scheduler::builder(theme, InMemoryTaskStore::new().into_store())
            .build()
            .unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = SchedulerRegistry::new();
        registry.register(scheduler("billing")).unwrap();
        registry.register(scheduler("alpha")).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.themes(), vec!["alpha", "billing"]);
        assert_eq!(registry.get("billing").unwrap().theme(), "billing");
        assert!(matches!(
            registry.get("missing"),
            Err(SchedulerError::SchedulerNotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_theme_rejected() {
        let mut registry = SchedulerRegistry::new();
        registry.register(scheduler("alpha")).unwrap();
        assert!(registry.register(scheduler("alpha")).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_submit_to_unknown_theme_fails() {
        let registry = SchedulerRegistry::new();
        let result = registry
            .submit(NewTask::new("ghost", "svc", "m", Vec::new()))
            .await;
        assert!(matches!(result, Err(SchedulerError::SchedulerNotFound { .. })));
    }
}
