use std::future::Future;
use std::time::{Duration, Instant};

use scheduler_domain::repositories::TaskStore;
use scheduler_infrastructure::InMemoryTaskStore;
use tokio::time::sleep;

/// 内存存储及其 [`TaskStore`] 视图，二者共享同一份数据
pub fn memory_store() -> (InMemoryTaskStore, TaskStore) {
    let memory = InMemoryTaskStore::new();
    let store = memory.clone().into_store();
    (memory, store)
}

/// 轮询等待条件成立，超时返回 `false`
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    loop {
        if condition().await {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        sleep(Duration::from_millis(10)).await;
    }
}

pub struct TestEnv;

impl TestEnv {
    pub fn unique_theme(prefix: &str) -> String {
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0);
        format!("{prefix}_{nanos}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_wait_until_polls_until_true() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let ok = wait_until(Duration::from_secs(1), || async move {
            calls.fetch_add(1, Ordering::SeqCst) >= 2
        })
        .await;
        assert!(ok);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_until_times_out() {
        assert!(!wait_until(Duration::from_millis(30), || async { false }).await);
    }

    #[test]
    fn test_unique_theme_has_prefix() {
        assert!(TestEnv::unique_theme("t").starts_with("t_"));
    }
}
