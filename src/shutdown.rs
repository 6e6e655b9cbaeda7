use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// 优雅关闭管理器
///
/// 持有进程级的取消信号，所有调度器都挂在它的子信号下。
#[derive(Debug, Clone, Default)]
pub struct ShutdownManager {
    token: CancellationToken,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 进程级取消信号，用作各调度器的上级信号
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// 触发关闭，重复调用无效果
    pub fn shutdown(&self) {
        if self.token.is_cancelled() {
            debug!("关闭管理器已经触发过关闭");
            return;
        }
        info!("触发系统关闭");
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 等待关闭被触发
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }

    /// 等待 Ctrl+C 或 SIGTERM（或其他地方触发的关闭），然后触发关闭
    pub async fn wait_for_signal(&self) {
        tokio::select! {
            _ = ctrl_c() => info!("收到Ctrl+C信号"),
            _ = terminate() => info!("收到SIGTERM信号"),
            _ = self.token.cancelled() => {}
        }
        self.shutdown();
    }
}

async fn ctrl_c() {
    if let Err(e) = signal::ctrl_c().await {
        error!("安装Ctrl+C信号处理器失败: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            error!("安装SIGTERM信号处理器失败: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_shutdown_manager_basic() {
        let manager = ShutdownManager::new();
        assert!(!manager.is_shutdown());

        let child = manager.token().child_token();
        manager.shutdown();

        assert!(manager.is_shutdown());
        assert!(child.is_cancelled());
        assert!(timeout(Duration::from_millis(100), manager.wait()).await.is_ok());
    }

    #[tokio::test]
    async fn test_double_shutdown() {
        let manager = ShutdownManager::new();
        manager.shutdown();
        manager.shutdown();
        assert!(manager.is_shutdown());
    }

    #[tokio::test]
    async fn test_wait_for_signal_returns_on_manual_shutdown() {
        let manager = ShutdownManager::new();
        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.wait_for_signal().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.shutdown();

        let result = timeout(Duration::from_millis(200), waiter).await;
        assert!(result.is_ok());
    }
}
