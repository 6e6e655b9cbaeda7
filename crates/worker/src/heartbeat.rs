use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use scheduler_domain::repositories::HeartbeatRepository;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 单个任务分发期间的存活心跳
///
/// 启动时立即写一次心跳，之后每隔 `interval` 更新一次，直到 [`TaskBeat::stop`] 或被丢弃。
pub struct TaskBeat {
    task_id: i64,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl TaskBeat {
    pub fn start(
        heartbeats: Arc<dyn HeartbeatRepository>,
        task_id: i64,
        beat_interval: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(beat_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = heartbeats.upsert(task_id, Utc::now()).await {
                            warn!(task_id, "写入任务心跳失败: {}", e);
                        }
                    }
                }
            }
            debug!(task_id, "任务心跳已停止");
        });

        Self {
            task_id,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn task_id(&self) -> i64 {
        self.task_id
    }

    /// 停止心跳并等待后台任务退出
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(task_id = self.task_id, "心跳任务异常退出: {}", e);
            }
        }
    }
}

impl Drop for TaskBeat {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
