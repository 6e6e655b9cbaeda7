use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

/// 扫描循环与Worker之间的有界任务通道
///
/// 所有Worker共享一个接收端，接收端由互斥锁保护；
/// 队列同时持有发送端，因此通道在关闭调度器之前不会被关闭。
#[derive(Debug)]
pub struct TaskQueue {
    sender: mpsc::Sender<i64>,
    receiver: Mutex<mpsc::Receiver<i64>>,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// 非阻塞入队，队列已满时返回 `false`
    pub fn try_push(&self, task_id: i64) -> bool {
        self.sender.try_send(task_id).is_ok()
    }

    /// 最多等待 `wait` 入队
    pub async fn push_timeout(&self, task_id: i64, wait: Duration) -> bool {
        self.sender.send_timeout(task_id, wait).await.is_ok()
    }

    /// 最多等待 `wait` 取出下一个任务ID，等待时间包含抢占接收端的时间
    pub async fn pop_timeout(&self, wait: Duration) -> Option<i64> {
        tokio::time::timeout(wait, async { self.receiver.lock().await.recv().await })
            .await
            .ok()
            .flatten()
    }

    /// 当前积压的任务数
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_until_full() {
        let queue = TaskQueue::new(2);
        assert!(queue.try_push(1));
        assert!(queue.try_push(2));
        assert!(!queue.try_push(3));
        assert_eq!(queue.len(), 2);

        assert!(!queue.push_timeout(3, Duration::from_millis(20)).await);

        assert_eq!(queue.pop_timeout(Duration::from_millis(20)).await, Some(1));
        assert_eq!(queue.len(), 1);
        assert!(queue.push_timeout(3, Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn test_pop_times_out_when_empty() {
        let queue = TaskQueue::new(4);
        assert!(queue.is_empty());
        assert_eq!(queue.pop_timeout(Duration::from_millis(10)).await, None);
        assert_eq!(queue.capacity(), 4);
    }
}
