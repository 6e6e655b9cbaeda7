use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

/// 本进程内的在途任务集合
///
/// 一个任务ID从进入通道到执行结束（或因队列已满被丢弃）之间都在集合中，
/// 扫描循环据此避免把同一个任务重复入队。重启后为空。
#[derive(Debug, Default)]
pub struct InFlightLedger {
    ids: RwLock<HashSet<i64>>,
}

impl InFlightLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记任务ID，已存在时返回 `false`
    pub fn try_claim(&self, task_id: i64) -> bool {
        self.ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task_id)
    }

    pub fn release(&self, task_id: i64) -> bool {
        self.ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&task_id)
    }

    pub fn contains(&self, task_id: i64) -> bool {
        self.ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&task_id)
    }

    pub fn len(&self) -> usize {
        self.ids.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
