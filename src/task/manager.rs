//! # 任务管理模块
//!
//! ## Overview
//! 维护线程号到任务控制块（TCB）的映射，以及就绪队列的句柄。
//!
//! 就绪队列本身是调度器中的一个 **不可转移** 资源队列：
//! 唤醒线程即 `wait_for_access(ready_queue, tid)`，
//! 取下一个运行的线程即 `next_thread(ready_queue)`，
//! 因此优先级 / 彩票策略同样决定 CPU 的分配顺序。
//!
//! ## Invariants
//! - 就绪队列的等待者状态一定为 `Ready`
//! - 同一个线程号至多对应一个 TCB，结束的 TCB 保留以便之后的 join

use super::task::{TaskControlBlock, TaskStatus};
use crate::sched::{QueueId, Tid};
use alloc::collections::BTreeMap;
use alloc::sync::Arc;

pub struct TaskManager {
    ready_queue: QueueId,
    tasks: BTreeMap<Tid, Arc<TaskControlBlock>>,
    next_tid: usize,
}

impl TaskManager {
    pub fn new(ready_queue: QueueId) -> Self {
        Self {
            ready_queue,
            tasks: BTreeMap::new(),
            next_tid: 0,
        }
    }

    pub fn ready_queue(&self) -> QueueId {
        self.ready_queue
    }

    pub fn alloc_tid(&mut self) -> Tid {
        let tid = Tid(self.next_tid);
        self.next_tid += 1;
        tid
    }

    pub fn insert(&mut self, task: Arc<TaskControlBlock>) {
        let previous = self.tasks.insert(task.tid, task);
        assert!(previous.is_none(), "duplicate thread id");
    }

    /// ## Panics
    /// - 线程号从未分配过，表示内核内部状态不一致
    pub fn get(&self, tid: Tid) -> Arc<TaskControlBlock> {
        match self.tasks.get(&tid) {
            Some(task) => Arc::clone(task),
            None => panic!("cannot find thread {} in task table", tid),
        }
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks
            .values()
            .filter(|task| task.status() == status)
            .count()
    }
}
