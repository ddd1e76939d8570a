use crate::sched::{QueueId, Tid};
use crate::sync::{UPIntrFreeCell, UPIntrRefMut};
use alloc::string::String;
use std::thread::JoinHandle;

pub struct TaskControlBlock {
    pub tid: Tid,
    pub name: String,
    inner: UPIntrFreeCell<TaskControlBlockInner>,
}

impl TaskControlBlock {
    pub fn new(tid: Tid, name: &str, join_queue: QueueId, task_status: TaskStatus) -> Self {
        Self {
            tid,
            name: String::from(name),
            inner: UPIntrFreeCell::new(TaskControlBlockInner {
                task_status,
                join_queue,
                handle: None,
            }),
        }
    }

    pub fn inner_exclusive_access(&self) -> UPIntrRefMut<'_, TaskControlBlockInner> {
        self.inner.exclusive_access()
    }

    pub fn status(&self) -> TaskStatus {
        self.inner_exclusive_access().task_status
    }
}

pub struct TaskControlBlockInner {
    pub task_status: TaskStatus,
    /// 线程自己持有、join 者在其上等待的可转移队列
    pub join_queue: QueueId,
    /// 背后的 OS 线程，join 时回收
    pub handle: Option<JoinHandle<()>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Ready,
    Running,
    Blocked,
    Finished,
}
