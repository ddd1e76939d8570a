use super::QueueId;
use crate::kernel::Kernel;
use alloc::sync::Arc;

/// 拥有一个资源队列的句柄
///
/// ## Overview
/// 队列的生命周期与拥有它的资源（锁、条件变量等）绑定：
/// 句柄被 drop 时，队列从调度图中销毁。
///
/// ## Safety
/// - drop 时会进入调度器临界区，不能在持有调度器借用的作用域内 drop
/// - 内核停机或线程正在 unwind 时不做销毁，队列上可能仍停着线程
pub struct ThreadQueue {
    kernel: Arc<Kernel>,
    id: QueueId,
}

impl ThreadQueue {
    pub fn new(kernel: Arc<Kernel>, transfer: bool) -> Self {
        let id = kernel.scheduler().exclusive_access().new_queue(transfer);
        Self { kernel, id }
    }

    pub fn id(&self) -> QueueId {
        self.id
    }

    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }
}

impl Drop for ThreadQueue {
    fn drop(&mut self) {
        // 停机后调度图不再维护，等待者也不会再被唤醒
        if std::thread::panicking() || self.kernel.processor().halted().is_some() {
            return;
        }
        self.kernel.scheduler().exclusive_access().destroy_queue(self.id);
    }
}
