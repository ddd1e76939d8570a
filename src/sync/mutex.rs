//! # 互斥锁（Mutex）
//!
//! ## Overview
//! - `Mutex`：条件变量所依赖的外部互斥锁接口
//! - `MutexBlocking`：基于资源队列的阻塞锁，锁队列开启转移，
//!   因此等待者会把优先级 / 票数捐赠给持有者，避免优先级反转
//!
//! ## Invariants
//! - 每把锁最多只被一个线程持有
//! - `holder == Some(t)` 时，调度图中该锁队列的持有者也是 `t`
//!
//! ## Behavior
//! - `lock`：空闲则直接获得；否则在锁队列上等待并阻塞，
//!   被唤醒时锁已经直接交到手上
//! - `unlock`：若有等待者，按调度策略选出下一个并直接移交；
//!   否则释放锁队列

use crate::sched::{ThreadQueue, Tid};
use crate::sync::{disable_intr, UPIntrFreeCell};
use crate::task::{block_current_and_run_next, current_kernel, current_tid, wakeup_task};

/// 互斥锁统一抽象接口
pub trait Mutex: Sync + Send {
    /// 获取互斥锁，必要时阻塞
    fn lock(&self);
    /// 释放互斥锁
    fn unlock(&self);
    /// 当前线程是否持有该锁
    fn is_held_by_current_thread(&self) -> bool;
}

/// 阻塞式互斥锁
pub struct MutexBlocking {
    holder: UPIntrFreeCell<Option<Tid>>,
    wait_queue: ThreadQueue,
}

impl MutexBlocking {
    /// 在当前内核中创建一把锁
    pub fn new() -> Self {
        Self {
            holder: UPIntrFreeCell::new(None),
            wait_queue: current_kernel().new_thread_queue(true),
        }
    }

    pub fn holder(&self) -> Option<Tid> {
        *self.holder.exclusive_access()
    }
}

impl Default for MutexBlocking {
    fn default() -> Self {
        Self::new()
    }
}

impl Mutex for MutexBlocking {
    /// ## Panics
    /// - 当前线程已经持有该锁（不支持重入）
    fn lock(&self) {
        let me = current_tid();
        assert!(
            !self.is_held_by_current_thread(),
            "thread {} locks a mutex it already holds",
            me
        );
        let kernel = self.wait_queue.kernel();
        let queue = self.wait_queue.id();

        let _intr = disable_intr();
        let mut holder = self.holder.exclusive_access();
        if holder.is_some() {
            drop(holder);
            kernel.scheduler().exclusive_access().wait_for_access(queue, me);
            block_current_and_run_next();
        } else {
            *holder = Some(me);
            drop(holder);
            kernel.scheduler().exclusive_access().acquire(queue, me);
        }
        assert_eq!(self.holder(), Some(me), "mutex handed to the wrong thread");
    }

    /// ## Panics
    /// - 当前线程并不持有该锁
    fn unlock(&self) {
        let me = current_tid();
        assert!(
            self.is_held_by_current_thread(),
            "thread {} unlocks a mutex it does not hold",
            me
        );
        let kernel = self.wait_queue.kernel();
        let queue = self.wait_queue.id();

        let _intr = disable_intr();
        let next = {
            let mut sched = kernel.scheduler().exclusive_access();
            let next = sched.next_thread(queue);
            if next.is_none() {
                sched.release(queue, me);
            }
            next
        };
        *self.holder.exclusive_access() = next;
        if let Some(next) = next {
            wakeup_task(next);
        }
    }

    fn is_held_by_current_thread(&self) -> bool {
        self.holder() == Some(current_tid())
    }
}
