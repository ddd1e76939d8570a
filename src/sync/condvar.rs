//! # 条件变量（Condvar）
//!
//! ## Overview
//! 条件变量本身 **不保存条件状态**，只维护一个不可转移的资源队列作为等待列表，
//! 并与一把外部互斥锁绑定。唤醒顺序由调度策略的 `next_thread` 决定，
//! 因此优先级 / 彩票顺序同样适用于条件变量。
//!
//! ## Assumptions
//! - 单处理器，没有抢占
//! - 调用 `sleep` / `wake` / `wake_all` 时当前线程持有绑定的锁
//!
//! ## Safety
//! - `sleep` 在临界区外释放锁，但“入队 + 阻塞”在临界区内完成；
//!   由于没有抢占，释放锁与入队之间不会有其他线程插入，
//!   其他线程不可能看到锁已空闲却找不到已入队的睡眠者
//!
//! ## Invariants
//! - 等待队列中的线程一定处于阻塞状态
//! - `sleep` 返回时当前线程一定重新持有锁，且恰好获得一次

use crate::sched::ThreadQueue;
use crate::sync::{disable_intr, Mutex};
use crate::task::{block_current_and_run_next, current_kernel, current_tid, wakeup_task};
use alloc::sync::Arc;

pub struct Condvar {
    lock: Arc<dyn Mutex>,
    wait_queue: ThreadQueue,
}

impl Condvar {
    /// 创建一个与 `lock` 绑定的条件变量
    pub fn new(lock: Arc<dyn Mutex>) -> Self {
        Self {
            lock,
            wait_queue: current_kernel().new_thread_queue(false),
        }
    }

    pub fn lock(&self) -> &Arc<dyn Mutex> {
        &self.lock
    }

    /// 原子地释放锁并睡眠，被唤醒后重新加锁
    ///
    /// ## Panics
    /// - 当前线程未持有绑定的锁
    pub fn sleep(&self) {
        assert!(
            self.lock.is_held_by_current_thread(),
            "condition sleep without holding its lock"
        );
        self.lock.unlock();
        {
            let _intr = disable_intr();
            self.wait_queue
                .kernel()
                .scheduler()
                .exclusive_access()
                .wait_for_access(self.wait_queue.id(), current_tid());
            block_current_and_run_next();
        }
        self.lock.lock();
    }

    /// 唤醒至多一个等待者，返回是否唤醒了线程
    pub fn wake(&self) -> bool {
        assert!(
            self.lock.is_held_by_current_thread(),
            "condition wake without holding its lock"
        );
        let _intr = disable_intr();
        self.wake_one()
    }

    /// 唤醒全部等待者，返回唤醒的数量
    ///
    /// 每次移除都重新进入临界区；守卫在循环的任何出口都会被恢复。
    pub fn wake_all(&self) -> usize {
        assert!(
            self.lock.is_held_by_current_thread(),
            "condition wake_all without holding its lock"
        );
        let mut woken = 0;
        loop {
            let _intr = disable_intr();
            if !self.wake_one() {
                break;
            }
            woken += 1;
        }
        woken
    }

    fn wake_one(&self) -> bool {
        let next = self
            .wait_queue
            .kernel()
            .scheduler()
            .exclusive_access()
            .next_thread(self.wait_queue.id());
        match next {
            Some(tid) => {
                wakeup_task(tid);
                true
            }
            None => false,
        }
    }
}
