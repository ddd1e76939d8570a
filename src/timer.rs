//! # 时钟与定时睡眠（timer）
//!
//! ## Overview
//! - `Timer`：单调递增的 tick 计数，相当于硬件 `time` 寄存器
//! - `Alarm`：按唤醒时间排序的睡眠队列，由周期性的定时器中断驱动
//!
//! ## Design
//! - `wait_until` 从不忙等：登记 `(wake_time, 当前线程)` 后阻塞
//! - 唤醒并不保证恰好发生在 `wake_time`，因此醒来后在循环中重新检查，
//!   契约是“不早于 `wake_time` 返回”
//! - 定时器中断先让出 CPU，再在临界区内唤醒所有到期线程
//!
//! ## Invariants
//! - 一个线程同一时刻至多在 Alarm 中登记一次
//! - 队首条目的唤醒时间不大于其余条目；同一时间按登记顺序唤醒

use crate::kernel::Kernel;
use crate::sched::Tid;
use crate::sync::{disable_intr, UPIntrFreeCell};
use crate::task::{block_current_and_run_next, current_kernel, current_tid, suspend_current_and_run_next};
use alloc::collections::BinaryHeap;
use core::cmp::Reverse;
use core::sync::atomic::{AtomicU64, Ordering};

/// 模拟的硬件时钟
pub struct Timer {
    ticks: AtomicU64,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
        }
    }

    /// 当前时间（tick 数）
    pub fn get_time(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// 推进时钟，返回推进后的时间
    pub fn advance(&self, ticks: u64) -> u64 {
        self.ticks.fetch_add(ticks, Ordering::AcqRel) + ticks
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// 当前内核的时间（tick 数）
pub fn get_time() -> u64 {
    current_kernel().timer().get_time()
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct AlarmEntry {
    wake_time: u64,
    arrival: u64,
    tid: Tid,
}

#[derive(Default)]
struct AlarmQueue {
    heap: BinaryHeap<Reverse<AlarmEntry>>,
    arrivals: u64,
}

impl AlarmQueue {
    fn push(&mut self, wake_time: u64, tid: Tid) {
        self.arrivals += 1;
        self.heap.push(Reverse(AlarmEntry {
            wake_time,
            arrival: self.arrivals,
            tid,
        }));
    }

    /// 弹出一个已经到期的条目
    fn pop_due(&mut self, now: u64) -> Option<Tid> {
        match self.heap.peek() {
            Some(Reverse(entry)) if entry.wake_time <= now => {
                self.heap.pop().map(|Reverse(entry)| entry.tid)
            }
            _ => None,
        }
    }
}

/// 定时睡眠队列
pub struct Alarm {
    queue: UPIntrFreeCell<AlarmQueue>,
}

impl Alarm {
    pub fn new() -> Self {
        Self {
            queue: UPIntrFreeCell::new(AlarmQueue::default()),
        }
    }

    /// 定时器中断处理
    ///
    /// ## Behavior
    /// - 先让出 CPU，给其他就绪线程运行的机会
    /// - 再在临界区内唤醒所有唤醒时间已到的线程
    pub fn timer_interrupt(&self) {
        suspend_current_and_run_next();

        let _intr = disable_intr();
        let kernel = current_kernel();
        self.wake_expired(&kernel, kernel.timer().get_time());
    }

    /// 让当前线程至少睡眠 `ticks` 个 tick
    ///
    /// ## Behavior
    /// - `ticks <= 0` 时立即返回，不阻塞
    /// - 返回时一定满足 `now >= 调用时刻 + ticks`
    pub fn wait_until(&self, ticks: i64) {
        if ticks <= 0 {
            return;
        }
        let wake_time = get_time() + ticks as u64;
        while get_time() < wake_time {
            let _intr = disable_intr();
            self.queue
                .exclusive_session(|queue| queue.push(wake_time, current_tid()));
            block_current_and_run_next();
        }
    }

    /// 唤醒所有到期线程，返回唤醒的数量
    ///
    /// 调用者必须已关中断。
    pub(crate) fn wake_expired(&self, kernel: &Kernel, now: u64) -> usize {
        let mut woken = 0;
        loop {
            let due = self.queue.exclusive_session(|queue| queue.pop_due(now));
            let Some(tid) = due else {
                break;
            };
            log::debug!("alarm wakes thread {} at {}", tid, now);
            kernel.add_task(tid);
            woken += 1;
        }
        woken
    }

    /// 仍在睡眠的线程数
    pub fn pending(&self) -> usize {
        self.queue.exclusive_session(|queue| queue.heap.len())
    }

    /// 最早的唤醒时间
    pub fn next_deadline(&self) -> Option<u64> {
        self.queue
            .exclusive_session(|queue| queue.heap.peek().map(|Reverse(entry)| entry.wake_time))
    }
}

impl Default for Alarm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_entries_pop_in_deadline_then_arrival_order() {
        let mut queue = AlarmQueue::default();
        queue.push(300, Tid(1));
        queue.push(100, Tid(2));
        queue.push(100, Tid(3));
        queue.push(200, Tid(4));

        assert_eq!(queue.pop_due(99), None);
        assert_eq!(queue.pop_due(250), Some(Tid(2)));
        assert_eq!(queue.pop_due(250), Some(Tid(3)));
        assert_eq!(queue.pop_due(250), Some(Tid(4)));
        assert_eq!(queue.pop_due(250), None);
        assert_eq!(queue.pop_due(300), Some(Tid(1)));
    }

    #[test]
    fn timer_advances_monotonically() {
        let timer = Timer::new();
        assert_eq!(timer.get_time(), 0);
        assert_eq!(timer.advance(500), 500);
        assert_eq!(timer.advance(1), 501);
        assert_eq!(timer.get_time(), 501);
    }
}
