//! # 线程运行时（task）
//!
//! ## Overview
//! 调度核心之外的“线程管理底座”：提供线程身份、`park`（阻塞）、
//! `ready`（唤醒）与 `yield`（让出）这几个原语，
//! 同步原语层（`sync`）与定时器（`timer`）只通过这里的函数与线程打交道。
//!
//! ## Assumptions
//! - 这些函数只能在内核线程上调用（`Kernel::boot` 的调用者或 `spawn` 出的线程）
//!
//! ## Behavior
//! - `block_current_and_run_next` 与 `wakeup_task` 要求调用者已关中断，
//!   这是调用约定而不是自动保证

mod manager;
pub(crate) mod processor;
mod task;

pub use manager::TaskManager;
pub use processor::Processor;
pub use task::{TaskControlBlock, TaskControlBlockInner, TaskStatus};

use crate::kernel::Kernel;
use crate::sched::Tid;
use alloc::sync::Arc;

/// 当前内核线程所属的内核
///
/// ## Panics
/// - 当前 OS 线程不是内核线程
pub fn current_kernel() -> Arc<Kernel> {
    match processor::try_current() {
        Some((kernel, _)) => kernel,
        None => panic!("not running on a kernel thread"),
    }
}

/// 当前内核线程的线程号
pub fn current_tid() -> Tid {
    match processor::try_current() {
        Some((_, tid)) => tid,
        None => panic!("not running on a kernel thread"),
    }
}

/// 若当前 OS 线程是内核线程，返回其线程号
pub fn try_current_tid() -> Option<Tid> {
    processor::try_current_tid()
}

/// 阻塞当前线程并切换到下一个可运行线程
///
/// 调用者必须已经把当前线程登记到某个唤醒源上（队列、定时器等）。
pub fn block_current_and_run_next() {
    let (kernel, tid) = current();
    kernel.block_current(tid);
}

/// 让出 CPU：当前线程重新进入就绪队列，再挑选下一个线程运行
pub fn suspend_current_and_run_next() {
    let (kernel, tid) = current();
    kernel.yield_current(tid);
}

/// 唤醒一个被阻塞的线程，放入就绪队列
pub fn wakeup_task(tid: Tid) {
    current_kernel().add_task(tid);
}

/// 创建一个新的内核线程
pub fn spawn<F>(name: &str, f: F) -> Tid
where
    F: FnOnce() + Send + 'static,
{
    current_kernel().spawn(name, f)
}

/// 等待线程结束，等待期间向其捐赠
pub fn join(target: Tid) {
    let (kernel, tid) = current();
    kernel.join(tid, target);
}

/// 当前线程的基础优先级加一，已到上限时返回 `false`
pub fn increase_priority() -> bool {
    let (kernel, tid) = current();
    let increased = kernel.scheduler().exclusive_access().increase_priority(tid);
    increased
}

/// 当前线程的基础优先级减一，已到下限时返回 `false`
pub fn decrease_priority() -> bool {
    let (kernel, tid) = current();
    let decreased = kernel.scheduler().exclusive_access().decrease_priority(tid);
    decreased
}

fn current() -> (Arc<Kernel>, Tid) {
    match processor::try_current() {
        Some(current) => current,
        None => panic!("not running on a kernel thread"),
    }
}
