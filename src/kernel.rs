//! # 内核（Kernel）
//!
//! ## Overview
//! 把调度器、任务表、处理器、时钟与 Alarm 组装在一起：
//!
//! - `scheduler`：整个调度图，唯一的全局临界区
//! - `manager`：线程号 → TCB，就绪队列句柄
//! - `processor`：模拟的单个 CPU
//! - `timer` / `alarm`：时钟与定时睡眠队列
//!
//! ## Assumptions
//! - `boot` 的调用者成为 0 号内核线程 `main`，此后只在内核线程上调用本模块
//!
//! ## Invariants
//! - 正在运行的线程持有就绪队列（通过 `next_thread` 获得），状态为 `Running`
//! - 处于 `Blocked` 的线程一定已登记在某个唤醒源上
//!
//! ## Behavior
//! - 没有可运行线程时，CPU 空转：把时钟推进到最早唤醒时间之后的定时器中断并处理 Alarm，
//!   直到有线程被唤醒；若既没有就绪线程也没有待触发的定时，
//!   而仍有线程被阻塞，则判定为死锁并停机

use crate::config::{KernelConfig, DEFAULT_CONFIG};
use crate::sched::{Scheduler, ThreadQueue, Tid};
use crate::sync::{disable_intr, intr_disabled, UPIntrFreeCell};
use crate::task::processor::{self, Processor};
use crate::task::{TaskControlBlock, TaskManager, TaskStatus};
use crate::timer::{Alarm, Timer};
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

pub struct Kernel {
    config: KernelConfig,
    scheduler: UPIntrFreeCell<Scheduler>,
    manager: UPIntrFreeCell<TaskManager>,
    processor: Processor,
    timer: Timer,
    alarm: Alarm,
}

impl Kernel {
    /// 启动内核，把调用者登记为 `main` 线程
    ///
    /// ## Behavior
    /// - 按配置创建调度器与就绪队列
    /// - `main` 持有就绪队列与自己的 join 队列，状态为 `Running`
    /// - 若调用者此前已是其他内核的线程，登记被替换
    pub fn boot(config: KernelConfig) -> Arc<Self> {
        let mut scheduler = Scheduler::new(config.scheduler, config.lottery_seed);
        let ready_queue = scheduler.new_queue(false);
        let mut manager = TaskManager::new(ready_queue);

        let main = manager.alloc_tid();
        let join_queue = scheduler.new_queue(true);
        scheduler.acquire(join_queue, main);
        scheduler.acquire(ready_queue, main);
        manager.insert(Arc::new(TaskControlBlock::new(
            main,
            "main",
            join_queue,
            TaskStatus::Running,
        )));

        log::info!(
            "kernel booted with {:?} scheduler, timer interval {}",
            config.scheduler,
            config.timer_interval
        );
        let kernel = Arc::new(Self {
            scheduler: UPIntrFreeCell::new(scheduler),
            manager: UPIntrFreeCell::new(manager),
            processor: Processor::new(main),
            timer: Timer::new(),
            alarm: Alarm::new(),
            config,
        });
        processor::install(Arc::clone(&kernel), main);
        kernel
    }

    /// 用进程级默认配置（环境变量）启动内核
    pub fn boot_default() -> Arc<Self> {
        Self::boot(DEFAULT_CONFIG.clone())
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// 调度图所在的临界区
    pub fn scheduler(&self) -> &UPIntrFreeCell<Scheduler> {
        &self.scheduler
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn alarm(&self) -> &Alarm {
        &self.alarm
    }

    pub fn processor(&self) -> &Processor {
        &self.processor
    }

    /// 新建一个属于本内核的资源队列
    pub fn new_thread_queue(self: &Arc<Self>, transfer: bool) -> ThreadQueue {
        ThreadQueue::new(Arc::clone(self), transfer)
    }

    pub fn status(&self, tid: Tid) -> TaskStatus {
        self.task(tid).status()
    }

    pub fn set_priority(&self, tid: Tid, priority: u32) {
        self.scheduler.exclusive_access().set_priority(tid, priority);
    }

    pub fn priority(&self, tid: Tid) -> u32 {
        self.scheduler.exclusive_access().priority(tid)
    }

    pub fn effective_priority(&self, tid: Tid) -> u64 {
        self.scheduler.exclusive_access().effective_priority(tid)
    }

    /// 创建一个新的内核线程并放入就绪队列
    ///
    /// ## Behavior
    /// - 新线程持有自己的 join 队列（可转移），join 者因此向它捐赠
    /// - 新线程不会立即运行，要等当前线程阻塞或让出
    pub fn spawn<F>(self: &Arc<Self>, name: &str, f: F) -> Tid
    where
        F: FnOnce() + Send + 'static,
    {
        let _intr = disable_intr();
        let tid = self.manager.exclusive_access().alloc_tid();
        let join_queue = self.scheduler.exclusive_session(|sched| {
            let join_queue = sched.new_queue(true);
            sched.acquire(join_queue, tid);
            join_queue
        });
        let task = Arc::new(TaskControlBlock::new(
            tid,
            name,
            join_queue,
            TaskStatus::Blocked,
        ));

        let kernel = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name(String::from(name))
            .spawn(move || kernel.thread_entry(tid, f))
            .unwrap_or_else(|err| panic!("failed to spawn kernel thread {}: {}", tid, err));
        task.inner_exclusive_access().handle = Some(handle);
        self.manager.exclusive_access().insert(task);

        log::debug!("spawned thread {} ({})", tid, name);
        self.add_task(tid);
        tid
    }

    fn thread_entry<F: FnOnce()>(self: Arc<Self>, tid: Tid, f: F) {
        processor::install(Arc::clone(&self), tid);
        if self.processor.wait_for_turn(tid) {
            match panic::catch_unwind(AssertUnwindSafe(f)) {
                Ok(()) => self.exit_current(tid),
                Err(payload) => self
                    .processor
                    .halt(format!("thread {} panicked: {}", tid, panic_message(&*payload))),
            }
        }
        processor::uninstall();
    }

    /// 唤醒线程：标记为 `Ready` 并放入就绪队列
    ///
    /// ## Panics
    /// - 调用者未关中断
    /// - 线程已经就绪或已经结束
    pub fn add_task(&self, tid: Tid) {
        assert!(intr_disabled(), "wakeup_task requires interrupts disabled");
        let task = self.task(tid);
        {
            let mut inner = task.inner_exclusive_access();
            assert!(
                !matches!(inner.task_status, TaskStatus::Ready | TaskStatus::Finished),
                "thread {} cannot be readied from {:?}",
                tid,
                inner.task_status
            );
            inner.task_status = TaskStatus::Ready;
        }
        let ready_queue = self.manager.exclusive_access().ready_queue();
        self.scheduler
            .exclusive_access()
            .wait_for_access(ready_queue, tid);
    }

    /// 从就绪队列取出下一个线程；没有时空转推进时钟，直到有线程被唤醒
    /// 或者再也不会有线程被唤醒
    pub fn fetch_task(&self) -> Option<Tid> {
        let ready_queue = self.manager.exclusive_access().ready_queue();
        loop {
            let next = self.scheduler.exclusive_access().next_thread(ready_queue);
            if next.is_some() {
                return next;
            }
            let Some(deadline) = self.alarm.next_deadline() else {
                return None;
            };
            // 直接跳到最早唤醒时间之后的第一个中断
            let interval = self.config.timer_interval;
            let intervals = deadline
                .saturating_sub(self.timer.get_time())
                .div_ceil(interval)
                .max(1);
            let now = self.timer.advance(intervals.saturating_mul(interval));
            self.alarm.wake_expired(self, now);
        }
    }

    pub(crate) fn block_current(&self, me: Tid) {
        assert!(intr_disabled(), "blocking requires interrupts disabled");
        self.task(me).inner_exclusive_access().task_status = TaskStatus::Blocked;
        self.run_next(me);
    }

    pub(crate) fn yield_current(&self, me: Tid) {
        let _intr = disable_intr();
        self.add_task(me);
        self.run_next(me);
    }

    fn run_next(&self, me: Tid) {
        let Some(next) = self.fetch_task() else {
            let reason = format!("deadlock: thread {} blocked with nothing runnable", me);
            self.processor.halt(reason.clone());
            panic!("kernel halted: {}", reason);
        };
        self.task(next).inner_exclusive_access().task_status = TaskStatus::Running;
        if next != me {
            log::debug!("switch {} -> {}", me, next);
        }
        self.processor.switch(me, next);
    }

    /// 等待 `target` 结束
    ///
    /// ## Panics
    /// - 线程 join 自己
    pub(crate) fn join(&self, me: Tid, target: Tid) {
        assert_ne!(me, target, "thread {} cannot join itself", me);
        let task = self.task(target);
        {
            let _intr = disable_intr();
            let (status, join_queue) = {
                let inner = task.inner_exclusive_access();
                (inner.task_status, inner.join_queue)
            };
            if status != TaskStatus::Finished {
                self.scheduler
                    .exclusive_access()
                    .wait_for_access(join_queue, me);
                self.block_current(me);
            }
        }
        let handle = task.inner_exclusive_access().handle.take();
        if let Some(handle) = handle {
            // 目标线程已交出 CPU，只剩 OS 线程的收尾
            if let Err(payload) = handle.join() {
                log::warn!(
                    "thread {} exited abnormally: {}",
                    target,
                    panic_message(&*payload)
                );
            }
        }
    }

    /// 当前线程结束
    ///
    /// ## Behavior
    /// - 唤醒全部 join 者，丢弃调度状态与 join 队列
    /// - 把 CPU 交给下一个线程；交出之后不再触碰任何内核状态
    fn exit_current(&self, me: Tid) {
        let _intr = disable_intr();
        let join_queue = {
            let task = self.task(me);
            let mut inner = task.inner_exclusive_access();
            inner.task_status = TaskStatus::Finished;
            inner.join_queue
        };
        loop {
            let joiner = self.scheduler.exclusive_access().next_thread(join_queue);
            match joiner {
                Some(joiner) => self.add_task(joiner),
                None => break,
            }
        }
        self.scheduler.exclusive_session(|sched| {
            sched.remove_thread(me);
            sched.destroy_queue(join_queue);
        });
        log::debug!("thread {} finished", me);

        match self.fetch_task() {
            Some(next) => {
                self.task(next).inner_exclusive_access().task_status = TaskStatus::Running;
                self.processor.hand_off(Some(next));
            }
            None => {
                let blocked = self.manager.exclusive_access().count(TaskStatus::Blocked);
                if blocked > 0 {
                    self.processor.halt(format!(
                        "deadlock: {} threads blocked with nothing runnable",
                        blocked
                    ));
                } else {
                    self.processor.hand_off(None);
                }
            }
        }
    }

    /// 定时器中断入口：推进时钟一个间隔，然后交给 Alarm 处理
    pub fn timer_interrupt(&self) {
        self.timer.advance(self.config.timer_interval);
        self.alarm.timer_interrupt();
    }

    fn task(&self, tid: Tid) -> Arc<TaskControlBlock> {
        self.manager.exclusive_access().get(tid)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        String::from(*msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        String::from("<non-string panic>")
    }
}
