//! # 处理器（Processor）
//!
//! ## Overview
//! 在宿主机上模拟单个 CPU：每个内核线程背后是一个 OS 线程，
//! 但同一时刻只有 `running` 指向的那个线程可以执行内核代码。
//! “上下文切换”就是把 `running` 交给下一个线程并等待轮到自己。
//!
//! ## Invariants
//! - 任意时刻至多一个内核线程持有 CPU
//! - 内核停机（死锁或内核线程 panic）后，所有等待 CPU 的线程都会 panic，
//!   而不是永远挂起
//!
//! ## Behavior
//! - 线程局部变量 `CURRENT` 记录当前 OS 线程所对应的内核与线程号

use crate::kernel::Kernel;
use crate::sched::Tid;
use alloc::string::String;
use alloc::sync::Arc;
use core::cell::RefCell;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

struct CpuState {
    running: Option<Tid>,
    halted: Option<String>,
}

pub struct Processor {
    state: Mutex<CpuState>,
    turn: Condvar,
}

impl Processor {
    pub fn new(boot: Tid) -> Self {
        Self {
            state: Mutex::new(CpuState {
                running: Some(boot),
                halted: None,
            }),
            turn: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CpuState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn running(&self) -> Option<Tid> {
        self.lock().running
    }

    pub fn halted(&self) -> Option<String> {
        self.lock().halted.clone()
    }

    /// 把 CPU 交给 `to`，然后等待再次轮到 `from`
    ///
    /// ## Panics
    /// - 等待期间内核停机
    pub fn switch(&self, from: Tid, to: Tid) {
        let mut cpu = self.lock();
        cpu.running = Some(to);
        self.turn.notify_all();
        while cpu.running != Some(from) {
            if let Some(reason) = &cpu.halted {
                panic!("kernel halted: {}", reason);
            }
            cpu = self.turn.wait(cpu).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// 新线程第一次运行前等待 CPU，内核已停机时返回 `false`
    pub fn wait_for_turn(&self, me: Tid) -> bool {
        let mut cpu = self.lock();
        loop {
            if cpu.halted.is_some() {
                return false;
            }
            if cpu.running == Some(me) {
                return true;
            }
            cpu = self.turn.wait(cpu).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// 结束的线程交出 CPU，不再等待
    pub fn hand_off(&self, to: Option<Tid>) {
        let mut cpu = self.lock();
        cpu.running = to;
        self.turn.notify_all();
    }

    /// 内核停机：记录原因并唤醒所有等待者，只保留第一次的原因
    pub fn halt(&self, reason: String) {
        log::error!("kernel halted: {}", reason);
        let mut cpu = self.lock();
        if cpu.halted.is_none() {
            cpu.halted = Some(reason);
        }
        cpu.running = None;
        self.turn.notify_all();
    }
}

struct Context {
    kernel: Arc<Kernel>,
    tid: Tid,
}

std::thread_local! {
    static CURRENT: RefCell<Option<Context>> = const { RefCell::new(None) };
}

/// 把当前 OS 线程登记为内核线程 `tid`
pub(crate) fn install(kernel: Arc<Kernel>, tid: Tid) {
    CURRENT.with(|current| *current.borrow_mut() = Some(Context { kernel, tid }));
}

pub(crate) fn uninstall() {
    CURRENT.with(|current| current.borrow_mut().take());
}

pub(crate) fn try_current() -> Option<(Arc<Kernel>, Tid)> {
    CURRENT.with(|current| {
        current
            .borrow()
            .as_ref()
            .map(|ctx| (Arc::clone(&ctx.kernel), ctx.tid))
    })
}

pub(crate) fn try_current_tid() -> Option<Tid> {
    CURRENT
        .try_with(|current| current.borrow().as_ref().map(|ctx| ctx.tid))
        .ok()
        .flatten()
}
