//! # 内核同步原语模块（sync）
//!
//! ## Overview
//! - `up`：单处理器临界区（关中断）与内部可变性封装
//! - `mutex`：互斥锁接口及带优先级捐赠的阻塞锁
//! - `condvar`：建立在资源队列 park / unpark 之上的条件变量
//!
//! ## Assumptions
//! - 单处理器，不存在真正的并行，只会在显式调度点切换
//! - 所有同步原语都依赖 `up` 提供的临界区语义
//!
//! ## Invariants
//! - 在阻塞当前线程前，其内部状态必然已经登记到某个唤醒源上
//! - 被加入等待队列的线程一定处于不可运行状态

mod condvar;
mod mutex;
mod up;

/// 条件变量
pub use condvar::Condvar;

/// 互斥锁抽象与实现
pub use mutex::{Mutex, MutexBlocking};

/// 单处理器临界区工具
pub use up::{disable_intr, intr_disabled, IntrGuard, IntrMaskingInfo, UPIntrFreeCell, UPIntrRefMut};
