//! # 单处理器临界区与内部可变性封装模块
//!
//! ## Overview
//! 本模块提供调度核心所依赖的 **关中断临界区** 原语：
//!
//! - `IntrMaskingInfo`：每个内核线程各自维护的关中断嵌套计数
//! - `IntrGuard`：`disable_intr()` 返回的 RAII 守卫，析构时恢复中断
//! - `UPIntrFreeCell`：访问期间自动关中断的内部可变性封装
//! - `UPIntrRefMut`：配合 `UPIntrFreeCell` 使用的可变借用守卫
//!
//! ## Assumptions
//! - 同一时刻只有一个内核线程在执行内核代码（单处理器模型）
//! - 任务切换只发生在显式的阻塞 / 让出点，不存在抢占
//! - 宿主机上每个内核线程对应一个 OS 线程，因此中断状态保存在线程局部变量中，
//!   被阻塞的线程恢复运行后看到的仍是自己的嵌套层数
//!
//! ## Safety
//! - `UPIntrFreeCell` 内部使用 `spin::Mutex`，在宿主机上也是真正的 `Sync`
//! - 借用冲突不会自旋等待，而是直接 panic（`RefCell` 语义）：
//!   单处理器上出现冲突只可能是内核自身的 bug
//!
//! ## Invariants
//! - 若某个 `UPIntrFreeCell` 处于借用状态，则当前线程的中断必然被屏蔽
//! - `IntrGuard` / `UPIntrRefMut` drop 时，嵌套层数一定被恢复

use core::cell::RefCell;
use core::ops::{Deref, DerefMut};
use spin::{Mutex, MutexGuard};

/// 关中断嵌套信息
///
/// ## Invariants
/// - `nested_level > 0` 当且仅当当前内核线程处于临界区内
#[derive(Default)]
pub struct IntrMaskingInfo {
    nested_level: usize,
}

std::thread_local! {
    static INTR_MASKING_INFO: RefCell<IntrMaskingInfo> = RefCell::new(IntrMaskingInfo::default());
}

impl IntrMaskingInfo {
    /// 进入临界区（关中断）
    pub fn enter() {
        INTR_MASKING_INFO.with(|info| info.borrow_mut().nested_level += 1);
    }

    /// 离开临界区，最外层离开时恢复中断
    ///
    /// ## Panics
    /// - 没有匹配的 `enter` 时直接 panic
    pub fn exit() {
        INTR_MASKING_INFO.with(|info| {
            let mut info = info.borrow_mut();
            assert!(info.nested_level > 0, "interrupt restore without a matching disable");
            info.nested_level -= 1;
        });
    }

    pub fn nested_level() -> usize {
        INTR_MASKING_INFO.with(|info| info.borrow().nested_level)
    }
}

/// 当前内核线程是否处于关中断状态
pub fn intr_disabled() -> bool {
    IntrMaskingInfo::nested_level() > 0
}

/// 关中断守卫，drop 时恢复
///
/// 用于跨越多个步骤（如“入队 + 阻塞”）的临界区，
/// 内部不持有任何借用，因此可以在守卫存活期间阻塞当前线程。
#[must_use = "dropping the guard immediately restores interrupts"]
pub struct IntrGuard {
    _private: (),
}

/// 关闭中断并返回守卫
pub fn disable_intr() -> IntrGuard {
    IntrMaskingInfo::enter();
    IntrGuard { _private: () }
}

impl Drop for IntrGuard {
    fn drop(&mut self) {
        IntrMaskingInfo::exit();
    }
}

/// 在访问期间自动关中断的 UP 内部可变性封装
///
/// ## Overview
/// 调度图、任务表、定时队列等全局状态都放在这样的 cell 中，
/// `exclusive_access` 返回的守卫就是“已持有临界区”的凭证。
pub struct UPIntrFreeCell<T> {
    inner: Mutex<T>,
}

/// `UPIntrFreeCell` 的可变借用守卫
///
/// ## Invariants
/// - 生命周期内：中断始终被屏蔽
/// - 字段按声明顺序析构：先释放借用，再恢复中断
pub struct UPIntrRefMut<'a, T> {
    guard: MutexGuard<'a, T>,
    _intr: IntrGuard,
}

impl<T> UPIntrFreeCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// 获取内部数据的独占访问权
    ///
    /// ## Behavior
    /// - 屏蔽中断
    /// - 获取可变借用，若已被借用则 panic
    pub fn exclusive_access(&self) -> UPIntrRefMut<'_, T> {
        let intr = disable_intr();
        match self.inner.try_lock() {
            Some(guard) => UPIntrRefMut { guard, _intr: intr },
            None => panic!("UPIntrFreeCell already borrowed"),
        }
    }

    /// 在独占访问会话中执行闭包
    pub fn exclusive_session<F, V>(&self, f: F) -> V
    where
        F: FnOnce(&mut T) -> V,
    {
        let mut inner = self.exclusive_access();
        f(inner.deref_mut())
    }
}

impl<'a, T> Deref for UPIntrRefMut<'a, T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<'a, T> DerefMut for UPIntrRefMut<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_masks_interrupts_until_guard_drops() {
        let cell = UPIntrFreeCell::new(3usize);
        assert!(!intr_disabled());
        {
            let mut v = cell.exclusive_access();
            *v += 1;
            assert!(intr_disabled());
        }
        assert!(!intr_disabled());
        assert_eq!(cell.exclusive_session(|v| *v), 4);
    }

    #[test]
    fn guards_nest() {
        let outer = disable_intr();
        let inner = disable_intr();
        assert_eq!(IntrMaskingInfo::nested_level(), 2);
        drop(inner);
        assert!(intr_disabled());
        drop(outer);
        assert!(!intr_disabled());
    }

    #[test]
    #[should_panic(expected = "already borrowed")]
    fn double_borrow_panics() {
        let cell = UPIntrFreeCell::new(0u8);
        let _first = cell.exclusive_access();
        let _second = cell.exclusive_access();
    }

    #[test]
    #[should_panic(expected = "without a matching disable")]
    fn unbalanced_exit_panics() {
        IntrMaskingInfo::exit();
    }
}
