//! 单处理器内核线程调度核心
//!
//! 资源队列抽象与两种调度策略（严格优先级 + 捐赠、彩票 + 累加捐赠），
//! 以及直接建立在 park / unpark 原语之上的定时睡眠（`timer::Alarm`）
//! 与条件变量（`sync::Condvar`）。
//!
//! ```no_run
//! use cutecore_sched::{config::KernelConfig, task, Kernel};
//!
//! let kernel = Kernel::boot(KernelConfig::priority());
//! let worker = kernel.spawn("worker", || {
//!     task::current_kernel().alarm().wait_until(1000);
//! });
//! task::join(worker);
//! ```

extern crate alloc;

pub mod config;
pub mod console;
pub mod kernel;
pub mod sched;
pub mod sync;
pub mod task;
pub mod timer;

pub use kernel::Kernel;
pub use sched::{QueueId, Scheduler, ThreadQueue, Tid};
