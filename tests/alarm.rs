use cutecore_sched::config::KernelConfig;
use cutecore_sched::task::{self, TaskStatus};
use cutecore_sched::timer::get_time;
use cutecore_sched::{console, Kernel};
use std::sync::Arc;

#[test]
fn non_positive_wait_returns_immediately() {
    console::init();
    let kernel = Kernel::boot(KernelConfig::priority());
    kernel.alarm().wait_until(0);
    kernel.alarm().wait_until(-25);
    assert_eq!(kernel.timer().get_time(), 0);
    assert_eq!(kernel.alarm().pending(), 0);
}

#[test]
fn sleeping_main_thread_never_wakes_early() {
    console::init();
    let kernel = Kernel::boot(KernelConfig::priority().with_timer_interval(500));
    kernel.alarm().wait_until(1200);
    let now = kernel.timer().get_time();
    assert!(now >= 1200, "woke at {}", now);
    assert_eq!(now, 1500);
}

#[test]
fn idle_cpu_jumps_to_the_next_deadline() {
    console::init();
    let kernel = Kernel::boot(KernelConfig::priority().with_timer_interval(100));
    let ticks = 1_000_000_000_050;
    kernel.alarm().wait_until(ticks);
    // 时钟停在唤醒时间之后的第一个中断上
    assert_eq!(kernel.timer().get_time(), 1_000_000_000_100);
    assert_eq!(kernel.alarm().pending(), 0);
}

#[test]
fn sleepers_wake_in_deadline_order() {
    console::init();
    let kernel = Kernel::boot(KernelConfig::priority().with_timer_interval(100));
    let order = Arc::new(spin::Mutex::new(Vec::new()));

    let mut sleepers = Vec::new();
    for (name, ticks) in [("long", 3000), ("short", 1000), ("medium", 2000)] {
        let order = Arc::clone(&order);
        sleepers.push(kernel.spawn(name, move || {
            let start = get_time();
            task::current_kernel().alarm().wait_until(ticks);
            assert!(get_time() >= start + ticks as u64);
            order.lock().push(name);
        }));
    }
    for tid in sleepers.iter().copied() {
        task::join(tid);
        assert_eq!(kernel.status(tid), TaskStatus::Finished);
    }

    assert_eq!(*order.lock(), vec!["short", "medium", "long"]);
    assert_eq!(kernel.alarm().pending(), 0);
    assert_eq!(kernel.alarm().next_deadline(), None);
}

#[test]
fn timer_interrupt_wakes_expired_sleepers() {
    console::init();
    let kernel = Kernel::boot(KernelConfig::priority());
    let sleeper = kernel.spawn("sleeper", || {
        task::current_kernel().alarm().wait_until(100);
    });

    // 让 sleeper 先运行并登记定时
    task::suspend_current_and_run_next();
    assert_eq!(kernel.status(sleeper), TaskStatus::Blocked);
    assert_eq!(kernel.alarm().pending(), 1);
    assert_eq!(kernel.alarm().next_deadline(), Some(100));

    kernel.timer_interrupt();
    assert_eq!(kernel.timer().get_time(), 500);
    assert_eq!(kernel.alarm().pending(), 0);
    assert_eq!(kernel.status(sleeper), TaskStatus::Ready);

    task::join(sleeper);
    assert_eq!(kernel.status(sleeper), TaskStatus::Finished);
}

#[test]
fn timer_interrupt_yields_to_ready_threads() {
    console::init();
    let kernel = Kernel::boot(KernelConfig::priority());
    let ran = Arc::new(spin::Mutex::new(false));
    let flag = Arc::clone(&ran);
    let worker = kernel.spawn("worker", move || *flag.lock() = true);

    kernel.timer_interrupt();
    assert!(*ran.lock());
    assert_eq!(kernel.status(worker), TaskStatus::Finished);
    task::join(worker);
}
