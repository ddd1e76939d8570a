use cutecore_sched::config::KernelConfig;
use cutecore_sched::sync::{Condvar, Mutex, MutexBlocking};
use cutecore_sched::task::{self, current_tid, TaskStatus};
use cutecore_sched::{console, Kernel, Tid};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

fn record(log: &Arc<spin::Mutex<Vec<String>>>, entry: impl Into<String>) {
    log.lock().push(entry.into());
}

#[test]
fn mutex_hands_lock_to_waiter() {
    console::init();
    let kernel = Kernel::boot(KernelConfig::priority());
    let lock = Arc::new(MutexBlocking::new());
    let counter = Arc::new(AtomicUsize::new(0));

    lock.lock();
    let workers: Vec<Tid> = (0..3)
        .map(|i| {
            let lock = Arc::clone(&lock);
            let counter = Arc::clone(&counter);
            kernel.spawn(&format!("worker-{}", i), move || {
                lock.lock();
                let seen = counter.load(Ordering::Relaxed);
                task::suspend_current_and_run_next();
                counter.store(seen + 1, Ordering::Relaxed);
                lock.unlock();
            })
        })
        .collect();

    task::suspend_current_and_run_next();
    for &tid in workers.iter() {
        assert_eq!(kernel.status(tid), TaskStatus::Blocked);
    }
    lock.unlock();
    assert_eq!(lock.holder(), Some(workers[0]));

    for tid in workers {
        task::join(tid);
    }
    assert_eq!(counter.load(Ordering::Relaxed), 3);
    assert_eq!(lock.holder(), None);
}

#[test]
fn held_mutex_donates_priority_to_its_holder() {
    console::init();
    let kernel = Kernel::boot(KernelConfig::priority());
    let main = current_tid();
    kernel.set_priority(main, 0);
    let lock = Arc::new(MutexBlocking::new());
    let log = Arc::new(spin::Mutex::new(Vec::new()));

    let low = {
        let (lock, log) = (Arc::clone(&lock), Arc::clone(&log));
        kernel.spawn("low", move || {
            lock.lock();
            record(&log, "low locked");
            task::suspend_current_and_run_next();
            let me = current_tid();
            let effective = task::current_kernel().effective_priority(me);
            record(&log, format!("low unlocking at {}", effective));
            lock.unlock();
        })
    };
    kernel.set_priority(low, 0);
    // low 先拿到锁再让出
    task::suspend_current_and_run_next();

    let medium = {
        let log = Arc::clone(&log);
        kernel.spawn("medium", move || record(&log, "medium"))
    };
    kernel.set_priority(medium, 4);
    let high = {
        let (lock, log) = (Arc::clone(&lock), Arc::clone(&log));
        kernel.spawn("high", move || {
            lock.lock();
            record(&log, "high");
            lock.unlock();
        })
    };
    kernel.set_priority(high, 7);

    task::join(high);
    task::join(medium);
    task::join(low);
    assert_eq!(
        *log.lock(),
        vec!["low locked", "low unlocking at 7", "high", "medium"]
    );
    assert_eq!(kernel.effective_priority(main), 0);
}

#[test]
#[should_panic(expected = "already holds")]
fn relocking_a_held_mutex_panics() {
    let _kernel = Kernel::boot(KernelConfig::priority());
    let lock = MutexBlocking::new();
    lock.lock();
    lock.lock();
}

#[test]
#[should_panic(expected = "does not hold")]
fn unlocking_a_free_mutex_panics() {
    let _kernel = Kernel::boot(KernelConfig::priority());
    MutexBlocking::new().unlock();
}

#[test]
fn wake_all_releases_every_sleeper() {
    console::init();
    let kernel = Kernel::boot(KernelConfig::priority());
    let lock = Arc::new(MutexBlocking::new());
    let cv = Arc::new(Condvar::new(lock.clone()));
    let ready = Arc::new(AtomicBool::new(false));
    let woken = Arc::new(AtomicUsize::new(0));

    let sleepers: Vec<Tid> = (0..3)
        .map(|i| {
            let (lock, cv) = (Arc::clone(&lock), Arc::clone(&cv));
            let (ready, woken) = (Arc::clone(&ready), Arc::clone(&woken));
            kernel.spawn(&format!("sleeper-{}", i), move || {
                lock.lock();
                while !ready.load(Ordering::Relaxed) {
                    cv.sleep();
                    assert!(lock.is_held_by_current_thread());
                }
                woken.fetch_add(1, Ordering::Relaxed);
                lock.unlock();
            })
        })
        .collect();

    task::suspend_current_and_run_next();
    lock.lock();
    ready.store(true, Ordering::Relaxed);
    assert_eq!(cv.wake_all(), 3);
    assert_eq!(cv.wake_all(), 0);
    assert!(!cv.wake());
    lock.unlock();

    for tid in sleepers {
        task::join(tid);
    }
    assert_eq!(woken.load(Ordering::Relaxed), 3);
}

#[test]
fn condition_wakes_highest_priority_first() {
    console::init();
    let kernel = Kernel::boot(KernelConfig::priority());
    let lock = Arc::new(MutexBlocking::new());
    let cv = Arc::new(Condvar::new(lock.clone()));
    let log = Arc::new(spin::Mutex::new(Vec::new()));

    let mut sleepers = Vec::new();
    for priority in [2u32, 6, 4] {
        let (lock, cv, log) = (Arc::clone(&lock), Arc::clone(&cv), Arc::clone(&log));
        let tid = kernel.spawn(&format!("p{}", priority), move || {
            lock.lock();
            cv.sleep();
            record(&log, format!("p{}", priority));
            lock.unlock();
        });
        kernel.set_priority(tid, priority);
        sleepers.push(tid);
    }

    task::suspend_current_and_run_next();
    lock.lock();
    assert!(cv.wake());
    assert!(cv.wake());
    lock.unlock();
    task::join(sleepers[1]);
    task::join(sleepers[2]);
    assert_eq!(*log.lock(), vec!["p6", "p4"]);

    lock.lock();
    assert_eq!(cv.wake_all(), 1);
    lock.unlock();
    task::join(sleepers[0]);
    assert_eq!(*log.lock(), vec!["p6", "p4", "p2"]);
}

#[test]
#[should_panic(expected = "without holding its lock")]
fn sleeping_without_the_lock_panics() {
    let _kernel = Kernel::boot(KernelConfig::priority());
    let lock = Arc::new(MutexBlocking::new());
    let cv = Condvar::new(lock);
    cv.sleep();
}

#[test]
fn lottery_kernel_runs_contending_threads() {
    console::init();
    let kernel = Kernel::boot(KernelConfig::lottery().with_seed(2024));
    let lock = Arc::new(MutexBlocking::new());
    let counter = Arc::new(AtomicUsize::new(0));

    let workers: Vec<Tid> = (0..4)
        .map(|i| {
            let (lock, counter) = (Arc::clone(&lock), Arc::clone(&counter));
            let tid = kernel.spawn(&format!("lottery-{}", i), move || {
                for _ in 0..5 {
                    lock.lock();
                    let seen = counter.load(Ordering::Relaxed);
                    task::suspend_current_and_run_next();
                    counter.store(seen + 1, Ordering::Relaxed);
                    lock.unlock();
                    task::suspend_current_and_run_next();
                }
            });
            kernel.set_priority(tid, 10 * (i + 1));
            tid
        })
        .collect();

    for tid in workers {
        task::join(tid);
    }
    assert_eq!(counter.load(Ordering::Relaxed), 20);
}
