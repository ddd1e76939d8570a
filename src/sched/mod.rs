//! # 调度核心（sched）
//!
//! ## Overview
//! 本模块实现资源队列抽象及其两种调度策略：
//!
//! - 严格优先级 + 最大值捐赠（`priority`）
//! - 彩票调度 + 累加捐赠（`lottery`）
//!
//! 所有线程调度状态与资源队列组成一张“谁持有什么、谁在等谁”的图，
//! 由 `Scheduler` 统一持有。`Scheduler` 总是放在内核的
//! `UPIntrFreeCell` 中，因此任何 `&mut Scheduler` 都意味着调用者已处于临界区。
//!
//! ## Assumptions
//! - 单处理器，调度图的所有修改都发生在同一把全局临界区内
//! - 调用者不会构造所有权环（线程间接等待自己），出现时视为契约违反
//!
//! ## Invariants
//! - 见 `state` 模块；此外每个公开操作返回时，所有线程的有效值都已按
//!   当前策略的定义重新算好
//!
//! ## Behavior
//! - 从空队列中选择返回 `None`，不是错误
//! - 越界的优先级 / 票数属于契约违反，直接 panic

mod lottery;
mod priority;
mod queue;
mod state;

pub use lottery::LotteryPolicy;
pub use priority::PriorityPolicy;
pub use queue::ThreadQueue;
pub use state::ThreadState;

use crate::config::SchedulerKind;
use alloc::vec::Vec;
use core::fmt;
use state::Graph;

/// 线程标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tid(pub usize);

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 资源队列句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueId(usize);

/// 选择策略接口
///
/// 两种策略共享同一套队列 / 所有权机制，只在“如何选出下一个线程”
/// 与“如何由捐赠算出有效值”上不同。
pub trait SchedPolicy {
    fn min_priority(&self) -> u32;
    fn max_priority(&self) -> u32;
    fn default_priority(&self) -> u32;
    /// 选出将被移出的等待者，可以推进内部状态（如随机源）
    fn select(&mut self, graph: &Graph, queue: QueueId) -> Option<Tid>;
    /// 返回 `select` 会选出的同一个线程，但不修改任何状态
    fn peek(&self, graph: &Graph, queue: QueueId) -> Option<Tid>;
    /// 重算线程的有效值，并按策略沿等待链传播
    fn recompute(&self, graph: &mut Graph, tid: Tid);
    /// 队列等待集合发生变化后的钩子
    fn waiters_changed(&self, _graph: &mut Graph, _queue: QueueId) {}
}

/// 封闭的策略集合
pub enum Policy {
    Priority(PriorityPolicy),
    Lottery(LotteryPolicy),
}

impl Policy {
    fn as_dyn(&self) -> &dyn SchedPolicy {
        match self {
            Policy::Priority(p) => p,
            Policy::Lottery(p) => p,
        }
    }

    fn as_dyn_mut(&mut self) -> &mut dyn SchedPolicy {
        match self {
            Policy::Priority(p) => p,
            Policy::Lottery(p) => p,
        }
    }
}

/// 调度器：策略 + 调度图
pub struct Scheduler {
    kind: SchedulerKind,
    policy: Policy,
    graph: Graph,
}

impl Scheduler {
    /// 创建调度器
    ///
    /// ## Parameters
    /// - `kind`：严格优先级或彩票调度
    /// - `seed`：彩票调度的随机种子，`None` 表示取自系统熵
    pub fn new(kind: SchedulerKind, seed: Option<u64>) -> Self {
        let policy = match kind {
            SchedulerKind::Priority => Policy::Priority(PriorityPolicy::new()),
            SchedulerKind::Lottery => Policy::Lottery(LotteryPolicy::new(seed)),
        };
        let graph = Graph::new(policy.as_dyn().default_priority());
        Self {
            kind,
            policy,
            graph,
        }
    }

    pub fn kind(&self) -> SchedulerKind {
        self.kind
    }

    /// 新建一个资源队列
    ///
    /// ## Parameters
    /// - `transfer`：是否把等待者的优先级 / 票数转移给持有者
    pub fn new_queue(&mut self, transfer: bool) -> QueueId {
        let id = self.graph.alloc_queue(transfer);
        log::trace!("new queue {:?} (transfer = {})", id, transfer);
        id
    }

    /// 销毁资源队列并释放其持有者
    ///
    /// ## Panics
    /// - 队列上仍有等待的线程
    pub fn destroy_queue(&mut self, queue: QueueId) {
        assert!(
            self.graph.queue(queue).waiters.is_empty(),
            "destroying queue {:?} with parked waiters",
            queue
        );
        if let Some(holder) = self.graph.queue(queue).holder {
            self.release(queue, holder);
        }
        self.graph.free_queue(queue);
    }

    /// 取得（必要时创建）线程的调度状态
    pub fn thread_state(&mut self, tid: Tid) -> &ThreadState {
        self.graph.thread_entry(tid)
    }

    /// 线程结束时丢弃它的调度状态
    ///
    /// ## Behavior
    /// - 若仍在等待某队列，先离开该队列（持有者因此失去捐赠）
    /// - 释放它持有的全部队列
    pub fn remove_thread(&mut self, tid: Tid) {
        if !self.graph.contains_thread(tid) {
            return;
        }
        if let Some(waiting) = self.graph.thread(tid).waiting_on {
            self.leave(waiting, tid);
        }
        let held: Vec<QueueId> = self.graph.thread(tid).held.iter().copied().collect();
        for queue in held {
            self.release(queue, tid);
        }
        self.graph.remove_thread_state(tid);
    }

    /// 线程等待访问某个资源队列
    ///
    /// ## Behavior
    /// - 若线程正持有该队列，先释放（不支持重入式等待）
    /// - 加入等待集合并记录入队戳
    /// - 队列可转移且有持有者时，重算持有者
    ///
    /// ## Panics
    /// - 线程已经在等待另一个队列
    pub fn wait_for_access(&mut self, queue: QueueId, tid: Tid) {
        match self.graph.thread_entry(tid).waiting_on {
            Some(current) if current == queue => return,
            Some(current) => panic!(
                "thread {} waits on {:?} while still parked on {:?}",
                tid, queue, current
            ),
            None => {}
        }
        if self.graph.queue(queue).holder == Some(tid) {
            self.release(queue, tid);
        }
        self.assert_no_cycle(queue, tid);

        self.graph.push_waiter(queue, tid);
        self.policy.as_dyn().waiters_changed(&mut self.graph, queue);
        log::trace!("thread {} waits for {:?}", tid, queue);

        let state = self.graph.queue(queue);
        if let (true, Some(holder)) = (state.transfer, state.holder) {
            self.policy.as_dyn().recompute(&mut self.graph, holder);
        }
    }

    /// 选出并移除下一个线程，使其成为队列的持有者
    pub fn next_thread(&mut self, queue: QueueId) -> Option<Tid> {
        let next = self.policy.as_dyn_mut().select(&self.graph, queue)?;
        self.acquire(queue, next);
        Some(next)
    }

    /// 返回 `next_thread` 将会选出的线程，不修改状态
    pub fn pick_next_thread(&self, queue: QueueId) -> Option<Tid> {
        self.policy.as_dyn().peek(&self.graph, queue)
    }

    /// 线程获得资源队列
    ///
    /// ## Behavior
    /// - 原持有者（若不是该线程）先释放
    /// - 线程离开等待集合，成为持有者，并完整重算其有效值
    ///
    /// ## Panics
    /// - 可转移队列的某个等待者正间接持有线程所等待的资源（所有权环）
    pub fn acquire(&mut self, queue: QueueId, tid: Tid) {
        self.graph.thread_entry(tid);
        let holder = self.graph.queue(queue).holder;
        if holder == Some(tid) {
            return;
        }
        self.assert_acquire_no_cycle(queue, tid);
        if let Some(holder) = holder {
            self.release(queue, holder);
        }
        if self.graph.remove_waiter(queue, tid) {
            self.policy.as_dyn().waiters_changed(&mut self.graph, queue);
        }

        self.graph.queue_mut(queue).holder = Some(tid);
        self.graph.thread_mut(tid).held.insert(queue);
        log::trace!("thread {} acquires {:?}", tid, queue);
        self.policy.as_dyn().recompute(&mut self.graph, tid);
    }

    /// 线程释放资源队列，失去来自该队列的捐赠
    ///
    /// 释放一个并未持有的队列是空操作。
    pub(crate) fn release(&mut self, queue: QueueId, tid: Tid) {
        if !self.graph.contains_thread(tid) || !self.graph.thread_mut(tid).held.remove(&queue) {
            return;
        }
        self.graph.queue_mut(queue).holder = None;
        log::trace!("thread {} releases {:?}", tid, queue);
        self.policy.as_dyn().recompute(&mut self.graph, tid);
    }

    /// 沿可转移队列的持有者链检查 `tid` 是否会间接等待自己
    fn assert_no_cycle(&self, queue: QueueId, tid: Tid) {
        assert!(
            !self.chain_reaches(queue, |holder| holder == tid),
            "donation cycle: thread {} would wait on itself through {:?}",
            tid,
            queue
        );
    }

    /// 从 `queue` 出发沿可转移队列的持有者链前进，
    /// 链上出现满足 `hit` 的线程时返回 `true`
    ///
    /// ## Panics
    /// - 链长超过已知线程数，说明图中已经存在环
    fn chain_reaches(&self, queue: QueueId, hit: impl Fn(Tid) -> bool) -> bool {
        let mut cursor = queue;
        for _ in 0..=self.graph.thread_count() {
            let state = self.graph.queue(cursor);
            let Some(holder) = state.holder.filter(|_| state.transfer) else {
                return false;
            };
            if hit(holder) {
                return true;
            }
            match self.waiting_on(holder) {
                Some(next) => cursor = next,
                None => return false,
            }
        }
        panic!("donation cycle behind {:?}", queue);
    }

    /// 获得可转移队列后，其等待者会向 `tid` 捐赠；
    /// 若 `tid` 自己的等待链又回到这些等待者，就构成了环
    fn assert_acquire_no_cycle(&self, queue: QueueId, tid: Tid) {
        let state = self.graph.queue(queue);
        if !state.transfer {
            return;
        }
        let Some(waiting) = self.waiting_on(tid).filter(|&w| w != queue) else {
            return;
        };
        let waiters = &state.waiters;
        assert!(
            !self.chain_reaches(waiting, |holder| holder != tid && waiters.contains(&holder)),
            "donation cycle: thread {} acquires {:?} while waiting behind its waiters",
            tid,
            queue
        );
    }

    /// 线程离开等待集合而不获得队列
    fn leave(&mut self, queue: QueueId, tid: Tid) {
        if !self.graph.remove_waiter(queue, tid) {
            return;
        }
        self.policy.as_dyn().waiters_changed(&mut self.graph, queue);
        let state = self.graph.queue(queue);
        if let (true, Some(holder)) = (state.transfer, state.holder) {
            self.policy.as_dyn().recompute(&mut self.graph, holder);
        }
    }

    pub fn priority(&mut self, tid: Tid) -> u32 {
        self.graph.thread_entry(tid).priority
    }

    pub fn effective_priority(&mut self, tid: Tid) -> u64 {
        self.graph.thread_entry(tid).effective
    }

    /// 设置基础优先级（彩票调度下为票数）
    ///
    /// ## Panics
    /// - 超出当前策略的合法范围
    pub fn set_priority(&mut self, tid: Tid, priority: u32) {
        let policy = self.policy.as_dyn();
        assert!(
            (policy.min_priority()..=policy.max_priority()).contains(&priority),
            "priority {} out of range [{}, {}]",
            priority,
            policy.min_priority(),
            policy.max_priority()
        );
        let state = self.graph.thread_entry(tid);
        if state.priority == priority {
            return;
        }
        state.priority = priority;
        policy.recompute(&mut self.graph, tid);
    }

    /// 基础优先级加一，已到上限时返回 `false`
    pub fn increase_priority(&mut self, tid: Tid) -> bool {
        let priority = self.priority(tid);
        if priority == self.policy.as_dyn().max_priority() {
            return false;
        }
        self.set_priority(tid, priority + 1);
        true
    }

    /// 基础优先级减一，已到下限时返回 `false`
    pub fn decrease_priority(&mut self, tid: Tid) -> bool {
        let priority = self.priority(tid);
        if priority == self.policy.as_dyn().min_priority() {
            return false;
        }
        self.set_priority(tid, priority - 1);
        true
    }

    pub fn holder(&self, queue: QueueId) -> Option<Tid> {
        self.graph.queue(queue).holder
    }

    /// 按到达顺序返回等待者
    pub fn waiters(&self, queue: QueueId) -> Vec<Tid> {
        self.graph.queue(queue).waiters.clone()
    }

    pub fn is_transfer(&self, queue: QueueId) -> bool {
        self.graph.queue(queue).transfer
    }

    pub fn waiting_on(&self, tid: Tid) -> Option<QueueId> {
        if !self.graph.contains_thread(tid) {
            return None;
        }
        self.graph.thread(tid).waiting_on
    }

    pub fn held_queues(&self, tid: Tid) -> Vec<QueueId> {
        if !self.graph.contains_thread(tid) {
            return Vec::new();
        }
        self.graph.thread(tid).held.iter().copied().collect()
    }
}
