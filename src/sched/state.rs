//! # 调度图的数据结构
//!
//! ## Overview
//! 线程调度状态与资源队列都存放在扁平的表中，用整数句柄互相引用：
//!
//! ```text
//! ThreadState.held ──► QueueState.waiters ──► ThreadState.held ──► ...
//! ThreadState.waiting_on ──► QueueState.holder
//! ```
//!
//! 这样“线程 → 持有的队列 → 等待者 → 它们持有的队列”这张带回边的图
//! 不需要任何原生指针或引用计数环。
//!
//! ## Invariants
//! - 线程 `t` 在队列 `q` 的 `waiters` 中 ⇔ `t.waiting_on == Some(q)`
//! - `q.holder == Some(t)` ⇔ `q ∈ t.held`
//! - 队列的持有者永远不会同时出现在它的 `waiters` 中

use super::{QueueId, Tid};
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

/// 一个线程的调度状态
#[derive(Debug, Clone)]
pub struct ThreadState {
    /// 基础优先级（彩票调度下为票数）
    pub priority: u32,
    /// 计入捐赠后的有效值
    pub effective: u64,
    /// 当前持有的资源队列
    pub held: BTreeSet<QueueId>,
    /// 当前正在等待的资源队列（至多一个）
    pub waiting_on: Option<QueueId>,
    /// 入队戳，同优先级下越小越先被选中
    pub enqueued_at: u64,
}

impl ThreadState {
    pub fn new(priority: u32) -> Self {
        Self {
            priority,
            effective: priority as u64,
            held: BTreeSet::new(),
            waiting_on: None,
            enqueued_at: 0,
        }
    }
}

/// 一个资源队列
#[derive(Debug, Clone)]
pub struct QueueState {
    pub holder: Option<Tid>,
    /// 按到达顺序排列的等待者
    pub waiters: Vec<Tid>,
    pub transfer: bool,
    /// 等待者有效票数之和，仅彩票调度维护
    pub total_tickets: u64,
}

impl QueueState {
    fn new(transfer: bool) -> Self {
        Self {
            holder: None,
            waiters: Vec::new(),
            transfer,
            total_tickets: 0,
        }
    }
}

/// 线程状态表 + 队列槽位表
pub struct Graph {
    default_priority: u32,
    threads: BTreeMap<Tid, ThreadState>,
    queues: Vec<Option<QueueState>>,
    free_slots: Vec<usize>,
    stamp: u64,
}

impl Graph {
    pub fn new(default_priority: u32) -> Self {
        Self {
            default_priority,
            threads: BTreeMap::new(),
            queues: Vec::new(),
            free_slots: Vec::new(),
            stamp: 0,
        }
    }

    /// 取得线程状态，不存在时按默认优先级创建
    pub fn thread_entry(&mut self, tid: Tid) -> &mut ThreadState {
        let default = self.default_priority;
        self.threads
            .entry(tid)
            .or_insert_with(|| ThreadState::new(default))
    }

    /// 取得已存在的线程状态
    ///
    /// ## Panics
    /// - 线程从未进入过调度图
    pub fn thread(&self, tid: Tid) -> &ThreadState {
        match self.threads.get(&tid) {
            Some(state) => state,
            None => panic!("no scheduling state for thread {}", tid),
        }
    }

    pub fn thread_mut(&mut self, tid: Tid) -> &mut ThreadState {
        match self.threads.get_mut(&tid) {
            Some(state) => state,
            None => panic!("no scheduling state for thread {}", tid),
        }
    }

    pub fn contains_thread(&self, tid: Tid) -> bool {
        self.threads.contains_key(&tid)
    }

    pub fn remove_thread_state(&mut self, tid: Tid) -> Option<ThreadState> {
        self.threads.remove(&tid)
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub fn alloc_queue(&mut self, transfer: bool) -> QueueId {
        let queue = Some(QueueState::new(transfer));
        if let Some(slot) = self.free_slots.pop() {
            self.queues[slot] = queue;
            QueueId(slot)
        } else {
            self.queues.push(queue);
            QueueId(self.queues.len() - 1)
        }
    }

    pub fn free_queue(&mut self, id: QueueId) {
        self.queues[id.0] = None;
        self.free_slots.push(id.0);
    }

    /// ## Panics
    /// - 句柄指向已销毁或从未分配的队列
    pub fn queue(&self, id: QueueId) -> &QueueState {
        match self.queues.get(id.0) {
            Some(Some(queue)) => queue,
            _ => panic!("queue {:?} does not exist", id),
        }
    }

    pub fn queue_mut(&mut self, id: QueueId) -> &mut QueueState {
        match self.queues.get_mut(id.0) {
            Some(Some(queue)) => queue,
            _ => panic!("queue {:?} does not exist", id),
        }
    }

    /// 单调递增的入队戳，代表墙钟意义上的先后顺序
    pub fn next_stamp(&mut self) -> u64 {
        self.stamp += 1;
        self.stamp
    }

    /// 把线程放入队列的等待集合
    pub fn push_waiter(&mut self, id: QueueId, tid: Tid) {
        let stamp = self.next_stamp();
        let state = self.thread_entry(tid);
        state.waiting_on = Some(id);
        state.enqueued_at = stamp;
        self.queue_mut(id).waiters.push(tid);
    }

    /// 把线程移出队列的等待集合，返回它原先是否在其中
    pub fn remove_waiter(&mut self, id: QueueId, tid: Tid) -> bool {
        let queue = self.queue_mut(id);
        let Some(pos) = queue.waiters.iter().position(|&w| w == tid) else {
            return false;
        };
        queue.waiters.remove(pos);
        let state = self.thread_mut(tid);
        if state.waiting_on == Some(id) {
            state.waiting_on = None;
        }
        true
    }

    /// 某队列全部等待者有效值之和
    pub fn waiters_sum(&self, id: QueueId) -> u64 {
        self.queue(id)
            .waiters
            .iter()
            .map(|&w| self.thread(w).effective)
            .sum()
    }

    /// 沿捐赠链递归时的深度检查
    ///
    /// 一条无环的链最多经过所有已知线程各一次。
    pub fn check_depth(&self, depth: usize, tid: Tid) {
        assert!(
            depth <= self.threads.len(),
            "donation cycle detected through thread {}",
            tid
        );
    }
}
