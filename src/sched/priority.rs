//! # 严格优先级策略
//!
//! ## Overview
//! - 选择：有效优先级最高的等待者；同优先级时入队戳最小者（等待最久者）胜出
//! - 捐赠：线程的有效优先级 = max(基础优先级, 其持有的每个可转移队列当前队首的有效优先级)
//!
//! ## Invariants
//! - `effective >= priority`
//! - 有效优先级变化后，若线程正在等待一个有持有者的可转移队列，
//!   则沿等待链继续重算持有者；值不变时传播停止

use super::state::Graph;
use super::{QueueId, SchedPolicy, Tid};
use crate::config::{PRIORITY_DEFAULT, PRIORITY_MAX, PRIORITY_MIN};
use core::cmp::Ordering;

#[derive(Debug, Default, Clone)]
pub struct PriorityPolicy;

impl PriorityPolicy {
    pub fn new() -> Self {
        Self
    }

    /// 比较两个等待者，返回 `Greater` 表示 `a` 应当先于 `b` 被选中
    fn rank(graph: &Graph, a: Tid, b: Tid) -> Ordering {
        let (sa, sb) = (graph.thread(a), graph.thread(b));
        sa.effective
            .cmp(&sb.effective)
            .then_with(|| sb.enqueued_at.cmp(&sa.enqueued_at))
    }

    fn recompute_at(&self, graph: &mut Graph, tid: Tid, depth: usize) {
        graph.check_depth(depth, tid);

        let state = graph.thread(tid);
        let mut effective = state.priority as u64;
        for &q in state.held.iter() {
            if !graph.queue(q).transfer {
                continue;
            }
            if let Some(top) = self.peek(graph, q) {
                effective = effective.max(graph.thread(top).effective);
            }
        }

        let state = graph.thread_mut(tid);
        if state.effective == effective {
            return;
        }
        log::trace!(
            "thread {} effective priority {} -> {}",
            tid,
            state.effective,
            effective
        );
        state.effective = effective;

        let Some(waiting) = state.waiting_on else {
            return;
        };
        let queue = graph.queue(waiting);
        if let (true, Some(holder)) = (queue.transfer, queue.holder) {
            self.recompute_at(graph, holder, depth + 1);
        }
    }
}

impl SchedPolicy for PriorityPolicy {
    fn min_priority(&self) -> u32 {
        PRIORITY_MIN
    }

    fn max_priority(&self) -> u32 {
        PRIORITY_MAX
    }

    fn default_priority(&self) -> u32 {
        PRIORITY_DEFAULT
    }

    fn select(&mut self, graph: &Graph, queue: QueueId) -> Option<Tid> {
        self.peek(graph, queue)
    }

    fn peek(&self, graph: &Graph, queue: QueueId) -> Option<Tid> {
        graph
            .queue(queue)
            .waiters
            .iter()
            .copied()
            .max_by(|&a, &b| Self::rank(graph, a, b))
    }

    fn recompute(&self, graph: &mut Graph, tid: Tid) {
        self.recompute_at(graph, tid, 0);
    }
}
