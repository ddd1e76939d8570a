//! # 彩票调度策略
//!
//! ## Overview
//! 每个线程持有一定数量的彩票。出队时在所有等待者的有效票数之和中
//! 均匀抽取一张中奖票，按到达顺序依次扣减，扣到不大于零的线程胜出。
//!
//! 与严格优先级不同，捐赠是 **累加** 的：
//!
//! ```text
//! effective(T) = tickets(T) + Σ effective(W)
//!                 W 为 T 持有的每个可转移队列上的全部等待者
//! ```
//!
//! ## Invariants
//! - 每次重算都从票数出发完整求和，不做增量修补，所有权变化后不会重复计数
//! - 重算完一个线程后，总是刷新它所等待队列的缓存总票数，
//!   并在该队列可转移且有持有者时继续重算持有者
//! - `peek` 使用随机源的副本，因此紧接着的 `select` 必然抽中同一个线程

use super::state::Graph;
use super::{QueueId, SchedPolicy, Tid};
use crate::config::{TICKETS_DEFAULT, TICKETS_MAX, TICKETS_MIN};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub struct LotteryPolicy {
    rng: SmallRng,
}

impl LotteryPolicy {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self { rng }
    }

    fn draw(rng: &mut SmallRng, graph: &Graph, queue: QueueId) -> Option<Tid> {
        let state = graph.queue(queue);
        if state.waiters.is_empty() {
            return None;
        }
        debug_assert_eq!(state.total_tickets, graph.waiters_sum(queue));

        let mut ticket = rng.gen_range(1..=state.total_tickets) as i128;
        for &waiter in state.waiters.iter() {
            ticket -= graph.thread(waiter).effective as i128;
            if ticket <= 0 {
                return Some(waiter);
            }
        }
        unreachable!("winning ticket beyond the queue total")
    }

    fn recompute_at(&self, graph: &mut Graph, tid: Tid, depth: usize) {
        graph.check_depth(depth, tid);

        let state = graph.thread(tid);
        let mut effective = state.priority as u64;
        for &q in state.held.iter() {
            if graph.queue(q).transfer {
                effective += graph.waiters_sum(q);
            }
        }

        let state = graph.thread_mut(tid);
        if state.effective != effective {
            log::trace!(
                "thread {} effective tickets {} -> {}",
                tid,
                state.effective,
                effective
            );
        }
        state.effective = effective;

        let Some(waiting) = state.waiting_on else {
            return;
        };
        self.waiters_changed(graph, waiting);
        let queue = graph.queue(waiting);
        if let (true, Some(holder)) = (queue.transfer, queue.holder) {
            self.recompute_at(graph, holder, depth + 1);
        }
    }
}

impl SchedPolicy for LotteryPolicy {
    fn min_priority(&self) -> u32 {
        TICKETS_MIN
    }

    fn max_priority(&self) -> u32 {
        TICKETS_MAX
    }

    fn default_priority(&self) -> u32 {
        TICKETS_DEFAULT
    }

    fn select(&mut self, graph: &Graph, queue: QueueId) -> Option<Tid> {
        Self::draw(&mut self.rng, graph, queue)
    }

    fn peek(&self, graph: &Graph, queue: QueueId) -> Option<Tid> {
        let mut rng = self.rng.clone();
        Self::draw(&mut rng, graph, queue)
    }

    fn recompute(&self, graph: &mut Graph, tid: Tid) {
        self.recompute_at(graph, tid, 0);
    }

    fn waiters_changed(&self, graph: &mut Graph, queue: QueueId) {
        let total = graph.waiters_sum(queue);
        graph.queue_mut(queue).total_tickets = total;
    }
}
