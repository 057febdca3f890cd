//! Node selectors for the list scheduler.
//!
//! The scheduler asks a selector for one node out of the ready set. The
//! trivial and random selectors are mostly useful for debugging schedules;
//! the register-pressure selector is the default for code quality, and the
//! trace selector prefers the critical path.

use anvil_entity::SecondaryMap;

use crate::ir::{Graph, Mode, Node, Op};
use crate::sched::Schedule;

/// A node selection strategy.
pub trait Selector {
    /// Called once before the graph is scheduled.
    fn init_graph(&mut self, _graph: &Graph) {}
    /// Called before each block.
    fn init_block(&mut self, _graph: &Graph, _block: Node) {}
    /// Notification that `node` entered the ready set.
    fn node_ready(&mut self, _graph: &Graph, _node: Node, _pred: Option<Node>) {}
    /// Notification that `node` was scheduled or made available.
    fn node_selected(&mut self, _graph: &Graph, _node: Node) {}
    /// Pick one node out of `cands` (never empty).
    fn select(&mut self, graph: &Graph, sched: &Schedule, cands: &[Node]) -> Node;
    /// Called after each block.
    fn finish_block(&mut self, _block: Node) {}
    /// Called once after the graph is scheduled.
    fn finish_graph(&mut self) {}
}

/// Picks the first ready node.
pub struct TrivialSelector;

impl Selector for TrivialSelector {
    fn select(&mut self, _graph: &Graph, _sched: &Schedule, cands: &[Node]) -> Node {
        cands[0]
    }
}

/// Picks a pseudo-random ready node from a deterministic stream, so runs
/// are reproducible.
pub struct RandomSelector {
    state: u64,
}

impl RandomSelector {
    /// Create the selector with the fixed default seed.
    pub fn new() -> Self {
        RandomSelector {
            state: 0x2545_f491_4f6c_dd1d,
        }
    }

    fn next(&mut self) -> u64 {
        // xorshift64
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

impl Default for RandomSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl Selector for RandomSelector {
    fn select(&mut self, _graph: &Graph, _sched: &Schedule, cands: &[Node]) -> Node {
        cands[(self.next() % cands.len() as u64) as usize]
    }
}

/// Picks the node whose scheduling lengthens the fewest live ranges.
///
/// For every value the metric is the maximal number of hops from one of its
/// users down to the already scheduled region of the block; scheduling a
/// node whose operands have small hop counts tends to close live ranges
/// early.
pub struct RegPressureSelector;

impl RegPressureSelector {
    fn max_hops(&self, graph: &Graph, sched: &Schedule, block: Node, value: Node) -> i32 {
        let mut res = 0;
        for u in graph.uses(value) {
            let mut visited = SecondaryMap::new();
            res = res.max(self.hops_walker(graph, sched, block, u.user, 0, &mut visited));
        }
        res
    }

    fn hops_walker(
        &self,
        graph: &Graph,
        sched: &Schedule,
        block: Node,
        node: Node,
        depth: i32,
        visited: &mut SecondaryMap<Node, bool>,
    ) -> i32 {
        if graph.block_of(node) != block {
            return 0;
        }
        if sched.is_scheduled(node) {
            return depth;
        }
        let mut res = 0;
        for op in graph.ins_and_deps(node).collect::<Vec<_>>() {
            if visited[op] {
                continue;
            }
            visited[op] = true;
            res = res.max(self.hops_walker(graph, sched, block, op, depth + 1, visited));
        }
        res
    }

    fn costs(&self, graph: &Graph, sched: &Schedule, node: Node) -> i32 {
        let block = graph.block_of(node);
        let mut sum = 0;
        for op in graph.ins_and_deps(node).collect::<Vec<_>>() {
            if graph.op(op).is_not_scheduled() {
                continue;
            }
            sum += self.max_hops(graph, sched, block, op);
        }
        sum
    }
}

impl Selector for RegPressureSelector {
    fn select(&mut self, graph: &Graph, sched: &Schedule, cands: &[Node]) -> Node {
        let mut best = cands[0];
        let mut best_cost = i32::MAX;
        for &c in cands {
            let cost = self.costs(graph, sched, c);
            if cost < best_cost {
                best = c;
                best_cost = cost;
            }
        }
        best
    }
}

/// Prefers the critical path: among the ready nodes, picks the one with the
/// longest chain of not yet scheduled users inside the block.
pub struct TraceSelector {
    height: SecondaryMap<Node, i32>,
}

impl TraceSelector {
    /// Create the selector.
    pub fn new() -> Self {
        TraceSelector {
            height: SecondaryMap::new(),
        }
    }

    fn compute_height(&mut self, graph: &Graph, block: Node, node: Node) -> i32 {
        if self.height[node] != 0 {
            return self.height[node];
        }
        let mut h = 1;
        for u in graph.uses(node).to_vec() {
            if graph.block_of(u.user) != block || graph.op(u.user) == Op::Phi {
                continue;
            }
            let extra = if graph.mode(u.user) == Mode::T || graph.op(u.user).is_not_scheduled() {
                0
            } else {
                1
            };
            h = h.max(extra + self.compute_height(graph, block, u.user));
        }
        self.height[node] = h;
        h
    }
}

impl Default for TraceSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl Selector for TraceSelector {
    fn init_block(&mut self, _graph: &Graph, _block: Node) {
        self.height = SecondaryMap::new();
    }

    fn select(&mut self, graph: &Graph, _sched: &Schedule, cands: &[Node]) -> Node {
        let mut best = cands[0];
        let mut best_height = i32::MIN;
        for &c in cands {
            let block = graph.block_of(c);
            let h = self.compute_height(graph, block, c);
            if h > best_height {
                best = c;
                best_height = h;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_stream_is_deterministic() {
        let mut a = RandomSelector::new();
        let mut b = RandomSelector::new();
        for _ in 0..32 {
            assert_eq!(a.next(), b.next());
        }
    }
}
