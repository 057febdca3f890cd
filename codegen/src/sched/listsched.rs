//! Primitive list scheduling with pluggable node selectors.
//!
//! Each block is scheduled on its own. A node becomes ready once all of its
//! operands inside the block are scheduled; the selector picks among the
//! ready nodes. Phis are placed first (they only transfer data flow from
//! the predecessors), keeps are placed the moment they become ready, and
//! branches are held back until nothing else is ready, so they end the
//! block.

use anvil_entity::SecondaryMap;
use log::debug;

use crate::domtree::DomTree;
use crate::ir::{Graph, Node, Op};
use crate::sched::select::Selector;
use crate::sched::Schedule;

struct BlockSched<'a> {
    graph: &'a Graph,
    block: Node,
    sched: Schedule,
    /// Nodes whose value is available (scheduled, or pseudo nodes made
    /// available when their producer was).
    available: SecondaryMap<Node, bool>,
    cands: Vec<Node>,
}

impl<'a> BlockSched<'a> {
    /// Is the value of `op` available to nodes inside `block`?
    fn operand_available(&self, op: Node) -> bool {
        if self.graph.block_of(op) != self.block {
            return true;
        }
        self.available[op]
    }

    fn try_make_ready(&mut self, selector: &mut dyn Selector, pred: Option<Node>, node: Node) {
        let graph = self.graph;
        if graph.op(node) == Op::Block || graph.block_of(node) != self.block {
            return;
        }
        if matches!(graph.op(node), Op::Phi | Op::End) {
            return;
        }
        if self.available[node] || self.cands.contains(&node) {
            return;
        }
        for op in graph.ins_and_deps(node) {
            if !self.operand_available(op) {
                return;
            }
        }
        self.node_ready(selector, pred, node);
    }

    fn node_ready(&mut self, selector: &mut dyn Selector, pred: Option<Node>, node: Node) {
        let op = self.graph.op(node);
        if op.is_not_scheduled() {
            debug!("\tmaking immediately available: {:?}", node);
            self.selected(selector, node);
        } else if matches!(op, Op::Keep | Op::CopyKeep) {
            // Keeps must be scheduled immediately.
            self.add_to_sched(selector, node);
        } else {
            debug!("\tmaking ready: {:?}", node);
            self.cands.push(node);
            selector.node_ready(self.graph, node, pred);
        }
    }

    /// The node's value is available from now on; users may have become
    /// ready.
    fn selected(&mut self, selector: &mut dyn Selector, node: Node) {
        selector.node_selected(self.graph, node);
        self.available[node] = true;
        let users: Vec<Node> = self.graph.uses(node).iter().map(|u| u.user).collect();
        for user in users {
            self.try_make_ready(selector, Some(node), user);
        }
    }

    fn add_to_sched(&mut self, selector: &mut dyn Selector, node: Node) {
        debug_assert!(!self.graph.op(node).is_not_scheduled());
        self.sched.append(self.block, node);
        debug!("\tschedule {:?}", node);
        self.cands.retain(|&c| c != node);
        self.selected(selector, node);
    }
}

/// List-schedule every block of `graph` with the given selector.
pub fn list_schedule(graph: &Graph, dt: &DomTree, selector: &mut dyn Selector) -> Schedule {
    selector.init_graph(graph);

    let mut sched = Schedule::new();
    for &block in dt.rpo() {
        sched = schedule_block(graph, block, sched, selector);
    }

    selector.finish_graph();
    sched
}

fn schedule_block(
    graph: &Graph,
    block: Node,
    sched: Schedule,
    selector: &mut dyn Selector,
) -> Schedule {
    debug!("scheduling {:?}", block);
    selector.init_block(graph, block);

    let mut bs = BlockSched {
        graph,
        block,
        sched,
        available: SecondaryMap::new(),
        cands: Vec::new(),
    };

    // Phis first; they only transfer data flow from the predecessors.
    // Everything else is probed for readiness.
    for &node in graph.block_members(block) {
        match graph.op(node) {
            Op::Phi => bs.add_to_sched(selector, node),
            Op::Start => bs.add_to_sched(selector, node),
            Op::End | Op::Deleted => {}
            _ => bs.try_make_ready(selector, None, node),
        }
    }

    while !bs.cands.is_empty() {
        // Branches are only eligible when nothing else is ready, so they
        // end the block.
        let non_branch: Vec<Node> = bs
            .cands
            .iter()
            .copied()
            .filter(|&n| !graph.op(n).is_block_terminator())
            .collect();
        let pick_from = if non_branch.is_empty() {
            bs.cands.clone()
        } else {
            non_branch
        };
        let node = selector.select(graph, &bs.sched, &pick_from);
        debug_assert!(pick_from.contains(&node), "selector picked a non-candidate");
        debug!("\tpicked node {:?}", node);
        bs.add_to_sched(selector, node);
    }

    selector.finish_block(block);
    bs.sched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domtree::DomTree;
    use crate::ir::{Attr, Entity, Mode, TarVal};
    use crate::sched::select::TrivialSelector;
    use anvil_entity::EntityRef;

    #[test]
    fn operands_precede_users() {
        let mut g = Graph::new(Entity::new(0));
        let b = g.start_block;
        let c1 = g.add_node_attr(
            b,
            Op::Const,
            Mode::I32,
            &[],
            Attr::Const(TarVal::new(Mode::I32, 1)),
        );
        let c2 = g.add_node_attr(
            b,
            Op::Const,
            Mode::I32,
            &[],
            Attr::Const(TarVal::new(Mode::I32, 2)),
        );
        let add = g.add_node(b, Op::Add, Mode::I32, &[c1, c2]);
        let sub = g.add_node(b, Op::Sub, Mode::I32, &[add, c1]);
        let ret = g.add_node(b, Op::Return, Mode::X, &[g.no_mem, sub]);
        let dt = DomTree::compute(&g);
        let mut sel = TrivialSelector;
        let sched = list_schedule(&g, &dt, &mut sel);

        let order = sched.block_nodes(b);
        let pos = |n: Node| order.iter().position(|&x| x == n).unwrap();
        assert!(pos(c1) < pos(add));
        assert!(pos(c2) < pos(add));
        assert!(pos(add) < pos(sub));
        assert!(pos(sub) < pos(ret));
        // The branch ends the block.
        assert_eq!(*order.last().unwrap(), ret);
    }

    #[test]
    fn keeps_scheduled_immediately() {
        let mut g = Graph::new(Entity::new(0));
        let b = g.start_block;
        let c1 = g.add_node_attr(
            b,
            Op::Const,
            Mode::I32,
            &[],
            Attr::Const(TarVal::new(Mode::I32, 1)),
        );
        let keep = g.add_node(b, Op::Keep, Mode::Any, &[c1]);
        let c2 = g.add_node_attr(
            b,
            Op::Const,
            Mode::I32,
            &[],
            Attr::Const(TarVal::new(Mode::I32, 2)),
        );
        let _ret = g.add_node(b, Op::Return, Mode::X, &[g.no_mem, c2]);
        let dt = DomTree::compute(&g);
        let sched = list_schedule(&g, &dt, &mut TrivialSelector);
        let order = sched.block_nodes(b);
        let pos = |n: Node| order.iter().position(|&x| x == n).unwrap();
        // The keep follows its operand directly.
        assert_eq!(pos(keep), pos(c1) + 1);
    }
}
