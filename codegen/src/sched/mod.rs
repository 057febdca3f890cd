//! Instruction schedules.
//!
//! A schedule assigns every block an ordered list of its nodes. Projections
//! and other pseudo nodes are not listed; they take the position of their
//! producer. The intra-block positions back the `value_dominates` query the
//! SSA reconstructor and the peephole pass rely on.

pub mod blocksched;
pub mod listsched;
pub mod select;

use anvil_entity::SecondaryMap;

use crate::domtree::DomTree;
use crate::ir::{Graph, Node, Op};

const UNSCHEDULED: u32 = u32::MAX;

/// The per-block instruction order of a graph.
pub struct Schedule {
    order: SecondaryMap<Node, Vec<Node>>,
    pos: SecondaryMap<Node, u32>,
}

impl Schedule {
    /// An empty schedule.
    pub fn new() -> Schedule {
        Schedule {
            order: SecondaryMap::new(),
            pos: SecondaryMap::with_default(UNSCHEDULED),
        }
    }

    /// The scheduled nodes of `block`, in order.
    pub fn block_nodes(&self, block: Node) -> &[Node] {
        &self.order[block]
    }

    /// Has `node` been placed in the schedule?
    pub fn is_scheduled(&self, node: Node) -> bool {
        self.pos[node] != UNSCHEDULED
    }

    /// Append `node` to the end of `block`'s schedule.
    pub fn append(&mut self, block: Node, node: Node) {
        debug_assert!(!self.is_scheduled(node));
        self.pos[node] = self.order[block].len() as u32;
        self.order[block].push(node);
    }

    /// Insert `node` directly before the scheduled node `anchor`.
    pub fn add_before(&mut self, graph: &Graph, anchor: Node, node: Node) {
        debug_assert!(!self.is_scheduled(node));
        let block = graph.block_of(anchor);
        let at = self.pos[anchor] as usize;
        self.order[block].insert(at, node);
        self.renumber(block);
    }

    /// Insert `node` directly after the scheduled node `anchor`.
    pub fn add_after(&mut self, graph: &Graph, anchor: Node, node: Node) {
        debug_assert!(!self.is_scheduled(node));
        let block = graph.block_of(anchor);
        let at = self.pos[anchor] as usize + 1;
        self.order[block].insert(at, node);
        self.renumber(block);
    }

    /// Insert `node` at the front of `block`'s schedule (after any phis).
    pub fn add_front(&mut self, graph: &Graph, block: Node, node: Node) {
        debug_assert!(!self.is_scheduled(node));
        let at = self.order[block]
            .iter()
            .position(|&n| graph.op(n) != Op::Phi)
            .unwrap_or(self.order[block].len());
        self.order[block].insert(at, node);
        self.renumber(block);
    }

    /// Remove `node` from the schedule.
    pub fn remove(&mut self, graph: &Graph, node: Node) {
        debug_assert!(self.is_scheduled(node));
        let block = graph.block_of(node);
        self.order[block].retain(|&n| n != node);
        self.pos[node] = UNSCHEDULED;
        self.renumber(block);
    }

    fn renumber(&mut self, block: Node) {
        let nodes = std::mem::take(&mut self.order[block]);
        for (i, &n) in nodes.iter().enumerate() {
            self.pos[n] = i as u32;
        }
        self.order[block] = nodes;
    }

    /// The intra-block position of the node, or of its producer for nodes
    /// that are not scheduled themselves.
    pub fn position(&self, graph: &Graph, node: Node) -> u32 {
        let mut n = node;
        loop {
            if self.pos[n] != UNSCHEDULED {
                return self.pos[n];
            }
            match graph.op(n) {
                Op::Proj => n = graph.in_at(n, 0),
                _ => panic!("position of unscheduled node {:?}", n),
            }
        }
    }

    /// The last scheduled node of `block`, if any.
    pub fn last(&self, block: Node) -> Option<Node> {
        self.order[block].last().copied()
    }

    /// Does the definition `def` dominate the program point `at`?
    /// Reflexive: a node dominates itself.
    ///
    /// Within one block the schedule order decides; across blocks the
    /// dominator tree does.
    pub fn value_dominates(&self, dt: &DomTree, graph: &Graph, def: Node, at: Node) -> bool {
        let def_block = graph.block_of(def);
        let at_block = graph.block_of(at);
        if def_block == at_block {
            self.position(graph, def) <= self.position(graph, at)
        } else {
            dt.dominates(def_block, at_block)
        }
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new()
    }
}
