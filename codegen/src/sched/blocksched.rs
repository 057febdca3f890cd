//! Block ordering.
//!
//! Blocks are laid out so that frequent control transfers become
//! fall-throughs. The walk chains each block to one of its unplaced
//! successors, preferring the one reached by an unconditional jump and, for
//! two-way branches, the false exit, which the branch emitters also treat
//! as the fall-through candidate.

use anvil_entity::SecondaryMap;

use crate::domtree::DomTree;
use crate::ir::{Attr, Graph, Node, Op};

/// The final textual order of blocks in a function.
pub struct BlockSchedule {
    order: Vec<Node>,
    index: SecondaryMap<Node, u32>,
}

impl BlockSchedule {
    /// The blocks in emission order.
    pub fn blocks(&self) -> &[Node] {
        &self.order
    }

    /// Position of `block` in the emission order.
    pub fn index(&self, block: Node) -> u32 {
        self.index[block]
    }

    /// The block emitted directly before `block`, if any.
    pub fn prev(&self, block: Node) -> Option<Node> {
        let i = self.index[block];
        if i == 0 {
            None
        } else {
            Some(self.order[i as usize - 1])
        }
    }

    /// Is a transfer from `from` to `to` a fall-through in this order?
    pub fn is_fallthrough(&self, from: Node, to: Node) -> bool {
        self.index[to] == self.index[from] + 1
    }
}

/// Compute the block order for `graph`.
pub fn block_schedule(graph: &Graph, dt: &DomTree) -> BlockSchedule {
    let mut placed: SecondaryMap<Node, bool> = SecondaryMap::new();
    let mut order: Vec<Node> = Vec::new();

    // Chain from each unplaced block in RPO, following preferred exits.
    for &entry in dt.rpo() {
        let mut block = entry;
        while !placed[block] {
            placed[block] = true;
            order.push(block);
            match preferred_successor(graph, dt, &placed, block) {
                Some(next) => block = next,
                None => break,
            }
        }
    }

    let mut index: SecondaryMap<Node, u32> = SecondaryMap::new();
    for (i, &b) in order.iter().enumerate() {
        index[b] = i as u32;
    }
    BlockSchedule { order, index }
}

/// The successor that should follow `block` in the layout, if one is still
/// unplaced.
fn preferred_successor(
    graph: &Graph,
    dt: &DomTree,
    placed: &SecondaryMap<Node, bool>,
    block: Node,
) -> Option<Node> {
    let mut fallback = None;
    for &succ in dt.rpo() {
        if placed[succ] {
            continue;
        }
        for i in 0..graph.n_ins(succ) {
            if graph.cfg_pred_block(succ, i) != block {
                continue;
            }
            let pred = graph.in_at(succ, i);
            // An unconditional jump, or the false exit of a two-way branch,
            // makes the best fall-through.
            let preferred = match graph.op(pred) {
                Op::Jmp => true,
                Op::Proj => matches!(graph.attr(pred), Attr::Proj(0)),
                op => op.is_block_terminator(),
            };
            if preferred {
                return Some(succ);
            }
            fallback = Some(succ);
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Entity, Mode};
    use anvil_entity::EntityRef;

    #[test]
    fn straight_line_is_chained() {
        let mut g = Graph::new(Entity::new(0));
        let j0 = g.add_node(g.start_block, Op::Jmp, Mode::X, &[]);
        let b1 = g.add_block(&[j0]);
        let j1 = g.add_node(b1, Op::Jmp, Mode::X, &[]);
        let b2 = g.add_block(&[j1]);
        let dt = DomTree::compute(&g);
        let bs = block_schedule(&g, &dt);
        assert_eq!(bs.blocks(), &[g.start_block, b1, b2]);
        assert!(bs.is_fallthrough(g.start_block, b1));
        assert!(bs.is_fallthrough(b1, b2));
        assert_eq!(bs.prev(b2), Some(b1));
    }

    #[test]
    fn false_exit_falls_through() {
        let mut g = Graph::new(Entity::new(0));
        let cond = g.add_node(g.start_block, Op::Cond, Mode::T, &[]);
        let pf = g.proj(cond, Mode::X, 0);
        let pt = g.proj(cond, Mode::X, 1);
        let bt = g.add_block(&[pt]);
        let bf = g.add_block(&[pf]);
        let dt = DomTree::compute(&g);
        let bs = block_schedule(&g, &dt);
        assert!(bs.is_fallthrough(g.start_block, bf));
        assert!(!bs.is_fallthrough(g.start_block, bt));
    }
}
