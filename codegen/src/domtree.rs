//! Dominator tree and dominance frontiers over the control-flow graph.
//!
//! Built once per graph after the control flow is final and treated as
//! immutable by the passes that consume it. The construction is the classic
//! "engineered" iterative algorithm: compute a reverse post-order, then
//! iterate immediate-dominator intersection to a fixed point.

use anvil_entity::packed_option::PackedOption;
use anvil_entity::SecondaryMap;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::ir::{Graph, Node};

/// The dominator tree of one graph.
pub struct DomTree {
    /// Reachable blocks in reverse post-order.
    postorder_rev: Vec<Node>,
    rpo_number: SecondaryMap<Node, u32>,
    idom: SecondaryMap<Node, PackedOption<Node>>,
    frontier: SecondaryMap<Node, Vec<Node>>,
}

impl DomTree {
    /// Compute the dominator tree and dominance frontiers for `graph`.
    pub fn compute(graph: &Graph) -> DomTree {
        let (order, succs) = reverse_postorder(graph);

        let mut rpo_number: SecondaryMap<Node, u32> = SecondaryMap::with_default(u32::MAX);
        for (i, &b) in order.iter().enumerate() {
            rpo_number[b] = i as u32;
        }

        // Predecessor lists restricted to reachable blocks.
        let mut preds: SecondaryMap<Node, Vec<Node>> = SecondaryMap::new();
        for (&b, bsuccs) in succs.iter() {
            for &s in bsuccs {
                preds[s].push(b);
            }
        }

        let mut idom: SecondaryMap<Node, PackedOption<Node>> = SecondaryMap::new();
        idom[graph.start_block] = graph.start_block.into();

        // Iterate to a fixed point. The RPO guarantees quick convergence.
        let mut changed = true;
        while changed {
            changed = false;
            for &b in order.iter().skip(1) {
                let mut new_idom: Option<Node> = None;
                for &p in &preds[b] {
                    if idom[p].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(cur) => intersect(&idom, &rpo_number, p, cur),
                    });
                }
                if let Some(n) = new_idom {
                    if idom[b].expand() != Some(n) {
                        idom[b] = n.into();
                        changed = true;
                    }
                }
            }
        }

        // Dominance frontiers, computed from the join points.
        let mut frontier: SecondaryMap<Node, Vec<Node>> = SecondaryMap::new();
        for &b in &order {
            if preds[b].len() < 2 {
                continue;
            }
            let b_idom = idom[b].expect("reachable join without idom");
            for &p in &preds[b] {
                let mut runner = p;
                while runner != b_idom {
                    if !frontier[runner].contains(&b) {
                        frontier[runner].push(b);
                    }
                    match idom[runner].expand() {
                        Some(next) if next != runner => runner = next,
                        _ => break,
                    }
                }
            }
        }

        DomTree {
            postorder_rev: order,
            rpo_number,
            idom,
            frontier,
        }
    }

    /// The reachable blocks in reverse post-order.
    pub fn rpo(&self) -> &[Node] {
        &self.postorder_rev
    }

    /// Is `block` reachable from the start block?
    pub fn is_reachable(&self, block: Node) -> bool {
        self.rpo_number[block] != u32::MAX
    }

    /// The immediate dominator of `block`; the start block is its own idom.
    pub fn idom(&self, block: Node) -> Option<Node> {
        self.idom[block].expand()
    }

    /// Does block `a` dominate block `b`? Reflexive.
    pub fn dominates(&self, a: Node, b: Node) -> bool {
        debug_assert!(self.is_reachable(a) && self.is_reachable(b));
        let target = self.rpo_number[a];
        let mut b = b;
        while self.rpo_number[b] > target {
            let id = self.idom[b].expect("walking above the root");
            if id == b {
                return false;
            }
            b = id;
        }
        b == a
    }

    /// The dominance frontier of `block`.
    pub fn frontier(&self, block: Node) -> &[Node] {
        &self.frontier[block]
    }
}

/// Compute the reachable blocks in reverse post-order along with the block
/// successor lists.
fn reverse_postorder(graph: &Graph) -> (Vec<Node>, FxHashMap<Node, Vec<Node>>) {
    // A block's successors are the blocks listing one of its control nodes
    // as a predecessor.
    let mut succs: FxHashMap<Node, Vec<Node>> = FxHashMap::default();
    for block in graph.blocks() {
        for i in 0..graph.n_ins(block) {
            let pred_block = graph.cfg_pred_block(block, i);
            let entry = succs.entry(pred_block).or_default();
            if !entry.contains(&block) {
                entry.push(block);
            }
        }
    }

    let mut post: Vec<Node> = Vec::new();
    let mut visited: FxHashSet<Node> = FxHashSet::default();
    let mut stack = vec![(graph.start_block, 0usize)];
    visited.insert(graph.start_block);
    while let Some(&(block, next)) = stack.last() {
        let bsuccs = succs.get(&block).map(|v| v.as_slice()).unwrap_or(&[]);
        if next < bsuccs.len() {
            stack.last_mut().unwrap().1 += 1;
            let s = bsuccs[next];
            if visited.insert(s) {
                stack.push((s, 0));
            }
        } else {
            post.push(block);
            stack.pop();
        }
    }
    post.reverse();
    (post, succs)
}

fn intersect(
    idom: &SecondaryMap<Node, PackedOption<Node>>,
    rpo: &SecondaryMap<Node, u32>,
    a: Node,
    b: Node,
) -> Node {
    let (mut a, mut b) = (a, b);
    while a != b {
        while rpo[a] > rpo[b] {
            a = idom[a].expect("intersect above root");
        }
        while rpo[b] > rpo[a] {
            b = idom[b].expect("intersect above root");
        }
    }
    a
}

/// Convenience: does the definition of `def` dominate `at`, given the block
/// granularity only? Same-block ordering needs the schedule and lives in
/// `sched`.
pub fn block_dominates(dt: &DomTree, graph: &Graph, def: Node, at: Node) -> bool {
    dt.dominates(graph.block_of(def), graph.block_of(at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Entity, Mode, Op};
    use anvil_entity::EntityRef;

    /// Build a diamond: start -> (a | b) -> join.
    fn diamond() -> (Graph, Node, Node, Node) {
        let mut g = Graph::new(Entity::new(0));
        let cond = g.add_node(g.start_block, Op::Cond, Mode::T, &[]);
        let pf = g.proj(cond, Mode::X, 0);
        let pt = g.proj(cond, Mode::X, 1);
        let a = g.add_block(&[pf]);
        let b = g.add_block(&[pt]);
        let ja = g.add_node(a, Op::Jmp, Mode::X, &[]);
        let jb = g.add_node(b, Op::Jmp, Mode::X, &[]);
        let join = g.add_block(&[ja, jb]);
        (g, a, b, join)
    }

    #[test]
    fn diamond_doms() {
        let (g, a, b, join) = diamond();
        let dt = DomTree::compute(&g);
        assert_eq!(dt.idom(a), Some(g.start_block));
        assert_eq!(dt.idom(b), Some(g.start_block));
        assert_eq!(dt.idom(join), Some(g.start_block));
        assert!(dt.dominates(g.start_block, join));
        assert!(!dt.dominates(a, join));
        assert!(dt.dominates(join, join));
    }

    #[test]
    fn diamond_frontiers() {
        let (g, a, b, join) = diamond();
        let dt = DomTree::compute(&g);
        assert_eq!(dt.frontier(a), &[join]);
        assert_eq!(dt.frontier(b), &[join]);
        assert!(dt.frontier(join).is_empty());
        assert!(dt.frontier(g.start_block).is_empty());
    }
}
