//! Keep insertion for unused outputs.
//!
//! A multi-output instruction must have all of its outputs represented
//! after register allocation: every used output through a projection, and
//! every unused one pinned alive by a `Keep`, so the allocator sees the
//! definition and blocks the register. This walker repairs graphs where
//! the transformer dropped unused outputs.

use crate::ir::{Graph, Mode, Node, Op};
use crate::regs::{RegClass, RegReq};

/// Ensure every output of every multi-output node is either consumed by a
/// projection or kept alive.
pub fn add_missing_keeps(graph: &mut Graph, classes: &[RegClass]) {
    let nodes: Vec<Node> = graph.nodes().collect();
    for node in nodes {
        if graph.mode(node) != Mode::T || graph.op(node) == Op::Start {
            continue;
        }
        let n_outs = graph.out_reqs(node).len();
        if n_outs == 0 {
            continue;
        }

        let mut unused = Vec::new();
        for i in 0..n_outs {
            let req = &graph.out_reqs(node)[i];
            let class = match req.class() {
                Some(c) => c,
                None => continue,
            };
            if graph.find_proj(node, i as i64).is_none() {
                unused.push((i, class));
            }
        }
        if unused.is_empty() {
            continue;
        }

        let block = graph.block_of(node);
        let mut keep_ins = Vec::new();
        for (i, class) in unused {
            let mode = classes[class as usize].mode;
            let proj = graph.proj(node, mode, i as i64);
            let req = graph.out_reqs(node)[i].clone();
            graph.set_reqs(proj, vec![RegReq::None], vec![req]);
            keep_ins.push(proj);
        }
        let keep = graph.add_node(block, Op::Keep, Mode::Any, &keep_ins);
        graph.keep_alive(keep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Entity, Mode};
    use crate::regs::{RegClass, Register, RegisterKind};
    use anvil_entity::EntityRef;

    static REGS: [Register; 2] = [
        Register {
            name: "r0",
            class: 0,
            index: 0,
            kind: RegisterKind::Normal,
        },
        Register {
            name: "r1",
            class: 0,
            index: 1,
            kind: RegisterKind::Normal,
        },
    ];
    static CLASSES: [RegClass; 1] = [RegClass {
        name: "gp",
        mode: Mode::U32,
        regs: &REGS,
    }];

    #[test]
    fn unused_output_gets_proj_and_keep() {
        let mut g = Graph::new(Entity::new(0));
        let b = g.start_block;
        // A two-output node with only the first output consumed.
        let node = g.add_node(b, Op::Perm, Mode::T, &[]);
        g.set_reqs(node, vec![], vec![RegReq::Normal(0), RegReq::Normal(0)]);
        let _used = g.proj(node, Mode::U32, 0);

        add_missing_keeps(&mut g, &CLASSES);

        let p1 = g.find_proj(node, 1).expect("proj for unused output");
        let keeps: Vec<Node> = g
            .uses(p1)
            .iter()
            .map(|u| u.user)
            .filter(|&u| g.op(u) == Op::Keep)
            .collect();
        assert_eq!(keeps.len(), 1);
    }

    #[test]
    fn fully_used_node_untouched() {
        let mut g = Graph::new(Entity::new(0));
        let b = g.start_block;
        let node = g.add_node(b, Op::Perm, Mode::T, &[]);
        g.set_reqs(node, vec![], vec![RegReq::Normal(0)]);
        let _used = g.proj(node, Mode::U32, 0);
        let before = g.node_count();
        add_missing_keeps(&mut g, &CLASSES);
        assert_eq!(g.node_count(), before);
    }
}
