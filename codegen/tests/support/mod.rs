//! Test support: a greedy stand-in for the external register allocator.
//!
//! Walks the schedule once, frees a register when the last use of its
//! value has been seen, and honors the requirement kinds. Good enough for
//! graphs that do not need spilling; a register shortage panics.

use std::collections::HashMap;

use anvil_codegen::context::RegAllocator;
use anvil_codegen::domtree::DomTree;
use anvil_codegen::ir::{Graph, Mode, Node, UseKind};
use anvil_codegen::isa::TargetIsa;
use anvil_codegen::regs::{Register, RegReq, RegisterKind};
use anvil_codegen::sched::Schedule;
use anvil_codegen::CodegenResult;

pub struct GreedyAllocator;

impl RegAllocator for GreedyAllocator {
    fn run(
        &mut self,
        isa: &dyn TargetIsa,
        graph: &mut Graph,
        sched: &mut Schedule,
        domtree: &DomTree,
    ) -> CodegenResult<()> {
        let classes = isa.reg_classes();
        let mut in_use: Vec<Vec<bool>> = classes.iter().map(|c| vec![false; c.len()]).collect();

        // Remaining data uses per value.
        let mut remaining: HashMap<Node, usize> = HashMap::new();
        for n in graph.nodes() {
            let count = graph
                .uses(n)
                .iter()
                .filter(|u| u.kind == UseKind::Data)
                .count();
            remaining.insert(n, count);
        }

        // Pre-assigned registers (pinned resources) block their slots.
        for n in graph.nodes() {
            if let Some(reg) = graph.reg(n) {
                if reg.kind == RegisterKind::Normal {
                    in_use[reg.class as usize][reg.index as usize] = true;
                }
            }
        }

        for &block in domtree.rpo() {
            let nodes: Vec<Node> = sched.block_nodes(block).to_vec();
            for node in nodes {
                // Operands die here if this was their last use.
                for op in graph.ins(node).to_vec() {
                    let r = remaining.entry(op).or_insert(0);
                    *r = r.saturating_sub(1);
                    if *r == 0 {
                        if let Some(reg) = graph.reg(op) {
                            if reg.kind == RegisterKind::Normal {
                                in_use[reg.class as usize][reg.index as usize] = false;
                            }
                        }
                    }
                }

                // Define the outputs.
                if graph.mode(node) == Mode::T {
                    for proj in graph.projs(node) {
                        if graph.reg(proj).is_some() {
                            continue;
                        }
                        let pn = graph.attr(proj).proj();
                        if pn < 0 {
                            continue;
                        }
                        let req = match graph.out_reqs(node).get(pn as usize) {
                            Some(req) => req.clone(),
                            None => continue,
                        };
                        if let Some(reg) = pick(graph, classes, &mut in_use, node, &req) {
                            graph.set_reg(proj, reg);
                        }
                    }
                } else if graph.reg(node).is_none() {
                    if let Some(req) = graph.out_reqs(node).first() {
                        let req = req.clone();
                        if let Some(reg) = pick(graph, classes, &mut in_use, node, &req) {
                            graph.set_reg(node, reg);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn pick(
    graph: &Graph,
    classes: &'static [anvil_codegen::regs::RegClass],
    in_use: &mut [Vec<bool>],
    node: Node,
    req: &RegReq,
) -> Option<&'static Register> {
    let reg = match req {
        RegReq::None => return None,
        RegReq::Normal(c) | RegReq::Different(c, _) => classes[*c as usize]
            .regs
            .iter()
            .find(|r| r.is_allocatable() && !in_use[*c as usize][r.index as usize])
            .unwrap_or_else(|| panic!("class {} exhausted", classes[*c as usize].name)),
        RegReq::Limited(c, mask) => {
            let class = &classes[*c as usize];
            mask.iter()
                .map(|i| &class.regs[i])
                .find(|r| !in_use[*c as usize][r.index as usize])
                .unwrap_or_else(|| panic!("limited requirement unsatisfiable"))
        }
        RegReq::Same(_, slot) => graph
            .reg(graph.in_at(node, *slot as usize))
            .expect("same-as constraint against an unassigned operand"),
    };
    if reg.kind == RegisterKind::Normal {
        in_use[reg.class as usize][reg.index as usize] = true;
    }
    Some(reg)
}
