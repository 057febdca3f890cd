//! Peephole optimisation driver.
//!
//! Walks every block from back to front over the scheduled code while
//! maintaining a virtual register file: for each register, the node whose
//! value is read below the current point, or nothing if the register is
//! free there. Per-opcode handlers may consult the file (is a register
//! free? are the flags live?) and replace the current node; the walk then
//! revisits the replacement.

use log::debug;

use crate::ir::{Graph, Mode, Node, Op};
use crate::regs::{RegClass, RegClassId, Register};
use crate::sched::Schedule;

/// The state handed to peephole handlers.
pub struct PeepholeCtx<'a> {
    /// The graph being rewritten.
    pub graph: &'a mut Graph,
    /// The schedule being rewritten.
    pub sched: &'a mut Schedule,
    classes: &'static [RegClass],
    values: Vec<Vec<Option<Node>>>,
}

impl<'a> PeepholeCtx<'a> {
    /// The node whose value lives in the given register below the current
    /// point, if any. `None` means the register is free.
    pub fn value_in(&self, class: RegClassId, index: u8) -> Option<Node> {
        self.values[class as usize][index as usize]
    }

    /// Like `value_in`, for a register reference.
    pub fn reg_value(&self, reg: &Register) -> Option<Node> {
        self.value_in(reg.class, reg.index)
    }

    /// Find a free allocatable register in `class`, if one exists.
    pub fn free_reg(&self, class: RegClassId) -> Option<&'static Register> {
        let rc = &self.classes[class as usize];
        rc.regs
            .iter()
            .find(|r| r.is_allocatable() && self.value_in(class, r.index).is_none())
    }

    fn clear_defs(&mut self, node: Node) {
        if self.graph.mode(node) == Mode::T {
            for proj in self.graph.projs(node) {
                if let Some(reg) = self.graph.reg(proj) {
                    self.values[reg.class as usize][reg.index as usize] = None;
                }
            }
        } else if let Some(reg) = self.graph.reg(node) {
            self.values[reg.class as usize][reg.index as usize] = None;
        }
    }

    fn set_uses(&mut self, node: Node) {
        for op in self.graph.ins_and_deps(node).collect::<Vec<_>>() {
            if let Some(reg) = self.graph.reg(op) {
                self.values[reg.class as usize][reg.index as usize] = Some(op);
            }
        }
    }
}

/// A set of per-opcode rewrites.
pub trait PeepholeHandler {
    /// Inspect `node`; return a replacement to revisit, or `None` to keep
    /// walking. A handler that rewrites the graph must keep the schedule in
    /// step (`Schedule::add_before` / `remove`).
    fn optimize(&mut self, ctx: &mut PeepholeCtx, node: Node) -> Option<Node>;
}

/// Run the peephole handlers over every block of the scheduled graph.
pub fn run(
    graph: &mut Graph,
    sched: &mut Schedule,
    classes: &'static [RegClass],
    handler: &mut dyn PeepholeHandler,
) {
    let blocks = graph.blocks();
    for block in blocks {
        process_block(graph, sched, classes, handler, block);
    }
}

fn process_block(
    graph: &mut Graph,
    sched: &mut Schedule,
    classes: &'static [RegClass],
    handler: &mut dyn PeepholeHandler,
    block: Node,
) {
    debug!("peephole {:?}", block);
    let mut ctx = PeepholeCtx {
        graph,
        sched,
        classes,
        values: classes.iter().map(|c| vec![None; c.len()]).collect(),
    };

    let mut current = ctx.sched.last(block);
    while let Some(node) = current {
        if ctx.graph.op(node) == Op::Phi {
            break;
        }

        // Re-apply the handler to replacements; a rewrite may have freed a
        // register that enables another one.
        let mut node = node;
        while let Some(replacement) = handler.optimize(&mut ctx, node) {
            debug!("\trewrote {:?} -> {:?}", node, replacement);
            node = replacement;
        }

        // Step the virtual register file above this node: its definitions
        // die, its operands become live.
        ctx.clear_defs(node);
        ctx.set_uses(node);

        current = prev_in_schedule(ctx.graph, ctx.sched, block, node);
    }
}

fn prev_in_schedule(graph: &Graph, sched: &Schedule, block: Node, node: Node) -> Option<Node> {
    let pos = sched.position(graph, node);
    if pos == 0 {
        None
    } else {
        sched.block_nodes(block).get(pos as usize - 1).copied()
    }
}

/// A handler that does nothing; useful for targets without rewrites.
pub struct NopHandler;

impl PeepholeHandler for NopHandler {
    fn optimize(&mut self, _ctx: &mut PeepholeCtx, _node: Node) -> Option<Node> {
        None
    }
}

/// Liveness snapshot helper used by some rewrites: true when any register
/// of `class` holds a live value.
pub fn any_live(ctx: &PeepholeCtx, class: RegClassId) -> bool {
    ctx.values[class as usize].iter().any(|v| v.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Entity, Mode};
    use crate::regs::{RegReq, RegisterKind};
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

    struct Recorder {
        live_at: Vec<(Node, Vec<Option<Node>>)>,
    }

    impl PeepholeHandler for Recorder {
        fn optimize(&mut self, ctx: &mut PeepholeCtx, node: Node) -> Option<Node> {
            self.live_at.push((node, ctx.values[0].clone()));
            None
        }
    }

    #[test]
    fn register_file_tracks_liveness_backwards() {
        let mut g = Graph::new(Entity::new(0));
        let b = g.start_block;
        let def = g.add_node(b, Op::Copy, Mode::U32, &[]);
        g.set_reg(def, &REGS[0]);
        g.set_reqs(def, vec![], vec![RegReq::Normal(0)]);
        let use1 = g.add_node(b, Op::Copy, Mode::U32, &[def]);
        g.set_reg(use1, &REGS[1]);
        let ret = g.add_node(b, Op::Return, Mode::X, &[g.no_mem, use1]);

        let mut sched = Schedule::new();
        sched.append(b, def);
        sched.append(b, use1);
        sched.append(b, ret);

        let mut rec = Recorder { live_at: vec![] };
        run(&mut g, &mut sched, &CLASSES, &mut rec);

        // Visited back to front.
        let visited: Vec<Node> = rec.live_at.iter().map(|(n, _)| *n).collect();
        assert_eq!(visited, vec![ret, use1, def]);

        // Below the return nothing is live. At use1, r1 carries use1's
        // value down to the return; at def, r0 carries def's value down to
        // use1.
        let at = |n: Node| &rec.live_at.iter().find(|(m, _)| *m == n).unwrap().1;
        assert_eq!(at(ret)[0], None);
        assert_eq!(at(ret)[1], None);
        assert_eq!(at(use1)[1], Some(use1));
        assert_eq!(at(def)[0], Some(def));
    }
}
