//! ia32 peephole rewrites over the scheduled, register-allocated code.
//!
//! The rewrites consult the virtual register file of the driver: several of
//! them are only sound when the flags are dead, or need a free scratch
//! register.

use log::debug;

use crate::ir::{Attr, Graph, Mode, Node, Op, Relation};
use crate::isa::ia32::attrs::{AttrVariant, Ia32Attr, OpType};
use crate::isa::ia32::regs::{self, CLASS_FLAGS, CLASS_GP};
use crate::isa::ia32::{attr, attr_mut, is_op, n, out, Ia32Op};
use crate::isa::CpuFeatures;
use crate::peephole::{PeepholeCtx, PeepholeHandler};
use crate::regs::RegReq;
use crate::sched::Schedule;

/// Run the ia32 peephole pass.
pub fn run(features: &CpuFeatures, graph: &mut Graph, sched: &mut Schedule) {
    let mut handler = Ia32Peephole { features };
    crate::peephole::run(graph, sched, &regs::CLASSES, &mut handler);
}

struct Ia32Peephole<'a> {
    features: &'a CpuFeatures,
}

/// Limit for the store-to-push conversion behind one stack adjustment.
const MAXPUSH_OPTIMIZE: usize = 48;

impl<'a> Ia32Peephole<'a> {
    /// `mov $0, r` becomes `xor r, r` when nobody reads the flags.
    fn peephole_const(&mut self, ctx: &mut PeepholeCtx, node: Node) -> Option<Node> {
        let a = attr(ctx.graph, node);
        match a.variant {
            AttrVariant::Immediate {
                ent: None,
                offset: 0,
                ..
            } => {}
            _ => return None,
        }
        if self.features.use_mov_0 {
            return None;
        }
        // xor destroys the flags, so no-one must be using them.
        if ctx.value_in(CLASS_FLAGS, 0).is_some() {
            return None;
        }
        let reg = ctx.graph.reg(node)?;

        let block = ctx.graph.block_of(node);
        let produce = ctx.graph.add_node_attr(
            block,
            Op::Ia32(Ia32Op::ProduceVal),
            Mode::U32,
            &[],
            Attr::Ia32(Box::new(Ia32Attr::new())),
        );
        ctx.graph.set_reg(produce, reg);
        let noreg = new_noreg(ctx.graph, block);
        let no_mem = ctx.graph.no_mem;
        let mut xattr = Ia32Attr::new();
        xattr.ls_mode = Some(Mode::U32);
        let xor = ctx.graph.add_node_attr(
            block,
            Op::Ia32(Ia32Op::Xor),
            Mode::U32,
            &[noreg, noreg, no_mem, produce, produce],
            Attr::Ia32(Box::new(xattr)),
        );
        ctx.graph.set_reg(xor, reg);
        ctx.graph
            .set_reqs(xor, vec![RegReq::None; 5], vec![RegReq::Normal(CLASS_GP)]);

        ctx.sched.add_before(ctx.graph, node, produce);
        ctx.sched.add_before(ctx.graph, node, xor);
        ctx.sched.remove(ctx.graph, node);
        ctx.graph.exchange(node, xor);
        debug!("rewrote constant zero into {:?}", xor);
        Some(xor)
    }

    /// Merge two adjacent stack adjustments.
    fn incsp_incsp(&mut self, ctx: &mut PeepholeCtx, node: Node) -> bool {
        let pred = ctx.graph.in_at(node, 0);
        if ctx.graph.op(pred) != Op::IncSp || ctx.graph.n_uses(pred) != 1 {
            return false;
        }
        let pred_offs = match ctx.graph.attr(pred) {
            Attr::IncSp { offset } => *offset,
            _ => return false,
        };
        let curr_offs = match ctx.graph.attr(node) {
            Attr::IncSp { offset } => *offset,
            _ => return false,
        };
        let pred_pred = ctx.graph.in_at(pred, 0);
        *ctx.graph.attr_mut(node) = Attr::IncSp {
            offset: pred_offs + curr_offs,
        };
        ctx.graph.set_in(node, 0, pred_pred);
        ctx.sched.remove(ctx.graph, pred);
        ctx.graph.kill(pred);
        true
    }

    /// Turn stores through the fresh stack area into pushes, shrinking the
    /// adjustment.
    fn incsp_store_to_push(&mut self, ctx: &mut PeepholeCtx, node: Node) {
        let mut offset = match ctx.graph.attr(node) {
            Attr::IncSp { offset } => *offset,
            _ => return,
        };
        if offset < 4 {
            return;
        }

        // Walk the schedule below and collect convertible stores by slot.
        let block = ctx.graph.block_of(node);
        let mut stores: [Option<Node>; MAXPUSH_OPTIMIZE] = [None; MAXPUSH_OPTIMIZE];
        let start_pos = ctx.sched.position(ctx.graph, node) as usize + 1;
        let nodes: Vec<Node> = ctx.sched.block_nodes(block)[start_pos..].to_vec();
        for cand in nodes {
            if !is_op(ctx.graph, cand, Ia32Op::Store) {
                break;
            }
            if ctx.graph.in_at(cand, n::BASE) != node {
                continue;
            }
            if ctx.graph.in_at(cand, n::MEM) != ctx.graph.no_mem {
                continue;
            }
            let a = attr(ctx.graph, cand);
            if a.am_scale > 0 || a.am_sym.is_some() || a.ls_mode != Some(Mode::U32) {
                break;
            }
            if !is_noreg(ctx.graph, ctx.graph.in_at(cand, n::INDEX)) {
                break;
            }
            let store_offs = a.am_offs;
            if store_offs % 4 != 0 {
                break;
            }
            let slot = (store_offs / 4) as usize;
            if slot >= MAXPUSH_OPTIMIZE {
                continue;
            }
            if stores[slot].is_some() {
                break;
            }
            stores[slot] = Some(cand);
        }

        let mut curr_sp = ctx.graph.in_at(node, 0);
        let mut i = ((offset / 4) - 1) as usize;
        if i >= MAXPUSH_OPTIMIZE {
            i = MAXPUSH_OPTIMIZE - 1;
        }
        loop {
            let store = match stores[i] {
                Some(s) => s,
                None => break,
            };
            let val = ctx.graph.in_at(store, n::UNARY);
            let mem = ctx.graph.in_at(store, n::MEM);
            let block = ctx.graph.block_of(store);
            let noreg = new_noreg(ctx.graph, block);
            let mut pattr = Ia32Attr::new();
            pattr.ls_mode = Some(Mode::U32);
            let push = ctx.graph.add_node_attr(
                block,
                Op::Ia32(Ia32Op::Push),
                Mode::T,
                &[noreg, noreg, mem, val, curr_sp],
                Attr::Ia32(Box::new(pattr)),
            );
            ctx.sched.add_before(ctx.graph, node, push);

            let stack = ctx.graph.proj(push, Mode::U32, out::PUSH_STACK);
            ctx.graph.set_reg(stack, regs::esp_reg());
            let mem_proj = ctx.graph.proj(push, Mode::M, out::PUSH_MEM);
            curr_sp = stack;

            ctx.sched.remove(ctx.graph, store);
            ctx.graph.exchange(store, mem_proj);
            debug!("rewrote {:?} into push {:?}", store, push);

            offset -= 4;
            if i == 0 {
                break;
            }
            i -= 1;
        }

        *ctx.graph.attr_mut(node) = Attr::IncSp { offset };
        ctx.graph.set_in(node, 0, curr_sp);
    }

    /// Replace a small deallocation by pops into a scratch register.
    fn incsp_to_pop(&mut self, ctx: &mut PeepholeCtx, node: Node) -> Option<Node> {
        let offset = match ctx.graph.attr(node) {
            Attr::IncSp { offset } => *offset,
            _ => return None,
        };
        let pops = match offset {
            -4 if !self.features.use_add_esp_4 => 1,
            -8 if !self.features.use_add_esp_8 => 2,
            // Small allocations would become pushes of a scratch register;
            // that rewrite is not implemented.
            4 if !self.features.use_sub_esp_4 => return None,
            8 if !self.features.use_sub_esp_8 => return None,
            _ => return None,
        };
        let reg = ctx.free_reg(CLASS_GP)?;

        let block = ctx.graph.block_of(node);
        let mut stack = ctx.graph.in_at(node, 0);
        let mut keep_ins = Vec::new();
        let mut first = None;
        for _ in 0..pops {
            let no_mem = ctx.graph.no_mem;
            let pop = ctx.graph.add_node_attr(
                block,
                Op::Ia32(Ia32Op::Pop),
                Mode::T,
                &[no_mem, stack],
                Attr::Ia32(Box::new(Ia32Attr::new())),
            );
            ctx.sched.add_before(ctx.graph, node, pop);
            let res = ctx.graph.proj(pop, Mode::U32, out::POP_RES);
            ctx.graph.set_reg(res, reg);
            stack = ctx.graph.proj(pop, Mode::U32, out::POP_STACK);
            ctx.graph.set_reg(stack, regs::esp_reg());
            keep_ins.push(res);
            first.get_or_insert(pop);
        }
        let keep = ctx.graph.add_node(block, Op::Keep, Mode::Any, &keep_ins);
        ctx.sched.add_before(ctx.graph, node, keep);
        ctx.graph.keep_alive(keep);

        ctx.sched.remove(ctx.graph, node);
        ctx.graph.exchange(node, stack);
        debug!("rewrote stack shrink into {} pop(s)", pops);
        first
    }

    fn peephole_incsp(&mut self, ctx: &mut PeepholeCtx, node: Node) -> Option<Node> {
        if self.incsp_incsp(ctx, node) {
            return Some(node);
        }
        self.incsp_store_to_push(ctx, node);
        self.incsp_to_pop(ctx, node)
    }

    /// Turn a lea whose destination matches one of its sources back into
    /// add/shl (or inc/dec).
    fn peephole_lea(&mut self, ctx: &mut PeepholeCtx, node: Node) -> Option<Node> {
        // All the replacements clobber the flags.
        if ctx.value_in(CLASS_FLAGS, 0).is_some() {
            return None;
        }
        let graph = &mut *ctx.graph;
        let base = graph.in_at(node, 0);
        let index = graph.in_at(node, 1);
        let base = if is_noreg(graph, base) { None } else { Some(base) };
        let index = if is_noreg(graph, index) { None } else { Some(index) };
        let (base, index) = (base, index);
        if base.is_none() && index.is_none() {
            return None;
        }
        let out_reg = graph.reg(node)?;
        let base_reg = base.and_then(|b| graph.reg(b));
        let index_reg = index.and_then(|i| graph.reg(i));

        let a = attr(graph, node);
        if a.use_frame {
            return None;
        }
        let scale = a.am_scale;
        let offs = a.am_offs;
        let sym = a.am_sym;
        let sign = a.am_sym_sign;
        let has_immediates = offs != 0 || sym.is_some();

        enum Plan {
            AddImm(Node),
            Add(Node, Node),
            Shl(Node, u8),
            IncDec(Node, bool),
        }

        let plan = if Some(out_reg) == base_reg {
            let base = base.unwrap();
            if index.is_none() {
                if self.features.use_incdec && sym.is_none() && (offs == 1 || offs == -1) {
                    Plan::IncDec(base, offs == 1)
                } else {
                    Plan::AddImm(base)
                }
            } else if scale == 0 && !has_immediates {
                Plan::Add(base, index.unwrap())
            } else {
                return None;
            }
        } else if Some(out_reg) == index_reg {
            let index = index.unwrap();
            if base.is_none() && has_immediates && scale == 0 {
                Plan::AddImm(index)
            } else if base.is_none() && !has_immediates && scale > 0 {
                Plan::Shl(index, scale)
            } else if base.is_some() && scale == 0 && !has_immediates {
                Plan::Add(index, base.unwrap())
            } else {
                return None;
            }
        } else {
            return None;
        };

        let block = graph.block_of(node);
        let res = match plan {
            Plan::IncDec(op1, inc) => {
                let noreg = new_noreg(graph, block);
                let no_mem = graph.no_mem;
                let mut nattr = Ia32Attr::new();
                nattr.ls_mode = Some(Mode::U32);
                let op = if inc { Ia32Op::Inc } else { Ia32Op::Dec };
                graph.add_node_attr(
                    block,
                    Op::Ia32(op),
                    Mode::U32,
                    &[noreg, noreg, no_mem, op1],
                    Attr::Ia32(Box::new(nattr)),
                )
            }
            Plan::AddImm(op1) => {
                let imm = graph.add_node_attr(
                    block,
                    Op::Ia32(Ia32Op::Immediate),
                    Mode::U32,
                    &[],
                    Attr::Ia32(Box::new(Ia32Attr::with_variant(AttrVariant::Immediate {
                        ent: sym,
                        sign,
                        offset: offs,
                    }))),
                );
                graph.set_reg(imm, regs::gp_noreg());
                let noreg = new_noreg(graph, block);
                let no_mem = graph.no_mem;
                let mut nattr = Ia32Attr::new();
                nattr.ls_mode = Some(Mode::U32);
                graph.add_node_attr(
                    block,
                    Op::Ia32(Ia32Op::Add),
                    Mode::U32,
                    &[noreg, noreg, no_mem, op1, imm],
                    Attr::Ia32(Box::new(nattr)),
                )
            }
            Plan::Add(op1, op2) => {
                let noreg = new_noreg(graph, block);
                let no_mem = graph.no_mem;
                let mut nattr = Ia32Attr::new();
                nattr.ls_mode = Some(Mode::U32);
                nattr.commutative = true;
                graph.add_node_attr(
                    block,
                    Op::Ia32(Ia32Op::Add),
                    Mode::U32,
                    &[noreg, noreg, no_mem, op1, op2],
                    Attr::Ia32(Box::new(nattr)),
                )
            }
            Plan::Shl(op1, scale) => {
                let imm = graph.add_node_attr(
                    block,
                    Op::Ia32(Ia32Op::Immediate),
                    Mode::U32,
                    &[],
                    Attr::Ia32(Box::new(Ia32Attr::with_variant(AttrVariant::Immediate {
                        ent: None,
                        sign: false,
                        offset: scale as i32,
                    }))),
                );
                graph.set_reg(imm, regs::gp_noreg());
                let mut nattr = Ia32Attr::new();
                nattr.ls_mode = Some(Mode::U32);
                graph.add_node_attr(
                    block,
                    Op::Ia32(Ia32Op::Shl),
                    Mode::U32,
                    &[op1, imm],
                    Attr::Ia32(Box::new(nattr)),
                )
            }
        };
        graph.set_reg(res, out_reg);

        ctx.sched.add_before(graph, node, res);
        ctx.sched.remove(graph, node);
        graph.exchange(node, res);
        debug!("rewrote lea into {:?}", res);
        Some(res)
    }

    /// `test r, r` right after an instruction that already set the zero
    /// flag on the same value: reuse those flags.
    fn peephole_test(&mut self, ctx: &mut PeepholeCtx, node: Node) -> Option<Node> {
        let graph = &mut *ctx.graph;
        let left = graph.in_at(node, n::LEFT);
        let right = graph.in_at(node, n::RIGHT);
        // Only a test for zero qualifies.
        if left != right {
            return None;
        }
        let block = graph.block_of(node);
        if graph.block_of(left) != block {
            return None;
        }

        let (producer, pn) = if graph.op(left) == Op::Proj {
            (graph.in_at(left, 0), Some(graph.attr(left).proj()))
        } else {
            (left, None)
        };
        if let Some(pn) = pn {
            if pn != out::RES {
                return None;
            }
        }

        // Walk the schedule up; anything touching the flags in between
        // kills the idea.
        let my_pos = ctx.sched.position(graph, node);
        let prod_pos = ctx.sched.position(graph, producer);
        if prod_pos >= my_pos {
            return None;
        }
        let nodes = ctx.sched.block_nodes(block);
        for &between in &nodes[(prod_pos + 1) as usize..my_pos as usize] {
            if let Op::Ia32(op) = graph.op(between) {
                if op.modifies_flags() {
                    return None;
                }
            }
        }

        // Only the Eq/Ne consumers survive a zero-flag substitute.
        for u in graph.uses(node).to_vec() {
            let user_attr = match graph.attr(u.user) {
                Attr::Ia32(a) => a,
                _ => return None,
            };
            match &user_attr.variant {
                AttrVariant::CondCode(cc)
                    if cc.relation == Relation::EQ || cc.relation == Relation::LG => {}
                _ => return None,
            }
        }

        if !produces_zero_flag(graph, producer) {
            return None;
        }

        // Give the producer a flags output and use it in place of the
        // test.
        if graph.mode(producer) != Mode::T {
            let users = graph.uses(producer).to_vec();
            let reg = graph.reg(producer);
            graph.set_mode(producer, Mode::T);
            let res = graph.proj(producer, Mode::U32, out::RES);
            if let Some(reg) = reg {
                graph.set_reg(res, reg);
            }
            for u in users {
                match u.kind {
                    crate::ir::UseKind::Data => graph.set_in(u.user, u.pos as usize, res),
                    crate::ir::UseKind::Dep => {}
                }
            }
            let mut outs = graph.out_reqs(producer).to_vec();
            if outs.len() < 2 {
                outs.push(RegReq::Normal(CLASS_FLAGS));
                let ins = graph.in_reqs(producer).to_vec();
                graph.set_reqs(producer, ins, outs);
            }
        }
        let flags = graph.proj(producer, Mode::Flags, out::FLAGS);
        graph.set_reg(flags, regs::eflags_reg());

        ctx.sched.remove(graph, node);
        graph.exchange(node, flags);
        debug!("reused the flags of {:?} for a zero test", producer);
        Some(flags)
    }

    /// Returns which are branch targets get padded against the Athlon
    /// branch-target penalty.
    fn peephole_return(&mut self, ctx: &mut PeepholeCtx, node: Node) -> Option<Node> {
        if !self.features.use_pad_return {
            return None;
        }
        let graph = &mut *ctx.graph;
        let block = graph.block_of(node);
        if graph.n_ins(block) == 1 {
            let pred = graph.in_at(block, 0);
            if graph.op(pred) == Op::Jmp {
                // A single jump predecessor is encoded as a fall-through.
                return None;
            }
        }

        // The return must be the first real instruction of its block.
        let pos = ctx.sched.position(graph, node);
        let nodes: Vec<Node> = ctx.sched.block_nodes(block)[..pos as usize].to_vec();
        for before in nodes {
            match graph.op(before) {
                Op::Phi | Op::Keep => continue,
                Op::IncSp => match graph.attr(before) {
                    Attr::IncSp { offset: 0 } => continue,
                    _ => return None,
                },
                _ => return None,
            }
        }

        if let Attr::Return { pad, .. } = graph.attr_mut(node) {
            if !*pad {
                *pad = true;
                debug!("padding return {:?}", node);
            }
        }
        None
    }

    /// Split `imul mem, imm` into a load and `imul reg, imm` when the form
    /// is slow on the selected CPU.
    fn peephole_imul(&mut self, ctx: &mut PeepholeCtx, node: Node) -> Option<Node> {
        if self.features.use_imul_mem_imm32 {
            return None;
        }
        {
            let graph = &*ctx.graph;
            let right = graph.in_at(node, n::RIGHT);
            if !is_op(graph, right, Ia32Op::Immediate) {
                return None;
            }
            if attr(graph, node).op_type != OpType::AddrModeS {
                return None;
            }
        }
        let reg = ctx.free_reg(CLASS_GP)?;

        let graph = &mut *ctx.graph;
        let block = graph.block_of(node);
        let base = graph.in_at(node, n::BASE);
        let index = graph.in_at(node, n::INDEX);
        let mem = graph.in_at(node, n::MEM);

        let mut load_attr = Ia32Attr::new();
        {
            let a = attr(graph, node);
            load_attr.op_type = OpType::AddrModeS;
            load_attr.am_scale = a.am_scale;
            load_attr.am_offs = a.am_offs;
            load_attr.am_sym = a.am_sym;
            load_attr.am_sym_sign = a.am_sym_sign;
            load_attr.use_frame = a.use_frame;
            load_attr.frame_ent = a.frame_ent;
            load_attr.ls_mode = a.ls_mode;
        }
        let load = graph.add_node_attr(
            block,
            Op::Ia32(Ia32Op::Load),
            Mode::T,
            &[base, index, mem],
            Attr::Ia32(Box::new(load_attr)),
        );
        ctx.sched.add_before(graph, node, load);
        let res = graph.proj(load, Mode::U32, out::LOAD_RES);
        graph.set_reg(res, reg);
        let mem_proj = graph.proj(load, Mode::M, out::LOAD_MEM);

        let noreg = new_noreg(graph, block);
        graph.set_in(node, n::BASE, noreg);
        graph.set_in(node, n::INDEX, noreg);
        graph.set_in(node, n::MEM, mem_proj);
        graph.set_in(node, n::LEFT, res);
        {
            let a = attr_mut(graph, node);
            a.op_type = OpType::Normal;
            a.am_scale = 0;
            a.am_offs = 0;
            a.am_sym = None;
            a.use_frame = false;
            a.frame_ent = None;
        }
        debug!("split imul {:?} into load + imul", node);
        None
    }
}

/// Does the instruction set the zero flag according to its result?
fn produces_zero_flag(graph: &Graph, node: Node) -> bool {
    let op = match graph.op(node) {
        Op::Ia32(op) => op,
        _ => return false,
    };
    match op {
        Ia32Op::Add
        | Ia32Op::Adc
        | Ia32Op::And
        | Ia32Op::Or
        | Ia32Op::Xor
        | Ia32Op::Sub
        | Ia32Op::Sbb
        | Ia32Op::Neg
        | Ia32Op::Inc
        | Ia32Op::Dec
        | Ia32Op::Popcnt => true,
        Ia32Op::Shl | Ia32Op::Shr | Ia32Op::Sar | Ia32Op::ShlD | Ia32Op::ShrD => {
            // A zero shift count leaves the flags untouched, so only
            // constant nonzero counts qualify.
            let count = graph.in_at(node, graph.n_ins(node) - 1);
            if !is_op(graph, count, Ia32Op::Immediate) {
                return false;
            }
            match &attr(graph, count).variant {
                AttrVariant::Immediate {
                    ent: None, offset, ..
                } => offset & 0x1f != 0,
                _ => false,
            }
        }
        _ => false,
    }
}

fn is_noreg(graph: &Graph, node: Node) -> bool {
    matches!(
        graph.op(node),
        Op::Ia32(Ia32Op::NoRegGp) | Op::Ia32(Ia32Op::NoRegXmm) | Op::Ia32(Ia32Op::NoRegVfp)
    )
}

fn new_noreg(graph: &mut Graph, _block: Node) -> Node {
    let block = graph.start_block;
    let node = graph.add_node_attr(
        block,
        Op::Ia32(Ia32Op::NoRegGp),
        Mode::U32,
        &[],
        Attr::Ia32(Box::new(Ia32Attr::new())),
    );
    graph.set_reg(node, regs::gp_noreg());
    node
}

impl<'a> PeepholeHandler for Ia32Peephole<'a> {
    fn optimize(&mut self, ctx: &mut PeepholeCtx, node: Node) -> Option<Node> {
        match ctx.graph.op(node) {
            Op::Ia32(Ia32Op::Const) => self.peephole_const(ctx, node),
            Op::IncSp => self.peephole_incsp(ctx, node),
            Op::Ia32(Ia32Op::Lea) => self.peephole_lea(ctx, node),
            Op::Ia32(Ia32Op::Test) => self.peephole_test(ctx, node),
            Op::Return => self.peephole_return(ctx, node),
            Op::Ia32(Ia32Op::IMul) => self.peephole_imul(ctx, node),
            _ => None,
        }
    }
}
