//! ia32 calling convention and stack frame handling.
//!
//! Parameters are passed on the stack for cdecl and variadic functions; the
//! register-parameter convention puts the first three integer arguments in
//! eax, edx and ecx. Return values use eax (st0 for floats). The frame is
//! laid out late: local slots get their offsets here, and the frame-relative
//! accesses are rewritten into plain stack-pointer addressing, adjusting for
//! the stack bias the pushes and stack adjustments introduce.

use log::debug;
use rustc_hash::FxHashSet;

use crate::abi::{AbiSignature, ArgLoc, BetweenType, CallConv, CallPlacement};
use crate::ir::{pn, Attr, Entity, EntityKind, Graph, Mode, Node, Op, SymbolTable};
use crate::isa::ia32::attrs::Ia32Attr;
use crate::isa::ia32::regs::{self, REG_EAX, REG_ECX, REG_EDX};
use crate::isa::ia32::{attr_mut, out, Ia32Op};
use crate::isa::CpuFeatures;
use crate::CodegenResult;

/// The layout between the argument area and the local frame: the return
/// address alone, or the saved frame pointer below it when the frame
/// pointer is kept.
pub fn between_type(features: &CpuFeatures) -> BetweenType {
    BetweenType {
        saved_fp: !features.omit_frame_pointer,
        slot_size: 4,
    }
}

/// Compute where the parameters and results of `sig` live.
pub fn placement(sig: &AbiSignature) -> CallPlacement {
    let mut params = Vec::with_capacity(sig.params.len());
    let mut offset = 0i32;
    let mut regs_used = 0;
    let reg_order = [REG_EAX, REG_EDX, REG_ECX];
    for &mode in &sig.params {
        let in_reg = sig.call_conv == CallConv::RegParam
            && regs_used < reg_order.len()
            && !mode.is_float()
            && mode.bits() <= 32;
        if in_reg {
            params.push(ArgLoc::Reg(regs::gp_reg(reg_order[regs_used])));
            regs_used += 1;
        } else {
            params.push(ArgLoc::Stack(offset));
            let slot = ((mode.bytes() + 3) / 4 * 4) as i32;
            offset += slot;
        }
    }

    let mut results = Vec::new();
    for &mode in &sig.results {
        if mode.is_float() {
            // Floats return on the fp stack regardless of SSE.
            results.push(ArgLoc::Reg(regs::gp_reg(REG_EAX)));
        } else if mode.bits() > 32 {
            // 64-bit results split into edx:eax.
            results.push(ArgLoc::Reg(regs::gp_reg(REG_EAX)));
            results.push(ArgLoc::Reg(regs::gp_reg(REG_EDX)));
        } else {
            results.push(ArgLoc::Reg(regs::gp_reg(REG_EAX)));
        }
    }

    CallPlacement {
        params,
        stack_bytes: offset as u32,
        results,
        callee_pop: 0,
    }
}

/// The callee-saved registers of the convention.
pub fn callee_saved() -> [u8; 3] {
    [regs::REG_EBX, regs::REG_ESI, regs::REG_EDI]
}

/// Assign offsets to the local frame slots referenced by the graph.
/// Returns the total frame size, aligned to the stack alignment.
fn layout_frame(symbols: &mut SymbolTable, graph: &Graph, stack_alignment: u32) -> u32 {
    let mut seen: FxHashSet<Entity> = FxHashSet::default();
    let mut slots: Vec<Entity> = Vec::new();
    for node in graph.nodes() {
        if let Attr::Ia32(a) = graph.attr(node) {
            if let Some(ent) = a.frame_ent {
                if let EntityKind::FrameSlot {
                    incoming: false, ..
                } = symbols.get(ent).kind
                {
                    if seen.insert(ent) {
                        slots.push(ent);
                    }
                }
            }
        }
    }

    let mut offset = 0u32;
    for ent in slots {
        let size = match symbols.get(ent).kind {
            EntityKind::FrameSlot { size, .. } => size,
            _ => unreachable!(),
        };
        let align = size.min(8).max(4);
        offset = (offset + align - 1) & !(align - 1);
        symbols.set_frame_offset(ent, offset as i32);
        offset += size;
    }
    (offset + stack_alignment - 1) & !(stack_alignment - 1)
}

/// The stack pointer value node of the graph (creating it on demand).
fn sp_value(graph: &mut Graph) -> Node {
    if let Some(sp) = graph.find_proj(graph.start, pn::START_SP) {
        return sp;
    }
    let start = graph.start;
    let sp = graph.proj(start, Mode::U32, pn::START_SP);
    graph.set_reg(sp, regs::esp_reg());
    sp
}

/// The incoming frame pointer value node (creating it on demand).
fn fp_value(graph: &mut Graph) -> Node {
    if let Some(bp) = graph.find_proj(graph.start, pn::START_FP) {
        return bp;
    }
    let start = graph.start;
    let bp = graph.proj(start, Mode::U32, pn::START_FP);
    graph.set_reg(bp, regs::ebp_reg());
    bp
}

fn new_noreg(graph: &mut Graph) -> Node {
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

/// Append `node` to the prologue: after the previous prologue node, or
/// right behind the function entry.
fn place_prologue(
    graph: &Graph,
    sched: &mut crate::sched::Schedule,
    prev: &mut Option<Node>,
    node: Node,
) {
    match *prev {
        Some(p) => sched.add_after(graph, p, node),
        None => {
            if sched.is_scheduled(graph.start) {
                sched.add_after(graph, graph.start, node);
            } else {
                sched.add_front(graph, graph.start_block, node);
            }
        }
    }
    *prev = Some(node);
}

/// Insert the prologue and epilogue.
///
/// With the frame pointer omitted the prologue is a single stack
/// adjustment (when the function has locals at all) and the epilogue its
/// inverse before every return. With the frame pointer kept, the prologue
/// saves the old frame pointer and re-bases it on the stack pointer, and
/// the epilogue is a `leave` (or the manual restore when `leave` is slow
/// on the selected CPU).
pub fn introduce_prologue_epilogue(
    features: &CpuFeatures,
    symbols: &mut SymbolTable,
    graph: &mut Graph,
    sched: &mut crate::sched::Schedule,
    _sig: &AbiSignature,
) -> CodegenResult<()> {
    let omit_fp = features.omit_frame_pointer;
    let frame_size = layout_frame(symbols, graph, features.stack_alignment);
    if omit_fp && frame_size == 0 {
        return Ok(());
    }
    debug!("frame of {:?}: {} bytes", graph.entity, frame_size);

    let sp = sp_value(graph);
    let mut prev = None;
    let mut frame_base = sp;

    let bp = if omit_fp {
        None
    } else {
        // push %ebp; movl %esp, %ebp
        let bp = fp_value(graph);
        let noreg = new_noreg(graph);
        let no_mem = graph.no_mem;
        let mut push_attr = Ia32Attr::new();
        push_attr.ls_mode = Some(Mode::U32);
        let push = graph.add_node_attr(
            graph.start_block,
            Op::Ia32(Ia32Op::Push),
            Mode::T,
            &[noreg, noreg, no_mem, bp, sp],
            Attr::Ia32(Box::new(push_attr)),
        );
        place_prologue(graph, sched, &mut prev, push);
        let stack = graph.proj(push, Mode::U32, out::PUSH_STACK);
        graph.set_reg(stack, regs::esp_reg());

        let rebase = graph.add_node(graph.start_block, Op::Copy, Mode::U32, &[stack]);
        graph.set_reg(rebase, regs::ebp_reg());
        place_prologue(graph, sched, &mut prev, rebase);

        frame_base = stack;
        Some(bp)
    };

    if frame_size > 0 {
        let incsp = graph.add_node_attr(
            graph.start_block,
            Op::IncSp,
            Mode::U32,
            &[frame_base],
            Attr::IncSp {
                offset: frame_size as i32,
            },
        );
        graph.set_reg(incsp, regs::esp_reg());
        place_prologue(graph, sched, &mut prev, incsp);
    }

    let returns: Vec<Node> = graph.ins(graph.end_block).to_vec();
    for ret in returns {
        if graph.op(ret) != Op::Return {
            continue;
        }
        let block = graph.block_of(ret);
        match bp {
            Some(bp) => {
                if features.use_leave {
                    // leave restores the stack pointer and pops the saved
                    // frame pointer in one instruction.
                    let leave = graph.add_node_attr(
                        block,
                        Op::Ia32(Ia32Op::Leave),
                        Mode::U32,
                        &[bp],
                        Attr::Ia32(Box::new(Ia32Attr::new())),
                    );
                    graph.set_reg(leave, regs::esp_reg());
                    sched.add_before(graph, ret, leave);
                } else {
                    // movl %ebp, %esp; popl %ebp
                    let restore = graph.add_node(block, Op::Copy, Mode::U32, &[bp]);
                    graph.set_reg(restore, regs::esp_reg());
                    sched.add_before(graph, ret, restore);
                    let no_mem = graph.no_mem;
                    let pop = graph.add_node_attr(
                        block,
                        Op::Ia32(Ia32Op::Pop),
                        Mode::T,
                        &[no_mem, sp],
                        Attr::Ia32(Box::new(Ia32Attr::new())),
                    );
                    let res = graph.proj(pop, Mode::U32, out::POP_RES);
                    graph.set_reg(res, regs::ebp_reg());
                    let stack = graph.proj(pop, Mode::U32, out::POP_STACK);
                    graph.set_reg(stack, regs::esp_reg());
                    sched.add_before(graph, ret, pop);
                }
            }
            None => {
                if frame_size > 0 {
                    let shrink = graph.add_node_attr(
                        block,
                        Op::IncSp,
                        Mode::U32,
                        &[sp],
                        Attr::IncSp {
                            offset: -(frame_size as i32),
                        },
                    );
                    graph.set_reg(shrink, regs::esp_reg());
                    sched.add_before(graph, ret, shrink);
                }
            }
        }
    }
    Ok(())
}

/// Resolve frame-relative addressing and the stack bias.
///
/// Every frame access was recorded against a frame entity during the
/// transformation; now that the layout and the schedule are final, the
/// entity references become plain displacements off the stack pointer,
/// corrected by the bias the stack-modifying instructions before the
/// access introduce.
pub fn finish_frame(
    features: &CpuFeatures,
    symbols: &mut SymbolTable,
    graph: &mut Graph,
    sched: &mut crate::sched::Schedule,
) -> CodegenResult<()> {
    // Frame size as laid out by the prologue pass. Recomputing the layout
    // here is idempotent: offsets were already assigned.
    let frame_size: i32 = graph
        .blocks()
        .iter()
        .flat_map(|&b| sched.block_nodes(b).iter())
        .find_map(|&n| match (graph.op(n), graph.attr(n)) {
            (Op::IncSp, Attr::IncSp { offset }) if *offset > 0 => Some(*offset),
            _ => None,
        })
        .unwrap_or(0);
    // The saved frame pointer sits between the return address and the
    // locals and shifts every stack-pointer-relative distance by a word.
    let saved_fp = if features.omit_frame_pointer { 0 } else { 4 };
    let prologue_bias = frame_size + saved_fp;

    for block in graph.blocks() {
        // The bias at block entry: zero until the prologue has run, the
        // full prologue adjustment afterwards.
        let mut bias: i32 = if block == graph.start_block { 0 } else { prologue_bias };
        let nodes: Vec<Node> = sched.block_nodes(block).to_vec();
        for node in nodes {
            match graph.op(node) {
                Op::IncSp => {
                    if let Attr::IncSp { offset } = graph.attr(node) {
                        bias += *offset;
                    }
                }
                Op::Ia32(Ia32Op::Push) => bias += 4,
                Op::Ia32(Ia32Op::Pop) => bias -= 4,
                _ => {}
            }
            let resolved = {
                let is_frame = matches!(graph.attr(node), Attr::Ia32(a) if a.use_frame);
                if is_frame {
                    let (ent, incoming_off) = {
                        let a = crate::isa::ia32::attr(graph, node);
                        let ent = a.frame_ent.expect("frame access without entity");
                        (ent, symbols.frame_offset(ent))
                    };
                    let incoming = matches!(
                        symbols.get(ent).kind,
                        EntityKind::FrameSlot { incoming: true, .. }
                    );
                    let delta = if incoming {
                        // Above the return address: entry-relative.
                        incoming_off + bias
                    } else {
                        // Local slot: frame-base relative.
                        incoming_off + bias - prologue_bias
                    };
                    Some(delta)
                } else {
                    None
                }
            };
            if let Some(delta) = resolved {
                let a = attr_mut(graph, node);
                a.am_offs += delta;
                a.use_frame = false;
                a.frame_ent = None;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cdecl_params_go_to_the_stack() {
        let sig = AbiSignature::cdecl(vec![Mode::I32, Mode::F64, Mode::I16], vec![Mode::I32]);
        let p = placement(&sig);
        match (p.params[0], p.params[1], p.params[2]) {
            (ArgLoc::Stack(0), ArgLoc::Stack(4), ArgLoc::Stack(12)) => {}
            other => panic!("unexpected placement {:?}", other),
        }
        assert_eq!(p.stack_bytes, 16);
    }

    #[test]
    fn reg_param_uses_eax_edx_ecx() {
        let sig = AbiSignature {
            call_conv: CallConv::RegParam,
            params: vec![Mode::I32, Mode::I32, Mode::I32, Mode::I32],
            results: vec![],
        };
        let p = placement(&sig);
        match (p.params[0], p.params[1], p.params[2], p.params[3]) {
            (ArgLoc::Reg(a), ArgLoc::Reg(d), ArgLoc::Reg(c), ArgLoc::Stack(0)) => {
                assert_eq!(a.name, "eax");
                assert_eq!(d.name, "edx");
                assert_eq!(c.name, "ecx");
            }
            other => panic!("unexpected placement {:?}", other),
        }
    }

    #[test]
    fn between_type_follows_the_frame_pointer_choice() {
        let mut features = CpuFeatures::default();
        let bt = between_type(&features);
        assert!(!bt.saved_fp);
        assert_eq!(bt.size(), 4);
        assert_eq!(bt.ret_addr_offset(), 0);

        features.omit_frame_pointer = false;
        let bt = between_type(&features);
        assert!(bt.saved_fp);
        assert_eq!(bt.size(), 8);
        assert_eq!(bt.ret_addr_offset(), 4);
    }

    /// With the frame pointer kept, the prologue saves and re-bases it and
    /// the epilogue is a leave.
    #[test]
    fn saved_fp_prologue_and_leave_epilogue() {
        use crate::sched::Schedule;

        let mut symbols = SymbolTable::new();
        let ent = symbols.define_function("f", crate::ir::Visibility::Local);
        let mut graph = Graph::new(ent);
        let b = graph.start_block;
        let no_mem = graph.no_mem;
        let ret = graph.add_node_attr(
            b,
            Op::Return,
            Mode::X,
            &[no_mem],
            Attr::Return { pop: 0, pad: false },
        );
        let end_block = graph.end_block;
        graph.add_in(end_block, ret);

        let mut sched = Schedule::new();
        sched.append(b, graph.start);
        sched.append(b, ret);

        let mut features = CpuFeatures::default();
        features.omit_frame_pointer = false;
        let sig = AbiSignature::cdecl(vec![], vec![]);
        introduce_prologue_epilogue(&features, &mut symbols, &mut graph, &mut sched, &sig)
            .unwrap();

        let order: Vec<Op> = sched.block_nodes(b).iter().map(|&n| graph.op(n)).collect();
        let push_at = order
            .iter()
            .position(|&o| o == Op::Ia32(Ia32Op::Push))
            .expect("no frame pointer save");
        let rebase_at = order
            .iter()
            .position(|&o| o == Op::Copy)
            .expect("no frame pointer rebase");
        let leave_at = order
            .iter()
            .position(|&o| o == Op::Ia32(Ia32Op::Leave))
            .expect("no leave epilogue");
        let ret_at = order.iter().position(|&o| o == Op::Return).unwrap();
        assert!(push_at < rebase_at && rebase_at < leave_at && leave_at < ret_at);

        // Without leave the epilogue restores manually.
        let mut graph2 = Graph::new(ent);
        let no_mem2 = graph2.no_mem;
        let b2 = graph2.start_block;
        let ret2 = graph2.add_node_attr(
            b2,
            Op::Return,
            Mode::X,
            &[no_mem2],
            Attr::Return { pop: 0, pad: false },
        );
        let end_block2 = graph2.end_block;
        graph2.add_in(end_block2, ret2);
        let mut sched2 = Schedule::new();
        sched2.append(b2, graph2.start);
        sched2.append(b2, ret2);
        features.use_leave = false;
        introduce_prologue_epilogue(&features, &mut symbols, &mut graph2, &mut sched2, &sig)
            .unwrap();
        let order2: Vec<Op> = sched2.block_nodes(b2).iter().map(|&n| graph2.op(n)).collect();
        assert!(order2.contains(&Op::Ia32(Ia32Op::Pop)));
        assert!(!order2.contains(&Op::Ia32(Ia32Op::Leave)));
    }
}
