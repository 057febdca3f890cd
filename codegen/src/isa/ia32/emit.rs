//! ia32 assembler emission (AT&T syntax).
//!
//! Walks the blocks in layout order and prints one line per scheduled
//! node. Jump emission negates conditions so the false edge becomes a
//! fall-through where the layout allows; switch tables land in rodata.

use core::fmt::Write;

use crate::gas::GasEmitter;
use crate::ir::{Attr, Graph, Mode, Node, Op, Relation, SymbolTable};
use crate::isa::ia32::attrs::{AttrVariant, CondCode, Ia32Attr, OpType};
use crate::isa::ia32::regs::{reg_16bit_name, reg_8bit_high_name, reg_8bit_name};
use crate::isa::ia32::{attr, n, out, Ia32Op};
use crate::isa::CpuFeatures;
use crate::regs::Register;
use crate::sched::blocksched::BlockSchedule;
use crate::sched::Schedule;
use crate::{CodegenError, CodegenResult};

struct EmitCtx<'a> {
    em: &'a mut GasEmitter,
    features: &'a CpuFeatures,
    symbols: &'a SymbolTable,
    graph: &'a Graph,
    sched: &'a Schedule,
    blocks: &'a BlockSchedule,
    /// Jump tables are numbered per function.
    jt_counter: u32,
    /// Exception labels are numbered per function, ascending in schedule
    /// order.
    exc_counter: u64,
    exc_list: Vec<(u64, Node)>,
    /// Numeric local labels (`1:`) used by the float branch fixups.
    local_label: u32,
}

/// Emit one function.
pub fn emit_function(
    features: &CpuFeatures,
    em: &mut GasEmitter,
    symbols: &SymbolTable,
    graph: &Graph,
    sched: &Schedule,
    blocks: &BlockSchedule,
) -> CodegenResult<()> {
    em.function_prolog(symbols, graph.entity, features.function_alignment);
    let mut ctx = EmitCtx {
        em,
        features,
        symbols,
        graph,
        sched,
        blocks,
        jt_counter: 0,
        exc_counter: 0,
        exc_list: Vec::new(),
        local_label: 0,
    };
    for &block in blocks.blocks() {
        ctx.emit_block(block)?;
    }
    let exc_list = std::mem::take(&mut ctx.exc_list);
    em.function_epilog(symbols, graph.entity);

    // The exception sidetable: (instruction label, block label) pairs in
    // ascending id order.
    if !exc_list.is_empty() {
        let insn_prefix = em.insn_label_prefix();
        let block_prefix = em.block_label_prefix();
        for (id, block) in exc_list {
            let _ = writeln!(em, "\t.long {}{}", insn_prefix, id);
            let _ = writeln!(em, "\t.long {}{}", block_prefix, block.as_u32());
        }
    }
    Ok(())
}

impl<'a> EmitCtx<'a> {
    fn block_label(&self, block: Node) -> String {
        format!("{}{}", self.em.block_label_prefix(), block.as_u32())
    }

    /// A block needs a label when some predecessor reaches it by an actual
    /// jump.
    fn block_needs_label(&self, block: Node) -> bool {
        let n_preds = self.graph.n_ins(block);
        if n_preds == 0 {
            return false;
        }
        if n_preds > 1 {
            return true;
        }
        let pred = self.graph.in_at(block, 0);
        if self.graph.op(pred) == Op::Proj {
            let producer = self.graph.in_at(pred, 0);
            if self.graph.op(producer) == Op::Ia32(Ia32Op::SwitchJmp) {
                return true;
            }
        }
        match self.blocks.prev(block) {
            Some(prev) => prev != self.graph.block_of(pred),
            None => true,
        }
    }

    fn emit_block(&mut self, block: Node) -> CodegenResult<()> {
        if self.block_needs_label(block) {
            // Without execution frequencies, a join with several
            // predecessors counts as hot; a zero alignment factor turns
            // the padding off entirely.
            let align = self.features.label_alignment;
            if align > 0
                && self.features.label_alignment_factor > 0
                && self.graph.n_ins(block) > 1
            {
                let _ = writeln!(
                    self.em,
                    "\t.p2align {},,{}",
                    align.trailing_zeros().max(1),
                    self.features.label_alignment_max_skip
                );
            }
            let label = self.block_label(block);
            let _ = writeln!(self.em, "{}:", label);
        }
        let nodes: Vec<Node> = self.sched.block_nodes(block).to_vec();
        for node in nodes {
            self.emit_node(node)?;
        }
        Ok(())
    }

    // ---- operand printing ------------------------------------------------

    fn reg_of(&self, node: Node) -> CodegenResult<&'static Register> {
        self.graph.reg(node).ok_or_else(|| {
            CodegenError::RegConstraint(format!("node {:?} has no register assigned", node))
        })
    }

    fn write_register(&mut self, reg: &Register, mode: Option<Mode>) {
        let name = match mode.map(|m| m.bits()) {
            Some(8) => reg_8bit_name(reg),
            Some(16) => reg_16bit_name(reg),
            _ => reg.name,
        };
        let _ = write!(self.em, "%{}", name);
    }

    /// `%Sn`: the register of the n-th input, sized by `mode`.
    fn write_src(&mut self, node: Node, pos: usize, mode: Option<Mode>) -> CodegenResult<()> {
        let op = self.graph.in_at(node, pos);
        if self.graph.op(op) == Op::Ia32(Ia32Op::Immediate) {
            let _ = write!(self.em, "$");
            self.write_immediate_payload(op);
            return Ok(());
        }
        let reg = self.reg_of(op)?;
        self.write_register(reg, mode);
        Ok(())
    }

    /// `%Dn`: the register of the n-th output.
    fn write_dst(&mut self, node: Node, pos: i64, mode: Option<Mode>) -> CodegenResult<()> {
        let value = if self.graph.mode(node) == Mode::T {
            self.graph.find_proj(node, pos).ok_or_else(|| {
                CodegenError::Constraint(format!("node {:?} misses output {}", node, pos))
            })?
        } else {
            node
        };
        let reg = self.reg_of(value)?;
        self.write_register(reg, mode);
        Ok(())
    }

    fn write_immediate_payload(&mut self, node: Node) {
        let a = attr(self.graph, node);
        let (ent, sign, offset) = a.immediate();
        if let Some(ent) = ent {
            if sign {
                let _ = write!(self.em, "-");
            }
            let name = self.symbols.name(ent).to_string();
            let _ = write!(self.em, "{}", name);
            if offset != 0 {
                let _ = write!(self.em, "{:+}", offset);
            }
        } else {
            let _ = write!(self.em, "{}", offset);
        }
    }

    /// `%AM`: the full address operand `sym±off(%base,%index,scale)`.
    fn write_am(&mut self, node: Node) -> CodegenResult<()> {
        let a = attr(self.graph, node).clone();
        debug_assert!(!a.use_frame, "unresolved frame access at emission");
        let base = self.graph.in_at(node, n::BASE);
        let index = self.graph.in_at(node, n::INDEX);
        let has_base = !is_virtual(self.graph, base);
        let has_index = !is_virtual(self.graph, index);

        if let Some(ent) = a.am_sym {
            if a.am_sym_sign {
                let _ = write!(self.em, "-");
            }
            let name = self.symbols.name(ent).to_string();
            let _ = write!(self.em, "{}", name);
            if self.features.pic && self.em.format() == crate::gas::ObjectFormat::Elf {
                let _ = write!(self.em, "@GOTOFF");
            }
        }
        if a.am_offs != 0 || (a.am_sym.is_none() && !has_base && !has_index) {
            if a.am_sym.is_some() {
                let _ = write!(self.em, "{:+}", a.am_offs);
            } else {
                let _ = write!(self.em, "{}", a.am_offs);
            }
        }
        if has_base || has_index {
            let _ = write!(self.em, "(");
            if has_base {
                let reg = self.reg_of(base)?;
                self.write_register(reg, None);
            }
            if has_index {
                let _ = write!(self.em, ",");
                let reg = self.reg_of(index)?;
                self.write_register(reg, None);
                if a.am_scale > 0 {
                    let _ = write!(self.em, ",{}", 1 << a.am_scale);
                }
            }
            let _ = write!(self.em, ")");
        }
        Ok(())
    }

    /// `%ASn`: the address operand if the node reads memory, the register
    /// otherwise.
    fn write_am_or_src(
        &mut self,
        node: Node,
        pos: usize,
        mode: Option<Mode>,
    ) -> CodegenResult<()> {
        if attr(self.graph, node).op_type == OpType::AddrModeS {
            self.write_am(node)
        } else {
            self.write_src(node, pos, mode)
        }
    }

    /// The operands of a two-address ALU instruction: source, destination.
    fn write_binop_operands(&mut self, node: Node) -> CodegenResult<()> {
        let a = attr(self.graph, node);
        let ls = sub_reg_mode(a.ls_mode);
        let right = self.graph.in_at(node, n::RIGHT);
        if self.graph.op(right) == Op::Ia32(Ia32Op::Immediate) {
            self.write_src(node, n::RIGHT, ls)?;
            let _ = write!(self.em, ", ");
            if a.op_type == OpType::AddrModeD {
                self.write_am(node)?;
            } else {
                self.write_src(node, n::LEFT, ls)?;
            }
        } else if a.op_type == OpType::AddrModeS {
            self.write_am(node)?;
            let _ = write!(self.em, ", ");
            self.write_src(node, n::LEFT, ls)?;
        } else if a.op_type == OpType::AddrModeD {
            self.write_src(node, n::UNARY, ls)?;
            let _ = write!(self.em, ", ");
            self.write_am(node)?;
        } else {
            self.write_src(node, n::RIGHT, ls)?;
            let _ = write!(self.em, ", ");
            self.write_src(node, n::LEFT, ls)?;
        }
        Ok(())
    }

    /// `%M`: the mode suffix letter.
    fn mode_suffix(mode: Mode) -> &'static str {
        match mode.bits() {
            8 => "b",
            16 => "w",
            32 => "l",
            64 => "q",
            _ => "",
        }
    }

    /// `%P`: the condition mnemonic.
    fn cmp_suffix(cc: CondCode) -> &'static str {
        cc_mnemonic(cc)
    }

    /// The block a control-flow output jumps to.
    fn target_block(&self, x_node: Node) -> Node {
        for u in self.graph.uses(x_node) {
            if self.graph.op(u.user) == Op::Block {
                return u.user;
            }
        }
        panic!("control flow node {:?} without a target block", x_node);
    }

    fn can_be_fallthrough(&self, x_node: Node) -> bool {
        let target = self.target_block(x_node);
        let block = self.graph.block_of(x_node);
        self.blocks.is_fallthrough(block, target)
    }

    fn write_cfop_target(&mut self, x_node: Node) {
        let target = self.target_block(x_node);
        let label = self.block_label(target);
        let _ = write!(self.em, "{}", label);
    }

    // ---- instruction emission --------------------------------------------

    fn emit_node(&mut self, node: Node) -> CodegenResult<()> {
        // Spill/reload bracketing, a debugging aid.
        if self.features.mark_spill_reload {
            if let Attr::Ia32(a) = self.graph.attr(node) {
                if a.is_spill {
                    let _ = writeln!(self.em, "\txchg %ebx, %ebx");
                }
                if a.is_reload {
                    let _ = writeln!(self.em, "\txchg %edx, %edx");
                }
                if a.is_remat {
                    let _ = writeln!(self.em, "\txchg %ecx, %ecx");
                }
            }
        }
        if let Attr::Ia32(a) = self.graph.attr(node) {
            if a.throws {
                self.exc_counter += 1;
                let id = self.exc_counter;
                let prefix = self.em.insn_label_prefix();
                let _ = writeln!(self.em, "{}{}:", prefix, id);
                self.exc_list.push((id, self.graph.block_of(node)));
            }
        }

        match self.graph.op(node) {
            Op::Ia32(op) => self.emit_ia32(node, op),
            Op::IncSp => {
                let offset = match self.graph.attr(node) {
                    Attr::IncSp { offset } => *offset,
                    _ => 0,
                };
                if offset > 0 {
                    let _ = writeln!(self.em, "\tsubl ${}, %esp", offset);
                } else if offset < 0 {
                    let _ = writeln!(self.em, "\taddl ${}, %esp", -offset);
                }
                Ok(())
            }
            Op::Return => {
                let (pop, pad) = match self.graph.attr(node) {
                    Attr::Return { pop, pad } => (*pop, *pad),
                    _ => (0, false),
                };
                if pad {
                    // The rep prefix pads the return against the branch
                    // target penalty.
                    let _ = writeln!(self.em, "\trep");
                }
                if pop > 0 {
                    let _ = writeln!(self.em, "\tret ${}", pop);
                } else {
                    let _ = writeln!(self.em, "\tret");
                }
                Ok(())
            }
            Op::Jmp => {
                if self.can_be_fallthrough(node) {
                    let _ = write!(self.em, "\t/* fallthrough to ");
                    self.write_cfop_target(node);
                    let _ = writeln!(self.em, " */");
                } else {
                    let _ = write!(self.em, "\tjmp ");
                    self.write_cfop_target(node);
                    let _ = writeln!(self.em);
                }
                Ok(())
            }
            Op::Copy | Op::CopyKeep => {
                let src = self.reg_of(self.graph.in_at(node, 0))?;
                let dst = self.reg_of(node)?;
                if src != dst {
                    let _ = write!(self.em, "\tmovl ");
                    self.write_register(src, None);
                    let _ = write!(self.em, ", ");
                    self.write_register(dst, None);
                    let _ = writeln!(self.em);
                }
                Ok(())
            }
            Op::Perm => {
                let a = self.reg_of(self.graph.in_at(node, 0))?;
                let b = self.reg_of(self.graph.in_at(node, 1))?;
                let _ = write!(self.em, "\txchg ");
                self.write_register(a, None);
                let _ = write!(self.em, ", ");
                self.write_register(b, None);
                let _ = writeln!(self.em);
                Ok(())
            }
            // No code.
            Op::Phi | Op::Keep | Op::Start | Op::End | Op::Block | Op::Proj | Op::NoMem
            | Op::Unknown | Op::Deleted => Ok(()),
            op => Err(CodegenError::Unsupported(format!(
                "can not emit {:?} on ia32",
                op
            ))),
        }
    }

    fn emit_ia32(&mut self, node: Node, op: Ia32Op) -> CodegenResult<()> {
        use Ia32Op::*;
        match op {
            Const => {
                let _ = write!(self.em, "\tmovl $");
                self.write_immediate_payload(node);
                let _ = write!(self.em, ", ");
                self.write_dst(node, out::RES, None)?;
                let _ = writeln!(self.em);
            }
            Immediate | NoRegGp | NoRegXmm | NoRegVfp | ProduceVal => {}
            Add | Adc | Sub | Sbb | And | Or | Xor | IMul => {
                let mnemonic = match op {
                    Add => "add",
                    Adc => "adc",
                    Sub => "sub",
                    Sbb => "sbb",
                    And => "and",
                    Or => "or",
                    Xor => "xor",
                    IMul => "imul",
                    _ => unreachable!(),
                };
                let suffix = self.ls_suffix(node);
                let _ = write!(self.em, "\t{}{} ", mnemonic, suffix);
                self.write_binop_operands(node)?;
                let _ = writeln!(self.em);
            }
            Not | Neg | Inc | Dec => {
                let mnemonic = match op {
                    Not => "not",
                    Neg => "neg",
                    Inc => "inc",
                    Dec => "dec",
                    _ => unreachable!(),
                };
                let suffix = self.ls_suffix(node);
                let _ = write!(self.em, "\t{}{} ", mnemonic, suffix);
                if attr(self.graph, node).op_type == OpType::AddrModeD {
                    self.write_am(node)?;
                } else {
                    self.write_src(node, n::UNARY, None)?;
                }
                let _ = writeln!(self.em);
            }
            Lea => {
                let _ = write!(self.em, "\tleal ");
                self.write_lea_am(node)?;
                let _ = write!(self.em, ", ");
                self.write_dst(node, out::RES, None)?;
                let _ = writeln!(self.em);
            }
            Shl | Shr | Sar | Rol => {
                let mnemonic = match op {
                    Shl => "shl",
                    Shr => "shr",
                    Sar => "sar",
                    Rol => "rol",
                    _ => unreachable!(),
                };
                let _ = write!(self.em, "\t{}l ", mnemonic);
                self.write_count_operand(node, 1)?;
                let _ = write!(self.em, ", ");
                self.write_src(node, 0, None)?;
                let _ = writeln!(self.em);
            }
            ShlD | ShrD => {
                let mnemonic = if op == ShlD { "shld" } else { "shrd" };
                let _ = write!(self.em, "\t{}l ", mnemonic);
                self.write_count_operand(node, 2)?;
                let _ = write!(self.em, ", ");
                self.write_src(node, 1, None)?;
                let _ = write!(self.em, ", ");
                self.write_src(node, 0, None)?;
                let _ = writeln!(self.em);
            }
            Mul | IMul1Op => {
                let mnemonic = if op == Mul { "mul" } else { "imul" };
                let _ = write!(self.em, "\t{}l ", mnemonic);
                self.write_am_or_src(node, n::RIGHT, None)?;
                let _ = writeln!(self.em);
            }
            Div | IDiv => {
                let mnemonic = if op == Div { "div" } else { "idiv" };
                let _ = write!(self.em, "\t{}l ", mnemonic);
                self.write_am_or_src(node, n::LEFT, None)?;
                let _ = writeln!(self.em);
            }
            Cltd => {
                let _ = writeln!(self.em, "\tcltd");
            }
            ConvI2I => {
                let a = attr(self.graph, node);
                let src_mode = a.ls_mode.unwrap_or(Mode::U32);
                let mnemonic = match (src_mode.bits(), src_mode.is_signed()) {
                    (8, false) => "movzbl",
                    (8, true) => "movsbl",
                    (16, false) => "movzwl",
                    (16, true) => "movswl",
                    _ => "movl",
                };
                let _ = write!(self.em, "\t{} ", mnemonic);
                self.write_am_or_src(node, n::UNARY, sub_reg_mode(Some(src_mode)))?;
                let _ = write!(self.em, ", ");
                self.write_dst(node, out::RES, None)?;
                let _ = writeln!(self.em);
            }
            Bsf | Bsr => {
                let mnemonic = if op == Bsf { "bsf" } else { "bsr" };
                let _ = write!(self.em, "\t{}l ", mnemonic);
                self.write_am_or_src(node, n::UNARY, None)?;
                let _ = write!(self.em, ", ");
                self.write_dst(node, out::RES, None)?;
                let _ = writeln!(self.em);
            }
            Bswap => {
                let _ = write!(self.em, "\tbswap ");
                self.write_src(node, 0, None)?;
                let _ = writeln!(self.em);
            }
            Bswap16 => {
                let reg = self.reg_of(self.graph.in_at(node, 0))?;
                let _ = writeln!(
                    self.em,
                    "\txchgb %{}, %{}",
                    reg_8bit_name(reg),
                    reg_8bit_high_name(reg)
                );
            }
            Popcnt => {
                let _ = write!(self.em, "\tpopcntl ");
                self.write_am_or_src(node, n::UNARY, None)?;
                let _ = write!(self.em, ", ");
                self.write_dst(node, out::RES, None)?;
                let _ = writeln!(self.em);
            }
            Test => {
                let suffix = self.ls_suffix(node);
                let _ = write!(self.em, "\ttest{} ", suffix);
                self.write_binop_operands(node)?;
                let _ = writeln!(self.em);
            }
            Cmp => {
                let suffix = self.ls_suffix(node);
                let _ = write!(self.em, "\tcmp{} ", suffix);
                self.write_binop_operands(node)?;
                let _ = writeln!(self.em);
            }
            Bt => {
                let _ = write!(self.em, "\tbtl ");
                self.write_src(node, 1, None)?;
                let _ = write!(self.em, ", ");
                self.write_src(node, 0, None)?;
                let _ = writeln!(self.em);
            }
            Setcc => {
                let cc = attr(self.graph, node).cond_code();
                let _ = write!(self.em, "\tset{} ", Self::cmp_suffix(cc));
                let reg = self.reg_of(node)?;
                self.write_register(reg, Some(Mode::U8));
                let _ = writeln!(self.em);
            }
            CMov => {
                let cc = attr(self.graph, node).cond_code();
                let _ = write!(self.em, "\tcmov{} ", Self::cmp_suffix(cc));
                self.write_am_or_src(node, n::RIGHT, None)?;
                let _ = write!(self.em, ", ");
                self.write_src(node, n::LEFT, None)?;
                let _ = writeln!(self.em);
            }
            Load => {
                let a = attr(self.graph, node);
                let ls = a.ls_mode.unwrap_or(Mode::U32);
                let mnemonic = match (ls.bits(), ls.is_signed()) {
                    (8, false) => "movzbl",
                    (8, true) => "movsbl",
                    (16, false) => "movzwl",
                    (16, true) => "movswl",
                    _ => "movl",
                };
                let _ = write!(self.em, "\t{} ", mnemonic);
                self.write_am(node)?;
                let _ = write!(self.em, ", ");
                self.write_dst(node, out::LOAD_RES, None)?;
                let _ = writeln!(self.em);
            }
            Store => {
                let a = attr(self.graph, node);
                let ls = a.ls_mode.unwrap_or(Mode::U32);
                let _ = write!(self.em, "\tmov{} ", Self::mode_suffix(ls));
                self.write_src(node, n::UNARY, Some(ls))?;
                let _ = write!(self.em, ", ");
                self.write_am(node)?;
                let _ = writeln!(self.em);
            }
            Push => {
                let _ = write!(self.em, "\tpushl ");
                self.write_src(node, n::UNARY, None)?;
                let _ = writeln!(self.em);
            }
            Pop => {
                let _ = write!(self.em, "\tpopl ");
                self.write_dst(node, out::POP_RES, None)?;
                let _ = writeln!(self.em);
            }
            Leave => {
                let _ = writeln!(self.em, "\tleave");
            }
            Prefetch0 | Prefetch1 | Prefetch2 | PrefetchNta | PrefetchW | Prefetch3dNow => {
                let mnemonic = match op {
                    Prefetch0 => "prefetcht0",
                    Prefetch1 => "prefetcht1",
                    Prefetch2 => "prefetcht2",
                    PrefetchNta => "prefetchnta",
                    PrefetchW => "prefetchw",
                    Prefetch3dNow => "prefetch",
                    _ => unreachable!(),
                };
                let _ = write!(self.em, "\t{} ", mnemonic);
                self.write_am(node)?;
                let _ = writeln!(self.em);
            }
            Jmp => {
                if self.can_be_fallthrough(node) {
                    let _ = writeln!(self.em, "\t/* fallthrough */");
                } else {
                    let _ = write!(self.em, "\tjmp ");
                    self.write_cfop_target(node);
                    let _ = writeln!(self.em);
                }
            }
            Jcc => self.emit_jcc(node)?,
            SwitchJmp => self.emit_switch_jmp(node)?,
            Call => {
                let a = attr(self.graph, node);
                match &a.variant {
                    AttrVariant::Call {
                        callee: Some(ent), ..
                    } => {
                        let name = self.symbols.name(*ent).to_string();
                        let _ = writeln!(self.em, "\tcall {}", name);
                    }
                    _ => {
                        let _ = write!(self.em, "\tcall *");
                        self.write_src(node, 4, None)?;
                        let _ = writeln!(self.em);
                    }
                }
            }
            ClimbFrame => {
                // Walk up `depth` frame pointers.
                let a = attr(self.graph, node);
                let depth = match a.variant {
                    AttrVariant::Immediate { offset, .. } => offset,
                    _ => 0,
                };
                let _ = write!(self.em, "\tmovl %ebp, ");
                self.write_dst(node, out::RES, None)?;
                let _ = writeln!(self.em);
                for _ in 0..depth {
                    let _ = write!(self.em, "\tmovl (");
                    self.write_dst(node, out::RES, None)?;
                    let _ = write!(self.em, "), ");
                    self.write_dst(node, out::RES, None)?;
                    let _ = writeln!(self.em);
                }
            }
            Ud2 => {
                let _ = writeln!(self.em, "\tud2");
            }
            XZero => {
                let _ = write!(self.em, "\txorps ");
                self.write_dst(node, out::RES, None)?;
                let _ = write!(self.em, ", ");
                self.write_dst(node, out::RES, None)?;
                let _ = writeln!(self.em);
            }
            XAdd | XSub | XMul | XDiv | XMin | XMax | XAnd | XOr | XXor => {
                let base = match op {
                    XAdd => "add",
                    XSub => "sub",
                    XMul => "mul",
                    XDiv => "div",
                    XMin => "min",
                    XMax => "max",
                    XAnd => "andp",
                    XOr => "orp",
                    XXor => "xorp",
                    _ => unreachable!(),
                };
                let a = attr(self.graph, node);
                let wide = a.ls_mode == Some(Mode::F64);
                let suffix = match op {
                    XAnd | XOr | XXor => {
                        if wide {
                            "d"
                        } else {
                            "s"
                        }
                    }
                    _ => {
                        if wide {
                            "sd"
                        } else {
                            "ss"
                        }
                    }
                };
                let _ = write!(self.em, "\t{}{} ", base, suffix);
                self.write_binop_operands(node)?;
                let _ = writeln!(self.em);
            }
            XLoad => {
                let a = attr(self.graph, node);
                let mov = if a.ls_mode == Some(Mode::F32) {
                    "movss"
                } else {
                    "movsd"
                };
                let _ = write!(self.em, "\t{} ", mov);
                self.write_am(node)?;
                let _ = write!(self.em, ", ");
                self.write_dst(node, out::LOAD_RES, None)?;
                let _ = writeln!(self.em);
            }
            XStore => {
                let a = attr(self.graph, node);
                let mov = if a.ls_mode == Some(Mode::F32) {
                    "movss"
                } else {
                    "movsd"
                };
                let _ = write!(self.em, "\t{} ", mov);
                self.write_src(node, n::UNARY, None)?;
                let _ = write!(self.em, ", ");
                self.write_am(node)?;
                let _ = writeln!(self.em);
            }
            CvtSi2Ss | CvtSi2Sd | CvtSs2Si | CvtSd2Si | CvtSs2Sd | CvtSd2Ss => {
                let mnemonic = match op {
                    CvtSi2Ss => "cvtsi2ss",
                    CvtSi2Sd => "cvtsi2sd",
                    CvtSs2Si => "cvttss2si",
                    CvtSd2Si => "cvttsd2si",
                    CvtSs2Sd => "cvtss2sd",
                    CvtSd2Ss => "cvtsd2ss",
                    _ => unreachable!(),
                };
                let _ = write!(self.em, "\t{} ", mnemonic);
                self.write_am_or_src(node, n::UNARY, None)?;
                let _ = write!(self.em, ", ");
                self.write_dst(node, out::RES, None)?;
                let _ = writeln!(self.em);
            }
            Ucomi => {
                let a = attr(self.graph, node);
                let mnemonic = if a.ls_mode == Some(Mode::F32) {
                    "ucomiss"
                } else {
                    "ucomisd"
                };
                let _ = write!(self.em, "\t{} ", mnemonic);
                self.write_am_or_src(node, n::RIGHT, None)?;
                let _ = write!(self.em, ", ");
                self.write_src(node, n::LEFT, None)?;
                let _ = writeln!(self.em);
            }
            Fadd | Fsub | Fmul | Fdiv => {
                // Virtual form; the fp stack simulation rewrites the slots
                // before real emission.
                let mnemonic = match op {
                    Fadd => "fadd",
                    Fsub => "fsub",
                    Fmul => "fmul",
                    Fdiv => "fdiv",
                    _ => unreachable!(),
                };
                let _ = write!(self.em, "\t{} ", mnemonic);
                self.write_x87_operands(node)?;
                let _ = writeln!(self.em);
            }
            Fchs => {
                let _ = writeln!(self.em, "\tfchs");
            }
            Fld => {
                let a = attr(self.graph, node);
                let suffix = if a.ls_mode == Some(Mode::F32) { "s" } else { "l" };
                let _ = write!(self.em, "\tfld{} ", suffix);
                self.write_am(node)?;
                let _ = writeln!(self.em);
            }
            Fst => {
                let a = attr(self.graph, node);
                let suffix = if a.ls_mode == Some(Mode::F32) { "s" } else { "l" };
                let _ = write!(self.em, "\tfstp{} ", suffix);
                self.write_am(node)?;
                let _ = writeln!(self.em);
            }
            Fild => {
                let _ = write!(self.em, "\tfildl ");
                self.write_am(node)?;
                let _ = writeln!(self.em);
            }
            Fist => {
                let _ = write!(self.em, "\tfistpl ");
                self.write_am(node)?;
                let _ = writeln!(self.em);
            }
            Fisttp => {
                let _ = write!(self.em, "\tfisttpl ");
                self.write_am(node)?;
                let _ = writeln!(self.em);
            }
            Fldz => {
                let _ = writeln!(self.em, "\tfldz");
            }
            Fld1 => {
                let _ = writeln!(self.em, "\tfld1");
            }
            Fucomi => {
                let _ = writeln!(self.em, "\tfucomi %st(1)");
            }
            FucomFnstsw => {
                let _ = writeln!(self.em, "\tfucom %st(1)");
                let _ = writeln!(self.em, "\tfnstsw %ax");
            }
            Sahf => {
                let _ = writeln!(self.em, "\tsahf");
            }
            CopyB => {
                let size = match &attr(self.graph, node).variant {
                    AttrVariant::CopyB { size } => *size,
                    _ => 0,
                };
                if size & 1 != 0 {
                    let _ = writeln!(self.em, "\tmovsb");
                }
                if size & 2 != 0 {
                    let _ = writeln!(self.em, "\tmovsw");
                }
                let _ = writeln!(self.em, "\trep movsl");
            }
        }
        Ok(())
    }

    fn ls_suffix(&self, node: Node) -> &'static str {
        let a = attr(self.graph, node);
        match a.ls_mode {
            Some(m) if m.is_data() => Self::mode_suffix(m),
            _ => "l",
        }
    }

    /// The count operand of a shift: `$imm` or `%cl`.
    fn write_count_operand(&mut self, node: Node, pos: usize) -> CodegenResult<()> {
        let count = self.graph.in_at(node, pos);
        if self.graph.op(count) == Op::Ia32(Ia32Op::Immediate) {
            let _ = write!(self.em, "$");
            self.write_immediate_payload(count);
        } else {
            let _ = write!(self.em, "%cl");
        }
        Ok(())
    }

    /// Lea prints its address operand from inputs 0/1 instead of the
    /// base/index slots.
    fn write_lea_am(&mut self, node: Node) -> CodegenResult<()> {
        let a = attr(self.graph, node).clone();
        debug_assert!(!a.use_frame, "unresolved frame access at emission");
        let base = self.graph.in_at(node, 0);
        let index = self.graph.in_at(node, 1);
        let has_base = !is_virtual(self.graph, base);
        let has_index = !is_virtual(self.graph, index);
        if let Some(ent) = a.am_sym {
            if a.am_sym_sign {
                let _ = write!(self.em, "-");
            }
            let name = self.symbols.name(ent).to_string();
            let _ = write!(self.em, "{}", name);
        }
        if a.am_offs != 0 || (a.am_sym.is_none() && !has_base && !has_index) {
            if a.am_sym.is_some() {
                let _ = write!(self.em, "{:+}", a.am_offs);
            } else {
                let _ = write!(self.em, "{}", a.am_offs);
            }
        }
        if has_base || has_index {
            let _ = write!(self.em, "(");
            if has_base {
                let reg = self.reg_of(base)?;
                self.write_register(reg, None);
            }
            if has_index {
                let _ = write!(self.em, ",");
                let reg = self.reg_of(index)?;
                self.write_register(reg, None);
                if a.am_scale > 0 {
                    let _ = write!(self.em, ",{}", 1 << a.am_scale);
                }
            }
            let _ = write!(self.em, ")");
        }
        Ok(())
    }

    fn write_x87_operands(&mut self, node: Node) -> CodegenResult<()> {
        let a = attr(self.graph, node);
        if let AttrVariant::X87 { slots } = &a.variant {
            if let (Some(s0), Some(s1)) = (slots[0], slots[1]) {
                let _ = write!(self.em, "%st({}), %st({})", s1, s0);
                return Ok(());
            }
        }
        // Before the stack simulation, show the virtual registers.
        self.write_src(node, n::RIGHT, None)?;
        let _ = write!(self.em, ", ");
        self.write_src(node, n::LEFT, None)?;
        Ok(())
    }

    /// Conditional jump pair; the false edge is preferred as the
    /// fall-through.
    fn emit_jcc(&mut self, node: Node) -> CodegenResult<()> {
        let mut cc = attr(self.graph, node).cond_code();
        let mut proj_true = self
            .graph
            .find_proj(node, 1)
            .ok_or_else(|| CodegenError::Constraint("jcc without true proj".to_string()))?;
        let mut proj_false = self
            .graph
            .find_proj(node, 0)
            .ok_or_else(|| CodegenError::Constraint("jcc without false proj".to_string()))?;

        if self.can_be_fallthrough(proj_true) {
            // Exchange the projections so the second one can be omitted.
            std::mem::swap(&mut proj_true, &mut proj_false);
            cc = cc.negated();
        }

        let mut need_parity_label = false;
        if cc.float {
            // Some float relations need an extra parity test for the
            // unordered case.
            match cc.relation.without_unordered() {
                Relation::FALSE if cc.relation == Relation::UNORDERED => {
                    let _ = write!(self.em, "\tjp ");
                    self.write_cfop_target(proj_true);
                    let _ = writeln!(self.em);
                    return self.emit_jcc_false_edge(proj_false);
                }
                Relation::LEG => {
                    let _ = write!(self.em, "\tjnp ");
                    self.write_cfop_target(proj_true);
                    let _ = writeln!(self.em);
                    return self.emit_jcc_false_edge(proj_false);
                }
                Relation::EQ | Relation::LT | Relation::LE
                    if !cc.relation.includes_unordered() =>
                {
                    // Unordered operands must not take the branch.
                    if self.can_be_fallthrough(proj_false) {
                        need_parity_label = true;
                        self.local_label += 1;
                        let _ = writeln!(self.em, "\tjp 1f");
                    } else {
                        let _ = write!(self.em, "\tjp ");
                        self.write_cfop_target(proj_false);
                        let _ = writeln!(self.em);
                    }
                }
                Relation::GT | Relation::GE | Relation::LG
                    if cc.relation.includes_unordered() =>
                {
                    let _ = write!(self.em, "\tjp ");
                    self.write_cfop_target(proj_true);
                    let _ = writeln!(self.em);
                }
                _ => {}
            }
        }

        let _ = write!(self.em, "\tj{} ", Self::cmp_suffix(cc));
        self.write_cfop_target(proj_true);
        let _ = writeln!(self.em);
        if need_parity_label {
            let _ = writeln!(self.em, "1:");
        }
        self.emit_jcc_false_edge(proj_false)
    }

    fn emit_jcc_false_edge(&mut self, proj_false: Node) -> CodegenResult<()> {
        if self.can_be_fallthrough(proj_false) {
            let _ = write!(self.em, "\t/* fallthrough to ");
            self.write_cfop_target(proj_false);
            let _ = writeln!(self.em, " */");
        } else {
            let _ = write!(self.em, "\tjmp ");
            self.write_cfop_target(proj_false);
            let _ = writeln!(self.em);
        }
        Ok(())
    }

    /// Bounds check, indirect jump, and the rodata table.
    fn emit_switch_jmp(&mut self, node: Node) -> CodegenResult<()> {
        let default_pn = match &attr(self.graph, node).variant {
            AttrVariant::SwitchJmp { default_pn } => *default_pn,
            _ => panic!("switch jump without default"),
        };

        let mut branches: Vec<(i64, Node)> = Vec::new();
        let mut default_proj = None;
        for proj in self.graph.projs(node) {
            let pnr = self.graph.attr(proj).proj();
            if pnr == default_pn {
                default_proj = Some(proj);
            } else {
                branches.push((pnr, proj));
            }
        }
        let default_proj = default_proj
            .ok_or_else(|| CodegenError::Constraint("switch without default exit".to_string()))?;
        branches.sort_by_key(|&(v, _)| v);
        let min = branches.first().map(|&(v, _)| v).unwrap_or(0);
        let max = branches.last().map(|&(v, _)| v).unwrap_or(0);
        // Two-complement magic makes the single unsigned check cover both
        // ends of the interval.
        let interval = (max - min) as u64;

        let _ = write!(self.em, "\tcmpl ${}, ", interval);
        self.write_src(node, 0, None)?;
        let _ = writeln!(self.em);
        let _ = write!(self.em, "\tja ");
        self.write_cfop_target(default_proj);
        let _ = writeln!(self.em);

        if branches.len() > 1 {
            let label = format!(".LJT{}", self.jt_counter);
            self.jt_counter += 1;
            let _ = write!(self.em, "\tjmp *{}(,", label);
            self.write_src(node, 0, None)?;
            let _ = writeln!(self.em, ",4)");

            let mut targets: Vec<String> = Vec::new();
            let mut last_value = min;
            for (value, proj) in branches {
                while last_value != value {
                    targets.push(self.block_label(self.target_block(default_proj)));
                    last_value += 1;
                }
                targets.push(self.block_label(self.target_block(proj)));
                last_value += 1;
            }
            self.em.emit_jump_table(&label, 4, &targets);
        } else if let Some(&(_, proj)) = branches.first() {
            let _ = write!(self.em, "\tjmp ");
            self.write_cfop_target(proj);
            let _ = writeln!(self.em);
        }
        Ok(())
    }
}

/// The condition-code mnemonic for a relation and its interpretation.
pub fn cc_mnemonic(cc: CondCode) -> &'static str {
    let rel = cc.relation;
    if cc.float {
        // Flags from ucomi follow the unsigned pattern; the parity cases
        // are handled by the branch emitters.
        match rel.without_unordered() {
            Relation::EQ => return "e",
            Relation::LT => return "b",
            Relation::LE => return "be",
            Relation::GT => return "a",
            Relation::GE => return "ae",
            Relation::LG => return "ne",
            Relation::FALSE if rel == Relation::UNORDERED => return "p",
            Relation::LEG => return "np",
            _ => {}
        }
        if rel == Relation::NE {
            return "ne";
        }
        return "e";
    }
    match (rel, cc.unsigned) {
        (Relation::EQ, _) => "e",
        (Relation::LG, _) | (Relation::NE, _) => "ne",
        (Relation::LT, false) => "l",
        (Relation::LE, false) => "le",
        (Relation::GT, false) => "g",
        (Relation::GE, false) => "ge",
        (Relation::LT, true) | (Relation::UL, true) => "b",
        (Relation::LE, true) | (Relation::ULE, true) => "be",
        (Relation::GT, true) | (Relation::UG, true) => "a",
        (Relation::GE, true) | (Relation::UGE, true) => "ae",
        _ => panic!("no condition mnemonic for {:?}", rel),
    }
}

fn is_virtual(graph: &Graph, node: Node) -> bool {
    match graph.reg(node) {
        Some(reg) => reg.kind == crate::regs::RegisterKind::Virtual,
        None => matches!(
            graph.op(node),
            Op::Ia32(Ia32Op::NoRegGp) | Op::Ia32(Ia32Op::NoRegXmm) | Op::Ia32(Ia32Op::NoRegVfp)
        ),
    }
}

/// Operand modes below 32 bit force the sub-register names.
fn sub_reg_mode(ls: Option<Mode>) -> Option<Mode> {
    match ls {
        Some(m) if m.is_data() && m.bits() < 32 => Some(m),
        _ => None,
    }
}
