//! amd64 assembler emission (AT&T syntax).

use core::fmt::Write;

use crate::gas::GasEmitter;
use crate::ir::{Attr, Graph, Mode, Node, Op, SymbolTable};
use crate::isa::amd64::transform::out;
use crate::isa::amd64::{attr, Amd64AttrVariant, Amd64Op};
use crate::isa::CpuFeatures;
use crate::regs::Register;
use crate::sched::blocksched::BlockSchedule;
use crate::sched::Schedule;
use crate::{CodegenError, CodegenResult};

struct EmitCtx<'a> {
    em: &'a mut GasEmitter,
    symbols: &'a SymbolTable,
    graph: &'a Graph,
    sched: &'a Schedule,
    blocks: &'a BlockSchedule,
    jt_counter: u32,
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
        symbols,
        graph,
        sched,
        blocks,
        jt_counter: 0,
    };
    for &block in blocks.blocks() {
        ctx.emit_block(block)?;
    }
    em.function_epilog(symbols, graph.entity);
    Ok(())
}

/// The 32-bit name of a gp register.
fn reg32_name(reg: &Register) -> String {
    match reg.name {
        "rax" => "eax".to_string(),
        "rbx" => "ebx".to_string(),
        "rcx" => "ecx".to_string(),
        "rdx" => "edx".to_string(),
        "rsi" => "esi".to_string(),
        "rdi" => "edi".to_string(),
        "rsp" => "esp".to_string(),
        "rbp" => "ebp".to_string(),
        name => format!("{}d", name),
    }
}

impl<'a> EmitCtx<'a> {
    fn block_label(&self, block: Node) -> String {
        format!("{}{}", self.em.block_label_prefix(), block.as_u32())
    }

    fn block_needs_label(&self, block: Node) -> bool {
        let n_preds = self.graph.n_ins(block);
        if n_preds == 0 {
            return false;
        }
        if n_preds > 1 {
            return true;
        }
        let pred = self.graph.in_at(block, 0);
        match self.blocks.prev(block) {
            Some(prev) => prev != self.graph.block_of(pred),
            None => true,
        }
    }

    fn emit_block(&mut self, block: Node) -> CodegenResult<()> {
        if self.block_needs_label(block) {
            let label = self.block_label(block);
            let _ = writeln!(self.em, "{}:", label);
        }
        let nodes: Vec<Node> = self.sched.block_nodes(block).to_vec();
        for node in nodes {
            self.emit_node(node)?;
        }
        Ok(())
    }

    fn reg_of(&self, node: Node) -> CodegenResult<&'static Register> {
        self.graph.reg(node).ok_or_else(|| {
            CodegenError::RegConstraint(format!("node {:?} has no register assigned", node))
        })
    }

    fn write_register(&mut self, reg: &Register, mode: Option<Mode>) {
        match mode.map(|m| m.bits()) {
            Some(32) => {
                let name = reg32_name(reg);
                let _ = write!(self.em, "%{}", name);
            }
            _ => {
                let _ = write!(self.em, "%{}", reg.name);
            }
        }
    }

    fn op_mode(&self, node: Node) -> Option<Mode> {
        attr(self.graph, node).ls_mode
    }

    fn suffix(&self, node: Node) -> &'static str {
        match self.op_mode(node).map(|m| m.bits()) {
            Some(8) => "b",
            Some(16) => "w",
            Some(32) => "l",
            _ => "q",
        }
    }

    fn write_src(&mut self, node: Node, pos: usize, mode: Option<Mode>) -> CodegenResult<()> {
        let op = self.graph.in_at(node, pos);
        if self.graph.op(op) == Op::Amd64(Amd64Op::Immediate) {
            let _ = write!(self.em, "$");
            self.write_immediate(op);
            return Ok(());
        }
        let reg = self.reg_of(op)?;
        self.write_register(reg, mode);
        Ok(())
    }

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

    fn write_immediate(&mut self, node: Node) {
        let a = attr(self.graph, node);
        if let Amd64AttrVariant::Immediate { ent, offset } = &a.variant {
            if let Some(ent) = ent {
                let name = self.symbols.name(*ent).to_string();
                let _ = write!(self.em, "{}", name);
                if *offset != 0 {
                    let _ = write!(self.em, "{:+}", offset);
                }
            } else {
                let _ = write!(self.em, "{}", offset);
            }
        }
    }

    fn write_am(&mut self, node: Node) -> CodegenResult<()> {
        let a = attr(self.graph, node).clone();
        let base = self.graph.in_at(node, 0);
        let index = self.graph.in_at(node, 1);
        let has_base = self.graph.op(base) != Op::Amd64(Amd64Op::NoReg);
        let has_index = self.graph.op(index) != Op::Amd64(Amd64Op::NoReg);
        if let Some(ent) = a.am_sym {
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
        let label = self.block_label(self.target_block(x_node));
        let _ = write!(self.em, "{}", label);
    }

    fn emit_node(&mut self, node: Node) -> CodegenResult<()> {
        match self.graph.op(node) {
            Op::Amd64(op) => self.emit_amd64(node, op),
            Op::Return => {
                let _ = writeln!(self.em, "\tret");
                Ok(())
            }
            Op::Jmp => {
                if self.can_be_fallthrough(node) {
                    let _ = writeln!(self.em, "\t/* fallthrough */");
                } else {
                    let _ = write!(self.em, "\tjmp ");
                    self.write_cfop_target(node);
                    let _ = writeln!(self.em);
                }
                Ok(())
            }
            Op::IncSp => {
                let offset = match self.graph.attr(node) {
                    Attr::IncSp { offset } => *offset,
                    _ => 0,
                };
                if offset > 0 {
                    let _ = writeln!(self.em, "\tsubq ${}, %rsp", offset);
                } else if offset < 0 {
                    let _ = writeln!(self.em, "\taddq ${}, %rsp", -offset);
                }
                Ok(())
            }
            Op::Copy | Op::CopyKeep => {
                let src = self.reg_of(self.graph.in_at(node, 0))?;
                let dst = self.reg_of(node)?;
                if src != dst {
                    let _ = writeln!(self.em, "\tmovq %{}, %{}", src.name, dst.name);
                }
                Ok(())
            }
            Op::Phi | Op::Keep | Op::Start | Op::End | Op::Block | Op::Proj | Op::NoMem
            | Op::Unknown | Op::Deleted => Ok(()),
            op => Err(CodegenError::Unsupported(format!(
                "can not emit {:?} on amd64",
                op
            ))),
        }
    }

    fn emit_amd64(&mut self, node: Node, op: Amd64Op) -> CodegenResult<()> {
        use Amd64Op::*;
        match op {
            Const => {
                let suffix = self.suffix(node);
                let _ = write!(self.em, "\tmov{} $", suffix);
                self.write_immediate(node);
                let _ = write!(self.em, ", ");
                let mode = self.op_mode(node);
                self.write_dst(node, out::RES, mode)?;
                let _ = writeln!(self.em);
            }
            Immediate | NoReg => {}
            Add | Sub | And | Or | Xor | IMul => {
                let mnemonic = match op {
                    Add => "add",
                    Sub => "sub",
                    And => "and",
                    Or => "or",
                    Xor => "xor",
                    IMul => "imul",
                    _ => unreachable!(),
                };
                let suffix = self.suffix(node);
                let mode = self.op_mode(node);
                let _ = write!(self.em, "\t{}{} ", mnemonic, suffix);
                let a = attr(self.graph, node);
                if a.source_am {
                    self.write_am(node)?;
                } else {
                    self.write_src(node, 4, mode)?;
                }
                let _ = write!(self.em, ", ");
                self.write_src(node, 3, mode)?;
                let _ = writeln!(self.em);
            }
            Not | Neg => {
                let mnemonic = if op == Not { "not" } else { "neg" };
                let suffix = self.suffix(node);
                let mode = self.op_mode(node);
                let _ = write!(self.em, "\t{}{} ", mnemonic, suffix);
                self.write_src(node, 3, mode)?;
                let _ = writeln!(self.em);
            }
            Div | IDiv => {
                let mnemonic = if op == Div { "div" } else { "idiv" };
                let suffix = self.suffix(node);
                let mode = self.op_mode(node);
                let _ = write!(self.em, "\t{}{} ", mnemonic, suffix);
                self.write_src(node, 3, mode)?;
                let _ = writeln!(self.em);
            }
            Cqto => {
                let _ = writeln!(self.em, "\tcqto");
            }
            Shl | Shr | Sar => {
                let mnemonic = match op {
                    Shl => "shl",
                    Shr => "shr",
                    Sar => "sar",
                    _ => unreachable!(),
                };
                let suffix = self.suffix(node);
                let mode = self.op_mode(node);
                let count = self.graph.in_at(node, 1);
                let _ = write!(self.em, "\t{}{} ", mnemonic, suffix);
                if self.graph.op(count) == Op::Amd64(Immediate) {
                    let _ = write!(self.em, "$");
                    self.write_immediate(count);
                } else {
                    let _ = write!(self.em, "%cl");
                }
                let _ = write!(self.em, ", ");
                self.write_src(node, 0, mode)?;
                let _ = writeln!(self.em);
            }
            Lea => {
                let _ = write!(self.em, "\tleaq ");
                self.write_am(node)?;
                let _ = write!(self.em, ", ");
                self.write_dst(node, out::RES, None)?;
                let _ = writeln!(self.em);
            }
            Conv => {
                let a = attr(self.graph, node);
                let from = a.ls_mode.unwrap_or(Mode::U32);
                let mnemonic = match (from.bits(), from.is_signed()) {
                    (8, true) => "movsbq",
                    (8, false) => "movzbq",
                    (16, true) => "movswq",
                    (16, false) => "movzwq",
                    (32, true) => "movslq",
                    // A 32-bit move zero-extends implicitly.
                    _ => "movl",
                };
                let _ = write!(self.em, "\t{} ", mnemonic);
                let src_mode = if from.bits() <= 32 { Some(from) } else { None };
                self.write_src(node, 3, src_mode)?;
                let _ = write!(self.em, ", ");
                self.write_dst(node, out::RES, None)?;
                let _ = writeln!(self.em);
            }
            Load => {
                let a = attr(self.graph, node);
                let ls = a.ls_mode.unwrap_or(Mode::U64);
                let mnemonic = match (ls.bits(), ls.is_signed()) {
                    (8, false) => "movzbl",
                    (8, true) => "movsbq",
                    (16, false) => "movzwl",
                    (16, true) => "movswq",
                    (32, _) => "movl",
                    _ => "movq",
                };
                let _ = write!(self.em, "\t{} ", mnemonic);
                self.write_am(node)?;
                let _ = write!(self.em, ", ");
                let dst_mode = if ls.bits() == 32 { Some(Mode::U32) } else { None };
                self.write_dst(node, out::RES, dst_mode)?;
                let _ = writeln!(self.em);
            }
            Store => {
                let a = attr(self.graph, node);
                let ls = a.ls_mode.unwrap_or(Mode::U64);
                let suffix = match ls.bits() {
                    8 => "b",
                    16 => "w",
                    32 => "l",
                    _ => "q",
                };
                let _ = write!(self.em, "\tmov{} ", suffix);
                self.write_src(node, 3, Some(ls))?;
                let _ = write!(self.em, ", ");
                self.write_am(node)?;
                let _ = writeln!(self.em);
            }
            Push => {
                let _ = write!(self.em, "\tpushq ");
                self.write_src(node, 3, None)?;
                let _ = writeln!(self.em);
            }
            Pop => {
                let _ = write!(self.em, "\tpopq ");
                self.write_dst(node, 0, None)?;
                let _ = writeln!(self.em);
            }
            Test | Cmp => {
                let mnemonic = if op == Test { "test" } else { "cmp" };
                let suffix = self.suffix(node);
                let mode = self.op_mode(node);
                let _ = write!(self.em, "\t{}{} ", mnemonic, suffix);
                self.write_src(node, 4, mode)?;
                let _ = write!(self.em, ", ");
                self.write_src(node, 3, mode)?;
                let _ = writeln!(self.em);
            }
            Setcc => {
                let cc = match &attr(self.graph, node).variant {
                    Amd64AttrVariant::CondCode(cc) => *cc,
                    _ => panic!("setcc without condition"),
                };
                let _ = writeln!(
                    self.em,
                    "\tset{} %al",
                    crate::isa::ia32::emit::cc_mnemonic(cc)
                );
            }
            Jcc => {
                let cc = match &attr(self.graph, node).variant {
                    Amd64AttrVariant::CondCode(cc) => *cc,
                    _ => panic!("jcc without condition"),
                };
                let mut cc = cc;
                let mut proj_true = self.graph.find_proj(node, 1).ok_or_else(|| {
                    CodegenError::Constraint("jcc without true proj".to_string())
                })?;
                let mut proj_false = self.graph.find_proj(node, 0).ok_or_else(|| {
                    CodegenError::Constraint("jcc without false proj".to_string())
                })?;
                if self.can_be_fallthrough(proj_true) {
                    std::mem::swap(&mut proj_true, &mut proj_false);
                    cc = cc.negated();
                }
                let _ = write!(self.em, "\tj{} ", crate::isa::ia32::emit::cc_mnemonic(cc));
                self.write_cfop_target(proj_true);
                let _ = writeln!(self.em);
                if self.can_be_fallthrough(proj_false) {
                    let _ = writeln!(self.em, "\t/* fallthrough */");
                } else {
                    let _ = write!(self.em, "\tjmp ");
                    self.write_cfop_target(proj_false);
                    let _ = writeln!(self.em);
                }
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
            SwitchJmp => self.emit_switch_jmp(node)?,
            Call => {
                let a = attr(self.graph, node);
                match &a.variant {
                    Amd64AttrVariant::Call { callee: Some(ent) } => {
                        let name = self.symbols.name(*ent).to_string();
                        let _ = writeln!(self.em, "\tcall {}", name);
                    }
                    _ => {
                        let last = self.graph.n_ins(node) - 1;
                        let _ = write!(self.em, "\tcall *");
                        self.write_src(node, last, None)?;
                        let _ = writeln!(self.em);
                    }
                }
            }
            XAdd | XSub | XMul | XDiv => {
                let mnemonic = match op {
                    XAdd => "addsd",
                    XSub => "subsd",
                    XMul => "mulsd",
                    XDiv => "divsd",
                    _ => unreachable!(),
                };
                let _ = write!(self.em, "\t{} ", mnemonic);
                self.write_src(node, 4, None)?;
                let _ = write!(self.em, ", ");
                self.write_src(node, 3, None)?;
                let _ = writeln!(self.em);
            }
            XLoad => {
                let _ = write!(self.em, "\tmovsd ");
                self.write_am(node)?;
                let _ = write!(self.em, ", ");
                self.write_dst(node, out::RES, None)?;
                let _ = writeln!(self.em);
            }
            XStore => {
                let _ = write!(self.em, "\tmovsd ");
                self.write_src(node, 3, None)?;
                let _ = write!(self.em, ", ");
                self.write_am(node)?;
                let _ = writeln!(self.em);
            }
            Ucomi => {
                let _ = write!(self.em, "\tucomisd ");
                self.write_src(node, 4, None)?;
                let _ = write!(self.em, ", ");
                self.write_src(node, 3, None)?;
                let _ = writeln!(self.em);
            }
        }
        Ok(())
    }

    /// Bounds check, indirect jump and the eight-byte rodata table.
    fn emit_switch_jmp(&mut self, node: Node) -> CodegenResult<()> {
        let default_pn = match &attr(self.graph, node).variant {
            Amd64AttrVariant::SwitchJmp { default_pn } => *default_pn,
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
        let interval = (max - min) as u64;

        let _ = write!(self.em, "\tcmpq ${}, ", interval);
        self.write_src(node, 0, None)?;
        let _ = writeln!(self.em);
        let _ = write!(self.em, "\tja ");
        self.write_cfop_target(default_proj);
        let _ = writeln!(self.em);

        let label = format!(".LJT{}", self.jt_counter);
        self.jt_counter += 1;
        let _ = write!(self.em, "\tjmp *{}(,", label);
        self.write_src(node, 0, None)?;
        let _ = writeln!(self.em, ",8)");

        let mut targets = Vec::new();
        let mut last_value = min;
        for (value, proj) in branches {
            while last_value != value {
                targets.push(self.block_label(self.target_block(default_proj)));
                last_value += 1;
            }
            targets.push(self.block_label(self.target_block(proj)));
            last_value += 1;
        }
        self.em.emit_jump_table(&label, 8, &targets);
        Ok(())
    }
}
