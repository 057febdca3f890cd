//! arm assembler emission.
//!
//! The fpa, vfp and soft-float variants share the integer emission; the
//! float mnemonics are selected by the configured FPU.

use core::fmt::Write;

use crate::gas::GasEmitter;
use crate::ir::{Attr, Graph, Mode, Node, Op, Relation, SymbolTable};
use crate::isa::arm::transform::out;
use crate::isa::arm::{attr, ArmAttrVariant, ArmOp, ShiftModifier};
use crate::isa::ia32::attrs::CondCode;
use crate::isa::{ArmFpu, CpuFeatures};
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
        features,
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

/// The arm condition mnemonic for a condition code.
fn arm_cc(cc: CondCode) -> &'static str {
    match (cc.relation, cc.unsigned) {
        (Relation::EQ, _) => "eq",
        (Relation::LG, _) | (Relation::NE, _) => "ne",
        (Relation::LT, false) => "lt",
        (Relation::LE, false) => "le",
        (Relation::GT, false) => "gt",
        (Relation::GE, false) => "ge",
        (Relation::LT, true) => "lo",
        (Relation::LE, true) => "ls",
        (Relation::GT, true) => "hi",
        (Relation::GE, true) => "hs",
        _ => panic!("no arm condition for {:?}", cc.relation),
    }
}

fn negate(cc: CondCode) -> CondCode {
    CondCode {
        relation: cc.relation.negated().without_unordered(),
        ..cc
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

    fn write_reg(&mut self, node: Node) -> CodegenResult<()> {
        let reg = self.reg_of(node)?;
        let _ = write!(self.em, "{}", reg.name);
        Ok(())
    }

    /// The second operand: register (with optional shift) or immediate.
    fn write_operand2(&mut self, node: Node, pos: usize) -> CodegenResult<()> {
        let op = self.graph.in_at(node, pos);
        if self.graph.op(op) == Op::Arm(ArmOp::Immediate) {
            if let ArmAttrVariant::Immediate { offset, .. } = &attr(self.graph, op).variant {
                let _ = write!(self.em, "#{}", offset);
            }
            return Ok(());
        }
        self.write_reg(op)?;
        if let Some(shift) = attr(self.graph, node).shift {
            let (name, amount) = match shift {
                ShiftModifier::Lsl(a) => ("lsl", a),
                ShiftModifier::Lsr(a) => ("lsr", a),
                ShiftModifier::Asr(a) => ("asr", a),
                ShiftModifier::Ror(a) => ("ror", a),
            };
            let _ = write!(self.em, ", {} #{}", name, amount);
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

    fn flt_suffix(&self, node: Node) -> &'static str {
        let wide = attr(self.graph, node).ls_mode != Some(Mode::F32);
        match self.features.arm_fpu {
            ArmFpu::Fpa | ArmFpu::Fpe => {
                if wide {
                    "d"
                } else {
                    "s"
                }
            }
            _ => {
                if wide {
                    "d"
                } else {
                    "s"
                }
            }
        }
    }

    fn emit_node(&mut self, node: Node) -> CodegenResult<()> {
        match self.graph.op(node) {
            Op::Arm(op) => self.emit_arm(node, op),
            Op::Return => {
                let _ = writeln!(self.em, "\tmov pc, lr");
                Ok(())
            }
            Op::Jmp => {
                if self.can_be_fallthrough(node) {
                    let _ = writeln!(self.em, "\t/* fallthrough */");
                } else {
                    let _ = write!(self.em, "\tb ");
                    self.write_cfop_target(node);
                    let _ = writeln!(self.em);
                }
                Ok(())
            }
            Op::Copy | Op::CopyKeep => {
                let src = self.reg_of(self.graph.in_at(node, 0))?;
                let dst = self.reg_of(node)?;
                if src != dst {
                    let _ = writeln!(self.em, "\tmov {}, {}", dst.name, src.name);
                }
                Ok(())
            }
            Op::Phi | Op::Keep | Op::Start | Op::End | Op::Block | Op::Proj | Op::NoMem
            | Op::Unknown | Op::Deleted => Ok(()),
            op => Err(CodegenError::Unsupported(format!(
                "can not emit {:?} on arm",
                op
            ))),
        }
    }

    fn emit_arm(&mut self, node: Node, op: ArmOp) -> CodegenResult<()> {
        use ArmOp::*;
        match op {
            Const => {
                if let ArmAttrVariant::Immediate { ent, offset } =
                    &attr(self.graph, node).variant
                {
                    match ent {
                        Some(ent) => {
                            let name = self.symbols.name(*ent).to_string();
                            let _ = write!(self.em, "\tldr ");
                            self.write_reg(node)?;
                            let _ = writeln!(self.em, ", ={}", name);
                        }
                        None => {
                            let _ = write!(self.em, "\tldr ");
                            self.write_reg(node)?;
                            let _ = writeln!(self.em, ", ={}", offset);
                        }
                    }
                }
            }
            Immediate => {}
            Add | Sub | Rsb | And | Orr | Eor | Bic | Mul => {
                let mnemonic = match op {
                    Add => "add",
                    Sub => "sub",
                    Rsb => "rsb",
                    And => "and",
                    Orr => "orr",
                    Eor => "eor",
                    Bic => "bic",
                    Mul => "mul",
                    _ => unreachable!(),
                };
                let _ = write!(self.em, "\t{} ", mnemonic);
                self.write_reg(node)?;
                let _ = write!(self.em, ", ");
                self.write_reg(self.graph.in_at(node, 0))?;
                let _ = write!(self.em, ", ");
                self.write_operand2(node, 1)?;
                let _ = writeln!(self.em);
            }
            Mvn => {
                let _ = write!(self.em, "\tmvn ");
                self.write_reg(node)?;
                let _ = write!(self.em, ", ");
                self.write_operand2(node, 0)?;
                let _ = writeln!(self.em);
            }
            Mov => {
                let _ = write!(self.em, "\tmov ");
                self.write_reg(node)?;
                let _ = write!(self.em, ", ");
                self.write_operand2(node, 0)?;
                let _ = writeln!(self.em);
            }
            Clz => {
                let _ = write!(self.em, "\tclz ");
                self.write_reg(node)?;
                let _ = write!(self.em, ", ");
                self.write_reg(self.graph.in_at(node, 0))?;
                let _ = writeln!(self.em);
            }
            Cmp => {
                let _ = write!(self.em, "\tcmp ");
                self.write_reg(self.graph.in_at(node, 0))?;
                let _ = write!(self.em, ", ");
                self.write_operand2(node, 1)?;
                let _ = writeln!(self.em);
            }
            Tst => {
                let _ = write!(self.em, "\ttst ");
                self.write_reg(self.graph.in_at(node, 0))?;
                let _ = write!(self.em, ", ");
                self.write_operand2(node, 1)?;
                let _ = writeln!(self.em);
            }
            Jmp => {
                if self.can_be_fallthrough(node) {
                    let _ = writeln!(self.em, "\t/* fallthrough */");
                } else {
                    let _ = write!(self.em, "\tb ");
                    self.write_cfop_target(node);
                    let _ = writeln!(self.em);
                }
            }
            Bcc => {
                let cc = match &attr(self.graph, node).variant {
                    ArmAttrVariant::CondCode(cc) => *cc,
                    _ => panic!("branch without condition"),
                };
                let mut cc = cc;
                let mut proj_true = self.graph.find_proj(node, 1).ok_or_else(|| {
                    CodegenError::Constraint("branch without true proj".to_string())
                })?;
                let mut proj_false = self.graph.find_proj(node, 0).ok_or_else(|| {
                    CodegenError::Constraint("branch without false proj".to_string())
                })?;
                if self.can_be_fallthrough(proj_true) {
                    std::mem::swap(&mut proj_true, &mut proj_false);
                    cc = negate(cc);
                }
                let _ = write!(self.em, "\tb{} ", arm_cc(cc));
                self.write_cfop_target(proj_true);
                let _ = writeln!(self.em);
                if self.can_be_fallthrough(proj_false) {
                    let _ = writeln!(self.em, "\t/* fallthrough */");
                } else {
                    let _ = write!(self.em, "\tb ");
                    self.write_cfop_target(proj_false);
                    let _ = writeln!(self.em);
                }
            }
            SwitchJmp => self.emit_switch_jmp(node)?,
            Bl => {
                match &attr(self.graph, node).variant {
                    ArmAttrVariant::Call { callee: Some(ent) } => {
                        let name = self.symbols.name(*ent).to_string();
                        let _ = writeln!(self.em, "\tbl {}", name);
                    }
                    _ => {
                        let last = self.graph.n_ins(node) - 1;
                        let _ = write!(self.em, "\tmov lr, pc\n\tmov pc, ");
                        self.write_reg(self.graph.in_at(node, last))?;
                        let _ = writeln!(self.em);
                    }
                }
            }
            Ldr => {
                let a = attr(self.graph, node);
                let suffix = match (a.ls_mode.map(|m| m.bits()), a.sign_extend) {
                    (Some(8), false) => "b",
                    (Some(8), true) => "sb",
                    (Some(16), false) => "h",
                    (Some(16), true) => "sh",
                    _ => "",
                };
                let offset = a.offset;
                let _ = write!(self.em, "\tldr{} ", suffix);
                self.write_dst(node, out::RES)?;
                let _ = write!(self.em, ", [");
                self.write_reg(self.graph.in_at(node, 0))?;
                if offset != 0 {
                    let _ = write!(self.em, ", #{}", offset);
                }
                let _ = writeln!(self.em, "]");
            }
            Str => {
                let a = attr(self.graph, node);
                let suffix = match a.ls_mode.map(|m| m.bits()) {
                    Some(8) => "b",
                    Some(16) => "h",
                    _ => "",
                };
                let offset = a.offset;
                let _ = write!(self.em, "\tstr{} ", suffix);
                self.write_reg(self.graph.in_at(node, 2))?;
                let _ = write!(self.em, ", [");
                self.write_reg(self.graph.in_at(node, 0))?;
                if offset != 0 {
                    let _ = write!(self.em, ", #{}", offset);
                }
                let _ = writeln!(self.em, "]");
            }
            FltAdd | FltSub | FltMul | FltDiv => {
                let fpa = matches!(self.features.arm_fpu, ArmFpu::Fpa | ArmFpu::Fpe);
                let mnemonic = match (op, fpa) {
                    (FltAdd, true) => "adf",
                    (FltSub, true) => "suf",
                    (FltMul, true) => "muf",
                    (FltDiv, true) => "dvf",
                    (FltAdd, false) => "fadd",
                    (FltSub, false) => "fsub",
                    (FltMul, false) => "fmul",
                    (FltDiv, false) => "fdiv",
                    _ => unreachable!(),
                };
                let suffix = self.flt_suffix(node);
                let _ = write!(self.em, "\t{}{} ", mnemonic, suffix);
                self.write_reg(node)?;
                let _ = write!(self.em, ", ");
                self.write_reg(self.graph.in_at(node, 0))?;
                let _ = write!(self.em, ", ");
                self.write_reg(self.graph.in_at(node, 1))?;
                let _ = writeln!(self.em);
            }
            FltLoad => {
                let fpa = matches!(self.features.arm_fpu, ArmFpu::Fpa | ArmFpu::Fpe);
                let mnemonic = if fpa { "ldf" } else { "flds" };
                let _ = write!(self.em, "\t{} ", mnemonic);
                self.write_dst(node, out::RES)?;
                let _ = write!(self.em, ", [");
                self.write_reg(self.graph.in_at(node, 0))?;
                let _ = writeln!(self.em, "]");
            }
            FltStore => {
                let fpa = matches!(self.features.arm_fpu, ArmFpu::Fpa | ArmFpu::Fpe);
                let mnemonic = if fpa { "stf" } else { "fsts" };
                let _ = write!(self.em, "\t{} ", mnemonic);
                self.write_reg(self.graph.in_at(node, 2))?;
                let _ = write!(self.em, ", [");
                self.write_reg(self.graph.in_at(node, 0))?;
                let _ = writeln!(self.em, "]");
            }
            FltMov => {
                let _ = write!(self.em, "\tmvf ");
                self.write_reg(node)?;
                let _ = write!(self.em, ", ");
                self.write_reg(self.graph.in_at(node, 0))?;
                let _ = writeln!(self.em);
            }
            CopyB => {
                // Word loop through the scratch register; rounds the count
                // up to whole words.
                let size = match &attr(self.graph, node).variant {
                    ArmAttrVariant::CopyB { size } => *size,
                    _ => 0,
                };
                let words = (size + 3) / 4;
                let _ = writeln!(self.em, "\tmov ip, #{}", words);
                let _ = writeln!(self.em, "1:");
                let _ = writeln!(self.em, "\tldr r3, [r1], #4");
                let _ = writeln!(self.em, "\tstr r3, [r0], #4");
                let _ = writeln!(self.em, "\tsubs ip, ip, #1");
                let _ = writeln!(self.em, "\tbne 1b");
            }
        }
        Ok(())
    }

    fn write_dst(&mut self, node: Node, pos: i64) -> CodegenResult<()> {
        let value = if self.graph.mode(node) == Mode::T {
            self.graph.find_proj(node, pos).ok_or_else(|| {
                CodegenError::Constraint(format!("node {:?} misses output {}", node, pos))
            })?
        } else {
            node
        };
        self.write_reg(value)
    }

    fn emit_switch_jmp(&mut self, node: Node) -> CodegenResult<()> {
        let default_pn = match &attr(self.graph, node).variant {
            ArmAttrVariant::SwitchJmp { default_pn } => *default_pn,
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
        let interval = max - min;

        let _ = write!(self.em, "\tcmp ");
        self.write_reg(self.graph.in_at(node, 0))?;
        let _ = writeln!(self.em, ", #{}", interval);
        let _ = write!(self.em, "\tbhi ");
        self.write_cfop_target(default_proj);
        let _ = writeln!(self.em);

        let label = format!(".LJT{}", self.jt_counter);
        self.jt_counter += 1;
        let _ = write!(self.em, "\tldr pc, [pc, ");
        self.write_reg(self.graph.in_at(node, 0))?;
        let _ = writeln!(self.em, ", lsl #2]");

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
        self.em.emit_jump_table(&label, 4, &targets);
        Ok(())
    }
}
