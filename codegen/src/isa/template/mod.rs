//! The TEMPLATE back-end: a porting seed.
//!
//! Copy this directory, rename the types and fill in the lowering and
//! emission for the new architecture. The target understands just enough
//! operations to compile straight-line integer code.

use core::fmt::Write;

use crate::abi::AbiSignature;
use crate::betransform::{transform_graph as drive, TransformEnv, TransformHandler};
use crate::gas::{GasEmitter, ObjectFormat};
use crate::ir::{pn, Attr, Graph, Mode, Node, Op, SymbolTable};
use crate::isa::{CpuFeatures, TargetIsa};
use crate::regs::{RegClass, RegClassId, Register, RegisterKind, RegReq};
use crate::sched::blocksched::BlockSchedule;
use crate::sched::Schedule;
use crate::{CodegenError, CodegenResult};

/// The only register class.
pub const CLASS_GP: RegClassId = 0;

static GP_REGS: [Register; 8] = [
    Register { name: "r0", class: CLASS_GP, index: 0, kind: RegisterKind::Normal },
    Register { name: "r1", class: CLASS_GP, index: 1, kind: RegisterKind::Normal },
    Register { name: "r2", class: CLASS_GP, index: 2, kind: RegisterKind::Normal },
    Register { name: "r3", class: CLASS_GP, index: 3, kind: RegisterKind::Normal },
    Register { name: "r4", class: CLASS_GP, index: 4, kind: RegisterKind::Normal },
    Register { name: "r5", class: CLASS_GP, index: 5, kind: RegisterKind::Normal },
    Register { name: "r6", class: CLASS_GP, index: 6, kind: RegisterKind::Normal },
    Register { name: "sp", class: CLASS_GP, index: 7, kind: RegisterKind::Ignore },
];

/// The register classes of the TEMPLATE target.
pub static CLASSES: [RegClass; 1] = [RegClass {
    name: "template_gp",
    mode: Mode::U32,
    regs: &GP_REGS,
}];

/// The TEMPLATE instructions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum TemplateOp {
    Const,
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Not,
    Load,
    Store,
    Jmp,
}

impl TemplateOp {
    /// Does this instruction end its block?
    pub fn is_block_terminator(self) -> bool {
        matches!(self, TemplateOp::Jmp)
    }
}

/// The TEMPLATE back-end.
pub struct TemplateIsa {
    features: CpuFeatures,
    format: ObjectFormat,
}

impl TemplateIsa {
    /// Create the target.
    pub fn new(features: CpuFeatures, format: ObjectFormat) -> TemplateIsa {
        TemplateIsa { features, format }
    }
}

struct TemplateTransform;

fn req_gp() -> RegReq {
    RegReq::Normal(CLASS_GP)
}

impl TransformHandler for TemplateTransform {
    fn phi_mode(&self, mode: Mode) -> Mode {
        match mode {
            Mode::M | Mode::T | Mode::X => mode,
            _ => Mode::U32,
        }
    }

    fn transform(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<Node> {
        let src = env.src;
        let binop = |env: &mut TransformEnv,
                     this: &mut TemplateTransform,
                     node: Node,
                     op: TemplateOp|
         -> CodegenResult<Node> {
            let block = env.block(env.src.block_of(node));
            let l = env.transform(this, env.src.in_at(node, 0))?;
            let r = env.transform(this, env.src.in_at(node, 1))?;
            let n = env
                .dst
                .add_node(block, Op::Template(op), Mode::U32, &[l, r]);
            env.dst
                .set_reqs(n, vec![req_gp(), req_gp()], vec![req_gp()]);
            Ok(n)
        };
        match src.op(node) {
            Op::Const => {
                let block = env.block_of(node);
                let tv = src.attr(node).constant();
                let c = env.dst.add_node_attr(
                    block,
                    Op::Template(TemplateOp::Const),
                    Mode::U32,
                    &[],
                    Attr::Const(tv),
                );
                env.dst.set_reqs(c, vec![], vec![req_gp()]);
                Ok(c)
            }
            Op::Add => binop(env, self, node, TemplateOp::Add),
            Op::Sub => binop(env, self, node, TemplateOp::Sub),
            Op::Mul => binop(env, self, node, TemplateOp::Mul),
            Op::And => binop(env, self, node, TemplateOp::And),
            Op::Or => binop(env, self, node, TemplateOp::Or),
            Op::Eor => binop(env, self, node, TemplateOp::Xor),
            Op::Not => {
                let block = env.block_of(node);
                let v = env.transform(self, src.in_at(node, 0))?;
                let n = env
                    .dst
                    .add_node(block, Op::Template(TemplateOp::Not), Mode::U32, &[v]);
                env.dst.set_reqs(n, vec![req_gp()], vec![req_gp()]);
                Ok(n)
            }
            Op::Jmp => {
                let block = env.block_of(node);
                Ok(env.dst.add_node(block, Op::Jmp, Mode::X, &[]))
            }
            Op::Return => {
                let block = env.block_of(node);
                let mem = env.transform(self, src.in_at(node, 0))?;
                let mut ins = vec![mem];
                let mut reqs = vec![RegReq::None];
                for i in 1..src.n_ins(node) {
                    ins.push(env.transform(self, src.in_at(node, i))?);
                    reqs.push(RegReq::fixed(&CLASSES[0], CLASS_GP, 0));
                }
                let ret = env.dst.add_node_attr(
                    block,
                    Op::Return,
                    Mode::X,
                    &ins,
                    Attr::Return { pop: 0, pad: false },
                );
                env.dst.set_reqs(ret, reqs, vec![]);
                Ok(ret)
            }
            Op::Proj => {
                let pred = src.in_at(node, 0);
                let pnr = src.attr(node).proj();
                if src.op(pred) == Op::Start {
                    if pnr == pn::START_MEM {
                        let start = env.dst.start;
                        if let Some(m) = env.dst.find_proj(start, pn::START_MEM) {
                            return Ok(m);
                        }
                        return Ok(env.dst.proj(start, Mode::M, pn::START_MEM));
                    }
                    if pnr >= pn::START_ARGS {
                        let start = env.dst.start;
                        let i = (pnr - pn::START_ARGS) as usize;
                        let proj = env.dst.proj(start, Mode::U32, pnr);
                        env.dst.set_reg(proj, &GP_REGS[i.min(3)]);
                        return Ok(proj);
                    }
                }
                let t = env.transform(self, pred)?;
                if env.dst.mode(t) != Mode::T {
                    return Ok(t);
                }
                Ok(env.dst.proj(t, Mode::U32, pnr))
            }
            Op::NoMem => Ok(env.dst.no_mem),
            op => Err(CodegenError::Unsupported(format!(
                "no TEMPLATE lowering for {:?}",
                op
            ))),
        }
    }
}

impl TargetIsa for TemplateIsa {
    fn name(&self) -> &'static str {
        "TEMPLATE"
    }

    fn pointer_mode(&self) -> Mode {
        Mode::P32
    }

    fn features(&self) -> &CpuFeatures {
        &self.features
    }

    fn object_format(&self) -> ObjectFormat {
        self.format
    }

    fn reg_classes(&self) -> &'static [RegClass] {
        &CLASSES
    }

    fn transform(
        &self,
        _symbols: &mut SymbolTable,
        graph: &Graph,
        _sig: &AbiSignature,
    ) -> CodegenResult<Graph> {
        let dst = drive(graph, &mut TemplateTransform)?;
        dst.verify()?;
        Ok(dst)
    }

    fn introduce_prologue_epilogue(
        &self,
        _symbols: &mut SymbolTable,
        _graph: &mut Graph,
        _sched: &mut Schedule,
        _sig: &AbiSignature,
    ) -> CodegenResult<()> {
        Ok(())
    }

    fn peephole(&self, _graph: &mut Graph, _sched: &mut Schedule) {}

    fn finalize(
        &self,
        _symbols: &mut SymbolTable,
        _graph: &mut Graph,
        _sched: &mut Schedule,
    ) -> CodegenResult<()> {
        Ok(())
    }

    fn emit_function(
        &self,
        em: &mut GasEmitter,
        symbols: &SymbolTable,
        graph: &Graph,
        sched: &Schedule,
        blocks: &BlockSchedule,
    ) -> CodegenResult<()> {
        em.function_prolog(symbols, graph.entity, self.features.function_alignment);
        for &block in blocks.blocks() {
            for &node in sched.block_nodes(block) {
                emit_node(em, graph, node)?;
            }
        }
        em.function_epilog(symbols, graph.entity);
        Ok(())
    }
}

fn emit_node(em: &mut GasEmitter, graph: &Graph, node: Node) -> CodegenResult<()> {
    let reg = |n: Node| -> CodegenResult<&'static str> {
        graph
            .reg(n)
            .map(|r| r.name)
            .ok_or_else(|| CodegenError::RegConstraint(format!("{:?} has no register", n)))
    };
    match graph.op(node) {
        Op::Template(TemplateOp::Const) => {
            let tv = graph.attr(node).constant();
            let _ = writeln!(em, "\tmov {}, #{}", reg(node)?, tv.as_i64());
        }
        Op::Template(op) => {
            let mnemonic = match op {
                TemplateOp::Add => "add",
                TemplateOp::Sub => "sub",
                TemplateOp::Mul => "mul",
                TemplateOp::And => "and",
                TemplateOp::Or => "or",
                TemplateOp::Xor => "xor",
                TemplateOp::Not => "not",
                TemplateOp::Load => "load",
                TemplateOp::Store => "store",
                TemplateOp::Jmp => "jmp",
                TemplateOp::Const => unreachable!(),
            };
            match op {
                TemplateOp::Not => {
                    let _ = writeln!(
                        em,
                        "\t{} {}, {}",
                        mnemonic,
                        reg(node)?,
                        reg(graph.in_at(node, 0))?
                    );
                }
                _ => {
                    let _ = writeln!(
                        em,
                        "\t{} {}, {}, {}",
                        mnemonic,
                        reg(node)?,
                        reg(graph.in_at(node, 0))?,
                        reg(graph.in_at(node, 1))?
                    );
                }
            }
        }
        Op::Return => {
            let _ = writeln!(em, "\tret");
        }
        _ => {}
    }
    Ok(())
}
