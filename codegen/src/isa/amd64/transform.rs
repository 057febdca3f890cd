//! Transforms the generic graph into amd64 instructions.
//!
//! The lowering mirrors the ia32 transformer with 64-bit widths and the
//! System V register argument convention; the address-mode matcher is
//! shared, since it works on the generic graph.

use crate::abi::AbiSignature;
use crate::betransform::{transform_graph as drive, TransformEnv, TransformHandler};
use crate::ir::{pn, Attr, Graph, Mode, Node, Op, Relation, SymbolTable};
use crate::isa::amd64::regs::{self, CLASS_FLAGS, CLASS_GP, CLASS_XMM, REG_RAX, REG_RCX, REG_RDX};
use crate::isa::amd64::{Amd64Attr, Amd64AttrVariant, Amd64Op};
use crate::isa::ia32::address_mode::{create_address_mode, load_of, use_source_address_mode};
use crate::isa::ia32::attrs::CondCode;
use crate::isa::CpuFeatures;
use crate::regs::RegReq;
use crate::{CodegenError, CodegenResult};

/// Output numbers of the multi-output amd64 nodes.
pub mod out {
    /// The result.
    pub const RES: i64 = 0;
    /// A load's memory result.
    pub const LOAD_MEM: i64 = 1;
    /// Quotient of a division; low half of a widening multiplication.
    pub const DIV_RES: i64 = 0;
    /// Remainder of a division.
    pub const DIV_MOD: i64 = 1;
}

/// Transform `src` into an amd64 graph.
pub fn transform_graph(
    features: &CpuFeatures,
    symbols: &mut SymbolTable,
    src: &Graph,
    sig: &AbiSignature,
) -> CodegenResult<Graph> {
    let mut handler = Amd64Transform {
        _features: features,
        _symbols: symbols,
        sig,
        noreg: None,
    };
    let dst = drive(src, &mut handler)?;
    dst.verify()?;
    Ok(dst)
}

struct Amd64Transform<'a> {
    _features: &'a CpuFeatures,
    _symbols: &'a mut SymbolTable,
    sig: &'a AbiSignature,
    noreg: Option<Node>,
}

fn req_gp() -> RegReq {
    RegReq::Normal(CLASS_GP)
}

fn req_xmm() -> RegReq {
    RegReq::Normal(CLASS_XMM)
}

fn req_flags() -> RegReq {
    RegReq::Normal(CLASS_FLAGS)
}

fn req_none() -> RegReq {
    RegReq::None
}

fn req_gp_fixed(index: u8) -> RegReq {
    RegReq::fixed(&regs::CLASSES[CLASS_GP as usize], CLASS_GP, index)
}

fn same_as(slot: usize) -> RegReq {
    RegReq::Same(CLASS_GP, slot as u8)
}

/// The operation width for a generic mode.
fn op_mode(mode: Mode) -> Mode {
    if mode.is_float() {
        Mode::F64
    } else if mode.bits() > 32 || mode.is_pointer() {
        Mode::U64
    } else {
        Mode::U32
    }
}

impl<'a> Amd64Transform<'a> {
    fn noreg(&mut self, env: &mut TransformEnv) -> Node {
        *self.noreg.get_or_insert_with(|| {
            let block = env.dst.start_block;
            let node = env.dst.add_node_attr(
                block,
                Op::Amd64(Amd64Op::NoReg),
                Mode::U64,
                &[],
                Attr::Amd64(Box::new(Amd64Attr::new())),
            );
            env.dst.set_reg(node, regs::noreg());
            node
        })
    }

    fn new_node(
        &self,
        env: &mut TransformEnv,
        block: Node,
        op: Amd64Op,
        mode: Mode,
        ins: &[Node],
        attr: Amd64Attr,
    ) -> Node {
        env.dst
            .add_node_attr(block, Op::Amd64(op), mode, ins, Attr::Amd64(Box::new(attr)))
    }

    fn try_immediate(&mut self, env: &mut TransformEnv, node: Node) -> Option<Node> {
        match env.src.op(node) {
            Op::Const => {
                let tv = env.src.attr(node).constant();
                if !tv.mode().is_int() && !tv.mode().is_pointer() {
                    return None;
                }
                // Immediates are sign-extended from 32 bit.
                let v = tv.as_i64();
                if i32::try_from(v).is_err() {
                    return None;
                }
                let block = env.dst.start_block;
                let imm = self.new_node(
                    env,
                    block,
                    Amd64Op::Immediate,
                    Mode::U64,
                    &[],
                    Amd64Attr::with_variant(Amd64AttrVariant::Immediate {
                        ent: None,
                        offset: v,
                    }),
                );
                env.dst.set_reg(imm, regs::noreg());
                Some(imm)
            }
            Op::SymConst => match env.src.attr(node) {
                Attr::SymConst(ent) => {
                    let ent = *ent;
                    let block = env.dst.start_block;
                    let imm = self.new_node(
                        env,
                        block,
                        Amd64Op::Immediate,
                        Mode::U64,
                        &[],
                        Amd64Attr::with_variant(Amd64AttrVariant::Immediate {
                            ent: Some(ent),
                            offset: 0,
                        }),
                    );
                    env.dst.set_reg(imm, regs::noreg());
                    Some(imm)
                }
                _ => None,
            },
            _ => None,
        }
    }

    fn gen_binop(
        &mut self,
        env: &mut TransformEnv,
        node: Node,
        op: Amd64Op,
        commutative: bool,
    ) -> CodegenResult<Node> {
        let src = env.src;
        let op1 = src.in_at(node, 0);
        let op2 = src.in_at(node, 1);
        let mode = op_mode(src.mode(node));
        let src_block = src.block_of(node);
        let block = env.block_of(node);
        let noreg = self.noreg(env);

        let mut attr = Amd64Attr::new();
        attr.ls_mode = Some(mode);

        // Fold a single-use load on the right into a memory operand.
        if use_source_address_mode(src, src_block, op2, Some(op1), None, false) {
            let load = load_of(src, op2).unwrap();
            let am = create_address_mode(src, src.in_at(load, 1), false);
            let base = match am.base {
                Some(b) => env.transform(self, b)?,
                None => noreg,
            };
            let index = match am.index {
                Some(i) => env.transform(self, i)?,
                None => noreg,
            };
            let mem = env.transform(self, src.in_at(load, 0))?;
            attr.source_am = true;
            attr.am_scale = am.scale;
            attr.am_offs = am.offset;
            attr.am_sym = am.symbol;
            let left = env.transform(self, op1)?;
            let new_node = self.new_node(
                env,
                block,
                op,
                Mode::T,
                &[base, index, mem, left, noreg],
                attr,
            );
            env.dst.set_reqs(
                new_node,
                vec![req_gp(), req_gp(), req_none(), req_gp(), req_gp()],
                vec![same_as(3), req_none()],
            );
            env.set_transformed(load, new_node);
            return Ok(env.dst.proj(new_node, mode, out::RES));
        }

        let left = env.transform(self, op1)?;
        let right = match self.try_immediate(env, op2) {
            Some(imm) => imm,
            None => env.transform(self, op2)?,
        };
        attr.source_am = false;
        let _ = commutative;
        let no_mem = env.dst.no_mem;
        let new_node = self.new_node(
            env,
            block,
            op,
            mode,
            &[noreg, noreg, no_mem, left, right],
            attr,
        );
        env.dst.set_reqs(
            new_node,
            vec![req_gp(), req_gp(), req_none(), req_gp(), req_gp()],
            vec![same_as(3)],
        );
        Ok(new_node)
    }

    fn gen_shift(&mut self, env: &mut TransformEnv, node: Node, op: Amd64Op) -> CodegenResult<Node> {
        let src = env.src;
        let mode = op_mode(src.mode(node));
        let block = env.block_of(node);
        let val = env.transform(self, src.in_at(node, 0))?;
        let count = src.in_at(node, 1);
        let (new_count, req) = match self.try_immediate(env, count) {
            Some(imm) => (imm, req_gp()),
            None => (env.transform(self, count)?, req_gp_fixed(REG_RCX)),
        };
        let mut attr = Amd64Attr::new();
        attr.ls_mode = Some(mode);
        let new_node = self.new_node(env, block, op, mode, &[val, new_count], attr);
        env.dst.set_reqs(new_node, vec![req_gp(), req], vec![same_as(0)]);
        Ok(new_node)
    }

    fn gen_div(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<Node> {
        let src = env.src;
        let left = src.in_at(node, 1);
        let right = src.in_at(node, 2);
        let mode = src.mode(left);
        let block = env.block_of(node);
        let new_left = env.transform(self, left)?;
        let new_right = env.transform(self, right)?;
        let noreg = self.noreg(env);

        let (op, high) = if mode.is_signed() {
            let cqto = self.new_node(
                env,
                block,
                Amd64Op::Cqto,
                Mode::U64,
                &[new_left],
                Amd64Attr::new(),
            );
            env.dst
                .set_reqs(cqto, vec![req_gp_fixed(REG_RAX)], vec![req_gp_fixed(REG_RDX)]);
            (Amd64Op::IDiv, cqto)
        } else {
            let zero = self.new_node(
                env,
                block,
                Amd64Op::Const,
                Mode::U64,
                &[],
                Amd64Attr::with_variant(Amd64AttrVariant::Immediate {
                    ent: None,
                    offset: 0,
                }),
            );
            env.dst.set_reqs(zero, vec![], vec![req_gp()]);
            (Amd64Op::Div, zero)
        };

        let mut attr = Amd64Attr::new();
        attr.ls_mode = Some(op_mode(mode));
        let no_mem = env.dst.no_mem;
        let div = self.new_node(
            env,
            block,
            op,
            Mode::T,
            &[noreg, noreg, no_mem, new_right, new_left, high],
            attr,
        );
        env.dst.set_reqs(
            div,
            vec![
                req_gp(),
                req_gp(),
                req_none(),
                req_gp(),
                req_gp_fixed(REG_RAX),
                req_gp_fixed(REG_RDX),
            ],
            vec![req_gp_fixed(REG_RAX), req_gp_fixed(REG_RDX)],
        );
        Ok(div)
    }

    fn gen_cmp(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<(Node, CondCode)> {
        let src = env.src;
        let left = src.in_at(node, 0);
        let right = src.in_at(node, 1);
        let relation = match src.attr(node) {
            Attr::Cmp { relation } => *relation,
            _ => panic!("cmp without relation"),
        };
        let mode = src.mode(left);
        let block = env.block_of(node);
        let noreg = self.noreg(env);

        let new_left = env.transform(self, left)?;
        let (op, new_right) = if is_const_zero(src, right) {
            (Amd64Op::Test, new_left)
        } else {
            match self.try_immediate(env, right) {
                Some(imm) => (Amd64Op::Cmp, imm),
                None => (Amd64Op::Cmp, env.transform(self, right)?),
            }
        };
        let mut attr = Amd64Attr::new();
        attr.ls_mode = Some(op_mode(mode));
        let no_mem = env.dst.no_mem;
        let cmp = self.new_node(
            env,
            block,
            op,
            Mode::Flags,
            &[noreg, noreg, no_mem, new_left, new_right],
            attr,
        );
        env.dst.set_reqs(
            cmp,
            vec![req_gp(), req_gp(), req_none(), req_gp(), req_gp()],
            vec![req_flags()],
        );
        Ok((cmp, CondCode::int(relation, !mode.is_signed())))
    }

    fn get_flags(&mut self, env: &mut TransformEnv, sel: Node) -> CodegenResult<(Node, CondCode)> {
        if env.src.op(sel) == Op::Cmp {
            return self.gen_cmp(env, sel);
        }
        let block = env.block_of(sel);
        let noreg = self.noreg(env);
        let new_sel = env.transform(self, sel)?;
        let mut attr = Amd64Attr::new();
        attr.ls_mode = Some(Mode::U64);
        let no_mem = env.dst.no_mem;
        let test = self.new_node(
            env,
            block,
            Amd64Op::Test,
            Mode::Flags,
            &[noreg, noreg, no_mem, new_sel, new_sel],
            attr,
        );
        env.dst.set_reqs(
            test,
            vec![req_gp(), req_gp(), req_none(), req_gp(), req_gp()],
            vec![req_flags()],
        );
        Ok((test, CondCode::int(Relation::LG, false)))
    }

    fn gen_param(&mut self, env: &mut TransformEnv, index: usize) -> CodegenResult<Node> {
        // System V: the first six integer arguments come in registers.
        let arg_regs = regs::arg_regs();
        if index >= arg_regs.len() {
            return Err(CodegenError::Unsupported(
                "stack parameters on amd64".to_string(),
            ));
        }
        let mode = op_mode(self.sig.params.get(index).copied().unwrap_or(Mode::U64));
        let start = env.dst.start;
        let proj = env.dst.proj(start, mode, pn::START_ARGS + index as i64);
        env.dst.set_reg(proj, arg_regs[index]);
        Ok(proj)
    }
}

fn is_const_zero(src: &Graph, node: Node) -> bool {
    src.op(node) == Op::Const && src.attr(node).constant().is_zero()
}

impl<'a> TransformHandler for Amd64Transform<'a> {
    fn phi_mode(&self, mode: Mode) -> Mode {
        match mode {
            Mode::M | Mode::T | Mode::X => mode,
            m if m.is_float() => Mode::F64,
            m => op_mode(m),
        }
    }

    fn transform(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<Node> {
        let src = env.src;
        match src.op(node) {
            Op::Const => {
                let tv = src.attr(node).constant();
                if tv.mode().is_float() {
                    return Err(CodegenError::Unsupported(
                        "float constants on amd64".to_string(),
                    ));
                }
                let block = env.block_of(node);
                let c = self.new_node(
                    env,
                    block,
                    Amd64Op::Const,
                    op_mode(tv.mode()),
                    &[],
                    Amd64Attr::with_variant(Amd64AttrVariant::Immediate {
                        ent: None,
                        offset: tv.as_i64(),
                    }),
                );
                env.dst.set_reqs(c, vec![], vec![req_gp()]);
                Ok(c)
            }
            Op::SymConst => {
                let ent = match src.attr(node) {
                    Attr::SymConst(ent) => *ent,
                    _ => panic!("symconst without entity"),
                };
                let block = env.block_of(node);
                let c = self.new_node(
                    env,
                    block,
                    Amd64Op::Const,
                    Mode::U64,
                    &[],
                    Amd64Attr::with_variant(Amd64AttrVariant::Immediate {
                        ent: Some(ent),
                        offset: 0,
                    }),
                );
                env.dst.set_reqs(c, vec![], vec![req_gp()]);
                Ok(c)
            }
            Op::Jmp => {
                let block = env.block_of(node);
                Ok(env.dst.add_node(block, Op::Jmp, Mode::X, &[]))
            }
            Op::Add => self.gen_binop(env, node, Amd64Op::Add, true),
            Op::Sub => self.gen_binop(env, node, Amd64Op::Sub, false),
            Op::Mul => self.gen_binop(env, node, Amd64Op::IMul, true),
            Op::And => self.gen_binop(env, node, Amd64Op::And, true),
            Op::Or => self.gen_binop(env, node, Amd64Op::Or, true),
            Op::Eor => self.gen_binop(env, node, Amd64Op::Xor, true),
            Op::Shl => self.gen_shift(env, node, Amd64Op::Shl),
            Op::Shr => self.gen_shift(env, node, Amd64Op::Shr),
            Op::Shrs => self.gen_shift(env, node, Amd64Op::Sar),
            Op::Div | Op::Mod | Op::DivMod => self.gen_div(env, node),
            Op::Not => {
                let block = env.block_of(node);
                let noreg = self.noreg(env);
                let v = env.transform(self, src.in_at(node, 0))?;
                let mut attr = Amd64Attr::new();
                attr.ls_mode = Some(op_mode(src.mode(node)));
                let no_mem = env.dst.no_mem;
                let n = self.new_node(
                    env,
                    block,
                    Amd64Op::Not,
                    op_mode(src.mode(node)),
                    &[noreg, noreg, no_mem, v],
                    attr,
                );
                env.dst.set_reqs(
                    n,
                    vec![req_gp(), req_gp(), req_none(), req_gp()],
                    vec![same_as(3)],
                );
                Ok(n)
            }
            Op::Minus => {
                let block = env.block_of(node);
                let noreg = self.noreg(env);
                let v = env.transform(self, src.in_at(node, 0))?;
                let mut attr = Amd64Attr::new();
                attr.ls_mode = Some(op_mode(src.mode(node)));
                let no_mem = env.dst.no_mem;
                let n = self.new_node(
                    env,
                    block,
                    Amd64Op::Neg,
                    op_mode(src.mode(node)),
                    &[noreg, noreg, no_mem, v],
                    attr,
                );
                env.dst.set_reqs(
                    n,
                    vec![req_gp(), req_gp(), req_none(), req_gp()],
                    vec![same_as(3)],
                );
                Ok(n)
            }
            Op::Conv => {
                // The integer conversions are free on amd64 as long as the
                // consumer respects the operation width; sign extensions
                // widen explicitly.
                let op = src.in_at(node, 0);
                let from = src.mode(op);
                let to = src.mode(node);
                let t = env.transform(self, op)?;
                if !from.is_int() || !to.is_int() || to.bits() <= from.bits() {
                    return Ok(t);
                }
                let block = env.block_of(node);
                let noreg = self.noreg(env);
                let mut attr = Amd64Attr::new();
                attr.ls_mode = Some(from);
                let no_mem = env.dst.no_mem;
                let conv = self.new_node(
                    env,
                    block,
                    Amd64Op::Conv,
                    op_mode(to),
                    &[noreg, noreg, no_mem, t],
                    attr,
                );
                env.dst.set_reqs(
                    conv,
                    vec![req_gp(), req_gp(), req_none(), req_gp()],
                    vec![req_gp()],
                );
                Ok(conv)
            }
            Op::Load => {
                let mem = src.in_at(node, 0);
                let ptr = src.in_at(node, 1);
                let mode = match src.attr(node) {
                    Attr::MemAccess { mode } => *mode,
                    _ => panic!("load without mode"),
                };
                let block = env.block_of(node);
                let noreg = self.noreg(env);
                let am = create_address_mode(src, ptr, false);
                let base = match am.base {
                    Some(b) => env.transform(self, b)?,
                    None => noreg,
                };
                let index = match am.index {
                    Some(i) => env.transform(self, i)?,
                    None => noreg,
                };
                let new_mem = env.transform(self, mem)?;
                let mut attr = Amd64Attr::new();
                attr.am_scale = am.scale;
                attr.am_offs = am.offset;
                attr.am_sym = am.symbol;
                attr.ls_mode = Some(mode);
                let load = self.new_node(
                    env,
                    block,
                    Amd64Op::Load,
                    Mode::T,
                    &[base, index, new_mem],
                    attr,
                );
                env.dst.set_reqs(
                    load,
                    vec![req_gp(), req_gp(), req_none()],
                    vec![req_gp(), req_none()],
                );
                Ok(load)
            }
            Op::Store => {
                let mem = src.in_at(node, 0);
                let ptr = src.in_at(node, 1);
                let value = src.in_at(node, 2);
                let mode = match src.attr(node) {
                    Attr::MemAccess { mode } => *mode,
                    _ => panic!("store without mode"),
                };
                let block = env.block_of(node);
                let noreg = self.noreg(env);
                let am = create_address_mode(src, ptr, false);
                let base = match am.base {
                    Some(b) => env.transform(self, b)?,
                    None => noreg,
                };
                let index = match am.index {
                    Some(i) => env.transform(self, i)?,
                    None => noreg,
                };
                let new_mem = env.transform(self, mem)?;
                let new_val = match self.try_immediate(env, value) {
                    Some(imm) => imm,
                    None => env.transform(self, value)?,
                };
                let mut attr = Amd64Attr::new();
                attr.am_scale = am.scale;
                attr.am_offs = am.offset;
                attr.am_sym = am.symbol;
                attr.ls_mode = Some(mode);
                let store = self.new_node(
                    env,
                    block,
                    Amd64Op::Store,
                    Mode::M,
                    &[base, index, new_mem, new_val],
                    attr,
                );
                env.dst.set_reqs(
                    store,
                    vec![req_gp(), req_gp(), req_none(), req_gp()],
                    vec![req_none()],
                );
                Ok(store)
            }
            Op::Cmp => Ok(self.get_flags(env, node)?.0),
            Op::Cond => {
                let sel = src.in_at(node, 0);
                let block = env.block_of(node);
                let (flags, cc) = self.get_flags(env, sel)?;
                let jcc = self.new_node(
                    env,
                    block,
                    Amd64Op::Jcc,
                    Mode::T,
                    &[flags],
                    Amd64Attr::with_variant(Amd64AttrVariant::CondCode(cc)),
                );
                env.dst.set_reqs(jcc, vec![req_flags()], vec![]);
                Ok(jcc)
            }
            Op::Switch => {
                let sel = src.in_at(node, 0);
                let default_pn = match src.attr(node) {
                    Attr::Switch { default_pn } => *default_pn,
                    _ => panic!("switch without default"),
                };
                let block = env.block_of(node);
                let new_sel = env.transform(self, sel)?;
                let jmp = self.new_node(
                    env,
                    block,
                    Amd64Op::SwitchJmp,
                    Mode::T,
                    &[new_sel],
                    Amd64Attr::with_variant(Amd64AttrVariant::SwitchJmp { default_pn }),
                );
                env.dst.set_reqs(jmp, vec![req_gp()], vec![]);
                Ok(jmp)
            }
            Op::Return => {
                let block = env.block_of(node);
                let mem = env.transform(self, src.in_at(node, 0))?;
                let mut ins = vec![mem];
                let mut reqs = vec![req_none()];
                for i in 1..src.n_ins(node) {
                    let v = env.transform(self, src.in_at(node, i))?;
                    ins.push(v);
                    if src.mode(src.in_at(node, i)).is_float() {
                        reqs.push(RegReq::fixed(
                            &regs::CLASSES[CLASS_XMM as usize],
                            CLASS_XMM,
                            0,
                        ));
                    } else {
                        reqs.push(req_gp_fixed(REG_RAX));
                    }
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
            Op::Call => {
                let callee = match src.attr(node) {
                    Attr::Call { callee } => *callee,
                    _ => panic!("call without attribute"),
                };
                let block = env.block_of(node);
                let noreg = self.noreg(env);
                let mem = env.transform(self, src.in_at(node, 0))?;
                let first_arg = if callee.is_some() { 1 } else { 2 };
                let arg_regs = regs::arg_regs();
                let mut ins = vec![noreg, noreg, mem];
                let mut reqs = vec![req_gp(), req_gp(), req_none()];
                for (slot, i) in (first_arg..src.n_ins(node)).enumerate() {
                    if slot >= arg_regs.len() {
                        return Err(CodegenError::Unsupported(
                            "stack arguments on amd64".to_string(),
                        ));
                    }
                    let v = env.transform(self, src.in_at(node, i))?;
                    ins.push(v);
                    reqs.push(req_gp_fixed(arg_regs[slot].index));
                }
                if callee.is_none() {
                    let target = env.transform(self, src.in_at(node, 1))?;
                    ins.push(target);
                    reqs.push(req_gp());
                }
                let call = self.new_node(
                    env,
                    block,
                    Amd64Op::Call,
                    Mode::T,
                    &ins,
                    Amd64Attr::with_variant(Amd64AttrVariant::Call { callee }),
                );
                env.dst
                    .set_reqs(call, reqs, vec![req_gp_fixed(REG_RAX), req_none()]);
                Ok(call)
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
                        return self.gen_param(env, (pnr - pn::START_ARGS) as usize);
                    }
                    return Err(CodegenError::Unsupported(format!(
                        "start projection {}",
                        pnr
                    )));
                }
                let t = env.transform(self, pred)?;
                if env.dst.mode(t) != Mode::T {
                    return Ok(t);
                }
                let new_pn = match src.op(pred) {
                    Op::Load => {
                        if pnr == pn::MEM {
                            out::LOAD_MEM
                        } else {
                            out::RES
                        }
                    }
                    Op::Div => {
                        if pnr == pn::MEM {
                            return env.transform(self, src.in_at(pred, 0));
                        }
                        out::DIV_RES
                    }
                    Op::Mod => {
                        if pnr == pn::MEM {
                            return env.transform(self, src.in_at(pred, 0));
                        }
                        out::DIV_MOD
                    }
                    Op::DivMod => {
                        if pnr == pn::MEM {
                            return env.transform(self, src.in_at(pred, 0));
                        }
                        if pnr == pn::DIVMOD_DIV {
                            out::DIV_RES
                        } else {
                            out::DIV_MOD
                        }
                    }
                    Op::Call => {
                        if pnr == pn::MEM {
                            1
                        } else {
                            0
                        }
                    }
                    _ => pnr,
                };
                if let Some(existing) = env.dst.find_proj(t, new_pn) {
                    return Ok(existing);
                }
                let mode = match src.mode(node) {
                    Mode::M => Mode::M,
                    Mode::X => Mode::X,
                    m => op_mode(m),
                };
                Ok(env.dst.proj(t, mode, new_pn))
            }
            Op::NoMem => Ok(env.dst.no_mem),
            op => Err(CodegenError::Unsupported(format!(
                "no amd64 lowering for {:?}",
                op
            ))),
        }
    }
}
