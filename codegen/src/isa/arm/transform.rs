//! Transforms the generic graph into arm instructions.
//!
//! Divisions become calls to the compiler support library
//! (`__divsi3`/`__udivsi3`/`__modsi3`/`__umodsi3`), since the ISA has no
//! hardware divide. With `-mfpu=softfloat` the float operations go the
//! same way. Constant shift amounts fold into the second operand's shift
//! modifier.

use crate::abi::AbiSignature;
use crate::betransform::{transform_graph as drive, TransformEnv, TransformHandler};
use crate::ir::{pn, Attr, Graph, Mode, Node, Op, Relation, SymbolTable};
use crate::isa::arm::regs::{self, CLASS_FLAGS, CLASS_FP, CLASS_GP};
use crate::isa::arm::{ArmAttr, ArmAttrVariant, ArmOp, ShiftModifier};
use crate::isa::ia32::attrs::CondCode;
use crate::isa::{ArmFpu, CpuFeatures};
use crate::regs::RegReq;
use crate::{CodegenError, CodegenResult};

/// Output numbers of multi-output arm nodes.
pub mod out {
    /// The result.
    pub const RES: i64 = 0;
    /// A load's memory result.
    pub const LOAD_MEM: i64 = 1;
    /// A call's memory result.
    pub const CALL_MEM: i64 = 1;
}

/// Transform `src` into an arm graph.
pub fn transform_graph(
    features: &CpuFeatures,
    symbols: &mut SymbolTable,
    src: &Graph,
    sig: &AbiSignature,
) -> CodegenResult<Graph> {
    let mut handler = ArmTransform {
        features,
        symbols,
        sig,
    };
    let dst = drive(src, &mut handler)?;
    dst.verify()?;
    Ok(dst)
}

struct ArmTransform<'a> {
    features: &'a CpuFeatures,
    symbols: &'a mut SymbolTable,
    sig: &'a AbiSignature,
}

fn req_gp() -> RegReq {
    RegReq::Normal(CLASS_GP)
}

fn req_fp() -> RegReq {
    RegReq::Normal(CLASS_FP)
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

impl<'a> ArmTransform<'a> {
    fn new_node(
        &self,
        env: &mut TransformEnv,
        block: Node,
        op: ArmOp,
        mode: Mode,
        ins: &[Node],
        attr: ArmAttr,
    ) -> Node {
        env.dst
            .add_node_attr(block, Op::Arm(op), mode, ins, Attr::Arm(Box::new(attr)))
    }

    /// Small rotated immediates encode inline; everything else is
    /// materialised.
    fn try_immediate(&mut self, env: &mut TransformEnv, node: Node) -> Option<Node> {
        if env.src.op(node) != Op::Const {
            return None;
        }
        let tv = env.src.attr(node).constant();
        if !tv.mode().is_int() && !tv.mode().is_pointer() {
            return None;
        }
        let v = tv.as_u64() as u32;
        if !is_rotated_imm8(v) {
            return None;
        }
        let block = env.dst.start_block;
        let imm = self.new_node(
            env,
            block,
            ArmOp::Immediate,
            Mode::U32,
            &[],
            ArmAttr::with_variant(ArmAttrVariant::Immediate {
                ent: None,
                offset: v as i32,
            }),
        );
        Some(imm)
    }

    fn gen_binop(
        &mut self,
        env: &mut TransformEnv,
        node: Node,
        op: ArmOp,
    ) -> CodegenResult<Node> {
        let src = env.src;
        let op1 = src.in_at(node, 0);
        let op2 = src.in_at(node, 1);
        let block = env.block_of(node);
        let left = env.transform(self, op1)?;

        // A constant left shift on the right operand folds into the shift
        // modifier.
        let mut attr = ArmAttr::new();
        let right = if src.op(op2) == Op::Shl && src.n_uses(op2) == 1 {
            let count = src.in_at(op2, 1);
            if let Op::Const = src.op(count) {
                let k = src.attr(count).constant().as_i64();
                if (1..32).contains(&k) {
                    attr.shift = Some(ShiftModifier::Lsl(k as u8));
                    env.transform(self, src.in_at(op2, 0))?
                } else {
                    env.transform(self, op2)?
                }
            } else {
                env.transform(self, op2)?
            }
        } else {
            match self.try_immediate(env, op2) {
                Some(imm) => imm,
                None => env.transform(self, op2)?,
            }
        };

        let new_node = self.new_node(env, block, op, Mode::U32, &[left, right], attr);
        env.dst
            .set_reqs(new_node, vec![req_gp(), req_gp()], vec![req_gp()]);
        Ok(new_node)
    }

    fn gen_shift(
        &mut self,
        env: &mut TransformEnv,
        node: Node,
        kind: fn(u8) -> ShiftModifier,
    ) -> CodegenResult<Node> {
        let src = env.src;
        let val = env.transform(self, src.in_at(node, 0))?;
        let count = src.in_at(node, 1);
        let block = env.block_of(node);
        let mut attr = ArmAttr::new();
        if src.op(count) == Op::Const {
            let k = (src.attr(count).constant().as_i64() & 31) as u8;
            attr.shift = Some(kind(k));
            let mov = self.new_node(env, block, ArmOp::Mov, Mode::U32, &[val], attr);
            env.dst.set_reqs(mov, vec![req_gp()], vec![req_gp()]);
            return Ok(mov);
        }
        // Register-specified shifts use the mov form with a register shift
        // amount; keep it as a two-input mov.
        let new_count = env.transform(self, count)?;
        attr.shift = Some(kind(0));
        let mov = self.new_node(env, block, ArmOp::Mov, Mode::U32, &[val, new_count], attr);
        env.dst
            .set_reqs(mov, vec![req_gp(), req_gp()], vec![req_gp()]);
        Ok(mov)
    }

    /// Division has no hardware form; call into the support library.
    fn gen_div_call(
        &mut self,
        env: &mut TransformEnv,
        node: Node,
        modulo: bool,
    ) -> CodegenResult<Node> {
        let src = env.src;
        let left = src.in_at(node, 1);
        let right = src.in_at(node, 2);
        let signed = src.mode(left).is_signed();
        let name = match (signed, modulo) {
            (true, false) => "__divsi3",
            (false, false) => "__udivsi3",
            (true, true) => "__modsi3",
            (false, true) => "__umodsi3",
        };
        let callee = self.symbols.declare_function(name);
        let block = env.block_of(node);
        let mem = env.transform(self, src.in_at(node, 0))?;
        let new_left = env.transform(self, left)?;
        let new_right = env.transform(self, right)?;
        let call = self.new_node(
            env,
            block,
            ArmOp::Bl,
            Mode::T,
            &[mem, new_left, new_right],
            ArmAttr::with_variant(ArmAttrVariant::Call {
                callee: Some(callee),
            }),
        );
        env.dst.set_reqs(
            call,
            vec![req_none(), req_gp_fixed(0), req_gp_fixed(1)],
            vec![req_gp_fixed(0), req_none()],
        );
        Ok(call)
    }

    fn gen_float_binop(
        &mut self,
        env: &mut TransformEnv,
        node: Node,
        op: ArmOp,
        soft_name: &str,
    ) -> CodegenResult<Node> {
        let src = env.src;
        let block = env.block_of(node);
        if self.features.arm_fpu == ArmFpu::SoftFloat {
            let callee = self.symbols.declare_function(soft_name);
            let left = env.transform(self, src.in_at(node, 0))?;
            let right = env.transform(self, src.in_at(node, 1))?;
            let no_mem = env.dst.no_mem;
            let call = self.new_node(
                env,
                block,
                ArmOp::Bl,
                Mode::T,
                &[no_mem, left, right],
                ArmAttr::with_variant(ArmAttrVariant::Call {
                    callee: Some(callee),
                }),
            );
            env.dst.set_reqs(
                call,
                vec![req_none(), req_gp_fixed(0), req_gp_fixed(1)],
                vec![req_gp_fixed(0), req_none()],
            );
            return Ok(env.dst.proj(call, Mode::U32, out::RES));
        }
        let left = env.transform(self, src.in_at(node, 0))?;
        let right = env.transform(self, src.in_at(node, 1))?;
        let mut attr = ArmAttr::new();
        attr.ls_mode = Some(src.mode(node));
        let new_node = self.new_node(env, block, op, Mode::F64, &[left, right], attr);
        env.dst
            .set_reqs(new_node, vec![req_fp(), req_fp()], vec![req_fp()]);
        Ok(new_node)
    }

    fn gen_cmp(&mut self, env: &mut TransformEnv, sel: Node) -> CodegenResult<(Node, CondCode)> {
        let src = env.src;
        if src.op(sel) != Op::Cmp {
            let block = env.block_of(sel);
            let new_sel = env.transform(self, sel)?;
            let tst = self.new_node(
                env,
                block,
                ArmOp::Tst,
                Mode::Flags,
                &[new_sel, new_sel],
                ArmAttr::new(),
            );
            env.dst
                .set_reqs(tst, vec![req_gp(), req_gp()], vec![req_flags()]);
            return Ok((tst, CondCode::int(Relation::LG, false)));
        }
        let left = src.in_at(sel, 0);
        let right = src.in_at(sel, 1);
        let relation = match src.attr(sel) {
            Attr::Cmp { relation } => *relation,
            _ => panic!("cmp without relation"),
        };
        let unsigned = !src.mode(left).is_signed();
        let block = env.block_of(sel);
        let new_left = env.transform(self, left)?;
        let new_right = match self.try_immediate(env, right) {
            Some(imm) => imm,
            None => env.transform(self, right)?,
        };
        let cmp = self.new_node(
            env,
            block,
            ArmOp::Cmp,
            Mode::Flags,
            &[new_left, new_right],
            ArmAttr::new(),
        );
        env.dst
            .set_reqs(cmp, vec![req_gp(), req_gp()], vec![req_flags()]);
        Ok((cmp, CondCode::int(relation, unsigned)))
    }

    fn gen_param(&mut self, env: &mut TransformEnv, index: usize) -> CodegenResult<Node> {
        // AAPCS: the first four words come in r0-r3. A 64-bit float is
        // pre-split into two integer halves, high word first.
        let mode = self.sig.params.get(index).copied().unwrap_or(Mode::U32);
        let mut slot = 0usize;
        for m in self.sig.params.iter().take(index) {
            slot += if m.bits() > 32 { 2 } else { 1 };
        }
        if mode.bits() > 32 {
            return Err(CodegenError::Unsupported(
                "64-bit parameters must be pre-split into integer halves".to_string(),
            ));
        }
        if slot >= 4 {
            return Err(CodegenError::Unsupported(
                "stack parameters on arm".to_string(),
            ));
        }
        let start = env.dst.start;
        let proj = env.dst.proj(start, Mode::U32, pn::START_ARGS + index as i64);
        env.dst.set_reg(proj, regs::gp_reg(slot as u8));
        Ok(proj)
    }
}

/// Is `v` an 8-bit value rotated by an even amount (the arm immediate
/// form)?
fn is_rotated_imm8(v: u32) -> bool {
    for rot in 0..16 {
        if v.rotate_left(rot * 2) <= 0xff {
            return true;
        }
    }
    false
}

impl<'a> TransformHandler for ArmTransform<'a> {
    fn phi_mode(&self, mode: Mode) -> Mode {
        match mode {
            Mode::M | Mode::T | Mode::X => mode,
            m if m.is_float() && self.features.arm_fpu != ArmFpu::SoftFloat => Mode::F64,
            _ => Mode::U32,
        }
    }

    fn transform(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<Node> {
        let src = env.src;
        match src.op(node) {
            Op::Const => {
                let tv = src.attr(node).constant();
                if tv.mode().is_float() {
                    return Err(CodegenError::Unsupported(
                        "float constants need the constant pool".to_string(),
                    ));
                }
                let block = env.block_of(node);
                let c = self.new_node(
                    env,
                    block,
                    ArmOp::Const,
                    Mode::U32,
                    &[],
                    ArmAttr::with_variant(ArmAttrVariant::Immediate {
                        ent: None,
                        offset: tv.as_u64() as i32,
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
                    ArmOp::Const,
                    Mode::U32,
                    &[],
                    ArmAttr::with_variant(ArmAttrVariant::Immediate {
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
            Op::Add => {
                if src.mode(node).is_float() {
                    self.gen_float_binop(env, node, ArmOp::FltAdd, "__adddf3")
                } else {
                    self.gen_binop(env, node, ArmOp::Add)
                }
            }
            Op::Sub => {
                if src.mode(node).is_float() {
                    self.gen_float_binop(env, node, ArmOp::FltSub, "__subdf3")
                } else {
                    self.gen_binop(env, node, ArmOp::Sub)
                }
            }
            Op::Mul => {
                if src.mode(node).is_float() {
                    self.gen_float_binop(env, node, ArmOp::FltMul, "__muldf3")
                } else {
                    self.gen_binop(env, node, ArmOp::Mul)
                }
            }
            Op::And => self.gen_binop(env, node, ArmOp::And),
            Op::Or => self.gen_binop(env, node, ArmOp::Orr),
            Op::Eor => self.gen_binop(env, node, ArmOp::Eor),
            Op::Shl => self.gen_shift(env, node, ShiftModifier::Lsl),
            Op::Shr => self.gen_shift(env, node, ShiftModifier::Lsr),
            Op::Shrs => self.gen_shift(env, node, ShiftModifier::Asr),
            Op::Rotl => self.gen_shift(env, node, ShiftModifier::Ror),
            Op::Not => {
                let block = env.block_of(node);
                let v = env.transform(self, src.in_at(node, 0))?;
                let mvn = self.new_node(env, block, ArmOp::Mvn, Mode::U32, &[v], ArmAttr::new());
                env.dst.set_reqs(mvn, vec![req_gp()], vec![req_gp()]);
                Ok(mvn)
            }
            Op::Minus => {
                // rsb r, r, #0
                let block = env.block_of(node);
                let v = env.transform(self, src.in_at(node, 0))?;
                let start_block = env.dst.start_block;
                let zero = self.new_node(
                    env,
                    start_block,
                    ArmOp::Immediate,
                    Mode::U32,
                    &[],
                    ArmAttr::with_variant(ArmAttrVariant::Immediate {
                        ent: None,
                        offset: 0,
                    }),
                );
                let rsb = self.new_node(env, block, ArmOp::Rsb, Mode::U32, &[v, zero], ArmAttr::new());
                env.dst
                    .set_reqs(rsb, vec![req_gp(), req_gp()], vec![req_gp()]);
                Ok(rsb)
            }
            Op::Div => self.gen_div_call(env, node, false),
            Op::Mod => self.gen_div_call(env, node, true),
            Op::DivMod => Err(CodegenError::Unsupported(
                "combined division needs two library calls".to_string(),
            )),
            Op::Quot => self.gen_float_binop(env, node, ArmOp::FltDiv, "__divdf3"),
            Op::Conv => {
                // The integer conversions are shifts; same-size is free.
                let op = src.in_at(node, 0);
                let from = src.mode(op);
                let to = src.mode(node);
                let t = env.transform(self, op)?;
                if !from.is_int() || !to.is_int() || to.bits() <= from.bits() {
                    return Ok(t);
                }
                let block = env.block_of(node);
                let bits = 32 - from.bits() as u8;
                let mut up = ArmAttr::new();
                up.shift = Some(ShiftModifier::Lsl(bits));
                let shl = self.new_node(env, block, ArmOp::Mov, Mode::U32, &[t], up);
                env.dst.set_reqs(shl, vec![req_gp()], vec![req_gp()]);
                let mut down = ArmAttr::new();
                down.shift = Some(if from.is_signed() {
                    ShiftModifier::Asr(bits)
                } else {
                    ShiftModifier::Lsr(bits)
                });
                let shr = self.new_node(env, block, ArmOp::Mov, Mode::U32, &[shl], down);
                env.dst.set_reqs(shr, vec![req_gp()], vec![req_gp()]);
                Ok(shr)
            }
            Op::Load => {
                let mem = src.in_at(node, 0);
                let ptr = src.in_at(node, 1);
                let mode = match src.attr(node) {
                    Attr::MemAccess { mode } => *mode,
                    _ => panic!("load without mode"),
                };
                let block = env.block_of(node);
                let new_ptr = env.transform(self, ptr)?;
                let new_mem = env.transform(self, mem)?;
                let (op, fp) = if mode.is_float() && self.features.arm_fpu != ArmFpu::SoftFloat {
                    (ArmOp::FltLoad, true)
                } else {
                    (ArmOp::Ldr, false)
                };
                let mut attr = ArmAttr::new();
                attr.ls_mode = Some(mode);
                attr.sign_extend = mode.is_signed() && mode.bits() < 32;
                let load = self.new_node(env, block, op, Mode::T, &[new_ptr, new_mem], attr);
                env.dst.set_reqs(
                    load,
                    vec![req_gp(), req_none()],
                    vec![if fp { req_fp() } else { req_gp() }, req_none()],
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
                let new_ptr = env.transform(self, ptr)?;
                let new_mem = env.transform(self, mem)?;
                let new_val = env.transform(self, value)?;
                let (op, fp) = if mode.is_float() && self.features.arm_fpu != ArmFpu::SoftFloat {
                    (ArmOp::FltStore, true)
                } else {
                    (ArmOp::Str, false)
                };
                let mut attr = ArmAttr::new();
                attr.ls_mode = Some(mode);
                let store = self.new_node(env, block, op, Mode::M, &[new_ptr, new_mem, new_val], attr);
                env.dst.set_reqs(
                    store,
                    vec![req_gp(), req_none(), if fp { req_fp() } else { req_gp() }],
                    vec![req_none()],
                );
                Ok(store)
            }
            Op::Cmp => Ok(self.gen_cmp(env, node)?.0),
            Op::Cond => {
                let sel = src.in_at(node, 0);
                let block = env.block_of(node);
                let (flags, cc) = self.gen_cmp(env, sel)?;
                let bcc = self.new_node(
                    env,
                    block,
                    ArmOp::Bcc,
                    Mode::T,
                    &[flags],
                    ArmAttr::with_variant(ArmAttrVariant::CondCode(cc)),
                );
                env.dst.set_reqs(bcc, vec![req_flags()], vec![]);
                Ok(bcc)
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
                    ArmOp::SwitchJmp,
                    Mode::T,
                    &[new_sel],
                    ArmAttr::with_variant(ArmAttrVariant::SwitchJmp { default_pn }),
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
                    reqs.push(req_gp_fixed(0));
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
                let mem = env.transform(self, src.in_at(node, 0))?;
                let first_arg = if callee.is_some() { 1 } else { 2 };
                let mut ins = vec![mem];
                let mut reqs = vec![req_none()];
                for (slot, i) in (first_arg..src.n_ins(node)).enumerate() {
                    if slot >= 4 {
                        return Err(CodegenError::Unsupported(
                            "stack arguments on arm".to_string(),
                        ));
                    }
                    let v = env.transform(self, src.in_at(node, i))?;
                    ins.push(v);
                    reqs.push(req_gp_fixed(slot as u8));
                }
                let call = self.new_node(
                    env,
                    block,
                    ArmOp::Bl,
                    Mode::T,
                    &ins,
                    ArmAttr::with_variant(ArmAttrVariant::Call { callee }),
                );
                env.dst
                    .set_reqs(call, reqs, vec![req_gp_fixed(0), req_none()]);
                Ok(call)
            }
            Op::CopyB => {
                let size = match src.attr(node) {
                    Attr::CopyB { size } => *size,
                    _ => panic!("copyb without size"),
                };
                let block = env.block_of(node);
                let mem = env.transform(self, src.in_at(node, 0))?;
                let dst_ptr = env.transform(self, src.in_at(node, 1))?;
                let src_ptr = env.transform(self, src.in_at(node, 2))?;
                // The loop moves whole words; sizes that are not a
                // multiple of 4 copy up to 3 bytes more than asked.
                let copy = self.new_node(
                    env,
                    block,
                    ArmOp::CopyB,
                    Mode::M,
                    &[dst_ptr, src_ptr, mem],
                    ArmAttr::with_variant(ArmAttrVariant::CopyB { size }),
                );
                env.dst.set_reqs(
                    copy,
                    vec![req_gp_fixed(0), req_gp_fixed(1), req_none()],
                    vec![req_none()],
                );
                Ok(copy)
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
                    Op::Div | Op::Mod => {
                        if pnr == pn::MEM {
                            out::CALL_MEM
                        } else {
                            out::RES
                        }
                    }
                    Op::Call => {
                        if pnr == pn::MEM {
                            out::CALL_MEM
                        } else {
                            out::RES
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
                    m if m.is_float() && self.features.arm_fpu != ArmFpu::SoftFloat => Mode::F64,
                    _ => Mode::U32,
                };
                Ok(env.dst.proj(t, mode, new_pn))
            }
            Op::NoMem => Ok(env.dst.no_mem),
            op => Err(CodegenError::Unsupported(format!(
                "no arm lowering for {:?}",
                op
            ))),
        }
    }
}
