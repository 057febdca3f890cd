//! Transforms the generic graph into ia32 instructions.
//!
//! Dispatch is by opcode. Binary operations run through the argument
//! matcher, which folds immediates and source memory operands; loads and
//! stores fold their address computation; compares become flag producers
//! consumed by the conditional nodes. Float code selects SSE or x87
//! depending on the CPU features.

use log::debug;

use crate::abi::{AbiSignature, ArgLoc};
use crate::betransform::{transform_graph as drive, TransformEnv, TransformHandler};
use crate::ir::{
    pn, Attr, BuiltinKind, Entity, Graph, Mode, Node, Op, Relation, SymbolTable, TarVal,
};
use crate::isa::ia32::address_mode::{
    create_address_mode, load_of, use_source_address_mode, AddressMode,
};
use crate::isa::ia32::attrs::{AttrVariant, CondCode, Ia32Attr, OpType};
use crate::isa::ia32::regs::{
    self, CLASS_FLAGS, CLASS_GP, CLASS_VFP, CLASS_XMM, REG_EAX, REG_EBX, REG_ECX, REG_EDX,
    REG_ESP,
};
use crate::isa::ia32::setcc::{self, Step};
use crate::isa::ia32::{n, out, Ia32Op};
use crate::isa::CpuFeatures;
use crate::rbitset::RBitSet;
use crate::regs::RegReq;
use crate::{CodegenError, CodegenResult};

/// Transform `src` into an ia32 graph.
pub fn transform_graph(
    features: &CpuFeatures,
    symbols: &mut SymbolTable,
    src: &Graph,
    sig: &AbiSignature,
) -> CodegenResult<Graph> {
    let mut handler = Ia32Transform {
        features,
        symbols,
        sig,
        noreg_gp: None,
        noreg_xmm: None,
        noreg_vfp: None,
        sp: None,
        initial_mem: None,
    };
    let dst = drive(src, &mut handler)?;
    dst.verify()?;
    Ok(dst)
}

struct Ia32Transform<'a> {
    features: &'a CpuFeatures,
    symbols: &'a mut SymbolTable,
    sig: &'a AbiSignature,
    noreg_gp: Option<Node>,
    noreg_xmm: Option<Node>,
    noreg_vfp: Option<Node>,
    sp: Option<Node>,
    initial_mem: Option<Node>,
}

/// Argument match flags, mirroring the capabilities of each instruction.
#[derive(Clone, Copy, Default)]
struct MatchFlags {
    commutative: bool,
    am: bool,
    am8bit: bool,
    am16bit: bool,
    immediate: bool,
    mode_neutral: bool,
    two_users: bool,
}

/// The result of matching the operands of a binary operation.
struct MatchedArgs {
    base: Node,
    index: Node,
    mem: Node,
    op1: Option<Node>,
    op2: Node,
    attr: Ia32Attr,
    /// The source load, when a memory operand was folded.
    am_load: Option<Node>,
}

fn req_gp() -> RegReq {
    RegReq::Normal(CLASS_GP)
}

fn req_xmm() -> RegReq {
    RegReq::Normal(CLASS_XMM)
}

fn req_vfp() -> RegReq {
    RegReq::Normal(CLASS_VFP)
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

fn req_vfp_fixed(index: u8) -> RegReq {
    RegReq::fixed(&regs::CLASSES[CLASS_VFP as usize], CLASS_VFP, index)
}

/// The registers with an addressable low byte.
fn req_gp_8bit() -> RegReq {
    let mut mask = RBitSet::new(regs::CLASSES[CLASS_GP as usize].len());
    mask.set(REG_EAX as usize);
    mask.set(REG_EBX as usize);
    mask.set(REG_ECX as usize);
    mask.set(REG_EDX as usize);
    RegReq::Limited(CLASS_GP, mask)
}

fn same_as(slot: usize) -> RegReq {
    RegReq::Same(CLASS_GP, slot as u8)
}

impl<'a> Ia32Transform<'a> {
    fn noreg_gp(&mut self, env: &mut TransformEnv) -> Node {
        *self.noreg_gp.get_or_insert_with(|| {
            let block = env.dst.start_block;
            let node = env.dst.add_node_attr(
                block,
                Op::Ia32(Ia32Op::NoRegGp),
                Mode::U32,
                &[],
                Attr::Ia32(Box::new(Ia32Attr::new())),
            );
            env.dst.set_reg(node, regs::gp_noreg());
            node
        })
    }

    fn noreg_xmm(&mut self, env: &mut TransformEnv) -> Node {
        *self.noreg_xmm.get_or_insert_with(|| {
            let block = env.dst.start_block;
            let node = env.dst.add_node_attr(
                block,
                Op::Ia32(Ia32Op::NoRegXmm),
                Mode::F64,
                &[],
                Attr::Ia32(Box::new(Ia32Attr::new())),
            );
            env.dst.set_reg(node, regs::xmm_reg(8));
            node
        })
    }

    fn noreg_vfp(&mut self, env: &mut TransformEnv) -> Node {
        *self.noreg_vfp.get_or_insert_with(|| {
            let block = env.dst.start_block;
            let node = env.dst.add_node_attr(
                block,
                Op::Ia32(Ia32Op::NoRegVfp),
                Mode::X80,
                &[],
                Attr::Ia32(Box::new(Ia32Attr::new())),
            );
            node
        })
    }

    fn noreg_for_mode(&mut self, env: &mut TransformEnv, mode: Mode) -> Node {
        if mode.is_float() {
            if self.features.use_sse2 {
                self.noreg_xmm(env)
            } else {
                self.noreg_vfp(env)
            }
        } else {
            self.noreg_gp(env)
        }
    }

    /// The incoming stack pointer, a fixed ignore register.
    fn sp(&mut self, env: &mut TransformEnv) -> Node {
        *self.sp.get_or_insert_with(|| {
            let start = env.dst.start;
            let node = env.dst.proj(start, Mode::U32, pn::START_SP);
            env.dst.set_reg(node, regs::esp_reg());
            node
        })
    }

    fn initial_mem(&mut self, env: &mut TransformEnv) -> Node {
        *self.initial_mem.get_or_insert_with(|| {
            let start = env.dst.start;
            env.dst.proj(start, Mode::M, pn::START_MEM)
        })
    }

    /// Create an ia32 node with an attribute block.
    fn new_node(
        &self,
        env: &mut TransformEnv,
        block: Node,
        op: Ia32Op,
        mode: Mode,
        ins: &[Node],
        attr: Ia32Attr,
    ) -> Node {
        env.dst
            .add_node_attr(block, Op::Ia32(op), mode, ins, Attr::Ia32(Box::new(attr)))
    }

    /// Create an `Immediate` pseudo node for a source constant, if it can be
    /// encoded.
    fn try_create_immediate(&mut self, env: &mut TransformEnv, node: Node) -> Option<Node> {
        match env.src.op(node) {
            Op::Const => {
                let tv = env.src.attr(node).constant();
                if !tv.mode().is_int() && !tv.mode().is_pointer() {
                    return None;
                }
                let offset = i32::try_from(tv.as_i64())
                    .or_else(|_| i32::try_from(tv.as_u64() as i64))
                    .ok()?;
                Some(self.create_immediate(env, None, false, offset))
            }
            Op::SymConst => match env.src.attr(node) {
                Attr::SymConst(ent) => {
                    let ent = *ent;
                    Some(self.create_immediate(env, Some(ent), false, 0))
                }
                _ => None,
            },
            _ => None,
        }
    }

    fn create_immediate(
        &mut self,
        env: &mut TransformEnv,
        ent: Option<Entity>,
        sign: bool,
        offset: i32,
    ) -> Node {
        let block = env.dst.start_block;
        let node = self.new_node(
            env,
            block,
            Ia32Op::Immediate,
            Mode::U32,
            &[],
            Ia32Attr::with_variant(AttrVariant::Immediate { ent, sign, offset }),
        );
        env.dst.set_reg(node, regs::gp_noreg());
        node
    }

    /// Skip integer down-conversions with a single user; the upper bits are
    /// free game for mode-neutral operations.
    fn skip_downconv(&self, src: &Graph, mut node: Node) -> Node {
        loop {
            if src.op(node) != Op::Conv || src.n_uses(node) > 1 {
                return node;
            }
            let op = src.in_at(node, 0);
            let from = src.mode(op);
            let to = src.mode(node);
            if (from.is_int() || from.is_pointer())
                && (to.is_int() || to.is_pointer())
                && to.bits() <= from.bits()
            {
                node = op;
            } else {
                return node;
            }
        }
    }

    /// Fill the address mode inputs of `am` (base/index to noreg when
    /// absent), transforming the matched source operands.
    fn build_address(
        &mut self,
        env: &mut TransformEnv,
        am: &AddressMode,
        mem: Option<Node>,
        attr: &mut Ia32Attr,
    ) -> CodegenResult<(Node, Node, Node)> {
        let base = match am.base {
            Some(b) => env.transform(self, b)?,
            None if am.use_frame => self.sp(env),
            None => self.noreg_gp(env),
        };
        let index = match am.index {
            Some(i) => env.transform(self, i)?,
            None => self.noreg_gp(env),
        };
        let mem = match mem {
            Some(m) => env.transform(self, m)?,
            None => env.dst.no_mem,
        };
        attr.am_scale = am.scale;
        attr.am_offs = am.offset;
        attr.am_sym = am.symbol;
        attr.am_sym_sign = am.symbol_sign;
        attr.use_frame = am.use_frame;
        attr.frame_ent = am.frame_entity;
        Ok((base, index, mem))
    }

    /// Match the operands of a binary operation into registers, immediates
    /// and source memory operands, as permitted by `flags`.
    fn match_arguments(
        &mut self,
        env: &mut TransformEnv,
        src_block: Node,
        op1: Option<Node>,
        op2: Node,
        other: Option<Node>,
        flags: MatchFlags,
    ) -> CodegenResult<MatchedArgs> {
        let src = env.src;
        let mode = src.mode(op2);
        let mode_bits = mode.bits();
        let mut attr = Ia32Attr::new();
        let mut use_am = flags.am;
        if (mode_bits == 8 && !flags.am8bit) || (mode_bits == 16 && !flags.am16bit) {
            use_am = false;
        }

        // Mode-neutral operations can see through down-conversions: the
        // upper bits may hold anything.
        let (op1, op2) = if flags.mode_neutral {
            (
                op1.map(|o| self.skip_downconv(src, o)),
                self.skip_downconv(src, op2),
            )
        } else {
            (op1, op2)
        };

        // Constants are normalized to the second operand by the front end.
        let mut new_op2 = if flags.immediate {
            self.try_create_immediate(env, op2)
        } else {
            None
        };

        let ls_mode = if flags.mode_neutral { Mode::U32 } else { mode };
        if new_op2.is_none()
            && use_am
            && use_source_address_mode(src, src_block, op2, op1, other, flags.two_users)
        {
            let load = load_of(src, op2).unwrap();
            let ptr = src.in_at(load, 1);
            let load_mem = src.in_at(load, 0);
            let am = create_address_mode(src, ptr, false);
            let (base, index, mem) = self.build_address(env, &am, Some(load_mem), &mut attr)?;
            attr.op_type = OpType::AddrModeS;
            attr.ls_mode = Some(load_mode(src, load));
            let new_op1 = match op1 {
                Some(o) => Some(env.transform(self, o)?),
                None => None,
            };
            let noreg = self.noreg_for_mode(env, mode);
            return Ok(MatchedArgs {
                base,
                index,
                mem,
                op1: new_op1,
                op2: noreg,
                attr,
                am_load: Some(load),
            });
        }

        if flags.commutative
            && new_op2.is_none()
            && use_am
            && op1.is_some()
            && use_source_address_mode(src, src_block, op1.unwrap(), Some(op2), other, flags.two_users)
        {
            let op1 = op1.unwrap();
            let load = load_of(src, op1).unwrap();
            let ptr = src.in_at(load, 1);
            let load_mem = src.in_at(load, 0);
            let am = create_address_mode(src, ptr, false);
            let (base, index, mem) = self.build_address(env, &am, Some(load_mem), &mut attr)?;
            attr.op_type = OpType::AddrModeS;
            attr.ls_mode = Some(load_mode(src, load));
            attr.ins_permuted = true;
            let new_op1 = env.transform(self, op2)?;
            let noreg = self.noreg_for_mode(env, mode);
            return Ok(MatchedArgs {
                base,
                index,
                mem,
                op1: Some(new_op1),
                op2: noreg,
                attr,
                am_load: Some(load),
            });
        }

        let new_op1 = match op1 {
            Some(o) => Some(env.transform(self, o)?),
            None => None,
        };
        if new_op2.is_none() {
            new_op2 = Some(env.transform(self, op2)?);
        }
        attr.ls_mode = Some(ls_mode);
        attr.commutative = flags.commutative;
        let base = self.noreg_gp(env);
        let index = self.noreg_gp(env);
        Ok(MatchedArgs {
            base,
            index,
            mem: env.dst.no_mem,
            op1: new_op1,
            op2: new_op2.unwrap(),
            attr,
            am_load: None,
        })
    }

    /// Build a standard two-operand ALU instruction.
    fn gen_binop(
        &mut self,
        env: &mut TransformEnv,
        node: Node,
        ia32_op: Ia32Op,
        op1: Node,
        op2: Node,
        flags: MatchFlags,
    ) -> CodegenResult<Node> {
        let src_block = env.src.block_of(node);
        let block = env.block_of(node);
        let args = self.match_arguments(env, src_block, Some(op1), op2, None, flags)?;
        let has_am = args.am_load.is_some();
        let mode = if has_am { Mode::T } else { Mode::U32 };
        let ins = [args.base, args.index, args.mem, args.op1.unwrap(), args.op2];
        let new_node = self.new_node(env, block, ia32_op, mode, &ins, args.attr);
        // The flags output slot stays requirement-free; nothing reuses the
        // flags of a fused operation.
        let out_reqs = if has_am {
            vec![same_as(n::LEFT), req_none(), req_none()]
        } else {
            vec![same_as(n::LEFT)]
        };
        env.dst.set_reqs(
            new_node,
            vec![req_gp(), req_gp(), req_none(), req_gp(), req_gp()],
            out_reqs,
        );
        if let Some(load) = args.am_load {
            env.set_transformed(load, new_node);
        }
        if has_am {
            Ok(env.dst.proj(new_node, Mode::U32, out::RES))
        } else {
            Ok(new_node)
        }
    }

    /// Build a float binop, selecting SSE or x87.
    fn gen_binop_float(
        &mut self,
        env: &mut TransformEnv,
        node: Node,
        sse_op: Ia32Op,
        x87_op: Ia32Op,
        commutative: bool,
    ) -> CodegenResult<Node> {
        let src = env.src;
        let op1 = src.in_at(node, 0);
        let op2 = src.in_at(node, 1);
        let src_block = src.block_of(node);
        let block = env.block_of(node);
        if self.features.use_sse2 {
            let flags = MatchFlags {
                commutative,
                am: true,
                ..Default::default()
            };
            let args = self.match_arguments(env, src_block, Some(op1), op2, None, flags)?;
            let has_am = args.am_load.is_some();
            let mode = if has_am { Mode::T } else { Mode::F64 };
            let ins = [args.base, args.index, args.mem, args.op1.unwrap(), args.op2];
            let mut attr = args.attr;
            if attr.ls_mode.is_none() || !attr.ls_mode.unwrap().is_float() {
                attr.ls_mode = Some(src.mode(node));
            }
            let new_node = self.new_node(env, block, sse_op, mode, &ins, attr);
            let out_reqs = if has_am {
                vec![RegReq::Same(CLASS_XMM, n::LEFT as u8), req_none()]
            } else {
                vec![RegReq::Same(CLASS_XMM, n::LEFT as u8)]
            };
            env.dst.set_reqs(
                new_node,
                vec![req_gp(), req_gp(), req_none(), req_xmm(), req_xmm()],
                out_reqs,
            );
            if let Some(load) = args.am_load {
                env.set_transformed(load, new_node);
            }
            if has_am {
                Ok(env.dst.proj(new_node, Mode::F64, out::RES))
            } else {
                Ok(new_node)
            }
        } else {
            let left = env.transform(self, op1)?;
            let right = env.transform(self, op2)?;
            let noreg = self.noreg_gp(env);
            let mut attr = Ia32Attr::with_variant(AttrVariant::X87 { slots: [None; 3] });
            attr.ls_mode = Some(src.mode(node));
            let no_mem = env.dst.no_mem;
            let new_node = self.new_node(
                env,
                block,
                x87_op,
                Mode::X80,
                &[noreg, noreg, no_mem, left, right],
                attr,
            );
            env.dst.set_reqs(
                new_node,
                vec![req_gp(), req_gp(), req_none(), req_vfp(), req_vfp()],
                vec![req_vfp()],
            );
            Ok(new_node)
        }
    }

    /// Build a shift. The count is either an immediate or lives in cl.
    fn gen_shift(
        &mut self,
        env: &mut TransformEnv,
        node: Node,
        ia32_op: Ia32Op,
    ) -> CodegenResult<Node> {
        let src = env.src;
        let val = self.skip_downconv(src, src.in_at(node, 0));
        let count = src.in_at(node, 1);
        let block = env.block_of(node);

        let new_val = env.transform(self, val)?;
        // The shift count reads cl; the upper bits are ignored by the
        // hardware, so any integer type goes.
        let (new_count, count_req) = match self.try_create_immediate(env, count) {
            Some(imm) => (imm, req_gp()),
            None => (
                env.transform(self, count)?,
                req_gp_fixed(REG_ECX),
            ),
        };
        let mut attr = Ia32Attr::new();
        attr.ls_mode = Some(Mode::U32);
        let new_node = self.new_node(env, block, ia32_op, Mode::U32, &[new_val, new_count], attr);
        env.dst
            .set_reqs(new_node, vec![req_gp(), count_req], vec![same_as(0)]);
        Ok(new_node)
    }

    /// Build a unary ALU instruction.
    fn gen_unop(
        &mut self,
        env: &mut TransformEnv,
        node: Node,
        ia32_op: Ia32Op,
        op: Node,
    ) -> CodegenResult<Node> {
        let block = env.block_of(node);
        let noreg = self.noreg_gp(env);
        let new_op = env.transform(self, op)?;
        let mut attr = Ia32Attr::new();
        attr.ls_mode = Some(Mode::U32);
        let no_mem = env.dst.no_mem;
        let new_node = self.new_node(
            env,
            block,
            ia32_op,
            Mode::U32,
            &[noreg, noreg, no_mem, new_op],
            attr,
        );
        env.dst.set_reqs(
            new_node,
            vec![req_gp(), req_gp(), req_none(), req_gp()],
            vec![same_as(n::UNARY)],
        );
        Ok(new_node)
    }

    /// Constants: immediates for integers, pool loads (or the dedicated
    /// zero/one opcodes) for floats.
    fn gen_const(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<Node> {
        let tv = env.src.attr(node).constant();
        let block = env.block_of(node);
        if tv.mode().is_float() {
            if self.features.use_sse2 {
                if tv.is_zero() && !tv.is_negative_zero() {
                    let new_node = self.new_node(
                        env,
                        block,
                        Ia32Op::XZero,
                        Mode::F64,
                        &[],
                        Ia32Attr::new(),
                    );
                    env.dst.set_reqs(new_node, vec![], vec![req_xmm()]);
                    return Ok(new_node);
                }
                let ent = self.symbols.constant(tv);
                let noreg = self.noreg_gp(env);
                let mut attr = Ia32Attr::new();
                attr.am_sym = Some(ent);
                attr.op_type = OpType::AddrModeS;
                attr.ls_mode = Some(tv.mode());
                let no_mem = env.dst.no_mem;
                let load = self.new_node(
                    env,
                    block,
                    Ia32Op::XLoad,
                    Mode::T,
                    &[noreg, noreg, no_mem],
                    attr,
                );
                env.dst.set_reqs(
                    load,
                    vec![req_gp(), req_gp(), req_none()],
                    vec![req_xmm(), req_none()],
                );
                return Ok(env.dst.proj(load, Mode::F64, out::LOAD_RES));
            }
            // x87: the simple constants have dedicated load opcodes.
            let simple = if tv.is_zero() && !tv.is_negative_zero() {
                Some(Ia32Op::Fldz)
            } else if tv.is_one() {
                Some(Ia32Op::Fld1)
            } else {
                None
            };
            if let Some(op) = simple {
                let new_node = self.new_node(env, block, op, Mode::X80, &[], Ia32Attr::new());
                env.dst.set_reqs(new_node, vec![], vec![req_vfp()]);
                return Ok(new_node);
            }
            let ent = self.symbols.constant(tv);
            let noreg = self.noreg_gp(env);
            let mut attr = Ia32Attr::new();
            attr.am_sym = Some(ent);
            attr.op_type = OpType::AddrModeS;
            attr.ls_mode = Some(tv.mode());
            let no_mem = env.dst.no_mem;
            let load = self.new_node(
                env,
                block,
                Ia32Op::Fld,
                Mode::T,
                &[noreg, noreg, no_mem],
                attr,
            );
            env.dst.set_reqs(
                load,
                vec![req_gp(), req_gp(), req_none()],
                vec![req_vfp(), req_none()],
            );
            return Ok(env.dst.proj(load, Mode::X80, out::LOAD_RES));
        }

        let value = i32::try_from(tv.as_i64())
            .or_else(|_| i32::try_from(tv.as_u64() as i64))
            .map_err(|_| {
                CodegenError::ConstantRange(format!("constant {:?} exceeds 32 bit", tv))
            })?;
        let new_node = self.new_node(
            env,
            block,
            Ia32Op::Const,
            Mode::U32,
            &[],
            Ia32Attr::with_variant(AttrVariant::Immediate {
                ent: None,
                sign: false,
                offset: value,
            }),
        );
        env.dst.set_reqs(new_node, vec![], vec![req_gp()]);
        Ok(new_node)
    }

    fn gen_symconst(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<Node> {
        let ent = match env.src.attr(node) {
            Attr::SymConst(ent) => *ent,
            _ => panic!("symconst without entity"),
        };
        let block = env.block_of(node);
        let new_node = self.new_node(
            env,
            block,
            Ia32Op::Const,
            Mode::U32,
            &[],
            Ia32Attr::with_variant(AttrVariant::Immediate {
                ent: Some(ent),
                sign: false,
                offset: 0,
            }),
        );
        env.dst.set_reqs(new_node, vec![], vec![req_gp()]);
        Ok(new_node)
    }

    fn gen_frame_addr(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<Node> {
        let ent = match env.src.attr(node) {
            Attr::FrameAddr(ent) => *ent,
            _ => panic!("frame address without entity"),
        };
        let block = env.block_of(node);
        let sp = self.sp(env);
        let noreg = self.noreg_gp(env);
        let mut attr = Ia32Attr::new();
        attr.use_frame = true;
        attr.frame_ent = Some(ent);
        let lea = self.new_node(env, block, Ia32Op::Lea, Mode::U32, &[sp, noreg], attr);
        env.dst
            .set_reqs(lea, vec![req_gp(), req_gp()], vec![req_gp()]);
        Ok(lea)
    }

    /// An incoming parameter: a register projection or a load from the
    /// argument area.
    fn gen_param(&mut self, env: &mut TransformEnv, index: usize) -> CodegenResult<Node> {
        let placement = crate::isa::ia32::abi::placement(self.sig);
        let loc = placement.params.get(index).copied().ok_or_else(|| {
            CodegenError::Constraint(format!("parameter {} out of range", index))
        })?;
        match loc {
            ArgLoc::Reg(reg) => {
                let start = env.dst.start;
                let proj = env
                    .dst
                    .proj(start, Mode::U32, pn::START_ARGS + index as i64);
                env.dst.set_reg(proj, reg);
                Ok(proj)
            }
            ArgLoc::Stack(off) => {
                let mode = self.sig.params[index];
                let ent = self.symbols.incoming_slot(
                    &format!("arg_{}", index),
                    mode.bytes(),
                    4 + off,
                );
                let block = env.dst.start_block;
                let sp = self.sp(env);
                let noreg = self.noreg_gp(env);
                let mem = self.initial_mem(env);
                let mut attr = Ia32Attr::new();
                attr.use_frame = true;
                attr.frame_ent = Some(ent);
                attr.ls_mode = Some(if mode.is_float() { mode } else { Mode::U32 });
                if mode.is_float() && self.features.use_sse2 {
                    let load = self.new_node(
                        env,
                        block,
                        Ia32Op::XLoad,
                        Mode::T,
                        &[sp, noreg, mem],
                        attr,
                    );
                    env.dst.set_reqs(
                        load,
                        vec![req_gp(), req_gp(), req_none()],
                        vec![req_xmm(), req_none()],
                    );
                    Ok(env.dst.proj(load, Mode::F64, out::LOAD_RES))
                } else if mode.is_float() {
                    let load = self.new_node(
                        env,
                        block,
                        Ia32Op::Fld,
                        Mode::T,
                        &[sp, noreg, mem],
                        attr,
                    );
                    env.dst.set_reqs(
                        load,
                        vec![req_gp(), req_gp(), req_none()],
                        vec![req_vfp(), req_none()],
                    );
                    Ok(env.dst.proj(load, Mode::X80, out::LOAD_RES))
                } else {
                    let load = self.new_node(
                        env,
                        block,
                        Ia32Op::Load,
                        Mode::T,
                        &[sp, noreg, mem],
                        attr,
                    );
                    env.dst.set_reqs(
                        load,
                        vec![req_gp(), req_gp(), req_none()],
                        vec![req_gp(), req_none()],
                    );
                    Ok(env.dst.proj(load, Mode::U32, out::LOAD_RES))
                }
            }
        }
    }

    fn gen_load(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<Node> {
        let src = env.src;
        let mem = src.in_at(node, 0);
        let ptr = src.in_at(node, 1);
        let mode = load_mode(src, node);
        let block = env.block_of(node);

        let am = create_address_mode(src, ptr, false);
        let mut attr = Ia32Attr::new();
        let (base, index, new_mem) = self.build_address(env, &am, Some(mem), &mut attr)?;
        attr.ls_mode = Some(mode);

        let (op, res_mode, res_req) = if mode.is_float() {
            if self.features.use_sse2 {
                (Ia32Op::XLoad, Mode::F64, req_xmm())
            } else {
                (Ia32Op::Fld, Mode::X80, req_vfp())
            }
        } else {
            (Ia32Op::Load, Mode::U32, req_gp())
        };
        let load = self.new_node(env, block, op, Mode::T, &[base, index, new_mem], attr);
        env.dst.set_reqs(
            load,
            vec![req_gp(), req_gp(), req_none()],
            vec![res_req, req_none()],
        );
        let _ = res_mode;
        Ok(load)
    }

    /// A store of a float constant is split into integer stores of its
    /// little-endian 4-byte chunks.
    fn gen_float_const_store(
        &mut self,
        env: &mut TransformEnv,
        node: Node,
        tv: TarVal,
    ) -> CodegenResult<Node> {
        let src = env.src;
        let mem = src.in_at(node, 0);
        let ptr = src.in_at(node, 1);
        let block = env.block_of(node);
        let am = create_address_mode(src, ptr, false);
        let mut current_mem = env.transform(self, mem)?;
        let chunks = tv.mode().bytes() / 4;
        let mut last = current_mem;
        for i in 0..chunks {
            let chunk = (tv.bits() >> (32 * i)) as u32;
            let imm = self.create_immediate(env, None, false, chunk as i32);
            let mut attr = Ia32Attr::new();
            let (base, index, _) = self.build_address(env, &am, None, &mut attr)?;
            attr.am_offs += (i * 4) as i32;
            attr.ls_mode = Some(Mode::U32);
            let store = self.new_node(
                env,
                block,
                Ia32Op::Store,
                Mode::M,
                &[base, index, current_mem, imm],
                attr,
            );
            env.dst.set_reqs(
                store,
                vec![req_gp(), req_gp(), req_none(), req_gp()],
                vec![req_none()],
            );
            current_mem = store;
            last = store;
        }
        Ok(last)
    }

    /// Try to turn `[p] := [p] op x` into one read-modify-write
    /// instruction.
    fn try_dest_am(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<Option<Node>> {
        let src = env.src;
        let mem = src.in_at(node, 0);
        let ptr = src.in_at(node, 1);
        let value = src.in_at(node, 2);
        let mode = store_mode(src, node);
        if !mode.is_int() && !mode.is_pointer() {
            return Ok(None);
        }
        if src.n_uses(value) != 1 {
            return Ok(None);
        }
        let (op, left, right) = match src.op(value) {
            Op::Add => (Ia32Op::Add, src.in_at(value, 0), Some(src.in_at(value, 1))),
            Op::Sub => (Ia32Op::Sub, src.in_at(value, 0), Some(src.in_at(value, 1))),
            Op::And => (Ia32Op::And, src.in_at(value, 0), Some(src.in_at(value, 1))),
            Op::Or => (Ia32Op::Or, src.in_at(value, 0), Some(src.in_at(value, 1))),
            Op::Eor => (Ia32Op::Xor, src.in_at(value, 0), Some(src.in_at(value, 1))),
            Op::Not => (Ia32Op::Not, src.in_at(value, 0), None),
            Op::Minus => (Ia32Op::Neg, src.in_at(value, 0), None),
            _ => return Ok(None),
        };
        // The left operand must be a load from the same address, feeding
        // only this operation, with the store's memory following the load.
        let load = match load_of(src, left) {
            Some(l) => l,
            None => return Ok(None),
        };
        if src.in_at(load, 1) != ptr || src.block_of(load) != src.block_of(node) {
            return Ok(None);
        }
        if src.n_uses(left) != 1 {
            return Ok(None);
        }
        if load_mode(src, load) != mode {
            return Ok(None);
        }
        // The store must read the load's memory projection and be its only
        // consumer, otherwise other accesses interleave.
        match src.find_proj(load, pn::MEM) {
            Some(mem_proj) if mem_proj == mem && src.n_uses(mem_proj) == 1 => {}
            _ => return Ok(None),
        }
        debug!("turning {:?} into a destination address mode", node);

        let block = env.block_of(node);
        let am = create_address_mode(src, ptr, false);
        let load_mem = src.in_at(load, 0);
        let mut attr = Ia32Attr::new();
        let (base, index, new_mem) = self.build_address(env, &am, Some(load_mem), &mut attr)?;
        attr.op_type = OpType::AddrModeD;
        attr.ls_mode = Some(mode);

        let new_node = match right {
            Some(r) => {
                let new_right = match self.try_create_immediate(env, r) {
                    Some(imm) => imm,
                    None => env.transform(self, r)?,
                };
                let store = self.new_node(
                    env,
                    block,
                    op,
                    Mode::M,
                    &[base, index, new_mem, new_right],
                    attr,
                );
                env.dst.set_reqs(
                    store,
                    vec![req_gp(), req_gp(), req_none(), req_gp()],
                    vec![req_none()],
                );
                store
            }
            None => {
                let store =
                    self.new_node(env, block, op, Mode::M, &[base, index, new_mem], attr);
                env.dst.set_reqs(
                    store,
                    vec![req_gp(), req_gp(), req_none()],
                    vec![req_none()],
                );
                store
            }
        };
        env.set_transformed(load, new_node);
        Ok(Some(new_node))
    }

    fn gen_store(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<Node> {
        let src = env.src;
        let mem = src.in_at(node, 0);
        let ptr = src.in_at(node, 1);
        let mut value = src.in_at(node, 2);
        let mut mode = store_mode(src, node);
        let block = env.block_of(node);

        if mode.is_float() && src.op(value) == Op::Const {
            let tv = src.attr(value).constant();
            return self.gen_float_const_store(env, node, tv);
        }

        if let Some(rmw) = self.try_dest_am(env, node)? {
            return Ok(rmw);
        }

        // An integer store of a narrowing conversion stores the narrow mode
        // directly.
        if mode.is_int() {
            let skipped = self.skip_downconv(src, value);
            if skipped != value {
                value = skipped;
            }
        }

        let am = create_address_mode(src, ptr, false);
        let mut attr = Ia32Attr::new();
        let (base, index, new_mem) = self.build_address(env, &am, Some(mem), &mut attr)?;
        attr.ls_mode = Some(mode);

        if mode.is_float() {
            if self.features.use_sse2 {
                let new_val = env.transform(self, value)?;
                let store = self.new_node(
                    env,
                    block,
                    Ia32Op::XStore,
                    Mode::M,
                    &[base, index, new_mem, new_val],
                    attr,
                );
                env.dst.set_reqs(
                    store,
                    vec![req_gp(), req_gp(), req_none(), req_xmm()],
                    vec![req_none()],
                );
                return Ok(store);
            }
            let new_val = env.transform(self, value)?;
            let store = self.new_node(
                env,
                block,
                Ia32Op::Fst,
                Mode::M,
                &[base, index, new_mem, new_val],
                attr,
            );
            env.dst.set_reqs(
                store,
                vec![req_gp(), req_gp(), req_none(), req_vfp()],
                vec![req_none()],
            );
            return Ok(store);
        }

        if mode.bits() == 8 {
            mode = mode.as_unsigned();
            attr.ls_mode = Some(mode);
        }
        let new_val = match self.try_create_immediate(env, value) {
            Some(imm) => imm,
            None => env.transform(self, value)?,
        };
        let val_req = if mode.bits() == 8 {
            req_gp_8bit()
        } else {
            req_gp()
        };
        let store = self.new_node(
            env,
            block,
            Ia32Op::Store,
            Mode::M,
            &[base, index, new_mem, new_val],
            attr,
        );
        env.dst.set_reqs(
            store,
            vec![req_gp(), req_gp(), req_none(), val_req],
            vec![req_none()],
        );
        Ok(store)
    }

    /// Produce the flag value and condition for a boolean selector.
    fn get_flags_node(
        &mut self,
        env: &mut TransformEnv,
        sel: Node,
    ) -> CodegenResult<(Node, CondCode)> {
        let src = env.src;
        if src.op(sel) == Op::Cmp {
            return self.gen_cmp(env, sel);
        }
        // A plain boolean value: test it against itself.
        let block = env.block_of(sel);
        let new_sel = env.transform(self, sel)?;
        let noreg = self.noreg_gp(env);
        let mut attr = Ia32Attr::new();
        attr.ls_mode = Some(Mode::U32);
        let no_mem = env.dst.no_mem;
        let test = self.new_node(
            env,
            block,
            Ia32Op::Test,
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

    /// Lower a compare to a flag-producing instruction.
    fn gen_cmp(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<(Node, CondCode)> {
        let src = env.src;
        let left = src.in_at(node, 0);
        let right = src.in_at(node, 1);
        let relation = match src.attr(node) {
            Attr::Cmp { relation } => *relation,
            _ => panic!("cmp without relation"),
        };
        let mode = src.mode(left);
        let src_block = src.block_of(node);
        let block = env.block_of(node);

        if mode.is_float() {
            return self.gen_float_cmp(env, node, relation);
        }
        let unsigned = !mode.is_signed();

        // A single-bit test against zero becomes bt: the carry flag holds
        // the bit.
        if self.features.use_bt
            && (relation == Relation::EQ || relation == Relation::LG)
            && is_const_value(src, right, 0)
            && src.op(left) == Op::And
        {
            let x = src.in_at(left, 0);
            let mask = src.in_at(left, 1);
            if src.op(mask) == Op::Const {
                if let Some(bit) = src.attr(mask).constant().pow2_exponent() {
                    let new_x = env.transform(self, x)?;
                    let imm = self.create_immediate(env, None, false, bit as i32);
                    let mut attr = Ia32Attr::new();
                    attr.ls_mode = Some(Mode::U32);
                    let bt = self.new_node(
                        env,
                        block,
                        Ia32Op::Bt,
                        Mode::Flags,
                        &[new_x, imm],
                        attr,
                    );
                    env.dst
                        .set_reqs(bt, vec![req_gp(), req_gp()], vec![req_flags()]);
                    // Carry set = bit set: "b"/"ae" in unsigned terms.
                    let rel = if relation == Relation::LG {
                        Relation::LT
                    } else {
                        Relation::GE
                    };
                    return Ok((bt, CondCode::int(rel, true)));
                }
            }
        }

        // Compare against zero prefers test, which has the shorter
        // encoding and frees an immediate slot.
        if is_const_value(src, right, 0) && relation.is_integer_relation() {
            let flags = MatchFlags {
                am: true,
                am8bit: true,
                am16bit: true,
                ..Default::default()
            };
            let args = self.match_arguments(env, src_block, Some(left), left, None, flags)?;
            let has_am = args.am_load.is_some();
            let mode_t = if has_am { Mode::T } else { Mode::Flags };
            let test = self.new_node(
                env,
                block,
                Ia32Op::Test,
                mode_t,
                &[args.base, args.index, args.mem, args.op1.unwrap(), args.op2],
                args.attr,
            );
            env.dst.set_reqs(
                test,
                vec![req_gp(), req_gp(), req_none(), req_gp(), req_gp()],
                if has_am {
                    vec![req_flags(), req_none()]
                } else {
                    vec![req_flags()]
                },
            );
            if let Some(load) = args.am_load {
                env.set_transformed(load, test);
            }
            let flags_node = if has_am {
                env.dst.proj(test, Mode::Flags, out::RES)
            } else {
                test
            };
            return Ok((flags_node, CondCode::int(relation, unsigned)));
        }

        let flags = MatchFlags {
            am: true,
            am8bit: true,
            am16bit: true,
            immediate: true,
            ..Default::default()
        };
        let args = self.match_arguments(env, src_block, Some(left), right, None, flags)?;
        let permuted = args.attr.ins_permuted;
        let has_am = args.am_load.is_some();
        let mode_t = if has_am { Mode::T } else { Mode::Flags };
        let cmp = self.new_node(
            env,
            block,
            Ia32Op::Cmp,
            mode_t,
            &[args.base, args.index, args.mem, args.op1.unwrap(), args.op2],
            args.attr,
        );
        env.dst.set_reqs(
            cmp,
            vec![req_gp(), req_gp(), req_none(), req_gp(), req_gp()],
            if has_am {
                vec![req_flags(), req_none()]
            } else {
                vec![req_flags()]
            },
        );
        if let Some(load) = args.am_load {
            env.set_transformed(load, cmp);
        }
        let flags_node = if has_am {
            env.dst.proj(cmp, Mode::Flags, out::RES)
        } else {
            cmp
        };
        let relation = if permuted { relation.mirrored() } else { relation };
        Ok((flags_node, CondCode::int(relation, unsigned)))
    }

    fn gen_float_cmp(
        &mut self,
        env: &mut TransformEnv,
        node: Node,
        relation: Relation,
    ) -> CodegenResult<(Node, CondCode)> {
        let src = env.src;
        let left = env.transform(self, src.in_at(node, 0))?;
        let right = env.transform(self, src.in_at(node, 1))?;
        let block = env.block_of(node);
        let cc = CondCode {
            relation,
            unsigned: false,
            float: true,
        };
        if self.features.use_sse2 {
            let noreg = self.noreg_gp(env);
            let mut attr = Ia32Attr::new();
            attr.ls_mode = Some(src.mode(src.in_at(node, 0)));
            let no_mem = env.dst.no_mem;
            let ucomi = self.new_node(
                env,
                block,
                Ia32Op::Ucomi,
                Mode::Flags,
                &[noreg, noreg, no_mem, left, right],
                attr,
            );
            env.dst.set_reqs(
                ucomi,
                vec![req_gp(), req_gp(), req_none(), req_xmm(), req_xmm()],
                vec![req_flags()],
            );
            return Ok((ucomi, cc));
        }
        // x87: fucomi writes the flags directly on P6; otherwise fucom +
        // fnstsw leaves the outcome in ax and sahf moves it over.
        if self.features.use_fucomi {
            let attr = Ia32Attr::with_variant(AttrVariant::X87 { slots: [None; 3] });
            let fucomi = self.new_node(
                env,
                block,
                Ia32Op::Fucomi,
                Mode::Flags,
                &[left, right],
                attr,
            );
            env.dst
                .set_reqs(fucomi, vec![req_vfp(), req_vfp()], vec![req_flags()]);
            return Ok((fucomi, cc));
        }
        let attr = Ia32Attr::with_variant(AttrVariant::X87 { slots: [None; 3] });
        let fucom = self.new_node(
            env,
            block,
            Ia32Op::FucomFnstsw,
            Mode::U16,
            &[left, right],
            attr,
        );
        env.dst.set_reqs(
            fucom,
            vec![req_vfp(), req_vfp()],
            vec![req_gp_fixed(REG_EAX)],
        );
        let sahf = self.new_node(env, block, Ia32Op::Sahf, Mode::Flags, &[fucom], Ia32Attr::new());
        env.dst
            .set_reqs(sahf, vec![req_gp_fixed(REG_EAX)], vec![req_flags()]);
        Ok((sahf, cc))
    }

    fn gen_cond(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<Node> {
        let sel = env.src.in_at(node, 0);
        let block = env.block_of(node);
        let (flags, cc) = self.get_flags_node(env, sel)?;
        let jcc = self.new_node(
            env,
            block,
            Ia32Op::Jcc,
            Mode::T,
            &[flags],
            Ia32Attr::with_variant(AttrVariant::CondCode(cc)),
        );
        env.dst.set_reqs(jcc, vec![req_flags()], vec![]);
        Ok(jcc)
    }

    fn gen_switch(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<Node> {
        let src = env.src;
        let sel = src.in_at(node, 0);
        let default_pn = match src.attr(node) {
            Attr::Switch { default_pn } => *default_pn,
            _ => panic!("switch without default"),
        };
        let block = env.block_of(node);

        // Smallest case value; a nonzero minimum biases the selector.
        let mut switch_min = i64::MAX;
        let mut switch_max = i64::MIN;
        for proj in src.projs(node) {
            let pn = src.attr(proj).proj();
            if pn == default_pn {
                continue;
            }
            switch_min = switch_min.min(pn);
            switch_max = switch_max.max(pn);
        }
        if (switch_max - switch_min) as u64 > 128000 {
            return Err(CodegenError::Unsupported(format!(
                "switch with a case span of {}",
                switch_max - switch_min
            )));
        }

        let mut new_sel = env.transform(self, sel)?;
        if switch_min != 0 {
            let noreg = self.noreg_gp(env);
            let mut attr = Ia32Attr::new();
            attr.am_offs = i32::try_from(-switch_min).map_err(|_| {
                CodegenError::ConstantRange("switch bias exceeds 32 bit".to_string())
            })?;
            let lea = self.new_node(env, block, Ia32Op::Lea, Mode::U32, &[new_sel, noreg], attr);
            env.dst
                .set_reqs(lea, vec![req_gp(), req_gp()], vec![req_gp()]);
            new_sel = lea;
        }

        let jmp = self.new_node(
            env,
            block,
            Ia32Op::SwitchJmp,
            Mode::T,
            &[new_sel],
            Ia32Attr::with_variant(AttrVariant::SwitchJmp { default_pn }),
        );
        env.dst.set_reqs(jmp, vec![req_gp()], vec![]);
        Ok(jmp)
    }

    fn gen_mux(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<Node> {
        let src = env.src;
        let sel = src.in_at(node, 0);
        let val_false = src.in_at(node, 1);
        let val_true = src.in_at(node, 2);
        let mode = src.mode(node);
        let block = env.block_of(node);

        if mode.is_float() && self.features.use_sse2 {
            // Min/max idioms: Mux(a < b, a, b) is min, the mirrored form
            // max.
            if src.op(sel) == Op::Cmp {
                let l = src.in_at(sel, 0);
                let r = src.in_at(sel, 1);
                let relation = match src.attr(sel) {
                    Attr::Cmp { relation } => relation.without_unordered(),
                    _ => Relation::FALSE,
                };
                let min_like = relation == Relation::LT || relation == Relation::LE;
                let max_like = relation == Relation::GT || relation == Relation::GE;
                let op = if min_like && l == val_true && r == val_false {
                    Some(Ia32Op::XMin)
                } else if min_like && l == val_false && r == val_true {
                    Some(Ia32Op::XMax)
                } else if max_like && l == val_true && r == val_false {
                    Some(Ia32Op::XMax)
                } else if max_like && l == val_false && r == val_true {
                    Some(Ia32Op::XMin)
                } else {
                    None
                };
                if let Some(op) = op {
                    let new_l = env.transform(self, l)?;
                    let new_r = env.transform(self, r)?;
                    let noreg = self.noreg_gp(env);
                    let mut attr = Ia32Attr::new();
                    attr.ls_mode = Some(mode);
                    attr.commutative = true;
                    let no_mem = env.dst.no_mem;
                    let minmax = self.new_node(
                        env,
                        block,
                        op,
                        Mode::F64,
                        &[noreg, noreg, no_mem, new_l, new_r],
                        attr,
                    );
                    env.dst.set_reqs(
                        minmax,
                        vec![req_gp(), req_gp(), req_none(), req_xmm(), req_xmm()],
                        vec![RegReq::Same(CLASS_XMM, n::LEFT as u8)],
                    );
                    return Ok(minmax);
                }
            }
            return Err(CodegenError::Unsupported(
                "float select outside the min/max idioms".to_string(),
            ));
        }

        let t_const = const_value(src, val_true);
        let f_const = const_value(src, val_false);
        // Materialising compare results arithmetically is itself gated.
        if let (true, Some(t), Some(f)) = (self.features.optimize_cc, t_const, f_const) {
            // Constant arms: a setcc plus a short arithmetic suffix.
            let plan = setcc::find_const_transform(t, f);
            let (flags, mut cc) = self.get_flags_node(env, sel)?;
            if plan.negate {
                cc = cc.negated();
            }
            let mut value = Node::from_u32(0);
            let mut have = false;
            for step in &plan.steps {
                value = match *step {
                    Step::Set => {
                        let set = self.new_node(
                            env,
                            block,
                            Ia32Op::Setcc,
                            Mode::U8,
                            &[flags],
                            Ia32Attr::with_variant(AttrVariant::CondCode(cc)),
                        );
                        env.dst.set_reqs(set, vec![req_flags()], vec![req_gp_8bit()]);
                        // Zero-extend the byte to the full register.
                        let noreg = self.noreg_gp(env);
                        let mut attr = Ia32Attr::new();
                        attr.ls_mode = Some(Mode::U8);
                        let no_mem = env.dst.no_mem;
                        let conv = self.new_node(
                            env,
                            block,
                            Ia32Op::ConvI2I,
                            Mode::U32,
                            &[noreg, noreg, no_mem, set],
                            attr,
                        );
                        env.dst.set_reqs(
                            conv,
                            vec![req_gp(), req_gp(), req_none(), req_gp_8bit()],
                            vec![req_gp()],
                        );
                        conv
                    }
                    Step::Add(imm) => {
                        let rhs = self.create_immediate(env, None, false, imm);
                        self.alu_step(env, block, Ia32Op::Add, value, Some(rhs))
                    }
                    Step::Lea {
                        base,
                        scale,
                        offset,
                    } => {
                        debug_assert!(have);
                        let noreg = self.noreg_gp(env);
                        let b = if base { value } else { noreg };
                        let mut attr = Ia32Attr::new();
                        attr.am_scale = scale;
                        attr.am_offs = offset;
                        let lea = self.new_node(
                            env,
                            block,
                            Ia32Op::Lea,
                            Mode::U32,
                            &[b, value],
                            attr,
                        );
                        env.dst
                            .set_reqs(lea, vec![req_gp(), req_gp()], vec![req_gp()]);
                        lea
                    }
                    Step::Shl(k) => {
                        let rhs = self.create_immediate(env, None, false, k as i32);
                        let mut attr = Ia32Attr::new();
                        attr.ls_mode = Some(Mode::U32);
                        let shl = self.new_node(
                            env,
                            block,
                            Ia32Op::Shl,
                            Mode::U32,
                            &[value, rhs],
                            attr,
                        );
                        env.dst
                            .set_reqs(shl, vec![req_gp(), req_gp()], vec![same_as(0)]);
                        shl
                    }
                    Step::Neg => self.alu_unary_step(env, block, Ia32Op::Neg, value),
                    Step::Not => self.alu_unary_step(env, block, Ia32Op::Not, value),
                    Step::And(m) => {
                        let rhs = self.create_immediate(env, None, false, m as i32);
                        self.alu_step(env, block, Ia32Op::And, value, Some(rhs))
                    }
                };
                have = true;
            }
            debug_assert!(have);
            return Ok(value);
        }

        if !self.features.use_cmov {
            return Err(CodegenError::Unsupported(
                "select without cmov support must be lowered to control flow".to_string(),
            ));
        }
        let (flags, cc) = self.get_flags_node(env, sel)?;
        let new_false = env.transform(self, val_false)?;
        let new_true = env.transform(self, val_true)?;
        let noreg = self.noreg_gp(env);
        let mut attr = Ia32Attr::with_variant(AttrVariant::CondCode(cc));
        attr.ls_mode = Some(Mode::U32);
        let no_mem = env.dst.no_mem;
        let cmov = self.new_node(
            env,
            block,
            Ia32Op::CMov,
            Mode::U32,
            &[noreg, noreg, no_mem, new_false, new_true, flags],
            attr,
        );
        env.dst.set_reqs(
            cmov,
            vec![
                req_gp(),
                req_gp(),
                req_none(),
                req_gp(),
                req_gp(),
                req_flags(),
            ],
            vec![same_as(n::LEFT)],
        );
        Ok(cmov)
    }

    fn alu_step(
        &mut self,
        env: &mut TransformEnv,
        block: Node,
        op: Ia32Op,
        left: Node,
        right: Option<Node>,
    ) -> Node {
        let noreg = self.noreg_gp(env);
        let right = right.unwrap_or(noreg);
        let mut attr = Ia32Attr::new();
        attr.ls_mode = Some(Mode::U32);
        let no_mem = env.dst.no_mem;
        let node = self.new_node(
            env,
            block,
            op,
            Mode::U32,
            &[noreg, noreg, no_mem, left, right],
            attr,
        );
        env.dst.set_reqs(
            node,
            vec![req_gp(), req_gp(), req_none(), req_gp(), req_gp()],
            vec![same_as(n::LEFT)],
        );
        node
    }

    fn alu_unary_step(
        &mut self,
        env: &mut TransformEnv,
        block: Node,
        op: Ia32Op,
        value: Node,
    ) -> Node {
        let noreg = self.noreg_gp(env);
        let mut attr = Ia32Attr::new();
        attr.ls_mode = Some(Mode::U32);
        let no_mem = env.dst.no_mem;
        let node = self.new_node(
            env,
            block,
            op,
            Mode::U32,
            &[noreg, noreg, no_mem, value],
            attr,
        );
        env.dst.set_reqs(
            node,
            vec![req_gp(), req_gp(), req_none(), req_gp()],
            vec![same_as(n::UNARY)],
        );
        node
    }

    /// A shift by a constant count.
    fn shift_step(
        &mut self,
        env: &mut TransformEnv,
        block: Node,
        op: Ia32Op,
        value: Node,
        count: i32,
    ) -> Node {
        let imm = self.create_immediate(env, None, false, count);
        let mut attr = Ia32Attr::new();
        attr.ls_mode = Some(Mode::U32);
        let node = self.new_node(env, block, op, Mode::U32, &[value, imm], attr);
        env.dst
            .set_reqs(node, vec![req_gp(), req_gp()], vec![same_as(0)]);
        node
    }

    /// Integer division: the dividend is widened into edx:eax, one idiv or
    /// div computes quotient and remainder.
    fn gen_div(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<Node> {
        let src = env.src;
        let mem = src.in_at(node, 0);
        let left = src.in_at(node, 1);
        let right = src.in_at(node, 2);
        let mode = src.mode(left);
        let block = env.block_of(node);
        if mode.bits() > 32 {
            return Err(CodegenError::Unsupported(
                "64-bit division must be lowered to a runtime call first".to_string(),
            ));
        }

        let new_left = env.transform(self, left)?;
        let new_right = env.transform(self, right)?;
        let new_mem = env.transform(self, mem)?;
        let noreg = self.noreg_gp(env);

        let (op, high) = if mode.is_signed() {
            let high = if self.features.use_short_sex_eax {
                // Sign-extend eax into edx.
                let cltd = self.new_node(
                    env,
                    block,
                    Ia32Op::Cltd,
                    Mode::U32,
                    &[new_left],
                    Ia32Attr::new(),
                );
                env.dst
                    .set_reqs(cltd, vec![req_gp_fixed(REG_EAX)], vec![req_gp_fixed(REG_EDX)]);
                cltd
            } else {
                // The shifted equivalent: copy the dividend and smear its
                // sign bit across the copy.
                let copy = env.dst.add_node(block, Op::Copy, Mode::U32, &[new_left]);
                env.dst.set_reqs(copy, vec![req_gp()], vec![req_gp()]);
                let count = self.create_immediate(env, None, false, 31);
                let mut sattr = Ia32Attr::new();
                sattr.ls_mode = Some(Mode::U32);
                let sar =
                    self.new_node(env, block, Ia32Op::Sar, Mode::U32, &[copy, count], sattr);
                env.dst
                    .set_reqs(sar, vec![req_gp(), req_gp()], vec![same_as(0)]);
                sar
            };
            (Ia32Op::IDiv, high)
        } else {
            let zero = self.new_node(
                env,
                block,
                Ia32Op::Const,
                Mode::U32,
                &[],
                Ia32Attr::with_variant(AttrVariant::Immediate {
                    ent: None,
                    sign: false,
                    offset: 0,
                }),
            );
            env.dst.set_reqs(zero, vec![], vec![req_gp()]);
            (Ia32Op::Div, zero)
        };

        let mut attr = Ia32Attr::new();
        attr.ls_mode = Some(Mode::U32);
        let div = self.new_node(
            env,
            block,
            op,
            Mode::T,
            &[noreg, noreg, new_mem, new_right, new_left, high],
            attr,
        );
        env.dst.set_reqs(
            div,
            vec![
                req_gp(),
                req_gp(),
                req_none(),
                req_gp(),
                req_gp_fixed(REG_EAX),
                req_gp_fixed(REG_EDX),
            ],
            vec![req_gp_fixed(REG_EAX), req_gp_fixed(REG_EDX)],
        );
        Ok(div)
    }

    /// The high half of a widening multiplication.
    fn gen_mulh(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<Node> {
        let src = env.src;
        let left = src.in_at(node, 0);
        let right = src.in_at(node, 1);
        let mode = src.mode(node);
        let block = env.block_of(node);
        let op = if mode.is_signed() {
            Ia32Op::IMul1Op
        } else {
            Ia32Op::Mul
        };
        let new_left = env.transform(self, left)?;
        let new_right = env.transform(self, right)?;
        let noreg = self.noreg_gp(env);
        let mut attr = Ia32Attr::new();
        attr.ls_mode = Some(Mode::U32);
        let no_mem = env.dst.no_mem;
        let mul = self.new_node(
            env,
            block,
            op,
            Mode::T,
            &[noreg, noreg, no_mem, new_left, new_right],
            attr,
        );
        env.dst.set_reqs(
            mul,
            vec![
                req_gp(),
                req_gp(),
                req_none(),
                req_gp_fixed(REG_EAX),
                req_gp(),
            ],
            vec![req_gp_fixed(REG_EAX), req_gp_fixed(REG_EDX)],
        );
        Ok(env.dst.proj(mul, Mode::U32, out::DIV_MOD))
    }

    /// Additions fold into lea when the address tree has anything beyond
    /// two registers.
    fn gen_add(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<Node> {
        let src = env.src;
        let mode = src.mode(node);
        if mode.is_float() {
            return self.gen_binop_float(env, node, Ia32Op::XAdd, Ia32Op::Fadd, true);
        }
        let op1 = src.in_at(node, 0);
        let op2 = src.in_at(node, 1);

        let am = create_address_mode(src, node, true);
        // A pure constant tree collapses into one immediate.
        if am.base.is_none() && am.index.is_none() && !am.use_frame {
            let block = env.block_of(node);
            let c = self.new_node(
                env,
                block,
                Ia32Op::Const,
                Mode::U32,
                &[],
                Ia32Attr::with_variant(AttrVariant::Immediate {
                    ent: am.symbol,
                    sign: am.symbol_sign,
                    offset: am.offset,
                }),
            );
            env.dst.set_reqs(c, vec![], vec![req_gp()]);
            return Ok(c);
        }
        if am.index.is_some() || am.symbol.is_some() || am.use_frame || am.offset != 0 {
            // Not just base+base: a lea computes the whole tree.
            if am.base.is_some() || am.index.is_some() {
                let block = env.block_of(node);
                let mut attr = Ia32Attr::new();
                let base = match am.base {
                    Some(b) => env.transform(self, b)?,
                    None if am.use_frame => self.sp(env),
                    None => self.noreg_gp(env),
                };
                let index = match am.index {
                    Some(i) => env.transform(self, i)?,
                    None => self.noreg_gp(env),
                };
                attr.am_scale = am.scale;
                attr.am_offs = am.offset;
                attr.am_sym = am.symbol;
                attr.am_sym_sign = am.symbol_sign;
                attr.use_frame = am.use_frame;
                attr.frame_ent = am.frame_entity;
                let lea = self.new_node(env, block, Ia32Op::Lea, Mode::U32, &[base, index], attr);
                env.dst
                    .set_reqs(lea, vec![req_gp(), req_gp()], vec![req_gp()]);
                return Ok(lea);
            }
        }
        self.gen_binop(
            env,
            node,
            Ia32Op::Add,
            op1,
            op2,
            MatchFlags {
                commutative: true,
                am: true,
                immediate: true,
                mode_neutral: true,
                ..Default::default()
            },
        )
    }

    fn gen_conv(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<Node> {
        let src = env.src;
        let op = src.in_at(node, 0);
        let src_mode = src.mode(op);
        let tgt_mode = src.mode(node);
        let block = env.block_of(node);

        if src_mode == tgt_mode {
            return env.transform(self, op);
        }

        match (src_mode.is_float(), tgt_mode.is_float()) {
            (false, false) => {
                // int -> int
                if tgt_mode.bits() <= src_mode.bits() {
                    // Narrowing is free: the consumers decide how many bits
                    // they look at.
                    return env.transform(self, op);
                }
                let new_op = env.transform(self, op)?;
                if upper_bits_clean(&env.dst, new_op, src_mode) {
                    return Ok(new_op);
                }
                let noreg = self.noreg_gp(env);
                let mut attr = Ia32Attr::new();
                attr.ls_mode = Some(src_mode);
                let no_mem = env.dst.no_mem;
                let conv = self.new_node(
                    env,
                    block,
                    Ia32Op::ConvI2I,
                    Mode::U32,
                    &[noreg, noreg, no_mem, new_op],
                    attr,
                );
                let in_req = if src_mode.bits() == 8 {
                    req_gp_8bit()
                } else {
                    req_gp()
                };
                env.dst.set_reqs(
                    conv,
                    vec![req_gp(), req_gp(), req_none(), in_req],
                    vec![req_gp()],
                );
                Ok(conv)
            }
            (true, false) => {
                // float -> int
                if self.features.use_sse2 {
                    let new_op = env.transform(self, op)?;
                    let noreg = self.noreg_gp(env);
                    let cvt_op = if src_mode == Mode::F32 {
                        Ia32Op::CvtSs2Si
                    } else {
                        Ia32Op::CvtSd2Si
                    };
                    let mut attr = Ia32Attr::new();
                    attr.ls_mode = Some(src_mode);
                    let no_mem = env.dst.no_mem;
                    let cvt = self.new_node(
                        env,
                        block,
                        cvt_op,
                        Mode::U32,
                        &[noreg, noreg, no_mem, new_op],
                        attr,
                    );
                    env.dst.set_reqs(
                        cvt,
                        vec![req_gp(), req_gp(), req_none(), req_xmm()],
                        vec![req_gp()],
                    );
                    Ok(cvt)
                } else {
                    // x87: store to the spill slot, load the integer back.
                    let slot = self.symbols.frame_slot("fp_conv", 8);
                    let new_op = env.transform(self, op)?;
                    let sp = self.sp(env);
                    let noreg = self.noreg_gp(env);
                    let mut st_attr = Ia32Attr::new();
                    st_attr.use_frame = true;
                    st_attr.frame_ent = Some(slot);
                    st_attr.ls_mode = Some(Mode::I32);
                    let no_mem = env.dst.no_mem;
                    // fisttp (SSE3) truncates without touching the control
                    // word.
                    let st_op = if self.features.use_fisttp {
                        Ia32Op::Fisttp
                    } else {
                        Ia32Op::Fist
                    };
                    let fist = self.new_node(
                        env,
                        block,
                        st_op,
                        Mode::M,
                        &[sp, noreg, no_mem, new_op],
                        st_attr,
                    );
                    env.dst.set_reqs(
                        fist,
                        vec![req_gp(), req_gp(), req_none(), req_vfp()],
                        vec![req_none()],
                    );
                    let mut ld_attr = Ia32Attr::new();
                    ld_attr.use_frame = true;
                    ld_attr.frame_ent = Some(slot);
                    ld_attr.ls_mode = Some(Mode::U32);
                    let load = self.new_node(
                        env,
                        block,
                        Ia32Op::Load,
                        Mode::T,
                        &[sp, noreg, fist],
                        ld_attr,
                    );
                    env.dst.set_reqs(
                        load,
                        vec![req_gp(), req_gp(), req_none()],
                        vec![req_gp(), req_none()],
                    );
                    Ok(env.dst.proj(load, Mode::U32, out::LOAD_RES))
                }
            }
            (false, true) => {
                // int -> float
                if self.features.use_sse2 {
                    let new_op = env.transform(self, op)?;
                    let noreg = self.noreg_gp(env);
                    let cvt_op = if tgt_mode == Mode::F32 {
                        Ia32Op::CvtSi2Ss
                    } else {
                        Ia32Op::CvtSi2Sd
                    };
                    let mut attr = Ia32Attr::new();
                    attr.ls_mode = Some(tgt_mode);
                    let no_mem = env.dst.no_mem;
                    let cvt = self.new_node(
                        env,
                        block,
                        cvt_op,
                        Mode::F64,
                        &[noreg, noreg, no_mem, new_op],
                        attr,
                    );
                    env.dst.set_reqs(
                        cvt,
                        vec![req_gp(), req_gp(), req_none(), req_gp()],
                        vec![req_xmm()],
                    );
                    Ok(cvt)
                } else {
                    let slot = self.symbols.frame_slot("fp_conv", 8);
                    let new_op = env.transform(self, op)?;
                    let sp = self.sp(env);
                    let noreg = self.noreg_gp(env);
                    let mut st_attr = Ia32Attr::new();
                    st_attr.use_frame = true;
                    st_attr.frame_ent = Some(slot);
                    st_attr.ls_mode = Some(Mode::U32);
                    let no_mem = env.dst.no_mem;
                    let store = self.new_node(
                        env,
                        block,
                        Ia32Op::Store,
                        Mode::M,
                        &[sp, noreg, no_mem, new_op],
                        st_attr,
                    );
                    env.dst.set_reqs(
                        store,
                        vec![req_gp(), req_gp(), req_none(), req_gp()],
                        vec![req_none()],
                    );
                    let mut ld_attr = Ia32Attr::new();
                    ld_attr.use_frame = true;
                    ld_attr.frame_ent = Some(slot);
                    ld_attr.ls_mode = Some(Mode::I32);
                    let fild = self.new_node(
                        env,
                        block,
                        Ia32Op::Fild,
                        Mode::T,
                        &[sp, noreg, store],
                        ld_attr,
                    );
                    env.dst.set_reqs(
                        fild,
                        vec![req_gp(), req_gp(), req_none()],
                        vec![req_vfp(), req_none()],
                    );
                    Ok(env.dst.proj(fild, Mode::X80, out::LOAD_RES))
                }
            }
            (true, true) => {
                // float -> float
                if self.features.use_sse2 {
                    let new_op = env.transform(self, op)?;
                    let noreg = self.noreg_gp(env);
                    let cvt_op = if tgt_mode == Mode::F64 {
                        Ia32Op::CvtSs2Sd
                    } else {
                        Ia32Op::CvtSd2Ss
                    };
                    let mut attr = Ia32Attr::new();
                    attr.ls_mode = Some(tgt_mode);
                    let no_mem = env.dst.no_mem;
                    let cvt = self.new_node(
                        env,
                        block,
                        cvt_op,
                        Mode::F64,
                        &[noreg, noreg, no_mem, new_op],
                        attr,
                    );
                    env.dst.set_reqs(
                        cvt,
                        vec![req_gp(), req_gp(), req_none(), req_xmm()],
                        vec![req_xmm()],
                    );
                    Ok(cvt)
                } else {
                    // The x87 computes in full precision anyway; narrowing
                    // forces a store/load pair through the spill slot.
                    if tgt_mode.bits() < src_mode.bits() {
                        let slot = self.symbols.frame_slot("fp_conv", 8);
                        let new_op = env.transform(self, op)?;
                        let sp = self.sp(env);
                        let noreg = self.noreg_gp(env);
                        let mut st_attr = Ia32Attr::new();
                        st_attr.use_frame = true;
                        st_attr.frame_ent = Some(slot);
                        st_attr.ls_mode = Some(tgt_mode);
                        let no_mem = env.dst.no_mem;
                        let store = self.new_node(
                            env,
                            block,
                            Ia32Op::Fst,
                            Mode::M,
                            &[sp, noreg, no_mem, new_op],
                            st_attr,
                        );
                        env.dst.set_reqs(
                            store,
                            vec![req_gp(), req_gp(), req_none(), req_vfp()],
                            vec![req_none()],
                        );
                        let mut ld_attr = Ia32Attr::new();
                        ld_attr.use_frame = true;
                        ld_attr.frame_ent = Some(slot);
                        ld_attr.ls_mode = Some(tgt_mode);
                        let load = self.new_node(
                            env,
                            block,
                            Ia32Op::Fld,
                            Mode::T,
                            &[sp, noreg, store],
                            ld_attr,
                        );
                        env.dst.set_reqs(
                            load,
                            vec![req_gp(), req_gp(), req_none()],
                            vec![req_vfp(), req_none()],
                        );
                        return Ok(env.dst.proj(load, Mode::X80, out::LOAD_RES));
                    }
                    env.transform(self, op)
                }
            }
        }
    }

    fn gen_minus(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<Node> {
        let src = env.src;
        let op = src.in_at(node, 0);
        let mode = src.mode(node);
        let block = env.block_of(node);
        if !mode.is_float() {
            return self.gen_unop(env, node, Ia32Op::Neg, op);
        }
        if self.features.use_sse2 {
            // Flip the sign bit with an xor against a constant mask.
            let mask = if mode == Mode::F32 {
                TarVal::from_bits(Mode::F32, 0x8000_0000)
            } else {
                TarVal::from_bits(Mode::F64, 0x8000_0000_0000_0000)
            };
            let ent = self.symbols.constant(mask);
            let new_op = env.transform(self, op)?;
            let noreg_gp = self.noreg_gp(env);
            let noreg_x = self.noreg_xmm(env);
            let mut attr = Ia32Attr::new();
            attr.op_type = OpType::AddrModeS;
            attr.am_sym = Some(ent);
            attr.ls_mode = Some(mode);
            let no_mem = env.dst.no_mem;
            let xor = self.new_node(
                env,
                block,
                Ia32Op::XXor,
                Mode::F64,
                &[noreg_gp, noreg_gp, no_mem, new_op, noreg_x],
                attr,
            );
            env.dst.set_reqs(
                xor,
                vec![req_gp(), req_gp(), req_none(), req_xmm(), req_xmm()],
                vec![RegReq::Same(CLASS_XMM, n::LEFT as u8)],
            );
            return Ok(xor);
        }
        let new_op = env.transform(self, op)?;
        let chs = self.new_node(
            env,
            block,
            Ia32Op::Fchs,
            Mode::X80,
            &[new_op],
            Ia32Attr::with_variant(AttrVariant::X87 { slots: [None; 3] }),
        );
        env.dst.set_reqs(chs, vec![req_vfp()], vec![req_vfp()]);
        Ok(chs)
    }

    fn gen_and(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<Node> {
        let src = env.src;
        let op1 = src.in_at(node, 0);
        let op2 = src.in_at(node, 1);
        // And with 0xff/0xffff is a zero extension and has the shorter
        // movzx form.
        if let Some(v) = const_value(src, op2) {
            if v == 0xff || v == 0xffff {
                let block = env.block_of(node);
                let new_op = env.transform(self, op1)?;
                let noreg = self.noreg_gp(env);
                let mut attr = Ia32Attr::new();
                attr.ls_mode = Some(if v == 0xff { Mode::U8 } else { Mode::U16 });
                let no_mem = env.dst.no_mem;
                let conv = self.new_node(
                    env,
                    block,
                    Ia32Op::ConvI2I,
                    Mode::U32,
                    &[noreg, noreg, no_mem, new_op],
                    attr,
                );
                let in_req = if v == 0xff { req_gp_8bit() } else { req_gp() };
                env.dst.set_reqs(
                    conv,
                    vec![req_gp(), req_gp(), req_none(), in_req],
                    vec![req_gp()],
                );
                return Ok(conv);
            }
        }
        self.gen_binop(
            env,
            node,
            Ia32Op::And,
            op1,
            op2,
            MatchFlags {
                commutative: true,
                am: true,
                immediate: true,
                mode_neutral: true,
                ..Default::default()
            },
        )
    }

    fn gen_call(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<Node> {
        let src = env.src;
        let callee = match src.attr(node) {
            Attr::Call { callee } => *callee,
            _ => panic!("call without call attribute"),
        };
        let mem = src.in_at(node, 0);
        let first_arg = if callee.is_some() { 1 } else { 2 };
        let args: Vec<Node> = (first_arg..src.n_ins(node))
            .map(|i| src.in_at(node, i))
            .collect();
        let block = env.block_of(node);

        let mut new_mem = env.transform(self, mem)?;
        let mut sp = self.sp(env);
        let noreg = self.noreg_gp(env);

        // cdecl pushes right to left.
        let mut stack_bytes = 0u32;
        for &arg in args.iter().rev() {
            let new_arg = match self.try_create_immediate(env, arg) {
                Some(imm) => imm,
                None => env.transform(self, arg)?,
            };
            let mut attr = Ia32Attr::new();
            attr.ls_mode = Some(Mode::U32);
            let push = self.new_node(
                env,
                block,
                Ia32Op::Push,
                Mode::T,
                &[noreg, noreg, new_mem, new_arg, sp],
                attr,
            );
            env.dst.set_reqs(
                push,
                vec![
                    req_gp(),
                    req_gp(),
                    req_none(),
                    req_gp(),
                    req_gp_fixed(REG_ESP),
                ],
                vec![req_gp_fixed(REG_ESP), req_none()],
            );
            let new_sp = env.dst.proj(push, Mode::U32, out::PUSH_STACK);
            env.dst.set_reg(new_sp, regs::esp_reg());
            new_mem = env.dst.proj(push, Mode::M, out::PUSH_MEM);
            sp = new_sp;
            stack_bytes += 4;
        }

        let mut ins = vec![noreg, noreg, new_mem, sp];
        if callee.is_none() {
            let target = env.transform(self, src.in_at(node, 1))?;
            ins.push(target);
        }
        let attr = Ia32Attr::with_variant(AttrVariant::Call { callee, pop: 0 });
        let call = self.new_node(env, block, Ia32Op::Call, Mode::T, &ins, attr);
        let mut in_reqs = vec![req_gp(), req_gp(), req_none(), req_gp_fixed(REG_ESP)];
        if callee.is_none() {
            in_reqs.push(req_gp());
        }
        // The return value convention: eax, or st0 for floats.
        let res_req = if self.sig_result_is_float(src, node) {
            req_vfp_fixed(0)
        } else {
            req_gp_fixed(REG_EAX)
        };
        env.dst.set_reqs(
            call,
            in_reqs,
            vec![res_req, req_none(), req_gp_fixed(REG_ESP)],
        );

        // The caller cleans the stack.
        if stack_bytes > 0 {
            let call_sp = env.dst.proj(call, Mode::U32, 2);
            env.dst.set_reg(call_sp, regs::esp_reg());
            let incsp = env.dst.add_node_attr(
                block,
                Op::IncSp,
                Mode::U32,
                &[call_sp],
                Attr::IncSp {
                    offset: -(stack_bytes as i32),
                },
            );
            env.dst
                .set_reqs(incsp, vec![req_gp_fixed(REG_ESP)], vec![req_gp_fixed(REG_ESP)]);
            env.dst.set_reg(incsp, regs::esp_reg());
            env.dst.keep_alive(incsp);
        }
        Ok(call)
    }

    fn sig_result_is_float(&self, src: &Graph, call: Node) -> bool {
        src.projs(call).iter().any(|&p| {
            src.attr(p).proj() >= pn::CALL_RES && src.mode(p).is_float()
        })
    }

    fn gen_return(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<Node> {
        let src = env.src;
        let block = env.block_of(node);
        let mem = env.transform(self, src.in_at(node, 0))?;
        let mut ins = vec![mem];
        let mut reqs = vec![req_none()];
        for i in 1..src.n_ins(node) {
            let val = src.in_at(node, i);
            let new_val = env.transform(self, val)?;
            ins.push(new_val);
            if src.mode(val).is_float() {
                reqs.push(req_vfp_fixed(0));
            } else {
                reqs.push(req_gp_fixed(REG_EAX));
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

    fn gen_copyb(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<Node> {
        let src = env.src;
        let mem = src.in_at(node, 0);
        let dst_ptr = src.in_at(node, 1);
        let src_ptr = src.in_at(node, 2);
        let size = match src.attr(node) {
            Attr::CopyB { size } => *size,
            _ => panic!("copyb without size"),
        };
        let block = env.block_of(node);
        let new_mem = env.transform(self, mem)?;
        let new_dst = env.transform(self, dst_ptr)?;
        let new_src = env.transform(self, src_ptr)?;
        let count = self.new_node(
            env,
            block,
            Ia32Op::Const,
            Mode::U32,
            &[],
            Ia32Attr::with_variant(AttrVariant::Immediate {
                ent: None,
                sign: false,
                offset: (size / 4) as i32,
            }),
        );
        env.dst.set_reqs(count, vec![], vec![req_gp_fixed(REG_ECX)]);
        let copyb = self.new_node(
            env,
            block,
            Ia32Op::CopyB,
            Mode::M,
            &[new_dst, new_src, count, new_mem],
            Ia32Attr::with_variant(AttrVariant::CopyB { size }),
        );
        env.dst.set_reqs(
            copyb,
            vec![
                req_gp_fixed(regs::REG_EDI),
                req_gp_fixed(regs::REG_ESI),
                req_gp_fixed(REG_ECX),
                req_none(),
            ],
            vec![req_none()],
        );
        Ok(copyb)
    }

    fn gen_builtin(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<Node> {
        let src = env.src;
        let kind = match src.attr(node) {
            Attr::Builtin(kind) => *kind,
            _ => panic!("builtin without kind"),
        };
        let block = env.block_of(node);
        let arg = |i: usize| src.in_at(node, 1 + i);

        match kind {
            BuiltinKind::Ffs => {
                // bsf, then patch the zero case: or the (negated) zero flag
                // mask over the result and add one.
                let x = env.transform(self, arg(0))?;
                let bsf = self.flag_unop(env, block, Ia32Op::Bsf, x);
                let res = env.dst.proj(bsf, Mode::U32, out::RES);
                let flags = env.dst.proj(bsf, Mode::Flags, out::FLAGS);
                let set = self.new_node(
                    env,
                    block,
                    Ia32Op::Setcc,
                    Mode::U8,
                    &[flags],
                    Ia32Attr::with_variant(AttrVariant::CondCode(CondCode::int(
                        Relation::EQ,
                        false,
                    ))),
                );
                env.dst.set_reqs(set, vec![req_flags()], vec![req_gp_8bit()]);
                let noreg = self.noreg_gp(env);
                let mut cattr = Ia32Attr::new();
                cattr.ls_mode = Some(Mode::U8);
                let no_mem = env.dst.no_mem;
                let zext = self.new_node(
                    env,
                    block,
                    Ia32Op::ConvI2I,
                    Mode::U32,
                    &[noreg, noreg, no_mem, set],
                    cattr,
                );
                env.dst.set_reqs(
                    zext,
                    vec![req_gp(), req_gp(), req_none(), req_gp_8bit()],
                    vec![req_gp()],
                );
                let neg = self.alu_unary_step(env, block, Ia32Op::Neg, zext);
                let or = self.alu_step(env, block, Ia32Op::Or, res, Some(neg));
                let one = self.create_immediate(env, None, false, 1);
                Ok(self.alu_step(env, block, Ia32Op::Add, or, Some(one)))
            }
            BuiltinKind::Clz => {
                let x = env.transform(self, arg(0))?;
                let bsr = self.flag_unop(env, block, Ia32Op::Bsr, x);
                let res = env.dst.proj(bsr, Mode::U32, out::RES);
                let mask = self.create_immediate(env, None, false, 31);
                Ok(self.alu_step(env, block, Ia32Op::Xor, res, Some(mask)))
            }
            BuiltinKind::Ctz => {
                let x = env.transform(self, arg(0))?;
                let bsf = self.flag_unop(env, block, Ia32Op::Bsf, x);
                Ok(env.dst.proj(bsf, Mode::U32, out::RES))
            }
            BuiltinKind::Parity => {
                let x = env.transform(self, arg(0))?;
                let zero = self.create_immediate(env, None, false, 0);
                let noreg = self.noreg_gp(env);
                let mut attr = Ia32Attr::new();
                attr.ls_mode = Some(Mode::U32);
                let no_mem = env.dst.no_mem;
                let cmp = self.new_node(
                    env,
                    block,
                    Ia32Op::Cmp,
                    Mode::Flags,
                    &[noreg, noreg, no_mem, x, zero],
                    attr,
                );
                env.dst.set_reqs(
                    cmp,
                    vec![req_gp(), req_gp(), req_none(), req_gp(), req_gp()],
                    vec![req_flags()],
                );
                let set = self.new_node(
                    env,
                    block,
                    Ia32Op::Setcc,
                    Mode::U8,
                    &[cmp],
                    Ia32Attr::with_variant(AttrVariant::CondCode(CondCode {
                        relation: Relation::UNORDERED,
                        unsigned: false,
                        float: true,
                    })),
                );
                env.dst.set_reqs(set, vec![req_flags()], vec![req_gp_8bit()]);
                let noreg = self.noreg_gp(env);
                let mut cattr = Ia32Attr::new();
                cattr.ls_mode = Some(Mode::U8);
                let no_mem = env.dst.no_mem;
                let zext = self.new_node(
                    env,
                    block,
                    Ia32Op::ConvI2I,
                    Mode::U32,
                    &[noreg, noreg, no_mem, set],
                    cattr,
                );
                env.dst.set_reqs(
                    zext,
                    vec![req_gp(), req_gp(), req_none(), req_gp_8bit()],
                    vec![req_gp()],
                );
                Ok(zext)
            }
            BuiltinKind::Popcount => {
                let x = env.transform(self, arg(0))?;
                if self.features.use_popcnt {
                    let noreg = self.noreg_gp(env);
                    let mut attr = Ia32Attr::new();
                    attr.ls_mode = Some(Mode::U32);
                    let no_mem = env.dst.no_mem;
                    let pop = self.new_node(
                        env,
                        block,
                        Ia32Op::Popcnt,
                        Mode::U32,
                        &[noreg, noreg, no_mem, x],
                        attr,
                    );
                    env.dst.set_reqs(
                        pop,
                        vec![req_gp(), req_gp(), req_none(), req_gp()],
                        vec![req_gp()],
                    );
                    return Ok(pop);
                }
                // The bit-parallel reduction over halving masks.
                let mut value = x;
                for (shift, mask) in [
                    (1, 0x5555_5555u32),
                    (2, 0x3333_3333),
                    (4, 0x0f0f_0f0f),
                    (8, 0x00ff_00ff),
                    (16, 0x0000_ffff),
                ] {
                    let count = self.create_immediate(env, None, false, shift);
                    let mut sattr = Ia32Attr::new();
                    sattr.ls_mode = Some(Mode::U32);
                    let shifted = self.new_node(
                        env,
                        block,
                        Ia32Op::Shr,
                        Mode::U32,
                        &[value, count],
                        sattr,
                    );
                    env.dst
                        .set_reqs(shifted, vec![req_gp(), req_gp()], vec![same_as(0)]);
                    let m1 = self.create_immediate(env, None, false, mask as i32);
                    let masked_hi = self.alu_step(env, block, Ia32Op::And, shifted, Some(m1));
                    let m2 = self.create_immediate(env, None, false, mask as i32);
                    let masked_lo = self.alu_step(env, block, Ia32Op::And, value, Some(m2));
                    value = self.alu_step(env, block, Ia32Op::Add, masked_lo, Some(masked_hi));
                }
                Ok(value)
            }
            BuiltinKind::Bswap => {
                let x = env.transform(self, arg(0))?;
                let mode = src.mode(arg(0));
                if mode.bits() == 16 {
                    let node =
                        self.new_node(env, block, Ia32Op::Bswap16, Mode::U32, &[x], Ia32Attr::new());
                    env.dst.set_reqs(node, vec![req_gp_8bit()], vec![same_as(0)]);
                    return Ok(node);
                }
                if !self.features.use_i486 {
                    // No bswap before the i486: assemble the reversal from
                    // shifts and masks.
                    // (x << 24) | ((x & 0xff00) << 8) | ((x >> 8) & 0xff00) | (x >> 24)
                    let b0 = self.shift_step(env, block, Ia32Op::Shl, x, 24);
                    let m1 = self.create_immediate(env, None, false, 0xff00);
                    let b1 = self.alu_step(env, block, Ia32Op::And, x, Some(m1));
                    let b1 = self.shift_step(env, block, Ia32Op::Shl, b1, 8);
                    let b2 = self.shift_step(env, block, Ia32Op::Shr, x, 8);
                    let m2 = self.create_immediate(env, None, false, 0xff00);
                    let b2 = self.alu_step(env, block, Ia32Op::And, b2, Some(m2));
                    let b3 = self.shift_step(env, block, Ia32Op::Shr, x, 24);
                    let hi = self.alu_step(env, block, Ia32Op::Or, b0, Some(b1));
                    let lo = self.alu_step(env, block, Ia32Op::Or, b2, Some(b3));
                    return Ok(self.alu_step(env, block, Ia32Op::Or, hi, Some(lo)));
                }
                let node =
                    self.new_node(env, block, Ia32Op::Bswap, Mode::U32, &[x], Ia32Attr::new());
                env.dst.set_reqs(node, vec![req_gp()], vec![same_as(0)]);
                Ok(node)
            }
            BuiltinKind::Prefetch => {
                let mem = env.transform(self, src.in_at(node, 0))?;
                let p = arg(0);
                let rw = const_value(src, arg(1)).unwrap_or(0);
                let locality = const_value(src, arg(2)).unwrap_or(0);
                let op = if self.features.use_sse2 {
                    match locality {
                        0 => Ia32Op::PrefetchNta,
                        1 => Ia32Op::Prefetch2,
                        2 => Ia32Op::Prefetch1,
                        _ => Ia32Op::Prefetch0,
                    }
                } else if rw != 0 {
                    Ia32Op::PrefetchW
                } else {
                    Ia32Op::Prefetch3dNow
                };
                let am = create_address_mode(src, p, false);
                let mut attr = Ia32Attr::new();
                let (base, index, _) = self.build_address(env, &am, None, &mut attr)?;
                let pf = self.new_node(env, block, op, Mode::M, &[base, index, mem], attr);
                env.dst.set_reqs(
                    pf,
                    vec![req_gp(), req_gp(), req_none()],
                    vec![req_none()],
                );
                Ok(pf)
            }
            BuiltinKind::ReturnAddress | BuiltinKind::FrameAddress => {
                let depth = const_value(src, arg(0)).unwrap_or(0);
                let climb = self.new_node(
                    env,
                    block,
                    Ia32Op::ClimbFrame,
                    Mode::U32,
                    &[],
                    Ia32Attr::with_variant(AttrVariant::Immediate {
                        ent: None,
                        sign: false,
                        offset: depth as i32,
                    }),
                );
                env.dst.set_reqs(climb, vec![], vec![req_gp()]);
                let noreg = self.noreg_gp(env);
                let mem = env.transform(self, src.in_at(node, 0))?;
                let mut attr = Ia32Attr::new();
                attr.ls_mode = Some(Mode::U32);
                // The return address sits one word above the saved frame
                // pointer.
                attr.am_offs = if kind == BuiltinKind::ReturnAddress { 4 } else { 0 };
                let load = self.new_node(
                    env,
                    block,
                    Ia32Op::Load,
                    Mode::T,
                    &[climb, noreg, mem],
                    attr,
                );
                env.dst.set_reqs(
                    load,
                    vec![req_gp(), req_gp(), req_none()],
                    vec![req_gp(), req_none()],
                );
                Ok(env.dst.proj(load, Mode::U32, out::LOAD_RES))
            }
            BuiltinKind::Trampoline => {
                // The buffer receives `movl $env, %ecx; jmp fn` as data.
                let mem = src.in_at(node, 0);
                let buf = arg(0);
                let func = arg(1);
                let envp = arg(2);
                let mut current = env.transform(self, mem)?;
                let new_buf = env.transform(self, buf)?;
                let new_env = env.transform(self, envp)?;
                let new_fn = env.transform(self, func)?;

                // movl imm32, %ecx opcode byte.
                current = self.byte_store(env, block, new_buf, 0, 0xb9, current);
                current = self.word_store(env, block, new_buf, 1, new_env, current);
                // jmp rel32 opcode byte.
                current = self.byte_store(env, block, new_buf, 5, 0xe9, current);
                // Relative displacement: fn - (buf + 10).
                let ten = self.create_immediate(env, None, false, 10);
                let base10 = self.alu_step(env, block, Ia32Op::Add, new_buf, Some(ten));
                let rel = self.alu_step(env, block, Ia32Op::Sub, new_fn, Some(base10));
                current = self.word_store(env, block, new_buf, 6, rel, current);
                Ok(current)
            }
            BuiltinKind::Trap => {
                let ud2 = self.new_node(env, block, Ia32Op::Ud2, Mode::X, &[], Ia32Attr::new());
                env.dst.set_reqs(ud2, vec![], vec![]);
                Ok(ud2)
            }
        }
    }

    fn byte_store(
        &mut self,
        env: &mut TransformEnv,
        block: Node,
        base: Node,
        offset: i32,
        value: u8,
        mem: Node,
    ) -> Node {
        let imm = self.create_immediate(env, None, false, value as i32);
        let noreg = self.noreg_gp(env);
        let mut attr = Ia32Attr::new();
        attr.am_offs = offset;
        attr.ls_mode = Some(Mode::U8);
        let store = self.new_node(
            env,
            block,
            Ia32Op::Store,
            Mode::M,
            &[base, noreg, mem, imm],
            attr,
        );
        env.dst.set_reqs(
            store,
            vec![req_gp(), req_gp(), req_none(), req_gp_8bit()],
            vec![req_none()],
        );
        store
    }

    fn word_store(
        &mut self,
        env: &mut TransformEnv,
        block: Node,
        base: Node,
        offset: i32,
        value: Node,
        mem: Node,
    ) -> Node {
        let noreg = self.noreg_gp(env);
        let mut attr = Ia32Attr::new();
        attr.am_offs = offset;
        attr.ls_mode = Some(Mode::U32);
        let store = self.new_node(
            env,
            block,
            Ia32Op::Store,
            Mode::M,
            &[base, noreg, mem, value],
            attr,
        );
        env.dst.set_reqs(
            store,
            vec![req_gp(), req_gp(), req_none(), req_gp()],
            vec![req_none()],
        );
        store
    }

    /// A unary operation that also produces flags (bsf/bsr).
    fn flag_unop(&mut self, env: &mut TransformEnv, block: Node, op: Ia32Op, x: Node) -> Node {
        let noreg = self.noreg_gp(env);
        let mut attr = Ia32Attr::new();
        attr.ls_mode = Some(Mode::U32);
        let no_mem = env.dst.no_mem;
        let node = self.new_node(
            env,
            block,
            op,
            Mode::T,
            &[noreg, noreg, no_mem, x],
            attr,
        );
        env.dst.set_reqs(
            node,
            vec![req_gp(), req_gp(), req_none(), req_gp()],
            vec![req_gp(), req_flags()],
        );
        node
    }

    /// Map a generic projection onto the transformed node's outputs.
    fn gen_proj(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<Node> {
        let src = env.src;
        let pred = src.in_at(node, 0);
        let pnr = src.attr(node).proj();
        let mode = src.mode(node);

        if src.op(pred) == Op::Start {
            if pnr == pn::START_MEM {
                return Ok(self.initial_mem(env));
            }
            if pnr >= pn::START_ARGS {
                return self.gen_param(env, (pnr - pn::START_ARGS) as usize);
            }
            if pnr == pn::START_SP {
                return Ok(self.sp(env));
            }
            return Err(CodegenError::Unsupported(format!(
                "start projection {}",
                pnr
            )));
        }

        let t = env.transform(self, pred)?;
        let new_pn = match src.op(pred) {
            Op::Load => {
                if env.dst.mode(t) != Mode::T {
                    // The load was folded away; its memory result is the
                    // value the folded consumer produces.
                    debug_assert_eq!(pnr, pn::MEM);
                    return match env.dst.op(t) {
                        Op::Ia32(_) if env.dst.mode(t) == Mode::M => Ok(t),
                        _ => Ok(t),
                    };
                }
                match env.dst.op(t) {
                    Op::Ia32(Ia32Op::Load)
                    | Op::Ia32(Ia32Op::XLoad)
                    | Op::Ia32(Ia32Op::Fld)
                    | Op::Ia32(Ia32Op::Fild) => {
                        if pnr == pn::MEM {
                            out::LOAD_MEM
                        } else {
                            out::LOAD_RES
                        }
                    }
                    // Folded into a compare or SSE operation: result and
                    // memory only.
                    Op::Ia32(Ia32Op::Cmp)
                    | Op::Ia32(Ia32Op::Test)
                    | Op::Ia32(Ia32Op::Ucomi)
                    | Op::Ia32(Ia32Op::XAdd)
                    | Op::Ia32(Ia32Op::XSub)
                    | Op::Ia32(Ia32Op::XMul)
                    | Op::Ia32(Ia32Op::XDiv)
                    | Op::Ia32(Ia32Op::XMin)
                    | Op::Ia32(Ia32Op::XMax) => {
                        if pnr == pn::MEM {
                            out::LOAD_MEM
                        } else {
                            out::RES
                        }
                    }
                    // Folded into an integer ALU instruction, which also
                    // has a flags output between result and memory.
                    _ => {
                        if pnr == pn::MEM {
                            out::MEM
                        } else {
                            out::RES
                        }
                    }
                }
            }
            Op::Store => {
                debug_assert_eq!(pnr, pn::MEM);
                return Ok(t);
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
                    out::CALL_MEM
                } else {
                    out::CALL_RES + (pnr - pn::CALL_RES)
                }
            }
            Op::Builtin => {
                if pnr == pn::MEM {
                    // Value builtins leave memory untouched; the stateful
                    // ones returned their memory chain as `t`.
                    if env.dst.mode(t) == Mode::M {
                        return Ok(t);
                    }
                    return env.transform(self, src.in_at(pred, 0));
                }
                // The value is the transformed node itself.
                return Ok(t);
            }
            Op::Cond | Op::Switch => pnr,
            _ => {
                if env.dst.mode(t) != Mode::T {
                    return Ok(t);
                }
                pnr
            }
        };

        if let Some(existing) = env.dst.find_proj(t, new_pn) {
            return Ok(existing);
        }
        let new_mode = match mode {
            Mode::M => Mode::M,
            Mode::X => Mode::X,
            m if m.is_float() => {
                if self.features.use_sse2 {
                    Mode::F64
                } else {
                    Mode::X80
                }
            }
            _ => Mode::U32,
        };
        Ok(env.dst.proj(t, new_mode, new_pn))
    }
}

fn load_mode(src: &Graph, load: Node) -> Mode {
    match src.attr(load) {
        Attr::MemAccess { mode } => *mode,
        _ => panic!("load without access mode"),
    }
}

fn store_mode(src: &Graph, store: Node) -> Mode {
    match src.attr(store) {
        Attr::MemAccess { mode } => *mode,
        _ => panic!("store without access mode"),
    }
}

fn is_const_value(src: &Graph, node: Node, value: i64) -> bool {
    const_value(src, node) == Some(value)
}

fn const_value(src: &Graph, node: Node) -> Option<i64> {
    if src.op(node) == Op::Const {
        Some(src.attr(node).constant().as_i64())
    } else {
        None
    }
}

/// Are the bits above `mode` known to be zero in `node` (a transformed
/// value)?
fn upper_bits_clean(dst: &Graph, node: Node, mode: Mode) -> bool {
    if mode.is_signed() {
        return false;
    }
    match dst.op(node) {
        Op::Ia32(Ia32Op::ConvI2I) => {
            let attr = crate::isa::ia32::attr(dst, node);
            match attr.ls_mode {
                Some(ls) => !ls.is_signed() && ls.bits() <= mode.bits(),
                None => false,
            }
        }
        Op::Ia32(Ia32Op::Const) => {
            let attr = crate::isa::ia32::attr(dst, node);
            if let AttrVariant::Immediate { ent: None, offset, .. } = attr.variant {
                offset >= 0 && (offset as u64) < (1u64 << mode.bits())
            } else {
                false
            }
        }
        Op::Ia32(Ia32Op::Shr) => {
            let count = dst.in_at(node, 1);
            if let Op::Ia32(Ia32Op::Immediate) = dst.op(count) {
                let attr = crate::isa::ia32::attr(dst, count);
                if let AttrVariant::Immediate { offset, .. } = attr.variant {
                    return offset as u32 >= 32 - mode.bits();
                }
            }
            false
        }
        Op::Ia32(Ia32Op::And) => {
            upper_bits_clean(dst, dst.in_at(node, n::LEFT), mode)
                || upper_bits_clean(dst, dst.in_at(node, n::RIGHT), mode)
        }
        Op::Phi => false,
        _ => false,
    }
}

impl<'a> TransformHandler for Ia32Transform<'a> {
    fn phi_mode(&self, mode: Mode) -> Mode {
        match mode {
            Mode::M | Mode::T | Mode::X => mode,
            m if m.is_float() => {
                if self.features.use_sse2 {
                    Mode::F64
                } else {
                    Mode::X80
                }
            }
            _ => Mode::U32,
        }
    }

    fn transform(&mut self, env: &mut TransformEnv, node: Node) -> CodegenResult<Node> {
        let src = env.src;
        let binop = |i: usize| src.in_at(node, i);
        match src.op(node) {
            Op::Const => self.gen_const(env, node),
            Op::SymConst => self.gen_symconst(env, node),
            Op::FrameAddr => self.gen_frame_addr(env, node),
            Op::Unknown => {
                let mode = self.phi_mode(src.mode(node));
                Ok(env.dst.add_node(env.dst.start_block, Op::Unknown, mode, &[]))
            }
            Op::Jmp => {
                let block = env.block_of(node);
                Ok(env.dst.add_node(block, Op::Jmp, Mode::X, &[]))
            }
            Op::Add => self.gen_add(env, node),
            Op::Sub => {
                if src.mode(node).is_float() {
                    self.gen_binop_float(env, node, Ia32Op::XSub, Ia32Op::Fsub, false)
                } else {
                    self.gen_binop(
                        env,
                        node,
                        Ia32Op::Sub,
                        binop(0),
                        binop(1),
                        MatchFlags {
                            am: true,
                            immediate: true,
                            mode_neutral: true,
                            ..Default::default()
                        },
                    )
                }
            }
            Op::Mul => {
                if src.mode(node).is_float() {
                    self.gen_binop_float(env, node, Ia32Op::XMul, Ia32Op::Fmul, true)
                } else {
                    self.gen_binop(
                        env,
                        node,
                        Ia32Op::IMul,
                        binop(0),
                        binop(1),
                        MatchFlags {
                            commutative: true,
                            am: true,
                            immediate: true,
                            mode_neutral: true,
                            ..Default::default()
                        },
                    )
                }
            }
            Op::Mulh => self.gen_mulh(env, node),
            Op::Quot => self.gen_binop_float(env, node, Ia32Op::XDiv, Ia32Op::Fdiv, false),
            Op::And => self.gen_and(env, node),
            Op::Or => self.gen_binop(
                env,
                node,
                Ia32Op::Or,
                binop(0),
                binop(1),
                MatchFlags {
                    commutative: true,
                    am: true,
                    immediate: true,
                    mode_neutral: true,
                    ..Default::default()
                },
            ),
            Op::Eor => self.gen_binop(
                env,
                node,
                Ia32Op::Xor,
                binop(0),
                binop(1),
                MatchFlags {
                    commutative: true,
                    am: true,
                    immediate: true,
                    mode_neutral: true,
                    ..Default::default()
                },
            ),
            Op::Not => self.gen_unop(env, node, Ia32Op::Not, binop(0)),
            Op::Minus => self.gen_minus(env, node),
            Op::Shl => self.gen_shift(env, node, Ia32Op::Shl),
            Op::Shr => self.gen_shift(env, node, Ia32Op::Shr),
            Op::Shrs => self.gen_shift(env, node, Ia32Op::Sar),
            Op::Rotl => self.gen_shift(env, node, Ia32Op::Rol),
            Op::Div | Op::Mod | Op::DivMod => self.gen_div(env, node),
            Op::Conv => self.gen_conv(env, node),
            Op::Cmp => Ok(self.gen_cmp(env, node)?.0),
            Op::Cond => self.gen_cond(env, node),
            Op::Switch => self.gen_switch(env, node),
            Op::Mux => self.gen_mux(env, node),
            Op::Load => self.gen_load(env, node),
            Op::Store => self.gen_store(env, node),
            Op::Call => self.gen_call(env, node),
            Op::Return => self.gen_return(env, node),
            Op::CopyB => self.gen_copyb(env, node),
            Op::Builtin => self.gen_builtin(env, node),
            Op::Proj => self.gen_proj(env, node),
            Op::NoMem => Ok(env.dst.no_mem),
            op => Err(CodegenError::Unsupported(format!(
                "no ia32 lowering for {:?} (node {:?})",
                op, node
            ))),
        }
    }
}
