//! The amd64 (x86-64) back-end: the 64-bit variant of the ia32 shape.
//!
//! The pipeline, the address-mode folding and the emission scheme are the
//! same as on ia32 with wider registers, `q` suffixes and eight-byte jump
//! table entries. The instruction set here covers the integer core; floats
//! follow the SSE path exclusively.

pub mod emit;
pub mod regs;
pub mod transform;

use crate::abi::AbiSignature;
use crate::gas::{GasEmitter, ObjectFormat};
use crate::ir::{Attr, Entity, Graph, Mode, Node, SymbolTable};
use crate::isa::ia32::attrs::CondCode;
use crate::isa::{CpuFeatures, TargetIsa};
use crate::regs::RegClass;
use crate::sched::blocksched::BlockSchedule;
use crate::sched::Schedule;
use crate::CodegenResult;

/// The amd64 instructions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Amd64Op {
    Const,
    Immediate,
    NoReg,
    Add,
    Sub,
    And,
    Or,
    Xor,
    Not,
    Neg,
    IMul,
    Div,
    IDiv,
    Cqto,
    Shl,
    Shr,
    Sar,
    Lea,
    Conv,
    Load,
    Store,
    Push,
    Pop,
    Test,
    Cmp,
    Setcc,
    Jmp,
    Jcc,
    SwitchJmp,
    Call,
    XAdd,
    XSub,
    XMul,
    XDiv,
    XLoad,
    XStore,
    Ucomi,
}

impl Amd64Op {
    /// Does this instruction end its block?
    pub fn is_block_terminator(self) -> bool {
        matches!(self, Amd64Op::Jmp | Amd64Op::Jcc | Amd64Op::SwitchJmp)
    }

    /// Pseudo nodes that take the position of their producer.
    pub fn is_not_scheduled(self) -> bool {
        matches!(self, Amd64Op::Immediate | Amd64Op::NoReg)
    }
}

/// The variant part of an amd64 attribute.
#[derive(Clone, Debug)]
pub enum Amd64AttrVariant {
    /// Nothing beyond the common block.
    Normal,
    /// An immediate operand.
    Immediate {
        /// Symbolic part.
        ent: Option<Entity>,
        /// Numeric part.
        offset: i64,
    },
    /// A condition code.
    CondCode(CondCode),
    /// Multi-way jump default exit.
    SwitchJmp {
        /// Projection number of the default exit.
        default_pn: i64,
    },
    /// Call information.
    Call {
        /// Callee for direct calls.
        callee: Option<Entity>,
    },
}

/// The attribute block of the amd64 nodes.
#[derive(Clone, Debug)]
pub struct Amd64Attr {
    /// The node reads its right operand from memory.
    pub source_am: bool,
    /// Index scale exponent.
    pub am_scale: u8,
    /// Displacement.
    pub am_offs: i32,
    /// Symbolic displacement.
    pub am_sym: Option<Entity>,
    /// Width of the operation (`l` or `q` suffix).
    pub ls_mode: Option<Mode>,
    /// The variant part.
    pub variant: Amd64AttrVariant,
}

impl Amd64Attr {
    /// An empty attribute block.
    pub fn new() -> Amd64Attr {
        Amd64Attr {
            source_am: false,
            am_scale: 0,
            am_offs: 0,
            am_sym: None,
            ls_mode: None,
            variant: Amd64AttrVariant::Normal,
        }
    }

    /// An attribute block with a variant payload.
    pub fn with_variant(variant: Amd64AttrVariant) -> Amd64Attr {
        Amd64Attr {
            variant,
            ..Amd64Attr::new()
        }
    }
}

impl Default for Amd64Attr {
    fn default() -> Self {
        Self::new()
    }
}

/// The amd64 attribute block of `node`.
pub fn attr(graph: &Graph, node: Node) -> &Amd64Attr {
    match graph.attr(node) {
        Attr::Amd64(a) => a,
        _ => panic!("node {:?} has no amd64 attribute", node),
    }
}

/// The amd64 back-end.
pub struct Amd64Isa {
    features: CpuFeatures,
    format: ObjectFormat,
}

impl Amd64Isa {
    /// Create the target.
    pub fn new(features: CpuFeatures, format: ObjectFormat) -> Amd64Isa {
        Amd64Isa { features, format }
    }
}

impl TargetIsa for Amd64Isa {
    fn name(&self) -> &'static str {
        "amd64"
    }

    fn pointer_mode(&self) -> Mode {
        Mode::P64
    }

    fn features(&self) -> &CpuFeatures {
        &self.features
    }

    fn object_format(&self) -> ObjectFormat {
        self.format
    }

    fn reg_classes(&self) -> &'static [RegClass] {
        &regs::CLASSES
    }

    fn transform(
        &self,
        symbols: &mut SymbolTable,
        graph: &Graph,
        sig: &AbiSignature,
    ) -> CodegenResult<Graph> {
        transform::transform_graph(&self.features, symbols, graph, sig)
    }

    fn introduce_prologue_epilogue(
        &self,
        _symbols: &mut SymbolTable,
        _graph: &mut Graph,
        _sched: &mut Schedule,
        _sig: &AbiSignature,
    ) -> CodegenResult<()> {
        // Leaf functions with register arguments need no frame; the frame
        // handling follows the ia32 scheme once spill slots appear.
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
        emit::emit_function(&self.features, em, symbols, graph, sched, blocks)
    }
}
