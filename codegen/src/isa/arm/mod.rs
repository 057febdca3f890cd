//! The arm (32-bit) back-end.
//!
//! The data-processing instructions carry an optional shift modifier on
//! their second operand. The ISA has no hardware divide: divisions become
//! runtime calls. Float support depends on the configured FPU (fpa, vfp or
//! soft-float via runtime calls).

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

/// A shift applied to the second operand of a data-processing
/// instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShiftModifier {
    /// Logical shift left.
    Lsl(u8),
    /// Logical shift right.
    Lsr(u8),
    /// Arithmetic shift right.
    Asr(u8),
    /// Rotate right.
    Ror(u8),
}

/// The arm instructions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ArmOp {
    Const,
    Immediate,
    Add,
    Sub,
    Rsb,
    And,
    Orr,
    Eor,
    Bic,
    Mvn,
    Mov,
    Mul,
    Clz,
    Cmp,
    Tst,
    Jmp,
    Bcc,
    SwitchJmp,
    Bl,
    Ldr,
    Str,
    FltAdd,
    FltSub,
    FltMul,
    FltDiv,
    FltLoad,
    FltStore,
    FltMov,
    CopyB,
}

impl ArmOp {
    /// Does this instruction end its block?
    pub fn is_block_terminator(self) -> bool {
        matches!(self, ArmOp::Jmp | ArmOp::Bcc | ArmOp::SwitchJmp)
    }

    /// Pseudo nodes that take the position of their producer.
    pub fn is_not_scheduled(self) -> bool {
        matches!(self, ArmOp::Immediate)
    }
}

/// The variant part of an arm attribute.
#[derive(Clone, Debug)]
pub enum ArmAttrVariant {
    /// Nothing beyond the common block.
    Normal,
    /// An immediate operand.
    Immediate {
        /// Symbolic part.
        ent: Option<Entity>,
        /// Numeric part.
        offset: i32,
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
    /// Block copy size.
    CopyB {
        /// Requested byte count. The copy loop moves whole words and may
        /// copy up to three bytes more.
        size: u32,
    },
}

/// The attribute block of the arm nodes.
#[derive(Clone, Debug)]
pub struct ArmAttr {
    /// Access width of loads and stores.
    pub ls_mode: Option<Mode>,
    /// Load sign extension.
    pub sign_extend: bool,
    /// The shift modifier on the second operand.
    pub shift: Option<ShiftModifier>,
    /// Displacement of a load/store.
    pub offset: i32,
    /// The variant part.
    pub variant: ArmAttrVariant,
}

impl ArmAttr {
    /// An empty attribute block.
    pub fn new() -> ArmAttr {
        ArmAttr {
            ls_mode: None,
            sign_extend: false,
            shift: None,
            offset: 0,
            variant: ArmAttrVariant::Normal,
        }
    }

    /// An attribute block with a variant payload.
    pub fn with_variant(variant: ArmAttrVariant) -> ArmAttr {
        ArmAttr {
            variant,
            ..ArmAttr::new()
        }
    }
}

impl Default for ArmAttr {
    fn default() -> Self {
        Self::new()
    }
}

/// The arm attribute block of `node`.
pub fn attr(graph: &Graph, node: Node) -> &ArmAttr {
    match graph.attr(node) {
        Attr::Arm(a) => a,
        _ => panic!("node {:?} has no arm attribute", node),
    }
}

/// The arm back-end.
pub struct ArmIsa {
    features: CpuFeatures,
    format: ObjectFormat,
}

impl ArmIsa {
    /// Create the target.
    pub fn new(features: CpuFeatures, format: ObjectFormat) -> ArmIsa {
        ArmIsa { features, format }
    }
}

impl TargetIsa for ArmIsa {
    fn name(&self) -> &'static str {
        "arm"
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
