//! The ia32 (x86-32) back-end. This is the reference target.

pub mod abi;
pub mod address_mode;
pub mod attrs;
pub mod emit;
pub mod peephole;
pub mod regs;
pub mod setcc;
pub mod transform;

pub use self::attrs::{AttrVariant, CondCode, Ia32Attr, OpType};

use crate::abi::AbiSignature;
use crate::gas::{GasEmitter, ObjectFormat};
use crate::ir::{Attr, Graph, Mode, Node, SymbolTable};
use crate::isa::{CpuFeatures, TargetIsa};
use crate::regs::RegClass;
use crate::sched::blocksched::BlockSchedule;
use crate::sched::Schedule;
use crate::CodegenResult;

/// The ia32 instructions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Ia32Op {
    // Constants and pseudo registers.
    Const,
    Immediate,
    NoRegGp,
    NoRegXmm,
    NoRegVfp,
    ProduceVal,

    // Integer ALU.
    Add,
    Adc,
    Sub,
    Sbb,
    And,
    Or,
    Xor,
    Not,
    Neg,
    Inc,
    Dec,
    Lea,
    Shl,
    Shr,
    Sar,
    ShlD,
    ShrD,
    Rol,
    Mul,
    IMul,
    IMul1Op,
    Div,
    IDiv,
    Cltd,
    ConvI2I,
    Bsf,
    Bsr,
    Bswap,
    Bswap16,
    Popcnt,

    // Compares and conditional data flow.
    Test,
    Cmp,
    Bt,
    Setcc,
    CMov,

    // Memory.
    Load,
    Store,
    CopyB,
    Push,
    Pop,
    Leave,
    Prefetch0,
    Prefetch1,
    Prefetch2,
    PrefetchNta,
    PrefetchW,
    Prefetch3dNow,

    // Control flow.
    Jmp,
    Jcc,
    SwitchJmp,
    Call,
    ClimbFrame,
    Ud2,

    // SSE.
    XZero,
    XAdd,
    XSub,
    XMul,
    XDiv,
    XMin,
    XMax,
    XAnd,
    XOr,
    XXor,
    XLoad,
    XStore,
    CvtSi2Ss,
    CvtSi2Sd,
    CvtSs2Si,
    CvtSd2Si,
    CvtSs2Sd,
    CvtSd2Ss,
    Ucomi,

    // x87 (virtual registers; the fp stack simulation runs after
    // register allocation).
    Fadd,
    Fsub,
    Fmul,
    Fdiv,
    Fchs,
    Fld,
    Fst,
    Fild,
    Fist,
    Fisttp,
    Fldz,
    Fld1,
    Fucomi,
    FucomFnstsw,
    Sahf,
}

impl Ia32Op {
    /// Does this instruction end its block?
    pub fn is_block_terminator(self) -> bool {
        matches!(self, Ia32Op::Jmp | Ia32Op::Jcc | Ia32Op::SwitchJmp | Ia32Op::Ud2)
    }

    /// Pseudo nodes that are not scheduled; they take the position of their
    /// producer.
    pub fn is_not_scheduled(self) -> bool {
        matches!(
            self,
            Ia32Op::Immediate | Ia32Op::NoRegGp | Ia32Op::NoRegXmm | Ia32Op::NoRegVfp
        )
    }

    /// Does the instruction overwrite the condition codes?
    pub fn modifies_flags(self) -> bool {
        matches!(
            self,
            Ia32Op::Add
                | Ia32Op::Adc
                | Ia32Op::Sub
                | Ia32Op::Sbb
                | Ia32Op::And
                | Ia32Op::Or
                | Ia32Op::Xor
                | Ia32Op::Neg
                | Ia32Op::Inc
                | Ia32Op::Dec
                | Ia32Op::Shl
                | Ia32Op::Shr
                | Ia32Op::Sar
                | Ia32Op::ShlD
                | Ia32Op::ShrD
                | Ia32Op::Rol
                | Ia32Op::Mul
                | Ia32Op::IMul
                | Ia32Op::IMul1Op
                | Ia32Op::Div
                | Ia32Op::IDiv
                | Ia32Op::Bsf
                | Ia32Op::Bsr
                | Ia32Op::Popcnt
                | Ia32Op::Test
                | Ia32Op::Cmp
                | Ia32Op::Bt
                | Ia32Op::Ucomi
                | Ia32Op::Fucomi
                | Ia32Op::Sahf
        )
    }
}

/// Input positions of ia32 nodes with an address mode: base, index and
/// memory come first, the register operands after.
pub mod n {
    /// Address mode base register.
    pub const BASE: usize = 0;
    /// Address mode index register.
    pub const INDEX: usize = 1;
    /// Memory dependency.
    pub const MEM: usize = 2;
    /// Left operand of a binary operation.
    pub const LEFT: usize = 3;
    /// Right operand of a binary operation.
    pub const RIGHT: usize = 4;
    /// Operand of a unary operation (and value of a store).
    pub const UNARY: usize = 3;
    /// Flags input of a CMov.
    pub const CMOV_FLAGS: usize = 5;
}

/// Output numbers of multi-output ia32 nodes.
pub mod out {
    /// The ALU result.
    pub const RES: i64 = 0;
    /// The condition codes.
    pub const FLAGS: i64 = 1;
    /// The memory result of an ALU node with a fused load.
    pub const MEM: i64 = 2;
    /// A load's result.
    pub const LOAD_RES: i64 = 0;
    /// A load's memory result.
    pub const LOAD_MEM: i64 = 1;
    /// A store's memory result.
    pub const STORE_MEM: i64 = 0;
    /// Quotient of Div/IDiv, low half of Mul/IMul1Op.
    pub const DIV_RES: i64 = 0;
    /// Remainder of Div/IDiv, high half of Mul/IMul1Op.
    pub const DIV_MOD: i64 = 1;
    /// The new stack pointer of a Push.
    pub const PUSH_STACK: i64 = 0;
    /// The memory result of a Push.
    pub const PUSH_MEM: i64 = 1;
    /// The value popped by a Pop.
    pub const POP_RES: i64 = 0;
    /// The new stack pointer of a Pop.
    pub const POP_STACK: i64 = 1;
    /// The memory result of a Pop.
    pub const POP_MEM: i64 = 2;
    /// A call's first result.
    pub const CALL_RES: i64 = 0;
    /// A call's memory result.
    pub const CALL_MEM: i64 = 1;
}

/// The ia32 attribute block of `node`.
pub fn attr(graph: &Graph, node: Node) -> &Ia32Attr {
    match graph.attr(node) {
        Attr::Ia32(a) => a,
        other => panic!("node {:?} has no ia32 attribute ({:?})", node, other),
    }
}

/// The ia32 attribute block of `node`, mutable edition.
pub fn attr_mut(graph: &mut Graph, node: Node) -> &mut Ia32Attr {
    match graph.attr_mut(node) {
        Attr::Ia32(a) => a,
        _ => panic!("node {:?} has no ia32 attribute", node),
    }
}

/// Is `node` an ia32 node of the given opcode?
pub fn is_op(graph: &Graph, node: Node, op: Ia32Op) -> bool {
    graph.op(node) == crate::ir::Op::Ia32(op)
}

/// The ia32 back-end.
pub struct Ia32Isa {
    features: CpuFeatures,
    format: ObjectFormat,
}

impl Ia32Isa {
    /// Create the target with the given configuration.
    pub fn new(features: CpuFeatures, format: ObjectFormat) -> Ia32Isa {
        Ia32Isa { features, format }
    }
}

impl TargetIsa for Ia32Isa {
    fn name(&self) -> &'static str {
        "ia32"
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
        symbols: &mut SymbolTable,
        graph: &mut Graph,
        sched: &mut Schedule,
        sig: &AbiSignature,
    ) -> CodegenResult<()> {
        abi::introduce_prologue_epilogue(&self.features, symbols, graph, sched, sig)
    }

    fn peephole(&self, graph: &mut Graph, sched: &mut Schedule) {
        peephole::run(&self.features, graph, sched);
    }

    fn finalize(
        &self,
        symbols: &mut SymbolTable,
        graph: &mut Graph,
        sched: &mut Schedule,
    ) -> CodegenResult<()> {
        abi::finish_frame(&self.features, symbols, graph, sched)
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
