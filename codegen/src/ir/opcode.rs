//! Node opcodes.
//!
//! One flat opcode space covers the generic (input) operations, the
//! backend-common operations shared by all targets (stack adjustment,
//! copies, keeps, permutations) and the per-target instruction sets. The
//! transformer replaces every generic opcode by target ones; the later
//! passes never see generic data operations again.

use crate::isa::amd64::Amd64Op;
use crate::isa::arm::ArmOp;
use crate::isa::ia32::Ia32Op;
use crate::isa::template::TemplateOp;

/// The operation computed by a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    // -- Structure -------------------------------------------------------
    /// A basic block; its inputs are the control-flow predecessors.
    Block,
    /// Function entry. Produces the initial memory state and the incoming
    /// parameters as projections.
    Start,
    /// Function exit; collects the `Return`s.
    End,
    /// SSA merge at block entry.
    Phi,
    /// Projection selecting one output of a tuple-mode node.
    Proj,
    /// Placeholder value, used while graphs are under construction.
    Unknown,
    /// The empty memory state.
    NoMem,
    /// Tombstone left behind by `Graph::kill`.
    Deleted,

    // -- Control flow ----------------------------------------------------
    /// Unconditional jump.
    Jmp,
    /// Two-way branch on a `B`-mode selector; projections 0/1 are the
    /// false/true exits.
    Cond,
    /// Multi-way branch on an integer selector; projections are numbered by
    /// case value, the default exit number lives in the attribute.
    Switch,
    /// Return from the function; inputs are memory and the return values.
    Return,
    /// Function call; inputs are memory, the callee address (for indirect
    /// calls) and the arguments.
    Call,

    // -- Data ------------------------------------------------------------
    /// A constant; the value is in the attribute.
    Const,
    /// The address of an entity.
    SymConst,
    /// The address of a slot in the current stack frame.
    FrameAddr,

    /// Integer or float addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication (result truncated to the operand width).
    Mul,
    /// High half of the double-width product.
    Mulh,
    /// Integer division. Tuple result: memory and quotient.
    Div,
    /// Integer remainder. Tuple result: memory and remainder.
    Mod,
    /// Combined division and remainder. Tuple result: memory, quotient,
    /// remainder.
    DivMod,
    /// Float division.
    Quot,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise exclusive or.
    Eor,
    /// Bitwise complement.
    Not,
    /// Arithmetic negation.
    Minus,
    /// Left shift.
    Shl,
    /// Logical right shift.
    Shr,
    /// Arithmetic right shift.
    Shrs,
    /// Left rotation.
    Rotl,
    /// Value conversion between modes.
    Conv,
    /// Ternary select: `sel ? true_value : false_value`.
    Mux,
    /// Comparison; yields a `B`-mode value, the relation is in the
    /// attribute.
    Cmp,
    /// Memory load. Tuple result: memory and the loaded value.
    Load,
    /// Memory store. Tuple result: memory.
    Store,
    /// Block copy of a fixed byte count.
    CopyB,
    /// A compiler builtin, identified by the attribute.
    Builtin,

    // -- Backend-common --------------------------------------------------
    /// Stack-pointer adjustment. A positive offset grows the frame.
    IncSp,
    /// Register-to-register copy inserted by the allocator.
    Copy,
    /// A copy that additionally keeps other values alive.
    CopyKeep,
    /// Keeps otherwise unused values alive.
    Keep,
    /// Parallel permutation of register values.
    Perm,
    /// Parallel permutation of stack slots.
    MemPerm,
    /// Store a value to its spill slot.
    Spill,
    /// Reload a value from its spill slot.
    Reload,

    // -- Targets ---------------------------------------------------------
    /// An ia32 instruction.
    Ia32(Ia32Op),
    /// An amd64 instruction.
    Amd64(Amd64Op),
    /// An arm instruction.
    Arm(ArmOp),
    /// A TEMPLATE instruction.
    Template(TemplateOp),
}

impl Op {
    /// Does this operation end its block?
    pub fn is_block_terminator(self) -> bool {
        match self {
            Op::Jmp | Op::Cond | Op::Switch | Op::Return => true,
            Op::Ia32(op) => op.is_block_terminator(),
            Op::Amd64(op) => op.is_block_terminator(),
            Op::Arm(op) => op.is_block_terminator(),
            Op::Template(op) => op.is_block_terminator(),
            _ => false,
        }
    }

    /// Does this node take the schedule position of its producer instead of
    /// being scheduled itself?
    pub fn is_not_scheduled(self) -> bool {
        matches!(self, Op::Proj | Op::Unknown | Op::NoMem | Op::Deleted)
            || match self {
                Op::Ia32(op) => op.is_not_scheduled(),
                Op::Amd64(op) => op.is_not_scheduled(),
                Op::Arm(op) => op.is_not_scheduled(),
                _ => false,
            }
    }

    /// Is this a generic (pre-transform) data or control operation that a
    /// target transformer must handle?
    pub fn is_generic(self) -> bool {
        !matches!(
            self,
            Op::Block
                | Op::Ia32(_)
                | Op::Amd64(_)
                | Op::Arm(_)
                | Op::Template(_)
                | Op::IncSp
                | Op::Copy
                | Op::CopyKeep
                | Op::Keep
                | Op::Perm
                | Op::MemPerm
                | Op::Spill
                | Op::Reload
                | Op::Deleted
        )
    }
}

/// The compiler builtins the back-end lowers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinKind {
    /// Find first set bit (1-based; 0 for a zero input).
    Ffs,
    /// Count leading zeros.
    Clz,
    /// Count trailing zeros.
    Ctz,
    /// Parity of the population count.
    Parity,
    /// Population count.
    Popcount,
    /// Byte-order reversal.
    Bswap,
    /// Cache prefetch; `rw` and `locality` come from the constant inputs.
    Prefetch,
    /// Return address of the n-th enclosing frame.
    ReturnAddress,
    /// Frame address of the n-th enclosing frame.
    FrameAddress,
    /// Write a trampoline calling `fn` with static chain `env` into a
    /// buffer.
    Trampoline,
    /// Abort execution with an illegal instruction.
    Trap,
}
