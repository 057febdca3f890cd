//! Retargetable back-end lowering SSA form to GNU assembler text.
//!
//! The input is a language- and machine-independent SSA graph (blocks, phis,
//! arithmetic, memory and control nodes). Per target the pipeline is:
//!
//! 1. transform the generic graph into target instructions, folding
//!    address-mode subtrees into memory operands,
//! 2. order the blocks and list-schedule the nodes inside each block,
//! 3. hand the graph to the (external) register allocator,
//! 4. run register-aware peephole rewrites over the scheduled code,
//! 5. print AT&T-syntax text for the GNU assembler.
//!
//! Supported targets are ia32 (the reference), amd64, arm and a skeletal
//! TEMPLATE target meant as a porting seed.

#![deny(missing_docs)]

use thiserror::Error;

pub mod abi;
pub mod context;
pub mod domtree;
pub mod gas;
pub mod ir;
pub mod isa;
pub mod keeps;
pub mod peephole;
pub mod rbitset;
pub mod regs;
pub mod sched;
pub mod ssa_reconstruct;

mod betransform;

pub use crate::context::Ctx;

/// A compilation error.
///
/// When a function can not be compiled, the pipeline stops and reports one of
/// these. Broken internal invariants are compiler bugs and panic instead.
#[derive(Error, Debug)]
pub enum CodegenError {
    /// The input graph contains a construct the selected target has no
    /// lowering for (an opcode without a transformer entry, or a builtin the
    /// target does not implement).
    #[error("unsupported ir construct: {0}")]
    Unsupported(String),

    /// An invariant of the intermediate representation does not hold, e.g. a
    /// phi whose arity differs from its block's predecessor count.
    #[error("ir constraint violated: {0}")]
    Constraint(String),

    /// The register assigned by the allocator does not satisfy the operand's
    /// requirement.
    #[error("register requirement not satisfied: {0}")]
    RegConstraint(String),

    /// A constant does not fit the target mode.
    #[error("constant out of range for target mode: {0}")]
    ConstantRange(String),
}

/// A convenient alias for a `Result` that uses `CodegenError` as the error
/// type.
pub type CodegenResult<T> = Result<T, CodegenError>;
