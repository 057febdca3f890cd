//! Per-node attributes.
//!
//! Most opcodes carry no payload; the rest store it in one of these
//! variants. Target nodes carry a boxed per-target attribute block with a
//! common prefix (address mode, load/store mode, frame entity) and their own
//! variant part, mirroring the opcode split in `Op`.

use crate::ir::{BuiltinKind, Entity, Mode, Relation, TarVal};
use crate::isa::amd64::Amd64Attr;
use crate::isa::arm::ArmAttr;
use crate::isa::ia32::Ia32Attr;

/// Attribute payload of a node.
#[derive(Clone, Debug)]
pub enum Attr {
    /// No payload.
    None,
    /// `Const`: the constant value.
    Const(TarVal),
    /// `SymConst`: the addressed entity.
    SymConst(Entity),
    /// `FrameAddr`: the addressed frame slot.
    FrameAddr(Entity),
    /// `Proj`: the selected output number.
    Proj(i64),
    /// `Cmp`: the tested relation.
    Cmp {
        /// Relation between the two operands.
        relation: Relation,
    },
    /// `Switch`: the projection number of the default exit.
    Switch {
        /// Output number taken when no case matches.
        default_pn: i64,
    },
    /// `Load`/`Store`: the accessed mode.
    MemAccess {
        /// Mode of the transferred value.
        mode: Mode,
    },
    /// `Call`: the callee, if the call is direct.
    Call {
        /// Called entity for direct calls; indirect calls take the address
        /// as an input instead.
        callee: Option<Entity>,
    },
    /// `Builtin`: which builtin.
    Builtin(BuiltinKind),
    /// `CopyB`: the number of bytes to copy.
    CopyB {
        /// Copied byte count.
        size: u32,
    },
    /// `IncSp`: the stack adjustment. Positive offsets grow the frame.
    IncSp {
        /// Frame growth in bytes (negative shrinks).
        offset: i32,
    },
    /// `Return`: callee-pop byte count and branch-padding flag.
    Return {
        /// Bytes popped by the return (stdcall-style conventions).
        pop: u32,
        /// Emit a `rep` prefix to pad the return (Athlon branch-target
        /// penalty workaround); set by the peephole pass.
        pad: bool,
    },
    /// An ia32 attribute block.
    Ia32(Box<Ia32Attr>),
    /// An amd64 attribute block.
    Amd64(Box<Amd64Attr>),
    /// An arm attribute block.
    Arm(Box<ArmAttr>),
}

impl Attr {
    /// The projection number of a `Proj` attribute.
    pub fn proj(&self) -> i64 {
        match self {
            Attr::Proj(pn) => *pn,
            _ => panic!("not a proj attribute"),
        }
    }

    /// The constant of a `Const` attribute.
    pub fn constant(&self) -> TarVal {
        match self {
            Attr::Const(tv) => *tv,
            _ => panic!("not a const attribute"),
        }
    }
}
