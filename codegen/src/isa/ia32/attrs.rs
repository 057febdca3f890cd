//! Attribute blocks of the ia32 nodes.
//!
//! Every ia32 node carries the common block: address-mode description,
//! load/store mode and the bookkeeping bits. Opcodes needing more carry one
//! of the variants (immediate payload, condition code, call info, block
//! copy size, x87 slots, inline assembler text).

use crate::ir::{Entity, Mode, Relation};

/// How a node uses its address mode inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpType {
    /// Register operands only.
    Normal,
    /// The memory operand is a source (read).
    AddrModeS,
    /// The memory operand is the destination (read-modify-write).
    AddrModeD,
}

/// A condition code: the relation plus its interpretation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CondCode {
    /// The relation tested.
    pub relation: Relation,
    /// Operands compared as unsigned.
    pub unsigned: bool,
    /// Flags came from a float compare (parity games apply).
    pub float: bool,
}

impl CondCode {
    /// An integer condition.
    pub fn int(relation: Relation, unsigned: bool) -> CondCode {
        CondCode {
            relation,
            unsigned,
            float: false,
        }
    }

    /// The negated condition.
    pub fn negated(self) -> CondCode {
        CondCode {
            relation: self.relation.negated(),
            ..self
        }
    }
}

/// The variant part of an ia32 attribute.
#[derive(Clone, Debug)]
pub enum AttrVariant {
    /// Nothing beyond the common block.
    Normal,
    /// An immediate operand: `ent ± offset`.
    Immediate {
        /// Symbolic part, if any.
        ent: Option<Entity>,
        /// Negate the symbolic part.
        sign: bool,
        /// Numeric part.
        offset: i32,
    },
    /// A condition code (Setcc, CMovcc, Jcc).
    CondCode(CondCode),
    /// Call information.
    Call {
        /// Called entity for direct calls.
        callee: Option<Entity>,
        /// Bytes popped by the callee.
        pop: u32,
    },
    /// Block copy size.
    CopyB {
        /// Copied byte count.
        size: u32,
    },
    /// Multi-way jump: the default exit's projection number.
    SwitchJmp {
        /// Projection number of the default exit.
        default_pn: i64,
    },
    /// x87 register slots, filled by the fp stack simulation.
    X87 {
        /// Up to three stack slots.
        slots: [Option<u8>; 3],
    },
    /// Inline assembler.
    Asm {
        /// The template text.
        text: String,
    },
}

/// The attribute block shared by all ia32 nodes.
#[derive(Clone, Debug)]
pub struct Ia32Attr {
    /// Address mode kind.
    pub op_type: OpType,
    /// Scale exponent of the index register (0..3).
    pub am_scale: u8,
    /// Address mode displacement.
    pub am_offs: i32,
    /// Address mode symbol.
    pub am_sym: Option<Entity>,
    /// Negate the address mode symbol.
    pub am_sym_sign: bool,
    /// The address is frame-relative; `frame_ent` names the slot.
    pub use_frame: bool,
    /// The frame slot of a frame-relative access.
    pub frame_ent: Option<Entity>,
    /// The mode of the value transferred by this node (load/store width,
    /// extension widths).
    pub ls_mode: Option<Mode>,
    /// The operands may be swapped.
    pub commutative: bool,
    /// The operands have been swapped (condition codes must mirror).
    pub ins_permuted: bool,
    /// This node stores to a spill slot.
    pub is_spill: bool,
    /// This node reloads from a spill slot.
    pub is_reload: bool,
    /// This node rematerialises a value.
    pub is_remat: bool,
    /// The instruction may fault; it gets an exception label.
    pub throws: bool,
    /// The exception label id, assigned during emission (0 = none yet).
    pub exc_label: u64,
    /// The variant part.
    pub variant: AttrVariant,
}

impl Ia32Attr {
    /// A default attribute block: no address mode, no payload.
    pub fn new() -> Ia32Attr {
        Ia32Attr {
            op_type: OpType::Normal,
            am_scale: 0,
            am_offs: 0,
            am_sym: None,
            am_sym_sign: false,
            use_frame: false,
            frame_ent: None,
            ls_mode: None,
            commutative: false,
            ins_permuted: false,
            is_spill: false,
            is_reload: false,
            is_remat: false,
            throws: false,
            exc_label: 0,
            variant: AttrVariant::Normal,
        }
    }

    /// An attribute block with a variant payload.
    pub fn with_variant(variant: AttrVariant) -> Ia32Attr {
        Ia32Attr {
            variant,
            ..Ia32Attr::new()
        }
    }

    /// The immediate payload; panics for other variants.
    pub fn immediate(&self) -> (Option<Entity>, bool, i32) {
        match &self.variant {
            AttrVariant::Immediate { ent, sign, offset } => (*ent, *sign, *offset),
            _ => panic!("not an immediate attribute"),
        }
    }

    /// The condition code; panics for other variants.
    pub fn cond_code(&self) -> CondCode {
        match &self.variant {
            AttrVariant::CondCode(cc) => *cc,
            _ => panic!("not a condition code attribute"),
        }
    }
}

impl Default for Ia32Attr {
    fn default() -> Self {
        Self::new()
    }
}
