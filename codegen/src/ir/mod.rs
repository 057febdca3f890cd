//! Intermediate representation of the back-end.
//!
//! The generic, machine-independent graph and the target-specific graphs
//! share one representation: a dense arena of nodes with typed references,
//! predecessor links by node id, and a per-node attribute variant. The
//! transformer turns the former into the latter; all later passes only see
//! target nodes.

pub mod attr;
pub mod condcode;
pub mod entity;
pub mod graph;
pub mod mode;
pub mod opcode;
pub mod tarval;

pub use self::attr::Attr;
pub use self::condcode::Relation;
pub use self::entity::{
    DataType, Entity, EntityData, EntityKind, Field, Initializer, SymbolTable, Visibility,
};
pub use self::graph::{pn, Graph, Node, Use, UseKind};
pub use self::mode::Mode;
pub use self::opcode::{BuiltinKind, Op};
pub use self::tarval::TarVal;
