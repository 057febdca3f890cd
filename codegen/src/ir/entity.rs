//! Symbols and global data.
//!
//! An entity is anything with a name and linkage: functions, global
//! variables, constant-pool entries and frame slots. The table owns them for
//! the whole module; nodes reference them by `Entity` id.

use anvil_entity::{entity_impl, PrimaryMap};

use crate::ir::{Mode, TarVal};

/// A reference to a symbol in the module's symbol table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity(u32);
entity_impl!(Entity, "ent");

/// Symbol visibility.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    /// Only visible inside the current compilation unit.
    Local,
    /// Visible to the linker.
    Global,
    /// Visible to the linker, may be overridden by a non-weak definition.
    Weak,
    /// Declared here, defined elsewhere.
    External,
}

/// The layout of a piece of global data, as far as the emitter needs it.
#[derive(Clone, Debug)]
pub enum DataType {
    /// A single scalar of the given mode.
    Scalar(Mode),
    /// An array. `len == None` is a flexible array member: its extent is
    /// taken from the initializer.
    Array {
        /// Element type.
        elem: Box<DataType>,
        /// Number of elements, `None` for a flexible tail.
        len: Option<u32>,
    },
    /// A struct with explicitly placed fields.
    Struct {
        /// Total size in bytes, including padding.
        size: u32,
        /// The fields, sorted by offset.
        fields: Vec<Field>,
    },
}

/// One field of a struct type.
#[derive(Clone, Debug)]
pub struct Field {
    /// Byte offset of the field (of its containing storage unit for
    /// bitfields).
    pub offset: u32,
    /// The field's type.
    pub ty: DataType,
    /// For bitfields: bit offset within the storage unit and bit size.
    pub bits: Option<(u32, u32)>,
}

impl DataType {
    /// The static size of the type in bytes. A flexible array member
    /// contributes zero.
    pub fn size(&self) -> u32 {
        match self {
            DataType::Scalar(mode) => mode.bytes(),
            DataType::Array { elem, len } => elem.size() * len.unwrap_or(0),
            DataType::Struct { size, .. } => *size,
        }
    }
}

/// An initial value for a global entity.
#[derive(Clone, Debug)]
pub enum Initializer {
    /// Explicit zero.
    Null,
    /// A constant value.
    Tarval(TarVal),
    /// The address of another entity, plus a byte offset.
    EntityRef {
        /// The referenced symbol.
        ent: Entity,
        /// Byte offset added to the address.
        offset: i32,
    },
    /// One initializer per array element or struct field, positionally.
    Compound(Vec<Initializer>),
}

/// What kind of thing a symbol names.
#[derive(Clone, Debug)]
pub enum EntityKind {
    /// A function.
    Function,
    /// A global variable or constant.
    Global {
        /// Layout of the data.
        ty: DataType,
        /// Initial value; `None` puts the entity in bss (or a common).
        init: Option<Initializer>,
        /// Placed in a read-only section.
        readonly: bool,
        /// Thread-local.
        tls: bool,
    },
    /// A slot in a function's stack frame.
    FrameSlot {
        /// Byte offset: relative to the incoming stack pointer for incoming
        /// slots, relative to the frame base for locals (filled in by frame
        /// layout).
        offset: i32,
        /// Size in bytes.
        size: u32,
        /// An incoming argument slot, above the return address.
        incoming: bool,
    },
    /// A registered module constructor or destructor.
    Constructor {
        /// True for destructors.
        dtor: bool,
    },
    /// A PIC jump-table stub for `target` (Mach-O; the assembler and
    /// linker fill in the code).
    PicTrampoline {
        /// The function the stub forwards to.
        target: Entity,
    },
    /// A PIC non-lazy symbol pointer for `target` (Mach-O).
    PicSymbol {
        /// The symbol the pointer resolves to.
        target: Entity,
    },
}

/// The data stored per symbol.
#[derive(Clone, Debug)]
pub struct EntityData {
    /// The linker-level name.
    pub name: String,
    /// Visibility to the linker.
    pub visibility: Visibility,
    /// Alignment in bytes (a power of two, 0 = default for the type).
    pub alignment: u32,
    /// What the symbol names.
    pub kind: EntityKind,
}

/// The module-wide symbol table.
pub struct SymbolTable {
    ents: PrimaryMap<Entity, EntityData>,
    next_const: u32,
}

impl SymbolTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            ents: PrimaryMap::new(),
            next_const: 0,
        }
    }

    /// Define a new entity.
    pub fn define(&mut self, data: EntityData) -> Entity {
        self.ents.push(data)
    }

    /// Define a function symbol.
    pub fn define_function(&mut self, name: &str, visibility: Visibility) -> Entity {
        self.define(EntityData {
            name: name.to_string(),
            visibility,
            alignment: 0,
            kind: EntityKind::Function,
        })
    }

    /// Declare an external function (e.g. a runtime support routine).
    pub fn declare_function(&mut self, name: &str) -> Entity {
        if let Some(ent) = self.lookup(name) {
            return ent;
        }
        self.define(EntityData {
            name: name.to_string(),
            visibility: Visibility::External,
            alignment: 0,
            kind: EntityKind::Function,
        })
    }

    /// Allocate a read-only constant-pool entity holding `value`.
    ///
    /// The pool deduplicates by value, so repeated float constants share one
    /// entity.
    pub fn constant(&mut self, value: TarVal) -> Entity {
        for (ent, data) in self.ents.iter() {
            if let EntityKind::Global {
                init: Some(Initializer::Tarval(tv)),
                readonly: true,
                ..
            } = &data.kind
            {
                if *tv == value && data.name.starts_with(".LC") {
                    return ent;
                }
            }
        }
        let name = format!(".LC{}", self.next_const);
        self.next_const += 1;
        self.define(EntityData {
            name,
            visibility: Visibility::Local,
            alignment: value.mode().bytes(),
            kind: EntityKind::Global {
                ty: DataType::Scalar(value.mode()),
                init: Some(Initializer::Tarval(value)),
                readonly: true,
                tls: false,
            },
        })
    }

    /// Allocate an anonymous frame slot of `size` bytes.
    pub fn frame_slot(&mut self, name: &str, size: u32) -> Entity {
        self.define(EntityData {
            name: name.to_string(),
            visibility: Visibility::Local,
            alignment: 0,
            kind: EntityKind::FrameSlot {
                offset: 0,
                size,
                incoming: false,
            },
        })
    }

    /// Define an incoming argument slot at `offset` bytes above the
    /// incoming stack pointer.
    pub fn incoming_slot(&mut self, name: &str, size: u32, offset: i32) -> Entity {
        self.define(EntityData {
            name: name.to_string(),
            visibility: Visibility::Local,
            alignment: 0,
            kind: EntityKind::FrameSlot {
                offset,
                size,
                incoming: true,
            },
        })
    }

    /// Allocate the PIC jump-table stub for `target`, reusing an existing
    /// one.
    pub fn pic_trampoline(&mut self, target: Entity) -> Entity {
        for (ent, data) in self.ents.iter() {
            if let EntityKind::PicTrampoline { target: t } = data.kind {
                if t == target {
                    return ent;
                }
            }
        }
        let name = format!("L{}$stub", self.name(target));
        self.define(EntityData {
            name,
            visibility: Visibility::Local,
            alignment: 0,
            kind: EntityKind::PicTrampoline { target },
        })
    }

    /// Allocate the PIC non-lazy symbol pointer for `target`, reusing an
    /// existing one.
    pub fn pic_symbol(&mut self, target: Entity) -> Entity {
        for (ent, data) in self.ents.iter() {
            if let EntityKind::PicSymbol { target: t } = data.kind {
                if t == target {
                    return ent;
                }
            }
        }
        let name = format!("L{}$non_lazy_ptr", self.name(target));
        self.define(EntityData {
            name,
            visibility: Visibility::Local,
            alignment: 0,
            kind: EntityKind::PicSymbol { target },
        })
    }

    /// Look up an entity by name.
    pub fn lookup(&self, name: &str) -> Option<Entity> {
        self.ents
            .iter()
            .find(|(_, data)| data.name == name)
            .map(|(ent, _)| ent)
    }

    /// Access the data of an entity.
    pub fn get(&self, ent: Entity) -> &EntityData {
        &self.ents[ent]
    }

    /// Access the data of an entity, mutable edition.
    pub fn get_mut(&mut self, ent: Entity) -> &mut EntityData {
        &mut self.ents[ent]
    }

    /// The linker name of an entity.
    pub fn name(&self, ent: Entity) -> &str {
        &self.ents[ent].name
    }

    /// Iterate over all entities.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &EntityData)> {
        self.ents.iter()
    }

    /// The byte offset of a frame slot.
    pub fn frame_offset(&self, ent: Entity) -> i32 {
        match self.ents[ent].kind {
            EntityKind::FrameSlot { offset, .. } => offset,
            _ => panic!("{} is not a frame slot", self.ents[ent].name),
        }
    }

    /// Place a frame slot at the given offset.
    pub fn set_frame_offset(&mut self, ent: Entity, offset: i32) {
        match &mut self.ents[ent].kind {
            EntityKind::FrameSlot { offset: o, .. } => *o = offset,
            _ => panic!("not a frame slot"),
        }
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
