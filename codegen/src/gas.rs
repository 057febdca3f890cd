//! GNU assembler output: sections, symbols and global data.
//!
//! Everything the targets share when printing AT&T-syntax text lives here:
//! section switching per object-file format, symbol visibility, function
//! bracketing (`.type`/`.size` on ELF), and the emission of global
//! initialisers including bitfield packing and string detection. The
//! per-instruction printing is target code.

use core::fmt::Write;

use crate::ir::{
    DataType, Entity, EntityKind, Initializer, Mode, SymbolTable, TarVal, Visibility,
};

/// The object-file format assembled from the output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectFormat {
    /// ELF (the default on Linux and most Unixes).
    Elf,
    /// PE/COFF (mingw).
    Coff,
    /// Mach-O (macOS).
    MachO,
}

/// The sections the emitter switches between.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Section {
    /// Code.
    Text,
    /// Writable initialised data.
    Data,
    /// Read-only data.
    Rodata,
    /// Zero-initialised data.
    Bss,
    /// Thread-local zero-initialised data.
    Tbss,
    /// Module constructors.
    Constructors,
    /// Module destructors.
    Destructors,
    /// Mach-O literal C strings.
    CString,
    /// Mach-O PIC jump-table stubs.
    PicTrampolines,
    /// Mach-O PIC non-lazy symbol pointers.
    PicSymbols,
}

fn section_name(format: ObjectFormat, section: Section) -> &'static str {
    match (format, section) {
        (ObjectFormat::Elf, Section::Text) => ".section\t.text",
        (ObjectFormat::Elf, Section::Data) => ".section\t.data",
        (ObjectFormat::Elf, Section::Rodata) => ".section\t.rodata",
        (ObjectFormat::Elf, Section::Bss) => ".section\t.bss",
        (ObjectFormat::Elf, Section::Tbss) => ".section\t.tbss,\"awT\",@nobits",
        (ObjectFormat::Elf, Section::Constructors) => ".section\t.ctors,\"aw\",@progbits",
        (ObjectFormat::Elf, Section::Destructors) => ".section\t.dtors,\"aw\",@progbits",
        (ObjectFormat::Coff, Section::Text) => ".section\t.text",
        (ObjectFormat::Coff, Section::Data) => ".section\t.data",
        (ObjectFormat::Coff, Section::Rodata) => ".section .rdata,\"dr\"",
        (ObjectFormat::Coff, Section::Bss) => ".section\t.bss",
        (ObjectFormat::Coff, Section::Tbss) => ".section\t.tbss,\"awT\",@nobits",
        (ObjectFormat::Coff, Section::Constructors) => ".section\t.ctors,\"w\"",
        (ObjectFormat::Coff, Section::Destructors) => ".section\t.dtors,\"w\"",
        (ObjectFormat::MachO, Section::Text) => ".text",
        (ObjectFormat::MachO, Section::Data) => ".data",
        (ObjectFormat::MachO, Section::Rodata) => ".const",
        (ObjectFormat::MachO, Section::Bss) => ".data",
        (ObjectFormat::MachO, Section::Tbss) => ".section\t__DATA,__thread_bss,thread_local_zerofill",
        (ObjectFormat::MachO, Section::Constructors) => ".mod_init_func",
        (ObjectFormat::MachO, Section::Destructors) => ".mod_term_func",
        (_, Section::CString) => ".cstring",
        (ObjectFormat::MachO, Section::PicTrampolines) => {
            ".section\t__IMPORT,__jump_table,symbol_stubs,self_modifying_code+pure_instructions,5"
        }
        (ObjectFormat::MachO, Section::PicSymbols) => {
            ".section\t__IMPORT,__pointers,non_lazy_symbol_pointers"
        }
        // Position independent code goes through the got on the other
        // formats; the indirection sections exist on Mach-O only.
        (_, Section::PicTrampolines) | (_, Section::PicSymbols) => {
            panic!("pic indirection sections only exist on Mach-O")
        }
    }
}

/// The assembler text writer.
///
/// All emission goes through this; the buffer is flushed to the output file
/// by the caller once the module is complete.
pub struct GasEmitter {
    /// The accumulated text.
    pub buf: String,
    format: ObjectFormat,
    current_section: Option<Section>,
}

impl Write for GasEmitter {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.buf.push_str(s);
        Ok(())
    }
}

impl GasEmitter {
    /// Create an emitter for the given object format.
    pub fn new(format: ObjectFormat) -> GasEmitter {
        GasEmitter {
            buf: String::new(),
            format,
            current_section: None,
        }
    }

    /// The configured object format.
    pub fn format(&self) -> ObjectFormat {
        self.format
    }

    /// The prefix of anonymous block labels.
    pub fn block_label_prefix(&self) -> &'static str {
        ".LG"
    }

    /// The prefix of per-instruction labels (exception sidetables).
    pub fn insn_label_prefix(&self) -> &'static str {
        ".LE"
    }

    /// Switch to `section`, emitting the directive if needed.
    pub fn switch_section(&mut self, section: Section) {
        if self.current_section == Some(section) {
            return;
        }
        let _ = writeln!(self, "{}", section_name(self.format, section));
        self.current_section = Some(section);
    }

    /// Emit the visibility directives for an entity.
    fn emit_visibility(&mut self, name: &str, visibility: Visibility) {
        match visibility {
            Visibility::Local | Visibility::External => {}
            Visibility::Global => {
                let _ = writeln!(self, "\t.globl {}", name);
            }
            Visibility::Weak => {
                if self.format == ObjectFormat::MachO {
                    let _ = writeln!(self, "\t.weak_reference {}", name);
                } else {
                    let _ = writeln!(self, "\t.weak {}", name);
                }
            }
        }
    }

    /// Emit everything that goes before a function's first instruction.
    pub fn function_prolog(&mut self, symbols: &SymbolTable, ent: Entity, alignment_p2: u32) {
        let data = symbols.get(ent);
        self.switch_section(Section::Text);
        let _ = writeln!(self, "\t.p2align {},,{}", alignment_p2, (1 << alignment_p2) - 1);
        self.emit_visibility(&data.name, data.visibility);
        if self.format == ObjectFormat::Elf {
            let _ = writeln!(self, "\t.type {}, @function", data.name);
        }
        let _ = writeln!(self, "{}:", data.name);
    }

    /// Emit everything that goes after a function's last instruction.
    pub fn function_epilog(&mut self, symbols: &SymbolTable, ent: Entity) {
        if self.format == ObjectFormat::Elf {
            let name = symbols.name(ent);
            let _ = writeln!(self, "\t.size {}, .-{}", name, name);
        }
        let _ = writeln!(self);
    }

    /// Emit an alignment directive.
    pub fn emit_align(&mut self, p2alignment: u32) {
        if p2alignment > 0 {
            let _ = writeln!(self, "\t.p2align {}", p2alignment);
        }
    }

    /// Emit a read-only jump table. Each entry is a code label; the entry
    /// size is 4 or 8 bytes.
    pub fn emit_jump_table(&mut self, label: &str, entry_size: u32, targets: &[String]) {
        self.switch_section(Section::Rodata);
        self.emit_align(entry_size.trailing_zeros());
        let _ = writeln!(self, "{}:", label);
        let directive = if entry_size == 8 { ".quad" } else { ".long" };
        for t in targets {
            let _ = writeln!(self, "\t{} {}", directive, t);
        }
        self.switch_section(Section::Text);
    }

    /// Emit all data entities of the module (everything except functions).
    pub fn emit_globals(&mut self, symbols: &SymbolTable) {
        for (ent, data) in symbols.iter() {
            match &data.kind {
                EntityKind::Function | EntityKind::FrameSlot { .. } => {}
                EntityKind::Constructor { dtor } => {
                    self.switch_section(if *dtor {
                        Section::Destructors
                    } else {
                        Section::Constructors
                    });
                    let _ = writeln!(self, "\t.long {}", data.name);
                }
                EntityKind::Global { .. } => self.emit_global(symbols, ent),
                EntityKind::PicTrampoline { target } => {
                    let target = *target;
                    self.emit_indirect_symbol(symbols, ent, target, Section::PicTrampolines);
                }
                EntityKind::PicSymbol { target } => {
                    let target = *target;
                    self.emit_indirect_symbol(symbols, ent, target, Section::PicSymbols);
                }
            }
        }
        // Marks object files which are OK to divide their section contents
        // into individual blocks: no label points into the middle of an
        // object addressed as a whole.
        if self.format == ObjectFormat::MachO {
            let _ = writeln!(self, "\t.subsections_via_symbols");
        }
    }

    /// Emit one PIC indirection entry: the stub (or pointer) label, the
    /// `.indirect_symbol` directive naming the real symbol, and the filler
    /// the assembler patches.
    fn emit_indirect_symbol(
        &mut self,
        symbols: &SymbolTable,
        ent: Entity,
        target: Entity,
        section: Section,
    ) {
        assert_eq!(
            self.format,
            ObjectFormat::MachO,
            "pic indirection entries only exist on Mach-O"
        );
        self.switch_section(section);
        let _ = writeln!(self, "{}:", symbols.name(ent));
        let _ = writeln!(self, "\t.indirect_symbol {}", symbols.name(target));
        if section == Section::PicTrampolines {
            let _ = writeln!(self, "\thlt ; hlt ; hlt ; hlt ; hlt");
        } else {
            let _ = writeln!(self, "\t.long 0");
        }
    }

    /// Emit one global data entity.
    pub fn emit_global(&mut self, symbols: &SymbolTable, ent: Entity) {
        let data = symbols.get(ent);
        let (ty, init, readonly, tls) = match &data.kind {
            EntityKind::Global {
                ty,
                init,
                readonly,
                tls,
            } => (ty, init, *readonly, *tls),
            _ => panic!("{} is not a global", data.name),
        };
        if data.visibility == Visibility::External {
            return;
        }

        let size = data_size(ty, init.as_ref());
        let align = if data.alignment > 0 {
            data.alignment
        } else {
            natural_alignment(ty)
        };

        let init = match init {
            None => {
                // No initializer: a common symbol, or a local bss object.
                if data.visibility == Visibility::Local {
                    self.switch_section(if tls { Section::Tbss } else { Section::Bss });
                    self.emit_align(align.trailing_zeros());
                    let _ = writeln!(self, "{}:", data.name);
                    let _ = writeln!(self, "\t.space {}", size.max(1));
                } else {
                    let _ = writeln!(self, "\t.comm {},{},{}", data.name, size.max(1), align);
                }
                return;
            }
            Some(init) => init,
        };

        let section = if tls {
            Section::Tbss
        } else if readonly {
            if self.format == ObjectFormat::MachO && string_bytes(ty, init).is_some() {
                Section::CString
            } else {
                Section::Rodata
            }
        } else {
            Section::Data
        };
        self.switch_section(section);
        self.emit_align(align.trailing_zeros());
        self.emit_visibility(&data.name, data.visibility);
        if self.format == ObjectFormat::Elf {
            let _ = writeln!(self, "\t.type {}, @object", data.name);
            let _ = writeln!(self, "\t.size {}, {}", data.name, size);
        }
        let _ = writeln!(self, "{}:", data.name);

        if let Some(bytes) = string_bytes(ty, init) {
            self.emit_string(&bytes);
            return;
        }

        let mut vals = vec![InitVal::Empty; size as usize];
        stamp(&mut vals, 0, ty, init, symbols);
        self.emit_byte_map(&vals, symbols);
    }

    /// Emit a NUL-terminated string with escape processing. The trailing
    /// NUL is covered by `.string` itself.
    fn emit_string(&mut self, bytes: &[u8]) {
        let _ = write!(self, "\t.string \"");
        for &b in &bytes[..bytes.len() - 1] {
            match b {
                b'"' => self.buf.push_str("\\\""),
                b'\\' => self.buf.push_str("\\\\"),
                b'\n' => self.buf.push_str("\\n"),
                b'\r' => self.buf.push_str("\\r"),
                b'\t' => self.buf.push_str("\\t"),
                0x20..=0x7e => self.buf.push(b as char),
                _ => {
                    let _ = write!(self, "\\{:03o}", b);
                }
            }
        }
        let _ = writeln!(self, "\"");
    }

    /// Emit a stamped byte map with `.byte`/`.short`/`.long`/`.quad`
    /// directives and `.space` runs for the gaps.
    fn emit_byte_map(&mut self, vals: &[InitVal], symbols: &SymbolTable) {
        let mut i = 0;
        while i < vals.len() {
            match &vals[i] {
                InitVal::Empty => {
                    let start = i;
                    while i < vals.len() && matches!(vals[i], InitVal::Empty) {
                        i += 1;
                    }
                    let _ = writeln!(self, "\t.space {}", i - start);
                }
                InitVal::Byte(b) => {
                    let _ = writeln!(self, "\t.byte {}", b);
                    i += 1;
                }
                InitVal::Tv { tv, size } => {
                    self.emit_arith_tarval(*tv, *size);
                    i += *size as usize;
                }
                InitVal::Ref { ent, offset, size } => {
                    let directive = if *size == 8 { ".quad" } else { ".long" };
                    if *offset == 0 {
                        let _ = writeln!(self, "\t{} {}", directive, symbols.name(*ent));
                    } else {
                        let _ = writeln!(
                            self,
                            "\t{} {}{:+}",
                            directive,
                            symbols.name(*ent),
                            offset
                        );
                    }
                    i += *size as usize;
                }
                InitVal::Occupied => {
                    // Covered by a preceding multi-byte value.
                    i += 1;
                }
            }
        }
    }

    fn emit_arith_tarval(&mut self, tv: TarVal, size: u32) {
        let bits = tv.bits();
        match size {
            1 => {
                let _ = writeln!(self, "\t.byte {}", bits as u8);
            }
            2 => {
                let _ = writeln!(self, "\t.short {}", bits as u16);
            }
            4 => {
                let _ = writeln!(self, "\t.long {}", bits as u32);
            }
            8 => {
                let _ = writeln!(self, "\t.quad {}", bits);
            }
            n => panic!("can not dump a {} byte initializer", n),
        }
    }
}

/// One byte of a global's initial value.
#[derive(Clone, Debug)]
enum InitVal {
    /// Zero.
    Empty,
    /// First byte of a multi-byte constant.
    Tv { tv: TarVal, size: u32 },
    /// First byte of an address.
    Ref { ent: Entity, offset: i32, size: u32 },
    /// A byte assembled from bitfield pieces.
    Byte(u8),
    /// Interior byte of a multi-byte value.
    Occupied,
}

/// The emitted size: the type's extent, or the initializer's when the type
/// has a flexible tail.
fn data_size(ty: &DataType, init: Option<&Initializer>) -> u32 {
    match (ty, init) {
        (DataType::Array { elem, len: None }, Some(Initializer::Compound(elems))) => {
            elem.size() * elems.len() as u32
        }
        _ => ty.size(),
    }
}

fn natural_alignment(ty: &DataType) -> u32 {
    match ty {
        DataType::Scalar(mode) => mode.bytes().min(8),
        DataType::Array { elem, .. } => natural_alignment(elem),
        DataType::Struct { .. } => 4,
    }
}

/// If the entity is a printable NUL-terminated char array, its bytes.
fn string_bytes(ty: &DataType, init: &Initializer) -> Option<Vec<u8>> {
    let elem_ok = match ty {
        DataType::Array { elem, .. } => matches!(**elem, DataType::Scalar(m) if m.bits() == 8),
        _ => false,
    };
    if !elem_ok {
        return None;
    }
    let elems = match init {
        Initializer::Compound(elems) => elems,
        _ => return None,
    };
    let mut bytes = Vec::with_capacity(elems.len());
    for e in elems {
        match e {
            Initializer::Tarval(tv) => bytes.push(tv.bits() as u8),
            Initializer::Null => bytes.push(0),
            _ => return None,
        }
    }
    // Terminated by exactly one NUL, everything before printable or
    // whitespace.
    if bytes.last() != Some(&0) {
        return None;
    }
    if !bytes[..bytes.len() - 1]
        .iter()
        .all(|&b| b != 0 && (b.is_ascii_graphic() || b == b' ' || b.is_ascii_whitespace()))
    {
        return None;
    }
    Some(bytes)
}

/// Stamp `init` over the byte map starting at `offset`.
fn stamp(
    vals: &mut [InitVal],
    offset: u32,
    ty: &DataType,
    init: &Initializer,
    symbols: &SymbolTable,
) {
    match (ty, init) {
        (_, Initializer::Null) => {}
        (DataType::Scalar(mode), Initializer::Tarval(tv)) => {
            place(vals, offset, InitVal::Tv { tv: *tv, size: mode.bytes() }, mode.bytes());
        }
        (DataType::Scalar(mode), Initializer::EntityRef { ent, offset: eoff }) => {
            place(
                vals,
                offset,
                InitVal::Ref {
                    ent: *ent,
                    offset: *eoff,
                    size: mode.bytes(),
                },
                mode.bytes(),
            );
        }
        (DataType::Array { elem, .. }, Initializer::Compound(elems)) => {
            let esize = elem.size();
            for (i, e) in elems.iter().enumerate() {
                stamp(vals, offset + i as u32 * esize, elem, e, symbols);
            }
        }
        (DataType::Struct { fields, .. }, Initializer::Compound(elems)) => {
            for (field, e) in fields.iter().zip(elems.iter()) {
                match field.bits {
                    None => stamp(vals, offset + field.offset, &field.ty, e, symbols),
                    Some((bit_offset, bit_size)) => {
                        stamp_bitfield(vals, offset + field.offset, bit_offset, bit_size, e)
                    }
                }
            }
        }
        (ty, init) => panic!("initializer {:?} does not fit type {:?}", init, ty),
    }
}

fn place(vals: &mut [InitVal], offset: u32, val: InitVal, size: u32) {
    let offset = offset as usize;
    vals[offset] = val;
    for i in 1..size as usize {
        vals[offset + i] = InitVal::Occupied;
    }
}

/// OR the bitfield value into the byte map; several bitfields may share a
/// byte.
fn stamp_bitfield(
    vals: &mut [InitVal],
    byte_offset: u32,
    bit_offset: u32,
    bit_size: u32,
    init: &Initializer,
) {
    let value = match init {
        Initializer::Tarval(tv) => tv.as_u64(),
        Initializer::Null => 0,
        _ => panic!("bitfield initialized with {:?}", init),
    };
    let mask = if bit_size >= 64 {
        !0
    } else {
        (1u64 << bit_size) - 1
    };
    let value = value & mask;
    let mut remaining = bit_size as i64;
    let mut bit = bit_offset;
    let mut byte = byte_offset;
    let mut val = value;
    while remaining > 0 {
        let in_byte = (8 - bit % 8).min(remaining as u32);
        let piece = ((val & ((1u64 << in_byte) - 1)) as u8) << (bit % 8);
        let old = match vals[byte as usize] {
            InitVal::Byte(b) => b,
            InitVal::Empty => 0,
            _ => panic!("bitfield overlaps a scalar initializer"),
        };
        vals[byte as usize] = InitVal::Byte(old | piece);
        val >>= in_byte;
        remaining -= in_byte as i64;
        bit = 0;
        byte += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{EntityData, Field};

    fn table_with(kind: EntityKind, name: &str, vis: Visibility) -> (SymbolTable, Entity) {
        let mut st = SymbolTable::new();
        let e = st.define(EntityData {
            name: name.to_string(),
            visibility: vis,
            alignment: 0,
            kind,
        });
        (st, e)
    }

    #[test]
    fn scalar_global() {
        let (st, e) = table_with(
            EntityKind::Global {
                ty: DataType::Scalar(Mode::I32),
                init: Some(Initializer::Tarval(TarVal::new(Mode::I32, -5))),
                readonly: false,
                tls: false,
            },
            "counter",
            Visibility::Global,
        );
        let mut em = GasEmitter::new(ObjectFormat::Elf);
        em.emit_global(&st, e);
        assert!(em.buf.contains(".section\t.data"));
        assert!(em.buf.contains(".globl counter"));
        assert!(em.buf.contains("counter:"));
        assert!(em.buf.contains(&format!("\t.long {}", (-5i32) as u32)));
    }

    #[test]
    fn string_constant() {
        let bytes: Vec<Initializer> = b"hi\n\0"
            .iter()
            .map(|&b| Initializer::Tarval(TarVal::new(Mode::U8, b as i64)))
            .collect();
        let (st, e) = table_with(
            EntityKind::Global {
                ty: DataType::Array {
                    elem: Box::new(DataType::Scalar(Mode::U8)),
                    len: Some(4),
                },
                init: Some(Initializer::Compound(bytes)),
                readonly: true,
                tls: false,
            },
            "msg",
            Visibility::Local,
        );
        let mut em = GasEmitter::new(ObjectFormat::Elf);
        em.emit_global(&st, e);
        assert!(em.buf.contains(".section\t.rodata"));
        assert!(em.buf.contains("\t.string \"hi\\n\""));
    }

    #[test]
    fn bitfields_share_bytes() {
        // struct { unsigned a:4; unsigned b:4; } x = { 0x3, 0xa };
        let ty = DataType::Struct {
            size: 4,
            fields: vec![
                Field {
                    offset: 0,
                    ty: DataType::Scalar(Mode::U32),
                    bits: Some((0, 4)),
                },
                Field {
                    offset: 0,
                    ty: DataType::Scalar(Mode::U32),
                    bits: Some((4, 4)),
                },
            ],
        };
        let init = Initializer::Compound(vec![
            Initializer::Tarval(TarVal::new(Mode::U32, 0x3)),
            Initializer::Tarval(TarVal::new(Mode::U32, 0xa)),
        ]);
        let (st, e) = table_with(
            EntityKind::Global {
                ty,
                init: Some(init),
                readonly: false,
                tls: false,
            },
            "bf",
            Visibility::Local,
        );
        let mut em = GasEmitter::new(ObjectFormat::Elf);
        em.emit_global(&st, e);
        assert!(em.buf.contains("\t.byte 163"));
        assert!(em.buf.contains("\t.space 3"));
    }

    #[test]
    fn uninitialized_global_becomes_comm() {
        let (st, e) = table_with(
            EntityKind::Global {
                ty: DataType::Scalar(Mode::I32),
                init: None,
                readonly: false,
                tls: false,
            },
            "zeroed",
            Visibility::Global,
        );
        let mut em = GasEmitter::new(ObjectFormat::Elf);
        em.emit_global(&st, e);
        assert!(em.buf.contains("\t.comm zeroed,4,4"));
    }

    #[test]
    fn mach_o_pic_indirection() {
        let mut st = SymbolTable::new();
        let callee = st.declare_function("printf");
        let global = st.define(EntityData {
            name: "state".to_string(),
            visibility: Visibility::Global,
            alignment: 0,
            kind: EntityKind::Global {
                ty: DataType::Scalar(Mode::U32),
                init: None,
                readonly: false,
                tls: false,
            },
        });
        let stub = st.pic_trampoline(callee);
        let ptr = st.pic_symbol(global);
        assert_eq!(st.name(stub), "Lprintf$stub");
        assert_eq!(st.name(ptr), "Lstate$non_lazy_ptr");
        // The entries are deduplicated per target.
        assert_eq!(st.pic_trampoline(callee), stub);

        let mut em = GasEmitter::new(ObjectFormat::MachO);
        em.emit_globals(&st);
        assert!(em
            .buf
            .contains(".section\t__IMPORT,__jump_table,symbol_stubs,self_modifying_code+pure_instructions,5"));
        assert!(em
            .buf
            .contains(".section\t__IMPORT,__pointers,non_lazy_symbol_pointers"));
        assert!(em.buf.contains("Lprintf$stub:"));
        assert!(em.buf.contains("\t.indirect_symbol printf"));
        assert!(em.buf.contains("\thlt ; hlt ; hlt ; hlt ; hlt"));
        assert!(em.buf.contains("Lstate$non_lazy_ptr:"));
        assert!(em.buf.contains("\t.indirect_symbol state"));
        assert!(em.buf.contains("\t.long 0"));
        assert!(em.buf.ends_with("\t.subsections_via_symbols\n"));
    }

    #[test]
    fn flexible_array_sized_by_initializer() {
        let elems: Vec<Initializer> = (0..3)
            .map(|i| Initializer::Tarval(TarVal::new(Mode::U16, i)))
            .collect();
        let (st, e) = table_with(
            EntityKind::Global {
                ty: DataType::Array {
                    elem: Box::new(DataType::Scalar(Mode::U16)),
                    len: None,
                },
                init: Some(Initializer::Compound(elems)),
                readonly: false,
                tls: false,
            },
            "flex",
            Visibility::Local,
        );
        let mut em = GasEmitter::new(ObjectFormat::Elf);
        em.emit_global(&st, e);
        assert!(em.buf.contains("\t.short 0"));
        assert!(em.buf.contains("\t.short 1"));
        assert!(em.buf.contains("\t.short 2"));
    }
}
