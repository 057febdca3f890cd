//! ia32 register definitions.

use crate::ir::Mode;
use crate::regs::{RegClass, RegClassId, Register, RegisterKind};

/// The general purpose register class.
pub const CLASS_GP: RegClassId = 0;
/// The SSE register class.
pub const CLASS_XMM: RegClassId = 1;
/// The virtual x87 register class (before stack simulation).
pub const CLASS_VFP: RegClassId = 2;
/// The condition code class.
pub const CLASS_FLAGS: RegClassId = 3;
/// The fpu control word class.
pub const CLASS_FPCW: RegClassId = 4;

/// eax's index in the gp class.
pub const REG_EAX: u8 = 0;
/// ecx's index in the gp class.
pub const REG_ECX: u8 = 1;
/// edx's index in the gp class.
pub const REG_EDX: u8 = 2;
/// ebx's index in the gp class.
pub const REG_EBX: u8 = 3;
/// esp's index in the gp class.
pub const REG_ESP: u8 = 4;
/// ebp's index in the gp class.
pub const REG_EBP: u8 = 5;
/// esi's index in the gp class.
pub const REG_ESI: u8 = 6;
/// edi's index in the gp class.
pub const REG_EDI: u8 = 7;
/// The virtual gp noreg's index.
pub const REG_GP_NOREG: u8 = 8;

static GP_REGS: [Register; 9] = [
    Register { name: "eax", class: CLASS_GP, index: 0, kind: RegisterKind::Normal },
    Register { name: "ecx", class: CLASS_GP, index: 1, kind: RegisterKind::Normal },
    Register { name: "edx", class: CLASS_GP, index: 2, kind: RegisterKind::Normal },
    Register { name: "ebx", class: CLASS_GP, index: 3, kind: RegisterKind::Normal },
    Register { name: "esp", class: CLASS_GP, index: 4, kind: RegisterKind::Ignore },
    Register { name: "ebp", class: CLASS_GP, index: 5, kind: RegisterKind::Ignore },
    Register { name: "esi", class: CLASS_GP, index: 6, kind: RegisterKind::Normal },
    Register { name: "edi", class: CLASS_GP, index: 7, kind: RegisterKind::Normal },
    Register { name: "gp_NOREG", class: CLASS_GP, index: 8, kind: RegisterKind::Virtual },
];

static XMM_REGS: [Register; 9] = [
    Register { name: "xmm0", class: CLASS_XMM, index: 0, kind: RegisterKind::Normal },
    Register { name: "xmm1", class: CLASS_XMM, index: 1, kind: RegisterKind::Normal },
    Register { name: "xmm2", class: CLASS_XMM, index: 2, kind: RegisterKind::Normal },
    Register { name: "xmm3", class: CLASS_XMM, index: 3, kind: RegisterKind::Normal },
    Register { name: "xmm4", class: CLASS_XMM, index: 4, kind: RegisterKind::Normal },
    Register { name: "xmm5", class: CLASS_XMM, index: 5, kind: RegisterKind::Normal },
    Register { name: "xmm6", class: CLASS_XMM, index: 6, kind: RegisterKind::Normal },
    Register { name: "xmm7", class: CLASS_XMM, index: 7, kind: RegisterKind::Normal },
    Register { name: "xmm_NOREG", class: CLASS_XMM, index: 8, kind: RegisterKind::Virtual },
];

static VFP_REGS: [Register; 9] = [
    Register { name: "vf0", class: CLASS_VFP, index: 0, kind: RegisterKind::Normal },
    Register { name: "vf1", class: CLASS_VFP, index: 1, kind: RegisterKind::Normal },
    Register { name: "vf2", class: CLASS_VFP, index: 2, kind: RegisterKind::Normal },
    Register { name: "vf3", class: CLASS_VFP, index: 3, kind: RegisterKind::Normal },
    Register { name: "vf4", class: CLASS_VFP, index: 4, kind: RegisterKind::Normal },
    Register { name: "vf5", class: CLASS_VFP, index: 5, kind: RegisterKind::Normal },
    Register { name: "vf6", class: CLASS_VFP, index: 6, kind: RegisterKind::Normal },
    Register { name: "vf7", class: CLASS_VFP, index: 7, kind: RegisterKind::Normal },
    Register { name: "vfp_NOREG", class: CLASS_VFP, index: 8, kind: RegisterKind::Virtual },
];

static FLAGS_REGS: [Register; 1] = [Register {
    name: "eflags",
    class: CLASS_FLAGS,
    index: 0,
    kind: RegisterKind::Normal,
}];

static FPCW_REGS: [Register; 1] = [Register {
    name: "fpcw",
    class: CLASS_FPCW,
    index: 0,
    kind: RegisterKind::State,
}];

/// The register classes of the ia32 target.
pub static CLASSES: [RegClass; 5] = [
    RegClass { name: "ia32_gp", mode: Mode::U32, regs: &GP_REGS },
    RegClass { name: "ia32_xmm", mode: Mode::F64, regs: &XMM_REGS },
    RegClass { name: "ia32_vfp", mode: Mode::X80, regs: &VFP_REGS },
    RegClass { name: "ia32_flags", mode: Mode::Flags, regs: &FLAGS_REGS },
    RegClass { name: "ia32_fpcw", mode: Mode::U16, regs: &FPCW_REGS },
];

/// Get a reference to a gp register by index.
pub fn gp_reg(index: u8) -> &'static Register {
    &GP_REGS[index as usize]
}

/// Get a reference to eax.
pub fn eax_reg() -> &'static Register {
    &GP_REGS[REG_EAX as usize]
}

/// Get a reference to ecx.
pub fn ecx_reg() -> &'static Register {
    &GP_REGS[REG_ECX as usize]
}

/// Get a reference to edx.
pub fn edx_reg() -> &'static Register {
    &GP_REGS[REG_EDX as usize]
}

/// Get a reference to the stack pointer.
pub fn esp_reg() -> &'static Register {
    &GP_REGS[REG_ESP as usize]
}

/// Get a reference to the frame pointer.
pub fn ebp_reg() -> &'static Register {
    &GP_REGS[REG_EBP as usize]
}

/// Get a reference to the virtual gp noreg.
pub fn gp_noreg() -> &'static Register {
    &GP_REGS[REG_GP_NOREG as usize]
}

/// Get a reference to an xmm register by index.
pub fn xmm_reg(index: u8) -> &'static Register {
    &XMM_REGS[index as usize]
}

/// Get a reference to the condition code register.
pub fn eflags_reg() -> &'static Register {
    &FLAGS_REGS[0]
}

/// Get a reference to the fpu control word.
pub fn fpcw_reg() -> &'static Register {
    &FPCW_REGS[0]
}

/// The 8-bit name of a gp register (`al` for `eax`).
pub fn reg_8bit_name(reg: &Register) -> &'static str {
    match reg.index {
        REG_EAX => "al",
        REG_EBX => "bl",
        REG_ECX => "cl",
        REG_EDX => "dl",
        _ => panic!("register {} has no 8-bit part", reg.name),
    }
}

/// The high 8-bit name of a gp register (`ah` for `eax`).
pub fn reg_8bit_high_name(reg: &Register) -> &'static str {
    match reg.index {
        REG_EAX => "ah",
        REG_EBX => "bh",
        REG_ECX => "ch",
        REG_EDX => "dh",
        _ => panic!("register {} has no high 8-bit part", reg.name),
    }
}

/// The 16-bit name of a gp register (`ax` for `eax`).
pub fn reg_16bit_name(reg: &Register) -> &'static str {
    match reg.index {
        REG_EAX => "ax",
        REG_EBX => "bx",
        REG_ECX => "cx",
        REG_EDX => "dx",
        REG_ESI => "si",
        REG_EDI => "di",
        REG_ESP => "sp",
        REG_EBP => "bp",
        _ => panic!("register {} has no 16-bit part", reg.name),
    }
}
