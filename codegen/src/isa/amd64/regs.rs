//! amd64 register definitions.

use crate::ir::Mode;
use crate::regs::{RegClass, RegClassId, Register, RegisterKind};

/// The general purpose register class.
pub const CLASS_GP: RegClassId = 0;
/// The SSE register class.
pub const CLASS_XMM: RegClassId = 1;
/// The condition code class.
pub const CLASS_FLAGS: RegClassId = 2;

/// rax's index in the gp class.
pub const REG_RAX: u8 = 0;
/// rcx's index.
pub const REG_RCX: u8 = 1;
/// rdx's index.
pub const REG_RDX: u8 = 2;
/// rsp's index.
pub const REG_RSP: u8 = 4;
/// rdi's index.
pub const REG_RDI: u8 = 7;
/// rsi's index.
pub const REG_RSI: u8 = 6;
/// The virtual noreg's index.
pub const REG_NOREG: u8 = 16;

static GP_REGS: [Register; 17] = [
    Register { name: "rax", class: CLASS_GP, index: 0, kind: RegisterKind::Normal },
    Register { name: "rcx", class: CLASS_GP, index: 1, kind: RegisterKind::Normal },
    Register { name: "rdx", class: CLASS_GP, index: 2, kind: RegisterKind::Normal },
    Register { name: "rbx", class: CLASS_GP, index: 3, kind: RegisterKind::Normal },
    Register { name: "rsp", class: CLASS_GP, index: 4, kind: RegisterKind::Ignore },
    Register { name: "rbp", class: CLASS_GP, index: 5, kind: RegisterKind::Ignore },
    Register { name: "rsi", class: CLASS_GP, index: 6, kind: RegisterKind::Normal },
    Register { name: "rdi", class: CLASS_GP, index: 7, kind: RegisterKind::Normal },
    Register { name: "r8", class: CLASS_GP, index: 8, kind: RegisterKind::Normal },
    Register { name: "r9", class: CLASS_GP, index: 9, kind: RegisterKind::Normal },
    Register { name: "r10", class: CLASS_GP, index: 10, kind: RegisterKind::Normal },
    Register { name: "r11", class: CLASS_GP, index: 11, kind: RegisterKind::Normal },
    Register { name: "r12", class: CLASS_GP, index: 12, kind: RegisterKind::Normal },
    Register { name: "r13", class: CLASS_GP, index: 13, kind: RegisterKind::Normal },
    Register { name: "r14", class: CLASS_GP, index: 14, kind: RegisterKind::Normal },
    Register { name: "r15", class: CLASS_GP, index: 15, kind: RegisterKind::Normal },
    Register { name: "gp_NOREG", class: CLASS_GP, index: 16, kind: RegisterKind::Virtual },
];

static XMM_REGS: [Register; 17] = [
    Register { name: "xmm0", class: CLASS_XMM, index: 0, kind: RegisterKind::Normal },
    Register { name: "xmm1", class: CLASS_XMM, index: 1, kind: RegisterKind::Normal },
    Register { name: "xmm2", class: CLASS_XMM, index: 2, kind: RegisterKind::Normal },
    Register { name: "xmm3", class: CLASS_XMM, index: 3, kind: RegisterKind::Normal },
    Register { name: "xmm4", class: CLASS_XMM, index: 4, kind: RegisterKind::Normal },
    Register { name: "xmm5", class: CLASS_XMM, index: 5, kind: RegisterKind::Normal },
    Register { name: "xmm6", class: CLASS_XMM, index: 6, kind: RegisterKind::Normal },
    Register { name: "xmm7", class: CLASS_XMM, index: 7, kind: RegisterKind::Normal },
    Register { name: "xmm8", class: CLASS_XMM, index: 8, kind: RegisterKind::Normal },
    Register { name: "xmm9", class: CLASS_XMM, index: 9, kind: RegisterKind::Normal },
    Register { name: "xmm10", class: CLASS_XMM, index: 10, kind: RegisterKind::Normal },
    Register { name: "xmm11", class: CLASS_XMM, index: 11, kind: RegisterKind::Normal },
    Register { name: "xmm12", class: CLASS_XMM, index: 12, kind: RegisterKind::Normal },
    Register { name: "xmm13", class: CLASS_XMM, index: 13, kind: RegisterKind::Normal },
    Register { name: "xmm14", class: CLASS_XMM, index: 14, kind: RegisterKind::Normal },
    Register { name: "xmm15", class: CLASS_XMM, index: 15, kind: RegisterKind::Normal },
    Register { name: "xmm_NOREG", class: CLASS_XMM, index: 16, kind: RegisterKind::Virtual },
];

static FLAGS_REGS: [Register; 1] = [Register {
    name: "rflags",
    class: CLASS_FLAGS,
    index: 0,
    kind: RegisterKind::Normal,
}];

/// The register classes of the amd64 target.
pub static CLASSES: [RegClass; 3] = [
    RegClass { name: "amd64_gp", mode: Mode::U64, regs: &GP_REGS },
    RegClass { name: "amd64_xmm", mode: Mode::F64, regs: &XMM_REGS },
    RegClass { name: "amd64_flags", mode: Mode::Flags, regs: &FLAGS_REGS },
];

/// Get a reference to a gp register by index.
pub fn gp_reg(index: u8) -> &'static Register {
    &GP_REGS[index as usize]
}

/// Get a reference to the virtual noreg.
pub fn noreg() -> &'static Register {
    &GP_REGS[REG_NOREG as usize]
}

/// Get a reference to the stack pointer.
pub fn rsp_reg() -> &'static Register {
    &GP_REGS[REG_RSP as usize]
}

/// The System V integer argument registers, in order.
pub fn arg_regs() -> [&'static Register; 6] {
    [
        &GP_REGS[REG_RDI as usize],
        &GP_REGS[REG_RSI as usize],
        &GP_REGS[REG_RDX as usize],
        &GP_REGS[REG_RCX as usize],
        &GP_REGS[8],
        &GP_REGS[9],
    ]
}
