//! arm register definitions.

use crate::ir::Mode;
use crate::regs::{RegClass, RegClassId, Register, RegisterKind};

/// The general purpose register class.
pub const CLASS_GP: RegClassId = 0;
/// The float register class (fpa f-registers or vfp s/d-registers).
pub const CLASS_FP: RegClassId = 1;
/// The condition code class.
pub const CLASS_FLAGS: RegClassId = 2;

static GP_REGS: [Register; 16] = [
    Register { name: "r0", class: CLASS_GP, index: 0, kind: RegisterKind::Normal },
    Register { name: "r1", class: CLASS_GP, index: 1, kind: RegisterKind::Normal },
    Register { name: "r2", class: CLASS_GP, index: 2, kind: RegisterKind::Normal },
    Register { name: "r3", class: CLASS_GP, index: 3, kind: RegisterKind::Normal },
    Register { name: "r4", class: CLASS_GP, index: 4, kind: RegisterKind::Normal },
    Register { name: "r5", class: CLASS_GP, index: 5, kind: RegisterKind::Normal },
    Register { name: "r6", class: CLASS_GP, index: 6, kind: RegisterKind::Normal },
    Register { name: "r7", class: CLASS_GP, index: 7, kind: RegisterKind::Normal },
    Register { name: "r8", class: CLASS_GP, index: 8, kind: RegisterKind::Normal },
    Register { name: "r9", class: CLASS_GP, index: 9, kind: RegisterKind::Normal },
    Register { name: "r10", class: CLASS_GP, index: 10, kind: RegisterKind::Normal },
    Register { name: "fp", class: CLASS_GP, index: 11, kind: RegisterKind::Ignore },
    Register { name: "ip", class: CLASS_GP, index: 12, kind: RegisterKind::Normal },
    Register { name: "sp", class: CLASS_GP, index: 13, kind: RegisterKind::Ignore },
    Register { name: "lr", class: CLASS_GP, index: 14, kind: RegisterKind::Ignore },
    Register { name: "pc", class: CLASS_GP, index: 15, kind: RegisterKind::Ignore },
];

static FP_REGS: [Register; 8] = [
    Register { name: "f0", class: CLASS_FP, index: 0, kind: RegisterKind::Normal },
    Register { name: "f1", class: CLASS_FP, index: 1, kind: RegisterKind::Normal },
    Register { name: "f2", class: CLASS_FP, index: 2, kind: RegisterKind::Normal },
    Register { name: "f3", class: CLASS_FP, index: 3, kind: RegisterKind::Normal },
    Register { name: "f4", class: CLASS_FP, index: 4, kind: RegisterKind::Normal },
    Register { name: "f5", class: CLASS_FP, index: 5, kind: RegisterKind::Normal },
    Register { name: "f6", class: CLASS_FP, index: 6, kind: RegisterKind::Normal },
    Register { name: "f7", class: CLASS_FP, index: 7, kind: RegisterKind::Normal },
];

static FLAGS_REGS: [Register; 1] = [Register {
    name: "cpsr",
    class: CLASS_FLAGS,
    index: 0,
    kind: RegisterKind::Normal,
}];

/// The register classes of the arm target.
pub static CLASSES: [RegClass; 3] = [
    RegClass { name: "arm_gp", mode: Mode::U32, regs: &GP_REGS },
    RegClass { name: "arm_fp", mode: Mode::F64, regs: &FP_REGS },
    RegClass { name: "arm_flags", mode: Mode::Flags, regs: &FLAGS_REGS },
];

/// Get a reference to a gp register by index.
pub fn gp_reg(index: u8) -> &'static Register {
    &GP_REGS[index as usize]
}

/// Get a reference to the stack pointer (r13).
pub fn sp_reg() -> &'static Register {
    &GP_REGS[13]
}

/// Get a reference to the link register (r14).
pub fn lr_reg() -> &'static Register {
    &GP_REGS[14]
}
