//! Target-independent ABI types.
//!
//! Parameter placement, the between-type separating outgoing arguments from
//! the local frame, and the callee-save bookkeeping are shared between the
//! targets; each target's `abi` module fills in the concrete registers and
//! sizes.

use crate::ir::Mode;
use crate::regs::Register;

/// The calling conventions the back-end knows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallConv {
    /// All parameters on the stack, caller cleans up.
    Cdecl,
    /// The first few integer parameters in registers, rest on the stack.
    RegParam,
    /// Variadic: like cdecl, everything on the stack.
    Variadic,
}

/// Where one parameter or result lives.
#[derive(Clone, Copy, Debug)]
pub enum ArgLoc {
    /// In the given register.
    Reg(&'static Register),
    /// On the stack at the given byte offset from the incoming stack
    /// pointer (past the between-type).
    Stack(i32),
}

/// Placement of all parameters and results of one signature.
#[derive(Debug)]
pub struct CallPlacement {
    /// One location per parameter.
    pub params: Vec<ArgLoc>,
    /// Bytes of outgoing stack arguments (already aligned).
    pub stack_bytes: u32,
    /// One location per result; two entries describe a 64-bit split pair
    /// (low half first).
    pub results: Vec<ArgLoc>,
    /// Bytes the callee pops on return (stdcall-style), 0 for the common
    /// conventions.
    pub callee_pop: u32,
}

/// The layout between the outgoing arguments and the local frame: the
/// return address pushed by the call, optionally preceded by the saved
/// frame pointer.
#[derive(Clone, Copy, Debug)]
pub struct BetweenType {
    /// Is the old frame pointer saved (i.e. frame pointer not omitted)?
    pub saved_fp: bool,
    /// Size of one slot (the pointer size) in bytes.
    pub slot_size: u32,
}

impl BetweenType {
    /// Total size in bytes.
    pub fn size(&self) -> u32 {
        if self.saved_fp {
            2 * self.slot_size
        } else {
            self.slot_size
        }
    }

    /// Offset of the return address slot relative to the frame base.
    pub fn ret_addr_offset(&self) -> i32 {
        if self.saved_fp {
            self.slot_size as i32
        } else {
            0
        }
    }
}

/// A function signature as far as the ABI cares: parameter and result
/// modes plus the convention.
#[derive(Clone, Debug)]
pub struct AbiSignature {
    /// The calling convention.
    pub call_conv: CallConv,
    /// Parameter modes, in order.
    pub params: Vec<Mode>,
    /// Result modes (at most one for the current targets, two for 64-bit
    /// splits).
    pub results: Vec<Mode>,
}

impl AbiSignature {
    /// A cdecl signature.
    pub fn cdecl(params: Vec<Mode>, results: Vec<Mode>) -> AbiSignature {
        AbiSignature {
            call_conv: CallConv::Cdecl,
            params,
            results,
        }
    }
}
