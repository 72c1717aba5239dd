//! AArch64 register definitions and AAPCS64 conventions.
//!
//! Physical register ids: `x0`–`x30` are 0–30, `sp` is 31, and the zero
//! register gets its own id 32 — XSP and XZR share a hardware encoding but
//! mean different things, so they are different registers here. The
//! floating-point bank starts at [`FPR_BASE`]: `d0`–`d31` are 64–95.

use crate::isa::TargetRegInfo;
use crate::mir::{DataType, Register, TypeWidth, I64};

/// First register unit of the floating-point bank.
pub const FPR_BASE: u32 = 64;

/// The stack pointer id.
pub const SP: u32 = 31;
/// The zero register id.
pub const XZR: u32 = 32;
/// The frame pointer (x29).
pub const FP: u32 = 29;
/// The link register (x30).
pub const LR: u32 = 30;

/// Get an X-register (integer register) carrying a value of type `ty`.
pub fn gpr(num: u32, ty: DataType) -> Register {
    debug_assert!(num < 31);
    Register::phys(num, ty)
}

/// Get a V-register (floating-point register) by bank offset.
pub fn fpr(num: u32, ty: DataType) -> Register {
    debug_assert!(num < 32);
    Register::phys(FPR_BASE + num, ty)
}

/// The stack pointer.
pub fn stack_reg() -> Register {
    Register::phys(SP, I64)
}

/// The link register.
pub fn link_reg() -> Register {
    Register::phys(LR, I64)
}

/// The zero register.
pub fn zero_reg(ty: DataType) -> Register {
    Register::phys(XZR, ty)
}

/// The assembly name of a physical register, width-sensitive: `w`/`x` for
/// the integer bank, `s`/`d` for the floating-point bank.
pub fn reg_name(reg: Register) -> String {
    debug_assert!(!reg.virt);
    match reg.id {
        SP => "sp".to_string(),
        XZR => match reg.ty.width {
            TypeWidth::B32 => "wzr".to_string(),
            TypeWidth::B64 => "xzr".to_string(),
        },
        id if id < 31 => match reg.ty.width {
            TypeWidth::B32 => format!("w{id}"),
            TypeWidth::B64 => format!("x{id}"),
        },
        id => {
            let offset = id - FPR_BASE;
            match reg.ty.width {
                TypeWidth::B32 => format!("s{offset}"),
                TypeWidth::B64 => format!("d{offset}"),
            }
        }
    }
}

// AAPCS64 conventions. x16/x17 are kept back as reload scratch, x18 is the
// platform register, x29/x30 frame and link.
const INT_ARGS: [u32; 8] = [0, 1, 2, 3, 4, 5, 6, 7];
const FLOAT_ARGS: [u32; 8] = [
    FPR_BASE,
    FPR_BASE + 1,
    FPR_BASE + 2,
    FPR_BASE + 3,
    FPR_BASE + 4,
    FPR_BASE + 5,
    FPR_BASE + 6,
    FPR_BASE + 7,
];
const CALLEE_SAVED_INT: [u32; 10] = [19, 20, 21, 22, 23, 24, 25, 26, 27, 28];
const CALLEE_SAVED_FLOAT: [u32; 8] = [
    FPR_BASE + 8,
    FPR_BASE + 9,
    FPR_BASE + 10,
    FPR_BASE + 11,
    FPR_BASE + 12,
    FPR_BASE + 13,
    FPR_BASE + 14,
    FPR_BASE + 15,
];
const RESERVED: [u32; 9] = [16, 17, 18, FP, LR, SP, XZR, FPR_BASE + 30, FPR_BASE + 31];
const INT_SCRATCH: [u32; 2] = [16, 17];
const FLOAT_SCRATCH: [u32; 2] = [FPR_BASE + 30, FPR_BASE + 31];

const INT_POOL: [u32; 26] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, // caller-saved
    19, 20, 21, 22, 23, 24, 25, 26, 27, 28, // callee-saved
];
const FLOAT_POOL: [u32; 30] = [
    FPR_BASE,
    FPR_BASE + 1,
    FPR_BASE + 2,
    FPR_BASE + 3,
    FPR_BASE + 4,
    FPR_BASE + 5,
    FPR_BASE + 6,
    FPR_BASE + 7,
    FPR_BASE + 8,
    FPR_BASE + 9,
    FPR_BASE + 10,
    FPR_BASE + 11,
    FPR_BASE + 12,
    FPR_BASE + 13,
    FPR_BASE + 14,
    FPR_BASE + 15,
    FPR_BASE + 16,
    FPR_BASE + 17,
    FPR_BASE + 18,
    FPR_BASE + 19,
    FPR_BASE + 20,
    FPR_BASE + 21,
    FPR_BASE + 22,
    FPR_BASE + 23,
    FPR_BASE + 24,
    FPR_BASE + 25,
    FPR_BASE + 26,
    FPR_BASE + 27,
    FPR_BASE + 28,
    FPR_BASE + 29,
];

/// Caller-saved registers clobbered by a call, in id order.
pub fn call_clobbers() -> impl Iterator<Item = u32> {
    (0..16)
        .chain((0..8).map(|i| FPR_BASE + i))
        .chain((16..30).map(|i| FPR_BASE + i))
}

/// AAPCS64 register conventions.
pub struct A64RegInfo;

impl TargetRegInfo for A64RegInfo {
    fn sp_reg(&self) -> u32 {
        SP
    }

    fn ra_reg(&self) -> u32 {
        LR
    }

    fn zero_reg(&self) -> u32 {
        XZR
    }

    fn int_arg_regs(&self) -> &[u32] {
        &INT_ARGS
    }

    fn float_arg_regs(&self) -> &[u32] {
        &FLOAT_ARGS
    }

    fn callee_saved_int_regs(&self) -> &[u32] {
        &CALLEE_SAVED_INT
    }

    fn callee_saved_float_regs(&self) -> &[u32] {
        &CALLEE_SAVED_FLOAT
    }

    fn reserved_regs(&self) -> &[u32] {
        &RESERVED
    }

    fn int_regs(&self) -> &[u32] {
        &INT_POOL
    }

    fn float_regs(&self) -> &[u32] {
        &FLOAT_POOL
    }

    fn int_scratch_regs(&self) -> &[u32] {
        &INT_SCRATCH
    }

    fn float_scratch_regs(&self) -> &[u32] {
        &FLOAT_SCRATCH
    }
}
