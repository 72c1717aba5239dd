//! Shared helpers for unit tests: compact constructors for the handful of
//! aarch64 instructions the pass tests keep building.

use crate::isa::aarch64::inst::{A64Op, Cond};
use crate::mir::{BlockId, MInst, Operand, Register, TargetOpcode};

pub fn target(op: A64Op, operands: impl IntoIterator<Item = Operand>) -> MInst {
    MInst::target(TargetOpcode(op.into()), operands)
}

/// `b label`
pub fn b(label: u32) -> MInst {
    target(A64Op::B, [Operand::Label(BlockId(label))])
}

/// `b.eq label`
pub fn bcond(label: u32) -> MInst {
    target(
        A64Op::BCond,
        [
            Operand::Imm(i64::from(u16::from(Cond::Eq))),
            Operand::Label(BlockId(label)),
        ],
    )
}

/// `ret`
pub fn ret() -> MInst {
    target(A64Op::Ret, [])
}

/// `bl sym`
pub fn bl(sym: &str) -> MInst {
    target(A64Op::Bl, [Operand::Sym(sym.to_string())])
}

/// `mov dst, src`
pub fn mov_rr(dst: Register, src: Register) -> MInst {
    target(A64Op::Mov, [Operand::Reg(dst), Operand::Reg(src)])
}

/// A three-register ALU instruction.
pub fn three_reg(op: A64Op, dst: Register, a: Register, b: Register) -> MInst {
    target(op, [Operand::Reg(dst), Operand::Reg(a), Operand::Reg(b)])
}
