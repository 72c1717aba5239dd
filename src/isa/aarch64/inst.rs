//! AArch64 opcodes, mnemonics, and operand shapes.
//!
//! Every opcode maps to a mnemonic and an [`OperandShape`]. The shape is
//! the single source of truth for an instruction's operand layout: the
//! adapter derives def/use partitions from it and the emitter derives the
//! assembly format from it.

use crate::ssa::IcmpCond;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// AArch64 machine opcodes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum A64Op {
    /// Integer add.
    Add,
    /// Integer subtract.
    Sub,
    /// Integer multiply.
    Mul,
    /// Signed divide.
    SDiv,
    /// Unsigned divide.
    UDiv,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Orr,
    /// Bitwise exclusive or.
    Eor,
    /// Logical shift left.
    Lsl,
    /// Logical shift right.
    Lsr,
    /// Float add.
    FAdd,
    /// Float subtract.
    FSub,
    /// Float multiply.
    FMul,
    /// Float divide.
    FDiv,
    /// Integer compare.
    Cmp,
    /// Integer compare with immediate.
    CmpImm,
    /// Float compare.
    FCmp,
    /// Materialize a condition flag as 0/1.
    CSet,
    /// Register move.
    Mov,
    /// Move immediate into a register.
    MovImm,
    /// Float register move.
    FMov,
    /// Float immediate move.
    FMovImm,
    /// Load through a register address.
    Ldr,
    /// Store through a register address.
    Str,
    /// Load from `[sp, #offset]`.
    LdrSp,
    /// Store to `[sp, #offset]`.
    StrSp,
    /// `add dst, sp, #offset` — materialize a frame address.
    AddSpImm,
    /// `sub sp, sp, #imm` — open the frame.
    SpSub,
    /// `add sp, sp, #imm` — close the frame.
    SpAdd,
    /// Page address of a symbol.
    Adrp,
    /// Low 12 bits of a symbol address.
    AddLo12,
    /// Unconditional branch.
    B,
    /// Conditional branch.
    BCond,
    /// Call.
    Bl,
    /// Return.
    Ret,
}

/// Operand layout codes: which slots an instruction has and which of them
/// are defs.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OperandShape {
    /// `op rd, rn, rm` — one def, two uses.
    ThreeReg,
    /// `op rd, rn` — one def, one use.
    TwoReg,
    /// `op rd, #imm` — one def.
    RegImm,
    /// `op rn, rm` — two uses, no defs.
    CmpReg,
    /// `op rn, #imm` — one use.
    CmpImm,
    /// `cset rd, cond` — one def plus a condition code.
    CSet,
    /// `ldr rd, [rn]` — def then address use.
    Load,
    /// `str rs, [rn]` — two uses.
    Store,
    /// `ldr rd, [sp, #imm]`.
    LoadSp,
    /// `str rs, [sp, #imm]`.
    StoreSp,
    /// `add rd, sp, #imm`.
    AddrSp,
    /// `op sp, sp, #imm` — stack adjustment, no tracked operands.
    SpAdj,
    /// `adrp rd, sym`.
    PageAddr,
    /// `add rd, rn, :lo12:sym`.
    PageOff,
    /// `b label`.
    Branch,
    /// `b.cond label` — condition code then label.
    CondBranch,
    /// `bl sym`.
    Call,
    /// `ret`.
    Ret,
}

impl A64Op {
    /// The assembly mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Add | Self::AddSpImm | Self::AddLo12 | Self::SpAdd => "add",
            Self::Sub | Self::SpSub => "sub",
            Self::Mul => "mul",
            Self::SDiv => "sdiv",
            Self::UDiv => "udiv",
            Self::And => "and",
            Self::Orr => "orr",
            Self::Eor => "eor",
            Self::Lsl => "lsl",
            Self::Lsr => "lsr",
            Self::FAdd => "fadd",
            Self::FSub => "fsub",
            Self::FMul => "fmul",
            Self::FDiv => "fdiv",
            Self::Cmp | Self::CmpImm => "cmp",
            Self::FCmp => "fcmp",
            Self::CSet => "cset",
            Self::Mov | Self::MovImm => "mov",
            Self::FMov | Self::FMovImm => "fmov",
            Self::Ldr | Self::LdrSp => "ldr",
            Self::Str | Self::StrSp => "str",
            Self::Adrp => "adrp",
            Self::B => "b",
            Self::BCond => "b",
            Self::Bl => "bl",
            Self::Ret => "ret",
        }
    }

    /// The operand shape.
    pub fn shape(self) -> OperandShape {
        match self {
            Self::Add
            | Self::Sub
            | Self::Mul
            | Self::SDiv
            | Self::UDiv
            | Self::And
            | Self::Orr
            | Self::Eor
            | Self::Lsl
            | Self::Lsr
            | Self::FAdd
            | Self::FSub
            | Self::FMul
            | Self::FDiv => OperandShape::ThreeReg,
            Self::Cmp | Self::FCmp => OperandShape::CmpReg,
            Self::CmpImm => OperandShape::CmpImm,
            Self::CSet => OperandShape::CSet,
            Self::Mov | Self::FMov => OperandShape::TwoReg,
            Self::MovImm | Self::FMovImm => OperandShape::RegImm,
            Self::Ldr => OperandShape::Load,
            Self::Str => OperandShape::Store,
            Self::LdrSp => OperandShape::LoadSp,
            Self::StrSp => OperandShape::StoreSp,
            Self::AddSpImm => OperandShape::AddrSp,
            Self::SpSub | Self::SpAdd => OperandShape::SpAdj,
            Self::Adrp => OperandShape::PageAddr,
            Self::AddLo12 => OperandShape::PageOff,
            Self::B => OperandShape::Branch,
            Self::BCond => OperandShape::CondBranch,
            Self::Bl => OperandShape::Call,
            Self::Ret => OperandShape::Ret,
        }
    }

    /// How many leading operand slots are defs.
    pub fn num_defs(self) -> usize {
        match self.shape() {
            OperandShape::ThreeReg
            | OperandShape::TwoReg
            | OperandShape::RegImm
            | OperandShape::CSet
            | OperandShape::Load
            | OperandShape::LoadSp
            | OperandShape::AddrSp
            | OperandShape::PageAddr
            | OperandShape::PageOff => 1,
            _ => 0,
        }
    }
}

/// AArch64 condition codes, carried as an immediate operand of `b.cond`
/// and `cset`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum Cond {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Signed less than.
    Lt,
    /// Signed greater than.
    Gt,
    /// Signed less than or equal.
    Le,
    /// Signed greater than or equal.
    Ge,
    /// Unsigned lower.
    Lo,
    /// Unsigned higher.
    Hi,
    /// Unsigned lower or same.
    Ls,
    /// Unsigned higher or same.
    Hs,
}

impl Cond {
    /// The condition suffix used in assembly (`b.lt`, `cset w0, lt`).
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Gt => "gt",
            Self::Le => "le",
            Self::Ge => "ge",
            Self::Lo => "lo",
            Self::Hi => "hi",
            Self::Ls => "ls",
            Self::Hs => "hs",
        }
    }

    /// Translate an IR predicate.
    pub fn from_icmp(cond: IcmpCond) -> Self {
        match cond {
            IcmpCond::Eq => Self::Eq,
            IcmpCond::Ne => Self::Ne,
            IcmpCond::Slt => Self::Lt,
            IcmpCond::Sgt => Self::Gt,
            IcmpCond::Sle => Self::Le,
            IcmpCond::Sge => Self::Ge,
            IcmpCond::Ult => Self::Lo,
            IcmpCond::Ugt => Self::Hi,
            IcmpCond::Ule => Self::Ls,
            IcmpCond::Uge => Self::Hs,
        }
    }
}
