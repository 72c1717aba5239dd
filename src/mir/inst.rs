//! Machine instructions and the pseudo instructions the selector emits.

use crate::mir::{BlockId, FrameIndex, Operand, Register};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;

/// A target-defined opcode number.
///
/// Each target defines its own `#[repr(u16)]` opcode enum and converts it
/// through this newtype; the target-agnostic passes never interpret the
/// value and route every query through the target's instruction adapter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TargetOpcode(
    /// The raw opcode number.
    pub u16,
);

/// A real (non-pseudo) machine instruction: an opcode plus its operand
/// slots. Which leading slots are defs is target-specific and queried
/// through the instruction adapter.
#[derive(Clone, PartialEq, Debug)]
pub struct TargetInst {
    /// The target opcode.
    pub op: TargetOpcode,
    /// Ordered operand slots, defs first.
    pub operands: SmallVec<[Operand; 4]>,
}

/// A φ pseudo instruction.
///
/// Invariant: the key set of `incoming` equals the predecessor set of the
/// enclosing block, and all sources share the destination's type. φ
/// elimination checks the former and fails compilation on disagreement.
#[derive(Clone, PartialEq, Debug)]
pub struct PhiInst {
    /// The register all incoming values merge into.
    pub dst: Register,
    /// Incoming value per predecessor block.
    pub incoming: BTreeMap<BlockId, Operand>,
}

/// The payload of a machine instruction.
#[derive(Clone, PartialEq, Debug)]
pub enum InstKind {
    /// No operation.
    Nop,
    /// SSA merge point; removed by φ elimination.
    Phi(PhiInst),
    /// Pseudo move, materialized into a target move late in the pipeline.
    Move {
        /// Destination operand (a register in well-formed code).
        dst: Operand,
        /// Source operand.
        src: Operand,
    },
    /// Load from a numbered frame slot (FILoad); materialized by frame
    /// lowering once slot offsets are fixed.
    FrameLoad {
        /// Register to load into.
        dst: Register,
        /// The slot to load from.
        slot: FrameIndex,
    },
    /// Store to a numbered frame slot (FIStore).
    FrameStore {
        /// Register to store.
        src: Register,
        /// The slot to store to.
        slot: FrameIndex,
    },
    /// Materialize the address of a frame slot (`dst ← sp + offset(slot)`).
    FrameAddr {
        /// Register receiving the address.
        dst: Register,
        /// The addressed slot.
        slot: FrameIndex,
    },
    /// A target instruction.
    Target(TargetInst),
}

/// A machine instruction: kind, optional comment, and a stable id assigned
/// by the owning function.
#[derive(Clone, PartialEq, Debug)]
pub struct MInst {
    /// Stable instruction id, unique within the function.
    pub id: u32,
    /// The instruction payload.
    pub kind: InstKind,
    /// Optional comment carried into the assembly output.
    pub comment: Option<String>,
}

impl MInst {
    /// Create an instruction with no comment. The id is assigned when the
    /// instruction is attached to a function.
    pub fn new(kind: InstKind) -> Self {
        Self { id: 0, kind, comment: None }
    }

    /// Create a target instruction from an opcode and operands.
    pub fn target(op: TargetOpcode, operands: impl IntoIterator<Item = Operand>) -> Self {
        Self::new(InstKind::Target(TargetInst {
            op,
            operands: operands.into_iter().collect(),
        }))
    }

    /// Attach a comment, builder-style.
    pub fn comment(mut self, text: impl Into<String>) -> Self {
        self.comment = Some(text.into());
        self
    }

    /// Is this a φ pseudo?
    pub fn is_phi(&self) -> bool {
        matches!(self.kind, InstKind::Phi(_))
    }

    /// Is this any pseudo instruction (not a target instruction)?
    pub fn is_pseudo(&self) -> bool {
        !matches!(self.kind, InstKind::Target(_))
    }
}

impl fmt::Display for MInst {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            InstKind::Nop => f.write_str("nop"),
            InstKind::Phi(phi) => {
                write!(f, "{} = phi", phi.dst)?;
                for (pred, src) in &phi.incoming {
                    write!(f, " [{pred}: {src}]")?;
                }
                Ok(())
            }
            InstKind::Move { dst, src } => write!(f, "MOVE {dst}, {src}"),
            InstKind::FrameLoad { dst, slot } => write!(f, "FILoad {dst}, {slot}"),
            InstKind::FrameStore { src, slot } => write!(f, "FIStore {src}, {slot}"),
            InstKind::FrameAddr { dst, slot } => write!(f, "FIAddr {dst}, {slot}"),
            InstKind::Target(inst) => {
                write!(f, "t{}", inst.op.0)?;
                for (i, operand) in inst.operands.iter().enumerate() {
                    write!(f, "{} {operand}", if i == 0 { "" } else { "," })?;
                }
                Ok(())
            }
        }
    }
}

/// Create a pseudo `MOVE dst ← src`.
pub fn create_move(dst: Operand, src: Operand) -> MInst {
    MInst::new(InstKind::Move { dst, src })
}

/// Create a pseudo move of an integer immediate.
pub fn create_move_imm(dst: Operand, imm: i32) -> MInst {
    MInst::new(InstKind::Move { dst, src: Operand::Imm(i64::from(imm)) })
}

/// Create a pseudo move of a float immediate.
pub fn create_move_fimm(dst: Operand, imm: f32) -> MInst {
    MInst::new(InstKind::Move { dst, src: Operand::FpImm(imm) })
}
