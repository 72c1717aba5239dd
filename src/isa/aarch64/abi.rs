//! AArch64 stack and frame lowering.
//!
//! Runs after register allocation, when the set of spill slots and the
//! callee-saved registers actually written are both known. The frame grows
//! downward and is laid out, from the stack pointer up:
//!
//! ```text
//!   entry sp ──────────────────────────────┐
//!   │ link register save (if we call)      │
//!   │ callee-saved register saves          │
//!   │ spill slots                          │
//!   │ stack locals (allocas)               │
//!   │ outgoing call arguments              │
//!   sp after prologue ─────────────────────┘   total rounded to 16
//! ```
//!
//! Incoming stack parameters live in the caller's frame at
//! `[sp, total + 8k]`. This pass also materializes the frame pseudos
//! (`FILoad`/`FIStore`/frame-address) into `ldr`/`str`/`add` against their
//! assigned offsets, and lowers surviving pseudo moves into real moves.

use crate::isa::aarch64::inst::A64Op;
use crate::isa::aarch64::regs::{link_reg, FPR_BASE};
use crate::isa::{TargetInstrAdapter, TargetRegInfo};
use crate::mir::{
    Function, InstKind, MInst, Operand, Register, SlotKind, TargetInst, TargetOpcode, F64, I64,
};
use crate::result::{CodegenError, CodegenResult};
use log::debug;
use std::collections::BTreeSet;

/// Required stack alignment.
const STACK_ALIGN: u32 = 16;

fn align_to(value: u32, align: u32) -> u32 {
    (value + align - 1) & !(align - 1)
}

fn target(op: A64Op, operands: impl IntoIterator<Item = Operand>) -> MInst {
    MInst::target(TargetOpcode(op.into()), operands)
}

fn saved_reg(id: u32) -> Register {
    if id >= FPR_BASE {
        Register::phys(id, F64)
    } else {
        Register::phys(id, I64)
    }
}

/// Lower the frame of `func`: assign slot offsets, save callee-saved
/// registers, materialize frame pseudos, and emit prologue and epilogues.
pub fn lower_function(
    func: &mut Function,
    adapter: &dyn TargetInstrAdapter,
    reg_info: &dyn TargetRegInfo,
) -> CodegenResult<()> {
    let mut makes_calls = false;
    let mut saved: BTreeSet<u32> = BTreeSet::new();
    for block in func.blocks.values() {
        for inst in &block.insts {
            if adapter.is_call(inst) {
                makes_calls = true;
            }
            for def in adapter.defs(inst) {
                if !def.virt && reg_info.is_callee_saved(def.id) {
                    saved.insert(def.id);
                }
            }
        }
    }

    // Assign offsets from the post-prologue stack pointer up.
    let mut offset = align_to(func.max_outgoing, 8);
    let locals: Vec<_> = func
        .frame
        .slots()
        .filter(|(_, slot)| slot.kind == SlotKind::Local)
        .map(|(index, slot)| (index, slot.size))
        .collect();
    for (index, size) in locals {
        func.frame.set_offset(index, offset);
        offset += align_to(size, 8);
    }
    let spills: Vec<_> = func
        .frame
        .slots()
        .filter(|(_, slot)| slot.kind == SlotKind::Spill)
        .map(|(index, _)| index)
        .collect();
    for index in spills {
        func.frame.set_offset(index, offset);
        offset += 8;
    }
    let mut save_offsets = Vec::new();
    for &id in &saved {
        save_offsets.push((id, offset));
        offset += 8;
    }
    let lr_offset = makes_calls.then(|| {
        let at = offset;
        offset += 8;
        at
    });
    let total = align_to(offset, STACK_ALIGN);
    func.stack_size = total;

    let incoming: Vec<_> = func
        .frame
        .slots()
        .filter(|(_, slot)| slot.kind == SlotKind::IncomingArg)
        .map(|(index, _)| index)
        .collect();
    for (k, index) in incoming.into_iter().enumerate() {
        func.frame.set_offset(index, total + 8 * k as u32);
    }

    debug!(
        "frame for {}: total {total}, {} callee saves, lr {:?}",
        func.name,
        saved.len(),
        lr_offset
    );

    materialize_pseudos(func)?;

    // Prologue in the entry block; an epilogue before every return.
    let mut prologue = Vec::new();
    if total > 0 {
        prologue.push(target(A64Op::SpSub, [Operand::Imm(i64::from(total))]));
    }
    if let Some(at) = lr_offset {
        prologue.push(target(
            A64Op::StrSp,
            [Operand::Reg(link_reg()), Operand::Imm(i64::from(at))],
        ));
    }
    for &(id, at) in &save_offsets {
        prologue.push(target(
            A64Op::StrSp,
            [Operand::Reg(saved_reg(id)), Operand::Imm(i64::from(at))],
        ));
    }

    let mut epilogue = Vec::new();
    for &(id, at) in &save_offsets {
        epilogue.push(target(
            A64Op::LdrSp,
            [Operand::Reg(saved_reg(id)), Operand::Imm(i64::from(at))],
        ));
    }
    if let Some(at) = lr_offset {
        epilogue.push(target(
            A64Op::LdrSp,
            [Operand::Reg(link_reg()), Operand::Imm(i64::from(at))],
        ));
    }
    if total > 0 {
        epilogue.push(target(A64Op::SpAdd, [Operand::Imm(i64::from(total))]));
    }

    let block_ids: Vec<_> = func.blocks.keys().copied().collect();
    for id in block_ids {
        let ret_at = {
            let block = func.block(id).expect("block disappeared");
            block
                .insts
                .iter()
                .position(|inst| adapter.is_return(inst))
        };
        if let Some(at) = ret_at {
            for (n, inst) in epilogue.iter().enumerate() {
                func.insert_inst(id, at + n, inst.clone());
            }
        }
    }
    let entry = *func.blocks.keys().next().ok_or_else(|| {
        CodegenError::MalformedIr {
            func: func.name.clone(),
            block: None,
            message: "function has no blocks".to_string(),
        }
    })?;
    for (n, inst) in prologue.into_iter().enumerate() {
        func.insert_inst(entry, n, inst);
    }

    Ok(())
}

/// Replace frame pseudos with `[sp, #offset]` accesses and pseudo moves
/// with real moves.
fn materialize_pseudos(func: &mut Function) -> CodegenResult<()> {
    let name = func.name.clone();
    let frame = func.frame.clone();
    let offset_of = |slot, block| -> CodegenResult<i64> {
        frame.offset(slot).map(i64::from).ok_or_else(|| {
            CodegenError::MalformedIr {
                func: name.clone(),
                block: Some(block),
                message: format!("{slot} has no assigned offset"),
            }
        })
    };

    for (&block_id, block) in &mut func.blocks {
        for inst in &mut block.insts {
            let lowered = match &inst.kind {
                InstKind::FrameLoad { dst, slot } => Some(TargetInst {
                    op: TargetOpcode(A64Op::LdrSp.into()),
                    operands: [
                        Operand::Reg(*dst),
                        Operand::Imm(offset_of(*slot, block_id)?),
                    ]
                    .into_iter()
                    .collect(),
                }),
                InstKind::FrameStore { src, slot } => Some(TargetInst {
                    op: TargetOpcode(A64Op::StrSp.into()),
                    operands: [
                        Operand::Reg(*src),
                        Operand::Imm(offset_of(*slot, block_id)?),
                    ]
                    .into_iter()
                    .collect(),
                }),
                InstKind::FrameAddr { dst, slot } => Some(TargetInst {
                    op: TargetOpcode(A64Op::AddSpImm.into()),
                    operands: [
                        Operand::Reg(*dst),
                        Operand::Imm(offset_of(*slot, block_id)?),
                    ]
                    .into_iter()
                    .collect(),
                }),
                InstKind::Move { dst, src } => {
                    let dst = dst.clone();
                    let src = src.clone();
                    let reg = dst.reg().ok_or_else(|| CodegenError::MalformedIr {
                        func: name.clone(),
                        block: Some(block_id),
                        message: "move into a non-register".to_string(),
                    })?;
                    let op = match &src {
                        Operand::Reg(_) if reg.is_float() => A64Op::FMov,
                        Operand::Reg(_) => A64Op::Mov,
                        Operand::FpImm(_) => A64Op::FMovImm,
                        Operand::Imm(_) => A64Op::MovImm,
                        other => {
                            return Err(CodegenError::Unsupported(format!(
                                "move of {other:?}"
                            )))
                        }
                    };
                    Some(TargetInst {
                        op: TargetOpcode(op.into()),
                        operands: [dst, src].into_iter().collect(),
                    })
                }
                _ => None,
            };
            if let Some(lowered) = lowered {
                inst.kind = InstKind::Target(lowered);
            }
        }
    }
    Ok(())
}
