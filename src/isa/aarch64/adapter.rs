//! The AArch64 instruction adapter: the boundary through which the
//! target-agnostic passes inspect and edit machine instructions.

use crate::isa::aarch64::inst::A64Op;
use crate::isa::aarch64::regs::{self, call_clobbers};
use crate::isa::{RegList, TargetInstrAdapter};
use crate::mir::{
    BlockId, FrameIndex, Function, InstKind, MInst, Operand, Register, TargetInst, F64, I64,
};
use smallvec::SmallVec;

/// Stateless adapter over [`InstKind`] and the A64 shape tables.
pub struct A64InstrAdapter;

fn target_op(inst: &MInst) -> Option<(A64Op, &TargetInst)> {
    match &inst.kind {
        InstKind::Target(target) => {
            let op = A64Op::try_from(target.op.0).expect("unknown aarch64 opcode");
            Some((op, target))
        }
        _ => None,
    }
}

fn target_op_mut(inst: &mut MInst) -> Option<(A64Op, &mut TargetInst)> {
    match &mut inst.kind {
        InstKind::Target(target) => {
            let op = A64Op::try_from(target.op.0).expect("unknown aarch64 opcode");
            Some((op, target))
        }
        _ => None,
    }
}

impl TargetInstrAdapter for A64InstrAdapter {
    fn is_call(&self, inst: &MInst) -> bool {
        matches!(target_op(inst), Some((A64Op::Bl, _)))
    }

    fn is_return(&self, inst: &MInst) -> bool {
        matches!(target_op(inst), Some((A64Op::Ret, _)))
    }

    fn is_uncond_branch(&self, inst: &MInst) -> bool {
        matches!(target_op(inst), Some((A64Op::B, _)))
    }

    fn is_cond_branch(&self, inst: &MInst) -> bool {
        matches!(target_op(inst), Some((A64Op::BCond, _)))
    }

    fn branch_target(&self, inst: &MInst) -> Option<BlockId> {
        let (op, target) = target_op(inst)?;
        let slot = match op {
            A64Op::B => 0,
            A64Op::BCond => 1,
            _ => return None,
        };
        match target.operands.get(slot) {
            Some(Operand::Label(label)) => Some(*label),
            _ => None,
        }
    }

    fn retarget_branch(&self, inst: &mut MInst, old: BlockId, new: BlockId) {
        if let Some((A64Op::B | A64Op::BCond, target)) = target_op_mut(inst) {
            for operand in &mut target.operands {
                if let Operand::Label(label) = operand {
                    if *label == old {
                        *label = new;
                    }
                }
            }
        }
    }

    fn create_branch(&self, target: BlockId) -> MInst {
        MInst::target(
            crate::mir::TargetOpcode(A64Op::B.into()),
            [Operand::Label(target)],
        )
    }

    fn uses(&self, inst: &MInst) -> RegList {
        let mut out = RegList::new();
        match &inst.kind {
            InstKind::Nop => {}
            InstKind::Phi(phi) => {
                for src in phi.incoming.values() {
                    if let Some(reg) = src.reg() {
                        out.push(reg);
                    }
                }
            }
            InstKind::Move { src, .. } => {
                if let Some(reg) = src.reg() {
                    out.push(reg);
                }
            }
            InstKind::FrameLoad { .. } | InstKind::FrameAddr { .. } => {}
            InstKind::FrameStore { src, .. } => out.push(*src),
            InstKind::Target(target) => {
                let op = A64Op::try_from(target.op.0).expect("unknown aarch64 opcode");
                for operand in target.operands.iter().skip(op.num_defs()) {
                    if let Some(reg) = operand.reg() {
                        out.push(reg);
                    }
                }
            }
        }
        out
    }

    fn defs(&self, inst: &MInst) -> RegList {
        let mut out = RegList::new();
        match &inst.kind {
            InstKind::Nop | InstKind::FrameStore { .. } => {}
            InstKind::Phi(phi) => out.push(phi.dst),
            InstKind::Move { dst, .. } => {
                if let Some(reg) = dst.reg() {
                    out.push(reg);
                }
            }
            InstKind::FrameLoad { dst, .. } | InstKind::FrameAddr { dst, .. } => {
                out.push(*dst)
            }
            InstKind::Target(target) => {
                let op = A64Op::try_from(target.op.0).expect("unknown aarch64 opcode");
                for operand in target.operands.iter().take(op.num_defs()) {
                    if let Some(reg) = operand.reg() {
                        out.push(reg);
                    }
                }
                if op == A64Op::Bl {
                    // Result and link registers are written by the call.
                    out.push(regs::gpr(0, I64));
                    out.push(regs::fpr(0, F64));
                    out.push(regs::link_reg());
                }
            }
        }
        out
    }

    fn replace_use(&self, inst: &mut MInst, from: Register, to: Register) {
        match &mut inst.kind {
            InstKind::Phi(phi) => {
                for src in phi.incoming.values_mut() {
                    replace_reg_operand(src, from, to);
                }
            }
            InstKind::Move { src, .. } => replace_reg_operand(src, from, to),
            InstKind::FrameStore { src, .. } => {
                if *src == from {
                    *src = to;
                }
            }
            InstKind::Target(target) => {
                let op = A64Op::try_from(target.op.0).expect("unknown aarch64 opcode");
                let num_defs = op.num_defs();
                for operand in target.operands.iter_mut().skip(num_defs) {
                    replace_reg_operand(operand, from, to);
                }
            }
            _ => {}
        }
    }

    fn replace_def(&self, inst: &mut MInst, from: Register, to: Register) {
        match &mut inst.kind {
            InstKind::Phi(phi) => {
                if phi.dst == from {
                    phi.dst = to;
                }
            }
            InstKind::Move { dst, .. } => replace_reg_operand(dst, from, to),
            InstKind::FrameLoad { dst, .. } | InstKind::FrameAddr { dst, .. } => {
                if *dst == from {
                    *dst = to;
                }
            }
            InstKind::Target(target) => {
                let op = A64Op::try_from(target.op.0).expect("unknown aarch64 opcode");
                let num_defs = op.num_defs();
                for operand in target.operands.iter_mut().take(num_defs) {
                    replace_reg_operand(operand, from, to);
                }
            }
            _ => {}
        }
    }

    fn as_copy(&self, inst: &MInst) -> Option<(Register, Register)> {
        match &inst.kind {
            InstKind::Move { dst, src } => Some((dst.reg()?, src.reg()?)),
            InstKind::Target(target) => {
                let op = A64Op::try_from(target.op.0).expect("unknown aarch64 opcode");
                match op {
                    A64Op::Mov | A64Op::FMov => {
                        Some((target.operands[0].reg()?, target.operands[1].reg()?))
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn phys_clobbers(&self, inst: &MInst) -> SmallVec<[Register; 8]> {
        let mut out = SmallVec::new();
        if self.is_call(inst) {
            for id in call_clobbers() {
                let ty = if id >= regs::FPR_BASE { F64 } else { I64 };
                out.push(Register::phys(id, ty));
            }
        }
        out
    }

    fn insert_reload_before(
        &self,
        func: &mut Function,
        block: BlockId,
        index: usize,
        reg: Register,
        slot: FrameIndex,
    ) {
        let inst = MInst::new(InstKind::FrameLoad { dst: reg, slot });
        func.insert_inst(block, index, inst);
    }

    fn insert_spill_after(
        &self,
        func: &mut Function,
        block: BlockId,
        index: usize,
        reg: Register,
        slot: FrameIndex,
    ) {
        let inst = MInst::new(InstKind::FrameStore { src: reg, slot });
        func.insert_inst(block, index + 1, inst);
    }
}

fn replace_reg_operand(operand: &mut Operand, from: Register, to: Register) {
    if let Operand::Reg(reg) = operand {
        if *reg == from {
            *operand = Operand::Reg(to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{create_move, TargetOpcode, I32};

    fn adapter() -> A64InstrAdapter {
        A64InstrAdapter
    }

    fn add(dst: Register, a: Register, b: Register) -> MInst {
        MInst::target(
            TargetOpcode(A64Op::Add.into()),
            [Operand::Reg(dst), Operand::Reg(a), Operand::Reg(b)],
        )
    }

    #[test]
    fn def_use_partition_follows_shape() {
        let a = adapter();
        let d = Register::virt(0, I32);
        let x = Register::virt(1, I32);
        let y = Register::virt(2, I32);
        let inst = add(d, x, y);
        assert_eq!(a.defs(&inst).as_slice(), [d]);
        assert_eq!(a.uses(&inst).as_slice(), [x, y]);
    }

    #[test]
    fn replace_use_leaves_defs_alone() {
        let a = adapter();
        let d = Register::virt(0, I32);
        let x = Register::virt(1, I32);
        let p = Register::phys(5, I32);
        // add d, x, x — both use slots must change, the def must not.
        let mut inst = add(d, x, x);
        a.replace_use(&mut inst, x, p);
        assert_eq!(a.uses(&inst).as_slice(), [p, p]);
        assert_eq!(a.defs(&inst).as_slice(), [d]);

        let mut inst = add(x, x, x);
        a.replace_def(&mut inst, x, p);
        assert_eq!(a.defs(&inst).as_slice(), [p]);
        assert_eq!(a.uses(&inst).as_slice(), [x, x]);
    }

    #[test]
    fn branch_classification_and_retarget() {
        let a = adapter();
        let mut b = MInst::target(TargetOpcode(A64Op::B.into()), [Operand::Label(BlockId(3))]);
        assert!(a.is_uncond_branch(&b));
        assert_eq!(a.branch_target(&b), Some(BlockId(3)));
        a.retarget_branch(&mut b, BlockId(3), BlockId(9));
        assert_eq!(a.branch_target(&b), Some(BlockId(9)));

        let bc = MInst::target(
            TargetOpcode(A64Op::BCond.into()),
            [Operand::Imm(0), Operand::Label(BlockId(7))],
        );
        assert!(a.is_cond_branch(&bc));
        assert_eq!(a.branch_target(&bc), Some(BlockId(7)));
    }

    #[test]
    fn copies_are_recognized() {
        let a = adapter();
        let d = Register::virt(0, I32);
        let s = Register::virt(1, I32);
        let m = create_move(Operand::Reg(d), Operand::Reg(s));
        assert_eq!(a.as_copy(&m), Some((d, s)));

        let mov = MInst::target(
            TargetOpcode(A64Op::Mov.into()),
            [Operand::Reg(d), Operand::Reg(s)],
        );
        assert_eq!(a.as_copy(&mov), Some((d, s)));

        // An immediate move is not a register copy.
        let imm = create_move(Operand::Reg(d), Operand::Imm(3));
        assert_eq!(a.as_copy(&imm), None);
    }

    #[test]
    fn calls_clobber_caller_saved() {
        let a = adapter();
        let call = MInst::target(TargetOpcode(A64Op::Bl.into()), [Operand::Sym("f".into())]);
        assert!(a.is_call(&call));
        let clobbers = a.phys_clobbers(&call);
        assert!(clobbers.iter().any(|r| r.id == 0));
        assert!(clobbers.iter().all(|r| !r.virt));
        // Callee-saved registers are not clobbered.
        assert!(!clobbers.iter().any(|r| r.id == 19));
        let defs = a.defs(&call);
        assert!(defs.iter().any(|r| r.id == regs::LR));
    }
}
