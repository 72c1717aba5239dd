//! Linear-scan register allocation.
//!
//! Intervals are walked in ascending start order with an active list sorted
//! by end point. Each interval takes the first fitting register in the
//! target's scan order — callee-saved first when the interval crosses a
//! call, caller-saved first otherwise — skipping registers with a fixed
//! clobber inside the interval. Under pressure the active interval with the
//! furthest end point is spilled to a fresh frame slot.
//!
//! The rewrite pass then walks the function once more: assigned registers
//! are substituted structurally; spilled registers are reloaded into a
//! reserved scratch register before each use and stored back after each
//! def. An interval that crosses a call while holding a caller-saved
//! register gets a save/restore pair straddling every crossed call.

use crate::isa::{TargetInstrAdapter, TargetRegInfo};
use crate::mir::{BlockId, FrameIndex, Function, Register};
use crate::regalloc::liveness::{self, LiveInterval, Liveness};
use crate::regalloc::RegisterAllocator;
use crate::result::{CodegenError, CodegenResult};
use log::{debug, trace};
use std::collections::{BTreeMap, BTreeSet};

/// The linear-scan allocator.
pub struct LinearScanRA;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Assignment {
    Reg(u32),
    Spill(FrameIndex),
}

impl RegisterAllocator for LinearScanRA {
    fn allocate_function(
        &self,
        func: &mut Function,
        adapter: &dyn TargetInstrAdapter,
        reg_info: &dyn TargetRegInfo,
    ) -> CodegenResult<()> {
        for block in func.blocks.values() {
            if let Some(phi) = block.insts.iter().find(|inst| inst.is_phi()) {
                return Err(CodegenError::InvariantViolation(format!(
                    "φ {phi} reached register allocation in {}",
                    func.name
                )));
            }
        }

        let live = liveness::compute(func, adapter)?;
        let assignments = assign(func, &live, reg_info)?;
        rewrite(func, adapter, reg_info, &live, assignments)
    }
}

/// Walk the sorted intervals and decide an assignment for each.
fn assign(
    func: &mut Function,
    live: &Liveness,
    reg_info: &dyn TargetRegInfo,
) -> CodegenResult<BTreeMap<u32, Assignment>> {
    let mut assignments: BTreeMap<u32, Assignment> = BTreeMap::new();
    // Active interval indices with their current physical register, kept
    // sorted by (end, register id) for deterministic spilling.
    let mut active: Vec<(usize, u32)> = Vec::new();
    let mut in_use: BTreeSet<u32> = BTreeSet::new();

    for (index, interval) in live.intervals.iter().enumerate() {
        active.retain(|&(act, reg)| {
            if live.intervals[act].end <= interval.start {
                in_use.remove(&reg);
                false
            } else {
                true
            }
        });

        match pick_register(interval, live, reg_info, &in_use) {
            Some(reg) => {
                trace!("{} -> r{reg}", interval.reg);
                assignments.insert(interval.reg.id, Assignment::Reg(reg));
                in_use.insert(reg);
                active.push((index, reg));
                active.sort_by_key(|&(act, reg)| (live.intervals[act].end, reg));
            }
            None => {
                // Spill: steal from the active interval that ends furthest
                // away if that is later than ours, else spill ourselves.
                let furthest = active.last().copied();
                match furthest {
                    Some((victim, reg)) if live.intervals[victim].end > interval.end => {
                        let slot = func.frame.new_spill_slot();
                        let victim_reg = live.intervals[victim].reg;
                        trace!("stealing r{reg} from {victim_reg}, spilling it to {slot}");
                        assignments.insert(victim_reg.id, Assignment::Spill(slot));
                        assignments.insert(interval.reg.id, Assignment::Reg(reg));
                        active.pop();
                        active.push((index, reg));
                        active.sort_by_key(|&(act, reg)| (live.intervals[act].end, reg));
                    }
                    _ => {
                        let slot = func.frame.new_spill_slot();
                        trace!("spilling {} to {slot}", interval.reg);
                        assignments.insert(interval.reg.id, Assignment::Spill(slot));
                    }
                }
            }
        }
    }

    debug!(
        "linear scan on {}: {} intervals, {} spills",
        func.name,
        live.intervals.len(),
        assignments
            .values()
            .filter(|a| matches!(a, Assignment::Spill(_)))
            .count()
    );
    Ok(assignments)
}

/// First free register of the interval's class, honoring scan order, the
/// callee-saved preference, and fixed clobbers inside the interval.
fn pick_register(
    interval: &LiveInterval,
    live: &Liveness,
    reg_info: &dyn TargetRegInfo,
    in_use: &BTreeSet<u32>,
) -> Option<u32> {
    let pool = if interval.reg.is_float() {
        reg_info.float_regs()
    } else {
        reg_info.int_regs()
    };
    let clobbered = |reg: u32| {
        live.phys_defs.get(&reg).is_some_and(|positions| {
            positions
                .iter()
                .any(|&at| interval.start < at && at < interval.end)
        })
    };
    let available = |reg: &&u32| -> bool {
        !in_use.contains(*reg) && !reg_info.is_reserved(**reg) && !clobbered(**reg)
    };

    let prefer_callee_saved = interval.crosses_call();
    let first_pass = pool
        .iter()
        .filter(available)
        .find(|&&reg| reg_info.is_callee_saved(reg) == prefer_callee_saved);
    first_pass
        .or_else(|| pool.iter().filter(available).next())
        .copied()
}

/// Rewrite every instruction against the computed assignments.
fn rewrite(
    func: &mut Function,
    adapter: &dyn TargetInstrAdapter,
    reg_info: &dyn TargetRegInfo,
    live: &Liveness,
    assignments: BTreeMap<u32, Assignment>,
) -> CodegenResult<()> {
    // Save/restore slots for caller-saved assignments that cross calls,
    // allocated lazily per interval.
    let mut straddle_slots: BTreeMap<u32, FrameIndex> = BTreeMap::new();

    for &block_id in &live.order {
        let base = live.block_starts[&block_id];
        let count = func.block(block_id).expect("ordered block exists").insts.len();

        // Plan edits against original indices, then apply back to front so
        // insertions never shift later positions.
        let mut plans: Vec<Plan> = Vec::new();
        for index in 0..count {
            let pos = base + index as u32;
            let (inst_uses, inst_defs, call_clobbers) = {
                let inst = &func.block(block_id).expect("block exists").insts[index];
                let clobbers = adapter
                    .is_call(inst)
                    .then(|| adapter.phys_clobbers(inst));
                (adapter.uses(inst), adapter.defs(inst), clobbers)
            };
            let mut plan = Plan::new(index);

            let mut use_scratch: BTreeMap<u32, Register> = BTreeMap::new();
            for use_reg in inst_uses {
                if !use_reg.virt || use_scratch.contains_key(&use_reg.id) {
                    continue;
                }
                match assignments.get(&use_reg.id) {
                    Some(Assignment::Reg(phys)) => {
                        plan.replace_uses
                            .push((use_reg, Register::phys(*phys, use_reg.ty)));
                    }
                    Some(Assignment::Spill(slot)) => {
                        let scratch = scratch_reg(
                            func,
                            reg_info,
                            use_reg,
                            use_scratch.len(),
                        )?;
                        use_scratch.insert(use_reg.id, scratch);
                        plan.reloads.push((scratch, *slot));
                        plan.replace_uses.push((use_reg, scratch));
                    }
                    None => {
                        return Err(CodegenError::InvariantViolation(format!(
                            "no assignment for {use_reg} in {}",
                            func.name
                        )))
                    }
                }
            }

            for def_reg in inst_defs {
                if !def_reg.virt {
                    continue;
                }
                match assignments.get(&def_reg.id) {
                    Some(Assignment::Reg(phys)) => {
                        plan.replace_defs
                            .push((def_reg, Register::phys(*phys, def_reg.ty)));
                    }
                    Some(Assignment::Spill(slot)) => {
                        let scratch = scratch_reg(func, reg_info, def_reg, 0)?;
                        plan.replace_defs.push((def_reg, scratch));
                        plan.spills.push((scratch, *slot));
                    }
                    None => {
                        return Err(CodegenError::InvariantViolation(format!(
                            "no assignment for {def_reg} in {}",
                            func.name
                        )))
                    }
                }
            }

            // A register this call clobbers, holding a value live across
            // it, needs a save/restore pair straddling the call.
            if let Some(clobbers) = call_clobbers {
                for interval in &live.intervals {
                    if !interval.crossed_calls.contains(&pos) {
                        continue;
                    }
                    if let Some(Assignment::Reg(phys)) = assignments.get(&interval.reg.id) {
                        if !clobbers.iter().any(|reg| reg.id == *phys) {
                            continue;
                        }
                        let slot = *straddle_slots
                            .entry(interval.reg.id)
                            .or_insert_with(|| func.frame.new_spill_slot());
                        let saved = Register::phys(*phys, interval.reg.ty);
                        plan.saves.push((saved, slot));
                        plan.restores.push((saved, slot));
                    }
                }
            }

            plans.push(plan);
        }

        for plan in plans.into_iter().rev() {
            plan.apply(func, adapter, block_id);
        }
    }
    Ok(())
}

fn scratch_reg(
    func: &Function,
    reg_info: &dyn TargetRegInfo,
    reg: Register,
    nth: usize,
) -> CodegenResult<Register> {
    let pool = if reg.is_float() {
        reg_info.float_scratch_regs()
    } else {
        reg_info.int_scratch_regs()
    };
    match pool.get(nth) {
        Some(&id) => Ok(Register::phys(id, reg.ty)),
        None => Err(CodegenError::RegisterExhausted {
            func: func.name.clone(),
            message: format!("no scratch register left for spilled {reg}"),
        }),
    }
}

/// Edits for one original instruction position.
struct Plan {
    index: usize,
    replace_uses: Vec<(Register, Register)>,
    replace_defs: Vec<(Register, Register)>,
    /// Reloads inserted before the instruction.
    reloads: Vec<(Register, FrameIndex)>,
    /// Spills inserted after the instruction.
    spills: Vec<(Register, FrameIndex)>,
    /// Call-straddling saves (before) and restores (after).
    saves: Vec<(Register, FrameIndex)>,
    restores: Vec<(Register, FrameIndex)>,
}

impl Plan {
    fn new(index: usize) -> Self {
        Self {
            index,
            replace_uses: Vec::new(),
            replace_defs: Vec::new(),
            reloads: Vec::new(),
            spills: Vec::new(),
            saves: Vec::new(),
            restores: Vec::new(),
        }
    }

    fn apply(self, func: &mut Function, adapter: &dyn TargetInstrAdapter, block: BlockId) {
        {
            let inst = &mut func
                .block_mut(block)
                .expect("block exists")
                .insts[self.index];
            for (from, to) in self.replace_uses {
                adapter.replace_use(inst, from, to);
            }
            for (from, to) in self.replace_defs {
                adapter.replace_def(inst, from, to);
            }
        }
        // After-edits first so the before-edits do not shift them.
        for (reg, slot) in self.spills.into_iter().chain(self.restores) {
            adapter.insert_spill_after(func, block, self.index, reg, slot);
        }
        for (reg, slot) in self.reloads.into_iter().chain(self.saves) {
            adapter.insert_reload_before(func, block, self.index, reg, slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::aarch64::adapter::A64InstrAdapter;
    use crate::isa::aarch64::inst::A64Op;
    use crate::isa::TargetRegInfo;
    use crate::mir::{self, InstKind, Operand, I32};
    use crate::test_util::{bl, ret, three_reg};

    /// A miniature target with two allocatable integer registers and one
    /// scratch, for forcing pressure in tests.
    struct TinyRegInfo;

    impl TargetRegInfo for TinyRegInfo {
        fn sp_reg(&self) -> u32 {
            31
        }
        fn ra_reg(&self) -> u32 {
            30
        }
        fn zero_reg(&self) -> u32 {
            32
        }
        fn int_arg_regs(&self) -> &[u32] {
            &[0, 1]
        }
        fn float_arg_regs(&self) -> &[u32] {
            &[64]
        }
        fn callee_saved_int_regs(&self) -> &[u32] {
            &[]
        }
        fn callee_saved_float_regs(&self) -> &[u32] {
            &[]
        }
        fn reserved_regs(&self) -> &[u32] {
            &[16, 30, 31, 32]
        }
        fn int_regs(&self) -> &[u32] {
            &[0, 1]
        }
        fn float_regs(&self) -> &[u32] {
            &[64]
        }
        fn int_scratch_regs(&self) -> &[u32] {
            &[16]
        }
        fn float_scratch_regs(&self) -> &[u32] {
            &[94]
        }
    }

    fn count_kind(func: &Function, pred: impl Fn(&InstKind) -> bool) -> usize {
        func.blocks
            .values()
            .flat_map(|b| b.insts.iter())
            .filter(|i| pred(&i.kind))
            .count()
    }

    fn no_virtual_regs(func: &Function, adapter: &A64InstrAdapter) -> bool {
        use crate::isa::TargetInstrAdapter;
        func.blocks.values().flat_map(|b| b.insts.iter()).all(|inst| {
            adapter
                .uses(inst)
                .iter()
                .chain(adapter.defs(inst).iter())
                .all(|reg| !reg.virt)
        })
    }

    #[test]
    fn no_spill_when_registers_suffice() {
        // Scenario: single-block add; after allocation there are no frame
        // slots and no virtual registers left.
        let adapter = A64InstrAdapter;
        let mut func = Function::new("f");
        let a = func.new_vreg(I32);
        let bb = func.new_vreg(I32);
        let c = func.new_vreg(I32);
        func.ensure_block(mir::BlockId(0));
        func.push_inst(mir::BlockId(0), mir::create_move_imm(Operand::Reg(a), 1));
        func.push_inst(mir::BlockId(0), mir::create_move_imm(Operand::Reg(bb), 2));
        func.push_inst(mir::BlockId(0), three_reg(A64Op::Add, c, a, bb));
        func.push_inst(mir::BlockId(0), ret());

        LinearScanRA
            .allocate_function(&mut func, &adapter, &TinyRegInfo)
            .unwrap();
        assert!(no_virtual_regs(&func, &adapter));
        assert_eq!(func.frame.len(), 0);
    }

    #[test]
    fn three_overlapping_intervals_on_two_registers_spill_once() {
        // Scenario: pool of two integer registers, three overlapping
        // intervals: exactly one spill, with a unique frame index, reload
        // before use and spill after def.
        let adapter = A64InstrAdapter;
        let mut func = Function::new("f");
        let a = func.new_vreg(I32);
        let bb = func.new_vreg(I32);
        let c = func.new_vreg(I32);
        let d = func.new_vreg(I32);
        func.ensure_block(mir::BlockId(0));
        func.push_inst(mir::BlockId(0), mir::create_move_imm(Operand::Reg(a), 1));
        func.push_inst(mir::BlockId(0), mir::create_move_imm(Operand::Reg(bb), 2));
        func.push_inst(mir::BlockId(0), mir::create_move_imm(Operand::Reg(c), 3));
        // All three live here.
        func.push_inst(mir::BlockId(0), three_reg(A64Op::Add, d, a, bb));
        func.push_inst(mir::BlockId(0), three_reg(A64Op::Add, d, d, c));
        func.push_inst(mir::BlockId(0), ret());

        LinearScanRA
            .allocate_function(&mut func, &adapter, &TinyRegInfo)
            .unwrap();
        assert!(no_virtual_regs(&func, &adapter));
        assert_eq!(func.frame.len(), 1, "exactly one spill slot");
        let stores = count_kind(&func, |k| matches!(k, InstKind::FrameStore { .. }));
        let loads = count_kind(&func, |k| matches!(k, InstKind::FrameLoad { .. }));
        assert!(stores >= 1, "spill after def");
        assert!(loads >= 1, "reload before use");

        // The reload precedes the use of the spilled value.
        let insts = &func.blocks[&mir::BlockId(0)].insts;
        let load_at = insts
            .iter()
            .position(|i| matches!(i.kind, InstKind::FrameLoad { .. }))
            .unwrap();
        assert!(load_at > 0 && load_at < insts.len() - 1);
    }

    #[test]
    fn call_crossing_prefers_callee_saved() {
        let adapter = A64InstrAdapter;
        let reg_info = crate::isa::aarch64::regs::A64RegInfo;
        let mut func = Function::new("f");
        let a = func.new_vreg(I32);
        let d = func.new_vreg(I32);
        func.ensure_block(mir::BlockId(0));
        func.push_inst(mir::BlockId(0), mir::create_move_imm(Operand::Reg(a), 1));
        func.push_inst(mir::BlockId(0), bl("g"));
        func.push_inst(mir::BlockId(0), three_reg(A64Op::Add, d, a, a));
        func.push_inst(mir::BlockId(0), ret());

        LinearScanRA
            .allocate_function(&mut func, &adapter, &reg_info)
            .unwrap();
        // `a` lives across the call; it must sit in a callee-saved reg.
        let insts = &func.blocks[&mir::BlockId(0)].insts;
        let first = &insts[0];
        let def = {
            use crate::isa::TargetInstrAdapter;
            adapter.defs(first)[0]
        };
        assert!(reg_info.is_callee_saved(def.id), "got {def}");
    }

    #[test]
    fn caller_saved_across_call_straddles_with_save_restore() {
        // With no callee-saved registers at all, a value living across a
        // call must be saved before and restored after it.
        let adapter = A64InstrAdapter;
        let mut func = Function::new("f");
        let a = func.new_vreg(I32);
        let d = func.new_vreg(I32);
        func.ensure_block(mir::BlockId(0));
        func.push_inst(mir::BlockId(0), mir::create_move_imm(Operand::Reg(a), 1));
        func.push_inst(mir::BlockId(0), bl("g"));
        func.push_inst(mir::BlockId(0), three_reg(A64Op::Add, d, a, a));
        func.push_inst(mir::BlockId(0), ret());

        LinearScanRA
            .allocate_function(&mut func, &adapter, &TinyRegInfo)
            .unwrap();
        let insts = &func.blocks[&mir::BlockId(0)].insts;
        let call_at = insts
            .iter()
            .position(|i| matches!(&i.kind, InstKind::Target(t) if t.op.0 == u16::from(A64Op::Bl)))
            .unwrap();
        assert!(
            matches!(insts[call_at - 1].kind, InstKind::FrameStore { .. }),
            "save before the call"
        );
        assert!(
            matches!(insts[call_at + 1].kind, InstKind::FrameLoad { .. }),
            "restore after the call"
        );
    }

    #[test]
    fn determinism() {
        let adapter = A64InstrAdapter;
        let build = || {
            let mut func = Function::new("f");
            let a = func.new_vreg(I32);
            let bb = func.new_vreg(I32);
            let c = func.new_vreg(I32);
            func.ensure_block(mir::BlockId(0));
            func.push_inst(mir::BlockId(0), mir::create_move_imm(Operand::Reg(a), 1));
            func.push_inst(mir::BlockId(0), mir::create_move_imm(Operand::Reg(bb), 2));
            func.push_inst(mir::BlockId(0), three_reg(A64Op::Add, c, a, bb));
            func.push_inst(mir::BlockId(0), ret());
            func
        };
        let mut f1 = build();
        let mut f2 = build();
        LinearScanRA
            .allocate_function(&mut f1, &adapter, &TinyRegInfo)
            .unwrap();
        LinearScanRA
            .allocate_function(&mut f2, &adapter, &TinyRegInfo)
            .unwrap();
        let dump = |f: &Function| {
            f.blocks
                .values()
                .flat_map(|b| b.insts.iter())
                .map(|i| format!("{i}"))
                .collect::<Vec<_>>()
        };
        assert_eq!(dump(&f1), dump(&f2));
    }
}
