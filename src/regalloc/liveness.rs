//! Live intervals over linearized instruction positions.
//!
//! Instructions are numbered in one strictly increasing sequence across
//! blocks in CFG reverse post-order. A virtual register's interval is the
//! half-open `[first_def, last_use]` range over those positions, widened in
//! two ways:
//!
//! - **loop extension**: a register live into a loop from outside must stay
//!   live for the whole body, so an interval reaching a loop header is
//!   extended to the loop's back-edge source;
//! - **call crossings**: every call position strictly inside an interval is
//!   recorded, so the allocator can prefer callee-saved registers and
//!   insert save/restore pairs otherwise.
//!
//! Explicit physical-register defs (argument marshalling, call results,
//! the link register) are collected as fixed clobber points the allocator
//! must steer around. The caller-saved set a call implicitly clobbers is
//! deliberately not folded in here: those registers stay allocatable
//! across calls and are protected by save/restore pairs instead.

use crate::flowgraph::ControlFlowGraph;
use crate::isa::TargetInstrAdapter;
use crate::mir::{BlockId, Function, Register};
use crate::result::{CodegenError, CodegenResult};
use log::trace;
use std::collections::BTreeMap;

/// The live range of one virtual register.
#[derive(Clone, Debug)]
pub struct LiveInterval {
    /// The virtual register.
    pub reg: Register,
    /// Position of the first definition.
    pub start: u32,
    /// Position of the last use (or definition, for dead defs).
    pub end: u32,
    /// Call positions strictly inside the interval.
    pub crossed_calls: Vec<u32>,
}

impl LiveInterval {
    /// Does this interval cross a call?
    pub fn crosses_call(&self) -> bool {
        !self.crossed_calls.is_empty()
    }
}

/// The result of liveness analysis for one function.
pub struct Liveness {
    /// Intervals sorted by ascending start, then end, then register id.
    pub intervals: Vec<LiveInterval>,
    /// Block layout order used for numbering (reverse post-order).
    pub order: Vec<BlockId>,
    /// Position of the first instruction of each block.
    pub block_starts: BTreeMap<BlockId, u32>,
    /// Positions of call instructions.
    pub call_positions: Vec<u32>,
    /// Fixed clobber positions per physical register id.
    pub phys_defs: BTreeMap<u32, Vec<u32>>,
}

struct Range {
    reg: Register,
    first: u32,
    last: u32,
    has_def: bool,
}

/// Compute live intervals for `func`.
pub fn compute(func: &Function, adapter: &dyn TargetInstrAdapter) -> CodegenResult<Liveness> {
    let cfg = ControlFlowGraph::with_function(func, adapter);
    let order = cfg.reverse_post_order();

    let mut block_starts = BTreeMap::new();
    let mut block_ends = BTreeMap::new();
    let mut ranges: BTreeMap<u32, Range> = BTreeMap::new();
    let mut call_positions = Vec::new();
    let mut phys_defs: BTreeMap<u32, Vec<u32>> = BTreeMap::new();

    let mut pos: u32 = 0;
    for &id in &order {
        let block = func.block(id).expect("ordered block exists");
        block_starts.insert(id, pos);
        for inst in &block.insts {
            if adapter.is_call(inst) {
                call_positions.push(pos);
            }
            for use_reg in adapter.uses(inst) {
                if use_reg.virt {
                    let range = ranges.entry(use_reg.id).or_insert(Range {
                        reg: use_reg,
                        first: pos,
                        last: pos,
                        has_def: false,
                    });
                    range.last = range.last.max(pos);
                }
            }
            for def_reg in adapter.defs(inst) {
                if def_reg.virt {
                    let range = ranges.entry(def_reg.id).or_insert(Range {
                        reg: def_reg,
                        first: pos,
                        last: pos,
                        has_def: true,
                    });
                    range.has_def = true;
                    range.first = range.first.min(pos);
                    range.last = range.last.max(pos);
                } else {
                    phys_defs.entry(def_reg.id).or_default().push(pos);
                }
            }
            pos += 1;
        }
        block_ends.insert(id, pos.saturating_sub(1));
    }

    for range in ranges.values() {
        if !range.has_def {
            return Err(CodegenError::MalformedIr {
                func: func.name.clone(),
                block: None,
                message: format!("use of never-defined virtual register {}", range.reg),
            });
        }
    }

    let mut intervals: Vec<LiveInterval> = ranges
        .into_values()
        .map(|range| LiveInterval {
            reg: range.reg,
            start: range.first,
            end: range.last,
            crossed_calls: Vec::new(),
        })
        .collect();

    // Loop extension: for each back edge u → v, a register live at the
    // loop header and dying inside the body stays live to the back edge.
    let rpo_index: BTreeMap<BlockId, usize> =
        order.iter().enumerate().map(|(i, &b)| (b, i)).collect();
    for &u in &order {
        for &v in cfg.succs(u) {
            if rpo_index[&v] > rpo_index[&u] {
                continue;
            }
            let loop_start = block_starts[&v];
            let loop_end = block_ends[&u];
            for interval in &mut intervals {
                if interval.start <= loop_start
                    && interval.end >= loop_start
                    && interval.end < loop_end
                {
                    trace!(
                        "extending {} across loop {v}..{u}: {} -> {loop_end}",
                        interval.reg,
                        interval.end
                    );
                    interval.end = loop_end;
                }
            }
        }
    }

    for interval in &mut intervals {
        interval.crossed_calls = call_positions
            .iter()
            .copied()
            .filter(|&call| interval.start < call && call < interval.end)
            .collect();
    }

    intervals.sort_by_key(|interval| (interval.start, interval.end, interval.reg.id));

    Ok(Liveness {
        intervals,
        order,
        block_starts,
        call_positions,
        phys_defs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::aarch64::inst::A64Op;
    use crate::isa::aarch64::AArch64Target;
    use crate::isa::TargetIsa;
    use crate::mir::{self, Operand, I32};
    use crate::test_util::{bcond, bl, ret, three_reg};

    #[test]
    fn straight_line_intervals() {
        let target = AArch64Target::new();
        let mut func = Function::new("f");
        let a = func.new_vreg(I32);
        let bb = func.new_vreg(I32);
        let c = func.new_vreg(I32);
        func.ensure_block(BlockId(0));
        func.push_inst(BlockId(0), mir::create_move_imm(Operand::Reg(a), 1));
        func.push_inst(BlockId(0), mir::create_move_imm(Operand::Reg(bb), 2));
        func.push_inst(BlockId(0), three_reg(A64Op::Add, c, a, bb));
        func.push_inst(BlockId(0), ret());

        let live = compute(&func, target.adapter()).unwrap();
        assert_eq!(live.intervals.len(), 3);
        let ia = &live.intervals[0];
        assert_eq!((ia.reg, ia.start, ia.end), (a, 0, 2));
        let ic = &live.intervals[2];
        assert_eq!((ic.reg, ic.start, ic.end), (c, 2, 2));
    }

    #[test]
    fn use_without_def_is_malformed() {
        let target = AArch64Target::new();
        let mut func = Function::new("f");
        let ghost = Register::virt(9, I32);
        let d = func.new_vreg(I32);
        func.ensure_block(BlockId(0));
        func.push_inst(BlockId(0), three_reg(A64Op::Add, d, ghost, ghost));
        func.push_inst(BlockId(0), ret());
        assert!(matches!(
            compute(&func, target.adapter()),
            Err(CodegenError::MalformedIr { .. })
        ));
    }

    #[test]
    fn call_crossings_are_recorded() {
        let target = AArch64Target::new();
        let mut func = Function::new("f");
        let a = func.new_vreg(I32);
        let d = func.new_vreg(I32);
        func.ensure_block(BlockId(0));
        func.push_inst(BlockId(0), mir::create_move_imm(Operand::Reg(a), 1));
        func.push_inst(BlockId(0), bl("g"));
        func.push_inst(BlockId(0), three_reg(A64Op::Add, d, a, a));
        func.push_inst(BlockId(0), ret());

        let live = compute(&func, target.adapter()).unwrap();
        let ia = live.intervals.iter().find(|i| i.reg == a).unwrap();
        assert_eq!(ia.crossed_calls, [1]);
        // The call's clobbers show up as fixed phys defs.
        assert!(live.phys_defs[&0].contains(&1));
        assert_eq!(live.call_positions, [1]);
    }

    #[test]
    fn loops_extend_intervals_over_the_body() {
        let target = AArch64Target::new();
        // bb0: def a; bb1 (loop): use a at the top, then a long body with a
        // back edge; bb2: ret. Without extension a would die at its last
        // textual use inside the loop.
        let mut func = Function::new("f");
        let a = func.new_vreg(I32);
        let t = func.new_vreg(I32);
        func.ensure_block(BlockId(0));
        func.push_inst(BlockId(0), mir::create_move_imm(Operand::Reg(a), 1));
        func.ensure_block(BlockId(1));
        func.push_inst(BlockId(1), three_reg(A64Op::Add, t, a, a));
        func.push_inst(BlockId(1), bcond(1));
        func.ensure_block(BlockId(2));
        func.push_inst(BlockId(2), ret());

        let live = compute(&func, target.adapter()).unwrap();
        let ia = live.intervals.iter().find(|i| i.reg == a).unwrap();
        // The back edge source is the end of bb1 (position 2).
        assert_eq!(ia.end, 2);
    }

    #[test]
    fn sort_is_start_end_then_id() {
        let target = AArch64Target::new();
        let mut func = Function::new("f");
        let a = func.new_vreg(I32);
        let bb = func.new_vreg(I32);
        let c = func.new_vreg(I32);
        func.ensure_block(BlockId(0));
        // All three die at the final add, so the sort falls back to starts.
        func.push_inst(BlockId(0), mir::create_move_imm(Operand::Reg(c), 1));
        func.push_inst(BlockId(0), three_reg(A64Op::Add, a, c, c));
        func.push_inst(BlockId(0), three_reg(A64Op::Add, bb, c, c));
        func.push_inst(BlockId(0), three_reg(A64Op::Add, c, a, bb));
        func.push_inst(BlockId(0), ret());
        let live = compute(&func, target.adapter()).unwrap();
        let regs: Vec<Register> = live.intervals.iter().map(|i| i.reg).collect();
        assert_eq!(regs, [c, a, bb]);
    }
}
