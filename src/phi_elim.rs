//! φ elimination: convert the MIR out of SSA before register allocation.
//!
//! For every block containing φs, each incoming `(pred, src)` entry becomes
//! a `MOVE dst ← src` in the predecessor, inserted just before its
//! terminator. A critical edge — one whose source has several successors
//! and whose destination has several predecessors — first gets a fresh
//! block on it so the copy runs on exactly that edge and no other.
//!
//! When one predecessor feeds several φs, all its copies form a parallel
//! copy: they are ordered so no source is read after its register was
//! overwritten, and copy cycles are broken with a fresh temporary of the
//! cycle's type.

use crate::flowgraph::ControlFlowGraph;
use crate::isa::TargetInstrAdapter;
use crate::mir::{self, BlockId, Function, InstKind, MInst, Operand, Register};
use crate::result::{CodegenError, CodegenResult};
use log::{debug, trace};
use std::collections::BTreeSet;

/// Run φ elimination on every function of `module`.
pub fn run_on_module(
    module: &mut mir::Module,
    adapter: &dyn TargetInstrAdapter,
) -> CodegenResult<()> {
    for func in &mut module.functions {
        run(func, adapter)?;
    }
    Ok(())
}

/// Run φ elimination on one function.
pub fn run(func: &mut Function, adapter: &dyn TargetInstrAdapter) -> CodegenResult<()> {
    let mut cfg = ControlFlowGraph::with_function(func, adapter);

    let phi_blocks: Vec<BlockId> = func
        .blocks
        .iter()
        .filter(|(_, block)| block.insts.iter().any(MInst::is_phi))
        .map(|(&id, _)| id)
        .collect();
    if phi_blocks.is_empty() {
        return Ok(());
    }

    let mut next_label = func.max_label().max(cfg.max_label) + 1;
    for &block in &phi_blocks {
        split_critical_edges(func, adapter, &mut cfg, block, &mut next_label);
    }

    for &block in &phi_blocks {
        check_phi_preds(func, &cfg, block)?;
        insert_copies(func, adapter, &cfg, block)?;
        let b = func.block_mut(block).expect("φ block disappeared");
        b.insts.retain(|inst| !inst.is_phi());
    }

    debug!("φ elimination on {}: {} φ blocks", func.name, phi_blocks.len());
    Ok(())
}

/// Split every critical edge into `block`, which contains φs.
fn split_critical_edges(
    func: &mut Function,
    adapter: &dyn TargetInstrAdapter,
    cfg: &mut ControlFlowGraph,
    block: BlockId,
    next_label: &mut u32,
) {
    let preds: Vec<BlockId> = cfg.preds(block).to_vec();
    for pred in preds {
        if !cfg.is_critical_edge(pred, block) {
            continue;
        }
        let split = BlockId(*next_label);
        *next_label += 1;
        trace!("splitting critical edge {pred} -> {block} with {split}");

        func.ensure_block(split);
        let branch = adapter.create_branch(block);
        func.push_inst(split, branch);

        // Redirect the predecessor's branch onto the split block. An edge
        // carried only by fall-through gets an explicit branch instead.
        let pred_block = func.block_mut(pred).expect("predecessor disappeared");
        let mut redirected = false;
        for inst in &mut pred_block.insts {
            if adapter.branch_target(inst) == Some(block) {
                adapter.retarget_branch(inst, block, split);
                redirected = true;
            }
        }
        if !redirected {
            let branch = adapter.create_branch(split);
            func.push_inst(pred, branch);
        }

        // Rename the predecessor in the φs of the destination.
        for inst in &mut func.block_mut(block).expect("φ block disappeared").insts {
            if let InstKind::Phi(phi) = &mut inst.kind {
                if let Some(src) = phi.incoming.remove(&pred) {
                    phi.incoming.insert(split, src);
                }
            }
        }

        cfg.add_block(split);
        cfg.remove_edge(pred, block);
        cfg.add_edge(pred, split);
        cfg.add_edge(split, block);
    }
}

/// A φ whose predecessor set disagrees with the CFG is a fatal error in
/// the input, not something to correct silently.
fn check_phi_preds(func: &Function, cfg: &ControlFlowGraph, block: BlockId) -> CodegenResult<()> {
    let preds: BTreeSet<BlockId> = cfg.preds(block).iter().copied().collect();
    for inst in &func.block(block).expect("φ block disappeared").insts {
        if let InstKind::Phi(phi) = &inst.kind {
            let keys: BTreeSet<BlockId> = phi.incoming.keys().copied().collect();
            if keys != preds {
                return Err(CodegenError::MalformedIr {
                    func: func.name.clone(),
                    block: Some(block),
                    message: format!(
                        "φ for {} names predecessors {keys:?} but the CFG has {preds:?}",
                        phi.dst
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Insert the scheduled copies for every predecessor of `block`.
fn insert_copies(
    func: &mut Function,
    adapter: &dyn TargetInstrAdapter,
    cfg: &ControlFlowGraph,
    block: BlockId,
) -> CodegenResult<()> {
    let preds: Vec<BlockId> = {
        let mut preds = cfg.preds(block).to_vec();
        preds.sort_unstable();
        preds
    };
    for pred in preds {
        let mut copies: Vec<(Register, Operand)> = Vec::new();
        for inst in &func.block(block).expect("φ block disappeared").insts {
            if let InstKind::Phi(phi) = &inst.kind {
                let src = phi.incoming.get(&pred).expect("checked above").clone();
                copies.push((phi.dst, src));
            }
        }
        if copies.is_empty() {
            continue;
        }
        let scheduled = sequence_parallel_copies(func, copies);
        let mut at = find_insert_point(func.block(pred).expect("pred disappeared"), adapter);
        for inst in scheduled {
            func.insert_inst(pred, at, inst);
            at += 1;
        }
    }
    Ok(())
}

/// The position just before the first branch or return of `block`.
fn find_insert_point(block: &mir::Block, adapter: &dyn TargetInstrAdapter) -> usize {
    block
        .insts
        .iter()
        .position(|inst| {
            adapter.is_cond_branch(inst)
                || adapter.is_uncond_branch(inst)
                || adapter.is_return(inst)
        })
        .unwrap_or(block.insts.len())
}

/// Order a parallel copy so every source is read before it is clobbered;
/// cycles are broken with a fresh temporary.
fn sequence_parallel_copies(
    func: &mut Function,
    mut pending: Vec<(Register, Operand)>,
) -> Vec<MInst> {
    let mut out = Vec::new();
    while !pending.is_empty() {
        // A copy is safe when no other pending copy still reads its dst.
        let safe = pending.iter().position(|(dst, _)| {
            !pending
                .iter()
                .any(|(other, src)| other != dst && src.reg() == Some(*dst))
        });
        match safe {
            Some(index) => {
                let (dst, src) = pending.remove(index);
                out.push(mir::create_move(Operand::Reg(dst), src));
            }
            None => {
                // Every dst is still read somewhere: a cycle. Save the
                // first dst in a temporary and repoint its readers.
                let saved = pending[0].0;
                let temp = func.new_vreg(saved.ty);
                out.push(mir::create_move(Operand::Reg(temp), Operand::Reg(saved)));
                for (_, src) in &mut pending {
                    if src.reg() == Some(saved) {
                        *src = Operand::Reg(temp);
                    }
                }
            }
        }
    }
    out
}
