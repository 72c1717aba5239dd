//! MIR invariant checks, run between passes when `enable_verifier` is set.
//!
//! The verifier catches malformed input and stale internal state early:
//! φs that do not lead their block, misplaced terminators, φ/predecessor
//! disagreement, and control-flow graphs whose two adjacency directions
//! drifted apart.

use crate::flowgraph::ControlFlowGraph;
use crate::isa::TargetInstrAdapter;
use crate::mir::{BlockId, Function, InstKind};
use crate::result::{CodegenError, CodegenResult};
use std::collections::BTreeSet;

/// Verify the structural invariants of `func`.
pub fn verify_function(
    func: &Function,
    adapter: &dyn TargetInstrAdapter,
) -> CodegenResult<()> {
    for (&id, block) in &func.blocks {
        if block.id != id {
            return Err(CodegenError::InvariantViolation(format!(
                "block keyed {id} carries label {}",
                block.id
            )));
        }

        // φs precede all non-φs.
        let first_non_phi = block.first_non_phi();
        if block.insts[first_non_phi..].iter().any(|inst| inst.is_phi()) {
            return Err(CodegenError::MalformedIr {
                func: func.name.clone(),
                block: Some(id),
                message: "φ after a non-φ instruction".to_string(),
            });
        }

        // At most one terminator, and it must be last. A conditional
        // branch may precede the terminator or fall through off the end.
        for (index, inst) in block.insts.iter().enumerate() {
            let is_terminator = adapter.is_return(inst) || adapter.is_uncond_branch(inst);
            if is_terminator && index + 1 != block.insts.len() {
                return Err(CodegenError::MalformedIr {
                    func: func.name.clone(),
                    block: Some(id),
                    message: format!("terminator at {index} is not last"),
                });
            }
        }
    }

    let cfg = ControlFlowGraph::with_function(func, adapter);
    verify_cfg(&cfg)?;
    verify_phis(func, &cfg)
}

/// Check that every φ's predecessor set matches the CFG.
pub fn verify_phis(func: &Function, cfg: &ControlFlowGraph) -> CodegenResult<()> {
    for (&id, block) in &func.blocks {
        let preds: BTreeSet<BlockId> = cfg.preds(id).iter().copied().collect();
        for inst in &block.insts {
            if let InstKind::Phi(phi) = &inst.kind {
                let keys: BTreeSet<BlockId> = phi.incoming.keys().copied().collect();
                if keys != preds {
                    return Err(CodegenError::MalformedIr {
                        func: func.name.clone(),
                        block: Some(id),
                        message: format!(
                            "φ for {} names predecessors {keys:?}, CFG has {preds:?}",
                            phi.dst
                        ),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Check that the CFG's two adjacency directions agree and that neither
/// contains duplicate edges.
pub fn verify_cfg(cfg: &ControlFlowGraph) -> CodegenResult<()> {
    for id in 0..=cfg.max_label {
        let block = BlockId(id);
        let succs = cfg.succs(block);
        let mut seen = BTreeSet::new();
        for &succ in succs {
            if !seen.insert(succ) {
                return Err(CodegenError::InvariantViolation(format!(
                    "duplicate edge {block} -> {succ}"
                )));
            }
            if !cfg.preds(succ).contains(&block) {
                return Err(CodegenError::InvariantViolation(format!(
                    "edge {block} -> {succ} missing from predecessor lists"
                )));
            }
        }
        for &pred in cfg.preds(block) {
            if !cfg.succs(pred).contains(&block) {
                return Err(CodegenError::InvariantViolation(format!(
                    "edge {pred} -> {block} missing from successor lists"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::aarch64::AArch64Target;
    use crate::isa::TargetIsa;
    use crate::mir::{self, Operand, PhiInst, Register, I32};
    use crate::test_util::{b, ret};
    use std::collections::BTreeMap;

    #[test]
    fn accepts_well_formed_functions() {
        let target = AArch64Target::new();
        let mut func = Function::new("f");
        func.ensure_block(BlockId(0));
        func.push_inst(BlockId(0), b(1));
        func.ensure_block(BlockId(1));
        func.push_inst(BlockId(1), ret());
        verify_function(&func, target.adapter()).unwrap();
    }

    #[test]
    fn rejects_midblock_terminators() {
        let target = AArch64Target::new();
        let mut func = Function::new("f");
        func.ensure_block(BlockId(0));
        func.push_inst(BlockId(0), ret());
        func.push_inst(BlockId(0), ret());
        assert!(verify_function(&func, target.adapter()).is_err());
    }

    #[test]
    fn rejects_phi_after_non_phi() {
        let target = AArch64Target::new();
        let mut func = Function::new("f");
        let dst = func.new_vreg(I32);
        func.ensure_block(BlockId(0));
        func.push_inst(BlockId(0), b(1));
        func.ensure_block(BlockId(1));
        func.push_inst(BlockId(1), mir::create_move_imm(Operand::Reg(dst), 0));
        let mut incoming = BTreeMap::new();
        incoming.insert(BlockId(0), Operand::Imm(1));
        func.push_inst(
            BlockId(1),
            mir::MInst::new(InstKind::Phi(PhiInst { dst, incoming })),
        );
        func.push_inst(BlockId(1), ret());
        assert!(verify_function(&func, target.adapter()).is_err());
    }

    #[test]
    fn rejects_phi_pred_mismatch() {
        let target = AArch64Target::new();
        let mut func = Function::new("f");
        let dst = func.new_vreg(I32);
        func.ensure_block(BlockId(0));
        func.push_inst(BlockId(0), b(1));
        func.ensure_block(BlockId(1));
        let mut incoming = BTreeMap::new();
        incoming.insert(BlockId(9), Operand::Reg(Register::virt(5, I32)));
        func.push_inst(
            BlockId(1),
            mir::MInst::new(InstKind::Phi(PhiInst { dst, incoming })),
        );
        func.push_inst(BlockId(1), ret());
        assert!(verify_function(&func, target.adapter()).is_err());
    }
}
