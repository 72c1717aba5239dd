//! AArch64 DAG legalization.
//!
//! The only rewrite in the minimum surface is integer-compare operand
//! canonicalization: `cmp` wants the constant on the right, so
//! `icmp pred (const, x)` becomes `icmp pred' (x, const)` with the
//! predicate mirrored. The mutated node is never looked up in the
//! uniquing table again within this pass.

use crate::dag::{Isd, SelectionDAG};
use crate::ssa::IcmpCond;
use log::trace;

fn swap_predicate(cond: IcmpCond) -> IcmpCond {
    match cond {
        IcmpCond::Eq => IcmpCond::Eq,
        IcmpCond::Ne => IcmpCond::Ne,
        IcmpCond::Slt => IcmpCond::Sgt,
        IcmpCond::Sgt => IcmpCond::Slt,
        IcmpCond::Sle => IcmpCond::Sge,
        IcmpCond::Sge => IcmpCond::Sle,
        IcmpCond::Ult => IcmpCond::Ugt,
        IcmpCond::Ugt => IcmpCond::Ult,
        IcmpCond::Ule => IcmpCond::Uge,
        IcmpCond::Uge => IcmpCond::Ule,
    }
}

fn is_int_const(dag: &SelectionDAG, node: crate::dag::NodeId) -> bool {
    matches!(dag.node(node).opcode, Isd::ConstI32 | Isd::ConstI64)
}

/// Canonicalize every `Icmp` node in `dag`.
pub fn run(dag: &mut SelectionDAG) {
    for id in dag.node_ids().collect::<Vec<_>>() {
        let node = dag.node(id);
        if node.opcode != Isd::Icmp || node.num_operands() != 2 {
            continue;
        }
        let lhs = node.operand(0);
        let rhs = node.operand(1);
        if !is_int_const(dag, lhs.node) || is_int_const(dag, rhs.node) {
            continue;
        }

        let code = dag.node(id).imm_i64().unwrap_or(0);
        let cond = IcmpCond::try_from(code as u8).unwrap_or(IcmpCond::Eq);
        let swapped = swap_predicate(cond);
        trace!("canonicalizing {id}: {cond:?} -> {swapped:?}");

        let node = dag.node_mut(id);
        node.set_imm_i64(i64::from(u8::from(swapped)));
        node.replace_operands([rhs, lhs]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::Payload;
    use crate::mir::I32;

    fn icmp_code(cond: IcmpCond) -> i64 {
        i64::from(u8::from(cond))
    }

    #[test]
    fn constant_moves_right_and_predicate_mirrors() {
        // Scenario: ICMP SLT (const 5) (reg x) becomes
        // ICMP SGT (reg x) (const 5).
        let mut dag = SelectionDAG::new();
        let five = dag.const_i32(5);
        let x = dag.get_node(Isd::Copy, &[], I32, Payload::Int(0));
        let cmp = dag.get_node(Isd::Icmp, &[five, x], I32, Payload::Int(icmp_code(IcmpCond::Slt)));

        run(&mut dag);

        let node = dag.node(cmp.node);
        assert_eq!(node.operand(0), x);
        assert_eq!(node.operand(1), five);
        assert_eq!(node.imm_i64(), Some(icmp_code(IcmpCond::Sgt)));
    }

    #[test]
    fn symmetric_predicates_swap_both_ways() {
        for (from, to) in [
            (IcmpCond::Eq, IcmpCond::Eq),
            (IcmpCond::Ne, IcmpCond::Ne),
            (IcmpCond::Sle, IcmpCond::Sge),
            (IcmpCond::Sge, IcmpCond::Sle),
            (IcmpCond::Ult, IcmpCond::Ugt),
            (IcmpCond::Ule, IcmpCond::Uge),
        ] {
            assert_eq!(swap_predicate(from), to);
            assert_eq!(swap_predicate(to), from);
        }
    }

    #[test]
    fn canonical_compares_are_untouched() {
        let mut dag = SelectionDAG::new();
        let x = dag.get_node(Isd::Copy, &[], I32, Payload::Int(0));
        let five = dag.const_i32(5);
        let cmp = dag.get_node(Isd::Icmp, &[x, five], I32, Payload::Int(icmp_code(IcmpCond::Slt)));
        run(&mut dag);
        let node = dag.node(cmp.node);
        assert_eq!(node.operand(0), x);
        assert_eq!(node.imm_i64(), Some(icmp_code(IcmpCond::Slt)));
    }

    #[test]
    fn const_const_compares_are_untouched() {
        let mut dag = SelectionDAG::new();
        let a = dag.const_i32(1);
        let b = dag.const_i32(2);
        let cmp = dag.get_node(Isd::Icmp, &[a, b], I32, Payload::Int(icmp_code(IcmpCond::Slt)));
        run(&mut dag);
        assert_eq!(dag.node(cmp.node).operand(0), a);
    }
}
