//! Builds a selection DAG from one input SSA block.
//!
//! Construction is bottom-up from operands: every instruction's inputs are
//! resolved to `SDValue`s before its own node is requested, so the arena's
//! creation order is topological. Values defined in other blocks (or by φs,
//! which the selector lowers directly) enter the DAG as `Copy` nodes.
//! Memory operations are ordered by threading an explicit chain value,
//! starting at the DAG's entry token.

use crate::dag::{Isd, Payload, SDValue, SelectionDAG};
use crate::mir::{DataType, PTR, TOKEN};
use crate::result::{CodegenError, CodegenResult};
use crate::ssa::{self, BinaryOp, InstData, Value, ValueRef};
use log::trace;
use std::collections::BTreeMap;

/// The DAG built for one block, plus the mapping from the block's SSA
/// results to the nodes computing them (in definition order).
#[derive(Debug)]
pub struct BuiltDag {
    /// The DAG itself.
    pub dag: SelectionDAG,
    /// SSA values defined by this block's non-φ instructions.
    pub defs: Vec<(Value, SDValue)>,
}

/// Build the DAG for `block` of `func`. `value_types` must cover every SSA
/// value in the function (see `ssa::Function::value_types`).
pub fn build_block(
    func: &ssa::Function,
    block: &ssa::Block,
    value_types: &BTreeMap<Value, DataType>,
) -> CodegenResult<BuiltDag> {
    let dag = SelectionDAG::new();
    let chain = dag.entry_token();
    let mut b = Builder {
        func,
        block,
        value_types,
        dag,
        local: BTreeMap::new(),
        defs: Vec::new(),
        chain,
    };
    b.run()?;
    trace!(
        "built DAG for {} {}: {} nodes",
        func.name,
        block.id,
        b.dag.len()
    );
    Ok(BuiltDag { dag: b.dag, defs: b.defs })
}

struct Builder<'a> {
    func: &'a ssa::Function,
    block: &'a ssa::Block,
    value_types: &'a BTreeMap<Value, DataType>,
    dag: SelectionDAG,
    local: BTreeMap<Value, SDValue>,
    defs: Vec<(Value, SDValue)>,
    chain: SDValue,
}

impl Builder<'_> {
    fn run(&mut self) -> CodegenResult<()> {
        for inst in &self.block.insts {
            if inst.is_phi() {
                continue;
            }
            let value = self.lower_inst(inst)?;
            if let (Some(result), Some(value)) = (inst.result, value) {
                self.local.insert(result, value);
                self.defs.push((result, value));
            }
        }
        Ok(())
    }

    fn lower_inst(&mut self, inst: &ssa::Inst) -> CodegenResult<Option<SDValue>> {
        let value = match &inst.data {
            InstData::Binary { op, ty, lhs, rhs } => {
                let lhs = self.value(lhs)?;
                let rhs = self.value(rhs)?;
                Some(self.dag.get_node(binary_opcode(*op), &[lhs, rhs], *ty, Payload::None))
            }
            InstData::Icmp { cond, lhs, rhs } => {
                let lhs = self.value(lhs)?;
                let rhs = self.value(rhs)?;
                let code = u8::from(*cond);
                Some(self.dag.get_node(
                    Isd::Icmp,
                    &[lhs, rhs],
                    crate::mir::I32,
                    Payload::Int(i64::from(code)),
                ))
            }
            InstData::Load { ty, addr } => {
                let addr = self.value(addr)?;
                let chain = self.chain;
                Some(self.dag.get_node(Isd::Load, &[chain, addr], *ty, Payload::None))
            }
            InstData::Store { val, addr } => {
                let val = self.value(val)?;
                let addr = self.value(addr)?;
                let chain = self.chain;
                let store = self.dag.get_node(Isd::Store, &[chain, val, addr], TOKEN, Payload::None);
                self.chain = store;
                None
            }
            InstData::Alloca { ty, elems } => {
                let bytes = i64::from(ty.bytes() * elems);
                let chain = self.chain;
                let node = self.dag.get_node(Isd::Alloca, &[chain], PTR, Payload::Int(bytes));
                // Thread allocas on the chain so two identical allocations
                // stay distinct nodes.
                self.chain = SDValue::new(node.node, 1);
                Some(node)
            }
            InstData::Call { callee, ret, args } => {
                let mut operands = vec![self.chain];
                for arg in args {
                    let arg = self.value(arg)?;
                    operands.push(arg);
                }
                let ty = (*ret).unwrap_or(TOKEN);
                let call = self.dag.get_node(
                    Isd::Call,
                    &operands,
                    ty,
                    Payload::Str(callee.clone()),
                );
                self.chain = SDValue::new(call.node, 1);
                ret.is_some().then_some(call)
            }
            InstData::Phi { .. } => unreachable!("φs are lowered by the selector"),
            InstData::Br { dest } => {
                self.dag
                    .get_node(Isd::Br, &[], TOKEN, Payload::Int(i64::from(dest.0)));
                None
            }
            InstData::BrCond { cond, then_dest, else_dest } => {
                let cond = self.value(cond)?;
                self.dag.get_node(
                    Isd::BrCond,
                    &[cond],
                    TOKEN,
                    Payload::Int(i64::from(then_dest.0)),
                );
                // The else edge is the fall-through when it addresses the
                // next block in layout order; otherwise it needs its own
                // branch.
                let fallthrough = self.block.id.next();
                if *else_dest != fallthrough || !self.func.blocks.contains_key(&fallthrough) {
                    self.dag
                        .get_node(Isd::Br, &[], TOKEN, Payload::Int(i64::from(else_dest.0)));
                }
                None
            }
            InstData::Ret { value } => {
                let operands = match value {
                    Some(value) => vec![self.value(value)?],
                    None => vec![],
                };
                self.dag.get_node(Isd::Ret, &operands, TOKEN, Payload::None);
                None
            }
        };
        Ok(value)
    }

    fn value(&mut self, value: &ValueRef) -> CodegenResult<SDValue> {
        Ok(match value {
            ValueRef::Value(v) => {
                if let Some(&local) = self.local.get(v) {
                    local
                } else {
                    let ty = *self.value_types.get(v).ok_or_else(|| {
                        CodegenError::MalformedIr {
                            func: self.func.name.clone(),
                            block: Some(self.block.id),
                            message: format!("use of undefined value {v}"),
                        }
                    })?;
                    self.dag
                        .get_node(Isd::Copy, &[], ty, Payload::Int(i64::from(v.0)))
                }
            }
            ValueRef::ConstI32(v) => self.dag.const_i32(*v),
            ValueRef::ConstI64(v) => self.dag.const_i64(*v),
            ValueRef::ConstF32(v) => self.dag.const_f32(*v),
            ValueRef::Global(name) => {
                self.dag
                    .get_node(Isd::GlobalAddr, &[], PTR, Payload::Str(name.clone()))
            }
        })
    }
}

fn binary_opcode(op: BinaryOp) -> Isd {
    match op {
        BinaryOp::Add => Isd::Add,
        BinaryOp::Sub => Isd::Sub,
        BinaryOp::Mul => Isd::Mul,
        BinaryOp::SDiv => Isd::SDiv,
        BinaryOp::UDiv => Isd::UDiv,
        BinaryOp::And => Isd::And,
        BinaryOp::Or => Isd::Or,
        BinaryOp::Xor => Isd::Xor,
        BinaryOp::Shl => Isd::Shl,
        BinaryOp::Shr => Isd::Shr,
    }
}
