//! AArch64 instruction selection: per-block DAGs in, MIR over virtual
//! registers out.
//!
//! Every SSA value gets a virtual register up front; DAG nodes are then
//! walked in creation order (which is topological) and each value-producing
//! node writes the register of the SSA value it defines. Because the DAG
//! uniques nodes, two SSA values can share one node — the extra values are
//! satisfied with register copies. φs never enter the DAG; they are lowered
//! here directly into `Phi` pseudos for the φ-elimination pass.
//!
//! Compares fuse with the conditional branches that consume them: an
//! `Icmp` used only by `BrCond`s emits no `cset`, just a `cmp` right
//! before each `b.cond`.

use crate::dag::{BuiltDag, Isd, NodeId, SDValue};
use crate::isa::aarch64::inst::{A64Op, Cond};
use crate::isa::aarch64::regs::{fpr, gpr};
use crate::mir::{
    self, BlockId, DataType, InstKind, MInst, Operand, PhiInst, Register, TargetOpcode, TOKEN,
};
use crate::result::{CodegenError, CodegenResult};
use crate::ssa::{self, IcmpCond, InstData, Value, ValueRef};
use log::{debug, trace};
use std::collections::BTreeMap;

/// Number of argument registers per class in AAPCS64.
const MAX_REG_ARGS: usize = 8;

/// Select machine instructions for `func` from its per-block DAGs.
pub fn select_function(
    func: &ssa::Function,
    dags: &BTreeMap<BlockId, BuiltDag>,
) -> CodegenResult<mir::Function> {
    let mut sel = Selector::new(func)?;
    sel.lower_params()?;
    for (&id, block) in &func.blocks {
        let built = dags.get(&id).ok_or_else(|| {
            CodegenError::InvariantViolation(format!("no DAG built for {} {id}", func.name))
        })?;
        sel.lower_block(block, built)?;
    }
    debug!(
        "selected {}: {} vregs, {} blocks",
        func.name,
        sel.mf.vreg_count(),
        sel.mf.blocks.len()
    );
    Ok(sel.mf)
}

struct Selector<'a> {
    func: &'a ssa::Function,
    mf: mir::Function,
    value_regs: BTreeMap<Value, Register>,
}

impl<'a> Selector<'a> {
    fn new(func: &'a ssa::Function) -> CodegenResult<Self> {
        if !func.blocks.contains_key(&BlockId(0)) {
            return Err(CodegenError::MalformedIr {
                func: func.name.clone(),
                block: None,
                message: "function has no entry block".to_string(),
            });
        }

        let mut mf = mir::Function::new(func.name.clone());
        let mut value_regs = BTreeMap::new();

        // Pre-assign a virtual register to every SSA value, params first,
        // then results in block/instruction order. Forward references (φs,
        // cross-block uses) then always have a register to name.
        for &(value, ty) in &func.params {
            let reg = mf.new_vreg(ty);
            value_regs.insert(value, reg);
            mf.params.push(reg);
        }
        for block in func.blocks.values() {
            for inst in &block.insts {
                if let (Some(result), Some(ty)) = (inst.result, inst.result_type()) {
                    value_regs.insert(result, mf.new_vreg(ty));
                }
            }
        }
        for &id in func.blocks.keys() {
            mf.ensure_block(id);
        }

        Ok(Self { func, mf, value_regs })
    }

    fn value_reg(&self, value: Value) -> CodegenResult<Register> {
        self.value_regs.get(&value).copied().ok_or_else(|| {
            CodegenError::MalformedIr {
                func: self.func.name.clone(),
                block: None,
                message: format!("use of undefined value {value}"),
            }
        })
    }

    /// Move incoming arguments into their parameter registers.
    fn lower_params(&mut self) -> CodegenResult<()> {
        let entry = BlockId(0);
        let mut int_idx = 0;
        let mut float_idx = 0;
        for (index, &(value, ty)) in self.func.params.iter().enumerate() {
            let dst = self.value_reg(value)?;
            let slot_idx = if ty.is_float() { &mut float_idx } else { &mut int_idx };
            if *slot_idx < MAX_REG_ARGS {
                let src = if ty.is_float() {
                    fpr(*slot_idx as u32, ty)
                } else {
                    gpr(*slot_idx as u32, ty)
                };
                *slot_idx += 1;
                let inst = mir::create_move(Operand::Reg(dst), Operand::Reg(src));
                self.mf.push_inst(entry, inst);
            } else {
                // Past the register limit: the caller left it on the stack.
                let slot = self.mf.frame.new_incoming_arg_slot();
                self.mf.has_stack_param = true;
                self.mf.param_size += 8;
                trace!("param {index} of {} from stack {slot}", self.func.name);
                let inst = MInst::new(InstKind::FrameLoad { dst, slot });
                self.mf.push_inst(entry, inst);
            }
        }
        Ok(())
    }

    fn phi_operand(&self, value: &ValueRef) -> CodegenResult<Operand> {
        Ok(match value {
            ValueRef::Value(v) => Operand::Reg(self.value_reg(*v)?),
            ValueRef::ConstI32(c) => Operand::Imm(i64::from(*c)),
            ValueRef::ConstI64(c) => Operand::Imm(*c),
            ValueRef::ConstF32(c) => Operand::FpImm(*c),
            ValueRef::Global(name) => {
                return Err(CodegenError::Unsupported(format!(
                    "φ of global address {name}"
                )))
            }
        })
    }

    fn lower_block(&mut self, block: &ssa::Block, built: &BuiltDag) -> CodegenResult<()> {
        // φs first, straight from the IR.
        for inst in block.insts.iter().filter(|inst| inst.is_phi()) {
            let incoming = match &inst.data {
                InstData::Phi { incoming, .. } => incoming,
                _ => unreachable!(),
            };
            let result = inst.result.ok_or_else(|| CodegenError::MalformedIr {
                func: self.func.name.clone(),
                block: Some(block.id),
                message: "φ without a result".to_string(),
            })?;
            let dst = self.value_reg(result)?;
            let mut map = BTreeMap::new();
            for (pred, value) in incoming {
                map.insert(*pred, self.phi_operand(value)?);
            }
            let inst = MInst::new(InstKind::Phi(PhiInst { dst, incoming: map }));
            self.mf.push_inst(block.id, inst);
        }

        BlockSelector::new(self, block.id, built)?.run()
    }
}

/// Per-block selection state.
struct BlockSelector<'s, 'a> {
    sel: &'s mut Selector<'a>,
    block: BlockId,
    built: &'s BuiltDag,
    /// Register computed for each node, once emitted.
    node_regs: Vec<Option<Register>>,
    /// Values each node defines, from the builder's def list.
    node_values: BTreeMap<NodeId, Vec<Value>>,
    /// Icmp nodes all of whose uses are BrCond conditions; they emit no
    /// standalone `cset`.
    fused: Vec<bool>,
}

impl<'s, 'a> BlockSelector<'s, 'a> {
    fn new(
        sel: &'s mut Selector<'a>,
        block: BlockId,
        built: &'s BuiltDag,
    ) -> CodegenResult<Self> {
        let dag = &built.dag;
        let len = dag.len();

        let mut node_values: BTreeMap<NodeId, Vec<Value>> = BTreeMap::new();
        for &(value, sdval) in &built.defs {
            node_values.entry(sdval.node).or_default().push(value);
        }

        let mut uses = vec![0u32; len];
        let mut brcond_uses = vec![0u32; len];
        for id in dag.node_ids() {
            let node = dag.node(id);
            for (slot, operand) in node.operands.iter().enumerate() {
                uses[operand.node.index()] += 1;
                if node.opcode == Isd::BrCond && slot == 0 {
                    brcond_uses[operand.node.index()] += 1;
                }
            }
        }
        let fused = dag
            .node_ids()
            .map(|id| {
                dag.node(id).opcode == Isd::Icmp
                    && uses[id.index()] > 0
                    && uses[id.index()] == brcond_uses[id.index()]
            })
            .collect();

        Ok(Self {
            sel,
            block,
            built,
            node_regs: vec![None; len],
            node_values,
            fused,
        })
    }

    fn reg_of(&self, value: SDValue) -> CodegenResult<Register> {
        self.node_regs[value.node.index()].ok_or_else(|| {
            CodegenError::InvariantViolation(format!(
                "node {} used as a value before selection",
                value.node
            ))
        })
    }

    fn push(&mut self, inst: MInst) {
        self.sel.mf.push_inst(self.block, inst);
    }

    fn target(&mut self, op: A64Op, operands: impl IntoIterator<Item = Operand>) {
        let inst = MInst::target(TargetOpcode(op.into()), operands);
        self.push(inst);
    }

    /// The register a value-producing node should define: the register of
    /// its first SSA value if it has one, a fresh vreg otherwise.
    fn def_reg(&mut self, id: NodeId, ty: DataType) -> CodegenResult<Register> {
        match self.node_values.get(&id).and_then(|values| values.first()) {
            Some(&value) => self.sel.value_reg(value),
            None => Ok(self.sel.mf.new_vreg(ty)),
        }
    }

    /// Copy the node's result into the registers of any further SSA values
    /// folded onto the same node.
    fn satisfy_extra_values(&mut self, id: NodeId, reg: Register) -> CodegenResult<()> {
        let extra = match self.node_values.get(&id) {
            Some(values) if values.len() > 1 => values[1..].to_vec(),
            _ => return Ok(()),
        };
        for value in extra {
            let dst = self.sel.value_reg(value)?;
            let inst = mir::create_move(Operand::Reg(dst), Operand::Reg(reg));
            self.push(inst);
        }
        Ok(())
    }

    fn run(mut self) -> CodegenResult<()> {
        for id in self.built.dag.node_ids() {
            self.lower_node(id)?;
            if let Some(reg) = self.node_regs[id.index()] {
                self.satisfy_extra_values(id, reg)?;
            }
        }
        Ok(())
    }

    /// Emit the `cmp`/`fcmp` for a compare's operands and return the branch
    /// condition.
    fn emit_compare(&mut self, icmp: NodeId) -> CodegenResult<Cond> {
        let node = self.built.dag.node(icmp);
        let lhs = self.reg_of(node.operand(0))?;
        let rhs = self.reg_of(node.operand(1))?;
        let code = node.imm_i64().unwrap_or(0);
        let cond = IcmpCond::try_from(code as u8).map_err(|_| {
            CodegenError::InvariantViolation(format!("bad predicate code {code}"))
        })?;
        let op = if lhs.is_float() { A64Op::FCmp } else { A64Op::Cmp };
        self.target(op, [Operand::Reg(lhs), Operand::Reg(rhs)]);
        Ok(Cond::from_icmp(cond))
    }

    fn lower_node(&mut self, id: NodeId) -> CodegenResult<()> {
        let node = self.built.dag.node(id).clone();
        match node.opcode {
            Isd::Token => {}
            Isd::ConstI32 | Isd::ConstI64 => {
                let dst = self.def_reg(id, node.ty)?;
                let imm = node.imm_i64().unwrap_or(0);
                self.target(A64Op::MovImm, [Operand::Reg(dst), Operand::Imm(imm)]);
                self.node_regs[id.index()] = Some(dst);
            }
            Isd::ConstF32 => {
                let dst = self.def_reg(id, node.ty)?;
                let imm = match node.payload {
                    crate::dag::Payload::Float(v) => v,
                    _ => 0.0,
                };
                self.target(A64Op::FMovImm, [Operand::Reg(dst), Operand::FpImm(imm)]);
                self.node_regs[id.index()] = Some(dst);
            }
            Isd::Copy => {
                let value = Value(node.imm_i64().unwrap_or(0) as u32);
                let reg = self.sel.value_reg(value)?;
                self.node_regs[id.index()] = Some(reg);
            }
            Isd::GlobalAddr => {
                let sym = node.sym().unwrap_or("").to_string();
                let page = self.sel.mf.new_vreg(node.ty);
                self.target(A64Op::Adrp, [Operand::Reg(page), Operand::Sym(sym.clone())]);
                let dst = self.def_reg(id, node.ty)?;
                self.target(
                    A64Op::AddLo12,
                    [Operand::Reg(dst), Operand::Reg(page), Operand::Sym(sym)],
                );
                self.node_regs[id.index()] = Some(dst);
            }
            Isd::Add
            | Isd::Sub
            | Isd::Mul
            | Isd::SDiv
            | Isd::UDiv
            | Isd::And
            | Isd::Or
            | Isd::Xor
            | Isd::Shl
            | Isd::Shr => {
                let lhs = self.reg_of(node.operand(0))?;
                let rhs = self.reg_of(node.operand(1))?;
                let op = binary_op(node.opcode, node.ty)?;
                let dst = self.def_reg(id, node.ty)?;
                self.target(
                    op,
                    [Operand::Reg(dst), Operand::Reg(lhs), Operand::Reg(rhs)],
                );
                self.node_regs[id.index()] = Some(dst);
            }
            Isd::Icmp => {
                if self.fused[id.index()] {
                    // Every use is a BrCond; the compare is emitted at the
                    // branch.
                    return Ok(());
                }
                let cond = self.emit_compare(id)?;
                let dst = self.def_reg(id, node.ty)?;
                self.target(
                    A64Op::CSet,
                    [Operand::Reg(dst), Operand::Imm(i64::from(u16::from(cond)))],
                );
                self.node_regs[id.index()] = Some(dst);
            }
            Isd::Load => {
                let addr = self.reg_of(node.operand(1))?;
                let dst = self.def_reg(id, node.ty)?;
                self.target(A64Op::Ldr, [Operand::Reg(dst), Operand::Reg(addr)]);
                self.node_regs[id.index()] = Some(dst);
            }
            Isd::Store => {
                let value = self.reg_of(node.operand(1))?;
                let addr = self.reg_of(node.operand(2))?;
                self.target(A64Op::Str, [Operand::Reg(value), Operand::Reg(addr)]);
            }
            Isd::Alloca => {
                let bytes = node.imm_i64().unwrap_or(0) as u32;
                let slot = self.sel.mf.frame.new_local_slot(bytes.max(8));
                self.sel.mf.allocs.push(slot);
                let dst = self.def_reg(id, node.ty)?;
                let inst = MInst::new(InstKind::FrameAddr { dst, slot });
                self.push(inst);
                self.node_regs[id.index()] = Some(dst);
            }
            Isd::Call => {
                self.lower_call(id, &node)?;
            }
            Isd::Br => {
                let label = BlockId(node.imm_i64().unwrap_or(0) as u32);
                self.target(A64Op::B, [Operand::Label(label)]);
            }
            Isd::BrCond => {
                let label = BlockId(node.imm_i64().unwrap_or(0) as u32);
                let cond_value = node.operand(0);
                let cond_node = self.built.dag.node(cond_value.node);
                let cond = if cond_node.opcode == Isd::Icmp {
                    self.emit_compare(cond_value.node)?
                } else {
                    // A bare boolean: branch on non-zero.
                    let reg = self.reg_of(cond_value)?;
                    self.target(A64Op::CmpImm, [Operand::Reg(reg), Operand::Imm(0)]);
                    Cond::Ne
                };
                self.target(
                    A64Op::BCond,
                    [
                        Operand::Imm(i64::from(u16::from(cond))),
                        Operand::Label(label),
                    ],
                );
            }
            Isd::Ret => {
                if node.num_operands() == 1 {
                    let value = self.reg_of(node.operand(0))?;
                    let dst = if value.is_float() {
                        fpr(0, value.ty)
                    } else {
                        gpr(0, value.ty)
                    };
                    let inst = mir::create_move(Operand::Reg(dst), Operand::Reg(value));
                    self.push(inst);
                }
                self.target(A64Op::Ret, []);
            }
        }
        Ok(())
    }

    fn lower_call(&mut self, id: NodeId, node: &crate::dag::SDNode) -> CodegenResult<()> {
        let callee = node.sym().unwrap_or("").to_string();
        let mut int_idx = 0usize;
        let mut float_idx = 0usize;
        let mut stack_idx = 0u32;

        for slot in 1..node.num_operands() {
            let arg = node.operand(slot);
            let reg = self.reg_of(arg)?;
            let class_idx = if reg.is_float() { &mut float_idx } else { &mut int_idx };
            if *class_idx < MAX_REG_ARGS {
                let dst = if reg.is_float() {
                    fpr(*class_idx as u32, reg.ty)
                } else {
                    gpr(*class_idx as u32, reg.ty)
                };
                *class_idx += 1;
                let inst = mir::create_move(Operand::Reg(dst), Operand::Reg(reg));
                self.push(inst);
            } else {
                // Outgoing stack argument: the area sits at the bottom of
                // our frame, so the offset is valid as soon as the frame is
                // open.
                self.target(
                    A64Op::StrSp,
                    [Operand::Reg(reg), Operand::Imm(i64::from(stack_idx * 8))],
                );
                stack_idx += 1;
            }
        }
        self.sel.mf.max_outgoing = self.sel.mf.max_outgoing.max(stack_idx * 8);

        self.target(A64Op::Bl, [Operand::Sym(callee)]);

        if node.ty != TOKEN {
            let dst = self.def_reg(id, node.ty)?;
            let src = if node.ty.is_float() {
                fpr(0, node.ty)
            } else {
                gpr(0, node.ty)
            };
            let inst = mir::create_move(Operand::Reg(dst), Operand::Reg(src));
            self.push(inst);
            self.node_regs[id.index()] = Some(dst);
        }
        Ok(())
    }
}

fn binary_op(opcode: Isd, ty: DataType) -> CodegenResult<A64Op> {
    if ty.is_float() {
        return match opcode {
            Isd::Add => Ok(A64Op::FAdd),
            Isd::Sub => Ok(A64Op::FSub),
            Isd::Mul => Ok(A64Op::FMul),
            Isd::SDiv => Ok(A64Op::FDiv),
            _ => Err(CodegenError::Unsupported(format!(
                "float {opcode:?} has no aarch64 lowering"
            ))),
        };
    }
    Ok(match opcode {
        Isd::Add => A64Op::Add,
        Isd::Sub => A64Op::Sub,
        Isd::Mul => A64Op::Mul,
        Isd::SDiv => A64Op::SDiv,
        Isd::UDiv => A64Op::UDiv,
        Isd::And => A64Op::And,
        Isd::Or => A64Op::Orr,
        Isd::Xor => A64Op::Eor,
        Isd::Shl => A64Op::Lsl,
        Isd::Shr => A64Op::Lsr,
        _ => unreachable!("not a binary opcode: {opcode:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag;
    use crate::ssa::BinaryOp;

    fn build_dags(func: &ssa::Function) -> BTreeMap<BlockId, BuiltDag> {
        let types = func.value_types();
        func.blocks
            .iter()
            .map(|(&id, block)| (id, dag::build_block(func, block, &types).unwrap()))
            .collect()
    }

    fn ops_of(mf: &mir::Function, block: BlockId) -> Vec<InstKind> {
        mf.blocks[&block].insts.iter().map(|i| i.kind.clone()).collect()
    }

    fn is_op(kind: &InstKind, op: A64Op) -> bool {
        matches!(kind, InstKind::Target(t) if t.op.0 == u16::from(op))
    }

    #[test]
    fn single_block_add() {
        // Scenario: `%2 = add i32 %0, %1; ret %2` selects to two parameter
        // moves, one add, a return-value move, and a ret.
        let mut func = ssa::Function::new("add");
        let a = func.add_param(mir::I32);
        let b = func.add_param(mir::I32);
        let sum = func.push_value_inst(
            BlockId(0),
            InstData::Binary {
                op: BinaryOp::Add,
                ty: mir::I32,
                lhs: ValueRef::Value(a),
                rhs: ValueRef::Value(b),
            },
        );
        func.push_inst(BlockId(0), InstData::Ret { value: Some(ValueRef::Value(sum)) });

        let mf = select_function(&func, &build_dags(&func)).unwrap();
        let ops = ops_of(&mf, BlockId(0));
        assert_eq!(ops.len(), 5);
        assert!(matches!(ops[0], InstKind::Move { .. }));
        assert!(matches!(ops[1], InstKind::Move { .. }));
        assert!(is_op(&ops[2], A64Op::Add));
        assert!(matches!(ops[3], InstKind::Move { .. }));
        assert!(is_op(&ops[4], A64Op::Ret));
        assert_eq!(mf.params.len(), 2);
    }

    #[test]
    fn fused_compare_emits_no_cset() {
        let mut func = ssa::Function::new("f");
        let a = func.add_param(mir::I32);
        let cmp = func.push_value_inst(
            BlockId(0),
            InstData::Icmp {
                cond: IcmpCond::Slt,
                lhs: ValueRef::Value(a),
                rhs: ValueRef::ConstI32(10),
            },
        );
        func.push_inst(
            BlockId(0),
            InstData::BrCond {
                cond: ValueRef::Value(cmp),
                then_dest: BlockId(2),
                else_dest: BlockId(1),
            },
        );
        func.push_inst(BlockId(1), InstData::Ret { value: None });
        func.push_inst(BlockId(2), InstData::Ret { value: None });

        let mf = select_function(&func, &build_dags(&func)).unwrap();
        let ops = ops_of(&mf, BlockId(0));
        assert!(ops.iter().any(|k| is_op(k, A64Op::Cmp)));
        assert!(ops.iter().any(|k| is_op(k, A64Op::BCond)));
        assert!(!ops.iter().any(|k| is_op(k, A64Op::CSet)));
        // The else edge is the fall-through to block 1, so no trailing `b`.
        assert!(!ops.iter().any(|k| is_op(k, A64Op::B)));
    }

    #[test]
    fn compare_used_as_value_materializes() {
        let mut func = ssa::Function::new("f");
        let a = func.add_param(mir::I32);
        let cmp = func.push_value_inst(
            BlockId(0),
            InstData::Icmp {
                cond: IcmpCond::Eq,
                lhs: ValueRef::Value(a),
                rhs: ValueRef::ConstI32(0),
            },
        );
        func.push_inst(BlockId(0), InstData::Ret { value: Some(ValueRef::Value(cmp)) });

        let mf = select_function(&func, &build_dags(&func)).unwrap();
        let ops = ops_of(&mf, BlockId(0));
        assert!(ops.iter().any(|k| is_op(k, A64Op::CSet)));
    }

    #[test]
    fn phis_become_phi_pseudos() {
        let mut func = ssa::Function::new("f");
        let a = func.add_param(mir::I32);
        func.push_inst(
            BlockId(0),
            InstData::BrCond {
                cond: ValueRef::Value(a),
                then_dest: BlockId(1),
                else_dest: BlockId(2),
            },
        );
        func.push_inst(BlockId(1), InstData::Br { dest: BlockId(3) });
        func.push_inst(BlockId(2), InstData::Br { dest: BlockId(3) });
        let phi = func.push_value_inst(
            BlockId(3),
            InstData::Phi {
                ty: mir::I32,
                incoming: vec![
                    (BlockId(1), ValueRef::ConstI32(1)),
                    (BlockId(2), ValueRef::Value(a)),
                ],
            },
        );
        func.push_inst(BlockId(3), InstData::Ret { value: Some(ValueRef::Value(phi)) });

        let mf = select_function(&func, &build_dags(&func)).unwrap();
        let ops = ops_of(&mf, BlockId(3));
        match &ops[0] {
            InstKind::Phi(phi) => {
                assert_eq!(phi.incoming.len(), 2);
                assert_eq!(phi.incoming[&BlockId(1)], Operand::Imm(1));
            }
            other => panic!("expected φ first, got {other:?}"),
        }
    }

    #[test]
    fn call_marshals_arguments() {
        let mut func = ssa::Function::new("f");
        let a = func.add_param(mir::I32);
        let r = func.push_value_inst(
            BlockId(0),
            InstData::Call {
                callee: "g".to_string(),
                ret: Some(mir::I32),
                args: vec![ValueRef::Value(a), ValueRef::ConstI32(7)],
            },
        );
        func.push_inst(BlockId(0), InstData::Ret { value: Some(ValueRef::Value(r)) });

        let mf = select_function(&func, &build_dags(&func)).unwrap();
        let ops = ops_of(&mf, BlockId(0));
        let bl_at = ops.iter().position(|k| is_op(k, A64Op::Bl)).unwrap();
        // Two argument moves directly precede the call.
        assert!(matches!(&ops[bl_at - 1], InstKind::Move { dst: Operand::Reg(r), .. } if !r.virt));
        assert!(matches!(&ops[bl_at - 2], InstKind::Move { dst: Operand::Reg(r), .. } if !r.virt));
        // The result lands in a vreg from r0.
        assert!(matches!(&ops[bl_at + 1], InstKind::Move { src: Operand::Reg(r), .. } if r.id == 0));
    }

    #[test]
    fn stack_args_spill_to_outgoing_area() {
        let mut func = ssa::Function::new("f");
        let args: Vec<ValueRef> = (0..10).map(ValueRef::ConstI32).collect();
        func.push_inst(
            BlockId(0),
            InstData::Call { callee: "g".to_string(), ret: None, args },
        );
        func.push_inst(BlockId(0), InstData::Ret { value: None });

        let mf = select_function(&func, &build_dags(&func)).unwrap();
        assert_eq!(mf.max_outgoing, 16);
        let ops = ops_of(&mf, BlockId(0));
        assert_eq!(ops.iter().filter(|k| is_op(k, A64Op::StrSp)).count(), 2);
    }

    #[test]
    fn stack_params_load_from_caller_frame() {
        let mut func = ssa::Function::new("f");
        for _ in 0..9 {
            func.add_param(mir::I32);
        }
        let last = func.params[8].0;
        func.push_inst(BlockId(0), InstData::Ret { value: Some(ValueRef::Value(last)) });

        let mf = select_function(&func, &build_dags(&func)).unwrap();
        assert!(mf.has_stack_param);
        assert_eq!(mf.param_size, 8);
        let ops = ops_of(&mf, BlockId(0));
        assert!(ops.iter().any(|k| matches!(k, InstKind::FrameLoad { .. })));
    }
}
