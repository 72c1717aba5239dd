//! The per-block selection DAG.
//!
//! Instruction selection works over a directed acyclic graph of target-
//! independent operations. Nodes live in an append-only arena owned by the
//! DAG; an [`SDValue`] is a non-owning `(node, result index)` handle.
//! Construction goes through [`SelectionDAG::get_node`], which uniques
//! nodes by content: requesting the same opcode, operands, type, and
//! payload twice returns the same node. Creation order is topological —
//! a node's operands always precede it in the arena — which the selector
//! exploits by walking nodes in id order.

use crate::mir::{DataType, TOKEN};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt;

pub mod builder;
mod folding_set;

pub use self::builder::{build_block, BuiltDag};
pub use self::folding_set::FoldingSetNodeId;

/// An opaque reference to a node in a selection DAG's arena.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeId(
    /// The arena index.
    pub u32,
);

impl NodeId {
    /// The underlying index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A non-owning handle to one result of a node.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SDValue {
    /// The node producing the value.
    pub node: NodeId,
    /// Which of the node's results this is (1 selects the chain output of
    /// a value-producing memory node).
    pub index: u32,
}

impl SDValue {
    /// Create a handle.
    pub fn new(node: NodeId, index: u32) -> Self {
        Self { node, index }
    }
}

/// Target-independent DAG operations.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Isd {
    /// The entry token: the start of this block's chain.
    Token,
    /// 32-bit integer constant (payload).
    ConstI32,
    /// 64-bit integer constant (payload).
    ConstI64,
    /// 32-bit float constant (payload).
    ConstF32,
    /// Read of an SSA value defined outside this DAG; the payload is the
    /// value number.
    Copy,
    /// Address of a global symbol (string payload).
    GlobalAddr,
    /// Integer or float addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Signed division.
    SDiv,
    /// Unsigned division.
    UDiv,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise exclusive or.
    Xor,
    /// Shift left.
    Shl,
    /// Logical shift right.
    Shr,
    /// Integer compare; the payload is the predicate code.
    Icmp,
    /// Conditional branch on operand 0; the payload is the target label.
    BrCond,
    /// Unconditional branch; the payload is the target label.
    Br,
    /// Return with an optional value operand.
    Ret,
    /// Memory load: operands `[chain, addr]`.
    Load,
    /// Memory store: operands `[chain, value, addr]`; the result is the
    /// outgoing chain.
    Store,
    /// Call: operands `[chain, args...]`, string payload names the callee.
    Call,
    /// Stack allocation: integer payload is the size in bytes.
    Alloca,
}

/// Immediate payload attached to a node: predicate codes, constants,
/// branch labels, or symbol names.
#[derive(Clone, PartialEq, Debug)]
pub enum Payload {
    /// No payload.
    None,
    /// An integer payload.
    Int(i64),
    /// A float payload.
    Float(f32),
    /// A string payload.
    Str(String),
}

/// A node in the selection DAG.
///
/// Nodes are immutable once created, with two exceptions used by the
/// legalizer: [`SDNode::replace_operands`] and [`SDNode::set_imm_i64`].
/// After either, the node's fingerprint in the uniquing table is stale;
/// the legalizer never looks a mutated node up again.
#[derive(Clone, Debug)]
pub struct SDNode {
    /// The operation.
    pub opcode: Isd,
    /// Operand values, in operation order.
    pub operands: SmallVec<[SDValue; 2]>,
    /// The type of result 0.
    pub ty: DataType,
    /// Immediate payload.
    pub payload: Payload,
}

impl SDNode {
    /// Number of operands.
    pub fn num_operands(&self) -> usize {
        self.operands.len()
    }

    /// Get operand `index`.
    pub fn operand(&self, index: usize) -> SDValue {
        self.operands[index]
    }

    /// The integer payload, if the node carries one.
    pub fn imm_i64(&self) -> Option<i64> {
        match self.payload {
            Payload::Int(v) => Some(v),
            _ => None,
        }
    }

    /// The string payload, if the node carries one.
    pub fn sym(&self) -> Option<&str> {
        match &self.payload {
            Payload::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Replace this node's operand list. Legalizer use only; the node's
    /// uniquing fingerprint becomes stale.
    pub fn replace_operands(&mut self, operands: impl IntoIterator<Item = SDValue>) {
        self.operands = operands.into_iter().collect();
    }

    /// Overwrite the integer payload. Legalizer use only; the node's
    /// uniquing fingerprint becomes stale.
    pub fn set_imm_i64(&mut self, value: i64) {
        self.payload = Payload::Int(value);
    }
}

/// A per-block selection DAG with content-addressed node uniquing.
#[derive(Debug)]
pub struct SelectionDAG {
    nodes: Vec<SDNode>,
    table: FxHashMap<FoldingSetNodeId, NodeId>,
    entry: SDValue,
}

impl SelectionDAG {
    /// Create an empty DAG containing only its entry token.
    pub fn new() -> Self {
        let mut dag = Self {
            nodes: Vec::new(),
            table: FxHashMap::default(),
            entry: SDValue::new(NodeId(0), 0),
        };
        dag.entry = dag.get_node(Isd::Token, &[], TOKEN, Payload::None);
        dag
    }

    /// The entry token, the default chain for memory operations.
    pub fn entry_token(&self) -> SDValue {
        self.entry
    }

    /// Get or create the node `(opcode, operands, ty, payload)`.
    ///
    /// On a fingerprint hit the existing node is returned; otherwise a new
    /// node is appended to the arena.
    pub fn get_node(
        &mut self,
        opcode: Isd,
        operands: &[SDValue],
        ty: DataType,
        payload: Payload,
    ) -> SDValue {
        let id = fingerprint(opcode, operands, ty, &payload);
        if let Some(&existing) = self.table.get(&id) {
            return SDValue::new(existing, 0);
        }
        let node = NodeId(self.nodes.len() as u32);
        self.nodes.push(SDNode {
            opcode,
            operands: operands.iter().copied().collect(),
            ty,
            payload,
        });
        self.table.insert(id, node);
        SDValue::new(node, 0)
    }

    /// Get or create a 32-bit integer constant node.
    pub fn const_i32(&mut self, value: i32) -> SDValue {
        self.get_node(
            Isd::ConstI32,
            &[],
            crate::mir::I32,
            Payload::Int(i64::from(value)),
        )
    }

    /// Get or create a 64-bit integer constant node.
    pub fn const_i64(&mut self, value: i64) -> SDValue {
        self.get_node(Isd::ConstI64, &[], crate::mir::I64, Payload::Int(value))
    }

    /// Get or create a 32-bit float constant node.
    pub fn const_f32(&mut self, value: f32) -> SDValue {
        self.get_node(Isd::ConstF32, &[], crate::mir::F32, Payload::Float(value))
    }

    /// Borrow a node.
    pub fn node(&self, id: NodeId) -> &SDNode {
        &self.nodes[id.index()]
    }

    /// Borrow a node mutably. Legalizer use only: after mutation the node
    /// must not be looked up again in this pass.
    pub fn node_mut(&mut self, id: NodeId) -> &mut SDNode {
        &mut self.nodes[id.index()]
    }

    /// Iterate node ids in creation (topological) order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// Number of nodes, including the entry token.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// A DAG is never empty; it at least holds its entry token.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for SelectionDAG {
    fn default() -> Self {
        Self::new()
    }
}

fn fingerprint(
    opcode: Isd,
    operands: &[SDValue],
    ty: DataType,
    payload: &Payload,
) -> FoldingSetNodeId {
    let mut id = FoldingSetNodeId::new();
    id.add_index(opcode as u32);
    for operand in operands {
        id.add_index(operand.node.0);
        id.add_index(operand.index);
    }
    id.add_index(ty.kind as u32);
    id.add_index(ty.width as u32);
    match payload {
        Payload::None => id.add_boolean(false),
        Payload::Int(v) => {
            id.add_boolean(true);
            id.add_integer(*v);
        }
        Payload::Float(v) => {
            id.add_boolean(true);
            id.add_float(*v);
        }
        Payload::Str(s) => {
            id.add_boolean(true);
            id.add_string(s);
        }
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::I32;

    #[test]
    fn nodes_are_uniqued() {
        let mut dag = SelectionDAG::new();
        let a = dag.const_i32(5);
        let b = dag.const_i32(5);
        assert_eq!(a, b);

        let lhs = dag.const_i32(1);
        let rhs = dag.const_i32(2);
        let x = dag.get_node(Isd::Add, &[lhs, rhs], I32, Payload::None);
        let y = dag.get_node(Isd::Add, &[lhs, rhs], I32, Payload::None);
        assert_eq!(x, y);

        // Same operands, different opcode: distinct.
        let z = dag.get_node(Isd::Sub, &[lhs, rhs], I32, Payload::None);
        assert_ne!(x, z);
    }

    #[test]
    fn types_and_payloads_distinguish() {
        let mut dag = SelectionDAG::new();
        assert_ne!(dag.const_i32(5), dag.const_i64(5));
        let a = dag.get_node(Isd::Icmp, &[], I32, Payload::Int(0));
        let b = dag.get_node(Isd::Icmp, &[], I32, Payload::Int(1));
        assert_ne!(a, b);
    }

    #[test]
    fn entry_token_is_node_zero() {
        let dag = SelectionDAG::new();
        assert_eq!(dag.entry_token(), SDValue::new(NodeId(0), 0));
        assert_eq!(dag.node(NodeId(0)).opcode, Isd::Token);
        assert_eq!(dag.len(), 1);
    }

    #[test]
    fn mutation_is_visible() {
        let mut dag = SelectionDAG::new();
        let lhs = dag.const_i32(5);
        let rhs = dag.const_i32(7);
        let cmp = dag.get_node(Isd::Icmp, &[lhs, rhs], I32, Payload::Int(2));
        dag.node_mut(cmp.node).replace_operands([rhs, lhs]);
        dag.node_mut(cmp.node).set_imm_i64(3);
        let node = dag.node(cmp.node);
        assert_eq!(node.operand(0), rhs);
        assert_eq!(node.imm_i64(), Some(3));
    }

    #[test]
    fn creation_order_is_topological() {
        let mut dag = SelectionDAG::new();
        let a = dag.const_i32(1);
        let b = dag.const_i32(2);
        let sum = dag.get_node(Isd::Add, &[a, b], I32, Payload::None);
        assert!(a.node < sum.node && b.node < sum.node);
    }
}
