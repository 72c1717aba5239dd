//! The backend's read-only view of the middle-end SSA IR.
//!
//! The middle-end owns parsing, optimization, and the full-fat IR; what the
//! backend needs is much smaller: per function, an ordered block map, and
//! per block a stream of instructions the DAG builder can consume. This
//! module is that consumable surface. The backend never mutates it.

use crate::mir::{BlockId, DataType, GlobalVariable, I32, PTR};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::collections::BTreeMap;
use std::fmt;

/// An opaque reference to an SSA value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Value(
    /// The value number.
    pub u32,
);

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// A reference to a value an instruction reads: an SSA value, an inline
/// constant, or the address of a global.
#[derive(Clone, PartialEq, Debug)]
pub enum ValueRef {
    /// An SSA value defined by a parameter or another instruction.
    Value(Value),
    /// A 32-bit integer constant.
    ConstI32(i32),
    /// A 64-bit integer constant.
    ConstI64(i64),
    /// A 32-bit float constant.
    ConstF32(f32),
    /// The address of a global variable.
    Global(String),
}

/// Two-operand integer and floating-point arithmetic.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum BinaryOp {
    /// Addition.
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
}

/// Integer comparison predicates.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum IcmpCond {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Signed less than.
    Slt,
    /// Signed greater than.
    Sgt,
    /// Signed less than or equal.
    Sle,
    /// Signed greater than or equal.
    Sge,
    /// Unsigned less than.
    Ult,
    /// Unsigned greater than.
    Ugt,
    /// Unsigned less than or equal.
    Ule,
    /// Unsigned greater than or equal.
    Uge,
}

/// An IR instruction: an optional result value plus its payload.
#[derive(Clone, PartialEq, Debug)]
pub struct Inst {
    /// The value this instruction defines, if any.
    pub result: Option<Value>,
    /// The instruction payload.
    pub data: InstData,
}

/// Instruction payloads the backend can select.
#[derive(Clone, PartialEq, Debug)]
pub enum InstData {
    /// `result = op ty lhs, rhs`
    Binary {
        /// The operation.
        op: BinaryOp,
        /// Operand and result type.
        ty: DataType,
        /// Left operand.
        lhs: ValueRef,
        /// Right operand.
        rhs: ValueRef,
    },
    /// `result = icmp cond lhs, rhs`, producing an `i32` 0 or 1.
    Icmp {
        /// The predicate.
        cond: IcmpCond,
        /// Left operand.
        lhs: ValueRef,
        /// Right operand.
        rhs: ValueRef,
    },
    /// `result = load ty, addr`
    Load {
        /// Type of the loaded value.
        ty: DataType,
        /// Address to load from.
        addr: ValueRef,
    },
    /// `store val, addr`
    Store {
        /// Value to store.
        val: ValueRef,
        /// Address to store to.
        addr: ValueRef,
    },
    /// `result = alloca ty, elems` — reserve `elems` elements of stack
    /// storage and produce its address.
    Alloca {
        /// Element type.
        ty: DataType,
        /// Number of elements.
        elems: u32,
    },
    /// `result = call callee(args)` (result absent for void calls).
    Call {
        /// Callee symbol.
        callee: String,
        /// Return type, if the callee produces a value.
        ret: Option<DataType>,
        /// Argument values.
        args: Vec<ValueRef>,
    },
    /// `result = phi ty [pred: val]...`
    Phi {
        /// Result type.
        ty: DataType,
        /// Incoming value per predecessor, in predecessor order.
        incoming: Vec<(BlockId, ValueRef)>,
    },
    /// Unconditional branch.
    Br {
        /// Branch destination.
        dest: BlockId,
    },
    /// Conditional branch; `cond` is an `i32` treated as a boolean.
    BrCond {
        /// The condition value.
        cond: ValueRef,
        /// Destination when the condition is non-zero.
        then_dest: BlockId,
        /// Destination when the condition is zero.
        else_dest: BlockId,
    },
    /// Return, with an optional value.
    Ret {
        /// The returned value, if any.
        value: Option<ValueRef>,
    },
}

impl Inst {
    /// The type of the value this instruction defines, if any.
    pub fn result_type(&self) -> Option<DataType> {
        match &self.data {
            InstData::Binary { ty, .. } => Some(*ty),
            InstData::Icmp { .. } => Some(I32),
            InstData::Load { ty, .. } => Some(*ty),
            InstData::Alloca { .. } => Some(PTR),
            InstData::Call { ret, .. } => *ret,
            InstData::Phi { ty, .. } => Some(*ty),
            _ => None,
        }
    }

    /// Is this a φ?
    pub fn is_phi(&self) -> bool {
        matches!(self.data, InstData::Phi { .. })
    }
}

/// An IR basic block: a label and an instruction stream. φs come first; the
/// last instruction is the terminator.
#[derive(Clone, Debug)]
pub struct Block {
    /// The block's label.
    pub id: BlockId,
    /// The instructions, φs first, terminator last.
    pub insts: Vec<Inst>,
}

impl Block {
    /// Create an empty block.
    pub fn new(id: BlockId) -> Self {
        Self { id, insts: Vec::new() }
    }
}

/// An IR function: parameters and blocks keyed by label. Block 0 is the
/// entry. Block ids are dense: the selector and the fall-through rule both
/// rely on `id + 1` addressing the next block in layout order.
#[derive(Clone, Debug)]
pub struct Function {
    /// Function name.
    pub name: String,
    /// Parameter values with their types, in declaration order.
    pub params: Vec<(Value, DataType)>,
    /// Blocks keyed by label.
    pub blocks: BTreeMap<BlockId, Block>,
    next_value: u32,
}

impl Function {
    /// Create an empty function.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            blocks: BTreeMap::new(),
            next_value: 0,
        }
    }

    /// Allocate a fresh SSA value id.
    pub fn new_value(&mut self) -> Value {
        let value = Value(self.next_value);
        self.next_value += 1;
        value
    }

    /// Add a parameter of the given type.
    pub fn add_param(&mut self, ty: DataType) -> Value {
        let value = self.new_value();
        self.params.push((value, ty));
        value
    }

    /// Get or create the block with the given label.
    pub fn ensure_block(&mut self, id: BlockId) -> &mut Block {
        self.blocks.entry(id).or_insert_with(|| Block::new(id))
    }

    /// Append an instruction with a fresh result value; returns that value.
    pub fn push_value_inst(&mut self, block: BlockId, data: InstData) -> Value {
        let result = self.new_value();
        self.ensure_block(block)
            .insts
            .push(Inst { result: Some(result), data });
        result
    }

    /// Append an instruction that defines nothing.
    pub fn push_inst(&mut self, block: BlockId, data: InstData) {
        self.ensure_block(block).insts.push(Inst { result: None, data });
    }

    /// The type of every value defined in this function, keyed by value.
    pub fn value_types(&self) -> BTreeMap<Value, DataType> {
        let mut types = BTreeMap::new();
        for (value, ty) in &self.params {
            types.insert(*value, *ty);
        }
        for block in self.blocks.values() {
            for inst in &block.insts {
                if let (Some(result), Some(ty)) = (inst.result, inst.result_type()) {
                    types.insert(result, ty);
                }
            }
        }
        types
    }
}

/// An IR module: functions plus globals. Globals pass through the backend
/// unchanged, so they share the machine module's descriptor type.
#[derive(Clone, Debug, Default)]
pub struct Module {
    /// The module's functions.
    pub functions: Vec<Function>,
    /// The module's global variables.
    pub globals: Vec<GlobalVariable>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{F32, I64};

    #[test]
    fn value_types_cover_params_and_results() {
        let mut func = Function::new("f");
        let p = func.add_param(F32);
        let q = func.push_value_inst(
            BlockId(0),
            InstData::Binary {
                op: BinaryOp::Add,
                ty: I64,
                lhs: ValueRef::ConstI64(1),
                rhs: ValueRef::ConstI64(2),
            },
        );
        let types = func.value_types();
        assert_eq!(types[&p], F32);
        assert_eq!(types[&q], I64);
    }

    #[test]
    fn icmp_yields_i32() {
        let inst = Inst {
            result: Some(Value(0)),
            data: InstData::Icmp {
                cond: IcmpCond::Slt,
                lhs: ValueRef::ConstI32(1),
                rhs: ValueRef::ConstI32(2),
            },
        };
        assert_eq!(inst.result_type(), Some(I32));
    }
}
