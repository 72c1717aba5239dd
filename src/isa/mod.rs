//! Target support: the trait surface every backend implements and the
//! registry that hands out backends by triple.
//!
//! The target-agnostic passes (CFG construction, φ elimination, register
//! allocation) never inspect target instructions directly; everything goes
//! through a [`TargetInstrAdapter`]. Register conventions come from a
//! [`TargetRegInfo`]. Both are plain trait objects owned by the target and
//! injected where needed — there is no global state.

use crate::dag::SelectionDAG;
use crate::mir::{self, BlockId, FrameIndex, MInst, Register};
use crate::result::{CodegenError, CodegenResult};
use crate::settings::Flags;
use crate::ssa;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;
use target_lexicon::{Architecture, Triple};

pub mod aarch64;

/// A small list of registers, the common return type of def/use queries.
pub type RegList = SmallVec<[Register; 4]>;

/// Capability surface abstracting the per-target shape of machine
/// instructions. Stateless and deterministic.
pub trait TargetInstrAdapter {
    /// Is this a call?
    fn is_call(&self, inst: &MInst) -> bool;
    /// Is this a return?
    fn is_return(&self, inst: &MInst) -> bool;
    /// Is this an unconditional branch?
    fn is_uncond_branch(&self, inst: &MInst) -> bool;
    /// Is this a conditional branch?
    fn is_cond_branch(&self, inst: &MInst) -> bool;

    /// The branch target of a conditional or unconditional branch.
    fn branch_target(&self, inst: &MInst) -> Option<BlockId>;

    /// Rewrite a branch targeting `old` to target `new` instead.
    fn retarget_branch(&self, inst: &mut MInst, old: BlockId, new: BlockId);

    /// Create an unconditional branch to `target`, e.g. for a block
    /// synthesized on a split critical edge.
    fn create_branch(&self, target: BlockId) -> MInst;

    /// Enumerate registers this instruction reads.
    fn uses(&self, inst: &MInst) -> RegList;
    /// Enumerate registers this instruction writes, including implicit
    /// defs such as the link register on calls.
    fn defs(&self, inst: &MInst) -> RegList;

    /// Substitute `to` for `from` in the instruction's use slots.
    fn replace_use(&self, inst: &mut MInst, from: Register, to: Register);
    /// Substitute `to` for `from` in the instruction's def slots.
    fn replace_def(&self, inst: &mut MInst, from: Register, to: Register);

    /// If this instruction is a register-to-register copy (a target move or
    /// the pseudo `MOVE`), return `(dst, src)`.
    fn as_copy(&self, inst: &MInst) -> Option<(Register, Register)>;

    /// Physical registers implicitly clobbered by this instruction, e.g.
    /// the caller-saved set across a call.
    fn phys_clobbers(&self, inst: &MInst) -> SmallVec<[Register; 8]>;

    /// Insert a reload of `reg` from `slot` before position `index` of
    /// block `block`.
    fn insert_reload_before(
        &self,
        func: &mut mir::Function,
        block: BlockId,
        index: usize,
        reg: Register,
        slot: FrameIndex,
    );

    /// Insert a spill of `reg` to `slot` after position `index` of block
    /// `block`.
    fn insert_spill_after(
        &self,
        func: &mut mir::Function,
        block: BlockId,
        index: usize,
        reg: Register,
        slot: FrameIndex,
    );
}

/// Register conventions of a target: special registers, argument and
/// callee-saved sequences, the reserved set, and the allocatable pools.
///
/// All registers are physical-register ids matching `Register::id`. The
/// order of `int_regs`/`float_regs` defines the allocator's scan order.
pub trait TargetRegInfo {
    /// The stack pointer.
    fn sp_reg(&self) -> u32;
    /// The return-address (link) register.
    fn ra_reg(&self) -> u32;
    /// The zero register.
    fn zero_reg(&self) -> u32;

    /// Integer argument registers, in calling-convention order.
    fn int_arg_regs(&self) -> &[u32];
    /// Floating-point argument registers, in calling-convention order.
    fn float_arg_regs(&self) -> &[u32];

    /// Callee-saved integer registers.
    fn callee_saved_int_regs(&self) -> &[u32];
    /// Callee-saved floating-point registers.
    fn callee_saved_float_regs(&self) -> &[u32];

    /// Registers never available for allocation.
    fn reserved_regs(&self) -> &[u32];

    /// All allocatable integer registers, in allocation scan order.
    fn int_regs(&self) -> &[u32];
    /// All allocatable floating-point registers, in allocation scan order.
    fn float_regs(&self) -> &[u32];

    /// Reserved integer scratch registers used to reload spilled values.
    fn int_scratch_regs(&self) -> &[u32];
    /// Reserved floating-point scratch registers.
    fn float_scratch_regs(&self) -> &[u32];

    /// Is `id` a callee-saved register?
    fn is_callee_saved(&self, id: u32) -> bool {
        self.callee_saved_int_regs().contains(&id)
            || self.callee_saved_float_regs().contains(&id)
    }

    /// Is `id` reserved?
    fn is_reserved(&self, id: u32) -> bool {
        self.reserved_regs().contains(&id)
    }
}

/// A backend target. One fresh instance per compilation; owns nothing
/// shared between modules.
pub trait TargetIsa {
    /// Short name, e.g. `"aarch64"`.
    fn name(&self) -> &'static str;

    /// The triple this backend was constructed for.
    fn triple(&self) -> &Triple;

    /// The instruction adapter for this target.
    fn adapter(&self) -> &dyn TargetInstrAdapter;

    /// The register conventions for this target.
    fn reg_info(&self) -> &dyn TargetRegInfo;

    /// Canonicalize one block DAG (operand order, predicate rewrites).
    fn legalize(&self, dag: &mut SelectionDAG);

    /// Select machine instructions for `func` from its per-block DAGs,
    /// producing a MIR function over virtual registers.
    fn select_function(
        &self,
        func: &ssa::Function,
        dags: &BTreeMap<BlockId, crate::dag::BuiltDag>,
    ) -> CodegenResult<mir::Function>;

    /// Lower the stack frame: assign slot offsets, save callee-saved
    /// registers, materialize frame pseudos, and emit prologue/epilogue.
    fn lower_frame(&self, func: &mut mir::Function) -> CodegenResult<()>;

    /// Write one function as assembly.
    fn write_function(
        &self,
        w: &mut String,
        func: &mir::Function,
        flags: &Flags,
    ) -> fmt::Result;

    /// Write one global variable as assembly.
    fn write_global(&self, w: &mut String, global: &mir::GlobalVariable) -> fmt::Result;
}

/// A factory producing fresh backends.
pub type TargetFactory = fn() -> Box<dyn TargetIsa>;

/// A name-keyed registry of backend factories.
///
/// The registry is a plain value: a driver constructs one at startup,
/// registers any extra targets, and looks backends up by triple or name.
pub struct TargetRegistry {
    factories: BTreeMap<String, TargetFactory>,
}

impl TargetRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self { factories: BTreeMap::new() }
    }

    /// A registry with all built-in targets registered.
    pub fn with_builtin_targets() -> Self {
        let mut registry = Self::new();
        registry.register("aarch64", aarch64::isa_factory);
        registry
    }

    /// Register a factory under `name`, replacing any previous entry.
    pub fn register(&mut self, name: &str, factory: TargetFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    /// All registered target names, sorted.
    pub fn list(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Construct a fresh backend for `name`.
    pub fn lookup_by_name(&self, name: &str) -> CodegenResult<Box<dyn TargetIsa>> {
        match self.factories.get(name) {
            Some(factory) => Ok(factory()),
            None => Err(CodegenError::UnknownTarget(name.to_string())),
        }
    }

    /// Construct a fresh backend for the architecture of `triple`.
    pub fn lookup(&self, triple: &Triple) -> CodegenResult<Box<dyn TargetIsa>> {
        let name = match triple.architecture {
            Architecture::Aarch64(_) => "aarch64",
            _ => return Err(CodegenError::UnknownTarget(triple.to_string())),
        };
        self.lookup_by_name(name)
    }
}

impl Default for TargetRegistry {
    fn default() -> Self {
        Self::with_builtin_targets()
    }
}
