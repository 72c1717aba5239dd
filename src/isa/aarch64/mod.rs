//! The AArch64 backend.

use crate::dag::{BuiltDag, SelectionDAG};
use crate::isa::{TargetInstrAdapter, TargetIsa, TargetRegInfo};
use crate::mir::{self, BlockId};
use crate::result::CodegenResult;
use crate::settings::Flags;
use crate::ssa;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use target_lexicon::Triple;

pub mod abi;
pub mod adapter;
pub mod emit;
pub mod inst;
pub mod legalize;
pub mod lower;
pub mod regs;

use self::adapter::A64InstrAdapter;
use self::regs::A64RegInfo;

/// The AArch64 backend target.
pub struct AArch64Target {
    triple: Triple,
    adapter: A64InstrAdapter,
    reg_info: A64RegInfo,
}

impl AArch64Target {
    /// Create a backend for the default aarch64 Linux triple.
    pub fn new() -> Self {
        Self::for_triple(
            Triple::from_str("aarch64-unknown-linux-gnu").expect("builtin triple parses"),
        )
    }

    /// Create a backend for a specific triple.
    pub fn for_triple(triple: Triple) -> Self {
        Self {
            triple,
            adapter: A64InstrAdapter,
            reg_info: A64RegInfo,
        }
    }
}

impl Default for AArch64Target {
    fn default() -> Self {
        Self::new()
    }
}

/// Factory registered with the target registry.
pub fn isa_factory() -> Box<dyn TargetIsa> {
    Box::new(AArch64Target::new())
}

impl TargetIsa for AArch64Target {
    fn name(&self) -> &'static str {
        "aarch64"
    }

    fn triple(&self) -> &Triple {
        &self.triple
    }

    fn adapter(&self) -> &dyn TargetInstrAdapter {
        &self.adapter
    }

    fn reg_info(&self) -> &dyn TargetRegInfo {
        &self.reg_info
    }

    fn legalize(&self, dag: &mut SelectionDAG) {
        legalize::run(dag);
    }

    fn select_function(
        &self,
        func: &ssa::Function,
        dags: &BTreeMap<BlockId, BuiltDag>,
    ) -> CodegenResult<mir::Function> {
        lower::select_function(func, dags)
    }

    fn lower_frame(&self, func: &mut mir::Function) -> CodegenResult<()> {
        abi::lower_function(func, &self.adapter, &self.reg_info)
    }

    fn write_function(
        &self,
        w: &mut String,
        func: &mir::Function,
        flags: &Flags,
    ) -> fmt::Result {
        emit::write_function(w, func, flags)
    }

    fn write_global(&self, w: &mut String, global: &mir::GlobalVariable) -> fmt::Result {
        emit::write_global(w, global)
    }
}
