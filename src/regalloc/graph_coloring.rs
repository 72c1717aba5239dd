//! Graph-coloring register allocation.
//!
//! Declared as an alternative to linear scan and selectable through
//! `settings`, but not implemented: allocation requests are answered with
//! an unsupported-operation error rather than an abort, so a driver can
//! report the configuration problem cleanly.

use crate::isa::{TargetInstrAdapter, TargetRegInfo};
use crate::mir;
use crate::regalloc::RegisterAllocator;
use crate::result::{CodegenError, CodegenResult};

/// The (unimplemented) graph-coloring allocator.
pub struct GraphColoringRA;

impl RegisterAllocator for GraphColoringRA {
    fn allocate_function(
        &self,
        func: &mut mir::Function,
        _adapter: &dyn TargetInstrAdapter,
        _reg_info: &dyn TargetRegInfo,
    ) -> CodegenResult<()> {
        Err(CodegenError::Unsupported(format!(
            "graph-coloring register allocation (requested for {})",
            func.name
        )))
    }
}
