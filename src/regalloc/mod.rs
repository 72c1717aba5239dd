//! Register allocation: map virtual registers to physical registers,
//! spilling to frame slots under pressure.
//!
//! The allocator is chosen through `settings::Flags`; the linear-scan
//! implementation is the default and the only complete one. All allocators
//! work through the target's instruction adapter and register-info trait
//! objects, so the algorithms themselves are target-agnostic.

use crate::isa::{TargetInstrAdapter, TargetRegInfo};
use crate::mir;
use crate::result::CodegenResult;

pub mod graph_coloring;
pub mod linear_scan;
pub mod liveness;

pub use self::graph_coloring::GraphColoringRA;
pub use self::linear_scan::LinearScanRA;
pub use self::liveness::{LiveInterval, Liveness};

/// A register allocator.
pub trait RegisterAllocator {
    /// Allocate every function of `module`.
    fn allocate(
        &self,
        module: &mut mir::Module,
        adapter: &dyn TargetInstrAdapter,
        reg_info: &dyn TargetRegInfo,
    ) -> CodegenResult<()> {
        for func in &mut module.functions {
            self.allocate_function(func, adapter, reg_info)?;
        }
        Ok(())
    }

    /// Allocate one function in place: after this returns every register
    /// mention in the function is physical.
    fn allocate_function(
        &self,
        func: &mut mir::Function,
        adapter: &dyn TargetInstrAdapter,
        reg_info: &dyn TargetRegInfo,
    ) -> CodegenResult<()>;
}
