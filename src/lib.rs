//! Rook code generation library.
//!
//! This crate lowers the middle-end's SSA IR (the read-only view in [`ssa`])
//! into target assembly. The interesting machinery is target-agnostic: the
//! machine IR in [`mir`], the uniqued selection DAG in [`dag`], the
//! control-flow graph in [`flowgraph`], φ elimination, and the register
//! allocators in [`regalloc`]. Targets plug in through the trait objects in
//! [`isa`]; AArch64 is the reference implementation.

#![deny(missing_docs, trivial_numeric_casts, unused_extern_crates)]
#![warn(unused_import_braces)]

pub use crate::context::Context;
pub use crate::result::{CodegenError, CodegenResult};

pub mod context;
pub mod dag;
pub mod flowgraph;
pub mod isa;
pub mod mir;
pub mod phi_elim;
pub mod regalloc;
pub mod settings;
pub mod ssa;
pub mod verifier;
pub mod write;

mod result;
#[cfg(test)]
mod test_util;

/// Version number of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
