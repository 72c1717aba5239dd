//! The per-module compilation context and pipeline driver.
//!
//! A `Context` holds the settings shared by one compilation and drives the
//! backend pipeline for each function in turn:
//!
//! 1. build a selection DAG per input block,
//! 2. legalize each DAG,
//! 3. select machine instructions (virtual registers),
//! 4. eliminate φs (splitting critical edges),
//! 5. allocate registers,
//! 6. lower the stack frame,
//!
//! and finally serializes the whole module as assembly. Everything runs on
//! the calling thread; two runs over the same input produce byte-identical
//! output.

use crate::dag::{self, BuiltDag};
use crate::isa::TargetIsa;
use crate::mir::{self, BlockId};
use crate::phi_elim;
use crate::regalloc::{GraphColoringRA, LinearScanRA, RegisterAllocator};
use crate::result::CodegenResult;
use crate::settings::{Flags, RegallocAlgorithm};
use crate::ssa;
use crate::verifier;
use crate::write;
use log::debug;
use std::collections::BTreeMap;

/// Per-compilation state: the settings and nothing else. Reusable across
/// modules; shares nothing between them.
pub struct Context {
    /// The settings this context compiles under.
    pub flags: Flags,
}

impl Context {
    /// A context with default settings.
    pub fn new() -> Self {
        Self { flags: Flags::default() }
    }

    /// A context with the given settings.
    pub fn with_flags(flags: Flags) -> Self {
        Self { flags }
    }

    /// Compile `module` for `isa` and return the assembly text.
    pub fn compile(&self, isa: &dyn TargetIsa, module: &ssa::Module) -> CodegenResult<String> {
        let mut compiled = mir::Module {
            functions: Vec::with_capacity(module.functions.len()),
            globals: module.globals.clone(),
        };
        for func in &module.functions {
            compiled.functions.push(self.compile_function(isa, func)?);
        }

        let mut out = String::new();
        write::write_module(&mut out, &compiled, isa, &self.flags)
            .expect("writing to a String cannot fail");
        Ok(out)
    }

    /// Run the backend pipeline for one function.
    pub fn compile_function(
        &self,
        isa: &dyn TargetIsa,
        func: &ssa::Function,
    ) -> CodegenResult<mir::Function> {
        debug!("compiling {} for {}", func.name, isa.name());

        let value_types = func.value_types();
        let mut dags: BTreeMap<BlockId, BuiltDag> = BTreeMap::new();
        for (&id, block) in &func.blocks {
            dags.insert(id, dag::build_block(func, block, &value_types)?);
        }

        for built in dags.values_mut() {
            isa.legalize(&mut built.dag);
        }

        let mut compiled = isa.select_function(func, &dags)?;

        if self.flags.enable_verifier() {
            verifier::verify_function(&compiled, isa.adapter())?;
        }

        phi_elim::run(&mut compiled, isa.adapter())?;

        match self.flags.regalloc() {
            RegallocAlgorithm::LinearScan => {
                LinearScanRA.allocate_function(&mut compiled, isa.adapter(), isa.reg_info())?
            }
            RegallocAlgorithm::GraphColoring => {
                GraphColoringRA.allocate_function(&mut compiled, isa.adapter(), isa.reg_info())?
            }
        }

        isa.lower_frame(&mut compiled)?;

        if self.flags.enable_verifier() {
            verifier::verify_function(&compiled, isa.adapter())?;
        }

        Ok(compiled)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
