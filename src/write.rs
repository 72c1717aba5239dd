//! Serialize a compiled module as textual assembly.
//!
//! The walk order is fixed: globals into `.data` first, then functions
//! into `.text`, each in container order. Per-instruction formatting is the
//! target's concern; this module only owns the section structure, which
//! together with the key-ordered traversal everywhere else makes the
//! output byte-deterministic.

use crate::isa::TargetIsa;
use crate::mir::Module;
use crate::settings::Flags;
use std::fmt;

/// Write `module` as assembly into `w`.
pub fn write_module(
    w: &mut String,
    module: &Module,
    isa: &dyn TargetIsa,
    flags: &Flags,
) -> fmt::Result {
    use fmt::Write;

    if !module.globals.is_empty() {
        writeln!(w, "\t.data")?;
        for global in &module.globals {
            isa.write_global(w, global)?;
        }
    }

    writeln!(w, "\t.text")?;
    for func in &module.functions {
        isa.write_function(w, func, flags)?;
    }
    Ok(())
}
