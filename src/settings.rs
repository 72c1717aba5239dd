//! Shared backend settings.
//!
//! Settings are built up through a string-keyed [`Builder`] and then frozen
//! into an immutable [`Flags`] value that the rest of the backend queries
//! through typed accessors:
//!
//! ```
//! use rook_codegen::settings;
//!
//! let mut builder = settings::builder();
//! builder.set("enable_verifier", "true").unwrap();
//! let flags = settings::Flags::new(builder);
//! assert!(flags.enable_verifier());
//! ```

use std::fmt;

/// Which register allocator the pipeline should run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegallocAlgorithm {
    /// Linear-scan allocation over live intervals. The default.
    LinearScan,
    /// Graph coloring. Declared but not implemented; selecting it makes the
    /// pipeline report an unsupported-operation error.
    GraphColoring,
}

impl fmt::Display for RegallocAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::LinearScan => f.write_str("linear-scan"),
            Self::GraphColoring => f.write_str("graph-coloring"),
        }
    }
}

/// An error produced when setting an unknown flag or an invalid value.
#[derive(Debug, PartialEq)]
pub enum SetError {
    /// No flag with this name exists.
    BadName(String),
    /// The value could not be parsed for this flag.
    BadValue(String),
}

impl fmt::Display for SetError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::BadName(name) => write!(f, "no setting named '{name}'"),
            Self::BadValue(value) => write!(f, "invalid setting value '{value}'"),
        }
    }
}

impl std::error::Error for SetError {}

/// Collects settings before they are frozen into `Flags`.
#[derive(Clone, Debug)]
pub struct Builder {
    enable_verifier: bool,
    emit_comments: bool,
    regalloc: RegallocAlgorithm,
}

/// Create a new builder with all settings at their defaults.
pub fn builder() -> Builder {
    Builder {
        enable_verifier: false,
        emit_comments: true,
        regalloc: RegallocAlgorithm::LinearScan,
    }
}

impl Builder {
    /// Set a flag by name. Boolean flags accept `true`/`false`.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), SetError> {
        match name {
            "enable_verifier" => self.enable_verifier = parse_bool(value)?,
            "emit_comments" => self.emit_comments = parse_bool(value)?,
            "regalloc" => {
                self.regalloc = match value {
                    "linear-scan" => RegallocAlgorithm::LinearScan,
                    "graph-coloring" => RegallocAlgorithm::GraphColoring,
                    _ => return Err(SetError::BadValue(value.to_string())),
                }
            }
            _ => return Err(SetError::BadName(name.to_string())),
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Result<bool, SetError> {
    match value {
        "true" | "on" | "yes" => Ok(true),
        "false" | "off" | "no" => Ok(false),
        _ => Err(SetError::BadValue(value.to_string())),
    }
}

/// Frozen settings, queried by the pipeline.
#[derive(Clone, Debug)]
pub struct Flags {
    enable_verifier: bool,
    emit_comments: bool,
    regalloc: RegallocAlgorithm,
}

impl Flags {
    /// Freeze a builder into an immutable flags value.
    pub fn new(builder: Builder) -> Self {
        Self {
            enable_verifier: builder.enable_verifier,
            emit_comments: builder.emit_comments,
            regalloc: builder.regalloc,
        }
    }

    /// Run the MIR verifier between backend passes.
    pub fn enable_verifier(&self) -> bool {
        self.enable_verifier
    }

    /// Print trailing `# ...` comments in the emitted assembly.
    pub fn emit_comments(&self) -> bool {
        self.emit_comments
    }

    /// The register allocator to run.
    pub fn regalloc(&self) -> RegallocAlgorithm {
        self.regalloc
    }
}

impl Default for Flags {
    fn default() -> Self {
        Self::new(builder())
    }
}
