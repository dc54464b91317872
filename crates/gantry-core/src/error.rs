//! Generation errors, grouped by pipeline phase.
//!
//! Every phase accumulates into a `Vec<Error>` and the orchestrator halts
//! between phases when the list is non-empty. Rendered lines follow the
//! `path:line:col: message` convention whenever a position is known.

use gantry_parser::Pos;
use std::fmt;
use std::path::PathBuf;

/// Which phase produced an error. Ordering matches the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Tokenizer or parser.
    Syntax,
    /// Undefined identifier, ill-typed `+=`.
    Evaluation,
    /// Unknown module type, duplicate module name, missing `name`.
    Registration,
    /// Unrecognized/duplicate/mutated/mismatched property.
    Property,
    /// Unknown dependency or dependency cycle.
    Dependency,
    /// Undefined variable reference, conflicting output, builddir conflict.
    Generation,
    /// A programming bug in the generator or a host callback.
    Internal,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Syntax => "syntax",
            Phase::Evaluation => "evaluation",
            Phase::Registration => "registration",
            Phase::Property => "property",
            Phase::Dependency => "dependency",
            Phase::Generation => "generation",
            Phase::Internal => "internal",
        }
    }
}

/// One recorded error.
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    pub phase: Phase,
    pub pos: Option<Pos>,
    pub message: String,
}

impl Error {
    pub fn new(phase: Phase, pos: Pos, message: impl Into<String>) -> Self {
        Self {
            phase,
            pos: Some(pos),
            message: message.into(),
        }
    }

    pub fn unpositioned(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            pos: None,
            message: message.into(),
        }
    }

    pub fn io(path: &std::path::Path, err: &std::io::Error) -> Self {
        Self::unpositioned(
            Phase::Syntax,
            format!("{}: {}", path.display(), err),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::unpositioned(Phase::Internal, message)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pos {
            Some(pos) => write!(f, "{}: {}", pos, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for Error {}

/// Render an error list grouped by phase, one line per error.
pub fn render_errors(errs: &[Error]) -> String {
    let mut out = String::new();
    let mut phases: Vec<Phase> = errs.iter().map(|e| e.phase).collect();
    phases.sort();
    phases.dedup();
    for phase in phases {
        for err in errs.iter().filter(|e| e.phase == phase) {
            out.push_str(&err.to_string());
            out.push('\n');
        }
    }
    out
}

/// The list of every build file read plus host-added ninja file deps,
/// returned from the parse and generate phases for depfile emission.
pub type FileDeps = Vec<PathBuf>;
