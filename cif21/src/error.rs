//!
//! # Cif Result, Error, and Warning Types
//!

// Std-Lib
use std::fmt;

// Local imports
use crate::data::CifMode;

/// Cif21 Library-Wide Result Type
pub type CifResult<T> = Result<T, CifError>;

///
/// # Cif Error Enumeration
///
/// Fatal failure modes. Everything recoverable is a [CifWarning] instead:
/// warnings never abort a read, errors always do.
///
#[derive(Debug)]
pub enum CifError {
    /// Malformed token stream: bad integer, missing terminator, unrecognized record key.
    /// Carries the line number and the trailing bytes of source context.
    Syntax {
        msg: String,
        line: usize,
        context: String,
    },
    /// Structural failures: re-entrant symbol redefinition, hierarchy deeper
    /// than the transform-stack bound, out-of-order cref appends.
    Structural { msg: String },
    /// Cooperative cancellation observed at a lexer check-point.
    /// Never conflated with [CifError::Syntax].
    Interrupted { bytepos: u64 },
    /// Underlying stream failures: open, seek, read, write.
    Io(String),
    /// String message-valued errors
    Str(String),
    /// Wrapped errors, generally from other crates
    Boxed(Box<dyn std::error::Error>),
}
impl CifError {
    /// Create a [CifError::Str] from anything String-convertible
    pub fn msg(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }
}
impl fmt::Display for CifError {
    /// Delegates to the [fmt::Debug] implementation
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
impl std::error::Error for CifError {}
impl From<std::io::Error> for CifError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(format!("{:?}", e))
    }
}
impl From<String> for CifError {
    fn from(e: String) -> Self {
        Self::Str(e)
    }
}
impl From<&str> for CifError {
    fn from(e: &str) -> Self {
        Self::Str(e.into())
    }
}
impl From<std::str::Utf8Error> for CifError {
    fn from(e: std::str::Utf8Error) -> Self {
        Self::Boxed(Box::new(e))
    }
}

///
/// # Cif Warning Enumeration
///
/// Recoverable conditions: each is logged via [log::warn] where it occurs,
/// and accumulated on the active read/translate session so callers (and
/// tests) can inspect them without capturing log output.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CifWarning {
    /// Malformed individual primitive; the primitive is dropped and the read continues.
    Geometry { msg: String, line: usize },
    /// Missing or out-of-range resolution declaration; the default is substituted.
    Resolution { msg: String },
    /// A numeric symbol reference never bound to a name; a placeholder name is synthesized.
    UnresolvedReference { number: u32, mode: CifMode },
    /// Duplicate symbol definition resolved per the configured merge policy.
    StructuralConflict { msg: String },
    /// A property payload its id-specific rewriter could not parse; passed through verbatim.
    Property { msg: String },
    /// A clip against the area-of-interest window failed on a degenerate
    /// polygon; the unclipped original was emitted instead.
    Clip { msg: String },
}
impl fmt::Display for CifWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CifWarning::Geometry { msg, line } => write!(f, "bad geometry (line {}): {}", line, msg),
            CifWarning::Resolution { msg } => write!(f, "resolution: {}", msg),
            CifWarning::UnresolvedReference { number, mode } => {
                write!(f, "unresolved reference to symbol {} ({:?})", number, mode)
            }
            CifWarning::StructuralConflict { msg } => write!(f, "conflict: {}", msg),
            CifWarning::Property { msg } => write!(f, "property: {}", msg),
            CifWarning::Clip { msg } => write!(f, "clip: {}", msg),
        }
    }
}
