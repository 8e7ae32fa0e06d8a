//! Error types for SQL compilation.
//!
//! Compilation errors are always caller bugs: an identifier that cannot be
//! quoted safely, a construct the dialect has no spelling for, or a statement
//! whose parameters do not line up. They carry the offending fragment so the
//! caller can see what was rejected.

use thiserror::Error;

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Errors raised while compiling a statement or DDL operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// An identifier contains a character that cannot be represented.
    #[error("bad identifier {0:?}: identifiers may not contain double quotes")]
    InvalidIdentifier(String),

    /// A bare (unquoted) name used in setup statements is not a plain word.
    #[error("bad name {0:?}: only ASCII letters, digits and underscores are allowed")]
    InvalidName(String),

    /// The construct has no spelling in the DuckDB dialect.
    #[error("{message} in statement:\n\n{fragment}")]
    Unsupported {
        /// What was rejected.
        message: String,
        /// The offending statement, rendered for diagnostics.
        fragment: String,
    },

    /// A column or join refers to a source index that does not exist.
    #[error("source index {index} does not exist in statement:\n\n{fragment}")]
    UnknownSource {
        /// The source index referenced.
        index: usize,
        /// The offending statement, rendered for diagnostics.
        fragment: String,
    },

    /// Parameter placeholders do not form a gap-free sequence.
    #[error("parameters must be numbered without gaps: expected ${expected}, found ${found}")]
    NonContiguousParameters {
        /// The first missing placeholder.
        expected: usize,
        /// The placeholder that was found instead.
        found: usize,
    },
}

impl CompileError {
    /// Create an unsupported-construct error for the given statement fragment.
    pub fn unsupported(message: impl Into<String>, fragment: &impl std::fmt::Debug) -> Self {
        Self::Unsupported {
            message: message.into(),
            fragment: format!("{:#?}", fragment),
        }
    }

    /// Create an unknown-source error.
    pub fn unknown_source(index: usize, fragment: &impl std::fmt::Debug) -> Self {
        Self::UnknownSource {
            index,
            fragment: format!("{:#?}", fragment),
        }
    }

    /// Check whether this error was caused by a bad identifier or name.
    pub fn is_identifier_error(&self) -> bool {
        matches!(self, Self::InvalidIdentifier(_) | Self::InvalidName(_))
    }
}
