//! Error types for driver operations.

use ducklake_sql::CompileError;
use thiserror::Error;

use crate::pipeline::Stage;

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// An error reported by the engine, message preserved verbatim.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct EngineError {
    message: String,
    #[source]
    source: Option<duckdb::Error>,
}

impl EngineError {
    /// An engine error with no underlying DuckDB error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// The engine's message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<duckdb::Error> for EngineError {
    fn from(err: duckdb::Error) -> Self {
        Self {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

/// Error type for driver operations.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Invalid or incomplete configuration. Raised before any engine work.
    #[error("configuration error: {0}")]
    Config(String),

    /// A statement could not be compiled.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// The database could not be opened.
    #[error("could not open {path}: {cause}")]
    Open {
        path: String,
        #[source]
        cause: EngineError,
    },

    /// A setup step failed while establishing a connection.
    #[error("initialization failed at {stage} for {component}: {cause}")]
    Initialization {
        stage: Stage,
        /// Extension name, secret name or attachment alias.
        component: String,
        #[source]
        cause: EngineError,
    },

    /// The engine rejected a statement.
    #[error("execution error: {0}")]
    Execution(#[from] EngineError),

    /// An operation that is not legal in the connection's current state.
    #[error("protocol misuse: {0}")]
    ProtocolMisuse(String),

    /// The number of supplied parameters does not match the statement.
    #[error("statement expects {expected} parameters but {supplied} were supplied")]
    ParameterCount { expected: usize, supplied: usize },

    /// Pool error.
    #[error("pool error: {0}")]
    Pool(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DriverError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a protocol misuse error.
    pub fn misuse(msg: impl Into<String>) -> Self {
        Self::ProtocolMisuse(msg.into())
    }

    /// Create a pool error.
    pub fn pool(msg: impl Into<String>) -> Self {
        Self::Pool(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    pub fn is_protocol_misuse(&self) -> bool {
        matches!(self, Self::ProtocolMisuse(_))
    }

    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// The stage a setup failure happened at, if this is one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Initialization { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DriverError::config("pool_size must be at least 1");
        assert_eq!(
            err.to_string(),
            "configuration error: pool_size must be at least 1"
        );

        let err = DriverError::ParameterCount {
            expected: 2,
            supplied: 1,
        };
        assert_eq!(
            err.to_string(),
            "statement expects 2 parameters but 1 were supplied"
        );
    }

    #[test]
    fn test_initialization_display() {
        let err = DriverError::Initialization {
            stage: Stage::ExtensionLoad,
            component: "httpfs".into(),
            cause: EngineError::new("extension not found"),
        };
        assert_eq!(
            err.to_string(),
            "initialization failed at extension_load for httpfs: extension not found"
        );
        assert_eq!(err.stage(), Some(Stage::ExtensionLoad));
    }

    #[test]
    fn test_engine_message_is_verbatim() {
        let err: DriverError = EngineError::new("Catalog Error: Table with name nope does not exist!").into();
        assert!(err.is_execution());
        assert_eq!(
            err.to_string(),
            "execution error: Catalog Error: Table with name nope does not exist!"
        );
    }

    #[test]
    fn test_compile_error_is_transparent() {
        let err: DriverError = CompileError::InvalidName("a b".into()).into();
        assert_eq!(err.to_string(), CompileError::InvalidName("a b".into()).to_string());
    }
}
