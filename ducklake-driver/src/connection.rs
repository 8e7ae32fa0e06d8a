//! The connection protocol: one engine handle plus its transaction state.
//!
//! | from                       | operation                   | to              |
//! |----------------------------|-----------------------------|-----------------|
//! | `Idle`                     | `begin`                     | `InTransaction` |
//! | `InTransaction`            | `commit` succeeds           | `Idle`          |
//! | `InTransaction`            | `commit` or `execute` fails | `Errored`       |
//! | `InTransaction`, `Errored` | `rollback`                  | `Idle`          |
//!
//! Any other transaction call is a [`DriverError::ProtocolMisuse`] and leaves
//! the state as it was.

use std::fmt;
use std::sync::Arc;

use ducklake_sql::setup::{BEGIN, COMMIT, ROLLBACK};
use ducklake_sql::{Compiled, DdlOp, Statement, compile, compile_ddl};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::error::{DriverError, DriverResult};
use crate::handle::{DuckDbHandle, EngineHandle, QueryOutput};
use crate::pipeline;
use crate::types::Param;

/// Transaction state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    InTransaction,
    /// A statement failed inside the transaction; only rollback is allowed.
    Errored,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::InTransaction => "in_transaction",
            Self::Errored => "errored",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A connection: an engine handle that has been set up, and its state.
///
/// Not safe for concurrent use; callers serialize access, usually by
/// checking it out of a [`Pool`](crate::Pool).
pub struct Connection<E: EngineHandle = DuckDbHandle> {
    handle: E,
    state: ConnectionState,
    config: Arc<Config>,
}

impl Connection<DuckDbHandle> {
    /// Open the configured database and run its setup pipeline.
    pub fn connect(config: Arc<Config>) -> DriverResult<Self> {
        let handle = DuckDbHandle::open(&config)?;
        Self::establish(handle, config)
    }
}

impl<E: EngineHandle> Connection<E> {
    /// Run the setup pipeline on an open handle.
    ///
    /// On failure the handle is dropped and the error names the stage and
    /// component that failed.
    pub fn establish(mut handle: E, config: Arc<Config>) -> DriverResult<Self> {
        let steps = pipeline::plan(&config)?;
        pipeline::run(&mut handle, &steps)?;

        info!(
            path = %config.path.display(),
            steps = steps.len(),
            "Connection established"
        );

        Ok(Self {
            handle,
            state: ConnectionState::Idle,
            config,
        })
    }

    /// Statements need no preparation; the SQL is returned unchanged.
    pub fn prepare<'a>(&self, sql: &'a str) -> &'a str {
        sql
    }

    /// Execute a statement.
    ///
    /// A failure inside a transaction moves the connection to `Errored`.
    #[instrument(skip(self, params), fields(sql = %sql, state = %self.state))]
    pub fn execute(&mut self, sql: &str, params: &[Param]) -> DriverResult<QueryOutput> {
        debug!("Executing statement");

        match self.handle.execute(sql, params) {
            Ok(output) => Ok(output),
            Err(cause) => {
                if self.state == ConnectionState::InTransaction {
                    warn!(error = %cause, "Statement failed, transaction must be rolled back");
                    self.state = ConnectionState::Errored;
                }
                Err(DriverError::Execution(cause))
            }
        }
    }

    /// Execute compiled SQL, checking the parameter count first.
    pub fn execute_compiled(
        &mut self,
        compiled: &Compiled,
        params: &[Param],
    ) -> DriverResult<QueryOutput> {
        if params.len() != compiled.parameter_count {
            return Err(DriverError::ParameterCount {
                expected: compiled.parameter_count,
                supplied: params.len(),
            });
        }
        self.execute(&compiled.sql, params)
    }

    /// Compile and execute a statement.
    pub fn execute_statement(
        &mut self,
        statement: &Statement,
        params: &[Param],
    ) -> DriverResult<QueryOutput> {
        let compiled = compile(statement)?;
        self.execute_compiled(&compiled, params)
    }

    /// Compile a DDL operation and run its statements in order.
    pub fn execute_ddl(&mut self, op: &DdlOp) -> DriverResult<()> {
        for sql in compile_ddl(op)? {
            self.execute(&sql, &[])?;
        }
        Ok(())
    }

    /// Start a transaction. Only legal when idle.
    #[instrument(skip(self), fields(state = %self.state))]
    pub fn begin(&mut self) -> DriverResult<()> {
        if self.state != ConnectionState::Idle {
            return Err(DriverError::misuse(format!(
                "cannot begin a transaction while {}",
                self.state
            )));
        }

        self.handle.execute(BEGIN, &[])?;
        self.state = ConnectionState::InTransaction;
        debug!("Transaction started");
        Ok(())
    }

    /// Commit the open transaction.
    ///
    /// A failed commit leaves the connection `Errored`. Committing an
    /// `Errored` transaction is refused; roll it back instead.
    #[instrument(skip(self), fields(state = %self.state))]
    pub fn commit(&mut self) -> DriverResult<()> {
        match self.state {
            ConnectionState::Idle => {
                return Err(DriverError::misuse("no transaction to commit"));
            }
            ConnectionState::Errored => {
                return Err(DriverError::misuse(
                    "transaction failed and must be rolled back",
                ));
            }
            ConnectionState::InTransaction => {}
        }

        match self.handle.execute(COMMIT, &[]) {
            Ok(_) => {
                self.state = ConnectionState::Idle;
                debug!("Transaction committed");
                Ok(())
            }
            Err(cause) => {
                warn!(error = %cause, "Commit failed");
                self.state = ConnectionState::Errored;
                Err(DriverError::Execution(cause))
            }
        }
    }

    /// Roll back the open or failed transaction.
    ///
    /// The connection is `Idle` afterwards even when the engine reports an
    /// error, which is still returned.
    #[instrument(skip(self), fields(state = %self.state))]
    pub fn rollback(&mut self) -> DriverResult<()> {
        if self.state == ConnectionState::Idle {
            return Err(DriverError::misuse("no transaction to roll back"));
        }

        let result = self.handle.execute(ROLLBACK, &[]);
        self.state = ConnectionState::Idle;
        match result {
            Ok(_) => {
                debug!("Transaction rolled back");
                Ok(())
            }
            Err(cause) => {
                warn!(error = %cause, "Rollback failed");
                Err(DriverError::Execution(cause))
            }
        }
    }

    /// Cursors are not supported.
    pub fn declare(&mut self, _sql: &str, _params: &[Param]) -> DriverResult<()> {
        Err(cursor_misuse())
    }

    /// Cursors are not supported.
    pub fn fetch(&mut self) -> DriverResult<QueryOutput> {
        Err(cursor_misuse())
    }

    /// Cursors are not supported.
    pub fn deallocate(&mut self) -> DriverResult<()> {
        Err(cursor_misuse())
    }

    /// Current transaction state.
    pub fn status(&self) -> ConnectionState {
        self.state
    }

    /// The config this connection was opened from.
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Close the connection, releasing the engine handle.
    pub fn disconnect(self) {
        info!(path = %self.config.path.display(), state = %self.state, "Disconnecting");
        drop(self.handle);
    }
}

impl<E: EngineHandle> fmt::Debug for Connection<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.config.path)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

fn cursor_misuse() -> DriverError {
    DriverError::misuse("cursors are not supported")
}
