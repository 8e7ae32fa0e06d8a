//! Engine handles.
//!
//! [`EngineHandle`] is the seam between the connection protocol and the
//! engine: one method that runs one statement. [`DuckDbHandle`] is the real
//! implementation.

use duckdb::Connection as DuckDbConnection;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::config::{AccessMode, Config, DatabasePath};
use crate::error::{DriverError, DriverResult, EngineError};
use crate::types::{DuckDbParam, Param, value_ref_to_json};

/// What a statement produced, decided once from the engine's result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryOutput {
    /// The result has columns.
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<JsonValue>>,
    },
    /// The result has no columns. Affected-row counts are not reported.
    Command,
}

impl QueryOutput {
    pub fn is_rows(&self) -> bool {
        matches!(self, Self::Rows { .. })
    }

    pub fn columns(&self) -> &[String] {
        match self {
            Self::Rows { columns, .. } => columns,
            Self::Command => &[],
        }
    }

    pub fn rows(&self) -> &[Vec<JsonValue>] {
        match self {
            Self::Rows { rows, .. } => rows,
            Self::Command => &[],
        }
    }

    /// Rows as JSON objects keyed by column name.
    pub fn into_objects(self) -> Vec<JsonValue> {
        match self {
            Self::Rows { columns, rows } => rows
                .into_iter()
                .map(|row| {
                    JsonValue::Object(columns.iter().cloned().zip(row).collect())
                })
                .collect(),
            Self::Command => Vec::new(),
        }
    }
}

/// Runs one statement at a time against an engine.
///
/// Implementations are owned by exactly one connection and are never used
/// from two threads at once; they only need to move between threads.
pub trait EngineHandle: Send {
    fn execute(&mut self, sql: &str, params: &[Param]) -> Result<QueryOutput, EngineError>;
}

impl<E: EngineHandle + ?Sized> EngineHandle for Box<E> {
    fn execute(&mut self, sql: &str, params: &[Param]) -> Result<QueryOutput, EngineError> {
        (**self).execute(sql, params)
    }
}

/// A DuckDB database handle.
pub struct DuckDbHandle {
    conn: DuckDbConnection,
}

impl DuckDbHandle {
    /// Open the database a config describes.
    ///
    /// The lakehouse form opens a bare in-memory database; the catalog is
    /// attached later by the setup pipeline.
    pub fn open(config: &Config) -> DriverResult<Self> {
        let open_error = |cause: duckdb::Error| DriverError::Open {
            path: config.path.display(),
            cause: cause.into(),
        };

        let settings = engine_settings(config).map_err(open_error)?;
        let conn = match &config.path {
            DatabasePath::InMemory | DatabasePath::Lake(_) => {
                DuckDbConnection::open_in_memory_with_flags(settings)
            }
            DatabasePath::File(path) => DuckDbConnection::open_with_flags(path, settings),
        }
        .map_err(open_error)?;

        info!(
            path = %config.path.display(),
            access_mode = config.access_mode.as_str(),
            "Opened DuckDB database"
        );
        Ok(Self { conn })
    }

    /// Wrap an already open DuckDB connection.
    pub fn from_connection(conn: DuckDbConnection) -> Self {
        Self { conn }
    }
}

fn engine_settings(config: &Config) -> duckdb::Result<duckdb::Config> {
    let mut settings = duckdb::Config::default();

    // In-memory databases cannot be opened read-only; lakehouse read-only
    // access is applied to the catalog attachment instead.
    if config.access_mode == AccessMode::ReadOnly && matches!(config.path, DatabasePath::File(_)) {
        settings = settings.access_mode(duckdb::AccessMode::ReadOnly)?;
    }
    if let Some(threads) = config.threads {
        settings = settings.threads(threads as i64)?;
    }
    if let Some(limit) = &config.memory_limit {
        settings = settings.max_memory(limit)?;
    }
    Ok(settings)
}

impl EngineHandle for DuckDbHandle {
    fn execute(&mut self, sql: &str, params: &[Param]) -> Result<QueryOutput, EngineError> {
        debug!(params = params.len(), "Running statement on DuckDB");

        let mut stmt = self.conn.prepare(sql)?;

        let duckdb_params: Vec<DuckDbParam<'_>> = params.iter().map(DuckDbParam).collect();
        let param_refs: Vec<&dyn duckdb::ToSql> = duckdb_params
            .iter()
            .map(|p| p as &dyn duckdb::ToSql)
            .collect();

        let mut rows = stmt.query(param_refs.as_slice())?;

        let columns: Vec<String> = rows
            .as_ref()
            .map(|stmt| stmt.column_names())
            .unwrap_or_default();

        if columns.is_empty() {
            return Ok(QueryOutput::Command);
        }

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                cells.push(value_ref_to_json(row.get_ref(i)?));
            }
            out.push(cells);
        }

        Ok(QueryOutput::Rows { columns, rows: out })
    }
}
