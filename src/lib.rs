//! # DuckLake
//!
//! A SQL compiler and connection driver for DuckDB and its DuckLake
//! lakehouse extension.
//!
//! DuckLake provides:
//! - A pure compiler from structured queries and DDL to DuckDB SQL
//! - Validated connection config, loadable from TOML or JSON
//! - A setup pipeline for extensions, secrets and attachments
//! - A connection state machine and an async pool built on Tokio
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use ducklake::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut conn = Connection::connect(Arc::new(Config::in_memory()))?;
//! conn.execute("CREATE TABLE users (id BIGINT, name VARCHAR)", &[])?;
//! conn.execute("INSERT INTO users VALUES (1, 'ada'), (2, 'grace')", &[])?;
//!
//! let query = Select::from(Source::table("users"))
//!     .select(Expr::col(0, "name"))
//!     .filter(Expr::col(0, "id").gt(Expr::param(0)));
//!
//! let output = conn.execute_statement(&query.into(), &[Param::Int(1)])?;
//! assert_eq!(output.rows(), [vec![serde_json::json!("grace")]]);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// SQL and DDL compilation.
pub mod sql {
    pub use ducklake_sql::*;
}

/// Configuration, connections and pooling.
pub mod driver {
    pub use ducklake_driver::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use ducklake_driver::prelude::*;
    pub use ducklake_sql::prelude::*;
}

// Re-export key types at the crate root
pub use ducklake_driver::{Config, Connection, DriverError, Options, Pool};
pub use ducklake_sql::{CompileError, Statement, compile, compile_ddl};
