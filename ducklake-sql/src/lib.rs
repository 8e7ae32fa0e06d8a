//! SQL and DDL compiler for DuckDB and DuckLake.
//!
//! This crate turns a plain data description of a statement into DuckDB SQL
//! text plus the number of positional parameters it expects. It performs no
//! I/O and holds no state: every function here is pure and can be called
//! from any thread.
//!
//! # Features
//!
//! - **Queries**: selects with joins, CTEs, windows, set operations and
//!   `DISTINCT ON`; inserts with upserts; updates and deletes
//! - **DDL**: tables, columns, indexes and renames, with a total type mapping
//! - **Setup**: `INSTALL`/`LOAD`, `CREATE SECRET`, `ATTACH`/`DETACH`
//! - **Safety**: identifiers containing `"` are rejected, string literals
//!   always double embedded quotes, placeholders are checked for gaps
//!
//! # Example
//!
//! ```rust
//! use ducklake_sql::{compile, Expr, JoinKind, OrderBy, Select, Source, Statement};
//!
//! let query = Select::from(Source::table("users"))
//!     .join(
//!         JoinKind::Inner,
//!         Source::table("orders"),
//!         Expr::col(0, "id").equals(Expr::col(1, "id")),
//!     )
//!     .select(Expr::col(0, "name"))
//!     .filter(Expr::col(0, "age").gt(Expr::param(0)))
//!     .order_by(OrderBy::desc(Expr::col(0, "name")));
//!
//! let compiled = compile(&Statement::Select(query)).unwrap();
//! assert_eq!(
//!     compiled.sql,
//!     "SELECT u0.\"name\" FROM \"users\" AS u0 \
//!      INNER JOIN \"orders\" AS o1 ON (u0.\"id\" = o1.\"id\") \
//!      WHERE (u0.\"age\" > $1) ORDER BY u0.\"name\" DESC"
//! );
//! assert_eq!(compiled.parameter_count, 1);
//! ```
//!
//! # DDL
//!
//! ```rust
//! use ducklake_sql::{compile_ddl, ColumnDefinition, ColumnType, CreateTable, DdlOp};
//!
//! let op = DdlOp::CreateTable(
//!     CreateTable::new("events")
//!         .if_not_exists()
//!         .column(ColumnDefinition::new("id", ColumnType::Id).primary_key())
//!         .column(ColumnDefinition::new("payload", ColumnType::Map).not_null()),
//! );
//!
//! let stmts = compile_ddl(&op).unwrap();
//! assert_eq!(
//!     stmts,
//!     vec!["CREATE TABLE IF NOT EXISTS \"events\" (\"id\" BIGINT, \"payload\" JSON NOT NULL, PRIMARY KEY (\"id\"))"]
//! );
//! ```

pub mod compiler;
pub mod ddl;
pub mod error;
pub mod expr;
pub mod query;
pub mod setup;
pub mod sql;

pub use compiler::{Compiled, compile, compile_delete, compile_insert, compile_select, compile_update};
pub use ddl::{
    ColumnChange, ColumnDefinition, ColumnType, CreateTable, DdlOp, DefaultValue, Index, Reference,
    ReferentialAction, column_type, compile_ddl,
};
pub use error::{CompileError, CompileResult};
pub use expr::{BinaryOp, Expr, FragmentPart, InSet, Literal, WindowRef, WindowSpec};
pub use query::{
    AssignOp, Assignment, Combinator, CombinatorKind, ConflictAction, ConflictTarget, Cte, Delete,
    Direction, Distinct, Insert, InsertSource, InsertValue, Join, JoinKind, OnConflict, OrderBy,
    Select, SelectItem, Source, SourceKind, Statement, TableRef, Update, WindowDef, With,
};
pub use setup::{Attachment, Extension, ExtensionSource, Secret, SecretProvider};
pub use sql::{quote_identifier, quote_string};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::compiler::{Compiled, compile};
    pub use crate::ddl::{compile_ddl, ColumnDefinition, ColumnType, DdlOp};
    pub use crate::error::{CompileError, CompileResult};
    pub use crate::expr::{Expr, InSet, Literal};
    pub use crate::query::{
        ConflictAction, ConflictTarget, Delete, Insert, InsertValue, JoinKind, OrderBy, Select,
        Source, Statement, Update,
    };
}
