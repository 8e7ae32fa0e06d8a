//! DDL compilation.
//!
//! One [`DdlOp`] may expand to several statements: DuckDB applies a single
//! change per `ALTER TABLE`, and comments are separate `COMMENT ON`
//! statements.

use serde::{Deserialize, Serialize};

use crate::compiler::push_literal;
use crate::error::{CompileError, CompileResult};
use crate::expr::Literal;
use crate::query::TableRef;
use crate::sql::{push_identifier, push_string, quote_identifier, quote_table};

/// Abstract column type tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    /// Integer primary key.
    Id,
    /// UUID primary key.
    BinaryId,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Boolean,
    /// Variable text with an optional size limit.
    String { size: Option<u32> },
    /// Unlimited text.
    Text,
    /// Fixed or variable precision decimal.
    Decimal {
        precision: Option<u32>,
        scale: Option<u32>,
    },
    Binary,
    Uuid,
    Date,
    Time,
    TimeUsec,
    /// Timestamp without time zone.
    NaiveDateTime,
    NaiveDateTimeUsec,
    /// Timestamp with time zone.
    UtcDateTime,
    UtcDateTimeUsec,
    /// A JSON document. DuckDB's `JSON` is a text-backed type.
    Map,
    /// `T[]`.
    Array(Box<ColumnType>),
    /// Any other type, rendered as its uppercased name.
    Custom(String),
}

impl ColumnType {
    /// Shorthand for an unlimited string.
    pub fn string() -> Self {
        Self::String { size: None }
    }

    /// Shorthand for an array of `inner`.
    pub fn array(inner: ColumnType) -> Self {
        Self::Array(Box::new(inner))
    }
}

/// Map a type tag to its DuckDB type name.
pub fn column_type(ty: &ColumnType) -> String {
    match ty {
        ColumnType::Id | ColumnType::BigInt => "BIGINT".to_string(),
        ColumnType::BinaryId | ColumnType::Uuid => "UUID".to_string(),
        ColumnType::SmallInt => "SMALLINT".to_string(),
        ColumnType::Integer => "INTEGER".to_string(),
        ColumnType::Float => "DOUBLE".to_string(),
        ColumnType::Boolean => "BOOLEAN".to_string(),
        ColumnType::String { size: Some(size) } => format!("VARCHAR({})", size),
        ColumnType::String { size: None } => "VARCHAR".to_string(),
        ColumnType::Text => "TEXT".to_string(),
        ColumnType::Decimal {
            precision: Some(precision),
            scale: Some(scale),
        } => format!("DECIMAL({},{})", precision, scale),
        ColumnType::Decimal {
            precision: Some(precision),
            scale: None,
        } => format!("DECIMAL({})", precision),
        ColumnType::Decimal {
            precision: None, ..
        } => "DECIMAL".to_string(),
        ColumnType::Binary => "BLOB".to_string(),
        ColumnType::Date => "DATE".to_string(),
        ColumnType::Time | ColumnType::TimeUsec => "TIME".to_string(),
        ColumnType::NaiveDateTime | ColumnType::NaiveDateTimeUsec => "TIMESTAMP".to_string(),
        ColumnType::UtcDateTime | ColumnType::UtcDateTimeUsec => "TIMESTAMPTZ".to_string(),
        ColumnType::Map => "JSON".to_string(),
        ColumnType::Array(inner) => format!("{}[]", column_type(inner)),
        ColumnType::Custom(name) => name.to_uppercase(),
    }
}

/// Foreign key actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReferentialAction {
    /// No clause emitted.
    #[default]
    NoAction,
    Cascade,
    SetNull,
    Restrict,
}

impl ReferentialAction {
    fn as_sql(&self) -> Option<&'static str> {
        match self {
            Self::NoAction => None,
            Self::Cascade => Some("CASCADE"),
            Self::SetNull => Some("SET NULL"),
            Self::Restrict => Some("RESTRICT"),
        }
    }
}

/// A foreign key reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub table: TableRef,
    pub column: String,
    /// Constraint name. Defaults to `<table>_<column>_fkey`.
    pub name: Option<String>,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

impl Reference {
    /// Reference `table("id")`.
    pub fn new(table: impl Into<TableRef>) -> Self {
        Self {
            table: table.into(),
            column: "id".to_string(),
            name: None,
            on_delete: ReferentialAction::NoAction,
            on_update: ReferentialAction::NoAction,
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }

    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = action;
        self
    }
}

/// Column default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    /// A literal value.
    Literal(Literal),
    /// Raw SQL, e.g. `current_timestamp`.
    Fragment(String),
}

/// A column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: ColumnType,
    /// `Some(false)` renders `NOT NULL`, `Some(true)` renders `NULL`.
    pub null: Option<bool>,
    pub default: Option<DefaultValue>,
    pub primary_key: bool,
    pub references: Option<Reference>,
    pub comment: Option<String>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            null: None,
            default: None,
            primary_key: false,
            references: None,
            comment: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.null = Some(false);
        self
    }

    pub fn nullable(mut self) -> Self {
        self.null = Some(true);
        self
    }

    pub fn default_value(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn references(mut self, reference: Reference) -> Self {
        self.references = Some(reference);
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// `CREATE TABLE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTable {
    pub table: TableRef,
    pub if_not_exists: bool,
    pub columns: Vec<ColumnDefinition>,
    pub comment: Option<String>,
}

impl CreateTable {
    pub fn new(table: impl Into<TableRef>) -> Self {
        Self {
            table: table.into(),
            if_not_exists: false,
            columns: Vec::new(),
            comment: None,
        }
    }

    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    pub fn column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// One change within `ALTER TABLE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnChange {
    Add(ColumnDefinition),
    AddIfNotExists(ColumnDefinition),
    /// Change type, and optionally nullability and default.
    Modify(ColumnDefinition),
    Remove(String),
    RemoveIfExists(String),
}

/// `CREATE INDEX`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    /// Index name. Defaults to `<table>_<col>_..._index`.
    pub name: Option<String>,
    pub table: TableRef,
    pub columns: Vec<String>,
    pub unique: bool,
    pub if_not_exists: bool,
}

impl Index {
    pub fn new<I, S>(table: impl Into<TableRef>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
            if_not_exists: false,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    /// The explicit name, or the generated default.
    pub fn resolved_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}_{}_index", self.table.name, self.columns.join("_")),
        }
    }
}

/// A schema change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DdlOp {
    CreateTable(CreateTable),
    DropTable {
        table: TableRef,
        if_exists: bool,
        cascade: bool,
    },
    AlterTable {
        table: TableRef,
        changes: Vec<ColumnChange>,
    },
    RenameTable {
        table: TableRef,
        to: String,
    },
    RenameColumn {
        table: TableRef,
        from: String,
        to: String,
    },
    CreateIndex(Index),
    DropIndex {
        prefix: Option<String>,
        name: String,
        if_exists: bool,
    },
}

/// Compile a DDL operation into one or more statements.
pub fn compile_ddl(op: &DdlOp) -> CompileResult<Vec<String>> {
    match op {
        DdlOp::CreateTable(create) => create_table(create),
        DdlOp::DropTable {
            table,
            if_exists,
            cascade,
        } => {
            let mut sql = String::from("DROP TABLE ");
            if *if_exists {
                sql.push_str("IF EXISTS ");
            }
            sql.push_str(&table_name(table)?);
            if *cascade {
                sql.push_str(" CASCADE");
            }
            Ok(vec![sql])
        }
        DdlOp::AlterTable { table, changes } => {
            if changes.is_empty() {
                return Err(CompileError::unsupported(
                    "ALTER TABLE requires at least one change",
                    op,
                ));
            }
            let mut stmts = Vec::with_capacity(changes.len());
            for change in changes {
                stmts.extend(column_change(table, change, op)?);
            }
            Ok(stmts)
        }
        DdlOp::RenameTable { table, to } => Ok(vec![format!(
            "ALTER TABLE {} RENAME TO {}",
            table_name(table)?,
            quote_identifier(to)?
        )]),
        DdlOp::RenameColumn { table, from, to } => Ok(vec![format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            table_name(table)?,
            quote_identifier(from)?,
            quote_identifier(to)?
        )]),
        DdlOp::CreateIndex(index) => create_index(index),
        DdlOp::DropIndex {
            prefix,
            name,
            if_exists,
        } => {
            let mut sql = String::from("DROP INDEX ");
            if *if_exists {
                sql.push_str("IF EXISTS ");
            }
            sql.push_str(&quote_table(prefix.as_deref(), name)?);
            Ok(vec![sql])
        }
    }
}

fn table_name(table: &TableRef) -> CompileResult<String> {
    quote_table(table.prefix.as_deref(), &table.name)
}

fn create_table(create: &CreateTable) -> CompileResult<Vec<String>> {
    if create.columns.is_empty() {
        return Err(CompileError::unsupported(
            "CREATE TABLE requires at least one column",
            create,
        ));
    }

    let table = table_name(&create.table)?;
    let mut sql = String::from("CREATE TABLE ");
    if create.if_not_exists {
        sql.push_str("IF NOT EXISTS ");
    }
    sql.push_str(&table);
    sql.push_str(" (");

    let mut pk = Vec::new();
    for (i, column) in create.columns.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        column_definition(&mut sql, &create.table, column)?;
        if column.primary_key {
            pk.push(quote_identifier(&column.name)?);
        }
    }

    if !pk.is_empty() {
        sql.push_str(", PRIMARY KEY (");
        sql.push_str(&pk.join(", "));
        sql.push(')');
    }
    sql.push(')');

    let mut stmts = vec![sql];
    if let Some(comment) = &create.comment {
        stmts.push(format!("COMMENT ON TABLE {} IS {}", table, quote_comment(comment)));
    }
    for column in &create.columns {
        if let Some(comment) = &column.comment {
            stmts.push(column_comment(&table, &column.name, comment)?);
        }
    }

    Ok(stmts)
}

fn column_definition(
    out: &mut String,
    table: &TableRef,
    column: &ColumnDefinition,
) -> CompileResult<()> {
    push_identifier(out, &column.name)?;
    out.push(' ');
    out.push_str(&column_type(&column.column_type));

    if let Some(reference) = &column.references {
        reference_expr(out, table, &column.name, reference)?;
    }

    column_options(out, column);
    Ok(())
}

// Order is fixed: DEFAULT, then NULL / NOT NULL.
fn column_options(out: &mut String, column: &ColumnDefinition) {
    if let Some(default) = &column.default {
        out.push_str(" DEFAULT ");
        default_expr(out, default);
    }
    match column.null {
        Some(false) => out.push_str(" NOT NULL"),
        Some(true) => out.push_str(" NULL"),
        None => {}
    }
}

fn default_expr(out: &mut String, default: &DefaultValue) {
    match default {
        DefaultValue::Literal(lit) => push_literal(out, lit),
        DefaultValue::Fragment(sql) => out.push_str(sql),
    }
}

fn reference_expr(
    out: &mut String,
    table: &TableRef,
    column: &str,
    reference: &Reference,
) -> CompileResult<()> {
    let name = match &reference.name {
        Some(name) => name.clone(),
        None => format!("{}_{}_fkey", table.name, column),
    };

    out.push_str(" CONSTRAINT ");
    push_identifier(out, &name)?;
    out.push_str(" REFERENCES ");
    out.push_str(&table_name(&reference.table)?);
    out.push('(');
    push_identifier(out, &reference.column)?;
    out.push(')');

    if let Some(action) = reference.on_delete.as_sql() {
        out.push_str(" ON DELETE ");
        out.push_str(action);
    }
    if let Some(action) = reference.on_update.as_sql() {
        out.push_str(" ON UPDATE ");
        out.push_str(action);
    }
    Ok(())
}

fn column_change(
    table: &TableRef,
    change: &ColumnChange,
    op: &DdlOp,
) -> CompileResult<Vec<String>> {
    let name = table_name(table)?;
    let prefix = format!("ALTER TABLE {} ", name);

    match change {
        ColumnChange::Add(column) | ColumnChange::AddIfNotExists(column) => {
            let mut sql = prefix;
            sql.push_str("ADD COLUMN ");
            if matches!(change, ColumnChange::AddIfNotExists(_)) {
                sql.push_str("IF NOT EXISTS ");
            }
            column_definition(&mut sql, table, column)?;
            if column.primary_key {
                sql.push_str(" PRIMARY KEY");
            }

            let mut stmts = vec![sql];
            if let Some(comment) = &column.comment {
                stmts.push(column_comment(&name, &column.name, comment)?);
            }
            Ok(stmts)
        }
        ColumnChange::Modify(column) => {
            if column.references.is_some() || column.primary_key {
                return Err(CompileError::unsupported(
                    "modifying a column cannot add a foreign key or primary key",
                    op,
                ));
            }

            let column_name = quote_identifier(&column.name)?;
            let mut stmts = vec![format!(
                "{}ALTER COLUMN {} TYPE {}",
                prefix,
                column_name,
                column_type(&column.column_type)
            )];

            if let Some(default) = &column.default {
                let mut sql = format!("{}ALTER COLUMN {} SET DEFAULT ", prefix, column_name);
                default_expr(&mut sql, default);
                stmts.push(sql);
            }
            match column.null {
                Some(false) => stmts.push(format!(
                    "{}ALTER COLUMN {} SET NOT NULL",
                    prefix, column_name
                )),
                Some(true) => stmts.push(format!(
                    "{}ALTER COLUMN {} DROP NOT NULL",
                    prefix, column_name
                )),
                None => {}
            }
            if let Some(comment) = &column.comment {
                stmts.push(column_comment(&name, &column.name, comment)?);
            }
            Ok(stmts)
        }
        ColumnChange::Remove(column) => Ok(vec![format!(
            "{}DROP COLUMN {}",
            prefix,
            quote_identifier(column)?
        )]),
        ColumnChange::RemoveIfExists(column) => Ok(vec![format!(
            "{}DROP COLUMN IF EXISTS {}",
            prefix,
            quote_identifier(column)?
        )]),
    }
}

fn create_index(index: &Index) -> CompileResult<Vec<String>> {
    if index.columns.is_empty() {
        return Err(CompileError::unsupported(
            "CREATE INDEX requires at least one column",
            index,
        ));
    }

    let mut sql = String::from("CREATE ");
    if index.unique {
        sql.push_str("UNIQUE ");
    }
    sql.push_str("INDEX ");
    if index.if_not_exists {
        sql.push_str("IF NOT EXISTS ");
    }
    push_identifier(&mut sql, &index.resolved_name())?;
    sql.push_str(" ON ");
    sql.push_str(&table_name(&index.table)?);
    sql.push_str(" (");
    for (i, column) in index.columns.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        push_identifier(&mut sql, column)?;
    }
    sql.push(')');

    Ok(vec![sql])
}

fn column_comment(table: &str, column: &str, comment: &str) -> CompileResult<String> {
    Ok(format!(
        "COMMENT ON COLUMN {}.{} IS {}",
        table,
        quote_identifier(column)?,
        quote_comment(comment)
    ))
}

fn quote_comment(comment: &str) -> String {
    let mut out = String::new();
    push_string(&mut out, comment);
    out
}
