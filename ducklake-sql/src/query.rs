//! Statement representation.
//!
//! A [`Statement`] is a plain data description of one SQL statement. Sources
//! are addressed by position: the first source of a select is its `FROM`
//! source, every other source must be bound by exactly one join.
//!
//! ```rust
//! use ducklake_sql::{Expr, JoinKind, OrderBy, Select, Source};
//!
//! let query = Select::from(Source::table("users"))
//!     .join(JoinKind::Inner, Source::table("orders"), Expr::col(0, "id").equals(Expr::col(1, "id")))
//!     .filter(Expr::col(0, "age").gt(Expr::param(0)))
//!     .order_by(OrderBy::desc(Expr::col(0, "name")));
//! ```

use serde::{Deserialize, Serialize};

use crate::ddl::DdlOp;
use crate::expr::{Expr, FragmentPart, WindowSpec};

/// A possibly schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    /// Schema or catalog prefix.
    pub prefix: Option<String>,
    /// Table name.
    pub name: String,
}

impl TableRef {
    /// An unqualified table name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            prefix: None,
            name: name.into(),
        }
    }

    /// A table name qualified with a schema prefix.
    pub fn with_prefix(prefix: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            name: name.into(),
        }
    }
}

impl From<&str> for TableRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TableRef {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// What a source reads from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceKind {
    /// A table.
    Table(TableRef),
    /// A subquery.
    Subquery(Box<Select>),
    /// A raw fragment, e.g. `read_parquet('data/*.parquet')`.
    Fragment(Vec<FragmentPart>),
}

/// A source of rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// What the source reads from.
    pub kind: SourceKind,
    /// Known field names, required to select the whole source.
    pub fields: Option<Vec<String>>,
}

impl Source {
    /// A table source.
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Table(TableRef::new(name)),
            fields: None,
        }
    }

    /// A source reading from `table`.
    pub fn from_table(table: impl Into<TableRef>) -> Self {
        Self {
            kind: SourceKind::Table(table.into()),
            fields: None,
        }
    }

    /// A table source with a schema prefix.
    pub fn table_in(prefix: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Table(TableRef::with_prefix(prefix, name)),
            fields: None,
        }
    }

    /// A subquery source.
    pub fn subquery(select: Select) -> Self {
        Self {
            kind: SourceKind::Subquery(Box::new(select)),
            fields: None,
        }
    }

    /// A fragment source.
    pub fn fragment(sql: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Fragment(vec![FragmentPart::Raw(sql.into())]),
            fields: None,
        }
    }

    /// Attach field metadata.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}

/// Join kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    InnerLateral,
    Left,
    LeftLateral,
    Right,
    Full,
    Cross,
    CrossLateral,
}

impl JoinKind {
    /// The SQL keyword sequence for this join.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::InnerLateral => "INNER JOIN LATERAL",
            Self::Left => "LEFT OUTER JOIN",
            Self::LeftLateral => "LEFT OUTER JOIN LATERAL",
            Self::Right => "RIGHT OUTER JOIN",
            Self::Full => "FULL OUTER JOIN",
            Self::Cross => "CROSS JOIN",
            Self::CrossLateral => "CROSS JOIN LATERAL",
        }
    }

    /// Cross joins take no `ON` clause.
    pub fn is_cross(&self) -> bool {
        matches!(self, Self::Cross | Self::CrossLateral)
    }
}

/// A join binding one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    /// Join kind.
    pub kind: JoinKind,
    /// Index of the joined source.
    pub source: usize,
    /// Join condition. `None` on a non-cross join compiles to `ON TRUE`.
    pub on: Option<Expr>,
}

/// One entry of the select list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectItem {
    /// The projected expression.
    pub expr: Expr,
    /// Optional output name.
    pub alias: Option<String>,
}

impl From<Expr> for SelectItem {
    fn from(expr: Expr) -> Self {
        Self { expr, alias: None }
    }
}

/// `DISTINCT` forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Distinct {
    /// `SELECT DISTINCT`.
    All,
    /// `SELECT DISTINCT ON (...)`. The expressions are also injected as the
    /// leading `ORDER BY` terms.
    On(Vec<Expr>),
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Asc,
    AscNullsFirst,
    AscNullsLast,
    Desc,
    DescNullsFirst,
    DescNullsLast,
}

impl Direction {
    /// The suffix appended after the ordered expression.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "",
            Self::AscNullsFirst => " ASC NULLS FIRST",
            Self::AscNullsLast => " ASC NULLS LAST",
            Self::Desc => " DESC",
            Self::DescNullsFirst => " DESC NULLS FIRST",
            Self::DescNullsLast => " DESC NULLS LAST",
        }
    }
}

/// An ordering term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub expr: Expr,
    pub direction: Direction,
}

impl OrderBy {
    /// Ascending order.
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            direction: Direction::Asc,
        }
    }

    /// Descending order.
    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            direction: Direction::Desc,
        }
    }

    /// Explicit direction.
    pub fn new(expr: Expr, direction: Direction) -> Self {
        Self { expr, direction }
    }
}

/// A named window declared in the `WINDOW` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowDef {
    pub name: String,
    pub spec: WindowSpec,
}

/// Set operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombinatorKind {
    Union,
    UnionAll,
    Except,
    ExceptAll,
    Intersect,
    IntersectAll,
}

impl CombinatorKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Union => "UNION",
            Self::UnionAll => "UNION ALL",
            Self::Except => "EXCEPT",
            Self::ExceptAll => "EXCEPT ALL",
            Self::Intersect => "INTERSECT",
            Self::IntersectAll => "INTERSECT ALL",
        }
    }
}

/// A set operation applied to the enclosing select.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combinator {
    pub kind: CombinatorKind,
    pub query: Select,
}

/// A common table expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cte {
    pub name: String,
    pub query: Select,
}

/// A `WITH` prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct With {
    pub recursive: bool,
    pub ctes: Vec<Cte>,
}

/// A `SELECT` statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Select {
    pub with: Option<With>,
    pub distinct: Option<Distinct>,
    /// Select list. Empty compiles to `TRUE`.
    pub projection: Vec<SelectItem>,
    /// Sources. Index 0 is the `FROM` source.
    pub sources: Vec<Source>,
    pub joins: Vec<Join>,
    /// `WHERE` predicates, combined with `AND`.
    pub filters: Vec<Expr>,
    pub group_by: Vec<Expr>,
    /// `HAVING` predicates, combined with `AND`.
    pub having: Vec<Expr>,
    pub windows: Vec<WindowDef>,
    pub combinators: Vec<Combinator>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
    /// Row-locking hint. DuckDB has no row locks; this is never rendered.
    pub lock: Option<String>,
}

impl Select {
    /// Create a select reading from `source`.
    pub fn from(source: Source) -> Self {
        Self {
            sources: vec![source],
            ..Self::default()
        }
    }

    /// Add a source bound by a join. The new source gets the next index.
    pub fn join(mut self, kind: JoinKind, source: Source, on: Expr) -> Self {
        let index = self.sources.len();
        self.sources.push(source);
        self.joins.push(Join {
            kind,
            source: index,
            on: Some(on),
        });
        self
    }

    /// Add a cross join.
    pub fn cross_join(mut self, source: Source) -> Self {
        let index = self.sources.len();
        self.sources.push(source);
        self.joins.push(Join {
            kind: JoinKind::Cross,
            source: index,
            on: None,
        });
        self
    }

    /// Add a select list entry.
    pub fn select(mut self, item: impl Into<SelectItem>) -> Self {
        self.projection.push(item.into());
        self
    }

    /// Add a select list entry with an output name.
    pub fn select_as(mut self, expr: Expr, alias: impl Into<String>) -> Self {
        self.projection.push(SelectItem {
            expr,
            alias: Some(alias.into()),
        });
        self
    }

    /// Add a `WHERE` predicate.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filters.push(expr);
        self
    }

    pub fn group_by(mut self, expr: Expr) -> Self {
        self.group_by.push(expr);
        self
    }

    /// Add a `HAVING` predicate.
    pub fn having(mut self, expr: Expr) -> Self {
        self.having.push(expr);
        self
    }

    /// Declare a named window.
    pub fn window(mut self, name: impl Into<String>, spec: WindowSpec) -> Self {
        self.windows.push(WindowDef {
            name: name.into(),
            spec,
        });
        self
    }

    /// Append a set operation.
    pub fn combine(mut self, kind: CombinatorKind, query: Select) -> Self {
        self.combinators.push(Combinator { kind, query });
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn distinct(mut self, distinct: Distinct) -> Self {
        self.distinct = Some(distinct);
        self
    }

    pub fn limit(mut self, expr: Expr) -> Self {
        self.limit = Some(expr);
        self
    }

    pub fn offset(mut self, expr: Expr) -> Self {
        self.offset = Some(expr);
        self
    }

    /// Add a common table expression.
    pub fn with_cte(mut self, name: impl Into<String>, query: Select, recursive: bool) -> Self {
        let with = self.with.get_or_insert(With {
            recursive: false,
            ctes: Vec::new(),
        });
        with.recursive |= recursive;
        with.ctes.push(Cte {
            name: name.into(),
            query,
        });
        self
    }

    /// Set a row-locking hint.
    pub fn lock(mut self, lock: impl Into<String>) -> Self {
        self.lock = Some(lock.into());
        self
    }
}

/// Value of one cell in an `INSERT ... VALUES` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InsertValue {
    /// `DEFAULT`.
    Default,
    /// Consume the next parameter from the running counter.
    Param,
    /// Reference a pre-bound placeholder, 1-based, within the insert's
    /// `placeholders` prefix.
    Placeholder(usize),
    /// A scalar subquery whose parameters follow the running counter.
    Query(Box<Select>),
}

/// Where inserted rows come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InsertSource {
    /// Literal rows.
    Rows(Vec<Vec<InsertValue>>),
    /// `INSERT ... SELECT`.
    Query(Box<Select>),
}

/// Conflict target of an upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictTarget {
    /// No explicit target.
    #[default]
    Any,
    /// Column list.
    Columns(Vec<String>),
    /// Named constraint.
    Constraint(String),
    /// Raw target text, emitted verbatim.
    Unsafe(String),
}

/// Action taken on conflict.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum ConflictAction {
    /// Let the engine raise. No clause is emitted.
    #[default]
    Raise,
    /// `DO NOTHING`.
    Nothing,
    /// `DO UPDATE SET "f" = EXCLUDED."f"` for every listed field.
    Replace(Vec<String>),
    /// `DO UPDATE` driven by an update statement. The insert takes the
    /// update's source alias so its expressions can refer to the row.
    Update(Box<Update>),
}

/// Conflict policy of an insert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnConflict {
    pub target: ConflictTarget,
    pub action: ConflictAction,
}

/// An `INSERT` statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insert {
    pub table: TableRef,
    pub columns: Vec<String>,
    pub source: InsertSource,
    /// Number of values already bound by the caller. Row parameters are
    /// numbered after them.
    pub placeholders: usize,
    pub on_conflict: OnConflict,
    pub returning: Vec<String>,
}

impl Insert {
    /// Create an insert of literal rows.
    pub fn new(table: impl Into<TableRef>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            source: InsertSource::Rows(Vec::new()),
            placeholders: 0,
            on_conflict: OnConflict::default(),
            returning: Vec::new(),
        }
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Append a row of values.
    pub fn row(mut self, row: Vec<InsertValue>) -> Self {
        match &mut self.source {
            InsertSource::Rows(rows) => rows.push(row),
            InsertSource::Query(_) => self.source = InsertSource::Rows(vec![row]),
        }
        self
    }

    /// Insert from a select.
    pub fn select(mut self, query: Select) -> Self {
        self.source = InsertSource::Query(Box::new(query));
        self
    }

    pub fn placeholders(mut self, count: usize) -> Self {
        self.placeholders = count;
        self
    }

    pub fn on_conflict(mut self, target: ConflictTarget, action: ConflictAction) -> Self {
        self.on_conflict = OnConflict { target, action };
        self
    }

    pub fn returning<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning = fields.into_iter().map(Into::into).collect();
        self
    }
}

/// Update operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssignOp {
    /// `"f" = expr`.
    Set(Expr),
    /// `"f" = alias."f" + expr`.
    Inc(Expr),
}

/// One `SET` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub field: String,
    pub op: AssignOp,
}

/// An `UPDATE` statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// The updated table; must be a table source.
    pub source: Source,
    pub assignments: Vec<Assignment>,
    pub filters: Vec<Expr>,
    pub returning: Vec<String>,
}

impl Update {
    /// An update of `table`, which may be schema-qualified.
    pub fn new(table: impl Into<TableRef>) -> Self {
        Self {
            source: Source::from_table(table),
            assignments: Vec::new(),
            filters: Vec::new(),
            returning: Vec::new(),
        }
    }

    pub fn set(mut self, field: impl Into<String>, value: Expr) -> Self {
        self.assignments.push(Assignment {
            field: field.into(),
            op: AssignOp::Set(value),
        });
        self
    }

    pub fn inc(mut self, field: impl Into<String>, by: Expr) -> Self {
        self.assignments.push(Assignment {
            field: field.into(),
            op: AssignOp::Inc(by),
        });
        self
    }

    pub fn filter(mut self, expr: Expr) -> Self {
        self.filters.push(expr);
        self
    }

    pub fn returning<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning = fields.into_iter().map(Into::into).collect();
        self
    }
}

/// A `DELETE` statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delete {
    pub source: Source,
    pub filters: Vec<Expr>,
    pub returning: Vec<String>,
}

impl Delete {
    /// A delete from `table`, which may be schema-qualified.
    pub fn new(table: impl Into<TableRef>) -> Self {
        Self {
            source: Source::from_table(table),
            filters: Vec::new(),
            returning: Vec::new(),
        }
    }

    pub fn filter(mut self, expr: Expr) -> Self {
        self.filters.push(expr);
        self
    }

    pub fn returning<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning = fields.into_iter().map(Into::into).collect();
        self
    }
}

/// Any statement the compiler understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Select(Select),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    Ddl(DdlOp),
}

impl From<Select> for Statement {
    fn from(s: Select) -> Self {
        Self::Select(s)
    }
}

impl From<Insert> for Statement {
    fn from(s: Insert) -> Self {
        Self::Insert(s)
    }
}

impl From<Update> for Statement {
    fn from(s: Update) -> Self {
        Self::Update(s)
    }
}

impl From<Delete> for Statement {
    fn from(s: Delete) -> Self {
        Self::Delete(s)
    }
}

impl From<DdlOp> for Statement {
    fn from(op: DdlOp) -> Self {
        Self::Ddl(op)
    }
}
