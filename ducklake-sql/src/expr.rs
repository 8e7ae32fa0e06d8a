//! Expression trees.
//!
//! Expressions are built fresh for every compilation and rendered exactly
//! once. Column references point at a source by its position in the
//! enclosing statement; parameters point at a bound value by its 0-based
//! position in the statement's parameter list.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ddl::ColumnType;
use crate::query::{OrderBy, Select};

/// A typed literal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// `NULL`.
    Null,
    /// `TRUE` / `FALSE`.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Floating point literal.
    Float(f64),
    /// String literal.
    String(String),
    /// Binary literal, rendered as a `BLOB` cast.
    Binary(Vec<u8>),
    /// Exact decimal literal.
    Decimal(Decimal),
    /// List literal.
    Array(Vec<Literal>),
}

impl From<bool> for Literal {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Literal {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Literal {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Decimal> for Literal {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

impl From<Vec<u8>> for Literal {
    fn from(v: Vec<u8>) -> Self {
        Self::Binary(v)
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Like,
    ILike,
}

impl BinaryOp {
    /// The SQL spelling of the operator.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Like => "LIKE",
            Self::ILike => "ILIKE",
        }
    }
}

/// Right-hand side of an `IN` test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InSet {
    /// An explicit list. An empty list compiles to `false`.
    List(Vec<Expr>),
    /// A single array-valued parameter, compiled to `= ANY($n)`.
    Param(usize),
    /// A subquery.
    Subquery(Box<Select>),
}

/// A window specification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowSpec {
    /// `PARTITION BY` expressions.
    pub partition_by: Vec<Expr>,
    /// `ORDER BY` terms.
    pub order_by: Vec<OrderBy>,
    /// Optional frame clause, e.g. `ROWS BETWEEN 1 PRECEDING AND CURRENT ROW`.
    pub frame: Option<Vec<FragmentPart>>,
}

impl WindowSpec {
    /// Create an empty window specification.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a partition expression.
    pub fn partition_by(mut self, expr: Expr) -> Self {
        self.partition_by.push(expr);
        self
    }

    /// Add an ordering term.
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Set the frame clause.
    pub fn frame(mut self, frame: impl Into<String>) -> Self {
        self.frame = Some(vec![FragmentPart::Raw(frame.into())]);
        self
    }
}

/// Which window an `OVER` clause refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WindowRef {
    /// A window declared in the statement's `WINDOW` clause.
    Named(String),
    /// An inline window specification.
    Inline(WindowSpec),
}

/// A piece of a pre-rendered SQL fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FragmentPart {
    /// Text emitted as-is.
    Raw(String),
    /// An embedded expression, compiled in place.
    Expr(Expr),
}

/// A query expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A field of the source at `source`.
    Column { source: usize, field: String },
    /// Every field of a source. Only valid in a select list, and only for
    /// sources that carry field metadata.
    Source(usize),
    /// A bound parameter, 0-based.
    Param(usize),
    /// A literal value.
    Literal(Literal),
    /// A binary operator application.
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `NOT (expr)`.
    Not(Box<Expr>),
    /// `expr IS NULL`.
    IsNull(Box<Expr>),
    /// `expr IN (...)`.
    In { expr: Box<Expr>, set: InSet },
    /// A function call.
    Func { name: String, args: Vec<Expr> },
    /// `expr::TYPE`.
    Cast { expr: Box<Expr>, ty: ColumnType },
    /// A scalar subquery.
    Subquery(Box<Select>),
    /// `exists(subquery)`.
    Exists(Box<Select>),
    /// `expr OVER window`.
    Over { expr: Box<Expr>, window: WindowRef },
    /// Pre-rendered text with embedded expressions.
    Fragment(Vec<FragmentPart>),
    /// A keyword-list fragment. No SQL spelling exists; always rejected.
    KeywordFragment(Vec<(String, Expr)>),
}

impl Expr {
    /// A column reference.
    pub fn col(source: usize, field: impl Into<String>) -> Self {
        Self::Column {
            source,
            field: field.into(),
        }
    }

    /// A parameter reference (0-based).
    pub fn param(index: usize) -> Self {
        Self::Param(index)
    }

    /// A literal.
    pub fn lit(value: impl Into<Literal>) -> Self {
        Self::Literal(value.into())
    }

    /// A function call.
    pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Func {
            name: name.into(),
            args,
        }
    }

    /// A raw fragment with no embedded expressions.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::Fragment(vec![FragmentPart::Raw(sql.into())])
    }

    /// A binary operator application.
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn equals(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Eq, self, other)
    }

    pub fn not_equals(self, other: Expr) -> Self {
        Self::binary(BinaryOp::NotEq, self, other)
    }

    pub fn lt(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Lt, self, other)
    }

    pub fn lte(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Lte, self, other)
    }

    pub fn gt(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Gt, self, other)
    }

    pub fn gte(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Gte, self, other)
    }

    pub fn and(self, other: Expr) -> Self {
        Self::binary(BinaryOp::And, self, other)
    }

    pub fn or(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Or, self, other)
    }

    pub fn plus(self, other: Expr) -> Self {
        Self::binary(BinaryOp::Add, self, other)
    }

    pub fn like(self, pattern: Expr) -> Self {
        Self::binary(BinaryOp::Like, self, pattern)
    }

    /// `NOT (self)`.
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// `self IS NULL`.
    pub fn is_null(self) -> Self {
        Self::IsNull(Box::new(self))
    }

    /// `self IN (...)`.
    pub fn in_set(self, set: InSet) -> Self {
        Self::In {
            expr: Box::new(self),
            set,
        }
    }

    /// `self::TYPE`.
    pub fn cast(self, ty: ColumnType) -> Self {
        Self::Cast {
            expr: Box::new(self),
            ty,
        }
    }

    /// `self OVER "name"`.
    pub fn over(self, window: impl Into<String>) -> Self {
        Self::Over {
            expr: Box::new(self),
            window: WindowRef::Named(window.into()),
        }
    }

    /// `self OVER (spec)`.
    pub fn over_spec(self, spec: WindowSpec) -> Self {
        Self::Over {
            expr: Box::new(self),
            window: WindowRef::Inline(spec),
        }
    }

    /// Whether rendering this expression as an operand needs parentheses.
    ///
    /// Anything that is not atomic is wrapped: `::` binds tighter than unary
    /// minus and `IN`, and `IS NULL` binds tighter than `NOT`.
    pub(crate) fn needs_parens(&self) -> bool {
        match self {
            Self::Binary { .. }
            | Self::Not(_)
            | Self::IsNull(_)
            | Self::In { .. }
            | Self::Cast { .. }
            | Self::Over { .. } => true,
            Self::Literal(lit) => lit.is_negative(),
            _ => false,
        }
    }
}

impl Literal {
    /// Whether the literal renders with a leading minus sign.
    pub(crate) fn is_negative(&self) -> bool {
        match self {
            Self::Int(v) => *v < 0,
            Self::Float(v) => v.is_finite() && v.is_sign_negative(),
            Self::Decimal(d) => d.is_sign_negative() && !d.is_zero(),
            _ => false,
        }
    }
}

impl From<Literal> for Expr {
    fn from(lit: Literal) -> Self {
        Self::Literal(lit)
    }
}
