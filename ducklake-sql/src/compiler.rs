//! Statement compilation.
//!
//! All rendering goes through one [`SqlWriter`] per statement, which owns the
//! output buffer and records every placeholder it emits. Placeholders are
//! checked for contiguity once the whole statement has been rendered.
//!
//! Source aliases are the lowercased first letter of the table name (or
//! `t`), `s` for subquery sources and `f` for fragment sources, followed by
//! the source index. Subqueries nested inside a statement get an extra `s` prefix so
//! their aliases never shadow the enclosing ones.

use tracing::{debug, warn};

use crate::ddl::{column_type, compile_ddl};
use crate::error::{CompileError, CompileResult};
use crate::expr::{Expr, FragmentPart, InSet, Literal, WindowRef, WindowSpec};
use crate::query::{
    AssignOp, Assignment, ConflictAction, ConflictTarget, Delete, Distinct, Insert, InsertSource,
    InsertValue, OrderBy, Select, Source, SourceKind, Statement, Update,
};
use crate::sql::{bare_name, placeholder, push_identifier, push_string, quote_table};

/// A compiled statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compiled {
    /// SQL text.
    pub sql: String,
    /// Number of positional parameters the statement expects.
    pub parameter_count: usize,
}

/// Compile any statement.
///
/// DDL operations that expand to more than one statement are rejected here;
/// use [`compile_ddl`] for those.
pub fn compile(statement: &Statement) -> CompileResult<Compiled> {
    let compiled = match statement {
        Statement::Select(select) => compile_select(select)?,
        Statement::Insert(insert) => compile_insert(insert)?,
        Statement::Update(update) => compile_update(update)?,
        Statement::Delete(delete) => compile_delete(delete)?,
        Statement::Ddl(op) => {
            let mut stmts = compile_ddl(op)?;
            if stmts.len() != 1 {
                return Err(CompileError::unsupported(
                    format!(
                        "DDL operation expands to {} statements, compile it with compile_ddl",
                        stmts.len()
                    ),
                    op,
                ));
            }
            Compiled {
                sql: stmts.remove(0),
                parameter_count: 0,
            }
        }
    };

    debug!(
        sql = %compiled.sql,
        parameters = compiled.parameter_count,
        "Compiled statement"
    );
    Ok(compiled)
}

/// Compile a `SELECT`.
pub fn compile_select(select: &Select) -> CompileResult<Compiled> {
    let mut w = SqlWriter::default();
    w.select(select, "", 0)?;
    w.finish()
}

/// Compile an `INSERT`.
pub fn compile_insert(insert: &Insert) -> CompileResult<Compiled> {
    let mut w = SqlWriter::default();
    w.insert(insert)?;
    w.finish()
}

/// Compile an `UPDATE`.
pub fn compile_update(update: &Update) -> CompileResult<Compiled> {
    let mut w = SqlWriter::default();
    w.update(update)?;
    w.finish()
}

/// Compile a `DELETE`.
pub fn compile_delete(delete: &Delete) -> CompileResult<Compiled> {
    let mut w = SqlWriter::default();
    w.delete(delete)?;
    w.finish()
}

/// Append the SQL spelling of a literal.
pub(crate) fn push_literal(out: &mut String, lit: &Literal) {
    match lit {
        Literal::Null => out.push_str("NULL"),
        Literal::Bool(true) => out.push_str("TRUE"),
        Literal::Bool(false) => out.push_str("FALSE"),
        Literal::Int(v) => out.push_str(&v.to_string()),
        Literal::Float(v) if v.is_nan() => out.push_str("'NaN'::DOUBLE"),
        Literal::Float(v) if v.is_infinite() && *v > 0.0 => out.push_str("'Infinity'::DOUBLE"),
        Literal::Float(v) if v.is_infinite() => out.push_str("'-Infinity'::DOUBLE"),
        Literal::Float(v) => out.push_str(&format!("{:?}", v)),
        Literal::String(s) => push_string(out, s),
        Literal::Binary(bytes) => {
            out.push('\'');
            for b in bytes {
                out.push_str(&format!("\\x{:02X}", b));
            }
            out.push_str("'::BLOB");
        }
        Literal::Decimal(d) => out.push_str(&d.to_string()),
        Literal::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                push_literal(out, item);
            }
            out.push(']');
        }
    }
}

/// Alias naming and parameter numbering for one (sub)statement.
struct Scope<'q> {
    sources: &'q [Source],
    aliases: Vec<String>,
    prefix: String,
    offset: usize,
}

impl<'q> Scope<'q> {
    fn new(sources: &'q [Source], prefix: &str, offset: usize) -> Self {
        let aliases = sources
            .iter()
            .enumerate()
            .map(|(i, source)| source_alias(source, i, prefix))
            .collect();
        Self {
            sources,
            aliases,
            prefix: prefix.to_string(),
            offset,
        }
    }

    fn alias(&self, index: usize, fragment: &impl std::fmt::Debug) -> CompileResult<&str> {
        self.aliases
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| CompileError::unknown_source(index, fragment))
    }

    fn nested_prefix(&self) -> String {
        format!("{}s", self.prefix)
    }
}

fn source_alias(source: &Source, index: usize, prefix: &str) -> String {
    let letter = match &source.kind {
        SourceKind::Table(table) => table
            .name
            .chars()
            .next()
            .filter(char::is_ascii_alphabetic)
            .map(|c| c.to_ascii_lowercase())
            .unwrap_or('t'),
        SourceKind::Subquery(_) => 's',
        SourceKind::Fragment(_) => 'f',
    };
    format!("{}{}{}", prefix, letter, index)
}

#[derive(Default)]
struct SqlWriter {
    out: String,
    used: Vec<usize>,
}

impl SqlWriter {
    fn finish(mut self) -> CompileResult<Compiled> {
        self.used.sort_unstable();
        self.used.dedup();
        for (i, n) in self.used.iter().enumerate() {
            if *n != i + 1 {
                return Err(CompileError::NonContiguousParameters {
                    expected: i + 1,
                    found: *n,
                });
            }
        }
        Ok(Compiled {
            sql: self.out,
            parameter_count: self.used.len(),
        })
    }

    fn push(&mut self, s: &str) {
        self.out.push_str(s);
    }

    fn param(&mut self, n: usize) {
        self.used.push(n);
        self.out.push_str(&placeholder(n));
    }

    /// Highest placeholder recorded since `mark`.
    fn max_param_since(&self, mark: usize) -> Option<usize> {
        self.used[mark..].iter().copied().max()
    }

    fn ident(&mut self, name: &str) -> CompileResult<()> {
        push_identifier(&mut self.out, name)
    }

    fn select(&mut self, select: &Select, prefix: &str, offset: usize) -> CompileResult<()> {
        if let Some(lock) = &select.lock {
            warn!(lock = %lock, "Row lock hints are not supported by DuckDB; ignoring");
        }

        let scope = Scope::new(&select.sources, prefix, offset);
        check_bindings(select)?;

        if let Some(with) = &select.with {
            self.push("WITH ");
            if with.recursive {
                self.push("RECURSIVE ");
            }
            for (i, cte) in with.ctes.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.ident(&cte.name)?;
                self.push(" AS (");
                self.select(&cte.query, prefix, offset)?;
                self.push(")");
            }
            self.push(" ");
        }

        self.push("SELECT ");
        match &select.distinct {
            Some(Distinct::All) => self.push("DISTINCT "),
            Some(Distinct::On(exprs)) => {
                self.push("DISTINCT ON (");
                self.expr_list(&scope, exprs)?;
                self.push(") ");
            }
            None => {}
        }

        self.projection(&scope, select)?;

        if let Some(first) = select.sources.first() {
            self.push(" FROM ");
            self.source(&scope, first, 0)?;
        }

        for join in &select.joins {
            let source = &select.sources[join.source];
            self.push(" ");
            self.push(join.kind.as_sql());
            self.push(" ");
            self.source(&scope, source, join.source)?;
            match (&join.on, join.kind.is_cross()) {
                (None, true) => {}
                (Some(_), true) => {
                    return Err(CompileError::unsupported(
                        "cross joins take no ON condition",
                        select,
                    ));
                }
                (None, false) => self.push(" ON TRUE"),
                (Some(on), false) => {
                    self.push(" ON (");
                    self.expr(&scope, on)?;
                    self.push(")");
                }
            }
        }

        self.predicates(&scope, " WHERE ", &select.filters)?;

        if !select.group_by.is_empty() {
            self.push(" GROUP BY ");
            self.expr_list(&scope, &select.group_by)?;
        }

        self.predicates(&scope, " HAVING ", &select.having)?;

        if !select.windows.is_empty() {
            self.push(" WINDOW ");
            for (i, window) in select.windows.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.ident(&window.name)?;
                self.push(" AS (");
                self.window_spec(&scope, &window.spec)?;
                self.push(")");
            }
        }

        for combinator in &select.combinators {
            self.push(" ");
            self.push(combinator.kind.as_sql());
            self.push(" (");
            self.select(&combinator.query, prefix, offset)?;
            self.push(")");
        }

        let mut order: Vec<OrderBy> = Vec::new();
        if let Some(Distinct::On(exprs)) = &select.distinct {
            order.extend(exprs.iter().cloned().map(OrderBy::asc));
        }
        order.extend(select.order_by.iter().cloned());
        if !order.is_empty() {
            self.push(" ORDER BY ");
            self.order_list(&scope, &order)?;
        }

        if let Some(limit) = &select.limit {
            self.push(" LIMIT ");
            self.expr(&scope, limit)?;
        }
        if let Some(offset) = &select.offset {
            self.push(" OFFSET ");
            self.expr(&scope, offset)?;
        }

        Ok(())
    }

    fn projection(&mut self, scope: &Scope<'_>, select: &Select) -> CompileResult<()> {
        if select.projection.is_empty() {
            self.push("TRUE");
            return Ok(());
        }

        for (i, item) in select.projection.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            match &item.expr {
                Expr::Source(index) => {
                    let alias = scope.alias(*index, select)?.to_string();
                    let fields = scope.sources[*index].fields.as_ref().ok_or_else(|| {
                        CompileError::unsupported(
                            format!(
                                "source {} has no field metadata, select explicit fields instead",
                                index
                            ),
                            select,
                        )
                    })?;
                    if fields.is_empty() {
                        return Err(CompileError::unsupported(
                            format!("source {} has an empty field list", index),
                            select,
                        ));
                    }
                    for (j, field) in fields.iter().enumerate() {
                        if j > 0 {
                            self.push(", ");
                        }
                        self.push(&alias);
                        self.push(".");
                        self.ident(field)?;
                    }
                }
                expr => self.expr(scope, expr)?,
            }
            if let Some(alias) = &item.alias {
                self.push(" AS ");
                self.ident(alias)?;
            }
        }
        Ok(())
    }

    fn source(&mut self, scope: &Scope<'_>, source: &Source, index: usize) -> CompileResult<()> {
        match &source.kind {
            SourceKind::Table(table) => {
                let name = quote_table(table.prefix.as_deref(), &table.name)?;
                self.push(&name);
            }
            SourceKind::Subquery(query) => {
                self.push("(");
                self.select(query, &scope.nested_prefix(), scope.offset)?;
                self.push(")");
            }
            SourceKind::Fragment(parts) => self.fragment(scope, parts)?,
        }
        self.push(" AS ");
        let alias = scope.alias(index, source)?.to_string();
        self.push(&alias);
        Ok(())
    }

    /// `(a) AND (b)` with a leading keyword, or nothing.
    fn predicates(&mut self, scope: &Scope<'_>, keyword: &str, exprs: &[Expr]) -> CompileResult<()> {
        if exprs.is_empty() {
            return Ok(());
        }
        self.push(keyword);
        for (i, expr) in exprs.iter().enumerate() {
            if i > 0 {
                self.push(" AND ");
            }
            self.push("(");
            self.expr(scope, expr)?;
            self.push(")");
        }
        Ok(())
    }

    fn expr_list(&mut self, scope: &Scope<'_>, exprs: &[Expr]) -> CompileResult<()> {
        for (i, expr) in exprs.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(scope, expr)?;
        }
        Ok(())
    }

    fn order_list(&mut self, scope: &Scope<'_>, order: &[OrderBy]) -> CompileResult<()> {
        for (i, term) in order.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(scope, &term.expr)?;
            self.push(term.direction.as_sql());
        }
        Ok(())
    }

    fn window_spec(&mut self, scope: &Scope<'_>, spec: &WindowSpec) -> CompileResult<()> {
        let mut first = true;
        if !spec.partition_by.is_empty() {
            self.push("PARTITION BY ");
            self.expr_list(scope, &spec.partition_by)?;
            first = false;
        }
        if !spec.order_by.is_empty() {
            if !first {
                self.push(" ");
            }
            self.push("ORDER BY ");
            self.order_list(scope, &spec.order_by)?;
            first = false;
        }
        if let Some(frame) = &spec.frame {
            if !first {
                self.push(" ");
            }
            self.fragment(scope, frame)?;
        }
        Ok(())
    }

    fn fragment(&mut self, scope: &Scope<'_>, parts: &[FragmentPart]) -> CompileResult<()> {
        for part in parts {
            match part {
                FragmentPart::Raw(sql) => self.push(sql),
                FragmentPart::Expr(expr) => self.expr(scope, expr)?,
            }
        }
        Ok(())
    }

    fn operand(&mut self, scope: &Scope<'_>, expr: &Expr) -> CompileResult<()> {
        if expr.needs_parens() {
            self.push("(");
            self.expr(scope, expr)?;
            self.push(")");
            Ok(())
        } else {
            self.expr(scope, expr)
        }
    }

    fn expr(&mut self, scope: &Scope<'_>, expr: &Expr) -> CompileResult<()> {
        match expr {
            Expr::Column { source, field } => {
                let alias = scope.alias(*source, expr)?.to_string();
                self.push(&alias);
                self.push(".");
                self.ident(field)?;
            }
            Expr::Source(_) => {
                return Err(CompileError::unsupported(
                    "whole-source references are only allowed in the select list",
                    expr,
                ));
            }
            Expr::Param(index) => self.param(scope.offset + index + 1),
            Expr::Literal(lit) => push_literal(&mut self.out, lit),
            Expr::Binary { op, left, right } => {
                self.operand(scope, left)?;
                self.push(" ");
                self.push(op.as_sql());
                self.push(" ");
                self.operand(scope, right)?;
            }
            Expr::Not(inner) => {
                self.push("NOT (");
                self.expr(scope, inner)?;
                self.push(")");
            }
            Expr::IsNull(inner) => {
                self.operand(scope, inner)?;
                self.push(" IS NULL");
            }
            Expr::In { expr: left, set } => match set {
                InSet::List(items) if items.is_empty() => self.push("false"),
                InSet::List(items) => {
                    self.operand(scope, left)?;
                    self.push(" IN (");
                    self.expr_list(scope, items)?;
                    self.push(")");
                }
                InSet::Param(index) => {
                    self.operand(scope, left)?;
                    self.push(" = ANY(");
                    self.param(scope.offset + index + 1);
                    self.push(")");
                }
                InSet::Subquery(query) => {
                    self.operand(scope, left)?;
                    self.push(" IN (");
                    self.select(query, &scope.nested_prefix(), scope.offset)?;
                    self.push(")");
                }
            },
            Expr::Func { name, args } => {
                let name = bare_name(name)?;
                self.push(name);
                self.push("(");
                self.expr_list(scope, args)?;
                self.push(")");
            }
            Expr::Cast { expr: inner, ty } => {
                self.operand(scope, inner)?;
                self.push("::");
                self.push(&column_type(ty));
            }
            Expr::Subquery(query) => {
                self.push("(");
                self.select(query, &scope.nested_prefix(), scope.offset)?;
                self.push(")");
            }
            Expr::Exists(query) => {
                self.push("exists(");
                self.select(query, &scope.nested_prefix(), scope.offset)?;
                self.push(")");
            }
            Expr::Over { expr: inner, window } => {
                self.expr(scope, inner)?;
                self.push(" OVER ");
                match window {
                    WindowRef::Named(name) => self.ident(name)?,
                    WindowRef::Inline(spec) => {
                        self.push("(");
                        self.window_spec(scope, spec)?;
                        self.push(")");
                    }
                }
            }
            Expr::Fragment(parts) => self.fragment(scope, parts)?,
            Expr::KeywordFragment(_) => {
                return Err(CompileError::unsupported(
                    "keyword list fragments are not supported",
                    expr,
                ));
            }
        }
        Ok(())
    }

    fn returning(&mut self, fields: &[String]) -> CompileResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        self.push(" RETURNING ");
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.ident(field)?;
        }
        Ok(())
    }

    fn assignments(&mut self, scope: &Scope<'_>, assignments: &[Assignment]) -> CompileResult<()> {
        let alias = scope.alias(0, &assignments)?.to_string();
        for (i, assignment) in assignments.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.ident(&assignment.field)?;
            self.push(" = ");
            match &assignment.op {
                AssignOp::Set(value) => self.expr(scope, value)?,
                AssignOp::Inc(by) => {
                    self.push(&alias);
                    self.push(".");
                    self.ident(&assignment.field)?;
                    self.push(" + ");
                    self.operand(scope, by)?;
                }
            }
        }
        Ok(())
    }

    fn insert(&mut self, insert: &Insert) -> CompileResult<()> {
        // Pre-bound values occupy $1..$placeholders.
        self.used.extend(1..=insert.placeholders);
        let mut counter = insert.placeholders + 1;

        self.push("INSERT INTO ");
        let table = quote_table(insert.table.prefix.as_deref(), &insert.table.name)?;
        self.push(&table);

        let conflict_update = match &insert.on_conflict.action {
            ConflictAction::Update(update) => {
                let sources = std::slice::from_ref(&update.source);
                if !matches!(update.source.kind, SourceKind::Table(_)) {
                    return Err(CompileError::unsupported(
                        "conflict updates must target a table",
                        insert,
                    ));
                }
                let alias = source_alias(&sources[0], 0, "");
                self.push(" AS ");
                self.push(&alias);
                Some(update)
            }
            _ => None,
        };

        if !insert.columns.is_empty() {
            self.push(" (");
            for (i, column) in insert.columns.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.ident(column)?;
            }
            self.push(")");
        }

        match &insert.source {
            InsertSource::Rows(rows) if insert.columns.is_empty() => {
                if rows.iter().any(|row| !row.is_empty()) {
                    return Err(CompileError::unsupported(
                        "insert rows have values but no columns",
                        insert,
                    ));
                }
                self.push(" DEFAULT VALUES");
            }
            InsertSource::Rows(rows) => {
                if rows.is_empty() {
                    return Err(CompileError::unsupported("insert has no rows", insert));
                }
                self.push(" VALUES ");
                for (i, row) in rows.iter().enumerate() {
                    if row.len() != insert.columns.len() {
                        return Err(CompileError::unsupported(
                            format!(
                                "row {} has {} values for {} columns",
                                i,
                                row.len(),
                                insert.columns.len()
                            ),
                            insert,
                        ));
                    }
                    if i > 0 {
                        self.push(",");
                    }
                    self.push("(");
                    for (j, value) in row.iter().enumerate() {
                        if j > 0 {
                            self.push(", ");
                        }
                        counter = self.insert_value(insert, value, counter)?;
                    }
                    self.push(")");
                }
            }
            InsertSource::Query(query) => {
                self.push(" ");
                counter = self.counted_select(query, "", counter)?;
            }
        }

        let conflict = &insert.on_conflict;
        match &conflict.action {
            ConflictAction::Raise => {
                if conflict.target != ConflictTarget::Any {
                    return Err(CompileError::unsupported(
                        "a conflict target requires a conflict action",
                        insert,
                    ));
                }
            }
            ConflictAction::Nothing => {
                self.push(" ON CONFLICT ");
                self.conflict_target(&conflict.target)?;
                self.push("DO NOTHING");
            }
            ConflictAction::Replace(fields) => {
                if conflict.target == ConflictTarget::Any {
                    return Err(CompileError::unsupported(
                        "replacing on conflict requires an explicit conflict target",
                        insert,
                    ));
                }
                if fields.is_empty() {
                    return Err(CompileError::unsupported(
                        "replacing on conflict requires at least one field",
                        insert,
                    ));
                }
                self.push(" ON CONFLICT ");
                self.conflict_target(&conflict.target)?;
                self.push("DO UPDATE SET ");
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.ident(field)?;
                    self.push(" = EXCLUDED.");
                    self.ident(field)?;
                }
            }
            ConflictAction::Update(_) => {
                if conflict.target == ConflictTarget::Any {
                    return Err(CompileError::unsupported(
                        "updating on conflict requires an explicit conflict target",
                        insert,
                    ));
                }
                if let Some(update) = conflict_update {
                    if update.assignments.is_empty() {
                        return Err(CompileError::unsupported(
                            "conflict update has no assignments",
                            insert,
                        ));
                    }
                    if !update.returning.is_empty() {
                        return Err(CompileError::unsupported(
                            "conflict updates cannot carry their own RETURNING",
                            insert,
                        ));
                    }
                    self.push(" ON CONFLICT ");
                    self.conflict_target(&conflict.target)?;
                    self.push("DO UPDATE SET ");

                    // Same alias the insert took above.
                    let scope = Scope::new(std::slice::from_ref(&update.source), "", counter - 1);
                    self.assignments(&scope, &update.assignments)?;
                    self.predicates(&scope, " WHERE ", &update.filters)?;
                }
            }
        }

        self.returning(&insert.returning)
    }

    fn insert_value(
        &mut self,
        insert: &Insert,
        value: &InsertValue,
        counter: usize,
    ) -> CompileResult<usize> {
        match value {
            InsertValue::Default => {
                self.push("DEFAULT");
                Ok(counter)
            }
            InsertValue::Param => {
                self.param(counter);
                Ok(counter + 1)
            }
            InsertValue::Placeholder(n) => {
                if *n == 0 || *n > insert.placeholders {
                    return Err(CompileError::unsupported(
                        format!(
                            "placeholder ${} is outside the {} pre-bound values",
                            n, insert.placeholders
                        ),
                        insert,
                    ));
                }
                self.param(*n);
                Ok(counter)
            }
            InsertValue::Query(query) => {
                self.push("(");
                let counter = self.counted_select(query, "s", counter)?;
                self.push(")");
                Ok(counter)
            }
        }
    }

    /// Render a select whose parameters start at `counter`, returning the
    /// counter advanced past them.
    fn counted_select(&mut self, query: &Select, prefix: &str, counter: usize) -> CompileResult<usize> {
        let mark = self.used.len();
        self.select(query, prefix, counter - 1)?;
        Ok(match self.max_param_since(mark) {
            Some(max) if max >= counter => max + 1,
            _ => counter,
        })
    }

    fn conflict_target(&mut self, target: &ConflictTarget) -> CompileResult<()> {
        match target {
            ConflictTarget::Any => {}
            ConflictTarget::Columns(columns) => {
                self.push("(");
                for (i, column) in columns.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.ident(column)?;
                }
                self.push(") ");
            }
            ConflictTarget::Constraint(name) => {
                self.push("ON CONSTRAINT ");
                self.ident(name)?;
                self.push(" ");
            }
            ConflictTarget::Unsafe(sql) => {
                self.push(sql);
                self.push(" ");
            }
        }
        Ok(())
    }

    fn update(&mut self, update: &Update) -> CompileResult<()> {
        if update.assignments.is_empty() {
            return Err(CompileError::unsupported("update has no assignments", update));
        }
        let scope = Scope::new(std::slice::from_ref(&update.source), "", 0);

        self.push("UPDATE ");
        self.table_source(&scope, update)?;
        self.push(" SET ");
        self.assignments(&scope, &update.assignments)?;
        self.predicates(&scope, " WHERE ", &update.filters)?;
        self.returning(&update.returning)
    }

    fn delete(&mut self, delete: &Delete) -> CompileResult<()> {
        let scope = Scope::new(std::slice::from_ref(&delete.source), "", 0);

        self.push("DELETE FROM ");
        self.table_source(&scope, delete)?;
        self.predicates(&scope, " WHERE ", &delete.filters)?;
        self.returning(&delete.returning)
    }

    /// `"table" AS alias` for update and delete, which only accept tables.
    fn table_source(&mut self, scope: &Scope<'_>, statement: &impl std::fmt::Debug) -> CompileResult<()> {
        match &scope.sources[0].kind {
            SourceKind::Table(table) => {
                let name = quote_table(table.prefix.as_deref(), &table.name)?;
                self.push(&name);
                self.push(" AS ");
                self.push(&scope.aliases[0]);
                Ok(())
            }
            _ => Err(CompileError::unsupported(
                "only tables can be updated or deleted from",
                statement,
            )),
        }
    }
}

/// Every source after the first must be bound by exactly one join.
fn check_bindings(select: &Select) -> CompileResult<()> {
    let mut bound = vec![false; select.sources.len()];
    if let Some(first) = bound.first_mut() {
        *first = true;
    }

    for join in &select.joins {
        if join.source == 0 {
            return Err(CompileError::unsupported(
                "the FROM source cannot be joined",
                select,
            ));
        }
        match bound.get_mut(join.source) {
            None => return Err(CompileError::unknown_source(join.source, select)),
            Some(true) => {
                return Err(CompileError::unsupported(
                    format!("source {} is joined more than once", join.source),
                    select,
                ));
            }
            Some(slot) => *slot = true,
        }
    }

    if bound.iter().any(|b| !b) {
        return Err(CompileError::unsupported(
            "multiple FROM sources must be bound by joins",
            select,
        ));
    }

    // Joins are rendered in declaration order, and an ON clause may only
    // refer to the FROM source, sources joined before it, and its own source.
    let mut rendered = vec![false; select.sources.len()];
    if let Some(first) = rendered.first_mut() {
        *first = true;
    }
    for join in &select.joins {
        rendered[join.source] = true;
        if let Some(on) = &join.on {
            let mut referenced = Vec::new();
            referenced_sources(on, &mut referenced);
            let unrendered = referenced
                .into_iter()
                .find(|i| !rendered.get(*i).copied().unwrap_or(false));
            if let Some(index) = unrendered {
                return Err(CompileError::unknown_source(index, select));
            }
        }
    }

    Ok(())
}

/// Source indexes referenced directly by `expr`, not descending into
/// subqueries, which have their own scope.
fn referenced_sources(expr: &Expr, out: &mut Vec<usize>) {
    match expr {
        Expr::Column { source, .. } | Expr::Source(source) => out.push(*source),
        Expr::Binary { left, right, .. } => {
            referenced_sources(left, out);
            referenced_sources(right, out);
        }
        Expr::Not(inner) | Expr::IsNull(inner) => referenced_sources(inner, out),
        Expr::Cast { expr, .. } | Expr::Over { expr, .. } => referenced_sources(expr, out),
        Expr::In { expr, set } => {
            referenced_sources(expr, out);
            if let InSet::List(items) = set {
                for item in items {
                    referenced_sources(item, out);
                }
            }
        }
        Expr::Func { args, .. } => {
            for arg in args {
                referenced_sources(arg, out);
            }
        }
        Expr::Fragment(parts) => {
            for part in parts {
                if let FragmentPart::Expr(e) = part {
                    referenced_sources(e, out);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddl::{ColumnDefinition, ColumnType, CreateTable, DdlOp};
    use crate::expr::{BinaryOp, WindowSpec};
    use crate::query::{CombinatorKind, Direction, Join, JoinKind, TableRef};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn sql(select: &Select) -> String {
        compile_select(select).unwrap().sql
    }

    fn users() -> Source {
        Source::table("users")
    }

    #[test]
    fn test_join_filter_order_scenario() {
        let query = Select::from(users())
            .join(
                JoinKind::Inner,
                Source::table("orders"),
                Expr::col(0, "id").equals(Expr::col(1, "id")),
            )
            .select(Expr::col(0, "name"))
            .select(Expr::col(1, "total"))
            .filter(Expr::col(0, "age").gt(Expr::param(0)))
            .order_by(OrderBy::desc(Expr::col(0, "name")));

        let compiled = compile(&Statement::Select(query)).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT u0.\"name\", o1.\"total\" FROM \"users\" AS u0 \
             INNER JOIN \"orders\" AS o1 ON (u0.\"id\" = o1.\"id\") \
             WHERE (u0.\"age\" > $1) ORDER BY u0.\"name\" DESC"
        );
        assert_eq!(compiled.parameter_count, 1);
    }

    #[test]
    fn test_empty_projection_is_true() {
        let query = Select::from(users()).filter(Expr::col(0, "id").equals(Expr::param(0)));
        assert_eq!(
            sql(&query),
            "SELECT TRUE FROM \"users\" AS u0 WHERE (u0.\"id\" = $1)"
        );
    }

    #[test]
    fn test_select_without_from() {
        let query = Select::default().select(Expr::lit(1));
        assert_eq!(sql(&query), "SELECT 1");
    }

    #[test]
    fn test_alias_naming() {
        let query = Select::from(Source::table("_staging"))
            .join(JoinKind::Left, Source::table("Accounts"), Expr::lit(true))
            .join(
                JoinKind::Left,
                Source::subquery(Select::from(users())),
                Expr::lit(true),
            )
            .join(
                JoinKind::Left,
                Source::fragment("read_parquet('events/*.parquet')"),
                Expr::lit(true),
            );

        assert_eq!(
            sql(&query),
            "SELECT TRUE FROM \"_staging\" AS t0 \
             LEFT OUTER JOIN \"Accounts\" AS a1 ON (TRUE) \
             LEFT OUTER JOIN (SELECT TRUE FROM \"users\" AS su0) AS s2 ON (TRUE) \
             LEFT OUTER JOIN read_parquet('events/*.parquet') AS f3 ON (TRUE)"
        );
    }

    #[test]
    fn test_schema_prefixed_table() {
        let query = Select::from(Source::table_in("lake", "events")).select(Expr::col(0, "id"));
        assert_eq!(sql(&query), "SELECT e0.\"id\" FROM \"lake\".\"events\" AS e0");
    }

    #[test]
    fn test_whole_source_projection() {
        let query = Select::from(users().with_fields(["id", "name"])).select(Expr::Source(0));
        assert_eq!(
            sql(&query),
            "SELECT u0.\"id\", u0.\"name\" FROM \"users\" AS u0"
        );
    }

    #[test]
    fn test_whole_source_without_fields_is_rejected() {
        let query = Select::from(users()).select(Expr::Source(0));
        assert!(matches!(
            compile_select(&query),
            Err(CompileError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_select_alias_and_distinct() {
        let query = Select::from(users())
            .distinct(Distinct::All)
            .select_as(Expr::func("lower", vec![Expr::col(0, "email")]), "email");
        assert_eq!(
            sql(&query),
            "SELECT DISTINCT lower(u0.\"email\") AS \"email\" FROM \"users\" AS u0"
        );
    }

    #[test]
    fn test_distinct_on_injects_order_by() {
        let query = Select::from(users())
            .distinct(Distinct::On(vec![Expr::col(0, "team")]))
            .select(Expr::col(0, "name"))
            .order_by(OrderBy::new(Expr::col(0, "score"), Direction::DescNullsLast));
        assert_eq!(
            sql(&query),
            "SELECT DISTINCT ON (u0.\"team\") u0.\"name\" FROM \"users\" AS u0 \
             ORDER BY u0.\"team\", u0.\"score\" DESC NULLS LAST"
        );
    }

    #[test]
    fn test_multiple_filters_are_parenthesized() {
        let query = Select::from(users())
            .filter(Expr::col(0, "a").equals(Expr::lit(1)).or(Expr::col(0, "b").equals(Expr::lit(2))))
            .filter(Expr::col(0, "c").is_null().not());
        assert_eq!(
            sql(&query),
            "SELECT TRUE FROM \"users\" AS u0 \
             WHERE ((u0.\"a\" = 1) OR (u0.\"b\" = 2)) AND (NOT (u0.\"c\" IS NULL))"
        );
    }

    #[test]
    fn test_unbound_sources_are_rejected() {
        let mut query = Select::from(users());
        query.sources.push(Source::table("orders"));
        let err = compile_select(&query).unwrap_err();
        assert!(err.to_string().contains("multiple FROM sources"));
    }

    #[test]
    fn test_unknown_column_source() {
        let query = Select::from(users()).filter(Expr::col(3, "id").equals(Expr::lit(1)));
        assert!(matches!(
            compile_select(&query),
            Err(CompileError::UnknownSource { index: 3, .. })
        ));
    }

    #[test]
    fn test_join_on_may_not_reference_later_sources() {
        let query = Select::from(users())
            .join(
                JoinKind::Inner,
                Source::table("orders"),
                Expr::col(2, "id").equals(Expr::col(0, "id")),
            )
            .join(
                JoinKind::Inner,
                Source::table("items"),
                Expr::col(1, "id").equals(Expr::col(2, "order_id")),
            );
        assert!(matches!(
            compile_select(&query),
            Err(CompileError::UnknownSource { index: 2, .. })
        ));
    }

    #[test]
    fn test_join_on_checks_sources_joined_so_far() {
        let mut query = Select::from(users());
        query.sources.push(Source::table("orders"));
        query.sources.push(Source::table("items"));
        query.joins.push(Join {
            kind: JoinKind::Inner,
            source: 2,
            on: Some(Expr::col(2, "order_id").equals(Expr::col(1, "id"))),
        });
        query.joins.push(Join {
            kind: JoinKind::Inner,
            source: 1,
            on: Some(Expr::col(1, "user_id").equals(Expr::col(0, "id"))),
        });
        assert!(matches!(
            compile_select(&query),
            Err(CompileError::UnknownSource { index: 1, .. })
        ));

        query.joins[0].on = Some(Expr::col(2, "owner_id").equals(Expr::col(0, "id")));
        query.joins[1].on = Some(Expr::col(1, "id").equals(Expr::col(2, "order_id")));
        assert_eq!(
            sql(&query),
            "SELECT TRUE FROM \"users\" AS u0 \
             INNER JOIN \"items\" AS i2 ON (i2.\"owner_id\" = u0.\"id\") \
             INNER JOIN \"orders\" AS o1 ON (o1.\"id\" = i2.\"order_id\")"
        );
    }

    #[test]
    fn test_join_kinds() {
        let query = Select::from(users())
            .join(JoinKind::Full, Source::table("orders"), Expr::lit(true))
            .cross_join(Source::table("regions"));
        assert_eq!(
            sql(&query),
            "SELECT TRUE FROM \"users\" AS u0 FULL OUTER JOIN \"orders\" AS o1 ON (TRUE) \
             CROSS JOIN \"regions\" AS r2"
        );

        let mut query = Select::from(users()).join(JoinKind::Left, Source::table("orders"), Expr::lit(true));
        query.joins[0].on = None;
        assert_eq!(
            sql(&query),
            "SELECT TRUE FROM \"users\" AS u0 LEFT OUTER JOIN \"orders\" AS o1 ON TRUE"
        );
    }

    #[test]
    fn test_lateral_join_references_earlier_source() {
        let inner = Select::from(Source::table("orders"))
            .select(Expr::col(0, "total"))
            .limit(Expr::lit(1));
        let query = Select::from(users())
            .join(JoinKind::InnerLateral, Source::subquery(inner), Expr::lit(true))
            .select(Expr::col(1, "total"));
        assert_eq!(
            sql(&query),
            "SELECT s1.\"total\" FROM \"users\" AS u0 \
             INNER JOIN LATERAL (SELECT so0.\"total\" FROM \"orders\" AS so0 LIMIT 1) AS s1 ON (TRUE)"
        );
    }

    #[test]
    fn test_group_by_having_limit_offset() {
        let query = Select::from(Source::table("orders"))
            .select(Expr::col(0, "user_id"))
            .select(Expr::func("count", vec![Expr::col(0, "id")]))
            .group_by(Expr::col(0, "user_id"))
            .having(Expr::func("count", vec![Expr::col(0, "id")]).gt(Expr::param(0)))
            .limit(Expr::param(1))
            .offset(Expr::lit(20));
        let compiled = compile_select(&query).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT o0.\"user_id\", count(o0.\"id\") FROM \"orders\" AS o0 \
             GROUP BY o0.\"user_id\" HAVING (count(o0.\"id\") > $1) LIMIT $2 OFFSET 20"
        );
        assert_eq!(compiled.parameter_count, 2);
    }

    #[test]
    fn test_windows() {
        let spec = WindowSpec::new()
            .partition_by(Expr::col(0, "team"))
            .order_by(OrderBy::desc(Expr::col(0, "score")));
        let query = Select::from(users())
            .select(Expr::func("rank", vec![]).over("w"))
            .select(
                Expr::func("sum", vec![Expr::col(0, "score")]).over_spec(
                    WindowSpec::new()
                        .order_by(OrderBy::asc(Expr::col(0, "id")))
                        .frame("ROWS BETWEEN 1 PRECEDING AND CURRENT ROW"),
                ),
            )
            .window("w", spec);
        assert_eq!(
            sql(&query),
            "SELECT rank() OVER \"w\", \
             sum(u0.\"score\") OVER (ORDER BY u0.\"id\" ROWS BETWEEN 1 PRECEDING AND CURRENT ROW) \
             FROM \"users\" AS u0 \
             WINDOW \"w\" AS (PARTITION BY u0.\"team\" ORDER BY u0.\"score\" DESC)"
        );
    }

    #[test]
    fn test_combinators_have_independent_aliases() {
        let admins = Select::from(Source::table("admins")).select(Expr::col(0, "email"));
        let query = Select::from(users())
            .select(Expr::col(0, "email"))
            .filter(Expr::col(0, "active").equals(Expr::param(0)))
            .combine(
                CombinatorKind::UnionAll,
                admins.filter(Expr::col(0, "level").gt(Expr::param(1))),
            )
            .order_by(OrderBy::asc(Expr::raw("1")));
        let compiled = compile_select(&query).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT u0.\"email\" FROM \"users\" AS u0 WHERE (u0.\"active\" = $1) \
             UNION ALL (SELECT a0.\"email\" FROM \"admins\" AS a0 WHERE (a0.\"level\" > $2)) \
             ORDER BY 1"
        );
        assert_eq!(compiled.parameter_count, 2);
    }

    #[test]
    fn test_cte() {
        let recent = Select::from(Source::table("orders"))
            .select(Expr::col(0, "user_id"))
            .filter(Expr::col(0, "total").gt(Expr::param(0)));
        let query = Select::from(Source::table("recent"))
            .select(Expr::col(0, "user_id"))
            .with_cte("recent", recent, false);
        assert_eq!(
            sql(&query),
            "WITH \"recent\" AS (SELECT o0.\"user_id\" FROM \"orders\" AS o0 WHERE (o0.\"total\" > $1)) \
             SELECT r0.\"user_id\" FROM \"recent\" AS r0"
        );

        let query = Select::default()
            .select(Expr::lit(1))
            .with_cte("t", Select::default().select(Expr::lit(1)), true);
        assert_eq!(sql(&query), "WITH RECURSIVE \"t\" AS (SELECT 1) SELECT 1");
    }

    #[test]
    fn test_in_forms() {
        let query = Select::from(users())
            .filter(Expr::col(0, "id").in_set(InSet::List(vec![])))
            .filter(Expr::col(0, "id").in_set(InSet::List(vec![Expr::param(0), Expr::param(1)])))
            .filter(Expr::col(0, "role").in_set(InSet::Param(2)))
            .filter(Expr::col(0, "id").in_set(InSet::Subquery(Box::new(
                Select::from(Source::table("bans")).select(Expr::col(0, "user_id")),
            ))));
        let compiled = compile_select(&query).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT TRUE FROM \"users\" AS u0 WHERE (false) \
             AND (u0.\"id\" IN ($1, $2)) \
             AND (u0.\"role\" = ANY($3)) \
             AND (u0.\"id\" IN (SELECT sb0.\"user_id\" FROM \"bans\" AS sb0))"
        );
        assert_eq!(compiled.parameter_count, 3);
    }

    #[test]
    fn test_exists_cast_and_subquery() {
        let orders = Select::from(Source::table("orders")).filter(
            Expr::col(0, "status").equals(Expr::lit("open")),
        );
        let query = Select::from(users())
            .select(Expr::col(0, "id").cast(ColumnType::Text))
            .select(Expr::Subquery(Box::new(
                Select::from(Source::table("orders")).select(Expr::func("max", vec![Expr::col(0, "total")])),
            )))
            .filter(Expr::Exists(Box::new(orders)));
        assert_eq!(
            sql(&query),
            "SELECT u0.\"id\"::TEXT, (SELECT max(so0.\"total\") FROM \"orders\" AS so0) \
             FROM \"users\" AS u0 \
             WHERE (exists(SELECT TRUE FROM \"orders\" AS so0 WHERE (so0.\"status\" = 'open')))"
        );
    }

    #[test]
    fn test_negated_operand_of_is_null_keeps_grouping() {
        let query = Select::from(users()).filter(Expr::col(0, "a").not().is_null());
        assert_eq!(
            sql(&query),
            "SELECT TRUE FROM \"users\" AS u0 WHERE ((NOT (u0.\"a\")) IS NULL)"
        );
    }

    #[test]
    fn test_cast_of_negative_literal() {
        let query = Select::default().select(Expr::lit(-5).cast(ColumnType::Text));
        assert_eq!(sql(&query), "SELECT (-5)::TEXT");

        let query = Select::default().select(Expr::lit(-1.5).cast(ColumnType::Text));
        assert_eq!(sql(&query), "SELECT (-1.5)::TEXT");

        let query = Select::default().select(
            Expr::lit(Decimal::from_str("-2.25").unwrap()).cast(ColumnType::Text),
        );
        assert_eq!(sql(&query), "SELECT (-2.25)::TEXT");
    }

    #[test]
    fn test_cast_of_in_list() {
        let query = Select::from(users()).select(
            Expr::col(0, "a")
                .in_set(InSet::List(vec![Expr::lit(1)]))
                .cast(ColumnType::Text),
        );
        assert_eq!(
            sql(&query),
            "SELECT (u0.\"a\" IN (1))::TEXT FROM \"users\" AS u0"
        );
    }

    #[test]
    fn test_compound_operands_are_parenthesized() {
        let query = Select::from(users())
            .select(Expr::col(0, "c").cast(ColumnType::Integer).cast(ColumnType::Text))
            .select(Expr::col(0, "d").plus(Expr::lit(-1)))
            .filter(Expr::col(0, "a").is_null().equals(Expr::lit(false)))
            .filter(Expr::col(0, "b").not().or(Expr::col(0, "e").is_null()))
            .filter(
                Expr::col(0, "id")
                    .in_set(InSet::Param(0))
                    .and(Expr::col(0, "role").in_set(InSet::List(vec![Expr::lit("admin")]))),
            )
            .filter(Expr::col(0, "score").gt(Expr::lit(0)));
        assert_eq!(
            sql(&query),
            "SELECT (u0.\"c\"::INTEGER)::TEXT, u0.\"d\" + (-1) FROM \"users\" AS u0 \
             WHERE ((u0.\"a\" IS NULL) = FALSE) \
             AND ((NOT (u0.\"b\")) OR (u0.\"e\" IS NULL)) \
             AND ((u0.\"id\" = ANY($1)) AND (u0.\"role\" IN ('admin'))) \
             AND (u0.\"score\" > 0)"
        );
    }

    #[test]
    fn test_window_call_as_operand() {
        let query = Select::from(users())
            .select(Expr::func("row_number", vec![]).over("w").cast(ColumnType::Text))
            .window("w", WindowSpec::new().partition_by(Expr::col(0, "team")));
        assert!(sql(&query).starts_with("SELECT (row_number() OVER \"w\")::TEXT FROM"));
    }

    #[test]
    fn test_nested_subqueries_stack_prefixes() {
        let innermost = Select::from(Source::table("items")).select(Expr::col(0, "id"));
        let middle = Select::from(Source::table("orders"))
            .select(Expr::col(0, "id"))
            .filter(Expr::col(0, "item_id").in_set(InSet::Subquery(Box::new(innermost))));
        let query = Select::from(users()).filter(Expr::Exists(Box::new(middle)));
        assert_eq!(
            sql(&query),
            "SELECT TRUE FROM \"users\" AS u0 WHERE (exists(SELECT so0.\"id\" FROM \"orders\" AS so0 \
             WHERE (so0.\"item_id\" IN (SELECT ssi0.\"id\" FROM \"items\" AS ssi0))))"
        );
    }

    #[test]
    fn test_literals() {
        let cases: Vec<(Literal, &str)> = vec![
            (Literal::Null, "NULL"),
            (Literal::Bool(true), "TRUE"),
            (Literal::Bool(false), "FALSE"),
            (Literal::Int(-42), "-42"),
            (Literal::Float(1.5), "1.5"),
            (Literal::Float(2.0), "2.0"),
            (Literal::Float(f64::NAN), "'NaN'::DOUBLE"),
            (Literal::Float(f64::INFINITY), "'Infinity'::DOUBLE"),
            (Literal::Float(f64::NEG_INFINITY), "'-Infinity'::DOUBLE"),
            (Literal::String("it's".into()), "'it''s'"),
            (Literal::Binary(vec![0x00, 0xab, 0x10]), "'\\x00\\xAB\\x10'::BLOB"),
            (Literal::Decimal(Decimal::from_str("12.50").unwrap()), "12.50"),
            (
                Literal::Array(vec![Literal::Int(1), Literal::String("a".into())]),
                "[1, 'a']",
            ),
        ];
        for (lit, expected) in cases {
            let mut out = String::new();
            push_literal(&mut out, &lit);
            assert_eq!(out, expected, "literal {:?}", lit);
        }
    }

    #[test]
    fn test_string_literal_round_trip() {
        let samples = ["", "'", "a''b", "O'Reilly", "tab\there", "☃'☃"];
        for s in samples {
            let query = Select::default().select(Expr::lit(s));
            let sql = sql(&query);
            let quoted = sql.strip_prefix("SELECT ").unwrap();
            let unquoted = quoted[1..quoted.len() - 1].replace("''", "'");
            assert_eq!(unquoted, s);
        }
    }

    #[test]
    fn test_identifier_rejection_everywhere() {
        let bad = "bad\"name";
        let cases: Vec<Statement> = vec![
            Select::from(Source::table(bad)).into(),
            Select::from(users()).select(Expr::col(0, bad)).into(),
            Select::from(users()).select_as(Expr::lit(1), bad).into(),
            Select::from(users())
                .select(Expr::func("rank", vec![]).over(bad))
                .into(),
            Insert::new("users").columns([bad]).row(vec![InsertValue::Param]).into(),
            Insert::new("users")
                .columns(["a"])
                .row(vec![InsertValue::Param])
                .returning([bad])
                .into(),
            Update::new("users").set(bad, Expr::param(0)).into(),
            Delete::new(bad).into(),
            DdlOp::CreateTable(CreateTable::new(bad).column(ColumnDefinition::new("a", ColumnType::Text)))
                .into(),
        ];
        for statement in cases {
            let err = compile(&statement).unwrap_err();
            assert_eq!(err, CompileError::InvalidIdentifier(bad.to_string()));
        }
    }

    #[test]
    fn test_function_names_must_be_bare() {
        let query = Select::default().select(Expr::func("now(); DROP TABLE x; --", vec![]));
        assert!(matches!(
            compile_select(&query),
            Err(CompileError::InvalidName(_))
        ));
    }

    #[test]
    fn test_keyword_fragment_is_unsupported() {
        let query = Select::from(users())
            .filter(Expr::KeywordFragment(vec![("title".into(), Expr::lit("x"))]));
        let err = compile_select(&query).unwrap_err();
        assert!(matches!(err, CompileError::Unsupported { .. }));
        assert!(err.to_string().contains("title"));
    }

    #[test]
    fn test_fragment_with_embedded_expressions() {
        let query = Select::from(users()).filter(Expr::Fragment(vec![
            FragmentPart::Raw("json_extract(".into()),
            FragmentPart::Expr(Expr::col(0, "meta")),
            FragmentPart::Raw(", '$.plan') = ".into()),
            FragmentPart::Expr(Expr::param(0)),
        ]));
        let compiled = compile_select(&query).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT TRUE FROM \"users\" AS u0 WHERE (json_extract(u0.\"meta\", '$.plan') = $1)"
        );
        assert_eq!(compiled.parameter_count, 1);
    }

    #[test]
    fn test_lock_hint_is_omitted() {
        let query = Select::from(users()).lock("FOR UPDATE");
        assert_eq!(sql(&query), "SELECT TRUE FROM \"users\" AS u0");
    }

    #[test]
    fn test_placeholder_contiguity_at_depth() {
        // Parameters spread over nesting levels still number $1..$k.
        let mut query = Select::from(users()).filter(Expr::col(0, "id").equals(Expr::param(0)));
        for depth in 1..6 {
            let inner = Select::from(Source::table("orders"))
                .select(Expr::col(0, "user_id"))
                .filter(Expr::col(0, "n").equals(Expr::param(depth)));
            query = query.filter(Expr::col(0, "id").in_set(InSet::Subquery(Box::new(inner))));
        }
        let compiled = compile_select(&query).unwrap();
        assert_eq!(compiled.parameter_count, 6);
        for n in 1..=6 {
            assert!(compiled.sql.contains(&format!("${}", n)));
        }
        assert!(!compiled.sql.contains("$7"));
    }

    #[test]
    fn test_repeated_parameter_counts_once() {
        let query = Select::from(users())
            .filter(Expr::col(0, "a").equals(Expr::param(0)))
            .filter(Expr::col(0, "b").equals(Expr::param(0)));
        assert_eq!(compile_select(&query).unwrap().parameter_count, 1);
    }

    #[test]
    fn test_parameter_gaps_are_rejected() {
        let query = Select::from(users())
            .filter(Expr::col(0, "a").equals(Expr::param(0)))
            .filter(Expr::col(0, "b").equals(Expr::param(2)));
        assert_eq!(
            compile_select(&query).unwrap_err(),
            CompileError::NonContiguousParameters {
                expected: 2,
                found: 3
            }
        );
    }

    #[test]
    fn test_binary_operators() {
        let expr = Expr::binary(
            BinaryOp::Mul,
            Expr::col(0, "price").plus(Expr::lit(1)),
            Expr::binary(BinaryOp::Sub, Expr::lit(10), Expr::col(0, "discount")),
        );
        let query = Select::from(Source::table("items"))
            .select(expr)
            .filter(Expr::col(0, "name").like(Expr::lit("a%")))
            .filter(Expr::binary(BinaryOp::ILike, Expr::col(0, "name"), Expr::lit("B%")))
            .filter(Expr::col(0, "qty").not_equals(Expr::lit(0)));
        assert_eq!(
            sql(&query),
            "SELECT (i0.\"price\" + 1) * (10 - i0.\"discount\") FROM \"items\" AS i0 \
             WHERE (i0.\"name\" LIKE 'a%') AND (i0.\"name\" ILIKE 'B%') AND (i0.\"qty\" != 0)"
        );
    }

    #[test]
    fn test_insert_rows_advance_counter() {
        let insert = Insert::new("users")
            .columns(["name", "age"])
            .row(vec![InsertValue::Param, InsertValue::Param])
            .row(vec![InsertValue::Param, InsertValue::Default])
            .returning(["id"]);
        let compiled = compile_insert(&insert).unwrap();
        assert_eq!(
            compiled.sql,
            "INSERT INTO \"users\" (\"name\", \"age\") VALUES ($1, $2),($3, DEFAULT) RETURNING \"id\""
        );
        assert_eq!(compiled.parameter_count, 3);
    }

    #[test]
    fn test_insert_with_pre_bound_placeholders() {
        let insert = Insert::new("events")
            .columns(["tenant", "kind", "payload"])
            .placeholders(1)
            .row(vec![InsertValue::Placeholder(1), InsertValue::Param, InsertValue::Param])
            .row(vec![InsertValue::Placeholder(1), InsertValue::Param, InsertValue::Param]);
        let compiled = compile_insert(&insert).unwrap();
        assert_eq!(
            compiled.sql,
            "INSERT INTO \"events\" (\"tenant\", \"kind\", \"payload\") VALUES ($1, $2, $3),($1, $4, $5)"
        );
        assert_eq!(compiled.parameter_count, 5);
    }

    #[test]
    fn test_insert_placeholder_out_of_range() {
        let insert = Insert::new("events")
            .columns(["tenant"])
            .placeholders(1)
            .row(vec![InsertValue::Placeholder(2)]);
        assert!(matches!(
            compile_insert(&insert),
            Err(CompileError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_insert_value_subquery_shares_counter() {
        let lookup = Select::from(Source::table("teams"))
            .select(Expr::col(0, "id"))
            .filter(Expr::col(0, "slug").equals(Expr::param(0)));
        let insert = Insert::new("users")
            .columns(["name", "team_id", "age"])
            .row(vec![
                InsertValue::Param,
                InsertValue::Query(Box::new(lookup)),
                InsertValue::Param,
            ]);
        let compiled = compile_insert(&insert).unwrap();
        assert_eq!(
            compiled.sql,
            "INSERT INTO \"users\" (\"name\", \"team_id\", \"age\") \
             VALUES ($1, (SELECT st0.\"id\" FROM \"teams\" AS st0 WHERE (st0.\"slug\" = $2)), $3)"
        );
        assert_eq!(compiled.parameter_count, 3);
    }

    #[test]
    fn test_insert_select_and_default_values() {
        let insert = Insert::new("archive").columns(["id"]).select(
            Select::from(users())
                .select(Expr::col(0, "id"))
                .filter(Expr::col(0, "age").gt(Expr::param(0))),
        );
        assert_eq!(
            compile_insert(&insert).unwrap().sql,
            "INSERT INTO \"archive\" (\"id\") SELECT u0.\"id\" FROM \"users\" AS u0 WHERE (u0.\"age\" > $1)"
        );

        let insert = Insert::new("counters").row(vec![]);
        assert_eq!(
            compile_insert(&insert).unwrap().sql,
            "INSERT INTO \"counters\" DEFAULT VALUES"
        );
    }

    #[test]
    fn test_insert_row_width_mismatch() {
        let insert = Insert::new("users")
            .columns(["a", "b"])
            .row(vec![InsertValue::Param]);
        assert!(compile_insert(&insert).is_err());
    }

    #[test]
    fn test_on_conflict_forms() {
        let base = || {
            Insert::new("users")
                .columns(["email", "name"])
                .row(vec![InsertValue::Param, InsertValue::Param])
        };

        let insert = base().on_conflict(ConflictTarget::Any, ConflictAction::Nothing);
        assert_eq!(
            compile_insert(&insert).unwrap().sql,
            "INSERT INTO \"users\" (\"email\", \"name\") VALUES ($1, $2) ON CONFLICT DO NOTHING"
        );

        let insert = base().on_conflict(
            ConflictTarget::Columns(vec!["email".into()]),
            ConflictAction::Replace(vec!["name".into()]),
        );
        assert_eq!(
            compile_insert(&insert).unwrap().sql,
            "INSERT INTO \"users\" (\"email\", \"name\") VALUES ($1, $2) \
             ON CONFLICT (\"email\") DO UPDATE SET \"name\" = EXCLUDED.\"name\""
        );

        let insert = base().on_conflict(
            ConflictTarget::Constraint("users_email_key".into()),
            ConflictAction::Nothing,
        );
        assert_eq!(
            compile_insert(&insert).unwrap().sql,
            "INSERT INTO \"users\" (\"email\", \"name\") VALUES ($1, $2) \
             ON CONFLICT ON CONSTRAINT \"users_email_key\" DO NOTHING"
        );

        let insert = base().on_conflict(
            ConflictTarget::Unsafe("(lower(email))".into()),
            ConflictAction::Nothing,
        );
        assert_eq!(
            compile_insert(&insert).unwrap().sql,
            "INSERT INTO \"users\" (\"email\", \"name\") VALUES ($1, $2) \
             ON CONFLICT (lower(email)) DO NOTHING"
        );
    }

    #[test]
    fn test_on_conflict_invalid_combinations() {
        let base = || {
            Insert::new("users")
                .columns(["email"])
                .row(vec![InsertValue::Param])
        };

        let raise_with_target = base().on_conflict(
            ConflictTarget::Columns(vec!["email".into()]),
            ConflictAction::Raise,
        );
        assert!(compile_insert(&raise_with_target).is_err());

        let replace_without_target =
            base().on_conflict(ConflictTarget::Any, ConflictAction::Replace(vec!["email".into()]));
        assert!(compile_insert(&replace_without_target).is_err());

        let update_without_target = base().on_conflict(
            ConflictTarget::Any,
            ConflictAction::Update(Box::new(Update::new("users").set("email", Expr::lit("x")))),
        );
        assert!(compile_insert(&update_without_target).is_err());
    }

    #[test]
    fn test_on_conflict_update_uses_insert_alias() {
        let update = Update::new("counters")
            .inc("hits", Expr::param(0))
            .set("touched_at", Expr::raw("EXCLUDED.\"touched_at\""))
            .filter(Expr::col(0, "hits").lt(Expr::param(1)));
        let insert = Insert::new("counters")
            .columns(["name", "hits", "touched_at"])
            .row(vec![InsertValue::Param, InsertValue::Param, InsertValue::Param])
            .on_conflict(
                ConflictTarget::Columns(vec!["name".into()]),
                ConflictAction::Update(Box::new(update)),
            )
            .returning(["hits"]);

        let compiled = compile_insert(&insert).unwrap();
        assert_eq!(
            compiled.sql,
            "INSERT INTO \"counters\" AS c0 (\"name\", \"hits\", \"touched_at\") VALUES ($1, $2, $3) \
             ON CONFLICT (\"name\") DO UPDATE SET \"hits\" = c0.\"hits\" + $4, \
             \"touched_at\" = EXCLUDED.\"touched_at\" WHERE (c0.\"hits\" < $5) RETURNING \"hits\""
        );
        assert_eq!(compiled.parameter_count, 5);
    }

    #[test]
    fn test_on_conflict_update_alias_tracks_table_name() {
        // The alias comes from the update's source, not the inserted table,
        // and every column reference in the update must use it.
        for table in ["accounts", "Zones", "_hidden"] {
            let update = Update::new(table)
                .set("n", Expr::col(0, "n").plus(Expr::lit(1)))
                .filter(Expr::col(0, "locked").equals(Expr::lit(false)));
            let insert = Insert::new(table)
                .columns(["k", "n"])
                .placeholders(2)
                .row(vec![InsertValue::Placeholder(1), InsertValue::Placeholder(2)])
                .on_conflict(
                    ConflictTarget::Columns(vec!["k".into()]),
                    ConflictAction::Update(Box::new(update)),
                );

            let compiled = compile_insert(&insert).unwrap();
            let alias = match table.chars().next() {
                Some(c) if c.is_ascii_alphabetic() => format!("{}0", c.to_ascii_lowercase()),
                _ => "t0".to_string(),
            };
            assert!(compiled.sql.contains(&format!("\"{}\" AS {} (", table, alias)));
            assert!(compiled.sql.contains(&format!("\"n\" = {}.\"n\" + 1", alias)));
            assert!(compiled.sql.contains(&format!("WHERE ({}.\"locked\" = FALSE)", alias)));
            assert_eq!(compiled.parameter_count, 2);
        }
    }

    #[test]
    fn test_update() {
        let update = Update::new("users")
            .set("name", Expr::param(0))
            .inc("logins", Expr::lit(1))
            .filter(Expr::col(0, "id").equals(Expr::param(1)))
            .returning(["id", "logins"]);
        let compiled = compile_update(&update).unwrap();
        assert_eq!(
            compiled.sql,
            "UPDATE \"users\" AS u0 SET \"name\" = $1, \"logins\" = u0.\"logins\" + 1 \
             WHERE (u0.\"id\" = $2) RETURNING \"id\", \"logins\""
        );
        assert_eq!(compiled.parameter_count, 2);
    }

    #[test]
    fn test_update_requires_assignments_and_table() {
        assert!(compile_update(&Update::new("users")).is_err());

        let mut update = Update::new("users").set("a", Expr::lit(1));
        update.source = Source::subquery(Select::from(users()));
        assert!(compile_update(&update).is_err());
    }

    #[test]
    fn test_delete() {
        let delete = Delete::new("sessions")
            .filter(Expr::col(0, "expires_at").lt(Expr::func("now", vec![])))
            .returning(["id"]);
        assert_eq!(
            compile_delete(&delete).unwrap().sql,
            "DELETE FROM \"sessions\" AS s0 WHERE (s0.\"expires_at\" < now()) RETURNING \"id\""
        );
        assert_eq!(
            compile_delete(&Delete::new("sessions")).unwrap().sql,
            "DELETE FROM \"sessions\" AS s0"
        );
    }

    #[test]
    fn test_update_and_delete_schema_prefixed_table() {
        let update = Update::new(TableRef::with_prefix("lake", "users")).set("name", Expr::param(0));
        assert_eq!(
            compile_update(&update).unwrap().sql,
            "UPDATE \"lake\".\"users\" AS u0 SET \"name\" = $1"
        );

        let delete = Delete::new(TableRef::with_prefix("lake", "sessions"))
            .filter(Expr::col(0, "id").equals(Expr::param(0)));
        assert_eq!(
            compile_delete(&delete).unwrap().sql,
            "DELETE FROM \"lake\".\"sessions\" AS s0 WHERE (s0.\"id\" = $1)"
        );
    }

    #[test]
    fn test_compile_single_ddl_statement() {
        let op = DdlOp::CreateTable(
            CreateTable::new("t").column(ColumnDefinition::new("a", ColumnType::Integer)),
        );
        let compiled = compile(&op.into()).unwrap();
        assert_eq!(compiled.sql, "CREATE TABLE \"t\" (\"a\" INTEGER)");
        assert_eq!(compiled.parameter_count, 0);

        let op = DdlOp::CreateTable(
            CreateTable::new("t")
                .comment("x")
                .column(ColumnDefinition::new("a", ColumnType::Integer)),
        );
        assert!(compile(&op.into()).is_err());
    }
}
