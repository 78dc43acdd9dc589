//! The part-tree vocabulary shared by every statement-family maker: the
//! `SqlPartKind` tag set, the `Table`/`Field`/`Query`/`QueryAlias`
//! capability traits, `DataSource`, and the generic two-pass walker.
//!
//! Grounded on `original_source/sqlcore/section.go` and
//! `original_source/sqlcore/abstract.go`.
//!
//! Rust-native deviation from the Go source (see `DESIGN.md`): rather than
//! one open-recursion interface hierarchy walked via runtime kind
//! dispatch, each statement family (`select`, `insert`, `update`, `delete`,
//! `create`, `drop`) defines its own small, closed `*Part` enum. The two
//! orderings ("direct"/collect, "reverse"/emit) are realized as plain
//! recursion over that enum's parent links via the `walk` function below,
//! generic over any type implementing `PartNode`. Because the tree is
//! immutable once built, ancestor queries (e.g. "is there a GROUP BY
//! ancestor?") don't need a separate mutable call-stack object — they walk
//! the same parent chain on demand.

use std::rc::Rc;

use crate::error::SqlError;
use crate::format::Format;
use crate::schema::TableDef;
use crate::statement::{Statement, StatementBatch, StatementType};

/// Tag identifying which statement section a part corresponds to. Used for
/// error messages and the parent-link-shape invariant (§8 property 1), not
/// for dispatch (dispatch is a plain `match` on the family's own enum).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SqlPartKind {
    Select,
    SelectFromOrJoin,
    SelectWhere,
    SelectGroupBy,
    SelectOrderBy,
    Insert,
    InsertValues,
    InsertReturning,
    InsertFrom,
    Update,
    UpdateFromOrJoin,
    UpdateWhere,
    Delete,
    DeleteWhere,
    CreateTable,
    CreateDatabase,
    DropTable,
    DropDatabase,
    Any,
}

/// Which sub-part of a function/expression is currently being rendered.
/// Only `Expr1`-`Expr3` are used by the trim/date templates that need to
/// special-case their argument position; `Any` is the default.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum SqlSubPartKind {
    #[default]
    Any,
    Expr1,
    Expr2,
    Expr3,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
}

impl JoinKind {
    pub fn keyword(self) -> &'static str {
        match self {
            JoinKind::Inner => "inner join",
            JoinKind::Left => "left join",
            JoinKind::Right => "right join",
        }
    }
}

/// A node in a statement-family's part tree: tagged with a kind and an
/// optional parent, the two things the generic walker needs.
pub trait PartNode {
    fn part_kind(&self) -> SqlPartKind;
    fn parent(&self) -> Option<&Self>;
}

/// True if `node`, or any ancestor reached by following `parent()` links,
/// has kind `kind`. Replaces the Go source's mutable `CallStack.First`
/// lookup (see module doc).
pub fn has_ancestor<T: PartNode>(node: &T, kind: SqlPartKind) -> bool {
    let mut cur = Some(node);
    while let Some(n) = cur {
        if n.part_kind() == kind {
            return true;
        }
        cur = n.parent();
    }
    false
}

/// The generic two-pass walk (§4.1): invokes `process(true, node)` walking
/// from `leaf` up to the root (the "direct"/collect pass), then — when
/// `only_forward` is false — invokes `process(false, node)` unwinding back
/// from the root to `leaf` (the "reverse"/emit pass).
pub fn walk<T: PartNode>(leaf: &T, only_forward: bool, process: &mut dyn FnMut(bool, &T)) {
    process(true, leaf);
    if let Some(p) = leaf.parent() {
        walk(p, only_forward, process);
    }
    if !only_forward {
        process(false, leaf);
    }
}

/// A table: name plus enumerable fields.
pub trait Table {
    fn name(&self) -> &str;
    fn fields(&self) -> Vec<&dyn Field>;
}

pub trait Field {
    fn name(&self) -> &str;
}

/// Anything that can act as a source of columns: a table, an aliased
/// source, or (eagerly pre-rendered, see module doc) a subquery.
#[derive(Clone)]
pub enum DataSource {
    Table(Rc<TableDef>),
    Aliased { source: Box<DataSource>, alias: String },
    /// A FROM-subquery, already rendered against an indented `Format` at
    /// tree-construction time.
    Subquery { sql: String, args: Vec<crate::schema::Value>, alias: String },
}

impl DataSource {
    pub fn table(table: Rc<TableDef>) -> Self {
        DataSource::Table(table)
    }

    pub fn aliased(self, alias: impl Into<String>) -> Self {
        DataSource::Aliased { source: Box::new(self), alias: alias.into() }
    }

    pub fn is_table_based(&self) -> Option<&TableDef> {
        match self {
            DataSource::Table(t) => Some(t),
            DataSource::Aliased { source, .. } => source.is_table_based(),
            DataSource::Subquery { .. } => None,
        }
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            DataSource::Aliased { alias, .. } => Some(alias),
            DataSource::Subquery { alias, .. } => Some(alias),
            DataSource::Table(_) => None,
        }
    }

    pub fn column_count(&self) -> usize {
        match self {
            DataSource::Table(t) => t.column_count(),
            DataSource::Aliased { source, .. } => source.column_count(),
            DataSource::Subquery { .. } => 0,
        }
    }

    pub fn column_exists(&self, name: &str) -> bool {
        match self {
            DataSource::Table(t) => t.column_exists(name),
            DataSource::Aliased { source, .. } => source.column_exists(name),
            DataSource::Subquery { .. } => true,
        }
    }

    pub fn column_is_ambiguous(&self, name: &str) -> bool {
        match self {
            DataSource::Table(t) => t.column_is_ambiguous(name),
            DataSource::Aliased { source, .. } => source.column_is_ambiguous(name),
            DataSource::Subquery { .. } => false,
        }
    }

    /// Same underlying table/name identity, used by entry matching
    /// (`QueryEntries::find_entry`).
    pub fn same_source(&self, other: &DataSource) -> bool {
        match (self.is_table_based(), other.is_table_based()) {
            (Some(a), Some(b)) => std::ptr::eq(a, b) || a.name == b.name,
            _ => false,
        }
    }

    /// Render `<table> as <alias>` / `(<subquery>) as <alias>` / bare
    /// `<table>`, alongside any bound arguments the reference itself
    /// carries (only a subquery has any). Mirrors `Format.FormatDataSourceRef`.
    pub fn format_ref(&self, format: &crate::format::Format) -> (String, Vec<crate::schema::Value>) {
        match self {
            DataSource::Table(t) => (format.format_table_name(&t.name), Vec::new()),
            DataSource::Aliased { source, alias } => match source.as_ref() {
                DataSource::Subquery { .. } => unreachable!("subquery alias stored directly"),
                _ => {
                    let (sql, args) = source.format_ref(format);
                    (format!("{sql} as {alias}"), args)
                }
            },
            DataSource::Subquery { sql, args, alias } => {
                let indent = format.get_leading_space();
                (format!("(\n{indent}    {sql}\n{indent}) as {alias}"), args.clone())
            }
        }
    }

    /// Pretty description for error messages, e.g. `table "Customers" with
    /// fields: "Id","Name"`.
    pub fn pretty(&self) -> String {
        match self.is_table_based() {
            Some(t) => {
                let fields: Vec<String> = t.fields.items.iter().map(|f| format!("\"{}\"", f.name)).collect();
                format!("table \"{}\" with fields: {}", t.name, fields.join(","))
            }
            None => "query".to_string(),
        }
    }
}

/// Ordered list of currently-visible data sources during a maker's
/// traversal, with ambiguity-aware lookup by referenced source.
#[derive(Clone, Default)]
pub struct QueryEntries {
    pub sources: Vec<DataSource>,
}

impl QueryEntries {
    /// Find the single entry matching `needle` (by table identity or
    /// alias equality). Returns `(entry_index, ambiguous)`.
    pub fn find_entry(&self, needle: &DataSource) -> Option<(usize, bool)> {
        let matches: Vec<usize> = self
            .sources
            .iter()
            .enumerate()
            .filter(|(_, s)| Self::matches(s, needle))
            .map(|(i, _)| i)
            .collect();
        match matches.len() {
            0 => None,
            1 => Some((matches[0], false)),
            _ => Some((matches[0], true)),
        }
    }

    fn matches(a: &DataSource, b: &DataSource) -> bool {
        if let (Some(alias_a), Some(alias_b)) = (a.alias(), b.alias()) {
            return alias_a == alias_b;
        }
        a.same_source(b)
    }
}

/// A statement-tree stage that can render itself to a batch: the common
/// capability every statement family's terminal typestate stages share.
/// Mirrors the Go source's `SqlReady`/`SqlComplete` interfaces
/// (`GetSql`/`Validate`), which is how `sqlinsert/from.go` accepts "any
/// finished SELECT" as its `insert ... from` source without depending on
/// the `select` module's concrete types.
pub trait SqlReady {
    fn get_sql(&self, format: &mut Format) -> Result<StatementBatch, SqlError>;

    /// Build and discard, surfacing only whether the tree is well-formed.
    fn validate(&self, format: &mut Format) -> Result<(), SqlError> {
        self.get_sql(format).map(|_| ())
    }

    /// Number of columns this statement projects, when staticaly knowable
    /// without rendering — used by `insert ... from` to validate the
    /// destination field count against the source query's shape (mirrors
    /// the Go source's `sqlcore.Query.GetColumnCount`). `None` when this
    /// kind of statement-tree stage has no such notion.
    fn column_count(&self) -> Option<usize> {
        None
    }
}

/// Minimal connection-init collaborator (§6): opens a handle to a
/// dialect's system database for the `util` existence-check queries. The
/// core only needs this shape; an optional `sqlx`-backed implementation
/// lives in the `executor` module.
pub trait ConnInit {
    type Handle;
    fn open(&self, dialect: crate::dialect::Dialect, database: Option<&str>) -> Result<Self::Handle, SqlError>;
}

/// What the T-SQL exists-guard condition checks: `db_id(...)` or
/// `object_id(..., 'U')`. Shared by `create` and `drop` — the Go source
/// duplicates `ifExistsNotExistsBlockMicrosoftCase` byte-for-byte in both
/// `sqlcreate/create.go` and `sqldrop/drop.go` (see `DESIGN.md`).
pub enum ExistsGuardTarget {
    Database { name: String },
    Table { qualified_name: String },
}

/// Builds the `db_id(<name>) is [not] null` / `object_id(<name>, 'U') is
/// [not] null` condition expression. `negate` selects `is not null`
/// (DROP — the object must already exist) over `is null` (CREATE — the
/// object must not exist yet).
pub fn exists_guard_condition(target: ExistsGuardTarget, negate: bool) -> Box<dyn crate::expr::Expr> {
    use crate::dialect::Dialect;
    use crate::expr::{func, func_def, func_dialect_def, is_not_null, is_null, IntoExprArg};

    let (def, args): (_, Vec<Box<dyn crate::expr::Expr>>) = match target {
        ExistsGuardTarget::Database { name } => {
            let def = func_def(vec![func_dialect_def(Dialect::MSTSQL, "db_id({})", 1, Some(1))]);
            (def, vec![name.into_expr_arg()])
        }
        ExistsGuardTarget::Table { qualified_name } => {
            let def = func_def(vec![func_dialect_def(Dialect::MSTSQL, "object_id({})", 1, Some(2))]);
            (def, vec![qualified_name.into_expr_arg(), "U".into_expr_arg()])
        }
    };
    let call = func(def, args);
    if negate {
        Box::new(is_not_null(call))
    } else {
        Box::new(is_null(call))
    }
}

/// Wraps `stat` as `if <cond> begin <stat> end`, replacing it in place of
/// the plain CREATE/DROP text. Mirrors
/// `ifExistsNotExistsBlockMicrosoftCase`: the condition is rendered against
/// an empty scope (it never references a data source), and the wrapped
/// statement keeps whatever bound arguments it already carried plus
/// whatever the condition itself bound.
pub fn tsql_exists_wrapper(
    cond: &dyn crate::expr::Expr,
    part_kind: SqlPartKind,
    stat: Statement,
    format: &mut Format,
) -> Result<Statement, SqlError> {
    let entries = QueryEntries::default();
    let cond_stat = {
        let mut ctx = crate::expr::ExprBuildContext::new(part_kind, format, &entries).with_sub_part(SqlSubPartKind::Expr1);
        cond.build_sql(&mut ctx)?
    };
    let mut wrapped = Statement::new(StatementType::Exec);
    wrapped.write_str(&format.get_leading_space());
    wrapped.append_stat_parts_format("if {} begin", &[&cond_stat]);
    wrapped.write_str(format.section_divider);
    wrapped.append_stat_part(&stat);
    wrapped.write_str(format.section_divider);
    wrapped.write_str(&format.get_leading_space());
    wrapped.write_str("end");
    Ok(wrapped)
}
