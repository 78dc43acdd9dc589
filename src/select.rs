//! SELECT statement maker: projection, FROM/JOIN with scope-visibility
//! tracking, WHERE, GROUP BY, ORDER BY.
//!
//! Grounded on `original_source/sqlselect/{maker,select,from,where,
//! group_by,order_by}.go`. The fluent chain (`Select::new(...).from(...)
//! .inner_join(...).where_(...)`) is modeled as a family of typestate
//! wrapper structs around a single `SelectPart` tree enum, so the compiler
//! — not a runtime interface check — enforces which section can follow
//! which, mirroring the Go source's `Select`/`From`/`Where`/`GroupBy`/
//! `OrderBy` interfaces.

use crate::error::SqlError;
use crate::expr::{Expr, ExprBuildContext, IntoExprArg};
use crate::format::Format;
use crate::part::{walk, DataSource, JoinKind, PartNode, QueryEntries, SqlPartKind, SqlSubPartKind};
use crate::statement::{Statement, StatementBatch, StatementType};

/// One node of the SELECT part tree. `parent` links chain upward to the
/// root `Select` node, exactly the "leaf transitively owns the spine"
/// shape described in the part-tree design note.
pub enum SelectPart {
    Select { exprs: Vec<Box<dyn Expr>> },
    FromOrJoin { parent: Box<SelectPart>, source: DataSource, join: Option<(JoinKind, Box<dyn Expr>)> },
    Where { parent: Box<SelectPart>, cond: Box<dyn Expr> },
    GroupBy { parent: Box<SelectPart>, fields: Vec<Box<dyn Expr>> },
    OrderBy { parent: Box<SelectPart>, fields: Vec<Box<dyn Expr>> },
}

impl PartNode for SelectPart {
    fn part_kind(&self) -> SqlPartKind {
        match self {
            SelectPart::Select { .. } => SqlPartKind::Select,
            SelectPart::FromOrJoin { .. } => SqlPartKind::SelectFromOrJoin,
            SelectPart::Where { .. } => SqlPartKind::SelectWhere,
            SelectPart::GroupBy { .. } => SqlPartKind::SelectGroupBy,
            SelectPart::OrderBy { .. } => SqlPartKind::SelectOrderBy,
        }
    }

    fn parent(&self) -> Option<&Self> {
        match self {
            SelectPart::Select { .. } => None,
            SelectPart::FromOrJoin { parent, .. }
            | SelectPart::Where { parent, .. }
            | SelectPart::GroupBy { parent, .. }
            | SelectPart::OrderBy { parent, .. } => Some(parent.as_ref()),
        }
    }
}

/// The root of a SELECT tree; not itself renderable (no `From` yet), as in
/// the Go source's `Select` interface (no `GetSql`).
pub struct SelectRoot(SelectPart);

/// A `from`/`join` section; renderable.
pub struct FromStage(SelectPart);

/// A `where` section; renderable.
pub struct WhereStage(SelectPart);

/// A `group by` section; renderable.
pub struct GroupByStage(SelectPart);

/// An `order by` section; renderable, terminal.
pub struct OrderByStage(SelectPart);

pub fn select(exprs: Vec<Box<dyn Expr>>) -> SelectRoot {
    SelectRoot(SelectPart::Select { exprs })
}

impl SelectRoot {
    pub fn from(self, source: DataSource) -> FromStage {
        FromStage(SelectPart::FromOrJoin { parent: Box::new(self.0), source, join: None })
    }
}

fn join_stage(parent: SelectPart, kind: JoinKind, source: DataSource, cond: impl IntoExprArg) -> FromStage {
    FromStage(SelectPart::FromOrJoin { parent: Box::new(parent), source, join: Some((kind, cond.into_expr_arg())) })
}

impl FromStage {
    pub fn inner_join(self, source: DataSource, cond: impl IntoExprArg) -> FromStage {
        join_stage(self.0, JoinKind::Inner, source, cond)
    }

    pub fn left_join(self, source: DataSource, cond: impl IntoExprArg) -> FromStage {
        join_stage(self.0, JoinKind::Left, source, cond)
    }

    pub fn right_join(self, source: DataSource, cond: impl IntoExprArg) -> FromStage {
        join_stage(self.0, JoinKind::Right, source, cond)
    }

    pub fn where_(self, cond: impl IntoExprArg) -> WhereStage {
        WhereStage(SelectPart::Where { parent: Box::new(self.0), cond: cond.into_expr_arg() })
    }

    pub fn group_by(self, first: impl IntoExprArg, rest: Vec<Box<dyn Expr>>) -> GroupByStage {
        let mut fields = vec![first.into_expr_arg()];
        fields.extend(rest);
        GroupByStage(SelectPart::GroupBy { parent: Box::new(self.0), fields })
    }

    pub fn order_by(self, first: impl IntoExprArg, rest: Vec<Box<dyn Expr>>) -> OrderByStage {
        let mut fields = vec![first.into_expr_arg()];
        fields.extend(rest);
        OrderByStage(SelectPart::OrderBy { parent: Box::new(self.0), fields })
    }

    pub fn build(&self, format: &mut Format) -> Result<StatementBatch, SqlError> {
        render(&self.0, format)
    }
}

impl WhereStage {
    pub fn group_by(self, first: impl IntoExprArg, rest: Vec<Box<dyn Expr>>) -> GroupByStage {
        let mut fields = vec![first.into_expr_arg()];
        fields.extend(rest);
        GroupByStage(SelectPart::GroupBy { parent: Box::new(self.0), fields })
    }

    pub fn order_by(self, first: impl IntoExprArg, rest: Vec<Box<dyn Expr>>) -> OrderByStage {
        let mut fields = vec![first.into_expr_arg()];
        fields.extend(rest);
        OrderByStage(SelectPart::OrderBy { parent: Box::new(self.0), fields })
    }

    pub fn build(&self, format: &mut Format) -> Result<StatementBatch, SqlError> {
        render(&self.0, format)
    }
}

impl GroupByStage {
    pub fn order_by(self, first: impl IntoExprArg, rest: Vec<Box<dyn Expr>>) -> OrderByStage {
        let mut fields = vec![first.into_expr_arg()];
        fields.extend(rest);
        OrderByStage(SelectPart::OrderBy { parent: Box::new(self.0), fields })
    }

    pub fn build(&self, format: &mut Format) -> Result<StatementBatch, SqlError> {
        render(&self.0, format)
    }
}

impl OrderByStage {
    pub fn build(&self, format: &mut Format) -> Result<StatementBatch, SqlError> {
        render(&self.0, format)
    }
}

/// Number of columns this SELECT projects: the explicit projection list's
/// length, or (for a bare `select *`) the total column count across every
/// visible data source. Used by `insert ... from` to validate against the
/// destination field count (`part::SqlReady::column_count`).
fn select_column_count(leaf: &SelectPart) -> usize {
    let mut sources = Vec::new();
    let mut explicit = None;
    walk(leaf, true, &mut |_direct, part| match part {
        SelectPart::Select { exprs } => {
            if !exprs.is_empty() {
                explicit = Some(exprs.len());
            }
        }
        SelectPart::FromOrJoin { source, .. } => sources.push(source.clone()),
        _ => {}
    });
    explicit.unwrap_or_else(|| sources.iter().map(|s| s.column_count()).sum())
}

impl crate::part::SqlReady for FromStage {
    fn get_sql(&self, format: &mut Format) -> Result<StatementBatch, SqlError> {
        self.build(format)
    }
    fn column_count(&self) -> Option<usize> {
        Some(select_column_count(&self.0))
    }
}

impl crate::part::SqlReady for WhereStage {
    fn get_sql(&self, format: &mut Format) -> Result<StatementBatch, SqlError> {
        self.build(format)
    }
    fn column_count(&self) -> Option<usize> {
        Some(select_column_count(&self.0))
    }
}

impl crate::part::SqlReady for GroupByStage {
    fn get_sql(&self, format: &mut Format) -> Result<StatementBatch, SqlError> {
        self.build(format)
    }
    fn column_count(&self) -> Option<usize> {
        Some(select_column_count(&self.0))
    }
}

impl crate::part::SqlReady for OrderByStage {
    fn get_sql(&self, format: &mut Format) -> Result<StatementBatch, SqlError> {
        self.build(format)
    }
    fn column_count(&self) -> Option<usize> {
        Some(select_column_count(&self.0))
    }
}

/// Per-render working state: the visible-source list (pushed during the
/// direct/collect pass, leaf-most first — see module doc on ordering) and
/// the scope-visibility window used while emitting FROM/JOIN.
struct Maker {
    data_sources: Vec<DataSource>,
    vis_index: usize,
}

impl Maker {
    fn new() -> Self {
        Maker { data_sources: Vec::new(), vis_index: 0 }
    }

    fn reset_scope_vis_index(&mut self) {
        self.vis_index = self.data_sources.len().saturating_sub(1);
    }

    fn inc_scope_vis_index(&mut self) {
        self.vis_index = self.vis_index.saturating_sub(1);
    }

    fn entries(&self) -> QueryEntries {
        QueryEntries { sources: self.data_sources[self.vis_index.min(self.data_sources.len())..].to_vec() }
    }

    fn add_data_source(&mut self, source: DataSource) -> Result<(), SqlError> {
        if let Some(alias) = source.alias() {
            if self.data_sources.iter().any(|s| s.alias() == Some(alias)) {
                return Err(SqlError::Schema(format!(
                    "can't add {} with alias \"{alias}\", because other object was added with this alias",
                    source.pretty()
                )));
            }
        }
        self.data_sources.push(source);
        Ok(())
    }
}

fn render(leaf: &SelectPart, format: &mut Format) -> Result<StatementBatch, SqlError> {
    let mut maker = Maker::new();
    let mut batch = StatementBatch::new();
    batch.add(Statement::new(StatementType::Query));
    let mut error: Option<SqlError> = None;

    walk(leaf, false, &mut |direct, part| {
        if error.is_some() {
            return;
        }
        let result = if direct {
            run_direct(part, &mut maker)
        } else {
            run_reverse(part, &mut maker, format, batch.last_mut().unwrap())
        };
        if let Err(e) = result {
            error = Some(e);
        }
    });

    if let Some(e) = error {
        return Err(e);
    }
    Ok(batch)
}

fn run_direct(part: &SelectPart, maker: &mut Maker) -> Result<(), SqlError> {
    if let SelectPart::FromOrJoin { source, .. } = part {
        maker.add_data_source(source.clone())?;
    }
    Ok(())
}

fn run_reverse(part: &SelectPart, maker: &mut Maker, format: &mut Format, stat: &mut Statement) -> Result<(), SqlError> {
    match part {
        SelectPart::Select { exprs } => build_select_section(exprs, maker, format, stat),
        SelectPart::FromOrJoin { source, join, .. } => build_from_section(source, join.as_ref(), maker, format, stat),
        SelectPart::Where { cond, .. } => build_where_section(cond.as_ref(), maker, format, stat),
        SelectPart::GroupBy { fields, .. } => build_group_by_section(fields, maker, format, stat),
        SelectPart::OrderBy { fields, .. } => build_order_by_section(fields, maker, format, stat),
    }
}

fn build_select_section(exprs: &[Box<dyn Expr>], maker: &Maker, format: &mut Format, stat: &mut Statement) -> Result<(), SqlError> {
    stat.write_str(&format.get_leading_space());
    stat.write_str("select ");
    if exprs.is_empty() {
        for (i, source) in maker.data_sources.iter().enumerate().rev() {
            let prefix = match source.alias() {
                Some(alias) => alias.to_string(),
                None => match source.is_table_based() {
                    Some(table) => format.format_table_name(&table.name),
                    None => {
                        return Err(SqlError::Schema(
                            "can't point to the object, since no name, neither alias specified".to_string(),
                        ));
                    }
                },
            };
            stat.write_str(&format!("{prefix}.*"));
            if i > 0 {
                stat.write_str(", ");
            }
        }
    } else {
        let entries = maker.entries();
        let mut ctx = ExprBuildContext::new(SqlPartKind::Select, format, &entries).with_sub_part(SqlSubPartKind::Expr1);
        for (i, expr) in exprs.iter().enumerate() {
            let sub = expr.build_sql(&mut ctx)?;
            stat.append_stat_part(&sub);
            if i < exprs.len() - 1 {
                stat.write_str(", ");
            }
        }
    }
    Ok(())
}

fn build_from_section(
    source: &DataSource,
    join: Option<&(JoinKind, Box<dyn Expr>)>,
    maker: &mut Maker,
    format: &mut Format,
    stat: &mut Statement,
) -> Result<(), SqlError> {
    match join {
        None => {
            let (source_sql, source_args) = source.format_ref(format);
            stat.write_str(format.section_divider);
            stat.write_str(&format.get_leading_space());
            stat.write_str(&format!("from {source_sql}"));
            stat.append_args(source_args);
            maker.reset_scope_vis_index();
        }
        Some((kind, cond)) => {
            maker.inc_scope_vis_index();
            let entries = maker.entries();
            let (source_sql, source_args) = source.format_ref(format);
            stat.write_str(format.section_divider);
            stat.write_str(&format.get_leading_space());
            stat.write_str(&format!("{} ", kind.keyword()));
            stat.write_str(&format!("{source_sql} on "));
            stat.append_args(source_args);
            let mut ctx =
                ExprBuildContext::new(SqlPartKind::SelectFromOrJoin, format, &entries).with_sub_part(SqlSubPartKind::Expr1);
            let cond_sql = cond.build_sql(&mut ctx)?;
            stat.append_stat_part(&cond_sql);
        }
    }
    Ok(())
}

fn build_where_section(cond: &dyn Expr, maker: &Maker, format: &mut Format, stat: &mut Statement) -> Result<(), SqlError> {
    stat.write_str(format.section_divider);
    stat.write_str(&format.get_leading_space());
    stat.write_str("where ");
    let entries = maker.entries();
    let mut ctx = ExprBuildContext::new(SqlPartKind::SelectWhere, format, &entries).with_sub_part(SqlSubPartKind::Expr1);
    let sub = cond.build_sql(&mut ctx)?;
    stat.append_stat_part(&sub);
    Ok(())
}

fn build_group_by_section(fields: &[Box<dyn Expr>], maker: &Maker, format: &mut Format, stat: &mut Statement) -> Result<(), SqlError> {
    stat.write_str(format.section_divider);
    stat.write_str(&format.get_leading_space());
    stat.write_str("group by ");
    let entries = maker.entries();
    let mut ctx = ExprBuildContext::new(SqlPartKind::SelectGroupBy, format, &entries).with_sub_part(SqlSubPartKind::Expr1);
    for (i, expr) in fields.iter().enumerate() {
        let sub = expr.build_sql(&mut ctx)?;
        stat.append_stat_part(&sub);
        if i < fields.len() - 1 {
            stat.write_str(", ");
        }
    }
    Ok(())
}

fn build_order_by_section(fields: &[Box<dyn Expr>], maker: &Maker, format: &mut Format, stat: &mut Statement) -> Result<(), SqlError> {
    stat.write_str(format.section_divider);
    stat.write_str(&format.get_leading_space());
    stat.write_str("order by ");
    let entries = maker.entries();
    let mut ctx = ExprBuildContext::new(SqlPartKind::SelectOrderBy, format, &entries).with_sub_part(SqlSubPartKind::Expr1);
    for (i, expr) in fields.iter().enumerate() {
        let sub = expr.build_sql(&mut ctx)?;
        stat.append_stat_part(&sub);
        if i < fields.len() - 1 {
            stat.write_str(", ");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::expr::{equal, field};
    use crate::schema::{TableDef, Value};
    use std::rc::Rc;

    fn customers() -> Rc<TableDef> {
        let mut t = TableDef::new("Customers");
        t.fields.add_int("Id");
        t.fields.add_unicode_variable("Name", 50);
        Rc::new(t)
    }

    #[test]
    fn wildcard_projection_postgres_select_where_with_alias() {
        let table = customers();
        let source = DataSource::table(table).aliased("c");
        let tree = select(vec![]).from(source.clone()).where_(equal(field(source, "Id"), 5i32));
        let mut format = Format::new(Dialect::PGSQL);
        let batch = tree.build(&mut format).unwrap();
        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.items[0].sql(), "select c.*\nfrom \"Customers\" as c\nwhere c.\"Id\" = $1");
        assert_eq!(batch.items[0].args, vec![Value::Int32(5)]);
    }

    #[test]
    fn wildcard_projection_mstsql_select_where_with_alias() {
        let table = customers();
        let source = DataSource::table(table).aliased("c");
        let tree = select(vec![]).from(source.clone()).where_(equal(field(source, "Id"), 5i32));
        let mut format = Format::new(Dialect::MSTSQL);
        let batch = tree.build(&mut format).unwrap();
        assert_eq!(batch.items[0].sql(), "select c.*\nfrom [Customers] as c\nwhere c.[Id] = ?");
    }

    /// `Customers(Id INT, Name VARCHAR(50))` aliased `c`, explicit
    /// projection of both columns, `where c.Id = 5`, PostgreSQL.
    #[test]
    fn s1_postgres_select_explicit_columns_where_with_alias() {
        let table = customers();
        let source = DataSource::table(table).aliased("c");
        let tree = select(vec![Box::new(field(source.clone(), "Id")), Box::new(field(source.clone(), "Name"))])
            .from(source.clone())
            .where_(equal(field(source, "Id"), 5i32));
        let mut format = Format::new(Dialect::PGSQL);
        let batch = tree.build(&mut format).unwrap();
        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.items[0].sql(), "select c.\"Id\", c.\"Name\"\nfrom \"Customers\" as c\nwhere c.\"Id\" = $1");
        assert_eq!(batch.items[0].args, vec![Value::Int32(5)]);
    }

    /// Same tree as `s1_postgres_select_explicit_columns_where_with_alias`,
    /// T-SQL dialect.
    #[test]
    fn s2_mstsql_select_explicit_columns_where_with_alias() {
        let table = customers();
        let source = DataSource::table(table).aliased("c");
        let tree = select(vec![Box::new(field(source.clone(), "Id")), Box::new(field(source.clone(), "Name"))])
            .from(source.clone())
            .where_(equal(field(source, "Id"), 5i32));
        let mut format = Format::new(Dialect::MSTSQL);
        let batch = tree.build(&mut format).unwrap();
        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.items[0].sql(), "select c.[Id], c.[Name]\nfrom [Customers] as c\nwhere c.[Id] = ?");
        assert_eq!(batch.items[0].args, vec![Value::Int32(5)]);
    }

    #[test]
    fn explicit_projection_lists_selected_columns() {
        let table = customers();
        let source = DataSource::table(table).aliased("c");
        let tree = select(vec![Box::new(field(source.clone(), "Id")), Box::new(field(source.clone(), "Name"))])
            .from(source);
        let mut format = Format::new(Dialect::PGSQL);
        let batch = tree.build(&mut format).unwrap();
        assert_eq!(batch.items[0].sql(), "select c.\"Id\", c.\"Name\"\nfrom \"Customers\" as c");
    }

    #[test]
    fn join_cannot_see_source_introduced_later() {
        let t1 = customers();
        let mut t2 = TableDef::new("Orders");
        t2.fields.add_int("CustomerId");
        let t2 = Rc::new(t2);
        let s1 = DataSource::table(t1).aliased("c");
        let s2 = DataSource::table(t2).aliased("o");
        // join condition on s1 referencing s2's field before s2 is introduced
        let tree = select(vec![])
            .from(s1.clone())
            .inner_join(s2.clone(), equal(field(s1.clone(), "Id"), field(s2.clone(), "CustomerId")));
        let mut format = Format::new(Dialect::PGSQL);
        // s2 is introduced by this very join, so it IS visible to its own ON
        // clause (scope widens to include the join being emitted).
        assert!(tree.build(&mut format).is_ok());
    }

    #[test]
    fn ambiguous_alias_rejected() {
        let t1 = customers();
        let t2 = customers();
        let s1 = DataSource::table(t1).aliased("c");
        let s2 = DataSource::table(t2).aliased("c");
        let tree = select(vec![]).from(s1).inner_join(s2.clone(), equal(field(s2.clone(), "Id"), 1i32));
        let mut format = Format::new(Dialect::PGSQL);
        assert!(tree.build(&mut format).is_err());
    }

    #[test]
    fn group_by_and_order_by_chain() {
        let table = customers();
        let source = DataSource::table(table);
        let tree = select(vec![Box::new(field(source.clone(), "Name"))])
            .from(source.clone())
            .group_by(field(source.clone(), "Name"), vec![])
            .order_by(field(source, "Name"), vec![]);
        let mut format = Format::new(Dialect::PGSQL);
        let batch = tree.build(&mut format).unwrap();
        let sql = batch.items[0].sql();
        assert!(sql.contains("group by"));
        assert!(sql.contains("order by"));
    }
}
