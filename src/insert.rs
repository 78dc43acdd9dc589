//! INSERT statement maker: `insert into` with an explicit `values (...)`
//! list or a nested `select` source, plus dialect-portable RETURNING.
//!
//! Grounded on `original_source/sqlinsert/{insert,values,returning,from,
//! maker}.go`. RETURNING isn't expressible the same way across dialects
//! (§4.4 of SPEC_FULL): PostgreSQL and T-SQL can express it directly in
//! the INSERT text (`returning`/`output`); MySQL and SQLite get a second
//! query statement (`select last_insert_id()` / `last_insert_rowid()`)
//! appended to the batch instead, left unjoined since neither dialect
//! supports submitting several statements in one batch.

use crate::dialect::Dialect;
use crate::error::SqlError;
use crate::expr::{Expr, ExprBuildContext, IntoExprArg};
use crate::format::Format;
use crate::part::{walk, DataSource, PartNode, QueryEntries, SqlPartKind, SqlReady};
use crate::statement::{Statement, StatementBatch, StatementType};

pub enum InsertPart {
    Insert { data_source: DataSource, fields: Vec<String> },
    Values { parent: Box<InsertPart>, exprs: Vec<Box<dyn Expr>> },
    Returning { parent: Box<InsertPart>, exprs: Vec<Box<dyn Expr>> },
    From { parent: Box<InsertPart>, select: Box<dyn SqlReady> },
}

impl PartNode for InsertPart {
    fn part_kind(&self) -> SqlPartKind {
        match self {
            InsertPart::Insert { .. } => SqlPartKind::Insert,
            InsertPart::Values { .. } => SqlPartKind::InsertValues,
            InsertPart::Returning { .. } => SqlPartKind::InsertReturning,
            InsertPart::From { .. } => SqlPartKind::InsertFrom,
        }
    }

    fn parent(&self) -> Option<&Self> {
        match self {
            InsertPart::Insert { .. } => None,
            InsertPart::Values { parent, .. } | InsertPart::Returning { parent, .. } | InsertPart::From { parent, .. } => {
                Some(parent.as_ref())
            }
        }
    }
}

/// The root of an INSERT tree; not itself renderable, as in the Go
/// source's `Insert` interface (no `GetSql` until `Values`/`From` chosen).
pub struct InsertRoot(InsertPart);

pub struct ValuesStage(InsertPart);
pub struct ReturningStage(InsertPart);
pub struct FromStage(InsertPart);

/// `fields` empty means "use every column of `data_source`, in declared
/// order" (mirrors `NewInsert` with no trailing `*TokenField` args).
pub fn insert_into(data_source: DataSource, fields: &[&str]) -> InsertRoot {
    InsertRoot(InsertPart::Insert { data_source, fields: fields.iter().map(|s| s.to_string()).collect() })
}

impl InsertRoot {
    pub fn values(self, first: impl IntoExprArg, rest: Vec<Box<dyn Expr>>) -> ValuesStage {
        let mut exprs = vec![first.into_expr_arg()];
        exprs.extend(rest);
        ValuesStage(InsertPart::Values { parent: Box::new(self.0), exprs })
    }

    pub fn from(self, select: impl SqlReady + 'static) -> FromStage {
        FromStage(InsertPart::From { parent: Box::new(self.0), select: Box::new(select) })
    }
}

impl ValuesStage {
    pub fn returning(self, first: impl IntoExprArg, rest: Vec<Box<dyn Expr>>) -> ReturningStage {
        let mut exprs = vec![first.into_expr_arg()];
        exprs.extend(rest);
        ReturningStage(InsertPart::Returning { parent: Box::new(self.0), exprs })
    }

    pub fn build(&self, format: &mut Format) -> Result<StatementBatch, SqlError> {
        render(&self.0, format)
    }
}

impl ReturningStage {
    pub fn build(&self, format: &mut Format) -> Result<StatementBatch, SqlError> {
        render(&self.0, format)
    }
}

impl FromStage {
    pub fn build(&self, format: &mut Format) -> Result<StatementBatch, SqlError> {
        render(&self.0, format)
    }
}

impl SqlReady for ValuesStage {
    fn get_sql(&self, format: &mut Format) -> Result<StatementBatch, SqlError> {
        self.build(format)
    }
}

impl SqlReady for ReturningStage {
    fn get_sql(&self, format: &mut Format) -> Result<StatementBatch, SqlError> {
        self.build(format)
    }
}

impl SqlReady for FromStage {
    fn get_sql(&self, format: &mut Format) -> Result<StatementBatch, SqlError> {
        self.build(format)
    }
}

/// Walk up from `node` to the root `Insert` variant and return its
/// declared field list.
fn declared_fields(node: &InsertPart) -> &[String] {
    let mut cur = node;
    loop {
        match cur {
            InsertPart::Insert { fields, .. } => return fields,
            _ => cur = cur.parent().expect("insert tree always rooted at Insert"),
        }
    }
}

struct Maker {
    target: Option<DataSource>,
    returning: Option<Vec<Box<dyn Expr>>>,
}

impl Maker {
    fn new() -> Self {
        Maker { target: None, returning: None }
    }

    fn entries(&self) -> QueryEntries {
        match &self.target {
            Some(source) => QueryEntries { sources: vec![source.clone()] },
            None => QueryEntries::default(),
        }
    }
}

fn render(leaf: &InsertPart, format: &mut Format) -> Result<StatementBatch, SqlError> {
    let mut maker = Maker::new();
    let mut batch = StatementBatch::new();
    batch.add(Statement::new(StatementType::Exec));
    let mut error: Option<SqlError> = None;

    walk(leaf, false, &mut |direct, part| {
        if error.is_some() {
            return;
        }
        let result = if direct { run_direct(part, &mut maker, format) } else { run_reverse(part, &mut maker, format, &mut batch) };
        if let Err(e) = result {
            error = Some(e);
        }
    });

    if let Some(e) = error {
        return Err(e);
    }
    batch.join(format.supports_multiple_statements_in_batch(), format.section_divider)?;
    Ok(batch)
}

fn run_direct(part: &InsertPart, maker: &mut Maker, format: &Format) -> Result<(), SqlError> {
    match part {
        InsertPart::Insert { data_source, .. } => {
            maker.target = Some(data_source.clone());
        }
        InsertPart::Values { exprs, .. } => {
            let fields = declared_fields(part);
            if !fields.is_empty() && fields.len() != exprs.len() {
                return Err(SqlError::Shape(format!(
                    "destination field count doesn't match values count in INSERT statement: {} <> {}",
                    fields.len(),
                    exprs.len()
                )));
            }
        }
        InsertPart::Returning { exprs, .. } => {
            maker.returning = Some(exprs.iter().map(|e| e.clone_expr()).collect());
        }
        InsertPart::From { select, .. } => {
            if format.column_name_and_count_validation_is_on() {
                if let Some(source_count) = select.column_count() {
                    let fields = declared_fields(part);
                    let target_count = if fields.is_empty() {
                        maker.target.as_ref().map(|t| t.column_count()).unwrap_or(0)
                    } else {
                        fields.len()
                    };
                    if source_count != target_count {
                        return Err(SqlError::Shape(format!(
                            "destination field count doesn't match select column count in INSERT statement: {target_count} <> {source_count}"
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}

fn run_reverse(part: &InsertPart, maker: &mut Maker, format: &mut Format, batch: &mut StatementBatch) -> Result<(), SqlError> {
    match part {
        InsertPart::Insert { data_source, fields } => {
            build_insert_section_sql(data_source, fields, maker.returning.as_deref(), format, batch.last_mut().unwrap())
        }
        InsertPart::Values { exprs, .. } => build_values_section_sql(exprs, maker, format, batch.last_mut().unwrap()),
        InsertPart::Returning { exprs, .. } => build_returning_tail(exprs, maker, format, batch),
        InsertPart::From { select, .. } => build_from_section_sql(select.as_ref(), format, batch.last_mut().unwrap()),
    }
}

fn build_insert_section_sql(
    data_source: &DataSource,
    fields: &[String],
    returning: Option<&[Box<dyn Expr>]>,
    format: &mut Format,
    stat: &mut Statement,
) -> Result<(), SqlError> {
    if data_source.is_table_based().is_none() {
        return Err(SqlError::Schema(format!("table expected instead of {}", data_source.pretty())));
    }
    let (source_sql, source_args) = data_source.format_ref(format);
    stat.write_str(&format!("insert into {source_sql}"));
    stat.append_args(source_args);
    if !fields.is_empty() {
        stat.write_str(" (");
        for (i, f) in fields.iter().enumerate() {
            stat.write_str(&format.format_object_name(f));
            if i < fields.len() - 1 {
                stat.write_str(", ");
            }
        }
        stat.write_str(")");
    }
    if let Some(exprs) = returning {
        if format.dialect == Dialect::MSTSQL {
            let entries = QueryEntries { sources: vec![data_source.clone()] };
            build_returning_section_sql(exprs, &entries, format, stat)?;
        }
    }
    Ok(())
}

fn build_returning_section_sql(
    exprs: &[Box<dyn Expr>],
    entries: &QueryEntries,
    format: &mut Format,
    stat: &mut Statement,
) -> Result<(), SqlError> {
    stat.write_str(format.section_divider);
    stat.write_str(&format.get_leading_space());
    match format.dialect {
        Dialect::PGSQL => stat.write_str("returning "),
        Dialect::MSTSQL => stat.write_str("output "),
        _ => return Ok(()),
    }
    let mut ctx = ExprBuildContext::new(SqlPartKind::InsertReturning, format, entries);
    for (i, expr) in exprs.iter().enumerate() {
        let sub = expr.build_sql(&mut ctx)?;
        stat.append_stat_part(&sub);
        if i < exprs.len() - 1 {
            stat.write_str(", ");
        }
    }
    Ok(())
}

fn build_values_section_sql(exprs: &[Box<dyn Expr>], maker: &Maker, format: &mut Format, stat: &mut Statement) -> Result<(), SqlError> {
    stat.write_str(format.section_divider);
    stat.write_str("values (");
    let entries = maker.entries();
    let mut ctx = ExprBuildContext::new(SqlPartKind::InsertValues, format, &entries);
    for (i, expr) in exprs.iter().enumerate() {
        let sub = expr.build_sql(&mut ctx)?;
        stat.append_stat_part(&sub);
        if i < exprs.len() - 1 {
            stat.write_str(", ");
        }
    }
    stat.write_str(")");
    Ok(())
}

fn build_from_section_sql(select: &dyn SqlReady, format: &mut Format, stat: &mut Statement) -> Result<(), SqlError> {
    stat.write_str(format.section_divider);
    let inner = select.get_sql(format)?;
    if inner.items.len() > 1 {
        return Err(SqlError::Shape("can't process multiple statements for \"from\" section".to_string()));
    }
    stat.append_stat_part(&inner.items[0]);
    Ok(())
}

/// Handles the part of the RETURNING behavior that depends on the whole
/// batch rather than just the current statement: MySQL/SQLite get a
/// synthetic second query statement instead of inline syntax, and every
/// dialect except MySQL/SQLite flips the current statement's type to
/// `Query` once it actually returns rows.
fn build_returning_tail(exprs: &[Box<dyn Expr>], maker: &Maker, format: &mut Format, batch: &mut StatementBatch) -> Result<(), SqlError> {
    match format.dialect {
        Dialect::PGSQL => {
            let entries = maker.entries();
            let stat = batch.last_mut().unwrap();
            build_returning_section_sql(exprs, &entries, format, stat)?;
            stat.ty = StatementType::Query;
        }
        Dialect::MSTSQL => {
            batch.last_mut().unwrap().ty = StatementType::Query;
        }
        Dialect::MYSQL | Dialect::SQLITE => {
            let func_name = match format.dialect {
                Dialect::MYSQL => "last_insert_id()",
                _ => "last_insert_rowid()",
            };
            let mut stat = Statement::new(StatementType::Query);
            stat.write_str(&format!("select {func_name}"));
            batch.add(stat);
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::expr::{field, value};
    use crate::schema::{TableDef, Value};
    use crate::select::select;
    use std::rc::Rc;

    fn users() -> Rc<TableDef> {
        let mut t = TableDef::new("Users");
        t.fields.add_autoinc("Id");
        t.fields.add_unicode_variable("Name", 50);
        Rc::new(t)
    }

    #[test]
    fn postgres_values_with_returning() {
        let source = DataSource::table(users());
        let tree = insert_into(source.clone(), &["Name"])
            .values(value("Ann"), vec![])
            .returning(field(source, "Id"), vec![]);
        let mut format = Format::new(Dialect::PGSQL);
        let batch = tree.build(&mut format).unwrap();
        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.items[0].ty, StatementType::Query);
        assert_eq!(
            batch.items[0].sql(),
            "insert into \"Users\" (\"Name\")\nvalues ($1)\nreturning \"Id\""
        );
        assert_eq!(batch.items[0].args, vec![Value::String("Ann".to_string())]);
    }

    #[test]
    fn mstsql_output_clause_embedded_before_values() {
        let source = DataSource::table(users());
        let tree = insert_into(source.clone(), &["Name"])
            .values(value("Ann"), vec![])
            .returning(field(source, "Id"), vec![]);
        let mut format = Format::new(Dialect::MSTSQL);
        let batch = tree.build(&mut format).unwrap();
        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.items[0].ty, StatementType::Query);
        let sql = batch.items[0].sql();
        assert!(sql.contains("output inserted.[Id]"));
        assert!(sql.find("output").unwrap() < sql.find("values").unwrap());
    }

    #[test]
    fn mysql_returning_emulated_with_second_statement() {
        let source = DataSource::table(users());
        let tree = insert_into(source.clone(), &["Name"])
            .values(value("Ann"), vec![])
            .returning(field(source, "Id"), vec![]);
        let mut format = Format::new(Dialect::MYSQL);
        let batch = tree.build(&mut format).unwrap();
        assert_eq!(batch.items.len(), 2);
        assert_eq!(batch.items[0].ty, StatementType::Exec);
        assert_eq!(batch.items[1].sql(), "select last_insert_id()");
        assert_eq!(batch.items[1].ty, StatementType::Query);
    }

    #[test]
    fn field_count_mismatch_rejected() {
        let source = DataSource::table(users());
        let tree = insert_into(source, &["Name", "Id"]).values(value("Ann"), vec![]);
        let mut format = Format::new(Dialect::PGSQL);
        assert!(tree.build(&mut format).is_err());
    }

    #[test]
    fn insert_from_select_appends_inline() {
        let source = DataSource::table(users());
        let other = DataSource::table(users()).aliased("u");
        let inner = select(vec![Box::new(field(other.clone(), "Name"))]).from(other);
        let tree = insert_into(source, &["Name"]).from(inner);
        let mut format = Format::new(Dialect::PGSQL);
        let batch = tree.build(&mut format).unwrap();
        assert_eq!(batch.items.len(), 1);
        assert!(batch.items[0].sql().contains("select"));
    }

    #[test]
    fn insert_from_select_rejects_column_count_mismatch() {
        let source = DataSource::table(users());
        let other = DataSource::table(users()).aliased("u");
        let inner = select(vec![Box::new(field(other.clone(), "Name"))]).from(other);
        let tree = insert_into(source, &["Name", "Id"]).from(inner);
        let mut format = Format::new(Dialect::PGSQL);
        assert!(tree.build(&mut format).is_err());
    }
}
