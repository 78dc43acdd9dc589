//! DELETE statement maker: target table plus a mandatory WHERE clause.
//!
//! Grounded on `original_source/sqldelete/{delete,where}.go`. As with
//! `update`, only the `where` stage is renderable — there is no way to build
//! a DELETE without a WHERE clause.

use crate::error::SqlError;
use crate::expr::{Expr, ExprBuildContext, IntoExprArg};
use crate::format::Format;
use crate::part::{walk, DataSource, PartNode, QueryEntries, SqlPartKind, SqlSubPartKind};
use crate::statement::{Statement, StatementBatch, StatementType};

pub enum DeletePart {
    Delete { target: DataSource },
    Where { parent: Box<DeletePart>, cond: Box<dyn Expr> },
}

impl PartNode for DeletePart {
    fn part_kind(&self) -> SqlPartKind {
        match self {
            DeletePart::Delete { .. } => SqlPartKind::Delete,
            DeletePart::Where { .. } => SqlPartKind::DeleteWhere,
        }
    }

    fn parent(&self) -> Option<&Self> {
        match self {
            DeletePart::Delete { .. } => None,
            DeletePart::Where { parent, .. } => Some(parent.as_ref()),
        }
    }
}

/// The root of a DELETE tree; not itself renderable, as in the Go source's
/// `Delete` interface (no `GetSql`).
pub struct DeleteRoot(DeletePart);

/// A `where` section; renderable, terminal.
pub struct WhereStage(DeletePart);

pub fn delete_from(target: DataSource) -> DeleteRoot {
    DeleteRoot(DeletePart::Delete { target })
}

impl DeleteRoot {
    pub fn where_(self, cond: impl IntoExprArg) -> WhereStage {
        WhereStage(DeletePart::Where { parent: Box::new(self.0), cond: cond.into_expr_arg() })
    }
}

impl WhereStage {
    pub fn build(&self, format: &mut Format) -> Result<StatementBatch, SqlError> {
        render(&self.0, format)
    }
}

impl crate::part::SqlReady for WhereStage {
    fn get_sql(&self, format: &mut Format) -> Result<StatementBatch, SqlError> {
        self.build(format)
    }
}

fn render(leaf: &DeletePart, format: &mut Format) -> Result<StatementBatch, SqlError> {
    let mut entries = QueryEntries::default();
    let mut batch = StatementBatch::new();
    batch.add(Statement::new(StatementType::Exec));
    let mut error: Option<SqlError> = None;

    walk(leaf, false, &mut |direct, part| {
        if error.is_some() {
            return;
        }
        let result = if direct {
            run_direct(part, &mut entries)
        } else {
            run_reverse(part, &entries, format, batch.last_mut().unwrap())
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

fn run_direct(part: &DeletePart, entries: &mut QueryEntries) -> Result<(), SqlError> {
    if let DeletePart::Delete { target } = part {
        entries.sources.push(target.clone());
    }
    Ok(())
}

fn run_reverse(part: &DeletePart, entries: &QueryEntries, format: &mut Format, stat: &mut Statement) -> Result<(), SqlError> {
    match part {
        DeletePart::Delete { target } => build_delete_section(target, format, stat),
        DeletePart::Where { cond, .. } => build_where_section(cond.as_ref(), entries, format, stat),
    }
}

fn build_delete_section(target: &DataSource, format: &mut Format, stat: &mut Statement) -> Result<(), SqlError> {
    stat.write_str("delete from ");
    if target.is_table_based().is_none() {
        return Err(SqlError::Shape(format!("table expected instead of {}", target.pretty())));
    }
    let (target_sql, target_args) = target.format_ref(format);
    stat.write_str(&target_sql);
    stat.append_args(target_args);
    Ok(())
}

fn build_where_section(cond: &dyn Expr, entries: &QueryEntries, format: &mut Format, stat: &mut Statement) -> Result<(), SqlError> {
    stat.write_str(format.section_divider);
    stat.write_str("where ");
    let mut ctx = ExprBuildContext::new(SqlPartKind::DeleteWhere, format, entries).with_sub_part(SqlSubPartKind::Expr1);
    let sub = cond.build_sql(&mut ctx)?;
    stat.append_stat_part(&sub);
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
    fn postgres_delete_with_where() {
        let table = customers();
        let source = DataSource::table(table);
        let tree = delete_from(source.clone()).where_(equal(field(source, "Id"), 5i32));
        let mut format = Format::new(Dialect::PGSQL);
        let batch = tree.build(&mut format).unwrap();
        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.items[0].sql(), "delete from \"Customers\"\nwhere \"Customers\".\"Id\" = $1");
        assert_eq!(batch.items[0].args, vec![Value::Int32(5)]);
    }

    #[test]
    fn mstsql_delete_with_aliased_target() {
        let table = customers();
        let source = DataSource::table(table).aliased("c");
        let tree = delete_from(source.clone()).where_(equal(field(source, "Name"), "Ann"));
        let mut format = Format::new(Dialect::MSTSQL);
        let batch = tree.build(&mut format).unwrap();
        assert_eq!(batch.items[0].sql(), "delete from [Customers] as c\nwhere c.[Name] = ?");
    }
}
