//! DROP DATABASE / DROP TABLE makers.
//!
//! Grounded on `original_source/sqldrop/drop.go`. Mirrors `create`'s shape
//! (single-node trees, the same T-SQL exists-guard wrapper) with `is not
//! null` in place of `is null` — the object must already exist before it
//! can be dropped, the reverse of CREATE's "must not exist yet".

use std::rc::Rc;

use crate::dialect::Dialect;
use crate::error::SqlError;
use crate::format::Format;
use crate::part::{exists_guard_condition, tsql_exists_wrapper, ExistsGuardTarget, SqlPartKind, SqlReady};
use crate::schema::TableDef;
use crate::statement::{Statement, StatementBatch, StatementType};

pub struct DropDatabase {
    database_name: String,
}

pub fn drop_database(database_name: impl Into<String>) -> DropDatabase {
    DropDatabase { database_name: database_name.into() }
}

impl DropDatabase {
    pub fn build(&self, format: &mut Format) -> Result<StatementBatch, SqlError> {
        render_drop_database(&self.database_name, format)
    }
}

impl SqlReady for DropDatabase {
    fn get_sql(&self, format: &mut Format) -> Result<StatementBatch, SqlError> {
        self.build(format)
    }
}

fn render_drop_database(name: &str, format: &mut Format) -> Result<StatementBatch, SqlError> {
    let wrap_mstsql = format.do_if_object_exists_not_exists() && format.dialect == Dialect::MSTSQL;
    if wrap_mstsql {
        format.inc_indent_level();
    }
    let mut stat = Statement::new(StatementType::Exec);
    stat.write_str("drop database ");
    if format.do_if_object_exists_not_exists() && format.dialect.in_set(Dialect::PGSQL | Dialect::MYSQL) {
        stat.write_str("if exists ");
    }
    stat.write_str(&format.format_object_name(name));
    if wrap_mstsql {
        format.dec_indent_level();
    }

    if wrap_mstsql {
        let cond = exists_guard_condition(ExistsGuardTarget::Database { name: name.to_string() }, true);
        stat = tsql_exists_wrapper(cond.as_ref(), SqlPartKind::DropDatabase, stat, format)?;
    }

    let mut batch = StatementBatch::new();
    batch.add(stat);
    Ok(batch)
}

pub struct DropTable {
    table: Rc<TableDef>,
}

pub fn drop_table(table: Rc<TableDef>) -> DropTable {
    DropTable { table }
}

impl DropTable {
    pub fn build(&self, format: &mut Format) -> Result<StatementBatch, SqlError> {
        render_drop_table(&self.table, format)
    }
}

impl SqlReady for DropTable {
    fn get_sql(&self, format: &mut Format) -> Result<StatementBatch, SqlError> {
        self.build(format)
    }
}

fn render_drop_table(table: &TableDef, format: &mut Format) -> Result<StatementBatch, SqlError> {
    let wrap_mstsql = format.do_if_object_exists_not_exists() && format.dialect == Dialect::MSTSQL;
    if wrap_mstsql {
        format.inc_indent_level();
    }
    let mut stat = Statement::new(StatementType::Exec);
    stat.write_str(&format.get_leading_space());
    stat.write_str("drop table ");
    if format.do_if_object_exists_not_exists() && format.dialect.in_set(Dialect::PGSQL | Dialect::MYSQL | Dialect::SQLITE) {
        stat.write_str("if exists ");
    }
    let qualified_name = format.format_table_name(&table.name);
    stat.write_str(&qualified_name);
    if wrap_mstsql {
        format.dec_indent_level();
    }

    if wrap_mstsql {
        let cond = exists_guard_condition(ExistsGuardTarget::Table { qualified_name }, true);
        stat = tsql_exists_wrapper(cond.as_ref(), SqlPartKind::DropTable, stat, format)?;
    }

    let mut batch = StatementBatch::new();
    batch.add(stat);
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> Rc<TableDef> {
        let mut t = TableDef::new("T");
        t.fields.add_autoinc("Id");
        Rc::new(t)
    }

    #[test]
    fn pgsql_drop_table_native_if_exists() {
        let mut format = Format::new(Dialect::PGSQL).exists_guard();
        let batch = drop_table(sample_table()).build(&mut format).unwrap();
        assert_eq!(batch.items[0].sql(), "drop table if exists \"T\"");
    }

    #[test]
    fn mstsql_drop_table_wrapped_with_is_not_null() {
        let mut format = Format::new(Dialect::MSTSQL).exists_guard();
        let batch = drop_table(sample_table()).build(&mut format).unwrap();
        let sql = batch.items[0].sql();
        assert!(sql.starts_with("if object_id("));
        assert!(sql.contains("is not null begin"));
        assert!(sql.contains("drop table [T]"));
        assert!(sql.ends_with("end"));
    }

    #[test]
    fn sqlite_drop_table_if_exists_no_wrap() {
        let mut format = Format::new(Dialect::SQLITE).exists_guard();
        let batch = drop_table(sample_table()).build(&mut format).unwrap();
        assert_eq!(batch.items[0].sql(), "drop table if exists T");
    }

    #[test]
    fn drop_database_mysql_if_exists() {
        let mut format = Format::new(Dialect::MYSQL).exists_guard();
        let batch = drop_database("shop").build(&mut format).unwrap();
        assert_eq!(batch.items[0].sql(), "drop database if exists `shop`");
    }

    #[test]
    fn drop_database_mstsql_wrapped() {
        let mut format = Format::new(Dialect::MSTSQL).exists_guard();
        let batch = drop_database("Shop").build(&mut format).unwrap();
        let sql = batch.items[0].sql();
        assert!(sql.contains("is not null begin"));
        assert!(sql.contains("drop database [Shop]"));
    }

    #[test]
    fn drop_table_without_guard_is_plain() {
        let mut format = Format::new(Dialect::PGSQL);
        let batch = drop_table(sample_table()).build(&mut format).unwrap();
        assert_eq!(batch.items[0].sql(), "drop table \"T\"");
    }
}
