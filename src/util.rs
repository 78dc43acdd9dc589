//! Pre-packaged existence-check queries (§4.6): "does this database/table
//! exist?" against each dialect's own catalog.
//!
//! Grounded on `original_source/utils.go`. Every query here builds its own
//! throwaway `Format` with validation turned off — these queries reference
//! system tables that carry no `TableDef`, so the ordinary column-existence
//! check has nothing to validate against.

use std::rc::Rc;

use crate::dialect::Dialect;
use crate::error::SqlError;
use crate::expr::{and, case_then_else, count, equal, field, func, func_def, func_dialect_def, is_null, table_alias, IntoExprArg};
use crate::format::Format;
use crate::part::{DataSource, QueryEntries, SqlPartKind, SqlSubPartKind};
use crate::schema::TableDef;
use crate::statement::{Statement, StatementBatch, StatementType};

/// A bare identity for a system catalog table: a name to reference through
/// `DataSource::table`, nothing else. These never go through column
/// validation (every `Format` built here calls `skip_validation`).
fn system_table(name: &str) -> Rc<TableDef> {
    Rc::new(TableDef::new(name))
}

/// `select case when db_id(<name>) is null then 0 else 1 end`, built by
/// hand since T-SQL's form has no FROM clause to hang a `select` builder
/// chain off of.
fn mstsql_case_when_null(dialect: Dialect, part_kind: SqlPartKind, template: &'static str, name: &str) -> Result<StatementBatch, SqlError> {
    let mut format = Format::new(dialect).skip_validation();
    let def = func_def(vec![func_dialect_def(dialect, template, 1, Some(1))]);
    let cond = is_null(func(def, vec![name.to_string().into_expr_arg()]));
    let expr = case_then_else(cond, 0i32, 1i32);

    let entries = QueryEntries::default();
    let mut stat = Statement::new(StatementType::Query);
    stat.write_str("select ");
    let mut ctx = crate::expr::ExprBuildContext::new(part_kind, &mut format, &entries).with_sub_part(SqlSubPartKind::Expr1);
    let sub = expr.build_sql(&mut ctx)?;
    stat.append_stat_part(&sub);

    let mut batch = StatementBatch::new();
    batch.add(stat);
    Ok(batch)
}

/// Build the statement batch that checks whether database `db_name` exists,
/// for dialects that support the notion of multiple databases.
pub fn check_stat_if_database_exists(dialect: Dialect, db_name: &str) -> Result<StatementBatch, SqlError> {
    match dialect {
        Dialect::MSTSQL => mstsql_case_when_null(dialect, SqlPartKind::Select, "db_id({})", db_name),
        Dialect::PGSQL => {
            let format = Format::new(dialect).skip_validation().with_schema("pg_catalog");
            let tbl = system_table("pg_database");
            let source = DataSource::table(tbl.clone());
            let aliased = table_alias(source, "a");
            let tree = crate::select::select(vec![Box::new(count(field(aliased.clone(), "datname")))])
                .from(aliased.clone())
                .where_(equal(field(aliased, "datname"), db_name.to_string()));
            let mut format = format;
            tree.build(&mut format)
        }
        Dialect::MYSQL => {
            let format = Format::new(dialect).skip_validation().with_schema("information_schema");
            let tbl = system_table("schemata");
            let source = DataSource::table(tbl.clone());
            let aliased = table_alias(source, "a");
            let tree = crate::select::select(vec![Box::new(count(field(aliased.clone(), "schema_name")))])
                .from(aliased.clone())
                .where_(equal(field(aliased, "schema_name"), db_name.to_string()));
            let mut format = format;
            tree.build(&mut format)
        }
        _ => Err(SqlError::Dialect(format!("can't create statement to find database for dialect \"{}\"", dialect.name()))),
    }
}

/// Build the statement batch that checks whether table `table_name` exists.
pub fn check_stat_if_table_exists(dialect: Dialect, table_name: &str) -> Result<StatementBatch, SqlError> {
    match dialect {
        Dialect::MSTSQL => mstsql_case_when_null(dialect, SqlPartKind::Select, "object_id({})", table_name),
        Dialect::PGSQL => {
            let format = Format::new(dialect).skip_validation().with_schema("pg_catalog");
            let tbl1 = system_table("pg_class");
            let tbl2 = system_table("pg_namespace");
            let a = table_alias(DataSource::table(tbl1.clone()), "a");
            let mut format = format;
            let batch = match dialect.default_schema() {
                None => {
                    let tree = crate::select::select(vec![Box::new(count(field(a.clone(), "relname")))])
                        .from(a.clone())
                        .where_(equal(field(a, "relname"), table_name.to_string()));
                    tree.build(&mut format)?
                }
                Some(schema_name) => {
                    let b = table_alias(DataSource::table(tbl2.clone()), "b");
                    let tree = crate::select::select(vec![Box::new(count(field(a.clone(), "relname")))])
                        .from(a.clone())
                        .inner_join(b.clone(), equal(field(a.clone(), "relnamespace"), field(b.clone(), "oid")))
                        .where_(and(
                            equal(field(b, "nspname"), schema_name.to_string()),
                            equal(field(a, "relname"), table_name.to_string()),
                        ));
                    tree.build(&mut format)?
                }
            };
            Ok(batch)
        }
        Dialect::MYSQL => {
            let format = Format::new(dialect).skip_validation().with_schema("information_schema");
            let tbl = system_table("tables");
            let a = table_alias(DataSource::table(tbl.clone()), "a");
            let def = func_def(vec![func_dialect_def(Dialect::MYSQL, "database()", 0, Some(0))]);
            let mut format = format;
            let tree = crate::select::select(vec![Box::new(count(field(a.clone(), "table_name")))]).from(a.clone()).where_(and(
                equal(field(a.clone(), "table_schema"), func(def, vec![])),
                equal(field(a, "table_name"), table_name.to_string()),
            ));
            tree.build(&mut format)
        }
        Dialect::SQLITE => {
            let format = Format::new(dialect).skip_validation();
            let tbl = system_table("sqlite_master");
            let a = table_alias(DataSource::table(tbl.clone()), "a");
            let mut format = format;
            let tree = crate::select::select(vec![Box::new(count(field(a.clone(), "name")))]).from(a.clone()).where_(and(
                equal(field(a.clone(), "name"), table_name.to_string()),
                equal(field(a, "type"), "table".to_string()),
            ));
            tree.build(&mut format)
        }
        _ => Err(SqlError::Dialect(format!("can't create statement to find table for dialect \"{}\"", dialect.name()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mstsql_database_exists_case_when() {
        let batch = check_stat_if_database_exists(Dialect::MSTSQL, "Shop").unwrap();
        let sql = batch.items[0].sql();
        assert!(sql.starts_with("select case when db_id("));
        assert!(sql.contains("is null then"));
        assert!(sql.ends_with("end"));
        assert_eq!(batch.items[0].args.len(), 3);
    }

    #[test]
    fn pgsql_database_exists_counts_pg_database() {
        let batch = check_stat_if_database_exists(Dialect::PGSQL, "shop").unwrap();
        let sql = batch.items[0].sql();
        assert_eq!(sql, "select count(a.\"datname\")\nfrom pg_catalog.\"pg_database\" as a\nwhere a.\"datname\" = $1");
    }

    #[test]
    fn mysql_database_exists_counts_schemata() {
        let batch = check_stat_if_database_exists(Dialect::MYSQL, "shop").unwrap();
        let sql = batch.items[0].sql();
        assert_eq!(sql, "select count(a.`schema_name`)\nfrom information_schema.`schemata` as a\nwhere a.`schema_name` = ?");
    }

    #[test]
    fn sqlite_has_no_database_exists_query() {
        assert!(check_stat_if_database_exists(Dialect::SQLITE, "shop").is_err());
    }

    #[test]
    fn mstsql_table_exists_case_when() {
        let batch = check_stat_if_table_exists(Dialect::MSTSQL, "Customers").unwrap();
        let sql = batch.items[0].sql();
        assert!(sql.starts_with("select case when object_id("));
    }

    #[test]
    fn pgsql_table_exists_joins_namespace() {
        let batch = check_stat_if_table_exists(Dialect::PGSQL, "Customers").unwrap();
        let sql = batch.items[0].sql();
        assert!(sql.contains("inner join pg_catalog.\"pg_namespace\" as b"));
        assert!(sql.contains("a.\"relnamespace\" = b.\"oid\""));
        assert!(sql.contains("b.\"nspname\" = $1"));
    }

    #[test]
    fn mysql_table_exists_checks_database() {
        let batch = check_stat_if_table_exists(Dialect::MYSQL, "Customers").unwrap();
        let sql = batch.items[0].sql();
        assert!(sql.contains("a.`table_schema` = database()"));
    }

    #[test]
    fn sqlite_table_exists_checks_sqlite_master() {
        let batch = check_stat_if_table_exists(Dialect::SQLITE, "Customers").unwrap();
        let sql = batch.items[0].sql();
        assert_eq!(sql, "select count(a.name)\nfrom sqlite_master as a\nwhere a.name = ? and a.type = ?");
    }
}
