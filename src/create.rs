//! CREATE DATABASE / CREATE TABLE makers.
//!
//! Grounded on `original_source/sqlcreate/create.go`. Both statements are
//! single-node trees (`GetParent` returns `nil` in the Go source), so
//! unlike `select`/`insert`/`update` there is no typestate chain here —
//! `CreateDatabase`/`CreateTable` are directly renderable.

use std::rc::Rc;

use crate::dialect::Dialect;
use crate::error::SqlError;
use crate::expr::ExprBuildContext;
use crate::format::{BuildOptions, Format};
use crate::part::{exists_guard_condition, tsql_exists_wrapper, ExistsGuardTarget, QueryEntries, SqlPartKind, SqlReady};
use crate::schema::{FieldDef, TableDef};
use crate::statement::{Statement, StatementBatch, StatementType};

/// `create database <name>`, with dialect-appropriate `if not exists`
/// handling (native on MySQL, warned-and-dropped on PostgreSQL, the
/// `if db_id(...) is null begin ... end` wrapper on T-SQL, a no-op concept
/// on SQLite — see `Dialect::supports_multiple_databases`).
pub struct CreateDatabase {
    database_name: String,
}

pub fn create_database(database_name: impl Into<String>) -> CreateDatabase {
    CreateDatabase { database_name: database_name.into() }
}

impl CreateDatabase {
    pub fn build(&self, format: &mut Format) -> Result<StatementBatch, SqlError> {
        render_create_database(&self.database_name, format)
    }
}

impl SqlReady for CreateDatabase {
    fn get_sql(&self, format: &mut Format) -> Result<StatementBatch, SqlError> {
        self.build(format)
    }
}

fn render_create_database(name: &str, format: &mut Format) -> Result<StatementBatch, SqlError> {
    let wrap_mstsql = format.do_if_object_exists_not_exists() && format.dialect == Dialect::MSTSQL;
    if wrap_mstsql {
        format.inc_indent_level();
    }
    let mut stat = Statement::new(StatementType::Exec);
    stat.write_str("create database ");
    if format.do_if_object_exists_not_exists() {
        match format.dialect {
            Dialect::MYSQL => stat.write_str("if not exists "),
            Dialect::PGSQL => {
                eprintln!(
                    "warning: {} dialect doesn't support \"IF NOT EXISTS\" option for \"create database\" statement",
                    format.dialect
                );
            }
            _ => {}
        }
    }
    stat.write_str(&format.format_object_name(name));
    if wrap_mstsql {
        format.dec_indent_level();
    }

    if wrap_mstsql {
        let cond = exists_guard_condition(ExistsGuardTarget::Database { name: name.to_string() }, false);
        stat = tsql_exists_wrapper(cond.as_ref(), SqlPartKind::CreateDatabase, stat, format)?;
    }

    let mut batch = StatementBatch::new();
    batch.add(stat);
    Ok(batch)
}

/// `create table <name> (...)`, with per-dialect column rendering,
/// autoincrement/primary-key placement, index statements, and the
/// existence guard (native `if not exists` on PostgreSQL/MySQL/SQLite, the
/// T-SQL `object_id(...)` wrapper otherwise). SQLite forces inline-literal
/// mode on a defensively cloned `Format` — SQLite rejects bound parameters
/// inside `create table`.
pub struct CreateTable {
    table: Rc<TableDef>,
}

pub fn create_table(table: Rc<TableDef>) -> CreateTable {
    CreateTable { table }
}

impl CreateTable {
    pub fn build(&self, format: &mut Format) -> Result<StatementBatch, SqlError> {
        render_create_table(&self.table, format)
    }
}

impl SqlReady for CreateTable {
    fn get_sql(&self, format: &mut Format) -> Result<StatementBatch, SqlError> {
        self.build(format)
    }
}

/// One row of the per-dialect "how does a field render" rule table.
/// Ported from `BuildSqlFieldRule`/`BuildSqlFieldVarianceRule`.
struct FieldRule {
    show_nullable: bool,
    custom_attr: &'static str,
    show_primary_key: bool,
}

struct FieldVarianceRule {
    primary_key_inline: bool,
    items: &'static [FieldRuleSpec],
}

struct FieldRuleSpec {
    autoinc_only: bool,
    show_nullable: bool,
    custom_attr: &'static str,
    show_primary_key: bool,
}

/// Open Question (a): T-SQL/PostgreSQL never set a custom autoinc
/// attribute here, relying entirely on the data-type template
/// (`int identity(1,1)`/`serial`) to express it. Documented, not changed —
/// see `DESIGN.md`.
fn variance_rule(dialect: Dialect) -> FieldVarianceRule {
    const ALL_PLAIN: &[FieldRuleSpec] =
        &[FieldRuleSpec { autoinc_only: false, show_nullable: true, custom_attr: "", show_primary_key: false }];
    const MYSQL_RULES: &[FieldRuleSpec] = &[
        FieldRuleSpec { autoinc_only: true, show_nullable: true, custom_attr: "auto_increment", show_primary_key: true },
        FieldRuleSpec { autoinc_only: false, show_nullable: true, custom_attr: "", show_primary_key: true },
    ];
    const SQLITE_RULES: &[FieldRuleSpec] = &[
        FieldRuleSpec {
            autoinc_only: true,
            show_nullable: false,
            custom_attr: "primary key autoincrement",
            show_primary_key: false,
        },
        FieldRuleSpec { autoinc_only: false, show_nullable: true, custom_attr: "", show_primary_key: true },
    ];
    match dialect {
        Dialect::MSTSQL | Dialect::PGSQL => FieldVarianceRule { primary_key_inline: false, items: ALL_PLAIN },
        Dialect::MYSQL => FieldVarianceRule { primary_key_inline: true, items: MYSQL_RULES },
        _ => FieldVarianceRule { primary_key_inline: true, items: SQLITE_RULES },
    }
}

fn is_autoinc(ty: crate::dialect::DataType) -> bool {
    use crate::dialect::DataType;
    ty.in_set(DataType::AUTOINC_INT | DataType::AUTOINC_INT_BIG)
}

fn rule_for(field: &FieldDef, vr: &FieldVarianceRule) -> FieldRule {
    for spec in vr.items {
        if !spec.autoinc_only || is_autoinc(field.data.ty) {
            return FieldRule {
                show_nullable: spec.show_nullable,
                custom_attr: spec.custom_attr,
                show_primary_key: spec.show_primary_key,
            };
        }
    }
    FieldRule { show_nullable: true, custom_attr: "", show_primary_key: false }
}

fn write_field(stat: &mut Statement, format: &mut Format, field: &FieldDef, vr: &FieldVarianceRule) -> Result<(), SqlError> {
    let rule = rule_for(field, vr);
    stat.write_str(&format.format_object_name(&field.name));
    stat.write_str(" ");
    stat.write_str(&field.data.str_template(format.dialect)?);
    if rule.show_nullable {
        stat.write_str(if field.is_nullable { " null" } else { " not null" });
    }
    if let Some(default) = &field.default {
        stat.write_str(" ");
        match &default.value {
            Some(value) => {
                let entries = QueryEntries::default();
                let mut ctx = ExprBuildContext::new(SqlPartKind::CreateTable, format, &entries);
                let sub = value.build_sql(&mut ctx)?;
                stat.append_stat_parts_format("default {}", &[&sub]);
            }
            None => stat.write_str("default null"),
        }
    }
    if !rule.custom_attr.is_empty() {
        stat.write_str(" ");
        stat.write_str(rule.custom_attr);
    }
    if vr.primary_key_inline && rule.show_primary_key && field.is_advised_primary_key() {
        stat.write_str(" primary key");
    }
    Ok(())
}

fn build_create_table_main(stat: &mut Statement, format: &mut Format, table: &TableDef) -> Result<(), SqlError> {
    stat.write_str(&format.get_leading_space());
    stat.write_str("create table ");
    if format.do_if_object_exists_not_exists() && format.dialect.in_set(Dialect::PGSQL | Dialect::MYSQL | Dialect::SQLITE) {
        stat.write_str("if not exists ");
    }
    let name = format.format_table_name(&table.name);
    stat.write_str(&format!("{name} ("));
    stat.write_str(format.section_divider);
    format.inc_indent_level();
    let vr = variance_rule(format.dialect);
    for (i, field) in table.fields.items.iter().enumerate() {
        if i > 0 {
            stat.write_str(",");
            stat.write_str(format.section_divider);
        }
        stat.write_str(&format.get_leading_space());
        if let Err(e) = write_field(stat, format, field, &vr) {
            format.dec_indent_level();
            return Err(e);
        }
    }
    format.dec_indent_level();
    Ok(())
}

fn build_primary_key(stat: &mut Statement, format: &mut Format, table: &TableDef) -> Result<(), SqlError> {
    format.inc_indent_level();
    let vr = variance_rule(format.dialect);
    let pk = table.advised_primary_key();
    if !vr.primary_key_inline && !pk.items.is_empty() && format.dialect != Dialect::SQLITE {
        stat.write_str(",");
        stat.write_str(format.section_divider);
        stat.write_str(&format.get_leading_space());
        stat.write_str(&format!("constraint {} primary key (", format.format_object_name(&pk.name)));
        for (i, field) in pk.items.iter().enumerate() {
            if i > 0 {
                stat.write_str(", ");
            }
            stat.write_str(&format.format_object_name(&field.name));
        }
        stat.write_str(")");
    }
    if pk.items.is_empty() {
        eprintln!("warning: no primary key defined or can be advised for table \"{}\"", table.name);
    }
    stat.write_str(")");
    format.dec_indent_level();
    Ok(())
}

fn build_indexes(stat: &mut Statement, format: &mut Format, table: &TableDef) -> Result<(), SqlError> {
    for (name, fields) in &table.indexes.items {
        if fields.is_empty() {
            continue;
        }
        stat.write_str(&format.get_leading_space());
        stat.write_str(&format!("create index {}", format.format_object_name(name)));
        stat.write_str(format.section_divider);
        format.inc_indent_level();
        stat.write_str(&format.get_leading_space());
        stat.write_str(&format!("on {} (", format.format_object_name(&table.name)));
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                stat.write_str(",");
            }
            stat.write_str(&format.format_object_name(field));
        }
        stat.write_str(")");
        format.dec_indent_level();
    }
    Ok(())
}

/// Renders against a defensive clone of `format`, per §3/§4.4: SQLite's
/// forced inline mode (and every indent-level/placeholder-index mutation
/// made along the way) is local to this render and never leaks back into
/// the caller's `Format`.
fn render_create_table(table: &TableDef, caller_format: &Format) -> Result<StatementBatch, SqlError> {
    let mut format = caller_format.clone();
    if format.dialect == Dialect::SQLITE {
        format.add_options(BuildOptions::INLINE);
    }

    let wrap_mstsql = format.do_if_object_exists_not_exists() && format.dialect == Dialect::MSTSQL;
    if wrap_mstsql {
        format.inc_indent_level();
    }

    let mut stat = Statement::new(StatementType::Exec);
    build_create_table_main(&mut stat, &mut format, table)?;
    build_primary_key(&mut stat, &mut format, table)?;

    let mut batch = StatementBatch::new();
    batch.add(stat);
    if !table.indexes.items.is_empty() {
        let mut idx_stat = Statement::new(StatementType::Exec);
        build_indexes(&mut idx_stat, &mut format, table)?;
        batch.add(idx_stat);
    }
    batch.join(format.supports_multiple_statements_in_batch(), format.section_divider)?;

    if wrap_mstsql {
        format.dec_indent_level();
    }

    if format.do_if_object_exists_not_exists() && format.dialect == Dialect::MSTSQL && batch.items.len() == 1 {
        let qualified_name = format.format_table_name(&table.name);
        let cond = exists_guard_condition(ExistsGuardTarget::Table { qualified_name }, false);
        let stat = batch.items.remove(0);
        let wrapped = tsql_exists_wrapper(cond.as_ref(), SqlPartKind::CreateTable, stat, &mut format)?;
        batch.add(wrapped);
    }

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DataType;
    use crate::expr::v;

    fn sample_table() -> Rc<TableDef> {
        let mut t = TableDef::new("T");
        t.fields.add_autoinc("Id").primary_key();
        let mut field = FieldDef::new("V", crate::dialect::DataDef::new(DataType::UNICODE_VARCHAR, 10, 0));
        field.not_null();
        field.default_value(v("x"));
        t.fields.items.push(field);
        t
    }

    #[test]
    fn sqlite_forces_inline_and_inlines_autoinc() {
        let table = sample_table();
        let mut format = Format::new(Dialect::SQLITE);
        let batch = create_table(table).build(&mut format).unwrap();
        assert_eq!(batch.items.len(), 1);
        let sql = batch.items[0].sql();
        assert_eq!(sql, "create table T (\nId integer primary key autoincrement,\nV varchar(10) not null default 'x'\n)");
    }

    #[test]
    fn mstsql_plain_create_table_has_single_indent_level() {
        let mut table = TableDef::new("T");
        table.fields.add_autoinc("Id");
        let table = Rc::new(table);
        let mut format = Format::new(Dialect::MSTSQL);
        let batch = create_table(table).build(&mut format).unwrap();
        assert_eq!(batch.items.len(), 1);
        let sql = batch.items[0].sql();
        assert!(sql.starts_with("create table [T] ("));
        assert!(sql.contains("\n    [Id]"), "expected single indent level, got: {sql}");
    }

    #[test]
    fn mstsql_two_statements_join_with_exists_guard() {
        let mut table = TableDef::new("T");
        table.fields.add_autoinc("Id");
        table.indexes.add_index("IX_T_Id", &["Id"]);
        let table = Rc::new(table);
        let mut format = Format::new(Dialect::MSTSQL).exists_guard();
        let batch = create_table(table).build(&mut format).unwrap();
        assert_eq!(batch.items.len(), 1);
        let sql = batch.items[0].sql();
        assert!(sql.starts_with("if object_id("));
        assert!(sql.contains("create index"));
        assert_eq!(sql.matches(';').count(), 1);
    }

    /// `T` with one autoinc primary key and one index, schema `dbo`,
    /// T-SQL with exists-guard, inline literals — the schema-qualified
    /// two-statement wrapped form.
    #[test]
    fn s5_mstsql_schema_qualified_exists_guard() {
        let mut table = TableDef::new("T");
        table.fields.add_autoinc("Id");
        table.indexes.add_index("IX_T_Id", &["Id"]);
        let table = Rc::new(table);
        let mut format = Format::new(Dialect::MSTSQL).exists_guard().inline().with_schema("dbo");
        let batch = create_table(table).build(&mut format).unwrap();
        assert_eq!(batch.items.len(), 1);
        assert_eq!(
            batch.items[0].sql(),
            "if object_id(N'dbo.[T]',N'U') is null begin\n    create table dbo.[T] (\n        [Id] int identity(1,1) not null,\n        constraint [PK_T] primary key ([Id]));\n    create index [IX_T_Id]\n        on [T] ([Id])\nend"
        );
        assert!(batch.items[0].args.is_empty());
    }

    #[test]
    fn mysql_and_sqlite_keep_indexes_as_separate_batch_items() {
        let mut table = TableDef::new("T");
        table.fields.add_autoinc("Id");
        table.indexes.add_index("IX_T_Id", &["Id"]);
        let table = Rc::new(table);

        let mut format = Format::new(Dialect::MYSQL);
        let batch = create_table(table.clone()).build(&mut format).unwrap();
        assert_eq!(batch.items.len(), 2);

        let mut format = Format::new(Dialect::SQLITE);
        let batch = create_table(table).build(&mut format).unwrap();
        assert_eq!(batch.items.len(), 2);
    }

    #[test]
    fn pgsql_composite_primary_key_constraint() {
        let mut table = TableDef::new("T");
        table.fields.add_int("A").primary_key();
        table.fields.add_int("B").primary_key();
        let table = Rc::new(table);
        let mut format = Format::new(Dialect::PGSQL);
        let batch = create_table(table).build(&mut format).unwrap();
        assert!(batch.items[0].sql().contains("constraint \"PK_T\" primary key (\"A\", \"B\")"));
    }

    #[test]
    fn create_database_mstsql_wrapped() {
        let mut format = Format::new(Dialect::MSTSQL).exists_guard();
        let batch = create_database("Shop").build(&mut format).unwrap();
        let sql = batch.items[0].sql();
        assert!(sql.starts_with("if db_id("));
        assert!(sql.contains("create database [Shop]"));
        assert!(sql.ends_with("end"));
    }

    #[test]
    fn create_database_mysql_native_if_not_exists() {
        let mut format = Format::new(Dialect::MYSQL).exists_guard();
        let batch = create_database("shop").build(&mut format).unwrap();
        assert_eq!(batch.items[0].sql(), "create database if not exists `shop`");
    }
}
