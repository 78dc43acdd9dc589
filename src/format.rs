//! Rendering configuration (`Format`).
//!
//! Grounded on `original_source/sqlcore/format.go`. The Go source's mutable
//! `CallStack` traversal aid has no counterpart here: ancestor queries are
//! answered by walking the (immutable) part tree's parent links directly,
//! see `part::has_ancestor`.

use crate::dialect::Dialect;

/// Rendering option bits. Mirrors `BuildOptions` in the Go source.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions(u32);

impl BuildOptions {
    pub const NONE: BuildOptions = BuildOptions(0);
    pub const INLINE: BuildOptions = BuildOptions(1 << 0);
    pub const DO_IF_OBJECT_EXISTS_NOT_EXISTS: BuildOptions = BuildOptions(1 << 1);
    pub const USE_SCHEMA_NAME: BuildOptions = BuildOptions(1 << 2);
    pub const SUPPORT_MULT_STATS_IN_A_BATCH: BuildOptions = BuildOptions(1 << 3);
    pub const COLUMN_NAME_AND_COUNT_VALIDATION: BuildOptions = BuildOptions(1 << 4);
    pub const ODBC_MODE: BuildOptions = BuildOptions(1 << 5);

    fn has(self, flag: BuildOptions) -> bool {
        self.0 & flag.0 != 0
    }
}

impl std::ops::BitOr for BuildOptions {
    type Output = BuildOptions;
    fn bitor(self, rhs: BuildOptions) -> BuildOptions {
        BuildOptions(self.0 | rhs.0)
    }
}

/// One `Format` belongs to exactly one top-level render call (§5 of the
/// spec). Clone defensively when a maker needs to mutate options (inline
/// mode forced on SQLite, indent level bumped inside the T-SQL exists
/// wrapper) without affecting the caller's copy.
#[derive(Clone)]
pub struct Format {
    pub dialect: Dialect,
    options: BuildOptions,
    schema_name: Option<String>,
    database_name: Option<String>,
    indent_level: u32,
    param_index: u32,
    /// Separator placed between sibling sections; `"\n"` normally, `" "`
    /// for single-line pretty-printing.
    pub section_divider: &'static str,
}

impl Format {
    /// New `Format` for `dialect`. Always turns on column-name-and-count
    /// validation; turns on multi-statement-batch support automatically
    /// when the dialect supports it, matching `NewFormat` in the Go source.
    pub fn new(dialect: Dialect) -> Self {
        let mut options = BuildOptions::COLUMN_NAME_AND_COUNT_VALIDATION;
        if dialect.supports_multiple_statements_in_batch() {
            options = options | BuildOptions::SUPPORT_MULT_STATS_IN_A_BATCH;
        }
        Format {
            dialect,
            options,
            schema_name: None,
            database_name: None,
            indent_level: 0,
            param_index: 0,
            section_divider: "\n",
        }
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = self.options | options;
        self
    }

    pub fn inline(mut self) -> Self {
        self.options = self.options | BuildOptions::INLINE;
        self
    }

    pub fn odbc_mode(mut self) -> Self {
        self.options = self.options | BuildOptions::ODBC_MODE;
        self
    }

    pub fn exists_guard(mut self) -> Self {
        self.options = self.options | BuildOptions::DO_IF_OBJECT_EXISTS_NOT_EXISTS;
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema_name = Some(schema.into());
        self.options = self.options | BuildOptions::USE_SCHEMA_NAME;
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database_name = Some(database.into());
        self
    }

    /// Column validation disabled; used internally by the `util` module's
    /// throwaway formats for existence-check queries.
    pub fn skip_validation(mut self) -> Self {
        self.options = BuildOptions(self.options.0 & !BuildOptions::COLUMN_NAME_AND_COUNT_VALIDATION.0);
        self
    }

    pub fn add_options(&mut self, options: BuildOptions) {
        self.options = self.options | options;
    }

    pub fn is_inline(&self) -> bool {
        self.options.has(BuildOptions::INLINE)
    }

    pub fn do_if_object_exists_not_exists(&self) -> bool {
        self.options.has(BuildOptions::DO_IF_OBJECT_EXISTS_NOT_EXISTS)
    }

    pub fn odbc_mode_on(&self) -> bool {
        self.options.has(BuildOptions::ODBC_MODE)
    }

    pub fn column_name_and_count_validation_is_on(&self) -> bool {
        self.options.has(BuildOptions::COLUMN_NAME_AND_COUNT_VALIDATION)
    }

    pub fn supports_multiple_statements_in_batch(&self) -> bool {
        self.options.has(BuildOptions::SUPPORT_MULT_STATS_IN_A_BATCH)
    }

    /// True when a schema segment should be emitted: either an explicit
    /// schema was configured, or the `USE_SCHEMA_NAME` option is set
    /// directly (Open Question c).
    pub fn use_schema_name(&self) -> bool {
        self.schema_name.is_some() || self.options.has(BuildOptions::USE_SCHEMA_NAME)
    }

    /// Precedence: explicit schema wins; else the dialect default (only
    /// when `use_schema_name()` holds); else no schema.
    pub fn schema_name(&self) -> Option<String> {
        if let Some(s) = &self.schema_name {
            return Some(s.clone());
        }
        if self.use_schema_name() {
            return self.dialect.default_schema().map(|s| s.to_string());
        }
        None
    }

    pub fn database_name(&self) -> Option<&str> {
        self.database_name.as_deref()
    }

    pub fn get_leading_space(&self) -> String {
        "    ".repeat(self.indent_level as usize)
    }

    pub fn inc_indent_level(&mut self) {
        self.indent_level += 1;
    }

    pub fn dec_indent_level(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    /// Advance and return the 1-based PostgreSQL placeholder index.
    pub fn inc_param_index(&mut self) -> u32 {
        self.param_index += 1;
        self.param_index
    }

    pub fn param_index(&self) -> u32 {
        self.param_index
    }

    /// Quote a bare object name per dialect quoting rules.
    pub fn format_object_name(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    /// Render a fully schema/database-qualified table name, per the
    /// precedence documented on `schema_name()`.
    pub fn format_table_name(&self, table: &str) -> String {
        if let Some(db) = &self.database_name {
            let schema = self.schema_name();
            return match schema {
                Some(s) if !s.is_empty() => {
                    format!("{}.{}.{}", db, s, self.format_object_name(table))
                }
                _ => format!("{}.{}", db, self.format_object_name(table)),
            };
        }
        if let Some(s) = self.schema_name() {
            if !s.is_empty() {
                return format!("{}.{}", s, self.format_object_name(table));
            }
        }
        self.format_object_name(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_precedence_explicit_wins() {
        let f = Format::new(Dialect::PGSQL).with_schema("custom");
        assert_eq!(f.format_table_name("T"), "custom.\"T\"");
    }

    #[test]
    fn schema_precedence_dialect_default_only_with_flag() {
        let f = Format::new(Dialect::PGSQL);
        assert_eq!(f.format_table_name("T"), "\"T\"");
        let f2 = Format::new(Dialect::PGSQL).with_options(BuildOptions::USE_SCHEMA_NAME);
        assert_eq!(f2.format_table_name("T"), "public.\"T\"");
    }

    #[test]
    fn database_name_with_no_schema_segment() {
        let f = Format::new(Dialect::MYSQL).with_database("db");
        assert_eq!(f.format_table_name("T"), "db.`T`");
    }

    #[test]
    fn mstsql_default_schema_is_empty_string() {
        let f = Format::new(Dialect::MSTSQL).with_options(BuildOptions::USE_SCHEMA_NAME);
        assert_eq!(f.format_table_name("T"), "[T]");
    }
}
