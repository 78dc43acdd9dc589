//! Statement buffer and batch.
//!
//! Grounded on `original_source/sqlcore/statement.go`.

use crate::error::SqlError;
use crate::schema::Value;

/// Whether a rendered statement is expected to return a row set.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StatementType {
    Undefined,
    Exec,
    Query,
}

/// A single SQL statement: accumulated text plus the ordered list of bound
/// argument values referenced by its placeholders.
#[derive(Clone, Debug)]
pub struct Statement {
    sql: String,
    pub ty: StatementType,
    pub args: Vec<Value>,
}

impl Statement {
    pub fn new(ty: StatementType) -> Self {
        Statement { sql: String::new(), ty, args: Vec::new() }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Append literal text.
    pub fn write_str(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    pub fn append_arg(&mut self, value: Value) {
        self.args.push(value);
    }

    pub fn append_args(&mut self, values: impl IntoIterator<Item = Value>) {
        self.args.extend(values);
    }

    /// Merge another statement's text and arguments onto the end of this
    /// one, in declaration order.
    pub fn append_stat_part(&mut self, other: &Statement) {
        self.sql.push_str(&other.sql);
        self.args.extend(other.args.iter().cloned());
    }

    /// Merge several sub-statement texts into `self` via a `{}`-templated
    /// format string (one `{}` per sub-statement, in order), concatenating
    /// all of their arguments in declaration order. Mirrors
    /// `AppendStatPartsFormat` in the Go source.
    pub fn append_stat_parts_format(&mut self, format: &str, parts: &[&Statement]) {
        let mut it = parts.iter();
        let mut chunks = format.split("{}");
        if let Some(first) = chunks.next() {
            self.sql.push_str(first);
        }
        for chunk in chunks {
            if let Some(part) = it.next() {
                self.sql.push_str(&part.sql);
            }
            self.sql.push_str(chunk);
        }
        for part in parts {
            self.args.extend(part.args.iter().cloned());
        }
    }
}

/// An ordered list of statements produced by one render.
#[derive(Clone, Debug, Default)]
pub struct StatementBatch {
    pub items: Vec<Statement>,
}

impl StatementBatch {
    pub fn new() -> Self {
        StatementBatch { items: Vec::new() }
    }

    pub fn add(&mut self, statement: Statement) -> usize {
        self.items.push(statement);
        self.items.len() - 1
    }

    pub fn last(&self) -> Option<&Statement> {
        self.items.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut Statement> {
        self.items.last_mut()
    }

    /// Replace the statement at `index` in place (identity-replace, used
    /// by the T-SQL exists wrapper to substitute a statement with its
    /// `if ... begin ... end` envelope).
    pub fn replace(&mut self, index: usize, statement: Statement) {
        self.items[index] = statement;
    }

    /// Collapse the batch into a single `;`-joined statement, when the
    /// format allows it and there is more than one item. All but the last
    /// statement must be of type `Exec`; the merged type is the last
    /// statement's type. Mirrors `StatementBatch.Join`.
    pub fn join(&mut self, supports_multi: bool, divider: &str) -> Result<(), SqlError> {
        if !supports_multi || self.items.len() <= 1 {
            return Ok(());
        }
        for item in &self.items[..self.items.len() - 1] {
            if item.ty != StatementType::Exec {
                return Err(SqlError::Shape(format!(
                    "can't join statement, since it's return record set: \"{}\"",
                    item.sql()
                )));
            }
        }
        let joiner = format!(";{divider}");
        let final_ty = self.items.last().unwrap().ty;
        let mut merged = Statement::new(final_ty);
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                merged.sql.push_str(&joiner);
            }
            merged.sql.push_str(&item.sql);
            merged.args.extend(item.args.iter().cloned());
        }
        self.items = vec![merged];
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Value;

    #[test]
    fn join_collapses_when_supported() {
        let mut batch = StatementBatch::new();
        let mut s1 = Statement::new(StatementType::Exec);
        s1.write_str("create table t (id int)");
        let mut s2 = Statement::new(StatementType::Exec);
        s2.write_str("create index ix on t (id)");
        batch.add(s1);
        batch.add(s2);
        batch.join(true, "\n").unwrap();
        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.items[0].sql().matches(';').count(), 1);
    }

    #[test]
    fn join_noop_when_unsupported() {
        let mut batch = StatementBatch::new();
        batch.add(Statement::new(StatementType::Exec));
        batch.add(Statement::new(StatementType::Exec));
        batch.join(false, "\n").unwrap();
        assert_eq!(batch.items.len(), 2);
    }

    #[test]
    fn join_rejects_non_exec_before_last() {
        let mut batch = StatementBatch::new();
        batch.add(Statement::new(StatementType::Query));
        batch.add(Statement::new(StatementType::Exec));
        assert!(batch.join(true, "\n").is_err());
    }

    #[test]
    fn append_stat_parts_format_merges_args_in_order() {
        let mut a = Statement::new(StatementType::Exec);
        a.write_str("a");
        a.append_arg(Value::Int32(1));
        let mut b = Statement::new(StatementType::Exec);
        b.write_str("b");
        b.append_arg(Value::Int32(2));
        let mut out = Statement::new(StatementType::Exec);
        out.append_stat_parts_format("insert into {} values ({})", &[&a, &b]);
        assert_eq!(out.sql(), "insert into a values (b)");
        assert_eq!(out.args.len(), 2);
    }
}
