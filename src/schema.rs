//! Table/field schema definitions and the advised-primary-key algorithm.
//!
//! Grounded on `original_source/sqldb/database.go`; the fluent
//! `FieldsDef::add_*` constructors follow the same shape as a
//! `schema::column::Column<T>` builder (consuming `&mut self`, returning
//! `&mut Self` for chaining).

use crate::dialect::{DataDef, DataType};
use crate::expr::Expr;
use crate::part::{Field, Table};

/// A bound literal value. Mirrors a `schema::Value` enum, but
/// scoped to what the expression language's `TokenValue` needs to bind or
/// inline-format (§3, §4.3): strings, integers, floats, booleans, an
/// instant in time, and a duration.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Bool(bool),
    Time(time::PrimitiveDateTime),
    Duration(std::time::Duration),
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<time::PrimitiveDateTime> for Value {
    fn from(v: time::PrimitiveDateTime) -> Self {
        Value::Time(v)
    }
}

impl From<std::time::Duration> for Value {
    fn from(v: std::time::Duration) -> Self {
        Value::Duration(v)
    }
}

/// A default-value expression attached to a field, with an on/off flag so
/// "no default configured" is distinguishable from "default is NULL".
pub struct DefaultDef {
    pub on: bool,
    pub value: Option<Box<dyn Expr>>,
}

impl Clone for DefaultDef {
    fn clone(&self) -> Self {
        DefaultDef { on: self.on, value: self.value.as_ref().map(|v| v.clone_expr()) }
    }
}

/// One column of a `TableDef`.
pub struct FieldDef {
    pub name: String,
    pub data: DataDef,
    pub is_nullable: bool,
    pub default: Option<DefaultDef>,
    pub is_primary_key: bool,
}

impl Clone for FieldDef {
    fn clone(&self) -> Self {
        FieldDef {
            name: self.name.clone(),
            data: self.data,
            is_nullable: self.is_nullable,
            default: self.default.clone(),
            is_primary_key: self.is_primary_key,
        }
    }
}

impl FieldDef {
    pub fn new(name: impl Into<String>, data: DataDef) -> Self {
        FieldDef {
            name: name.into(),
            data,
            is_nullable: true,
            default: None,
            is_primary_key: false,
        }
    }

    pub fn default_value(&mut self, value: impl Expr + 'static) -> &mut Self {
        self.default = Some(DefaultDef { on: true, value: Some(Box::new(value)) });
        self
    }

    pub fn not_null(&mut self) -> &mut Self {
        self.is_nullable = false;
        self
    }

    pub fn null(&mut self) -> &mut Self {
        self.is_nullable = true;
        self
    }

    pub fn primary_key(&mut self) -> &mut Self {
        self.is_primary_key = true;
        self
    }

    /// True when the field is explicitly a primary key, or is one of the
    /// two autoincrement data types (which implicitly participate in the
    /// advised primary key when no field is explicitly marked).
    pub fn is_advised_primary_key(&self) -> bool {
        self.is_primary_key || self.data.ty.in_set(DataType::AUTOINC_INT | DataType::AUTOINC_INT_BIG)
    }
}

impl Field for FieldDef {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Ordered field list belonging to a `TableDef`, with convenience
/// constructors for each common data type (ported from `FieldsDef` in the
/// Go source).
#[derive(Clone, Default)]
pub struct FieldsDef {
    pub items: Vec<FieldDef>,
}

impl FieldsDef {
    fn push_field(&mut self, name: &str, ty: DataType, size1: i64, size2: i64) -> &mut FieldDef {
        let data = DataDef::new(ty, size1, size2);
        self.items.push(FieldDef::new(name, data));
        self.items.last_mut().unwrap()
    }

    pub fn add_field(&mut self, name: &str, ty: DataType, size1: i64, size2: i64) -> &mut FieldDef {
        self.push_field(name, ty, size1, size2)
    }

    pub fn add_unicode_fixed(&mut self, name: &str, size: i64) -> &mut FieldDef {
        self.push_field(name, DataType::UNICODE_CHAR, size, 0)
    }

    pub fn add_unicode_variable(&mut self, name: &str, size: i64) -> &mut FieldDef {
        self.push_field(name, DataType::UNICODE_VARCHAR, size, 0)
    }

    pub fn add_int(&mut self, name: &str) -> &mut FieldDef {
        self.push_field(name, DataType::INT, 0, 0)
    }

    pub fn add_int_small(&mut self, name: &str) -> &mut FieldDef {
        self.push_field(name, DataType::INT_SMALL, 0, 0)
    }

    pub fn add_int_big(&mut self, name: &str) -> &mut FieldDef {
        self.push_field(name, DataType::INT_BIG, 0, 0)
    }

    /// Autoincrement fields are always declared `NOT NULL`.
    pub fn add_autoinc(&mut self, name: &str) -> &mut FieldDef {
        let f = self.push_field(name, DataType::AUTOINC_INT, 0, 0);
        f.is_nullable = false;
        f
    }

    pub fn add_autoinc_big(&mut self, name: &str) -> &mut FieldDef {
        let f = self.push_field(name, DataType::AUTOINC_INT_BIG, 0, 0);
        f.is_nullable = false;
        f
    }

    pub fn add_float(&mut self, name: &str, precision: i64) -> &mut FieldDef {
        self.push_field(name, DataType::FLOAT, precision, 0)
    }

    pub fn add_real(&mut self, name: &str) -> &mut FieldDef {
        self.push_field(name, DataType::REAL, 0, 0)
    }

    pub fn add_double(&mut self, name: &str) -> &mut FieldDef {
        self.push_field(name, DataType::DOUBLE, 0, 0)
    }

    pub fn add_numeric(&mut self, name: &str, precision: i64, scale: i64) -> &mut FieldDef {
        self.push_field(name, DataType::NUMERIC, precision, scale)
    }

    pub fn add_decimal(&mut self, name: &str, precision: i64, scale: i64) -> &mut FieldDef {
        self.push_field(name, DataType::DECIMAL, precision, scale)
    }

    pub fn add_bool(&mut self, name: &str) -> &mut FieldDef {
        self.push_field(name, DataType::BOOL, 0, 0)
    }

    /// Historically flaky over ODBC with some drivers (unsupported column
    /// type 92); kept as a plain TIME type, no special casing here since
    /// this crate never talks to a driver directly.
    pub fn add_time(&mut self, name: &str) -> &mut FieldDef {
        self.push_field(name, DataType::TIME, 0, 0)
    }

    pub fn add_date(&mut self, name: &str) -> &mut FieldDef {
        self.push_field(name, DataType::DATE, 0, 0)
    }

    pub fn add_datetime(&mut self, name: &str) -> &mut FieldDef {
        self.push_field(name, DataType::DATETIME, 0, 0)
    }

    pub fn find(&self, name: &str) -> Option<&FieldDef> {
        self.items.iter().find(|f| f.name == name)
    }
}

/// A named group of fields, e.g. a composite index or the advised primary
/// key.
#[derive(Clone, Default)]
pub struct FieldCollection {
    pub name: String,
    pub items: Vec<FieldDef>,
}

impl FieldCollection {
    pub fn add_field(&mut self, field: FieldDef) {
        self.items.push(field);
    }
}

/// Ordered list of indexes belonging to a `TableDef`.
#[derive(Clone, Default)]
pub struct IndexesDef {
    pub items: Vec<(String, Vec<String>)>,
}

impl IndexesDef {
    pub fn add_index(&mut self, name: impl Into<String>, fields: &[&str]) {
        self.items.push((name.into(), fields.iter().map(|s| s.to_string()).collect()));
    }
}

/// A named table: ordered fields, optional primary-key name, indexes.
#[derive(Clone)]
pub struct TableDef {
    pub name: String,
    pub fields: FieldsDef,
    pub primary_key_name: Option<String>,
    pub indexes: IndexesDef,
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        TableDef {
            name: name.into(),
            fields: FieldsDef::default(),
            primary_key_name: None,
            indexes: IndexesDef::default(),
        }
    }

    pub fn column_count(&self) -> usize {
        self.fields.items.len()
    }

    pub fn column_is_ambiguous(&self, name: &str) -> bool {
        self.fields.items.iter().filter(|f| f.name == name).count() > 1
    }

    pub fn column_exists(&self, name: &str) -> bool {
        self.fields.items.iter().any(|f| f.name == name)
    }

    /// Explicit primary-key fields win if any exist; otherwise autoinc
    /// fields are collected. The constraint name defaults to `PK_<table>`
    /// unless `primary_key_name` is set. Ported from
    /// `TableDef.GetOrAdvicePrimaryKey`.
    pub fn advised_primary_key(&self) -> FieldCollection {
        let explicit: Vec<&FieldDef> = self.fields.items.iter().filter(|f| f.is_primary_key).collect();
        if !explicit.is_empty() {
            return FieldCollection {
                name: self.primary_key_name.clone().unwrap_or_else(|| format!("PK_{}", self.name)),
                items: explicit.into_iter().cloned().collect(),
            };
        }
        let advised: Vec<FieldDef> = self
            .fields
            .items
            .iter()
            .filter(|f| f.is_advised_primary_key())
            .cloned()
            .collect();
        FieldCollection { name: format!("PK_{}", self.name), items: advised }
    }
}

impl Table for TableDef {
    fn name(&self) -> &str {
        &self.name
    }

    fn fields(&self) -> Vec<&dyn Field> {
        self.fields.items.iter().map(|f| f as &dyn Field).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advised_pk_falls_back_to_autoinc() {
        let mut t = TableDef::new("Users");
        t.fields.add_autoinc("Id");
        t.fields.add_unicode_variable("Name", 50);
        let pk = t.advised_primary_key();
        assert_eq!(pk.name, "PK_Users");
        assert_eq!(pk.items.len(), 1);
        assert_eq!(pk.items[0].name, "Id");
    }

    #[test]
    fn advised_pk_prefers_explicit() {
        let mut t = TableDef::new("Users");
        t.fields.add_autoinc("Id");
        t.fields.add_unicode_variable("Email", 100).primary_key();
        let pk = t.advised_primary_key();
        assert_eq!(pk.items.len(), 1);
        assert_eq!(pk.items[0].name, "Email");
    }

    #[test]
    fn ambiguous_column_detection() {
        let mut t = TableDef::new("T");
        t.fields.add_int("a");
        t.fields.add_int("a");
        assert!(t.column_is_ambiguous("a"));
        assert!(!t.column_is_ambiguous("b"));
    }
}
