//! Dialect and data-type catalog.
//!
//! Enumerates the four supported SQL dialects and the closed set of data
//! types, and owns the per-dialect textual template tables: identifier
//! quoting, default schema, system database name, and column-type strings.
//!
//! Grounded on `original_source/dialect.go` and `original_source/data.go`.

use std::fmt;

/// A tiny hand-rolled bitflags macro: this crate carries no `bitflags`
/// dependency, so dialect/data-type membership sets are plain `u8`/`u32`
/// masks with a generated struct wrapper for readability.
macro_rules! bitflags_enum {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $repr:ty {
            $(const $variant:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub $repr);

        impl $name {
            $(pub const $variant: $name = $name($value);)*

            /// True if `self` is a single-dialect (or single-type) value
            /// that is a member of the set `other`.
            pub fn in_set(self, other: $name) -> bool {
                self.0 & other.0 != 0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }
    };
}

bitflags_enum! {
    /// Target SQL flavor. Function and data-type templates declare the set
    /// of dialects they apply to using the bitwise combination operator
    /// `|`, mirroring the Go source's `Dialect` bitmask.
    pub struct Dialect: u8 {
        const MSTSQL = 0b0001;
        const PGSQL  = 0b0010;
        const MYSQL  = 0b0100;
        const SQLITE = 0b1000;
    }
}

impl Dialect {
    pub const ANY: Dialect = Dialect(Dialect::MSTSQL.0 | Dialect::PGSQL.0 | Dialect::MYSQL.0 | Dialect::SQLITE.0);

    /// Human-readable dialect name.
    pub fn name(self) -> &'static str {
        match self {
            Dialect::MSTSQL => "MS T-SQL",
            Dialect::PGSQL => "PostgreSQL",
            Dialect::MYSQL => "MySQL",
            Dialect::SQLITE => "SQLite",
            _ => "unknown",
        }
    }

    /// SQLite is the only dialect without multi-database support (there is
    /// no notion of "create database" beyond a new file).
    pub fn supports_multiple_databases(self) -> bool {
        self != Dialect::SQLITE
    }

    /// Schema used when none is explicitly configured and
    /// `use_schema_name()` holds. `None` means "this dialect has no
    /// meaningful default schema" (MySQL, SQLite); T-SQL's default is the
    /// empty string (not `None`) matching the Go source's literal `""`.
    pub fn default_schema(self) -> Option<&'static str> {
        match self {
            Dialect::MSTSQL => Some(""),
            Dialect::PGSQL => Some("public"),
            _ => None,
        }
    }

    /// The database to connect to in order to run existence-check queries
    /// against the server's system catalog.
    pub fn system_database(self) -> Option<&'static str> {
        match self {
            Dialect::MSTSQL => Some("master"),
            Dialect::PGSQL => Some("postgres"),
            Dialect::MYSQL => Some("information_schema"),
            Dialect::SQLITE => None,
            _ => None,
        }
    }

    /// Only T-SQL and PostgreSQL allow several `;`-joined statements to be
    /// submitted to the driver as a single batch.
    pub fn supports_multiple_statements_in_batch(self) -> bool {
        matches!(self, Dialect::MSTSQL | Dialect::PGSQL)
    }

    /// Quote a bare identifier (table or column name) per dialect rules.
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Dialect::MSTSQL => format!("[{name}]"),
            Dialect::PGSQL => format!("\"{name}\""),
            Dialect::MYSQL => format!("`{name}`"),
            _ => name.to_string(),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl fmt::Debug for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

bitflags_enum! {
    /// Closed data-type catalog. `AUTOINC_INT`/`AUTOINC_INT_BIG` are the
    /// two autoincrement widths referenced throughout the field-variance
    /// and advised-primary-key logic.
    pub struct DataType: u32 {
        const INT_SMALL       = 1 << 0;
        const INT             = 1 << 1;
        const INT_BIG         = 1 << 2;
        const REAL            = 1 << 3;
        const DOUBLE          = 1 << 4;
        const FLOAT           = 1 << 5;
        const NUMERIC         = 1 << 6;
        const DECIMAL         = 1 << 7;
        const DATETIME        = 1 << 8;
        const DATE            = 1 << 9;
        const TIME            = 1 << 10;
        const AUTOINC_INT     = 1 << 11;
        const AUTOINC_INT_BIG = 1 << 12;
        const BOOL            = 1 << 13;
        const UNICODE_CHAR    = 1 << 14;
        const UNICODE_VARCHAR = 1 << 15;
    }
}

impl DataType {
    pub const ALL: DataType = DataType(0x0001_FFFF);
}

/// A concrete field data type: a `DataType` discriminant plus up to two
/// size parameters (precision/scale, or a single length).
#[derive(Clone, Copy, Debug)]
pub struct DataDef {
    pub ty: DataType,
    pub size1: i64,
    pub size2: i64,
}

impl DataDef {
    pub fn new(ty: DataType, size1: i64, size2: i64) -> Self {
        DataDef { ty, size1, size2 }
    }

    /// Render the dialect-specific column-type text for this data type,
    /// e.g. `varchar(50)`, `int identity(1,1)`, `decimal(10,2)`.
    ///
    /// Exact per-dialect table ported from `original_source/data.go`'s
    /// `GetStrTemplate`. First matching dialect-set row wins.
    pub fn str_template(&self, dialect: Dialect) -> Result<String, crate::error::SqlError> {
        let t = self.ty;
        let (s1, s2) = (self.size1, self.size2);
        let out = if t.in_set(DataType::INT_SMALL) {
            "smallint".to_string()
        } else if t.in_set(DataType::INT) {
            "int".to_string()
        } else if t.in_set(DataType::INT_BIG) {
            "bigint".to_string()
        } else if t.in_set(DataType::REAL) {
            "real".to_string()
        } else if t.in_set(DataType::DOUBLE) {
            match dialect {
                Dialect::PGSQL => "double precision".to_string(),
                Dialect::MSTSQL => "float(53)".to_string(),
                _ => "double".to_string(),
            }
        } else if t.in_set(DataType::FLOAT) {
            format!("float({s1})")
        } else if t.in_set(DataType::NUMERIC) {
            format!("numeric({s1},{s2})")
        } else if t.in_set(DataType::DECIMAL) {
            format!("decimal({s1},{s2})")
        } else if t.in_set(DataType::DATETIME) {
            match dialect {
                Dialect::MSTSQL | Dialect::SQLITE => "datetime".to_string(),
                _ => "timestamp".to_string(),
            }
        } else if t.in_set(DataType::DATE) {
            "date".to_string()
        } else if t.in_set(DataType::TIME) {
            "time".to_string()
        } else if t.in_set(DataType::AUTOINC_INT) {
            match dialect {
                Dialect::MSTSQL => "int identity(1,1)".to_string(),
                Dialect::PGSQL => "serial".to_string(),
                Dialect::MYSQL => "int".to_string(),
                _ => "integer".to_string(),
            }
        } else if t.in_set(DataType::AUTOINC_INT_BIG) {
            match dialect {
                Dialect::MSTSQL => "bigint identity(1,1)".to_string(),
                Dialect::PGSQL => "bigserial".to_string(),
                _ => "bigint".to_string(),
            }
        } else if t.in_set(DataType::BOOL) {
            match dialect {
                Dialect::MSTSQL => "bit".to_string(),
                _ => "boolean".to_string(),
            }
        } else if t.in_set(DataType::UNICODE_CHAR) {
            match dialect {
                Dialect::MSTSQL => format!("nchar({s1})"),
                Dialect::MYSQL => format!("char({s1}) character set utf8"),
                _ => format!("char({s1})"),
            }
        } else if t.in_set(DataType::UNICODE_VARCHAR) {
            match dialect {
                Dialect::MSTSQL => format!("nvarchar({s1})"),
                Dialect::MYSQL => format!("varchar({s1}) character set utf8"),
                _ => format!("varchar({s1})"),
            }
        } else {
            return Err(crate::error::SqlError::Dialect(format!(
                "no column-type template for this data type in dialect \"{dialect}\""
            )));
        };
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autoinc_templates_per_dialect() {
        let d = DataDef::new(DataType::AUTOINC_INT, 0, 0);
        assert_eq!(d.str_template(Dialect::MSTSQL).unwrap(), "int identity(1,1)");
        assert_eq!(d.str_template(Dialect::PGSQL).unwrap(), "serial");
        assert_eq!(d.str_template(Dialect::MYSQL).unwrap(), "int");
        assert_eq!(d.str_template(Dialect::SQLITE).unwrap(), "integer");
    }

    #[test]
    fn double_template_per_dialect() {
        let d = DataDef::new(DataType::DOUBLE, 0, 0);
        assert_eq!(d.str_template(Dialect::PGSQL).unwrap(), "double precision");
        assert_eq!(d.str_template(Dialect::MSTSQL).unwrap(), "float(53)");
        assert_eq!(d.str_template(Dialect::MYSQL).unwrap(), "double");
        assert_eq!(d.str_template(Dialect::SQLITE).unwrap(), "double");
    }

    #[test]
    fn quote_identifier_per_dialect() {
        assert_eq!(Dialect::MSTSQL.quote_identifier("T"), "[T]");
        assert_eq!(Dialect::PGSQL.quote_identifier("T"), "\"T\"");
        assert_eq!(Dialect::MYSQL.quote_identifier("T"), "`T`");
        assert_eq!(Dialect::SQLITE.quote_identifier("T"), "T");
    }

    #[test]
    fn default_schema_per_dialect() {
        assert_eq!(Dialect::MSTSQL.default_schema(), Some(""));
        assert_eq!(Dialect::PGSQL.default_schema(), Some("public"));
        assert_eq!(Dialect::MYSQL.default_schema(), None);
        assert_eq!(Dialect::SQLITE.default_schema(), None);
    }
}
