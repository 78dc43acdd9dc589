//! Executor and connection-init collaborator interfaces (§6), plus an
//! optional `sqlx`-backed adapter.
//!
//! Grounded on `database/mod.rs`'s `Database` struct: the same one-struct,
//! cfg-gated-field shape (`connection: Arc<MySqlPool>` / `Arc<PgPool>` /
//! `Arc<SqlitePool>`, only one active per build) and the same
//! `conn.fetch_all`/`sqlx::query(..).execute(..)` calls, generalized from a
//! typed-row ORM layer down to the plain string/args/rows shape this crate
//! renders. The core never calls these directly — it hands a caller a
//! `StatementBatch`; these traits describe what the caller then does with it.

use crate::error::SqlError;
use crate::part::ConnInit;
use crate::schema::Value;
use crate::statement::{StatementBatch, StatementType};

/// What a database driver must provide so a rendered `StatementBatch` can
/// actually run: execute an EXEC statement, fetch the single row a QUERY
/// statement (or a RETURNING-closing batch) produces, or fetch a single
/// QUERY statement's rows.
pub trait Executor {
    type Row;

    fn exec(&mut self, sql: &str, args: &[Value]) -> Result<u64, SqlError>;
    fn query_row(&mut self, sql: &str, args: &[Value]) -> Result<Self::Row, SqlError>;
    fn query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Self::Row>, SqlError>;
}

/// Run every statement in `batch` in order through `executor`, returning the
/// rows of the final statement if it's a QUERY (the RETURNING case),
/// otherwise `None`. All but the last statement must be EXEC — the same
/// assumption `StatementBatch::join` makes.
pub fn run_batch<E: Executor>(batch: &StatementBatch, executor: &mut E) -> Result<Option<Vec<E::Row>>, SqlError> {
    let last = batch.items.len().saturating_sub(1);
    for (i, stat) in batch.items.iter().enumerate() {
        if i == last && stat.ty == StatementType::Query {
            return Ok(Some(executor.query(&stat.sql, &stat.args)?));
        }
        executor.exec(&stat.sql, &stat.args)?;
    }
    Ok(None)
}

#[cfg(feature = "mysql")]
pub mod mysql {
    //! `sqlx::MySqlPool`-backed `Executor`/`ConnInit`.
    use super::*;
    use sqlx::mysql::MySqlRow;
    use sqlx::{MySql, MySqlPool};
    use std::sync::Arc;

    type Query<'q> = sqlx::query::Query<'q, MySql, <MySql as sqlx::Database>::Arguments<'q>>;

    fn bind_query<'q>(sql: &'q str, args: &'q [Value]) -> Query<'q> {
        let mut query = sqlx::query(sql);
        for arg in args {
            query = match arg {
                Value::Null => query.bind(None::<String>),
                Value::String(s) => query.bind(s.as_str()),
                Value::Int32(v) => query.bind(*v),
                Value::Int64(v) => query.bind(*v),
                Value::Float64(v) => query.bind(*v),
                Value::Bool(v) => query.bind(*v),
                Value::Time(t) => query.bind(crate::expr::format_datetime(*t)),
                Value::Duration(d) => query.bind(crate::expr::format_duration_hms(*d)),
            };
        }
        query
    }

    /// A pooled connection plus the blocking `tokio` runtime used to drive
    /// `sqlx`'s async API from this crate's synchronous traits.
    pub struct Connection {
        pool: Arc<MySqlPool>,
        runtime: tokio::runtime::Runtime,
    }

    impl Connection {
        pub fn connect(url: &str) -> Result<Self, SqlError> {
            let runtime = tokio::runtime::Runtime::new().map_err(|e| SqlError::Execution(e.to_string()))?;
            let pool = runtime.block_on(MySqlPool::connect(url)).map_err(|e| SqlError::Execution(e.to_string()))?;
            Ok(Connection { pool: Arc::new(pool), runtime })
        }
    }

    impl Executor for Connection {
        type Row = MySqlRow;

        fn exec(&mut self, sql: &str, args: &[Value]) -> Result<u64, SqlError> {
            let pool = self.pool.clone();
            let query = bind_query(sql, args);
            self.runtime.block_on(async move {
                query.execute(&*pool).await.map(|r| r.rows_affected()).map_err(|e| SqlError::Execution(e.to_string()))
            })
        }

        fn query_row(&mut self, sql: &str, args: &[Value]) -> Result<Self::Row, SqlError> {
            let pool = self.pool.clone();
            let query = bind_query(sql, args);
            self.runtime.block_on(async move { query.fetch_one(&*pool).await.map_err(|e| SqlError::Execution(e.to_string())) })
        }

        fn query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Self::Row>, SqlError> {
            let pool = self.pool.clone();
            let query = bind_query(sql, args);
            self.runtime.block_on(async move { query.fetch_all(&*pool).await.map_err(|e| SqlError::Execution(e.to_string())) })
        }
    }

    /// Opens a system-database connection for the `util` existence checks.
    /// `url_base` is a connection string without a trailing database name;
    /// the dialect's `system_database()` (or the override) is appended.
    pub struct MySqlConnInit {
        pub url_base: String,
    }

    impl ConnInit for MySqlConnInit {
        type Handle = Connection;

        fn open(&self, dialect: crate::dialect::Dialect, database: Option<&str>) -> Result<Self::Handle, SqlError> {
            let db = database.or_else(|| dialect.system_database()).unwrap_or("");
            Connection::connect(&format!("{}/{}", self.url_base, db))
        }
    }
}

#[cfg(feature = "postgres")]
pub mod postgres {
    //! `sqlx::PgPool`-backed `Executor`/`ConnInit`.
    use super::*;
    use sqlx::postgres::PgRow;
    use sqlx::{PgPool, Postgres};
    use std::sync::Arc;

    type Query<'q> = sqlx::query::Query<'q, Postgres, <Postgres as sqlx::Database>::Arguments<'q>>;

    fn bind_query<'q>(sql: &'q str, args: &'q [Value]) -> Query<'q> {
        let mut query = sqlx::query(sql);
        for arg in args {
            query = match arg {
                Value::Null => query.bind(None::<String>),
                Value::String(s) => query.bind(s.as_str()),
                Value::Int32(v) => query.bind(*v),
                Value::Int64(v) => query.bind(*v),
                Value::Float64(v) => query.bind(*v),
                Value::Bool(v) => query.bind(*v),
                Value::Time(t) => query.bind(crate::expr::format_datetime(*t)),
                Value::Duration(d) => query.bind(crate::expr::format_duration_hms(*d)),
            };
        }
        query
    }

    pub struct Connection {
        pool: Arc<PgPool>,
        runtime: tokio::runtime::Runtime,
    }

    impl Connection {
        pub fn connect(url: &str) -> Result<Self, SqlError> {
            let runtime = tokio::runtime::Runtime::new().map_err(|e| SqlError::Execution(e.to_string()))?;
            let pool = runtime.block_on(PgPool::connect(url)).map_err(|e| SqlError::Execution(e.to_string()))?;
            Ok(Connection { pool: Arc::new(pool), runtime })
        }
    }

    impl Executor for Connection {
        type Row = PgRow;

        fn exec(&mut self, sql: &str, args: &[Value]) -> Result<u64, SqlError> {
            let pool = self.pool.clone();
            let query = bind_query(sql, args);
            self.runtime.block_on(async move {
                query.execute(&*pool).await.map(|r| r.rows_affected()).map_err(|e| SqlError::Execution(e.to_string()))
            })
        }

        fn query_row(&mut self, sql: &str, args: &[Value]) -> Result<Self::Row, SqlError> {
            let pool = self.pool.clone();
            let query = bind_query(sql, args);
            self.runtime.block_on(async move { query.fetch_one(&*pool).await.map_err(|e| SqlError::Execution(e.to_string())) })
        }

        fn query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Self::Row>, SqlError> {
            let pool = self.pool.clone();
            let query = bind_query(sql, args);
            self.runtime.block_on(async move { query.fetch_all(&*pool).await.map_err(|e| SqlError::Execution(e.to_string())) })
        }
    }

    /// Opens a system-database connection (`postgres` by convention) for
    /// the `util` existence checks.
    pub struct PgConnInit {
        pub url_base: String,
    }

    impl ConnInit for PgConnInit {
        type Handle = Connection;

        fn open(&self, dialect: crate::dialect::Dialect, database: Option<&str>) -> Result<Self::Handle, SqlError> {
            let db = database.or_else(|| dialect.system_database()).unwrap_or("postgres");
            Connection::connect(&format!("{}/{}", self.url_base, db))
        }
    }
}

#[cfg(feature = "sqlite")]
pub mod sqlite {
    //! `sqlx::SqlitePool`-backed `Executor`/`ConnInit`.
    use super::*;
    use sqlx::sqlite::SqliteRow;
    use sqlx::{Sqlite, SqlitePool};
    use std::sync::Arc;

    type Query<'q> = sqlx::query::Query<'q, Sqlite, <Sqlite as sqlx::Database>::Arguments<'q>>;

    fn bind_query<'q>(sql: &'q str, args: &'q [Value]) -> Query<'q> {
        let mut query = sqlx::query(sql);
        for arg in args {
            query = match arg {
                Value::Null => query.bind(None::<String>),
                Value::String(s) => query.bind(s.as_str()),
                Value::Int32(v) => query.bind(*v),
                Value::Int64(v) => query.bind(*v),
                Value::Float64(v) => query.bind(*v),
                Value::Bool(v) => query.bind(*v),
                Value::Time(t) => query.bind(crate::expr::format_datetime(*t)),
                Value::Duration(d) => query.bind(crate::expr::format_duration_hms(*d)),
            };
        }
        query
    }

    pub struct Connection {
        pool: Arc<SqlitePool>,
        runtime: tokio::runtime::Runtime,
    }

    impl Connection {
        pub fn connect(url: &str) -> Result<Self, SqlError> {
            let runtime = tokio::runtime::Runtime::new().map_err(|e| SqlError::Execution(e.to_string()))?;
            let pool = runtime.block_on(SqlitePool::connect(url)).map_err(|e| SqlError::Execution(e.to_string()))?;
            Ok(Connection { pool: Arc::new(pool), runtime })
        }
    }

    impl Executor for Connection {
        type Row = SqliteRow;

        fn exec(&mut self, sql: &str, args: &[Value]) -> Result<u64, SqlError> {
            let pool = self.pool.clone();
            let query = bind_query(sql, args);
            self.runtime.block_on(async move {
                query.execute(&*pool).await.map(|r| r.rows_affected()).map_err(|e| SqlError::Execution(e.to_string()))
            })
        }

        fn query_row(&mut self, sql: &str, args: &[Value]) -> Result<Self::Row, SqlError> {
            let pool = self.pool.clone();
            let query = bind_query(sql, args);
            self.runtime.block_on(async move { query.fetch_one(&*pool).await.map_err(|e| SqlError::Execution(e.to_string())) })
        }

        fn query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Self::Row>, SqlError> {
            let pool = self.pool.clone();
            let query = bind_query(sql, args);
            self.runtime.block_on(async move { query.fetch_all(&*pool).await.map_err(|e| SqlError::Execution(e.to_string())) })
        }
    }

    /// SQLite has no notion of multiple databases: `open` ignores `database`
    /// and connects straight to `url`.
    pub struct SqliteConnInit {
        pub url: String,
    }

    impl ConnInit for SqliteConnInit {
        type Handle = Connection;

        fn open(&self, _dialect: crate::dialect::Dialect, _database: Option<&str>) -> Result<Self::Handle, SqlError> {
            Connection::connect(&self.url)
        }
    }
}
