//! Error taxonomy for building and rendering statement trees.
//!
//! Hand-rolled `Display`/`Error` impls, no `thiserror`/`anyhow`, expanded
//! into the five
//! variants the rendering pipeline actually raises: a table/field shape
//! problem (`Schema`), a tree-shape problem such as an unjoinable batch or a
//! missing ancestor (`Shape`), a dialect that can't express a construct
//! (`Dialect`), a malformed function-template/argument-count problem
//! (`Argument`), and an executor-level failure (`Execution`).

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SqlError {
    Schema(String),
    Shape(String),
    Dialect(String),
    Argument(String),
    Execution(String),
}

impl fmt::Display for SqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlError::Schema(msg) => write!(f, "schema error: {msg}"),
            SqlError::Shape(msg) => write!(f, "statement shape error: {msg}"),
            SqlError::Dialect(msg) => write!(f, "dialect error: {msg}"),
            SqlError::Argument(msg) => write!(f, "argument error: {msg}"),
            SqlError::Execution(msg) => write!(f, "execution error: {msg}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_by_variant() {
        assert_eq!(SqlError::Schema("x".into()).to_string(), "schema error: x");
        assert_eq!(SqlError::Argument("y".into()).to_string(), "argument error: y");
    }
}
