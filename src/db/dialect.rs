//! SQL differences between the supported backends

use super::Value;
use crate::datasource::DataSourceKind;

/// SQL dialect of a connected backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    MySql,
    Postgres,
}

impl From<DataSourceKind> for Dialect {
    fn from(kind: DataSourceKind) -> Self {
        match kind {
            DataSourceKind::Sqlite => Dialect::Sqlite,
            DataSourceKind::MySql => Dialect::MySql,
            DataSourceKind::PostgreSql => Dialect::Postgres,
        }
    }
}

impl Dialect {
    /// Bind parameter marker for the 1-based `index`
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::Sqlite | Dialect::MySql => "?".to_string(),
        }
    }

    /// Bind parameter marker used where the backend expects a 32-bit integer
    pub fn int_placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}::int", index),
            Dialect::Sqlite | Dialect::MySql => "?".to_string(),
        }
    }

    /// Expression appending `suffix` to the text in `column`
    pub fn concat(&self, column: &str, suffix: &str) -> String {
        match self {
            Dialect::MySql => format!("CONCAT({}, {})", column, suffix),
            Dialect::Sqlite | Dialect::Postgres => format!("{} || {}", column, suffix),
        }
    }

    /// Expression yielding the length of `column` in characters
    pub fn char_length(&self, column: &str) -> String {
        match self {
            Dialect::MySql => format!("CHAR_LENGTH({})", column),
            Dialect::Sqlite | Dialect::Postgres => format!("length({})", column),
        }
    }

    /// Column type for large text values
    pub fn clob_type(&self) -> &'static str {
        match self {
            Dialect::MySql => "MEDIUMTEXT",
            Dialect::Sqlite | Dialect::Postgres => "TEXT",
        }
    }

    /// Column type for short text values
    pub fn varchar_type(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "TEXT",
            Dialect::MySql | Dialect::Postgres => "VARCHAR(32)",
        }
    }

    /// Marker for `value` in generated SQL
    ///
    /// NULL is written as a literal so the backend infers the column type;
    /// anything else takes the placeholder numbered `next`, which then advances.
    pub fn value_marker(&self, value: &Value, next: &mut usize) -> String {
        if value.is_null() {
            return "NULL".to_string();
        }
        let marker = self.placeholder(*next);
        *next += 1;
        marker
    }

    /// Predicate matching a row by its key, joined with `AND`
    ///
    /// NULL key values compare with `IS NULL`. Placeholders are numbered from `next`.
    pub fn key_predicate(&self, columns: &[&str], key: &[Value], next: &mut usize) -> String {
        columns
            .iter()
            .zip(key)
            .map(|(column, value)| {
                if value.is_null() {
                    format!("{} IS NULL", column)
                } else {
                    format!("{} = {}", column, self.value_marker(value, next))
                }
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}
