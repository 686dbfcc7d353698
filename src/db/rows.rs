//! Parameter binding and row decoding.
//!
//! Sessions speak JSON at their surface: positional parameters go in as
//! [`SqlParam`] values and rows come back as `serde_json::Value` objects
//! keyed by column name. Each driver gets its own bind helper and decoder
//! because the argument and row types differ per backend.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Postgres, Row, Sqlite, TypeInfo};

#[cfg(feature = "mysql")]
use sqlx::MySql;
#[cfg(feature = "mysql")]
use sqlx::mysql::MySqlRow;

/// A positional statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for SqlParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for SqlParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>;
type PgQuery<'q> = sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>;
#[cfg(feature = "mysql")]
type MySqlQuery<'q> = sqlx::query::Query<'q, MySql, sqlx::mysql::MySqlArguments>;

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite<'q>(query: SqliteQuery<'q>, param: &'q SqlParam) -> SqliteQuery<'q> {
    match param {
        SqlParam::Null => query.bind(None::<String>),
        SqlParam::Bool(v) => query.bind(*v),
        SqlParam::Int(v) => query.bind(*v),
        SqlParam::Float(v) => query.bind(*v),
        SqlParam::Text(v) => query.bind(v.as_str()),
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres<'q>(query: PgQuery<'q>, param: &'q SqlParam) -> PgQuery<'q> {
    match param {
        SqlParam::Null => query.bind(None::<String>),
        SqlParam::Bool(v) => query.bind(*v),
        SqlParam::Int(v) => query.bind(*v),
        SqlParam::Float(v) => query.bind(*v),
        SqlParam::Text(v) => query.bind(v.as_str()),
    }
}

/// Bind a parameter to a MySQL query.
#[cfg(feature = "mysql")]
pub(crate) fn bind_mysql<'q>(query: MySqlQuery<'q>, param: &'q SqlParam) -> MySqlQuery<'q> {
    match param {
        SqlParam::Null => query.bind(None::<String>),
        SqlParam::Bool(v) => query.bind(*v),
        SqlParam::Int(v) => query.bind(*v),
        SqlParam::Float(v) => query.bind(*v),
        SqlParam::Text(v) => query.bind(v.as_str()),
    }
}

/// Decode a SQLite row into a JSON object keyed by column name.
pub(crate) fn sqlite_row_to_json(row: &SqliteRow) -> JsonValue {
    let mut object = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        let type_name = column.type_info().name().to_ascii_uppercase();
        let value = match type_name.as_str() {
            name if name.contains("INT") => row
                .try_get::<Option<i64>, _>(i)
                .ok()
                .flatten()
                .map(JsonValue::from)
                .unwrap_or(JsonValue::Null),
            "REAL" | "NUMERIC" | "FLOAT" | "DOUBLE" => row
                .try_get::<Option<f64>, _>(i)
                .ok()
                .flatten()
                .map(JsonValue::from)
                .unwrap_or(JsonValue::Null),
            "BOOLEAN" => row
                .try_get::<Option<bool>, _>(i)
                .ok()
                .flatten()
                .map(JsonValue::from)
                .unwrap_or(JsonValue::Null),
            // BLOB columns are not served by the session surface
            "BLOB" => JsonValue::Null,
            _ => sqlite_text_or_null(row, i),
        };
        object.insert(column.name().to_string(), value);
    }
    JsonValue::Object(object)
}

/// Decode a text-ish SQLite value, falling back through the storage classes.
fn sqlite_text_or_null(row: &SqliteRow, i: usize) -> JsonValue {
    if let Ok(v) = row.try_get::<Option<String>, _>(i) {
        return v.map(JsonValue::String).unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
        return v.map(JsonValue::from).unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
        return v.map(JsonValue::from).unwrap_or(JsonValue::Null);
    }
    JsonValue::Null
}

/// Decode a PostgreSQL row into a JSON object keyed by column name.
pub(crate) fn pg_row_to_json(row: &PgRow) -> JsonValue {
    let mut object = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = match column.type_info().name() {
            "INT2" => row
                .try_get::<Option<i16>, _>(i)
                .ok()
                .flatten()
                .map(|v| JsonValue::from(i64::from(v)))
                .unwrap_or(JsonValue::Null),
            "INT4" => row
                .try_get::<Option<i32>, _>(i)
                .ok()
                .flatten()
                .map(|v| JsonValue::from(i64::from(v)))
                .unwrap_or(JsonValue::Null),
            "INT8" => row
                .try_get::<Option<i64>, _>(i)
                .ok()
                .flatten()
                .map(JsonValue::from)
                .unwrap_or(JsonValue::Null),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(i)
                .ok()
                .flatten()
                .map(|v| JsonValue::from(f64::from(v)))
                .unwrap_or(JsonValue::Null),
            "FLOAT8" => row
                .try_get::<Option<f64>, _>(i)
                .ok()
                .flatten()
                .map(JsonValue::from)
                .unwrap_or(JsonValue::Null),
            "BOOL" => row
                .try_get::<Option<bool>, _>(i)
                .ok()
                .flatten()
                .map(JsonValue::from)
                .unwrap_or(JsonValue::Null),
            _ => row
                .try_get::<Option<String>, _>(i)
                .ok()
                .flatten()
                .map(JsonValue::String)
                .unwrap_or(JsonValue::Null),
        };
        object.insert(column.name().to_string(), value);
    }
    JsonValue::Object(object)
}

/// Decode a MySQL row into a JSON object keyed by column name.
#[cfg(feature = "mysql")]
pub(crate) fn mysql_row_to_json(row: &MySqlRow) -> JsonValue {
    let mut object = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        let type_name = column.type_info().name().to_ascii_uppercase();
        let value = match type_name.as_str() {
            "BOOLEAN" => row
                .try_get::<Option<bool>, _>(i)
                .ok()
                .flatten()
                .map(JsonValue::from)
                .unwrap_or(JsonValue::Null),
            name if name.contains("INT") => row
                .try_get::<Option<i64>, _>(i)
                .ok()
                .flatten()
                .map(JsonValue::from)
                .unwrap_or(JsonValue::Null),
            "FLOAT" => row
                .try_get::<Option<f32>, _>(i)
                .ok()
                .flatten()
                .map(|v| JsonValue::from(f64::from(v)))
                .unwrap_or(JsonValue::Null),
            "DOUBLE" => row
                .try_get::<Option<f64>, _>(i)
                .ok()
                .flatten()
                .map(JsonValue::from)
                .unwrap_or(JsonValue::Null),
            _ => row
                .try_get::<Option<String>, _>(i)
                .ok()
                .flatten()
                .map(JsonValue::String)
                .unwrap_or(JsonValue::Null),
        };
        object.insert(column.name().to_string(), value);
    }
    JsonValue::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_from_conversions() {
        assert_eq!(SqlParam::from(7i64), SqlParam::Int(7));
        assert_eq!(SqlParam::from(true), SqlParam::Bool(true));
        assert_eq!(SqlParam::from("abc"), SqlParam::Text("abc".to_string()));
    }

    #[test]
    fn test_param_serde_untagged() {
        let params: Vec<SqlParam> = serde_json::from_str(r#"[null, 1, 2.5, "x", false]"#).unwrap();
        assert_eq!(
            params,
            vec![
                SqlParam::Null,
                SqlParam::Int(1),
                SqlParam::Float(2.5),
                SqlParam::Text("x".to_string()),
                SqlParam::Bool(false),
            ]
        );
    }
}
