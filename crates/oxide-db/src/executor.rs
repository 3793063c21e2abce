//! Statement execution.
//!
//! Every statement goes through [`Connection::execute`]: prepare, check and
//! bind the parameters, execute, then fold the driver's result stream into
//! one [`PreparedResult`]. The narrow helpers (`select`, `insert`, `update`,
//! `delete`) each pick the part of the result they care about.
//!
//! Columns are decoded from the backend's native rows. Integer, float and
//! binary columns keep their type; dates, times, decimals and everything
//! else the backend reports as text come back as [`Value::Text`].

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use futures::TryStreamExt;
use sqlx::mysql::{MySql, MySqlArguments, MySqlQueryResult, MySqlRow};
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteQueryResult, SqliteRow};
use sqlx::{
    Arguments, Column, Database, Decode, Either, Encode, Executor, Row as _, Statement, Type,
    TypeInfo, ValueRef,
};
use tracing::debug;

use crate::connection::{Connection, Handle};
use crate::error::{Result, StatementError};
use crate::value::{normalize_text, wire_types, Row, Value, WireType};

/// Everything a statement produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedResult {
    /// Fetched rows, columns in the order the driver reported them.
    pub rows: Vec<Row>,
    /// Rows changed by the statement.
    pub rows_affected: u64,
    /// Identifier generated by an insert, when there was one.
    pub last_insert_id: Option<i64>,
}

/// Prepares, checks, binds and runs one statement on a native connection.
///
/// The body is identical for every backend; only the argument buffer, the
/// row decoder and the way the generated id is reported differ.
macro_rules! run_prepared {
    ($conn:expr, $query:expr, $params:expr, $args:ty, $decode:path, $insert_id:path) => {{
        let conn = $conn;
        let query: &str = $query;
        let params: &[Value] = $params;

        let statement = (&mut *conn)
            .prepare(query)
            .await
            .map_err(|source| StatementError::PrepareFailed {
                query: query.to_string(),
                source,
            })?;

        let expected = match statement.parameters() {
            Some(Either::Left(types)) => Some(types.len()),
            Some(Either::Right(count)) => Some(count),
            None => None,
        };
        if let Some(expected) = expected {
            if expected != params.len() {
                return Err(StatementError::BindFailed {
                    query: query.to_string(),
                    message: format!("expected {expected} parameters, got {}", params.len()),
                }
                .into());
            }
        }

        let mut args = <$args>::default();
        bind(&mut args, params).map_err(|message| StatementError::BindFailed {
            query: query.to_string(),
            message,
        })?;

        let exec_failed = |source: sqlx::Error| StatementError::ExecFailed {
            query: query.to_string(),
            source,
        };

        let mut result = PreparedResult::default();
        let mut stream = (&mut *conn).fetch_many(statement.query_with(args));
        while let Some(step) = stream.try_next().await.map_err(exec_failed)? {
            match step {
                Either::Left(done) => {
                    result.rows_affected += done.rows_affected();
                    if let Some(id) = $insert_id(&done) {
                        result.last_insert_id = Some(id);
                    }
                }
                Either::Right(row) => result.rows.push(decode_row(&row, $decode).map_err(exec_failed)?),
            }
        }
        result
    }};
}

impl Connection {
    /// Prepares, binds and executes one statement.
    ///
    /// # Errors
    ///
    /// `NotConnected` without a handle, `PrepareFailed` when the backend
    /// rejects the query text, `BindFailed` when the parameters do not fit
    /// the statement and `ExecFailed` when execution or decoding fails.
    pub async fn execute(&mut self, query: &str, params: &[Value]) -> Result<PreparedResult> {
        let tags: String = wire_types(params).into_iter().map(WireType::tag).collect();
        debug!(sql = %query, types = %tags, "Executing SQL");

        let result = match self.handle_mut()? {
            Handle::MySql(conn) => run_prepared!(
                conn,
                query,
                params,
                MySqlArguments,
                decode_mysql,
                mysql_insert_id
            ),
            Handle::Sqlite(conn) => run_prepared!(
                conn,
                query,
                params,
                SqliteArguments<'_>,
                decode_sqlite,
                sqlite_insert_id
            ),
        };
        Ok(result)
    }

    /// Runs a query and returns its rows.
    ///
    /// # Errors
    ///
    /// See [`Connection::execute`].
    pub async fn select(&mut self, query: &str, params: &[Value]) -> Result<Vec<Row>> {
        Ok(self.execute(query, params).await?.rows)
    }

    /// Runs an insert and returns the generated identifier, 0 when the table
    /// has none.
    ///
    /// # Errors
    ///
    /// See [`Connection::execute`].
    pub async fn insert(&mut self, query: &str, params: &[Value]) -> Result<i64> {
        Ok(self
            .execute(query, params)
            .await?
            .last_insert_id
            .unwrap_or(0))
    }

    /// Runs an update and returns the number of changed rows. Zero is not an
    /// error.
    ///
    /// # Errors
    ///
    /// See [`Connection::execute`].
    pub async fn update(&mut self, query: &str, params: &[Value]) -> Result<u64> {
        Ok(self.execute(query, params).await?.rows_affected)
    }

    /// Runs a delete and returns the number of removed rows.
    ///
    /// # Errors
    ///
    /// See [`Connection::execute`].
    pub async fn delete(&mut self, query: &str, params: &[Value]) -> Result<u64> {
        self.update(query, params).await
    }

    /// Runs a multi-statement script without parameters, draining every
    /// result set. Returns the total number of affected rows.
    ///
    /// # Errors
    ///
    /// `NotConnected` without a handle, `ExecFailed` when any statement of
    /// the script fails.
    pub async fn execute_script(&mut self, script: &str) -> Result<u64> {
        let handle = self.handle_mut()?;
        debug!(bytes = script.len(), "Executing SQL script");
        let affected = handle
            .run_raw(script)
            .await
            .map_err(|source| StatementError::ExecFailed {
                query: preview(script),
                source,
            })?;
        Ok(affected)
    }
}

fn bind<'q, DB, A>(args: &mut A, params: &[Value]) -> std::result::Result<(), String>
where
    DB: Database,
    A: Arguments<'q, Database = DB>,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    String: Encode<'q, DB> + Type<DB>,
    Option<String>: Encode<'q, DB> + Type<DB>,
    Vec<u8>: Encode<'q, DB> + Type<DB>,
{
    for (index, param) in params.iter().enumerate() {
        let added = match param {
            Value::Null => args.add(Option::<String>::None),
            Value::Int(i) => args.add(*i),
            Value::Float(f) => args.add(*f),
            Value::Text(s) => args.add(normalize_text(s).to_string()),
            Value::Blob(b) => args.add(b.clone()),
        };
        added.map_err(|err| format!("parameter {}: {err}", index + 1))?;
    }
    Ok(())
}

fn mysql_insert_id(done: &MySqlQueryResult) -> Option<i64> {
    i64::try_from(done.last_insert_id()).ok().filter(|id| *id != 0)
}

fn sqlite_insert_id(done: &SqliteQueryResult) -> Option<i64> {
    Some(done.last_insert_rowid()).filter(|id| *id != 0)
}

fn decode_row<R: sqlx::Row>(
    row: &R,
    decode: fn(&R, usize) -> std::result::Result<Value, sqlx::Error>,
) -> std::result::Result<Row, sqlx::Error> {
    row.columns()
        .iter()
        .map(|column| {
            let value = decode(row, column.ordinal())?;
            Ok((column.name().to_string(), value))
        })
        .collect()
}

fn decode_as<'r, DB, T>(raw: DB::ValueRef<'r>) -> std::result::Result<T, sqlx::Error>
where
    DB: Database,
    T: Decode<'r, DB>,
{
    T::decode(raw).map_err(sqlx::Error::Decode)
}

/// SQLite values are decoded by their storage class.
fn decode_sqlite(row: &SqliteRow, index: usize) -> std::result::Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let kind = raw.type_info().name().to_string();
    let value = match kind.as_str() {
        "INTEGER" | "BOOLEAN" => Value::Int(decode_as::<Sqlite, i64>(raw)?),
        "REAL" => Value::Float(decode_as::<Sqlite, f64>(raw)?),
        "BLOB" => Value::Blob(decode_as::<Sqlite, Vec<u8>>(raw)?),
        _ => Value::Text(decode_as::<Sqlite, String>(raw)?),
    };
    Ok(value)
}

/// MySQL values are decoded by the column type the server reports.
fn decode_mysql(row: &MySqlRow, index: usize) -> std::result::Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let kind = raw.type_info().name().to_string();
    let value = match kind.as_str() {
        "BOOLEAN" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            Value::Int(decode_as::<MySql, i64>(raw)?)
        }
        unsigned if unsigned.ends_with(" UNSIGNED") => {
            let n = decode_as::<MySql, u64>(raw)?;
            i64::try_from(n).map_or_else(|_| Value::Text(n.to_string()), Value::Int)
        }
        "FLOAT" => Value::from(decode_as::<MySql, f32>(raw)?),
        "DOUBLE" => Value::Float(decode_as::<MySql, f64>(raw)?),
        "DATE" => Value::Text(decode_as::<MySql, NaiveDate>(raw)?.to_string()),
        "DATETIME" | "TIMESTAMP" => Value::Text(
            decode_as::<MySql, NaiveDateTime>(raw)?
                .format("%Y-%m-%d %H:%M:%S%.f")
                .to_string(),
        ),
        "TIME" => Value::Text(decode_as::<MySql, NaiveTime>(raw)?.to_string()),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => Value::Blob(decode_as::<MySql, Vec<u8>>(raw)?),
        _ => Value::text_from_bytes(decode_as::<MySql, Vec<u8>>(raw)?),
    };
    Ok(value)
}

/// Leading part of a script, for error messages.
fn preview(script: &str) -> String {
    const MAX: usize = 80;
    let trimmed = script.trim();
    match trimmed.char_indices().nth(MAX) {
        Some((end, _)) => format!("{}...", &trimmed[..end]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::error::{ConnectionError, Error};

    async fn create_test_connection() -> Connection {
        let mut conn = Connection::new(DatabaseConfig::sqlite(":memory:"));
        conn.connect().await.unwrap();
        conn.execute(
            "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, score REAL, avatar BLOB)",
            &[],
        )
        .await
        .unwrap();
        conn
    }

    #[tokio::test]
    async fn test_execute_requires_connection() {
        let mut conn = Connection::new(DatabaseConfig::sqlite(":memory:"));
        assert!(matches!(
            conn.execute("SELECT 1", &[]).await,
            Err(Error::Connection(ConnectionError::NotConnected))
        ));
    }

    #[tokio::test]
    async fn test_invalid_query_fails_to_prepare() {
        let mut conn = create_test_connection().await;

        let err = conn.execute("SELEKT * FROM nowhere", &[]).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Statement(StatementError::PrepareFailed { .. })
        ));
        assert!(conn.is_connected());
    }

    #[tokio::test]
    async fn test_insert_returns_generated_id() {
        let mut conn = create_test_connection().await;

        let first = conn
            .insert(
                "INSERT INTO users (name, score) VALUES (?, ?)",
                &["alice".into(), 2.5.into()],
            )
            .await
            .unwrap();
        let second = conn
            .insert("INSERT INTO users (name) VALUES (?)", &["bob".into()])
            .await
            .unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[tokio::test]
    async fn test_update_and_delete_counts() {
        let mut conn = create_test_connection().await;
        conn.insert("INSERT INTO users (name) VALUES (?)", &["alice".into()])
            .await
            .unwrap();

        let none = conn
            .update("UPDATE users SET name = ? WHERE id = ?", &["x".into(), 42.into()])
            .await
            .unwrap();
        assert_eq!(none, 0);

        let one = conn
            .update("UPDATE users SET name = ? WHERE id = ?", &["carol".into(), 1.into()])
            .await
            .unwrap();
        assert_eq!(one, 1);

        assert_eq!(conn.delete("DELETE FROM users", &[]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_select_preserves_column_order_and_types() {
        let mut conn = create_test_connection().await;
        conn.insert(
            "INSERT INTO users (name, score, avatar) VALUES (?, ?, ?)",
            &["\u{FEFF}alice".into(), Value::Null, vec![0xCAu8, 0xFE].into()],
        )
        .await
        .unwrap();

        let rows = conn
            .select("SELECT avatar, name, id, score FROM users", &[])
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(
            row.columns().collect::<Vec<_>>(),
            vec!["avatar", "name", "id", "score"]
        );
        assert_eq!(row.get("avatar"), Some(&Value::Blob(vec![0xCA, 0xFE])));
        assert_eq!(row.get("name"), Some(&Value::from("alice")));
        assert_eq!(row.get("id"), Some(&Value::Int(1)));
        assert_eq!(row.get("score"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_parameter_count_mismatch() {
        let mut conn = create_test_connection().await;

        let err = conn
            .execute("INSERT INTO users (name) VALUES (?)", &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Statement(StatementError::BindFailed { ref message, .. })
                if message == "expected 1 parameters, got 0"
        ));

        let err = conn
            .execute("SELECT id FROM users WHERE id = ?", &[1.into(), 2.into()])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Statement(StatementError::BindFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_select_boolean_and_datetime_columns() {
        let mut conn = create_test_connection().await;
        conn.execute_script(
            "CREATE TABLE events (id INTEGER PRIMARY KEY, active BOOLEAN NOT NULL, happened_at DATETIME, due DATE);\n\
             INSERT INTO events (id, active, happened_at, due) VALUES (1, TRUE, '2024-05-01 10:30:00', '2024-06-01');\n\
             INSERT INTO events (id, active, happened_at, due) VALUES (2, FALSE, NULL, NULL);",
        )
        .await
        .unwrap();

        let rows = conn
            .select("SELECT * FROM events ORDER BY id", &[])
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("active"), Some(&Value::Int(1)));
        assert_eq!(
            rows[0].get("happened_at"),
            Some(&Value::from("2024-05-01 10:30:00"))
        );
        assert_eq!(rows[0].get("due"), Some(&Value::from("2024-06-01")));
        assert_eq!(rows[1].get("active"), Some(&Value::Int(0)));
        assert_eq!(rows[1].get("happened_at"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_execute_script() {
        let mut conn = create_test_connection().await;

        conn.execute_script(
            "INSERT INTO users (name) VALUES ('a');\n\
             INSERT INTO users (name) VALUES ('b');\n\
             UPDATE users SET score = 1;",
        )
        .await
        .unwrap();

        let rows = conn.select("SELECT score FROM users", &[]).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.get("score") == Some(&Value::Float(1.0))));
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(200);
        assert_eq!(preview(&long).len(), 83);
        assert_eq!(preview("  SELECT 1  "), "SELECT 1");
    }
}
