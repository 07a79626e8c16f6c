//! SQLite gateway: schema introspection and fault-capturing execution.
//!
//! Every call opens its own connection, so concurrent requests never share
//! transactional state. [`SqlGateway::execute`] never returns an error: any
//! failure (connection, syntax, constraint, missing table) comes back as the
//! `error` field of the [`QueryResult`].

use anyhow::{Context, Result};
use base64::Engine;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, ConnectOptions, Executor, Row, Statement, TypeInfo, ValueRef};
use std::path::{Path, PathBuf};

use crate::models::{QueryResult, Row as ResultRow};

#[derive(Debug, Clone)]
pub struct SqlGateway {
    db_path: PathBuf,
}

impl SqlGateway {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn connect(&self) -> Result<SqliteConnection, sqlx::Error> {
        SqliteConnectOptions::new()
            .filename(&self.db_path)
            .create_if_missing(false)
            .connect()
            .await
    }

    /// User tables in catalog order.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let mut conn = self
            .connect()
            .await
            .with_context(|| format!("Failed to open database: {}", self.db_path.display()))?;
        let tables = sqlx::query_scalar::<_, String>(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_all(&mut conn)
        .await?;
        Ok(tables)
    }

    /// `CREATE TABLE` statements for the named tables, or for every user
    /// table when `tables` is `None` or empty. Unknown names are skipped.
    pub async fn schema(&self, tables: Option<&[String]>) -> Result<String> {
        let names = match tables {
            Some(names) if !names.is_empty() => names.to_vec(),
            _ => self.list_tables().await?,
        };

        let mut conn = self
            .connect()
            .await
            .with_context(|| format!("Failed to open database: {}", self.db_path.display()))?;

        let mut statements = Vec::with_capacity(names.len());
        for name in &names {
            let ddl: Option<Option<String>> = sqlx::query_scalar(
                "SELECT sql FROM sqlite_master WHERE type='table' AND name = ?",
            )
            .bind(name)
            .fetch_optional(&mut conn)
            .await?;

            if let Some(Some(ddl)) = ddl {
                statements.push(format!("{};", ddl));
            }
        }

        Ok(statements.join("\n\n"))
    }

    /// Run one SQL text. `SELECT` statements return rows and column order;
    /// anything else runs in autocommit mode and returns nothing.
    pub async fn execute(&self, sql: &str) -> QueryResult {
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            return QueryResult::failed("empty SQL statement");
        }

        let mut conn = match self.connect().await {
            Ok(conn) => conn,
            Err(e) => return QueryResult::failed(error_message(e)),
        };

        let result = if is_select(trimmed) {
            fetch_rows(&mut conn, trimmed).await
        } else {
            conn.execute(sqlx::raw_sql(trimmed))
                .await
                .map(|_| QueryResult::default())
        };

        match result {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!(error = %e, "sql execution failed");
                QueryResult::failed(error_message(e))
            }
        }
    }
}

fn is_select(sql: &str) -> bool {
    sql.get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("select"))
}

async fn fetch_rows(conn: &mut SqliteConnection, sql: &str) -> Result<QueryResult, sqlx::Error> {
    let statement = (&mut *conn).prepare(sql).await?;
    let columns: Vec<String> = statement
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let rows = statement.query().fetch_all(&mut *conn).await?;
    let rows = rows.iter().map(|row| row_to_map(row, &columns)).collect();

    Ok(QueryResult {
        rows,
        columns,
        error: None,
    })
}

fn row_to_map(row: &SqliteRow, columns: &[String]) -> ResultRow {
    let mut map = ResultRow::new();
    for (index, name) in columns.iter().enumerate() {
        map.insert(name.clone(), decode_value(row, index));
    }
    map
}

fn decode_value(row: &SqliteRow, index: usize) -> Value {
    let Ok(raw) = row.try_get_raw(index) else {
        return Value::Null;
    };
    if raw.is_null() {
        return Value::Null;
    }

    let type_name = raw.type_info().name().to_string();
    match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => row
            .try_get::<i64, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "REAL" | "NUMERIC" => row
            .try_get::<f64, _>(index)
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(index)
            .map(|bytes| Value::String(base64::engine::general_purpose::STANDARD.encode(bytes)))
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<String, _>(index)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Database errors are reported with SQLite's own message (e.g.
/// `no such table: Foo`); everything else uses the sqlx description.
fn error_message(err: sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db) => db.message().to_string(),
        other => other.to_string(),
    }
}
