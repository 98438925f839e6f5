//! SQLite-backed schema provider and query executor.

use super::{QueryExecutor, SchemaProvider};
use crate::errors::{AskflowError, ExecutionError};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, TypeInfo, ValueRef};
use std::fmt::Write as _;
use std::str::FromStr;
use tracing::{debug, info};

const MAX_SAMPLE_CHARS: usize = 100;

/// One rendered column value.
enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(usize),
}

impl Cell {
    fn read(row: &SqliteRow, index: usize) -> Result<Self, sqlx::Error> {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(Self::Null);
        }
        let type_name = raw.type_info().name().to_ascii_uppercase();
        Ok(match type_name.as_str() {
            "INTEGER" | "BOOLEAN" => Self::Integer(row.try_get_unchecked(index)?),
            "REAL" | "NUMERIC" => Self::Real(row.try_get_unchecked(index)?),
            "BLOB" => Self::Blob(row.try_get_unchecked::<Vec<u8>, _>(index)?.len()),
            _ => Self::Text(row.try_get_unchecked(index)?),
        })
    }

    /// Python `repr` style, as used inside result tuples.
    fn repr(&self) -> String {
        match self {
            Self::Null => "None".to_string(),
            Self::Integer(v) => v.to_string(),
            Self::Real(v) => format!("{v:?}"),
            Self::Text(v) => quote(v),
            Self::Blob(len) => format!("<{len} bytes>"),
        }
    }

    /// Python `str` style, as used in sample rows.
    fn plain(&self) -> String {
        match self {
            Self::Text(v) => v.clone(),
            other => other.repr(),
        }
    }
}

fn quote(text: &str) -> String {
    let delimiter = if text.contains('\'') && !text.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(text.len() + 2);
    out.push(delimiter);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if c == delimiter => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(delimiter);
    out
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Renders rows as a Python-like list of tuples: `[(1, 'a'), (2, 'b')]`.
fn render_rows(rows: &[SqliteRow]) -> Result<String, sqlx::Error> {
    if rows.is_empty() {
        return Ok(String::new());
    }
    let mut out = String::from("[");
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let cells = (0..row.columns().len())
            .map(|index| Cell::read(row, index).map(|cell| cell.repr()))
            .collect::<Result<Vec<_>, _>>()?;
        out.push('(');
        out.push_str(&cells.join(", "));
        if cells.len() == 1 {
            out.push(',');
        }
        out.push(')');
    }
    out.push(']');
    Ok(out)
}

/// A SQLite database reachable through a `sqlx` pool.
///
/// Serves both as the SQL pipeline's [`SchemaProvider`] and its
/// [`QueryExecutor`].
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
    sample_rows: usize,
}

impl SqliteDatabase {
    /// Opens a database from a URL such as `sqlite://chinook.db`.
    pub async fn connect(url: &str) -> Result<Self, AskflowError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AskflowError::config(format!("invalid SQLite URL '{url}': {e}")))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| AskflowError::config(format!("failed to open '{url}': {e}")))?;
        info!(url = %url, "SQLite database opened");
        Ok(Self::from_pool(pool))
    }

    /// Wraps an existing pool.
    #[must_use]
    pub const fn from_pool(pool: SqlitePool) -> Self {
        Self { pool, sample_rows: 0 }
    }

    /// Appends `count` sample rows per table to the schema description.
    #[must_use]
    pub fn with_sample_rows(mut self, count: usize) -> Self {
        self.sample_rows = count;
        self
    }

    /// Returns the pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn table_info(&self, table: &str, create_sql: &str) -> Result<String, sqlx::Error> {
        let mut info = create_sql.trim_end().to_string();
        if self.sample_rows == 0 {
            return Ok(info);
        }

        let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?1)")
            .bind(table)
            .fetch_all(&self.pool)
            .await?;
        let sql = format!("SELECT * FROM {} LIMIT {}", quote_ident(table), self.sample_rows);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut samples = Vec::with_capacity(rows.len());
        for row in &rows {
            let cells = (0..row.columns().len())
                .map(|index| {
                    Cell::read(row, index).map(|cell| cell.plain().chars().take(MAX_SAMPLE_CHARS).collect::<String>())
                })
                .collect::<Result<Vec<_>, _>>()?;
            samples.push(cells.join("\t"));
        }

        let _ = write!(
            info,
            "\n\n/*\n{} rows from {} table:\n{}\n{}\n*/",
            self.sample_rows,
            table,
            columns.join("\t"),
            samples.join("\n")
        );
        Ok(info)
    }
}

#[async_trait]
impl SchemaProvider for SqliteDatabase {
    async fn get_schema(&self) -> Result<String, AskflowError> {
        let tables: Vec<(String, String)> = sqlx::query_as(
            "SELECT name, sql FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND sql IS NOT NULL \
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AskflowError::schema(format!("failed to list tables: {e}")))?;

        let mut parts = Vec::with_capacity(tables.len());
        for (name, sql) in &tables {
            let info = self
                .table_info(name, sql)
                .await
                .map_err(|e| AskflowError::schema(format!("failed to describe table '{name}': {e}")))?;
            parts.push(info);
        }
        debug!(tables = tables.len(), "Built schema description");
        Ok(parts.join("\n\n"))
    }
}

#[async_trait]
impl QueryExecutor for SqliteDatabase {
    async fn execute(&self, query: &str) -> Result<String, AskflowError> {
        debug!(query = %query, "Executing SQL");
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ExecutionError::new(query, e.to_string()))?;
        render_rows(&rows).map_err(|e| ExecutionError::new(query, e.to_string()).into())
    }
}
