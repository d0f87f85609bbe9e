//! The database seam and its PostgreSQL implementation.

use crate::config::PostgresConfig;
use crate::decode;
use crate::introspect::{self, TableRef, TableStructure};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Column, Executor, PgPool, Statement};
use std::time::Duration;
use thiserror::Error;
use toolgate_mcp::{ConfigError, ToolError};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    /// Result columns in statement order. Empty for commands without output.
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    /// Rows touched by a command, or rows returned when the statement has
    /// output (`RETURNING`).
    pub rows_affected: u64,
}

#[derive(Debug, Error)]
pub enum PgError {
    /// Error raised by the server, message verbatim.
    #[error("{0}")]
    Database(String),

    #[error("connection unavailable: {0}")]
    Connection(String),
}

impl From<sqlx::Error> for PgError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(db) => PgError::Database(db.message().to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                PgError::Connection(e.to_string())
            }
            other => PgError::Database(other.to_string()),
        }
    }
}

impl From<PgError> for ToolError {
    fn from(e: PgError) -> Self {
        ToolError::Upstream(e.to_string())
    }
}

/// Everything the handlers need from the database.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run one statement exactly as given.
    async fn execute(&self, sql: &str) -> Result<QueryOutput, PgError>;

    async fn list_tables(&self) -> Result<Vec<TableRef>, PgError>;

    async fn describe_table(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Option<TableStructure>, PgError>;
}

/// [`Database`] over a bounded `sqlx` pool.
///
/// Every call checks out one connection and returns it when the guard drops,
/// which also happens when the calling future is cancelled.
#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Open the pool and prove the credentials with `SELECT 1`.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, ConfigError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections())
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(config.database_url())
            .await
            .map_err(startup_error)?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(startup_error)?;

        tracing::info!(
            max_connections = config.max_connections(),
            "Connected to PostgreSQL"
        );
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn startup_error(e: sqlx::Error) -> ConfigError {
    if let sqlx::Error::Database(db) = &e {
        // 28000 invalid_authorization_specification, 28P01 invalid_password
        if matches!(db.code().as_deref(), Some("28000") | Some("28P01")) {
            return ConfigError::CredentialRejected(db.message().to_string());
        }
    }
    ConfigError::Unreachable(e.to_string())
}

#[async_trait]
impl Database for PgDatabase {
    async fn execute(&self, sql: &str) -> Result<QueryOutput, PgError> {
        let mut conn = self.pool.acquire().await?;

        // Preparing first gives the column list even when no rows come back.
        let statement = (&mut *conn).prepare(sql).await?;
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        if columns.is_empty() {
            let done = statement.query().execute(&mut *conn).await?;
            return Ok(QueryOutput {
                columns,
                rows: Vec::new(),
                rows_affected: done.rows_affected(),
            });
        }

        let rows = statement.query().fetch_all(&mut *conn).await?;
        let rows: Vec<Map<String, Value>> = rows.iter().map(decode::row_to_map).collect();
        Ok(QueryOutput {
            rows_affected: rows.len() as u64,
            columns,
            rows,
        })
    }

    async fn list_tables(&self) -> Result<Vec<TableRef>, PgError> {
        let mut conn = self.pool.acquire().await?;
        Ok(introspect::list_tables(&mut conn).await?)
    }

    async fn describe_table(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Option<TableStructure>, PgError> {
        let mut conn = self.pool.acquire().await?;
        Ok(introspect::describe_table(&mut conn, schema, table).await?)
    }
}
