//! The `query` tool and the `table://` resources.

use crate::classify::{StatementKind, classify};
use crate::context::PgContext;
use async_trait::async_trait;
use serde_json::{Value, json};
use toolgate_mcp::{
    ParamSpec, Params, ResourceProvider, ToolDescriptor, ToolError, ToolHandler, UriMatch,
    ValidationError,
};

pub fn query_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "query",
        "Run one SQL statement. Read-only (SELECT, WITH, VALUES, TABLE, SHOW, EXPLAIN) unless \
         the server was started with DANGEROUSLY_ALLOW_WRITE_OPS=true.",
    )
    .param(
        ParamSpec::string("sql")
            .required()
            .non_empty()
            .describe("SQL statement, e.g. SELECT * FROM users LIMIT 10"),
    )
    // Writes depend on configuration, so the tool is not advertised as read-only.
    .side_effecting()
}

pub struct QueryTool;

#[async_trait]
impl ToolHandler<PgContext> for QueryTool {
    async fn call(&self, ctx: &PgContext, params: Params) -> Result<Value, ToolError> {
        let sql = params.str("sql").unwrap_or_default();
        let statement = classify(sql);

        match statement.kind {
            StatementKind::Empty => {
                return Err(ValidationError::field("sql", "contains no SQL statement").into());
            }
            StatementKind::Write if !ctx.allow_writes() => {
                tracing::warn!(statement = %statement.describe(), "write statement rejected");
                return Err(ToolError::WritesDisabled {
                    statement: statement.describe(),
                });
            }
            StatementKind::Write => {
                tracing::warn!(statement = %statement.describe(), "executing write statement");
            }
            StatementKind::Read => {
                tracing::debug!(statement = %statement.describe(), "executing read statement");
            }
        }

        let output = ctx.db().execute(sql).await.map_err(|e| {
            tracing::error!(error = %e, "query failed");
            ToolError::from(e)
        })?;

        let mut result = json!({
            "columns": output.columns,
            "rows": output.rows,
            "row_count": output.rows.len(),
        });
        if statement.is_write() {
            result["rows_affected"] = json!(output.rows_affected);
        }
        Ok(result)
    }
}

/// `table://` and `table://*`: every user table.
pub struct TableList;

#[async_trait]
impl ResourceProvider<PgContext> for TableList {
    async fn read(&self, ctx: &PgContext, _uri: &UriMatch) -> Result<Value, ToolError> {
        let tables = ctx.db().list_tables().await?;
        tracing::debug!(count = tables.len(), "listed tables");
        Ok(json!({ "tables": tables }))
    }
}

/// `table://{schema}/{table}`: columns, keys and indexes of one table.
pub struct TableDetail;

#[async_trait]
impl ResourceProvider<PgContext> for TableDetail {
    async fn read(&self, ctx: &PgContext, uri: &UriMatch) -> Result<Value, ToolError> {
        let schema = uri.require("schema")?;
        let table = uri.require("table")?;

        match ctx.db().describe_table(schema, table).await? {
            Some(structure) => serde_json::to_value(structure)
                .map_err(|e| ToolError::upstream(format!("cannot encode table structure: {}", e))),
            None => Err(ToolError::not_found(format!("table {}.{}", schema, table))),
        }
    }
}
