//! # toolgate-pg
//!
//! PostgreSQL over MCP: one `query` tool guarded by a statement classifier,
//! plus `table://` resources describing the schema.
//!
//! Writes are refused unless the server was started with
//! `DANGEROUSLY_ALLOW_WRITE_OPS=true`; a refused statement never reaches the
//! database.

pub mod classify;
pub mod config;
pub mod context;
pub mod database;
pub mod decode;
pub mod handlers;
pub mod introspect;

pub use classify::{Statement, StatementKind, classify};
pub use config::PostgresConfig;
pub use context::PgContext;
pub use database::{Database, PgDatabase, PgError, QueryOutput};
pub use introspect::{TableRef, TableStructure};

use std::sync::Arc;
use toolgate_mcp::{
    Dispatcher, McpError, McpServer, ResourceRouter, ResourceSpec, ServerInfo, ToolRegistry,
};

pub const SERVER_NAME: &str = "postgres-mcp-server";

pub fn tools() -> Result<ToolRegistry<PgContext>, McpError> {
    let mut registry = ToolRegistry::new();
    registry.register(handlers::query_descriptor(), Arc::new(handlers::QueryTool))?;
    Ok(registry)
}

pub fn resources() -> ResourceRouter<PgContext> {
    let mut router = ResourceRouter::new();
    let list = Arc::new(handlers::TableList);
    router.register(
        ResourceSpec::exact("table://", "Tables", "All user tables (schema, name, qualified_name)"),
        list.clone(),
    );
    router.register(
        ResourceSpec::exact("table://*", "Tables", "All user tables").hidden(),
        list,
    );
    router.register(
        ResourceSpec::template(
            "table://{schema}/{table}",
            "Table structure",
            "Columns, primary key, foreign keys and indexes of one table",
        ),
        Arc::new(handlers::TableDetail),
    );
    router
}

/// Assemble the server around an already-connected context.
pub fn server(ctx: PgContext) -> Result<McpServer<PgContext>, McpError> {
    let mode = if ctx.allow_writes() {
        "Writes are ENABLED."
    } else {
        "Read-only: write statements are rejected."
    };
    let server = McpServer::new(
        ServerInfo::new(SERVER_NAME, env!("CARGO_PKG_VERSION")),
        Dispatcher::new(Arc::new(ctx), tools()?),
        resources(),
    )
    .with_instructions(format!(
        "Use the query tool to run SQL and read table:// resources for schema. {}",
        mode
    ));
    Ok(server)
}
