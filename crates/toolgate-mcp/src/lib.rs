//! # toolgate-mcp
//!
//! MCP (Model Context Protocol) plumbing shared by the toolgate servers.
//!
//! Each server is a thin translation layer between an AI assistant and one
//! upstream service. This crate owns everything that is not upstream-specific:
//!
//! - **Tool descriptors**: declared parameters, validated before a handler runs
//! - **Dispatch**: name lookup, validation, handler invocation
//! - **Resources**: URI pattern routing, exact before template before prefix
//! - **Transport**: line-delimited JSON-RPC over stdio
//!
//! ## Architecture
//!
//! ```text
//! AI Assistant
//!       │
//!       │ MCP (tools/call, resources/read)
//!       ▼
//! ┌──────────────────┐
//! │    McpServer     │
//! │  1. Route method │
//! │  2. Validate     │  ← ToolDescriptor
//! │  3. Dispatch     │  ← ToolHandler<C> / ResourceProvider<C>
//! │  4. Map errors   │  ← ToolError
//! └────────┬─────────┘
//!          │ &C (credential context)
//!          ▼
//!   GitHub API / PostgreSQL
//! ```

pub mod error;
pub mod protocol;
pub mod resources;
pub mod schema;
pub mod server;
pub mod tools;

pub use error::{ConfigError, ErrorKind, FieldViolation, McpError, ToolError, ValidationError};
pub use protocol::{JsonRpcRequest, JsonRpcResponse, ServerInfo, ToolDefinition};
pub use resources::{ResourceProvider, ResourceRouter, ResourceSpec, UriMatch, UriPattern};
pub use schema::{ParamKind, ParamSpec, Params, ToolDescriptor};
pub use server::McpServer;
pub use tools::{Dispatcher, ToolHandler, ToolRegistry};
