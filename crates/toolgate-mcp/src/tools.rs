//! Tool registry and dispatch.
//!
//! The registry maps tool names to a [`ToolDescriptor`] and its handler. The
//! [`Dispatcher`] owns the process-wide credential context and passes it by
//! reference into every handler call; handlers never look up shared state on
//! their own.

use crate::error::{McpError, ToolError};
use crate::protocol::ToolDefinition;
use crate::schema::{Params, ToolDescriptor};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Performs exactly one upstream operation for one tool.
#[async_trait]
pub trait ToolHandler<C>: Send + Sync {
    async fn call(&self, ctx: &C, params: Params) -> Result<Value, ToolError>;
}

struct RegisteredTool<C> {
    descriptor: ToolDescriptor,
    handler: Arc<dyn ToolHandler<C>>,
}

impl<C> Clone for RegisteredTool<C> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            handler: self.handler.clone(),
        }
    }
}

/// Registry of available tools, in registration order.
pub struct ToolRegistry<C> {
    tools: Vec<RegisteredTool<C>>,
    index: HashMap<&'static str, usize>,
}

impl<C> Clone for ToolRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            tools: self.tools.clone(),
            index: self.index.clone(),
        }
    }
}

impl<C> Default for ToolRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> ToolRegistry<C> {
    /// Create a new empty tool registry.
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a tool. Names must be unique.
    pub fn register(
        &mut self,
        descriptor: ToolDescriptor,
        handler: Arc<dyn ToolHandler<C>>,
    ) -> Result<(), McpError> {
        if self.index.contains_key(descriptor.name) {
            return Err(McpError::Duplicate(format!("tool {}", descriptor.name)));
        }
        if let Some((param, reason)) = descriptor
            .params
            .iter()
            .find_map(|p| p.invalid_pattern.as_ref().map(|r| (p.name, r)))
        {
            return Err(McpError::StartupFailed(format!(
                "tool {} parameter {} has an invalid pattern {}",
                descriptor.name, param, reason
            )));
        }
        self.index.insert(descriptor.name, self.tools.len());
        self.tools.push(RegisteredTool {
            descriptor,
            handler,
        });
        Ok(())
    }

    /// Get a tool descriptor by name.
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.tools[i].descriptor)
    }

    fn entry(&self, name: &str) -> Option<&RegisteredTool<C>> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Check if a tool exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Protocol definitions of all tools, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.descriptor.definition()).collect()
    }

    /// Get tool names.
    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.descriptor.name).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Routes tool invocations: lookup, validation, then the handler.
pub struct Dispatcher<C> {
    context: Arc<C>,
    tools: ToolRegistry<C>,
}

impl<C> Dispatcher<C>
where
    C: Send + Sync + 'static,
{
    pub fn new(context: Arc<C>, tools: ToolRegistry<C>) -> Self {
        Self { context, tools }
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn tools(&self) -> &ToolRegistry<C> {
        &self.tools
    }

    /// Invoke a tool by name.
    ///
    /// Unknown names and invalid arguments are rejected before the handler
    /// runs. Handler failures are returned as-is; nothing is retried.
    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        let Some(tool) = self.tools.entry(name) else {
            tracing::debug!(tool = %name, "unknown tool requested");
            return Err(ToolError::UnknownTool {
                name: name.to_string(),
            });
        };

        let params = tool.descriptor.validate(&arguments).map_err(|e| {
            tracing::debug!(tool = %name, error = %e, "rejected arguments");
            ToolError::from(e)
        })?;

        let started = Instant::now();
        let result = tool.handler.call(&self.context, params).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => tracing::info!(tool = %name, elapsed_ms, "tool call succeeded"),
            Err(e) => tracing::warn!(
                tool = %name,
                kind = %e.kind(),
                elapsed_ms,
                error = %e,
                "tool call failed"
            ),
        }
        result
    }
}
