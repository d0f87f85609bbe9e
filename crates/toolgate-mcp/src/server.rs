//! MCP server implementation.
//!
//! Line-delimited JSON-RPC over stdin/stdout. Each request runs on its own
//! task so slow upstream calls do not block other invocations; all responses
//! go through a single writer task so frames never interleave.

use crate::error::{McpError, ToolError};
use crate::protocol::*;
use crate::resources::ResourceRouter;
use crate::tools::Dispatcher;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

struct InFlight {
    abort: AbortHandle,
    label: String,
}

type InFlightMap = Arc<Mutex<HashMap<String, InFlight>>>;

/// The MCP server.
pub struct McpServer<C> {
    info: ServerInfo,
    instructions: Option<String>,
    dispatcher: Dispatcher<C>,
    resources: ResourceRouter<C>,
}

impl<C> McpServer<C>
where
    C: Send + Sync + 'static,
{
    pub fn new(info: ServerInfo, dispatcher: Dispatcher<C>, resources: ResourceRouter<C>) -> Self {
        Self {
            info,
            instructions: None,
            dispatcher,
            resources,
        }
    }

    /// Usage hint returned to the host from `initialize`.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher<C> {
        &self.dispatcher
    }

    pub fn resources(&self) -> &ResourceRouter<C> {
        &self.resources
    }

    /// Serve on the process's stdin/stdout until stdin closes.
    pub async fn run_stdio(self: Arc<Self>) -> Result<(), McpError> {
        tracing::info!(
            server = %self.info.name,
            tools = self.dispatcher.tools().len(),
            resources = self.resources.len(),
            "Starting MCP server with stdio transport"
        );
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    /// Serve line-delimited JSON-RPC from `reader`, writing responses to
    /// `writer`. Returns once `reader` hits EOF and in-flight requests drain.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, mut writer: W) -> Result<(), McpError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<JsonRpcResponse>(64);

        let writer_task = tokio::spawn(async move {
            while let Some(response) = rx.recv().await {
                let mut line = serde_json::to_string(&response)?;
                line.push('\n');
                writer.write_all(line.as_bytes()).await?;
                writer.flush().await?;
            }
            Ok::<(), McpError>(())
        });

        let in_flight: InFlightMap = Arc::new(Mutex::new(HashMap::new()));
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping unparseable message");
                    let resp =
                        JsonRpcResponse::error(None, codes::PARSE_ERROR, format!("Parse error: {}", e));
                    if tx.send(resp).await.is_err() {
                        break;
                    }
                    continue;
                }
            };

            if request.method == "notifications/cancelled" {
                cancel(&in_flight, request.params);
                continue;
            }

            Self::spawn_request(&self, request, &tx, &in_flight);
        }

        tracing::info!("stdin closed; waiting for in-flight requests");
        drop(tx);
        match writer_task.await {
            Ok(result) => result,
            Err(e) => Err(McpError::TransportError(e.to_string())),
        }
    }

    fn spawn_request(
        server: &Arc<Self>,
        request: JsonRpcRequest,
        tx: &mpsc::Sender<JsonRpcResponse>,
        in_flight: &InFlightMap,
    ) {
        let key = request.id.as_ref().map(Value::to_string);
        let id = request.id.clone();
        let label = request_label(&request);

        // Hold the lock across spawn + insert so the watcher cannot remove
        // the entry before it exists.
        let mut guard = in_flight.lock().unwrap_or_else(|p| p.into_inner());

        let server = server.clone();
        let work = tokio::spawn(async move { server.handle_request(request).await });
        if let Some(k) = &key {
            guard.insert(
                k.clone(),
                InFlight {
                    abort: work.abort_handle(),
                    label: label.clone(),
                },
            );
        }
        drop(guard);

        let tx = tx.clone();
        let in_flight = in_flight.clone();
        tokio::spawn(async move {
            let outcome = work.await;
            if let Some(k) = &key {
                in_flight
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .remove(k);
            }
            let response = match outcome {
                Ok(response) => response,
                Err(e) if e.is_cancelled() => {
                    tracing::info!(request = %label, "request cancelled by host");
                    None
                }
                Err(e) => {
                    tracing::error!(request = %label, error = %e, "request handler panicked");
                    id.map(|id| {
                        JsonRpcResponse::error(
                            Some(id),
                            codes::INTERNAL_ERROR,
                            format!("internal error while handling {}", label),
                        )
                    })
                }
            };
            if let Some(response) = response {
                let _ = tx.send(response).await;
            }
        });
    }

    /// Handle one JSON-RPC message. Notifications yield no response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id.clone();

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                id,
                codes::INVALID_REQUEST,
                "jsonrpc must be \"2.0\"",
            ));
        }

        if request.is_notification() {
            tracing::debug!(method = %request.method, "notification");
            return None;
        }

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => self.handle_list_tools(id),
            "tools/call" => self.handle_call_tool(id, request.params).await,
            "resources/list" => self.handle_list_resources(id),
            "resources/templates/list" => self.handle_list_templates(id),
            "resources/read" => self.handle_read_resource(id, request.params).await,
            "shutdown" => self.handle_shutdown(id),
            _ => JsonRpcResponse::error(
                id,
                codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            ),
        };
        Some(response)
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        let mut result = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": self.info,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "subscribe": false, "listChanged": false }
            }
        });
        if let Some(instructions) = &self.instructions {
            result["instructions"] = json!(instructions);
        }
        JsonRpcResponse::success(id, result)
    }

    fn handle_list_tools(&self, id: Option<Value>) -> JsonRpcResponse {
        let tools = self.dispatcher.tools().definitions();
        to_response(id, &json!({ "tools": tools }))
    }

    async fn handle_call_tool(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: CallToolParams = match parse_params(params) {
            Ok(p) => p,
            Err(message) => return JsonRpcResponse::error(id, codes::INVALID_PARAMS, message),
        };

        match self.dispatcher.invoke(&params.name, params.arguments).await {
            Ok(payload) => to_response(id, &CallToolResponse::success(payload)),
            Err(e @ ToolError::UnknownTool { .. }) => JsonRpcResponse::error_with_data(
                id,
                codes::INVALID_PARAMS,
                format!("Tool not found: {}", params.name),
                Some(e.to_payload()),
            ),
            Err(e) => to_response(id, &CallToolResponse::failure(e.to_payload())),
        }
    }

    fn handle_list_resources(&self, id: Option<Value>) -> JsonRpcResponse {
        to_response(id, &json!({ "resources": self.resources.definitions() }))
    }

    fn handle_list_templates(&self, id: Option<Value>) -> JsonRpcResponse {
        to_response(id, &json!({ "resourceTemplates": self.resources.templates() }))
    }

    async fn handle_read_resource(
        &self,
        id: Option<Value>,
        params: Option<Value>,
    ) -> JsonRpcResponse {
        let params: ReadResourceParams = match parse_params(params) {
            Ok(p) => p,
            Err(message) => return JsonRpcResponse::error(id, codes::INVALID_PARAMS, message),
        };

        match self
            .resources
            .read(self.dispatcher.context(), &params.uri)
            .await
        {
            Ok(value) => {
                let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
                let contents = ResourceContents {
                    uri: params.uri,
                    mime_type: "application/json".to_string(),
                    text,
                };
                to_response(id, &json!({ "contents": [contents] }))
            }
            Err(e) => {
                let code = match &e {
                    ToolError::UnknownResource { .. } | ToolError::NotFound(_) => {
                        codes::RESOURCE_NOT_FOUND
                    }
                    ToolError::Validation(_) => codes::INVALID_PARAMS,
                    _ => codes::INTERNAL_ERROR,
                };
                JsonRpcResponse::error_with_data(id, code, e.to_string(), Some(e.to_payload()))
            }
        }
    }

    fn handle_shutdown(&self, id: Option<Value>) -> JsonRpcResponse {
        tracing::info!("MCP server shutdown requested");
        JsonRpcResponse::success(id, json!(null))
    }
}

fn request_label(request: &JsonRpcRequest) -> String {
    if request.method == "tools/call" {
        if let Some(name) = request
            .params
            .as_ref()
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
        {
            return format!("tools/call:{}", name);
        }
    }
    request.method.clone()
}

fn cancel(in_flight: &InFlightMap, params: Option<Value>) {
    let Some(params) = params.and_then(|p| serde_json::from_value::<CancelledParams>(p).ok())
    else {
        tracing::debug!("ignoring malformed cancellation");
        return;
    };
    let key = params.request_id.to_string();
    let entry = in_flight
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .remove(&key);
    match entry {
        Some(entry) => {
            tracing::info!(
                request = %entry.label,
                reason = params.reason.as_deref().unwrap_or("unspecified"),
                "cancelling in-flight request"
            );
            entry.abort.abort();
        }
        None => tracing::debug!(request_id = %key, "cancellation for unknown or finished request"),
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, String> {
    match params {
        Some(p) => serde_json::from_value(p).map_err(|e| format!("Invalid params: {}", e)),
        None => Err("Missing params".to_string()),
    }
}

fn to_response<T: Serialize>(id: Option<Value>, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, codes::INTERNAL_ERROR, e.to_string()),
    }
}
