//! MCP server implementation for the Instagram Graph API.
//!
//! This module implements the MCP server lifecycle:
//!
//! 1. **Initialisation**: Capability negotiation and version agreement
//! 2. **Operation**: Handling tool calls, resource reads and prompt requests
//! 3. **Shutdown**: Graceful connection termination
//!
//! Requests are handled one at a time in arrival order; the Graph client's
//! cache and rate limiter are shared by all of them.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::graph::GraphClient;
use crate::mcp::prompts::{self, PromptError};
use crate::mcp::protocol::{
    parse_message, IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, RequestId, MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use crate::mcp::resources::{self, ResourceError};
use crate::mcp::tools;
use crate::mcp::transport::{LineTransport, StdioTransport};

/// Server state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for initialize request.
    AwaitingInit,
    /// Initialize received, waiting for initialized notification.
    Initialising,
    /// Ready for normal operation.
    Running,
    /// Shutdown in progress.
    ShuttingDown,
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerCapabilities {
    pub tools: ListCapabilities,
    pub resources: ListCapabilities,
    pub prompts: ListCapabilities,
}

/// Capabilities of a listable feature.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListCapabilities {
    /// Whether the list can change during the session.
    #[serde(rename = "listChanged", skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires a predicate fn(&T) -> bool
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Client information received during initialisation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// A tool definition for tools/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
}

/// Parameters for resources/read request.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceReadParams {
    pub uri: String,
}

/// Parameters for prompts/get request.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptGetParams {
    pub name: String,
    #[serde(default)]
    pub arguments: HashMap<String, String>,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }
}

fn parse_params<T: DeserializeOwned>(req: &JsonRpcRequest, what: &str) -> Result<T, JsonRpcError> {
    req.params
        .as_ref()
        .map(|p| serde_json::from_value(p.clone()))
        .transpose()
        .map_err(|e| JsonRpcError::invalid_params(req.id.clone(), format!("Invalid {what} params: {e}")))?
        .ok_or_else(|| JsonRpcError::invalid_params(req.id.clone(), format!("Missing {what} params")))
}

/// The MCP server for an Instagram business account.
pub struct McpServer {
    /// Current server state.
    state: ServerState,
    /// Negotiated protocol version (set after initialisation).
    protocol_version: Option<String>,
    /// Graph API client shared by all handlers.
    client: Arc<GraphClient>,
}

impl McpServer {
    /// Creates a new MCP server over `client`.
    #[must_use]
    pub const fn new(client: Arc<GraphClient>) -> Self {
        Self {
            state: ServerState::AwaitingInit,
            protocol_version: None,
            client,
        }
    }

    /// Returns the current server state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Returns the negotiated protocol version, once initialised.
    #[must_use]
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    /// Runs the MCP server on stdio with graceful shutdown handling.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&mut self) -> io::Result<()> {
        let mut transport = StdioTransport::stdio();
        self.run_with_shutdown(&mut transport).await
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(unix)]
    async fn run_with_shutdown(&mut self, transport: &mut StdioTransport) -> io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(io::Error::other)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(io::Error::other)?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                line_result = transport.read_line() => {
                    if self.handle_transport_result(transport, line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(windows)]
    async fn run_with_shutdown(&mut self, transport: &mut StdioTransport) -> io::Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                line_result = transport.read_line() => {
                    if self.handle_transport_result(transport, line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Serves requests from `transport` until EOF.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn serve<R, W>(&mut self, transport: &mut LineTransport<R, W>) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let line_result = transport.read_line().await;
            if self.handle_transport_result(transport, line_result).await? {
                return Ok(());
            }
        }
    }

    /// Handles the result from transport read.
    ///
    /// Returns `true` if the server should shut down.
    async fn handle_transport_result<R, W>(
        &mut self,
        transport: &mut LineTransport<R, W>,
        line_result: io::Result<Option<String>>,
    ) -> io::Result<bool>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let Some(line) = line_result? else {
            tracing::info!("Client closed the connection");
            self.state = ServerState::ShuttingDown;
            return Ok(true);
        };

        if line.trim().is_empty() {
            return Ok(false);
        }

        match parse_message(&line) {
            Ok(IncomingMessage::Request(req)) => match self.dispatch(&req).await {
                Ok(resp) => transport.write_response(&resp).await?,
                Err(error) => transport.write_error(&error).await?,
            },
            Ok(IncomingMessage::Notification(notif)) => self.handle_notification(&notif),
            Err(error) => {
                tracing::warn!(code = error.error.code, "Rejected malformed message");
                transport.write_error(&error).await?;
            }
        }

        Ok(self.state == ServerState::ShuttingDown)
    }

    /// Handles one request and returns its response.
    ///
    /// # Errors
    ///
    /// Returns the JSON-RPC error to send back to the client.
    pub async fn dispatch(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        tracing::debug!(id = %req.id, method = %req.method, "Handling request");

        match req.method.as_str() {
            "initialize" => self.handle_initialize(req),
            "ping" => Ok(Self::handle_ping(req)),
            "tools/list" => self.handle_tools_list(req),
            "tools/call" => self.handle_tools_call(req).await,
            "resources/list" => self.handle_resources_list(req),
            "resources/read" => self.handle_resources_read(req).await,
            "prompts/list" => self.handle_prompts_list(req),
            "prompts/get" => self.handle_prompts_get(req).await,
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        }
    }

    /// Handles an incoming notification.
    pub fn handle_notification(&mut self, notif: &JsonRpcNotification) {
        if notif.method == "notifications/initialized" && self.state == ServerState::Initialising {
            tracing::info!("Client initialised, server running");
            self.state = ServerState::Running;
        } else {
            tracing::debug!(method = %notif.method, "Ignoring notification");
        }
    }

    /// Handles the initialize request.
    fn handle_initialize(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        if self.state != ServerState::AwaitingInit {
            return Err(JsonRpcError::invalid_request(
                Some(req.id.clone()),
                "Server already initialised",
            ));
        }

        let params: InitializeParams = parse_params(req, "initialize")?;
        if let Some(client) = &params.client_info {
            tracing::info!(
                client = %client.name,
                client_version = client.version.as_deref().unwrap_or("unknown"),
                requested_version = %params.protocol_version,
                "Initialising session"
            );
        }

        let negotiated_version = MCP_PROTOCOL_VERSION.to_string();

        self.protocol_version = Some(negotiated_version.clone());
        self.state = ServerState::Initialising;

        let result = json!({
            "protocolVersion": negotiated_version,
            "capabilities": ServerCapabilities::default(),
            "serverInfo": ServerInfo::default(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the tools/list request.
    fn handle_tools_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;
        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({ "tools": tools::definitions() }),
        ))
    }

    /// Handles the tools/call request.
    async fn handle_tools_call(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let params: ToolCallParams = parse_params(req, "tool call")?;
        tracing::info!(tool = %params.name, "Calling tool");

        let result = tools::call(&self.client, &params.name, params.arguments).await;

        let result_value = serde_json::to_value(&result).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialise tool call result");
            JsonRpcError::internal_error(req.id.clone(), "Internal error: failed to serialise result")
        })?;

        Ok(JsonRpcResponse::success(req.id.clone(), result_value))
    }

    /// Handles the resources/list request.
    fn handle_resources_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;
        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({ "resources": resources::definitions() }),
        ))
    }

    /// Handles the resources/read request.
    async fn handle_resources_read(
        &self,
        req: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let params: ResourceReadParams = parse_params(req, "resource read")?;
        match resources::read(&self.client, &params.uri).await {
            Ok(contents) => Ok(JsonRpcResponse::success(
                req.id.clone(),
                json!({ "contents": [contents] }),
            )),
            Err(ResourceError::UnknownUri(uri)) => {
                Err(JsonRpcError::resource_not_found(req.id.clone(), &uri))
            }
            Err(ResourceError::Graph(error)) => {
                tracing::error!(uri = %params.uri, error = %error, "Resource read failed");
                Err(JsonRpcError::graph_failure(req.id.clone(), &error))
            }
            Err(ResourceError::Serialise(e)) => Err(JsonRpcError::internal_error(
                req.id.clone(),
                format!("Failed to serialise resource: {e}"),
            )),
        }
    }

    /// Handles the prompts/list request.
    fn handle_prompts_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;
        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({ "prompts": prompts::definitions() }),
        ))
    }

    /// Handles the prompts/get request.
    async fn handle_prompts_get(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let params: PromptGetParams = parse_params(req, "prompt")?;
        match prompts::get(&self.client, &params.name, &params.arguments).await {
            Ok(prompt) => {
                let value = serde_json::to_value(&prompt).map_err(|e| {
                    JsonRpcError::internal_error(req.id.clone(), format!("Failed to serialise prompt: {e}"))
                })?;
                Ok(JsonRpcResponse::success(req.id.clone(), value))
            }
            Err(
                error @ (PromptError::UnknownPrompt(_)
                | PromptError::MissingArgument(_)
                | PromptError::InvalidArgument { .. }),
            ) => Err(JsonRpcError::invalid_params(req.id.clone(), error.to_string())),
            Err(PromptError::Graph(error)) => {
                tracing::error!(prompt = %params.name, error = %error, "Prompt rendering failed");
                Err(JsonRpcError::graph_failure(req.id.clone(), &error))
            }
            Err(PromptError::Serialise(e)) => Err(JsonRpcError::internal_error(
                req.id.clone(),
                format!("Failed to serialise prompt data: {e}"),
            )),
        }
    }

    /// Handles the ping request.
    fn handle_ping(req: &JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(req.id.clone(), json!({}))
    }

    /// Ensures the server is in the Running state.
    fn require_running(&self, id: &RequestId) -> Result<(), JsonRpcError> {
        if self.state != ServerState::Running {
            return Err(JsonRpcError::invalid_request(
                Some(id.clone()),
                "Server not initialised",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ClientConfig, Credentials};
    use crate::mcp::protocol::ErrorCode;

    fn server() -> McpServer {
        let client = GraphClient::new(ClientConfig::new(Credentials::new("test-token"))).unwrap();
        McpServer::new(Arc::new(client))
    }

    fn request(id: i64, method: &str, params: Value) -> JsonRpcRequest {
        serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .unwrap()
    }

    async fn initialised() -> McpServer {
        let mut server = server();
        server
            .dispatch(&request(
                1,
                "initialize",
                json!({"protocolVersion": "2024-11-05", "capabilities": {}}),
            ))
            .await
            .unwrap();
        let notif: JsonRpcNotification = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        }))
        .unwrap();
        server.handle_notification(&notif);
        server
    }

    #[test]
    fn server_initial_state() {
        let server = server();
        assert_eq!(server.state(), ServerState::AwaitingInit);
        assert!(server.protocol_version().is_none());
    }

    #[tokio::test]
    async fn lifecycle_reaches_running() {
        let server = initialised().await;
        assert_eq!(server.state(), ServerState::Running);
        assert_eq!(server.protocol_version(), Some(MCP_PROTOCOL_VERSION));
    }

    #[tokio::test]
    async fn initialize_advertises_all_capabilities() {
        let mut server = server();
        let resp = server
            .dispatch(&request(1, "initialize", json!({"protocolVersion": "2024-11-05"})))
            .await
            .unwrap();
        let caps = &resp.result["capabilities"];
        assert!(caps["tools"].is_object());
        assert!(caps["resources"].is_object());
        assert!(caps["prompts"].is_object());
        assert_eq!(resp.result["serverInfo"]["name"], "instagram-mcp");
    }

    #[tokio::test]
    async fn second_initialize_is_rejected() {
        let mut server = initialised().await;
        let err = server
            .dispatch(&request(2, "initialize", json!({"protocolVersion": "2024-11-05"})))
            .await
            .unwrap_err();
        assert_eq!(err.error.code, ErrorCode::InvalidRequest.code());
    }

    #[tokio::test]
    async fn requests_before_init_are_rejected() {
        let mut server = server();
        for method in ["tools/list", "resources/list", "prompts/list"] {
            let err = server.dispatch(&request(1, method, json!({}))).await.unwrap_err();
            assert_eq!(err.error.code, ErrorCode::InvalidRequest.code(), "{method}");
        }
    }

    #[tokio::test]
    async fn ping_works_before_init() {
        let mut server = server();
        assert!(server.dispatch(&request(1, "ping", Value::Null)).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_method() {
        let mut server = initialised().await;
        let err = server
            .dispatch(&request(3, "sampling/createMessage", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.error.code, ErrorCode::MethodNotFound.code());
    }

    #[tokio::test]
    async fn lists_tools_resources_and_prompts() {
        let mut server = initialised().await;

        let tools = server.dispatch(&request(2, "tools/list", json!({}))).await.unwrap();
        assert_eq!(tools.result["tools"].as_array().unwrap().len(), 12);

        let resources = server.dispatch(&request(3, "resources/list", json!({}))).await.unwrap();
        assert_eq!(resources.result["resources"][0]["uri"], "instagram://profile");

        let prompts = server.dispatch(&request(4, "prompts/list", json!({}))).await.unwrap();
        assert_eq!(prompts.result["prompts"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn unknown_tool_is_error_result() {
        let mut server = initialised().await;
        let resp = server
            .dispatch(&request(5, "tools/call", json!({"name": "delete_account"})))
            .await
            .unwrap();
        assert_eq!(resp.result["isError"], true);
    }

    #[tokio::test]
    async fn unknown_resource_is_not_found() {
        let mut server = initialised().await;
        let err = server
            .dispatch(&request(6, "resources/read", json!({"uri": "instagram://stories"})))
            .await
            .unwrap_err();
        assert_eq!(err.error.code, ErrorCode::ResourceNotFound.code());
    }

    #[tokio::test]
    async fn prompt_argument_errors_are_invalid_params() {
        let mut server = initialised().await;

        let err = server
            .dispatch(&request(7, "prompts/get", json!({"name": "analyze_engagement"})))
            .await
            .unwrap_err();
        assert_eq!(err.error.code, ErrorCode::InvalidParams.code());
        assert!(err.error.message.contains("media_id"));

        let err = server
            .dispatch(&request(8, "prompts/get", json!({"name": "haiku"})))
            .await
            .unwrap_err();
        assert_eq!(err.error.code, ErrorCode::InvalidParams.code());
    }

    #[tokio::test]
    async fn missing_params_are_invalid() {
        let mut server = initialised().await;
        let err = server.dispatch(&request(9, "tools/call", Value::Null)).await.unwrap_err();
        assert_eq!(err.error.code, ErrorCode::InvalidParams.code());
    }

    #[test]
    fn tool_call_result_text() {
        let result = ToolCallResult::text("Hello, world!");
        assert!(!result.is_error);
        assert_eq!(result.content.len(), 1);

        match &result.content[0] {
            ToolContent::Text { text } => assert_eq!(text, "Hello, world!"),
        }
    }

    #[test]
    fn tool_call_result_error() {
        let result = ToolCallResult::error("Something went wrong");
        assert!(result.is_error);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["isError"], true);
        assert_eq!(json["content"][0]["type"], "text");
    }
}
