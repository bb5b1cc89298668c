//! MCP session: the request/response channel negotiated over a transport

use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::time::{timeout, Duration};
use toolchat_core::{ChatError, Result};
use tracing::{debug, info, warn};

use crate::tool::ToolDescriptor;
use crate::transport::{SharedTransport, Transport};
use crate::types::{
    InitializeParams, InitializeResult, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    ToolCallParams, ToolCallResult, ToolListing,
};

/// Session with one MCP server
pub struct McpSession {
    /// Server name for identification
    name: String,

    transport: SharedTransport,

    request_id: AtomicU64,

    /// Result of the handshake
    server: Option<InitializeResult>,

    /// Timeout duration for requests (in milliseconds)
    timeout_ms: u64,

    closed: AtomicBool,
}

impl std::fmt::Debug for McpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpSession")
            .field("name", &self.name)
            .field("timeout_ms", &self.timeout_ms)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl McpSession {
    pub fn new(name: impl Into<String>, transport: SharedTransport, timeout_ms: u64) -> Self {
        Self {
            name: name.into(),
            transport,
            request_id: AtomicU64::new(1),
            server: None,
            timeout_ms,
            closed: AtomicBool::new(false),
        }
    }

    fn next_request_id(&self) -> String {
        self.request_id.fetch_add(1, Ordering::SeqCst).to_string()
    }

    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.server.as_ref()
    }

    /// Perform the `initialize` handshake followed by `notifications/initialized`
    pub async fn handshake(&mut self) -> Result<InitializeResult> {
        info!("Initializing MCP session: {}", self.name);

        let request = JsonRpcRequest::new(
            self.next_request_id(),
            "initialize",
            Some(serde_json::to_value(InitializeParams::default())?),
        );

        let response = self.send_request(request).await?;

        if let Some(error) = response.error {
            return Err(ChatError::McpError(format!(
                "Failed to initialize MCP connection: {}",
                error.message
            )));
        }

        let result: InitializeResult = serde_json::from_value(response.result.ok_or_else(|| {
            ChatError::McpError("Initialize response missing result".into())
        })?)?;

        info!(
            "MCP session '{}' initialized with protocol version: {}",
            self.name, result.protocol_version
        );
        if let Some(ref server_info) = result.server_info {
            info!(
                "Connected to MCP server: {} v{}",
                server_info.name, server_info.version
            );
        }

        let notification = JsonRpcNotification::new("notifications/initialized", None);
        self.transport
            .lock()
            .await
            .send_notification(notification)
            .await?;

        self.server = Some(result.clone());
        Ok(result)
    }

    /// List available tools from the MCP server
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        debug!("Listing tools from MCP server: {}", self.name);

        let request = JsonRpcRequest::new(self.next_request_id(), "tools/list", None);
        let response = self.send_request(request).await?;

        if let Some(error) = response.error {
            return Err(ChatError::McpError(format!(
                "Failed to list tools: {}",
                error.message
            )));
        }

        let result = response.result.ok_or_else(|| {
            ChatError::McpError("List tools response missing result".into())
        })?;
        let tools = ToolListing::from_result(result)?.into_tools();

        info!(
            "Discovered {} tools from MCP server '{}'",
            tools.len(),
            self.name
        );
        Ok(tools)
    }

    /// Call a tool on the MCP server. A result flagged `isError` is still a
    /// successful call and is returned as received.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult> {
        debug!("Calling MCP tool '{}' on server '{}'", name, self.name);

        let params = ToolCallParams {
            name: name.to_string(),
            arguments,
        };
        let request = JsonRpcRequest::new(
            self.next_request_id(),
            "tools/call",
            Some(serde_json::to_value(params)?),
        );

        let response = self.send_request(request).await?;

        if let Some(error) = response.error {
            return Err(ChatError::McpError(format!(
                "Tool '{}' execution failed: {}",
                name, error.message
            )));
        }

        let result: ToolCallResult = serde_json::from_value(response.result.ok_or_else(|| {
            ChatError::McpError(format!("Tool '{}' response missing result", name))
        })?)?;

        if result.is_error() {
            debug!("Tool '{}' reported an error in its result", name);
        }
        Ok(result)
    }

    /// Send a request and wait for the response with the same id
    async fn send_request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        if self.is_closed() {
            return Err(ChatError::McpError(format!(
                "Session '{}' is closed",
                self.name
            )));
        }

        let request_id = request.id.clone();
        let mut transport = self.transport.lock().await;
        transport.send_request(request).await?;

        timeout(
            Duration::from_millis(self.timeout_ms),
            self.await_response(&mut **transport, &request_id),
        )
        .await
        .map_err(|_| {
            ChatError::McpError(format!(
                "Request {} timed out after {}ms",
                request_id, self.timeout_ms
            ))
        })?
    }

    async fn await_response(
        &self,
        transport: &mut dyn Transport,
        request_id: &str,
    ) -> Result<JsonRpcResponse> {
        loop {
            match transport.receive_response().await? {
                Some(response) if response.id == request_id => return Ok(response),
                Some(response) => {
                    warn!(
                        "Received response for different request: {} (expected: {})",
                        response.id, request_id
                    );
                }
                None => {
                    return Err(ChatError::McpError(format!(
                        "MCP server '{}' closed the connection",
                        self.name
                    )))
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mark the session closed; later requests fail without touching the transport
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Closed MCP session: {}", self.name);
        }
    }
}
