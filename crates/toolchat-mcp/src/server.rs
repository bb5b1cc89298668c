//! Connection-managed tool server
//!
//! A [`ServerConnection`] owns one tool-provider subprocess: it starts the
//! transport, negotiates the session, lists and executes tools, and releases
//! everything it acquired when cleaned up.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use toolchat_config::RetrySettings;
use toolchat_core::{ChatError, Result};
use tracing::{debug, error, info, instrument, warn};

use crate::config::ServerConfig;
use crate::resources::ReleaseStack;
use crate::session::McpSession;
use crate::tool::ToolDescriptor;
use crate::transport::{Connector, SharedTransport, StdioConnector};
use crate::types::ToolCallResult;

/// Fixed-delay retry budget for tool calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            delay: Duration::from_millis(1000),
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            attempts: settings.attempts,
            delay: Duration::from_millis(settings.delay_ms),
        }
    }
}

/// Something the orchestrator can list and call tools on.
#[async_trait]
pub trait ToolServer: Send + Sync {
    fn name(&self) -> &str;

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>>;

    async fn execute_tool(&self, tool: &str, arguments: Value) -> Result<ToolCallResult>;
}

#[derive(Default)]
struct ConnectionState {
    transport: Option<SharedTransport>,
    session: Option<Arc<McpSession>>,
    releases: ReleaseStack,
}

impl ConnectionState {
    fn is_clean(&self) -> bool {
        self.transport.is_none() && self.session.is_none() && self.releases.is_empty()
    }
}

/// One configured tool server and its session lifecycle
pub struct ServerConnection {
    name: String,
    config: ServerConfig,
    connector: Arc<dyn Connector>,
    retry: RetryPolicy,
    /// Behind a `Mutex`: pending release futures are `Send` but not `Sync`
    state: Mutex<ConnectionState>,
    cleanup_lock: Mutex<()>,
}

impl std::fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConnection")
            .field("name", &self.name)
            .field("command", &self.config.command)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ServerConnection {
    /// Create a connection that launches the server over stdio
    pub fn new(name: impl Into<String>, config: ServerConfig) -> Self {
        Self::with_connector(name, config, Arc::new(StdioConnector))
    }

    pub fn with_connector(
        name: impl Into<String>,
        config: ServerConfig,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            connector,
            retry: RetryPolicy::default(),
            state: Mutex::new(ConnectionState::default()),
            cleanup_lock: Mutex::new(()),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.lock().await.session.is_some()
    }

    /// Start the server process and perform the session handshake.
    ///
    /// On failure everything acquired so far is released before the original
    /// error is returned.
    #[instrument(skip(self), fields(server = %self.name))]
    pub async fn initialize(&self) -> Result<()> {
        let outcome = {
            let mut state = self.state.lock().await;
            self.establish(&mut state).await
        };

        if let Err(e) = outcome {
            error!("Error initializing server {}: {}", self.name, e);
            self.cleanup().await;
            return Err(e);
        }
        Ok(())
    }

    async fn establish(&self, state: &mut ConnectionState) -> Result<()> {
        if state.session.is_some() {
            warn!("MCP server '{}' is already initialized", self.name);
            return Ok(());
        }

        let spec = self.config.launch_spec()?;

        let transport = self
            .connector
            .connect(&spec)
            .await
            .map_err(|e| self.connection_error(e))?;
        let transport: SharedTransport = Arc::new(Mutex::new(transport));

        let releasing = transport.clone();
        state.releases.push("transport", async move {
            let mut transport = releasing.lock().await;
            transport.close().await
        });
        state.transport = Some(transport.clone());

        let mut session = McpSession::new(self.name.clone(), transport, self.config.timeout);
        session
            .handshake()
            .await
            .map_err(|e| self.connection_error(e))?;

        let session = Arc::new(session);
        let closing = session.clone();
        state.releases.push("session", async move {
            closing.close();
            Ok(())
        });
        state.session = Some(session);

        info!("MCP server '{}' initialized", self.name);
        Ok(())
    }

    fn connection_error(&self, err: ChatError) -> ChatError {
        match err {
            ChatError::ConfigError(_) | ChatError::ConnectionError { .. } => err,
            other => ChatError::ConnectionError {
                server: self.name.clone(),
                message: other.to_string(),
            },
        }
    }

    async fn session(&self) -> Result<Arc<McpSession>> {
        self.state
            .lock()
            .await
            .session
            .clone()
            .ok_or_else(|| ChatError::NotInitialized(self.name.clone()))
    }

    /// List the server's tools. Not retried.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let session = self.session().await?;
        session.list_tools().await
    }

    /// Execute a tool with the connection's retry policy
    pub async fn execute_tool(&self, tool: &str, arguments: Value) -> Result<ToolCallResult> {
        self.execute_tool_with(tool, arguments, self.retry).await
    }

    /// Execute a tool, retrying failed attempts after a fixed delay.
    ///
    /// Protocol errors, transport errors and timeouts are retried; a result the
    /// tool flagged with `isError` is a completed call and comes back as is.
    /// The error of the final attempt is returned once the budget is spent.
    #[instrument(skip(self, arguments, policy), fields(server = %self.name))]
    pub async fn execute_tool_with(
        &self,
        tool: &str,
        arguments: Value,
        policy: RetryPolicy,
    ) -> Result<ToolCallResult> {
        let session = self.session().await?;
        let attempts = policy.attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            info!("Executing {} (attempt {}/{})", tool, attempt, attempts);

            match session.call_tool(tool, arguments.clone()).await {
                Ok(result) => return Ok(result),
                Err(e) if attempt < attempts => {
                    warn!(
                        "Error executing tool {}: {}. Attempt {} of {}, retrying in {:?}",
                        tool, e, attempt, attempts, policy.delay
                    );
                    tokio::time::sleep(policy.delay).await;
                }
                Err(e) => {
                    error!("Max retries reached for tool {}: {}", tool, e);
                    return Err(ChatError::ToolExecutionError {
                        tool: tool.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    /// Release the session and subprocess. Safe to call any number of times,
    /// concurrently or not; errors are logged and suppressed.
    pub async fn cleanup(&self) {
        let _guard = self.cleanup_lock.lock().await;
        let mut state = self.state.lock().await;

        if state.is_clean() {
            debug!("MCP server '{}' has nothing to clean up", self.name);
            return;
        }

        let failures = state.releases.unwind().await;
        state.session = None;
        state.transport = None;

        if failures > 0 {
            warn!(
                "Cleanup of MCP server '{}' finished with {} errors",
                self.name, failures
            );
        } else {
            info!("MCP server '{}' cleaned up", self.name);
        }
    }
}

#[async_trait]
impl ToolServer for ServerConnection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        ServerConnection::list_tools(self).await
    }

    async fn execute_tool(&self, tool: &str, arguments: Value) -> Result<ToolCallResult> {
        ServerConnection::execute_tool(self, tool, arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{tool_call_text, ScriptedConnector};
    use crate::types::{ContentItem, JsonRpcResponse};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn connection(connector: ScriptedConnector) -> ServerConnection {
        ServerConnection::with_connector(
            "weather",
            ServerConfig::new("weather-server", vec![]),
            Arc::new(connector),
        )
    }

    #[tokio::test]
    async fn test_operations_before_initialize_fail_precondition() {
        let connector = ScriptedConnector::healthy();
        let server = connection(connector.clone());

        let err = server.list_tools().await.unwrap_err();
        assert!(matches!(err, ChatError::NotInitialized(ref name) if name == "weather"));

        let err = server.execute_tool("forecast", json!({})).await.unwrap_err();
        assert!(err.is_precondition());

        assert_eq!(connector.calls.connects(), 0);
        assert!(connector.calls.methods().is_empty());
    }

    #[tokio::test]
    async fn test_initialize_performs_handshake_and_lists_tools() {
        let connector = ScriptedConnector::healthy();
        let server = connection(connector.clone());

        server.initialize().await.unwrap();
        assert!(server.is_initialized().await);
        assert_eq!(connector.calls.notifications(), vec!["notifications/initialized"]);

        let tools = server.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "forecast");
        assert_eq!(connector.calls.methods(), vec!["initialize", "tools/list"]);

        // a second initialize keeps the live session
        server.initialize().await.unwrap();
        assert_eq!(connector.calls.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_gives_up_after_all_attempts() {
        let connector = ScriptedConnector::new(|request, _| {
            JsonRpcResponse::failure(request.id.clone(), -32000, "upstream unavailable")
        });
        let server = connection(connector.clone());
        server.initialize().await.unwrap();

        let started = tokio::time::Instant::now();
        let err = server
            .execute_tool_with("forecast", json!({"city": "Paris"}), RetryPolicy::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ChatError::ToolExecutionError { ref tool, ref message }
                if tool == "forecast" && message.contains("upstream unavailable")
        ));
        assert_eq!(connector.calls.count("tools/call"), 2);
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_succeeds_on_second_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let connector = ScriptedConnector::new(move |request, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                JsonRpcResponse::failure(request.id.clone(), -32603, "internal error")
            } else {
                tool_call_text(request, "22C and sunny")
            }
        });
        let server = connection(connector.clone());
        server.initialize().await.unwrap();

        let started = tokio::time::Instant::now();
        let result = server
            .execute_tool("forecast", json!({"city": "Paris"}))
            .await
            .unwrap();

        assert_eq!(
            result.content,
            vec![ContentItem::Text { text: "22C and sunny".into() }]
        );
        assert_eq!(connector.calls.count("tools/call"), 2);
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_reported_error_is_returned_without_retry() {
        let payload = json!({
            "content": [{"type": "text", "text": "City 'Atlantis' not found"}],
            "isError": true
        });
        let reply = payload.clone();
        let connector = ScriptedConnector::new(move |request, _| {
            JsonRpcResponse::success(request.id.clone(), reply.clone())
        });
        let server = connection(connector.clone());
        server.initialize().await.unwrap();

        let started = tokio::time::Instant::now();
        let result = server
            .execute_tool("forecast", json!({"city": "Atlantis"}))
            .await
            .unwrap();

        assert!(result.is_error());
        assert_eq!(serde_json::to_value(&result).unwrap(), payload);
        assert_eq!(connector.calls.count("tools/call"), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_single_attempt_policy_does_not_sleep() {
        let connector = ScriptedConnector::new(|request, _| {
            JsonRpcResponse::failure(request.id.clone(), -1, "nope")
        });
        let server = connection(connector.clone());
        server.initialize().await.unwrap();

        let policy = RetryPolicy::new(1, Duration::from_secs(3600));
        assert!(server
            .execute_tool_with("forecast", json!({}), policy)
            .await
            .is_err());
        assert_eq!(connector.calls.count("tools/call"), 1);
    }

    #[tokio::test]
    async fn test_list_tools_failure_is_not_retried() {
        let connector = ScriptedConnector::new(|request, _| {
            JsonRpcResponse::failure(request.id.clone(), -32601, "method not found")
        });
        let server = connection(connector.clone());
        server.initialize().await.unwrap();

        let err = server.list_tools().await.unwrap_err();
        assert!(matches!(err, ChatError::McpError(_)));
        assert_eq!(connector.calls.count("tools/list"), 1);
    }

    #[tokio::test]
    async fn test_handshake_failure_releases_transport() {
        let connector = ScriptedConnector::new(|request, _| {
            JsonRpcResponse::failure(request.id.clone(), -32600, "unsupported protocol")
        })
        .with_handshake_error();
        let server = connection(connector.clone());

        let err = server.initialize().await.unwrap_err();
        assert!(matches!(err, ChatError::ConnectionError { ref server, .. } if server == "weather"));
        assert!(!server.is_initialized().await);
        assert_eq!(connector.calls.closes(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_is_connection_error() {
        let connector = ScriptedConnector::healthy().refusing();
        let server = connection(connector.clone());

        let err = server.initialize().await.unwrap_err();
        assert!(matches!(err, ChatError::ConnectionError { .. }));
        assert!(!server.is_initialized().await);
        assert_eq!(connector.calls.closes(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let connector = ScriptedConnector::healthy();
        let server = connection(connector.clone());

        server.cleanup().await;
        assert_eq!(connector.calls.closes(), 0);

        server.initialize().await.unwrap();
        server.cleanup().await;
        server.cleanup().await;

        assert!(!server.is_initialized().await);
        assert_eq!(connector.calls.closes(), 1);
        assert!(server.list_tools().await.unwrap_err().is_precondition());
    }

    #[tokio::test]
    async fn test_concurrent_cleanup_collapses() {
        let connector = ScriptedConnector::healthy();
        let server = Arc::new(connection(connector.clone()));
        server.initialize().await.unwrap();

        let (a, b) = (server.clone(), server.clone());
        tokio::join!(a.cleanup(), b.cleanup());

        assert!(!server.is_initialized().await);
        assert_eq!(connector.calls.closes(), 1);

        // the connection can be brought back up afterwards
        server.initialize().await.unwrap();
        assert!(server.is_initialized().await);
        assert_eq!(connector.calls.connects(), 2);
    }
}
