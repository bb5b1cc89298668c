//! The set of configured tool servers
//!
//! Servers are kept in declaration order; that order decides which server
//! answers a tool name offered by more than one of them.

use std::sync::Arc;
use toolchat_config::StartupPolicy;
use toolchat_core::{ChatError, Result};
use tracing::{error, info, warn};

use crate::config::McpConfig;
use crate::server::{RetryPolicy, ServerConnection, ToolServer};
use crate::tool::ToolDescriptor;
use crate::transport::{Connector, StdioConnector};

pub struct ServerPool {
    servers: Vec<Arc<ServerConnection>>,
}

impl ServerPool {
    /// Build one stdio connection per enabled server
    pub fn from_config(config: &McpConfig, retry: RetryPolicy) -> Self {
        Self::with_connector(config, retry, Arc::new(StdioConnector))
    }

    pub fn with_connector(
        config: &McpConfig,
        retry: RetryPolicy,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let servers = config
            .enabled_servers()
            .into_iter()
            .map(|(name, server_config)| {
                Arc::new(
                    ServerConnection::with_connector(name, server_config, connector.clone())
                        .with_retry_policy(retry),
                )
            })
            .collect();

        Self { servers }
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn server_names(&self) -> Vec<String> {
        self.servers.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<ServerConnection>> {
        self.servers.iter().find(|s| s.name() == name).cloned()
    }

    /// Initialize every server, one after another.
    ///
    /// With [`StartupPolicy::FailFast`] the first failure cleans up all servers
    /// and is returned. With [`StartupPolicy::BestEffort`] failed servers are
    /// dropped from the pool; it is an error only if none came up.
    pub async fn initialize_all(&mut self, policy: StartupPolicy) -> Result<()> {
        if self.servers.is_empty() {
            info!("No enabled MCP servers to start");
            return Ok(());
        }

        info!("Starting {} MCP servers", self.servers.len());

        let mut started = Vec::with_capacity(self.servers.len());
        let mut failed = 0;

        for server in &self.servers {
            match server.initialize().await {
                Ok(()) => started.push(server.clone()),
                Err(e) if policy == StartupPolicy::FailFast => {
                    error!("Failed to start MCP server '{}': {}", server.name(), e);
                    self.cleanup_all().await;
                    return Err(e);
                }
                Err(e) => {
                    warn!("Skipping MCP server '{}': {}", server.name(), e);
                    failed += 1;
                }
            }
        }

        info!(
            "MCP server startup complete: {} started, {} failed",
            started.len(),
            failed
        );

        if started.is_empty() {
            return Err(ChatError::McpError("Failed to start any MCP servers".into()));
        }

        self.servers = started;
        Ok(())
    }

    /// Tools of every server, concatenated in declaration order
    pub async fn list_all_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let mut tools = Vec::new();
        for server in &self.servers {
            tools.extend(server.list_tools().await?);
        }
        Ok(tools)
    }

    /// First server, in declaration order, that lists `tool`
    pub async fn find_server_for(&self, tool: &str) -> Result<Option<Arc<ServerConnection>>> {
        for server in &self.servers {
            if server.list_tools().await?.iter().any(|t| t.name == tool) {
                return Ok(Some(server.clone()));
            }
        }
        Ok(None)
    }

    /// The servers as the orchestrator sees them
    pub fn tool_servers(&self) -> Vec<Arc<dyn ToolServer>> {
        self.servers
            .iter()
            .map(|server| server.clone() as Arc<dyn ToolServer>)
            .collect()
    }

    /// Clean up every server in reverse declaration order.
    pub async fn cleanup_all(&self) {
        for server in self.servers.iter().rev() {
            server.cleanup().await;
        }
    }
}

impl std::fmt::Debug for ServerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerPool")
            .field("servers", &self.server_names())
            .finish()
    }
}
