//! Transport layer for MCP communication
//!
//! A transport moves newline-delimited JSON-RPC messages between the client
//! and one server. Connectors create transports from launch parameters so the
//! connection lifecycle can be driven against something other than a real
//! subprocess.

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::Mutex;
use toolchat_core::Result;

use crate::config::LaunchSpec;
use crate::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

pub mod stdio;

pub use stdio::StdioTransport;

/// Transport trait for MCP communication
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Send a JSON-RPC request
    async fn send_request(&mut self, request: JsonRpcRequest) -> Result<()>;

    /// Send a JSON-RPC notification (no response expected)
    async fn send_notification(&mut self, notification: JsonRpcNotification) -> Result<()>;

    /// Wait for the next response; `None` once the server has gone away
    async fn receive_response(&mut self) -> Result<Option<JsonRpcResponse>>;

    /// Check if transport is connected
    async fn is_connected(&self) -> bool;

    /// Close the transport connection
    async fn close(&mut self) -> Result<()>;
}

/// A transport shared between a session and its owning connection.
pub type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// Opens a transport for a resolved launch specification.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, spec: &LaunchSpec) -> Result<Box<dyn Transport>>;
}

/// Spawns the server as a child process speaking over stdin/stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdioConnector;

#[async_trait]
impl Connector for StdioConnector {
    async fn connect(&self, spec: &LaunchSpec) -> Result<Box<dyn Transport>> {
        let transport = StdioTransport::spawn(spec).await?;
        Ok(Box::new(transport))
    }
}
