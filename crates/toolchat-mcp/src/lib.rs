//! MCP (Model Context Protocol) client for toolchat
//!
//! Launches tool servers as subprocesses, speaks JSON-RPC with them over
//! stdio and exposes their tools to the chat orchestrator.

pub mod config;
pub mod conversions;
pub mod pool;
pub mod resolve;
pub mod resources;
pub mod server;
pub mod session;
pub mod tool;
pub mod transport;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{LaunchSpec, McpConfig, ServerConfig};
pub use conversions::render_tool_result;
pub use pool::ServerPool;
pub use resources::ReleaseStack;
pub use server::{RetryPolicy, ServerConnection, ToolServer};
pub use session::McpSession;
pub use tool::ToolDescriptor;
pub use transport::{Connector, StdioConnector, StdioTransport, Transport};
pub use types::{ContentItem, ToolCallResult, PROTOCOL_VERSION};
