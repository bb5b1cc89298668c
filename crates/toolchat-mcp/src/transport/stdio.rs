//! Stdio transport implementation for process-based MCP servers

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, watch};
use toolchat_core::{ChatError, Result};
use tracing::{debug, error, info};

use super::Transport;
use crate::config::LaunchSpec;
use crate::types::{IncomingMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// Stdio transport for process-based MCP servers
pub struct StdioTransport {
    /// Child process handle
    process: Option<Child>,

    /// Process stdin for sending data
    stdin: Option<ChildStdin>,

    /// Responses parsed from the process stdout
    response_rx: mpsc::Receiver<JsonRpcResponse>,

    /// Cleared by the stdout reader when the stream ends
    connected: watch::Receiver<bool>,

    program: String,
    args: Vec<String>,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("program", &self.program)
            .field("args", &self.args)
            .finish()
    }
}

impl StdioTransport {
    /// Spawn the server process and start its reader tasks
    pub async fn spawn(spec: &LaunchSpec) -> Result<Self> {
        let program = spec.program.display().to_string();
        info!("Starting MCP server via stdio: {} {:?}", program, spec.args);

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .env_clear()
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            ChatError::McpError(format!("Failed to spawn MCP server process '{}': {}", program, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ChatError::McpError("Failed to get process stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ChatError::McpError("Failed to get process stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ChatError::McpError("Failed to get process stderr".into()))?;

        let (response_tx, response_rx) = mpsc::channel::<JsonRpcResponse>(100);
        let (connected_tx, connected) = watch::channel(true);

        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        info!("MCP server process stdout closed");
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        debug!("Received from MCP server: {}", trimmed);

                        match IncomingMessage::parse(trimmed) {
                            Ok(IncomingMessage::Response(response)) => {
                                if response_tx.send(response).await.is_err() {
                                    debug!("Response receiver dropped, stopping reader");
                                    break;
                                }
                            }
                            Ok(IncomingMessage::ServerMessage { method }) => {
                                debug!("Ignoring server-initiated message: {}", method);
                            }
                            Err(e) => {
                                debug!("Non-JSON-RPC output from server: {} - {}", trimmed, e);
                            }
                        }
                    }
                    Err(e) => {
                        error!("Error reading from MCP server stdout: {}", e);
                        break;
                    }
                }
            }

            let _ = connected_tx.send(false);
        });

        // stderr is only logged
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        if !trimmed.is_empty() {
                            debug!("MCP server stderr: {}", trimmed);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!("Error reading from MCP server stderr: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            process: Some(child),
            stdin: Some(stdin),
            response_rx,
            connected,
            program,
            args: spec.args.clone(),
        })
    }

    async fn write_line(&mut self, json: String) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ChatError::McpError("Process stdin not available".into()))?;

        stdin
            .write_all(json.as_bytes())
            .await
            .map_err(|e| ChatError::McpError(format!("Failed to write to stdin: {}", e)))?;
        stdin
            .write_all(b"\n")
            .await
            .map_err(|e| ChatError::McpError(format!("Failed to write newline: {}", e)))?;
        stdin
            .flush()
            .await
            .map_err(|e| ChatError::McpError(format!("Failed to flush stdin: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send_request(&mut self, request: JsonRpcRequest) -> Result<()> {
        let json = serde_json::to_string(&request)?;
        debug!("Sending to MCP server: {}", json);
        self.write_line(json).await
    }

    async fn send_notification(&mut self, notification: JsonRpcNotification) -> Result<()> {
        let json = serde_json::to_string(&notification)?;
        debug!("Sending notification to MCP server: {}", json);
        self.write_line(json).await
    }

    async fn receive_response(&mut self) -> Result<Option<JsonRpcResponse>> {
        Ok(self.response_rx.recv().await)
    }

    async fn is_connected(&self) -> bool {
        self.process.is_some() && *self.connected.borrow()
    }

    async fn close(&mut self) -> Result<()> {
        info!("Closing stdio transport for {}", self.program);

        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.shutdown().await;
        }

        if let Some(mut child) = self.process.take() {
            child.kill().await.map_err(|e| {
                ChatError::McpError(format!("Failed to kill MCP server process: {}", e))
            })?;
            info!("MCP server process terminated");
        }

        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn shell_spec(script: &str) -> LaunchSpec {
        LaunchSpec {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), script.to_string()],
            env: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_round_trip_through_child_process() {
        // The child echoes back a canned response for whatever it reads.
        let script = r#"read line; echo 'banner text'; echo '{"jsonrpc":"2.0","id":"1","method":"ping"}'; echo '{"jsonrpc":"2.0","id":"1","result":{"ok":true}}'; read rest"#;
        let mut transport = StdioTransport::spawn(&shell_spec(script)).await.unwrap();
        assert!(transport.is_connected().await);

        transport
            .send_request(JsonRpcRequest::new("1".to_string(), "tools/list", None))
            .await
            .unwrap();

        let response = transport.receive_response().await.unwrap().unwrap();
        assert_eq!(response.id, "1");
        assert_eq!(response.result.unwrap()["ok"], true);

        transport.close().await.unwrap();
        assert!(!transport.is_connected().await);
        assert!(transport
            .send_request(JsonRpcRequest::new("2".to_string(), "tools/list", None))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_receive_returns_none_after_exit() {
        let mut transport = StdioTransport::spawn(&shell_spec("exit 0")).await.unwrap();
        assert!(transport.receive_response().await.unwrap().is_none());
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let spec = LaunchSpec {
            program: PathBuf::from("/definitely/not/a/server"),
            args: vec![],
            env: HashMap::new(),
        };
        let err = StdioTransport::spawn(&spec).await.unwrap_err();
        assert!(matches!(err, ChatError::McpError(_)));
    }
}
