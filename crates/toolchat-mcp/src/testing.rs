//! In-memory transport and connector for driving connections in tests.
//!
//! Built for this crate's tests and, with the `testing` feature, for crates
//! that drive a real `ServerConnection` in theirs.

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use toolchat_core::{ChatError, Result};

use crate::config::LaunchSpec;
use crate::transport::{Connector, Transport};
use crate::types::{
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION,
};

type Responder = dyn Fn(&JsonRpcRequest, usize) -> JsonRpcResponse + Send + Sync;

/// Everything the scripted servers observed.
#[derive(Debug, Default)]
pub struct CallLog {
    methods: Mutex<Vec<String>>,
    notifications: Mutex<Vec<String>>,
    connects: Mutex<usize>,
    closes: Mutex<usize>,
}

impl CallLog {
    pub fn methods(&self) -> Vec<String> {
        self.methods.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<String> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.methods
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.as_str() == method)
            .count()
    }

    pub fn connects(&self) -> usize {
        *self.connects.lock().unwrap()
    }

    pub fn closes(&self) -> usize {
        *self.closes.lock().unwrap()
    }
}

pub fn tool_call_text(request: &JsonRpcRequest, text: &str) -> JsonRpcResponse {
    JsonRpcResponse::success(
        request.id.clone(),
        json!({"content": [{"type": "text", "text": text}]}),
    )
}

/// `tools/list` answer advertising a single `forecast(city)` tool
pub fn forecast_listing(request: &JsonRpcRequest) -> JsonRpcResponse {
    JsonRpcResponse::success(
        request.id.clone(),
        json!({
            "tools": [{
                "name": "forecast",
                "description": "Weather forecast for a city",
                "inputSchema": {
                    "type": "object",
                    "properties": {"city": {"type": "string", "description": "City name"}},
                    "required": ["city"]
                }
            }],
            "nextCursor": "more",
            "_meta": {}
        }),
    )
}

fn initialize_ok(request: &JsonRpcRequest) -> JsonRpcResponse {
    JsonRpcResponse::success(
        request.id.clone(),
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "scripted", "version": "0.0.1"}
        }),
    )
}

/// Opens [`ScriptedTransport`]s. `initialize` is answered by the connector
/// itself; every other request goes to the responder.
#[derive(Clone)]
pub struct ScriptedConnector {
    responder: Arc<Responder>,
    pub calls: Arc<CallLog>,
    handshake_error: bool,
    refused: Option<String>,
    refuse_all: bool,
}

impl ScriptedConnector {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&JsonRpcRequest, usize) -> JsonRpcResponse + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            calls: Arc::new(CallLog::default()),
            handshake_error: false,
            refused: None,
            refuse_all: false,
        }
    }

    /// A server exposing one `forecast` tool that always answers "ok".
    pub fn healthy() -> Self {
        Self::new(|request, _| match request.method.as_str() {
            "tools/list" => forecast_listing(request),
            "tools/call" => tool_call_text(request, "ok"),
            other => JsonRpcResponse::failure(request.id.clone(), -32601, format!("unknown method {}", other)),
        })
    }

    pub fn with_handshake_error(mut self) -> Self {
        self.handshake_error = true;
        self
    }

    /// Refuse every connection attempt
    pub fn refusing(mut self) -> Self {
        self.refuse_all = true;
        self
    }

    /// Refuse connections launching `program`
    pub fn refusing_program(mut self, program: &str) -> Self {
        self.refused = Some(program.to_string());
        self
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, spec: &LaunchSpec) -> Result<Box<dyn Transport>> {
        let program = spec.program.to_string_lossy().to_string();
        if self.refuse_all || self.refused.as_deref() == Some(program.as_str()) {
            return Err(ChatError::McpError(format!("cannot launch {}", program)));
        }

        *self.calls.connects.lock().unwrap() += 1;
        Ok(Box::new(ScriptedTransport {
            responder: self.responder.clone(),
            calls: self.calls.clone(),
            handshake_error: self.handshake_error,
            pending: VecDeque::new(),
            seen: HashMap::new(),
            open: true,
        }))
    }
}

/// Answers each request synchronously through the responder.
pub struct ScriptedTransport {
    responder: Arc<Responder>,
    calls: Arc<CallLog>,
    handshake_error: bool,
    pending: VecDeque<JsonRpcResponse>,
    seen: HashMap<String, usize>,
    open: bool,
}

impl std::fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedTransport")
            .field("pending", &self.pending.len())
            .field("open", &self.open)
            .finish()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send_request(&mut self, request: JsonRpcRequest) -> Result<()> {
        self.calls.methods.lock().unwrap().push(request.method.clone());

        let response = if request.method == "initialize" {
            if self.handshake_error {
                JsonRpcResponse::failure(request.id.clone(), -32600, "unsupported protocol")
            } else {
                initialize_ok(&request)
            }
        } else {
            let seen = self.seen.entry(request.method.clone()).or_insert(0);
            let response = (self.responder)(&request, *seen);
            *seen += 1;
            response
        };

        self.pending.push_back(response);
        Ok(())
    }

    async fn send_notification(&mut self, notification: JsonRpcNotification) -> Result<()> {
        self.calls
            .notifications
            .lock()
            .unwrap()
            .push(notification.method);
        Ok(())
    }

    async fn receive_response(&mut self) -> Result<Option<JsonRpcResponse>> {
        Ok(self.pending.pop_front())
    }

    async fn is_connected(&self) -> bool {
        self.open
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        *self.calls.closes.lock().unwrap() += 1;
        Ok(())
    }
}
