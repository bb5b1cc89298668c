//! MCP protocol types and JSON-RPC message structures

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use toolchat_core::{ChatError, Result};
use tracing::{debug, warn};

use crate::tool::ToolDescriptor;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: String, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.into(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// JSON-RPC 2.0 notification (no id, no response expected)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Classification of a line read from a server's stdout.
#[derive(Debug)]
pub enum IncomingMessage {
    Response(JsonRpcResponse),
    /// Server-initiated request or notification; the client does not serve these.
    ServerMessage { method: String },
}

impl IncomingMessage {
    pub fn parse(line: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(line)?;
        if let Some(method) = value.get("method").and_then(Value::as_str) {
            return Ok(IncomingMessage::ServerMessage {
                method: method.to_string(),
            });
        }
        Ok(IncomingMessage::Response(serde_json::from_value(value)?))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "toolchat".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Initialize request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: ClientCapabilities,
    pub client_info: ClientInfo,
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: ClientInfo::default(),
        }
    }
}

/// Initialize response result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_info: Option<ServerInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// Tool call parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    pub arguments: Value,
}

/// Tool call result, returned to callers verbatim.
///
/// Fields the client does not model (`structuredContent`, `_meta`, ...) are
/// kept in `extra` so the payload serializes back unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ToolCallResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::Text { text: text.into() }],
            ..Self::default()
        }
    }

    /// Whether the tool flagged its own output as an error
    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }
}

/// Content item in tool results.
///
/// Items that do not match one of the typed shapes exactly are kept as
/// `Other` with their original JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum ContentItem {
    Text { text: String },
    Image { data: String, mime_type: String },
    Resource { resource: Value },
    Other(Value),
}

impl ContentItem {
    fn typed(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let field = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);

        let item = match object.get("type")?.as_str()? {
            "text" => ContentItem::Text { text: field("text")? },
            "image" => ContentItem::Image {
                data: field("data")?,
                mime_type: field("mimeType")?,
            },
            "resource" => ContentItem::Resource {
                resource: object.get("resource")?.clone(),
            },
            _ => return None,
        };

        // extra keys such as `annotations` would be lost in the typed form
        (Value::from(item.clone()) == *value).then_some(item)
    }
}

impl From<Value> for ContentItem {
    fn from(value: Value) -> Self {
        Self::typed(&value).unwrap_or(ContentItem::Other(value))
    }
}

impl From<ContentItem> for Value {
    fn from(item: ContentItem) -> Self {
        match item {
            ContentItem::Text { text } => json!({"type": "text", "text": text}),
            ContentItem::Image { data, mime_type } => {
                json!({"type": "image", "data": data, "mimeType": mime_type})
            }
            ContentItem::Resource { resource } => json!({"type": "resource", "resource": resource}),
            ContentItem::Other(value) => value,
        }
    }
}

/// One tagged section of a `tools/list` result.
#[derive(Debug, Clone)]
pub enum ListingSection {
    Tools(Vec<ToolDescriptor>),
    NextCursor(String),
    Other(String),
}

impl ListingSection {
    fn decode(tag: String, value: Value) -> Result<Self> {
        match tag.as_str() {
            "tools" => {
                let Value::Array(entries) = value else {
                    return Err(ChatError::McpError(
                        "tools/list 'tools' section is not an array".into(),
                    ));
                };
                Ok(ListingSection::Tools(
                    entries.into_iter().filter_map(decode_tool).collect(),
                ))
            }
            "nextCursor" => match value {
                Value::String(cursor) => Ok(ListingSection::NextCursor(cursor)),
                _ => Ok(ListingSection::Other(tag)),
            },
            _ => Ok(ListingSection::Other(tag)),
        }
    }
}

/// One malformed entry is skipped rather than failing the whole listing.
fn decode_tool(entry: Value) -> Option<ToolDescriptor> {
    match serde_json::from_value(entry) {
        Ok(tool) => Some(tool),
        Err(e) => {
            warn!("Skipping malformed tool in tools/list: {}", e);
            None
        }
    }
}

/// A `tools/list` result decoded into its sections.
#[derive(Debug, Clone)]
pub struct ToolListing {
    pub sections: Vec<ListingSection>,
}

impl ToolListing {
    pub fn from_result(result: Value) -> Result<Self> {
        let Value::Object(map) = result else {
            return Err(ChatError::McpError(
                "tools/list result is not an object".into(),
            ));
        };

        let sections = map
            .into_iter()
            .map(|(tag, value)| ListingSection::decode(tag, value))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { sections })
    }

    /// Take the `tools` section; every other section is ignored.
    pub fn into_tools(self) -> Vec<ToolDescriptor> {
        let mut tools = None;
        for section in self.sections {
            match section {
                ListingSection::Tools(found) if tools.is_none() => tools = Some(found),
                ListingSection::Tools(_) => {}
                ListingSection::NextCursor(cursor) => {
                    debug!("Ignoring tools/list cursor {}", cursor)
                }
                ListingSection::Other(tag) => debug!("Ignoring tools/list section '{}'", tag),
            }
        }
        tools.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_rpc_request_serialization() {
        let request = JsonRpcRequest::new(
            "test-123".to_string(),
            "initialize",
            Some(json!({ "protocolVersion": PROTOCOL_VERSION })),
        );

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":\"test-123\""));
        assert!(json.contains("\"method\":\"initialize\""));

        let bare = JsonRpcRequest::new("1".to_string(), "tools/list", None);
        assert!(!serde_json::to_string(&bare).unwrap().contains("params"));
    }

    #[test]
    fn test_initialize_params_shape() {
        let value = serde_json::to_value(InitializeParams::default()).unwrap();
        assert_eq!(value["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(value["clientInfo"]["name"], "toolchat");
        assert!(value["capabilities"].is_object());
    }

    #[test]
    fn test_incoming_message_classification() {
        let response = IncomingMessage::parse(r#"{"jsonrpc":"2.0","id":"7","result":{}}"#).unwrap();
        assert!(matches!(response, IncomingMessage::Response(ref r) if r.id == "7"));

        let ping = IncomingMessage::parse(r#"{"jsonrpc":"2.0","id":"s1","method":"ping"}"#).unwrap();
        assert!(matches!(ping, IncomingMessage::ServerMessage { ref method } if method == "ping"));

        assert!(IncomingMessage::parse("Server listening on stdio").is_err());
    }

    #[test]
    fn test_listing_keeps_only_tools_section() {
        let listing = ToolListing::from_result(json!({
            "_meta": {"progressToken": 1},
            "tools": [
                {"name": "read_file", "description": "Read a file", "inputSchema": {"type": "object"}},
                {"name": "ping", "inputSchema": {}}
            ],
            "nextCursor": "page-2"
        }))
        .unwrap();

        assert_eq!(listing.sections.len(), 3);
        let tools = listing.into_tools();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "read_file");
        assert_eq!(tools[1].description, "");
    }

    #[test]
    fn test_listing_without_tools_section_is_empty() {
        let tools = ToolListing::from_result(json!({"resources": []}))
            .unwrap()
            .into_tools();
        assert!(tools.is_empty());
        assert!(ToolListing::from_result(json!([1, 2])).is_err());
    }

    #[test]
    fn test_tool_call_result_content_items() {
        let result: ToolCallResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "22C and sunny"},
                {"type": "image", "data": "aGk=", "mimeType": "image/png"},
                {"type": "audio", "data": "UklGRg==", "mimeType": "audio/wav"},
                {"type": "text", "text": "noted", "annotations": {"priority": 1}}
            ],
            "isError": false
        }))
        .unwrap();

        assert_eq!(result.content.len(), 4);
        assert_eq!(result.content[0], ContentItem::Text { text: "22C and sunny".into() });
        assert!(matches!(result.content[1], ContentItem::Image { ref mime_type, .. } if mime_type == "image/png"));
        assert!(matches!(result.content[2], ContentItem::Other(ref item) if item["type"] == "audio"));
        assert!(matches!(result.content[3], ContentItem::Other(ref item) if item["annotations"]["priority"] == 1));
        assert!(!result.is_error());
    }

    #[test]
    fn test_tool_call_result_keeps_unmodelled_fields() {
        let payload = json!({
            "_meta": {"k": 1},
            "content": [
                {"type": "audio", "data": "UklGRg==", "mimeType": "audio/wav"},
                {"type": "resource_link", "uri": "file:///report.pdf", "name": "report"}
            ],
            "structuredContent": {"temperature": 22},
            "isError": true
        });

        let result: ToolCallResult = serde_json::from_value(payload.clone()).unwrap();
        assert!(result.is_error());
        assert_eq!(result.extra["structuredContent"]["temperature"], 22);
        assert_eq!(serde_json::to_value(&result).unwrap(), payload);
    }

    #[test]
    fn test_listing_skips_malformed_tools() {
        let tools = ToolListing::from_result(json!({
            "tools": [
                {"name": "a", "description": "ok", "inputSchema": {}},
                {"name": "b", "description": null, "inputSchema": null},
                {"description": "no name"}
            ]
        }))
        .unwrap()
        .into_tools();

        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(tools[1].description, "");
        assert!(tools[1].input_schema.as_object().unwrap().is_empty());
    }
}
