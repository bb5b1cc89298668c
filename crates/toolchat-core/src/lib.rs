use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single chat turn as exchanged with the completion API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let role = match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };
        f.write_str(role)
    }
}

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection to server '{server}' failed: {message}")]
    ConnectionError { server: String, message: String },

    #[error("Tool execution failed for '{tool}': {message}")]
    ToolExecutionError { tool: String, message: String },

    #[error("Server '{0}' is not initialized")]
    NotInitialized(String),

    #[error("MCP communication error: {0}")]
    McpError(String),

    #[error("LLM request failed: {0}")]
    LlmError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl ChatError {
    /// Precondition failures signal a caller bug and are never retried.
    pub fn is_precondition(&self) -> bool {
        matches!(self, ChatError::NotInitialized(_))
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_format() {
        let message = Message::user("hello");
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hello"}));
    }

    #[test]
    fn test_error_display() {
        let err = ChatError::ToolExecutionError {
            tool: "weather".to_string(),
            message: "timed out".to_string(),
        };
        assert_eq!(err.to_string(), "Tool execution failed for 'weather': timed out");
        assert!(ChatError::NotInitialized("fs".into()).is_precondition());
        assert!(!err.is_precondition());
    }
}
