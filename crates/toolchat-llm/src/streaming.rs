use serde_json::Value;
use toolchat_core::{ChatError, Result};
use tracing::debug;

/// Terminal data payload of a completion stream
pub const DONE_MARKER: &str = "[DONE]";

/// What one server-sent event contributed to the answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    Content(String),
    /// A chunk without text (role announcement, finish reason, usage)
    Empty,
    Done,
}

/// Decode the `data` field of one streamed event.
pub fn parse_chunk(data: &str) -> Result<StreamChunk> {
    let data = data.trim();
    if data == DONE_MARKER {
        return Ok(StreamChunk::Done);
    }

    let value: Value = serde_json::from_str(data)
        .map_err(|e| ChatError::LlmError(format!("Malformed stream chunk: {e}")))?;

    let choice = value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first());

    let Some(choice) = choice else {
        return Ok(StreamChunk::Empty);
    };

    if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
        debug!("Stream finished with reason: {}", reason);
    }

    match choice
        .get("delta")
        .and_then(|delta| delta.get("content"))
        .and_then(Value::as_str)
    {
        Some(content) if !content.is_empty() => Ok(StreamChunk::Content(content.to_string())),
        _ => Ok(StreamChunk::Empty),
    }
}

/// Reassembles the full answer from streamed chunks.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    done: bool,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one event payload; returns the text fragment it carried, if any.
    pub fn push(&mut self, data: &str) -> Result<Option<String>> {
        if self.done {
            return Ok(None);
        }
        match parse_chunk(data)? {
            StreamChunk::Content(fragment) => {
                self.text.push_str(&fragment);
                Ok(Some(fragment))
            }
            StreamChunk::Empty => Ok(None),
            StreamChunk::Done => {
                self.done = true;
                Ok(None)
            }
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn into_text(self) -> String {
        self.text
    }
}
