//! Rendering of tool results into prompt text

use serde_json::Value;

use crate::types::{ContentItem, ToolCallResult};

/// Flatten a tool result into the text fed back to the model.
pub fn render_tool_result(result: &ToolCallResult) -> String {
    result
        .content
        .iter()
        .map(|item| match item {
            ContentItem::Text { text } => text.clone(),
            ContentItem::Image { mime_type, .. } => format!("[image: {}]", mime_type),
            ContentItem::Resource { resource } => text_or_json(resource),
            ContentItem::Other(item) => text_or_json(item),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn text_or_json(value: &Value) -> String {
    value
        .get("text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_single_text() {
        let result = ToolCallResult::text("Hello, world!");
        assert_eq!(render_tool_result(&result), "Hello, world!");
    }

    #[test]
    fn test_render_mixed_content() {
        let result = ToolCallResult {
            content: vec![
                ContentItem::Text { text: "Line 1".into() },
                ContentItem::Image {
                    data: "base64data".into(),
                    mime_type: "image/png".into(),
                },
                ContentItem::Resource {
                    resource: json!({"uri": "file:///notes.txt", "text": "notes"}),
                },
                ContentItem::Resource {
                    resource: json!({"uri": "file:///blob.bin"}),
                },
            ],
            ..ToolCallResult::default()
        };

        assert_eq!(
            render_tool_result(&result),
            "Line 1\n[image: image/png]\nnotes\n{\"uri\":\"file:///blob.bin\"}"
        );
    }

    #[test]
    fn test_render_unrecognised_items_keeps_their_data() {
        let result: ToolCallResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "City 'Atlantis' not found", "annotations": {"audience": ["user"]}},
                {"type": "resource_link", "uri": "file:///report.pdf"}
            ],
            "isError": true
        }))
        .unwrap();

        assert_eq!(
            render_tool_result(&result),
            "City 'Atlantis' not found\n{\"type\":\"resource_link\",\"uri\":\"file:///report.pdf\"}"
        );
    }

    #[test]
    fn test_render_empty() {
        let result = ToolCallResult::default();
        assert_eq!(render_tool_result(&result), "");
    }
}
