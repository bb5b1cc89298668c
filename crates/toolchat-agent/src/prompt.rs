//! System prompt assembly and tool-call detection

use serde_json::Value;
use toolchat_mcp::ToolDescriptor;

const PREAMBLE: &str = "You are a helpful assistant with access to these tools:\n\n";

const INSTRUCTIONS: &str = "Choose the appropriate tool based on the user's question. \
If no tool is needed, reply directly.\n\n\
IMPORTANT: When you need to use a tool, you must ONLY respond with \
the exact JSON object format below, nothing else:\n\
{\n    \"tool\": \"tool-name\",\n    \"arguments\": {\n        \"argument-name\": \"value\"\n    }\n}\n\n\
After receiving a tool's response:\n\
1. Transform the raw data into a natural, conversational response\n\
2. Keep responses concise but informative\n\
3. Focus on the most relevant information\n\
4. Use appropriate context from the user's question\n\
5. Avoid simply repeating the raw data\n\n\
Please use only the tools that are explicitly defined above.";

/// Render every descriptor, one block per tool.
pub fn describe_tools(tools: &[ToolDescriptor]) -> String {
    tools
        .iter()
        .map(ToolDescriptor::format_for_llm)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_system_prompt(tools_description: &str) -> String {
    format!("{PREAMBLE}{tools_description}\n{INSTRUCTIONS}")
}

/// A model reply asking for one tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub tool: String,
    pub arguments: Value,
}

/// Recognise a tool invocation.
///
/// The whole reply, trimmed, must be a JSON object with exactly the keys
/// `tool` (a string) and `arguments` (an object). Anything else is a plain
/// answer and yields `None`.
pub fn parse_tool_call(response: &str) -> Option<ToolCall> {
    let Ok(Value::Object(mut object)) = serde_json::from_str::<Value>(response.trim()) else {
        return None;
    };
    if object.len() != 2 {
        return None;
    }

    match (object.remove("tool"), object.remove("arguments")) {
        (Some(Value::String(tool)), Some(arguments @ Value::Object(_))) => {
            Some(ToolCall { tool, arguments })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_exact_shape_is_a_tool_call() {
        let call = parse_tool_call(r#"{"tool": "x", "arguments": {"a": 1}}"#).unwrap();
        assert_eq!(call.tool, "x");
        assert_eq!(call.arguments, json!({"a": 1}));

        let padded = parse_tool_call("\n  {\"tool\": \"now\", \"arguments\": {}}  \n").unwrap();
        assert_eq!(padded.tool, "now");
    }

    #[test]
    fn test_other_shapes_are_plain_answers() {
        assert_eq!(parse_tool_call(r#"{"tool": "x"}"#), None);
        assert_eq!(parse_tool_call(r#"{"arguments": {}}"#), None);
        assert_eq!(
            parse_tool_call(r#"{"tool": "x", "arguments": {}, "reason": "because"}"#),
            None
        );
        assert_eq!(parse_tool_call(r#"{"tool": 7, "arguments": {}}"#), None);
        assert_eq!(parse_tool_call(r#"{"tool": "x", "arguments": "a=1"}"#), None);
        assert_eq!(parse_tool_call(r#"[{"tool": "x", "arguments": {}}]"#), None);
        assert_eq!(
            parse_tool_call(r#"Sure! {"tool": "x", "arguments": {}}"#),
            None
        );
        assert_eq!(parse_tool_call("It is sunny."), None);
    }

    #[test]
    fn test_system_prompt_embeds_tools() {
        let tools = vec![
            ToolDescriptor::new(
                "search",
                "Find docs",
                json!({"properties": {"q": {"description": "query"}}, "required": ["q"]}),
            ),
            ToolDescriptor::new("now", "Current time", json!({})),
        ];

        let description = describe_tools(&tools);
        let prompt = build_system_prompt(&description);

        assert!(prompt.starts_with("You are a helpful assistant with access to these tools:\n\n"));
        assert!(prompt.contains("- q: query (required)"));
        assert!(prompt.find("Tool: search").unwrap() < prompt.find("Tool: now").unwrap());
        assert!(prompt.contains("\"tool\": \"tool-name\""));
        assert!(prompt.ends_with("Please use only the tools that are explicitly defined above."));
    }
}
