//! Tool descriptors as advertised by a server's `tools/list`

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One callable tool: name, description and JSON-schema-like input schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default = "empty_schema", deserialize_with = "schema_or_empty")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    Value::Object(Map::new())
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn schema_or_empty<'de, D>(deserializer: D) -> Result<Value, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.unwrap_or_else(empty_schema))
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Render the descriptor as the plain-text block embedded in the system prompt.
    pub fn format_for_llm(&self) -> String {
        let required: Vec<&str> = self
            .input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let args: Vec<String> = self
            .input_schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|properties| {
                properties
                    .iter()
                    .map(|(param, info)| {
                        let description = info
                            .get("description")
                            .and_then(Value::as_str)
                            .unwrap_or("No description");
                        let mut line = format!("- {}: {}", param, description);
                        if required.contains(&param.as_str()) {
                            line.push_str(" (required)");
                        }
                        line
                    })
                    .collect()
            })
            .unwrap_or_default();

        format!(
            "\nTool: {}\nDescription: {}\nArguments:\n{}\n",
            self.name,
            self.description,
            args.join("\n")
        )
    }
}
