use std::sync::Arc;
use toolchat_conversation::ConversationState;
use toolchat_core::Result;
use toolchat_llm::LlmClient;
use toolchat_mcp::{render_tool_result, ToolServer};
use tracing::{debug, error, info, instrument, warn};

pub mod plain;
pub mod prompt;

pub use plain::PlainChat;
pub use prompt::{build_system_prompt, describe_tools, parse_tool_call, ToolCall};

#[cfg(test)]
mod testing;

/// Chat orchestrator that lets the model call tools on the configured servers.
///
/// One user turn makes at most two completion calls: the first may ask for a
/// tool, the second turns the tool's output into the answer.
pub struct ToolChatAgent {
    llm: Arc<dyn LlmClient>,
    servers: Vec<Arc<dyn ToolServer>>,
    tools_description: String,
}

impl ToolChatAgent {
    /// `servers` must be in declaration order; the first one exposing a tool
    /// handles calls to it.
    pub fn new(llm: Arc<dyn LlmClient>, servers: Vec<Arc<dyn ToolServer>>) -> Self {
        Self {
            llm,
            servers,
            tools_description: String::new(),
        }
    }

    /// List the tools of every server and cache their rendering for the
    /// system prompt. Returns the number of tools found.
    pub async fn prepare(&mut self) -> Result<usize> {
        let mut tools = Vec::new();
        for server in &self.servers {
            let listed = server.list_tools().await?;
            debug!("Server '{}' offers {} tools", server.name(), listed.len());
            tools.extend(listed);
        }

        self.tools_description = describe_tools(&tools);
        info!("Prepared system prompt with {} tools", tools.len());
        Ok(tools.len())
    }

    pub fn system_prompt(&self) -> String {
        build_system_prompt(&self.tools_description)
    }

    /// Answer one user message, recording the exchange in `state`.
    ///
    /// Never fails: errors become the text of the answer.
    #[instrument(skip(self, state, input), fields(conversation = %state.id))]
    pub async fn process_message(&self, state: &mut ConversationState, input: &str) -> String {
        state.push_user(input);

        let answer = match self.run_turn(state).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("Error processing message: {}", e);
                format!("Error processing message: {e}")
            }
        };

        state.push_assistant(answer.clone());
        answer
    }

    async fn run_turn(&self, state: &mut ConversationState) -> Result<String> {
        let system_prompt = self.system_prompt();
        let response = self.llm.complete(&state.context_with(&system_prompt)).await?;

        let Some(call) = parse_tool_call(&response) else {
            return Ok(response);
        };

        let Some(server) = self.find_server(&call.tool).await? else {
            warn!("No server found with tool: {}", call.tool);
            return Ok(response);
        };

        info!("Executing tool {} on server {}", call.tool, server.name());
        let result = match server.execute_tool(&call.tool, call.arguments).await {
            Ok(result) => result,
            Err(e) => {
                error!("Error executing tool: {}", e);
                return Ok(format!("Error executing tool: {e}"));
            }
        };

        if result.is_error() {
            warn!("Tool {} reported an error; passing it to the model", call.tool);
        }

        state.push_assistant(response);
        state.push_system(format!(
            "Tool execution result: {}",
            render_tool_result(&result)
        ));

        self.llm.complete(&state.context_with(&system_prompt)).await
    }

    async fn find_server(&self, tool: &str) -> Result<Option<Arc<dyn ToolServer>>> {
        for server in &self.servers {
            if server.list_tools().await?.iter().any(|t| t.name == tool) {
                return Ok(Some(server.clone()));
            }
        }
        Ok(None)
    }
}
