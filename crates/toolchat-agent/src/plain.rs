//! Direct chat over the model with streamed output and no tools

use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use toolchat_conversation::ConversationState;
use toolchat_llm::LlmClient;
use tracing::{error, instrument};

pub struct PlainChat {
    llm: Arc<dyn LlmClient>,
}

impl PlainChat {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Send the history plus `input`, forwarding text fragments to `chunks`.
    /// The full reply is recorded in `state` and returned; a failed request
    /// is recorded as an error message instead.
    #[instrument(skip(self, state, input, chunks), fields(conversation = %state.id))]
    pub async fn send(
        &self,
        state: &mut ConversationState,
        input: &str,
        chunks: UnboundedSender<String>,
    ) -> String {
        state.push_user(input);

        let answer = match self.llm.complete_stream(state.turns(), chunks).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("Streaming completion failed: {}", e);
                format!("Error processing message: {e}")
            }
        };

        state.push_assistant(answer.clone());
        answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockLlm;
    use tokio::sync::mpsc;
    use toolchat_core::{ChatError, Message, MessageRole};

    #[tokio::test]
    async fn test_streams_fragments_and_records_reply() {
        let mut llm = MockLlm::new();
        llm.expect_complete_stream()
            .times(1)
            .withf(|messages: &[Message], _| {
                messages.len() == 1 && messages[0] == Message::user("What is up?")
            })
            .returning(|_, chunks| {
                for fragment in ["Not ", "much."] {
                    chunks.send(fragment.to_string()).unwrap();
                }
                Ok("Not much.".to_string())
            });

        let chat = PlainChat::new(Arc::new(llm));
        let mut state = ConversationState::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let answer = chat.send(&mut state, "What is up?", tx).await;
        assert_eq!(answer, "Not much.");

        let mut streamed = String::new();
        while let Some(fragment) = rx.recv().await {
            streamed.push_str(&fragment);
        }
        assert_eq!(streamed, answer);
        assert_eq!(state.count_role(MessageRole::Assistant), 1);
        assert_eq!(state.last().unwrap().content, "Not much.");
    }

    #[tokio::test]
    async fn test_failed_stream_is_recorded_as_error() {
        let mut llm = MockLlm::new();
        llm.expect_complete_stream()
            .times(1)
            .returning(|_, _| Err(ChatError::LlmError("Rate limited (HTTP 429)".into())));

        let chat = PlainChat::new(Arc::new(llm));
        let mut state = ConversationState::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let answer = chat.send(&mut state, "hi", tx).await;
        assert!(answer.starts_with("Error processing message: "));
        assert_eq!(state.len(), 2);
    }
}
