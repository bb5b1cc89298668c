use async_trait::async_trait;
use mockall::mock;
use tokio::sync::mpsc::UnboundedSender;
use toolchat_core::{Message, Result};
use toolchat_llm::LlmClient;

mock! {
    pub Llm {}

    #[async_trait]
    impl LlmClient for Llm {
        async fn complete(&self, messages: &[Message]) -> Result<String>;
        async fn complete_stream(
            &self,
            messages: &[Message],
            chunks: UnboundedSender<String>,
        ) -> Result<String>;
    }
}
