use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use toolchat_config::{Credentials, LlmSettings};
use toolchat_core::{ChatError, Message, Result};
use tracing::{debug, info, warn};

mod streaming;
pub use streaming::{parse_chunk, StreamAccumulator, StreamChunk};

/// A chat-completion backend.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send the conversation and return the assistant's reply.
    async fn complete(&self, messages: &[Message]) -> Result<String>;

    /// Like [`LlmClient::complete`], forwarding text fragments to `chunks` as
    /// they arrive. The returned string is the whole reply.
    async fn complete_stream(
        &self,
        messages: &[Message],
        chunks: UnboundedSender<String>,
    ) -> Result<String>;
}

/// Body of `POST /chat/completions`
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletionResponse {
    /// Content of the first choice
    pub fn into_text(self) -> Result<String> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::LlmError("Response contained no choices".into()))?;

        if let Some(reason) = &choice.finish_reason {
            debug!("Completion finished with reason: {}", reason);
        }
        Ok(choice.message.content.unwrap_or_default())
    }
}

/// Client for Groq's OpenAI-compatible completion endpoint
pub struct GroqClient {
    http: reqwest::Client,
    settings: LlmSettings,
    credentials: Credentials,
}

impl std::fmt::Debug for GroqClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqClient")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .finish()
    }
}

impl GroqClient {
    pub fn new(settings: LlmSettings, credentials: Credentials) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout))
            .build()
            .map_err(|e| ChatError::LlmError(format!("Failed to build HTTP client: {e}")))?;

        info!("Using model {} at {}", settings.model, settings.base_url);
        Ok(Self {
            http,
            settings,
            credentials,
        })
    }

    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }

    pub fn request_body<'a>(&'a self, messages: &'a [Message], stream: bool) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.settings.model,
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            top_p: self.settings.top_p,
            stream,
        }
    }

    fn post(&self, messages: &[Message], stream: bool) -> reqwest::RequestBuilder {
        self.http
            .post(self.endpoint())
            .bearer_auth(self.credentials.api_key())
            .json(&self.request_body(messages, stream))
    }
}

#[async_trait]
impl LlmClient for GroqClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        debug!("Requesting completion for {} messages", messages.len());

        let response = self
            .post(messages, false)
            .send()
            .await
            .map_err(|e| ChatError::LlmError(format!("Request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ChatError::LlmError(format!("Failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(format_api_error(status, &body));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| ChatError::LlmError(format!("Unexpected response payload: {e}")))?;
        parsed.into_text()
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        chunks: UnboundedSender<String>,
    ) -> Result<String> {
        debug!("Requesting streamed completion for {} messages", messages.len());

        let mut source = EventSource::new(self.post(messages, true))
            .map_err(|e| ChatError::LlmError(format!("Failed to open stream: {e}")))?;
        let mut accumulator = StreamAccumulator::new();

        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => debug!("Completion stream opened"),
                Ok(Event::Message(message)) => {
                    if let Some(fragment) = accumulator.push(&message.data)? {
                        // a dropped receiver only stops the echo, not the answer
                        let _ = chunks.send(fragment);
                    }
                    if accumulator.is_done() {
                        break;
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    source.close();
                    let body = response.text().await.unwrap_or_default();
                    return Err(format_api_error(status, &body));
                }
                Err(e) => {
                    source.close();
                    warn!("Stream error: {}", e);
                    return Err(ChatError::LlmError(format!("Stream error: {e}")));
                }
            }
        }

        source.close();
        Ok(accumulator.into_text())
    }
}

/// Turn a non-success HTTP response into an error with the API's own message.
fn format_api_error(status: StatusCode, body: &str) -> ChatError {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str().map(ToString::to_string))
        })
        .unwrap_or_else(|| body.chars().take(200).collect());

    match status {
        StatusCode::UNAUTHORIZED => ChatError::LlmError(format!(
            "Invalid or missing API key (HTTP 401): {detail}"
        )),
        StatusCode::TOO_MANY_REQUESTS => {
            ChatError::LlmError(format!("Rate limited (HTTP 429): {detail}"))
        }
        _ => ChatError::LlmError(format!("API error (HTTP {}): {}", status.as_u16(), detail)),
    }
}
