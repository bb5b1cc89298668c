use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use toolchat_core::{Message, MessageRole};
use tracing::debug;
use uuid::Uuid;

/// The ordered turns of one chat session.
///
/// The system prompt is not stored here; it is rebuilt for every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    turns: Vec<Message>,
}

impl ConversationState {
    pub fn new() -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4();
        debug!("Started conversation {}", id);
        Self {
            id,
            created_at: now,
            updated_at: now,
            turns: Vec::new(),
        }
    }

    pub fn push(&mut self, message: Message) {
        self.turns.push(message);
        self.updated_at = Utc::now();
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(Message::assistant(content));
    }

    pub fn push_system(&mut self, content: impl Into<String>) {
        self.push(Message::system(content));
    }

    pub fn turns(&self) -> &[Message] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.turns.last()
    }

    /// Count of turns with the given role
    pub fn count_role(&self, role: MessageRole) -> usize {
        self.turns.iter().filter(|m| m.role == role).count()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.updated_at = Utc::now();
    }

    /// `system_prompt` followed by every recorded turn
    pub fn context_with(&self, system_prompt: &str) -> Vec<Message> {
        let mut context = Vec::with_capacity(self.turns.len() + 1);
        context.push(Message::system(system_prompt));
        context.extend(self.turns.iter().cloned());
        context
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}
