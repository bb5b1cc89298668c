pub mod state;

pub use state::ConversationState;
