pub mod dispatcher;
pub mod handler;
pub mod registry;

use crate::session::{ChatSession, ConversationStore};
pub use dispatcher::create_command_registry;

/// What slash commands operate on during `promptgen chat`.
pub struct ChatState {
    pub session: ChatSession,
    pub store: ConversationStore,
    pub should_continue: bool,
}

impl ChatState {
    pub fn new(session: ChatSession, store: ConversationStore) -> Self {
        Self {
            session,
            store,
            should_continue: true,
        }
    }
}
