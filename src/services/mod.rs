pub mod actions;
pub mod conversation;

pub use actions::{ActionDispatcher, ActionEnvelope, ActionKind, DispatchOutcome, DomainStores};
pub use conversation::{ConversationClient, HttpConversationClient, Reply, SessionMetadata};
