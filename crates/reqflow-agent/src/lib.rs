//! Conversational requirements assistant.
//!
//! A [`ConversationAgent`] answers chat commands, collects requirement-like
//! messages, runs the analysis pipeline on demand, and hands free-form text to
//! an LLM [`ToolDriver`] that can call the pipeline stages as tools. Every
//! exchange is written through a [`ConversationStore`].

pub mod agent;
pub mod commands;
pub mod driver;
pub mod store;

pub use agent::{AgentState, ConversationAgent};
pub use commands::{looks_like_requirement, Command, HELP_TEXT};
pub use driver::{ToolDriver, DEFAULT_SYSTEM_PROMPT};
pub use store::{
    Conversation, ConversationStore, InMemoryStore, MessageRole, NewMessage, StoreStats,
    StoredMessage, PIPELINE_RESULT_MESSAGE, TEXT_MESSAGE,
};
