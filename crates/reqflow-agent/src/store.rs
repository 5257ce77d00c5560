//! Conversation persistence seam.
//!
//! The agent only talks to [`ConversationStore`]; the server backs it with
//! SQLite and tests use [`InMemoryStore`].

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reqflow_types::ReqflowError;

pub const TEXT_MESSAGE: &str = "text";
pub const PIPELINE_RESULT_MESSAGE: &str = "pipeline_result";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            "system" => Some(MessageRole::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub name: String,
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub conversation_id: i64,
    pub role: MessageRole,
    pub content: String,
    pub message_type: String,
}

impl NewMessage {
    pub fn text(conversation_id: i64, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            conversation_id,
            role,
            content: content.into(),
            message_type: TEXT_MESSAGE.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub conversation_id: i64,
    pub role: MessageRole,
    pub content: String,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub conversations: u64,
    pub messages: u64,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(&self, name: &str) -> Result<Conversation, ReqflowError>;

    async fn get_conversation(&self, id: i64) -> Result<Option<Conversation>, ReqflowError>;

    async fn create_message(&self, message: NewMessage) -> Result<StoredMessage, ReqflowError>;

    async fn list_messages(&self, conversation_id: i64) -> Result<Vec<StoredMessage>, ReqflowError>;

    async fn update_conversation_summary(
        &self,
        id: i64,
        summary: &str,
        embedding: Option<Vec<f32>>,
    ) -> Result<(), ReqflowError>;

    async fn stats(&self) -> Result<StoreStats, ReqflowError>;
}

// ---------------------------------------------------------------------------
// InMemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tables {
    conversations: Vec<Conversation>,
    messages: Vec<StoredMessage>,
}

/// Process-local store. Ids start at 1 like an autoincrement column.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn create_conversation(&self, name: &str) -> Result<Conversation, ReqflowError> {
        let mut tables = self.lock();
        let now = Utc::now();
        let conversation = Conversation {
            id: tables.conversations.len() as i64 + 1,
            name: name.to_string(),
            summary: None,
            embedding: None,
            created_at: now,
            updated_at: now,
        };
        tables.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn get_conversation(&self, id: i64) -> Result<Option<Conversation>, ReqflowError> {
        Ok(self.lock().conversations.iter().find(|c| c.id == id).cloned())
    }

    async fn create_message(&self, message: NewMessage) -> Result<StoredMessage, ReqflowError> {
        let mut tables = self.lock();
        if !tables.conversations.iter().any(|c| c.id == message.conversation_id) {
            return Err(ReqflowError::Persistence(format!(
                "conversation {} does not exist",
                message.conversation_id
            )));
        }
        let stored = StoredMessage {
            id: tables.messages.len() as i64 + 1,
            conversation_id: message.conversation_id,
            role: message.role,
            content: message.content,
            message_type: message.message_type,
            created_at: Utc::now(),
        };
        tables.messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_messages(&self, conversation_id: i64) -> Result<Vec<StoredMessage>, ReqflowError> {
        Ok(self
            .lock()
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn update_conversation_summary(
        &self,
        id: i64,
        summary: &str,
        embedding: Option<Vec<f32>>,
    ) -> Result<(), ReqflowError> {
        let mut tables = self.lock();
        let conversation = tables
            .conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ReqflowError::Persistence(format!("conversation {id} does not exist")))?;
        conversation.summary = Some(summary.to_string());
        if embedding.is_some() {
            conversation.embedding = embedding;
        }
        conversation.updated_at = Utc::now();
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, ReqflowError> {
        let tables = self.lock();
        Ok(StoreStats {
            conversations: tables.conversations.len() as u64,
            messages: tables.messages.len() as u64,
        })
    }
}
