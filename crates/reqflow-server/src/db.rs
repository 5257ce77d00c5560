//! SQLite-backed [`ConversationStore`].

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use reqflow_agent::{
    Conversation, ConversationStore, MessageRole, NewMessage, StoreStats, StoredMessage,
};
use reqflow_types::ReqflowError;

type ConversationRow = (i64, String, Option<String>, Option<String>, String, String);
type MessageRow = (i64, i64, String, String, String, String);

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database at `url` and ensures the schema.
    pub async fn connect(url: &str) -> Result<Self, ReqflowError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(db_err)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(db_err)?;
        Self::with_pool(pool).await
    }

    /// Private database living as long as the store. One connection, since
    /// every SQLite memory connection is its own database.
    pub async fn in_memory() -> Result<Self, ReqflowError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;
        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: SqlitePool) -> Result<Self, ReqflowError> {
        init_schema(&pool).await.map_err(db_err)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT    NOT NULL,
            summary     TEXT,
            embedding   TEXT,
            created_at  TEXT    NOT NULL,
            updated_at  TEXT    NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id INTEGER NOT NULL REFERENCES conversations(id),
            role            TEXT    NOT NULL,
            content         TEXT    NOT NULL,
            message_type    TEXT    NOT NULL DEFAULT 'text',
            created_at      TEXT    NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn db_err(e: sqlx::Error) -> ReqflowError {
    ReqflowError::Persistence(e.to_string())
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, ReqflowError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ReqflowError::Persistence(format!("bad timestamp '{s}': {e}")))
}

fn conversation_from_row(row: ConversationRow) -> Result<Conversation, ReqflowError> {
    let (id, name, summary, embedding, created_at, updated_at) = row;
    Ok(Conversation {
        id,
        name,
        summary,
        embedding: embedding.and_then(|e| serde_json::from_str(&e).ok()),
        created_at: parse_time(&created_at)?,
        updated_at: parse_time(&updated_at)?,
    })
}

fn message_from_row(row: MessageRow) -> Result<StoredMessage, ReqflowError> {
    let (id, conversation_id, role, content, message_type, created_at) = row;
    let role = MessageRole::parse(&role)
        .ok_or_else(|| ReqflowError::Persistence(format!("unknown message role '{role}'")))?;
    Ok(StoredMessage {
        id,
        conversation_id,
        role,
        content,
        message_type,
        created_at: parse_time(&created_at)?,
    })
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn create_conversation(&self, name: &str) -> Result<Conversation, ReqflowError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO conversations (name, created_at, updated_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(Conversation {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            summary: None,
            embedding: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_conversation(&self, id: i64) -> Result<Option<Conversation>, ReqflowError> {
        let row = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT id, name, summary, embedding, created_at, updated_at
            FROM conversations
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(conversation_from_row).transpose()
    }

    async fn create_message(&self, message: NewMessage) -> Result<StoredMessage, ReqflowError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO messages (conversation_id, role, content, message_type, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(message.conversation_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&message.message_type)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(StoredMessage {
            id: result.last_insert_rowid(),
            conversation_id: message.conversation_id,
            role: message.role,
            content: message.content,
            message_type: message.message_type,
            created_at: now,
        })
    }

    async fn list_messages(&self, conversation_id: i64) -> Result<Vec<StoredMessage>, ReqflowError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, conversation_id, role, content, message_type, created_at
            FROM messages
            WHERE conversation_id = ?
            ORDER BY id
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(message_from_row).collect()
    }

    async fn update_conversation_summary(
        &self,
        id: i64,
        summary: &str,
        embedding: Option<Vec<f32>>,
    ) -> Result<(), ReqflowError> {
        let embedding = embedding
            .map(|e| serde_json::to_string(&e))
            .transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET summary = ?, embedding = COALESCE(?, embedding), updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(summary)
        .bind(embedding)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(ReqflowError::Persistence(format!(
                "conversation {id} does not exist"
            )));
        }
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, ReqflowError> {
        let (conversations, messages) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM conversations),
                (SELECT COUNT(*) FROM messages)
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(StoreStats {
            conversations: conversations as u64,
            messages: messages as u64,
        })
    }
}
