//! Conversation Store: append-only persistence for multi-turn
//! conversations, backed by `SQLite` (schema in [`schema`]).
//!
//! Appends are serialized per conversation through an in-process keyed
//! mutex ("serialize appends to the same conversation rather than
//! rejecting the loser") rather than relying solely on the database
//! connection's own serialization, so a slow append to one conversation
//! never blocks an append to another.

pub mod schema;

use crate::error::{Error, Result, StoreError};
use crate::model::{Conversation, Message, RequestIdentity, Role, Source, TokenUsage};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

/// Metadata-only projection of a [`Conversation`], returned by
/// [`ConversationStore::list`] without loading message bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSummary {
    /// Conversation id.
    pub conversation_id: Uuid,
    /// Owner identifier.
    pub owner_id: String,
    /// Answer language for this conversation.
    pub language: crate::model::Language,
    /// Model id used for generation in this conversation.
    pub model_id: String,
    /// When the conversation was created.
    pub created_at: DateTime<Utc>,
    /// When the conversation was last appended to.
    pub updated_at: DateTime<Utc>,
    /// Number of messages recorded so far.
    pub message_count: usize,
}

/// Persistent, append-only conversation store.
pub struct ConversationStore {
    conn: StdMutex<Connection>,
    conversation_locks: StdMutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl ConversationStore {
    /// Opens (or creates) the conversation database at `path` and ensures
    /// the schema is initialized.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the database cannot be opened or the
    /// schema cannot be created.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(StoreError::from)?;
        conn.execute("PRAGMA foreign_keys = ON;", []).map_err(StoreError::from)?;
        let _: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0)).map_err(StoreError::from)?;
        conn.execute_batch(schema::SCHEMA_SQL).map_err(StoreError::from)?;
        conn.execute(schema::SET_VERSION_SQL, params![schema::CURRENT_SCHEMA_VERSION.to_string()]).map_err(StoreError::from)?;

        Ok(Self {
            conn: StdMutex::new(conn),
            conversation_locks: StdMutex::new(HashMap::new()),
        })
    }

    /// Opens an in-memory database. Useful for tests.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the schema cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::from)?;
        conn.execute("PRAGMA foreign_keys = ON;", []).map_err(StoreError::from)?;
        conn.execute_batch(schema::SCHEMA_SQL).map_err(StoreError::from)?;
        conn.execute(schema::SET_VERSION_SQL, params![schema::CURRENT_SCHEMA_VERSION.to_string()]).map_err(StoreError::from)?;

        Ok(Self {
            conn: StdMutex::new(conn),
            conversation_locks: StdMutex::new(HashMap::new()),
        })
    }

    fn lock_for(&self, conversation_id: Uuid) -> Arc<AsyncMutex<()>> {
        let mut locks = self.conversation_locks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(locks.entry(conversation_id).or_insert_with(|| Arc::new(AsyncMutex::new(()))))
    }

    /// Creates a new, empty conversation and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the insert fails.
    pub async fn create(&self, owner_id: &str, owner_email: Option<&str>, language: crate::model::Language, model_id: &str) -> Result<Uuid> {
        let conversation_id = Uuid::new_v4();
        let now = Utc::now();
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute(
            "INSERT INTO conversations (conversation_id, owner_id, owner_email, language, model_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![conversation_id.to_string(), owner_id, owner_email, language.to_string(), model_id, now.to_rfc3339(), now.to_rfc3339()],
        )
        .map_err(StoreError::from)?;
        Ok(conversation_id)
    }

    /// Appends `message` to `conversation_id`, enforcing the user/assistant
    /// role-alternation invariant starting with `user`.
    /// Concurrent appends to the same conversation are serialized; appends
    /// to different conversations proceed independently.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the conversation does not exist, or
    /// [`Error::Storage`] wrapping [`StoreError::RoleAlternation`] if
    /// `message.role` would not continue the alternation.
    pub async fn append(&self, conversation_id: Uuid, message: Message) -> Result<()> {
        let lock = self.lock_for(conversation_id);
        let _guard = lock.lock().await;
        let mut conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let tx = conn.transaction().map_err(StoreError::from)?;
        insert_message(&tx, conversation_id, &message)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(())
    }

    /// Appends the user question and the assistant's reply to
    /// `conversation_id` as a single atomic unit: both inserts commit
    /// together or neither does, so a mid-turn storage failure never
    /// leaves a dangling, reply-less user message behind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the conversation does not exist, or
    /// [`Error::Storage`] wrapping [`StoreError::RoleAlternation`] if either
    /// message would not continue the alternation.
    pub async fn append_turn(&self, conversation_id: Uuid, user_message: Message, assistant_message: Message) -> Result<()> {
        let lock = self.lock_for(conversation_id);
        let _guard = lock.lock().await;
        let mut conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let tx = conn.transaction().map_err(StoreError::from)?;
        insert_message(&tx, conversation_id, &user_message)?;
        insert_message(&tx, conversation_id, &assistant_message)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(())
    }

    /// Loads a conversation's full message history, enforcing access
    /// control.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no such conversation exists, or
    /// [`Error::AccessDenied`] if `requester` is not its owner, an admin, or
    /// the conversation is not owned by the anonymous sentinel.
    pub async fn get(&self, conversation_id: Uuid, requester: &RequestIdentity) -> Result<Conversation> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let id_text = conversation_id.to_string();

        let row = conn
            .query_row(
                "SELECT owner_id, owner_email, language, model_id, created_at, updated_at FROM conversations WHERE conversation_id = ?1",
                params![id_text],
                |row| {
                    let owner_id: String = row.get(0)?;
                    let owner_email: Option<String> = row.get(1)?;
                    let language: String = row.get(2)?;
                    let model_id: String = row.get(3)?;
                    let created_at: String = row.get(4)?;
                    let updated_at: String = row.get(5)?;
                    Ok((owner_id, owner_email, language, model_id, created_at, updated_at))
                },
            )
            .optional()
            .map_err(StoreError::from)?;

        let Some((owner_id, owner_email, language, model_id, created_at, updated_at)) = row else {
            return Err(Error::NotFound(conversation_id.to_string()));
        };

        if !requester.can_access(&owner_id) {
            return Err(Error::AccessDenied);
        }

        let mut stmt = conn
            .prepare("SELECT role, content, created_at, sources, model, tokens_input, tokens_output, cost FROM messages WHERE conversation_id = ?1 ORDER BY seq ASC")
            .map_err(StoreError::from)?;
        let messages = stmt
            .query_map(params![id_text], row_to_message)
            .map_err(StoreError::from)?
            .collect::<std::result::Result<Vec<Message>, rusqlite::Error>>()
            .map_err(StoreError::from)?;

        Ok(Conversation {
            conversation_id,
            owner_id,
            owner_email,
            language: parse_language(&language),
            model_id,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
            messages,
        })
    }

    /// Lists conversation metadata visible to `requester`: an admin sees
    /// every conversation, a non-admin sees only its own plus any owned by
    /// the anonymous sentinel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the query fails.
    pub async fn list(&self, requester: &RequestIdentity) -> Result<Vec<ConversationSummary>> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut stmt = conn
            .prepare(
                "SELECT c.conversation_id, c.owner_id, c.language, c.model_id, c.created_at, c.updated_at, \
                 (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.conversation_id) \
                 FROM conversations c ORDER BY c.updated_at DESC",
            )
            .map_err(StoreError::from)?;

        let rows = stmt
            .query_map([], |row| {
                let conversation_id: String = row.get(0)?;
                let owner_id: String = row.get(1)?;
                let language: String = row.get(2)?;
                let model_id: String = row.get(3)?;
                let created_at: String = row.get(4)?;
                let updated_at: String = row.get(5)?;
                let message_count: i64 = row.get(6)?;
                Ok((conversation_id, owner_id, language, model_id, created_at, updated_at, message_count))
            })
            .map_err(StoreError::from)?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
            .map_err(StoreError::from)?;

        Ok(rows
            .into_iter()
            .filter(|(_, owner_id, ..)| requester.can_access(owner_id))
            .filter_map(|(conversation_id, owner_id, language, model_id, created_at, updated_at, message_count)| {
                Some(ConversationSummary {
                    conversation_id: Uuid::parse_str(&conversation_id).ok()?,
                    owner_id,
                    language: parse_language(&language),
                    model_id,
                    created_at: parse_timestamp(&created_at),
                    updated_at: parse_timestamp(&updated_at),
                    #[allow(clippy::cast_sign_loss)]
                    message_count: message_count as usize,
                })
            })
            .collect())
    }
}

/// Validates role alternation against the last stored message, then inserts
/// `message` and bumps the conversation's `updated_at`. Shared by `append`
/// and `append_turn` so both go through the exact same invariant check.
fn insert_message(conn: &Connection, conversation_id: Uuid, message: &Message) -> Result<()> {
    let id_text = conversation_id.to_string();

    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM conversations WHERE conversation_id = ?1", params![id_text], |row| row.get(0))
        .optional()
        .map_err(StoreError::from)?;
    if exists.is_none() {
        return Err(Error::NotFound(conversation_id.to_string()));
    }

    let last_role: Option<String> = conn
        .query_row(
            "SELECT role FROM messages WHERE conversation_id = ?1 ORDER BY seq DESC LIMIT 1",
            params![id_text],
            |row| row.get(0),
        )
        .optional()
        .map_err(StoreError::from)?;

    let expected = match last_role.as_deref() {
        None => Role::User,
        Some("user") => Role::Assistant,
        Some(_) => Role::User,
    };
    if message.role != expected {
        return Err(StoreError::RoleAlternation {
            attempted: role_str(message.role).to_string(),
            expected: role_str(expected).to_string(),
        }
        .into());
    }

    let next_seq: i64 = conn
        .query_row("SELECT COALESCE(MAX(seq), -1) + 1 FROM messages WHERE conversation_id = ?1", params![id_text], |row| row.get(0))
        .map_err(StoreError::from)?;

    let sources_json = message.sources.as_ref().map(serde_json::to_string).transpose().map_err(StoreError::from)?;

    conn.execute(
        "INSERT INTO messages (conversation_id, seq, role, content, created_at, sources, model, tokens_input, tokens_output, cost) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            id_text,
            next_seq,
            role_str(message.role),
            message.content,
            message.created_at.to_rfc3339(),
            sources_json,
            message.model,
            message.tokens.map(|t| i64::from(t.input)),
            message.tokens.map(|t| i64::from(t.output)),
            message.cost,
        ],
    )
    .map_err(StoreError::from)?;

    conn.execute(
        "UPDATE conversations SET updated_at = ?1 WHERE conversation_id = ?2",
        params![Utc::now().to_rfc3339(), id_text],
    )
    .map_err(StoreError::from)?;

    Ok(())
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn parse_role(value: &str) -> Role {
    if value == "assistant" { Role::Assistant } else { Role::User }
}

fn parse_language(value: &str) -> crate::model::Language {
    if value == "de" { crate::model::Language::De } else { crate::model::Language::En }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

fn row_to_message(row: &rusqlite::Row<'_>) -> std::result::Result<Message, rusqlite::Error> {
    let role: String = row.get(0)?;
    let content: String = row.get(1)?;
    let created_at: String = row.get(2)?;
    let sources_json: Option<String> = row.get(3)?;
    let model: Option<String> = row.get(4)?;
    let tokens_input: Option<i64> = row.get(5)?;
    let tokens_output: Option<i64> = row.get(6)?;
    let cost: Option<f64> = row.get(7)?;

    let sources: Option<Vec<Source>> = sources_json.and_then(|text| serde_json::from_str(&text).ok());
    let tokens = match (tokens_input, tokens_output) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        (Some(input), Some(output)) => Some(TokenUsage { input: input as u32, output: output as u32 }),
        _ => None,
    };

    Ok(Message {
        role: parse_role(&role),
        content,
        created_at: parse_timestamp(&created_at),
        sources,
        model,
        tokens,
        cost,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Language;

    fn user_message(content: &str) -> Message {
        Message {
            role: Role::User,
            content: content.to_string(),
            created_at: Utc::now(),
            sources: None,
            model: None,
            tokens: None,
            cost: None,
        }
    }

    fn assistant_message(content: &str) -> Message {
        Message {
            role: Role::Assistant,
            content: content.to_string(),
            created_at: Utc::now(),
            sources: Some(vec![]),
            model: Some("claude-sonnet-4-5".to_string()),
            tokens: Some(TokenUsage { input: 10, output: 5 }),
            cost: Some(0.001),
        }
    }

    #[tokio::test]
    async fn create_then_append_round_trips() {
        let store = ConversationStore::in_memory().unwrap();
        let id = store.create("user-1", None, Language::En, "claude-sonnet-4-5").await.unwrap();
        store.append(id, user_message("How long is the battery?")).await.unwrap();
        store.append(id, assistant_message("18 hours [1].")).await.unwrap();

        let identity = RequestIdentity { subject: "user-1".to_string(), is_admin: false };
        let conversation = store.get(id, &identity).await.unwrap();
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].role, Role::User);
        assert_eq!(conversation.messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn rejects_role_alternation_violation() {
        let store = ConversationStore::in_memory().unwrap();
        let id = store.create("user-1", None, Language::En, "claude-sonnet-4-5").await.unwrap();
        store.append(id, user_message("first question")).await.unwrap();
        let result = store.append(id, user_message("second question in a row")).await;
        assert!(matches!(result, Err(Error::Storage(StoreError::RoleAlternation { .. }))));
    }

    #[tokio::test]
    async fn append_to_missing_conversation_is_not_found() {
        let store = ConversationStore::in_memory().unwrap();
        let result = store.append(Uuid::new_v4(), user_message("hi")).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn append_turn_persists_both_messages_together() {
        let store = ConversationStore::in_memory().unwrap();
        let id = store.create("user-1", None, Language::En, "claude-sonnet-4-5").await.unwrap();
        store
            .append_turn(id, user_message("How long is the battery?"), assistant_message("18 hours [1]."))
            .await
            .unwrap();

        let identity = RequestIdentity { subject: "user-1".to_string(), is_admin: false };
        let conversation = store.get(id, &identity).await.unwrap();
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].role, Role::User);
        assert_eq!(conversation.messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn append_turn_rolls_back_user_message_when_assistant_message_is_invalid() {
        let store = ConversationStore::in_memory().unwrap();
        let id = store.create("user-1", None, Language::En, "claude-sonnet-4-5").await.unwrap();

        // Two user-role messages in a row breaks alternation on the second
        // insert; the whole turn, including the first insert, must roll back.
        let result = store.append_turn(id, user_message("first"), user_message("also user")).await;
        assert!(matches!(result, Err(Error::Storage(StoreError::RoleAlternation { .. }))));

        let identity = RequestIdentity { subject: "user-1".to_string(), is_admin: false };
        let conversation = store.get(id, &identity).await.unwrap();
        assert!(conversation.messages.is_empty(), "failed turn must leave no residual message");
    }

    #[tokio::test]
    async fn non_owner_cannot_read_conversation() {
        let store = ConversationStore::in_memory().unwrap();
        let id = store.create("user-1", None, Language::En, "claude-sonnet-4-5").await.unwrap();
        let other = RequestIdentity { subject: "user-2".to_string(), is_admin: false };
        let result = store.get(id, &other).await;
        assert!(matches!(result, Err(Error::AccessDenied)));
    }

    #[tokio::test]
    async fn admin_can_read_any_conversation() {
        let store = ConversationStore::in_memory().unwrap();
        let id = store.create("user-1", None, Language::En, "claude-sonnet-4-5").await.unwrap();
        let admin = RequestIdentity { subject: "root".to_string(), is_admin: true };
        assert!(store.get(id, &admin).await.is_ok());
    }

    #[tokio::test]
    async fn list_filters_by_ownership() {
        let store = ConversationStore::in_memory().unwrap();
        store.create("user-1", None, Language::En, "claude-sonnet-4-5").await.unwrap();
        store.create("user-2", None, Language::En, "claude-sonnet-4-5").await.unwrap();

        let identity = RequestIdentity { subject: "user-1".to_string(), is_admin: false };
        let visible = store.list(&identity).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].owner_id, "user-1");

        let admin = RequestIdentity { subject: "root".to_string(), is_admin: true };
        assert_eq!(store.list(&admin).await.unwrap().len(), 2);
    }
}
