use async_trait::async_trait;
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("purchase {0} not found")]
    PurchaseNotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatStatus {
    Open,
    Closed,
}

impl ChatStatus {
    const CLOSED: &'static str = "CLOSED";

    /// A NULL or unrecognised column value means the chat was never closed.
    fn from_column(value: Option<&str>) -> Self {
        match value {
            Some(Self::CLOSED) => Self::Closed,
            _ => Self::Open,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseChat {
    pub purchase_id: String,
    pub chat_status: ChatStatus,
    pub chat_closed_reason: Option<String>,
}

/// Public profile fields shown next to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SenderProfile {
    pub username: String,
    pub avatar_url: Option<String>,
}

/// A persisted chat message. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub id: String,
    pub purchase_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub sender: SenderProfile,
}

/// Durable side of the chat: the message log and the purchase's chat status.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn chat_status(&self, purchase_id: &str) -> Result<PurchaseChat, StoreError>;

    async fn create_message(
        &self,
        purchase_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<ChatMessage, StoreError>;

    /// Marks the chat closed, keeping the first reason if it already was.
    /// Returns `true` only when this call performed the transition.
    async fn close_chat(&self, purchase_id: &str, reason: &str) -> Result<bool, StoreError>;

    /// Full history of a purchase chat, oldest first.
    async fn messages_for(&self, purchase_id: &str) -> Result<Vec<ChatMessage>, StoreError>;
}

#[derive(Clone)]
pub struct SqliteChatStore {
    db_pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    purchase_id: String,
    sender_id: String,
    content: String,
    timestamp: OffsetDateTime,
    username: String,
    avatar_url: Option<String>,
}

impl From<MessageRow> for ChatMessage {
    fn from(row: MessageRow) -> Self {
        ChatMessage {
            id: row.id,
            purchase_id: row.purchase_id,
            sender_id: row.sender_id,
            content: row.content,
            timestamp: row.timestamp,
            sender: SenderProfile {
                username: row.username,
                avatar_url: row.avatar_url,
            },
        }
    }
}

const SELECT_MESSAGE: &str = "SELECT m.id,m.purchase_id,m.sender_id,m.content,m.timestamp,u.username,u.avatar_url \
    FROM messages m JOIN users u ON u.id=m.sender_id";

impl SqliteChatStore {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    async fn purchase_exists(&self, purchase_id: &str) -> Result<bool, StoreError> {
        Ok(sqlx::query("SELECT 1 FROM purchases WHERE id=?")
            .bind(purchase_id)
            .fetch_optional(&self.db_pool)
            .await?
            .is_some())
    }
}

#[async_trait]
impl ChatStore for SqliteChatStore {
    async fn chat_status(&self, purchase_id: &str) -> Result<PurchaseChat, StoreError> {
        let Some((status, reason)): Option<(Option<String>, Option<String>)> =
            sqlx::query_as("SELECT chat_status,chat_closed_reason FROM purchases WHERE id=?")
                .bind(purchase_id)
                .fetch_optional(&self.db_pool)
                .await?
        else {
            return Err(StoreError::PurchaseNotFound(purchase_id.to_owned()));
        };

        Ok(PurchaseChat {
            purchase_id: purchase_id.to_owned(),
            chat_status: ChatStatus::from_column(status.as_deref()),
            chat_closed_reason: reason,
        })
    }

    async fn create_message(
        &self,
        purchase_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<ChatMessage, StoreError> {
        let id = Uuid::now_v7().to_string();

        // rolled back on drop unless the profile read-back also succeeds
        let mut tx = self.db_pool.begin().await?;
        sqlx::query("INSERT INTO messages (id,purchase_id,sender_id,content,timestamp) VALUES (?,?,?,?,?)")
            .bind(&id)
            .bind(purchase_id)
            .bind(sender_id)
            .bind(content)
            .bind(OffsetDateTime::now_utc())
            .execute(&mut *tx)
            .await?;

        let row: MessageRow = sqlx::query_as(&format!("{SELECT_MESSAGE} WHERE m.id=?"))
            .bind(&id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(row.into())
    }

    async fn close_chat(&self, purchase_id: &str, reason: &str) -> Result<bool, StoreError> {
        let updated = sqlx::query(
            "UPDATE purchases SET chat_status=?,chat_closed_reason=? \
             WHERE id=? AND (chat_status IS NULL OR chat_status<>?)",
        )
        .bind(ChatStatus::CLOSED)
        .bind(reason)
        .bind(purchase_id)
        .bind(ChatStatus::CLOSED)
        .execute(&self.db_pool)
        .await?
        .rows_affected();

        if updated > 0 {
            return Ok(true);
        }
        if self.purchase_exists(purchase_id).await? {
            Ok(false)
        } else {
            Err(StoreError::PurchaseNotFound(purchase_id.to_owned()))
        }
    }

    async fn messages_for(&self, purchase_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        if !self.purchase_exists(purchase_id).await? {
            return Err(StoreError::PurchaseNotFound(purchase_id.to_owned()));
        }

        let rows: Vec<MessageRow> =
            sqlx::query_as(&format!("{SELECT_MESSAGE} WHERE m.purchase_id=? ORDER BY m.timestamp ASC, m.id ASC"))
                .bind(purchase_id)
                .fetch_all(&self.db_pool)
                .await?;
        Ok(rows.into_iter().map(ChatMessage::from).collect())
    }
}


#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

    use super::*;

    async fn seeded_pool() -> SqlitePool {
        seeded_pool_with(SqliteConnectOptions::from_str("sqlite::memory:").unwrap()).await
    }

    async fn seeded_pool_with(options: SqliteConnectOptions) -> SqlitePool {
        let db_pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&db_pool).await.unwrap();

        for (id, username, avatar) in [("buyer", "ana", None), ("seller", "bob", Some("https://cdn/bob.png"))] {
            sqlx::query("INSERT INTO users (id,username,avatar_url) VALUES (?,?,?)")
                .bind(id)
                .bind(username)
                .bind(avatar)
                .execute(&db_pool)
                .await
                .unwrap();
        }
        sqlx::query("INSERT INTO purchases (id,buyer_id,seller_id) VALUES ('p1','buyer','seller')")
            .execute(&db_pool)
            .await
            .unwrap();
        db_pool
    }

    #[tokio::test]
    async fn new_purchase_chat_is_open() {
        let store = SqliteChatStore::new(seeded_pool().await);
        let chat = store.chat_status("p1").await.unwrap();
        assert_eq!(chat.chat_status, ChatStatus::Open);
        assert_eq!(chat.chat_closed_reason, None);
    }

    #[tokio::test]
    async fn unknown_purchase_is_reported() {
        let store = SqliteChatStore::new(seeded_pool().await);
        assert!(matches!(
            store.chat_status("nope").await,
            Err(StoreError::PurchaseNotFound(id)) if id == "nope"
        ));
        assert!(matches!(store.close_chat("nope", "x").await, Err(StoreError::PurchaseNotFound(_))));
        assert!(matches!(store.messages_for("nope").await, Err(StoreError::PurchaseNotFound(_))));
    }

    #[tokio::test]
    async fn created_message_carries_sender_profile() {
        let store = SqliteChatStore::new(seeded_pool().await);
        let message = store.create_message("p1", "seller", "Hello").await.unwrap();
        assert_eq!(message.purchase_id, "p1");
        assert_eq!(message.content, "Hello");
        assert_eq!(
            message.sender,
            SenderProfile {
                username: "bob".to_owned(),
                avatar_url: Some("https://cdn/bob.png".to_owned()),
            }
        );
        assert!(Uuid::parse_str(&message.id).is_ok());
    }

    #[tokio::test]
    async fn message_from_unknown_user_fails() {
        let store = SqliteChatStore::new(seeded_pool().await);
        assert!(matches!(
            store.create_message("p1", "ghost", "boo").await,
            Err(StoreError::Database(_))
        ));
        assert!(store.messages_for("p1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_profile_lookup_leaves_no_message_row() {
        // without the foreign key the insert succeeds and only the read-back fails
        let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap().foreign_keys(false);
        let db_pool = seeded_pool_with(options).await;
        let store = SqliteChatStore::new(db_pool.clone());

        assert!(matches!(
            store.create_message("p1", "ghost", "hi").await,
            Err(StoreError::Database(sqlx::Error::RowNotFound))
        ));
        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
            .fetch_one(&db_pool)
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn history_is_oldest_first() {
        let store = SqliteChatStore::new(seeded_pool().await);
        for content in ["one", "two", "three"] {
            store.create_message("p1", "buyer", content).await.unwrap();
        }
        let history: Vec<_> = store
            .messages_for("p1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(history, ["one", "two", "three"]);
    }

    #[tokio::test]
    async fn close_keeps_first_reason() {
        let store = SqliteChatStore::new(seeded_pool().await);
        assert!(store.close_chat("p1", "RESOLVED").await.unwrap());
        assert!(!store.close_chat("p1", "AGAIN").await.unwrap());

        let chat = store.chat_status("p1").await.unwrap();
        assert_eq!(chat.chat_status, ChatStatus::Closed);
        assert_eq!(chat.chat_closed_reason.as_deref(), Some("RESOLVED"));
    }
}
