use async_trait::async_trait;
use serde::Serialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::context::{RoomId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistedMessage {
    pub id: Uuid,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create(&self, room: &RoomId, user: &UserId, body: &str) -> anyhow::Result<PersistedMessage>;
}

#[derive(Clone)]
pub struct SqliteMessageStore {
    db_pool: SqlitePool,
}

impl SqliteMessageStore {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    pub async fn for_room(&self, room: &RoomId) -> anyhow::Result<Vec<PersistedMessage>> {
        let rows: Vec<(String, String, String, String, OffsetDateTime)> =
            sqlx::query_as("SELECT id,chat_id,user_id,body,created_at FROM messages WHERE chat_id=? ORDER BY created_at,id")
                .bind(room.as_str())
                .fetch_all(&self.db_pool)
                .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for (id, room_id, user_id, body, created_at) in rows {
            messages.push(PersistedMessage {
                id: Uuid::parse_str(&id)?,
                room_id: room_id.into(),
                user_id: user_id.into(),
                body,
                created_at,
            });
        }
        Ok(messages)
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn create(&self, room: &RoomId, user: &UserId, body: &str) -> anyhow::Result<PersistedMessage> {
        let id = Uuid::now_v7();
        let created_at = OffsetDateTime::now_utc();
        sqlx::query("INSERT INTO messages (id,chat_id,user_id,body,created_at) values (?,?,?,?,?)")
            .bind(id.to_string())
            .bind(room.as_str())
            .bind(user.as_str())
            .bind(body)
            .bind(created_at)
            .execute(&self.db_pool)
            .await?;

        Ok(PersistedMessage {
            id,
            room_id: room.clone(),
            user_id: user.clone(),
            body: body.to_owned(),
            created_at,
        })
    }
}
