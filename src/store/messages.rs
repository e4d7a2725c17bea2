use uuid::Uuid;

use crate::{AppResult, now_ts};

use super::Store;
use super::models::{Message, MessageKind};

impl Store {
    pub async fn insert_message(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        body: &str,
        kind: MessageKind,
    ) -> AppResult<Message> {
        let id = Uuid::now_v7();
        let created_at = now_ts();
        sqlx::query("INSERT INTO messages (id,room_id,user_id,body,kind,created_at) VALUES (?,?,?,?,?,?)")
            .bind(id.to_string())
            .bind(room_id.to_string())
            .bind(user_id.to_string())
            .bind(body)
            .bind(kind.as_str())
            .bind(created_at)
            .execute(&self.pool)
            .await?;
        Ok(Message {
            id,
            room_id,
            user_id,
            body: body.to_owned(),
            kind,
            created_at,
        })
    }

    /// Message deletion is hard: the row is gone, the event is broadcast.
    pub async fn delete_message(&self, room_id: Uuid, message_id: Uuid) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM messages WHERE id=? AND room_id=?")
            .bind(message_id.to_string())
            .bind(room_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Latest `limit` messages with author usernames, oldest first. The id is
    /// a v7 UUID, so it breaks same-second creation ties deterministically.
    pub async fn recent_messages(
        &self,
        room_id: Uuid,
        limit: i64,
    ) -> AppResult<Vec<(Message, String)>> {
        let rows: Vec<(String, String, String, String, i64, String)> = sqlx::query_as(
            "SELECT m.id, m.user_id, m.body, m.kind, m.created_at, u.username \
             FROM messages m JOIN users u ON u.id = m.user_id \
             WHERE m.room_id=? \
             ORDER BY m.created_at DESC, m.id DESC LIMIT ?",
        )
        .bind(room_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for (id, user_id, body, kind, created_at, username) in rows.into_iter().rev() {
            out.push((
                Message {
                    id: Uuid::parse_str(&id)?,
                    room_id,
                    user_id: Uuid::parse_str(&user_id)?,
                    body,
                    kind: MessageKind::parse(&kind),
                    created_at,
                },
                username,
            ));
        }
        Ok(out)
    }

    pub async fn message_count(&self, room_id: Uuid) -> AppResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE room_id=?")
            .bind(room_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
