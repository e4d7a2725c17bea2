use serde::Deserialize;
use uuid::Uuid;

use crate::{AppResult, now_ts};

use super::Store;
use super::models::{PlayState, Room, RoomRow};

const ROOM_COLS: &str = "id,name,creator_id,is_private,password_hash,max_users,is_active,is_locked,\
    allow_chat,allow_screen_share,current_video_url,video_state,video_position,video_updated_at,\
    created_at,deleted_at";

#[derive(Debug, Deserialize)]
pub struct NewRoom {
    pub name: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_max_users")]
    pub max_users: i64,
    #[serde(default = "default_true")]
    pub allow_chat: bool,
    #[serde(default = "default_true")]
    pub allow_screen_share: bool,
}

fn default_max_users() -> i64 {
    10
}

fn default_true() -> bool {
    true
}

impl Store {
    pub async fn create_room(
        &self,
        req: &NewRoom,
        creator_id: Uuid,
        password_hash: Option<String>,
    ) -> AppResult<Room> {
        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO rooms (id,name,creator_id,is_private,password_hash,max_users,\
             allow_chat,allow_screen_share,created_at) VALUES (?,?,?,?,?,?,?,?,?)",
        )
        .bind(id.to_string())
        .bind(&req.name)
        .bind(creator_id.to_string())
        .bind(req.is_private)
        .bind(&password_hash)
        .bind(req.max_users)
        .bind(req.allow_chat)
        .bind(req.allow_screen_share)
        .bind(now_ts())
        .execute(&self.pool)
        .await?;

        self.room(id)
            .await?
            .ok_or_else(|| crate::AppError::Internal(anyhow::anyhow!("room vanished after insert")))
    }

    /// Fetch a room regardless of its active flag.
    pub async fn room(&self, id: Uuid) -> AppResult<Option<Room>> {
        let row: Option<RoomRow> =
            sqlx::query_as(&format!("SELECT {ROOM_COLS} FROM rooms WHERE id=?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(Room::try_from).transpose()
    }

    /// Fetch a room only if it has not been soft-deleted.
    pub async fn active_room(&self, id: Uuid) -> AppResult<Option<Room>> {
        let row: Option<RoomRow> = sqlx::query_as(&format!(
            "SELECT {ROOM_COLS} FROM rooms WHERE id=? AND is_active=1"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Room::try_from).transpose()
    }

    pub async fn set_locked(&self, id: Uuid, locked: bool) -> AppResult<bool> {
        let res = sqlx::query("UPDATE rooms SET is_locked=? WHERE id=?")
            .bind(locked)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn update_video(
        &self,
        id: Uuid,
        state: PlayState,
        position: f64,
        url: Option<&str>,
        updated_at: i64,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE rooms SET video_state=?, video_position=?, current_video_url=?, \
             video_updated_at=? WHERE id=?",
        )
        .bind(state.as_str())
        .bind(position)
        .bind(url)
        .bind(updated_at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Soft delete: deactivate, stamp, clear live presence. Reversible via
    /// [`Store::restore_room`].
    pub async fn soft_delete_room(&self, id: Uuid) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;
        let res = sqlx::query("UPDATE rooms SET is_active=0, deleted_at=? WHERE id=? AND is_active=1")
            .bind(now_ts())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE participants SET is_online=0 WHERE room_id=?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn restore_room(&self, id: Uuid) -> AppResult<bool> {
        let res = sqlx::query("UPDATE rooms SET is_active=1, deleted_at=NULL WHERE id=? AND is_active=0")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Hard delete: remove the room and all child rows. Irreversible.
    pub async fn hard_delete_room(&self, id: Uuid) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;
        let id = id.to_string();
        for table in ["messages", "screen_sessions", "participants", "banned_words"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE room_id=?"))
                .bind(&id)
                .execute(&mut *tx)
                .await?;
        }
        let res = sqlx::query("DELETE FROM rooms WHERE id=?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn add_banned_word(&self, room_id: Uuid, word: &str) -> AppResult<()> {
        sqlx::query("INSERT INTO banned_words (room_id, word) VALUES (?,?) ON CONFLICT DO NOTHING")
            .bind(room_id.to_string())
            .bind(word.to_lowercase())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn remove_banned_word(&self, room_id: Uuid, word: &str) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM banned_words WHERE room_id=? AND word=?")
            .bind(room_id.to_string())
            .bind(word.to_lowercase())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn banned_words(&self, room_id: Uuid) -> AppResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT word FROM banned_words WHERE room_id=?")
            .bind(room_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(w,)| w).collect())
    }
}
