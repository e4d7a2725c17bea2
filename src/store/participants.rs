use uuid::Uuid;

use crate::{AppResult, now_ts};

use super::Store;
use super::models::{Participant, ParticipantRow};

const PART_COLS: &str = "room_id,user_id,is_online,is_moderator,is_muted,muted_until,muted_by,\
    is_banned,banned_by,joined_at";

impl Store {
    pub async fn participant(&self, room_id: Uuid, user_id: Uuid) -> AppResult<Option<Participant>> {
        let row: Option<ParticipantRow> = sqlx::query_as(&format!(
            "SELECT {PART_COLS} FROM participants WHERE room_id=? AND user_id=?"
        ))
        .bind(room_id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Participant::try_from).transpose()
    }

    /// Get-or-create the participant row and mark it online. Idempotent under
    /// double-join races: the conflict arm only flips the online flag.
    pub async fn join_participant(&self, room_id: Uuid, user_id: Uuid) -> AppResult<Participant> {
        sqlx::query(
            "INSERT INTO participants (room_id,user_id,is_online,joined_at) VALUES (?,?,1,?) \
             ON CONFLICT(room_id,user_id) DO UPDATE SET is_online=1",
        )
        .bind(room_id.to_string())
        .bind(user_id.to_string())
        .bind(now_ts())
        .execute(&self.pool)
        .await?;
        self.participant(room_id, user_id)
            .await?
            .ok_or(crate::AppError::NotFound("participant"))
    }

    pub async fn set_offline(&self, room_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let res = sqlx::query(
            "UPDATE participants SET is_online=0 WHERE room_id=? AND user_id=? AND is_online=1",
        )
        .bind(room_id.to_string())
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn online_count(&self, room_id: Uuid) -> AppResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM participants WHERE room_id=? AND is_online=1")
                .bind(room_id.to_string())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    pub async fn online_participants(&self, room_id: Uuid) -> AppResult<Vec<(Uuid, String)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT p.user_id, u.username FROM participants p \
             JOIN users u ON u.id = p.user_id \
             WHERE p.room_id=? AND p.is_online=1 ORDER BY p.joined_at",
        )
        .bind(room_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(id, name)| Ok((Uuid::parse_str(&id)?, name)))
            .collect()
    }

    /// Kick semantics: the row is removed entirely, so the user may rejoin
    /// immediately unless separately banned.
    pub async fn remove_participant(&self, room_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM participants WHERE room_id=? AND user_id=?")
            .bind(room_id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn set_mute(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        muted_until: i64,
        muted_by: Uuid,
    ) -> AppResult<bool> {
        let res = sqlx::query(
            "UPDATE participants SET is_muted=1, muted_until=?, muted_by=? \
             WHERE room_id=? AND user_id=?",
        )
        .bind(muted_until)
        .bind(muted_by.to_string())
        .bind(room_id.to_string())
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Clear mute fields, but only while still flagged. Returns whether a
    /// write happened, which keeps lazy expiry idempotent across races.
    pub async fn clear_mute(&self, room_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let res = sqlx::query(
            "UPDATE participants SET is_muted=0, muted_until=NULL, muted_by=NULL \
             WHERE room_id=? AND user_id=? AND is_muted=1",
        )
        .bind(room_id.to_string())
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn set_banned(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        banned_by: Option<Uuid>,
    ) -> AppResult<bool> {
        let res = if let Some(actor) = banned_by {
            sqlx::query(
                "UPDATE participants SET is_banned=1, banned_by=? WHERE room_id=? AND user_id=?",
            )
            .bind(actor.to_string())
            .bind(room_id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                "UPDATE participants SET is_banned=0, banned_by=NULL WHERE room_id=? AND user_id=?",
            )
            .bind(room_id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?
        };
        Ok(res.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NewRoom;

    async fn fixture() -> (Store, Uuid, Uuid) {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let creator = store.get_or_create_user("creator").await.unwrap();
        let room = store
            .create_room(
                &NewRoom {
                    name: "r".into(),
                    is_private: false,
                    password: None,
                    max_users: 10,
                    allow_chat: true,
                    allow_screen_share: true,
                },
                creator.id,
                None,
            )
            .await
            .unwrap();
        (store, room.id, creator.id)
    }

    #[tokio::test]
    async fn join_is_idempotent() {
        let (store, room, user) = fixture().await;
        let first = store.join_participant(room, user).await.unwrap();
        let second = store.join_participant(room, user).await.unwrap();
        assert_eq!(first.joined_at, second.joined_at);
        assert!(second.is_online);
        assert_eq!(store.online_count(room).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn offline_and_online_counts() {
        let (store, room, user) = fixture().await;
        store.join_participant(room, user).await.unwrap();
        assert!(store.set_offline(room, user).await.unwrap());
        // already offline: reports no write
        assert!(!store.set_offline(room, user).await.unwrap());
        assert_eq!(store.online_count(room).await.unwrap(), 0);
        // row is retained when merely offline
        assert!(store.participant(room, user).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn mute_fields_roundtrip() {
        let (store, room, user) = fixture().await;
        store.join_participant(room, user).await.unwrap();
        let actor = Uuid::now_v7();
        assert!(store.set_mute(room, user, now_ts() + 60, actor).await.unwrap());
        let p = store.participant(room, user).await.unwrap().unwrap();
        assert!(p.is_muted);
        assert_eq!(p.muted_by, Some(actor));

        assert!(store.clear_mute(room, user).await.unwrap());
        assert!(!store.clear_mute(room, user).await.unwrap());
        let p = store.participant(room, user).await.unwrap().unwrap();
        assert!(!p.is_muted);
        assert!(p.muted_until.is_none());
        assert!(p.muted_by.is_none());
    }

    #[tokio::test]
    async fn kick_removes_row() {
        let (store, room, user) = fixture().await;
        store.join_participant(room, user).await.unwrap();
        assert!(store.remove_participant(room, user).await.unwrap());
        assert!(store.participant(room, user).await.unwrap().is_none());
        // rejoin allowed
        store.join_participant(room, user).await.unwrap();
    }

    #[tokio::test]
    async fn ban_retains_row() {
        let (store, room, user) = fixture().await;
        store.join_participant(room, user).await.unwrap();
        let actor = Uuid::now_v7();
        assert!(store.set_banned(room, user, Some(actor)).await.unwrap());
        let p = store.participant(room, user).await.unwrap().unwrap();
        assert!(p.is_banned);
        assert_eq!(p.banned_by, Some(actor));

        assert!(store.set_banned(room, user, None).await.unwrap());
        let p = store.participant(room, user).await.unwrap().unwrap();
        assert!(!p.is_banned);
        assert!(p.banned_by.is_none());
    }
}
