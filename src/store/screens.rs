use uuid::Uuid;

use crate::{AppResult, now_ts};

use super::Store;
use super::models::ScreenSession;

impl Store {
    /// Start a screen-share session. Any prior active session for the same
    /// (room, user) is ended in the same transaction, so at most one session
    /// per pair is ever active. Sessions of other users are untouched.
    pub async fn start_screen_session(
        &self,
        room_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<ScreenSession> {
        let id = Uuid::now_v7();
        let now = now_ts();

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE screen_sessions SET is_active=0, ended_at=? \
             WHERE room_id=? AND user_id=? AND is_active=1",
        )
        .bind(now)
        .bind(room_id.to_string())
        .bind(user_id.to_string())
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO screen_sessions (id,room_id,user_id,started_at,is_active) VALUES (?,?,?,?,1)",
        )
        .bind(id.to_string())
        .bind(room_id.to_string())
        .bind(user_id.to_string())
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(ScreenSession {
            id,
            room_id,
            user_id,
            started_at: now,
            ended_at: None,
            is_active: true,
        })
    }

    /// End the user's active session, if any. Returns how many were closed.
    pub async fn end_screen_session(&self, room_id: Uuid, user_id: Uuid) -> AppResult<u64> {
        let res = sqlx::query(
            "UPDATE screen_sessions SET is_active=0, ended_at=? \
             WHERE room_id=? AND user_id=? AND is_active=1",
        )
        .bind(now_ts())
        .bind(room_id.to_string())
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }

    pub async fn screen_sessions(&self, room_id: Uuid, user_id: Uuid) -> AppResult<Vec<ScreenSession>> {
        let rows: Vec<(String, i64, Option<i64>, bool)> = sqlx::query_as(
            "SELECT id,started_at,ended_at,is_active FROM screen_sessions \
             WHERE room_id=? AND user_id=? ORDER BY started_at, id",
        )
        .bind(room_id.to_string())
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(id, started_at, ended_at, is_active)| {
                Ok(ScreenSession {
                    id: Uuid::parse_str(&id)?,
                    room_id,
                    user_id,
                    started_at,
                    ended_at,
                    is_active,
                })
            })
            .collect()
    }

    /// Users currently presenting in the room. Multiple presenters allowed.
    pub async fn active_presenters(&self, room_id: Uuid) -> AppResult<Vec<Uuid>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT user_id FROM screen_sessions WHERE room_id=? AND is_active=1",
        )
        .bind(room_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(id,)| Ok(Uuid::parse_str(&id)?))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NewRoom;

    async fn fixture() -> (Store, Uuid, Uuid, Uuid) {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let a = store.get_or_create_user("a").await.unwrap();
        let b = store.get_or_create_user("b").await.unwrap();
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
                a.id,
                None,
            )
            .await
            .unwrap();
        (store, room.id, a.id, b.id)
    }

    #[tokio::test]
    async fn restart_supersedes_previous_session() {
        let (store, room, user, _) = fixture().await;
        let first = store.start_screen_session(room, user).await.unwrap();
        let second = store.start_screen_session(room, user).await.unwrap();
        assert_ne!(first.id, second.id);

        let sessions = store.screen_sessions(room, user).await.unwrap();
        assert_eq!(sessions.len(), 2);
        let active: Vec<_> = sessions.iter().filter(|s| s.is_active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);
        let ended = sessions.iter().find(|s| s.id == first.id).unwrap();
        assert!(ended.ended_at.is_some());
    }

    #[tokio::test]
    async fn presenters_are_per_user() {
        let (store, room, a, b) = fixture().await;
        store.start_screen_session(room, a).await.unwrap();
        store.start_screen_session(room, b).await.unwrap();
        let mut presenters = store.active_presenters(room).await.unwrap();
        presenters.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(presenters, expected);

        assert_eq!(store.end_screen_session(room, a).await.unwrap(), 1);
        assert_eq!(store.end_screen_session(room, a).await.unwrap(), 0);
        assert_eq!(store.active_presenters(room).await.unwrap(), vec![b]);
    }
}
