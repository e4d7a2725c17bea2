//! Video synchronization state machine.
//!
//! The server is the single writer of a room's current video state:
//! concurrent senders racing on play/pause resolve by arrival order
//! (last-write-wins), which keeps a consistent snapshot for late joiners.
//! The server never attempts clock synchronization; it stamps broadcasts
//! with its own time and lets each client correct for one-way latency.

use crate::store::{PlayState, Room, Store};
use crate::{AppResult, now_ms, now_ts};

/// The state persisted after applying one control event.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoState {
    pub url: Option<String>,
    pub state: PlayState,
    pub position: f64,
    pub updated_at: i64,
}

/// Apply an inbound `(action, client_timestamp, url)` control event.
///
/// - A supplied, different url is adopted (a load/url-change event).
/// - `play`/`pause` set the persistent play-state; `load`/`sync`/`seek` are
///   instantaneous position-setting events that leave it alone. Anything
///   else is ignored, not an error, and the position/url updates still apply.
/// - A non-negative client timestamp becomes the authoritative position.
pub async fn apply_control(
    store: &Store,
    room: &Room,
    action: &str,
    timestamp: Option<f64>,
    url: Option<&str>,
) -> AppResult<VideoState> {
    let url = match url {
        Some(new) if !new.is_empty() && room.current_video_url.as_deref() != Some(new) => {
            Some(new.to_owned())
        }
        _ => room.current_video_url.clone(),
    };

    let state = match action {
        "play" => PlayState::Playing,
        "pause" => PlayState::Paused,
        _ => room.video_state,
    };

    let position = match timestamp {
        Some(ts) if ts >= 0.0 => ts,
        _ => room.video_position,
    };

    let updated_at = now_ts();
    store
        .update_video(room.id, state, position, url.as_deref(), updated_at)
        .await?;

    Ok(VideoState {
        url,
        state,
        position,
        updated_at,
    })
}

/// Server stamp carried on every video broadcast.
pub fn server_stamp() -> i64 {
    now_ms()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NewRoom;
    use uuid::Uuid;

    async fn fixture() -> (Store, Room) {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let user = store.get_or_create_user("u").await.unwrap();
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
                user.id,
                None,
            )
            .await
            .unwrap();
        (store, room)
    }

    async fn reload(store: &Store, id: Uuid) -> Room {
        store.room(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn play_round_trip() {
        let (store, room) = fixture().await;
        apply_control(&store, &room, "play", Some(42.0), Some("X"))
            .await
            .unwrap();

        let room = reload(&store, room.id).await;
        assert_eq!(room.current_video_url.as_deref(), Some("X"));
        assert_eq!(room.video_state, PlayState::Playing);
        assert_eq!(room.video_position, 42.0);
        assert!(room.video_updated_at > 0);
    }

    #[tokio::test]
    async fn pause_keeps_url() {
        let (store, room) = fixture().await;
        apply_control(&store, &room, "play", Some(10.0), Some("X"))
            .await
            .unwrap();
        let room = reload(&store, room.id).await;
        apply_control(&store, &room, "pause", Some(12.5), None)
            .await
            .unwrap();

        let room = reload(&store, room.id).await;
        assert_eq!(room.video_state, PlayState::Paused);
        assert_eq!(room.video_position, 12.5);
        assert_eq!(room.current_video_url.as_deref(), Some("X"));
    }

    #[tokio::test]
    async fn seek_does_not_change_play_state() {
        let (store, room) = fixture().await;
        apply_control(&store, &room, "play", Some(0.0), Some("X"))
            .await
            .unwrap();
        let room = reload(&store, room.id).await;
        apply_control(&store, &room, "seek", Some(99.0), None)
            .await
            .unwrap();

        let room = reload(&store, room.id).await;
        assert_eq!(room.video_state, PlayState::Playing);
        assert_eq!(room.video_position, 99.0);
    }

    #[tokio::test]
    async fn unrecognised_action_still_applies_position_and_url() {
        let (store, room) = fixture().await;
        let state = apply_control(&store, &room, "wiggle", Some(7.0), Some("Y"))
            .await
            .unwrap();
        assert_eq!(state.state, PlayState::Paused);
        assert_eq!(state.position, 7.0);
        assert_eq!(state.url.as_deref(), Some("Y"));
    }

    #[tokio::test]
    async fn negative_timestamp_is_ignored() {
        let (store, room) = fixture().await;
        apply_control(&store, &room, "play", Some(5.0), None)
            .await
            .unwrap();
        let room = reload(&store, room.id).await;
        apply_control(&store, &room, "pause", Some(-1.0), None)
            .await
            .unwrap();

        let room = reload(&store, room.id).await;
        assert_eq!(room.video_position, 5.0);
    }
}
