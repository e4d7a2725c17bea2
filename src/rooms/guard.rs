//! Authorization policy: pure checks over room/participant snapshots, plus
//! the lazily-expiring mute check (the one check that persists a write).

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Argon2, password_hash::rand_core::OsRng};
use uuid::Uuid;

use crate::store::{Participant, Room, Store};
use crate::{AppError, AppResult, now_ts};

use super::protocol::{
    CLOSE_ACCESS_DENIED, CLOSE_BANNED, CLOSE_ROOM_FULL, CLOSE_ROOM_UNAVAILABLE,
};

/// Why a join was refused. Each reason maps to a distinct close code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinRejection {
    /// Room missing or deactivated.
    Unavailable,
    /// Locked room, or a private room with a wrong/missing credential.
    AccessDenied,
    Full,
    Banned,
}

impl JoinRejection {
    pub fn close_code(self) -> u16 {
        match self {
            JoinRejection::Unavailable => CLOSE_ROOM_UNAVAILABLE,
            JoinRejection::AccessDenied => CLOSE_ACCESS_DENIED,
            JoinRejection::Full => CLOSE_ROOM_FULL,
            JoinRejection::Banned => CLOSE_BANNED,
        }
    }
}

/// Can this user enter the room right now?
///
/// The capacity check counts currently-online participants at call time; a
/// simultaneous joiner may slip past the optimistic count and ties are broken
/// by registry registration order. Accepted race, not a correctness bug.
pub fn can_join(
    room: &Room,
    participant: Option<&Participant>,
    credential: Option<&str>,
    online_count: i64,
) -> Result<(), JoinRejection> {
    if !room.is_active {
        return Err(JoinRejection::Unavailable);
    }
    if participant.is_some_and(|p| p.is_banned) {
        // a ban wins over a correct credential
        return Err(JoinRejection::Banned);
    }
    if room.is_locked {
        return Err(JoinRejection::AccessDenied);
    }
    if room.is_private {
        let ok = match (&room.password_hash, credential) {
            (Some(hash), Some(given)) => verify_credential(hash, given),
            _ => false,
        };
        if !ok {
            return Err(JoinRejection::AccessDenied);
        }
    }
    // rejoining participants who are already online don't add to the count
    let already_online = participant.is_some_and(|p| p.is_online);
    if !already_online && online_count >= room.max_users {
        return Err(JoinRejection::Full);
    }
    Ok(())
}

/// Single-owner moderation: only the room creator moderates. Participants
/// carry an `is_moderator` flag that current policy deliberately ignores.
pub fn can_moderate(actor: Uuid, room: &Room) -> bool {
    actor == room.creator_id
}

/// May this user read the room snapshot? Public rooms are open; private
/// rooms admit members, the creator, and anyone holding the credential
/// (clients fetch the snapshot before their first socket join).
pub fn can_view(room: &Room, viewer: Uuid, is_participant: bool, credential: Option<&str>) -> bool {
    if !room.is_private {
        return true;
    }
    if is_participant || viewer == room.creator_id {
        return true;
    }
    match (&room.password_hash, credential) {
        (Some(hash), Some(given)) => verify_credential(hash, given),
        _ => false,
    }
}

/// Mute check with lazy expiry: an expired mute is cleared on this read and
/// reported as unmuted. The clear is guarded in the store so repeated checks
/// write at most once.
pub async fn is_muted(store: &Store, participant: &Participant) -> AppResult<bool> {
    if !participant.is_muted {
        return Ok(false);
    }
    match participant.muted_until {
        Some(until) if until <= now_ts() => {
            store
                .clear_mute(participant.room_id, participant.user_id)
                .await?;
            Ok(false)
        }
        _ => Ok(true),
    }
}

/// Case-insensitive substring match against the room's banned-word set.
/// Words are stored lower-cased.
pub fn contains_banned_word(words: &[String], text: &str) -> bool {
    if words.is_empty() {
        return false;
    }
    let text = text.to_lowercase();
    words.iter().any(|word| text.contains(word.as_str()))
}

pub fn hash_credential(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("credential hashing failed: {e}")))?;
    Ok(hash.to_string())
}

pub fn verify_credential(hash: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewRoom, PlayState};

    fn room() -> Room {
        Room {
            id: Uuid::now_v7(),
            name: "r".into(),
            creator_id: Uuid::now_v7(),
            is_private: false,
            password_hash: None,
            max_users: 2,
            is_active: true,
            is_locked: false,
            allow_chat: true,
            allow_screen_share: true,
            current_video_url: None,
            video_state: PlayState::Paused,
            video_position: 0.0,
            video_updated_at: 0,
            created_at: 0,
            deleted_at: None,
        }
    }

    fn participant(room: &Room) -> Participant {
        Participant {
            room_id: room.id,
            user_id: Uuid::now_v7(),
            is_online: false,
            is_moderator: false,
            is_muted: false,
            muted_until: None,
            muted_by: None,
            is_banned: false,
            banned_by: None,
            joined_at: 0,
        }
    }

    #[test]
    fn join_checks() {
        let mut r = room();
        assert_eq!(can_join(&r, None, None, 0), Ok(()));

        r.is_active = false;
        assert_eq!(can_join(&r, None, None, 0), Err(JoinRejection::Unavailable));
        r.is_active = true;

        r.is_locked = true;
        assert_eq!(can_join(&r, None, None, 0), Err(JoinRejection::AccessDenied));
        r.is_locked = false;

        assert_eq!(can_join(&r, None, None, 2), Err(JoinRejection::Full));

        let mut banned = participant(&r);
        banned.is_banned = true;
        assert_eq!(
            can_join(&r, Some(&banned), None, 0),
            Err(JoinRejection::Banned)
        );
    }

    #[test]
    fn private_room_requires_matching_credential() {
        let mut r = room();
        r.is_private = true;
        r.password_hash = Some(hash_credential("sekrit").unwrap());

        assert_eq!(can_join(&r, None, None, 0), Err(JoinRejection::AccessDenied));
        assert_eq!(
            can_join(&r, None, Some("wrong"), 0),
            Err(JoinRejection::AccessDenied)
        );
        assert_eq!(can_join(&r, None, Some("sekrit"), 0), Ok(()));

        // a ban is rejected regardless of credential correctness
        let mut banned = participant(&r);
        banned.is_banned = true;
        assert_eq!(
            can_join(&r, Some(&banned), Some("sekrit"), 0),
            Err(JoinRejection::Banned)
        );
    }

    #[test]
    fn online_rejoin_skips_capacity() {
        let r = room();
        let mut p = participant(&r);
        p.is_online = true;
        assert_eq!(can_join(&r, Some(&p), None, 2), Ok(()));
    }

    #[test]
    fn creator_only_moderation() {
        let r = room();
        assert!(can_moderate(r.creator_id, &r));
        assert!(!can_moderate(Uuid::now_v7(), &r));
        // the moderator flag is not consulted
        let mut p = participant(&r);
        p.is_moderator = true;
        assert!(!can_moderate(p.user_id, &r));
    }

    #[test]
    fn banned_word_matching() {
        let words = vec!["spam".to_owned(), "scam".to_owned()];
        assert!(contains_banned_word(&words, "this is SPAM now"));
        assert!(contains_banned_word(&words, "prescamble"));
        assert!(!contains_banned_word(&words, "wholesome"));
        assert!(!contains_banned_word(&[], "spam"));
    }

    #[test]
    fn credential_hash_roundtrip() {
        let hash = hash_credential("hunter2").unwrap();
        assert!(verify_credential(&hash, "hunter2"));
        assert!(!verify_credential(&hash, "hunter3"));
        assert!(!verify_credential("not a phc string", "hunter2"));
    }

    #[tokio::test]
    async fn lazy_unmute_writes_once() {
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
        store.join_participant(room.id, user.id).await.unwrap();
        store
            .set_mute(room.id, user.id, now_ts() - 10, user.id)
            .await
            .unwrap();

        let p = store.participant(room.id, user.id).await.unwrap().unwrap();
        assert!(!is_muted(&store, &p).await.unwrap());
        let cleared = store.participant(room.id, user.id).await.unwrap().unwrap();
        assert!(!cleared.is_muted);
        // repeated checks stay unmuted and write nothing further
        assert!(!is_muted(&store, &cleared).await.unwrap());

        // an unexpired mute still reports muted
        store
            .set_mute(room.id, user.id, now_ts() + 60, user.id)
            .await
            .unwrap();
        let p = store.participant(room.id, user.id).await.unwrap().unwrap();
        assert!(is_muted(&store, &p).await.unwrap());
    }
}
