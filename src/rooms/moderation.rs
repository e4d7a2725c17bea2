//! Moderation: timed mutes, kicks, bans, banned words, message deletion.
//!
//! Kick and ban share the notify-then-close shape: the room hears about it,
//! the target gets a direct notice on their personal channel, and after a
//! short grace delay (so the client can render the notice) every session the
//! target holds in the room is closed with a distinct reason code. The close
//! runs in a detached task and does not depend on the notice being delivered.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::store::{Room, Store};
use crate::{AppError, AppResult, now_ts};

use super::guard;
use super::protocol::{CLOSE_BANNED_LIVE, CLOSE_KICKED, OutboundEvent};
use super::registry::{ChannelLayer, GroupKey, Registry};

/// Delay between the terminal notice and the forced close.
pub const DISCONNECT_GRACE: Duration = Duration::from_millis(300);

fn require_moderator(actor: Uuid, room: &Room) -> AppResult<()> {
    if guard::can_moderate(actor, room) {
        Ok(())
    } else {
        Err(AppError::AccessDenied("only the room creator can moderate"))
    }
}

async fn require_participant(store: &Store, room: &Room, target: Uuid) -> AppResult<()> {
    store
        .participant(room.id, target)
        .await?
        .map(|_| ())
        .ok_or(AppError::NotFound("participant"))
}

pub async fn mute(
    store: &Store,
    registry: &Registry,
    room: &Room,
    actor: Uuid,
    target: Uuid,
    duration_secs: i64,
) -> AppResult<i64> {
    require_moderator(actor, room)?;
    if duration_secs <= 0 {
        return Err(AppError::Validation("mute duration must be positive".into()));
    }
    require_participant(store, room, target).await?;

    let muted_until = now_ts() + duration_secs;
    store.set_mute(room.id, target, muted_until, actor).await?;
    tracing::info!(room_id = %room.id, user_id = %target, by = %actor, duration_secs, "user muted");

    registry
        .group_send(
            GroupKey::Room(room.id),
            OutboundEvent::UserMuted {
                user_id: target,
                by: actor,
                duration_secs,
                muted_until,
            },
        )
        .await;
    Ok(muted_until)
}

pub async fn unmute(
    store: &Store,
    registry: &Registry,
    room: &Room,
    actor: Uuid,
    target: Uuid,
) -> AppResult<()> {
    require_moderator(actor, room)?;
    require_participant(store, room, target).await?;

    store.clear_mute(room.id, target).await?;
    registry
        .group_send(
            GroupKey::Room(room.id),
            OutboundEvent::UserUnmuted {
                user_id: target,
                by: actor,
            },
        )
        .await;
    Ok(())
}

/// Remove the participant row, notify everyone, then force-disconnect the
/// target. Kicked users may rejoin immediately unless also banned.
pub async fn kick(
    store: &Store,
    registry: &Arc<Registry>,
    room: &Room,
    actor: Uuid,
    target: Uuid,
) -> AppResult<()> {
    require_moderator(actor, room)?;
    if actor == target {
        return Err(AppError::Validation("cannot kick yourself".into()));
    }
    if !store.remove_participant(room.id, target).await? {
        return Err(AppError::NotFound("participant"));
    }
    tracing::info!(room_id = %room.id, user_id = %target, by = %actor, "user kicked");

    registry
        .group_send(
            GroupKey::Room(room.id),
            OutboundEvent::UserKicked {
                user_id: target,
                by: actor,
            },
        )
        .await;
    registry
        .send_to_user(target, OutboundEvent::YouWereKicked { room_id: room.id })
        .await;
    disconnect_after_grace(registry.clone(), room.id, target, CLOSE_KICKED);
    Ok(())
}

/// Set the persistent ban flag, notify, and force-disconnect any live
/// session. The ban outlives the connection: rejoin is refused at join time.
pub async fn ban(
    store: &Store,
    registry: &Arc<Registry>,
    room: &Room,
    actor: Uuid,
    target: Uuid,
) -> AppResult<()> {
    require_moderator(actor, room)?;
    if actor == target {
        return Err(AppError::Validation("cannot ban yourself".into()));
    }
    if !store.set_banned(room.id, target, Some(actor)).await? {
        return Err(AppError::NotFound("participant"));
    }
    tracing::info!(room_id = %room.id, user_id = %target, by = %actor, "user banned");

    registry
        .group_send(
            GroupKey::Room(room.id),
            OutboundEvent::UserBanned {
                user_id: target,
                by: actor,
            },
        )
        .await;
    registry
        .send_to_user(target, OutboundEvent::YouWereBanned { room_id: room.id })
        .await;
    disconnect_after_grace(registry.clone(), room.id, target, CLOSE_BANNED_LIVE);
    Ok(())
}

pub async fn unban(
    store: &Store,
    registry: &Registry,
    room: &Room,
    actor: Uuid,
    target: Uuid,
) -> AppResult<()> {
    require_moderator(actor, room)?;
    if !store.set_banned(room.id, target, None).await? {
        return Err(AppError::NotFound("participant"));
    }
    registry
        .group_send(
            GroupKey::Room(room.id),
            OutboundEvent::UserUnbanned {
                user_id: target,
                by: actor,
            },
        )
        .await;
    Ok(())
}

pub async fn add_banned_word(
    store: &Store,
    registry: &Registry,
    room: &Room,
    actor: Uuid,
    word: &str,
) -> AppResult<()> {
    require_moderator(actor, room)?;
    let word = word.trim();
    if word.is_empty() {
        return Err(AppError::Validation("banned word must not be empty".into()));
    }
    store.add_banned_word(room.id, word).await?;
    registry
        .group_send(
            GroupKey::Room(room.id),
            OutboundEvent::BannedWordAdded {
                word: word.to_lowercase(),
            },
        )
        .await;
    Ok(())
}

pub async fn remove_banned_word(
    store: &Store,
    registry: &Registry,
    room: &Room,
    actor: Uuid,
    word: &str,
) -> AppResult<()> {
    require_moderator(actor, room)?;
    if !store.remove_banned_word(room.id, word).await? {
        return Err(AppError::NotFound("banned word"));
    }
    registry
        .group_send(
            GroupKey::Room(room.id),
            OutboundEvent::BannedWordRemoved {
                word: word.to_lowercase(),
            },
        )
        .await;
    Ok(())
}

/// Delete a message (hard) and broadcast the deletion as its own event.
pub async fn delete_message(
    store: &Store,
    registry: &Registry,
    room: &Room,
    actor: Uuid,
    message_id: Uuid,
) -> AppResult<()> {
    require_moderator(actor, room)?;
    if !store.delete_message(room.id, message_id).await? {
        return Err(AppError::NotFound("message"));
    }
    registry
        .group_send(
            GroupKey::Room(room.id),
            OutboundEvent::MessageDeleted { message_id },
        )
        .await;
    Ok(())
}

fn disconnect_after_grace(registry: Arc<Registry>, room_id: Uuid, target: Uuid, code: u16) {
    tokio::spawn(async move {
        tokio::time::sleep(DISCONNECT_GRACE).await;
        let closed = registry.close_user_in_room(room_id, target, code).await;
        tracing::debug!(room_id = %room_id, user_id = %target, code, closed, "forced disconnect");
    });
}
