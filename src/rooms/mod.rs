pub mod guard;
pub mod moderation;
mod new;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod video;
pub mod ws;

use std::sync::Arc;

use axum::{
    Json, debug_handler,
    extract::{Path, Query, State},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_sessions::Session;
use uuid::Uuid;

use crate::session::{Identity, require_identity};
use crate::store::{Room, Store};
use crate::{AppError, AppResult, AppState};

use presence::TypingCache;
use protocol::CLOSE_ROOM_UNAVAILABLE;
use registry::Registry;

/// How many recent messages a room snapshot carries.
const SNAPSHOT_MESSAGES: i64 = 50;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/new", post(new::new_room))
        .route("/{uuid}", get(room_snapshot))
        .route("/{uuid}/ws", get(ws::room_ws))
        .route("/{uuid}/lock", post(lock_room))
        .route("/{uuid}/unlock", post(unlock_room))
        .route("/{uuid}/delete", post(delete_room))
        .route("/{uuid}/destroy", post(destroy_room))
        .route("/{uuid}/restore", post(restore_room))
        .route("/{uuid}/mute", post(mute_user))
        .route("/{uuid}/unmute", post(unmute_user))
        .route("/{uuid}/kick", post(kick_user))
        .route("/{uuid}/ban", post(ban_user))
        .route("/{uuid}/unban", post(unban_user))
        .route("/{uuid}/banned-words/add", post(add_banned_word))
        .route("/{uuid}/banned-words/remove", post(remove_banned_word))
        .route("/{uuid}/messages/{msg}/delete", post(delete_message))
}

async fn fetch_room(store: &Store, id: Uuid) -> AppResult<Room> {
    store.room(id).await?.ok_or(AppError::NotFound("room"))
}

async fn fetch_active_room(store: &Store, id: Uuid) -> AppResult<Room> {
    store
        .active_room(id)
        .await?
        .ok_or(AppError::NotFound("room"))
}

/// Current room state for a client about to connect: settings, playback,
/// who is online and presenting, recent history, and live typing. Private
/// rooms take the same `password` query parameter as the socket route.
#[debug_handler(state = AppState)]
async fn room_snapshot(
    Path(room_id): Path<Uuid>,
    State(store): State<Store>,
    State(typing): State<Arc<dyn TypingCache>>,
    session: Session,
    Query(query): Query<ws::WsQuery>,
) -> AppResult<Json<Value>> {
    let identity = require_identity(&session).await?;
    let room = fetch_active_room(&store, room_id).await?;
    let participant = store.participant(room.id, identity.user_id).await?;
    if !guard::can_view(
        &room,
        identity.user_id,
        participant.is_some(),
        query.password.as_deref(),
    ) {
        return Err(AppError::AccessDenied("not a participant of this room"));
    }

    let online = store.online_participants(room.id).await?;
    let presenters = store.active_presenters(room.id).await?;
    let messages = store.recent_messages(room.id, SNAPSHOT_MESSAGES).await?;
    let typing_now = typing.active(room.id);

    Ok(Json(json!({
        "id": room.id,
        "name": room.name,
        "creator_id": room.creator_id,
        "is_private": room.is_private,
        "is_locked": room.is_locked,
        "max_users": room.max_users,
        "allow_chat": room.allow_chat,
        "allow_screen_share": room.allow_screen_share,
        "video": {
            "url": room.current_video_url,
            "state": room.video_state.as_str(),
            "position": room.video_position,
            "updated_at": room.video_updated_at,
        },
        "online": online
            .iter()
            .map(|(id, name)| json!({ "user_id": id, "username": name }))
            .collect::<Vec<_>>(),
        "presenters": presenters,
        "messages": messages
            .iter()
            .map(|(m, username)| json!({
                "id": m.id,
                "user_id": m.user_id,
                "username": username,
                "message": m.body,
                "created_at": m.created_at,
            }))
            .collect::<Vec<_>>(),
        "typing": typing_now
            .iter()
            .map(|(id, name)| json!({ "user_id": id, "username": name }))
            .collect::<Vec<_>>(),
    })))
}

/// Resolves the caller and the room, and enforces creator-only access for
/// lifecycle endpoints. Moderation endpoints re-check inside [`moderation`].
async fn require_creator(store: &Store, session: &Session, room_id: Uuid) -> AppResult<(Identity, Room)> {
    let identity = require_identity(session).await?;
    let room = fetch_room(store, room_id).await?;
    if room.creator_id != identity.user_id {
        return Err(AppError::AccessDenied("only the room creator can do this"));
    }
    Ok((identity, room))
}

#[debug_handler(state = AppState)]
async fn lock_room(
    Path(room_id): Path<Uuid>,
    State(store): State<Store>,
    session: Session,
) -> AppResult<Json<Value>> {
    let (_, room) = require_creator(&store, &session, room_id).await?;
    store.set_locked(room.id, true).await?;
    Ok(Json(json!({ "locked": true })))
}

#[debug_handler(state = AppState)]
async fn unlock_room(
    Path(room_id): Path<Uuid>,
    State(store): State<Store>,
    session: Session,
) -> AppResult<Json<Value>> {
    let (_, room) = require_creator(&store, &session, room_id).await?;
    store.set_locked(room.id, false).await?;
    Ok(Json(json!({ "locked": false })))
}

/// Soft delete: the room disappears from joins, every live connection is
/// closed with the unavailable code, history is kept for restore.
#[debug_handler(state = AppState)]
async fn delete_room(
    Path(room_id): Path<Uuid>,
    State(store): State<Store>,
    State(registry): State<Arc<Registry>>,
    session: Session,
) -> AppResult<Json<Value>> {
    let (identity, room) = require_creator(&store, &session, room_id).await?;
    if !store.soft_delete_room(room.id).await? {
        return Err(AppError::StateConflict("room is already deleted"));
    }
    let closed = registry.close_group(room.id, CLOSE_ROOM_UNAVAILABLE).await;
    tracing::info!(room_id = %room.id, by = %identity.user_id, closed, "room soft-deleted");
    Ok(Json(json!({ "deleted": true })))
}

/// Hard delete: the room and all of its history are gone for good.
#[debug_handler(state = AppState)]
async fn destroy_room(
    Path(room_id): Path<Uuid>,
    State(store): State<Store>,
    State(registry): State<Arc<Registry>>,
    session: Session,
) -> AppResult<Json<Value>> {
    let (identity, room) = require_creator(&store, &session, room_id).await?;
    registry.close_group(room.id, CLOSE_ROOM_UNAVAILABLE).await;
    store.hard_delete_room(room.id).await?;
    tracing::info!(room_id = %room.id, by = %identity.user_id, "room destroyed");
    Ok(Json(json!({ "destroyed": true })))
}

#[debug_handler(state = AppState)]
async fn restore_room(
    Path(room_id): Path<Uuid>,
    State(store): State<Store>,
    session: Session,
) -> AppResult<Json<Value>> {
    let (_, room) = require_creator(&store, &session, room_id).await?;
    if !store.restore_room(room.id).await? {
        return Err(AppError::StateConflict("room is not deleted"));
    }
    Ok(Json(json!({ "restored": true })))
}

#[derive(Deserialize)]
struct TargetReq {
    user_id: Uuid,
}

#[derive(Deserialize)]
struct MuteReq {
    user_id: Uuid,
    duration_secs: i64,
}

#[derive(Deserialize)]
struct WordReq {
    word: String,
}

#[debug_handler(state = AppState)]
async fn mute_user(
    Path(room_id): Path<Uuid>,
    State(store): State<Store>,
    State(registry): State<Arc<Registry>>,
    session: Session,
    Json(req): Json<MuteReq>,
) -> AppResult<Json<Value>> {
    let identity = require_identity(&session).await?;
    let room = fetch_active_room(&store, room_id).await?;
    let muted_until = moderation::mute(
        &store,
        &registry,
        &room,
        identity.user_id,
        req.user_id,
        req.duration_secs,
    )
    .await?;
    Ok(Json(json!({ "muted_until": muted_until })))
}

#[debug_handler(state = AppState)]
async fn unmute_user(
    Path(room_id): Path<Uuid>,
    State(store): State<Store>,
    State(registry): State<Arc<Registry>>,
    session: Session,
    Json(req): Json<TargetReq>,
) -> AppResult<Json<Value>> {
    let identity = require_identity(&session).await?;
    let room = fetch_active_room(&store, room_id).await?;
    moderation::unmute(&store, &registry, &room, identity.user_id, req.user_id).await?;
    Ok(Json(json!({ "unmuted": true })))
}

#[debug_handler(state = AppState)]
async fn kick_user(
    Path(room_id): Path<Uuid>,
    State(store): State<Store>,
    State(registry): State<Arc<Registry>>,
    session: Session,
    Json(req): Json<TargetReq>,
) -> AppResult<Json<Value>> {
    let identity = require_identity(&session).await?;
    let room = fetch_active_room(&store, room_id).await?;
    moderation::kick(&store, &registry, &room, identity.user_id, req.user_id).await?;
    Ok(Json(json!({ "kicked": true })))
}

#[debug_handler(state = AppState)]
async fn ban_user(
    Path(room_id): Path<Uuid>,
    State(store): State<Store>,
    State(registry): State<Arc<Registry>>,
    session: Session,
    Json(req): Json<TargetReq>,
) -> AppResult<Json<Value>> {
    let identity = require_identity(&session).await?;
    let room = fetch_active_room(&store, room_id).await?;
    moderation::ban(&store, &registry, &room, identity.user_id, req.user_id).await?;
    Ok(Json(json!({ "banned": true })))
}

#[debug_handler(state = AppState)]
async fn unban_user(
    Path(room_id): Path<Uuid>,
    State(store): State<Store>,
    State(registry): State<Arc<Registry>>,
    session: Session,
    Json(req): Json<TargetReq>,
) -> AppResult<Json<Value>> {
    let identity = require_identity(&session).await?;
    let room = fetch_active_room(&store, room_id).await?;
    moderation::unban(&store, &registry, &room, identity.user_id, req.user_id).await?;
    Ok(Json(json!({ "unbanned": true })))
}

#[debug_handler(state = AppState)]
async fn add_banned_word(
    Path(room_id): Path<Uuid>,
    State(store): State<Store>,
    State(registry): State<Arc<Registry>>,
    session: Session,
    Json(req): Json<WordReq>,
) -> AppResult<Json<Value>> {
    let identity = require_identity(&session).await?;
    let room = fetch_active_room(&store, room_id).await?;
    moderation::add_banned_word(&store, &registry, &room, identity.user_id, &req.word).await?;
    Ok(Json(json!({ "added": true })))
}

#[debug_handler(state = AppState)]
async fn remove_banned_word(
    Path(room_id): Path<Uuid>,
    State(store): State<Store>,
    State(registry): State<Arc<Registry>>,
    session: Session,
    Json(req): Json<WordReq>,
) -> AppResult<Json<Value>> {
    let identity = require_identity(&session).await?;
    let room = fetch_active_room(&store, room_id).await?;
    moderation::remove_banned_word(&store, &registry, &room, identity.user_id, &req.word).await?;
    Ok(Json(json!({ "removed": true })))
}

#[debug_handler(state = AppState)]
async fn delete_message(
    Path((room_id, message_id)): Path<(Uuid, Uuid)>,
    State(store): State<Store>,
    State(registry): State<Arc<Registry>>,
    session: Session,
) -> AppResult<Json<Value>> {
    let identity = require_identity(&session).await?;
    let room = fetch_active_room(&store, room_id).await?;
    moderation::delete_message(&store, &registry, &room, identity.user_id, message_id).await?;
    Ok(Json(json!({ "deleted": true })))
}
