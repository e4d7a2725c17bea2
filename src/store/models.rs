//! Row types for the durable store.
//!
//! Ids are UUID v7 stored as TEXT; timestamps are unix seconds. Row structs
//! decode with string ids and convert into the typed models below.

use serde::Serialize;
use uuid::Uuid;

use crate::{AppError, AppResult};

/// Persistent playback state of a room's shared video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    Playing,
    Paused,
}

impl PlayState {
    pub fn as_str(self) -> &'static str {
        match self {
            PlayState::Playing => "playing",
            PlayState::Paused => "paused",
        }
    }

    pub fn parse(s: &str) -> PlayState {
        match s {
            "playing" => PlayState::Playing,
            _ => PlayState::Paused,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    System,
    Event,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::System => "system",
            MessageKind::Event => "event",
        }
    }

    pub fn parse(s: &str) -> MessageKind {
        match s {
            "system" => MessageKind::System,
            "event" => MessageKind::Event,
            _ => MessageKind::Text,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    pub creator_id: Uuid,
    pub is_private: bool,
    pub password_hash: Option<String>,
    pub max_users: i64,
    pub is_active: bool,
    pub is_locked: bool,
    pub allow_chat: bool,
    pub allow_screen_share: bool,
    pub current_video_url: Option<String>,
    pub video_state: PlayState,
    pub video_position: f64,
    pub video_updated_at: i64,
    pub created_at: i64,
    pub deleted_at: Option<i64>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct RoomRow {
    pub id: String,
    pub name: String,
    pub creator_id: String,
    pub is_private: bool,
    pub password_hash: Option<String>,
    pub max_users: i64,
    pub is_active: bool,
    pub is_locked: bool,
    pub allow_chat: bool,
    pub allow_screen_share: bool,
    pub current_video_url: Option<String>,
    pub video_state: String,
    pub video_position: f64,
    pub video_updated_at: i64,
    pub created_at: i64,
    pub deleted_at: Option<i64>,
}

impl TryFrom<RoomRow> for Room {
    type Error = AppError;

    fn try_from(row: RoomRow) -> AppResult<Room> {
        Ok(Room {
            id: Uuid::parse_str(&row.id)?,
            name: row.name,
            creator_id: Uuid::parse_str(&row.creator_id)?,
            is_private: row.is_private,
            password_hash: row.password_hash,
            max_users: row.max_users,
            is_active: row.is_active,
            is_locked: row.is_locked,
            allow_chat: row.allow_chat,
            allow_screen_share: row.allow_screen_share,
            current_video_url: row.current_video_url,
            video_state: PlayState::parse(&row.video_state),
            video_position: row.video_position,
            video_updated_at: row.video_updated_at,
            created_at: row.created_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Participant {
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub is_online: bool,
    pub is_moderator: bool,
    pub is_muted: bool,
    pub muted_until: Option<i64>,
    pub muted_by: Option<Uuid>,
    pub is_banned: bool,
    pub banned_by: Option<Uuid>,
    pub joined_at: i64,
}

#[derive(sqlx::FromRow)]
pub(crate) struct ParticipantRow {
    pub room_id: String,
    pub user_id: String,
    pub is_online: bool,
    pub is_moderator: bool,
    pub is_muted: bool,
    pub muted_until: Option<i64>,
    pub muted_by: Option<String>,
    pub is_banned: bool,
    pub banned_by: Option<String>,
    pub joined_at: i64,
}

impl TryFrom<ParticipantRow> for Participant {
    type Error = AppError;

    fn try_from(row: ParticipantRow) -> AppResult<Participant> {
        Ok(Participant {
            room_id: Uuid::parse_str(&row.room_id)?,
            user_id: Uuid::parse_str(&row.user_id)?,
            is_online: row.is_online,
            is_moderator: row.is_moderator,
            is_muted: row.is_muted,
            muted_until: row.muted_until,
            muted_by: parse_opt(row.muted_by)?,
            is_banned: row.is_banned,
            banned_by: parse_opt(row.banned_by)?,
            joined_at: row.joined_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub body: String,
    pub kind: MessageKind,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct ScreenSession {
    pub id: Uuid,
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: i64,
}

fn parse_opt(id: Option<String>) -> AppResult<Option<Uuid>> {
    Ok(match id {
        Some(id) => Some(Uuid::parse_str(&id)?),
        None => None,
    })
}
