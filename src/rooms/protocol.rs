//! Wire envelopes: JSON text frames, one per logical event.
//!
//! Inbound and outbound events are closed enums so the dispatcher's match is
//! exhaustive and adding an event kind is a compile-time-checked change.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::AppError;

/// Close codes, distinct per rejection reason so clients can present
/// differentiated UX.
pub const CLOSE_NORMAL: u16 = 1000;
/// No authenticated identity, or the room is locked / the credential is wrong.
pub const CLOSE_ACCESS_DENIED: u16 = 4001;
/// Room missing or soft-deleted.
pub const CLOSE_ROOM_UNAVAILABLE: u16 = 4002;
pub const CLOSE_ROOM_FULL: u16 = 4003;
/// Rejected at join time because of a standing ban.
pub const CLOSE_BANNED: u16 = 4004;
pub const CLOSE_INTERNAL: u16 = 4005;
/// Kicked after joining.
pub const CLOSE_KICKED: u16 = 4100;
/// Banned after joining.
pub const CLOSE_BANNED_LIVE: u16 = 4101;

pub fn close_reason(code: u16) -> &'static str {
    match code {
        CLOSE_NORMAL => "bye",
        CLOSE_ACCESS_DENIED => "access denied",
        CLOSE_ROOM_UNAVAILABLE => "room unavailable",
        CLOSE_ROOM_FULL => "room full",
        CLOSE_BANNED => "banned",
        CLOSE_INTERNAL => "internal error",
        CLOSE_KICKED => "kicked",
        CLOSE_BANNED_LIVE => "banned",
        _ => "",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenShareAction {
    Start,
    Stop,
}

/// Events a client may send over the socket.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    ChatMessage {
        message: String,
    },
    /// `action` stays a free string: unrecognised actions are ignored while
    /// position/url updates still apply.
    VideoControl {
        action: String,
        #[serde(default)]
        timestamp: Option<f64>,
        #[serde(default)]
        url: Option<String>,
    },
    ScreenShare {
        action: ScreenShareAction,
    },
    Ping,
    /// Peer-negotiation payload relayed verbatim to one user.
    WebrtcSignal {
        to: Uuid,
        signal: Value,
    },
    TypingStart,
    TypingStop,
}

/// Events the server fans out to connections.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    ChatMessage {
        id: Uuid,
        user_id: Uuid,
        username: String,
        message: String,
        created_at: i64,
    },
    VideoControl {
        user_id: Uuid,
        action: String,
        timestamp: f64,
        url: Option<String>,
        /// Server stamp (unix ms); receivers compute one-way latency as
        /// `receive_time - server_time` and correct playback locally.
        server_time: i64,
    },
    ScreenShareStarted {
        user_id: Uuid,
        username: String,
        session_id: Uuid,
    },
    ScreenShareEnded {
        user_id: Uuid,
        username: String,
    },
    UserJoined {
        user_id: Uuid,
        username: String,
    },
    UserLeft {
        user_id: Uuid,
        username: String,
    },
    WebrtcSignal {
        from: Uuid,
        signal: Value,
    },
    MessageDeleted {
        message_id: Uuid,
    },
    UserMuted {
        user_id: Uuid,
        by: Uuid,
        duration_secs: i64,
        muted_until: i64,
    },
    UserUnmuted {
        user_id: Uuid,
        by: Uuid,
    },
    UserKicked {
        user_id: Uuid,
        by: Uuid,
    },
    YouWereKicked {
        room_id: Uuid,
    },
    UserBanned {
        user_id: Uuid,
        by: Uuid,
    },
    YouWereBanned {
        room_id: Uuid,
    },
    UserUnbanned {
        user_id: Uuid,
        by: Uuid,
    },
    BannedWordAdded {
        word: String,
    },
    BannedWordRemoved {
        word: String,
    },
    TypingIndicator {
        user_id: Uuid,
        username: String,
        is_typing: bool,
    },
    Pong,
    Error {
        code: String,
        message: String,
    },
}

impl OutboundEvent {
    pub fn error(err: &AppError) -> OutboundEvent {
        OutboundEvent::Error {
            code: err.code().to_owned(),
            message: err.public_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_frames_parse() {
        let ev: InboundEvent =
            serde_json::from_str(r#"{"type":"chat_message","message":"hi"}"#).unwrap();
        assert_eq!(
            ev,
            InboundEvent::ChatMessage {
                message: "hi".into()
            }
        );

        let ev: InboundEvent =
            serde_json::from_str(r#"{"type":"video_control","action":"play","timestamp":42.0}"#)
                .unwrap();
        assert_eq!(
            ev,
            InboundEvent::VideoControl {
                action: "play".into(),
                timestamp: Some(42.0),
                url: None
            }
        );

        let ev: InboundEvent =
            serde_json::from_str(r#"{"type":"screen_share","action":"start"}"#).unwrap();
        assert_eq!(
            ev,
            InboundEvent::ScreenShare {
                action: ScreenShareAction::Start
            }
        );

        let ev: InboundEvent = serde_json::from_str(r#"{"type":"typing_start"}"#).unwrap();
        assert_eq!(ev, InboundEvent::TypingStart);
    }

    #[test]
    fn unknown_inbound_type_is_an_error() {
        assert!(serde_json::from_str::<InboundEvent>(r#"{"type":"mystery"}"#).is_err());
        assert!(serde_json::from_str::<InboundEvent>("not json").is_err());
    }

    #[test]
    fn outbound_frames_are_tagged() {
        let frame = serde_json::to_value(OutboundEvent::Pong).unwrap();
        assert_eq!(frame["type"], "pong");

        let frame = serde_json::to_value(OutboundEvent::TypingIndicator {
            user_id: Uuid::nil(),
            username: "a".into(),
            is_typing: true,
        })
        .unwrap();
        assert_eq!(frame["type"], "typing_indicator");
        assert_eq!(frame["is_typing"], true);

        let frame = serde_json::to_value(OutboundEvent::error(&AppError::BannedContent)).unwrap();
        assert_eq!(frame["type"], "error");
        assert_eq!(frame["code"], "banned_content");
    }

    #[test]
    fn close_codes_are_distinct() {
        let codes = [
            CLOSE_NORMAL,
            CLOSE_ACCESS_DENIED,
            CLOSE_ROOM_UNAVAILABLE,
            CLOSE_ROOM_FULL,
            CLOSE_BANNED,
            CLOSE_INTERNAL,
            CLOSE_KICKED,
            CLOSE_BANNED_LIVE,
        ];
        let mut unique = codes.to_vec();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), codes.len());
    }
}
