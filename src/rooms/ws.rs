//! Room WebSocket: connection establishment, per-connection event loop, and
//! the exhaustive inbound dispatch.
//!
//! One task reads inbound frames in arrival order; a second drains the
//! connection's delivery queue to the socket, serialising each typed event to
//! its own wire frame. A rejected connection is still upgraded so the close
//! code can be delivered, then shut immediately.

use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{
        Path, Query, State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde::Deserialize;
use tokio::sync::mpsc;
use tower_sessions::Session;
use uuid::Uuid;

use crate::session::{self, Identity};
use crate::store::{MessageKind, Room, Store};
use crate::{AppError, AppResult};

use super::guard::{self, JoinRejection};
use super::presence::TypingCache;
use super::protocol::{
    CLOSE_ACCESS_DENIED, CLOSE_INTERNAL, InboundEvent, OutboundEvent, ScreenShareAction,
    close_reason,
};
use super::registry::{
    ChannelLayer, ConnId, DELIVERY_QUEUE_DEPTH, Delivery, DeliverySender, GroupKey, Registry,
};
use super::video;

/// Upper bound on chat message length, in characters.
pub const MAX_MESSAGE_LEN: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Credential for private rooms, supplied before upgrade.
    #[serde(default)]
    pub password: Option<String>,
}

/// Pre-upgrade admission check. Read-only; join side effects run after the
/// socket is established so failures surface as closes, never silent hangs.
pub async fn admit(
    store: &Store,
    room_id: Uuid,
    user_id: Uuid,
    credential: Option<&str>,
) -> AppResult<Result<Room, JoinRejection>> {
    let Some(room) = store.room(room_id).await? else {
        return Ok(Err(JoinRejection::Unavailable));
    };
    let participant = store.participant(room_id, user_id).await?;
    let online = store.online_count(room_id).await?;
    match guard::can_join(&room, participant.as_ref(), credential, online) {
        Ok(()) => Ok(Ok(room)),
        Err(rejection) => Ok(Err(rejection)),
    }
}

#[debug_handler(state = crate::AppState)]
pub async fn room_ws(
    Path(room_id): Path<Uuid>,
    State(store): State<Store>,
    State(registry): State<Arc<Registry>>,
    State(typing): State<Arc<dyn TypingCache>>,
    session: Session,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let identity = session::identity(&session).await.ok().flatten();

    ws.on_upgrade(move |socket| async move {
        let Some(identity) = identity else {
            reject(socket, CLOSE_ACCESS_DENIED).await;
            return;
        };

        let admitted = match admit(&store, room_id, identity.user_id, query.password.as_deref()).await
        {
            Ok(Ok(room)) => room,
            Ok(Err(rejection)) => {
                tracing::info!(
                    room_id = %room_id,
                    user_id = %identity.user_id,
                    ?rejection,
                    "join rejected"
                );
                reject(socket, rejection.close_code()).await;
                return;
            }
            Err(err) => {
                tracing::error!(room_id = %room_id, error = %err, "admission check failed");
                reject(socket, CLOSE_INTERNAL).await;
                return;
            }
        };

        run_session(socket, store, registry, typing, admitted, identity).await;
    })
}

async fn reject(socket: WebSocket, code: u16) {
    let (mut sender, _) = socket.split();
    let _ = sender
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: close_reason(code).into(),
        })))
        .await;
}

async fn run_session(
    socket: WebSocket,
    store: Store,
    registry: Arc<Registry>,
    typing: Arc<dyn TypingCache>,
    room: Room,
    identity: Identity,
) {
    let (sender, mut receiver) = socket.split();
    let conn_id: ConnId = Uuid::now_v7();
    let (tx, rx) = mpsc::channel::<Delivery>(DELIVERY_QUEUE_DEPTH);

    // Join side effects. Accept is only signalled (by the first frames
    // flowing) once all of them succeed; any failure closes the socket.
    if let Err(err) = store.join_participant(room.id, identity.user_id).await {
        tracing::error!(room_id = %room.id, user_id = %identity.user_id, error = %err, "join failed");
        let mut sender = sender;
        let _ = sender
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_INTERNAL,
                reason: close_reason(CLOSE_INTERNAL).into(),
            })))
            .await;
        return;
    }
    registry
        .group_add(GroupKey::Room(room.id), conn_id, identity.user_id, tx.clone())
        .await;
    registry
        .group_add(GroupKey::User(identity.user_id), conn_id, identity.user_id, tx.clone())
        .await;
    registry
        .group_send(
            GroupKey::Room(room.id),
            OutboundEvent::UserJoined {
                user_id: identity.user_id,
                username: identity.username.clone(),
            },
        )
        .await;
    tracing::info!(room_id = %room.id, user_id = %identity.user_id, %conn_id, "connection joined");

    let writer = tokio::spawn(write_deliveries(sender, rx));

    let conn = RoomConn {
        store,
        registry,
        typing,
        room_id: room.id,
        conn_id,
        identity,
        tx,
    };

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => conn.handle_frame(text.as_str()).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {} // binary/ping/pong: nothing to do, axum answers pings
            Err(err) => {
                tracing::warn!(%conn_id, error = %err, "websocket protocol error");
                break;
            }
        }
    }

    conn.leave().await;
    writer.abort();
}

/// Drain the delivery queue to the socket. A `Close` delivery, a closed
/// queue, or a dead socket all end the writer, which tears the session down.
async fn write_deliveries(
    mut sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Delivery>,
) {
    while let Some(delivery) = rx.recv().await {
        match delivery {
            Delivery::Event(event) => match serde_json::to_string(&*event) {
                Ok(frame) => {
                    if sender.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(err) => tracing::error!(error = %err, "failed to serialise outbound event"),
            },
            Delivery::Close(code) => {
                let _ = sender
                    .send(Message::Close(Some(CloseFrame {
                        code,
                        reason: close_reason(code).into(),
                    })))
                    .await;
                break;
            }
        }
    }
}

/// One live connection's view of the engine: everything the dispatch needs.
pub struct RoomConn {
    pub store: Store,
    pub registry: Arc<Registry>,
    pub typing: Arc<dyn TypingCache>,
    pub room_id: Uuid,
    pub conn_id: ConnId,
    pub identity: Identity,
    pub tx: DeliverySender,
}

impl RoomConn {
    /// Decode and dispatch one frame. Malformed or failing frames produce one
    /// `error` frame for the sender; the connection stays open.
    pub async fn handle_frame(&self, raw: &str) {
        let event = match serde_json::from_str::<InboundEvent>(raw) {
            Ok(event) => event,
            Err(err) => {
                tracing::debug!(conn_id = %self.conn_id, error = %err, "malformed frame");
                self.send_self(OutboundEvent::error(&AppError::Validation(
                    "malformed frame".into(),
                )));
                return;
            }
        };
        if let Err(err) = self.handle_event(event).await {
            if err.is_internal() {
                tracing::error!(conn_id = %self.conn_id, room_id = %self.room_id, error = %err, "event failed");
            }
            self.send_self(OutboundEvent::error(&err));
        }
    }

    pub async fn handle_event(&self, event: InboundEvent) -> AppResult<()> {
        match event {
            InboundEvent::ChatMessage { message } => self.chat(message).await,
            InboundEvent::VideoControl {
                action,
                timestamp,
                url,
            } => self.video_control(action, timestamp, url).await,
            InboundEvent::ScreenShare { action } => self.screen_share(action).await,
            InboundEvent::Ping => {
                self.send_self(OutboundEvent::Pong);
                Ok(())
            }
            InboundEvent::WebrtcSignal { to, signal } => self.webrtc_signal(to, signal).await,
            InboundEvent::TypingStart => self.typing_indicator(true).await,
            InboundEvent::TypingStop => self.typing_indicator(false).await,
        }
    }

    /// Mark the participant offline and leave the groups. Safe to call on an
    /// already-left connection: only the first call broadcasts `user_left`.
    pub async fn leave(&self) {
        let was_registered = self
            .registry
            .group_discard(GroupKey::Room(self.room_id), self.conn_id)
            .await;
        self.registry
            .group_discard(GroupKey::User(self.identity.user_id), self.conn_id)
            .await;
        if !was_registered {
            return;
        }
        self.typing.clear(self.room_id, self.identity.user_id);
        if let Err(err) = self
            .store
            .set_offline(self.room_id, self.identity.user_id)
            .await
        {
            tracing::error!(room_id = %self.room_id, error = %err, "failed to mark participant offline");
        }
        self.registry
            .group_send(
                GroupKey::Room(self.room_id),
                OutboundEvent::UserLeft {
                    user_id: self.identity.user_id,
                    username: self.identity.username.clone(),
                },
            )
            .await;
        tracing::info!(room_id = %self.room_id, user_id = %self.identity.user_id, conn_id = %self.conn_id, "connection left");
    }

    fn send_self(&self, event: OutboundEvent) {
        // a full or closed queue means the writer is stalled or gone
        let _ = self.tx.try_send(Delivery::Event(Arc::new(event)));
    }

    async fn room(&self) -> AppResult<Room> {
        self.store
            .active_room(self.room_id)
            .await?
            .ok_or(AppError::NotFound("room"))
    }

    async fn chat(&self, message: String) -> AppResult<()> {
        let body = message.trim();
        if body.is_empty() {
            return Err(AppError::Validation("message must not be empty".into()));
        }
        if body.chars().count() > MAX_MESSAGE_LEN {
            return Err(AppError::Validation("message too long".into()));
        }

        let room = self.room().await?;
        if !room.allow_chat {
            return Err(AppError::StateConflict("chat is disabled in this room"));
        }
        let participant = self
            .store
            .participant(room.id, self.identity.user_id)
            .await?
            .ok_or(AppError::NotFound("participant"))?;
        if participant.is_banned {
            return Err(AppError::AccessDenied("you are banned from this room"));
        }
        if guard::is_muted(&self.store, &participant).await? {
            return Err(AppError::StateConflict("you are muted"));
        }
        let words = self.store.banned_words(room.id).await?;
        if guard::contains_banned_word(&words, body) {
            return Err(AppError::BannedContent);
        }

        let message = self
            .store
            .insert_message(room.id, self.identity.user_id, body, MessageKind::Text)
            .await?;
        self.registry
            .group_send(
                GroupKey::Room(room.id),
                OutboundEvent::ChatMessage {
                    id: message.id,
                    user_id: self.identity.user_id,
                    username: self.identity.username.clone(),
                    message: message.body,
                    created_at: message.created_at,
                },
            )
            .await;
        Ok(())
    }

    async fn video_control(
        &self,
        action: String,
        timestamp: Option<f64>,
        url: Option<String>,
    ) -> AppResult<()> {
        let room = self.room().await?;
        let state = video::apply_control(&self.store, &room, &action, timestamp, url.as_deref()).await?;
        self.registry
            .group_send(
                GroupKey::Room(room.id),
                OutboundEvent::VideoControl {
                    user_id: self.identity.user_id,
                    action,
                    timestamp: state.position,
                    url: state.url,
                    server_time: video::server_stamp(),
                },
            )
            .await;
        Ok(())
    }

    async fn screen_share(&self, action: ScreenShareAction) -> AppResult<()> {
        let room = self.room().await?;
        if !room.allow_screen_share {
            return Err(AppError::StateConflict(
                "screen sharing is disabled in this room",
            ));
        }
        match action {
            ScreenShareAction::Start => {
                let session = self
                    .store
                    .start_screen_session(room.id, self.identity.user_id)
                    .await?;
                self.registry
                    .group_send(
                        GroupKey::Room(room.id),
                        OutboundEvent::ScreenShareStarted {
                            user_id: self.identity.user_id,
                            username: self.identity.username.clone(),
                            session_id: session.id,
                        },
                    )
                    .await;
            }
            ScreenShareAction::Stop => {
                self.store
                    .end_screen_session(room.id, self.identity.user_id)
                    .await?;
                self.registry
                    .group_send(
                        GroupKey::Room(room.id),
                        OutboundEvent::ScreenShareEnded {
                            user_id: self.identity.user_id,
                            username: self.identity.username.clone(),
                        },
                    )
                    .await;
            }
        }
        Ok(())
    }

    /// Relay a peer-negotiation payload to one user's sessions, uninspected.
    async fn webrtc_signal(&self, to: Uuid, signal: serde_json::Value) -> AppResult<()> {
        let delivered = self
            .registry
            .send_to_user(
                to,
                OutboundEvent::WebrtcSignal {
                    from: self.identity.user_id,
                    signal,
                },
            )
            .await;
        if delivered == 0 {
            return Err(AppError::NotFound("user"));
        }
        Ok(())
    }

    async fn typing_indicator(&self, is_typing: bool) -> AppResult<()> {
        if is_typing {
            self.typing
                .touch(self.room_id, self.identity.user_id, &self.identity.username);
        } else {
            self.typing.clear(self.room_id, self.identity.user_id);
        }
        self.registry
            .group_send(
                GroupKey::Room(self.room_id),
                OutboundEvent::TypingIndicator {
                    user_id: self.identity.user_id,
                    username: self.identity.username.clone(),
                    is_typing,
                },
            )
            .await;
        Ok(())
    }
}
