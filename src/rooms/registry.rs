//! Room Session Registry: live connections per room and per user, with
//! group-scoped fan-out.
//!
//! Groups follow the channel-layer model: a room group for broadcast, and a
//! per-user group for private signaling and moderation notices. Deliveries go
//! through one bounded mpsc per connection; each connection serialises
//! events to its own wire frame at the socket writer. Publish order per group
//! is serialised by the registry's exclusive lock, and the per-connection
//! queue preserves it, so delivery is FIFO per room for every subscriber.
//!
//! A connection whose queue is full has stopped draining (stalled TCP peer);
//! it is shed from the group with a warning rather than queueing further
//! deliveries for it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use super::protocol::OutboundEvent;

pub type ConnId = Uuid;

/// Broadcast group key. User groups carry kick/ban notices and signaling to
/// all of a user's sessions regardless of room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Room(Uuid),
    User(Uuid),
}

/// One delivery to a connection: a typed event, or an instruction to close
/// the socket with a reason code.
#[derive(Debug, Clone)]
pub enum Delivery {
    Event(Arc<OutboundEvent>),
    Close(u16),
}

/// Per-connection delivery queue depth. A consumer this far behind is shed.
pub const DELIVERY_QUEUE_DEPTH: usize = 256;

pub type DeliverySender = mpsc::Sender<Delivery>;
pub type DeliveryReceiver = mpsc::Receiver<Delivery>;

struct Member {
    user_id: Uuid,
    tx: DeliverySender,
}

/// The publish/subscribe contract the engine needs from a fan-out backbone.
/// [`Registry`] is the in-process implementation; a cross-process backbone
/// would implement the same surface over an external transport.
pub trait ChannelLayer {
    fn group_add(
        &self,
        key: GroupKey,
        conn: ConnId,
        user_id: Uuid,
        tx: DeliverySender,
    ) -> impl Future<Output = ()> + Send;
    fn group_discard(&self, key: GroupKey, conn: ConnId) -> impl Future<Output = bool> + Send;
    fn group_send(&self, key: GroupKey, event: OutboundEvent)
    -> impl Future<Output = usize> + Send;
}

#[derive(Default)]
pub struct Registry {
    groups: RwLock<HashMap<GroupKey, HashMap<ConnId, Member>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn group_len(&self, key: GroupKey) -> usize {
        self.groups
            .read()
            .await
            .get(&key)
            .map_or(0, |members| members.len())
    }

    /// Deliver to every session of one user, in any room.
    pub async fn send_to_user(&self, user_id: Uuid, event: OutboundEvent) -> usize {
        self.group_send(GroupKey::User(user_id), event).await
    }

    /// Close every connection a user holds in one room. A queue too full to
    /// take the close belongs to a stalled peer; that member is shed and the
    /// socket is left to die at the transport.
    pub async fn close_user_in_room(&self, room_id: Uuid, user_id: Uuid, code: u16) -> usize {
        let key = GroupKey::Room(room_id);
        let mut groups = self.groups.write().await;
        let Some(members) = groups.get_mut(&key) else {
            return 0;
        };
        let mut closed = 0;
        members.retain(|_, member| {
            if member.user_id != user_id {
                return true;
            }
            match member.tx.try_send(Delivery::Close(code)) {
                Ok(()) => {
                    closed += 1;
                    true
                }
                Err(err) => {
                    tracing::warn!(user_id = %member.user_id, error = %err, "shedding connection on close");
                    false
                }
            }
        });
        if members.is_empty() {
            groups.remove(&key);
        }
        closed
    }

    /// Close every live connection in a room (room deactivated).
    pub async fn close_group(&self, room_id: Uuid, code: u16) -> usize {
        let key = GroupKey::Room(room_id);
        let mut groups = self.groups.write().await;
        let Some(members) = groups.get_mut(&key) else {
            return 0;
        };
        let mut closed = 0;
        members.retain(|_, member| match member.tx.try_send(Delivery::Close(code)) {
            Ok(()) => {
                closed += 1;
                true
            }
            Err(err) => {
                tracing::warn!(user_id = %member.user_id, error = %err, "shedding connection on close");
                false
            }
        });
        if members.is_empty() {
            groups.remove(&key);
        }
        closed
    }
}

impl ChannelLayer for Registry {
    async fn group_add(&self, key: GroupKey, conn: ConnId, user_id: Uuid, tx: DeliverySender) {
        let mut groups = self.groups.write().await;
        groups
            .entry(key)
            .or_default()
            .insert(conn, Member { user_id, tx });
    }

    /// Returns whether the connection was still registered, which lets the
    /// leave path stay idempotent.
    async fn group_discard(&self, key: GroupKey, conn: ConnId) -> bool {
        let mut groups = self.groups.write().await;
        let Some(members) = groups.get_mut(&key) else {
            return false;
        };
        let removed = members.remove(&conn).is_some();
        if members.is_empty() {
            groups.remove(&key);
        }
        removed
    }

    /// Fan a typed event out to every member. The write lock serialises
    /// publish order for the group. Members whose queue is full or closed
    /// are shed.
    async fn group_send(&self, key: GroupKey, event: OutboundEvent) -> usize {
        let event = Arc::new(event);
        let mut groups = self.groups.write().await;
        let Some(members) = groups.get_mut(&key) else {
            return 0;
        };
        let mut delivered = 0;
        members.retain(
            |_, member| match member.tx.try_send(Delivery::Event(event.clone())) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(user_id = %member.user_id, "delivery queue full, shedding slow connection");
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::warn!(user_id = %member.user_id, "dropping delivery to closed connection");
                    false
                }
            },
        );
        if members.is_empty() {
            groups.remove(&key);
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rooms::protocol::CLOSE_KICKED;

    fn conn() -> (ConnId, DeliverySender, DeliveryReceiver) {
        let (tx, rx) = mpsc::channel(DELIVERY_QUEUE_DEPTH);
        (Uuid::now_v7(), tx, rx)
    }

    fn pong() -> OutboundEvent {
        OutboundEvent::Pong
    }

    async fn expect_event(rx: &mut DeliveryReceiver) -> Arc<OutboundEvent> {
        match rx.try_recv().expect("delivery pending") {
            Delivery::Event(ev) => ev,
            Delivery::Close(code) => panic!("unexpected close {code}"),
        }
    }

    #[tokio::test]
    async fn group_fan_out_reaches_all_members() {
        let registry = Registry::new();
        let room = GroupKey::Room(Uuid::now_v7());
        let user = Uuid::now_v7();
        let (c1, tx1, mut rx1) = conn();
        let (c2, tx2, mut rx2) = conn();
        registry.group_add(room, c1, user, tx1).await;
        registry.group_add(room, c2, user, tx2).await;

        assert_eq!(registry.group_send(room, pong()).await, 2);
        expect_event(&mut rx1).await;
        expect_event(&mut rx2).await;
    }

    #[tokio::test]
    async fn publish_order_is_fifo_per_subscriber() {
        let registry = Registry::new();
        let room = GroupKey::Room(Uuid::now_v7());
        let (c1, tx1, mut rx1) = conn();
        registry.group_add(room, c1, Uuid::now_v7(), tx1).await;

        for word in ["one", "two", "three"] {
            registry
                .group_send(
                    room,
                    OutboundEvent::BannedWordAdded { word: word.into() },
                )
                .await;
        }
        for expected in ["one", "two", "three"] {
            match &*expect_event(&mut rx1).await {
                OutboundEvent::BannedWordAdded { word } => assert_eq!(word, expected),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn discard_is_idempotent() {
        let registry = Registry::new();
        let room = GroupKey::Room(Uuid::now_v7());
        let (c1, tx1, _rx1) = conn();
        registry.group_add(room, c1, Uuid::now_v7(), tx1).await;

        assert!(registry.group_discard(room, c1).await);
        assert!(!registry.group_discard(room, c1).await);
        assert_eq!(registry.group_len(room).await, 0);
        assert_eq!(registry.group_send(room, pong()).await, 0);
    }

    #[tokio::test]
    async fn user_group_spans_rooms() {
        let registry = Registry::new();
        let user = Uuid::now_v7();
        let (c1, tx1, mut rx1) = conn();
        let (c2, tx2, mut rx2) = conn();
        // same user connected in two different rooms
        registry.group_add(GroupKey::User(user), c1, user, tx1).await;
        registry.group_add(GroupKey::User(user), c2, user, tx2).await;

        assert_eq!(registry.send_to_user(user, pong()).await, 2);
        expect_event(&mut rx1).await;
        expect_event(&mut rx2).await;
    }

    #[tokio::test]
    async fn close_user_in_room_targets_only_that_user() {
        let registry = Registry::new();
        let room_id = Uuid::now_v7();
        let room = GroupKey::Room(room_id);
        let target = Uuid::now_v7();
        let bystander = Uuid::now_v7();
        let (c1, tx1, mut rx1) = conn();
        let (c2, tx2, mut rx2) = conn();
        registry.group_add(room, c1, target, tx1).await;
        registry.group_add(room, c2, bystander, tx2).await;

        assert_eq!(registry.close_user_in_room(room_id, target, CLOSE_KICKED).await, 1);
        match rx1.try_recv().unwrap() {
            Delivery::Close(code) => assert_eq!(code, CLOSE_KICKED),
            other => panic!("unexpected {other:?}"),
        }
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_consumer_is_shed_on_overflow() {
        let registry = Registry::new();
        let room = GroupKey::Room(Uuid::now_v7());
        let (tx, mut rx) = mpsc::channel(2);
        registry.group_add(room, Uuid::now_v7(), Uuid::now_v7(), tx).await;

        assert_eq!(registry.group_send(room, pong()).await, 1);
        assert_eq!(registry.group_send(room, pong()).await, 1);
        // the queue is full and nobody is draining: the next send sheds
        assert_eq!(registry.group_send(room, pong()).await, 0);
        assert_eq!(registry.group_len(room).await, 0);

        // the backlog stays intact for a late drain, then the queue ends
        expect_event(&mut rx).await;
        expect_event(&mut rx).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn close_group_reaches_everyone() {
        let registry = Registry::new();
        let room_id = Uuid::now_v7();
        let room = GroupKey::Room(room_id);
        let (c1, tx1, mut rx1) = conn();
        let (c2, tx2, mut rx2) = conn();
        registry.group_add(room, c1, Uuid::now_v7(), tx1).await;
        registry.group_add(room, c2, Uuid::now_v7(), tx2).await;

        assert_eq!(registry.close_group(room_id, 4002).await, 2);
        assert!(matches!(rx1.try_recv().unwrap(), Delivery::Close(4002)));
        assert!(matches!(rx2.try_recv().unwrap(), Delivery::Close(4002)));
    }
}
