//! Ephemeral typing presence.
//!
//! Entries are advisory and TTL-bounded: a client that disconnects without
//! sending `typing_stop` ages out on the next read or write. Nothing here
//! touches durable storage; all state is lost on restart.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use uuid::Uuid;

pub const TYPING_TTL: Duration = Duration::from_secs(5);

/// Capability interface for the typing store, injected through `AppState` so
/// it can be backed by an in-memory map in tests and a shared cache in
/// production.
pub trait TypingCache: Send + Sync + 'static {
    /// Upsert the entry for (room, user) with the current time.
    fn touch(&self, room_id: Uuid, user_id: Uuid, username: &str);
    fn clear(&self, room_id: Uuid, user_id: Uuid);
    /// Unexpired entries for a room. Pruning happens here, opportunistically.
    fn active(&self, room_id: Uuid) -> Vec<(Uuid, String)>;
}

pub struct MemoryTypingCache {
    ttl: Duration,
    entries: Mutex<HashMap<(Uuid, Uuid), (String, Instant)>>,
}

impl MemoryTypingCache {
    pub fn new() -> Self {
        Self::with_ttl(TYPING_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryTypingCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TypingCache for MemoryTypingCache {
    fn touch(&self, room_id: Uuid, user_id: Uuid, username: &str) {
        let mut entries = self.entries.lock().expect("typing cache poisoned");
        let now = Instant::now();
        entries.retain(|_, (_, at)| now.duration_since(*at) < self.ttl);
        entries.insert((room_id, user_id), (username.to_owned(), now));
    }

    fn clear(&self, room_id: Uuid, user_id: Uuid) {
        let mut entries = self.entries.lock().expect("typing cache poisoned");
        entries.remove(&(room_id, user_id));
    }

    fn active(&self, room_id: Uuid) -> Vec<(Uuid, String)> {
        let mut entries = self.entries.lock().expect("typing cache poisoned");
        let now = Instant::now();
        entries.retain(|_, (_, at)| now.duration_since(*at) < self.ttl);
        entries
            .iter()
            .filter(|((room, _), _)| *room == room_id)
            .map(|((_, user), (name, _))| (*user, name.clone()))
            .collect()
    }
}
