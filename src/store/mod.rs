//! Durable-store contract over SQLite.
//!
//! Each public method is one logical transaction: single statements rely on
//! SQLite's per-statement atomicity, multi-statement operations open an
//! explicit transaction. Callers never hold locks across these calls.

mod messages;
mod models;
mod participants;
mod rooms;
mod screens;
mod users;

pub use models::{Message, MessageKind, Participant, PlayState, Room, ScreenSession, User};
pub use rooms::NewRoom;

use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::AppResult;

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect and initialise the schema. `sqlite::memory:` works for tests;
    /// a single connection keeps the in-memory database shared.
    pub async fn connect(url: &str) -> AppResult<Store> {
        let max = if url.contains(":memory:") { 1 } else { 16 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max)
            .connect(url)
            .await?;
        let store = Store::new(pool);
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn init_schema(&self) -> AppResult<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS rooms (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    creator_id TEXT NOT NULL REFERENCES users(id),
    is_private INTEGER NOT NULL DEFAULT 0,
    password_hash TEXT,
    max_users INTEGER NOT NULL DEFAULT 10,
    is_active INTEGER NOT NULL DEFAULT 1,
    is_locked INTEGER NOT NULL DEFAULT 0,
    allow_chat INTEGER NOT NULL DEFAULT 1,
    allow_screen_share INTEGER NOT NULL DEFAULT 1,
    current_video_url TEXT,
    video_state TEXT NOT NULL DEFAULT 'paused',
    video_position REAL NOT NULL DEFAULT 0,
    video_updated_at INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    deleted_at INTEGER
);

CREATE TABLE IF NOT EXISTS participants (
    room_id TEXT NOT NULL REFERENCES rooms(id),
    user_id TEXT NOT NULL REFERENCES users(id),
    is_online INTEGER NOT NULL DEFAULT 1,
    is_moderator INTEGER NOT NULL DEFAULT 0,
    is_muted INTEGER NOT NULL DEFAULT 0,
    muted_until INTEGER,
    muted_by TEXT,
    is_banned INTEGER NOT NULL DEFAULT 0,
    banned_by TEXT,
    joined_at INTEGER NOT NULL,
    PRIMARY KEY (room_id, user_id)
);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    room_id TEXT NOT NULL REFERENCES rooms(id),
    user_id TEXT NOT NULL REFERENCES users(id),
    body TEXT NOT NULL,
    kind TEXT NOT NULL DEFAULT 'text',
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_room_created ON messages(room_id, created_at, id);

CREATE TABLE IF NOT EXISTS screen_sessions (
    id TEXT PRIMARY KEY,
    room_id TEXT NOT NULL REFERENCES rooms(id),
    user_id TEXT NOT NULL REFERENCES users(id),
    started_at INTEGER NOT NULL,
    ended_at INTEGER,
    is_active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS banned_words (
    room_id TEXT NOT NULL REFERENCES rooms(id),
    word TEXT NOT NULL,
    PRIMARY KEY (room_id, word)
);
"#;
