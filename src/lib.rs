pub mod auth;
pub mod error;
pub mod rooms;
pub mod session;
pub mod store;

use std::sync::Arc;

use axum::extract::FromRef;

use rooms::presence::TypingCache;
use rooms::registry::Registry;
use store::Store;

pub use error::{AppError, AppResult};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: Store,
    pub registry: Arc<Registry>,
    pub typing: Arc<dyn TypingCache>,
}

impl AppState {
    pub fn new(store: Store, registry: Arc<Registry>, typing: Arc<dyn TypingCache>) -> Self {
        Self {
            store,
            registry,
            typing,
        }
    }
}

/// Unix seconds, the storage resolution for all durable timestamps.
pub fn now_ts() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

/// Unix milliseconds, used for server stamps on latency-compensated broadcasts.
pub fn now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
