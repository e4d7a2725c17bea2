use std::sync::Arc;

use axum::Router;
use syncroom::rooms::presence::MemoryTypingCache;
use syncroom::rooms::registry::Registry;
use syncroom::store::Store;
use syncroom::{AppState, auth, rooms};
use tower_http::cors::CorsLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let database_url =
        dotenv::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://syncroom.db?mode=rwc".to_owned());
    let store = Store::connect(&database_url).await?;

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(12)));

    let state = AppState::new(
        store,
        Arc::new(Registry::new()),
        Arc::new(MemoryTypingCache::default()),
    );

    let app = Router::new()
        .merge(auth::router())
        .nest("/r", rooms::router())
        .with_state(state)
        .layer(session_layer)
        .layer(CorsLayer::permissive());

    let addr = dotenv::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
