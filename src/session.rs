//! Session identity keys and extraction helpers.

use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppError, AppResult};

pub const USER_ID: &str = "user_id";
pub const USERNAME: &str = "username";

/// The authenticated identity attached to a session at login.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub username: String,
}

/// Read the identity out of the session, if any.
pub async fn identity(session: &Session) -> AppResult<Option<Identity>> {
    let Some(user_id) = session.get::<String>(USER_ID).await? else {
        return Ok(None);
    };
    let username = session
        .get::<String>(USERNAME)
        .await?
        .unwrap_or_else(|| "anonymous".to_owned());
    Ok(Some(Identity {
        user_id: Uuid::parse_str(&user_id)?,
        username,
    }))
}

/// Identity or `AccessDenied`, for endpoints that require a login.
pub async fn require_identity(session: &Session) -> AppResult<Identity> {
    identity(session)
        .await?
        .ok_or(AppError::AccessDenied("login required"))
}
