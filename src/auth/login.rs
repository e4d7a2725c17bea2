use axum::{Json, debug_handler, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_sessions::Session;

use crate::session::{USER_ID, USERNAME};
use crate::store::Store;
use crate::{AppError, AppResult};

#[derive(Debug, Deserialize)]
pub struct LoginReq {
    pub username: String,
}

fn valid_username(name: &str) -> bool {
    let len = name.chars().count();
    (3..=32).contains(&len)
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == ' ' || c == '_')
}

/// Name-based login: resolves (or creates) the user and binds the identity to
/// the session cookie.
#[debug_handler(state = crate::AppState)]
pub async fn login(
    State(store): State<Store>,
    session: Session,
    Json(req): Json<LoginReq>,
) -> AppResult<Json<Value>> {
    let username = req.username.trim();
    if !valid_username(username) {
        return Err(AppError::Validation(
            "username must be 3-32 characters of letters, digits, spaces or underscores".into(),
        ));
    }

    let user = store.get_or_create_user(username).await?;
    session.insert(USER_ID, user.id.to_string()).await?;
    session.insert(USERNAME, user.username.clone()).await?;
    tracing::info!(user_id = %user.id, "logged in");

    Ok(Json(json!({ "user_id": user.id, "username": user.username })))
}
