use axum::{Json, debug_handler, extract::State};
use serde_json::{Value, json};
use tower_sessions::Session;

use crate::rooms::guard;
use crate::session::require_identity;
use crate::store::{NewRoom, Store};
use crate::{AppError, AppResult};

pub const MAX_NAME_LEN: usize = 100;

#[debug_handler(state = crate::AppState)]
pub async fn new_room(
    State(store): State<Store>,
    session: Session,
    Json(mut req): Json<NewRoom>,
) -> AppResult<Json<Value>> {
    let identity = require_identity(&session).await?;

    req.name = req.name.trim().to_string();
    if req.name.is_empty() {
        return Err(AppError::Validation("room name must not be empty".into()));
    }
    if req.name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation("room name too long".into()));
    }
    if req.max_users < 1 {
        return Err(AppError::Validation("max_users must be at least 1".into()));
    }

    let password_hash = if req.is_private {
        match req.password.as_deref().map(str::trim) {
            Some(password) if !password.is_empty() => Some(guard::hash_credential(password)?),
            _ => {
                return Err(AppError::Validation(
                    "private rooms require a password".into(),
                ));
            }
        }
    } else {
        None
    };

    let room = store.create_room(&req, identity.user_id, password_hash).await?;
    tracing::info!(room_id = %room.id, creator = %identity.user_id, "room created");
    Ok(Json(json!({ "id": room.id, "name": room.name })))
}
