use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::User;
use crate::services::auth;
use crate::state::AppState;

use super::{authenticate, now, require_admin};

// GET /api/users/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<User>, AppError> {
    Ok(Json(authenticate(&state, &headers)?))
}

// GET /api/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<User>>, AppError> {
    require_admin(&state, &headers)?;
    let users = {
        let db = state.db()?;
        queries::list_users(&db)?
    };
    Ok(Json(users))
}

// POST /api/users
#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub display_name: String,
    pub email: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

/// The plain token is returned only here; the store keeps its digest.
#[derive(Serialize)]
pub struct CreatedUser {
    user: User,
    token: String,
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<CreatedUser>, AppError> {
    require_admin(&state, &headers)?;
    let display_name = payload.display_name.trim();
    if display_name.is_empty() {
        return Err(AppError::validation("display_name is required"));
    }

    let token = auth::generate_token();
    let digest = auth::token_digest(&state.config.token_secret, &token)?;
    let user = {
        let db = state.db()?;
        queries::create_user(
            &db,
            display_name,
            payload.email.as_deref(),
            &digest,
            payload.is_admin,
            &now(),
        )?
    };
    tracing::info!(user_id = user.id, is_admin = user.is_admin, "user created");

    Ok(Json(CreatedUser { user, token }))
}

// POST /api/users/:id/block, /api/users/:id/unblock
pub async fn block_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    set_blocked(&state, &headers, id, true)
}

pub async fn unblock_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    set_blocked(&state, &headers, id, false)
}

fn set_blocked(
    state: &AppState,
    headers: &HeaderMap,
    id: i64,
    blocked: bool,
) -> Result<Json<serde_json::Value>, AppError> {
    let admin = require_admin(state, headers)?;
    if admin.id == id && blocked {
        return Err(AppError::validation("administrators cannot block themselves"));
    }

    let updated = {
        let db = state.db()?;
        queries::set_user_blocked(&db, id, blocked)?
    };
    if !updated {
        return Err(AppError::NotFound(format!("user {id}")));
    }

    tracing::info!(user_id = id, blocked, "user block state changed");
    Ok(Json(serde_json::json!({"ok": true})))
}
