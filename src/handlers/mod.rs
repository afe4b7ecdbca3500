pub mod bookings;
pub mod calendar;
pub mod catalog;
pub mod events;
pub mod health;
pub mod users;

use axum::http::HeaderMap;
use chrono::{NaiveDate, NaiveDateTime};

use crate::errors::AppError;
use crate::models::User;
use crate::services::auth;
use crate::state::AppState;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Resolves the caller from `Authorization: Bearer <token>`.
pub fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<User, AppError> {
    let token = bearer_token(headers).ok_or(AppError::Unauthorized)?;
    authenticate_token(state, token)
}

/// Like [`authenticate`] but anonymous requests yield `None`. A token that
/// is present but unknown is still rejected.
pub fn authenticate_optional(state: &AppState, headers: &HeaderMap) -> Result<Option<User>, AppError> {
    match bearer_token(headers) {
        Some(token) => authenticate_token(state, token).map(Some),
        None => Ok(None),
    }
}

pub fn authenticate_token(state: &AppState, token: &str) -> Result<User, AppError> {
    let db = state.db()?;
    auth::find_user_by_token(&db, &state.config.token_secret, token)?
        .ok_or(AppError::Unauthorized)
}

pub fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<User, AppError> {
    let user = authenticate(state, headers)?;
    if !user.is_admin {
        return Err(AppError::Forbidden("administrator access required".to_string()));
    }
    Ok(user)
}

pub fn parse_date(s: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("invalid date: {s}")))
}

pub fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}
