use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::availability::format_hhmm;
use crate::models::{Category, Equipment, OperatingWindow};
use crate::state::AppState;

use super::require_admin;

#[derive(Serialize)]
pub struct EquipmentResponse {
    id: i64,
    name: String,
    category_id: i64,
    window_start: String,
    window_end: String,
    retired: bool,
}

impl From<Equipment> for EquipmentResponse {
    fn from(e: Equipment) -> Self {
        EquipmentResponse {
            id: e.id,
            name: e.name,
            category_id: e.category_id,
            window_start: format_hhmm(&e.window.start),
            window_end: format_hhmm(&e.window.end),
            retired: e.retired,
        }
    }
}

// GET /api/bookings/categories
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Category>>, AppError> {
    let categories = {
        let db = state.db()?;
        queries::list_categories(&db)?
    };
    Ok(Json(categories))
}

// GET /api/bookings/equipment
#[derive(Deserialize)]
pub struct EquipmentQuery {
    pub category_id: Option<i64>,
}

pub async fn list_equipment(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EquipmentQuery>,
) -> Result<Json<Vec<EquipmentResponse>>, AppError> {
    let equipment = {
        let db = state.db()?;
        queries::list_equipment(&db, query.category_id)?
    };
    Ok(Json(equipment.into_iter().map(EquipmentResponse::from).collect()))
}

// POST /api/equipment/categories
#[derive(Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
}

pub async fn create_category(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<Json<Category>, AppError> {
    require_admin(&state, &headers)?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("category name is required"));
    }

    let category = {
        let db = state.db()?;
        if queries::list_categories(&db)?.iter().any(|c| c.name == name) {
            return Err(AppError::validation(format!("category {name} already exists")));
        }
        queries::create_category(&db, name)?
    };
    tracing::info!(category_id = category.id, "category created");
    Ok(Json(category))
}

// POST /api/equipment
#[derive(Deserialize)]
pub struct CreateEquipmentRequest {
    pub name: String,
    pub category_id: i64,
    pub window_start: Option<String>,
    pub window_end: Option<String>,
}

pub async fn create_equipment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateEquipmentRequest>,
) -> Result<Json<EquipmentResponse>, AppError> {
    require_admin(&state, &headers)?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("equipment name is required"));
    }

    let default_start = format_hhmm(&state.config.default_window_start);
    let default_end = format_hhmm(&state.config.default_window_end);
    let window = OperatingWindow::parse(
        payload.window_start.as_deref().unwrap_or(&default_start),
        payload.window_end.as_deref().unwrap_or(&default_end),
    )
    .map_err(|e| AppError::validation(e.to_string()))?;

    let equipment = {
        let db = state.db()?;
        if !queries::category_exists(&db, payload.category_id)? {
            return Err(AppError::NotFound(format!("category {}", payload.category_id)));
        }
        queries::create_equipment(&db, name, payload.category_id, &window)?
    };
    tracing::info!(equipment_id = equipment.id, "equipment registered");
    Ok(Json(EquipmentResponse::from(equipment)))
}

// POST /api/equipment/:id/retire
pub async fn retire_equipment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_admin(&state, &headers)?;

    let retired = {
        let db = state.db()?;
        let retired = queries::retire_equipment(&db, id)?;
        state.slot_cache.invalidate_equipment(id);
        retired
    };

    if retired {
        Ok(Json(serde_json::json!({"ok": true})))
    } else {
        Err(AppError::NotFound(format!("equipment {id}")))
    }
}
