use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::services::calendar::{self, generate_ics, MonthOverview};
use crate::state::AppState;

use super::authenticate_optional;

// GET /api/bookings/calendar
#[derive(Deserialize)]
pub struct CalendarQuery {
    pub year: i32,
    pub month: u32,
}

/// Anonymous callers and administrators see every booking; other users see
/// only their own.
pub async fn month_overview(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<MonthOverview>, AppError> {
    let user = authenticate_optional(&state, &headers)?;
    let user_id = user.filter(|u| !u.is_admin).map(|u| u.id);

    let overview = {
        let db = state.db()?;
        calendar::month_overview(&db, query.year, query.month, user_id)?
    };
    Ok(Json(overview))
}

// GET /api/bookings/:id/ics
pub async fn download_ics(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    let booking_id = raw_id.strip_suffix(".ics").unwrap_or(&raw_id);

    let (booking, equipment_name) = {
        let db = state.db()?;
        let booking = queries::get_booking_by_id(&db, booking_id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;
        let equipment_name = queries::get_equipment(&db, booking.equipment_id)?
            .map(|e| e.name)
            .unwrap_or_else(|| "Equipment".to_string());
        (booking, equipment_name)
    };

    let ics = generate_ics(&booking, &equipment_name);
    let disposition = format!("attachment; filename=\"booking-{booking_id}.ics\"");

    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        ics,
    )
        .into_response())
}
