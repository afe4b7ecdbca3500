use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::availability::{format_hhmm, parse_time};
use crate::models::{Booking, BookingDetails, BookingEventKind, Slot};
use crate::services::bookings::{self, NewBooking};
use crate::services::events;
use crate::state::AppState;

use super::{authenticate, now, parse_date, require_admin};

#[derive(Serialize)]
pub struct BookingResponse {
    id: String,
    equipment_id: i64,
    user_id: i64,
    date: String,
    time_start: String,
    time_end: String,
    duration_minutes: i32,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    finished_at: Option<String>,
}

impl From<&Booking> for BookingResponse {
    fn from(b: &Booking) -> Self {
        BookingResponse {
            id: b.id.clone(),
            equipment_id: b.equipment_id,
            user_id: b.user_id,
            date: b.date.format("%Y-%m-%d").to_string(),
            time_start: format_hhmm(&b.start_time),
            time_end: format_hhmm(&b.end_time()),
            duration_minutes: b.duration_minutes,
            status: b.status.as_str().to_string(),
            finished_at: b.finished_at.as_ref().map(format_hhmm),
        }
    }
}

// GET /api/bookings/slots
#[derive(Deserialize)]
pub struct SlotsQuery {
    pub equipment_id: i64,
    pub selected_date: String,
    pub step_minutes: Option<i32>,
}

#[derive(Serialize)]
pub struct SlotsResponse {
    slots: Vec<Slot>,
    step_minutes: i32,
    start_time: String,
    end_time: String,
}

pub async fn get_slots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<SlotsResponse>, AppError> {
    let date = parse_date(&query.selected_date)?;
    let rules = state.rules();
    let step = query.step_minutes.unwrap_or(rules.step_minutes);

    // Cache is consulted under the db lock; see SlotCache. Only the
    // configured step is cached.
    let cacheable = step == rules.step_minutes;
    let available = {
        let mut db = state.db()?;
        let cached = if cacheable {
            state.slot_cache.get(query.equipment_id, &date, step)
        } else {
            None
        };
        match cached {
            Some(hit) => hit,
            None => {
                let fresh =
                    bookings::available_slots(&mut db, &rules, query.equipment_id, &date, Some(step))?;
                if cacheable {
                    state.slot_cache.put(query.equipment_id, &date, fresh.clone());
                }
                fresh
            }
        }
    };

    Ok(Json(SlotsResponse {
        slots: available.slots,
        step_minutes: available.step_minutes,
        start_time: format_hhmm(&available.window.start),
        end_time: format_hhmm(&available.window.end),
    }))
}

// POST /api/bookings
#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub equipment_id: i64,
    pub date: String,
    pub start_time: String,
    pub duration_minutes: i32,
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    let user = authenticate(&state, &headers)?;
    let request = NewBooking {
        equipment_id: payload.equipment_id,
        date: parse_date(&payload.date)?,
        start_time: parse_time(&payload.start_time).map_err(|e| AppError::validation(e.to_string()))?,
        duration_minutes: payload.duration_minutes,
    };

    let booking = {
        let mut db = state.db()?;
        let booking = bookings::create_booking(&mut db, &state.rules(), &user, &request, now())?;
        events::booking_changed(&state, BookingEventKind::Created, &booking);
        booking
    };

    Ok(Json(BookingResponse::from(&booking)))
}

// POST /api/bookings/:id/extend
#[derive(Deserialize)]
pub struct ExtendRequest {
    pub extension_minutes: i32,
}

pub async fn extend_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<ExtendRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    let user = authenticate(&state, &headers)?;

    let booking = {
        let mut db = state.db()?;
        let booking = bookings::extend_booking(
            &mut db,
            &state.rules(),
            &user,
            &id,
            payload.extension_minutes,
            now(),
        )?;
        events::booking_changed(&state, BookingEventKind::Extended, &booking);
        booking
    };

    Ok(Json(BookingResponse::from(&booking)))
}

// POST /api/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    let user = authenticate(&state, &headers)?;

    let booking = {
        let mut db = state.db()?;
        let booking = bookings::cancel_booking(&mut db, &user, &id, now())?;
        events::booking_changed(&state, BookingEventKind::Cancelled, &booking);
        booking
    };

    Ok(Json(BookingResponse::from(&booking)))
}

// POST /api/bookings/:id/finish
pub async fn finish_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    let user = authenticate(&state, &headers)?;

    let booking = {
        let mut db = state.db()?;
        let booking = bookings::finish_booking(&mut db, &user, &id, now())?;
        events::booking_changed(&state, BookingEventKind::Finished, &booking);
        booking
    };

    Ok(Json(BookingResponse::from(&booking)))
}

// GET /api/bookings/my, /api/bookings/all
#[derive(Deserialize)]
pub struct ListQuery {
    pub selected_date: Option<String>,
}

#[derive(Serialize)]
pub struct BookingListItem {
    id: String,
    date: String,
    time_start: String,
    time_end: String,
    duration_minutes: i32,
    equipment: String,
    category: String,
    status: String,
    can_cancel: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_name: Option<String>,
}

fn list_item(details: BookingDetails, with_owner: bool) -> BookingListItem {
    let current = now();
    let b = &details.booking;
    BookingListItem {
        id: b.id.clone(),
        date: b.date.format("%Y-%m-%d").to_string(),
        time_start: format_hhmm(&b.start_time),
        time_end: format_hhmm(&b.end_time()),
        duration_minutes: b.duration_minutes,
        equipment: details.equipment_name.clone(),
        category: details.category_name.clone(),
        status: b.effective_status(current).as_str().to_string(),
        can_cancel: b.status.is_live() && b.date >= current.date(),
        user_id: with_owner.then_some(b.user_id),
        user_name: with_owner.then(|| details.user_name.clone()),
    }
}

pub async fn my_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<BookingListItem>>, AppError> {
    let user = authenticate(&state, &headers)?;
    let date = query.selected_date.as_deref().map(parse_date).transpose()?;

    let rows = {
        let db = state.db()?;
        queries::list_bookings(&db, Some(user.id), date.as_ref())?
    };

    Ok(Json(rows.into_iter().map(|d| list_item(d, false)).collect()))
}

pub async fn all_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<BookingListItem>>, AppError> {
    require_admin(&state, &headers)?;
    let date = query.selected_date.as_deref().map(parse_date).transpose()?;

    let rows = {
        let db = state.db()?;
        queries::list_bookings(&db, None, date.as_ref())?
    };

    Ok(Json(rows.into_iter().map(|d| list_item(d, true)).collect()))
}
