use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = match state
        .config
        .cors_origin
        .as_deref()
        .and_then(|o| o.parse::<HeaderValue>().ok())
    {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::new(),
    };

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/bookings", post(handlers::bookings::create_booking))
        .route(
            "/api/bookings/categories",
            get(handlers::catalog::list_categories),
        )
        .route(
            "/api/bookings/equipment",
            get(handlers::catalog::list_equipment),
        )
        .route("/api/bookings/slots", get(handlers::bookings::get_slots))
        .route("/api/bookings/my", get(handlers::bookings::my_bookings))
        .route("/api/bookings/all", get(handlers::bookings::all_bookings))
        .route(
            "/api/bookings/calendar",
            get(handlers::calendar::month_overview),
        )
        .route(
            "/api/bookings/events",
            get(handlers::events::events_stream),
        )
        .route(
            "/api/bookings/:id/extend",
            post(handlers::bookings::extend_booking),
        )
        .route(
            "/api/bookings/:id/cancel",
            post(handlers::bookings::cancel_booking),
        )
        .route(
            "/api/bookings/:id/finish",
            post(handlers::bookings::finish_booking),
        )
        .route("/api/bookings/:id/ics", get(handlers::calendar::download_ics))
        .route(
            "/api/equipment/categories",
            get(handlers::catalog::list_categories).post(handlers::catalog::create_category),
        )
        .route(
            "/api/equipment",
            get(handlers::catalog::list_equipment).post(handlers::catalog::create_equipment),
        )
        .route(
            "/api/equipment/:id/retire",
            post(handlers::catalog::retire_equipment),
        )
        .route("/api/users/me", get(handlers::users::me))
        .route(
            "/api/users",
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        .route("/api/users/:id/block", post(handlers::users::block_user))
        .route("/api/users/:id/unblock", post(handlers::users::unblock_user))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
