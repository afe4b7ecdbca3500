use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use labbook::config::AppConfig;
use labbook::db;
use labbook::routes;
use labbook::services::auth;
use labbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    anyhow::ensure!(
        config.default_window_start < config.default_window_end,
        "DEFAULT_WINDOW_START must be before DEFAULT_WINDOW_END"
    );
    if config.admin_token == "changeme" {
        tracing::warn!("ADMIN_TOKEN is not set, using the insecure default");
    }

    let conn = db::init_db(&config.database_url)?;
    auth::ensure_admin(&conn, &config.token_secret, &config.admin_token)?;

    let state = Arc::new(AppState::new(conn, config.clone()));
    let app = routes::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(
        step_minutes = config.step_minutes,
        max_booking_minutes = config.max_booking_minutes,
        "starting server on {addr}"
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
