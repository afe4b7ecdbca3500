use std::env;

use chrono::NaiveTime;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub token_secret: String,
    pub step_minutes: i32,
    pub max_booking_minutes: i32,
    pub default_window_start: NaiveTime,
    pub default_window_end: NaiveTime,
    pub cors_origin: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "labbook.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            token_secret: env::var("TOKEN_SECRET")
                .unwrap_or_else(|_| "labbook-token-secret".to_string()),
            step_minutes: env::var("BOOKING_STEP_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &i32| *v > 0)
                .unwrap_or(30),
            max_booking_minutes: env::var("MAX_BOOKING_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &i32| *v > 0)
                .unwrap_or(12 * 60),
            default_window_start: time_var("DEFAULT_WINDOW_START", 7),
            default_window_end: time_var("DEFAULT_WINDOW_END", 20),
            cors_origin: env::var("CORS_ORIGIN").ok().filter(|v| !v.is_empty()),
        }
    }
}

fn time_var(key: &str, default_hour: u32) -> NaiveTime {
    env::var(key)
        .ok()
        .and_then(|v| NaiveTime::parse_from_str(&v, "%H:%M").ok())
        .or_else(|| NaiveTime::from_hms_opt(default_hour, 0, 0))
        .unwrap_or(NaiveTime::MIN)
}
