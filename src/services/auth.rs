use base64::Engine;
use hmac::{Hmac, Mac};
use rusqlite::Connection;
use sha1::Sha1;

use crate::db::queries;
use crate::models::User;

type HmacSha1 = Hmac<Sha1>;

/// Keyed digest stored in place of the raw API token.
pub fn token_digest(secret: &str, token: &str) -> anyhow::Result<String> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid token secret: {e}"))?;
    mac.update(token.as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

pub fn generate_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn find_user_by_token(
    conn: &Connection,
    secret: &str,
    token: &str,
) -> anyhow::Result<Option<User>> {
    if token.is_empty() {
        return Ok(None);
    }
    queries::get_user_by_token_digest(conn, &token_digest(secret, token)?)
}

/// Makes sure the configured admin token maps to an administrator account.
pub fn ensure_admin(conn: &Connection, secret: &str, admin_token: &str) -> anyhow::Result<User> {
    if let Some(user) = find_user_by_token(conn, secret, admin_token)? {
        return Ok(user);
    }
    let now = chrono::Utc::now().naive_utc();
    let user = queries::create_user(
        conn,
        "Administrator",
        None,
        &token_digest(secret, admin_token)?,
        true,
        &now,
    )?;
    tracing::info!(user_id = user.id, "bootstrapped administrator account");
    Ok(user)
}
