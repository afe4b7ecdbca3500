use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub display_name: String,
    pub email: Option<String>,
    pub is_admin: bool,
    pub is_blocked: bool,
    pub created_at: NaiveDateTime,
}

impl User {
    /// Owners may act on their own bookings, administrators on any.
    pub fn can_manage(&self, owner_id: i64) -> bool {
        self.is_admin || self.id == owner_id
    }
}
