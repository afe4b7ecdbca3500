use serde::{Deserialize, Serialize};

/// A bookable start time and the longest duration startable there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub time: String,
    pub max_duration_minutes: i32,
}
