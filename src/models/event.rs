use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingEventKind {
    Created,
    Extended,
    Cancelled,
    Finished,
}

/// Broadcast after a booking mutation commits. Clients holding slots for
/// (`equipment_id`, `date`) should refetch them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BookingEvent {
    pub kind: BookingEventKind,
    pub booking_id: String,
    pub equipment_id: i64,
    pub date: String,
}
