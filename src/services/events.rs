use crate::models::{Booking, BookingEvent, BookingEventKind};
use crate::state::AppState;

/// Drops cached slots for the booking's equipment/date and notifies
/// subscribers. Call while still holding the database lock.
pub fn booking_changed(state: &AppState, kind: BookingEventKind, booking: &Booking) {
    state.slot_cache.invalidate(booking.equipment_id, &booking.date);

    let event = BookingEvent {
        kind,
        booking_id: booking.id.clone(),
        equipment_id: booking.equipment_id,
        date: booking.date.format("%Y-%m-%d").to_string(),
    };
    // No subscribers is fine
    let _ = state.events_tx.send(event);
}
