pub mod auth;
pub mod bookings;
pub mod cache;
pub mod calendar;
pub mod events;
pub mod slots;
