pub mod availability;
pub mod booking;
pub mod equipment;
pub mod event;
pub mod slot;
pub mod user;

pub use availability::OperatingWindow;
pub use booking::{Booking, BookingDetails, BookingStatus, Conflict};
pub use equipment::{Category, Equipment};
pub use event::{BookingEvent, BookingEventKind};
pub use slot::Slot;
pub use user::User;
