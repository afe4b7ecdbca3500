use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::availability::minutes_of_day;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub equipment_id: i64,
    pub user_id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: i32,
    pub status: BookingStatus,
    pub finished_at: Option<NaiveTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    pub fn end_time(&self) -> NaiveTime {
        self.start_time + Duration::minutes(self.duration_minutes as i64)
    }

    pub fn start_minute(&self) -> i32 {
        minutes_of_day(&self.start_time)
    }

    pub fn end_minute(&self) -> i32 {
        self.start_minute() + self.duration_minutes
    }

    /// Planned and active bookings hold their interval; finished and
    /// cancelled ones release it.
    pub fn blocks_interval(&self) -> bool {
        self.status.is_live()
    }

    /// Status as shown to users at `now`. The stored status only changes on
    /// explicit mutations, so a planned booking whose time has come reads as
    /// active and one whose end has passed reads as finished.
    pub fn effective_status(&self, now: NaiveDateTime) -> BookingStatus {
        if self.status != BookingStatus::Planned && self.status != BookingStatus::Active {
            return self.status.clone();
        }
        let start = self.date.and_time(self.start_time);
        let end = start + Duration::minutes(self.duration_minutes as i64);
        if now >= end {
            BookingStatus::Finished
        } else if now >= start {
            BookingStatus::Active
        } else {
            self.status.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Planned,
    Active,
    Finished,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Planned => "planned",
            BookingStatus::Active => "active",
            BookingStatus::Finished => "finished",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "planned" => Ok(BookingStatus::Planned),
            "active" => Ok(BookingStatus::Active),
            "finished" => Ok(BookingStatus::Finished),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(anyhow::anyhow!("unknown booking status: {other}")),
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, BookingStatus::Planned | BookingStatus::Active)
    }
}

/// An existing booking that collides with a requested interval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conflict {
    pub booking_id: String,
    pub user: String,
    pub time_start: String,
    pub time_end: String,
}

/// Booking row joined with equipment, category and owner names for listings.
#[derive(Debug, Clone)]
pub struct BookingDetails {
    pub booking: Booking,
    pub equipment_name: String,
    pub category_name: String,
    pub user_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(start: &str, duration: i32, status: BookingStatus) -> Booking {
        let now = NaiveDateTime::parse_from_str("2025-06-01 08:00", "%Y-%m-%d %H:%M").unwrap();
        Booking {
            id: "b-1".to_string(),
            equipment_id: 1,
            user_id: 1,
            date: NaiveDate::from_ymd_opt(2025, 6, 16).unwrap(),
            start_time: NaiveTime::parse_from_str(start, "%H:%M").unwrap(),
            duration_minutes: duration,
            status,
            finished_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    #[test]
    fn test_end_time() {
        let b = booking("10:00", 90, BookingStatus::Planned);
        assert_eq!(b.end_time(), NaiveTime::from_hms_opt(11, 30, 0).unwrap());
        assert_eq!(b.start_minute(), 600);
        assert_eq!(b.end_minute(), 690);
    }

    #[test]
    fn test_status_roundtrip_strings() {
        for status in [
            BookingStatus::Planned,
            BookingStatus::Active,
            BookingStatus::Finished,
            BookingStatus::Cancelled,
        ] {
            assert_eq!(BookingStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(BookingStatus::parse("pending").is_err());
        assert!(BookingStatus::parse("").is_err());
    }

    #[test]
    fn test_effective_status_follows_clock() {
        let b = booking("10:00", 60, BookingStatus::Planned);
        assert_eq!(b.effective_status(at("2025-06-16 09:59")), BookingStatus::Planned);
        assert_eq!(b.effective_status(at("2025-06-16 10:00")), BookingStatus::Active);
        assert_eq!(b.effective_status(at("2025-06-16 11:00")), BookingStatus::Finished);
    }

    #[test]
    fn test_effective_status_keeps_terminal_states() {
        let b = booking("10:00", 60, BookingStatus::Cancelled);
        assert_eq!(b.effective_status(at("2025-06-16 10:30")), BookingStatus::Cancelled);
        assert!(!b.blocks_interval());
    }
}
