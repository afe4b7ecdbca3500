use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::Booking;

#[derive(Debug, Serialize)]
pub struct MonthOverview {
    pub year: i32,
    pub month: u32,
    pub bookings: BTreeMap<String, i64>,
}

/// First and last day of a calendar month.
pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate), AppError> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| AppError::validation("month must be between 1 and 12"))?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| AppError::validation("year out of range"))?;
    let last = next
        .pred_opt()
        .ok_or_else(|| AppError::validation("year out of range"))?;
    Ok((first, last))
}

/// Non-cancelled booking counts per day; `user_id` narrows to one owner.
pub fn month_overview(
    conn: &Connection,
    year: i32,
    month: u32,
    user_id: Option<i64>,
) -> Result<MonthOverview, AppError> {
    let (from, to) = month_bounds(year, month)?;
    let bookings = queries::count_bookings_per_day(conn, &from, &to, user_id)?
        .into_iter()
        .map(|(day, count)| (day.format("%Y-%m-%d").to_string(), count))
        .collect();
    Ok(MonthOverview {
        year: from.year(),
        month: from.month(),
        bookings,
    })
}

pub fn generate_ics(booking: &Booking, equipment_name: &str) -> String {
    let dtstart = booking
        .date
        .and_time(booking.start_time)
        .format("%Y%m%dT%H%M%S")
        .to_string();
    let dtend = booking
        .date
        .and_time(booking.end_time())
        .format("%Y%m%dT%H%M%S")
        .to_string();
    let dtstamp = booking.created_at.format("%Y%m%dT%H%M%S").to_string();
    let uid = format!("{}@labbook", booking.id);
    let summary = format!("Booking: {equipment_name}");
    let status = match booking.status {
        crate::models::BookingStatus::Cancelled => "CANCELLED",
        _ => "CONFIRMED",
    };

    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Labbook//Equipment Booking//EN\r\n\
         BEGIN:VEVENT\r\n\
         UID:{uid}\r\n\
         DTSTAMP:{dtstamp}\r\n\
         DTSTART:{dtstart}\r\n\
         DTEND:{dtend}\r\n\
         SUMMARY:{summary}\r\n\
         STATUS:{status}\r\n\
         END:VEVENT\r\n\
         END:VCALENDAR\r\n"
    )
}
