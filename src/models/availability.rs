use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Daily time range during which a piece of equipment may be booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl OperatingWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> anyhow::Result<Self> {
        if end <= start {
            return Err(anyhow::anyhow!(
                "window end {} must be after start {}",
                format_hhmm(&end),
                format_hhmm(&start)
            ));
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> anyhow::Result<Self> {
        Self::new(parse_time(start)?, parse_time(end)?)
    }

    pub fn start_minute(&self) -> i32 {
        minutes_of_day(&self.start)
    }

    pub fn end_minute(&self) -> i32 {
        minutes_of_day(&self.end)
    }

    /// True when [start, start + duration) lies inside the window.
    pub fn contains(&self, start: &NaiveTime, duration_minutes: i32) -> bool {
        let s = minutes_of_day(start);
        s >= self.start_minute() && s + duration_minutes <= self.end_minute()
    }

    pub fn to_human_readable(&self) -> String {
        format!("{}-{}", format_hhmm(&self.start), format_hhmm(&self.end))
    }
}

pub fn minutes_of_day(t: &NaiveTime) -> i32 {
    (t.hour() * 60 + t.minute()) as i32
}

pub fn format_hhmm(t: &NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

/// Formats a minute offset that may equal 24:00 at the very end of a day.
pub fn format_minutes(minutes: i32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

pub fn parse_time(s: &str) -> anyhow::Result<NaiveTime> {
    let parts: Vec<&str> = s.trim().split(':').collect();
    if parts.len() != 2 {
        return Err(anyhow::anyhow!("invalid time format: {s}"));
    }
    let hour: u32 = parts[0]
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid hour in: {s}"))?;
    let minute: u32 = parts[1]
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid minute in: {s}"))?;
    if hour > 23 || minute > 59 {
        return Err(anyhow::anyhow!("time out of range: {s}"));
    }
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| anyhow::anyhow!("invalid time: {s}"))
}
