use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    Booking, BookingDetails, BookingStatus, Category, Equipment, OperatingWindow, User,
};

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M";
const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

fn fmt_date(d: &NaiveDate) -> String {
    d.format(DATE_FMT).to_string()
}

fn fmt_time(t: &NaiveTime) -> String {
    t.format(TIME_FMT).to_string()
}

fn fmt_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FMT).to_string()
}

fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FMT).with_context(|| format!("bad stored date: {s}"))
}

fn parse_time(s: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(s, TIME_FMT).with_context(|| format!("bad stored time: {s}"))
}

fn parse_datetime(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FMT)
        .with_context(|| format!("bad stored timestamp: {s}"))
}

// ── Categories ──

pub fn list_categories(conn: &Connection) -> anyhow::Result<Vec<Category>> {
    let mut stmt = conn.prepare("SELECT id, name FROM categories ORDER BY name ASC")?;
    let rows = stmt.query_map([], |row| {
        Ok(Category {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    })?;

    let mut categories = vec![];
    for row in rows {
        categories.push(row?);
    }
    Ok(categories)
}

pub fn create_category(conn: &Connection, name: &str) -> anyhow::Result<Category> {
    conn.execute("INSERT INTO categories (name) VALUES (?1)", params![name])?;
    Ok(Category {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
    })
}

pub fn category_exists(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM categories WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

// ── Equipment ──

const EQUIPMENT_COLUMNS: &str = "id, name, category_id, window_start, window_end, retired";

fn parse_equipment_row(row: &rusqlite::Row) -> anyhow::Result<Equipment> {
    let window_start: String = row.get(3)?;
    let window_end: String = row.get(4)?;
    Ok(Equipment {
        id: row.get(0)?,
        name: row.get(1)?,
        category_id: row.get(2)?,
        window: OperatingWindow::new(parse_time(&window_start)?, parse_time(&window_end)?)?,
        retired: row.get(5)?,
    })
}

pub fn list_equipment(conn: &Connection, category_id: Option<i64>) -> anyhow::Result<Vec<Equipment>> {
    let sql = format!(
        "SELECT {EQUIPMENT_COLUMNS} FROM equipment \
         WHERE retired = 0 AND (?1 IS NULL OR category_id = ?1) ORDER BY name ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![category_id], |row| Ok(parse_equipment_row(row)))?;

    let mut equipment = vec![];
    for row in rows {
        equipment.push(row??);
    }
    Ok(equipment)
}

pub fn get_equipment(conn: &Connection, id: i64) -> anyhow::Result<Option<Equipment>> {
    let sql = format!("SELECT {EQUIPMENT_COLUMNS} FROM equipment WHERE id = ?1");
    let result = conn
        .query_row(&sql, params![id], |row| Ok(parse_equipment_row(row)))
        .optional()?;
    result.transpose()
}

pub fn create_equipment(
    conn: &Connection,
    name: &str,
    category_id: i64,
    window: &OperatingWindow,
) -> anyhow::Result<Equipment> {
    conn.execute(
        "INSERT INTO equipment (name, category_id, window_start, window_end) VALUES (?1, ?2, ?3, ?4)",
        params![name, category_id, fmt_time(&window.start), fmt_time(&window.end)],
    )?;
    Ok(Equipment {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        category_id,
        window: *window,
        retired: false,
    })
}

pub fn retire_equipment(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute("UPDATE equipment SET retired = 1 WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

// ── Users ──

const USER_COLUMNS: &str = "id, display_name, email, is_admin, is_blocked, created_at";

fn parse_user_row(row: &rusqlite::Row) -> anyhow::Result<User> {
    let created_at: String = row.get(5)?;
    Ok(User {
        id: row.get(0)?,
        display_name: row.get(1)?,
        email: row.get(2)?,
        is_admin: row.get(3)?,
        is_blocked: row.get(4)?,
        created_at: parse_datetime(&created_at)?,
    })
}

pub fn create_user(
    conn: &Connection,
    display_name: &str,
    email: Option<&str>,
    token_digest: &str,
    is_admin: bool,
    now: &NaiveDateTime,
) -> anyhow::Result<User> {
    conn.execute(
        "INSERT INTO users (display_name, email, token_digest, is_admin, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![display_name, email, token_digest, is_admin, fmt_datetime(now)],
    )?;
    Ok(User {
        id: conn.last_insert_rowid(),
        display_name: display_name.to_string(),
        email: email.map(str::to_string),
        is_admin,
        is_blocked: false,
        created_at: *now,
    })
}

pub fn get_user(conn: &Connection, id: i64) -> anyhow::Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    conn.query_row(&sql, params![id], |row| Ok(parse_user_row(row)))
        .optional()?
        .transpose()
}

pub fn get_user_by_token_digest(conn: &Connection, digest: &str) -> anyhow::Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE token_digest = ?1");
    conn.query_row(&sql, params![digest], |row| Ok(parse_user_row(row)))
        .optional()?
        .transpose()
}

pub fn list_users(conn: &Connection) -> anyhow::Result<Vec<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY display_name ASC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| Ok(parse_user_row(row)))?;

    let mut users = vec![];
    for row in rows {
        users.push(row??);
    }
    Ok(users)
}

pub fn set_user_blocked(conn: &Connection, id: i64, blocked: bool) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE users SET is_blocked = ?1 WHERE id = ?2",
        params![blocked, id],
    )?;
    Ok(count > 0)
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "b.id, b.equipment_id, b.user_id, b.date, b.start_time, \
     b.duration_minutes, b.status, b.finished_at, b.created_at, b.updated_at";

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let date: String = row.get(3)?;
    let start_time: String = row.get(4)?;
    let status: String = row.get(6)?;
    let finished_at: Option<String> = row.get(7)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;

    Ok(Booking {
        id: row.get(0)?,
        equipment_id: row.get(1)?,
        user_id: row.get(2)?,
        date: parse_date(&date)?,
        start_time: parse_time(&start_time)?,
        duration_minutes: row.get(5)?,
        status: BookingStatus::parse(&status)?,
        finished_at: finished_at.as_deref().map(parse_time).transpose()?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

pub fn create_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO bookings (id, equipment_id, user_id, date, start_time, duration_minutes, status, finished_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            booking.id,
            booking.equipment_id,
            booking.user_id,
            fmt_date(&booking.date),
            fmt_time(&booking.start_time),
            booking.duration_minutes,
            booking.status.as_str(),
            booking.finished_at.as_ref().map(fmt_time),
            fmt_datetime(&booking.created_at),
            fmt_datetime(&booking.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings b WHERE b.id = ?1");
    conn.query_row(&sql, params![id], |row| Ok(parse_booking_row(row)))
        .optional()?
        .transpose()
}

/// Planned and active bookings for one equipment/date, with the owner's
/// display name, ordered by start time.
pub fn get_live_bookings_for_day(
    conn: &Connection,
    equipment_id: i64,
    date: &NaiveDate,
) -> anyhow::Result<Vec<(Booking, String)>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS}, u.display_name FROM bookings b \
         JOIN users u ON u.id = b.user_id \
         WHERE b.equipment_id = ?1 AND b.date = ?2 AND b.status IN ('planned', 'active') \
         ORDER BY b.start_time ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![equipment_id, fmt_date(date)], |row| {
        let owner: String = row.get(10)?;
        Ok(parse_booking_row(row).map(|b| (b, owner)))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn update_booking_duration(
    conn: &Connection,
    id: &str,
    duration_minutes: i32,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET duration_minutes = ?1, updated_at = ?2 \
         WHERE id = ?3 AND status IN ('planned', 'active')",
        params![duration_minutes, fmt_datetime(now), id],
    )?;
    Ok(count > 0)
}

pub fn update_booking_status(
    conn: &Connection,
    id: &str,
    status: &BookingStatus,
    finished_at: Option<&NaiveTime>,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, finished_at = ?2, updated_at = ?3 WHERE id = ?4",
        params![status.as_str(), finished_at.map(fmt_time), fmt_datetime(now), id],
    )?;
    Ok(count > 0)
}

/// Bookings joined with equipment, category and owner names. Filters are
/// optional; ordered newest date first, then by start time.
pub fn list_bookings(
    conn: &Connection,
    user_id: Option<i64>,
    date: Option<&NaiveDate>,
) -> anyhow::Result<Vec<BookingDetails>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS}, e.name, c.name, u.display_name FROM bookings b \
         JOIN equipment e ON e.id = b.equipment_id \
         JOIN categories c ON c.id = e.category_id \
         JOIN users u ON u.id = b.user_id \
         WHERE (?1 IS NULL OR b.user_id = ?1) AND (?2 IS NULL OR b.date = ?2) \
         ORDER BY b.date DESC, b.start_time ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id, date.map(fmt_date)], |row| {
        let equipment_name: String = row.get(10)?;
        let category_name: String = row.get(11)?;
        let user_name: String = row.get(12)?;
        Ok(parse_booking_row(row).map(|booking| BookingDetails {
            booking,
            equipment_name,
            category_name,
            user_name,
        }))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Count of non-cancelled bookings per day in [from, to].
pub fn count_bookings_per_day(
    conn: &Connection,
    from: &NaiveDate,
    to: &NaiveDate,
    user_id: Option<i64>,
) -> anyhow::Result<Vec<(NaiveDate, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT date, COUNT(*) FROM bookings \
         WHERE date >= ?1 AND date <= ?2 AND status != 'cancelled' \
         AND (?3 IS NULL OR user_id = ?3) \
         GROUP BY date ORDER BY date",
    )?;
    let rows = stmt.query_map(params![fmt_date(from), fmt_date(to), user_id], |row| {
        let date: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        Ok(parse_date(&date).map(|d| (d, count)))
    })?;

    let mut counts = vec![];
    for row in rows {
        counts.push(row??);
    }
    Ok(counts)
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::db;

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    #[test]
    fn test_equipment_roundtrip_and_retire() {
        let conn = setup_db();
        let eq = seed_equipment(&conn, "08:00", "18:00");

        let loaded = get_equipment(&conn, eq.id).unwrap().unwrap();
        assert_eq!(loaded.window, eq.window);
        assert!(!loaded.retired);
        assert_eq!(list_equipment(&conn, Some(eq.category_id)).unwrap().len(), 1);

        assert!(retire_equipment(&conn, eq.id).unwrap());
        assert!(get_equipment(&conn, eq.id).unwrap().unwrap().retired);
        assert!(list_equipment(&conn, None).unwrap().is_empty());
        assert!(get_equipment(&conn, 999).unwrap().is_none());
    }

    #[test]
    fn test_user_lookup_by_digest() {
        let conn = setup_db();
        let user = seed_user(&conn, "alice", false);

        let found = get_user_by_token_digest(&conn, "digest-alice").unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(get_user_by_token_digest(&conn, "nope").unwrap().is_none());

        assert!(set_user_blocked(&conn, user.id, true).unwrap());
        assert!(get_user(&conn, user.id).unwrap().unwrap().is_blocked);
    }

    #[test]
    fn test_live_bookings_exclude_cancelled() {
        let conn = setup_db();
        let eq = seed_equipment(&conn, "08:00", "18:00");
        let alice = seed_user(&conn, "alice", false);
        let late = seed_booking(&conn, &eq, &alice, "2025-06-16", "14:00", 60);
        let early = seed_booking(&conn, &eq, &alice, "2025-06-16", "09:00", 30);
        let gone = seed_booking(&conn, &eq, &alice, "2025-06-16", "11:00", 30);
        update_booking_status(&conn, &gone.id, &BookingStatus::Cancelled, None, &now()).unwrap();

        let day = NaiveDate::from_ymd_opt(2025, 6, 16).unwrap();
        let live = get_live_bookings_for_day(&conn, eq.id, &day).unwrap();
        let ids: Vec<_> = live.iter().map(|(b, _)| b.id.clone()).collect();
        assert_eq!(ids, vec![early.id, late.id]);
        assert_eq!(live[0].1, "alice");
    }

    #[test]
    fn test_unknown_status_is_an_error() {
        let conn = setup_db();
        let eq = seed_equipment(&conn, "08:00", "18:00");
        let alice = seed_user(&conn, "alice", false);
        let booking = seed_booking(&conn, &eq, &alice, "2025-06-16", "09:00", 30);
        conn.execute(
            "UPDATE bookings SET status = 'pending' WHERE id = ?1",
            params![booking.id],
        )
        .unwrap();

        assert!(get_booking_by_id(&conn, &booking.id).is_err());
        assert!(list_bookings(&conn, Some(alice.id), None).is_err());
    }

    #[test]
    fn test_list_bookings_and_counts() {
        let conn = setup_db();
        let eq = seed_equipment(&conn, "08:00", "18:00");
        let alice = seed_user(&conn, "alice", false);
        let bob = seed_user(&conn, "bob", false);
        seed_booking(&conn, &eq, &alice, "2025-06-16", "09:00", 30);
        seed_booking(&conn, &eq, &bob, "2025-06-16", "10:00", 30);
        seed_booking(&conn, &eq, &alice, "2025-06-17", "09:00", 30);

        let mine = list_bookings(&conn, Some(alice.id), None).unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].booking.date, NaiveDate::from_ymd_opt(2025, 6, 17).unwrap());
        assert_eq!(mine[0].equipment_name, "Spectrometer");

        let day = NaiveDate::from_ymd_opt(2025, 6, 16).unwrap();
        assert_eq!(list_bookings(&conn, None, Some(&day)).unwrap().len(), 2);

        let from = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let counts = count_bookings_per_day(&conn, &from, &to, None).unwrap();
        assert_eq!(counts, vec![(day, 2), (NaiveDate::from_ymd_opt(2025, 6, 17).unwrap(), 1)]);
        let bobs = count_bookings_per_day(&conn, &from, &to, Some(bob.id)).unwrap();
        assert_eq!(bobs, vec![(day, 1)]);
    }
}
