use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rusqlite::{Connection, TransactionBehavior};

use crate::config::AppConfig;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::availability::minutes_of_day;
use crate::models::{Booking, BookingStatus, Equipment, OperatingWindow, Slot, User};
use crate::services::slots::{self, Interval};

/// Step and upper bound applied to every booking duration.
#[derive(Debug, Clone, Copy)]
pub struct BookingRules {
    pub step_minutes: i32,
    pub max_booking_minutes: i32,
}

impl From<&AppConfig> for BookingRules {
    fn from(config: &AppConfig) -> Self {
        Self {
            step_minutes: config.step_minutes,
            max_booking_minutes: config.max_booking_minutes,
        }
    }
}

impl BookingRules {
    /// A slot step must be a whole number of booking steps no longer than
    /// the maximum duration, so every offered duration is bookable.
    pub fn check_step(&self, step: i32) -> Result<(), AppError> {
        if step <= 0 {
            return Err(AppError::validation("step_minutes must be positive"));
        }
        if step % self.step_minutes != 0 {
            return Err(AppError::validation(format!(
                "step_minutes must be a multiple of {}",
                self.step_minutes
            )));
        }
        if step > self.max_booking_minutes {
            return Err(AppError::validation(format!(
                "step_minutes exceeds the maximum of {} minutes",
                self.max_booking_minutes
            )));
        }
        Ok(())
    }

    fn check_duration(&self, minutes: i32, what: &str) -> Result<(), AppError> {
        if minutes <= 0 {
            return Err(AppError::validation(format!("{what} must be positive")));
        }
        if minutes % self.step_minutes != 0 {
            return Err(AppError::validation(format!(
                "{what} must be a multiple of {} minutes",
                self.step_minutes
            )));
        }
        if minutes > self.max_booking_minutes {
            return Err(AppError::validation(format!(
                "{what} exceeds the maximum of {} minutes",
                self.max_booking_minutes
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub equipment_id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: i32,
}

#[derive(Debug, Clone)]
pub struct AvailableSlots {
    pub slots: Vec<Slot>,
    pub step_minutes: i32,
    pub window: OperatingWindow,
}

fn bookable_equipment(conn: &Connection, equipment_id: i64) -> Result<Equipment, AppError> {
    let equipment = queries::get_equipment(conn, equipment_id)?
        .ok_or_else(|| AppError::NotFound(format!("equipment {equipment_id}")))?;
    if equipment.retired {
        return Err(AppError::validation(format!(
            "equipment {equipment_id} is retired"
        )));
    }
    Ok(equipment)
}

fn load_booking(conn: &Connection, actor: &User, booking_id: &str) -> Result<Booking, AppError> {
    let booking = queries::get_booking_by_id(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;
    if !actor.can_manage(booking.user_id) {
        return Err(AppError::Forbidden("not the owner of this booking".to_string()));
    }
    Ok(booking)
}

fn reload(conn: &Connection, booking_id: &str) -> Result<Booking, AppError> {
    queries::get_booking_by_id(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))
}

pub fn available_slots(
    conn: &mut Connection,
    rules: &BookingRules,
    equipment_id: i64,
    date: &NaiveDate,
    step_minutes: Option<i32>,
) -> Result<AvailableSlots, AppError> {
    let step = step_minutes.unwrap_or(rules.step_minutes);
    rules.check_step(step)?;

    // Deferred transaction: one consistent snapshot for equipment and bookings.
    let tx = conn.transaction()?;
    let equipment = bookable_equipment(&tx, equipment_id)?;
    let busy: Vec<Interval> = queries::get_live_bookings_for_day(&tx, equipment_id, date)?
        .iter()
        .map(|(b, _)| Interval::of(b))
        .collect();
    tx.commit()?;

    Ok(AvailableSlots {
        slots: slots::compute_slots(&equipment.window, step, rules.max_booking_minutes, &busy),
        step_minutes: step,
        window: equipment.window,
    })
}

pub fn create_booking(
    conn: &mut Connection,
    rules: &BookingRules,
    owner: &User,
    request: &NewBooking,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    rules.check_duration(request.duration_minutes, "duration")?;
    if owner.is_blocked {
        return Err(AppError::Forbidden("user is blocked from booking".to_string()));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let equipment = bookable_equipment(&tx, request.equipment_id)?;

    if !equipment
        .window
        .contains(&request.start_time, request.duration_minutes)
    {
        return Err(AppError::validation(format!(
            "interval is outside the operating window {}",
            equipment.window.to_human_readable()
        )));
    }

    let start = minutes_of_day(&request.start_time);
    let proposed = Interval::new(start, start + request.duration_minutes);
    let existing = queries::get_live_bookings_for_day(&tx, equipment.id, &request.date)?;
    let conflicts = slots::find_conflicts(&proposed, &existing, None);
    if !conflicts.is_empty() {
        tracing::info!(
            equipment_id = equipment.id,
            date = %request.date,
            conflicts = conflicts.len(),
            "booking rejected: interval taken"
        );
        return Err(AppError::Conflict(conflicts));
    }

    let booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        equipment_id: equipment.id,
        user_id: owner.id,
        date: request.date,
        start_time: request.start_time,
        duration_minutes: request.duration_minutes,
        status: BookingStatus::Planned,
        finished_at: None,
        created_at: now,
        updated_at: now,
    };
    queries::create_booking(&tx, &booking)?;
    tx.commit()?;

    tracing::info!(
        booking_id = %booking.id,
        equipment_id = booking.equipment_id,
        user_id = booking.user_id,
        "booking created"
    );
    Ok(booking)
}

pub fn extend_booking(
    conn: &mut Connection,
    rules: &BookingRules,
    actor: &User,
    booking_id: &str,
    extension_minutes: i32,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    rules.check_duration(extension_minutes, "extension")?;
    if actor.is_blocked {
        return Err(AppError::Forbidden("user is blocked from booking".to_string()));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let booking = load_booking(&tx, actor, booking_id)?;
    if !booking.status.is_live() {
        return Err(AppError::InvalidState(format!(
            "booking is {} and cannot be extended",
            booking.status.as_str()
        )));
    }

    let new_duration = booking
        .duration_minutes
        .checked_add(extension_minutes)
        .ok_or_else(|| AppError::validation("total duration is out of range"))?;
    rules.check_duration(new_duration, "total duration")?;

    let equipment = queries::get_equipment(&tx, booking.equipment_id)?
        .ok_or_else(|| AppError::NotFound(format!("equipment {}", booking.equipment_id)))?;
    if !equipment.window.contains(&booking.start_time, new_duration) {
        return Err(AppError::validation(format!(
            "extension runs past the operating window {}",
            equipment.window.to_human_readable()
        )));
    }

    let start = booking.start_minute();
    let proposed = Interval::new(start, start + new_duration);
    let existing = queries::get_live_bookings_for_day(&tx, booking.equipment_id, &booking.date)?;
    let conflicts = slots::find_conflicts(&proposed, &existing, Some(&booking.id));
    if !conflicts.is_empty() {
        tracing::info!(booking_id = %booking.id, "extension rejected: interval taken");
        return Err(AppError::Conflict(conflicts));
    }

    queries::update_booking_duration(&tx, &booking.id, new_duration, &now)?;
    let updated = reload(&tx, &booking.id)?;
    tx.commit()?;

    tracing::info!(booking_id = %updated.id, extension_minutes, "booking extended");
    Ok(updated)
}

pub fn cancel_booking(
    conn: &mut Connection,
    actor: &User,
    booking_id: &str,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let booking = load_booking(&tx, actor, booking_id)?;
    match booking.status {
        BookingStatus::Cancelled => {
            return Err(AppError::InvalidState("booking is already cancelled".to_string()))
        }
        BookingStatus::Finished => {
            return Err(AppError::InvalidState("booking is already finished".to_string()))
        }
        BookingStatus::Planned | BookingStatus::Active => {}
    }

    queries::update_booking_status(&tx, &booking.id, &BookingStatus::Cancelled, None, &now)?;
    let updated = reload(&tx, &booking.id)?;
    tx.commit()?;

    tracing::info!(booking_id = %updated.id, actor = actor.id, "booking cancelled");
    Ok(updated)
}

/// Ends a booking at `at`, releasing whatever remains of its interval.
pub fn finish_booking(
    conn: &mut Connection,
    actor: &User,
    booking_id: &str,
    at: NaiveDateTime,
) -> Result<Booking, AppError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let booking = load_booking(&tx, actor, booking_id)?;
    if !booking.status.is_live() {
        return Err(AppError::InvalidState(format!(
            "booking is {} and cannot be finished",
            booking.status.as_str()
        )));
    }

    let start = booking.date.and_time(booking.start_time);
    if at < start {
        return Err(AppError::InvalidState(
            "booking has not started yet; cancel it instead".to_string(),
        ));
    }
    let finished_at = if at.date() > booking.date || at.time() >= booking.end_time() {
        booking.end_time()
    } else {
        NaiveTime::from_hms_opt(at.hour(), at.minute(), 0).unwrap_or(at.time())
    };

    queries::update_booking_status(
        &tx,
        &booking.id,
        &BookingStatus::Finished,
        Some(&finished_at),
        &at,
    )?;
    let updated = reload(&tx, &booking.id)?;
    tx.commit()?;

    tracing::info!(booking_id = %updated.id, "booking finished");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::db::queries::fixtures::*;

    const RULES: BookingRules = BookingRules {
        step_minutes: 30,
        max_booking_minutes: 720,
    };

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn request(equipment: &Equipment, start: &str, duration: i32) -> NewBooking {
        NewBooking {
            equipment_id: equipment.id,
            date: d("2025-06-16"),
            start_time: t(start),
            duration_minutes: duration,
        }
    }

    #[test]
    fn test_slots_around_existing_booking() {
        let mut conn = setup_db();
        let eq = seed_equipment(&conn, "08:00", "18:00");
        let alice = seed_user(&conn, "alice", false);
        seed_booking(&conn, &eq, &alice, "2025-06-16", "10:00", 60);

        let result = available_slots(&mut conn, &RULES, eq.id, &d("2025-06-16"), None).unwrap();
        let find = |time: &str| result.slots.iter().find(|s| s.time == time).cloned();
        assert_eq!(find("09:30").unwrap().max_duration_minutes, 30);
        assert_eq!(find("11:00").unwrap().max_duration_minutes, 420);
        assert!(find("10:00").is_none());
        assert!(find("10:30").is_none());
        assert_eq!(result.step_minutes, 30);
    }

    #[test]
    fn test_slots_unknown_and_retired_equipment() {
        let mut conn = setup_db();
        let err = available_slots(&mut conn, &RULES, 42, &d("2025-06-16"), None).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let eq = seed_equipment(&conn, "08:00", "18:00");
        queries::retire_equipment(&conn, eq.id).unwrap();
        let err = available_slots(&mut conn, &RULES, eq.id, &d("2025-06-16"), None).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_slots_reject_non_positive_step() {
        let mut conn = setup_db();
        let eq = seed_equipment(&conn, "08:00", "18:00");
        let err = available_slots(&mut conn, &RULES, eq.id, &d("2025-06-16"), Some(0)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_slots_step_must_be_bookable() {
        let mut conn = setup_db();
        let eq = seed_equipment(&conn, "08:00", "18:00");
        let day = d("2025-06-16");

        for step in [45, 20, i32::MAX, 750] {
            let err = available_slots(&mut conn, &RULES, eq.id, &day, Some(step)).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "step {step}: {err:?}");
        }

        let hourly = available_slots(&mut conn, &RULES, eq.id, &day, Some(60)).unwrap();
        assert_eq!(hourly.slots.len(), 10);
        assert!(hourly
            .slots
            .iter()
            .all(|s| s.max_duration_minutes % RULES.step_minutes == 0));
    }

    #[test]
    fn test_create_abutting_booking_succeeds() {
        let mut conn = setup_db();
        let eq = seed_equipment(&conn, "08:00", "18:00");
        let alice = seed_user(&conn, "alice", false);
        let bob = seed_user(&conn, "bob", false);
        seed_booking(&conn, &eq, &alice, "2025-06-16", "10:00", 60);

        let after = create_booking(&mut conn, &RULES, &bob, &request(&eq, "11:00", 60), at("2025-06-01 09:00"));
        assert!(after.is_ok());
        let before = create_booking(&mut conn, &RULES, &bob, &request(&eq, "09:00", 60), at("2025-06-01 09:00"));
        assert!(before.is_ok());
        assert_eq!(before.unwrap().status, BookingStatus::Planned);
    }

    #[test]
    fn test_create_inside_existing_conflicts() {
        let mut conn = setup_db();
        let eq = seed_equipment(&conn, "08:00", "18:00");
        let alice = seed_user(&conn, "alice", false);
        let bob = seed_user(&conn, "bob", false);
        let existing = seed_booking(&conn, &eq, &alice, "2025-06-16", "10:00", 120);

        let err = create_booking(&mut conn, &RULES, &bob, &request(&eq, "10:30", 30), at("2025-06-01 09:00"))
            .unwrap_err();
        match err {
            AppError::Conflict(conflicts) => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].booking_id, existing.id);
                assert_eq!(conflicts[0].user, "alice");
                assert_eq!(conflicts[0].time_start, "10:00");
                assert_eq!(conflicts[0].time_end, "12:00");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        let live = queries::get_live_bookings_for_day(&conn, eq.id, &d("2025-06-16")).unwrap();
        assert_eq!(live.len(), 1);
    }

    #[test]
    fn test_create_validation() {
        let mut conn = setup_db();
        let eq = seed_equipment(&conn, "08:00", "18:00");
        let alice = seed_user(&conn, "alice", false);
        let now = at("2025-06-01 09:00");

        for (start, duration) in [("10:00", 0), ("10:00", -30), ("10:00", 45), ("10:00", 750), ("17:30", 60), ("07:30", 30)] {
            let err = create_booking(&mut conn, &RULES, &alice, &request(&eq, start, duration), now).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{start} {duration}: {err:?}");
        }

        let mut missing = request(&eq, "10:00", 30);
        missing.equipment_id = 999;
        let err = create_booking(&mut conn, &RULES, &alice, &missing, now).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_blocked_user_cannot_book() {
        let mut conn = setup_db();
        let eq = seed_equipment(&conn, "08:00", "18:00");
        let mut alice = seed_user(&conn, "alice", false);
        alice.is_blocked = true;
        let err = create_booking(&mut conn, &RULES, &alice, &request(&eq, "10:00", 30), at("2025-06-01 09:00"))
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn test_created_booking_visible_to_slots() {
        let mut conn = setup_db();
        let eq = seed_equipment(&conn, "08:00", "12:00");
        let alice = seed_user(&conn, "alice", false);
        create_booking(&mut conn, &RULES, &alice, &request(&eq, "09:00", 60), at("2025-06-01 09:00")).unwrap();

        let result = available_slots(&mut conn, &RULES, eq.id, &d("2025-06-16"), None).unwrap();
        let times: Vec<_> = result.slots.iter().map(|s| s.time.as_str()).collect();
        assert_eq!(times, vec!["08:00", "08:30", "10:00", "10:30", "11:00", "11:30"]);
    }

    #[test]
    fn test_extend_into_later_booking_conflicts_and_keeps_duration() {
        let mut conn = setup_db();
        let eq = seed_equipment(&conn, "08:00", "18:00");
        let alice = seed_user(&conn, "alice", false);
        let bob = seed_user(&conn, "bob", false);
        let mine = seed_booking(&conn, &eq, &alice, "2025-06-16", "09:00", 60);
        let later = seed_booking(&conn, &eq, &bob, "2025-06-16", "10:30", 60);

        let err = extend_booking(&mut conn, &RULES, &alice, &mine.id, 60, at("2025-06-01 09:00")).unwrap_err();
        match err {
            AppError::Conflict(conflicts) => assert_eq!(conflicts[0].booking_id, later.id),
            other => panic!("expected conflict, got {other:?}"),
        }
        let unchanged = queries::get_booking_by_id(&conn, &mine.id).unwrap().unwrap();
        assert_eq!(unchanged.duration_minutes, 60);

        let extended = extend_booking(&mut conn, &RULES, &alice, &mine.id, 30, at("2025-06-01 09:00")).unwrap();
        assert_eq!(extended.duration_minutes, 90);
        assert_eq!(extended.end_time(), t("10:30"));
    }

    #[test]
    fn test_extend_huge_extension_is_rejected() {
        let mut conn = setup_db();
        let eq = seed_equipment(&conn, "08:00", "18:00");
        let alice = seed_user(&conn, "alice", false);
        let mine = seed_booking(&conn, &eq, &alice, "2025-06-16", "09:00", 60);
        let now = at("2025-06-01 09:00");

        let err = extend_booking(&mut conn, &RULES, &alice, &mine.id, 2_147_483_640, now).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let extended = extend_booking(&mut conn, &RULES, &alice, &mine.id, 30, now).unwrap();
        assert_eq!(extended.duration_minutes, 90);
    }

    #[test]
    fn test_extend_rules() {
        let mut conn = setup_db();
        let eq = seed_equipment(&conn, "08:00", "18:00");
        let alice = seed_user(&conn, "alice", false);
        let bob = seed_user(&conn, "bob", false);
        let admin = seed_user(&conn, "root", true);
        let mine = seed_booking(&conn, &eq, &alice, "2025-06-16", "16:00", 60);
        let now = at("2025-06-01 09:00");

        let err = extend_booking(&mut conn, &RULES, &bob, &mine.id, 30, now).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = extend_booking(&mut conn, &RULES, &alice, &mine.id, 20, now).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = extend_booking(&mut conn, &RULES, &alice, &mine.id, 90, now).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = extend_booking(&mut conn, &RULES, &alice, "missing", 30, now).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let by_admin = extend_booking(&mut conn, &RULES, &admin, &mine.id, 60, now).unwrap();
        assert_eq!(by_admin.end_time(), t("18:00"));

        cancel_booking(&mut conn, &alice, &mine.id, now).unwrap();
        let err = extend_booking(&mut conn, &RULES, &alice, &mine.id, 30, now).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[test]
    fn test_cancel_frees_interval() {
        let mut conn = setup_db();
        let eq = seed_equipment(&conn, "08:00", "12:00");
        let alice = seed_user(&conn, "alice", false);
        let booking = seed_booking(&conn, &eq, &alice, "2025-06-16", "09:00", 60);

        let before = available_slots(&mut conn, &RULES, eq.id, &d("2025-06-16"), None).unwrap();
        assert!(before.slots.iter().all(|s| s.time != "09:00"));

        let cancelled = cancel_booking(&mut conn, &alice, &booking.id, at("2025-06-01 09:00")).unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);

        let after = available_slots(&mut conn, &RULES, eq.id, &d("2025-06-16"), None).unwrap();
        assert_eq!(after.slots.len(), 8);
        assert_eq!(after.slots[0].max_duration_minutes, 240);
    }

    #[test]
    fn test_cancel_twice_is_invalid_state() {
        let mut conn = setup_db();
        let eq = seed_equipment(&conn, "08:00", "12:00");
        let alice = seed_user(&conn, "alice", false);
        let bob = seed_user(&conn, "bob", false);
        let booking = seed_booking(&conn, &eq, &alice, "2025-06-16", "09:00", 60);
        let now = at("2025-06-01 09:00");

        let err = cancel_booking(&mut conn, &bob, &booking.id, now).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        cancel_booking(&mut conn, &alice, &booking.id, now).unwrap();
        let err = cancel_booking(&mut conn, &alice, &booking.id, now).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[test]
    fn test_finish_records_time_and_frees_rest() {
        let mut conn = setup_db();
        let eq = seed_equipment(&conn, "08:00", "12:00");
        let alice = seed_user(&conn, "alice", false);
        let booking = seed_booking(&conn, &eq, &alice, "2025-06-16", "09:00", 120);

        let err = finish_booking(&mut conn, &alice, &booking.id, at("2025-06-16 08:30")).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let finished = finish_booking(&mut conn, &alice, &booking.id, at("2025-06-16 09:40")).unwrap();
        assert_eq!(finished.status, BookingStatus::Finished);
        assert_eq!(finished.finished_at, Some(t("09:40")));

        let slots = available_slots(&mut conn, &RULES, eq.id, &d("2025-06-16"), None).unwrap();
        assert_eq!(slots.slots.len(), 8);

        let err = cancel_booking(&mut conn, &alice, &booking.id, at("2025-06-16 10:00")).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[test]
    fn test_finish_after_end_clamps() {
        let mut conn = setup_db();
        let eq = seed_equipment(&conn, "08:00", "12:00");
        let alice = seed_user(&conn, "alice", false);
        let booking = seed_booking(&conn, &eq, &alice, "2025-06-16", "09:00", 60);

        let finished = finish_booking(&mut conn, &alice, &booking.id, at("2025-06-17 08:00")).unwrap();
        assert_eq!(finished.finished_at, Some(t("10:00")));
    }
}
