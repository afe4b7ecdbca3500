use std::collections::HashMap;
use std::sync::Mutex;

use chrono::NaiveDate;

use crate::services::bookings::AvailableSlots;

type SlotKey = (i64, NaiveDate, i32);

const DEFAULT_CAPACITY: usize = 4096;

/// Computed slot lists keyed by (equipment, date, step).
///
/// Callers read and write it only while holding the database lock, so an
/// entry can never be repopulated from a snapshot older than the last
/// invalidation. Once `capacity` entries are held the map is cleared before
/// the next insert.
pub struct SlotCache {
    entries: Mutex<HashMap<SlotKey, AvailableSlots>>,
    capacity: usize,
}

impl Default for SlotCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl SlotCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, equipment_id: i64, date: &NaiveDate, step: i32) -> Option<AvailableSlots> {
        let entries = self.entries.lock().ok()?;
        entries.get(&(equipment_id, *date, step)).cloned()
    }

    pub fn put(&self, equipment_id: i64, date: &NaiveDate, slots: AvailableSlots) {
        if let Ok(mut entries) = self.entries.lock() {
            let key = (equipment_id, *date, slots.step_minutes);
            if entries.len() >= self.capacity && !entries.contains_key(&key) {
                tracing::debug!(entries = entries.len(), "slot cache full, clearing");
                entries.clear();
            }
            entries.insert(key, slots);
        }
    }

    pub fn invalidate(&self, equipment_id: i64, date: &NaiveDate) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|(eq, d, _), _| !(*eq == equipment_id && d == date));
        }
    }

    pub fn invalidate_equipment(&self, equipment_id: i64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|(eq, _, _), _| *eq != equipment_id);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
