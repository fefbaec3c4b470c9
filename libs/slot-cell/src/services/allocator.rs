use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::uuid_column;

use crate::models::{
    AvailableSlot, DoctorSlot, LockedSlot, NewSlot, Slot, SlotError, UpdateSlotRequest,
};
use crate::services::conflict::intervals_conflict;

pub(crate) const SLOT_COLUMNS: &str = "s.id, s.doctor_id, s.slot_date, s.start_time, s.end_time, \
     s.max_bookings, s.current_bookings, s.is_available, s.version, s.created_at, s.updated_at";

pub(crate) fn map_slot(row: &Row<'_>) -> rusqlite::Result<Slot> {
    Ok(Slot {
        id: uuid_column(row, "id")?,
        doctor_id: uuid_column(row, "doctor_id")?,
        slot_date: row.get("slot_date")?,
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
        max_bookings: row.get("max_bookings")?,
        current_bookings: row.get("current_bookings")?,
        is_available: row.get("is_available")?,
        version: row.get("version")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Owner of the slot capacity fields.
///
/// Borrows the caller's open transaction; nothing here commits. Any error
/// returned must be propagated so the transaction rolls back and no partial
/// occupancy change becomes visible.
pub struct SlotAllocator<'c> {
    conn: &'c Connection,
}

impl<'c> SlotAllocator<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn find_slot(&self, slot_id: Uuid) -> Result<Option<Slot>, SlotError> {
        let slot = self
            .conn
            .query_row(
                &format!("SELECT {} FROM slots s WHERE s.id = ?1", SLOT_COLUMNS),
                params![slot_id.to_string()],
                map_slot,
            )
            .optional()?;
        Ok(slot)
    }

    /// Read the slot and its doctor. Inside a `Database::transaction` the store
    /// write lock is already held, so no other writer can touch this row until
    /// the caller commits or rolls back.
    pub fn lock_slot(&self, slot_id: Uuid) -> Result<LockedSlot, SlotError> {
        let sql = format!(
            "SELECT {}, d.user_id AS doctor_user_id, d.specialization, d.is_approved,
                    COALESCE(u.full_name, u.email) AS doctor_name, u.email AS doctor_email
             FROM slots s
             JOIN doctors d ON s.doctor_id = d.id
             JOIN users u ON d.user_id = u.id
             WHERE s.id = ?1",
            SLOT_COLUMNS
        );

        self.conn
            .query_row(&sql, params![slot_id.to_string()], |row| {
                Ok(LockedSlot {
                    slot: map_slot(row)?,
                    doctor_user_id: uuid_column(row, "doctor_user_id")?,
                    doctor_name: row.get("doctor_name")?,
                    doctor_email: row.get("doctor_email")?,
                    specialization: row.get("specialization")?,
                    doctor_approved: row.get("is_approved")?,
                })
            })
            .optional()?
            .ok_or(SlotError::NotFound)
    }

    /// Checks made under the lock before any capacity change.
    pub fn ensure_bookable(locked: &LockedSlot, now: NaiveDateTime) -> Result<(), SlotError> {
        let slot = &locked.slot;
        if !slot.is_available || !locked.doctor_approved || slot.is_full() {
            debug!(
                "Slot {} not bookable: available={}, approved={}, {}/{}",
                slot.id, slot.is_available, locked.doctor_approved, slot.current_bookings, slot.max_bookings
            );
            return Err(SlotError::Unavailable);
        }
        if slot.starts_at() < now {
            return Err(SlotError::InPast);
        }
        Ok(())
    }

    /// Take one seat, conditioned on the slot still carrying `expected_version`.
    /// Zero affected rows means another writer got there first.
    pub fn reserve_capacity(&self, slot_id: Uuid, expected_version: i64) -> Result<Slot, SlotError> {
        let changed = self.conn.execute(
            "UPDATE slots
             SET current_bookings = current_bookings + 1,
                 version = version + 1,
                 updated_at = ?1
             WHERE id = ?2 AND version = ?3 AND current_bookings < max_bookings",
            params![Utc::now(), slot_id.to_string(), expected_version],
        )?;

        if changed == 0 {
            warn!(
                "Version check failed reserving slot {} at version {}",
                slot_id, expected_version
            );
            return Err(SlotError::ConcurrencyConflict);
        }

        self.find_slot(slot_id)?.ok_or(SlotError::NotFound)
    }

    /// Take one seat on a slot already locked by this transaction. No version
    /// check, but capacity is still enforced.
    pub fn reserve_locked(&self, slot_id: Uuid) -> Result<Slot, SlotError> {
        let changed = self.conn.execute(
            "UPDATE slots
             SET current_bookings = current_bookings + 1,
                 version = version + 1,
                 updated_at = ?1
             WHERE id = ?2 AND current_bookings < max_bookings",
            params![Utc::now(), slot_id.to_string()],
        )?;

        if changed == 0 {
            return Err(SlotError::Unavailable);
        }

        self.find_slot(slot_id)?.ok_or(SlotError::NotFound)
    }

    /// Give back one seat. Floored at zero, so a second release is a no-op on
    /// the count.
    pub fn release_capacity(&self, slot_id: Uuid) -> Result<(), SlotError> {
        let changed = self.conn.execute(
            "UPDATE slots
             SET current_bookings = MAX(current_bookings - 1, 0),
                 version = version + 1,
                 updated_at = ?1
             WHERE id = ?2",
            params![Utc::now(), slot_id.to_string()],
        )?;

        if changed == 0 {
            debug!("Release skipped, slot {} no longer exists", slot_id);
        }
        Ok(())
    }

    /// Existing slots of the doctor on `date` that clash with the new interval.
    pub fn conflicting_slots(&self, doctor_id: Uuid, new_slot: &NewSlot) -> Result<Vec<Uuid>, SlotError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM slots s WHERE s.doctor_id = ?1 AND s.slot_date = ?2",
            SLOT_COLUMNS
        ))?;
        let same_day = stmt
            .query_map(params![doctor_id.to_string(), new_slot.slot_date], map_slot)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(same_day
            .into_iter()
            .filter(|existing| {
                intervals_conflict(
                    existing.start_time,
                    existing.end_time,
                    new_slot.start_time,
                    new_slot.end_time,
                )
            })
            .map(|existing| existing.id)
            .collect())
    }

    pub fn create_slot(&self, doctor_id: Uuid, new_slot: &NewSlot) -> Result<Slot, SlotError> {
        if !self.conflicting_slots(doctor_id, new_slot)?.is_empty() {
            return Err(SlotError::Overlap);
        }

        let slot_id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO slots (id, doctor_id, slot_date, start_time, end_time, max_bookings,
                 current_bookings, is_available, version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 1, 0, ?7, ?7)",
            params![
                slot_id.to_string(),
                doctor_id.to_string(),
                new_slot.slot_date,
                new_slot.start_time,
                new_slot.end_time,
                new_slot.max_bookings,
                Utc::now()
            ],
        )?;

        self.find_slot(slot_id)?.ok_or(SlotError::NotFound)
    }

    /// Owner edit of availability and capacity. Bumps the version so any
    /// booking that read the old row fails its compare-and-swap.
    pub fn update_slot(&self, slot_id: Uuid, doctor_id: Uuid, patch: UpdateSlotRequest) -> Result<Slot, SlotError> {
        let current = self
            .find_slot(slot_id)?
            .filter(|slot| slot.doctor_id == doctor_id)
            .ok_or(SlotError::NotOwned)?;

        if let Some(max) = patch.max_bookings {
            if max < 1 {
                return Err(SlotError::Validation(
                    "max_bookings must be at least 1".to_string(),
                ));
            }
            if max < current.current_bookings {
                return Err(SlotError::CapacityBelowBookings {
                    current: current.current_bookings,
                });
            }
        }

        self.conn.execute(
            "UPDATE slots
             SET is_available = COALESCE(?1, is_available),
                 max_bookings = COALESCE(?2, max_bookings),
                 version = version + 1,
                 updated_at = ?3
             WHERE id = ?4 AND doctor_id = ?5",
            params![
                patch.is_available,
                patch.max_bookings,
                Utc::now(),
                slot_id.to_string(),
                doctor_id.to_string()
            ],
        )?;

        self.find_slot(slot_id)?.ok_or(SlotError::NotFound)
    }

    pub fn active_bookings(&self, slot_id: Uuid) -> Result<i64, SlotError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM appointments WHERE slot_id = ?1 AND status != 'cancelled'",
            params![slot_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn delete_slot(&self, slot_id: Uuid, doctor_id: Uuid) -> Result<(), SlotError> {
        self.find_slot(slot_id)?
            .filter(|slot| slot.doctor_id == doctor_id)
            .ok_or(SlotError::NotOwned)?;

        if self.active_bookings(slot_id)? > 0 {
            return Err(SlotError::ActiveBookings);
        }

        self.conn.execute(
            "DELETE FROM slots WHERE id = ?1 AND doctor_id = ?2",
            params![slot_id.to_string(), doctor_id.to_string()],
        )?;
        Ok(())
    }

    /// Slots on or after `today` that patients can still book.
    pub fn available_from(
        &self,
        today: NaiveDate,
        doctor_id: Option<Uuid>,
        date: Option<NaiveDate>,
        specialization: Option<&str>,
    ) -> Result<Vec<AvailableSlot>, SlotError> {
        let sql = format!(
            "SELECT {}, COALESCE(u.full_name, u.email) AS doctor_name, d.specialization,
                    d.qualification, d.consultation_fee
             FROM slots s
             JOIN doctors d ON s.doctor_id = d.id
             JOIN users u ON d.user_id = u.id
             WHERE s.is_available = 1
               AND s.current_bookings < s.max_bookings
               AND s.slot_date >= ?1
               AND d.is_approved = 1
               AND (?2 IS NULL OR d.id = ?2)
               AND (?3 IS NULL OR s.slot_date = ?3)
               AND (?4 IS NULL OR d.specialization LIKE '%' || ?4 || '%')
             ORDER BY s.slot_date, s.start_time",
            SLOT_COLUMNS
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![
                    today,
                    doctor_id.map(|id| id.to_string()),
                    date,
                    specialization
                ],
                |row| {
                    Ok(AvailableSlot {
                        slot: map_slot(row)?,
                        doctor_name: row.get("doctor_name")?,
                        specialization: row.get("specialization")?,
                        qualification: row.get("qualification")?,
                        consultation_fee: row.get("consultation_fee")?,
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn doctor_slots(
        &self,
        doctor_id: Uuid,
        date: Option<NaiveDate>,
        is_available: Option<bool>,
    ) -> Result<Vec<DoctorSlot>, SlotError> {
        let sql = format!(
            "SELECT {}, COUNT(a.id) AS total_appointments
             FROM slots s
             LEFT JOIN appointments a ON a.slot_id = s.id AND a.status != 'cancelled'
             WHERE s.doctor_id = ?1
               AND (?2 IS NULL OR s.slot_date = ?2)
               AND (?3 IS NULL OR s.is_available = ?3)
             GROUP BY s.id
             ORDER BY s.slot_date, s.start_time",
            SLOT_COLUMNS
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![doctor_id.to_string(), date, is_available], |row| {
                Ok(DoctorSlot {
                    slot: map_slot(row)?,
                    total_appointments: row.get("total_appointments")?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
