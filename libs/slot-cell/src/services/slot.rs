use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use doctor_cell::services::find_doctor_by_user;
use doctor_cell::Doctor;
use rusqlite::Connection;
use shared_database::Database;
use shared_models::auth::AuthenticatedPrincipal;
use shared_utils::time::local_now;

use crate::models::{
    AvailableSlot, AvailableSlotsQuery, CreateSlotRequest, DoctorSlot, DoctorSlotsQuery, Slot,
    SlotError, UpdateSlotRequest,
};
use crate::services::allocator::SlotAllocator;

fn require_doctor(conn: &Connection, principal: &AuthenticatedPrincipal) -> Result<Doctor, SlotError> {
    find_doctor_by_user(conn, principal.id)?.ok_or(SlotError::DoctorProfileNotFound)
}

/// Doctor-facing slot management and the patient availability listing.
pub struct SlotService {
    db: Arc<Database>,
}

impl SlotService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn create_slot(
        &self,
        principal: &AuthenticatedPrincipal,
        request: CreateSlotRequest,
    ) -> Result<Slot, SlotError> {
        let new_slot = request.validate()?;
        let principal = principal.clone();

        let slot = self
            .db
            .transaction(move |tx| {
                let doctor = require_doctor(tx, &principal)?;
                if !doctor.is_approved {
                    return Err(SlotError::DoctorNotApproved);
                }
                SlotAllocator::new(tx).create_slot(doctor.id, &new_slot)
            })
            .await?;

        info!(
            "Slot {} created for doctor {} on {} {}-{}",
            slot.id, slot.doctor_id, slot.slot_date, slot.start_time, slot.end_time
        );
        Ok(slot)
    }

    pub async fn update_slot(
        &self,
        principal: &AuthenticatedPrincipal,
        slot_id: Uuid,
        patch: UpdateSlotRequest,
    ) -> Result<Slot, SlotError> {
        let principal = principal.clone();

        let slot = self
            .db
            .transaction(move |tx| {
                let doctor = require_doctor(tx, &principal)?;
                SlotAllocator::new(tx).update_slot(slot_id, doctor.id, patch)
            })
            .await?;

        info!("Slot {} updated to version {}", slot.id, slot.version);
        Ok(slot)
    }

    pub async fn delete_slot(&self, principal: &AuthenticatedPrincipal, slot_id: Uuid) -> Result<(), SlotError> {
        let principal = principal.clone();

        self.db
            .transaction(move |tx| {
                let doctor = require_doctor(tx, &principal)?;
                SlotAllocator::new(tx).delete_slot(slot_id, doctor.id)
            })
            .await?;

        info!("Slot {} deleted", slot_id);
        Ok(())
    }

    pub async fn list_available(&self, query: AvailableSlotsQuery) -> Result<Vec<AvailableSlot>, SlotError> {
        debug!("Listing available slots: {:?}", query);
        let today = local_now().date();

        self.db
            .read(move |conn| {
                let specialization = query
                    .specialization
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty());
                SlotAllocator::new(conn).available_from(today, query.doctor_id, query.date, specialization)
            })
            .await
    }

    pub async fn list_doctor_slots(
        &self,
        principal: &AuthenticatedPrincipal,
        query: DoctorSlotsQuery,
    ) -> Result<Vec<DoctorSlot>, SlotError> {
        let principal = principal.clone();
        let is_available = match query.status.as_deref() {
            None | Some("") => None,
            Some("available") => Some(true),
            Some("unavailable") => Some(false),
            Some(other) => {
                return Err(SlotError::Validation(format!("Unknown slot status: {}", other)));
            }
        };

        self.db
            .read(move |conn| {
                let doctor = require_doctor(conn, &principal)?;
                SlotAllocator::new(conn).doctor_slots(doctor.id, query.date, is_available)
            })
            .await
    }
}
