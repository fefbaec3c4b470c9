// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use doctor_cell::services::find_doctor_by_user;
use notification_cell::{AppointmentDetails, NotificationDispatcher, NotificationEvent};
use shared_database::Database;
use shared_models::auth::AuthenticatedPrincipal;
use shared_utils::time::local_now;
use slot_cell::{SlotAllocator, SlotError};

use crate::models::{
    Appointment, AppointmentError, AppointmentListQuery, AppointmentPolicy, AppointmentStatus,
    AppointmentSummary, ApproveAppointmentRequest, BookAppointmentRequest,
    CancelAppointmentRequest, HistoryAction, HistoryEntry, RescheduleAppointmentRequest,
};
use crate::services::history::{self, NewHistoryEntry};
use crate::services::lifecycle::{next_status, ActingCapacity, Transition};
use crate::services::store::{self, AppointmentContext, ListScope, NewAppointment};

const RESCHEDULE_REASON: &str = "Appointment rescheduled";

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn load(tx: &rusqlite::Connection, appointment_id: Uuid) -> Result<AppointmentContext, AppointmentError> {
    store::load_context(tx, appointment_id)?.ok_or(AppointmentError::NotFound)
}

/// Every appointment transition runs in one store transaction. Slot capacity
/// moves through [`SlotAllocator`] in that same transaction, and e-mails are
/// dispatched only after it commits.
pub struct AppointmentService {
    db: Arc<Database>,
    dispatcher: NotificationDispatcher,
    policy: AppointmentPolicy,
}

impl AppointmentService {
    pub fn new(db: Arc<Database>, dispatcher: NotificationDispatcher, policy: AppointmentPolicy) -> Self {
        Self {
            db,
            dispatcher,
            policy,
        }
    }

    pub async fn book(
        &self,
        principal: &AuthenticatedPrincipal,
        request: BookAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let slot_id = request.slot_id()?;
        let reason = trimmed(request.reason);
        let patient = principal.clone();

        let (appointment, details) = self
            .db
            .transaction(move |tx| {
                let now = local_now();
                let allocator = SlotAllocator::new(tx);

                let locked = allocator.lock_slot(slot_id)?;
                SlotAllocator::ensure_bookable(&locked, now)?;

                if store::has_active_booking(tx, patient.id, slot_id, None)? {
                    warn!("Patient {} already holds slot {}", patient.id, slot_id);
                    return Err(AppointmentError::DuplicateBooking);
                }

                let slot = &locked.slot;
                let appointment = store::insert(
                    tx,
                    NewAppointment {
                        patient_id: patient.id,
                        doctor_id: slot.doctor_id,
                        slot_id,
                        date: slot.slot_date,
                        start_time: slot.start_time,
                        end_time: slot.end_time,
                        reason: reason.as_deref(),
                    },
                )?;

                allocator.reserve_capacity(slot_id, slot.version)?;

                history::append(
                    tx,
                    NewHistoryEntry {
                        appointment_id: appointment.id,
                        action: HistoryAction::Created,
                        old_status: None,
                        new_status: AppointmentStatus::Pending,
                        changed_by: patient.id,
                        change_reason: None,
                    },
                )?;

                let details = AppointmentDetails {
                    appointment_id: appointment.id,
                    patient_name: patient.display_name().to_string(),
                    patient_email: patient.email.clone(),
                    doctor_name: locked.doctor_name.clone(),
                    doctor_email: locked.doctor_email.clone(),
                    specialization: locked.specialization.clone(),
                    date: appointment.appointment_date,
                    start_time: appointment.start_time,
                    end_time: appointment.end_time,
                    status: appointment.status.to_string(),
                    reason: appointment.reason.clone(),
                };
                Ok((appointment, details))
            })
            .await?;

        info!(
            "Appointment {} booked by patient {} on slot {}",
            appointment.id, appointment.patient_id, slot_id
        );
        self.dispatcher
            .dispatch(NotificationEvent::AppointmentBooked(details));

        Ok(appointment)
    }

    pub async fn approve(
        &self,
        principal: &AuthenticatedPrincipal,
        appointment_id: Uuid,
        request: ApproveAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let actor = principal.clone();
        let notes = trimmed(request.admin_notes);

        let context = self
            .db
            .transaction(move |tx| {
                let context = load(tx, appointment_id)?;
                let capacity = ActingCapacity::resolve(&actor, &context.appointment, context.doctor_user_id)
                    .filter(ActingCapacity::can_manage)
                    .ok_or(AppointmentError::NotFoundOrUnauthorized)?;

                let old_status = context.appointment.status;
                let new_status = next_status(old_status, Transition::Approve)?;

                store::mark_approved(tx, appointment_id, actor.id, notes.as_deref())?;
                history::append(
                    tx,
                    NewHistoryEntry {
                        appointment_id,
                        action: HistoryAction::Approved,
                        old_status: Some(old_status),
                        new_status,
                        changed_by: actor.id,
                        change_reason: notes.as_deref(),
                    },
                )?;

                debug!("Appointment {} approved acting as {:?}", appointment_id, capacity);
                load(tx, appointment_id)
            })
            .await?;

        info!("Appointment {} approved by {}", appointment_id, principal.id);
        self.dispatcher
            .dispatch(NotificationEvent::AppointmentApproved(context.details()));

        Ok(context.appointment)
    }

    pub async fn cancel(
        &self,
        principal: &AuthenticatedPrincipal,
        appointment_id: Uuid,
        request: CancelAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let actor = principal.clone();
        let reason = trimmed(request.cancellation_reason);
        let policy = self.policy;

        let (context, reason) = self
            .db
            .transaction(move |tx| {
                let context = load(tx, appointment_id)?;
                let appointment = &context.appointment;
                let capacity = ActingCapacity::resolve(&actor, appointment, context.doctor_user_id)
                    .ok_or(AppointmentError::NotFoundOrUnauthorized)?;

                let old_status = appointment.status;
                let new_status = next_status(old_status, Transition::Cancel)?;
                if let Err(e) = policy.ensure_can_cancel(capacity, appointment.starts_at(), local_now()) {
                    warn!("Patient {} tried to cancel {} inside the cutoff", actor.id, appointment_id);
                    return Err(e);
                }

                store::mark_cancelled(tx, appointment_id, reason.as_deref())?;
                if let Some(slot_id) = appointment.slot_id {
                    SlotAllocator::new(tx).release_capacity(slot_id)?;
                }
                history::append(
                    tx,
                    NewHistoryEntry {
                        appointment_id,
                        action: HistoryAction::Cancelled,
                        old_status: Some(old_status),
                        new_status,
                        changed_by: actor.id,
                        change_reason: reason.as_deref(),
                    },
                )?;

                debug!("Appointment {} cancelled acting as {:?}", appointment_id, capacity);
                Ok((load(tx, appointment_id)?, reason))
            })
            .await?;

        info!("Appointment {} cancelled by {}", appointment_id, principal.id);
        self.dispatcher.dispatch(NotificationEvent::AppointmentCancelled {
            details: context.details(),
            cancellation_reason: reason,
        });

        Ok(context.appointment)
    }

    /// Moves the caller's own appointment to another slot. Sends no e-mail.
    pub async fn reschedule(
        &self,
        principal: &AuthenticatedPrincipal,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let new_slot_id = request.new_slot_id()?;
        let actor = principal.clone();
        let policy = self.policy;

        let appointment = self
            .db
            .transaction(move |tx| {
                let now = local_now();
                let appointment = store::find(tx, appointment_id)?
                    .filter(|a| a.patient_id == actor.id)
                    .ok_or(AppointmentError::NotFoundOrUnauthorized)?;

                let old_status = appointment.status;
                let new_status = next_status(old_status, Transition::Reschedule)?;
                policy.ensure_can_reschedule(appointment.starts_at(), now)?;

                let allocator = SlotAllocator::new(tx);
                let target = allocator.lock_slot(new_slot_id).map_err(|e| match e {
                    SlotError::NotFound => AppointmentError::NewSlotNotFound,
                    other => other.into(),
                })?;

                if appointment.slot_id == Some(new_slot_id) {
                    return Err(AppointmentError::SameSlot);
                }
                match SlotAllocator::ensure_bookable(&target, now) {
                    Ok(()) => {}
                    Err(SlotError::Unavailable) => return Err(AppointmentError::NewSlotUnavailable),
                    Err(SlotError::InPast) => return Err(AppointmentError::NewSlotInPast),
                    Err(other) => return Err(other.into()),
                }
                if store::has_active_booking(tx, actor.id, new_slot_id, Some(appointment_id))? {
                    return Err(AppointmentError::DuplicateBooking);
                }

                if let Some(old_slot_id) = appointment.slot_id {
                    allocator.release_capacity(old_slot_id)?;
                }
                allocator.reserve_locked(new_slot_id).map_err(|e| match e {
                    SlotError::Unavailable => AppointmentError::NewSlotUnavailable,
                    other => other.into(),
                })?;

                let slot = &target.slot;
                store::move_to_slot(
                    tx,
                    appointment_id,
                    slot.doctor_id,
                    new_slot_id,
                    slot.slot_date,
                    slot.start_time,
                    slot.end_time,
                )?;
                history::append(
                    tx,
                    NewHistoryEntry {
                        appointment_id,
                        action: HistoryAction::Rescheduled,
                        old_status: Some(old_status),
                        new_status,
                        changed_by: actor.id,
                        change_reason: Some(RESCHEDULE_REASON),
                    },
                )?;

                store::find(tx, appointment_id)?.ok_or(AppointmentError::NotFound)
            })
            .await?;

        info!(
            "Appointment {} rescheduled to slot {} by {}",
            appointment_id, new_slot_id, principal.id
        );
        Ok(appointment)
    }

    pub async fn complete(
        &self,
        principal: &AuthenticatedPrincipal,
        appointment_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let actor = principal.clone();

        let appointment = self
            .db
            .transaction(move |tx| {
                let context = load(tx, appointment_id)?;
                ActingCapacity::resolve(&actor, &context.appointment, context.doctor_user_id)
                    .filter(ActingCapacity::can_manage)
                    .ok_or(AppointmentError::NotFoundOrUnauthorized)?;

                let old_status = context.appointment.status;
                let new_status = next_status(old_status, Transition::Complete)?;

                store::mark_completed(tx, appointment_id)?;
                history::append(
                    tx,
                    NewHistoryEntry {
                        appointment_id,
                        action: HistoryAction::Completed,
                        old_status: Some(old_status),
                        new_status,
                        changed_by: actor.id,
                        change_reason: None,
                    },
                )?;

                store::find(tx, appointment_id)?.ok_or(AppointmentError::NotFound)
            })
            .await?;

        info!("Appointment {} completed by {}", appointment_id, principal.id);
        Ok(appointment)
    }

    pub async fn list_for_patient(
        &self,
        principal: &AuthenticatedPrincipal,
        query: AppointmentListQuery,
    ) -> Result<Vec<AppointmentSummary>, AppointmentError> {
        debug!("Listing appointments of patient {}: {:?}", principal.id, query);
        let scope = ListScope::Patient(principal.id);

        self.db
            .read(move |conn| store::list(conn, scope, &query))
            .await
    }

    pub async fn list_for_doctor(
        &self,
        principal: &AuthenticatedPrincipal,
        query: AppointmentListQuery,
    ) -> Result<Vec<AppointmentSummary>, AppointmentError> {
        debug!("Listing appointments of doctor user {}: {:?}", principal.id, query);
        let user_id = principal.id;

        self.db
            .read(move |conn| {
                let doctor = find_doctor_by_user(conn, user_id)?
                    .ok_or(AppointmentError::DoctorProfileNotFound)?;
                store::list(conn, ListScope::Doctor(doctor.id), &query)
            })
            .await
    }

    pub async fn list_all(&self, query: AppointmentListQuery) -> Result<Vec<AppointmentSummary>, AppointmentError> {
        debug!("Listing all appointments: {:?}", query);

        self.db
            .read(move |conn| store::list(conn, ListScope::All, &query))
            .await
    }

    /// History is visible to the patient, the owning doctor and admins.
    pub async fn history(
        &self,
        principal: &AuthenticatedPrincipal,
        appointment_id: Uuid,
    ) -> Result<Vec<HistoryEntry>, AppointmentError> {
        let viewer = principal.clone();

        self.db
            .read(move |conn| {
                let context = load(conn, appointment_id)?;
                ActingCapacity::resolve(&viewer, &context.appointment, context.doctor_user_id)
                    .ok_or(AppointmentError::NotFoundOrUnauthorized)?;
                history::list(conn, appointment_id)
            })
            .await
    }
}
