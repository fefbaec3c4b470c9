// libs/appointment-cell/src/services/lifecycle.rs
use chrono::NaiveDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_models::auth::AuthenticatedPrincipal;
use shared_utils::time::hours_until;

use crate::models::{Appointment, AppointmentError, AppointmentPolicy, AppointmentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Approve,
    Cancel,
    Reschedule,
    Complete,
}

impl Transition {
    fn verb(&self) -> &'static str {
        match self {
            Transition::Approve => "approve",
            Transition::Cancel => "cancel",
            Transition::Reschedule => "reschedule",
            Transition::Complete => "complete",
        }
    }
}

/// The state machine. `cancelled` and `completed` accept nothing.
pub fn next_status(
    current: AppointmentStatus,
    transition: Transition,
) -> Result<AppointmentStatus, AppointmentError> {
    use AppointmentStatus::*;

    let next = match (current, transition) {
        (Pending, Transition::Approve) => Approved,
        (Pending | Approved, Transition::Cancel) => Cancelled,
        (Pending | Approved, Transition::Reschedule) => Pending,
        (Approved, Transition::Complete) => Completed,
        (Cancelled, Transition::Cancel) => return Err(AppointmentError::AlreadyCancelled),
        (status, transition) => {
            warn!("Rejected {:?} from status {}", transition, status);
            return Err(AppointmentError::InvalidTransition {
                action: transition.verb(),
                status,
            });
        }
    };

    debug!("Transition {:?}: {} -> {}", transition, current, next);
    Ok(next)
}

/// The role in which a caller touches one particular appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActingCapacity {
    Admin,
    Doctor,
    Patient,
}

impl ActingCapacity {
    /// `None` means the appointment is invisible to the caller.
    pub fn resolve(
        principal: &AuthenticatedPrincipal,
        appointment: &Appointment,
        doctor_user_id: Uuid,
    ) -> Option<Self> {
        if principal.is_admin() {
            Some(ActingCapacity::Admin)
        } else if principal.id == doctor_user_id {
            Some(ActingCapacity::Doctor)
        } else if principal.id == appointment.patient_id {
            Some(ActingCapacity::Patient)
        } else {
            None
        }
    }

    pub fn can_manage(&self) -> bool {
        matches!(self, ActingCapacity::Admin | ActingCapacity::Doctor)
    }
}

impl AppointmentPolicy {
    /// Patients may not cancel inside the cutoff. Doctors and admins may.
    pub fn ensure_can_cancel(
        &self,
        capacity: ActingCapacity,
        starts_at: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Result<(), AppointmentError> {
        if capacity == ActingCapacity::Patient
            && hours_until(starts_at, now) < self.cancellation_cutoff_hours as f64
        {
            return Err(AppointmentError::CancellationWindow {
                hours: self.cancellation_cutoff_hours,
            });
        }
        Ok(())
    }

    pub fn ensure_can_reschedule(
        &self,
        starts_at: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Result<(), AppointmentError> {
        if hours_until(starts_at, now) < self.reschedule_cutoff_hours as f64 {
            return Err(AppointmentError::RescheduleWindow {
                hours: self.reschedule_cutoff_hours,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{Duration, NaiveDate, Utc};
    use shared_models::auth::Role;

    use crate::models::AppointmentStatus::*;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2030, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn approve_only_from_pending() {
        assert_eq!(next_status(Pending, Transition::Approve).unwrap(), Approved);
        for status in [Approved, Cancelled, Completed] {
            assert_matches!(
                next_status(status, Transition::Approve),
                Err(AppointmentError::InvalidTransition { action: "approve", .. })
            );
        }
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for status in [Cancelled, Completed] {
            for transition in [
                Transition::Approve,
                Transition::Cancel,
                Transition::Reschedule,
                Transition::Complete,
            ] {
                assert!(next_status(status, transition).is_err());
            }
        }
        assert_matches!(
            next_status(Cancelled, Transition::Cancel),
            Err(AppointmentError::AlreadyCancelled)
        );
    }

    #[test]
    fn reschedule_resets_to_pending_and_complete_needs_approval() {
        assert_eq!(next_status(Approved, Transition::Reschedule).unwrap(), Pending);
        assert_eq!(next_status(Pending, Transition::Reschedule).unwrap(), Pending);
        assert_eq!(next_status(Approved, Transition::Complete).unwrap(), Completed);
        assert!(next_status(Pending, Transition::Complete).is_err());
        assert_eq!(next_status(Approved, Transition::Cancel).unwrap(), Cancelled);
    }

    #[test]
    fn cancellation_cutoff_binds_patients_only() {
        let policy = AppointmentPolicy::default();
        let starts_at = now() + Duration::hours(23);

        assert_matches!(
            policy.ensure_can_cancel(ActingCapacity::Patient, starts_at, now()),
            Err(AppointmentError::CancellationWindow { hours: 24 })
        );
        assert!(policy
            .ensure_can_cancel(ActingCapacity::Doctor, starts_at, now())
            .is_ok());
        assert!(policy
            .ensure_can_cancel(ActingCapacity::Admin, starts_at, now())
            .is_ok());
        assert!(policy
            .ensure_can_cancel(ActingCapacity::Patient, now() + Duration::hours(30), now())
            .is_ok());
    }

    #[test]
    fn reschedule_needs_forty_eight_hours() {
        let policy = AppointmentPolicy::default();
        assert!(policy
            .ensure_can_reschedule(now() + Duration::hours(47), now())
            .is_err());
        assert!(policy
            .ensure_can_reschedule(now() + Duration::hours(48), now())
            .is_ok());
    }

    #[test]
    fn capacity_prefers_admin_then_doctor_then_patient() {
        let patient_id = Uuid::new_v4();
        let doctor_user_id = Uuid::new_v4();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id: Uuid::new_v4(),
            slot_id: None,
            appointment_date: now().date(),
            start_time: now().time(),
            end_time: now().time() + Duration::minutes(30),
            reason: None,
            status: Pending,
            admin_notes: None,
            approved_by: None,
            approved_at: None,
            cancellation_reason: None,
            cancelled_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let principal = |id, role| AuthenticatedPrincipal {
            id,
            role,
            email: "someone@example.com".to_string(),
            full_name: None,
        };

        assert_eq!(
            ActingCapacity::resolve(&principal(Uuid::new_v4(), Role::Admin), &appointment, doctor_user_id),
            Some(ActingCapacity::Admin)
        );
        assert_eq!(
            ActingCapacity::resolve(&principal(doctor_user_id, Role::Doctor), &appointment, doctor_user_id),
            Some(ActingCapacity::Doctor)
        );
        assert_eq!(
            ActingCapacity::resolve(&principal(patient_id, Role::Doctor), &appointment, doctor_user_id),
            Some(ActingCapacity::Patient)
        );
        assert_eq!(
            ActingCapacity::resolve(&principal(Uuid::new_v4(), Role::Doctor), &appointment, doctor_user_id),
            None
        );
    }
}
