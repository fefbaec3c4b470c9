use std::sync::Arc;

use assert_matches::assert_matches;
use futures::future::join_all;
use rusqlite::params;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use appointment_cell::models::{
    AppointmentListQuery, ApproveAppointmentRequest, BookAppointmentRequest,
    CancelAppointmentRequest, RescheduleAppointmentRequest,
};
use appointment_cell::{
    Appointment, AppointmentError, AppointmentPolicy, AppointmentService, AppointmentStatus,
    HistoryAction,
};
use notification_cell::{NotificationDispatcher, NotificationEvent};
use shared_database::Database;
use shared_utils::test_utils::{TestFixtures, TestUser};
use slot_cell::SlotError;

struct Fixture {
    db: Arc<Database>,
    service: Arc<AppointmentService>,
    events: UnboundedReceiver<NotificationEvent>,
    doctor: TestUser,
    doctor_id: Uuid,
    patient: TestUser,
    admin: TestUser,
}

impl Fixture {
    async fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (dispatcher, events) = NotificationDispatcher::channel();
        let service = Arc::new(AppointmentService::new(
            db.clone(),
            dispatcher,
            AppointmentPolicy::default(),
        ));

        let doctor = TestUser::doctor("house@example.com").with_name("Gregory House");
        let patient = TestUser::patient("ada@example.com").with_name("Ada Lovelace");
        let admin = TestUser::admin("admin@example.com");

        let doctor_id = TestFixtures::seed_doctor(&db, &doctor, true).await.unwrap();
        TestFixtures::seed_user(&db, &patient).await.unwrap();
        TestFixtures::seed_user(&db, &admin).await.unwrap();

        Self {
            db,
            service,
            events,
            doctor,
            doctor_id,
            patient,
            admin,
        }
    }

    async fn slot(&self, hours_ahead: i64, max_bookings: i32) -> Uuid {
        let start = TestFixtures::slot_start_in(hours_ahead, 30);
        TestFixtures::seed_slot(&self.db, self.doctor_id, start, 30, max_bookings)
            .await
            .unwrap()
    }

    async fn book(&self, patient: &TestUser, slot_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.service
            .book(
                &patient.to_principal(),
                BookAppointmentRequest {
                    slot_id: Some(slot_id.to_string()),
                    reason: Some("checkup".to_string()),
                },
            )
            .await
    }

    async fn cancel(&self, actor: &TestUser, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.service
            .cancel(
                &actor.to_principal(),
                appointment_id,
                CancelAppointmentRequest {
                    cancellation_reason: Some("Cannot make it".to_string()),
                },
            )
            .await
    }

    async fn approve(&self, actor: &TestUser, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.service
            .approve(&actor.to_principal(), appointment_id, ApproveAppointmentRequest::default())
            .await
    }

    async fn reschedule(&self, actor: &TestUser, appointment_id: Uuid, new_slot_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.service
            .reschedule(
                &actor.to_principal(),
                appointment_id,
                RescheduleAppointmentRequest {
                    new_slot_id: Some(new_slot_id.to_string()),
                },
            )
            .await
    }

    /// `(current_bookings, non-cancelled appointments referencing the slot)`.
    async fn occupancy(&self, slot_id: Uuid) -> (i64, i64) {
        self.db
            .read(move |conn| {
                let current: i64 = conn.query_row(
                    "SELECT current_bookings FROM slots WHERE id = ?1",
                    params![slot_id.to_string()],
                    |row| row.get(0),
                )?;
                let active: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM appointments WHERE slot_id = ?1 AND status != 'cancelled'",
                    params![slot_id.to_string()],
                    |row| row.get(0),
                )?;
                Ok::<_, AppointmentError>((current, active))
            })
            .await
            .unwrap()
    }

    async fn assert_consistent(&self, slot_id: Uuid, expected: i64) {
        assert_eq!(self.occupancy(slot_id).await, (expected, expected));
    }
}

#[tokio::test]
async fn book_approve_complete_walks_the_happy_path() {
    let mut fx = Fixture::new().await;
    let slot_id = fx.slot(72, 1).await;

    let booked = fx.book(&fx.patient, slot_id).await.unwrap();
    assert_eq!(booked.status, AppointmentStatus::Pending);
    assert_eq!(booked.slot_id, Some(slot_id));
    assert_eq!(booked.reason.as_deref(), Some("checkup"));
    fx.assert_consistent(slot_id, 1).await;

    let approved = fx.approve(&fx.admin, booked.id).await.unwrap();
    assert_eq!(approved.status, AppointmentStatus::Approved);
    assert_eq!(approved.approved_by, Some(fx.admin.uuid()));
    assert!(approved.approved_at.is_some());

    let completed = fx
        .service
        .complete(&fx.doctor.to_principal(), booked.id)
        .await
        .unwrap();
    assert_eq!(completed.status, AppointmentStatus::Completed);
    // A completed visit still occupies its seat.
    fx.assert_consistent(slot_id, 1).await;

    let history = fx
        .service
        .history(&fx.patient.to_principal(), booked.id)
        .await
        .unwrap();
    let actions: Vec<_> = history.iter().map(|h| h.action).collect();
    assert_eq!(
        actions,
        vec![HistoryAction::Completed, HistoryAction::Approved, HistoryAction::Created]
    );
    assert_eq!(history[2].old_status, None);
    assert_eq!(history[2].changed_by_name.as_deref(), Some("Ada Lovelace"));

    assert_matches!(fx.events.try_recv(), Ok(NotificationEvent::AppointmentBooked(d)) if d.doctor_name == "Gregory House");
    assert_matches!(fx.events.try_recv(), Ok(NotificationEvent::AppointmentApproved(_)));
    assert_matches!(fx.events.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn concurrent_bookings_admit_exactly_one() {
    let fx = Fixture::new().await;
    let slot_id = fx.slot(72, 1).await;

    let mut patients = Vec::new();
    for i in 0..8 {
        let patient = TestUser::patient(&format!("racer{}@example.com", i));
        TestFixtures::seed_user(&fx.db, &patient).await.unwrap();
        patients.push(patient);
    }

    let attempts = patients.iter().map(|patient| {
        let service = fx.service.clone();
        let principal = patient.to_principal();
        async move {
            service
                .book(
                    &principal,
                    BookAppointmentRequest {
                        slot_id: Some(slot_id.to_string()),
                        reason: None,
                    },
                )
                .await
        }
    });
    let results = join_all(attempts).await;

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert_matches!(
            result,
            Err(AppointmentError::Slot(SlotError::Unavailable | SlotError::ConcurrencyConflict))
        );
    }
    fx.assert_consistent(slot_id, 1).await;
}

#[tokio::test]
async fn booking_rejects_missing_full_past_and_switched_off_slots() {
    let fx = Fixture::new().await;

    assert_matches!(
        fx.book(&fx.patient, Uuid::new_v4()).await,
        Err(AppointmentError::Slot(SlotError::NotFound))
    );

    let past = fx.slot(-3, 1).await;
    assert_matches!(
        fx.book(&fx.patient, past).await,
        Err(AppointmentError::Slot(SlotError::InPast))
    );

    let switched_off = fx.slot(50, 2).await;
    let id = switched_off.to_string();
    fx.db
        .transaction(move |tx| {
            tx.execute("UPDATE slots SET is_available = 0 WHERE id = ?1", params![id])?;
            Ok::<_, AppointmentError>(())
        })
        .await
        .unwrap();
    assert_matches!(
        fx.book(&fx.patient, switched_off).await,
        Err(AppointmentError::Slot(SlotError::Unavailable))
    );

    let single = fx.slot(80, 1).await;
    fx.book(&fx.patient, single).await.unwrap();
    let other = TestUser::patient("other@example.com");
    TestFixtures::seed_user(&fx.db, &other).await.unwrap();
    assert_matches!(
        fx.book(&other, single).await,
        Err(AppointmentError::Slot(SlotError::Unavailable))
    );
    fx.assert_consistent(single, 1).await;
}

#[tokio::test]
async fn patient_cannot_hold_two_active_bookings_on_one_slot() {
    let fx = Fixture::new().await;
    let slot_id = fx.slot(72, 3).await;

    let first = fx.book(&fx.patient, slot_id).await.unwrap();
    assert_matches!(
        fx.book(&fx.patient, slot_id).await,
        Err(AppointmentError::DuplicateBooking)
    );
    fx.assert_consistent(slot_id, 1).await;

    fx.cancel(&fx.patient, first.id).await.unwrap();
    fx.book(&fx.patient, slot_id).await.unwrap();
    fx.assert_consistent(slot_id, 1).await;
}

#[tokio::test]
async fn approval_only_succeeds_from_pending() {
    let fx = Fixture::new().await;
    let slot_id = fx.slot(72, 2).await;
    let appointment = fx.book(&fx.patient, slot_id).await.unwrap();

    fx.approve(&fx.doctor, appointment.id).await.unwrap();
    assert_matches!(
        fx.approve(&fx.admin, appointment.id).await,
        Err(AppointmentError::InvalidTransition {
            status: AppointmentStatus::Approved,
            ..
        })
    );

    let other = fx.book(&TestUser::patient("x@example.com"), slot_id).await;
    // Unknown users are rejected by the foreign key before anything is kept.
    assert!(other.is_err());
    fx.assert_consistent(slot_id, 1).await;

    fx.cancel(&fx.admin, appointment.id).await.unwrap();
    assert_matches!(
        fx.approve(&fx.admin, appointment.id).await,
        Err(AppointmentError::InvalidTransition {
            status: AppointmentStatus::Cancelled,
            ..
        })
    );
}

#[tokio::test]
async fn only_admin_or_owning_doctor_may_approve() {
    let fx = Fixture::new().await;
    let slot_id = fx.slot(72, 1).await;
    let appointment = fx.book(&fx.patient, slot_id).await.unwrap();

    let stranger = TestUser::doctor("wilson@example.com");
    TestFixtures::seed_doctor(&fx.db, &stranger, true).await.unwrap();

    assert_matches!(
        fx.approve(&stranger, appointment.id).await,
        Err(AppointmentError::NotFoundOrUnauthorized)
    );
    assert_matches!(
        fx.approve(&fx.patient, appointment.id).await,
        Err(AppointmentError::NotFoundOrUnauthorized)
    );
    assert_matches!(
        fx.approve(&fx.admin, Uuid::new_v4()).await,
        Err(AppointmentError::NotFound)
    );
}

#[tokio::test]
async fn cancellation_cutoff_applies_to_patients_only() {
    let fx = Fixture::new().await;
    let slot_id = fx.slot(23, 1).await;
    let appointment = fx.book(&fx.patient, slot_id).await.unwrap();

    assert_matches!(
        fx.cancel(&fx.patient, appointment.id).await,
        Err(AppointmentError::CancellationWindow { hours: 24 })
    );
    fx.assert_consistent(slot_id, 1).await;

    let cancelled = fx.cancel(&fx.doctor, appointment.id).await.unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Cannot make it"));
    fx.assert_consistent(slot_id, 0).await;

    assert_matches!(
        fx.cancel(&fx.admin, appointment.id).await,
        Err(AppointmentError::AlreadyCancelled)
    );
}

#[tokio::test]
async fn patient_cancels_thirty_hours_ahead() {
    let fx = Fixture::new().await;
    let slot_id = fx.slot(30, 1).await;
    let appointment = fx.book(&fx.patient, slot_id).await.unwrap();

    fx.cancel(&fx.patient, appointment.id).await.unwrap();
    fx.assert_consistent(slot_id, 0).await;

    let history = fx
        .service
        .history(&fx.patient.to_principal(), appointment.id)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].action, HistoryAction::Cancelled);
    assert_eq!(history[0].old_status, Some(AppointmentStatus::Pending));
    assert_eq!(history[0].change_reason.as_deref(), Some("Cannot make it"));
    assert_eq!(history[1].action, HistoryAction::Created);
}

#[tokio::test]
async fn strangers_cannot_cancel_or_read_history() {
    let fx = Fixture::new().await;
    let slot_id = fx.slot(72, 1).await;
    let appointment = fx.book(&fx.patient, slot_id).await.unwrap();

    let stranger = TestUser::patient("eve@example.com");
    TestFixtures::seed_user(&fx.db, &stranger).await.unwrap();

    assert_matches!(
        fx.cancel(&stranger, appointment.id).await,
        Err(AppointmentError::NotFoundOrUnauthorized)
    );
    assert_matches!(
        fx.service.history(&stranger.to_principal(), appointment.id).await,
        Err(AppointmentError::NotFoundOrUnauthorized)
    );
    assert!(fx
        .service
        .history(&fx.doctor.to_principal(), appointment.id)
        .await
        .is_ok());
    fx.assert_consistent(slot_id, 1).await;
}

#[tokio::test]
async fn reschedule_moves_capacity_and_resets_to_pending() {
    let mut fx = Fixture::new().await;
    let old_slot = fx.slot(72, 1).await;
    let new_slot = fx.slot(96, 1).await;

    let appointment = fx.book(&fx.patient, old_slot).await.unwrap();
    fx.approve(&fx.admin, appointment.id).await.unwrap();

    let moved = fx.reschedule(&fx.patient, appointment.id, new_slot).await.unwrap();
    assert_eq!(moved.status, AppointmentStatus::Pending);
    assert_eq!(moved.slot_id, Some(new_slot));
    assert_eq!(moved.approved_by, None);
    assert!(moved.starts_at() > appointment.starts_at());
    fx.assert_consistent(old_slot, 0).await;
    fx.assert_consistent(new_slot, 1).await;

    let history = fx
        .service
        .history(&fx.admin.to_principal(), appointment.id)
        .await
        .unwrap();
    assert_eq!(history[0].action, HistoryAction::Rescheduled);
    assert_eq!(history[0].old_status, Some(AppointmentStatus::Approved));
    assert_eq!(history[0].new_status, AppointmentStatus::Pending);
    assert_eq!(history[0].change_reason.as_deref(), Some("Appointment rescheduled"));

    assert_matches!(fx.events.try_recv(), Ok(NotificationEvent::AppointmentBooked(_)));
    assert_matches!(fx.events.try_recv(), Ok(NotificationEvent::AppointmentApproved(_)));
    assert_matches!(fx.events.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn reschedule_guards_leave_everything_untouched() {
    let fx = Fixture::new().await;
    let current = fx.slot(72, 1).await;
    let appointment = fx.book(&fx.patient, current).await.unwrap();

    assert_matches!(
        fx.reschedule(&fx.patient, appointment.id, Uuid::new_v4()).await,
        Err(AppointmentError::NewSlotNotFound)
    );
    assert_matches!(
        fx.reschedule(&fx.patient, appointment.id, current).await,
        Err(AppointmentError::SameSlot)
    );

    let taken = fx.slot(100, 1).await;
    let other = TestUser::patient("bob@example.com");
    TestFixtures::seed_user(&fx.db, &other).await.unwrap();
    fx.book(&other, taken).await.unwrap();
    assert_matches!(
        fx.reschedule(&fx.patient, appointment.id, taken).await,
        Err(AppointmentError::NewSlotUnavailable)
    );

    let past = fx.slot(-5, 1).await;
    assert_matches!(
        fx.reschedule(&fx.patient, appointment.id, past).await,
        Err(AppointmentError::NewSlotInPast)
    );

    let shared = fx.slot(120, 3).await;
    let second = fx.book(&fx.patient, shared).await.unwrap();
    assert_matches!(
        fx.reschedule(&fx.patient, appointment.id, shared).await,
        Err(AppointmentError::DuplicateBooking)
    );

    assert_matches!(
        fx.reschedule(&other, appointment.id, shared).await,
        Err(AppointmentError::NotFoundOrUnauthorized)
    );

    fx.cancel(&fx.patient, second.id).await.unwrap();
    fx.assert_consistent(current, 1).await;
    fx.assert_consistent(taken, 1).await;
    fx.assert_consistent(shared, 0).await;
}

#[tokio::test]
async fn reschedule_window_and_terminal_states() {
    let fx = Fixture::new().await;
    let soon = fx.slot(30, 1).await;
    let later = fx.slot(96, 1).await;

    let appointment = fx.book(&fx.patient, soon).await.unwrap();
    assert_matches!(
        fx.reschedule(&fx.patient, appointment.id, later).await,
        Err(AppointmentError::RescheduleWindow { hours: 48 })
    );

    fx.cancel(&fx.patient, appointment.id).await.unwrap();
    assert_matches!(
        fx.reschedule(&fx.patient, appointment.id, later).await,
        Err(AppointmentError::InvalidTransition {
            status: AppointmentStatus::Cancelled,
            ..
        })
    );
    fx.assert_consistent(later, 0).await;
}

#[tokio::test]
async fn listings_are_scoped_and_filtered() {
    let fx = Fixture::new().await;
    let first = fx.slot(72, 1).await;
    let second = fx.slot(96, 1).await;

    let a = fx.book(&fx.patient, first).await.unwrap();
    fx.book(&fx.patient, second).await.unwrap();
    fx.approve(&fx.admin, a.id).await.unwrap();

    let mine = fx
        .service
        .list_for_patient(&fx.patient.to_principal(), AppointmentListQuery::default())
        .await
        .unwrap();
    assert_eq!(mine.len(), 2);
    // Latest appointment first for patients.
    assert_eq!(mine[0].appointment.slot_id, Some(second));
    assert_eq!(mine[0].doctor_name, "Gregory House");
    assert_eq!(mine[0].consultation_fee, 150.0);

    let approved = fx
        .service
        .list_for_patient(
            &fx.patient.to_principal(),
            AppointmentListQuery {
                status: Some(AppointmentStatus::Approved),
                date: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(approved.len(), 1);
    assert_eq!(approved[0].appointment.id, a.id);

    let queue = fx
        .service
        .list_for_doctor(&fx.doctor.to_principal(), AppointmentListQuery::default())
        .await
        .unwrap();
    assert_eq!(queue.len(), 2);
    assert_eq!(queue[0].appointment.id, a.id);
    assert_eq!(queue[0].patient_name, "Ada Lovelace");

    let on_day = fx
        .service
        .list_all(AppointmentListQuery {
            status: None,
            date: Some(a.appointment_date),
        })
        .await
        .unwrap();
    assert!(on_day.iter().all(|s| s.appointment.appointment_date == a.appointment_date));
    assert!(on_day.iter().any(|s| s.appointment.id == a.id));

    assert_matches!(
        fx.service
            .list_for_doctor(&fx.patient.to_principal(), AppointmentListQuery::default())
            .await,
        Err(AppointmentError::DoctorProfileNotFound)
    );
}
