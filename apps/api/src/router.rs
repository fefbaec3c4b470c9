use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::appointment_routes;
use appointment_cell::AppointmentCellState;
use auth_cell::router::auth_routes;
use auth_cell::AuthCellState;
use doctor_cell::router::doctor_routes;
use doctor_cell::DoctorCellState;
use notification_cell::NotificationDispatcher;
use shared_config::AppConfig;
use shared_database::Database;
use slot_cell::router::slot_routes;
use slot_cell::SlotCellState;

pub fn create_router(
    config: Arc<AppConfig>,
    db: Arc<Database>,
    dispatcher: NotificationDispatcher,
) -> Router {
    let auth = AuthCellState::new(config.clone(), db.clone());
    let doctors = DoctorCellState::new(config.clone(), db.clone());
    let slots = SlotCellState::new(config.clone(), db.clone());
    let appointments = AppointmentCellState::new(config, db, dispatcher);

    Router::new()
        .route("/", get(|| async { "MediSlot API is running!" }))
        .nest("/auth", auth_routes(Arc::new(auth)))
        .nest("/doctors", doctor_routes(Arc::new(doctors)))
        .nest("/slots", slot_routes(Arc::new(slots)))
        .nest("/appointments", appointment_routes(Arc::new(appointments)))
}
