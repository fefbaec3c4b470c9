// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::models::AppointmentCellState;

pub fn appointment_routes(state: Arc<AppointmentCellState>) -> Router {
    // All appointment operations require authentication
    let protected_routes = Router::new()
        // Patient
        .route("/book", post(handlers::book_appointment))
        .route("/my-appointments", get(handlers::my_appointments))
        .route("/{appointment_id}/reschedule", put(handlers::reschedule_appointment))
        // Doctor and admin
        .route("/doctor-appointments", get(handlers::doctor_appointments))
        .route("/all", get(handlers::all_appointments))
        .route("/{appointment_id}/approve", put(handlers::approve_appointment))
        .route("/{appointment_id}/complete", put(handlers::complete_appointment))
        // Ownership decided per appointment
        .route("/{appointment_id}/cancel", put(handlers::cancel_appointment))
        .route("/{appointment_id}/history", get(handlers::appointment_history))
        .layer(middleware::from_fn_with_state(
            state.config.clone(),
            auth_middleware,
        ));

    Router::new().merge(protected_routes).with_state(state)
}
