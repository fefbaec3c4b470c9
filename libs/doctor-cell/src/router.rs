use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::models::DoctorCellState;

pub fn doctor_routes(state: Arc<DoctorCellState>) -> Router {
    // Every doctor route needs a verified caller; role checks happen per handler.
    let protected_routes = Router::new()
        .route("/", get(handlers::list_doctors).post(handlers::create_doctor))
        .route("/profile", post(handlers::submit_profile))
        .route("/profile/me", get(handlers::my_profile))
        .route("/stats/me", get(handlers::my_stats))
        .route("/{doctor_id}", get(handlers::get_doctor))
        .route("/{doctor_id}/approve", put(handlers::approve_doctor))
        .layer(middleware::from_fn_with_state(
            state.config.clone(),
            auth_middleware,
        ));

    Router::new().merge(protected_routes).with_state(state)
}
