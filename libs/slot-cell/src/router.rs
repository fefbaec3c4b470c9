use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::models::SlotCellState;

pub fn slot_routes(state: Arc<SlotCellState>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::create_slot))
        .route("/my-slots", get(handlers::my_slots))
        .route("/available", get(handlers::available_slots))
        .route(
            "/{slot_id}",
            put(handlers::update_slot).delete(handlers::delete_slot),
        )
        .layer(middleware::from_fn_with_state(
            state.config.clone(),
            auth_middleware,
        ));

    Router::new().merge(protected_routes).with_state(state)
}
