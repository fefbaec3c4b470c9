use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::models::AuthCellState;

pub fn auth_routes(state: Arc<AuthCellState>) -> Router {
    let public_routes = Router::new()
        .route("/validate", post(handlers::validate_token_handler))
        .route("/verify", post(handlers::verify_token_handler));

    let protected_routes = Router::new()
        .route("/me", get(handlers::me))
        .route("/sync", post(handlers::sync))
        .layer(middleware::from_fn_with_state(
            state.config.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
