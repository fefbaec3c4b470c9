use std::sync::Arc;

use axum::{
    extract::{Extension, Json, State},
    http::HeaderMap,
};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_models::auth::{Role, RoleRequirement, TokenResponse, User};
use shared_models::error::AppError;
use shared_utils::extractor::JsonBody;
use shared_utils::jwt::validate_token;

use crate::models::{AuthCellState, SyncProfileRequest};
use crate::services::directory::upsert_user;

fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AppError> {
    let auth_header = headers
        .get("Authorization")
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?;

    let auth_value = auth_header
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    auth_value
        .strip_prefix("Bearer ")
        .map(str::to_string)
        .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()))
}

pub async fn validate_token_handler(
    State(state): State<Arc<AuthCellState>>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, AppError> {
    debug!("Validating token");

    let token = extract_bearer_token(&headers)?;
    let user = validate_token(&token, &state.config.jwt_secret).map_err(AppError::Auth)?;

    Ok(Json(TokenResponse {
        valid: true,
        user_id: user.id,
        email: user.email,
        role: user.role,
    }))
}

pub async fn verify_token_handler(
    State(state): State<Arc<AuthCellState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    debug!("Verifying token");

    let token = extract_bearer_token(&headers)?;
    let valid = validate_token(&token, &state.config.jwt_secret).is_ok();

    Ok(Json(json!({ "valid": valid })))
}

pub async fn me(
    State(state): State<Arc<AuthCellState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let principal = state
        .guard
        .require_role(&user, RoleRequirement::Authenticated)
        .await?;

    let profile = state
        .db
        .read(move |conn| crate::services::directory::find_user(conn, principal.id))
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(json!({ "user": profile })))
}

/// Mirror the verified identity into the user directory. A new row takes its
/// role from the token claims; an existing row keeps its stored role.
pub async fn sync(
    State(state): State<Arc<AuthCellState>>,
    Extension(user): Extension<User>,
    body: Option<JsonBody<SyncProfileRequest>>,
) -> Result<Json<Value>, AppError> {
    let user_id = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Invalid subject in token".to_string()))?;
    let email = user
        .email
        .clone()
        .filter(|email| !email.trim().is_empty())
        .ok_or_else(|| AppError::ValidationError("Token carries no email".to_string()))?;

    let request = body.map(|JsonBody(request)| request);
    let full_name = request
        .as_ref()
        .and_then(|r| r.full_name.clone())
        .or_else(|| user.full_name.clone());
    let phone = request.and_then(|r| r.phone);
    let initial_role = user
        .role
        .as_deref()
        .and_then(|role| role.parse::<Role>().ok())
        .unwrap_or(Role::Patient);

    let profile = state
        .db
        .transaction(move |tx| {
            upsert_user(
                tx,
                user_id,
                &email,
                full_name.as_deref(),
                phone.as_deref(),
                initial_role,
            )
        })
        .await?;

    info!("Synced directory entry for user {} ({})", profile.id, profile.role);

    Ok(Json(json!({ "user": profile })))
}
