use std::sync::Arc;

use axum::{
    extract::{Extension, Json, Path, Query, State},
    http::StatusCode,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::{RoleRequirement, User};
use shared_models::error::AppError;
use shared_utils::extractor::JsonBody;

use crate::models::{
    ApproveDoctorRequest, CreateDoctorRequest, DoctorCellState, DoctorProfileRequest,
    DoctorSearchFilters,
};

pub async fn list_doctors(
    State(state): State<Arc<DoctorCellState>>,
    Extension(user): Extension<User>,
    Query(filters): Query<DoctorSearchFilters>,
) -> Result<Json<Value>, AppError> {
    state.guard.require_role(&user, RoleRequirement::Authenticated).await?;

    let doctors = state.doctors.list_doctors(filters).await?;

    Ok(Json(json!({ "doctors": doctors })))
}

pub async fn get_doctor(
    State(state): State<Arc<DoctorCellState>>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    state.guard.require_role(&user, RoleRequirement::Authenticated).await?;

    let doctor = state.doctors.get_doctor(doctor_id).await?;

    Ok(Json(json!({ "doctor": doctor })))
}

pub async fn submit_profile(
    State(state): State<Arc<DoctorCellState>>,
    Extension(user): Extension<User>,
    JsonBody(request): JsonBody<DoctorProfileRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let principal = state
        .guard
        .require_role(&user, RoleRequirement::Authenticated)
        .await?;

    let (doctor, created) = state.doctors.submit_profile(&principal, request).await?;

    let message = if created {
        "Doctor profile created successfully. Awaiting admin approval."
    } else {
        "Doctor profile updated successfully"
    };

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": message, "doctor": doctor })),
    ))
}

pub async fn my_profile(
    State(state): State<Arc<DoctorCellState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let principal = state.guard.require_role(&user, RoleRequirement::Doctor).await?;

    let doctor = state.doctors.my_profile(&principal).await?;

    Ok(Json(json!({ "doctor": doctor })))
}

pub async fn my_stats(
    State(state): State<Arc<DoctorCellState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let principal = state.guard.require_role(&user, RoleRequirement::Doctor).await?;

    let stats = state.doctors.my_stats(&principal).await?;

    Ok(Json(json!(stats)))
}

pub async fn approve_doctor(
    State(state): State<Arc<DoctorCellState>>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
    JsonBody(request): JsonBody<ApproveDoctorRequest>,
) -> Result<Json<Value>, AppError> {
    state.guard.require_role(&user, RoleRequirement::Admin).await?;

    let doctor = state
        .doctors
        .set_approval(doctor_id, request.is_approved)
        .await?;

    Ok(Json(json!({
        "message": format!(
            "Doctor {} successfully",
            if request.is_approved { "approved" } else { "disapproved" }
        ),
        "doctor": doctor
    })))
}

pub async fn create_doctor(
    State(state): State<Arc<DoctorCellState>>,
    Extension(user): Extension<User>,
    JsonBody(request): JsonBody<CreateDoctorRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    state.guard.require_role(&user, RoleRequirement::Admin).await?;

    let doctor = state.doctors.create_doctor(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Doctor created successfully", "doctor": doctor })),
    ))
}
