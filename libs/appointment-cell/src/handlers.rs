// libs/appointment-cell/src/handlers.rs
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
    AppointmentCellState, AppointmentListQuery, ApproveAppointmentRequest, BookAppointmentRequest,
    CancelAppointmentRequest, RescheduleAppointmentRequest,
};

// ==============================================================================
// PATIENT HANDLERS
// ==============================================================================

pub async fn book_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    JsonBody(request): JsonBody<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let principal = state.guard.require_role(&user, RoleRequirement::Patient).await?;

    let appointment = state.appointments.book(&principal, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Appointment booked successfully. Awaiting admin approval.",
            "appointment": appointment
        })),
    ))
}

pub async fn my_appointments(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Query(query): Query<AppointmentListQuery>,
) -> Result<Json<Value>, AppError> {
    let principal = state.guard.require_role(&user, RoleRequirement::Patient).await?;

    let appointments = state.appointments.list_for_patient(&principal, query).await?;

    Ok(Json(json!({ "appointments": appointments })))
}

pub async fn reschedule_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    JsonBody(request): JsonBody<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let principal = state.guard.require_role(&user, RoleRequirement::Patient).await?;

    let appointment = state
        .appointments
        .reschedule(&principal, appointment_id, request)
        .await?;

    Ok(Json(json!({
        "message": "Appointment rescheduled successfully. Awaiting approval.",
        "appointment": appointment
    })))
}

// ==============================================================================
// DOCTOR AND ADMIN HANDLERS
// ==============================================================================

pub async fn doctor_appointments(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Query(query): Query<AppointmentListQuery>,
) -> Result<Json<Value>, AppError> {
    let principal = state.guard.require_role(&user, RoleRequirement::Doctor).await?;

    let appointments = state.appointments.list_for_doctor(&principal, query).await?;

    Ok(Json(json!({ "appointments": appointments })))
}

pub async fn all_appointments(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Query(query): Query<AppointmentListQuery>,
) -> Result<Json<Value>, AppError> {
    state.guard.require_role(&user, RoleRequirement::Admin).await?;

    let appointments = state.appointments.list_all(query).await?;

    Ok(Json(json!({ "appointments": appointments })))
}

pub async fn approve_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    body: Option<JsonBody<ApproveAppointmentRequest>>,
) -> Result<Json<Value>, AppError> {
    let principal = state.guard.require_role(&user, RoleRequirement::Doctor).await?;
    let request = body.map(|JsonBody(r)| r).unwrap_or_default();

    let appointment = state
        .appointments
        .approve(&principal, appointment_id, request)
        .await?;

    Ok(Json(json!({
        "message": "Appointment approved successfully",
        "appointment": appointment
    })))
}

pub async fn complete_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let principal = state.guard.require_role(&user, RoleRequirement::Doctor).await?;

    let appointment = state.appointments.complete(&principal, appointment_id).await?;

    Ok(Json(json!({
        "message": "Appointment marked as completed",
        "appointment": appointment
    })))
}

// ==============================================================================
// SHARED HANDLERS
// ==============================================================================

pub async fn cancel_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    body: Option<JsonBody<CancelAppointmentRequest>>,
) -> Result<Json<Value>, AppError> {
    let principal = state
        .guard
        .require_role(&user, RoleRequirement::Authenticated)
        .await?;
    let request = body.map(|JsonBody(r)| r).unwrap_or_default();

    let appointment = state
        .appointments
        .cancel(&principal, appointment_id, request)
        .await?;

    Ok(Json(json!({
        "message": "Appointment cancelled successfully",
        "appointment": appointment
    })))
}

pub async fn appointment_history(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let principal = state
        .guard
        .require_role(&user, RoleRequirement::Authenticated)
        .await?;

    let history = state.appointments.history(&principal, appointment_id).await?;

    Ok(Json(json!({ "history": history })))
}
