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
    AvailableSlotsQuery, CreateSlotRequest, DoctorSlotsQuery, SlotCellState, UpdateSlotRequest,
};

pub async fn create_slot(
    State(state): State<Arc<SlotCellState>>,
    Extension(user): Extension<User>,
    JsonBody(request): JsonBody<CreateSlotRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let principal = state.guard.require_role(&user, RoleRequirement::Doctor).await?;

    let slot = state.slots.create_slot(&principal, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Slot created successfully", "slot": slot })),
    ))
}

pub async fn my_slots(
    State(state): State<Arc<SlotCellState>>,
    Extension(user): Extension<User>,
    Query(query): Query<DoctorSlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let principal = state.guard.require_role(&user, RoleRequirement::Doctor).await?;

    let slots = state.slots.list_doctor_slots(&principal, query).await?;

    Ok(Json(json!({ "slots": slots })))
}

pub async fn available_slots(
    State(state): State<Arc<SlotCellState>>,
    Extension(user): Extension<User>,
    Query(query): Query<AvailableSlotsQuery>,
) -> Result<Json<Value>, AppError> {
    state.guard.require_role(&user, RoleRequirement::Patient).await?;

    let slots = state.slots.list_available(query).await?;

    Ok(Json(json!({ "slots": slots })))
}

pub async fn update_slot(
    State(state): State<Arc<SlotCellState>>,
    Extension(user): Extension<User>,
    Path(slot_id): Path<Uuid>,
    JsonBody(patch): JsonBody<UpdateSlotRequest>,
) -> Result<Json<Value>, AppError> {
    let principal = state.guard.require_role(&user, RoleRequirement::Doctor).await?;

    let slot = state.slots.update_slot(&principal, slot_id, patch).await?;

    Ok(Json(json!({ "message": "Slot updated successfully", "slot": slot })))
}

pub async fn delete_slot(
    State(state): State<Arc<SlotCellState>>,
    Extension(user): Extension<User>,
    Path(slot_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let principal = state.guard.require_role(&user, RoleRequirement::Doctor).await?;

    state.slots.delete_slot(&principal, slot_id).await?;

    Ok(Json(json!({ "message": "Slot deleted successfully" })))
}
