//! Stage and pipeline API handlers

use super::client_handlers::DeleteResponse;
use super::handlers::{ApiJson, AppError, KunaState};
use crate::crm::{
    AddToPipelineRequest, AddToPipelineResponse, AssignStagesResponse, MoveStageRequest,
    MoveStageResponse, PipelineStage, RemoveFromPipelineRequest, RemoveFromPipelineResponse,
    ReorderStagesRequest, SeedStagesResponse, StageRequest,
};
use crate::store::models::{Stage, StageWithCount};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

// ============================================================================
// Stages
// ============================================================================

/// Pipeline board: stages in order with their clients
pub async fn list_stages(
    State(state): State<KunaState>,
) -> Result<Json<Vec<PipelineStage>>, AppError> {
    Ok(Json(state.crm.stage_board().await?))
}

pub async fn create_stage(
    State(state): State<KunaState>,
    ApiJson(req): ApiJson<StageRequest>,
) -> Result<(StatusCode, Json<Stage>), AppError> {
    let stage = state.crm.create_stage(req).await?;
    Ok((StatusCode::CREATED, Json(stage)))
}

/// Reorder all stages; each stage's order becomes its index in the body
pub async fn reorder_stages(
    State(state): State<KunaState>,
    ApiJson(req): ApiJson<ReorderStagesRequest>,
) -> Result<Json<Vec<StageWithCount>>, AppError> {
    Ok(Json(state.crm.reorder_stages(req).await?))
}

pub async fn update_stage(
    State(state): State<KunaState>,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<StageRequest>,
) -> Result<Json<Stage>, AppError> {
    Ok(Json(state.crm.update_stage(id, req).await?))
}

pub async fn delete_stage(
    State(state): State<KunaState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, AppError> {
    state.crm.delete_stage(id).await?;
    Ok(Json(DeleteResponse { success: true }))
}

/// Create the default stages; 200 when stages already existed
pub async fn seed_stages(
    State(state): State<KunaState>,
) -> Result<(StatusCode, Json<SeedStagesResponse>), AppError> {
    let seeded = state.crm.seed_default_stages().await?;
    let status = if seeded.existing {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(seeded)))
}

// ============================================================================
// Pipeline
// ============================================================================

pub async fn move_client(
    State(state): State<KunaState>,
    ApiJson(req): ApiJson<MoveStageRequest>,
) -> Result<Json<MoveStageResponse>, AppError> {
    Ok(Json(state.crm.move_client(req).await?))
}

pub async fn add_to_pipeline(
    State(state): State<KunaState>,
    ApiJson(req): ApiJson<AddToPipelineRequest>,
) -> Result<Json<AddToPipelineResponse>, AppError> {
    Ok(Json(state.crm.add_to_pipeline(req).await?))
}

pub async fn remove_from_pipeline(
    State(state): State<KunaState>,
    ApiJson(req): ApiJson<RemoveFromPipelineRequest>,
) -> Result<Json<RemoveFromPipelineResponse>, AppError> {
    Ok(Json(state.crm.remove_from_pipeline(req).await?))
}

/// Auto-assign every client without a stage
pub async fn assign_stages(
    State(state): State<KunaState>,
) -> Result<Json<AssignStagesResponse>, AppError> {
    Ok(Json(state.crm.assign_stages().await?))
}
