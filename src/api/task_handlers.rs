//! Task API handlers

use super::client_handlers::DeleteResponse;
use super::handlers::{ApiJson, AppError, KunaState};
use super::query::TaskListQuery;
use crate::crm::{BulkCompleteRequest, BulkCompleteResponse, CreateTaskRequest, UpdateTaskRequest};
use crate::store::models::TaskDetails;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

/// List tasks: incomplete first, then by priority and due date
pub async fn list_tasks(
    State(state): State<KunaState>,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<Vec<TaskDetails>>, AppError> {
    let filter = query.to_filter().map_err(AppError::BadRequest)?;
    Ok(Json(state.crm.list_tasks(&filter).await?))
}

pub async fn create_task(
    State(state): State<KunaState>,
    ApiJson(req): ApiJson<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskDetails>), AppError> {
    let task = state.crm.create_task(req).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// Complete or reopen several tasks at once
pub async fn bulk_complete(
    State(state): State<KunaState>,
    ApiJson(req): ApiJson<BulkCompleteRequest>,
) -> Result<Json<BulkCompleteResponse>, AppError> {
    Ok(Json(state.crm.bulk_complete(req).await?))
}

pub async fn get_task(
    State(state): State<KunaState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskDetails>, AppError> {
    Ok(Json(state.crm.get_task(id).await?))
}

pub async fn update_task(
    State(state): State<KunaState>,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<UpdateTaskRequest>,
) -> Result<Json<TaskDetails>, AppError> {
    Ok(Json(state.crm.update_task(id, req).await?))
}

pub async fn delete_task(
    State(state): State<KunaState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, AppError> {
    state.crm.delete_task(id).await?;
    Ok(Json(DeleteResponse { success: true }))
}
