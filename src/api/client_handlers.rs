//! Client and interaction API handlers

use super::handlers::{ApiJson, AppError, KunaState};
use super::query::{ClientListQuery, InteractionsQuery, PaginatedResponse};
use crate::ai::scoring::RiskReport;
use crate::crm::{ClientDetails, CreateClientRequest, CreateInteractionRequest, UpdateClientRequest};
use crate::store::models::{Client, Interaction};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

/// Body of successful deletes
#[derive(Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

// ============================================================================
// Clients
// ============================================================================

/// List clients with search, stage/pipeline/tag filters and pagination
pub async fn list_clients(
    State(state): State<KunaState>,
    Query(query): Query<ClientListQuery>,
) -> Result<Json<PaginatedResponse<Client>>, AppError> {
    let filter = query.to_filter().map_err(AppError::BadRequest)?;
    let (clients, total) = state.crm.list_clients(&filter).await?;
    Ok(Json(PaginatedResponse::new(
        clients,
        total,
        filter.limit,
        filter.offset,
    )))
}

/// Create a new client
pub async fn create_client(
    State(state): State<KunaState>,
    ApiJson(req): ApiJson<CreateClientRequest>,
) -> Result<(StatusCode, Json<Client>), AppError> {
    let client = state.crm.create_client(req).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

/// Client with its stage and latest interactions
pub async fn get_client(
    State(state): State<KunaState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ClientDetails>, AppError> {
    Ok(Json(state.crm.get_client_details(id).await?))
}

pub async fn update_client(
    State(state): State<KunaState>,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<UpdateClientRequest>,
) -> Result<Json<Client>, AppError> {
    Ok(Json(state.crm.update_client(id, req).await?))
}

pub async fn delete_client(
    State(state): State<KunaState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, AppError> {
    state.crm.delete_client(id).await?;
    Ok(Json(DeleteResponse { success: true }))
}

pub async fn client_interactions(
    State(state): State<KunaState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Interaction>>, AppError> {
    Ok(Json(state.crm.client_interactions(id).await?))
}

/// Last stage changes of a client
pub async fn stage_history(
    State(state): State<KunaState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Interaction>>, AppError> {
    Ok(Json(state.crm.stage_history(id).await?))
}

/// Local churn scoring of every client
pub async fn client_risk(State(state): State<KunaState>) -> Result<Json<RiskReport>, AppError> {
    Ok(Json(state.insights.client_risk().await?))
}

// ============================================================================
// Interactions
// ============================================================================

/// Log an interaction and update the client's aggregates
pub async fn create_interaction(
    State(state): State<KunaState>,
    ApiJson(req): ApiJson<CreateInteractionRequest>,
) -> Result<(StatusCode, Json<Interaction>), AppError> {
    let interaction = state.crm.record_interaction(req).await?;
    Ok((StatusCode::CREATED, Json(interaction)))
}

pub async fn list_interactions(
    State(state): State<KunaState>,
    Query(query): Query<InteractionsQuery>,
) -> Result<Json<Vec<Interaction>>, AppError> {
    let client_id = query.client_id().map_err(AppError::BadRequest)?;
    Ok(Json(state.crm.list_interactions(client_id).await?))
}
