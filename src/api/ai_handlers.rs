//! AI insight API handlers

use super::handlers::{ApiJson, AppError, KunaState};
use super::query::InsightsQuery;
use crate::ai::chat::{ChatRequest, ChatResponse};
use crate::ai::service::{
    AnalyzeCustomerRequest, CustomerAnalysisResponse, DailySummaryResponse,
    PipelineInsightsResponse, SalesPredictionResponse,
};
use crate::store::models::Insight;
use axum::{
    extract::{Query, State},
    Json,
};

/// Churn/loyalty analysis of one customer
pub async fn analyze_customer(
    State(state): State<KunaState>,
    ApiJson(req): ApiJson<AnalyzeCustomerRequest>,
) -> Result<Json<CustomerAnalysisResponse>, AppError> {
    Ok(Json(state.insights.analyze_customer(req).await?))
}

pub async fn daily_summary(
    State(state): State<KunaState>,
) -> Result<Json<DailySummaryResponse>, AppError> {
    Ok(Json(state.insights.daily_summary().await?))
}

pub async fn predict_sales(
    State(state): State<KunaState>,
) -> Result<Json<SalesPredictionResponse>, AppError> {
    Ok(Json(state.insights.predict_sales().await?))
}

pub async fn pipeline_insights(
    State(state): State<KunaState>,
) -> Result<Json<PipelineInsightsResponse>, AppError> {
    Ok(Json(state.insights.pipeline_insights().await?))
}

/// Chat with the business assistant
pub async fn chat(
    State(state): State<KunaState>,
    ApiJson(req): ApiJson<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    Ok(Json(state.insights.chat(req).await?))
}

/// Stored insights, newest first
pub async fn list_insights(
    State(state): State<KunaState>,
    Query(query): Query<InsightsQuery>,
) -> Result<Json<Vec<Insight>>, AppError> {
    let kind = query.kind().map_err(AppError::BadRequest)?;
    Ok(Json(state.insights.list_insights(kind, query.limit).await?))
}
