//! Shared API state, health check and error handling

use crate::ai::InsightService;
use crate::crm::{CrmError, CrmManager, FieldError};
use crate::store::CrmStore;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, FromRequest, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

/// Shared server state
pub struct ServerState {
    pub crm: CrmManager,
    pub insights: InsightService,
    pub store: Arc<dyn CrmStore>,
    /// Model answering the AI endpoints, or "disabled"
    pub llm_model: String,
}

/// Shared state handed to every handler
pub type KunaState = Arc<ServerState>;

impl ServerState {
    pub fn new(app: AppState) -> KunaState {
        Arc::new(Self {
            crm: CrmManager::new(app.store.clone()),
            insights: InsightService::new(
                app.store.clone(),
                app.llm.clone(),
                app.config.business.clone(),
            ),
            llm_model: app.llm.model_name().to_string(),
            store: app.store,
        })
    }
}

// ============================================================================
// Health check
// ============================================================================

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
    pub llm: String,
}

/// Health check handler: verifies the database answers.
///
/// Returns 200 + `"ok"` when it does, 503 + `"unhealthy"` otherwise.
pub async fn health(State(state): State<KunaState>) -> (StatusCode, Json<HealthResponse>) {
    let db_ok = state.store.health_check().await.unwrap_or(false);

    let (http_status, status) = if db_ok {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        http_status,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: if db_ok {
                "connected".to_string()
            } else {
                "disconnected".to_string()
            },
            llm: state.llm_model.clone(),
        }),
    )
}

// ============================================================================
// Request bodies
// ============================================================================

/// `Json` extractor whose rejections use the API error envelope
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

// ============================================================================
// Error handling
// ============================================================================

/// Application error type
#[derive(Debug)]
pub enum AppError {
    Internal(anyhow::Error),
    NotFound(String),
    BadRequest(String),
    Validation(Vec<FieldError>),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            AppError::Internal(e) => {
                tracing::error!("Request failed: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": e.to_string() }),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, serde_json::json!({ "error": msg })),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
            }
            AppError::Validation(details) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": "Validation failed", "details": details }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<CrmError> for AppError {
    fn from(err: CrmError) -> Self {
        match err {
            CrmError::Validation(details) => AppError::Validation(details),
            CrmError::NotFound(msg) => AppError::NotFound(msg),
            CrmError::BadRequest(msg) => AppError::BadRequest(msg),
            CrmError::Store(e) => AppError::Internal(e),
        }
    }
}
