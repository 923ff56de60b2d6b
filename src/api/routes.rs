//! API route definitions

use super::handlers::{self, KunaState};
use super::{ai_handlers, client_handlers, pipeline_handlers, task_handlers};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the API router
pub fn create_router(state: KunaState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // ====================================================================
        // Clients
        // ====================================================================
        .route(
            "/api/clients",
            get(client_handlers::list_clients).post(client_handlers::create_client),
        )
        .route("/api/clients/risk", get(client_handlers::client_risk))
        .route(
            "/api/clients/{id}",
            get(client_handlers::get_client)
                .put(client_handlers::update_client)
                .delete(client_handlers::delete_client),
        )
        .route(
            "/api/clients/{id}/interactions",
            get(client_handlers::client_interactions),
        )
        .route(
            "/api/clients/{id}/stage-history",
            get(client_handlers::stage_history),
        )
        // ====================================================================
        // Interactions
        // ====================================================================
        .route(
            "/api/interactions",
            get(client_handlers::list_interactions).post(client_handlers::create_interaction),
        )
        // ====================================================================
        // Stages & pipeline
        // ====================================================================
        .route(
            "/api/stages",
            get(pipeline_handlers::list_stages)
                .post(pipeline_handlers::create_stage)
                .put(pipeline_handlers::reorder_stages),
        )
        .route("/api/stages/seed", post(pipeline_handlers::seed_stages))
        .route(
            "/api/stages/{id}",
            axum::routing::put(pipeline_handlers::update_stage)
                .delete(pipeline_handlers::delete_stage),
        )
        .route("/api/pipeline/move", post(pipeline_handlers::move_client))
        .route("/api/pipeline/add", post(pipeline_handlers::add_to_pipeline))
        .route(
            "/api/pipeline/remove",
            post(pipeline_handlers::remove_from_pipeline),
        )
        .route("/api/pipeline/assign", post(pipeline_handlers::assign_stages))
        // ====================================================================
        // Tasks
        // ====================================================================
        .route(
            "/api/tasks",
            get(task_handlers::list_tasks)
                .post(task_handlers::create_task)
                .put(task_handlers::bulk_complete),
        )
        .route(
            "/api/tasks/{id}",
            get(task_handlers::get_task)
                .put(task_handlers::update_task)
                .delete(task_handlers::delete_task),
        )
        // ====================================================================
        // AI insights
        // ====================================================================
        .route(
            "/api/ai/analyze-customer",
            post(ai_handlers::analyze_customer),
        )
        .route("/api/ai/daily-summary", post(ai_handlers::daily_summary))
        .route("/api/ai/predict-sales", post(ai_handlers::predict_sales))
        .route(
            "/api/ai/pipeline-insights",
            post(ai_handlers::pipeline_insights),
        )
        .route("/api/ai/chat", post(ai_handlers::chat))
        .route("/api/ai/insights", get(ai_handlers::list_insights))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
