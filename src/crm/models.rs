//! CRM request and response DTOs
//!
//! Required fields are `Option` so a missing value surfaces as a 400 with a
//! readable message instead of a body-deserialization rejection.

use crate::store::models::{Client, ClientRef, Interaction, Stage, TaskKind, TaskPriority};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Clients
// ============================================================================

/// Request to create a new client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateClientRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub id_type: Option<String>,
    pub id_number: Option<String>,
    pub address: Option<String>,
    pub company: Option<String>,
    pub occupation: Option<String>,
    /// `YYYY-MM-DD`
    pub birthday: Option<String>,
    pub notes: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Request to update a client. Absent fields are left unchanged,
/// blank strings clear the field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateClientRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub id_type: Option<String>,
    #[serde(default)]
    pub id_number: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub occupation: Option<String>,
    #[serde(default)]
    pub birthday: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// A client with its stage and latest activity
#[derive(Debug, Clone, Serialize)]
pub struct ClientDetails {
    pub client: Client,
    pub stage: Option<Stage>,
    pub recent_interactions: Vec<Interaction>,
}

// ============================================================================
// Interactions
// ============================================================================

/// Request to log an interaction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateInteractionRequest {
    pub client_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub amount: Option<f64>,
    pub notes: Option<String>,
    /// Defaults to now
    pub date: Option<DateTime<Utc>>,
}

// ============================================================================
// Stages
// ============================================================================

/// Request to create or rename a stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOrderItem {
    pub id: Uuid,
}

/// Request to reorder stages; each stage's order becomes its index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReorderStagesRequest {
    pub stages: Option<Vec<StageOrderItem>>,
}

/// Compact client card shown in a pipeline column
#[derive(Debug, Clone, Serialize)]
pub struct PipelineClient {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub total_spent: f64,
    pub visit_count: i64,
    pub last_visit: Option<DateTime<Utc>>,
    pub stage_entered_at: Option<DateTime<Utc>>,
    pub days_in_stage: Option<i64>,
    pub churn_risk: Option<f64>,
    pub tags: Vec<String>,
}

impl PipelineClient {
    pub fn from_client(client: &Client, now: DateTime<Utc>) -> Self {
        Self {
            id: client.id,
            name: client.name.clone(),
            email: client.email.clone(),
            phone: client.phone.clone(),
            total_spent: client.total_spent,
            visit_count: client.visit_count,
            last_visit: client.last_visit,
            stage_entered_at: client.stage_entered_at,
            days_in_stage: client.days_in_stage(now),
            churn_risk: client.churn_risk,
            tags: client.tags.clone(),
        }
    }
}

/// A pipeline column: stage, count and the clients in it
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStage {
    #[serde(flatten)]
    pub stage: Stage,
    pub client_count: usize,
    pub clients: Vec<PipelineClient>,
}

/// Result of seeding the default stages
#[derive(Debug, Clone, Serialize)]
pub struct SeedStagesResponse {
    pub message: String,
    /// True when stages already existed and nothing was created
    pub existing: bool,
    pub stages: Vec<Stage>,
}

// ============================================================================
// Pipeline
// ============================================================================

/// Request to move a client to another stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MoveStageRequest {
    pub client_id: Option<Uuid>,
    pub new_stage_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoveStageResponse {
    pub success: bool,
    pub client: Client,
    pub message: String,
    pub from_stage: Option<String>,
    pub to_stage: Option<String>,
}

/// Request to put clients into the pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddToPipelineRequest {
    pub client_ids: Option<Vec<Uuid>>,
    pub stage_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedClient {
    pub id: Uuid,
    pub name: String,
    pub current_stage_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddToPipelineResponse {
    pub success: bool,
    pub message: String,
    pub added_count: usize,
    pub skipped_count: usize,
    pub added_clients: Vec<ClientRef>,
    pub skipped_clients: Vec<SkippedClient>,
}

/// Request to take a client out of the pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoveFromPipelineRequest {
    pub client_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoveFromPipelineResponse {
    pub success: bool,
    pub client: Client,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageAssignment {
    pub client_id: Uuid,
    pub client_name: String,
    pub stage_id: Uuid,
    pub stage_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageCount {
    pub stage: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignStagesResponse {
    pub message: String,
    pub assignments: Vec<StageAssignment>,
    pub stage_counts: Vec<StageCount>,
}

// ============================================================================
// Tasks
// ============================================================================

/// Request to create a task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub client_id: Option<Uuid>,
    pub stage_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Option<TaskPriority>,
    #[serde(rename = "type")]
    pub kind: Option<TaskKind>,
    pub notes: Option<String>,
}

/// Partial task update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTaskRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default, rename = "type")]
    pub kind: Option<TaskKind>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Bulk completion of several tasks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkCompleteRequest {
    pub task_ids: Option<Vec<Uuid>>,
    /// Defaults to true
    pub completed: Option<bool>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkCompleteResponse {
    pub success: bool,
    pub updated_count: usize,
}
