//! CrmStore trait definition
//!
//! Abstract interface for every persistence operation the CRM needs.
//! `SqliteStore` is the production backend; handlers and managers only see
//! `Arc<dyn CrmStore>` so tests can swap in the in-memory mock.

use crate::store::models::*;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait CrmStore: Send + Sync {
    /// Check that the backend answers queries
    async fn health_check(&self) -> Result<bool>;

    // ========================================================================
    // Client operations
    // ========================================================================

    /// Insert a new client
    async fn create_client(&self, client: &Client) -> Result<()>;

    /// Get a client by ID
    async fn get_client(&self, id: Uuid) -> Result<Option<Client>>;

    /// Get every client whose ID is in `ids` (unknown IDs are skipped)
    async fn get_clients(&self, ids: &[Uuid]) -> Result<Vec<Client>>;

    /// List clients with filters and pagination. Returns (page, total matching).
    async fn list_clients(&self, filter: &ClientFilter) -> Result<(Vec<Client>, usize)>;

    /// All clients, oldest first
    async fn all_clients(&self) -> Result<Vec<Client>>;

    /// Clients that currently sit in any stage
    async fn clients_in_pipeline(&self) -> Result<Vec<Client>>;

    /// Highest spenders first
    async fn top_clients_by_spent(&self, limit: usize) -> Result<Vec<Client>>;

    /// Number of clients created at or after `since`
    async fn count_clients_created_since(&self, since: DateTime<Utc>) -> Result<usize>;

    /// Persist the editable contact fields and tags of a client
    async fn update_client(&self, client: &Client) -> Result<()>;

    /// Delete a client, its interactions, and unlink its tasks.
    /// Returns false when the client did not exist.
    async fn delete_client(&self, id: Uuid) -> Result<bool>;

    /// Move a client to a stage (or out of the pipeline with `None`)
    async fn set_client_stage(
        &self,
        id: Uuid,
        stage_id: Option<Uuid>,
        entered_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Store the scores produced by customer analysis
    async fn set_client_scores(&self, id: Uuid, churn_risk: f64, loyalty_score: i64)
        -> Result<()>;

    // ========================================================================
    // Stage operations
    // ========================================================================

    /// All stages ordered by position, with their client counts
    async fn list_stages(&self) -> Result<Vec<StageWithCount>>;

    /// Get a stage by ID
    async fn get_stage(&self, id: Uuid) -> Result<Option<Stage>>;

    /// Exact (trimmed) name lookup
    async fn find_stage_by_name(&self, name: &str) -> Result<Option<Stage>>;

    /// Insert a new stage
    async fn create_stage(&self, stage: &Stage) -> Result<()>;

    /// Persist name, description, color and order of a stage
    async fn update_stage(&self, stage: &Stage) -> Result<()>;

    /// Delete a stage. Returns false when it did not exist.
    async fn delete_stage(&self, id: Uuid) -> Result<bool>;

    /// Highest order value in use, `None` when there are no stages
    async fn max_stage_order(&self) -> Result<Option<i64>>;

    /// Set each stage's order to its index in `ids`, atomically
    async fn reorder_stages(&self, ids: &[Uuid]) -> Result<()>;

    /// Number of clients currently in a stage
    async fn count_clients_in_stage(&self, stage_id: Uuid) -> Result<usize>;

    // ========================================================================
    // Interaction operations
    // ========================================================================

    /// Append an interaction and apply its effect on the client aggregates
    /// (spend, visit count, last visit, average ticket) in one transaction.
    async fn record_interaction(&self, interaction: &Interaction) -> Result<()>;

    /// Newest-first interactions of a client, optionally of one type
    async fn list_client_interactions(
        &self,
        client_id: Uuid,
        kind: Option<InteractionType>,
        limit: usize,
    ) -> Result<Vec<Interaction>>;

    /// Every interaction dated at or after `since`, oldest first
    async fn list_interactions_since(&self, since: DateTime<Utc>) -> Result<Vec<Interaction>>;

    // ========================================================================
    // Task operations
    // ========================================================================

    /// Insert a new task
    async fn create_task(&self, task: &Task) -> Result<()>;

    /// Get a task by ID
    async fn get_task(&self, id: Uuid) -> Result<Option<Task>>;

    /// Get a task with its client and stage references
    async fn get_task_details(&self, id: Uuid) -> Result<Option<TaskDetails>>;

    /// Filtered task listing: open tasks first, then priority, due date and recency
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskDetails>>;

    /// Persist every mutable task field
    async fn update_task(&self, task: &Task) -> Result<()>;

    /// Delete a task. Returns false when it did not exist.
    async fn delete_task(&self, id: Uuid) -> Result<bool>;

    /// Bulk (un)complete tasks. Returns how many rows were updated.
    async fn set_tasks_completed(
        &self,
        ids: &[Uuid],
        completed: bool,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<usize>;

    // ========================================================================
    // Insight operations
    // ========================================================================

    /// Store an AI insight
    async fn save_insight(&self, insight: &Insight) -> Result<()>;

    /// Newest-first insights, optionally of one type
    async fn list_insights(&self, kind: Option<InsightType>, limit: usize)
        -> Result<Vec<Insight>>;
}
